use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};

use papercast_core::config::{Config, LoggingConfig};
use papercast_core::types::{Answers, Question, answer_key};
use papercast_pipeline::Pipeline;

#[derive(Parser)]
#[command(
    name = "papercast",
    about = "Turn a research paper into a podcast tailored to its listener",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file path
    #[arg(short, long, global = true)]
    config: Option<String>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP gateway
    Serve {
        /// Port to listen on (default: 5000)
        #[arg(long)]
        port: Option<u16>,
    },

    /// Produce a podcast from a document in one pass
    Run {
        /// PDF, text or markdown document
        file: PathBuf,

        /// JSON answers: an object keyed `q_0`, `q_1`, ... or an array in question order
        #[arg(long)]
        answers: Option<PathBuf>,

        /// Also copy the podcast to this file name in the audio directory
        #[arg(long)]
        output_name: Option<String>,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Show system status
    Status,
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Show current configuration
    Show,
    /// Get a specific config value
    Get { key: String },
    /// Check the configuration for problems
    Validate,
    /// Write a default configuration file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

fn init_logging(logging: &LoggingConfig, verbose: bool) {
    let level = if verbose {
        "debug"
    } else {
        logging.level.as_deref().unwrap_or("info")
    };
    let mut directives = vec![level.to_string()];
    directives.extend(logging.filters.iter().cloned());

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(directives.join(",")));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    match (logging.format.as_str(), logging.output.as_str()) {
        ("json", "stdout") => builder.json().with_writer(std::io::stdout).init(),
        ("json", _) => builder.json().with_writer(std::io::stderr).init(),
        (_, "stdout") => builder.with_writer(std::io::stdout).init(),
        _ => builder.with_writer(std::io::stderr).init(),
    }
}

/// Parse an answers file: `{"q_0": "..."}` or `["...", "..."]`.
fn parse_answers(raw: &str) -> anyhow::Result<Answers> {
    let value: serde_json::Value = serde_json::from_str(raw)?;
    let text = |v: &serde_json::Value| match v {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    match value {
        serde_json::Value::Object(map) => Ok(map.iter().map(|(k, v)| (k.clone(), text(v))).collect()),
        serde_json::Value::Array(items) => Ok(items
            .iter()
            .enumerate()
            .map(|(i, v)| (answer_key(i), text(v)))
            .collect()),
        _ => anyhow::bail!("answers must be a JSON object or array"),
    }
}

/// Answer every question with its first option.
fn default_answers(questions: &[Question]) -> Answers {
    questions
        .iter()
        .enumerate()
        .filter_map(|(i, q)| q.options.first().map(|o| (answer_key(i), o.clone())))
        .collect()
}

fn print_questions(questions: &[Question], answers: &Answers) {
    println!("Questions:");
    for (i, q) in questions.iter().enumerate() {
        println!("  {}. {}", i + 1, q.prompt);
        for option in &q.options {
            println!("       - {option}");
        }
        if let Some(answer) = answers.get(&answer_key(i)) {
            println!("     answer: {answer}");
        }
    }
}

async fn run_once(
    config: Arc<Config>,
    file: &Path,
    answers_path: Option<&Path>,
    output_name: Option<&str>,
) -> anyhow::Result<()> {
    let supplied = match answers_path {
        Some(path) => Some(parse_answers(
            &std::fs::read_to_string(path)
                .with_context(|| format!("reading answers from {}", path.display()))?,
        )?),
        None => None,
    };

    let bytes = tokio::fs::read(file)
        .await
        .with_context(|| format!("reading {}", file.display()))?;
    let file_name = file
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    let pipeline = Pipeline::from_config(Arc::clone(&config))?;
    let outcome = pipeline
        .run(&file_name, bytes, |questions| {
            let answers = supplied.unwrap_or_else(|| default_answers(questions));
            print_questions(questions, &answers);
            answers
        })
        .await?;

    println!();
    println!("Title: {}", outcome.title);
    println!("Audio: {}", outcome.audio_path.display());
    println!(
        "Chunks: {} ({} failed), {:.1}s",
        outcome.chunk_count,
        outcome.failed_chunks.len(),
        outcome.duration_secs
    );
    if !outcome.failed_chunks.is_empty() {
        println!("Failed chunks: {:?}", outcome.failed_chunks);
    }

    if let Some(name) = output_name {
        let target = config.audio_dir().join(name);
        std::fs::copy(&outcome.audio_path, &target)
            .with_context(|| format!("copying podcast to {}", target.display()))?;
        println!("Copied to: {}", target.display());
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load config
    let config_path = cli
        .config
        .map(PathBuf::from)
        .unwrap_or_else(Config::config_path);

    let config = Config::load(&config_path)?;
    init_logging(&config.logging.clone().unwrap_or_default(), cli.verbose);
    let config = Arc::new(config);

    match cli.command {
        Commands::Serve { port } => {
            let port = port.unwrap_or_else(|| config.gateway_port());
            tracing::info!("Starting Papercast gateway on port {port}");

            let state = papercast_gateway::GatewayState::from_config(Arc::clone(&config))?;
            #[cfg(feature = "metrics")]
            let state = state.with_prometheus(papercast_gateway::metrics::install_prometheus_recorder()?);

            papercast_gateway::start_gateway(Arc::new(state), port).await?;
        }
        Commands::Run {
            file,
            answers,
            output_name,
        } => {
            run_once(config, &file, answers.as_deref(), output_name.as_deref()).await?;
        }
        Commands::Status => {
            let tts = config.tts();
            println!("Papercast v{}", env!("CARGO_PKG_VERSION"));
            println!("Config: {}", config_path.display());
            println!("Model: {} ({})", config.llm().model, config.llm().provider);
            println!("Speech: {} at {} Hz", tts.provider, tts.sample_rate);
            println!("Uploads: {}", config.upload_dir().display());
            println!("Audio: {}", config.audio_dir().display());
            println!("Gateway port: {}", config.gateway_port());
        }
        Commands::Config { action } => match action {
            ConfigAction::Show => {
                let json = serde_json::to_string_pretty(config.as_ref())?;
                println!("{json}");
            }
            ConfigAction::Get { key } => match config.get_path(&key) {
                Some(value) => println!("{}", serde_json::to_string_pretty(&value)?),
                None => anyhow::bail!("no config value at '{key}'"),
            },
            ConfigAction::Validate => {
                let (warnings, errors) = config.validate();
                for w in &warnings {
                    println!("warning: {w}");
                }
                for e in &errors {
                    println!("error: {e}");
                }
                if !errors.is_empty() {
                    anyhow::bail!("{} configuration error(s)", errors.len());
                }
                println!("Configuration OK");
            }
            ConfigAction::Init { force } => {
                if config_path.exists() && !force {
                    anyhow::bail!("{} already exists (use --force)", config_path.display());
                }
                if let Some(parent) = config_path.parent() {
                    std::fs::create_dir_all(parent)?;
                }
                Config::default().save(&config_path)?;
                println!("Wrote {}", config_path.display());
            }
        },
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_answers_object() {
        let answers = parse_answers(r#"{"q_0": "Beginner", "q_1": 3}"#).unwrap();
        assert_eq!(answers["q_0"], "Beginner");
        assert_eq!(answers["q_1"], "3");
    }

    #[test]
    fn test_parse_answers_array() {
        let answers = parse_answers(r#"["yes", "no"]"#).unwrap();
        assert_eq!(answers["q_0"], "yes");
        assert_eq!(answers["q_1"], "no");
    }

    #[test]
    fn test_parse_answers_rejects_scalars() {
        assert!(parse_answers("42").is_err());
    }

    #[test]
    fn test_default_answers_pick_first_option() {
        let questions = vec![
            Question {
                prompt: "Know CNNs?".into(),
                options: vec!["Yes".into(), "No".into()],
            },
            Question {
                prompt: "Anything else?".into(),
                options: vec![],
            },
        ];
        let answers = default_answers(&questions);
        assert_eq!(answers.len(), 1);
        assert_eq!(answers["q_0"], "Yes");
    }
}
