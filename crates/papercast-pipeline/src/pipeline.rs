//! The document-to-podcast orchestrator.

use std::path::PathBuf;
use std::sync::Arc;

use tracing::{debug, info, warn};

use papercast_core::config::Config;
use papercast_core::error::{PapercastError, UpstreamError, with_timeout};
use papercast_core::types::{Answers, AudioClip, Question};
use papercast_media::{AudioStitcher, SentenceChunker, SpeechSynthesizer, VoiceConfig};
use papercast_providers::extract::{extract_questions, extract_script};
use papercast_providers::{
    Credentials, GenerateRequest, LlmProvider, RawModelResponse, credentials_from_config,
    provider_from_config,
};

use crate::document::{DocumentToken, read_document};
use crate::error::{PipelineError, PipelineErrorKind};
use crate::prompt::{listener_profile, question_prompt, script_prompt, truncate_document};
use crate::stage::{PipelineStage, StageTracker};
use crate::synth::{SynthesisPlan, synthesize_chunks};
use crate::PodcastOutcome;

const DEFAULT_TITLE: &str = "Your paper, explained";

/// Shared, immutable orchestrator. One per process.
pub struct Pipeline {
    config: Arc<Config>,
    llm: Arc<dyn LlmProvider>,
    credentials: Credentials,
    tts: Arc<dyn SpeechSynthesizer>,
    chunker: SentenceChunker,
    stitcher: AudioStitcher,
}

impl Pipeline {
    pub fn new(
        config: Arc<Config>,
        llm: Arc<dyn LlmProvider>,
        credentials: Credentials,
        tts: Arc<dyn SpeechSynthesizer>,
    ) -> papercast_core::error::Result<Self> {
        let tts_config = config.tts();
        let chunker = SentenceChunker::new(tts_config.max_chars, tts_config.oversize_policy)
            .map_err(|e| PapercastError::Config(format!("tts.max_chars: {e}")))?;
        let stitcher = AudioStitcher::new(config.audio_dir());
        Ok(Self {
            config,
            llm,
            credentials,
            tts,
            chunker,
            stitcher,
        })
    }

    /// Build the pipeline with the providers named in config.
    pub fn from_config(config: Arc<Config>) -> papercast_core::error::Result<Self> {
        let llm_config = config.llm();
        let llm = provider_from_config(&llm_config)
            .map_err(|e| PapercastError::Config(e.to_string()))?;
        let credentials = credentials_from_config(&llm_config);
        let tts = papercast_media::tts::synthesizer_from_config(&config.tts())
            .map_err(|e| PapercastError::Config(e.to_string()))?;
        Self::new(config, llm, credentials, tts)
    }

    pub fn config(&self) -> &Arc<Config> {
        &self.config
    }

    fn text_path(&self, token: &DocumentToken) -> PathBuf {
        self.config.upload_dir().join(token.text_file_name())
    }

    async fn generate(&self, prompt: String) -> Result<RawModelResponse, UpstreamError> {
        let llm_config = self.config.llm();
        let request = GenerateRequest::from_config(&llm_config, prompt);
        with_timeout(
            self.llm.id(),
            llm_config.timeout(),
            self.llm.generate(&request, &self.credentials),
        )
        .await
    }

    async fn load_text(&self, token: &DocumentToken, stage: PipelineStage) -> Result<String, PipelineError> {
        match tokio::fs::read_to_string(self.text_path(token)).await {
            Ok(text) => Ok(text),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(PipelineError::new(
                stage,
                crate::document::TokenError(token.to_string()),
            )),
            Err(e) => Err(PipelineError::new(stage, e)),
        }
    }

    /// Extract the document's text and store it under a fresh token.
    pub async fn ingest(&self, file_name: &str, bytes: Vec<u8>) -> Result<DocumentToken, PipelineError> {
        let token = DocumentToken::generate();
        let mut tracker = StageTracker::new(token.to_string(), PipelineStage::Uploaded);
        let fail = |kind: PipelineErrorKind| PipelineError {
            stage: PipelineStage::Extracted,
            kind,
        };

        let text = read_document(file_name.to_string(), bytes)
            .await
            .map_err(|e| fail(e.into()))?;
        debug!(%token, preview = %truncate_document(&text, Some(200)), "Extracted document text");

        let upload_dir = self.config.upload_dir();
        tokio::fs::create_dir_all(&upload_dir)
            .await
            .map_err(|e| fail(e.into()))?;
        tokio::fs::write(self.text_path(&token), &text)
            .await
            .map_err(|e| fail(e.into()))?;

        tracker.advance(PipelineStage::Extracted).map_err(|e| fail(e.into()))?;
        info!(%token, file_name, chars = text.chars().count(), "Document ingested");
        Ok(token)
    }

    /// Ask the model for calibration questions about the stored document.
    pub async fn generate_questions(&self, token: &DocumentToken) -> Result<Vec<Question>, PipelineError> {
        let mut tracker = StageTracker::new(token.to_string(), PipelineStage::Extracted);
        let stage = tracker.pending();

        let text = self.load_text(token, stage).await?;
        let podcast = self.config.podcast();
        let prompt = question_prompt(
            truncate_document(&text, podcast.max_document_chars),
            podcast.question_count,
        );

        let raw = self
            .generate(prompt)
            .await
            .map_err(|e| PipelineError::new(stage, e))?;
        let payload = match extract_questions(&raw) {
            Ok(payload) => {
                debug!(%token, raw = %raw, "Question response");
                payload
            }
            Err(e) => {
                warn!(%token, reason = %e.reason, raw = %e.raw, "Could not extract questions");
                return Err(PipelineError::new(stage, e));
            }
        };

        tracker
            .advance(PipelineStage::QuestionsGenerated)
            .map_err(|e| PipelineError::new(stage, e))?;
        info!(%token, count = payload.questions.len(), "Questions generated");
        Ok(payload.questions)
    }

    /// Write, voice and stitch the podcast for an answered questionnaire.
    pub async fn produce_podcast(
        &self,
        token: &DocumentToken,
        questions: &[Question],
        answers: &Answers,
    ) -> Result<PodcastOutcome, PipelineError> {
        let mut tracker = StageTracker::new(token.to_string(), PipelineStage::AnswersCollected);

        // Script
        let stage = tracker.pending();
        let text = self.load_text(token, stage).await?;
        let profile = listener_profile(questions, answers);
        debug!(%token, profile = %profile, "Listener profile");

        let prompt = script_prompt(
            truncate_document(&text, self.config.podcast().max_document_chars),
            &profile,
        );
        let raw = self
            .generate(prompt)
            .await
            .map_err(|e| PipelineError::new(stage, e))?;
        let script = match extract_script(&raw) {
            Ok(script) => script,
            Err(e) => {
                warn!(%token, reason = %e.reason, raw = %e.raw, "Could not extract script");
                return Err(PipelineError::new(stage, e));
            }
        };
        tracker.advance(stage).map_err(|e| PipelineError::new(stage, e))?;

        // Chunk
        let stage = tracker.pending();
        let chunks = self.chunker.chunk(&script.script);
        let chunk_count = chunks.len();
        debug!(%token, chunks = chunk_count, max_chars = self.chunker.max_chars(), "Script chunked");
        tracker.advance(stage).map_err(|e| PipelineError::new(stage, e))?;

        // Synthesize
        let stage = tracker.pending();
        let tts_config = self.config.tts();
        let report = synthesize_chunks(
            Arc::clone(&self.tts),
            chunks,
            VoiceConfig::from_config(&tts_config),
            &SynthesisPlan::from_config(&tts_config),
        )
        .await;
        let failed_chunks = report.failed_indices();
        if report.clips.is_empty() {
            let last = report
                .failures
                .last()
                .map(|f| f.source.to_string())
                .unwrap_or_else(|| "script produced no chunks".to_string());
            return Err(PipelineError::new(
                stage,
                PipelineErrorKind::Synthesis {
                    failed: failed_chunks,
                    last,
                },
            ));
        }
        if !failed_chunks.is_empty() {
            warn!(%token, failed = ?failed_chunks, chunks = chunk_count, "Stitching without failed chunks");
        }
        tracker.advance(stage).map_err(|e| PipelineError::new(stage, e))?;

        // Stitch
        let stage = tracker.pending();
        let file_name = token.audio_file_name();
        let (audio_path, duration) = self
            .stitch(report.into_clips(), file_name.clone())
            .await
            .map_err(|kind| PipelineError { stage, kind })?;
        tracker.advance(stage).map_err(|e| PipelineError::new(stage, e))?;

        info!(
            %token,
            chunks = chunk_count,
            failed = failed_chunks.len(),
            duration_secs = duration,
            "Podcast ready"
        );
        Ok(PodcastOutcome {
            token: *token,
            audio_path,
            file_name,
            title: script.title.unwrap_or_else(|| DEFAULT_TITLE.to_string()),
            transcript: script.script,
            chunk_count,
            failed_chunks,
            duration_secs: duration,
        })
    }

    async fn stitch(
        &self,
        clips: Vec<AudioClip>,
        file_name: String,
    ) -> Result<(PathBuf, f64), PipelineErrorKind> {
        let stitcher = self.stitcher.clone();
        tokio::task::spawn_blocking(move || {
            let audio = stitcher.stitch(&clips)?;
            let path = stitcher.publish(&audio, &file_name)?;
            Ok::<_, PipelineErrorKind>((path, audio.duration().as_secs_f64()))
        })
        .await
        .map_err(|e| PipelineErrorKind::Io(std::io::Error::other(e.to_string())))?
    }

    /// Single-pass run: ingest, ask, answer via `answer_fn`, produce.
    pub async fn run<F>(&self, file_name: &str, bytes: Vec<u8>, answer_fn: F) -> Result<PodcastOutcome, PipelineError>
    where
        F: FnOnce(&[Question]) -> Answers,
    {
        let token = self.ingest(file_name, bytes).await?;
        let questions = self.generate_questions(&token).await?;
        let answers = answer_fn(&questions);
        self.produce_podcast(&token, &questions, &answers).await
    }
}
