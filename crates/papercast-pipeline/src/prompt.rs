//! Prompt builders for question generation and script writing.

use papercast_core::types::{Answers, Question, answer_key};

pub const NO_ANSWER: &str = "[No answer]";

/// Self-assessment options offered for most calibration questions.
pub const FAMILIARITY_OPTIONS: [&str; 3] = [
    "🧠 Yep, I know this stuff",
    "🤔 Kinda… sounds familiar",
    "🤷 Nope, no clue",
];

/// Cut `text` to at most `max_chars` characters, on a char boundary.
pub fn truncate_document(text: &str, max_chars: Option<usize>) -> &str {
    match max_chars {
        Some(max) => match text.char_indices().nth(max) {
            Some((byte, _)) => &text[..byte],
            None => text,
        },
        None => text,
    }
}

/// Ask the model for calibration questions about the reader's background.
pub fn question_prompt(document: &str, question_count: usize) -> String {
    let mut parts = Vec::new();

    parts.push(
        "You will produce a technical podcast episode about the paper below. \
         Before writing it, ask the listener a few questions about their background so \
         the technical depth can be tailored to them."
            .to_string(),
    );
    parts.push(format!(
        "Generate {question_count} questions. Most questions should offer these three options:\n- {}",
        FAMILIARITY_OPTIONS.join("\n- ")
    ));
    parts.push(format!(
        "Return only JSON in this shape:\n{}",
        r#"{
    "questions": [
        {
            "prompt": "What is a convolutional neural network?",
            "options": ["🧠 Yep, I know this stuff", "🤔 Kinda… sounds familiar", "🤷 Nope, no clue"]
        },
        {
            "prompt": "What is your background?",
            "options": ["Domain expert", "Beginner", "From another field"]
        }
    ]
}"#
    ));
    parts.push(format!("Paper text:\n{document}"));
    parts.push("Questions:".to_string());

    parts.join("\n\n")
}

/// Render the listener's answers as Q/A pairs.
///
/// Answers are looked up by `q_{index}`; a missing answer reads `[No answer]`.
/// Without questions, the raw answers are listed in key order.
pub fn listener_profile(questions: &[Question], answers: &Answers) -> String {
    if questions.is_empty() {
        let mut keys: Vec<&String> = answers.keys().collect();
        keys.sort();
        return keys
            .into_iter()
            .map(|k| format!("{k}: {}", answers[k]))
            .collect::<Vec<_>>()
            .join("\n");
    }

    questions
        .iter()
        .enumerate()
        .map(|(idx, q)| {
            let answer = answers
                .get(&answer_key(idx))
                .map(String::as_str)
                .filter(|a| !a.trim().is_empty())
                .unwrap_or(NO_ANSWER);
            format!("Q: {}\nA: {answer}", q.prompt)
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Ask the model for a spoken script tailored to the listener profile.
pub fn script_prompt(document: &str, profile: &str) -> String {
    let mut parts = Vec::new();

    parts.push(
        "Write a single-narrator technical podcast episode about the paper below.".to_string(),
    );
    if profile.trim().is_empty() {
        parts.push("Nothing is known about the listener; assume a curious generalist.".to_string());
    } else {
        parts.push(format!(
            "Tailor the depth to this listener, who answered:\n{profile}"
        ));
    }
    parts.push(
        "The script is read aloud by a speech synthesizer: plain spoken prose, full \
         sentences, no markdown, no bullet lists, no speaker labels, no stage directions."
            .to_string(),
    );
    parts.push(format!(
        "Return only JSON in this shape:\n{}",
        r#"{"title": "Episode title", "script": "The full narration."}"#
    ));
    parts.push(format!("Paper text:\n{document}"));

    parts.join("\n\n")
}
