//! Turn prompt assembly.
//!
//! ```text
//! {custom prompt}
//!
//! What you know about the user:
//! - {reflection}
//!
//! Relevant Message History:
//! User: ...
//! Counsellor: ...
//!
//! Recent Conversation:
//! User: ...
//! Counsellor: ...
//!
//! User: {question}
//! ```
//!
//! Empty sections are left out.

use crate::memory::CacheEntry;
use crate::request::ChatRequest;
use augury_core::ScoredRecord;

/// Heading of the plan appended to the system instruction
pub const PLAN_HEADING: &str = "Plan for this conversation:";

/// Memory gathered for one turn
#[derive(Debug, Clone, Default)]
pub struct PromptContext {
    pub custom_prompt: Option<String>,
    pub reflections: Vec<ScoredRecord>,
    pub relevant: Vec<ScoredRecord>,
    pub recent: Vec<CacheEntry>,
}

/// Base instruction with the active plan appended
pub fn system_instruction_with_plan(base: &str, plan: Option<&str>) -> String {
    match plan.map(str::trim).filter(|p| !p.is_empty()) {
        Some(plan) => format!("{}\n\n{}\n{}", base, PLAN_HEADING, plan),
        None => base.to_string(),
    }
}

/// Render the full turn prompt
pub fn build_turn_prompt(request: &ChatRequest, context: &PromptContext) -> String {
    let speaker = request.kind().speaker();
    let mut sections: Vec<String> = Vec::new();

    if let Some(custom) = context.custom_prompt.as_deref().map(str::trim).filter(|c| !c.is_empty()) {
        sections.push(custom.to_string());
    }

    if !context.reflections.is_empty() {
        let lines = context
            .reflections
            .iter()
            .map(|r| format!("- {}", r.text.trim()))
            .collect::<Vec<_>>()
            .join("\n");
        sections.push(format!("What you know about the user:\n{}", lines));
    }

    if !context.relevant.is_empty() {
        let pairs = context
            .relevant
            .iter()
            .map(|r| {
                format!(
                    "User: {}\n{}: {}",
                    r.text,
                    speaker,
                    r.response_text.as_deref().unwrap_or("")
                )
            })
            .collect::<Vec<_>>()
            .join("\n");
        sections.push(format!("Relevant Message History:\n{}", pairs));
    }

    if !context.recent.is_empty() {
        sections.push(format!(
            "Recent Conversation:\n{}",
            transcript(&context.recent, speaker)
        ));
    }

    sections.push(format!("User: {}", request.question()));
    sections.join("\n\n")
}

/// `User:`/speaker lines for cached turns, oldest first
pub fn transcript(entries: &[CacheEntry], speaker: &str) -> String {
    entries
        .iter()
        .map(|e| format!("User: {}\n{}: {}", e.user_text, speaker, e.response_text))
        .collect::<Vec<_>>()
        .join("\n")
}
