//! Reflection and plan synthesis.
//!
//! Text in, text out over fixed instruction templates. There is no retry
//! here; callers log failures and leave the importance counter untouched
//! so the next qualifying turn tries again.

use crate::llm::LlmDispatcher;
use crate::{SDKError, SDKResult};
use tracing::debug;

/// Reflection prompt over a session transcript
pub fn reflection_prompt(user_id: &str, transcript: &str) -> String {
    format!(
        "Based on the following conversation history of a user's interactions with an AI \
         counsellor, generate a thoughtful reflection:\n\n\
         Conversation History:\n{}\n\n\
         User ID: {}\n\
         Reflection:",
        transcript.trim(),
        user_id
    )
}

/// Plan prompt over recent reflections and the plan being replaced
pub fn plan_prompt(reflections: &[String], previous_plan: Option<&str>) -> String {
    let reflections = if reflections.is_empty() {
        "(none)".to_string()
    } else {
        reflections
            .iter()
            .map(|r| format!("- {}", r.trim()))
            .collect::<Vec<_>>()
            .join("\n")
    };
    let previous = previous_plan
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .unwrap_or("(none)");

    format!(
        "Based on the following reflections and the previous plan, create a plan for the AI \
         counsellor's next conversation with the user.\n\n\
         Reflections:\n{}\n\n\
         Previous Plan:\n{}\n\n\
         Plan for Next Conversation:\n\
         - Topics to Explore:\n\
         - Questions to Ask:\n\
         - Techniques to Consider:\n\
         - Goals for the session:",
        reflections, previous
    )
}

/// LLM-backed reflection and plan writer
#[derive(Clone)]
pub struct Synthesizer {
    llm: LlmDispatcher,
}

impl Synthesizer {
    pub fn new(llm: LlmDispatcher) -> Self {
        Self { llm }
    }

    /// Summarize a session transcript into a reflection
    pub async fn reflection(&self, user_id: &str, transcript: &str) -> SDKResult<String> {
        if transcript.trim().is_empty() {
            return Err(SDKError::synthesis("nothing to reflect on"));
        }
        debug!(user_id, "synthesizing reflection");
        self.generate(reflection_prompt(user_id, transcript), "reflection")
            .await
    }

    /// Derive the next plan from recent reflections and the current plan
    pub async fn plan(&self, reflections: &[String], previous_plan: Option<&str>) -> SDKResult<String> {
        if reflections.is_empty() && previous_plan.is_none() {
            return Err(SDKError::synthesis("no reflections to plan from"));
        }
        debug!(reflections = reflections.len(), "synthesizing plan");
        self.generate(plan_prompt(reflections, previous_plan), "plan")
            .await
    }

    async fn generate(&self, prompt: String, what: &str) -> SDKResult<String> {
        let text = self
            .llm
            .complete(prompt, None, None)
            .await
            .map_err(|e| SDKError::synthesis(format!("{} generation failed: {}", what, e)))?;

        let text = text.trim();
        if text.is_empty() {
            return Err(SDKError::synthesis(format!("{} generation returned nothing", what)));
        }
        Ok(text.to_string())
    }
}
