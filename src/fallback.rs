use anyhow::Result;
use async_trait::async_trait;

use crate::models::MatchCandidate;

/// What the generative path receives when the Matrix has no confident row.
#[derive(Debug, Clone)]
pub struct FallbackRequest {
    pub question: String,
    pub prompt: String,
    pub context: String,
    /// Best sub-threshold Matrix row, if any, offered as grounding.
    pub hint: Option<MatchCandidate>,
}

/// Provider seam for generated answers. Implementations wrap whatever model
/// service the deployment uses.
#[async_trait]
pub trait GenerativeFallback: Send + Sync {
    async fn generate(&self, request: &FallbackRequest) -> Result<String>;
}

/// Answers without a model: tells the agent to escalate, pointing at the
/// closest Matrix row when there is one.
#[derive(Debug, Clone, Default)]
pub struct EscalationFallback;

#[async_trait]
impl GenerativeFallback for EscalationFallback {
    async fn generate(&self, request: &FallbackRequest) -> Result<String> {
        let mut answer = String::from(
            "No Service Matrix procedure matches this situation closely enough. \
             Escalate to a supervisor before committing to a resolution.",
        );

        if let Some(hint) = &request.hint {
            answer.push_str(&format!(
                "\n\nClosest Matrix entry ({} row {}): {}",
                hint.tab_name,
                hint.row_number(),
                hint.matched_text
            ));
        }

        Ok(answer)
    }
}
