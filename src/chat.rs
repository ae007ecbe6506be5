use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use regex::Regex;
use tokio::sync::Semaphore;

use crate::config::AppConfig;
use crate::fallback::{FallbackRequest, GenerativeFallback};
use crate::matrix::{self, detect_header_row, is_absent, normalize};
use crate::models::{
    AnswerMode, ChatAnswer, ChatRequest, Citation, MatchCandidate, MatrixDocument,
    REMEDY_COLUMN,
};
use crate::rules::MatchRules;
use crate::store::{MatrixSnapshot, MatrixStore};

const EMPTY_QUESTION_MESSAGE: &str = "Describe the guest situation to look up a procedure.";
const FALLBACK_FAILED_MESSAGE: &str = "No answer could be generated for this situation. \
     Escalate to a supervisor and follow the Service Matrix manually.";

#[derive(Clone)]
pub struct ChatService {
    config: AppConfig,
    store: MatrixStore,
    rules: Arc<MatchRules>,
    fallback: Arc<dyn GenerativeFallback>,
    generation_limit: Arc<Semaphore>,
}

impl ChatService {
    pub fn new(
        config: AppConfig,
        store: MatrixStore,
        rules: Arc<MatchRules>,
        fallback: Arc<dyn GenerativeFallback>,
        generation_limit: Arc<Semaphore>,
    ) -> Self {
        Self {
            config,
            store,
            rules,
            fallback,
            generation_limit,
        }
    }

    pub fn store(&self) -> &MatrixStore {
        &self.store
    }

    pub async fn answer(&self, request: ChatRequest) -> Result<ChatAnswer> {
        let started = Instant::now();
        let question = request.question.trim();

        if normalize(question).is_empty() {
            return Ok(ChatAnswer {
                answer_markdown: EMPTY_QUESTION_MESSAGE.to_string(),
                citations: vec![],
                mode: AnswerMode::NotFound,
                match_score: None,
                latency_ms: started.elapsed().as_millis(),
            });
        }

        let snapshot = self.store.snapshot().await;
        let candidate = matrix::search(&snapshot.document, question, &self.rules);

        if let Some(direct) = candidate
            .as_ref()
            .filter(|candidate| is_direct_match(candidate, self.config.matrix.direct_threshold))
        {
            tracing::info!(
                score = direct.score,
                tab = %direct.tab_name,
                row = direct.row_number(),
                "answered from service matrix"
            );
            return Ok(ChatAnswer {
                answer_markdown: direct.answer_text.clone(),
                citations: vec![citation_for(direct)],
                mode: AnswerMode::MatrixDirect,
                match_score: Some(direct.score),
                latency_ms: started.elapsed().as_millis(),
            });
        }

        let context = build_context(
            &snapshot,
            candidate.as_ref(),
            &self.rules,
            self.config.fallback.max_context_chars,
        );
        let fallback_request = FallbackRequest {
            question: question.to_string(),
            prompt: build_answer_prompt(question, &context),
            context,
            hint: candidate.clone(),
        };

        let answer_text = {
            let _permit = self.generation_limit.acquire().await?;
            match self.fallback.generate(&fallback_request).await {
                Ok(text) => sanitize_model_output(text),
                Err(err) => {
                    tracing::warn!("generative fallback failed: {err:#}");
                    String::new()
                }
            }
        };
        let answer_text = if answer_text.is_empty() {
            FALLBACK_FAILED_MESSAGE.to_string()
        } else {
            answer_text
        };

        Ok(ChatAnswer {
            answer_markdown: answer_text,
            citations: candidate.iter().map(citation_for).collect(),
            mode: AnswerMode::Generative,
            match_score: candidate.as_ref().map(|candidate| candidate.score),
            latency_ms: started.elapsed().as_millis(),
        })
    }
}

pub fn is_direct_match(candidate: &MatchCandidate, threshold: u8) -> bool {
    candidate.score >= threshold
}

fn citation_for(candidate: &MatchCandidate) -> Citation {
    Citation {
        tab_name: candidate.tab_name.clone(),
        row_number: candidate.row_number(),
        concern_column: column_letter(candidate.column_index),
        remedy_column: column_letter(REMEDY_COLUMN),
        snippet: candidate.matched_text.clone(),
        score: candidate.score,
    }
}

/// Spreadsheet column name for a 0-based index (0 → A, 26 → AA).
pub fn column_letter(index: usize) -> String {
    let mut letters = Vec::new();
    let mut n = index + 1;
    while n > 0 {
        let rem = (n - 1) % 26;
        letters.push(char::from(b'A' + rem as u8));
        n = (n - 1) / 26;
    }
    letters.iter().rev().collect()
}

fn build_context(
    snapshot: &MatrixSnapshot,
    hint: Option<&MatchCandidate>,
    rules: &MatchRules,
    max_chars: usize,
) -> String {
    let mut sections = Vec::new();

    if let Some(hint) = hint {
        sections.push(format!(
            "# Closest Service Matrix entry\n[{} r{}] {}: {}",
            hint.tab_name,
            hint.row_number(),
            hint.matched_text,
            single_line(&hint.answer_text)
        ));
    }

    let digest = matrix_digest(&snapshot.document, rules);
    if !digest.is_empty() {
        sections.push(format!("# Service Matrix\n{digest}"));
    }

    for guide in &snapshot.guides {
        sections.push(format!("# Guide: {}\n{}", guide.name, guide.content));
    }

    truncate_chars(&sections.join("\n\n"), max_chars)
}

/// One line per Matrix row that carries a remedy, header rows excluded.
fn matrix_digest(document: &MatrixDocument, rules: &MatchRules) -> String {
    let mut lines = Vec::new();

    for (tab_name, sheet) in document.tabs() {
        let header_index = detect_header_row(sheet.rows(), rules);
        for (row_index, row) in sheet.rows().iter().enumerate() {
            if Some(row_index) == header_index {
                continue;
            }
            let Some((_, concern)) = row.concern_cell() else {
                continue;
            };
            let Some(remedy) = row.remedy_cell().filter(|remedy| !is_absent(remedy)) else {
                continue;
            };
            if normalize(concern).is_empty() {
                continue;
            }

            lines.push(format!(
                "[{} r{}] {}: {}",
                tab_name,
                row_index + 1,
                single_line(concern),
                single_line(remedy)
            ));
        }
    }

    lines.join("\n")
}

fn build_answer_prompt(question: &str, context: &str) -> String {
    format!(
        "You are a call-center compliance assistant for hotel guest services.\n\
         Rules:\n\
         - Answer only from the reference material below.\n\
         - When a Service Matrix entry applies, repeat its procedure exactly and cite it like [Billing r12].\n\
         - Never promise refunds, credits or exceptions the material does not state.\n\
         - If the material does not cover the situation, say so and advise escalating to a supervisor.\n\n\
         Agent question:\n{question}\n\n\
         Reference material:\n{context}\n"
    )
}

fn sanitize_model_output(answer: String) -> String {
    let mut text = answer.trim().to_string();
    if text.starts_with("```") {
        let fenced = Regex::new(r"(?s)^```[a-zA-Z]*\n(.*)\n```$").ok();
        match fenced.as_ref().and_then(|re| re.captures(&text)) {
            Some(caps) => {
                text = caps
                    .get(1)
                    .map(|body| body.as_str().trim().to_string())
                    .unwrap_or_default();
            }
            None => text = text.replace("```", "").trim().to_string(),
        }
    }
    text
}

fn single_line(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((byte_index, _)) => text[..byte_index].to_string(),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;
    use crate::models::{ReferenceDoc, Row, Sheet};

    #[derive(Default)]
    struct RecordingFallback {
        requests: Mutex<Vec<FallbackRequest>>,
    }

    #[async_trait]
    impl GenerativeFallback for RecordingFallback {
        async fn generate(&self, request: &FallbackRequest) -> Result<String> {
            self.requests.lock().unwrap().push(request.clone());
            Ok("```markdown\nFollow the pet policy [Policies r3].\n```".to_string())
        }
    }

    struct FailingFallback;

    #[async_trait]
    impl GenerativeFallback for FailingFallback {
        async fn generate(&self, _request: &FallbackRequest) -> Result<String> {
            anyhow::bail!("provider offline")
        }
    }

    fn document() -> MatrixDocument {
        MatrixDocument::new().with_tab(
            "Billing",
            Sheet::new(vec![
                Row::new(["#", "Concern", "Instructions", "Slack", "Refund Queue"]),
                Row::new([
                    "1",
                    "Guest was double charged",
                    "Issue refund via Billing Queue",
                    "Yes",
                    "No",
                ]),
                Row::new(["2", "Noise from construction", "Offer room move", "", ""]),
            ]),
        )
    }

    fn service(
        fallback: Arc<dyn GenerativeFallback>,
        threshold: u8,
    ) -> ChatService {
        let mut config = AppConfig::default();
        config.matrix.direct_threshold = threshold;
        let snapshot = MatrixSnapshot::in_memory(
            document(),
            vec![ReferenceDoc {
                name: "qa_rubric.md".to_string(),
                content: "Apologize once, then state the procedure.".to_string(),
            }],
        );
        ChatService::new(
            config,
            MatrixStore::from_snapshot(snapshot),
            Arc::new(MatchRules::default()),
            fallback,
            Arc::new(Semaphore::new(1)),
        )
    }

    fn ask(question: &str) -> ChatRequest {
        ChatRequest {
            question: question.to_string(),
        }
    }

    #[tokio::test]
    async fn confident_match_bypasses_fallback() {
        let fallback = Arc::new(RecordingFallback::default());
        let chat = service(fallback.clone(), 70);

        let answer = chat.answer(ask("Guest was double charged.")).await.unwrap();

        assert_eq!(answer.mode, AnswerMode::MatrixDirect);
        assert_eq!(answer.match_score, Some(100));
        assert_eq!(
            answer.answer_markdown,
            "Issue refund via Billing Queue\n\nSlack: Yes"
        );
        assert_eq!(answer.citations.len(), 1);
        assert_eq!(answer.citations[0].tab_name, "Billing");
        assert_eq!(answer.citations[0].row_number, 2);
        assert_eq!(answer.citations[0].concern_column, "B");
        assert_eq!(answer.citations[0].remedy_column, "C");
        assert!(fallback.requests.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn weak_match_goes_to_fallback_with_hint() {
        let fallback = Arc::new(RecordingFallback::default());
        let chat = service(fallback.clone(), 70);

        let answer = chat.answer(ask("noise complaint")).await.unwrap();

        assert_eq!(answer.mode, AnswerMode::Generative);
        assert_eq!(answer.match_score, Some(55));
        assert_eq!(answer.answer_markdown, "Follow the pet policy [Policies r3].");
        assert_eq!(answer.citations[0].row_number, 3);

        let requests = fallback.requests.lock().unwrap();
        assert_eq!(requests.len(), 1);
        let request = &requests[0];
        assert_eq!(request.question, "noise complaint");
        assert_eq!(request.hint.as_ref().map(|hint| hint.score), Some(55));
        assert!(request.context.starts_with("# Closest Service Matrix entry"));
        assert!(request
            .context
            .contains("[Billing r2] Guest was double charged: Issue refund via Billing Queue"));
        assert!(!request.context.contains("[Billing r1]"));
        assert!(request.context.contains("# Guide: qa_rubric.md"));
        assert!(request.prompt.contains("Agent question:\nnoise complaint"));
    }

    #[tokio::test]
    async fn lower_threshold_serves_weak_match_directly() {
        let fallback = Arc::new(RecordingFallback::default());
        let chat = service(fallback.clone(), 50);

        let answer = chat.answer(ask("noise complaint")).await.unwrap();
        assert_eq!(answer.mode, AnswerMode::MatrixDirect);
        assert_eq!(answer.answer_markdown, "Offer room move");
    }

    #[tokio::test]
    async fn no_candidate_still_reaches_fallback() {
        let fallback = Arc::new(RecordingFallback::default());
        let chat = service(fallback.clone(), 70);

        let answer = chat.answer(ask("can pets stay overnight")).await.unwrap();
        assert_eq!(answer.mode, AnswerMode::Generative);
        assert!(answer.citations.is_empty());
        assert_eq!(answer.match_score, None);
        assert!(fallback.requests.lock().unwrap()[0].hint.is_none());
    }

    #[tokio::test]
    async fn empty_question_is_not_searched() {
        let fallback = Arc::new(RecordingFallback::default());
        let chat = service(fallback.clone(), 70);

        let answer = chat.answer(ask("  ?? ")).await.unwrap();
        assert_eq!(answer.mode, AnswerMode::NotFound);
        assert_eq!(answer.answer_markdown, EMPTY_QUESTION_MESSAGE);
        assert!(fallback.requests.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn fallback_failure_returns_escalation_message() {
        let chat = service(Arc::new(FailingFallback), 70);

        let answer = chat.answer(ask("can pets stay overnight")).await.unwrap();
        assert_eq!(answer.mode, AnswerMode::Generative);
        assert_eq!(answer.answer_markdown, FALLBACK_FAILED_MESSAGE);
    }

    #[test]
    fn column_letters_follow_spreadsheet_naming() {
        assert_eq!(column_letter(0), "A");
        assert_eq!(column_letter(1), "B");
        assert_eq!(column_letter(25), "Z");
        assert_eq!(column_letter(26), "AA");
        assert_eq!(column_letter(27), "AB");
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        assert_eq!(truncate_chars("crème brûlée", 5), "crème");
        assert_eq!(truncate_chars("short", 50), "short");
    }

    #[test]
    fn strips_markdown_fences() {
        let input = "```markdown\nHello world\n```".to_string();
        assert_eq!(sanitize_model_output(input), "Hello world");
        assert_eq!(sanitize_model_output("```oops".to_string()), "oops");
    }
}
