//! Request analysis
//!
//! One language model call turns a raw request (plus recent conversation)
//! into an `Intent`. Failures are not retried here; the caller substitutes
//! `Intent::fallback`.

use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;

use super::context::RunContext;
use super::intent::{Complexity, Confidence, ConversationTurn, Intent, Role};
use crate::ai::{strip_code_fence, LanguageModel, ReasoningConfig};
use crate::collaborators::guarded;
use crate::constants::limits::MAX_OPEN_QUESTIONS;
use crate::error::OrchestrationError;

/// Reply schema. Everything is optional so a sloppy reply still parses.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct AnalysisReply {
    goal: String,
    trigger_type: Option<String>,
    actions_needed: Vec<String>,
    complexity: String,
    confidence: String,
    open_questions: Vec<String>,
}

pub struct RequestAnalyzer {
    model: Arc<dyn LanguageModel>,
    fast_mode: bool,
    history_turns: usize,
    timeout: Duration,
}

impl RequestAnalyzer {
    pub fn new(
        model: Arc<dyn LanguageModel>,
        fast_mode: bool,
        history_turns: usize,
        timeout: Duration,
    ) -> Self {
        Self {
            model,
            fast_mode,
            history_turns,
            timeout,
        }
    }

    pub async fn analyze(
        &self,
        request: &str,
        history: &[ConversationTurn],
        ctx: &RunContext,
    ) -> Result<Intent, OrchestrationError> {
        if request.trim().is_empty() {
            return Err(OrchestrationError::AnalysisFailed {
                reason: "empty request".to_string(),
            });
        }

        let prompt = self.build_prompt(request, history);
        let (reasoning, verbosity) = ReasoningConfig::for_analysis(self.fast_mode);
        let reply = guarded(
            "model",
            ctx.call_timeout(self.timeout),
            &ctx.cancel,
            self.model.complete(&prompt, reasoning, verbosity),
        )
        .await?;

        let intent = parse_intent(&reply, request)?;
        tracing::info!(
            run_id = %ctx.run_id,
            complexity = ?intent.complexity,
            confidence = ?intent.confidence,
            actions = intent.actions_needed.len(),
            has_trigger = intent.trigger_hint.is_some(),
            "Request analyzed"
        );
        Ok(intent)
    }

    fn build_prompt(&self, request: &str, history: &[ConversationTurn]) -> String {
        let mut prompt = String::from(
            "You analyze requests for a workflow automation platform. Flows start with one \
             trigger (an event in some app) followed by one or more actions (operations in \
             other apps). The platform's catalog lists every integration (piece), its \
             triggers and actions, and the input fields each one needs.\n\n\
             Work out what the user wants to automate:\n\
             1. The goal, in one sentence\n\
             2. The trigger that starts the flow, or \"unclear\"\n\
             3. The actions, in order\n\
             4. How complex the flow is and how confident you are\n\
             5. Up to three optional questions whose answers would sharpen the flow\n\n",
        );

        let start = history.len().saturating_sub(self.history_turns);
        let recent = &history[start..];
        if !recent.is_empty() {
            prompt.push_str("Recent conversation:\n");
            for turn in recent {
                let who = match turn.role {
                    Role::User => "User",
                    Role::Assistant => "Assistant",
                };
                prompt.push_str(&format!("{}: {}\n", who, turn.content.trim()));
            }
            prompt.push('\n');
        }

        prompt.push_str(&format!("Request: \"{}\"\n\n", request.trim()));
        prompt.push_str(
            "Reply with JSON only, in exactly this shape:\n\
             {\n  \"goal\": \"...\",\n  \"trigger_type\": \"App - Event\" or \"unclear\",\n  \
             \"actions_needed\": [\"...\"],\n  \"complexity\": \"simple|moderate|complex\",\n  \
             \"confidence\": \"high|medium|low\",\n  \"open_questions\": [\"...\"]\n}\n\n\
             Example for \"email me when a file lands in Google Drive\":\n\
             {\"goal\": \"Send an email when a new file is added to Google Drive\", \
             \"trigger_type\": \"Google Drive - New File\", \"actions_needed\": [\"Send Email\"], \
             \"complexity\": \"simple\", \"confidence\": \"high\", \"open_questions\": []}",
        );
        prompt
    }
}

/// Parse a model reply into an `Intent`, tolerating a ```json fence.
pub fn parse_intent(reply: &str, request: &str) -> Result<Intent, OrchestrationError> {
    let body = strip_code_fence(reply);
    let parsed: AnalysisReply =
        serde_json::from_str(body).map_err(|e| OrchestrationError::AnalysisFailed {
            reason: format!("unparseable analysis: {e}"),
        })?;

    let goal = match parsed.goal.trim() {
        "" => request.trim().to_string(),
        goal => goal.to_string(),
    };
    let trigger_hint = parsed
        .trigger_type
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty() && !t.eq_ignore_ascii_case("unclear"));
    let actions_needed = parsed
        .actions_needed
        .into_iter()
        .map(|a| a.trim().to_string())
        .filter(|a| !a.is_empty() && !a.to_ascii_lowercase().starts_with("unclear"))
        .collect();
    let open_questions = parsed
        .open_questions
        .into_iter()
        .map(|q| q.trim().to_string())
        .filter(|q| !q.is_empty())
        .take(MAX_OPEN_QUESTIONS)
        .collect();

    Ok(Intent {
        goal,
        trigger_hint,
        actions_needed,
        complexity: Complexity::from_label(&parsed.complexity),
        confidence: Confidence::from_label(&parsed.confidence),
        open_questions,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{run_context, FakeModel};
    use std::sync::atomic::Ordering;

    fn analyzer(model: Arc<FakeModel>) -> RequestAnalyzer {
        RequestAnalyzer::new(model, true, 2, Duration::from_secs(5))
    }

    #[test]
    fn parses_fenced_reply() {
        let reply = "```json\n{\"goal\": \"Notify on new record\", \"trigger_type\": \"Google Sheets - New Row\", \
                     \"actions_needed\": [\"Send Slack message\"], \"complexity\": \"simple\", \
                     \"confidence\": \"high\", \"open_questions\": []}\n```";
        let intent = parse_intent(reply, "req").unwrap();
        assert_eq!(intent.goal, "Notify on new record");
        assert_eq!(intent.trigger_hint.as_deref(), Some("Google Sheets - New Row"));
        assert_eq!(intent.actions_needed, vec!["Send Slack message"]);
        assert_eq!(intent.complexity, Complexity::Simple);
        assert_eq!(intent.confidence, Confidence::High);
    }

    #[test]
    fn drops_unclear_values_and_caps_questions() {
        let reply = r#"{"goal": "", "trigger_type": "Unclear",
            "actions_needed": ["unclear - depends on steps", "  ", "Create CRM contact"],
            "complexity": "enormous", "confidence": "",
            "open_questions": ["a?", "b?", "c?", "d?"]}"#;
        let intent = parse_intent(reply, "automate onboarding").unwrap();
        assert_eq!(intent.goal, "automate onboarding");
        assert_eq!(intent.trigger_hint, None);
        assert_eq!(intent.actions_needed, vec!["Create CRM contact"]);
        assert_eq!(intent.complexity, Complexity::Moderate);
        assert_eq!(intent.confidence, Confidence::Medium);
        assert_eq!(intent.open_questions.len(), 3);
    }

    #[test]
    fn rejects_non_json() {
        let err = parse_intent("Sure! Here's the analysis.", "x").unwrap_err();
        assert!(matches!(err, OrchestrationError::AnalysisFailed { .. }));
    }

    #[tokio::test]
    async fn single_model_call_with_recent_history() {
        let model = Arc::new(FakeModel::default().reply(
            r#"{"goal":"g","trigger_type":"Gmail - New Email","actions_needed":["Summarize"],"complexity":"moderate","confidence":"medium"}"#,
        ));
        let (ctx, _rx) = run_context();
        let history = vec![
            ConversationTurn::user("first question"),
            ConversationTurn::assistant("first answer"),
            ConversationTurn::user("use my work inbox"),
        ];

        let intent = analyzer(Arc::clone(&model))
            .analyze("summarize new emails", &history, &ctx)
            .await
            .unwrap();
        assert_eq!(intent.trigger_hint.as_deref(), Some("Gmail - New Email"));
        assert_eq!(model.complete_calls.load(Ordering::SeqCst), 1);

        let prompt = model.last_prompt().unwrap();
        assert!(prompt.contains("summarize new emails"));
        assert!(prompt.contains("use my work inbox"));
        assert!(!prompt.contains("first question"), "only the last turns are sent");
    }

    #[tokio::test]
    async fn model_failure_is_analysis_failed_without_retry() {
        let model = Arc::new(FakeModel::default().fail().reply("{}"));
        let (ctx, _rx) = run_context();

        let err = analyzer(Arc::clone(&model))
            .analyze("anything", &[], &ctx)
            .await
            .unwrap_err();
        assert!(matches!(err, OrchestrationError::AnalysisFailed { .. }));
        assert_eq!(model.complete_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn empty_request_skips_the_model() {
        let model = Arc::new(FakeModel::default());
        let (ctx, _rx) = run_context();
        assert!(analyzer(Arc::clone(&model)).analyze("  ", &[], &ctx).await.is_err());
        assert_eq!(model.complete_calls.load(Ordering::SeqCst), 0);
    }
}
