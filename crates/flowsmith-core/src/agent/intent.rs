//! Request intent and component queries
//!
//! `Intent` is what the analyzer extracts from a request; `ComponentQuery`
//! is the unit the resolver looks up. Query derivation (search-term
//! candidates, AI utility preference) lives here so planner and resolver
//! agree on it.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Complexity {
    Simple,
    Moderate,
    Complex,
}

impl Complexity {
    /// Lenient parse; unknown labels are `Moderate`.
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_ascii_lowercase().as_str() {
            "simple" => Self::Simple,
            "complex" => Self::Complex,
            _ => Self::Moderate,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Simple => "simple",
            Self::Moderate => "moderate",
            Self::Complex => "complex",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    Low,
    Medium,
    High,
}

impl Confidence {
    /// Lenient parse; unknown labels are `Medium`.
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_ascii_lowercase().as_str() {
            "low" => Self::Low,
            "high" => Self::High,
            _ => Self::Medium,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: Role,
    pub content: String,
}

impl ConversationTurn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Structured reading of one request. Never mutated after analysis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Intent {
    pub goal: String,
    pub trigger_hint: Option<String>,
    pub actions_needed: Vec<String>,
    pub complexity: Complexity,
    pub confidence: Confidence,
    /// At most three; answering them is optional
    pub open_questions: Vec<String>,
}

impl Intent {
    /// Default used when analysis fails: the whole request as one topic.
    pub fn fallback(request: &str) -> Self {
        Self {
            goal: request.trim().to_string(),
            trigger_hint: None,
            actions_needed: Vec::new(),
            complexity: Complexity::Simple,
            confidence: Confidence::Low,
            open_questions: Vec::new(),
        }
    }

    /// Simple and analysed with high confidence.
    pub fn is_straightforward(&self) -> bool {
        self.complexity == Complexity::Simple && self.confidence == Confidence::High
    }

    /// Component queries in flow order: trigger, then actions. An intent
    /// with neither becomes a single topic query over the goal.
    pub fn queries(&self) -> Vec<ComponentQuery> {
        let mut queries = Vec::with_capacity(self.actions_needed.len() + 1);
        if let Some(trigger) = &self.trigger_hint {
            queries.push(ComponentQuery::trigger(trigger));
        }
        queries.extend(self.actions_needed.iter().map(|a| ComponentQuery::action(a)));
        if queries.is_empty() && !self.goal.trim().is_empty() {
            queries.push(ComponentQuery::topic(&self.goal));
        }
        queries
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryKind {
    Trigger,
    Action,
    Topic,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentQuery {
    pub kind: QueryKind,
    /// Most specific first
    pub search_terms: Vec<String>,
    /// A piece without a matching operation is an acceptable answer
    pub accept_alternatives: bool,
    pub description: String,
}

impl ComponentQuery {
    pub fn trigger(description: &str) -> Self {
        Self {
            kind: QueryKind::Trigger,
            search_terms: search_terms(description),
            accept_alternatives: false,
            description: description.trim().to_string(),
        }
    }

    /// Action query. AI tasks get the matching AI utility operation as
    /// their most specific term.
    pub fn action(description: &str) -> Self {
        let mut terms = search_terms(description);
        if let Some(task) = AiTask::detect(description) {
            let preferred = task.operation().to_string();
            terms.retain(|t| !t.eq_ignore_ascii_case(&preferred));
            terms.insert(0, preferred);
        }
        Self {
            kind: QueryKind::Action,
            search_terms: terms,
            accept_alternatives: true,
            description: description.trim().to_string(),
        }
    }

    pub fn topic(description: &str) -> Self {
        Self {
            kind: QueryKind::Topic,
            search_terms: search_terms(description),
            accept_alternatives: true,
            description: description.trim().to_string(),
        }
    }

    pub fn primary_term(&self) -> &str {
        self.search_terms
            .first()
            .map(String::as_str)
            .unwrap_or(self.description.as_str())
    }
}

/// Candidate search phrases for a component description: the full text,
/// the tail after a connector ("via", "using", "with", "for"), then the
/// first and last three words. Order-preserving and deduplicated.
pub fn search_terms(text: &str) -> Vec<String> {
    let base = text.trim();
    if base.is_empty() {
        return Vec::new();
    }

    let lower = base.to_lowercase();
    let mut candidates = vec![base.to_string()];

    for sep in [" via ", " using ", " with ", " for "] {
        if let Some(tail) = lower.rsplit(sep).next().filter(|_| lower.contains(sep)) {
            candidates.push(tail.trim().to_string());
        }
    }

    let words: Vec<&str> = base
        .split_whitespace()
        .map(|w| w.trim_matches(|c| matches!(c, ',' | '.' | ';' | ':')))
        .filter(|w| !w.is_empty())
        .collect();
    if words.len() >= 2 {
        candidates.push(words[..words.len().min(3)].join(" "));
        candidates.push(words[words.len().saturating_sub(3)..].join(" "));
    }

    let mut ordered: Vec<String> = Vec::with_capacity(candidates.len());
    for candidate in candidates {
        let candidate = candidate.trim();
        if candidate.is_empty() || ordered.iter().any(|c| c == candidate) {
            continue;
        }
        ordered.push(candidate.to_string());
    }
    ordered
}

/// AI tasks with a native utility operation in the catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AiTask {
    Image,
    Video,
    Structured,
    Moderation,
    Classification,
    Summary,
    Text,
}

impl AiTask {
    const IMAGE: &'static [&'static str] =
        &["image", "logo", "banner", "graphic", "picture", "thumbnail"];
    const VIDEO: &'static [&'static str] = &["video", "clip", "animation", "reel", "promo"];
    const STRUCTURED: &'static [&'static str] = &[
        "extract",
        "structured",
        "json",
        "schema",
        "fields",
        "parse",
        "table",
        "invoice",
    ];
    const MODERATION: &'static [&'static str] = &["moderation", "moderate", "flag", "inappropriate"];
    const CLASSIFICATION: &'static [&'static str] = &["classify", "categorize", "category", "label"];
    const SUMMARY: &'static [&'static str] = &["summarize", "summarise", "summary", "tl;dr", "compress"];
    const TEXT: &'static [&'static str] = &[
        "ask", "answer", "write", "generate", "draft", "translate", "sentiment", "analysis",
        "respond", "reply", "describe", "explain", "gpt", "gpt-4", "gpt4", "gpt-5", "gpt5",
        "chatgpt", "openai", "claude", "gemini", "sonnet", "anthropic",
    ];

    /// First matching category wins; order matters ("generate image" is Image).
    pub fn detect(text: &str) -> Option<Self> {
        let lower = text.to_lowercase();
        let words: Vec<&str> = lower
            .split(|c: char| !(c.is_alphanumeric() || c == '-' || c == ';'))
            .filter(|w| !w.is_empty())
            .collect();
        let hit = |keywords: &[&str]| {
            keywords.iter().any(|k| {
                words.iter().any(|w| {
                    w.strip_prefix(k)
                        .is_some_and(|rest| matches!(rest, "" | "s" | "es" | "d" | "ed"))
                })
            })
        };

        [
            (Self::IMAGE, Self::Image),
            (Self::VIDEO, Self::Video),
            (Self::STRUCTURED, Self::Structured),
            (Self::MODERATION, Self::Moderation),
            (Self::CLASSIFICATION, Self::Classification),
            (Self::SUMMARY, Self::Summary),
            (Self::TEXT, Self::Text),
        ]
        .into_iter()
        .find_map(|(keywords, task)| hit(keywords).then_some(task))
    }

    pub fn operation(self) -> &'static str {
        match self {
            Self::Image => "Generate Image",
            Self::Video => "Generate Video",
            Self::Structured => "Extract Structured Data",
            Self::Moderation => "Check Moderation",
            Self::Classification => "Classify Text",
            Self::Summary => "Summarize Text",
            Self::Text => "Ask AI",
        }
    }

    pub fn piece(self) -> &'static str {
        match self {
            Self::Image => "Image AI",
            Self::Video => "Video AI",
            Self::Structured | Self::Moderation | Self::Classification => "Utility AI",
            Self::Summary | Self::Text => "Text AI",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn search_terms_split_on_connectors() {
        let terms = search_terms("Send notification via Slack");
        assert_eq!(
            terms,
            vec![
                "Send notification via Slack",
                "slack",
                "Send notification via",
                "notification via Slack",
            ]
        );
    }

    #[test]
    fn search_terms_single_word() {
        assert_eq!(search_terms("  Gmail "), vec!["Gmail"]);
        assert!(search_terms("   ").is_empty());
    }

    #[test]
    fn ai_tasks_detected_in_priority_order() {
        assert_eq!(AiTask::detect("generate a banner image"), Some(AiTask::Image));
        assert_eq!(
            AiTask::detect("Extract invoice totals"),
            Some(AiTask::Structured)
        );
        assert_eq!(AiTask::detect("summarize the email"), Some(AiTask::Summary));
        assert_eq!(AiTask::detect("Draft a reply with GPT"), Some(AiTask::Text));
        assert_eq!(AiTask::detect("send chat message"), None);
        assert_eq!(AiTask::detect("promote the post"), None);
        assert_eq!(AiTask::detect("add row to spreadsheet"), None);
        assert_eq!(AiTask::detect("create a task"), None);
    }

    #[test]
    fn action_query_prefers_ai_utility() {
        let q = ComponentQuery::action("summarize incoming emails");
        assert_eq!(q.primary_term(), "Summarize Text");
        assert_eq!(q.search_terms[1], "summarize incoming emails");
        assert!(q.accept_alternatives);
    }

    #[test]
    fn trigger_queries_are_strict() {
        let q = ComponentQuery::trigger("new row in Google Sheets");
        assert_eq!(q.kind, QueryKind::Trigger);
        assert!(!q.accept_alternatives);
        assert_eq!(q.primary_term(), "new row in Google Sheets");
    }

    #[test]
    fn intent_queries_trigger_first() {
        let intent = Intent {
            goal: "notify on new record".into(),
            trigger_hint: Some("spreadsheet row added".into()),
            actions_needed: vec!["send chat message".into()],
            complexity: Complexity::Simple,
            confidence: Confidence::High,
            open_questions: vec![],
        };
        let queries = intent.queries();
        assert_eq!(queries.len(), 2);
        assert_eq!(queries[0].kind, QueryKind::Trigger);
        assert_eq!(queries[1].kind, QueryKind::Action);
        assert!(intent.is_straightforward());
    }

    #[test]
    fn fallback_intent_is_a_topic() {
        let intent = Intent::fallback("  does slack support threads? ");
        assert_eq!(intent.complexity, Complexity::Simple);
        assert_eq!(intent.confidence, Confidence::Low);
        let queries = intent.queries();
        assert_eq!(queries.len(), 1);
        assert_eq!(queries[0].kind, QueryKind::Topic);
        assert_eq!(queries[0].description, "does slack support threads?");
    }

    #[test]
    fn labels_parse_leniently() {
        assert_eq!(Complexity::from_label("COMPLEX"), Complexity::Complex);
        assert_eq!(Complexity::from_label("huge"), Complexity::Moderate);
        assert_eq!(Confidence::from_label(" high "), Confidence::High);
        assert_eq!(Confidence::from_label(""), Confidence::Medium);
    }
}
