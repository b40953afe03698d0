//! Query classification
//!
//! Follow-up and informational detection sit behind a trait so the keyword
//! lists can be swapped for a smarter classifier without touching the engine.

/// Classifies queries for the coordination short-circuit rules and the
/// response assembler
pub trait QueryClassifier: Send + Sync {
    /// Whether the query is a short follow-up to a previous answer
    /// (affirmations, negations, ordinal references)
    fn is_follow_up(&self, query: &str) -> bool;

    /// Whether the query asks for information rather than action
    fn is_informational(&self, query: &str) -> bool;
}

/// Keyword-based classifier
///
/// Action keywords take precedence: a query containing any action keyword is
/// never classified informational, even when it also matches an
/// informational pattern.
pub struct KeywordClassifier {
    follow_up_phrases: Vec<&'static str>,
    informational_keywords: Vec<&'static str>,
    action_keywords: Vec<&'static str>,
}

impl Default for KeywordClassifier {
    fn default() -> Self {
        Self {
            follow_up_phrases: vec![
                "yes i do",
                "yes",
                "no",
                "that one",
                "the first",
                "the second",
                "re run",
                "point 1",
            ],
            informational_keywords: vec![
                "what is",
                "what are",
                "what was",
                "what will",
                "how is",
                "how are",
                "how was",
                "how will",
                "show me",
                "tell me",
                "explain",
                "describe",
                "list",
                "give me",
                "provide",
            ],
            action_keywords: vec![
                "optimize",
                "fix",
                "improve",
                "why is",
                "why are",
                "what's wrong",
                "what went wrong",
                "issue",
                "problem",
                "recommend",
                "suggest",
                "should",
                "need to",
            ],
        }
    }
}

impl QueryClassifier for KeywordClassifier {
    fn is_follow_up(&self, query: &str) -> bool {
        let query = query.to_lowercase();
        self.follow_up_phrases
            .iter()
            .any(|phrase| query.contains(phrase))
    }

    fn is_informational(&self, query: &str) -> bool {
        let query = query.to_lowercase();
        if self
            .action_keywords
            .iter()
            .any(|keyword| query.contains(keyword))
        {
            return false;
        }
        self.informational_keywords
            .iter()
            .any(|keyword| query.contains(keyword))
    }
}
