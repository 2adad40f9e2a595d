//! Blocker classification.

use async_trait::async_trait;
use regex::Regex;
use tracing::debug;
use unblock_core::{BlockerSignal, BlockerType, Severity};
use super::AdapterError;

/// What a classifier concluded about a signal.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Classification {
    /// Category
    pub blocker_type: BlockerType,
    /// Initial severity
    pub severity: Severity,
    /// Confidence in `[0, 1]`
    pub confidence: f64,
}

/// Assigns a type and a severity seed to a raw signal.
#[async_trait]
pub trait Classifier: Send + Sync {
    /// Classify one signal.
    async fn classify(&self, signal: &BlockerSignal) -> Result<Classification, AdapterError>;
}

const TYPE_KEYWORDS: [(BlockerType, &[&str]); 5] = [
    (
        BlockerType::Dependency,
        &[
            "waiting for", "waiting on", "blocked by", "depends on", "need from",
            "upstream", "pending approval", "awaiting",
        ],
    ),
    (
        BlockerType::Resource,
        &[
            "no access", "access", "permission", "credentials", "license", "budget",
            "hardware", "capacity", "headcount", "environment",
        ],
    ),
    (
        BlockerType::Technical,
        &[
            "bug", "error", "crash", "failing", "broken", "build", "migration",
            "deploy", "pipeline", "timeout",
        ],
    ),
    (
        BlockerType::Knowledge,
        &[
            "don't know", "not sure", "how to", "unclear", "documentation",
            "no docs", "who knows", "expertise",
        ],
    ),
    (
        BlockerType::Organizational,
        &[
            "priority", "decision", "conflict", "ownership", "alignment",
            "policy", "process", "reorg",
        ],
    ),
];

const SEVERITY_KEYWORDS: [(Severity, &[&str]); 4] = [
    (Severity::Critical, &["critical", "urgent", "emergency", "showstopper", "deadline today"]),
    (Severity::High, &["high priority", "important", "asap", "deadline tomorrow", "release blocker"]),
    (Severity::Medium, &["medium", "soon", "this week"]),
    (Severity::Low, &["low", "minor", "nice to have", "when possible"]),
];

fn compile(words: &[&str]) -> Vec<Regex> {
    words
        .iter()
        .filter_map(|w| Regex::new(&format!(r"(?i)\b{}\b", regex::escape(w))).ok())
        .collect()
}

/// Keyword classifier.
///
/// Picks the type with the most keyword hits; confidence grows with the
/// hit count relative to the size of that type's vocabulary.
pub struct KeywordClassifier {
    types: Vec<(BlockerType, Vec<Regex>)>,
    severities: Vec<(Severity, Vec<Regex>)>,
}

impl KeywordClassifier {
    /// Build the default vocabulary.
    pub fn new() -> Self {
        Self {
            types: TYPE_KEYWORDS.iter().map(|(t, w)| (*t, compile(w))).collect(),
            severities: SEVERITY_KEYWORDS.iter().map(|(s, w)| (*s, compile(w))).collect(),
        }
    }

    fn severity_seed(&self, text: &str) -> Severity {
        self.severities
            .iter()
            .find(|(_, patterns)| patterns.iter().any(|p| p.is_match(text)))
            .map(|(s, _)| *s)
            .unwrap_or(Severity::Medium)
    }
}

impl Default for KeywordClassifier {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Classifier for KeywordClassifier {
    async fn classify(&self, signal: &BlockerSignal) -> Result<Classification, AdapterError> {
        let text = signal.description();

        // Ties go to the earlier type
        let mut best: Option<(BlockerType, usize, usize)> = None;
        for (blocker_type, patterns) in &self.types {
            let hits = patterns.iter().filter(|p| p.is_match(text)).count();
            if hits > 0 && best.map_or(true, |(_, h, _)| hits > h) {
                best = Some((*blocker_type, hits, patterns.len()));
            }
        }

        let severity = self.severity_seed(text);
        let classification = match best {
            Some((blocker_type, hits, vocabulary)) => {
                let denominator = (0.3 * vocabulary as f64).max(1.0);
                Classification {
                    blocker_type,
                    severity,
                    confidence: (hits as f64 / denominator).min(1.0),
                }
            }
            None => Classification {
                blocker_type: BlockerType::Organizational,
                severity,
                confidence: 0.0,
            },
        };
        debug!(
            blocker_type = classification.blocker_type.as_str(),
            severity = classification.severity.as_str(),
            confidence = classification.confidence,
            "Keyword classification"
        );
        Ok(classification)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use unblock_core::SourceKind;

    async fn classify(text: &str) -> Classification {
        let signal = BlockerSignal::new(SourceKind::Report, "ann", text, Utc::now());
        KeywordClassifier::new().classify(&signal).await.unwrap()
    }

    #[tokio::test]
    async fn test_dependency_keywords() {
        let c = classify("Blocked by the platform team, waiting on their API").await;
        assert_eq!(c.blocker_type, BlockerType::Dependency);
        assert!(c.confidence > 0.5);
        assert_eq!(c.severity, Severity::Medium);
    }

    #[tokio::test]
    async fn test_severity_keywords() {
        assert_eq!(classify("urgent: build is broken").await.severity, Severity::Critical);
        assert_eq!(classify("need credentials asap").await.severity, Severity::High);
        assert_eq!(classify("minor documentation gap").await.severity, Severity::Low);
    }

    #[tokio::test]
    async fn test_no_hits_is_zero_confidence() {
        let c = classify("something feels off").await;
        assert_eq!(c.blocker_type, BlockerType::Organizational);
        assert_eq!(c.confidence, 0.0);
    }

    #[tokio::test]
    async fn test_match_is_case_insensitive_and_word_bound() {
        let c = classify("The BUILD keeps CRASHING with an Error").await;
        assert_eq!(c.blocker_type, BlockerType::Technical);
        // "crashing" is not the word "crash"
        assert!((c.confidence - 2.0 / 3.0).abs() < 1e-9);
    }
}
