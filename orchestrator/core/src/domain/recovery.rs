// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Recovery Domain Model
//!
//! Failure taxonomy, recovery strategies and the audit value objects written
//! for every recovery decision. Also hosts the pluggable failure classifier
//! and its default keyword heuristic.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Pure classification and bookkeeping; no I/O

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::LazyLock;

use crate::domain::phase::PhaseId;
use crate::domain::runtime::PhaseFailure;

// ============================================================================
// Value Objects: Taxonomy
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailureClass {
    TransientInfra,
    MissingDependency,
    LogicError,
    ResourceExhausted,
    Unknown,
}

impl FailureClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureClass::TransientInfra => "transient-infra",
            FailureClass::MissingDependency => "missing-dependency",
            FailureClass::LogicError => "logic-error",
            FailureClass::ResourceExhausted => "resource-exhausted",
            FailureClass::Unknown => "unknown",
        }
    }

    /// Strategy applied when the classification is confident enough.
    pub fn default_strategy(&self) -> RecoveryStrategy {
        match self {
            FailureClass::TransientInfra => RecoveryStrategy::RetryWithBackoff,
            FailureClass::MissingDependency => RecoveryStrategy::InstallDependency,
            FailureClass::LogicError => RecoveryStrategy::AlternateApproach,
            FailureClass::ResourceExhausted => RecoveryStrategy::SimplifyTask,
            FailureClass::Unknown => RecoveryStrategy::RequestHelp,
        }
    }
}

impl fmt::Display for FailureClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RecoveryStrategy {
    RetryWithBackoff,
    InstallDependency,
    AlternateApproach,
    SimplifyTask,
    RequestHelp,
    Escalate,
}

impl RecoveryStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecoveryStrategy::RetryWithBackoff => "retry-with-backoff",
            RecoveryStrategy::InstallDependency => "install-dependency",
            RecoveryStrategy::AlternateApproach => "alternate-approach",
            RecoveryStrategy::SimplifyTask => "simplify-task",
            RecoveryStrategy::RequestHelp => "request-help",
            RecoveryStrategy::Escalate => "escalate",
        }
    }
}

impl fmt::Display for RecoveryStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of classifying one failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    pub class: FailureClass,
    /// Always within `[0, 1]`.
    pub confidence: f64,
    /// Name of the missing dependency, when one could be extracted.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dependency: Option<String>,
}

impl Classification {
    pub fn new(class: FailureClass, confidence: f64) -> Self {
        Self {
            class,
            confidence: clamp_confidence(confidence),
            dependency: None,
        }
    }

    pub fn with_dependency(mut self, dependency: Option<String>) -> Self {
        self.dependency = dependency;
        self
    }
}

fn clamp_confidence(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

/// How a previously applied strategy turned out.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PastOutcome {
    pub class: FailureClass,
    pub strategy: RecoveryStrategy,
    pub succeeded: bool,
}

// ============================================================================
// Value Objects: Audit
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptOutcome {
    /// The phase was put back into the schedule.
    RetryScheduled,
    Escalated,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum EscalationReason {
    PhaseBudgetExhausted { attempts: u32, max: u32 },
    TaskBudgetExhausted { attempts: u32, max: u32 },
    NoHelpAvailable,
    RecoveryActionFailed { detail: String },
}

impl fmt::Display for EscalationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EscalationReason::PhaseBudgetExhausted { attempts, max } => {
                write!(f, "phase failed {} time(s), budget is {}", attempts, max)
            }
            EscalationReason::TaskBudgetExhausted { attempts, max } => {
                write!(f, "task used {} recovery attempt(s), budget is {}", attempts, max)
            }
            EscalationReason::NoHelpAvailable => write!(f, "no sibling agent offered help"),
            EscalationReason::RecoveryActionFailed { detail } => {
                write!(f, "recovery action failed: {}", detail)
            }
        }
    }
}

/// One recovery decision, appended to the execution record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecoveryAttempt {
    pub phase_id: PhaseId,
    /// Failure count of the phase when the decision was taken.
    pub attempt: u32,
    pub classification: FailureClass,
    pub strategy: RecoveryStrategy,
    pub confidence: f64,
    pub outcome: AttemptOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub escalation: Option<EscalationReason>,
    pub error: String,
    pub at: DateTime<Utc>,
}

// ============================================================================
// Domain Service: Classification
// ============================================================================

/// Scores a phase failure against the taxonomy.
///
/// Contract: implementations are pure and deterministic for the same input,
/// never fail (an unrecognized failure is `FailureClass::Unknown`), and return
/// a confidence within `[0, 1]`. `history` holds outcomes of earlier
/// recoveries in this task and in similar past runs; implementations may use
/// it to raise or lower confidence.
pub trait FailureClassifier: Send + Sync {
    fn classify(&self, failure: &PhaseFailure, history: &[PastOutcome]) -> Classification;
}

/// Keyword heuristic blended with historical success rates.
///
/// - explicit kind hint from the execution environment: 0.9
/// - keywords of exactly one class: 0.8
/// - keywords of several classes: 0.55, first class in priority order
/// - nothing recognized: `unknown` at 0.2
///
/// When `history` holds outcomes for the chosen class and its default
/// strategy, the confidence becomes `0.7 * c + 0.3 * success_rate`, moved at
/// most [`MAX_HISTORY_SHIFT`] away from `c`. Keywords of four characters or
/// fewer only match whole words.
#[derive(Debug, Clone, Default)]
pub struct HeuristicClassifier;

const HINT_CONFIDENCE: f64 = 0.9;
const SINGLE_MATCH_CONFIDENCE: f64 = 0.8;
const AMBIGUOUS_CONFIDENCE: f64 = 0.55;
const UNKNOWN_CONFIDENCE: f64 = 0.2;

/// Largest change past outcomes can make to a keyword or hint confidence.
pub const MAX_HISTORY_SHIFT: f64 = 0.05;

const WHOLE_WORD_MAX_LEN: usize = 4;

const KEYWORDS: &[(FailureClass, &[&str])] = &[
    (
        FailureClass::MissingDependency,
        &[
            "no module named",
            "modulenotfounderror",
            "command not found",
            "cannot find module",
            "unresolved import",
            "missing dependency",
            "package not found",
            "no such file or directory",
            "importerror",
        ],
    ),
    (
        FailureClass::ResourceExhausted,
        &[
            "quota",
            "rate limit",
            "too many requests",
            "out of memory",
            "oom",
            "resource exhausted",
            "budget exceeded",
            "context length",
            "disk full",
        ],
    ),
    (
        FailureClass::TransientInfra,
        &[
            "timed out",
            "timeout",
            "connection reset",
            "connection refused",
            "temporarily unavailable",
            "service unavailable",
            "network",
            "heartbeat",
            "503",
        ],
    ),
    (
        FailureClass::LogicError,
        &[
            "assertion",
            "panicked",
            "syntaxerror",
            "typeerror",
            "valueerror",
            "parse error",
            "invalid output",
            "malformed",
            "unexpected token",
        ],
    ),
];

static KEYWORD_PATTERNS: LazyLock<Vec<(FailureClass, Regex)>> = LazyLock::new(|| {
    KEYWORDS
        .iter()
        .filter_map(|(class, words)| {
            let alternatives: Vec<String> = words
                .iter()
                .map(|word| {
                    let escaped = regex::escape(word);
                    if word.len() <= WHOLE_WORD_MAX_LEN {
                        format!(r"\b{}\b", escaped)
                    } else {
                        escaped
                    }
                })
                .collect();
            Regex::new(&alternatives.join("|")).ok().map(|re| (*class, re))
        })
        .collect()
});

static DEPENDENCY_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r#"(?i)no module named ['"]?([A-Za-z0-9_.\-]+)"#,
        r#"(?i)cannot find module ['"]([^'"]+)['"]"#,
        r#"(?i)missing dependency:?\s+['"]?([A-Za-z0-9_.\-/@]+)"#,
        r#"(?i)package ['"]?([A-Za-z0-9_.\-/@]+)['"]? not found"#,
        r"(?i)([A-Za-z0-9_.\-]+): command not found",
    ]
    .iter()
    .filter_map(|pattern| Regex::new(pattern).ok())
    .collect()
});

impl HeuristicClassifier {
    pub fn new() -> Self {
        Self
    }

    fn extract_dependency(text: &str) -> Option<String> {
        DEPENDENCY_PATTERNS.iter().find_map(|re| {
            re.captures(text)
                .and_then(|caps| caps.get(1))
                .map(|m| m.as_str().trim_matches(|c| c == '\'' || c == '"').to_string())
        })
    }
}

impl FailureClassifier for HeuristicClassifier {
    fn classify(&self, failure: &PhaseFailure, history: &[PastOutcome]) -> Classification {
        let text = match &failure.details {
            Some(details) => format!("{}\n{}", failure.message, details),
            None => failure.message.clone(),
        };
        let lowered = text.to_lowercase();

        let (class, base) = match failure.kind_hint {
            Some(hint) => (hint, HINT_CONFIDENCE),
            None => {
                let matched: Vec<FailureClass> = KEYWORD_PATTERNS
                    .iter()
                    .filter(|(_, pattern)| pattern.is_match(&lowered))
                    .map(|(class, _)| *class)
                    .collect();
                match matched.as_slice() {
                    [] => (FailureClass::Unknown, UNKNOWN_CONFIDENCE),
                    [only] => (*only, SINGLE_MATCH_CONFIDENCE),
                    [first, ..] => (*first, AMBIGUOUS_CONFIDENCE),
                }
            }
        };

        let strategy = class.default_strategy();
        let relevant: Vec<&PastOutcome> = history
            .iter()
            .filter(|o| o.class == class && o.strategy == strategy)
            .collect();
        let confidence = if relevant.is_empty() {
            base
        } else {
            let successes = relevant.iter().filter(|o| o.succeeded).count();
            let rate = successes as f64 / relevant.len() as f64;
            (0.7 * base + 0.3 * rate).clamp(base - MAX_HISTORY_SHIFT, base + MAX_HISTORY_SHIFT)
        };

        let dependency = match class {
            FailureClass::MissingDependency => Self::extract_dependency(&text),
            _ => None,
        };

        Classification::new(class, confidence).with_dependency(dependency)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::config::RecoveryConfig;

    fn failure(message: &str) -> PhaseFailure {
        PhaseFailure::new(message)
    }

    #[test]
    fn test_hint_wins_over_keywords() {
        let f = failure("assertion failed").with_kind_hint(FailureClass::TransientInfra);
        let c = HeuristicClassifier::new().classify(&f, &[]);
        assert_eq!(c.class, FailureClass::TransientInfra);
        assert_eq!(c.confidence, 0.9);
    }

    #[test]
    fn test_missing_dependency_extracts_name() {
        let f = failure("ModuleNotFoundError: No module named 'pandas'");
        let c = HeuristicClassifier::new().classify(&f, &[]);
        assert_eq!(c.class, FailureClass::MissingDependency);
        assert_eq!(c.confidence, 0.8);
        assert_eq!(c.dependency.as_deref(), Some("pandas"));
    }

    #[test]
    fn test_command_not_found_extracts_binary() {
        let f = failure("sh: 1: jq: command not found");
        let c = HeuristicClassifier::new().classify(&f, &[]);
        assert_eq!(c.dependency.as_deref(), Some("jq"));
    }

    #[test]
    fn test_unrecognized_failure_is_unknown() {
        let c = HeuristicClassifier::new().classify(&failure("something odd"), &[]);
        assert_eq!(c.class, FailureClass::Unknown);
        assert!(c.confidence < 0.7);
    }

    #[test]
    fn test_ambiguous_failure_is_below_threshold() {
        let c = HeuristicClassifier::new()
            .classify(&failure("request timed out: rate limit reached"), &[]);
        assert_eq!(c.class, FailureClass::ResourceExhausted);
        assert_eq!(c.confidence, 0.55);
    }

    #[test]
    fn test_history_blends_confidence() {
        let history = vec![
            PastOutcome {
                class: FailureClass::TransientInfra,
                strategy: RecoveryStrategy::RetryWithBackoff,
                succeeded: false,
            },
            PastOutcome {
                class: FailureClass::TransientInfra,
                strategy: RecoveryStrategy::RetryWithBackoff,
                succeeded: false,
            },
        ];
        let c = HeuristicClassifier::new().classify(&failure("connection reset by peer"), &history);
        assert!((c.confidence - 0.75).abs() < 1e-9);
        assert!(c.confidence > RecoveryConfig::default().confidence_threshold);
    }

    #[test]
    fn test_history_cannot_promote_ambiguous_failure() {
        let history = vec![PastOutcome {
            class: FailureClass::ResourceExhausted,
            strategy: RecoveryStrategy::SimplifyTask,
            succeeded: true,
        }];
        let c = HeuristicClassifier::new()
            .classify(&failure("request timed out: rate limit reached"), &history);
        assert!((c.confidence - 0.6).abs() < 1e-9);
    }

    #[test]
    fn test_short_keywords_match_whole_words_only() {
        let classifier = HeuristicClassifier::new();
        let c = classifier.classify(&failure("no room left in the zoom bloom filter"), &[]);
        assert_eq!(c.class, FailureClass::Unknown);

        let c = classifier.classify(&failure("worker killed: OOM"), &[]);
        assert_eq!(c.class, FailureClass::ResourceExhausted);

        let c = classifier.classify(&failure("upstream returned 503"), &[]);
        assert_eq!(c.class, FailureClass::TransientInfra);
    }

    #[test]
    fn test_confidence_is_clamped() {
        assert_eq!(Classification::new(FailureClass::Unknown, 3.0).confidence, 1.0);
        assert_eq!(Classification::new(FailureClass::Unknown, -1.0).confidence, 0.0);
        assert_eq!(Classification::new(FailureClass::Unknown, f64::NAN).confidence, 0.0);
    }
}
