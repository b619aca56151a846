use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Exercise difficulty tiers
/// Harder exercises get a proportionally larger execution budget
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
}

impl Difficulty {
    /// Returns all difficulty variants
    /// Single source of truth for the tiers the grader understands
    pub fn all_variants() -> &'static [Difficulty] {
        &[Difficulty::Easy, Difficulty::Medium, Difficulty::Hard]
    }

    /// Parse a difficulty from string (case-insensitive)
    pub fn from_str(s: &str) -> Option<Difficulty> {
        match s.to_lowercase().as_str() {
            "easy" => Some(Difficulty::Easy),
            "medium" => Some(Difficulty::Medium),
            "hard" => Some(Difficulty::Hard),
            _ => None,
        }
    }

    /// Wall-clock budget multiplier applied to the configured base budget
    pub fn budget_multiplier(&self) -> u64 {
        match self {
            Difficulty::Easy => 1,
            Difficulty::Medium => 2,
            Difficulty::Hard => 3,
        }
    }
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Difficulty::Easy => write!(f, "easy"),
            Difficulty::Medium => write!(f, "medium"),
            Difficulty::Hard => write!(f, "hard"),
        }
    }
}

/// Exercise Definition (Immutable Input)
/// Created from static configuration and never mutated at runtime.
/// `solution_code` must grade as passing through the same pipeline
/// that grades learner submissions - that is the publishing gate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Exercise {
    #[serde(default = "Uuid::new_v4")]
    pub id: Uuid,
    pub slug: String,
    pub title: String,
    pub starter_code: String,
    pub solution_code: String,
    pub test_script: String,
    pub difficulty: Difficulty,
    pub point_value: u32,
}

/// Attempt State Machine
/// One grading run moves strictly forward through these states;
/// `Concluded` is terminal and the Verdict carries the outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttemptStatus {
    Idle,
    Compiling,
    Mounting,
    Asserting,
    Concluded,
}

/// Position in the submitted source, 1-based
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceLocation {
    pub line: u32,
    pub column: u32,
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}, column {}", self.line, self.column)
    }
}

/// One failed expectation from the assertion script
/// All three fields are pre-rendered strings so the failure can be
/// shown to the learner verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssertionFailure {
    pub expression: String,
    pub expected: String,
    pub actual: String,
}

impl fmt::Display for AssertionFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: expected {}, got {}",
            self.expression, self.expected, self.actual
        )
    }
}

/// Terminal outcome of an Attempt
///
/// ## Surfacing rules:
/// - CompileError / RuntimeError: shown verbatim (they originate from
///   the learner's own code)
/// - AssertionsFailed: shown as a structured list, every failure included
/// - Timeout: shown as a short non-technical message, no partial results
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Outcome {
    Passed,
    CompileError {
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        location: Option<SourceLocation>,
    },
    RuntimeError {
        message: String,
    },
    AssertionsFailed {
        failures: Vec<AssertionFailure>,
    },
    Timeout,
}

impl Outcome {
    /// Stable label for logs and metrics
    pub fn kind(&self) -> &'static str {
        match self {
            Outcome::Passed => "passed",
            Outcome::CompileError { .. } => "compile_error",
            Outcome::RuntimeError { .. } => "runtime_error",
            Outcome::AssertionsFailed { .. } => "assertions_failed",
            Outcome::Timeout => "timeout",
        }
    }
}

/// Kind tag for a learner-facing diagnostic line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiagnosticKind {
    Compile,
    Runtime,
    Assertion,
    Timeout,
}

/// One learner-facing diagnostic line, as delivered to the result callback
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    pub message: String,
}

/// Verdict (Immutable Output)
/// The final result of one Attempt. Handed to the caller-supplied
/// callback and to the UI; never mutated after production.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Verdict {
    pub attempt_id: Uuid,
    pub generation: u64,
    pub outcome: Outcome,
    pub elapsed_ms: u64,
}

impl Verdict {
    pub fn passed(&self) -> bool {
        matches!(self.outcome, Outcome::Passed)
    }

    /// Render the outcome as learner-facing diagnostics
    ///
    /// Compile and runtime messages are passed through verbatim; a
    /// timeout is reported generically because the state at forced
    /// termination is not trustworthy.
    pub fn diagnostics(&self) -> Vec<Diagnostic> {
        match &self.outcome {
            Outcome::Passed => Vec::new(),
            Outcome::CompileError { message, location } => {
                let message = match location {
                    Some(loc) => format!("{} ({})", message, loc),
                    None => message.clone(),
                };
                vec![Diagnostic {
                    kind: DiagnosticKind::Compile,
                    message,
                }]
            }
            Outcome::RuntimeError { message } => vec![Diagnostic {
                kind: DiagnosticKind::Runtime,
                message: message.clone(),
            }],
            Outcome::AssertionsFailed { failures } => failures
                .iter()
                .map(|f| Diagnostic {
                    kind: DiagnosticKind::Assertion,
                    message: f.to_string(),
                })
                .collect(),
            Outcome::Timeout => vec![Diagnostic {
                kind: DiagnosticKind::Timeout,
                message: "Your code took too long to run. Check for loops that never finish."
                    .to_string(),
            }],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_difficulty_serialization() {
        let d = Difficulty::Medium;
        let json = serde_json::to_string(&d).unwrap();
        assert_eq!(json, "\"medium\"");

        let deserialized: Difficulty = serde_json::from_str(&json).unwrap();
        assert_eq!(deserialized, Difficulty::Medium);
    }

    #[test]
    fn test_difficulty_from_str() {
        assert_eq!(Difficulty::from_str("easy"), Some(Difficulty::Easy));
        assert_eq!(Difficulty::from_str("HARD"), Some(Difficulty::Hard));
        assert_eq!(Difficulty::from_str("impossible"), None);
    }

    #[test]
    fn test_difficulty_budget_multiplier_ordering() {
        let mut last = 0;
        for d in Difficulty::all_variants() {
            assert!(d.budget_multiplier() > last);
            last = d.budget_multiplier();
        }
    }

    #[test]
    fn test_exercise_deserializes_without_id() {
        let json = r#"{
            "slug": "intro-heading",
            "title": "Your first heading",
            "starter_code": "export default fn App() { <div></div> }",
            "solution_code": "export default fn App() { <h1>\"hi\"</h1> }",
            "test_script": "expect(exists(\"h1\")).toBeTruthy()",
            "difficulty": "easy",
            "point_value": 10
        }"#;

        let exercise: Exercise = serde_json::from_str(json).unwrap();
        assert_eq!(exercise.slug, "intro-heading");
        assert_eq!(exercise.difficulty, Difficulty::Easy);
        assert_eq!(exercise.point_value, 10);
    }

    #[test]
    fn test_outcome_serialization_is_tagged() {
        let outcome = Outcome::CompileError {
            message: "unexpected token `}`".to_string(),
            location: Some(SourceLocation { line: 3, column: 1 }),
        };
        let json = serde_json::to_string(&outcome).unwrap();
        assert!(json.contains("\"kind\":\"compile_error\""));
        assert!(json.contains("unexpected token"));

        let roundtrip: Outcome = serde_json::from_str(&json).unwrap();
        assert_eq!(roundtrip, outcome);
    }

    #[test]
    fn test_outcome_kind_labels() {
        assert_eq!(Outcome::Passed.kind(), "passed");
        assert_eq!(Outcome::Timeout.kind(), "timeout");
        assert_eq!(
            Outcome::AssertionsFailed { failures: vec![] }.kind(),
            "assertions_failed"
        );
    }

    #[test]
    fn test_verdict_passed() {
        let verdict = Verdict {
            attempt_id: Uuid::new_v4(),
            generation: 1,
            outcome: Outcome::Passed,
            elapsed_ms: 12,
        };
        assert!(verdict.passed());
        assert!(verdict.diagnostics().is_empty());
    }

    #[test]
    fn test_verdict_diagnostics_enumerate_assertion_failures() {
        let verdict = Verdict {
            attempt_id: Uuid::new_v4(),
            generation: 2,
            outcome: Outcome::AssertionsFailed {
                failures: vec![
                    AssertionFailure {
                        expression: "expect(exists(\"h1\")).toBeTruthy()".to_string(),
                        expected: "a truthy value".to_string(),
                        actual: "false".to_string(),
                    },
                    AssertionFailure {
                        expression: "expect(count(\"p\")).toBe(1)".to_string(),
                        expected: "1".to_string(),
                        actual: "0".to_string(),
                    },
                ],
            },
            elapsed_ms: 30,
        };

        let diagnostics = verdict.diagnostics();
        assert_eq!(diagnostics.len(), 2);
        assert_eq!(diagnostics[0].kind, DiagnosticKind::Assertion);
        assert!(diagnostics[0].message.contains("a truthy value"));
        assert!(diagnostics[1].message.contains("expected 1, got 0"));
    }

    #[test]
    fn test_timeout_diagnostic_is_generic() {
        let verdict = Verdict {
            attempt_id: Uuid::new_v4(),
            generation: 1,
            outcome: Outcome::Timeout,
            elapsed_ms: 2000,
        };
        let diagnostics = verdict.diagnostics();
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].kind, DiagnosticKind::Timeout);
        // No internals leak into the timeout message
        assert!(!diagnostics[0].message.contains("watchdog"));
    }

    #[test]
    fn test_compile_error_diagnostic_includes_location() {
        let verdict = Verdict {
            attempt_id: Uuid::new_v4(),
            generation: 1,
            outcome: Outcome::CompileError {
                message: "unterminated string literal".to_string(),
                location: Some(SourceLocation { line: 2, column: 9 }),
            },
            elapsed_ms: 1,
        };
        let diagnostics = verdict.diagnostics();
        assert_eq!(diagnostics[0].kind, DiagnosticKind::Compile);
        assert!(diagnostics[0].message.contains("line 2, column 9"));
    }
}
