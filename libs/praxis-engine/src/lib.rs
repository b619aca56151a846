//! Praxis grading engine
//!
//! Compiles a learner's submission in a small component-oriented UI
//! language, mounts it in a disposable sandbox, runs the exercise's
//! `expect(...)` assertion script against the mounted markup, and
//! produces a single immutable [`Verdict`](praxis_common::types::Verdict)
//! under a hard wall-clock budget.
//!
//! Pipeline: [`transpiler`] → [`sandbox`] → [`assertions`], sequenced by
//! the [`orchestrator`] with the [`watchdog`] bounding every sandboxed
//! step.

pub mod assertions;
pub mod dom;
pub mod orchestrator;
pub mod sandbox;
pub mod transpiler;
pub mod watchdog;

// Re-export the public surface consumed by editor shells
pub use orchestrator::{self_check, Grader, GraderError, SelfCheckError};
pub use sandbox::{KillHandle, SandboxInstance};
pub use transpiler::{compile, CompileError, CompiledModule};
