//! Grading Orchestrator - sequences the pipeline and owns the verdict
//!
//! **Pipeline:**
//! compile → mount (sandboxed, under budget) → assert (under budget) →
//! conclude. Every path into conclusion disposes the attempt's sandbox
//! and produces exactly one immutable `Verdict`.
//!
//! **Rapid resubmission:**
//! Each submission takes a fresh generation token. A concluding attempt
//! whose token is stale delivers nothing: its callback is suppressed and
//! its verdict dropped. Work that cannot be interrupted safely (the
//! blocking mount task) runs to its forced exit; the sandbox kill flag
//! tears it down actively.

use crate::assertions;
use crate::sandbox::{KillHandle, MountError, SandboxInstance};
use crate::transpiler;
use crate::watchdog;
use praxis_common::types::{AttemptStatus, Diagnostic};
use praxis_common::{Exercise, GraderConfig, Outcome, Verdict};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Instant;
use uuid::Uuid;

/// One grading run of a single submission
///
/// Created per submission; a superseded attempt is discarded when a
/// newer one starts, never mutated by it.
#[derive(Debug, Clone)]
pub struct Attempt {
    pub id: Uuid,
    pub generation: u64,
    pub source: String,
    pub status: AttemptStatus,
}

/// A defect in the grading pipeline itself
///
/// Distinct from every learner-facing outcome: this is never delivered
/// as a verdict, and callers surface it as a retry prompt instead.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GraderError {
    pub message: String,
}

impl fmt::Display for GraderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "grader error: {}", self.message)
    }
}

impl std::error::Error for GraderError {}

/// Why an exercise definition failed its publishing gate
#[derive(Debug)]
pub enum SelfCheckError {
    /// The reference solution did not grade as passing
    NotPassing { outcome: Outcome },
    Grader(GraderError),
}

impl fmt::Display for SelfCheckError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SelfCheckError::NotPassing { outcome } => {
                write!(f, "the reference solution graded as `{}`", outcome.kind())
            }
            SelfCheckError::Grader(err) => write!(f, "{}", err),
        }
    }
}

impl std::error::Error for SelfCheckError {}

/// Callback invoked once per concluded, non-superseded attempt:
/// `(submitted_code, passed, diagnostics)`
pub type ResultCallback = dyn Fn(&str, bool, &[Diagnostic]) + Send + Sync;

/// Grades submissions for one exercise
///
/// One attempt is active at a time from the caller's perspective, but
/// the grader tolerates a new submission arriving before the previous
/// one concludes: the newer generation wins, the stale attempt's result
/// is dropped, and its sandbox is torn down.
pub struct Grader {
    exercise: Exercise,
    config: GraderConfig,
    generation: AtomicU64,
    /// Kill handle of the in-flight attempt's sandbox, if any; tripped
    /// when a newer submission supersedes that attempt.
    active_kill: Mutex<Option<KillHandle>>,
    callback: Box<ResultCallback>,
}

impl Grader {
    pub fn new(exercise: Exercise, config: GraderConfig) -> Self {
        Self::with_callback(exercise, config, |_, _, _| {})
    }

    pub fn with_callback(
        exercise: Exercise,
        config: GraderConfig,
        callback: impl Fn(&str, bool, &[Diagnostic]) + Send + Sync + 'static,
    ) -> Self {
        Self {
            exercise,
            config,
            generation: AtomicU64::new(0),
            active_kill: Mutex::new(None),
            callback: Box::new(callback),
        }
    }

    pub fn exercise(&self) -> &Exercise {
        &self.exercise
    }

    /// Generation token of the most recent submission
    pub fn current_generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Grade one submission
    ///
    /// Returns `Ok(Some(verdict))` for a concluded, still-current
    /// attempt, `Ok(None)` when the attempt was superseded by a newer
    /// submission, and `Err` only for grader defects.
    pub async fn submit(&self, source: impl Into<String>) -> Result<Option<Verdict>, GraderError> {
        let source = source.into();

        // Starting a new attempt tears down the sandbox of any prior,
        // not-yet-finished attempt; its result is dropped at conclusion.
        // The increment and the teardown happen under one lock so they
        // serialize against register_kill: an older attempt whose
        // sandbox does not exist yet cannot slip its handle in after
        // this supersession.
        let generation = {
            let mut active = self
                .active_kill
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
            if let Some(previous) = active.take() {
                previous.trigger();
            }
            generation
        };

        let mut attempt = Attempt {
            id: Uuid::new_v4(),
            generation,
            source,
            status: AttemptStatus::Idle,
        };
        let started = Instant::now();

        tracing::info!(
            attempt = %attempt.id,
            generation,
            exercise = %self.exercise.slug,
            "grading attempt started"
        );

        attempt.status = AttemptStatus::Compiling;
        let module = match transpiler::compile(&attempt.source) {
            Ok(module) => module,
            Err(err) => {
                let outcome = Outcome::CompileError {
                    message: err.message,
                    location: err.location,
                };
                return Ok(self.conclude(attempt, started, outcome));
            }
        };

        let budget_ms = self.config.budget_for(self.exercise.difficulty);

        attempt.status = AttemptStatus::Mounting;
        let sandbox = SandboxInstance::new(self.config.fuel_limit);
        let kill = sandbox.kill_handle();
        self.register_kill(generation, &kill);
        let mount_task = {
            let mut sandbox = sandbox;
            let module = module.clone();
            tokio::task::spawn_blocking(move || {
                let result = sandbox.mount(&module);
                (sandbox, result)
            })
        };

        let (mut sandbox, view) = match watchdog::with_budget(budget_ms, &kill, mount_task).await {
            Err(_) => {
                // The kill flag is set; the abandoned blocking task stops
                // on its next step check and drops (disposes) the sandbox.
                return Ok(self.conclude(attempt, started, Outcome::Timeout));
            }
            Ok(Err(join_err)) => {
                kill.trigger();
                return Err(GraderError {
                    message: format!("mount task failed: {}", join_err),
                });
            }
            Ok(Ok((mut sandbox, mount_result))) => match mount_result {
                Ok(view) => (sandbox, view),
                Err(MountError::Runtime(err)) => {
                    sandbox.dispose();
                    let outcome = Outcome::RuntimeError {
                        message: err.message,
                    };
                    return Ok(self.conclude(attempt, started, outcome));
                }
                Err(MountError::Aborted) => {
                    sandbox.dispose();
                    return Ok(self.conclude(attempt, started, Outcome::Timeout));
                }
                Err(MountError::Internal(message)) => {
                    sandbox.dispose();
                    return Err(GraderError { message });
                }
            },
        };

        attempt.status = AttemptStatus::Asserting;
        // The assertion step runs on the blocking pool like the mount:
        // inlining it in the async block would let it run to completion
        // on the watchdog's first poll, making the budget unenforceable.
        let assert_task = {
            let script = self.exercise.test_script.clone();
            tokio::task::spawn_blocking(move || assertions::run(&script, &view))
        };
        let assert_result = watchdog::with_budget(budget_ms, &kill, assert_task).await;

        // Disposal is unconditional on every path out of Asserting,
        // the success path included.
        sandbox.dispose();

        let outcome = match assert_result {
            Err(_) => Outcome::Timeout,
            Ok(Err(join_err)) => {
                return Err(GraderError {
                    message: format!("assertion task failed: {}", join_err),
                });
            }
            Ok(Ok(failures)) if failures.is_empty() => Outcome::Passed,
            Ok(Ok(failures)) => Outcome::AssertionsFailed { failures },
        };
        Ok(self.conclude(attempt, started, outcome))
    }

    /// Install an attempt's kill handle as the active one. A newer
    /// submission may have superseded the attempt between its generation
    /// being issued and its sandbox existing; in that case the handle is
    /// tripped on the spot, so the sandbox never outlives its
    /// supersession.
    fn register_kill(&self, generation: u64, kill: &KillHandle) {
        let mut active = self
            .active_kill
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if self.generation.load(Ordering::SeqCst) != generation {
            kill.trigger();
            return;
        }
        if let Some(previous) = active.take() {
            previous.trigger();
        }
        *active = Some(kill.clone());
    }

    /// Conclude the attempt: build the verdict, and deliver it through
    /// the callback unless a newer generation superseded this attempt.
    fn conclude(&self, mut attempt: Attempt, started: Instant, outcome: Outcome) -> Option<Verdict> {
        attempt.status = AttemptStatus::Concluded;
        let verdict = Verdict {
            attempt_id: attempt.id,
            generation: attempt.generation,
            outcome,
            elapsed_ms: started.elapsed().as_millis() as u64,
        };

        let current = self.generation.load(Ordering::SeqCst);
        if attempt.generation != current {
            tracing::debug!(
                attempt = %attempt.id,
                generation = attempt.generation,
                current,
                "attempt superseded, verdict dropped"
            );
            return None;
        }

        let diagnostics = verdict.diagnostics();
        (self.callback)(&attempt.source, verdict.passed(), &diagnostics);

        tracing::info!(
            attempt = %attempt.id,
            outcome = verdict.outcome.kind(),
            elapsed_ms = verdict.elapsed_ms,
            "attempt concluded"
        );
        Some(verdict)
    }
}

/// Publishing gate: grade the reference solution through the exact
/// pipeline learners use and require `Passed`.
pub async fn self_check(
    exercise: &Exercise,
    config: &GraderConfig,
) -> Result<Verdict, SelfCheckError> {
    let grader = Grader::new(exercise.clone(), config.clone());
    match grader.submit(exercise.solution_code.clone()).await {
        Ok(Some(verdict)) if verdict.passed() => Ok(verdict),
        Ok(Some(verdict)) => Err(SelfCheckError::NotPassing {
            outcome: verdict.outcome,
        }),
        Ok(None) => Err(SelfCheckError::Grader(GraderError {
            message: "self-check verdict was dropped".to_string(),
        })),
        Err(err) => Err(SelfCheckError::Grader(err)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use praxis_common::Difficulty;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;
    use std::time::Duration;

    const SOLUTION: &str = r#"export default fn App() {
        <div>
            <h1>"Hello, Praxis!"</h1>
            <p>"Welcome to the course."</p>
        </div>
    }"#;

    const STARTER: &str = "export default fn App() { }";

    const SCRIPT: &str = r#"
        expect(exists("h1")).toBeTruthy()
        expect(text("h1")).toBe("Hello, Praxis!")
        expect(count("p")).toBe(1)
    "#;

    fn heading_exercise() -> Exercise {
        Exercise {
            id: Uuid::new_v4(),
            slug: "intro-heading".to_string(),
            title: "Your first heading".to_string(),
            starter_code: STARTER.to_string(),
            solution_code: SOLUTION.to_string(),
            test_script: SCRIPT.to_string(),
            difficulty: Difficulty::Easy,
            point_value: 10,
        }
    }

    fn test_config() -> GraderConfig {
        GraderConfig {
            budget_ms: 500,
            fuel_limit: 5_000_000,
            exercises_path: String::new(),
        }
    }

    #[tokio::test]
    async fn test_solution_passes() {
        let grader = Grader::new(heading_exercise(), test_config());
        let verdict = grader.submit(SOLUTION).await.unwrap().unwrap();
        assert!(verdict.passed());
        assert_eq!(verdict.generation, 1);
    }

    #[tokio::test]
    async fn test_starter_fails_with_every_missing_expectation() {
        let grader = Grader::new(heading_exercise(), test_config());
        let verdict = grader.submit(STARTER).await.unwrap().unwrap();

        match verdict.outcome {
            Outcome::AssertionsFailed { ref failures } => {
                assert_eq!(failures.len(), 3);
                assert!(failures[0].expression.contains("h1"));
                assert!(failures[2].expression.contains("p"));
            }
            ref other => panic!("expected assertion failures, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_invalid_syntax_is_a_compile_error() {
        let grader = Grader::new(heading_exercise(), test_config());
        let verdict = grader
            .submit("export default fn App() { <div>\"hi\"</div> } }")
            .await
            .unwrap()
            .unwrap();

        match verdict.outcome {
            Outcome::CompileError { ref message, .. } => {
                assert!(message.contains("unexpected token"))
            }
            ref other => panic!("expected a compile error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_rendering_fault_is_a_runtime_error() {
        let grader = Grader::new(heading_exercise(), test_config());
        let verdict = grader
            .submit("export default fn App() { let x = 1 / 0; <p>{x}</p> }")
            .await
            .unwrap()
            .unwrap();

        match verdict.outcome {
            Outcome::RuntimeError { ref message } => assert!(message.contains("division by zero")),
            ref other => panic!("expected a runtime error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_non_terminating_loop_times_out_within_bounds() {
        let grader = Grader::new(heading_exercise(), test_config());
        let started = Instant::now();
        let verdict = grader
            .submit("export default fn App() { while true { } <p>\"hi\"</p> }")
            .await
            .unwrap()
            .unwrap();

        assert_eq!(verdict.outcome, Outcome::Timeout);
        // Budget plus bounded overhead, nowhere near a hang.
        assert!(started.elapsed() < Duration::from_secs(5));
        // No partial assertion results leak out of a timeout.
        let diagnostics = verdict.diagnostics();
        assert_eq!(diagnostics.len(), 1);
    }

    #[tokio::test]
    async fn test_resubmission_supersedes_in_flight_attempt() {
        let delivered = Arc::new(AtomicUsize::new(0));
        let counter = delivered.clone();
        let grader = Arc::new(Grader::with_callback(
            heading_exercise(),
            test_config(),
            move |_, _, _| {
                counter.fetch_add(1, Ordering::SeqCst);
            },
        ));

        let slow = {
            let grader = grader.clone();
            tokio::spawn(async move {
                grader
                    .submit("export default fn App() { while true { } <p>\"hi\"</p> }")
                    .await
            })
        };

        // Wait until the slow attempt holds generation 1 before
        // superseding it.
        while grader.current_generation() < 1 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        let fast = grader.submit(SOLUTION).await.unwrap();
        let fast = fast.expect("the latest generation must deliver a verdict");
        assert!(fast.passed());
        assert_eq!(fast.generation, 2);

        let slow_result = slow.await.unwrap().unwrap();
        assert!(slow_result.is_none(), "the stale attempt must deliver nothing");

        assert_eq!(delivered.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_late_kill_registration_for_a_stale_attempt_trips_immediately() {
        let grader = Grader::new(heading_exercise(), test_config());
        // A newer submission bumped the generation before this attempt's
        // sandbox came to exist.
        grader.generation.store(2, Ordering::SeqCst);

        let stale = KillHandle::new();
        grader.register_kill(1, &stale);

        assert!(stale.is_triggered());
        assert!(grader.active_kill.lock().unwrap().is_none());
    }

    #[test]
    fn test_current_kill_registration_becomes_the_active_handle() {
        let grader = Grader::new(heading_exercise(), test_config());
        grader.generation.store(1, Ordering::SeqCst);

        let kill = KillHandle::new();
        grader.register_kill(1, &kill);
        assert!(!kill.is_triggered());

        // The stored handle is the registered one, not a copy of some
        // older attempt's.
        let stored = grader.active_kill.lock().unwrap().take().unwrap();
        stored.trigger();
        assert!(kill.is_triggered());
    }

    #[tokio::test]
    async fn test_supersession_tears_down_the_previous_sandbox_before_its_budget() {
        // Fuel high enough that only a kill can stop the loop, and a
        // budget long enough that the watchdog cannot be the one to
        // stop it within this test's bounds.
        let config = GraderConfig {
            budget_ms: 5000,
            fuel_limit: u64::MAX,
            exercises_path: String::new(),
        };
        let grader = Arc::new(Grader::new(heading_exercise(), config));

        let started = Instant::now();
        let slow = {
            let grader = grader.clone();
            tokio::spawn(async move {
                grader
                    .submit("export default fn App() { while true { } <p>\"hi\"</p> }")
                    .await
            })
        };
        while grader.current_generation() < 1 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        let fast = grader.submit(SOLUTION).await.unwrap().unwrap();
        assert!(fast.passed());

        // The new submission's teardown stops the loop, well inside the
        // superseded attempt's own 5s budget.
        let slow_result = slow.await.unwrap().unwrap();
        assert!(slow_result.is_none());
        assert!(started.elapsed() < Duration::from_secs(4));
    }

    #[tokio::test]
    async fn test_sequential_resubmission_delivers_both_verdicts() {
        let grader = Grader::new(heading_exercise(), test_config());
        let first = grader.submit(STARTER).await.unwrap().unwrap();
        let second = grader.submit(SOLUTION).await.unwrap().unwrap();
        assert_eq!(first.generation, 1);
        assert_eq!(second.generation, 2);
        assert!(!first.passed());
        assert!(second.passed());
    }

    #[tokio::test]
    async fn test_callback_receives_submitted_source() {
        let seen: Arc<std::sync::Mutex<Vec<(String, bool)>>> =
            Arc::new(std::sync::Mutex::new(Vec::new()));
        let sink = seen.clone();
        let grader = Grader::with_callback(
            heading_exercise(),
            test_config(),
            move |source, passed, _| {
                sink.lock().unwrap().push((source.to_string(), passed));
            },
        );

        grader.submit(SOLUTION).await.unwrap();
        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].0, SOLUTION);
        assert!(seen[0].1);
    }

    #[tokio::test]
    async fn test_self_check_accepts_a_sound_exercise() {
        let verdict = self_check(&heading_exercise(), &test_config()).await.unwrap();
        assert!(verdict.passed());
    }

    #[tokio::test]
    async fn test_self_check_rejects_a_broken_exercise() {
        let mut exercise = heading_exercise();
        exercise.solution_code = STARTER.to_string();

        match self_check(&exercise, &test_config()).await {
            Err(SelfCheckError::NotPassing { outcome }) => {
                assert_eq!(outcome.kind(), "assertions_failed")
            }
            other => panic!("expected a failed self-check, got {:?}", other.map(|v| v.outcome)),
        }
    }

    #[tokio::test]
    async fn test_verdicts_are_deterministic_across_attempts() {
        let grader = Grader::new(heading_exercise(), test_config());
        let first = grader.submit(STARTER).await.unwrap().unwrap();
        let second = grader.submit(STARTER).await.unwrap().unwrap();
        assert_eq!(first.outcome, second.outcome);
    }
}
