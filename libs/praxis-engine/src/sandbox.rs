//! Sandbox Host - isolated execution of compiled submissions
//!
//! **Core Responsibility:**
//! Evaluate a `CompiledModule` into a fresh render surface and hand the
//! result out as a read-only `MountedView`.
//!
//! **Isolation contract:**
//! - A `SandboxInstance` is single-use and bound to exactly one attempt
//! - Every mount starts from a clean surface; nothing survives `dispose()`
//! - The interpreter owns all control flow: a fuel budget and an external
//!   kill flag are consulted on a fixed step cadence, so even a tight
//!   loop that never yields is terminated from outside
//! - Every evaluation fault is caught and converted to a `RuntimeError`;
//!   nothing escapes as a panic

use crate::dom::{Element, MountedView, Node};
use crate::transpiler::{BinaryOp, Block, ChildLit, CompiledModule, ElementLit, Expr, Stmt, UnaryOp};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use uuid::Uuid;

/// How many evaluation steps pass between kill-flag checks
const KILL_CHECK_INTERVAL: u64 = 256;

/// The submission compiled but faulted while rendering.
/// Learner-facing; shown verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeError {
    pub message: String,
}

impl RuntimeError {
    fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl fmt::Display for RuntimeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for RuntimeError {}

/// Why a mount did not produce a view
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MountError {
    /// The submission faulted; reported to the learner
    Runtime(RuntimeError),
    /// Execution was forcibly terminated (kill flag or fuel exhaustion);
    /// the orchestrator reports this as a timeout
    Aborted,
    /// A grader defect (e.g. reusing a sandbox); never shown as a verdict
    Internal(String),
}

/// Shared flag that forces a running mount to stop
///
/// Cloned out of the sandbox before evaluation starts so the watchdog
/// can trip it from another task while the interpreter runs.
#[derive(Debug, Clone, Default)]
pub struct KillHandle(Arc<AtomicBool>);

impl KillHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trigger(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_triggered(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Ephemeral, single-use execution context for one attempt
///
/// Owned by the orchestrator for the lifetime of the attempt and
/// destroyed unconditionally when the attempt concludes. `Drop` also
/// disposes, so an abandoned sandbox (e.g. after a watchdog timeout)
/// cannot leak a live execution.
pub struct SandboxInstance {
    id: Uuid,
    kill: KillHandle,
    fuel_limit: u64,
    used: bool,
    disposed: bool,
}

impl SandboxInstance {
    pub fn new(fuel_limit: u64) -> Self {
        Self {
            id: Uuid::new_v4(),
            kill: KillHandle::new(),
            fuel_limit,
            used: false,
            disposed: false,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Handle the watchdog uses to force termination from outside
    pub fn kill_handle(&self) -> KillHandle {
        self.kill.clone()
    }

    /// Evaluate the module into a fresh surface
    ///
    /// Blocking; the orchestrator runs it on a blocking task and races
    /// it against the watchdog.
    pub fn mount(&mut self, module: &CompiledModule) -> Result<MountedView, MountError> {
        if self.disposed {
            return Err(MountError::Internal(
                "mount called on a disposed sandbox".to_string(),
            ));
        }
        if self.used {
            return Err(MountError::Internal(
                "sandbox instances are single-use".to_string(),
            ));
        }
        self.used = true;

        tracing::debug!(
            sandbox = %self.id,
            component = %module.component_name,
            "mounting compiled module"
        );

        let mut interp = Interp {
            kill: self.kill.clone(),
            fuel: self.fuel_limit,
            env: HashMap::new(),
        };

        match interp.run(&module.body) {
            Ok(Some(root)) => Ok(MountedView::new(vec![Node::Element(root)])),
            Ok(None) => Ok(MountedView::new(Vec::new())),
            Err(Halt::Error(err)) => Err(MountError::Runtime(err)),
            Err(Halt::Killed) => Err(MountError::Aborted),
        }
    }

    /// Tear the instance down: trips the kill flag so any in-flight
    /// evaluation stops, and marks the instance unusable.
    pub fn dispose(&mut self) {
        if !self.disposed {
            self.kill.trigger();
            self.disposed = true;
            tracing::debug!(sandbox = %self.id, "sandbox disposed");
        }
    }
}

impl Drop for SandboxInstance {
    fn drop(&mut self) {
        self.dispose();
    }
}

// ---------------------------------------------------------------------
// Interpreter
// ---------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
enum Value {
    Int(i64),
    Bool(bool),
    Str(String),
    Element(Element),
}

impl Value {
    fn type_name(&self) -> &'static str {
        match self {
            Value::Int(_) => "number",
            Value::Bool(_) => "boolean",
            Value::Str(_) => "string",
            Value::Element(_) => "markup",
        }
    }

    /// Text form used for interpolation and string concatenation
    fn render(&self) -> String {
        match self {
            Value::Int(n) => n.to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Str(s) => s.clone(),
            Value::Element(el) => format!("<{}>", el.tag),
        }
    }
}

enum Halt {
    Error(RuntimeError),
    Killed,
}

impl Halt {
    fn error(message: impl Into<String>) -> Self {
        Halt::Error(RuntimeError::new(message))
    }
}

struct Interp {
    kill: KillHandle,
    fuel: u64,
    env: HashMap<String, Value>,
}

impl Interp {
    /// One evaluation step: burn fuel and periodically consult the
    /// kill flag. Fuel exhaustion is treated exactly like an external
    /// kill - the run is no longer trustworthy either way.
    fn tick(&mut self) -> Result<(), Halt> {
        if self.fuel == 0 {
            return Err(Halt::Killed);
        }
        self.fuel -= 1;
        if self.fuel % KILL_CHECK_INTERVAL == 0 && self.kill.is_triggered() {
            return Err(Halt::Killed);
        }
        Ok(())
    }

    fn run(&mut self, body: &Block) -> Result<Option<Element>, Halt> {
        for stmt in &body.stmts {
            self.exec_stmt(stmt)?;
        }
        match &body.tail {
            None => Ok(None),
            Some(expr) => match self.eval(expr)? {
                Value::Element(el) => Ok(Some(el)),
                other => Err(Halt::error(format!(
                    "the component must return a markup element, but it returned a {}",
                    other.type_name()
                ))),
            },
        }
    }

    fn exec_stmt(&mut self, stmt: &Stmt) -> Result<(), Halt> {
        self.tick()?;
        match stmt {
            Stmt::Let { name, value } | Stmt::Assign { name, value } => {
                let value = self.eval(value)?;
                self.env.insert(name.clone(), value);
                Ok(())
            }
            Stmt::While { cond, body } => {
                loop {
                    self.tick()?;
                    match self.eval(cond)? {
                        Value::Bool(true) => {}
                        Value::Bool(false) => break,
                        other => {
                            return Err(Halt::error(format!(
                                "a `while` condition must be a boolean, but it was a {}",
                                other.type_name()
                            )))
                        }
                    }
                    for stmt in body {
                        self.exec_stmt(stmt)?;
                    }
                }
                Ok(())
            }
            Stmt::Expr(expr) => {
                self.eval(expr)?;
                Ok(())
            }
        }
    }

    fn eval(&mut self, expr: &Expr) -> Result<Value, Halt> {
        self.tick()?;
        match expr {
            Expr::Int(n) => Ok(Value::Int(*n)),
            Expr::Str(s) => Ok(Value::Str(s.clone())),
            Expr::Bool(b) => Ok(Value::Bool(*b)),
            Expr::Var(name) => match self.env.get(name) {
                Some(value) => Ok(value.clone()),
                None => Err(Halt::error(format!(
                    "the variable `{}` was never initialized",
                    name
                ))),
            },
            Expr::Unary { op, operand } => {
                let value = self.eval(operand)?;
                match (op, value) {
                    (UnaryOp::Neg, Value::Int(n)) => n
                        .checked_neg()
                        .map(Value::Int)
                        .ok_or_else(|| Halt::error("integer overflow")),
                    (UnaryOp::Not, Value::Bool(b)) => Ok(Value::Bool(!b)),
                    (UnaryOp::Neg, other) => Err(Halt::error(format!(
                        "`-` needs a number, but it was given a {}",
                        other.type_name()
                    ))),
                    (UnaryOp::Not, other) => Err(Halt::error(format!(
                        "`!` needs a boolean, but it was given a {}",
                        other.type_name()
                    ))),
                }
            }
            Expr::Binary { op, lhs, rhs } => {
                let lhs = self.eval(lhs)?;
                let rhs = self.eval(rhs)?;
                self.eval_binary(*op, lhs, rhs)
            }
            Expr::Element(lit) => Ok(Value::Element(self.eval_element(lit)?)),
        }
    }

    fn eval_binary(&mut self, op: BinaryOp, lhs: Value, rhs: Value) -> Result<Value, Halt> {
        use BinaryOp::*;
        match op {
            Eq | NotEq => {
                if matches!(lhs, Value::Element(_)) || matches!(rhs, Value::Element(_)) {
                    return Err(Halt::error("markup values cannot be compared"));
                }
                let equal = lhs == rhs;
                Ok(Value::Bool(if op == Eq { equal } else { !equal }))
            }
            Add => match (lhs, rhs) {
                (Value::Int(a), Value::Int(b)) => a
                    .checked_add(b)
                    .map(Value::Int)
                    .ok_or_else(|| Halt::error("integer overflow")),
                (Value::Element(_), _) | (_, Value::Element(_)) => {
                    Err(Halt::error("markup values cannot be used with `+`"))
                }
                (Value::Str(a), b) => Ok(Value::Str(format!("{}{}", a, b.render()))),
                (a, Value::Str(b)) => Ok(Value::Str(format!("{}{}", a.render(), b))),
                (a, b) => Err(Halt::error(format!(
                    "`+` cannot combine a {} and a {}",
                    a.type_name(),
                    b.type_name()
                ))),
            },
            Sub | Mul | Div => match (lhs, rhs) {
                (Value::Int(a), Value::Int(b)) => {
                    let result = match op {
                        Sub => a.checked_sub(b),
                        Mul => a.checked_mul(b),
                        Div => {
                            if b == 0 {
                                return Err(Halt::error("division by zero"));
                            }
                            a.checked_div(b)
                        }
                        _ => unreachable!("handled above"),
                    };
                    result.map(Value::Int).ok_or_else(|| Halt::error("integer overflow"))
                }
                (a, b) => Err(Halt::error(format!(
                    "arithmetic needs numbers, but it was given a {} and a {}",
                    a.type_name(),
                    b.type_name()
                ))),
            },
        }
    }

    fn eval_element(&mut self, lit: &ElementLit) -> Result<Element, Halt> {
        self.tick()?;
        let mut children = Vec::with_capacity(lit.children.len());
        for child in &lit.children {
            match child {
                ChildLit::Element(el) => children.push(Node::Element(self.eval_element(el)?)),
                ChildLit::Text(text) => children.push(Node::Text(text.clone())),
                ChildLit::Expr(expr) => match self.eval(expr)? {
                    Value::Element(el) => children.push(Node::Element(el)),
                    other => children.push(Node::Text(other.render())),
                },
            }
        }
        Ok(Element {
            tag: lit.tag.clone(),
            attrs: lit.attrs.clone(),
            children,
        })
    }
}
