//! Assertion Runner - judges a mounted view against a test script
//!
//! **Core Responsibility:**
//! Execute an exercise's `expect(...)` script against the `MountedView`
//! an attempt produced and collect structured failures.
//!
//! **Critical Properties:**
//! - Knows nothing about the sandbox or how the view was produced
//! - Every assertion runs; failures are collected, never thrown
//! - A malformed line is a failure with a generic diagnostic, not a
//!   grader error - a broken script reflects the exercise, and the
//!   learner still deserves a verdict
//! - Deterministic: the same script against equal views yields equal
//!   failure lists
//!
//! Script shape, one assertion per line:
//!
//! ```text
//! // probes: text("tag"), count("tag"), exists("tag"), attr("tag", "name")
//! expect(text("h1")).toBe("Hello, Praxis!")
//! expect(count("p")).toBe(1)
//! expect(exists("h1")).toBeTruthy()
//! expect(attr("p", "class")).toContain("intro")
//! ```

use crate::dom::MountedView;
use praxis_common::types::AssertionFailure;
use std::fmt;

/// Run every assertion in the script and collect the failures
///
/// An empty result means the attempt passed the script.
pub fn run(script: &str, view: &MountedView) -> Vec<AssertionFailure> {
    let mut failures = Vec::new();

    for line in script.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with("//") {
            continue;
        }

        match parse_assertion(line) {
            Ok(assertion) => {
                if let Some(failure) = assertion.check(line, view) {
                    failures.push(failure);
                }
            }
            Err(reason) => failures.push(AssertionFailure {
                expression: line.to_string(),
                expected: "a valid assertion".to_string(),
                actual: reason,
            }),
        }
    }

    failures
}

// ---------------------------------------------------------------------
// Script model
// ---------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
enum Probe {
    Text(String),
    Count(String),
    Exists(String),
    Attr(String, String),
}

#[derive(Debug, Clone, PartialEq)]
enum Matcher {
    ToBe(Lit),
    ToContain(String),
    ToBeTruthy,
    ToExist,
}

#[derive(Debug, Clone, PartialEq)]
enum Lit {
    Str(String),
    Int(i64),
    Bool(bool),
}

impl fmt::Display for Lit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Lit::Str(s) => write!(f, "\"{}\"", s),
            Lit::Int(n) => write!(f, "{}", n),
            Lit::Bool(b) => write!(f, "{}", b),
        }
    }
}

/// What a probe observed on the view
#[derive(Debug, Clone, PartialEq)]
enum Observed {
    Str(String),
    Int(i64),
    Bool(bool),
    /// The probed element or attribute does not exist
    Missing,
}

impl fmt::Display for Observed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Observed::Str(s) => write!(f, "\"{}\"", s),
            Observed::Int(n) => write!(f, "{}", n),
            Observed::Bool(b) => write!(f, "{}", b),
            Observed::Missing => write!(f, "(missing)"),
        }
    }
}

impl Observed {
    fn equals(&self, lit: &Lit) -> bool {
        match (self, lit) {
            (Observed::Str(a), Lit::Str(b)) => a == b,
            (Observed::Int(a), Lit::Int(b)) => a == b,
            (Observed::Bool(a), Lit::Bool(b)) => a == b,
            _ => false,
        }
    }

    fn truthy(&self) -> bool {
        match self {
            Observed::Str(s) => !s.is_empty(),
            Observed::Int(n) => *n != 0,
            Observed::Bool(b) => *b,
            Observed::Missing => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
struct Assertion {
    probe: Probe,
    matcher: Matcher,
}

impl Assertion {
    fn observe(&self, view: &MountedView) -> Observed {
        match &self.probe {
            Probe::Text(tag) => match view.text(tag) {
                Some(text) => Observed::Str(text),
                None => Observed::Missing,
            },
            Probe::Count(tag) => Observed::Int(view.count(tag) as i64),
            Probe::Exists(tag) => Observed::Bool(view.exists(tag)),
            Probe::Attr(tag, name) => match view.attr(tag, name) {
                Some(value) => Observed::Str(value),
                None => Observed::Missing,
            },
        }
    }

    /// `None` means the expectation held
    fn check(&self, expression: &str, view: &MountedView) -> Option<AssertionFailure> {
        let observed = self.observe(view);
        let (holds, expected) = match &self.matcher {
            Matcher::ToBe(lit) => (observed.equals(lit), lit.to_string()),
            Matcher::ToContain(needle) => {
                let holds = matches!(&observed, Observed::Str(s) if s.contains(needle));
                (holds, format!("a string containing \"{}\"", needle))
            }
            Matcher::ToBeTruthy => (observed.truthy(), "a truthy value".to_string()),
            Matcher::ToExist => {
                let holds = !matches!(observed, Observed::Missing | Observed::Bool(false));
                (holds, "a matching element".to_string())
            }
        };

        if holds {
            None
        } else {
            Some(AssertionFailure {
                expression: expression.to_string(),
                expected,
                actual: observed.to_string(),
            })
        }
    }
}

// ---------------------------------------------------------------------
// Line parser
// ---------------------------------------------------------------------

struct LineParser<'a> {
    chars: Vec<char>,
    pos: usize,
    line: &'a str,
}

impl<'a> LineParser<'a> {
    fn new(line: &'a str) -> Self {
        Self {
            chars: line.chars().collect(),
            pos: 0,
            line,
        }
    }

    fn skip_ws(&mut self) {
        while matches!(self.chars.get(self.pos), Some(c) if c.is_whitespace()) {
            self.pos += 1;
        }
    }

    fn eat(&mut self, c: char) -> bool {
        self.skip_ws();
        if self.chars.get(self.pos) == Some(&c) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, c: char) -> Result<(), String> {
        if self.eat(c) {
            Ok(())
        } else {
            Err(format!("expected `{}` in `{}`", c, self.line))
        }
    }

    fn ident(&mut self) -> Result<String, String> {
        self.skip_ws();
        let start = self.pos;
        while matches!(self.chars.get(self.pos), Some(c) if c.is_alphanumeric() || *c == '_') {
            self.pos += 1;
        }
        if self.pos == start {
            return Err(format!("expected a name in `{}`", self.line));
        }
        Ok(self.chars[start..self.pos].iter().collect())
    }

    fn string(&mut self) -> Result<String, String> {
        self.expect('"')?;
        let mut out = String::new();
        loop {
            match self.chars.get(self.pos) {
                Some('"') => {
                    self.pos += 1;
                    return Ok(out);
                }
                Some('\\') => {
                    self.pos += 1;
                    match self.chars.get(self.pos) {
                        Some('"') => out.push('"'),
                        Some('\\') => out.push('\\'),
                        Some('n') => out.push('\n'),
                        Some('t') => out.push('\t'),
                        _ => return Err("bad escape in string".to_string()),
                    }
                    self.pos += 1;
                }
                Some(c) => {
                    out.push(*c);
                    self.pos += 1;
                }
                None => return Err("unterminated string".to_string()),
            }
        }
    }

    fn literal(&mut self) -> Result<Lit, String> {
        self.skip_ws();
        match self.chars.get(self.pos) {
            Some('"') => Ok(Lit::Str(self.string()?)),
            Some(c) if c.is_ascii_digit() || *c == '-' => {
                let start = self.pos;
                if *c == '-' {
                    self.pos += 1;
                }
                while matches!(self.chars.get(self.pos), Some(d) if d.is_ascii_digit()) {
                    self.pos += 1;
                }
                let digits: String = self.chars[start..self.pos].iter().collect();
                digits
                    .parse()
                    .map(Lit::Int)
                    .map_err(|_| format!("bad number `{}`", digits))
            }
            _ => {
                let word = self.ident()?;
                match word.as_str() {
                    "true" => Ok(Lit::Bool(true)),
                    "false" => Ok(Lit::Bool(false)),
                    other => Err(format!("expected a literal, found `{}`", other)),
                }
            }
        }
    }

    fn at_end(&mut self) -> bool {
        self.skip_ws();
        self.pos >= self.chars.len()
    }
}

fn parse_assertion(line: &str) -> Result<Assertion, String> {
    let mut p = LineParser::new(line);

    let head = p.ident()?;
    if head != "expect" {
        return Err(format!("an assertion must start with `expect`, found `{}`", head));
    }
    p.expect('(')?;

    let probe_name = p.ident()?;
    p.expect('(')?;
    let first_arg = p.string()?;
    let probe = match probe_name.as_str() {
        "text" => Probe::Text(first_arg),
        "count" => Probe::Count(first_arg),
        "exists" => Probe::Exists(first_arg),
        "attr" => {
            p.expect(',')?;
            let name = p.string()?;
            Probe::Attr(first_arg, name)
        }
        other => return Err(format!("unknown probe `{}`", other)),
    };
    p.expect(')')?; // close the probe call
    p.expect(')')?; // close expect(...)
    p.expect('.')?;

    let matcher_name = p.ident()?;
    p.expect('(')?;
    let matcher = match matcher_name.as_str() {
        "toBe" | "toEqual" => Matcher::ToBe(p.literal()?),
        "toContain" => Matcher::ToContain(p.string()?),
        "toBeTruthy" => Matcher::ToBeTruthy,
        "toExist" => Matcher::ToExist,
        other => return Err(format!("unknown matcher `{}`", other)),
    };
    p.expect(')')?;

    if !p.at_end() {
        return Err(format!("unexpected trailing input in `{}`", line));
    }

    Ok(Assertion { probe, matcher })
}
