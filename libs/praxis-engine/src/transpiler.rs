//! Transpiler - source analysis front end
//!
//! **Core Responsibility:**
//! Turn a submission's source text into an executable `CompiledModule`.
//!
//! **Critical Architectural Boundary:**
//! - Compilation is pure analysis: lexing, parsing, scope checking
//! - Nothing here ever executes user code
//! - The same source text always compiles to the same module
//!
//! The input language is a small component-oriented UI language: the
//! source must define exactly one `export default fn Name() { ... }`
//! whose trailing expression is the markup the component renders.

use praxis_common::types::SourceLocation;
use std::fmt;

/// Terminal compile failure for an attempt
/// The message is learner-facing and shown verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileError {
    pub message: String,
    pub location: Option<SourceLocation>,
}

impl CompileError {
    fn at(message: impl Into<String>, line: u32, column: u32) -> Self {
        Self {
            message: message.into(),
            location: Some(SourceLocation { line, column }),
        }
    }
}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.location {
            Some(loc) => write!(f, "{} ({})", self.message, loc),
            None => write!(f, "{}", self.message),
        }
    }
}

impl std::error::Error for CompileError {}

/// A fully analyzed, executable module
/// Holds the component's AST; evaluation is the sandbox's job.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledModule {
    pub component_name: String,
    pub body: Block,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    pub stmts: Vec<Stmt>,
    /// Trailing expression: the markup the component renders.
    /// `None` means the body renders nothing (an empty mount).
    pub tail: Option<Expr>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    Let { name: String, value: Expr },
    Assign { name: String, value: Expr },
    While { cond: Expr, body: Vec<Stmt> },
    Expr(Expr),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Eq,
    NotEq,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Int(i64),
    Str(String),
    Bool(bool),
    Var(String),
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Element(ElementLit),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ElementLit {
    pub tag: String,
    pub attrs: Vec<(String, String)>,
    pub children: Vec<ChildLit>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ChildLit {
    Element(ElementLit),
    Text(String),
    Expr(Expr),
}

/// Compile a submission into an executable module
///
/// Pure and deterministic. Malformed input (unbalanced syntax,
/// mismatched tags, undefined identifiers, missing or duplicated
/// default export) yields a `CompileError` with a source location
/// where one is derivable.
pub fn compile(source: &str) -> Result<CompiledModule, CompileError> {
    let tokens = lex(source)?;
    let mut parser = Parser::new(tokens);
    let module = parser.parse_module()?;
    Ok(module)
}

// ---------------------------------------------------------------------
// Lexer
// ---------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
enum Tok {
    Ident(String),
    Int(i64),
    Str(String),
    // keywords
    Export,
    Default,
    Fn,
    Let,
    While,
    True,
    False,
    // punctuation
    LBrace,
    RBrace,
    LParen,
    RParen,
    Semi,
    Assign,
    EqEq,
    NotEq,
    Plus,
    Minus,
    Star,
    Slash,
    Bang,
    // markup
    Lt,      // `<`
    LtSlash, // `</`
    Gt,      // `>`
    SlashGt, // `/>`
}

impl fmt::Display for Tok {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Tok::Ident(name) => write!(f, "`{}`", name),
            Tok::Int(n) => write!(f, "`{}`", n),
            Tok::Str(_) => write!(f, "string literal"),
            Tok::Export => write!(f, "`export`"),
            Tok::Default => write!(f, "`default`"),
            Tok::Fn => write!(f, "`fn`"),
            Tok::Let => write!(f, "`let`"),
            Tok::While => write!(f, "`while`"),
            Tok::True => write!(f, "`true`"),
            Tok::False => write!(f, "`false`"),
            Tok::LBrace => write!(f, "`{{`"),
            Tok::RBrace => write!(f, "`}}`"),
            Tok::LParen => write!(f, "`(`"),
            Tok::RParen => write!(f, "`)`"),
            Tok::Semi => write!(f, "`;`"),
            Tok::Assign => write!(f, "`=`"),
            Tok::EqEq => write!(f, "`==`"),
            Tok::NotEq => write!(f, "`!=`"),
            Tok::Plus => write!(f, "`+`"),
            Tok::Minus => write!(f, "`-`"),
            Tok::Star => write!(f, "`*`"),
            Tok::Slash => write!(f, "`/`"),
            Tok::Bang => write!(f, "`!`"),
            Tok::Lt => write!(f, "`<`"),
            Tok::LtSlash => write!(f, "`</`"),
            Tok::Gt => write!(f, "`>`"),
            Tok::SlashGt => write!(f, "`/>`"),
        }
    }
}

#[derive(Debug, Clone)]
struct Token {
    tok: Tok,
    line: u32,
    col: u32,
}

struct Lexer {
    chars: Vec<char>,
    pos: usize,
    line: u32,
    col: u32,
}

impl Lexer {
    fn new(source: &str) -> Self {
        Self {
            chars: source.chars().collect(),
            pos: 0,
            line: 1,
            col: 1,
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_next(&self) -> Option<char> {
        self.chars.get(self.pos + 1).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += 1;
        if c == '\n' {
            self.line += 1;
            self.col = 1;
        } else {
            self.col += 1;
        }
        Some(c)
    }

    fn skip_trivia(&mut self) {
        loop {
            match self.peek() {
                Some(c) if c.is_whitespace() => {
                    self.bump();
                }
                Some('/') if self.peek_next() == Some('/') => {
                    while let Some(c) = self.peek() {
                        if c == '\n' {
                            break;
                        }
                        self.bump();
                    }
                }
                _ => break,
            }
        }
    }

    fn string_literal(&mut self, line: u32, col: u32) -> Result<String, CompileError> {
        // opening quote already consumed
        let mut out = String::new();
        loop {
            match self.bump() {
                Some('"') => return Ok(out),
                Some('\\') => match self.bump() {
                    Some('"') => out.push('"'),
                    Some('\\') => out.push('\\'),
                    Some('n') => out.push('\n'),
                    Some('t') => out.push('\t'),
                    Some(other) => {
                        return Err(CompileError::at(
                            format!("unknown escape sequence `\\{}`", other),
                            line,
                            col,
                        ))
                    }
                    None => {
                        return Err(CompileError::at("unterminated string literal", line, col))
                    }
                },
                Some('\n') | None => {
                    return Err(CompileError::at("unterminated string literal", line, col))
                }
                Some(c) => out.push(c),
            }
        }
    }
}

fn keyword(word: &str) -> Option<Tok> {
    match word {
        "export" => Some(Tok::Export),
        "default" => Some(Tok::Default),
        "fn" => Some(Tok::Fn),
        "let" => Some(Tok::Let),
        "while" => Some(Tok::While),
        "true" => Some(Tok::True),
        "false" => Some(Tok::False),
        _ => None,
    }
}

fn lex(source: &str) -> Result<Vec<Token>, CompileError> {
    let mut lexer = Lexer::new(source);
    let mut tokens = Vec::new();

    loop {
        lexer.skip_trivia();
        let line = lexer.line;
        let col = lexer.col;
        let c = match lexer.bump() {
            Some(c) => c,
            None => break,
        };

        let tok = match c {
            '{' => Tok::LBrace,
            '}' => Tok::RBrace,
            '(' => Tok::LParen,
            ')' => Tok::RParen,
            ';' => Tok::Semi,
            '+' => Tok::Plus,
            '-' => Tok::Minus,
            '*' => Tok::Star,
            '=' => {
                if lexer.peek() == Some('=') {
                    lexer.bump();
                    Tok::EqEq
                } else {
                    Tok::Assign
                }
            }
            '!' => {
                if lexer.peek() == Some('=') {
                    lexer.bump();
                    Tok::NotEq
                } else {
                    Tok::Bang
                }
            }
            '<' => {
                if lexer.peek() == Some('/') {
                    lexer.bump();
                    Tok::LtSlash
                } else {
                    Tok::Lt
                }
            }
            '>' => Tok::Gt,
            '/' => {
                if lexer.peek() == Some('>') {
                    lexer.bump();
                    Tok::SlashGt
                } else {
                    Tok::Slash
                }
            }
            '"' => Tok::Str(lexer.string_literal(line, col)?),
            c if c.is_ascii_digit() => {
                let mut digits = String::new();
                digits.push(c);
                while let Some(d) = lexer.peek() {
                    if d.is_ascii_digit() {
                        digits.push(d);
                        lexer.bump();
                    } else {
                        break;
                    }
                }
                let value: i64 = digits.parse().map_err(|_| {
                    CompileError::at(format!("integer literal `{}` is too large", digits), line, col)
                })?;
                Tok::Int(value)
            }
            c if c.is_alphabetic() || c == '_' => {
                let mut word = String::new();
                word.push(c);
                while let Some(n) = lexer.peek() {
                    if n.is_alphanumeric() || n == '_' {
                        word.push(n);
                        lexer.bump();
                    } else {
                        break;
                    }
                }
                keyword(&word).unwrap_or(Tok::Ident(word))
            }
            other => {
                return Err(CompileError::at(
                    format!("unexpected character `{}`", other),
                    line,
                    col,
                ))
            }
        };

        tokens.push(Token { tok, line, col });
    }

    Ok(tokens)
}

// ---------------------------------------------------------------------
// Parser
// ---------------------------------------------------------------------

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    /// Names in scope for the single component body. The language has
    /// flat function scope: a `let` anywhere in the body binds the name
    /// for the rest of the body, loop bodies included.
    scope: Vec<String>,
}

impl Parser {
    fn new(tokens: Vec<Token>) -> Self {
        Self {
            tokens,
            pos: 0,
            scope: Vec::new(),
        }
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn peek_ahead(&self, n: usize) -> Option<&Token> {
        self.tokens.get(self.pos + n)
    }

    fn bump(&mut self) -> Option<Token> {
        let t = self.tokens.get(self.pos).cloned();
        if t.is_some() {
            self.pos += 1;
        }
        t
    }

    fn eof_location(&self) -> (u32, u32) {
        match self.tokens.last() {
            Some(t) => (t.line, t.col),
            None => (1, 1),
        }
    }

    fn unexpected_end(&self, expected: &str) -> CompileError {
        let (line, col) = self.eof_location();
        CompileError::at(format!("unexpected end of input, expected {}", expected), line, col)
    }

    fn expect(&mut self, want: Tok, expected: &str) -> Result<Token, CompileError> {
        match self.bump() {
            Some(t) if t.tok == want => Ok(t),
            Some(t) => Err(CompileError::at(
                format!("unexpected token {}, expected {}", t.tok, expected),
                t.line,
                t.col,
            )),
            None => Err(self.unexpected_end(expected)),
        }
    }

    fn expect_ident(&mut self, expected: &str) -> Result<(String, Token), CompileError> {
        match self.bump() {
            Some(t) => match t.tok.clone() {
                Tok::Ident(name) => Ok((name, t)),
                other => Err(CompileError::at(
                    format!("unexpected token {}, expected {}", other, expected),
                    t.line,
                    t.col,
                )),
            },
            None => Err(self.unexpected_end(expected)),
        }
    }

    fn parse_module(&mut self) -> Result<CompiledModule, CompileError> {
        if self.peek().is_none() {
            return Err(CompileError {
                message: "empty source: expected exactly one `export default fn` component"
                    .to_string(),
                location: None,
            });
        }

        self.expect(Tok::Export, "`export`")?;
        self.expect(Tok::Default, "`default` after `export`")?;
        self.expect(Tok::Fn, "`fn` after `export default`")?;
        let (component_name, _) = self.expect_ident("a component name")?;
        self.expect(Tok::LParen, "`(` after the component name")?;
        self.expect(Tok::RParen, "`)` (components take no parameters)")?;

        let body = self.parse_block()?;

        if let Some(extra) = self.peek() {
            let message = if extra.tok == Tok::Export {
                "only one `export default fn` component is allowed".to_string()
            } else {
                format!("unexpected token {} after the component body", extra.tok)
            };
            return Err(CompileError::at(message, extra.line, extra.col));
        }

        Ok(CompiledModule {
            component_name,
            body,
        })
    }

    fn parse_block(&mut self) -> Result<Block, CompileError> {
        self.expect(Tok::LBrace, "`{`")?;
        let mut stmts = Vec::new();
        let mut tail = None;

        loop {
            match self.peek().map(|t| t.tok.clone()) {
                None => return Err(self.unexpected_end("`}`")),
                Some(Tok::RBrace) => {
                    self.bump();
                    break;
                }
                Some(Tok::Let) => {
                    self.bump();
                    let (name, _) = self.expect_ident("a variable name after `let`")?;
                    self.expect(Tok::Assign, "`=` after the variable name")?;
                    let value = self.parse_expr()?;
                    self.expect(Tok::Semi, "`;` after the `let` binding")?;
                    self.scope.push(name.clone());
                    stmts.push(Stmt::Let { name, value });
                }
                Some(Tok::While) => {
                    self.bump();
                    let cond = self.parse_expr()?;
                    let body = self.parse_loop_body()?;
                    stmts.push(Stmt::While { cond, body });
                }
                Some(Tok::Ident(_))
                    if matches!(self.peek_ahead(1).map(|t| &t.tok), Some(Tok::Assign)) =>
                {
                    let (name, token) = self.expect_ident("a variable name")?;
                    if !self.scope.contains(&name) {
                        return Err(CompileError::at(
                            format!("undefined identifier `{}`", name),
                            token.line,
                            token.col,
                        ));
                    }
                    self.bump(); // `=`
                    let value = self.parse_expr()?;
                    self.expect(Tok::Semi, "`;` after the assignment")?;
                    stmts.push(Stmt::Assign { name, value });
                }
                Some(_) => {
                    let expr = self.parse_expr()?;
                    match self.peek().map(|t| t.tok.clone()) {
                        Some(Tok::Semi) => {
                            self.bump();
                            stmts.push(Stmt::Expr(expr));
                        }
                        Some(Tok::RBrace) => {
                            self.bump();
                            tail = Some(expr);
                            break;
                        }
                        Some(_) => {
                            let t = self.peek().cloned();
                            let t = match t {
                                Some(t) => t,
                                None => return Err(self.unexpected_end("`;` or `}`")),
                            };
                            return Err(CompileError::at(
                                format!("unexpected token {}, expected `;` or `}}`", t.tok),
                                t.line,
                                t.col,
                            ));
                        }
                        None => return Err(self.unexpected_end("`;` or `}`")),
                    }
                }
            }
        }

        Ok(Block { stmts, tail })
    }

    /// Loop bodies reuse block parsing; a trailing bare expression in a
    /// loop body is just an expression statement (loops render nothing).
    fn parse_loop_body(&mut self) -> Result<Vec<Stmt>, CompileError> {
        let block = self.parse_block()?;
        let mut stmts = block.stmts;
        if let Some(tail) = block.tail {
            stmts.push(Stmt::Expr(tail));
        }
        Ok(stmts)
    }

    fn parse_expr(&mut self) -> Result<Expr, CompileError> {
        self.parse_equality()
    }

    fn parse_equality(&mut self) -> Result<Expr, CompileError> {
        let mut lhs = self.parse_additive()?;
        loop {
            let op = match self.peek().map(|t| &t.tok) {
                Some(Tok::EqEq) => BinaryOp::Eq,
                Some(Tok::NotEq) => BinaryOp::NotEq,
                _ => break,
            };
            self.bump();
            let rhs = self.parse_additive()?;
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
        Ok(lhs)
    }

    fn parse_additive(&mut self) -> Result<Expr, CompileError> {
        let mut lhs = self.parse_multiplicative()?;
        loop {
            let op = match self.peek().map(|t| &t.tok) {
                Some(Tok::Plus) => BinaryOp::Add,
                Some(Tok::Minus) => BinaryOp::Sub,
                _ => break,
            };
            self.bump();
            let rhs = self.parse_multiplicative()?;
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
        Ok(lhs)
    }

    fn parse_multiplicative(&mut self) -> Result<Expr, CompileError> {
        let mut lhs = self.parse_unary()?;
        loop {
            let op = match self.peek().map(|t| &t.tok) {
                Some(Tok::Star) => BinaryOp::Mul,
                Some(Tok::Slash) => BinaryOp::Div,
                _ => break,
            };
            self.bump();
            let rhs = self.parse_unary()?;
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> Result<Expr, CompileError> {
        match self.peek().map(|t| &t.tok) {
            Some(Tok::Minus) => {
                self.bump();
                let operand = self.parse_unary()?;
                Ok(Expr::Unary {
                    op: UnaryOp::Neg,
                    operand: Box::new(operand),
                })
            }
            Some(Tok::Bang) => {
                self.bump();
                let operand = self.parse_unary()?;
                Ok(Expr::Unary {
                    op: UnaryOp::Not,
                    operand: Box::new(operand),
                })
            }
            _ => self.parse_primary(),
        }
    }

    fn parse_primary(&mut self) -> Result<Expr, CompileError> {
        let token = match self.bump() {
            Some(t) => t,
            None => return Err(self.unexpected_end("an expression")),
        };

        match token.tok {
            Tok::Int(n) => Ok(Expr::Int(n)),
            Tok::Str(s) => Ok(Expr::Str(s)),
            Tok::True => Ok(Expr::Bool(true)),
            Tok::False => Ok(Expr::Bool(false)),
            Tok::Ident(name) => {
                if !self.scope.contains(&name) {
                    return Err(CompileError::at(
                        format!("undefined identifier `{}`", name),
                        token.line,
                        token.col,
                    ));
                }
                Ok(Expr::Var(name))
            }
            Tok::LParen => {
                let inner = self.parse_expr()?;
                self.expect(Tok::RParen, "`)`")?;
                Ok(inner)
            }
            Tok::Lt => {
                let element = self.parse_element()?;
                Ok(Expr::Element(element))
            }
            other => Err(CompileError::at(
                format!("unexpected token {}, expected an expression", other),
                token.line,
                token.col,
            )),
        }
    }

    /// Parse an element literal; the opening `<` is already consumed.
    fn parse_element(&mut self) -> Result<ElementLit, CompileError> {
        let (tag, open_token) = self.expect_ident("a tag name after `<`")?;

        let mut attrs = Vec::new();
        loop {
            match self.peek().map(|t| t.tok.clone()) {
                Some(Tok::Ident(_)) => {
                    let (name, _) = self.expect_ident("an attribute name")?;
                    self.expect(Tok::Assign, "`=` after the attribute name")?;
                    let value_token = match self.bump() {
                        Some(t) => t,
                        None => return Err(self.unexpected_end("an attribute value")),
                    };
                    match value_token.tok {
                        Tok::Str(value) => attrs.push((name, value)),
                        other => {
                            return Err(CompileError::at(
                                format!(
                                    "unexpected token {}, attribute values must be string literals",
                                    other
                                ),
                                value_token.line,
                                value_token.col,
                            ))
                        }
                    }
                }
                Some(Tok::SlashGt) => {
                    self.bump();
                    return Ok(ElementLit {
                        tag,
                        attrs,
                        children: Vec::new(),
                    });
                }
                Some(Tok::Gt) => {
                    self.bump();
                    break;
                }
                Some(_) => {
                    let t = match self.peek().cloned() {
                        Some(t) => t,
                        None => return Err(self.unexpected_end("`>` or `/>`")),
                    };
                    return Err(CompileError::at(
                        format!("unexpected token {} inside `<{}>`", t.tok, tag),
                        t.line,
                        t.col,
                    ));
                }
                None => return Err(self.unexpected_end("`>` or `/>`")),
            }
        }

        let mut children = Vec::new();
        loop {
            match self.peek().map(|t| t.tok.clone()) {
                Some(Tok::Lt) => {
                    self.bump();
                    children.push(ChildLit::Element(self.parse_element()?));
                }
                Some(Tok::Str(text)) => {
                    self.bump();
                    children.push(ChildLit::Text(text));
                }
                Some(Tok::LBrace) => {
                    self.bump();
                    let expr = self.parse_expr()?;
                    self.expect(Tok::RBrace, "`}` to close the interpolation")?;
                    children.push(ChildLit::Expr(expr));
                }
                Some(Tok::LtSlash) => {
                    self.bump();
                    let (close_tag, close_token) = self.expect_ident("a closing tag name")?;
                    self.expect(Tok::Gt, "`>` after the closing tag name")?;
                    if close_tag != tag {
                        return Err(CompileError::at(
                            format!(
                                "mismatched closing tag: expected `</{}>`, found `</{}>`",
                                tag, close_tag
                            ),
                            close_token.line,
                            close_token.col,
                        ));
                    }
                    return Ok(ElementLit {
                        tag,
                        attrs,
                        children,
                    });
                }
                Some(other) => {
                    let t = match self.peek().cloned() {
                        Some(t) => t,
                        None => return Err(self.unexpected_end("a child or closing tag")),
                    };
                    return Err(CompileError::at(
                        format!("unexpected token {} inside `<{}>...</{}>`", other, tag, tag),
                        t.line,
                        t.col,
                    ));
                }
                None => {
                    return Err(CompileError::at(
                        format!("unclosed element `<{}>`", tag),
                        open_token.line,
                        open_token.col,
                    ))
                }
            }
        }
    }
}
