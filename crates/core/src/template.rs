//! A small text template language used for LLM prompts.
//!
//! Supported syntax:
//!
//! - `{name}` and `{item.field}` substitute a value. Only identifier-shaped
//!   placeholders are recognized, so JSON braces in a template stay literal.
//! - `{% for x in list %}...{% endfor %}` repeats a block per list item.
//! - `{% if name %}...{% else %}...{% endif %}` branches on truthiness, and
//!   `{% if name == "value" %}` compares against a string literal.
//!
//! Unresolved variables render as the empty string. Substituted values are
//! inserted verbatim and never scanned for further tags.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::OnceLock;

use regex_lite::Regex;
use tracing::debug;

use crate::errors::TemplateError;

// ---------------------------------------------------------------------------
// Values
// ---------------------------------------------------------------------------

/// A value that can be bound into a template [`Context`].
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Text(String),
    Bool(bool),
    List(Vec<Value>),
    Map(BTreeMap<String, Value>),
}

impl Value {
    fn is_truthy(&self) -> bool {
        match self {
            Self::Text(s) => !s.is_empty(),
            Self::Bool(b) => *b,
            Self::List(items) => !items.is_empty(),
            Self::Map(fields) => !fields.is_empty(),
        }
    }

    fn render(&self) -> String {
        match self {
            Self::Text(s) => s.clone(),
            Self::Bool(b) => b.to_string(),
            Self::List(items) => items
                .iter()
                .map(Value::render)
                .collect::<Vec<_>>()
                .join("\n"),
            Self::Map(_) => String::new(),
        }
    }

    fn field(&self, name: &str) -> Option<&Value> {
        match self {
            Self::Map(fields) => fields.get(name),
            _ => None,
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<usize> for Value {
    fn from(n: usize) -> Self {
        Self::Text(n.to_string())
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(items: Vec<T>) -> Self {
        Self::List(items.into_iter().map(Into::into).collect())
    }
}

/// Variables available while rendering.
#[derive(Debug, Clone, Default)]
pub struct Context {
    vars: BTreeMap<String, Value>,
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `name` to `value`, replacing any previous binding.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Value>) -> &mut Self {
        self.vars.insert(name.into(), value.into());
        self
    }
}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
enum Condition {
    Truthy(String),
    Equals(String, String),
}

#[derive(Debug, Clone, PartialEq)]
enum Node {
    Text(String),
    Var(String),
    For {
        binding: String,
        source: String,
        body: Vec<Node>,
    },
    If {
        condition: Condition,
        then: Vec<Node>,
        otherwise: Vec<Node>,
    },
}

enum Token {
    Text(String),
    Var(String),
    Tag(String),
}

fn token_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"\{%\s*(.*?)\s*%\}|\{([A-Za-z_][A-Za-z0-9_.]*)\}")
            .unwrap_or_else(|e| panic!("template token pattern is invalid: {e}"))
    })
}

fn tokenize(source: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut last = 0;
    for caps in token_pattern().captures_iter(source) {
        let Some(whole) = caps.get(0) else { continue };
        if whole.start() > last {
            tokens.push(Token::Text(source[last..whole.start()].to_string()));
        }
        if let Some(tag) = caps.get(1) {
            tokens.push(Token::Tag(tag.as_str().to_string()));
        } else if let Some(var) = caps.get(2) {
            tokens.push(Token::Var(var.as_str().to_string()));
        }
        last = whole.end();
    }
    if last < source.len() {
        tokens.push(Token::Text(source[last..].to_string()));
    }
    tokens
}

/// Which closing tag ended a block.
#[derive(Debug, PartialEq)]
enum Terminator {
    Eof,
    EndFor,
    Else,
    EndIf,
}

struct Parser {
    tokens: std::vec::IntoIter<Token>,
}

impl Parser {
    fn parse_block(&mut self) -> Result<(Vec<Node>, Terminator), TemplateError> {
        let mut nodes = Vec::new();
        while let Some(token) = self.tokens.next() {
            match token {
                Token::Text(text) => nodes.push(Node::Text(text)),
                Token::Var(name) => nodes.push(Node::Var(name)),
                Token::Tag(tag) => {
                    let words: Vec<&str> = tag.split_whitespace().collect();
                    match words.as_slice() {
                        ["endfor"] => return Ok((nodes, Terminator::EndFor)),
                        ["else"] => return Ok((nodes, Terminator::Else)),
                        ["endif"] => return Ok((nodes, Terminator::EndIf)),
                        ["for", binding, "in", source] => {
                            let (body, end) = self.parse_block()?;
                            if end != Terminator::EndFor {
                                return Err(TemplateError::Syntax(format!(
                                    "'{{% for {binding} in {source} %}}' is not closed by endfor"
                                )));
                            }
                            nodes.push(Node::For {
                                binding: binding.to_string(),
                                source: source.to_string(),
                                body,
                            });
                        }
                        ["if", ..] => {
                            let condition = parse_condition(&tag)?;
                            let (then, end) = self.parse_block()?;
                            let otherwise = match end {
                                Terminator::EndIf => Vec::new(),
                                Terminator::Else => {
                                    let (otherwise, end) = self.parse_block()?;
                                    if end != Terminator::EndIf {
                                        return Err(TemplateError::Syntax(format!(
                                            "'{{% {tag} %}}' else branch is not closed by endif"
                                        )));
                                    }
                                    otherwise
                                }
                                _ => {
                                    return Err(TemplateError::Syntax(format!(
                                        "'{{% {tag} %}}' is not closed by endif"
                                    )))
                                }
                            };
                            nodes.push(Node::If {
                                condition,
                                then,
                                otherwise,
                            });
                        }
                        _ => {
                            return Err(TemplateError::Syntax(format!(
                                "unknown tag '{{% {tag} %}}'"
                            )))
                        }
                    }
                }
            }
        }
        Ok((nodes, Terminator::Eof))
    }
}

fn parse_condition(tag: &str) -> Result<Condition, TemplateError> {
    let expr = tag.trim_start_matches("if").trim();
    if let Some((lhs, rhs)) = expr.split_once("==") {
        let rhs = rhs.trim();
        let literal = rhs
            .strip_prefix('"')
            .and_then(|r| r.strip_suffix('"'))
            .ok_or_else(|| {
                TemplateError::Syntax(format!("expected a quoted string in '{{% {tag} %}}'"))
            })?;
        return Ok(Condition::Equals(lhs.trim().to_string(), literal.to_string()));
    }
    if expr.is_empty() || expr.contains(char::is_whitespace) {
        return Err(TemplateError::Syntax(format!(
            "malformed condition in '{{% {tag} %}}'"
        )));
    }
    Ok(Condition::Truthy(expr.to_string()))
}

// ---------------------------------------------------------------------------
// Template
// ---------------------------------------------------------------------------

/// A parsed template, ready to render any number of times.
#[derive(Debug, Clone)]
pub struct Template {
    nodes: Vec<Node>,
}

impl Template {
    /// Parse template source text.
    pub fn parse(source: &str) -> Result<Self, TemplateError> {
        let mut parser = Parser {
            tokens: tokenize(source).into_iter(),
        };
        let (nodes, end) = parser.parse_block()?;
        match end {
            Terminator::Eof => Ok(Self { nodes }),
            Terminator::EndFor => Err(TemplateError::Syntax("endfor without for".into())),
            Terminator::Else => Err(TemplateError::Syntax("else without if".into())),
            Terminator::EndIf => Err(TemplateError::Syntax("endif without if".into())),
        }
    }

    /// Read and parse a template file.
    pub fn load(path: &Path) -> Result<Self, TemplateError> {
        if !path.exists() {
            return Err(TemplateError::NotFound(path.to_path_buf()));
        }
        debug!(path = %path.display(), "loading template");
        let source = std::fs::read_to_string(path)?;
        Self::parse(&source)
    }

    /// Render with the given variables.
    pub fn render(&self, ctx: &Context) -> String {
        let mut out = String::new();
        let mut scopes: Vec<(String, Value)> = Vec::new();
        render_nodes(&self.nodes, ctx, &mut scopes, &mut out);
        out
    }
}

fn lookup<'a>(path: &str, ctx: &'a Context, scopes: &'a [(String, Value)]) -> Option<&'a Value> {
    let mut parts = path.split('.');
    let head = parts.next()?;
    let mut value = scopes
        .iter()
        .rev()
        .find(|(name, _)| name == head)
        .map(|(_, v)| v)
        .or_else(|| ctx.vars.get(head))?;
    for part in parts {
        value = value.field(part)?;
    }
    Some(value)
}

fn render_nodes(
    nodes: &[Node],
    ctx: &Context,
    scopes: &mut Vec<(String, Value)>,
    out: &mut String,
) {
    for node in nodes {
        match node {
            Node::Text(text) => out.push_str(text),
            Node::Var(name) => {
                if let Some(value) = lookup(name, ctx, scopes) {
                    out.push_str(&value.render());
                }
            }
            Node::For {
                binding,
                source,
                body,
            } => {
                let items = match lookup(source, ctx, scopes) {
                    Some(Value::List(items)) => items.clone(),
                    _ => continue,
                };
                for item in items {
                    scopes.push((binding.clone(), item));
                    render_nodes(body, ctx, scopes, out);
                    scopes.pop();
                }
            }
            Node::If {
                condition,
                then,
                otherwise,
            } => {
                let holds = match condition {
                    Condition::Truthy(name) => {
                        lookup(name, ctx, scopes).is_some_and(Value::is_truthy)
                    }
                    Condition::Equals(name, literal) => lookup(name, ctx, scopes)
                        .is_some_and(|v| v.render() == *literal),
                };
                let branch = if holds { then } else { otherwise };
                render_nodes(branch, ctx, scopes, out);
            }
        }
    }
}
