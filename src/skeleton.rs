//! Command skeletons: the templater that turns bound values into CLI text.
//!
//! Syntax:
//!
//! - `{name}` / `{after.mtu}`: placeholder, dotted names walk into records
//! - `{% if (guard) %} ... {% else %} ... {% endif %}`: conditional, `!guard` negates
//! - `{% for item in seq counter=i %} ... {% endfor %}`: loop, the counter is optional
//!
//! A loop that reuses the counter name of an enclosing loop does not iterate;
//! it renders only the element at the enclosing loop's index. This zips two
//! parallel sequences, the inverse of positional extraction.
//!
//! Rendering rules for missing data:
//!
//! - a placeholder bound to `Null` renders as `""` outside conditionals
//! - inside a conditional, a null or unbound placeholder suppresses the whole
//!   enclosing branch
//! - an unbound placeholder outside any conditional is a
//!   [`ReconcileError::TemplateBindingError`]

use std::collections::BTreeMap;

use log::trace;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::ReconcileError;
use crate::model::{Entity, Value};
use crate::path::Path;

static TOKEN: Lazy<Regex> = Lazy::new(|| {
    match Regex::new(r"(?s)\{%\s*(?<tag>.*?)\s*%\}|\{(?<var>[A-Za-z_][A-Za-z0-9_.\-]*)\}") {
        Ok(re) => re,
        Err(err) => panic!("invalid skeleton token regex: {err}"),
    }
});

static IF_TAG: Lazy<Regex> = Lazy::new(|| {
    match Regex::new(r"^if(?:\s+|\s*\()\s*(?<neg>!)?\s*(?<name>[A-Za-z_][A-Za-z0-9_.\-]*)\s*\)?$") {
        Ok(re) => re,
        Err(err) => panic!("invalid skeleton if regex: {err}"),
    }
});

static FOR_TAG: Lazy<Regex> = Lazy::new(|| {
    match Regex::new(
        r"^for\s+(?<var>[A-Za-z_]\w*)\s+in\s+(?<seq>[A-Za-z_][A-Za-z0-9_.\-]*)(?:\s+counter\s*=\s*(?<counter>[A-Za-z_]\w*))?$",
    ) {
        Ok(re) => re,
        Err(err) => panic!("invalid skeleton for regex: {err}"),
    }
});

/// Named values visible to a skeleton.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Bindings {
    values: BTreeMap<String, Value>,
}

impl Bindings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds every key of `path` under its entity type name.
    ///
    /// The last key is additionally bound as `key`.
    pub fn from_path(path: &Path) -> Self {
        let mut bindings = Self::new();
        for (entity_type, key) in path.keys() {
            bindings.insert(entity_type, Value::Str(key.to_string()));
        }
        if let Some(key) = path.key() {
            bindings.insert("key", Value::Str(key.to_string()));
        }
        bindings
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.values.insert(name.into(), value.into());
    }

    /// Binds an entity as a record, or `Null` when it is absent.
    pub fn insert_entity(&mut self, name: impl Into<String>, entity: Option<&Entity>) {
        let value = entity.map(Entity::to_value).unwrap_or(Value::Null);
        self.values.insert(name.into(), value);
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Guard {
    name: String,
    negate: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Node {
    Text(String),
    Var(String),
    If {
        guard: Guard,
        then: Vec<Node>,
        otherwise: Vec<Node>,
    },
    For {
        var: String,
        seq: String,
        counter: Option<String>,
        body: Vec<Node>,
    },
}

enum Token {
    Text(String),
    Var(String),
    If(Guard),
    Else,
    EndIf,
    For {
        var: String,
        seq: String,
        counter: Option<String>,
    },
    EndFor,
}

/// A parsed command skeleton.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Skeleton {
    source: String,
    nodes: Vec<Node>,
}

impl Skeleton {
    /// Parses skeleton text. Unbalanced or unknown tags are rejected here,
    /// never at render time.
    pub fn parse(source: &str) -> Result<Self, ReconcileError> {
        let tokens = tokenize(source)?;
        let mut pos = 0;
        let (nodes, terminator) = parse_block(&tokens, &mut pos)?;
        if let Some(term) = terminator {
            return Err(ReconcileError::InvalidSkeleton(format!(
                "unexpected '{term}' in '{source}'"
            )));
        }
        Ok(Self {
            source: source.to_string(),
            nodes,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Every binding name the skeleton mentions (placeholders, guards and
    /// loop sequences), excluding loop-local variables.
    pub fn references(&self) -> Vec<String> {
        let mut refs = Vec::new();
        collect_refs(&self.nodes, &mut Vec::new(), &mut refs);
        refs.sort();
        refs.dedup();
        refs
    }

    /// Renders the skeleton to raw text.
    pub fn render(&self, bindings: &Bindings) -> Result<String, ReconcileError> {
        let mut scope = Scope {
            bindings,
            locals: Vec::new(),
            counters: Vec::new(),
        };
        let mut out = String::new();
        match self.render_nodes(&self.nodes, &mut scope, false, &mut out) {
            Ok(()) => Ok(out),
            Err(Fault::Fail(err)) => Err(err),
            // Only produced below a conditional, which absorbs it.
            Err(Fault::Suppress) => Err(ReconcileError::InternalError(format!(
                "suppression escaped conditional in '{}'",
                self.source
            ))),
        }
    }

    /// Renders the skeleton and splits it into trimmed, non-empty command lines.
    pub fn render_lines(&self, bindings: &Bindings) -> Result<Vec<String>, ReconcileError> {
        let text = self.render(bindings)?;
        let lines = text
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect::<Vec<_>>();
        trace!("skeleton '{}' rendered {:?}", self.source, lines);
        Ok(lines)
    }

    fn render_nodes(
        &self,
        nodes: &[Node],
        scope: &mut Scope<'_>,
        guarded: bool,
        out: &mut String,
    ) -> Result<(), Fault> {
        for node in nodes {
            match node {
                Node::Text(text) => out.push_str(text),
                Node::Var(name) => match scope.lookup(name) {
                    Lookup::Found(value) => {
                        let text = value.to_string();
                        // A bound value must never add lines to the batch.
                        if text.contains(['\r', '\n']) {
                            return Err(Fault::Fail(ReconcileError::MalformedValue {
                                field: name.clone(),
                                raw: text,
                                reason: "line break in rendered value".to_string(),
                            }));
                        }
                        out.push_str(&text);
                    }
                    Lookup::Null if guarded => return Err(Fault::Suppress),
                    Lookup::Null => {}
                    Lookup::Missing if guarded => return Err(Fault::Suppress),
                    Lookup::Missing => return Err(self.unbound(name)),
                },
                Node::If {
                    guard,
                    then,
                    otherwise,
                } => {
                    let truthy = match scope.lookup(&guard.name) {
                        Lookup::Found(value) => value.is_truthy(),
                        Lookup::Null | Lookup::Missing => false,
                    };
                    let branch = if truthy != guard.negate { then } else { otherwise };
                    let mut buf = String::new();
                    match self.render_nodes(branch, scope, true, &mut buf) {
                        Ok(()) => out.push_str(&buf),
                        Err(Fault::Suppress) => {}
                        Err(fail) => return Err(fail),
                    }
                }
                Node::For {
                    var,
                    seq,
                    counter,
                    body,
                } => {
                    let items = match scope.lookup(seq) {
                        Lookup::Found(Value::List(items)) => items,
                        Lookup::Found(other) => vec![other],
                        Lookup::Null if guarded => return Err(Fault::Suppress),
                        Lookup::Null => Vec::new(),
                        Lookup::Missing if guarded => return Err(Fault::Suppress),
                        Lookup::Missing => return Err(self.unbound(seq)),
                    };
                    let zipped_index = counter.as_ref().and_then(|c| scope.counter(c));
                    match zipped_index {
                        Some(index) => {
                            if let Some(item) = items.into_iter().nth(index) {
                                scope.locals.push((var.clone(), item));
                                let result = self.render_nodes(body, scope, guarded, out);
                                scope.locals.pop();
                                result?;
                            }
                        }
                        None => {
                            for (index, item) in items.into_iter().enumerate() {
                                scope.locals.push((var.clone(), item));
                                if let Some(counter) = counter {
                                    scope.counters.push((counter.clone(), index));
                                    scope
                                        .locals
                                        .push((counter.clone(), Value::Int(index as i64)));
                                }
                                let result = self.render_nodes(body, scope, guarded, out);
                                if counter.is_some() {
                                    scope.counters.pop();
                                    scope.locals.pop();
                                }
                                scope.locals.pop();
                                result?;
                            }
                        }
                    }
                }
            }
        }
        Ok(())
    }

    fn unbound(&self, name: &str) -> Fault {
        Fault::Fail(ReconcileError::TemplateBindingError {
            skeleton: self.source.clone(),
            binding: name.to_string(),
        })
    }
}

enum Fault {
    Suppress,
    Fail(ReconcileError),
}

enum Lookup {
    Found(Value),
    Null,
    Missing,
}

struct Scope<'b> {
    bindings: &'b Bindings,
    locals: Vec<(String, Value)>,
    counters: Vec<(String, usize)>,
}

impl Scope<'_> {
    fn counter(&self, name: &str) -> Option<usize> {
        self.counters
            .iter()
            .rev()
            .find(|(n, _)| n == name)
            .map(|(_, index)| *index)
    }

    fn lookup(&self, dotted: &str) -> Lookup {
        let mut parts = dotted.split('.');
        let Some(head) = parts.next() else {
            return Lookup::Missing;
        };
        let root = self
            .locals
            .iter()
            .rev()
            .find(|(name, _)| name == head)
            .map(|(_, value)| value)
            .or_else(|| self.bindings.get(head));
        let Some(mut current) = root else {
            return Lookup::Missing;
        };
        for part in parts {
            match current {
                Value::Null => return Lookup::Null,
                Value::Record(map) => match map.get(part) {
                    Some(next) => current = next,
                    None => return Lookup::Missing,
                },
                _ => return Lookup::Missing,
            }
        }
        if current.is_null() {
            Lookup::Null
        } else {
            Lookup::Found(current.clone())
        }
    }
}

fn tokenize(source: &str) -> Result<Vec<Token>, ReconcileError> {
    let mut tokens = Vec::new();
    let mut last = 0;
    for caps in TOKEN.captures_iter(source) {
        let Some(whole) = caps.get(0) else { continue };
        if whole.start() > last {
            tokens.push(Token::Text(source[last..whole.start()].to_string()));
        }
        last = whole.end();
        if let Some(var) = caps.name("var") {
            tokens.push(Token::Var(var.as_str().to_string()));
            continue;
        }
        let tag = caps.name("tag").map(|m| m.as_str()).unwrap_or_default();
        tokens.push(parse_tag(tag, source)?);
    }
    if last < source.len() {
        tokens.push(Token::Text(source[last..].to_string()));
    }
    Ok(tokens)
}

fn parse_tag(tag: &str, source: &str) -> Result<Token, ReconcileError> {
    match tag {
        "else" => return Ok(Token::Else),
        "endif" => return Ok(Token::EndIf),
        "endfor" => return Ok(Token::EndFor),
        _ => {}
    }
    if let Some(caps) = IF_TAG.captures(tag) {
        return Ok(Token::If(Guard {
            name: caps["name"].to_string(),
            negate: caps.name("neg").is_some(),
        }));
    }
    if let Some(caps) = FOR_TAG.captures(tag) {
        return Ok(Token::For {
            var: caps["var"].to_string(),
            seq: caps["seq"].to_string(),
            counter: caps.name("counter").map(|m| m.as_str().to_string()),
        });
    }
    Err(ReconcileError::InvalidSkeleton(format!(
        "unknown tag '{{% {tag} %}}' in '{source}'"
    )))
}

/// Parses nodes until a closing tag; returns the tag name that stopped it.
fn parse_block(
    tokens: &[Token],
    pos: &mut usize,
) -> Result<(Vec<Node>, Option<&'static str>), ReconcileError> {
    let mut nodes = Vec::new();
    while let Some(token) = tokens.get(*pos) {
        *pos += 1;
        match token {
            Token::Text(text) => nodes.push(Node::Text(text.clone())),
            Token::Var(name) => nodes.push(Node::Var(name.clone())),
            Token::Else => return Ok((nodes, Some("else"))),
            Token::EndIf => return Ok((nodes, Some("endif"))),
            Token::EndFor => return Ok((nodes, Some("endfor"))),
            Token::If(guard) => {
                let (then, term) = parse_block(tokens, pos)?;
                let otherwise = match term {
                    Some("endif") => Vec::new(),
                    Some("else") => match parse_block(tokens, pos)? {
                        (otherwise, Some("endif")) => otherwise,
                        (_, other) => return Err(unclosed("if", other)),
                    },
                    other => return Err(unclosed("if", other)),
                };
                nodes.push(Node::If {
                    guard: guard.clone(),
                    then,
                    otherwise,
                });
            }
            Token::For { var, seq, counter } => {
                let body = match parse_block(tokens, pos)? {
                    (body, Some("endfor")) => body,
                    (_, other) => return Err(unclosed("for", other)),
                };
                nodes.push(Node::For {
                    var: var.clone(),
                    seq: seq.clone(),
                    counter: counter.clone(),
                    body,
                });
            }
        }
    }
    Ok((nodes, None))
}

fn unclosed(block: &str, found: Option<&str>) -> ReconcileError {
    ReconcileError::InvalidSkeleton(match found {
        Some(tag) => format!("'{block}' block closed by '{tag}'"),
        None => format!("'{block}' block is never closed"),
    })
}

fn note(name: &str, locals: &[String], refs: &mut Vec<String>) {
    let head = name.split('.').next().unwrap_or(name);
    if !locals.iter().any(|l| l == head) {
        refs.push(name.to_string());
    }
}

fn collect_refs(nodes: &[Node], locals: &mut Vec<String>, refs: &mut Vec<String>) {
    for node in nodes {
        match node {
            Node::Text(_) => {}
            Node::Var(name) => note(name, locals, refs),
            Node::If {
                guard,
                then,
                otherwise,
            } => {
                note(&guard.name, locals, refs);
                collect_refs(then, locals, refs);
                collect_refs(otherwise, locals, refs);
            }
            Node::For {
                var,
                seq,
                counter,
                body,
            } => {
                note(seq, locals, refs);
                locals.push(var.clone());
                if let Some(counter) = counter {
                    locals.push(counter.clone());
                }
                collect_refs(body, locals, refs);
                if counter.is_some() {
                    locals.pop();
                }
                locals.pop();
            }
        }
    }
}
