//! Compiled query templates
//!
//! Some list queries need a varying number of structurally identical
//! sub-conditions plus optional fragments. A [`QueryTemplate`] is compiled
//! once (usually into a process-wide `Lazy`) and rendered per call.
//!
//! Rendering substitutes *placeholder names only*. Every substituted value
//! must be a plain identifier, so the rendered text is syntax plus `@name`
//! placeholders; the data itself is bound through [`Statement::params`].
//!
//! ## Syntax
//!
//! ```text
//! {{ .name }}                      identifier from the render data
//! {{ if .name }} .. {{ else }} .. {{ end }}
//! {{ range .name }} .. {{ . }} .. {{ end }}
//! ```
//!
//! A flag is truthy when `true`, a list when non-empty, an identifier always.
//! Referencing a name missing from the render data is an error.

use crate::error::{Error, Result};
use crate::statement::Statement;
use crate::value::Value;
use std::collections::{BTreeMap, HashMap};

#[derive(Debug, Clone, PartialEq)]
enum Node {
    Text(String),
    Var(String),
    Dot,
    If {
        cond: String,
        then: Vec<Node>,
        otherwise: Vec<Node>,
    },
    Range {
        list: String,
        body: Vec<Node>,
    },
}

#[derive(Debug)]
enum Action {
    Var(String),
    Dot,
    If(String),
    Else,
    Range(String),
    End,
}

/// Value available to a template at render time
#[derive(Debug, Clone, PartialEq)]
pub enum TemplateValue {
    /// Conditional switch
    Flag(bool),
    /// Single identifier
    Ident(String),
    /// Identifiers iterated by `range`
    List(Vec<String>),
}

impl TemplateValue {
    fn truthy(&self) -> bool {
        match self {
            TemplateValue::Flag(b) => *b,
            TemplateValue::Ident(_) => true,
            TemplateValue::List(items) => !items.is_empty(),
        }
    }
}

/// Named values for one render
#[derive(Debug, Clone, Default)]
pub struct TemplateData {
    values: HashMap<String, TemplateValue>,
}

impl TemplateData {
    /// Empty render data
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a flag
    pub fn flag(mut self, name: impl Into<String>, value: bool) -> Self {
        self.values.insert(name.into(), TemplateValue::Flag(value));
        self
    }

    /// Add an identifier
    pub fn ident(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.values
            .insert(name.into(), TemplateValue::Ident(value.into()));
        self
    }

    /// Add a list of identifiers
    pub fn list(mut self, name: impl Into<String>, values: Vec<String>) -> Self {
        self.values.insert(name.into(), TemplateValue::List(values));
        self
    }

    fn get(&self, template: &str, name: &str) -> Result<&TemplateValue> {
        self.values
            .get(name)
            .ok_or_else(|| Error::template(template, format!("no value for '.{}'", name)))
    }
}

/// True for `[A-Za-z_][A-Za-z0-9_]*`
pub fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// A parsed, reusable query template
#[derive(Debug, Clone)]
pub struct QueryTemplate {
    name: String,
    nodes: Vec<Node>,
}

impl QueryTemplate {
    /// Compile template source
    ///
    /// # Errors
    ///
    /// Returns a `Template` error for unbalanced delimiters, unknown actions,
    /// or unbalanced `if`/`range`/`end`.
    pub fn compile(name: impl Into<String>, source: &str) -> Result<Self> {
        let name = name.into();
        let mut parser = Parser {
            name: &name,
            source,
            pos: 0,
        };
        let (nodes, terminator) = parser.parse_block()?;
        if let Some(action) = terminator {
            return Err(Error::template(
                &name,
                format!("unexpected {:?} at top level", action),
            ));
        }
        Ok(Self { name, nodes })
    }

    /// Template name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Render to query text
    ///
    /// # Errors
    ///
    /// Returns a `Template` error for missing names, type mismatches, or
    /// substituted values that are not identifiers.
    pub fn render(&self, data: &TemplateData) -> Result<String> {
        let mut out = String::new();
        self.render_nodes(&self.nodes, data, None, &mut out)?;
        Ok(out)
    }

    /// Render and attach bound parameters
    ///
    /// Every `@placeholder` in the rendered text must have a bound value.
    ///
    /// # Errors
    ///
    /// Returns a `Template` error on render failure or for an unbound placeholder.
    pub fn render_statement(
        &self,
        data: &TemplateData,
        params: BTreeMap<String, Value>,
    ) -> Result<Statement> {
        let sql = self.render(data)?;
        for placeholder in placeholders(&sql) {
            if !params.contains_key(&placeholder) {
                return Err(Error::template(
                    &self.name,
                    format!("placeholder '@{}' has no bound value", placeholder),
                ));
            }
        }
        Ok(Statement { sql, params })
    }

    fn render_nodes(
        &self,
        nodes: &[Node],
        data: &TemplateData,
        dot: Option<&str>,
        out: &mut String,
    ) -> Result<()> {
        for node in nodes {
            match node {
                Node::Text(text) => out.push_str(text),
                Node::Dot => match dot {
                    Some(item) => out.push_str(self.checked_ident(item)?),
                    None => {
                        return Err(Error::template(&self.name, "'.' used outside of range"))
                    }
                },
                Node::Var(name) => match data.get(&self.name, name)? {
                    TemplateValue::Ident(ident) => out.push_str(self.checked_ident(ident)?),
                    other => {
                        return Err(Error::template(
                            &self.name,
                            format!("'.{}' is {:?}, not an identifier", name, other),
                        ))
                    }
                },
                Node::If {
                    cond,
                    then,
                    otherwise,
                } => {
                    let branch = if data.get(&self.name, cond)?.truthy() {
                        then
                    } else {
                        otherwise
                    };
                    self.render_nodes(branch, data, dot, out)?;
                }
                Node::Range { list, body } => match data.get(&self.name, list)? {
                    TemplateValue::List(items) => {
                        for item in items {
                            self.render_nodes(body, data, Some(item), out)?;
                        }
                    }
                    other => {
                        return Err(Error::template(
                            &self.name,
                            format!("'.{}' is {:?}, not a list", list, other),
                        ))
                    }
                },
            }
        }
        Ok(())
    }

    fn checked_ident<'a>(&self, value: &'a str) -> Result<&'a str> {
        if is_identifier(value) {
            Ok(value)
        } else {
            Err(Error::template(
                &self.name,
                format!("refusing to substitute non-identifier {:?}", value),
            ))
        }
    }
}

struct Parser<'a> {
    name: &'a str,
    source: &'a str,
    pos: usize,
}

impl Parser<'_> {
    /// Parse nodes until EOF or a block-closing action (`else`/`end`)
    fn parse_block(&mut self) -> Result<(Vec<Node>, Option<Action>)> {
        let mut nodes = Vec::new();
        loop {
            let rest = &self.source[self.pos..];
            let open = match rest.find("{{") {
                Some(i) => i,
                None => {
                    if rest.contains("}}") {
                        return Err(Error::template(self.name, "unmatched '}}'"));
                    }
                    if !rest.is_empty() {
                        nodes.push(Node::Text(rest.to_string()));
                    }
                    self.pos = self.source.len();
                    return Ok((nodes, None));
                }
            };
            if rest[..open].contains("}}") {
                return Err(Error::template(self.name, "unmatched '}}'"));
            }
            if open > 0 {
                nodes.push(Node::Text(rest[..open].to_string()));
            }
            let after_open = self.pos + open + 2;
            let close = self.source[after_open..]
                .find("}}")
                .ok_or_else(|| Error::template(self.name, "unclosed '{{'"))?;
            let inner = self.source[after_open..after_open + close].trim();
            self.pos = after_open + close + 2;

            match self.parse_action(inner)? {
                Action::Var(name) => nodes.push(Node::Var(name)),
                Action::Dot => nodes.push(Node::Dot),
                Action::If(cond) => {
                    let (then, terminator) = self.parse_block()?;
                    let otherwise = match terminator {
                        Some(Action::End) => Vec::new(),
                        Some(Action::Else) => match self.parse_block()? {
                            (otherwise, Some(Action::End)) => otherwise,
                            _ => return Err(Error::template(self.name, "'else' without 'end'")),
                        },
                        _ => return Err(Error::template(self.name, "'if' without 'end'")),
                    };
                    nodes.push(Node::If {
                        cond,
                        then,
                        otherwise,
                    });
                }
                Action::Range(list) => match self.parse_block()? {
                    (body, Some(Action::End)) => nodes.push(Node::Range { list, body }),
                    _ => return Err(Error::template(self.name, "'range' without 'end'")),
                },
                terminator @ (Action::Else | Action::End) => {
                    return Ok((nodes, Some(terminator)))
                }
            }
        }
    }

    fn parse_action(&self, inner: &str) -> Result<Action> {
        let mut words = inner.split_whitespace();
        let first = words
            .next()
            .ok_or_else(|| Error::template(self.name, "empty action"))?;
        let action = match first {
            "." => Action::Dot,
            "else" => Action::Else,
            "end" => Action::End,
            "if" => Action::If(self.field(words.next())?),
            "range" => Action::Range(self.field(words.next())?),
            other => Action::Var(self.field(Some(other))?),
        };
        if let Some(extra) = words.next() {
            return Err(Error::template(
                self.name,
                format!("unexpected '{}' in action '{}'", extra, inner),
            ));
        }
        Ok(action)
    }

    fn field(&self, word: Option<&str>) -> Result<String> {
        match word.and_then(|w| w.strip_prefix('.')) {
            Some(name) if is_identifier(name) => Ok(name.to_string()),
            _ => Err(Error::template(
                self.name,
                format!("expected '.name', got {:?}", word),
            )),
        }
    }
}

/// Placeholder names (`@name`) appearing outside string literals
pub fn placeholders(sql: &str) -> Vec<String> {
    let mut found = Vec::new();
    let mut in_literal = false;
    let mut chars = sql.char_indices().peekable();
    while let Some((i, c)) = chars.next() {
        match c {
            '\'' => in_literal = !in_literal,
            '@' if !in_literal => {
                let start = i + 1;
                let mut end = start;
                while let Some(&(j, next)) = chars.peek() {
                    if next.is_ascii_alphanumeric() || next == '_' {
                        end = j + next.len_utf8();
                        chars.next();
                    } else {
                        break;
                    }
                }
                if end > start {
                    found.push(sql[start..end].to_string());
                }
            }
            _ => {}
        }
    }
    found
}

/// Bind values under generated names `prefix0`, `prefix1`, …
///
/// Returns the generated names in order, ready to hand to a `range`.
///
/// # Errors
///
/// Returns `InvalidInput` if the prefix is not an identifier or a generated
/// name is already bound.
pub fn bind_indexed<V, I>(
    params: &mut BTreeMap<String, Value>,
    prefix: &str,
    values: I,
) -> Result<Vec<String>>
where
    V: Into<Value>,
    I: IntoIterator<Item = V>,
{
    if !is_identifier(prefix) {
        return Err(Error::invalid_input(format!(
            "placeholder prefix {:?} is not an identifier",
            prefix
        )));
    }
    let mut names = Vec::new();
    for (i, value) in values.into_iter().enumerate() {
        let name = format!("{}{}", prefix, i);
        if params.contains_key(&name) {
            return Err(Error::invalid_input(format!(
                "placeholder '@{}' is already bound",
                name
            )));
        }
        params.insert(name.clone(), value.into());
        names.push(name);
    }
    Ok(names)
}
