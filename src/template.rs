//! Two-way SQL templates: parsing and rendering.
//!
//! A template is plain SQL in which directives hide inside block comments,
//! so the raw text can still be run by hand against a database:
//!
//! * `:name` is a named placeholder.
//! * `/* :name */10` is a bind comment. The dummy literal right after the
//!   comment (number, quoted string, word or parenthesized list) is dropped
//!   and replaced by `:name`. `/* :staff.name */` reads an entity attribute
//!   and binds it as `:staff__name`.
//! * `/*%if [not] name */ ... /*%elif name */ ... /*%else*/ ... /*%end*/`
//!   includes a fragment depending on the truthiness of a parameter.
//! * `/*%for item in items separator ', ' */ ... /*%end*/` repeats a fragment
//!   once per element; inside, `:item` binds as `:items__0`, `:items__1`, ...
//!
//! A sequence bound to a single placeholder expands to `(:ids__0, :ids__1)`.
//! A rendered name may repeat, but only with the same value each time, so a
//! derived name like `staff__name` cannot silently shadow a parameter that
//! happens to be spelled the same way.
//!
//! Parsing happens against the set of parameter names visible at call time.
//! Conditions over names that are not visible are decided right away and
//! their dead branches are dropped; every other reference must resolve to a
//! visible name or an enclosing loop variable. The parsed [`Template`] is
//! immutable and rendering is a pure function of the template and the bound
//! [`Params`].

use pest::Parser;
use pest::error::LineColLocation;
use pest::iterators::Pair;
use pest_derive::Parser;

use indexmap::IndexSet;
use lazy_static::lazy_static;
use regex::Regex;

use std::collections::BTreeSet;
use std::fmt;

use crate::error::{Result, TwinsqlaError};
use crate::value::{Params, Value};

#[derive(Parser)]
#[grammar = "twoway.pest"]
struct TwoWayParser;

lazy_static! {
    static ref PLACEHOLDER: Regex = Regex::new(r"(?:^|[^:]):([A-Za-z_][A-Za-z0-9_]*)").unwrap();
}

/// Separator between a bind name and the element index or attribute it
/// was derived from.
pub const SYNTHETIC_SEPARATOR: &str = "__";

// ------------- Path -------------
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Path {
    segments: Vec<String>,
}
impl Path {
    fn parse(text: &str) -> Self {
        Self {
            segments: text.split('.').map(str::to_string).collect(),
        }
    }
    pub fn root(&self) -> &str {
        &self.segments[0]
    }
    pub fn attributes(&self) -> &[String] {
        &self.segments[1..]
    }
}
impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.segments.join("."))
    }
}

// ------------- Node -------------
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Text(String),
    Bind(Path),
    If {
        branches: Vec<Branch>,
        otherwise: Vec<Node>,
    },
    For {
        var: String,
        collection: Path,
        separator: Option<String>,
        body: Vec<Node>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Branch {
    pub negated: bool,
    pub path: Path,
    pub body: Vec<Node>,
}

#[derive(Debug)]
enum Body {
    Dynamic(Vec<Node>),
    Verbatim(Vec<String>),
}

/// The outcome of rendering: final SQL plus exactly the values its
/// placeholders refer to.
#[derive(Debug, Clone, PartialEq)]
pub struct Rendered {
    pub sql: String,
    pub binds: Params,
}

// ------------- Template -------------
#[derive(Debug)]
pub struct Template {
    source: String,
    names: BTreeSet<String>,
    body: Body,
}

impl Template {
    /// Parses `source` against the parameter names that will be bound.
    pub fn parse<'n>(source: &str, names: impl IntoIterator<Item = &'n str>) -> Result<Self> {
        let names: BTreeSet<String> = names.into_iter().map(str::to_string).collect();
        let mut pairs = TwoWayParser::parse(Rule::template, source).map_err(parse_error)?;
        let template = pairs
            .next()
            .ok_or_else(|| TwinsqlaError::parse("empty parse result"))?;
        let mut scope = Scope { names: &names, loops: Vec::new() };
        let mut nodes = Vec::new();
        for pair in template.into_inner() {
            if pair.as_rule() == Rule::nodes {
                nodes = lower_nodes(pair, &mut scope)?;
            }
        }
        Ok(Self {
            source: source.to_string(),
            names,
            body: Body::Dynamic(nodes),
        })
    }

    /// Wraps `source` without interpreting directives. Plain `:name`
    /// placeholders are still discovered so they can be bound.
    pub fn verbatim<'n>(source: &str, names: impl IntoIterator<Item = &'n str>) -> Self {
        Self {
            source: source.to_string(),
            names: names.into_iter().map(str::to_string).collect(),
            body: Body::Verbatim(placeholders(source)),
        }
    }

    pub fn source(&self) -> &str {
        &self.source
    }
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }
    pub fn is_dynamic(&self) -> bool {
        matches!(self.body, Body::Dynamic(_))
    }
    /// The directive tree, absent for verbatim templates.
    pub fn nodes(&self) -> Option<&[Node]> {
        match &self.body {
            Body::Dynamic(nodes) => Some(nodes),
            Body::Verbatim(_) => None,
        }
    }

    pub fn render(&self, params: &Params) -> Result<Rendered> {
        let mut rendered = Rendered {
            sql: String::with_capacity(self.source.len()),
            binds: Params::new(),
        };
        match &self.body {
            Body::Dynamic(nodes) => render_nodes(nodes, params, &mut Vec::new(), &mut rendered)?,
            Body::Verbatim(placeholders) => {
                rendered.sql.push_str(&self.source);
                for name in placeholders {
                    let value = params
                        .get(name)
                        .ok_or_else(|| TwinsqlaError::MissingBindParameter { name: name.clone() })?;
                    rendered.binds.insert(name.as_str(), value.clone());
                }
            }
        }
        Ok(rendered)
    }
}

/// Distinct `:name` placeholders of `sql` in order of first appearance.
/// `::` casts are skipped; quoting is not understood.
pub fn placeholders(sql: &str) -> Vec<String> {
    let names: IndexSet<&str> = PLACEHOLDER
        .captures_iter(sql)
        .filter_map(|c| c.get(1))
        .map(|m| m.as_str())
        .collect();
    names.into_iter().map(str::to_string).collect()
}

fn parse_error(e: pest::error::Error<Rule>) -> TwinsqlaError {
    let (line, col) = match e.line_col {
        LineColLocation::Pos((l, c)) => (l, c),
        LineColLocation::Span((l, c), _) => (l, c),
    };
    TwinsqlaError::QueryParseFailed {
        message: e.variant.message().to_string(),
        line: Some(line),
        col: Some(col),
    }
}

fn error_at(pair: &Pair<Rule>, message: String) -> TwinsqlaError {
    let (line, col) = pair.as_span().start_pos().line_col();
    TwinsqlaError::QueryParseFailed {
        message,
        line: Some(line),
        col: Some(col),
    }
}

// ------------- Lowering -------------
struct Scope<'n> {
    names: &'n BTreeSet<String>,
    loops: Vec<String>,
}
impl Scope<'_> {
    fn visible(&self, root: &str) -> bool {
        self.loops.iter().any(|v| v == root) || self.names.contains(root)
    }
}

fn push_node(nodes: &mut Vec<Node>, node: Node) {
    if let (Some(Node::Text(last)), Node::Text(text)) = (nodes.last_mut(), &node) {
        last.push_str(text);
        return;
    }
    nodes.push(node);
}

fn path_of(pair: Pair<Rule>) -> Result<(Path, Pair<Rule>)> {
    let path = pair
        .clone()
        .into_inner()
        .find(|p| p.as_rule() == Rule::path)
        .ok_or_else(|| error_at(&pair, "missing parameter name".to_string()))?;
    Ok((Path::parse(path.as_str()), pair))
}

fn lower_nodes(pair: Pair<Rule>, scope: &mut Scope) -> Result<Vec<Node>> {
    let mut nodes = Vec::new();
    for inner in pair.into_inner() {
        match inner.as_rule() {
            Rule::text => push_node(&mut nodes, Node::Text(inner.as_str().to_string())),
            Rule::placeholder | Rule::bind_comment => {
                let (path, inner) = path_of(inner)?;
                if !scope.visible(path.root()) {
                    return Err(error_at(&inner, format!("unknown parameter '{}'", path.root())));
                }
                nodes.push(Node::Bind(path));
            }
            Rule::if_block => {
                for node in lower_if(inner, scope)? {
                    push_node(&mut nodes, node);
                }
            }
            Rule::for_block => nodes.push(lower_for(inner, scope)?),
            rule => return Err(error_at(&inner, format!("unexpected {:?}", rule))),
        }
    }
    Ok(nodes)
}

fn condition_of(open: Pair<Rule>) -> Result<(bool, Path)> {
    let condition = open
        .clone()
        .into_inner()
        .find(|p| p.as_rule() == Rule::condition)
        .ok_or_else(|| error_at(&open, "missing condition".to_string()))?;
    let mut negated = false;
    let mut path = None;
    for part in condition.into_inner() {
        match part.as_rule() {
            Rule::negation => negated = true,
            Rule::path => path = Some(Path::parse(part.as_str())),
            _ => (),
        }
    }
    let path = path.ok_or_else(|| error_at(&open, "missing condition".to_string()))?;
    Ok((negated, path))
}

// An if block lowers to nothing, to the nodes of one statically chosen arm,
// or to an If node holding the arms that depend on bound values.
fn lower_if(pair: Pair<Rule>, scope: &mut Scope) -> Result<Vec<Node>> {
    let mut arms: Vec<(Option<(bool, Path)>, Pair<Rule>)> = Vec::new();
    let mut pending: Option<(bool, Path)> = None;
    for part in pair.into_inner() {
        match part.as_rule() {
            Rule::if_open => pending = Some(condition_of(part)?),
            Rule::nodes => arms.push((pending.take(), part)),
            Rule::elif_branch | Rule::else_branch => {
                let mut condition = None;
                for inner in part.into_inner() {
                    match inner.as_rule() {
                        Rule::elif_open => condition = Some(condition_of(inner)?),
                        Rule::nodes => arms.push((condition.take(), inner)),
                        _ => (),
                    }
                }
            }
            _ => (),
        }
    }
    let mut branches = Vec::new();
    let mut otherwise = Vec::new();
    for (condition, body) in arms {
        match condition {
            Some((negated, path)) if scope.visible(path.root()) => {
                let body = lower_nodes(body, scope)?;
                branches.push(Branch { negated, path, body });
            }
            // an absent parameter is falsy, so only a negated test can hold
            Some((negated, _)) => {
                if negated {
                    otherwise = lower_nodes(body, scope)?;
                    break;
                }
            }
            None => {
                otherwise = lower_nodes(body, scope)?;
                break;
            }
        }
    }
    if branches.is_empty() {
        Ok(otherwise)
    } else {
        Ok(vec![Node::If { branches, otherwise }])
    }
}

fn unquote(quoted: &str) -> String {
    let quote = &quoted[..1];
    quoted[1..quoted.len() - 1].replace(&quote.repeat(2), quote)
}

fn lower_for(pair: Pair<Rule>, scope: &mut Scope) -> Result<Node> {
    let mut var = None;
    let mut collection = None;
    let mut separator = None;
    let mut body = None;
    for part in pair.into_inner() {
        match part.as_rule() {
            Rule::for_open => {
                for inner in part.clone().into_inner() {
                    match inner.as_rule() {
                        Rule::ident => var = Some(inner.as_str().to_string()),
                        Rule::path => {
                            let path = Path::parse(inner.as_str());
                            if !scope.visible(path.root()) {
                                return Err(error_at(&inner, format!("unknown parameter '{}'", path.root())));
                            }
                            collection = Some(path);
                        }
                        Rule::quoted => separator = Some(unquote(inner.as_str())),
                        _ => (),
                    }
                }
            }
            Rule::nodes => body = Some(part),
            _ => (),
        }
    }
    let (Some(var), Some(collection), Some(body)) = (var, collection, body) else {
        return Err(TwinsqlaError::parse("incomplete for directive"));
    };
    scope.loops.push(var.clone());
    let body = lower_nodes(body, scope);
    scope.loops.pop();
    Ok(Node::For {
        var,
        collection,
        separator,
        body: body?,
    })
}

// ------------- Rendering -------------
struct Frame<'v> {
    var: &'v str,
    value: &'v Value,
    bind_name: String,
}

/// Resolves `path` to its value and the bind name it renders under.
/// `None` means the root or one of the attributes is not there.
fn resolve<'v>(path: &Path, params: &'v Params, frames: &[Frame<'v>]) -> Result<Option<(&'v Value, String)>> {
    let root = path.root();
    let found = match frames.iter().rev().find(|f| f.var == root) {
        Some(frame) => Some((frame.value, frame.bind_name.clone())),
        None => params.get(root).map(|v| (v, root.to_string())),
    };
    let Some((mut value, mut bind_name)) = found else {
        return Ok(None);
    };
    for attribute in path.attributes() {
        bind_name = format!("{}{}{}", bind_name, SYNTHETIC_SEPARATOR, attribute);
        value = match value {
            Value::Null => value,
            Value::Entity(entity) => match entity.get(attribute) {
                Some(v) => v,
                None => return Ok(None),
            },
            other => {
                return Err(TwinsqlaError::Render(format!(
                    "cannot read attribute '{}' of {} value in '{}'",
                    attribute,
                    other.type_name(),
                    path
                )));
            }
        };
    }
    Ok(Some((value, bind_name)))
}

fn push_bind(rendered: &mut Rendered, name: String, value: &Value) -> Result<()> {
    if matches!(value, Value::List(_) | Value::Entity(_)) {
        return Err(TwinsqlaError::Render(format!(
            "a {} value cannot be bound to ':{}'",
            value.type_name(),
            name
        )));
    }
    if let Some(bound) = rendered.binds.get(&name) {
        if bound != value {
            return Err(TwinsqlaError::Render(format!(
                "':{}' is bound to two different values ({} and {})",
                name, bound, value
            )));
        }
    }
    rendered.sql.push(':');
    rendered.sql.push_str(&name);
    rendered.binds.insert(name, value.clone());
    Ok(())
}

fn render_nodes<'v>(
    nodes: &'v [Node],
    params: &'v Params,
    frames: &mut Vec<Frame<'v>>,
    rendered: &mut Rendered,
) -> Result<()> {
    for node in nodes {
        match node {
            Node::Text(text) => rendered.sql.push_str(text),
            Node::Bind(path) => {
                let (value, name) = resolve(path, params, frames)?
                    .ok_or_else(|| TwinsqlaError::MissingBindParameter { name: path.to_string() })?;
                match value {
                    Value::List(items) if items.is_empty() => rendered.sql.push_str("(NULL)"),
                    Value::List(items) => {
                        rendered.sql.push('(');
                        for (i, item) in items.iter().enumerate() {
                            if i > 0 {
                                rendered.sql.push_str(", ");
                            }
                            push_bind(rendered, format!("{}{}{}", name, SYNTHETIC_SEPARATOR, i), item)?;
                        }
                        rendered.sql.push(')');
                    }
                    value => push_bind(rendered, name, value)?,
                }
            }
            Node::If { branches, otherwise } => {
                let mut chosen: &[Node] = otherwise;
                for branch in branches {
                    let truthy = resolve(&branch.path, params, frames)?.is_some_and(|(v, _)| v.is_truthy());
                    if truthy != branch.negated {
                        chosen = &branch.body;
                        break;
                    }
                }
                render_nodes(chosen, params, frames, rendered)?;
            }
            Node::For { var, collection, separator, body } => {
                let (items, name) = match resolve(collection, params, frames)? {
                    None | Some((Value::Null, _)) => continue,
                    Some((Value::List(items), name)) => (items, name),
                    Some((other, _)) => {
                        return Err(TwinsqlaError::Render(format!(
                            "cannot iterate over {} value '{}'",
                            other.type_name(),
                            collection
                        )));
                    }
                };
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        if let Some(separator) = separator {
                            rendered.sql.push_str(separator);
                        }
                    }
                    frames.push(Frame {
                        var: var.as_str(),
                        value: item,
                        bind_name: format!("{}{}{}", name, SYNTHETIC_SEPARATOR, i),
                    });
                    let outcome = render_nodes(body, params, frames, rendered);
                    frames.pop();
                    outcome?;
                }
            }
        }
    }
    Ok(())
}
