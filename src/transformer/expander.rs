//! Template expansion
//!
//! Two strategies share the [`Expander`] interface:
//!
//! - [`PlaceholderExpander`] (constrained mode) replaces tokens of a fixed
//!   grammar by verbatim lookup in a [`PlaceholderContext`]. No code is
//!   evaluated; unknown tokens are logged and replaced with nothing.
//! - [`ExpressionExpander`](super::expression::ExpressionExpander)
//!   (expression mode) evaluates every `${...}` hole as a Rhai expression.
//!
//! An expander is asked for an [`EventScope`] once per event. The scope
//! holds everything derived from that event (placeholder table or variable
//! bindings) and expands every template of the event against the original
//! record, then is dropped.

use std::fmt;
use std::sync::{Arc, OnceLock};

use once_cell::sync::OnceCell;
use regex::Regex;
use serde::{Serialize, Serializer};
use serde_json::Value;

use crate::error::TemplateError;
use crate::metrics::PipelineMetrics;

use super::event::{EventTime, Record};
use super::placeholder::PlaceholderContext;
use super::tag::TagParts;

/// Constrained placeholder grammar: `${name}`, `${name[-1]}` or `__NAME__`
const PLACEHOLDER_PATTERN: &str = r"\$\{[a-z_]+(\[-?[0-9]+\])?\}|__[A-Z_]+__";

fn placeholder_regex() -> &'static Regex {
    static PLACEHOLDER_RE: OnceLock<Regex> = OnceLock::new();
    PLACEHOLDER_RE.get_or_init(|| Regex::new(PLACEHOLDER_PATTERN).expect("invalid placeholder regex"))
}

/// Template expansion mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ExpandMode {
    /// Verbatim placeholder lookup, no evaluation
    Placeholder,
    /// Rhai expression evaluation
    Expression,
}

impl ExpandMode {
    /// Mode name as used in logs and reports
    pub fn as_str(&self) -> &'static str {
        match self {
            ExpandMode::Placeholder => "placeholder",
            ExpandMode::Expression => "expression",
        }
    }
}

impl fmt::Display for ExpandMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Piece of a template parsed with the constrained grammar
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Piece {
    /// Text copied through unchanged
    Literal(String),
    /// Placeholder token, looked up verbatim
    Placeholder(String),
}

/// A configured template string
///
/// Parsed forms are cached on first use and shared read-only by every
/// event afterwards.
#[derive(Debug)]
pub struct Template {
    source: String,
    pieces: OnceCell<Vec<Piece>>,
    expression: OnceCell<rhai::AST>,
}

impl Template {
    /// Create a template from its source text
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            pieces: OnceCell::new(),
            expression: OnceCell::new(),
        }
    }

    /// Template source text
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Template split into literal text and placeholder tokens
    pub fn pieces(&self) -> &[Piece] {
        self.pieces.get_or_init(|| parse_pieces(&self.source))
    }

    /// The placeholder token if the template is exactly one placeholder
    pub fn single_placeholder(&self) -> Option<&str> {
        match self.pieces() {
            [Piece::Placeholder(token)] => Some(token),
            _ => None,
        }
    }

    /// Compiled expression form, compiled on first call
    pub(crate) fn expression_ast<F>(&self, compile: F) -> Result<&rhai::AST, TemplateError>
    where
        F: FnOnce(&str) -> Result<rhai::AST, TemplateError>,
    {
        self.expression.get_or_try_init(|| compile(&self.source))
    }
}

impl Clone for Template {
    fn clone(&self) -> Self {
        Self::new(self.source.clone())
    }
}

impl PartialEq for Template {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source
    }
}

impl From<&str> for Template {
    fn from(source: &str) -> Self {
        Self::new(source)
    }
}

impl From<String> for Template {
    fn from(source: String) -> Self {
        Self::new(source)
    }
}

impl Serialize for Template {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.source)
    }
}

impl fmt::Display for Template {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

fn parse_pieces(source: &str) -> Vec<Piece> {
    let mut pieces = Vec::new();
    let mut last = 0;

    for m in placeholder_regex().find_iter(source) {
        if m.start() > last {
            pieces.push(Piece::Literal(source[last..m.start()].to_string()));
        }
        pieces.push(Piece::Placeholder(m.as_str().to_string()));
        last = m.end();
    }

    if last < source.len() {
        pieces.push(Piece::Literal(source[last..].to_string()));
    }

    pieces
}

/// Borrowed view of the event being transformed
#[derive(Debug, Clone, Copy)]
pub struct EventView<'a> {
    /// Original, untouched record
    pub record: &'a Record,
    /// Incoming tag
    pub tag: &'a str,
    /// Segments of `tag`
    pub parts: &'a TagParts<'a>,
    /// Incoming event time
    pub time: EventTime,
}

/// Per-event expansion state
pub trait EventScope {
    /// Expand a template against the event this scope was built for
    fn expand(&mut self, template: &Template) -> Result<Value, TemplateError>;

    /// Expand a template and render the result as text
    fn expand_text(&mut self, template: &Template) -> Result<String, TemplateError> {
        self.expand(template).map(|value| render_text(&value))
    }
}

/// Template expansion strategy
pub trait Expander: fmt::Debug + Send + Sync {
    /// Expansion mode implemented by this expander
    fn mode(&self) -> ExpandMode;

    /// Prepare a template ahead of event processing
    ///
    /// # Errors
    ///
    /// Returns an error if the template cannot be compiled.
    fn compile(&self, template: &Template) -> Result<(), TemplateError>;

    /// Build the expansion scope for one event
    fn scope<'a>(&'a self, event: EventView<'a>) -> Result<Box<dyn EventScope + 'a>, TemplateError>;
}

/// Render a JSON value as template text
///
/// Strings are copied verbatim, `null` becomes empty text and everything
/// else is written as compact JSON.
pub fn render_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Constrained-mode expander
#[derive(Debug, Clone)]
pub struct PlaceholderExpander {
    hostname: String,
    auto_typecast: bool,
    metrics: Option<Arc<PipelineMetrics>>,
}

impl PlaceholderExpander {
    /// Create a new placeholder expander
    pub fn new(hostname: impl Into<String>) -> Self {
        Self {
            hostname: hostname.into(),
            auto_typecast: true,
            metrics: None,
        }
    }

    /// Keep the JSON type of a value when the template is a single placeholder
    pub fn with_auto_typecast(mut self, enabled: bool) -> Self {
        self.auto_typecast = enabled;
        self
    }

    /// Count unknown placeholders into the given metrics
    pub fn with_metrics(mut self, metrics: Arc<PipelineMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Hostname exposed as `${hostname}`
    pub fn hostname(&self) -> &str {
        &self.hostname
    }
}

impl Expander for PlaceholderExpander {
    fn mode(&self) -> ExpandMode {
        ExpandMode::Placeholder
    }

    fn compile(&self, template: &Template) -> Result<(), TemplateError> {
        template.pieces();
        Ok(())
    }

    fn scope<'a>(&'a self, event: EventView<'a>) -> Result<Box<dyn EventScope + 'a>, TemplateError> {
        let context = PlaceholderContext::build(
            event.record,
            event.tag,
            event.parts,
            event.time,
            &self.hostname,
        );
        Ok(Box::new(PlaceholderScope {
            expander: self,
            context,
            tag: event.tag,
        }))
    }
}

struct PlaceholderScope<'a> {
    expander: &'a PlaceholderExpander,
    context: PlaceholderContext<'a>,
    tag: &'a str,
}

impl PlaceholderScope<'_> {
    fn lookup(&self, token: &str) -> Option<&Value> {
        let value = self.context.get(token);
        if value.is_none() {
            tracing::warn!(
                placeholder = %token,
                tag = %self.tag,
                "unknown placeholder found in a tag"
            );
            if let Some(metrics) = &self.expander.metrics {
                metrics.unknown_placeholders.inc();
            }
        }
        value
    }
}

impl EventScope for PlaceholderScope<'_> {
    fn expand(&mut self, template: &Template) -> Result<Value, TemplateError> {
        if self.expander.auto_typecast {
            if let Some(token) = template.single_placeholder() {
                return Ok(self.lookup(token).cloned().unwrap_or(Value::Null));
            }
        }

        let mut out = String::with_capacity(template.source().len());
        for piece in template.pieces() {
            match piece {
                Piece::Literal(text) => out.push_str(text),
                Piece::Placeholder(token) => {
                    if let Some(value) = self.lookup(token) {
                        match value {
                            Value::String(s) => out.push_str(s),
                            other => out.push_str(&render_text(other)),
                        }
                    }
                }
            }
        }
        Ok(Value::String(out))
    }
}
