//! Expression-mode expansion on Rhai
//!
//! A template such as `prefix_${tag.split('.').first}` is rewritten into a
//! Rhai back-tick string, whose `${...}` holes are Rhai's own interpolation
//! syntax, and evaluated with a small fixed set of variables in scope:
//!
//! | variable              | value                                   |
//! |-----------------------|-----------------------------------------|
//! | `tag`                 | incoming tag                            |
//! | `tag_parts`, `tags`   | tag segments (array of strings)         |
//! | `time`                | event time as a `Time` value (UTC)      |
//! | `hostname`            | configured hostname                     |
//! | record field names    | record values (fields shadow the above) |
//!
//! Only record fields whose names are valid identifiers are bound.
//! Everything else in the Rhai standard packages (string methods, math,
//! array functions) is available inside the holes, plus:
//!
//! - `url_encode(s)` / `url_decode(s)` - percent-encoding
//! - `basename(path)` / `dirname(path)` - last path component and its parent
//!
//! Arrays and maps interpolated into text render as compact JSON, the same
//! as in constrained mode.

use std::fmt::Write;
use std::path::Path;

use chrono::{DateTime, Datelike, Timelike, Utc};
use percent_encoding::{percent_decode_str, utf8_percent_encode, NON_ALPHANUMERIC};
use rhai::{Array, Dynamic, Engine, EvalAltResult, Map, Scope, AST};
use serde_json::Value;

use crate::error::TemplateError;

use super::event::EventTime;
use super::expander::{render_text, EventScope, EventView, ExpandMode, Expander, Template};

/// Display format of `time` inside interpolated strings
pub const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S %z";

/// Event time as exposed to expressions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExprTime(DateTime<Utc>);

impl ExprTime {
    /// Wrap a calendar time
    pub fn new(datetime: DateTime<Utc>) -> Self {
        Self(datetime)
    }

    /// Calendar value
    pub fn datetime(&self) -> DateTime<Utc> {
        self.0
    }
}

impl std::fmt::Display for ExprTime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.format(TIME_FORMAT))
    }
}

/// Expression-mode expander
pub struct ExpressionExpander {
    engine: Engine,
    hostname: String,
    auto_typecast: bool,
}

impl std::fmt::Debug for ExpressionExpander {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExpressionExpander")
            .field("hostname", &self.hostname)
            .field("auto_typecast", &self.auto_typecast)
            .finish_non_exhaustive()
    }
}

impl ExpressionExpander {
    /// Create a new expression expander
    pub fn new(hostname: impl Into<String>) -> Self {
        Self {
            engine: create_engine(),
            hostname: hostname.into(),
            auto_typecast: true,
        }
    }

    /// Keep the evaluated type when the template is a single `${expr}` hole
    pub fn with_auto_typecast(mut self, enabled: bool) -> Self {
        self.auto_typecast = enabled;
        self
    }

    /// Hostname exposed as `hostname`
    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    fn compiled<'t>(&self, template: &'t Template) -> Result<&'t AST, TemplateError> {
        template.expression_ast(|source| {
            let script = rewrite_template(source, self.auto_typecast);
            self.engine
                .compile_expression(&script)
                .map_err(|e| TemplateError::Compilation {
                    template: source.to_string(),
                    message: e.to_string(),
                })
        })
    }
}

/// Creates a Rhai engine with safety limits and the template helpers.
fn create_engine() -> Engine {
    let mut engine = Engine::new();

    engine.set_max_expr_depths(64, 64);
    engine.set_max_operations(100_000);
    engine.set_max_string_size(1_000_000);
    engine.set_max_array_size(10_000);
    engine.set_max_map_size(10_000);
    engine.set_max_call_levels(16);

    engine.set_optimization_level(rhai::OptimizationLevel::Simple);

    register_array_helpers(&mut engine);
    register_render_helpers(&mut engine);
    register_time_type(&mut engine);
    register_url_helpers(&mut engine);
    register_path_helpers(&mut engine);

    engine
}

fn register_array_helpers(engine: &mut Engine) {
    engine.register_get("first", |arr: &mut Array| {
        arr.first().cloned().unwrap_or(Dynamic::UNIT)
    });
    engine.register_get("last", |arr: &mut Array| {
        arr.last().cloned().unwrap_or(Dynamic::UNIT)
    });
}

// overrides Rhai's own literal formatting inside interpolated strings
fn register_render_helpers(engine: &mut Engine) {
    engine.register_fn("to_string", |arr: &mut Array| {
        render_dynamic(Dynamic::from_array(arr.clone()))
    });
    engine.register_fn("to_string", |map: &mut Map| {
        render_dynamic(Dynamic::from_map(map.clone()))
    });
}

fn register_url_helpers(engine: &mut Engine) {
    engine.register_fn("url_encode", |s: &str| {
        utf8_percent_encode(s, NON_ALPHANUMERIC).to_string()
    });
    engine.register_fn(
        "url_decode",
        |s: &str| -> Result<String, Box<EvalAltResult>> {
            percent_decode_str(s)
                .decode_utf8()
                .map(|decoded| decoded.into_owned())
                .map_err(|_| format!("url_decode received invalid UTF-8 in '{}'", s).into())
        },
    );
}

fn register_path_helpers(engine: &mut Engine) {
    engine.register_fn("basename", |s: &str| match Path::new(s).file_name() {
        Some(name) => name.to_string_lossy().into_owned(),
        None => s.to_string(),
    });
    engine.register_fn("dirname", |s: &str| match Path::new(s).parent() {
        Some(parent) if parent.as_os_str().is_empty() => ".".to_string(),
        Some(parent) => parent.to_string_lossy().into_owned(),
        None if s.starts_with('/') => "/".to_string(),
        None => ".".to_string(),
    });
}

fn register_time_type(engine: &mut Engine) {
    engine
        .register_type_with_name::<ExprTime>("Time")
        .register_get("year", |t: &mut ExprTime| t.0.year() as rhai::INT)
        .register_get("month", |t: &mut ExprTime| t.0.month() as rhai::INT)
        .register_get("day", |t: &mut ExprTime| t.0.day() as rhai::INT)
        .register_get("hour", |t: &mut ExprTime| t.0.hour() as rhai::INT)
        .register_get("minute", |t: &mut ExprTime| t.0.minute() as rhai::INT)
        .register_get("second", |t: &mut ExprTime| t.0.second() as rhai::INT)
        .register_get("epoch", |t: &mut ExprTime| t.0.timestamp() as rhai::INT)
        .register_fn(
            "strftime",
            |t: &mut ExprTime, fmt: &str| -> Result<String, Box<EvalAltResult>> {
                let mut out = String::new();
                write!(out, "{}", t.0.format(fmt))
                    .map_err(|_| format!("invalid time format '{}'", fmt))?;
                Ok(out)
            },
        )
        .register_fn("iso8601", |t: &mut ExprTime| t.0.to_rfc3339())
        .register_fn("to_string", |t: &mut ExprTime| t.to_string())
        .register_fn("to_debug", |t: &mut ExprTime| t.to_string());
}

/// Turn a template into a Rhai expression
///
/// The template becomes a back-tick string literal; literal back-ticks are
/// doubled. With `typecast` set, a template that is exactly one `${expr}`
/// hole becomes the bare expression so its value keeps its type.
pub fn rewrite_template(source: &str, typecast: bool) -> String {
    if typecast {
        if let Some(inner) = single_hole(source) {
            return inner.to_string();
        }
    }

    let mut script = String::with_capacity(source.len() + 2);
    script.push('`');
    for c in source.chars() {
        if c == '`' {
            script.push('`');
        }
        script.push(c);
    }
    script.push('`');
    script
}

/// The expression inside `${...}` when it spans the whole template
fn single_hole(source: &str) -> Option<&str> {
    let body = source.strip_prefix("${")?;
    let end = hole_end(body)?;
    let inner = &body[..end];
    if end + 1 == body.len() && !inner.trim().is_empty() {
        Some(inner)
    } else {
        None
    }
}

/// Byte offset of the `}` closing a hole whose body starts at `body`
///
/// Braces inside string and character literals are not counted.
fn hole_end(body: &str) -> Option<usize> {
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut escaped = false;

    for (i, c) in body.char_indices() {
        if let Some(q) = quote {
            if escaped {
                escaped = false;
            } else if c == '\\' && q != '`' {
                escaped = true;
            } else if c == q {
                quote = None;
            }
            continue;
        }
        match c {
            '"' | '\'' | '`' => quote = Some(c),
            '{' => depth += 1,
            '}' if depth == 0 => return Some(i),
            '}' => depth -= 1,
            _ => {}
        }
    }
    None
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn render_dynamic(value: Dynamic) -> String {
    render_text(&dynamic_to_value(value))
}

/// Convert an evaluation result back to JSON
fn dynamic_to_value(result: Dynamic) -> Value {
    if result.is_unit() {
        return Value::Null;
    }
    if result.is::<ExprTime>() {
        return Value::String(result.cast::<ExprTime>().to_string());
    }
    if result.is_string() {
        return Value::String(result.to_string());
    }
    match rhai::serde::from_dynamic::<Value>(&result) {
        Ok(value) => value,
        Err(_) => Value::String(result.to_string()),
    }
}

impl Expander for ExpressionExpander {
    fn mode(&self) -> ExpandMode {
        ExpandMode::Expression
    }

    fn compile(&self, template: &Template) -> Result<(), TemplateError> {
        self.compiled(template).map(|_| ())
    }

    fn scope<'a>(&'a self, event: EventView<'a>) -> Result<Box<dyn EventScope + 'a>, TemplateError> {
        let mut scope = Scope::new();

        let parts: Array = event
            .parts
            .iter()
            .map(|part| Dynamic::from(part.to_string()))
            .collect();
        scope.push_constant("tag", event.tag.to_string());
        scope.push_constant("tags", parts.clone());
        scope.push_constant("tag_parts", parts);
        scope.push_constant("time", expr_time(event.time)?);
        scope.push_constant("hostname", self.hostname.clone());

        // pushed last: later entries shadow earlier ones on lookup
        for (key, value) in event.record {
            if !is_identifier(key) {
                tracing::trace!(field = %key, tag = %event.tag, "Field name is not bindable");
                continue;
            }
            let dynamic =
                rhai::serde::to_dynamic(value).map_err(|e| TemplateError::Evaluation {
                    template: format!("${{{}}}", key),
                    message: e.to_string(),
                })?;
            scope.push_constant_dynamic(key.as_str(), dynamic);
        }

        Ok(Box::new(ExpressionScope {
            expander: self,
            scope,
        }))
    }
}

fn expr_time(time: EventTime) -> Result<ExprTime, TemplateError> {
    time.to_datetime()
        .map(ExprTime)
        .ok_or_else(|| TemplateError::Evaluation {
            template: "${time}".to_string(),
            message: format!("event time {} is out of range", time),
        })
}

struct ExpressionScope<'a> {
    expander: &'a ExpressionExpander,
    scope: Scope<'static>,
}

impl EventScope for ExpressionScope<'_> {
    fn expand(&mut self, template: &Template) -> Result<Value, TemplateError> {
        let ast = self.expander.compiled(template)?;
        let result: Dynamic = self
            .expander
            .engine
            .eval_ast_with_scope(&mut self.scope, ast)
            .map_err(|e| TemplateError::Evaluation {
                template: template.source().to_string(),
                message: e.to_string(),
            })?;
        Ok(dynamic_to_value(result))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transformer::event::Record;
    use crate::transformer::tag::TagParts;
    use serde_json::json;

    fn record(value: Value) -> Record {
        match value {
            Value::Object(map) => map,
            _ => panic!("test record must be an object"),
        }
    }

    fn expand(
        expander: &ExpressionExpander,
        template: &str,
        rec: &Record,
        tag: &str,
    ) -> Result<Value, TemplateError> {
        let parts = TagParts::split(tag);
        let view = EventView {
            record: rec,
            tag,
            parts: &parts,
            time: EventTime::from_secs(1_388_534_400),
        };
        let mut scope = expander.scope(view)?;
        scope.expand(&Template::new(template))
    }

    #[test]
    fn test_rewrite_template() {
        assert_eq!(rewrite_template("a ${tag} b", true), "`a ${tag} b`");
        assert_eq!(rewrite_template("${tag}", true), "tag");
        assert_eq!(rewrite_template("${tag}", false), "`${tag}`");
        assert_eq!(rewrite_template("x`y", false), "`x``y`");
        assert_eq!(rewrite_template("${a}${b}", true), "`${a}${b}`");
    }

    #[test]
    fn test_is_identifier() {
        assert!(is_identifier("message"));
        assert!(is_identifier("_private1"));
        assert!(!is_identifier("user-agent"));
        assert!(!is_identifier("1st"));
        assert!(!is_identifier(""));
    }

    #[test]
    fn test_computed_expression() {
        let expander = ExpressionExpander::new("h");
        let rec = Record::new();
        let out = expand(&expander, "prefix_${tag.split('.').first}", &rec, "app.web.access").unwrap();
        assert_eq!(out, json!("prefix_app"));
    }

    #[test]
    fn test_string_methods_and_arithmetic() {
        let expander = ExpressionExpander::new("h");
        let rec = record(json!({"message": "hello", "code": 200}));
        let out = expand(&expander, "${message.to_upper()}:${code + 1}", &rec, "a.b").unwrap();
        assert_eq!(out, json!("HELLO:201"));
    }

    #[test]
    fn test_reserved_bindings() {
        let expander = ExpressionExpander::new("host1");
        let rec = Record::new();
        let out = expand(
            &expander,
            "${hostname} ${tag} ${tag_parts[0]} ${tags[-1]}",
            &rec,
            "a.b.c",
        )
        .unwrap();
        assert_eq!(out, json!("host1 a.b.c a c"));
    }

    #[test]
    fn test_time_binding() {
        let expander = ExpressionExpander::new("h");
        let rec = Record::new();
        assert_eq!(
            expand(&expander, "${time}", &rec, "t").unwrap(),
            json!("2014-01-01 00:00:00 +0000")
        );
        assert_eq!(
            expand(&expander, "${time.year}-${time.month}", &rec, "t").unwrap(),
            json!("2014-1")
        );
        assert_eq!(
            expand(&expander, "${time.strftime(\"%Y%m%d\")}", &rec, "t").unwrap(),
            json!("20140101")
        );
        assert_eq!(
            expand(&expander, "${time.epoch}", &rec, "t").unwrap(),
            json!(1_388_534_400)
        );
    }

    #[test]
    fn test_typecast_single_hole() {
        let expander = ExpressionExpander::new("h");
        let rec = record(json!({"y": 1, "items": [1, 2]}));
        assert_eq!(expand(&expander, "${y}", &rec, "t").unwrap(), json!(1));
        assert_eq!(expand(&expander, "${items}", &rec, "t").unwrap(), json!([1, 2]));
        assert_eq!(expand(&expander, "${y * 2}", &rec, "t").unwrap(), json!(2));

        let text = ExpressionExpander::new("h").with_auto_typecast(false);
        assert_eq!(expand(&text, "${y}", &rec, "t").unwrap(), json!("1"));
    }

    #[test]
    fn test_record_field_shadows_reserved_name() {
        let expander = ExpressionExpander::new("h");
        let rec = record(json!({"tag": "from-record"}));
        assert_eq!(
            expand(&expander, "${tag}", &rec, "a.b").unwrap(),
            json!("from-record")
        );
    }

    #[test]
    fn test_undefined_variable_is_error() {
        let expander = ExpressionExpander::new("h");
        let rec = Record::new();
        let err = expand(&expander, "${nope}", &rec, "t").unwrap_err();
        assert_eq!(err.kind(), "evaluation");
    }

    #[test]
    fn test_syntax_error_is_compilation_error() {
        let expander = ExpressionExpander::new("h");
        let err = expander.compile(&Template::new("${tag.}")).unwrap_err();
        assert_eq!(err.kind(), "compilation");
    }

    #[test]
    fn test_literal_text_passes_through() {
        let expander = ExpressionExpander::new("h");
        let rec = Record::new();
        assert_eq!(
            expand(&expander, "plain \\n `quoted` text", &rec, "t").unwrap(),
            json!("plain \\n `quoted` text")
        );
    }

    #[test]
    fn test_scope_is_read_only() {
        let expander = ExpressionExpander::new("h");
        let rec = record(json!({"items": [1]}));
        let parts = TagParts::split("t");
        let view = EventView {
            record: &rec,
            tag: "t",
            parts: &parts,
            time: EventTime::from_secs(0),
        };
        let mut scope = expander.scope(view).unwrap();
        let _ = scope.expand(&Template::new("${items.push(2)}"));
        assert_eq!(scope.expand(&Template::new("${items.len()}")).unwrap(), json!(1));
    }

    #[test]
    fn test_collections_render_as_json_in_text() {
        let expander = ExpressionExpander::new("h");
        let rec = record(json!({"l": [1, "s", null], "m": {"k": "v"}, "n": null}));
        assert_eq!(
            expand(&expander, "l=${l}", &rec, "t").unwrap(),
            json!("l=[1,\"s\",null]")
        );
        assert_eq!(
            expand(&expander, "m=${m}", &rec, "t").unwrap(),
            json!("m={\"k\":\"v\"}")
        );
        assert_eq!(expand(&expander, "n=${n}", &rec, "t").unwrap(), json!("n="));

        let text = ExpressionExpander::new("h").with_auto_typecast(false);
        assert_eq!(
            expand(&text, "${l}", &rec, "t").unwrap(),
            json!("[1,\"s\",null]")
        );
    }

    #[test]
    fn test_url_helpers() {
        let expander = ExpressionExpander::new("h");
        let rec = record(json!({"q": "a b/c", "raw": "a%20b%2Fc"}));
        assert_eq!(
            expand(&expander, "${url_encode(q)}", &rec, "t").unwrap(),
            json!("a%20b%2Fc")
        );
        assert_eq!(
            expand(&expander, "${url_decode(raw)}", &rec, "t").unwrap(),
            json!("a b/c")
        );

        let bad = record(json!({"raw": "%FF"}));
        let err = expand(&expander, "${url_decode(raw)}", &bad, "t").unwrap_err();
        assert_eq!(err.kind(), "evaluation");
    }

    #[test]
    fn test_path_helpers() {
        let expander = ExpressionExpander::new("h");
        let rec = record(json!({"path": "/var/log/app/access.log", "file": "access.log"}));
        assert_eq!(
            expand(&expander, "${basename(path)}", &rec, "t").unwrap(),
            json!("access.log")
        );
        assert_eq!(
            expand(&expander, "${dirname(path)}", &rec, "t").unwrap(),
            json!("/var/log/app")
        );
        assert_eq!(expand(&expander, "${dirname(file)}", &rec, "t").unwrap(), json!("."));
        assert_eq!(expand(&expander, "${dirname(\"/\")}", &rec, "t").unwrap(), json!("/"));
        assert_eq!(
            expand(&expander, "${path.basename()}", &rec, "t").unwrap(),
            json!("access.log")
        );
    }

    #[test]
    fn test_time_out_of_range_is_error() {
        let expander = ExpressionExpander::new("h");
        let rec = Record::new();
        let parts = TagParts::split("t");
        let view = EventView {
            record: &rec,
            tag: "t",
            parts: &parts,
            time: EventTime::from_secs(i64::MAX),
        };
        let err = expander.scope(view).err().expect("scope should fail");
        assert_eq!(err.kind(), "evaluation");
        assert!(err.to_string().contains("out of range"));
    }

    #[test]
    fn test_typecast_hole_with_braces() {
        let expander = ExpressionExpander::new("h");
        let rec = Record::new();
        assert_eq!(
            expand(&expander, "${ if tag == \"a.b\" { 1 } else { 2 } }", &rec, "a.b").unwrap(),
            json!(1)
        );
        assert_eq!(
            expand(&expander, "${ if tag == \"a.b\" { 1 } else { 2 } }!", &rec, "x").unwrap(),
            json!("2!")
        );
    }

    #[test]
    fn test_single_hole() {
        assert_eq!(single_hole("${tag}"), Some("tag"));
        assert_eq!(single_hole("${ if a { 1 } else { 2 } }"), Some(" if a { 1 } else { 2 } "));
        assert_eq!(single_hole("${s.contains(\"}\")}"), Some("s.contains(\"}\")"));
        assert_eq!(single_hole("${a}${b}"), None);
        assert_eq!(single_hole("${a} tail"), None);
        assert_eq!(single_hole("${}"), None);
        assert_eq!(single_hole("${a"), None);
    }
}

