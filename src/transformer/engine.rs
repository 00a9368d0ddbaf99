//! Reform Engine - per-event re-tagging and record rebuilding
//!
//! This module drives a single event through the transform: split the tag,
//! build the expansion scope, expand the output tag, assemble the record and
//! hand the result to a [`Sink`]. Failures are contained per event.

use std::sync::Arc;

use crate::config::{Config, ConfigError};
use crate::error::{AppResult, EventError, TemplateError};
use crate::metrics::PipelineMetrics;

use super::event::{Event, EventTime, Record};
use super::expander::{EventView, ExpandMode, Expander, PlaceholderExpander, Template};
use super::expression::ExpressionExpander;
use super::record::{FieldMap, RecordAssembler, RemoveKeys};
use super::tag::TagParts;

/// Receiver of reformed events
pub trait Sink {
    /// Accept one reformed event
    fn emit(&mut self, event: Event);
}

/// Sink collecting events in memory
#[derive(Debug, Clone, Default)]
pub struct VecSink {
    events: Vec<Event>,
}

impl VecSink {
    /// Create an empty sink
    pub fn new() -> Self {
        Self { events: Vec::new() }
    }

    /// Events emitted so far
    pub fn events(&self) -> &[Event] {
        &self.events
    }

    /// Take the collected events
    pub fn into_events(self) -> Vec<Event> {
        self.events
    }
}

impl Sink for VecSink {
    fn emit(&mut self, event: Event) {
        self.events.push(event);
    }
}

impl<F: FnMut(Event)> Sink for F {
    fn emit(&mut self, event: Event) {
        self(event)
    }
}

/// Re-tags and rebuilds events from configured templates
///
/// Everything held here is fixed after construction and only read while
/// events are processed.
#[derive(Debug)]
pub struct ReformEngine {
    output_tag: Template,
    assembler: RecordAssembler,
    expander: Box<dyn Expander>,
    metrics: Arc<PipelineMetrics>,
}

impl ReformEngine {
    /// Create a new engine builder
    ///
    /// # Example
    ///
    /// ```ignore
    /// use record_reformer::transformer::{ExpandMode, ReformEngine};
    ///
    /// let engine = ReformEngine::builder("reformed.${tag}")
    ///     .mode(ExpandMode::Placeholder)
    ///     .field("host", "${hostname}")
    ///     .hostname("web01")
    ///     .build();
    /// ```
    pub fn builder(output_tag: impl Into<String>) -> ReformEngineBuilder {
        ReformEngineBuilder::new(output_tag)
    }

    /// Create an engine from configuration
    ///
    /// `hostname` is used unless the configuration overrides it.
    ///
    /// # Errors
    /// Returns an error if the field map cannot be built
    pub fn from_config(config: &Config, hostname: impl Into<String>) -> Result<Self, ConfigError> {
        let hostname = config.hostname.clone().unwrap_or_else(|| hostname.into());

        let mut builder = ReformEngineBuilder::new(config.output_tag.clone())
            .mode(config.expand_mode())
            .renew_record(config.renew_record)
            .auto_typecast(config.auto_typecast)
            .hostname(hostname)
            .field_map(config.field_map()?);

        if let Some(remove_keys) = config.remove_keys() {
            builder = builder.remove_keys(remove_keys);
        }

        Ok(builder.build())
    }

    /// Build from configuration and compile every template up front
    ///
    /// Used by `--validate`; event processing compiles lazily instead.
    ///
    /// # Errors
    /// Returns a configuration error if the field map cannot be built, or
    /// the first template that fails to compile
    pub fn prepare(config: &Config, hostname: impl Into<String>) -> AppResult<Self> {
        let engine = Self::from_config(config, hostname)?;
        engine.compile_all()?;
        Ok(engine)
    }

    /// Active expansion mode
    pub fn mode(&self) -> ExpandMode {
        self.expander.mode()
    }

    /// Output tag template
    pub fn output_tag(&self) -> &Template {
        &self.output_tag
    }

    /// Record assembler
    pub fn assembler(&self) -> &RecordAssembler {
        &self.assembler
    }

    /// Shared pipeline counters
    pub fn metrics(&self) -> &Arc<PipelineMetrics> {
        &self.metrics
    }

    /// Compile every template up front
    ///
    /// # Errors
    /// Returns the first template that fails to compile
    pub fn compile_all(&self) -> Result<(), TemplateError> {
        self.expander.compile(&self.output_tag)?;
        for (_, template) in self.assembler.field_map().iter() {
            self.expander.compile(template)?;
        }
        Ok(())
    }

    /// Transform one event without emitting it
    ///
    /// # Errors
    /// Returns an error if any template fails to expand
    pub fn transform(
        &self,
        tag: &str,
        time: EventTime,
        record: &Record,
    ) -> Result<Event, EventError> {
        let parts = TagParts::split(tag);
        let view = EventView {
            record,
            tag,
            parts: &parts,
            time,
        };

        let mut scope = self
            .expander
            .scope(view)
            .map_err(|e| EventError::new(tag, e))?;

        let output_tag = scope
            .expand_text(&self.output_tag)
            .map_err(|e| EventError::new(tag, e))?;
        let output_record = self
            .assembler
            .assemble(record, scope.as_mut())
            .map_err(|e| EventError::new(tag, e))?;

        Ok(Event::new(output_tag, time, output_record))
    }

    /// Transform one event and emit it, dropping it on failure
    ///
    /// Returns `true` if the event was emitted.
    pub fn process<S: Sink + ?Sized>(&self, event: &Event, sink: &mut S) -> bool {
        self.metrics.events_received.inc();

        match self.transform(&event.tag, event.time, &event.record) {
            Ok(reformed) => {
                tracing::trace!(
                    tag = %event.tag,
                    output_tag = %reformed.tag,
                    "Event reformed"
                );
                sink.emit(reformed);
                self.metrics.events_emitted.inc();
                true
            }
            Err(e) => {
                tracing::warn!(
                    error.kind = e.kind(),
                    error = %e.source,
                    tag = %e.tag,
                    "Dropping event"
                );
                self.metrics.events_dropped.inc();
                false
            }
        }
    }

    /// Process a sequence of events in order
    ///
    /// Returns the number of events emitted.
    pub fn process_all<'e, I, S>(&self, events: I, sink: &mut S) -> usize
    where
        I: IntoIterator<Item = &'e Event>,
        S: Sink + ?Sized,
    {
        events
            .into_iter()
            .filter(|event| self.process(event, sink))
            .count()
    }
}

/// Builder for [`ReformEngine`]
pub struct ReformEngineBuilder {
    output_tag: String,
    mode: ExpandMode,
    field_map: FieldMap,
    remove_keys: Option<RemoveKeys>,
    renew_record: bool,
    auto_typecast: bool,
    hostname: String,
    metrics: Option<Arc<PipelineMetrics>>,
}

impl ReformEngineBuilder {
    /// Create a new builder
    pub fn new(output_tag: impl Into<String>) -> Self {
        Self {
            output_tag: output_tag.into(),
            mode: ExpandMode::Expression,
            field_map: FieldMap::new(),
            remove_keys: None,
            renew_record: false,
            auto_typecast: true,
            hostname: "localhost".to_string(),
            metrics: None,
        }
    }

    /// Set the expansion mode
    pub fn mode(mut self, mode: ExpandMode) -> Self {
        self.mode = mode;
        self
    }

    /// Add a field template
    pub fn field(mut self, key: impl Into<String>, template: impl Into<String>) -> Self {
        self.field_map.insert(key.into(), template.into());
        self
    }

    /// Replace the whole field map
    pub fn field_map(mut self, field_map: FieldMap) -> Self {
        self.field_map = field_map;
        self
    }

    /// Set keys removed from outgoing records
    pub fn remove_keys(mut self, remove_keys: RemoveKeys) -> Self {
        self.remove_keys = Some(remove_keys);
        self
    }

    /// Rebuild records from empty
    pub fn renew_record(mut self, renew: bool) -> Self {
        self.renew_record = renew;
        self
    }

    /// Keep value types of single-placeholder templates
    pub fn auto_typecast(mut self, enabled: bool) -> Self {
        self.auto_typecast = enabled;
        self
    }

    /// Set the hostname exposed to templates
    pub fn hostname(mut self, hostname: impl Into<String>) -> Self {
        self.hostname = hostname.into();
        self
    }

    /// Use shared counters
    pub fn metrics(mut self, metrics: Arc<PipelineMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Build the engine
    pub fn build(self) -> ReformEngine {
        let metrics = self.metrics.unwrap_or_default();

        let expander: Box<dyn Expander> = match self.mode {
            ExpandMode::Placeholder => Box::new(
                PlaceholderExpander::new(self.hostname)
                    .with_auto_typecast(self.auto_typecast)
                    .with_metrics(Arc::clone(&metrics)),
            ),
            ExpandMode::Expression => Box::new(
                ExpressionExpander::new(self.hostname).with_auto_typecast(self.auto_typecast),
            ),
        };

        let mut assembler = RecordAssembler::new(self.field_map).with_renew(self.renew_record);
        if let Some(remove_keys) = self.remove_keys {
            assembler = assembler.with_remove_keys(remove_keys);
        }

        tracing::debug!(
            mode = %expander.mode(),
            fields = assembler.field_map().len(),
            renew_record = assembler.renew(),
            "Created ReformEngine"
        );

        ReformEngine {
            output_tag: Template::new(self.output_tag),
            assembler,
            expander,
            metrics,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;
    use serde_json::{json, Value};

    fn record(value: Value) -> Record {
        match value {
            Value::Object(map) => map,
            _ => panic!("test record must be an object"),
        }
    }

    fn event(tag: &str, value: Value) -> Event {
        Event::new(tag, 1_388_534_400, record(value))
    }

    #[test]
    fn test_placeholder_pipeline() {
        let engine = ReformEngine::builder("reformed.${tag_parts[-1]}")
            .mode(ExpandMode::Placeholder)
            .field("host", "${hostname}")
            .field("msg", "${tag} ${message}")
            .hostname("web01")
            .build();

        let mut sink = VecSink::new();
        let input = event("app.web.access", json!({"message": "hello"}));
        assert!(engine.process(&input, &mut sink));

        let out = &sink.events()[0];
        assert_eq!(out.tag, "reformed.access");
        assert_eq!(out.time, input.time);
        assert_eq!(
            Value::Object(out.record.clone()),
            json!({"message": "hello", "host": "web01", "msg": "app.web.access hello"})
        );
        // the incoming record is untouched
        assert_eq!(Value::Object(input.record), json!({"message": "hello"}));
    }

    #[test]
    fn test_expression_pipeline() {
        let engine = ReformEngine::builder("prefix_${tag.split('.').first}")
            .mode(ExpandMode::Expression)
            .field("level", "${level.to_upper()}")
            .renew_record(true)
            .build();

        let reformed = engine
            .transform("app.web", EventTime::from_secs(0), &record(json!({"level": "warn"})))
            .unwrap();
        assert_eq!(reformed.tag, "prefix_app");
        assert_eq!(Value::Object(reformed.record), json!({"level": "WARN"}));
    }

    #[test]
    fn test_output_tag_is_text() {
        let engine = ReformEngine::builder("${code}")
            .mode(ExpandMode::Placeholder)
            .build();

        let reformed = engine
            .transform("t", EventTime::from_secs(0), &record(json!({"code": 200})))
            .unwrap();
        assert_eq!(reformed.tag, "200");
    }

    #[test]
    fn test_failed_event_does_not_stop_stream() {
        let engine = ReformEngine::builder("out")
            .mode(ExpandMode::Expression)
            .field("x", "${maybe}")
            .build();

        let events = vec![
            event("a", json!({"maybe": 1})),
            event("b", json!({})),
            event("c", json!({"maybe": 3})),
        ];

        let mut sink = VecSink::new();
        let emitted = engine.process_all(&events, &mut sink);

        assert_eq!(emitted, 2);
        let xs: Vec<_> = sink.events().iter().map(|e| e.record["x"].clone()).collect();
        assert_eq!(xs, vec![json!(1), json!(3)]);

        let snapshot = engine.metrics().snapshot();
        assert_eq!(snapshot.events_received, 3);
        assert_eq!(snapshot.events_emitted, 2);
        assert_eq!(snapshot.events_dropped, 1);
    }

    #[test]
    fn test_transform_error_carries_tag() {
        let engine = ReformEngine::builder("${undefined_var}")
            .mode(ExpandMode::Expression)
            .build();

        let err = engine
            .transform("app.web", EventTime::from_secs(0), &Record::new())
            .unwrap_err();
        assert_eq!(err.tag, "app.web");
        assert_eq!(err.kind(), "evaluation");
    }

    #[test]
    fn test_compile_all_reports_syntax_error() {
        let engine = ReformEngine::builder("out")
            .mode(ExpandMode::Expression)
            .field("bad", "${1 +}")
            .build();
        assert!(engine.compile_all().is_err());

        let ok = ReformEngine::builder("out.${tag}")
            .mode(ExpandMode::Expression)
            .field("good", "${tag_parts[0]}")
            .build();
        assert!(ok.compile_all().is_ok());
    }

    #[test]
    fn test_closure_sink() {
        let engine = ReformEngine::builder("${tag}.out")
            .mode(ExpandMode::Placeholder)
            .build();

        let mut tags = Vec::new();
        let mut sink = |e: Event| tags.push(e.tag);
        engine.process(&event("x.y", json!({})), &mut sink);
        assert_eq!(tags, vec!["x.y.out".to_string()]);
    }

    #[test]
    fn test_from_config() {
        let config = Config::from_yaml_str(
            r#"
output_tag: "${tag}.reformed"
enable_expression_mode: false
renew_record: true
remove_keys: "drop"
hostname: "cfg-host"
host: "${hostname}"
record:
  drop: "x"
  kept: "${message}"
"#,
        )
        .unwrap();
        let engine = ReformEngine::from_config(&config, "ignored").unwrap();
        assert_eq!(engine.mode(), ExpandMode::Placeholder);

        let reformed = engine
            .transform("a.b", EventTime::from_secs(0), &record(json!({"message": "m"})))
            .unwrap();
        assert_eq!(reformed.tag, "a.b.reformed");
        assert_eq!(
            Value::Object(reformed.record),
            json!({"host": "cfg-host", "kept": "m"})
        );
    }

    #[test]
    fn test_prepare_reports_template_error() {
        let config = Config::from_yaml_str(
            "output_tag: out\nenable_expression_mode: true\nbroken: \"${1 +}\"\n",
        )
        .unwrap();
        let err = ReformEngine::prepare(&config, "h").unwrap_err();
        assert!(matches!(err, AppError::Template(TemplateError::Compilation { .. })));

        // lazily built engines defer the failure to the event
        assert!(ReformEngine::from_config(&config, "h").is_ok());
    }

    #[test]
    fn test_prepare_reports_config_error() {
        let mut config = Config::from_yaml_str("output_tag: out\n").unwrap();
        config.record.insert(
            serde_yaml::Value::from("nested"),
            serde_yaml::Value::Sequence(vec![serde_yaml::Value::Bool(true)]),
        );
        let err = ReformEngine::prepare(&config, "h").unwrap_err();
        assert!(matches!(err, AppError::Config(ConfigError::ValidationError(_))));
    }

    #[test]
    fn test_prepare_compiles_valid_config() {
        let config = Config::from_yaml_str(
            "output_tag: \"out.${tag}\"\nenable_expression_mode: true\nup: \"${message.to_upper()}\"\n",
        )
        .unwrap();
        let engine = ReformEngine::prepare(&config, "h").unwrap();
        assert_eq!(engine.mode(), ExpandMode::Expression);
    }
}
