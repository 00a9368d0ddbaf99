//! Placeholder context construction
//!
//! Builds the per-event lookup table used by the constrained expander.
//! Keys are the literal placeholder tokens (`${tag}`, `${tag_parts[-1]}`,
//! `__HOSTNAME__`, ...) so expansion is a verbatim lookup.
//!
//! # Precedence
//!
//! Reserved names are inserted first and record fields after them. A
//! record field named like a reserved placeholder (for example a field
//! literally called `tag`) therefore replaces the reserved value. Legacy
//! aliases are copied last, so `__TAG__` always equals `${tag}`.

use std::borrow::Cow;
use std::collections::HashMap;

use serde_json::Value;

use super::event::{EventTime, Record};
use super::tag::TagParts;

/// Names under which tag segments are exposed
///
/// `tag_parts` is the current name, `tags` the legacy one. Both resolve to
/// the same segment for the same index.
pub const SEGMENT_FAMILIES: [&str; 2] = ["tag_parts", "tags"];

/// Legacy `__NAME__` tokens and the placeholder each one aliases
pub const LEGACY_ALIASES: [(&str, &str); 3] = [
    ("__TAG__", "${tag}"),
    ("__HOSTNAME__", "${hostname}"),
    ("__TIME__", "${time}"),
];

/// Per-event placeholder lookup table
///
/// Built fresh for every event and dropped once the event is emitted.
#[derive(Debug, Clone, Default)]
pub struct PlaceholderContext<'a> {
    values: HashMap<String, Cow<'a, Value>>,
}

impl<'a> PlaceholderContext<'a> {
    /// Build the context for one event
    pub fn build(
        record: &'a Record,
        tag: &str,
        parts: &TagParts<'_>,
        time: EventTime,
        hostname: &str,
    ) -> Self {
        let mut values: HashMap<String, Cow<'a, Value>> =
            HashMap::with_capacity(3 + LEGACY_ALIASES.len() + parts.len() * 4 + record.len());

        values.insert(
            "${time}".to_string(),
            Cow::Owned(Value::from(time.as_secs())),
        );
        values.insert("${tag}".to_string(), Cow::Owned(Value::from(tag)));
        values.insert(
            "${hostname}".to_string(),
            Cow::Owned(Value::from(hostname)),
        );

        for family in SEGMENT_FAMILIES {
            for (index, negative, part) in parts.indexed() {
                let value = Value::from(part);
                values.insert(
                    format!("${{{}[{}]}}", family, negative),
                    Cow::Owned(value.clone()),
                );
                values.insert(format!("${{{}[{}]}}", family, index), Cow::Owned(value));
            }
        }

        for (key, value) in record {
            values.insert(format!("${{{}}}", key), Cow::Borrowed(value));
        }

        // aliases follow whatever their current form resolved to
        for (legacy, current) in LEGACY_ALIASES {
            if let Some(value) = values.get(current).cloned() {
                values.insert(legacy.to_string(), value);
            }
        }

        Self { values }
    }

    /// Look up a placeholder token verbatim
    pub fn get(&self, token: &str) -> Option<&Value> {
        self.values.get(token).map(|v| v.as_ref())
    }

    /// Check if the token is known
    pub fn contains(&self, token: &str) -> bool {
        self.values.contains_key(token)
    }

    /// Number of registered tokens
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Check if the context has no tokens
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
