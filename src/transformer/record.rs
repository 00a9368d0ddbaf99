//! Record assembly
//!
//! Applies the configured field map to a copy of the incoming record (or to
//! an empty record when renewing) and then removes the configured keys.

use serde::Serialize;

use crate::error::TemplateError;

use super::event::Record;
use super::expander::{EventScope, Template};

/// Ordered mapping of destination key to template
///
/// Inserting an existing key replaces its template but keeps the original
/// position, so flat configuration entries overridden by the `record` block
/// are still applied in the order they were first declared.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FieldMap {
    entries: Vec<(String, Template)>,
}

impl FieldMap {
    /// Create an empty field map
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Insert or replace a destination key
    pub fn insert(&mut self, key: impl Into<String>, template: impl Into<Template>) {
        let key = key.into();
        let template = template.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = template,
            None => self.entries.push((key, template)),
        }
    }

    /// Template for a destination key
    pub fn get(&self, key: &str) -> Option<&Template> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, template)| template)
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the map is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate over entries in application order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Template)> {
        self.entries.iter().map(|(k, t)| (k.as_str(), t))
    }
}

impl<K, T> FromIterator<(K, T)> for FieldMap
where
    K: Into<String>,
    T: Into<Template>,
{
    fn from_iter<I: IntoIterator<Item = (K, T)>>(iter: I) -> Self {
        let mut map = FieldMap::new();
        for (key, template) in iter {
            map.insert(key, template);
        }
        map
    }
}

impl Serialize for FieldMap {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        use serde::ser::SerializeMap;

        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (key, template) in &self.entries {
            map.serialize_entry(key, template)?;
        }
        map.end()
    }
}

/// Keys deleted from every assembled record
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct RemoveKeys {
    keys: Vec<String>,
}

impl RemoveKeys {
    /// Parse a comma-separated key list
    ///
    /// Surrounding whitespace is trimmed from every key.
    pub fn parse(list: &str) -> Self {
        Self {
            keys: list.split(',').map(|k| k.trim().to_string()).collect(),
        }
    }

    /// Keys in configuration order
    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    /// Check if there are no keys
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Delete every listed key from the record
    ///
    /// Absent keys are ignored.
    pub fn apply(&self, record: &mut Record) {
        for key in &self.keys {
            record.shift_remove(key);
        }
    }
}

impl<S: Into<String>> FromIterator<S> for RemoveKeys {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self {
            keys: iter.into_iter().map(Into::into).collect(),
        }
    }
}

/// Builds the outgoing record of an event
#[derive(Debug, Clone, Default)]
pub struct RecordAssembler {
    field_map: FieldMap,
    remove_keys: Option<RemoveKeys>,
    renew: bool,
}

impl RecordAssembler {
    /// Create an assembler for the given field map
    pub fn new(field_map: FieldMap) -> Self {
        Self {
            field_map,
            remove_keys: None,
            renew: false,
        }
    }

    /// Start from an empty record instead of a copy of the input
    pub fn with_renew(mut self, renew: bool) -> Self {
        self.renew = renew;
        self
    }

    /// Delete these keys after the field map is applied
    pub fn with_remove_keys(mut self, remove_keys: RemoveKeys) -> Self {
        self.remove_keys = Some(remove_keys);
        self
    }

    /// Configured field map
    pub fn field_map(&self) -> &FieldMap {
        &self.field_map
    }

    /// Configured remove keys
    pub fn remove_keys(&self) -> Option<&RemoveKeys> {
        self.remove_keys.as_ref()
    }

    /// Whether records are rebuilt from empty
    pub fn renew(&self) -> bool {
        self.renew
    }

    /// Assemble the outgoing record
    ///
    /// `scope` must have been built from `record`; every template is
    /// expanded against the original input, never against keys assigned
    /// earlier in the same pass. `record` itself is not modified.
    ///
    /// # Errors
    ///
    /// Returns the first template expansion error.
    pub fn assemble(
        &self,
        record: &Record,
        scope: &mut dyn EventScope,
    ) -> Result<Record, TemplateError> {
        let mut output = if self.renew {
            Record::with_capacity(self.field_map.len())
        } else {
            record.clone()
        };

        for (key, template) in self.field_map.iter() {
            let value = scope.expand(template)?;
            output.insert(key.to_string(), value);
        }

        if let Some(remove_keys) = &self.remove_keys {
            remove_keys.apply(&mut output);
        }

        Ok(output)
    }
}
