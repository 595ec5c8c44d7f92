use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::debug;

use super::SettingsError;
use super::registry::{FieldDescriptor, FieldRegistry, Options, ValueKind};
use crate::completion::{CompletionSettings, Endpoint};

/// Current value of one field, tagged with its kind.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    String(String),
    Bool(bool),
    Int(i64),
    Float(f64),
}

impl FieldValue {
    pub fn kind(&self) -> ValueKind {
        match self {
            Self::String(_) => ValueKind::String,
            Self::Bool(_) => ValueKind::Bool,
            Self::Int(_) => ValueKind::Int,
            Self::Float(_) => ValueKind::Float,
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String(value) => f.write_str(value),
            Self::Bool(value) => write!(f, "{value}"),
            Self::Int(value) => write!(f, "{value}"),
            Self::Float(value) => write!(f, "{value}"),
        }
    }
}

/// Accepts the usual spellings: `1 t T true TRUE True` and their false counterparts.
pub fn parse_bool_literal(raw: &str) -> Option<bool> {
    match raw {
        "1" | "t" | "T" | "true" | "TRUE" | "True" => Some(true),
        "0" | "f" | "F" | "false" | "FALSE" | "False" => Some(false),
        _ => None,
    }
}

fn parse_value(field: &FieldDescriptor, raw: &str) -> Result<FieldValue, SettingsError> {
    let malformed_number = || SettingsError::MalformedNumber {
        field: field.name.to_string(),
        value: raw.to_string(),
    };

    match field.kind {
        ValueKind::String if field.is_multi_choice() => {
            if field.choices.iter().any(|choice| *choice == raw) {
                Ok(FieldValue::String(raw.to_string()))
            } else {
                Err(SettingsError::InvalidValue {
                    field: field.name.to_string(),
                    value: raw.to_string(),
                })
            }
        }
        ValueKind::String => Ok(FieldValue::String(raw.to_string())),
        ValueKind::Bool => parse_bool_literal(raw).map(FieldValue::Bool).ok_or_else(|| {
            SettingsError::MalformedBool {
                field: field.name.to_string(),
                value: raw.to_string(),
            }
        }),
        ValueKind::Int => raw
            .parse::<i64>()
            .map(FieldValue::Int)
            .map_err(|_| malformed_number()),
        ValueKind::Float => raw
            .parse::<f64>()
            .map(FieldValue::Float)
            .map_err(|_| malformed_number()),
    }
}

/// Process-wide current settings. Every read and write goes through one lock,
/// so the store can be shared with a background invoker.
#[derive(Debug)]
pub struct Settings {
    registry: Arc<FieldRegistry>,
    values: Mutex<HashMap<&'static str, FieldValue>>,
}

impl Settings {
    pub fn new(registry: Arc<FieldRegistry>) -> Self {
        let values = registry
            .fields()
            .iter()
            .map(|field| (field.name, field.default.clone()))
            .collect();
        Self {
            registry,
            values: Mutex::new(values),
        }
    }

    pub fn registry(&self) -> &FieldRegistry {
        &self.registry
    }

    fn values(&self) -> MutexGuard<'_, HashMap<&'static str, FieldValue>> {
        self.values.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn get(&self, field: &FieldDescriptor) -> String {
        self.values()
            .get(field.name)
            .map(FieldValue::to_string)
            .unwrap_or_else(|| field.default_value.clone())
    }

    /// Parses `raw` according to the field's kind and stores it. On failure
    /// the previous value is kept.
    pub fn set(&self, field: &FieldDescriptor, raw: &str) -> Result<(), SettingsError> {
        let value = parse_value(field, raw)?;
        debug!(field = field.name, value = %value, "updated setting");
        self.values().insert(field.name, value);
        Ok(())
    }

    /// Applies `token=raw`, where `token` is either a field name or one of a
    /// multi-choice field's values. A choice is selected only by a true literal.
    pub fn configure(&self, token: &str, raw: &str) -> Result<(), SettingsError> {
        let Some(field) = self.registry.describe(token) else {
            return Err(SettingsError::UnknownField {
                name: token.to_string(),
            });
        };

        if field.name == token {
            return self.set(field, raw);
        }

        if parse_bool_literal(raw) == Some(true) {
            return self.set(field, token);
        }

        Err(SettingsError::InvalidValue {
            field: field.name.to_string(),
            value: raw.to_string(),
        })
    }

    /// Snapshot of the values the completion service cares about, read under
    /// a single lock.
    pub fn completion_settings(&self) -> CompletionSettings {
        let defaults = Options::default();
        let values = self.values();

        let endpoint = match values.get("endpoint") {
            Some(FieldValue::String(raw)) => Endpoint::parse(raw),
            _ => None,
        };
        let max_tokens = match values.get("max_tokens") {
            Some(FieldValue::Int(value)) => *value,
            _ => defaults.max_tokens,
        };
        let temperature = match values.get("temperature") {
            Some(FieldValue::Float(value)) => *value,
            _ => defaults.temperature,
        };

        CompletionSettings {
            endpoint: endpoint.unwrap_or_default(),
            max_tokens,
            temperature,
        }
    }
}
