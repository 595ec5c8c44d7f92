use std::collections::HashMap;
use std::iter;

use thiserror::Error;

use super::store::FieldValue;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    String,
    Bool,
    Int,
    Float,
}

impl ValueKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Bool => "bool",
            Self::Int => "int",
            Self::Float => "float",
        }
    }
}

/// Built-in option values. Only used to seed defaults; interactive
/// assignments never write back here.
#[derive(Debug, Clone, PartialEq)]
pub struct Options {
    /// Output file name; empty means stdout.
    pub output: String,
    pub endpoint: String,
    pub max_tokens: i64,
    pub temperature: f64,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            output: String::new(),
            endpoint: "chat".to_string(),
            max_tokens: i64::from(i32::MAX),
            temperature: 1.0,
        }
    }
}

/// One field of the settings schema, in declaration order.
#[derive(Debug, Clone, Copy)]
pub struct SchemaField {
    /// Identifier of the field within [`Options`].
    pub ident: &'static str,
    /// Serialized name. `None` marks the field as not persisted.
    pub tag: Option<&'static str>,
    pub read: fn(&Options) -> FieldValue,
}

/// Static description of every option plus the side tables that enrich it.
#[derive(Debug, Clone, Copy)]
pub struct Schema {
    pub fields: &'static [SchemaField],
    /// Names for fields that are not persisted, keyed by identifier.
    pub transient_names: &'static [(&'static str, &'static str)],
    /// Allowed values for fields restricted to a bounded set.
    pub choices: &'static [(&'static str, &'static [&'static str])],
    /// Outbound parameter names; fields without an entry are not exposed.
    pub external_params: &'static [(&'static str, &'static str)],
}

fn read_output(options: &Options) -> FieldValue {
    FieldValue::String(options.output.clone())
}

fn read_endpoint(options: &Options) -> FieldValue {
    FieldValue::String(options.endpoint.clone())
}

fn read_max_tokens(options: &Options) -> FieldValue {
    FieldValue::Int(options.max_tokens)
}

fn read_temperature(options: &Options) -> FieldValue {
    FieldValue::Float(options.temperature)
}

pub const BUILTIN_SCHEMA: Schema = Schema {
    fields: &[
        SchemaField {
            ident: "output",
            tag: None,
            read: read_output,
        },
        SchemaField {
            ident: "endpoint",
            tag: Some("endpoint"),
            read: read_endpoint,
        },
        SchemaField {
            ident: "max_tokens",
            tag: Some("max_tokens"),
            read: read_max_tokens,
        },
        SchemaField {
            ident: "temperature",
            tag: Some("temperature"),
            read: read_temperature,
        },
    ],
    transient_names: &[],
    choices: &[("endpoint", &["chat", "completions", "models"])],
    external_params: &[
        ("endpoint", "endpoint"),
        ("max_tokens", "maxtokens"),
        ("temperature", "temp"),
    ],
};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("config name {0:?} is registered more than once")]
    DuplicateName(String),
}

/// Immutable metadata for one configurable setting.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldDescriptor {
    pub name: &'static str,
    pub external_param: Option<&'static str>,
    pub persisted: bool,
    pub kind: ValueKind,
    pub choices: &'static [&'static str],
    pub default_value: String,
    pub(crate) default: FieldValue,
}

impl FieldDescriptor {
    pub fn is_multi_choice(&self) -> bool {
        !self.choices.is_empty()
    }
}

/// Ordered field descriptors plus a lookup from every recognized token
/// (field name or choice value) to the owning field.
#[derive(Debug, Clone)]
pub struct FieldRegistry {
    fields: Vec<FieldDescriptor>,
    lookup: HashMap<&'static str, usize>,
}

impl FieldRegistry {
    pub fn builtin() -> Result<Self, RegistryError> {
        Self::from_schema(&BUILTIN_SCHEMA, &Options::default())
    }

    pub fn from_schema(schema: &Schema, defaults: &Options) -> Result<Self, RegistryError> {
        let mut registry = Self {
            fields: Vec::with_capacity(schema.fields.len()),
            lookup: HashMap::new(),
        };

        for field in schema.fields {
            let (name, persisted) = match field.tag.filter(|tag| !tag.is_empty()) {
                Some(tag) => (tag, true),
                None => match table_get(schema.transient_names, field.ident) {
                    Some(name) => (name, false),
                    None => continue,
                },
            };

            let default = (field.read)(defaults);
            registry.insert(FieldDescriptor {
                name,
                external_param: table_get(schema.external_params, name),
                persisted,
                kind: default.kind(),
                choices: table_get(schema.choices, name).unwrap_or(&[]),
                default_value: default.to_string(),
                default,
            })?;
        }

        Ok(registry)
    }

    fn insert(&mut self, descriptor: FieldDescriptor) -> Result<(), RegistryError> {
        let index = self.fields.len();
        for key in iter::once(descriptor.name).chain(descriptor.choices.iter().copied()) {
            if self.lookup.insert(key, index).is_some() {
                return Err(RegistryError::DuplicateName(key.to_string()));
            }
        }
        self.fields.push(descriptor);
        Ok(())
    }

    pub fn fields(&self) -> &[FieldDescriptor] {
        &self.fields
    }

    pub fn describe(&self, token: &str) -> Option<&FieldDescriptor> {
        self.lookup.get(token).map(|&index| &self.fields[index])
    }

    pub fn is_configurable(&self, token: &str) -> bool {
        self.lookup.contains_key(token)
    }

    /// Choice values always count as boolean: `chat` is shorthand for `chat=true`.
    pub fn is_boolean_field(&self, token: &str) -> bool {
        self.describe(token)
            .is_some_and(|field| field.name != token || field.kind == ValueKind::Bool)
    }
}

fn table_get<V: Copy>(table: &[(&'static str, V)], key: &str) -> Option<V> {
    table
        .iter()
        .find(|(candidate, _)| *candidate == key)
        .map(|(_, value)| *value)
}
