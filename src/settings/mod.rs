//! Interactive settings: the field registry that describes every configurable
//! option, and the lock-guarded store holding their current values.

mod registry;
mod store;

use thiserror::Error;

pub use registry::{
    BUILTIN_SCHEMA, FieldDescriptor, FieldRegistry, Options, RegistryError, Schema, SchemaField,
    ValueKind,
};
pub use store::{FieldValue, Settings, parse_bool_literal};

/// Recoverable failures of an interactive assignment. None of these abort the
/// command loop; the message is shown to the user and the store is unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SettingsError {
    #[error("unknown config field {name:?}")]
    UnknownField { name: String },

    #[error("invalid {field:?} value {value:?}")]
    InvalidValue { field: String, value: String },

    #[error("malformed boolean for {field:?}: {value:?}")]
    MalformedBool { field: String, value: String },

    #[error("malformed number for {field:?}: {value:?}")]
    MalformedNumber { field: String, value: String },

    #[error("please specify a value, e.g. {name}=<val>")]
    MissingValue { name: String },
}
