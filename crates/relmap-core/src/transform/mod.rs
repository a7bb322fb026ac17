//! Module: transform
//! Responsibility: bidirectional storage ↔ memory value conversion.
//! Does not own: deciding which fields are converted (that is the field
//! definition's `transformer`/`type`).

mod array;
mod datetime;


pub use array::ArrayTransformer;
pub use datetime::DatetimeTransformer;

use crate::{ErrorClass, model::FieldDefinition, value::Value};
use std::{collections::HashMap, fmt, sync::Arc};
use thiserror::Error as ThisError;

///
/// TransformError
///

#[derive(Debug, ThisError)]
pub enum TransformError {
    #[error("unable to find transformer '{name}'")]
    TransformerNotFound { name: String },

    #[error("transformer '{transformer}' rejected value: {message}")]
    InvalidValue {
        transformer: String,
        message: String,
    },
}

impl TransformError {
    #[must_use]
    pub const fn class(&self) -> ErrorClass {
        match self {
            Self::TransformerNotFound { .. } => ErrorClass::Configuration,
            Self::InvalidValue { .. } => ErrorClass::Invalid,
        }
    }

    pub(crate) fn invalid(transformer: &str, value: &Value) -> Self {
        Self::InvalidValue {
            transformer: transformer.to_string(),
            message: format!("cannot convert {value}"),
        }
    }
}

///
/// Transformer
///
/// `transform` converts a stored value into its in-memory form;
/// `reverse_transform` converts back. Both pass null through untouched.
///

pub trait Transformer: Send + Sync {
    fn name(&self) -> &str;

    fn transform(&self, value: Value) -> Result<Value, TransformError>;

    fn reverse_transform(&self, value: Value) -> Result<Value, TransformError>;
}

///
/// TransformerRegistry
///

#[derive(Clone, Default)]
pub struct TransformerRegistry {
    transformers: HashMap<String, Arc<dyn Transformer>>,
}

impl TransformerRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry pre-seeded with `timestamp` and `array`.
    #[must_use]
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(DatetimeTransformer);
        registry.register(ArrayTransformer);

        registry
    }

    /// Register under the transformer's own name, replacing any previous one.
    pub fn register<T: Transformer + 'static>(&mut self, transformer: T) {
        self.transformers
            .insert(transformer.name().to_string(), Arc::new(transformer));
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&dyn Transformer> {
        self.transformers
            .get(name)
            .map(|transformer| &**transformer)
    }

    /// Transformer applying to `field`.
    ///
    /// An explicit `transformer` must exist; a `type` without a registered
    /// transformer of that name simply means no conversion.
    pub fn resolve(&self, field: &FieldDefinition) -> Result<Option<&dyn Transformer>, TransformError> {
        if let Some(name) = field.transformer() {
            return self
                .get(name)
                .map(Some)
                .ok_or_else(|| TransformError::TransformerNotFound {
                    name: name.to_string(),
                });
        }

        Ok(field.ty().and_then(|ty| self.get(ty)))
    }

    /// Storage → memory for one field.
    pub fn to_memory(&self, field: &FieldDefinition, value: Value) -> Result<Value, TransformError> {
        match self.resolve(field)? {
            Some(transformer) if !value.is_null() => transformer.transform(value),
            _ => Ok(value),
        }
    }

    /// Memory → storage for one field.
    pub fn to_storage(&self, field: &FieldDefinition, value: Value) -> Result<Value, TransformError> {
        match self.resolve(field)? {
            Some(transformer) if !value.is_null() => transformer.reverse_transform(value),
            _ => Ok(value),
        }
    }
}

impl fmt::Debug for TransformerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.transformers.keys().collect();
        names.sort();

        f.debug_struct("TransformerRegistry")
            .field("transformers", &names)
            .finish()
    }
}
