use crate::{
    transform::{TransformError, Transformer},
    value::Value,
};

///
/// ArrayTransformer
///
/// Brace-delimited text (`{a,b,c}`) ↔ `Value::List` of text items.
///

#[derive(Clone, Copy, Debug, Default)]
pub struct ArrayTransformer;

impl ArrayTransformer {
    pub const NAME: &'static str = "array";
}

impl Transformer for ArrayTransformer {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn transform(&self, value: Value) -> Result<Value, TransformError> {
        match value {
            Value::Null | Value::List(_) => Ok(value),
            Value::Text(ref text) => {
                let inner = text
                    .trim()
                    .strip_prefix('{')
                    .and_then(|rest| rest.strip_suffix('}'))
                    .ok_or_else(|| TransformError::invalid(Self::NAME, &value))?;

                if inner.is_empty() {
                    return Ok(Value::List(Vec::new()));
                }

                Ok(Value::List(inner.split(',').map(Value::from).collect()))
            }
            other => Err(TransformError::invalid(Self::NAME, &other)),
        }
    }

    fn reverse_transform(&self, value: Value) -> Result<Value, TransformError> {
        match value {
            Value::Null => Ok(Value::Null),
            Value::List(items) => {
                let parts: Vec<String> = items
                    .iter()
                    .map(|item| item.canonical_text().unwrap_or_default())
                    .collect();

                Ok(Value::Text(format!("{{{}}}", parts.join(","))))
            }
            other => Err(TransformError::invalid(Self::NAME, &other)),
        }
    }
}
