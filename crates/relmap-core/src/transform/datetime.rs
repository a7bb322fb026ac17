use crate::{
    transform::{TransformError, Transformer},
    value::{TIMESTAMP_FORMAT, Value, parse_timestamp},
};
use chrono::{DateTime, Utc};

///
/// DatetimeTransformer
///
/// Storage text (or unix seconds) ↔ `Value::Timestamp`. Written back at
/// second precision.
///

#[derive(Clone, Copy, Debug, Default)]
pub struct DatetimeTransformer;

impl DatetimeTransformer {
    pub const NAME: &'static str = "timestamp";
}

impl Transformer for DatetimeTransformer {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn transform(&self, value: Value) -> Result<Value, TransformError> {
        match value {
            Value::Null | Value::Timestamp(_) => Ok(value),
            Value::Text(ref text) => parse_timestamp(text)
                .map(Value::Timestamp)
                .ok_or_else(|| TransformError::invalid(Self::NAME, &value)),
            Value::Int(seconds) => DateTime::<Utc>::from_timestamp(seconds, 0)
                .map(|ts| Value::Timestamp(ts.naive_utc()))
                .ok_or_else(|| TransformError::invalid(Self::NAME, &value)),
            other => Err(TransformError::invalid(Self::NAME, &other)),
        }
    }

    fn reverse_transform(&self, value: Value) -> Result<Value, TransformError> {
        match value {
            Value::Null => Ok(Value::Null),
            Value::Timestamp(ts) => Ok(Value::Text(ts.format(TIMESTAMP_FORMAT).to_string())),
            Value::Text(ref text) if parse_timestamp(text).is_some() => Ok(value),
            other => Err(TransformError::invalid(Self::NAME, &other)),
        }
    }
}
