use derive_more::Display;
use relmap_core::{
    ErrorClass, ErrorOrigin as CoreErrorOrigin, OrmError,
    db::repository::RepositoryError,
};
use serde::{Deserialize, Serialize};
use thiserror::Error as ThisError;

///
/// Error
/// Public error type with a stable kind + origin taxonomy.
///

#[derive(Debug, Deserialize, Serialize, ThisError)]
#[error("{message}")]
pub struct Error {
    pub kind: ErrorKind,
    pub origin: ErrorOrigin,
    pub message: String,
}

impl Error {
    pub fn new(kind: ErrorKind, origin: ErrorOrigin, message: impl Into<String>) -> Self {
        Self {
            kind,
            origin,
            message: message.into(),
        }
    }

    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self.kind, ErrorKind::NotFound)
    }
}

impl From<OrmError> for Error {
    fn from(err: OrmError) -> Self {
        let kind = match &err {
            OrmError::Repository(RepositoryError::NonGeneratedKeyNull { .. }) => {
                ErrorKind::Persist(PersistErrorKind::NonGeneratedKeyNull)
            }
            OrmError::Repository(RepositoryError::MissingPrimaryKey { .. }) => {
                ErrorKind::Lookup(LookupErrorKind::MissingPrimaryKey)
            }
            OrmError::Repository(RepositoryError::CompositeKeyRequiresMap { .. }) => {
                ErrorKind::Lookup(LookupErrorKind::CompositeKeyRequiresMap)
            }
            _ => err.class().into(),
        };

        Self::new(kind, err.origin().into(), err.to_string())
    }
}

///
/// ErrorKind
/// Public error taxonomy for callers.
///

#[derive(Clone, Debug, Deserialize, Display, Eq, PartialEq, Serialize)]
pub enum ErrorKind {
    /// Expected absence, e.g. refreshing a deleted row.
    #[display("not_found")]
    NotFound,

    #[display("lookup:{_0}")]
    Lookup(LookupErrorKind),

    #[display("persist:{_0}")]
    Persist(PersistErrorKind),

    /// The caller supplied an invalid argument or entity state.
    #[display("invalid")]
    Invalid,

    /// Definitions, configuration or registrations are defective.
    #[display("configuration")]
    Configuration,

    /// The storage engine failed; the transaction was rolled back.
    #[display("engine")]
    Engine,
}

impl From<ErrorClass> for ErrorKind {
    fn from(class: ErrorClass) -> Self {
        match class {
            ErrorClass::NotFound => Self::NotFound,
            ErrorClass::Invalid => Self::Invalid,
            ErrorClass::Configuration => Self::Configuration,
            ErrorClass::Engine => Self::Engine,
        }
    }
}

///
/// LookupErrorKind
///

#[derive(Clone, Copy, Debug, Deserialize, Display, Eq, PartialEq, Serialize)]
pub enum LookupErrorKind {
    #[display("missing_primary_key")]
    MissingPrimaryKey,

    #[display("composite_key_requires_map")]
    CompositeKeyRequiresMap,
}

///
/// PersistErrorKind
///

#[derive(Clone, Copy, Debug, Deserialize, Display, Eq, PartialEq, Serialize)]
pub enum PersistErrorKind {
    /// A key that storage does not generate was left null.
    #[display("non_generated_key_null")]
    NonGeneratedKeyNull,
}

///
/// ErrorOrigin
/// Public origin taxonomy for callers.
///

#[derive(Clone, Copy, Debug, Deserialize, Display, Eq, PartialEq, Serialize)]
pub enum ErrorOrigin {
    #[display("accessor")]
    Accessor,
    #[display("config")]
    Config,
    #[display("definition")]
    Definition,
    #[display("engine")]
    Engine,
    #[display("planner")]
    Planner,
    #[display("repository")]
    Repository,
    #[display("transformer")]
    Transformer,
}

impl From<CoreErrorOrigin> for ErrorOrigin {
    fn from(origin: CoreErrorOrigin) -> Self {
        match origin {
            CoreErrorOrigin::Accessor => Self::Accessor,
            CoreErrorOrigin::Config => Self::Config,
            CoreErrorOrigin::Definition => Self::Definition,
            CoreErrorOrigin::Engine => Self::Engine,
            CoreErrorOrigin::Planner => Self::Planner,
            CoreErrorOrigin::Repository => Self::Repository,
            CoreErrorOrigin::Transformer => Self::Transformer,
        }
    }
}
