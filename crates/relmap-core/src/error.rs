use crate::{
    db::{
        config::ConfigError, engine::EngineError, plan::PlanError, repository::RepositoryError,
    },
    entity::access::AccessError,
    model::DefinitionError,
    transform::TransformError,
};
use std::fmt;
use thiserror::Error as ThisError;

///
/// OrmError
///
/// Aggregate runtime error. Every module owns its own error enum; this type
/// only forwards them and classifies the result.
///

#[derive(Debug, ThisError)]
pub enum OrmError {
    #[error(transparent)]
    Access(#[from] AccessError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Definition(#[from] DefinitionError),

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error(transparent)]
    Plan(#[from] PlanError),

    #[error(transparent)]
    Repository(#[from] RepositoryError),

    #[error(transparent)]
    Transform(#[from] TransformError),
}

impl OrmError {
    /// Classify this error for callers that only care about remediation.
    #[must_use]
    pub const fn class(&self) -> ErrorClass {
        match self {
            Self::Access(_) | Self::Config(_) | Self::Definition(_) | Self::Plan(_) => {
                ErrorClass::Configuration
            }
            Self::Engine(_) => ErrorClass::Engine,
            Self::Repository(err) => err.class(),
            Self::Transform(err) => err.class(),
        }
    }

    /// Return the subsystem that raised this error.
    #[must_use]
    pub const fn origin(&self) -> ErrorOrigin {
        match self {
            Self::Access(_) => ErrorOrigin::Accessor,
            Self::Config(_) => ErrorOrigin::Config,
            Self::Definition(_) => ErrorOrigin::Definition,
            Self::Engine(_) => ErrorOrigin::Engine,
            Self::Plan(_) => ErrorOrigin::Planner,
            Self::Repository(_) => ErrorOrigin::Repository,
            Self::Transform(_) => ErrorOrigin::Transformer,
        }
    }

    /// True when the error reports an expected absence rather than a defect.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self.class(), ErrorClass::NotFound)
    }
}

///
/// ErrorClass
/// Internal error taxonomy for runtime classification.
///

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum ErrorClass {
    /// Expected absence; callers may recover.
    NotFound,
    /// The caller supplied an invalid argument or entity state.
    Invalid,
    /// Definitions, configuration or registrations are defective.
    Configuration,
    /// The query engine failed.
    Engine,
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::NotFound => "not_found",
            Self::Invalid => "invalid",
            Self::Configuration => "configuration",
            Self::Engine => "engine",
        };
        write!(f, "{label}")
    }
}

///
/// ErrorOrigin
/// Internal origin taxonomy for runtime classification.
///

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum ErrorOrigin {
    Accessor,
    Config,
    Definition,
    Engine,
    Planner,
    Repository,
    Transformer,
}

impl fmt::Display for ErrorOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Accessor => "accessor",
            Self::Config => "config",
            Self::Definition => "definition",
            Self::Engine => "engine",
            Self::Planner => "planner",
            Self::Repository => "repository",
            Self::Transformer => "transformer",
        };
        write!(f, "{label}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_is_recoverable_class() {
        let err = OrmError::from(RepositoryError::NotFound {
            entity: "User".to_string(),
        });

        assert_eq!(err.class(), ErrorClass::NotFound);
        assert_eq!(err.origin(), ErrorOrigin::Repository);
        assert!(err.is_not_found());
    }

    #[test]
    fn definition_errors_are_configuration_defects() {
        let err = OrmError::from(DefinitionError::UnknownEntity {
            entity: "Ghost".to_string(),
        });

        assert_eq!(err.class(), ErrorClass::Configuration);
        assert_eq!(err.origin(), ErrorOrigin::Definition);
        assert_eq!(err.to_string(), "unknown entity 'Ghost'");
    }

    #[test]
    fn missing_key_is_invalid_input() {
        let err = OrmError::from(RepositoryError::MissingPrimaryKey {
            entity: "User".to_string(),
            keys: vec!["id".to_string()],
        });

        assert_eq!(err.class(), ErrorClass::Invalid);
    }
}
