//! Engine error types.

use datascope_lang::ParseError;
use thiserror::Error;

/// Failures reported by the current-user provider or a scope resolver.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    /// The current-user provider failed.
    #[error("current user lookup failed: {0}")]
    UserProvider(String),

    /// A role's scope could not be resolved.
    #[error("scope resolution failed for role '{role}': {message}")]
    Scope {
        /// Role key.
        role: String,
        /// What went wrong.
        message: String,
    },

    /// The role is not known to the resolver.
    #[error("unknown role '{0}'")]
    UnknownRole(String),
}

/// Engine errors.
#[derive(Debug, Error)]
pub enum Error {
    /// A column mapping's key and value lists differ in length.
    #[error("column mapping arity mismatch: {keys} keys but {values} values")]
    MappingArity { keys: usize, values: usize },

    /// A policy rule declares no column mappings.
    #[error("policy rule declares no column mappings")]
    EmptyRule,

    /// A mapping value is not a usable column identifier.
    #[error("invalid column identifier '{0}'")]
    InvalidColumn(String),

    /// A data-scope code or name is not recognized.
    #[error("unknown data scope '{0}'")]
    UnknownScope(String),

    /// A scope template or its fallback fragment does not parse.
    #[error("malformed scope template '{template}': {source}")]
    MalformedTemplate {
        template: String,
        #[source]
        source: ParseError,
    },

    /// A rule is already registered for this identifier.
    #[error("a policy rule is already registered for '{0}'")]
    DuplicateRule(String),

    /// A declaration or configuration document could not be decoded.
    #[error("declaration error: {0}")]
    Declaration(#[from] serde_json::Error),

    /// Reading a declaration or configuration file failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// User or scope resolution failed.
    #[error(transparent)]
    Resolve(#[from] ResolveError),

    /// A rendered fragment did not parse.
    #[error("fragment parse error: {0}")]
    Parse(#[from] ParseError),
}

impl Error {
    /// Whether this error is a configuration problem that should abort
    /// startup, as opposed to a failure while evaluating a query.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Error::MappingArity { .. }
                | Error::EmptyRule
                | Error::InvalidColumn(_)
                | Error::UnknownScope(_)
                | Error::MalformedTemplate { .. }
                | Error::DuplicateRule(_)
                | Error::Declaration(_)
                | Error::Io(_)
        )
    }
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::MappingArity { keys: 2, values: 1 };
        assert!(err.to_string().contains("2 keys but 1 values"));

        let err = Error::from(ResolveError::Scope {
            role: "common".into(),
            message: "directory offline".into(),
        });
        assert!(err.to_string().contains("role 'common'"));
        assert!(err.to_string().contains("directory offline"));
    }

    #[test]
    fn test_configuration_classification() {
        assert!(Error::EmptyRule.is_configuration());
        assert!(Error::DuplicateRule("SysUserMapper".into()).is_configuration());
        assert!(!Error::Resolve(ResolveError::UnknownRole("x".into())).is_configuration());
    }
}
