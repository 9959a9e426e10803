//! Policy rules attached to query identifiers.

use crate::error::{Error, Result};
use datascope_proto::{JoinOperator, StatementKind};

/// Binds template variables to the columns of one query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnMapping {
    keys: Vec<String>,
    values: Vec<String>,
    capability: Option<String>,
}

impl ColumnMapping {
    /// Create a mapping from parallel key and column lists.
    ///
    /// Fails when the lists differ in length or a column is not a valid
    /// (optionally qualified) identifier.
    pub fn new<K, V>(keys: K, values: V) -> Result<Self>
    where
        K: IntoIterator,
        K::Item: Into<String>,
        V: IntoIterator,
        V::Item: Into<String>,
    {
        let keys: Vec<String> = keys.into_iter().map(Into::into).collect();
        let values: Vec<String> = values.into_iter().map(Into::into).collect();

        if keys.len() != values.len() {
            return Err(Error::MappingArity {
                keys: keys.len(),
                values: values.len(),
            });
        }
        if let Some(bad) = values.iter().find(|v| !is_valid_column(v)) {
            return Err(Error::InvalidColumn(bad.clone()));
        }

        Ok(Self {
            keys,
            values,
            capability: None,
        })
    }

    /// Make the mapping a universal pass for users holding `capability`.
    pub fn with_capability(mut self, capability: impl Into<String>) -> Self {
        self.capability = Some(capability.into());
        self
    }

    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    pub fn values(&self) -> &[String] {
        &self.values
    }

    pub fn capability(&self) -> Option<&str> {
        self.capability.as_deref()
    }

    /// `(variable, column)` pairs.
    pub fn bindings(&self) -> impl Iterator<Item = (&str, &str)> {
        self.keys
            .iter()
            .map(String::as_str)
            .zip(self.values.iter().map(String::as_str))
    }
}

/// The column-mapping rules applying to one query or query-issuing type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyRule {
    mappings: Vec<ColumnMapping>,
    join: Option<JoinOperator>,
}

impl PolicyRule {
    /// Create a rule. At least one mapping is required.
    pub fn new(mappings: Vec<ColumnMapping>) -> Result<Self> {
        if mappings.is_empty() {
            return Err(Error::EmptyRule);
        }
        Ok(Self {
            mappings,
            join: None,
        })
    }

    /// Override the join operator for both per-role and cross-role joins.
    pub fn with_join(mut self, join: JoinOperator) -> Self {
        self.join = Some(join);
        self
    }

    pub fn mappings(&self) -> &[ColumnMapping] {
        &self.mappings
    }

    /// The explicit join override, if any.
    pub fn join(&self) -> Option<JoinOperator> {
        self.join
    }

    /// Join operator for a statement: the override, else OR for reads and
    /// AND for writes.
    pub fn join_for(&self, kind: StatementKind) -> JoinOperator {
        self.join.unwrap_or(if kind.is_read() {
            JoinOperator::Or
        } else {
            JoinOperator::And
        })
    }
}

/// Check that `column` is `ident` or `ident.ident...` with
/// `ident = [A-Za-z_][A-Za-z0-9_]*`.
pub fn is_valid_column(column: &str) -> bool {
    !column.is_empty()
        && column.split('.').all(|part| {
            let mut chars = part.chars();
            matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
                && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        })
}
