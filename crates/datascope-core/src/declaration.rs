//! Data-driven policy declarations.
//!
//! Declarations replace annotation scanning: a JSON table lists which query
//! or type identifiers carry which column mappings.
//!
//! ```json
//! [
//!   {
//!     "target": "SysUserMapper",
//!     "mappings": [
//!       { "keys": ["deptName", "userName"], "values": ["d.dept_id", "u.user_id"] }
//!     ]
//!   },
//!   {
//!     "target": "SysDeptMapper.selectDeptList",
//!     "mappings": [{ "keys": ["deptName"], "values": ["dept_id"], "capability": "dept:all" }],
//!     "join": "and"
//!   }
//! ]
//! ```

use crate::error::Result;
use crate::rule::{ColumnMapping, PolicyRule};
use datascope_proto::JoinOperator;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// One column mapping as written in a declaration file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MappingDeclaration {
    pub keys: Vec<String>,
    pub values: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capability: Option<String>,
}

/// The rule attached to one target identifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyDeclaration {
    pub target: String,
    pub mappings: Vec<MappingDeclaration>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub join: Option<JoinOperator>,
}

impl PolicyDeclaration {
    /// Validate the declaration and build its rule.
    pub fn to_rule(&self) -> Result<PolicyRule> {
        let mappings = self
            .mappings
            .iter()
            .map(|m| {
                let mapping = ColumnMapping::new(m.keys.iter().cloned(), m.values.iter().cloned())?;
                Ok(match &m.capability {
                    Some(cap) => mapping.with_capability(cap.clone()),
                    None => mapping,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        let rule = PolicyRule::new(mappings)?;
        Ok(match self.join {
            Some(join) => rule.with_join(join),
            None => rule,
        })
    }
}

/// A declaration table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PolicyDeclarations {
    pub policies: Vec<PolicyDeclaration>,
}

impl PolicyDeclarations {
    /// Parse a JSON declaration table.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Read a JSON declaration table from a file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    /// Validate every declaration and build `(target, rule)` pairs in order.
    pub fn to_rules(&self) -> Result<Vec<(String, PolicyRule)>> {
        self.policies
            .iter()
            .map(|d| Ok((d.target.clone(), d.to_rule()?)))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.policies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.policies.is_empty()
    }
}
