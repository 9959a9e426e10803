//! Statement kinds seen by the interception hook.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of statement being intercepted.
///
/// Reads and writes use different default join operators when several roles
/// contribute scope conditions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatementKind {
    Select,
    Insert,
    Update,
    Delete,
}

impl StatementKind {
    /// Whether the statement only reads rows.
    pub fn is_read(self) -> bool {
        matches!(self, StatementKind::Select)
    }
}

impl fmt::Display for StatementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StatementKind::Select => "SELECT",
            StatementKind::Insert => "INSERT",
            StatementKind::Update => "UPDATE",
            StatementKind::Delete => "DELETE",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_select_is_read() {
        assert!(StatementKind::Select.is_read());
        assert!(!StatementKind::Update.is_read());
        assert!(!StatementKind::Delete.is_read());
        assert!(!StatementKind::Insert.is_read());
    }
}
