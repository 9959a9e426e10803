//! Command execution.

use crate::formatter::{create_formatter, Explanation, PolicySummary};
use crate::{Args, Command};
use datascope_core::proto::{FilterExpr, StatementKind};
use datascope_core::{
    CachingScopeResolver, CurrentUser, DataScopeInterceptor, Directory, DirectoryScopeResolver,
    EngineConfig, EvaluationContext, FilterComposer, PolicyDeclarations, RuleRegistry,
};
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

/// Command errors.
#[derive(Debug, Error)]
pub enum ExecuteError {
    /// Invalid policies or configuration.
    #[error("configuration error: {0}")]
    Engine(#[from] datascope_core::Error),

    /// The `--filter` fragment does not parse.
    #[error("{0}")]
    Filter(String),

    /// A user or directory file could not be read.
    #[error("cannot read {path}: {message}")]
    Input { path: String, message: String },
}

/// Run the selected command and return its formatted output.
pub fn run(args: &Args) -> Result<String, ExecuteError> {
    let config = match &args.config {
        Some(path) => EngineConfig::from_path(path)?,
        None => EngineConfig::default(),
    };
    let formatter = create_formatter(args.format);

    match &args.command {
        Command::Check { policies } => {
            let summaries = check(&config, policies)?;
            Ok(formatter.format_policies(&summaries))
        }
        Command::Explain {
            policies,
            user,
            directory,
            query,
            write,
            filter,
        } => {
            let kind = if *write {
                StatementKind::Update
            } else {
                StatementKind::Select
            };
            let explanation = explain(
                &config,
                policies,
                user,
                directory,
                query,
                kind,
                filter.as_deref(),
            )?;
            Ok(formatter.format_explanation(&explanation))
        }
    }
}

/// Validate a declaration table and the scope templates.
pub fn check(config: &EngineConfig, policies: &Path) -> Result<Vec<PolicySummary>, ExecuteError> {
    FilterComposer::new(config)?;
    let declarations = PolicyDeclarations::from_path(policies)?;
    RuleRegistry::from_declarations(&declarations)?;
    info!(policies = declarations.len(), "Policy table is valid");

    Ok(declarations
        .policies
        .iter()
        .map(PolicySummary::from_declaration)
        .collect())
}

/// Rewrite `filter` for `query` as the user in `user_path` would see it.
pub fn explain(
    config: &EngineConfig,
    policies: &Path,
    user_path: &Path,
    directory_path: &Path,
    query: &str,
    kind: StatementKind,
    filter: Option<&str>,
) -> Result<Explanation, ExecuteError> {
    let declarations = PolicyDeclarations::from_path(policies)?;
    let registry = Arc::new(RuleRegistry::from_declarations(&declarations)?);
    let user: CurrentUser = read_json(user_path)?;
    let directory: Directory = read_json(directory_path)?;

    let existing = filter
        .map(|source| {
            datascope_lang::parse_filter(source)
                .map_err(|e| ExecuteError::Filter(e.format_with_source(source)))
        })
        .transpose()?;

    let resolver = CachingScopeResolver::new(
        DirectoryScopeResolver::new(directory).with_sentinel(config.sentinel_value()),
    );
    let interceptor = DataScopeInterceptor::new(config, registry, Arc::new(resolver))?;
    let mut ctx = EvaluationContext::for_user(user);
    let (rewritten, outcome) = interceptor.intercept_traced(query, existing.clone(), kind, &mut ctx);

    Ok(Explanation {
        query: query.to_string(),
        kind,
        original: existing.as_ref().map(FilterExpr::to_string),
        rewritten: rewritten.as_ref().map(FilterExpr::to_string),
        outcome: outcome.to_string(),
    })
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, ExecuteError> {
    let input_error = |message: String| ExecuteError::Input {
        path: path.display().to_string(),
        message,
    };
    let text = std::fs::read_to_string(path).map_err(|e| input_error(e.to_string()))?;
    serde_json::from_str(&text).map_err(|e| input_error(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    const POLICIES: &str = r#"[
        { "target": "SysUserMapper", "mappings": [{ "keys": ["deptName"], "values": ["d.dept_id"] }] },
        { "target": "SysDeptMapper", "mappings": [{ "keys": ["deptName"], "values": ["dept_id"] }], "join": "and" }
    ]"#;

    const USER: &str = r#"{
        "user_id": 1,
        "dept_id": 101,
        "roles": [{ "id": 4, "key": "lead", "data_scope": "4" }]
    }"#;

    const DIRECTORY: &str = r#"{
        "departments": [{ "id": 100 }, { "id": 101, "parent_id": 100 }, { "id": 103, "parent_id": 101 }]
    }"#;

    fn write(dir: &tempfile::TempDir, name: &str, content: &str) -> PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_check_lists_policies() {
        let dir = tempfile::tempdir().unwrap();
        let policies = write(&dir, "policies.json", POLICIES);
        let summaries = check(&EngineConfig::default(), &policies).unwrap();
        assert_eq!(summaries.len(), 2);
        assert_eq!(summaries[1].join, "and");
    }

    #[test]
    fn test_check_rejects_invalid_table() {
        let dir = tempfile::tempdir().unwrap();
        let policies = write(
            &dir,
            "bad.json",
            r#"[{ "target": "X", "mappings": [{ "keys": ["deptName"], "values": ["dept_id; drop"] }] }]"#,
        );
        let err = check(&EngineConfig::default(), &policies).unwrap_err();
        assert!(matches!(err, ExecuteError::Engine(e) if e.is_configuration()));
    }

    #[test]
    fn test_explain_rewrites_filter() {
        let dir = tempfile::tempdir().unwrap();
        let policies = write(&dir, "policies.json", POLICIES);
        let user = write(&dir, "user.json", USER);
        let directory = write(&dir, "directory.json", DIRECTORY);

        let explanation = explain(
            &EngineConfig::default(),
            &policies,
            &user,
            &directory,
            "SysUserMapper.selectUserList",
            StatementKind::Select,
            Some("status = '0'"),
        )
        .unwrap();
        assert_eq!(
            explanation.rewritten.as_deref(),
            Some("status = '0' AND (d.dept_id IN (101, 103))")
        );
        assert_eq!(explanation.outcome, "filtered");
    }

    #[test]
    fn test_explain_reports_bad_filter() {
        let dir = tempfile::tempdir().unwrap();
        let policies = write(&dir, "policies.json", POLICIES);
        let user = write(&dir, "user.json", USER);
        let directory = write(&dir, "directory.json", DIRECTORY);

        let err = explain(
            &EngineConfig::default(),
            &policies,
            &user,
            &directory,
            "SysUserMapper.selectUserList",
            StatementKind::Select,
            Some("status = = 1"),
        )
        .unwrap_err();
        assert!(matches!(err, ExecuteError::Filter(msg) if msg.contains("line 1")));
    }

    #[test]
    fn test_missing_user_file() {
        let dir = tempfile::tempdir().unwrap();
        let policies = write(&dir, "policies.json", POLICIES);
        let directory = write(&dir, "directory.json", DIRECTORY);
        let err = explain(
            &EngineConfig::default(),
            &policies,
            &dir.path().join("nobody.json"),
            &directory,
            "SysUserMapper.selectUserList",
            StatementKind::Select,
            None,
        )
        .unwrap_err();
        assert!(matches!(err, ExecuteError::Input { .. }));
    }
}
