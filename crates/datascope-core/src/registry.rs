//! Rule registry keyed by query identifier.
//!
//! The registry is filled once at startup and then read on every
//! intercepted statement. Readers load an immutable snapshot through
//! [`ArcSwap`] and never lock; writers are serialized and publish a whole new
//! snapshot, so a reader sees either the old or the new table.

use crate::declaration::PolicyDeclarations;
use crate::error::{Error, Result};
use crate::rule::PolicyRule;
use arc_swap::ArcSwap;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

type RuleMap = HashMap<String, Arc<PolicyRule>>;

/// Maps query identifiers (`SysUserMapper.selectPageUserList`) and
/// query-issuing type identifiers (`SysUserMapper`) to rules.
pub struct RuleRegistry {
    snapshot: ArcSwap<RuleMap>,
    write_lock: Mutex<()>,
}

impl RuleRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            snapshot: ArcSwap::from_pointee(RuleMap::new()),
            write_lock: Mutex::new(()),
        }
    }

    /// Build a registry from a declaration table.
    ///
    /// Any invalid or duplicate declaration aborts the build.
    pub fn from_declarations(declarations: &PolicyDeclarations) -> Result<Self> {
        let mut rules = RuleMap::new();
        for (target, rule) in declarations.to_rules()? {
            if rules.contains_key(&target) {
                return Err(Error::DuplicateRule(target));
            }
            rules.insert(target, Arc::new(rule));
        }
        info!(rules = rules.len(), "Policy rules registered");
        Ok(Self {
            snapshot: ArcSwap::from_pointee(rules),
            write_lock: Mutex::new(()),
        })
    }

    /// Register a rule for a query or type identifier.
    pub fn register(&self, target: impl Into<String>, rule: PolicyRule) -> Result<()> {
        let target = target.into();
        let _guard = self.write_lock.lock();

        let current = self.snapshot.load();
        if current.contains_key(&target) {
            return Err(Error::DuplicateRule(target));
        }
        let mut next = RuleMap::clone(&current);
        debug!(target = %target, "Registering policy rule");
        next.insert(target, Arc::new(rule));
        self.snapshot.store(Arc::new(next));
        Ok(())
    }

    /// Find the rule for a query.
    ///
    /// Precedence: the per-query override, then a rule on the exact
    /// identifier, then a rule on the owning type (the identifier up to its
    /// last `.`). `None` means no policy applies.
    pub fn lookup(
        &self,
        query_id: &str,
        override_rule: Option<&Arc<PolicyRule>>,
    ) -> Option<Arc<PolicyRule>> {
        if let Some(rule) = override_rule {
            return Some(Arc::clone(rule));
        }
        let rules = self.snapshot.load();
        if let Some(rule) = rules.get(query_id) {
            return Some(Arc::clone(rule));
        }
        let (owner, _) = query_id.rsplit_once('.')?;
        rules.get(owner).cloned()
    }

    /// Drop every rule (hot reload).
    pub fn invalidate(&self) {
        let _guard = self.write_lock.lock();
        self.snapshot.store(Arc::new(RuleMap::new()));
        info!("Policy rules invalidated");
    }

    /// Atomically replace the whole table with the rules of another registry.
    pub fn replace_all(&self, other: RuleRegistry) {
        let _guard = self.write_lock.lock();
        let rules = other.snapshot.into_inner();
        info!(rules = rules.len(), "Policy rules replaced");
        self.snapshot.store(rules);
    }

    /// Registered identifiers, sorted.
    pub fn targets(&self) -> Vec<String> {
        let mut targets: Vec<String> = self.snapshot.load().keys().cloned().collect();
        targets.sort();
        targets
    }

    pub fn len(&self) -> usize {
        self.snapshot.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshot.load().is_empty()
    }
}

impl Default for RuleRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for RuleRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuleRegistry")
            .field("rules", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rule::ColumnMapping;
    use datascope_proto::JoinOperator;

    fn rule(column: &str) -> PolicyRule {
        PolicyRule::new(vec![ColumnMapping::new(["deptName"], [column]).unwrap()]).unwrap()
    }

    #[test]
    fn test_exact_then_owner_lookup() {
        let registry = RuleRegistry::new();
        registry.register("SysUserMapper", rule("u.dept_id")).unwrap();
        registry
            .register("SysUserMapper.selectUserList", rule("d.dept_id"))
            .unwrap();

        let exact = registry.lookup("SysUserMapper.selectUserList", None).unwrap();
        assert_eq!(exact.mappings()[0].values(), ["d.dept_id"]);

        let inherited = registry.lookup("SysUserMapper.countUsers", None).unwrap();
        assert_eq!(inherited.mappings()[0].values(), ["u.dept_id"]);

        assert!(registry.lookup("SysRoleMapper.selectRoleList", None).is_none());
        assert!(registry.lookup("nodots", None).is_none());
    }

    #[test]
    fn test_override_wins() {
        let registry = RuleRegistry::new();
        registry.register("SysUserMapper", rule("u.dept_id")).unwrap();

        let forced = Arc::new(rule("x.dept_id").with_join(JoinOperator::And));
        let found = registry.lookup("SysUserMapper.list", Some(&forced)).unwrap();
        assert!(Arc::ptr_eq(&found, &forced));
    }

    #[test]
    fn test_duplicate_rejected() {
        let registry = RuleRegistry::new();
        registry.register("SysDeptMapper", rule("dept_id")).unwrap();
        let err = registry.register("SysDeptMapper", rule("dept_id")).unwrap_err();
        assert!(matches!(err, Error::DuplicateRule(t) if t == "SysDeptMapper"));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_invalidate_and_replace() {
        let registry = RuleRegistry::new();
        registry.register("A", rule("a_id")).unwrap();
        assert!(!registry.is_empty());

        registry.invalidate();
        assert!(registry.is_empty());
        assert!(registry.lookup("A.list", None).is_none());

        let fresh = RuleRegistry::new();
        fresh.register("B", rule("b_id")).unwrap();
        fresh.register("C", rule("c_id")).unwrap();
        registry.replace_all(fresh);
        assert_eq!(registry.targets(), vec!["B".to_string(), "C".to_string()]);
    }

    #[test]
    fn test_concurrent_readers_during_registration() {
        let registry = Arc::new(RuleRegistry::new());
        let readers: Vec<_> = (0..4)
            .map(|_| {
                let registry = Arc::clone(&registry);
                std::thread::spawn(move || {
                    for _ in 0..1000 {
                        // Either no rule yet or the registered one; never a panic.
                        if let Some(found) = registry.lookup("T.q", None) {
                            assert_eq!(found.mappings().len(), 1);
                        }
                    }
                })
            })
            .collect();
        for i in 0..50 {
            registry.register(format!("T{i}"), rule("t_id")).unwrap();
        }
        registry.register("T", rule("t_id")).unwrap();
        for reader in readers {
            reader.join().unwrap();
        }
        assert!(registry.lookup("T.q", None).is_some());
    }
}
