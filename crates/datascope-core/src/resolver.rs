//! Current-user and scope resolution.
//!
//! [`CurrentUserProvider`] supplies the acting user when the caller did not
//! bind one. [`ScopeResolver`] turns one of the user's roles into a
//! [`ResolvedScope`]: the scope classification and the id set bound to
//! `$scopeIds`. Resolvers run with the engine bypassed, so any queries they
//! issue are not filtered themselves.

use crate::context::{CurrentUser, EvaluationContext, RoleRef};
use crate::error::ResolveError;
use crate::scope::DataScope;
use dashmap::DashMap;
use datascope_proto::Value;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};

/// Supplies the acting user.
pub trait CurrentUserProvider: Send + Sync {
    /// The signed-in user, or `None` for anonymous/system work.
    fn current_user(&self) -> Result<Option<CurrentUser>, ResolveError>;
}

/// Resolves the scope granted by one role.
pub trait ScopeResolver: Send + Sync {
    fn resolve(
        &self,
        role: &RoleRef,
        user: &CurrentUser,
        ctx: &mut EvaluationContext,
    ) -> Result<ResolvedScope, ResolveError>;
}

/// Outcome of resolving one role.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedScope {
    pub scope: DataScope,
    /// Ids bound to `$scopeIds`. Empty for scopes that do not use them.
    pub ids: Vec<Value>,
}

impl ResolvedScope {
    pub fn new(scope: DataScope, ids: Vec<Value>) -> Self {
        Self { scope, ids }
    }
}

/// A department in the organization tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Department {
    pub id: i64,
    #[serde(default)]
    pub parent_id: Option<i64>,
    #[serde(default)]
    pub name: String,
}

/// A role and its custom department set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleRecord {
    pub id: i64,
    #[serde(default)]
    pub key: String,
    #[serde(default)]
    pub dept_ids: Vec<i64>,
}

/// In-memory organization directory.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Directory {
    #[serde(default)]
    pub departments: Vec<Department>,
    #[serde(default)]
    pub roles: Vec<RoleRecord>,
}

impl Directory {
    pub fn with_department(mut self, id: i64, parent_id: Option<i64>) -> Self {
        self.departments.push(Department {
            id,
            parent_id,
            name: String::new(),
        });
        self
    }

    pub fn with_role(mut self, id: i64, key: impl Into<String>, dept_ids: Vec<i64>) -> Self {
        self.roles.push(RoleRecord {
            id,
            key: key.into(),
            dept_ids,
        });
        self
    }
}

/// Resolves scopes against an in-memory [`Directory`].
///
/// Custom scopes use the role's department set; department-tree scopes use
/// the user's department and all of its descendants. An empty set resolves
/// to the sentinel id, which matches no row.
#[derive(Debug, Clone)]
pub struct DirectoryScopeResolver {
    departments: HashSet<i64>,
    children: HashMap<i64, Vec<i64>>,
    role_departments: HashMap<i64, Vec<i64>>,
    sentinel: Value,
}

impl DirectoryScopeResolver {
    pub fn new(directory: Directory) -> Self {
        let mut children: HashMap<i64, Vec<i64>> = HashMap::new();
        let mut departments = HashSet::new();
        for dept in &directory.departments {
            departments.insert(dept.id);
            if let Some(parent) = dept.parent_id {
                children.entry(parent).or_default().push(dept.id);
            }
        }
        let role_departments = directory
            .roles
            .into_iter()
            .map(|r| (r.id, r.dept_ids))
            .collect();

        Self {
            departments,
            children,
            role_departments,
            sentinel: Value::Int64(-1),
        }
    }

    /// Set the id returned for empty sets (default `-1`).
    pub fn with_sentinel(mut self, sentinel: Value) -> Self {
        self.sentinel = sentinel;
        self
    }

    /// The department and all of its descendants, ascending. Empty when the
    /// department is unknown.
    pub fn dept_and_children(&self, dept_id: i64) -> Vec<i64> {
        if !self.departments.contains(&dept_id) {
            return Vec::new();
        }
        let mut seen = HashSet::from([dept_id]);
        let mut queue = VecDeque::from([dept_id]);
        while let Some(current) = queue.pop_front() {
            for &child in self.children.get(&current).into_iter().flatten() {
                // Guard against cycles in malformed data.
                if seen.insert(child) {
                    queue.push_back(child);
                }
            }
        }
        let mut ids: Vec<i64> = seen.into_iter().collect();
        ids.sort_unstable();
        ids
    }

    fn or_sentinel(&self, ids: Vec<i64>) -> Vec<Value> {
        if ids.is_empty() {
            vec![self.sentinel.clone()]
        } else {
            ids.into_iter().map(Value::Int64).collect()
        }
    }
}

impl ScopeResolver for DirectoryScopeResolver {
    fn resolve(
        &self,
        role: &RoleRef,
        user: &CurrentUser,
        _ctx: &mut EvaluationContext,
    ) -> Result<ResolvedScope, ResolveError> {
        let ids = match role.data_scope {
            DataScope::Custom => {
                let depts = self
                    .role_departments
                    .get(&role.id)
                    .ok_or_else(|| ResolveError::UnknownRole(role.key.clone()))?;
                self.or_sentinel(depts.clone())
            }
            DataScope::DeptAndChild | DataScope::DeptAndChildOrSelf => {
                let depts = user
                    .dept_id
                    .map(|d| self.dept_and_children(d))
                    .unwrap_or_default();
                self.or_sentinel(depts)
            }
            DataScope::All | DataScope::Dept | DataScope::SelfOnly => Vec::new(),
        };
        Ok(ResolvedScope::new(role.data_scope, ids))
    }
}

/// Hit/miss counters for [`CachingScopeResolver`].
#[derive(Debug, Default)]
pub struct CacheStats {
    hits: AtomicU64,
    misses: AtomicU64,
}

impl CacheStats {
    pub fn hits(&self) -> u64 {
        self.hits.load(AtomicOrdering::Relaxed)
    }

    pub fn misses(&self) -> u64 {
        self.misses.load(AtomicOrdering::Relaxed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum CacheKey {
    /// Custom sets depend only on the role.
    Role(DataScope, i64),
    /// Department-tree sets depend only on the user's department.
    Dept(DataScope, i64),
}

/// Memoizes another resolver's id sets per role or per department.
///
/// Only scopes with id sets are cached; errors are never cached.
pub struct CachingScopeResolver<R> {
    inner: R,
    cache: DashMap<CacheKey, ResolvedScope>,
    stats: CacheStats,
}

impl<R: ScopeResolver> CachingScopeResolver<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            cache: DashMap::new(),
            stats: CacheStats::default(),
        }
    }

    fn key(role: &RoleRef, user: &CurrentUser) -> Option<CacheKey> {
        match role.data_scope {
            DataScope::Custom => Some(CacheKey::Role(role.data_scope, role.id)),
            DataScope::DeptAndChild | DataScope::DeptAndChildOrSelf => user
                .dept_id
                .map(|dept| CacheKey::Dept(role.data_scope, dept)),
            _ => None,
        }
    }

    /// Drop every cached entry, e.g. after the organization tree changed.
    pub fn invalidate(&self) {
        self.cache.clear();
    }

    /// Drop the cached custom set of one role.
    pub fn invalidate_role(&self, role_id: i64) {
        self.cache
            .retain(|key, _| !matches!(key, CacheKey::Role(_, id) if *id == role_id));
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    pub fn stats(&self) -> &CacheStats {
        &self.stats
    }

    pub fn inner(&self) -> &R {
        &self.inner
    }
}

impl<R: ScopeResolver> ScopeResolver for CachingScopeResolver<R> {
    fn resolve(
        &self,
        role: &RoleRef,
        user: &CurrentUser,
        ctx: &mut EvaluationContext,
    ) -> Result<ResolvedScope, ResolveError> {
        let Some(key) = Self::key(role, user) else {
            return self.inner.resolve(role, user, ctx);
        };
        if let Some(hit) = self.cache.get(&key) {
            self.stats.hits.fetch_add(1, AtomicOrdering::Relaxed);
            return Ok(hit.clone());
        }
        self.stats.misses.fetch_add(1, AtomicOrdering::Relaxed);
        let resolved = self.inner.resolve(role, user, ctx)?;
        self.cache.insert(key, resolved.clone());
        Ok(resolved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;

    fn directory() -> Directory {
        Directory::default()
            .with_department(100, None)
            .with_department(101, Some(100))
            .with_department(103, Some(101))
            .with_department(105, Some(100))
            .with_department(200, None)
            .with_role(2, "common", vec![105, 200])
            .with_role(3, "empty", vec![])
    }

    fn user() -> CurrentUser {
        CurrentUser::new(1i64).with_dept(101)
    }

    #[test]
    fn test_dept_and_children() {
        let resolver = DirectoryScopeResolver::new(directory());
        assert_eq!(resolver.dept_and_children(100), vec![100, 101, 103, 105]);
        assert_eq!(resolver.dept_and_children(103), vec![103]);
        assert!(resolver.dept_and_children(999).is_empty());
    }

    #[test]
    fn test_resolve_each_scope() {
        let resolver = DirectoryScopeResolver::new(directory());
        let mut ctx = EvaluationContext::new();

        let custom = resolver
            .resolve(&RoleRef::new(2, "common", DataScope::Custom), &user(), &mut ctx)
            .unwrap();
        assert_eq!(custom.ids, vec![Value::Int64(105), Value::Int64(200)]);

        let tree = resolver
            .resolve(&RoleRef::new(4, "lead", DataScope::DeptAndChild), &user(), &mut ctx)
            .unwrap();
        assert_eq!(tree.ids, vec![Value::Int64(101), Value::Int64(103)]);

        let own = resolver
            .resolve(&RoleRef::new(5, "self", DataScope::SelfOnly), &user(), &mut ctx)
            .unwrap();
        assert_eq!(own.scope, DataScope::SelfOnly);
        assert!(own.ids.is_empty());
    }

    #[test]
    fn test_empty_sets_resolve_to_sentinel() {
        let resolver = DirectoryScopeResolver::new(directory());
        let mut ctx = EvaluationContext::new();

        let empty = resolver
            .resolve(&RoleRef::new(3, "empty", DataScope::Custom), &user(), &mut ctx)
            .unwrap();
        assert_eq!(empty.ids, vec![Value::Int64(-1)]);

        let no_dept = resolver
            .resolve(
                &RoleRef::new(4, "lead", DataScope::DeptAndChild),
                &CurrentUser::new(9i64),
                &mut ctx,
            )
            .unwrap();
        assert_eq!(no_dept.ids, vec![Value::Int64(-1)]);
    }

    #[test]
    fn test_unknown_custom_role() {
        let resolver = DirectoryScopeResolver::new(directory());
        let err = resolver
            .resolve(
                &RoleRef::new(42, "ghost", DataScope::Custom),
                &user(),
                &mut EvaluationContext::new(),
            )
            .unwrap_err();
        assert_eq!(err, ResolveError::UnknownRole("ghost".into()));
    }

    struct Counting {
        calls: Arc<AtomicUsize>,
    }

    impl ScopeResolver for Counting {
        fn resolve(
            &self,
            role: &RoleRef,
            _user: &CurrentUser,
            _ctx: &mut EvaluationContext,
        ) -> Result<ResolvedScope, ResolveError> {
            self.calls.fetch_add(1, AtomicOrdering::SeqCst);
            Ok(ResolvedScope::new(role.data_scope, vec![Value::Int64(role.id)]))
        }
    }

    #[test]
    fn test_caching_resolver() {
        let calls = Arc::new(AtomicUsize::new(0));
        let resolver = CachingScopeResolver::new(Counting {
            calls: Arc::clone(&calls),
        });
        let mut ctx = EvaluationContext::new();
        let custom = RoleRef::new(2, "common", DataScope::Custom);
        let own = RoleRef::new(5, "self", DataScope::SelfOnly);

        resolver.resolve(&custom, &user(), &mut ctx).unwrap();
        resolver.resolve(&custom, &user(), &mut ctx).unwrap();
        assert_eq!(calls.load(AtomicOrdering::SeqCst), 1);
        assert_eq!(resolver.stats().hits(), 1);
        assert_eq!(resolver.stats().misses(), 1);

        // Scopes without id sets pass straight through.
        resolver.resolve(&own, &user(), &mut ctx).unwrap();
        resolver.resolve(&own, &user(), &mut ctx).unwrap();
        assert_eq!(calls.load(AtomicOrdering::SeqCst), 3);
        assert_eq!(resolver.len(), 1);

        resolver.invalidate_role(2);
        assert!(resolver.is_empty());
        resolver.resolve(&custom, &user(), &mut ctx).unwrap();
        assert_eq!(calls.load(AtomicOrdering::SeqCst), 4);

        resolver.invalidate();
        assert!(resolver.is_empty());
    }

    #[test]
    fn test_directory_from_json() {
        let json = r#"{
            "departments": [{ "id": 100 }, { "id": 101, "parent_id": 100, "name": "R&D" }],
            "roles": [{ "id": 2, "key": "common", "dept_ids": [101] }]
        }"#;
        let directory: Directory = serde_json::from_str(json).unwrap();
        let resolver = DirectoryScopeResolver::new(directory);
        assert_eq!(resolver.dept_and_children(100), vec![100, 101]);
    }
}
