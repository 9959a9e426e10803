//! Interceptor hot-path benchmarks.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use datascope_core::proto::{FilterExpr, StatementKind};
use datascope_core::{
    CachingScopeResolver, ColumnMapping, CurrentUser, DataScope, DataScopeInterceptor, Directory,
    DirectoryScopeResolver, EngineConfig, EvaluationContext, PolicyRule, RoleRef, RuleRegistry,
};
use std::sync::Arc;

/// A balanced department tree with `width` children per node, three levels deep.
fn directory(width: i64) -> Directory {
    let mut directory = Directory::default().with_department(1, None);
    let mut next = 2;
    let mut level = vec![1];
    for _ in 0..3 {
        let mut children = Vec::new();
        for &parent in &level {
            for _ in 0..width {
                directory = directory.with_department(next, Some(parent));
                children.push(next);
                next += 1;
            }
        }
        level = children;
    }
    directory.with_role(2, "common", (2..2 + width).collect())
}

fn interceptor(width: i64) -> DataScopeInterceptor {
    let registry = RuleRegistry::new();
    for i in 0..100 {
        registry
            .register(
                format!("Mapper{i}"),
                PolicyRule::new(vec![ColumnMapping::new(
                    ["deptName", "userName"],
                    ["d.dept_id", "u.user_id"],
                )
                .unwrap()])
                .unwrap(),
            )
            .unwrap();
    }
    let resolver = CachingScopeResolver::new(DirectoryScopeResolver::new(directory(width)));
    DataScopeInterceptor::new(&EngineConfig::default(), Arc::new(registry), Arc::new(resolver))
        .unwrap()
}

fn user() -> CurrentUser {
    CurrentUser::new(42i64)
        .with_dept(1)
        .with_role(RoleRef::new(2, "common", DataScope::Custom))
        .with_role(RoleRef::new(4, "lead", DataScope::DeptAndChild))
        .with_role(RoleRef::new(5, "self", DataScope::SelfOnly))
}

fn bench_pass_through(c: &mut Criterion) {
    let mut group = c.benchmark_group("intercept/pass_through");
    let interceptor = interceptor(4);

    group.bench_function("no_rule", |b| {
        let mut ctx = EvaluationContext::for_user(user());
        b.iter(|| {
            black_box(interceptor.intercept(
                "Unregistered.list",
                Some(FilterExpr::eq("status", "0")),
                StatementKind::Select,
                &mut ctx,
            ));
        });
    });

    group.bench_function("bypassed", |b| {
        let mut ctx = EvaluationContext::for_user(user());
        ctx.push_bypass();
        b.iter(|| {
            black_box(interceptor.intercept("Mapper7.list", None, StatementKind::Select, &mut ctx));
        });
    });

    group.finish();
}

fn bench_compose(c: &mut Criterion) {
    let mut group = c.benchmark_group("intercept/compose");

    for width in [2, 4, 8] {
        let interceptor = interceptor(width);
        group.bench_with_input(BenchmarkId::new("read", width), &width, |b, _| {
            let mut ctx = EvaluationContext::for_user(user());
            b.iter(|| {
                black_box(interceptor.intercept(
                    "Mapper7.selectList",
                    Some(FilterExpr::eq("status", "0")),
                    StatementKind::Select,
                    &mut ctx,
                ));
            });
        });
    }

    let interceptor = interceptor(4);
    group.bench_function("write", |b| {
        let mut ctx = EvaluationContext::for_user(user());
        b.iter(|| {
            black_box(interceptor.intercept("Mapper7.update", None, StatementKind::Update, &mut ctx));
        });
    });

    group.finish();
}

criterion_group!(benches, bench_pass_through, bench_compose);
criterion_main!(benches);
