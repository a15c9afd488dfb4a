use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use academia_auth::{
    derive_permissions, matches_permission, DelegatedGrant, GrantScope, NewGrant, Permission, Role,
};
use academia_core::{SchoolId, UserId};
use chrono::Utc;

fn grant_with(permissions: usize) -> DelegatedGrant {
    let perms = (0..permissions)
        .map(|i| Permission::new(format!("resource{i}:read")))
        .chain(std::iter::once(Permission::from("schools:*")))
        .collect();

    DelegatedGrant::new(
        NewGrant {
            scope: GrantScope::Global,
            user_id: UserId::new(),
            email: "bench@example.com".to_string(),
            permissions: perms,
            start_date: None,
            expiry_date: None,
            notes: None,
            created_by: UserId::new(),
        },
        Utc::now(),
    )
    .unwrap()
}

fn bench_matches_permission(c: &mut Criterion) {
    let mut group = c.benchmark_group("matches_permission");

    group.bench_function("exact", |b| {
        b.iter(|| matches_permission(black_box("schools:read"), black_box("schools:read")))
    });
    group.bench_function("resource_wildcard", |b| {
        b.iter(|| matches_permission(black_box("schools:*"), black_box("schools:delete")))
    });
    group.bench_function("miss", |b| {
        b.iter(|| matches_permission(black_box("users:create"), black_box("schools:create")))
    });

    group.finish();
}

fn bench_grant_check(c: &mut Criterion) {
    let mut group = c.benchmark_group("grant_allows");

    for size in [1usize, 10, 100].iter() {
        group.throughput(Throughput::Elements(*size as u64));
        group.bench_with_input(BenchmarkId::new("worst_case", size), size, |b, &size| {
            let grant = grant_with(size);
            let now = Utc::now();
            b.iter(|| black_box(grant.allows("schools:update", now)));
        });
    }

    group.finish();
}

fn bench_derive_permissions(c: &mut Criterion) {
    let school = SchoolId::new();
    c.bench_function("derive_permissions_school_admin", |b| {
        b.iter(|| black_box(derive_permissions(Role::SchoolAdmin, school)))
    });
}

criterion_group!(
    benches,
    bench_matches_permission,
    bench_grant_check,
    bench_derive_permissions
);
criterion_main!(benches);
