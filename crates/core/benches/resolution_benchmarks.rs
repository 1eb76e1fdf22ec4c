//! Resolution benchmarks
//!
//! Measures cached and uncached lookups for each lifetime, collection
//! resolution and the cost of build-time validation.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use std::sync::Arc;
use tether_core::prelude::*;

trait Repository: Send + Sync {
    fn name(&self) -> &str;
}

struct SqlRepository;

impl Repository for SqlRepository {
    fn name(&self) -> &str {
        "sql"
    }
}

impl Injectable for SqlRepository {
    fn constructors() -> Vec<Constructor<Self>> {
        vec![Constructor::new(|_| Ok(SqlRepository))]
    }
}

impl_upcast!(SqlRepository => dyn Repository);

struct UserService {
    repository: Arc<dyn Repository>,
}

impl Injectable for UserService {
    fn constructors() -> Vec<Constructor<Self>> {
        vec![Constructor::new(|args| {
            Ok(UserService {
                repository: args.next()?,
            })
        })
        .param::<dyn Repository>("repository")]
    }
}

fn container(lifetime: ServiceLifetime) -> Container {
    let mut registry = ServiceRegistry::new();
    registry
        .register_type::<dyn Repository, SqlRepository>(lifetime)
        .register_type::<UserService, UserService>(lifetime);
    registry.build().unwrap()
}

fn benchmark_lifetimes(c: &mut Criterion) {
    let mut group = c.benchmark_group("resolve_by_lifetime");

    for lifetime in [ServiceLifetime::Singleton, ServiceLifetime::Transient] {
        let container = container(lifetime);
        group.bench_with_input(BenchmarkId::new("user_service", lifetime), &container, |b, container| {
            b.iter(|| black_box(container.get_required_service::<UserService>().unwrap()));
        });
    }

    let container = container(ServiceLifetime::Scoped);
    let scope = container.create_scope().unwrap();
    group.bench_function(BenchmarkId::new("user_service", ServiceLifetime::Scoped), |b| {
        b.iter(|| black_box(scope.get_required_service::<UserService>().unwrap()));
    });

    group.finish();
}

fn benchmark_scopes(c: &mut Criterion) {
    let container = container(ServiceLifetime::Scoped);

    c.bench_function("scope_create_resolve_dispose", |b| {
        b.iter(|| {
            let scope = container.create_scope().unwrap();
            let service = scope.get_required_service::<UserService>().unwrap();
            black_box(service.repository.name());
            scope.dispose().unwrap();
        });
    });
}

fn benchmark_collections(c: &mut Criterion) {
    let mut group = c.benchmark_group("resolve_collection");

    for count in [1usize, 10, 100] {
        let mut registry = ServiceRegistry::new();
        for _ in 0..count {
            registry.add_transient::<dyn Repository, SqlRepository>();
        }
        let container = registry.build().unwrap();

        group.bench_with_input(BenchmarkId::new("transient", count), &container, |b, container| {
            b.iter(|| black_box(container.get_services::<dyn Repository>().unwrap().len()));
        });
    }

    group.finish();
}

fn benchmark_build(c: &mut Criterion) {
    let mut group = c.benchmark_group("build");

    for validate in [false, true] {
        group.bench_with_input(BenchmarkId::new("validate_on_build", validate), &validate, |b, &validate| {
            b.iter(|| {
                let mut registry = ServiceRegistry::with_options(
                    tether_core::ContainerOptions::new().with_validate_on_build(validate),
                );
                registry
                    .add_singleton::<dyn Repository, SqlRepository>()
                    .add_transient::<UserService, UserService>();
                black_box(registry.build().unwrap())
            });
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    benchmark_lifetimes,
    benchmark_scopes,
    benchmark_collections,
    benchmark_build
);
criterion_main!(benches);
