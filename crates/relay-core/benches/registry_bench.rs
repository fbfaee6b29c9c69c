//! Criterion benchmarks for the session registry.
//!
//! Every accepted client registers once, changes state three times and is
//! removed, all under the registry's single lock.  These benches measure that
//! churn with a varying number of sessions already resident, plus the cost of
//! the diagnostics snapshot.
//!
//! Run with:
//! ```bash
//! cargo bench --package relay-core --bench registry_bench
//! ```

use std::net::SocketAddr;
use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use relay_core::{SessionRegistration, SessionRegistry, SessionState};

fn peer() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 40000))
}

fn populated(resident: usize) -> (Arc<SessionRegistry>, Vec<SessionRegistration>) {
    let registry = Arc::new(SessionRegistry::new());
    let regs = (0..resident).map(|_| registry.register(peer())).collect();
    (registry, regs)
}

fn bench_session_churn(c: &mut Criterion) {
    let mut group = c.benchmark_group("session_churn");
    for resident in [0usize, 100, 10_000] {
        let (registry, _regs) = populated(resident);
        group.bench_with_input(BenchmarkId::from_parameter(resident), &resident, |b, _| {
            b.iter(|| {
                let mut reg = registry.register(black_box(peer()));
                let _ = reg.advance(SessionState::Active);
                let _ = reg.advance(SessionState::Closing);
                let _ = reg.advance(SessionState::Closed);
            });
        });
    }
    group.finish();
}

fn bench_snapshot(c: &mut Criterion) {
    let mut group = c.benchmark_group("snapshot");
    for resident in [100usize, 10_000] {
        let (registry, _regs) = populated(resident);
        group.bench_with_input(BenchmarkId::from_parameter(resident), &resident, |b, _| {
            b.iter(|| black_box(registry.snapshot()));
        });
    }
    group.finish();
}

criterion_group!(benches, bench_session_churn, bench_snapshot);
criterion_main!(benches);
