use criterion::{black_box, criterion_group, criterion_main, Criterion, BenchmarkId};

use stake_core::conflict::{ConflictEngine, KeyView};
use stake_core::state::{StateSnapshot, StatusProjector};
use stake_core::types::*;

// ─── Helpers ────────────────────────────────────────────────────────────────

fn make_payload(team_number: u8) -> ClaimantPayload {
    ClaimantPayload {
        claimant: ClaimantId {
            course_group: 1,
            team_number,
        },
        leader_name: "Ada".to_string(),
        leader_email: "ada@example.com".to_string(),
        leader_phone: "555-0100".to_string(),
        students: vec![Student {
            student_id: "1001".to_string(),
            student_name: "Sam".to_string(),
        }],
    }
}

fn make_snapshot(count: usize) -> StateSnapshot {
    let resources = Resource::catalog(count);
    let assignments = resources
        .iter()
        .step_by(3)
        .enumerate()
        .map(|(i, r)| Assignment::new(r.key.clone(), r.name.clone(), make_payload((i % 20) as u8 + 1), 500))
        .collect();
    let live_leases = resources
        .iter()
        .skip(1)
        .step_by(3)
        .enumerate()
        .map(|(i, r)| Lease::new(r.key.clone(), format!("tok_holder_{}", i), 5000, 1000))
        .collect();

    StateSnapshot {
        resources,
        assignments,
        live_leases,
    }
}

// ─── Benchmarks ─────────────────────────────────────────────────────────────

fn bench_decide_acquire(c: &mut Criterion) {
    let resource = Resource::new("drug-01", "Drug 01");
    let lease = Lease::new("drug-01".into(), "tok_holder_a".into(), 5000, 1000);
    let view = KeyView {
        key: "drug-01",
        resource: Some(&resource),
        assignment: None,
        lease: Some(&lease),
    };

    let mut group = c.benchmark_group("decide_acquire");
    group.bench_function("renew", |b| {
        b.iter(|| ConflictEngine::decide_acquire(black_box(&view), black_box("tok_holder_a"), 5000, 2000))
    });
    group.bench_function("foreign", |b| {
        b.iter(|| ConflictEngine::decide_acquire(black_box(&view), black_box("tok_holder_b"), 5000, 2000))
    });
    group.finish();
}

fn bench_check_commit(c: &mut Criterion) {
    let resource = Resource::new("drug-01", "Drug 01");
    let lease = Lease::new("drug-01".into(), "tok_holder_a".into(), 5000, 1000);
    let view = KeyView {
        key: "drug-01",
        resource: Some(&resource),
        assignment: None,
        lease: Some(&lease),
    };
    let claimant = ClaimantId {
        course_group: 1,
        team_number: 3,
    };

    c.bench_function("check_commit", |b| {
        b.iter(|| {
            ConflictEngine::check_commit(
                black_box(&view),
                black_box("tok_holder_a"),
                black_box(claimant),
                None,
                2000,
            )
        })
    });
}

fn bench_project_with_varying_resources(c: &mut Criterion) {
    let mut group = c.benchmark_group("status_projection");

    for count in [20, 200, 2000] {
        let snapshot = make_snapshot(count);

        group.bench_with_input(BenchmarkId::from_parameter(count), &count, |b, _| {
            b.iter(|| StatusProjector::project(black_box(&snapshot), Some("tok_holder_0"), 2000))
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_decide_acquire,
    bench_check_commit,
    bench_project_with_varying_resources,
);
criterion_main!(benches);
