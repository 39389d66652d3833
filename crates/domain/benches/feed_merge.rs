use chrono::{DateTime, TimeZone, Utc};
use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};

use domain::alert::entity::{Alert, AlertId, AlertRecord};
use domain::alert::feed::AlertFeed;

fn at(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(1_700_000_000 + secs, 0)
        .single()
        .unwrap_or_default()
}

fn generate_alerts(n: usize) -> Vec<Alert> {
    (0..n)
        .map(|i| {
            let secs = i64::try_from(i).unwrap_or(i64::MAX);
            Alert::enrich(AlertRecord {
                id: AlertId(format!("alert-{i}")),
                event: "SSH brute force".to_string(),
                source_ip: format!("10.{}.{}.{}", i % 200, (i / 200) % 250, i % 250),
                timestamp: at(secs),
            })
        })
        .collect()
}

fn bench_replace(c: &mut Criterion) {
    let mut group = c.benchmark_group("feed_replace");

    for &n in &[100, 1_000, 10_000] {
        let alerts = generate_alerts(n);

        group.bench_with_input(BenchmarkId::from_parameter(n), &n, |b, _| {
            b.iter(|| {
                let mut feed = AlertFeed::new(100);
                let _ = feed.replace(black_box(alerts.clone()));
            });
        });
    }

    group.finish();
}

fn bench_merge_in_order(c: &mut Criterion) {
    let mut group = c.benchmark_group("feed_merge_in_order");

    for &capacity in &[100, 1_000] {
        let alerts = generate_alerts(capacity * 2);

        group.bench_with_input(
            BenchmarkId::from_parameter(capacity),
            &capacity,
            |b, &capacity| {
                b.iter(|| {
                    let mut feed = AlertFeed::new(capacity);
                    for alert in &alerts {
                        let _ = feed.merge(black_box(alert.clone()));
                    }
                });
            },
        );
    }

    group.finish();
}

fn bench_merge_duplicate(c: &mut Criterion) {
    let alerts = generate_alerts(100);
    let mut feed = AlertFeed::new(100);
    let _ = feed.replace(alerts.clone());
    let duplicate = alerts[50].clone();

    c.bench_function("feed_merge_duplicate", |b| {
        b.iter(|| feed.merge(black_box(duplicate.clone())));
    });
}

criterion_group!(
    benches,
    bench_replace,
    bench_merge_in_order,
    bench_merge_duplicate
);
criterion_main!(benches);
