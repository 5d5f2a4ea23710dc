use std::sync::Arc;
use std::time::Duration;

use pretty_assertions::assert_eq;

use rollup_metrics::backends::{MetricsBackend, RollupBackend};
use rollup_metrics::filters::{FilterChain, KeyContainsFilter};
use rollup_metrics::metrics::{MetricEvent, MetricKind, RollupTable, Summary};
use rollup_metrics::testing::MemorySink;
use rollup_metrics::{MetricsClient, MetricsError};

fn ev(kind: MetricKind, key: &str, value: f64) -> MetricEvent {
    MetricEvent::new(kind, key, value, vec![]).unwrap()
}

#[tokio::test(start_paused = true)]
async fn one_window_then_next() {
    let sink = Arc::new(MemorySink::new());
    let lm = RollupBackend::new(10, FilterChain::new(), sink.clone()).unwrap();

    let batch = [
        (MetricKind::Incr, "foo", 1.0),
        (MetricKind::Incr, "foo", 1.0),
        (MetricKind::Gauge, "widget", 10.0),
        (MetricKind::Incr, "foo", 1.0),
        (MetricKind::Incr, "bar", 1.0),
        (MetricKind::Gauge, "widget", 20.0),
        (MetricKind::Gauge, "widget", 5.0),
        (MetricKind::Histogram, "save_time", 50.0),
        (MetricKind::Histogram, "save_time", 60.0),
    ];
    for (kind, key, value) in batch {
        lm.emit_to_backend(ev(kind, key, value)).unwrap();
    }

    // Cross the window boundary, then record into the next window.
    tokio::time::sleep(Duration::from_secs(11)).await;
    lm.emit_to_backend(ev(MetricKind::Incr, "bar", 1.0)).unwrap();

    assert_eq!(
        sink.lines(),
        vec![
            "ROLLUP INCR bar: count:1|rate:1/10",
            "ROLLUP INCR foo: count:3|rate:3/10",
            "ROLLUP GAUGE widget: count:3|current:5|min:5|max:20",
            "ROLLUP HISTOGRAM save_time: \
             count:2|min:50.00|avg:55.00|median:55.00|ninety-five:60.00|max:60.00",
        ]
    );

    // The late `bar` belongs to the second window and only shows at stop.
    lm.stop().await;
    assert_eq!(sink.lines().len(), 5);
    assert_eq!(sink.lines()[4], "ROLLUP INCR bar: count:1|rate:1/10");
}

#[tokio::test(start_paused = true)]
async fn rate_uses_configured_window_when_stopped_early() {
    let sink = Arc::new(MemorySink::new());
    let lm = RollupBackend::new(10, FilterChain::new(), sink.clone()).unwrap();

    for _ in 0..3 {
        lm.emit(ev(MetricKind::Incr, "foo", 1.0)).unwrap();
    }
    // Flushed at stop after 7s, not a full window; the rate is still per 10s.
    tokio::time::sleep(Duration::from_secs(7)).await;
    lm.stop().await;

    assert_eq!(sink.lines(), vec!["ROLLUP INCR foo: count:3|rate:3/10"]);
}

#[tokio::test(start_paused = true)]
async fn rate_uses_configured_window_when_tick_fires_late() {
    let sink = Arc::new(MemorySink::new());
    let lm = RollupBackend::new(10, FilterChain::new(), sink.clone()).unwrap();

    for _ in 0..3 {
        lm.emit(ev(MetricKind::Incr, "foo", 1.0)).unwrap();
    }
    // Jump straight to 25s: the tick due at 10s fires once, 15s late.
    tokio::time::advance(Duration::from_secs(25)).await;
    tokio::task::yield_now().await;
    assert_eq!(sink.lines(), vec!["ROLLUP INCR foo: count:3|rate:3/10"]);

    // Missed ticks are skipped, not replayed; the next one lands at 30s.
    lm.emit(ev(MetricKind::Incr, "foo", 1.0)).unwrap();
    tokio::time::sleep(Duration::from_secs(6)).await;
    assert_eq!(
        sink.lines(),
        vec![
            "ROLLUP INCR foo: count:3|rate:3/10",
            "ROLLUP INCR foo: count:1|rate:1/10",
        ]
    );

    lm.stop().await;
    assert_eq!(sink.lines().len(), 2);
}

#[tokio::test]
async fn window_too_large_to_schedule_fails_at_construction() {
    let sink = Arc::new(MemorySink::new());
    assert!(matches!(
        RollupBackend::new(u64::MAX, FilterChain::new(), sink),
        Err(MetricsError::SchedulerUnavailable(_))
    ));
}

#[tokio::test(start_paused = true)]
async fn timings_render_as_histograms() {
    let sink = Arc::new(MemorySink::new());
    let lm = RollupBackend::new(10, FilterChain::new(), sink.clone()).unwrap();

    for ms in [12.0, 7.5, 30.0, 9.1] {
        lm.emit(ev(MetricKind::Timing, "db.query", ms)).unwrap();
    }
    lm.stop().await;

    assert_eq!(
        sink.lines(),
        vec![
            "ROLLUP HISTOGRAM db.query: \
             count:4|min:7.50|avg:14.65|median:10.55|ninety-five:30.00|max:30.00"
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn filter_drops_before_aggregation() {
    let sink = Arc::new(MemorySink::new());
    let lm = Arc::new(
        RollupBackend::new(
            10,
            FilterChain::new().with(KeyContainsFilter::new("blue")),
            sink.clone(),
        )
        .unwrap(),
    );
    let metrics = MetricsClient::new("").with_backend(lm.clone());

    metrics.incr("foo", 1.0, &[]).unwrap();
    metrics.incr("foo.blue", 2.0, &[]).unwrap();
    lm.stop().await;

    assert_eq!(sink.lines(), vec!["ROLLUP INCR foo.blue: count:1|rate:1/10"]);
}

#[tokio::test(start_paused = true)]
async fn concurrent_producers_lose_nothing_across_ticks() {
    let sink = Arc::new(MemorySink::new());
    let lm = Arc::new(RollupBackend::new(1, FilterChain::new(), sink.clone()).unwrap());

    let mut handles = Vec::new();
    for _ in 0..4 {
        let lm = lm.clone();
        handles.push(tokio::spawn(async move {
            for _ in 0..250 {
                lm.emit(ev(MetricKind::Incr, "hits", 1.0)).unwrap();
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        }));
    }
    for h in handles {
        h.await.unwrap();
    }
    lm.stop().await;

    let total: u64 = sink
        .lines()
        .iter()
        .map(|line| {
            let count = line
                .strip_prefix("ROLLUP INCR hits: count:")
                .and_then(|rest| rest.split('|').next())
                .expect("unexpected line");
            count.parse::<u64>().unwrap()
        })
        .sum();
    assert_eq!(total, 1000);
    assert!(sink.lines().len() > 1);
}

#[test]
fn drained_summary_is_isolated_from_later_records() {
    let table = RollupTable::new();
    table.record(&ev(MetricKind::Gauge, "widget", 3.0)).unwrap();

    let drained = table.drain_window();
    table.record(&ev(MetricKind::Gauge, "widget", 99.0)).unwrap();

    assert_eq!(
        drained[0].summary,
        Summary::Gauge {
            count: 1,
            current: 3.0,
            min: 3.0,
            max: 3.0
        }
    );
}
