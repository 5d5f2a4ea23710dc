use rand::rngs::StdRng;
use rand::Rng;
use rand::SeedableRng;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

use crate::client::MetricsClient;

// ─── Key pools ───────────────────────────────────────────────────

static COUNTERS: &[&str] = &["requests", "cache.hit", "cache.miss", "jobs.done"];
static GAUGES: &[&str] = &["queue.depth", "pool.active", "memory.mb"];
static TIMINGS: &[&str] = &["db.query", "http.request", "render"];
static HISTOGRAMS: &[&str] = &["payload.bytes", "batch.size"];
static REGIONS: &[&str] = &["region:eu", "region:us", "region:ap"];

/// Pause between events emitted by one worker.
const EMIT_INTERVAL: Duration = Duration::from_millis(5);

// ─── Public entry point ──────────────────────────────────────────

/// Spawns `concurrency` Tokio tasks that emit synthetic metrics until the
/// deadline or the `running` flag is set to false. Returns how many
/// events were accepted.
pub async fn run(
    running: Arc<AtomicBool>,
    metrics: MetricsClient,
    concurrency: u32,
    duration_secs: u64,
) -> u64 {
    let deadline = Instant::now() + Duration::from_secs(duration_secs);
    let emitted = Arc::new(AtomicU64::new(0));

    let mut handles = Vec::with_capacity(concurrency as usize);

    for worker_id in 0..concurrency {
        let running = running.clone();
        let metrics = metrics.clone();
        let emitted = emitted.clone();

        handles.push(tokio::spawn(async move {
            worker(worker_id, running, metrics, emitted, deadline).await;
        }));
    }

    // Wait for all workers to finish
    for h in handles {
        if let Err(e) = h.await {
            tracing::warn!(error = %e, "load generator worker failed");
        }
    }

    // Mark the run as finished
    running.store(false, Ordering::SeqCst);
    emitted.load(Ordering::SeqCst)
}

// ─── Worker loop ─────────────────────────────────────────────────

async fn worker(
    id: u32,
    running: Arc<AtomicBool>,
    metrics: MetricsClient,
    emitted: Arc<AtomicU64>,
    deadline: Instant,
) {
    // Each worker gets its own deterministic RNG seeded uniquely.
    let mut rng = StdRng::seed_from_u64(1000 + id as u64);

    while running.load(Ordering::Relaxed) && Instant::now() < deadline {
        let region = pick(&mut rng, REGIONS);
        let result = match rng.gen_range(0u8..100) {
            0..=49 => metrics.incr(pick(&mut rng, COUNTERS), 1.0, &[region]),
            50..=69 => {
                let value = rng.gen_range(0..500u32);
                metrics.gauge(pick(&mut rng, GAUGES), f64::from(value), &[region])
            }
            70..=89 => {
                let ms = rng.gen_range(0.5..250.0);
                metrics.timing(pick(&mut rng, TIMINGS), ms, &[region])
            }
            _ => {
                let size = rng.gen_range(1..=4096u32);
                metrics.histogram(pick(&mut rng, HISTOGRAMS), f64::from(size), &[region])
            }
        };

        match result {
            Ok(()) => {
                emitted.fetch_add(1, Ordering::Relaxed);
            }
            // Backend stopped underneath us; nothing left to do.
            Err(e) => {
                tracing::debug!(worker = id, error = %e, "worker stopping");
                break;
            }
        }

        tokio::time::sleep(EMIT_INTERVAL).await;
    }
}

fn pick(rng: &mut StdRng, pool: &'static [&'static str]) -> &'static str {
    pool[rng.gen_range(0..pool.len())]
}
