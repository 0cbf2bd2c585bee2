//! Metrics Demo
//!
//! Tracks synthetic request latencies from several threads into a
//! two-dimensional metric whose input cardinality exceeds its limits, then
//! flushes one aggregation period as JSON log lines.
//!
//! ## Usage
//!
//! ```bash
//! metrics-demo [settings.toml]
//! ```
//!
//! ## Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | METRIC_CUBE_CONFIG | (none) | Settings file, if no argument is given |
//! | METRIC_CUBE_LOG | info | Log filter directives |
//! | METRIC_CUBE_LOG_JSON | false | JSON log output |
//! | DEMO_THREADS | 4 | Tracking threads |
//! | DEMO_SAMPLES | 10000 | Samples per thread |

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

use metric_cube::{init_tracing, LogSink, MetricIdentifier, MetricManager, SdkConfig};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::info;

const DEFAULT_THREADS: usize = 4;
const DEFAULT_SAMPLES: usize = 10_000;

const ROUTES: usize = 150;
const METHODS: [&str; 4] = ["GET", "POST", "PUT", "DELETE"];

fn env_usize(name: &str, default: usize) -> usize {
    std::env::var(name)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config_path = std::env::args()
        .nth(1)
        .or_else(|| std::env::var("METRIC_CUBE_CONFIG").ok());
    let mut config = match &config_path {
        Some(path) => SdkConfig::from_file(path)?,
        None => SdkConfig::default(),
    };
    config.logging = config.logging.with_env_overrides();
    init_tracing(&config.logging)?;

    let threads = env_usize("DEMO_THREADS", DEFAULT_THREADS);
    let samples = env_usize("DEMO_SAMPLES", DEFAULT_SAMPLES);

    let manager = MetricManager::measurement(now_ms());
    let identifier = MetricIdentifier::new(Some("demo"), "request.latency_ms", &["Route", "Method"])?;
    let metric = manager.get_or_create_metric(identifier, config.default_metric.clone())?;

    info!(
        threads,
        samples,
        series_count_limit = config.default_metric.series_count_limit,
        "tracking synthetic latencies"
    );

    let dropped = AtomicU64::new(0);
    let tracked = AtomicU64::new(0);
    std::thread::scope(|s| {
        for thread_id in 0..threads {
            let metric = &metric;
            let dropped = &dropped;
            let tracked = &tracked;
            s.spawn(move || {
                let mut rng = ChaCha8Rng::seed_from_u64(thread_id as u64);
                for _ in 0..samples {
                    let route = format!("/api/v1/resource/{}", rng.gen_range(0..ROUTES));
                    let method = METHODS[rng.gen_range(0..METHODS.len())];
                    let latency = rng.gen_range(1.0..250.0);
                    match metric.track_value(latency, &[route.as_str(), method]) {
                        Ok(true) => tracked.fetch_add(1, Ordering::Relaxed),
                        Ok(false) => dropped.fetch_add(1, Ordering::Relaxed),
                        Err(e) => {
                            tracing::error!(error = %e, "track_value rejected input");
                            0
                        }
                    };
                }
            });
        }
    });

    let summary = manager.flush(now_ms(), &LogSink);

    println!("Metrics Demo");
    println!("============");
    println!("  series:     {}", metric.series_count());
    println!("  routes:     {}", metric.dimension_values(1)?.len());
    println!("  tracked:    {}", tracked.load(Ordering::Relaxed));
    println!("  dropped:    {}", dropped.load(Ordering::Relaxed));
    println!("  aggregates: {}", summary.aggregates);
    println!("  period:     {} ms", summary.period.duration_ms);

    Ok(())
}
