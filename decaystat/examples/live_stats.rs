//! Feeds simulated request latencies into a [`MultiWindowStat`] from a few worker threads and
//! prints the snapshot once per second, first as JSON and at the end in Prometheus text format.
//!
//! ```sh
//! cargo run -p decaystat --example live_stats
//! ```

use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    thread,
    time::Duration,
};

use decaystat::{BucketOpts, MultiWindowStat, StatOpts};
use rand::Rng;

const WORKERS: usize = 4;
const ROUNDS: usize = 5;

fn main() {
    let opts = StatOpts::default().bucket(BucketOpts::default().period(Duration::from_secs(1)));
    let stat = Arc::new(MultiWindowStat::with_opts(opts).expect("valid options"));
    let running = Arc::new(AtomicBool::new(true));

    let workers: Vec<_> = (0..WORKERS)
        .map(|worker| {
            let stat = Arc::clone(&stat);
            let running = Arc::clone(&running);
            thread::spawn(move || {
                let mut rng = rand::thread_rng();
                // every worker is a little slower than the previous one
                let base = 5.0 * (worker + 1) as f64;
                while running.load(Ordering::Relaxed) {
                    stat.add(base + rng.gen_range(0.0..base));
                    thread::sleep(Duration::from_millis(2));
                }
            })
        })
        .collect();

    for round in 1..=ROUNDS {
        thread::sleep(Duration::from_secs(1));
        let snapshot = stat.snapshot();
        println!("--- round {round} ---");
        println!("{}", serde_json::to_string_pretty(&snapshot).expect("snapshot serializes"));
    }

    running.store(false, Ordering::Relaxed);
    for worker in workers {
        worker.join().expect("worker panicked");
    }

    #[cfg(feature = "prometheus")]
    print_exposition(stat);
}

#[cfg(feature = "prometheus")]
fn print_exposition(stat: Arc<MultiWindowStat>) {
    use decaystat::collector::{CollectorOpts, MultiWindowCollector};
    use prometheus::{Encoder, Registry, TextEncoder};

    let registry = Registry::new();
    MultiWindowCollector::new(stat, CollectorOpts::new("request_latency_ms", "Request latency."))
        .and_then(|collector| collector.register(&registry))
        .expect("collector registers");

    let mut buffer = vec![];
    TextEncoder::new().encode(&registry.gather(), &mut buffer).expect("metrics encode");
    println!("{}", String::from_utf8_lossy(&buffer));
}
