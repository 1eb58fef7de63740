//! Stream gaze events from a simulated tracker to stdout.
//!
//! Usage: cargo run --example stream [address]
//! Set RUST_LOG=debug to watch the session lifecycle.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tobii_gaze::sim::SimulatedTracker;
use tobii_gaze::{native::codes, GazeEvent, GazeListener, GazeSample, Session, SessionError};

struct Printer {
    count: AtomicU64,
}

impl GazeListener for Printer {
    fn on_gaze_event(&self, event: &GazeEvent) {
        let count = self.count.fetch_add(1, Ordering::Relaxed) + 1;
        // Print every ~100th event to avoid flooding the terminal
        if count % 100 == 1 {
            println!(
                "seq={:<6} ts={:<10} payload={} bytes",
                event.sequence(),
                event.timestamp_us(),
                event.payload().len()
            );
        }
    }

    fn on_session_error(&self, error: &SessionError) {
        eprintln!("Session error: {}", error);
    }
}

fn main() {
    env_logger::init();

    let address = std::env::args().nth(1);
    let tracker = SimulatedTracker::new();
    let mut session = match Session::new(
        tobii_gaze::TrackerConfig::from_env().with_default_address("tet-tcp://169.254.5.10"),
        tracker.backend(),
        address.as_deref(),
    ) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Failed to create session: {}", e);
            std::process::exit(1);
        }
    };

    let printer = Arc::new(Printer {
        count: AtomicU64::new(0),
    });
    session.register(printer.clone());

    let started = session.connect().and_then(|s| s.start()).map(|_| ());
    if let Err(e) = started {
        eprintln!("Failed to start tracking {}: {}", session.address(), e);
        std::process::exit(1);
    }
    println!("Tracking {} ...", session.address());

    // Feed ~1 s of 500 Hz samples, then pull the plug.
    let feeder = {
        let tracker = tracker.clone();
        std::thread::spawn(move || {
            for i in 0..500u64 {
                tracker.push_sample(GazeSample::new(i * 2_000, vec![0u8; 16]));
                std::thread::sleep(Duration::from_millis(2));
            }
            tracker.end_event_loop(codes::NOT_CONNECTED);
        })
    };

    let start = Instant::now();
    let status = session.wait_for_loop_exit(Duration::from_secs(10));
    let _ = feeder.join();

    let elapsed = start.elapsed().as_secs_f64();
    let count = printer.count.load(Ordering::Relaxed);
    println!(
        "\nLoop exited with {:?}: {} events in {:.1}s ({:.1} Hz)",
        status,
        count,
        elapsed,
        count as f64 / elapsed
    );
}
