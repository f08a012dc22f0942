//! kegreplay: feed a captured kegboard byte stream through the accounting
//! core and report what it produced.
//!
//! Usage: `kegreplay <capture-file> [chunk-size]`
//!
//! The capture is replayed in fixed-size chunks to exercise the streaming
//! reassembly path the same way a serial port would. After the stream ends,
//! remaining flows are closed and the resulting drinks are printed as JSON.

use std::env;
use std::fs;
use std::sync::Arc;

use anyhow::{bail, Context};

use kegcore::adapters::{LogSink, MemStore, SystemClock};
use kegcore::backend::local::LocalBackend;
use kegcore::backend::Backend;
use kegcore::core::{KegbotCore, Tap};
use kegcore::CoreConfig;

const DEFAULT_CHUNK_SIZE: usize = 64;

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let mut args = env::args().skip(1);
    let Some(path) = args.next() else {
        bail!("usage: kegreplay <capture-file> [chunk-size]");
    };
    let chunk_size = match args.next() {
        Some(raw) => raw
            .parse::<usize>()
            .context("chunk size must be a positive integer")?,
        None => DEFAULT_CHUNK_SIZE,
    };
    if chunk_size == 0 {
        bail!("chunk size must be a positive integer");
    }

    let capture = fs::read(&path).with_context(|| format!("reading capture '{path}'"))?;
    log::info!("replaying {} bytes from '{path}'", capture.len());

    let config = CoreConfig::default();
    config.validate()?;

    let clock = Arc::new(SystemClock::new());
    let backend = LocalBackend::new(clock.clone(), config.session_gap_minutes);
    let core = KegbotCore::new(config, clock, backend, MemStore::new(), LogSink);

    // A stock single-tap setup with a fresh half barrel, so meter activity
    // in the capture lands somewhere.
    let meter = "kegboard.flow0";
    core.add_tap(Tap::new(meter, "Replay Tap"))?;
    core.start_keg(meter, "Replay Keg", "Replay Brewing", "Pale Ale", "half-barrel")?;

    for chunk in capture.chunks(chunk_size) {
        core.handle_bytes(chunk);
    }

    // Close out anything still pouring at end of capture.
    for flow in core.active_flows() {
        let _ = core.end_flow(flow.meter_name());
    }
    core.drain_pending();

    let report = serde_json::json!({
        "taps": core.taps(),
        "drinks": core.drinks(),
        "sessions": core.with_backend(|b| b.sessions().to_vec()),
        "events": core.with_backend(Backend::events),
    });
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
