//! Replays captured accessory traffic through the session coordinator.
//!
//! Reads one inbound frame per line as hex from stdin (`#` starts a comment)
//! and prints every outbound command as hex on stdout.

use airpods_link::domain::feedback::{NoFeedback, ThrottledFeedback};
use airpods_link::infrastructure::accessory::packets::{format_hex, parse_hex_frame};
use airpods_link::infrastructure::logging::init_logger;
use airpods_link::{AccessoryService, SettingsService};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{info, warn};

const USAGE: &str = "usage: airpods-link [--init] [--head-tracking] [--gestures] < frames.txt";

#[derive(Debug, Default, PartialEq, Eq)]
struct Options {
    init: bool,
    head_tracking: bool,
    gestures: bool,
    help: bool,
}

impl Options {
    fn parse<I: IntoIterator<Item = String>>(args: I) -> anyhow::Result<Self> {
        let mut options = Options::default();
        for arg in args {
            match arg.as_str() {
                "--init" => options.init = true,
                "--head-tracking" => options.head_tracking = true,
                "--gestures" => options.gestures = true,
                "-h" | "--help" => options.help = true,
                other => anyhow::bail!("unknown argument '{}'\n{}", other, USAGE),
            }
        }
        Ok(options)
    }
}

async fn read_frames(frames: mpsc::UnboundedSender<Vec<u8>>) -> anyhow::Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut line_number = 0usize;
    while let Some(line) = lines.next_line().await? {
        line_number += 1;
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        match parse_hex_frame(line) {
            Ok(frame) => {
                if frames.send(frame).is_err() {
                    break;
                }
            }
            Err(e) => warn!("Skipping line {}: {}", line_number, e),
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let options = Options::parse(std::env::args().skip(1))?;
    if options.help {
        println!("{}", USAGE);
        return Ok(());
    }

    let settings = SettingsService::new()?.get().clone();
    let _log_guard = init_logger(&settings.log_settings)?;
    info!("Starting accessory replay");

    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<Vec<u8>>();
    let printer = tokio::spawn(async move {
        while let Some(bytes) = outbound_rx.recv().await {
            println!("-> {}", format_hex(&bytes));
        }
    });

    let feedback = Arc::new(ThrottledFeedback::new(NoFeedback));
    let mut service = AccessoryService::new(&settings, outbound_tx, feedback);

    let mut events = service.subscribe();
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            info!("Device event: {:?}", event);
        }
    });

    if options.init {
        service.initialize();
    }
    if options.head_tracking {
        service.start_head_tracking();
    }
    if options.gestures {
        service.start_gesture_detection(false, |is_yes| {
            info!("Head gesture: {}", if is_yes { "yes" } else { "no" });
        });
    }

    let (frames_tx, frames_rx) = mpsc::unbounded_channel();
    let reader = tokio::spawn(read_frames(frames_tx));
    service.run(frames_rx).await;
    reader.await??;

    // Give the detector a few evaluation rounds on the tail of the capture
    if service.gestures().is_running() {
        let period = settings.gesture.evaluation_interval_ms.max(1);
        tokio::time::sleep(Duration::from_millis(period * 4)).await;
        if service.gestures().is_running() {
            info!("No head gesture detected");
        }
    }
    service.stop_gesture_detection(false);
    service.stop_head_tracking();

    let snapshot = service.device_state().snapshot();
    info!("Final device state: {:?}", snapshot);

    drop(service);
    if tokio::time::timeout(Duration::from_millis(500), printer)
        .await
        .is_err()
    {
        warn!("Outbound printer did not finish");
    }
    Ok(())
}
