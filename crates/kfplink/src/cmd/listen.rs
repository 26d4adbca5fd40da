use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::time::Duration;

use kfplink_frame::Frame;
use kfplink_service::{Delivery, Link, LinkConfig};
use tracing::info;

use crate::cmd::ListenArgs;
use crate::exit::{link_error, CliError, CliResult, SUCCESS};
use crate::output::{print_frame, OutputFormat};

const POLL_INTERVAL: Duration = Duration::from_millis(100);

pub fn run(args: ListenArgs, format: OutputFormat) -> CliResult<i32> {
    let serial = args.device.serial_config(POLL_INTERVAL)?;
    let config = LinkConfig::default()
        .with_name(args.device.link_name())
        .with_delivery(Delivery::Persistent)
        .with_poll_interval(POLL_INTERVAL)
        .with_quiescent(Duration::from_millis(args.quiescent_ms));

    let mut link = Link::open_serial(&args.device.path, serial, config)
        .map_err(|err| link_error("open failed", err))?;

    let (tx, rx) = mpsc::channel::<Frame>();
    link.register(move |frame: Frame| {
        let _ = tx.send(frame);
    });

    let running = Arc::new(AtomicBool::new(true));
    install_ctrlc_handler(running.clone())?;

    link.start()
        .map_err(|err| link_error("start failed", err))?;
    info!(link = link.name(), baud = args.device.baud, "listening");

    let mut printed = 0usize;
    while running.load(Ordering::SeqCst) {
        match rx.recv_timeout(POLL_INTERVAL) {
            Ok(frame) => {
                print_frame(&frame, link.name(), format);
                printed = printed.saturating_add(1);
                if args.count.is_some_and(|count| printed >= count) {
                    break;
                }
            }
            Err(RecvTimeoutError::Timeout) if link.is_running() => {}
            Err(_) => break,
        }
    }

    // A loop that already ended reports its own outcome through stop.
    link.stop()
        .map_err(|err| link_error("receive failed", err))?;
    Ok(SUCCESS)
}

fn install_ctrlc_handler(running: Arc<AtomicBool>) -> CliResult<()> {
    ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    })
    .map_err(|err| {
        CliError::new(
            crate::exit::INTERNAL,
            format!("signal handler setup failed: {err}"),
        )
    })
}
