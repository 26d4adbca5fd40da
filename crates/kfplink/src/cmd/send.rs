use std::sync::mpsc::{self, RecvTimeoutError};
use std::time::Duration;

use kfplink_frame::Frame;
use kfplink_service::{Delivery, Link, LinkConfig};
use tracing::debug;

use crate::cmd::{parse_duration, SendArgs};
use crate::exit::{link_error, CliError, CliResult, SUCCESS, TIMEOUT};
use crate::output::{print_frame, OutputFormat};

const POLL_INTERVAL: Duration = Duration::from_millis(100);

pub fn run(args: SendArgs, format: OutputFormat) -> CliResult<i32> {
    let wait_timeout = parse_duration(&args.wait_timeout)?;
    let frame = args.frame.to_frame()?;
    let serial = args.device.serial_config(POLL_INTERVAL)?;
    let config = LinkConfig::default()
        .with_name(args.device.link_name())
        .with_delivery(Delivery::Once)
        .with_poll_interval(POLL_INTERVAL)
        .with_quiescent(Duration::ZERO);

    let mut link = Link::open_serial(&args.device.path, serial, config)
        .map_err(|err| link_error("open failed", err))?;

    if !args.wait {
        let written = link
            .send(&frame)
            .map_err(|err| link_error("send failed", err))?;
        debug!(written, "frame sent");
        return Ok(SUCCESS);
    }

    // Arm the reply listener and the receive loop before sending so a fast
    // reply is not missed.
    let (tx, rx) = mpsc::channel::<Frame>();
    link.register(move |frame: Frame| {
        let _ = tx.send(frame);
    });
    link.start()
        .map_err(|err| link_error("start failed", err))?;

    let written = link
        .send(&frame)
        .map_err(|err| link_error("send failed", err))?;
    debug!(written, "frame sent, waiting for reply");

    let reply = rx.recv_timeout(wait_timeout);
    let stopped = link.stop();
    match reply {
        Ok(reply) => {
            print_frame(&reply, link.name(), format);
            Ok(SUCCESS)
        }
        Err(RecvTimeoutError::Timeout) => Err(CliError::new(
            TIMEOUT,
            format!("no reply within {}", args.wait_timeout),
        )),
        Err(RecvTimeoutError::Disconnected) => {
            stopped.map_err(|err| link_error("receive failed", err))?;
            Err(CliError::new(
                crate::exit::FAILURE,
                "link closed before a reply arrived",
            ))
        }
    }
}
