//! Two links joined by a socket pair: one plays the board and echoes every
//! frame back with its first payload byte incremented.
//!
//! Run with:
//!   cargo run --example loopback

#[cfg(unix)]
fn main() -> Result<(), Box<dyn std::error::Error>> {
    loopback::run()
}

#[cfg(not(unix))]
fn main() {
    eprintln!("the loopback example needs unix socket pairs");
}

#[cfg(unix)]
mod loopback {
    use std::os::unix::net::UnixStream;
    use std::sync::mpsc;
    use std::thread;
    use std::time::Duration;

    use kfplink::frame::{Frame, FrameFormat};
    use kfplink::service::{Delivery, Link, LinkConfig};

    pub fn run() -> Result<(), Box<dyn std::error::Error>> {
        let (host_end, board_end) = UnixStream::pair()?;

        let mut host = Link::new(host_end, LinkConfig::default().with_name("host"))?;
        let mut board = Link::new(
            board_end,
            LinkConfig::default()
                .with_name("board")
                .with_delivery(Delivery::Persistent),
        )?;

        let (requests_tx, requests) = mpsc::channel::<Frame>();
        board.register(move |frame: Frame| {
            let _ = requests_tx.send(frame);
        });
        board.start()?;

        let responder = thread::spawn(move || {
            while let Ok(mut frame) = requests.recv_timeout(Duration::from_secs(1)) {
                let first = frame.payload.byte(0).unwrap_or(0);
                frame.payload.set_byte(0, first.wrapping_add(1));
                if let Err(err) = board.send(&frame) {
                    eprintln!("board send failed: {err}");
                    break;
                }
            }
            board.stop()
        });

        host.start()?;
        for n in 0..3u8 {
            let (tx, rx) = mpsc::channel();
            host.register(move |frame: Frame| {
                let _ = tx.send(frame);
            });

            host.send(&Frame::new([n, 0, 0, 0], [n * 10, 0, 0, 0, 0, 0, 0, 0]))?;
            let reply = rx.recv_timeout(Duration::from_secs(2))?;
            println!("{}", reply.display(FrameFormat::Hex));
        }
        host.stop()?;

        responder.join().map_err(|_| "responder panicked")??;
        Ok(())
    }
}
