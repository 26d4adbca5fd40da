use std::sync::{Condvar, Mutex, PoisonError};
use std::time::Duration;

use kfplink_frame::{FrameError, FrameReader, Step};
use kfplink_transport::ByteSource;
use tracing::{debug, trace};

use crate::bus::FrameBus;
use crate::error::Result;

/// Why a receive loop ended without an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The stop signal was triggered.
    Cancelled,
    /// The channel reported end of stream.
    Closed,
}

/// One-shot stop request shared between a link and its receive loop.
///
/// Unlike a bare flag, a triggered signal also wakes a loop sleeping through
/// its post-frame pause.
#[derive(Debug, Default)]
pub struct StopSignal {
    triggered: Mutex<bool>,
    wake: Condvar,
}

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request a stop. Idempotent.
    pub fn trigger(&self) {
        let mut triggered = self.triggered.lock().unwrap_or_else(PoisonError::into_inner);
        *triggered = true;
        self.wake.notify_all();
    }

    pub fn is_triggered(&self) -> bool {
        *self.triggered.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Sleep for up to `timeout`. Returns `true` if the signal was triggered.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let guard = self.triggered.lock().unwrap_or_else(PoisonError::into_inner);
        let (guard, _) = self
            .wake
            .wait_timeout_while(guard, timeout, |triggered| !*triggered)
            .unwrap_or_else(PoisonError::into_inner);
        *guard
    }
}

/// Decode frames from `reader` and dispatch each one on `bus` until stopped.
///
/// `stop` is checked before every read, so a triggered signal takes effect
/// within one channel read timeout. After every completed or discarded frame
/// the loop pauses for `quiescent`, giving other threads a window to register
/// listeners before the next frame is decoded.
///
/// Partial frame state lives in the reader's decoder; callers that restart a
/// channel should build a fresh reader.
pub fn receive_loop<S: ByteSource>(
    reader: &mut FrameReader<S>,
    bus: &FrameBus,
    quiescent: Duration,
    stop: &StopSignal,
) -> Result<StopReason> {
    loop {
        if stop.is_triggered() {
            return Ok(StopReason::Cancelled);
        }

        let step = match reader.poll_step() {
            Ok(Some(step)) => step,
            Ok(None) => continue,
            Err(FrameError::ConnectionClosed) => return Ok(StopReason::Closed),
            Err(err) => return Err(err.into()),
        };

        match step {
            Step::Frame(frame) => {
                let delivered = bus.dispatch(frame);
                debug!(delivered, id = ?frame.id, "frame dispatched");
            }
            Step::InvalidEscape(byte) => trace!(byte, "invalid escape"),
            _ => {}
        }

        if step.ends_frame() && !quiescent.is_zero() && stop.wait_timeout(quiescent) {
            return Ok(StopReason::Cancelled);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::{Cursor, ErrorKind, Read};
    use std::sync::{mpsc, Arc};
    use std::thread;
    use std::time::Instant;

    use kfplink_frame::{encode, Frame, DELIMITER};

    use super::*;
    use crate::bus::Delivery;
    use crate::error::LinkError;

    fn frame(id: u8) -> Frame {
        Frame::new([id, 0, 0, 0], [1, 2, 3, 4, 5, 6, 7, 8])
    }

    fn wire(frames: &[Frame]) -> Vec<u8> {
        frames
            .iter()
            .flat_map(|f| encode(f).as_bytes().to_vec())
            .collect()
    }

    #[test]
    fn dispatches_until_closed() {
        let bus = FrameBus::with_delivery(Delivery::Persistent);
        let (tx, rx) = mpsc::channel();
        bus.register(move |frame: Frame| tx.send(frame).expect("send"));

        let mut reader = FrameReader::new(Cursor::new(wire(&[frame(1), frame(2), frame(3)])));
        let reason = receive_loop(&mut reader, &bus, Duration::ZERO, &StopSignal::new())
            .expect("loop should end cleanly");

        assert_eq!(reason, StopReason::Closed);
        assert_eq!(rx.try_iter().collect::<Vec<_>>(), [frame(1), frame(2), frame(3)]);
    }

    #[test]
    fn frames_without_listeners_are_dropped() {
        let bus = FrameBus::new();
        let mut reader = FrameReader::new(Cursor::new(wire(&[frame(1), frame(2)])));
        let reason = receive_loop(&mut reader, &bus, Duration::ZERO, &StopSignal::new())
            .expect("loop should end cleanly");

        assert_eq!(reason, StopReason::Closed);
        assert_eq!(reader.stats().frames, 2);
    }

    #[test]
    fn corrupted_input_is_skipped() {
        let mut bytes = vec![0x11, 0x22, DELIMITER, 1, 2, DELIMITER];
        bytes.extend(wire(&[frame(9)]));

        let bus = FrameBus::with_delivery(Delivery::Persistent);
        let (tx, rx) = mpsc::channel();
        bus.register(move |frame: Frame| tx.send(frame).expect("send"));

        let mut reader = FrameReader::new(Cursor::new(bytes));
        receive_loop(&mut reader, &bus, Duration::ZERO, &StopSignal::new())
            .expect("loop should end cleanly");

        assert_eq!(rx.try_iter().collect::<Vec<_>>(), [frame(9)]);
        assert_eq!(reader.stats().discarded, 1);
    }

    #[test]
    fn pre_triggered_signal_stops_before_reading() {
        let stop = StopSignal::new();
        stop.trigger();
        let mut reader = FrameReader::new(Cursor::new(wire(&[frame(1)])));
        let reason = receive_loop(&mut reader, &FrameBus::new(), Duration::ZERO, &stop)
            .expect("loop should end cleanly");

        assert_eq!(reason, StopReason::Cancelled);
        assert_eq!(reader.get_ref().position(), 0);
    }

    #[test]
    fn stop_interrupts_idle_channel() {
        let stop = Arc::new(StopSignal::new());
        let loop_stop = Arc::clone(&stop);
        let handle = thread::spawn(move || {
            let mut reader = FrameReader::new(AlwaysTimesOut);
            receive_loop(&mut reader, &FrameBus::new(), Duration::ZERO, &loop_stop)
        });

        thread::sleep(Duration::from_millis(20));
        stop.trigger();
        let reason = handle
            .join()
            .expect("loop thread should not panic")
            .expect("loop should end cleanly");
        assert_eq!(reason, StopReason::Cancelled);
    }

    #[test]
    fn stop_wakes_quiescent_pause() {
        let stop = Arc::new(StopSignal::new());
        let loop_stop = Arc::clone(&stop);
        let started = Instant::now();
        let handle = thread::spawn(move || {
            let mut reader = FrameReader::new(Cursor::new(wire(&[frame(1), frame(2)])));
            receive_loop(&mut reader, &FrameBus::new(), Duration::from_secs(30), &loop_stop)
        });

        thread::sleep(Duration::from_millis(20));
        stop.trigger();
        let reason = handle
            .join()
            .expect("loop thread should not panic")
            .expect("loop should end cleanly");
        assert_eq!(reason, StopReason::Cancelled);
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[test]
    fn read_error_is_reported() {
        let mut reader = FrameReader::new(FailingSource);
        let err = receive_loop(&mut reader, &FrameBus::new(), Duration::ZERO, &StopSignal::new())
            .expect_err("read failure should surface");
        assert!(matches!(err, LinkError::Frame(FrameError::Transport(_))));
    }

    #[test]
    fn wait_timeout_reports_trigger() {
        let stop = StopSignal::new();
        assert!(!stop.wait_timeout(Duration::from_millis(1)));
        stop.trigger();
        stop.trigger();
        assert!(stop.wait_timeout(Duration::from_secs(5)));
        assert!(stop.is_triggered());
    }

    struct AlwaysTimesOut;

    impl Read for AlwaysTimesOut {
        fn read(&mut self, _buf: &mut [u8]) -> std::io::Result<usize> {
            thread::sleep(Duration::from_millis(1));
            Err(std::io::Error::from(ErrorKind::TimedOut))
        }
    }

    struct FailingSource;

    impl Read for FailingSource {
        fn read(&mut self, _buf: &mut [u8]) -> std::io::Result<usize> {
            Err(std::io::Error::from(ErrorKind::BrokenPipe))
        }
    }
}
