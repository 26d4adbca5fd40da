use std::io::{Read, Write};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use kfplink_frame::{Frame, FrameReader, FrameTransmitter};
use kfplink_transport::ByteChannel;
use tracing::{debug, info, warn};

use crate::bus::{Delivery, FrameBus, FrameListener, ListenerId};
use crate::error::{LinkError, Result};
use crate::receive::{receive_loop, StopReason, StopSignal};

/// Default bound on one blocking byte read.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Default pause after each completed or discarded frame.
pub const DEFAULT_QUIESCENT: Duration = Duration::from_millis(50);

/// Default stack size of the receive thread.
pub const DEFAULT_STACK_SIZE: usize = 256 * 1024;

/// Per-link behavior.
#[derive(Debug, Clone)]
pub struct LinkConfig {
    /// Used in log fields and as the receive thread name prefix.
    pub name: String,
    /// Delivery applied by [`Link::register`].
    pub delivery: Delivery,
    /// Read timeout handed to the channel; bounds how long `stop` waits.
    pub poll_interval: Duration,
    /// Pause after each frame boundary. Zero disables it.
    pub quiescent: Duration,
    /// Receive thread stack size in bytes.
    pub stack_size: usize,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            name: "kfplink".to_string(),
            delivery: Delivery::Once,
            poll_interval: DEFAULT_POLL_INTERVAL,
            quiescent: DEFAULT_QUIESCENT,
            stack_size: DEFAULT_STACK_SIZE,
        }
    }
}

impl LinkConfig {
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_delivery(mut self, delivery: Delivery) -> Self {
        self.delivery = delivery;
        self
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn with_quiescent(mut self, quiescent: Duration) -> Self {
        self.quiescent = quiescent;
        self
    }

    pub fn with_stack_size(mut self, stack_size: usize) -> Self {
        self.stack_size = stack_size;
        self
    }
}

type BoxedSource = Box<dyn Read + Send>;
type BoxedSink = Box<dyn Write + Send>;

struct Receiver {
    stop: Arc<StopSignal>,
    handle: JoinHandle<Result<StopReason>>,
}

/// A frame link over one byte channel.
///
/// The link owns both halves of the channel, its listener bus and at most one
/// receive thread. Several links can run side by side; they share nothing.
///
/// Listener registration and [`Link::send`] take `&self` and may be called
/// from any thread while the receive loop runs. Sends are serialized so
/// encoded frames never interleave on the wire.
pub struct Link {
    config: LinkConfig,
    bus: Arc<FrameBus>,
    transmitter: Mutex<FrameTransmitter<BoxedSink>>,
    source: Arc<Mutex<Option<BoxedSource>>>,
    receiver: Option<Receiver>,
}

impl Link {
    /// Split `channel` and build an idle link around it.
    ///
    /// The channel's read timeout is set to `config.poll_interval`. Pre-split
    /// `(reader, writer)` pairs must bound their reads themselves or
    /// [`Link::stop`] can block until the next byte arrives.
    pub fn new<C: ByteChannel>(channel: C, config: LinkConfig) -> Result<Self> {
        let (reader, writer) = channel.split(Some(config.poll_interval))?;
        let source: BoxedSource = Box::new(reader);
        let sink: BoxedSink = Box::new(writer);
        debug!(link = %config.name, "link created");
        Ok(Self {
            bus: Arc::new(FrameBus::with_delivery(config.delivery)),
            transmitter: Mutex::new(FrameTransmitter::new(sink)),
            source: Arc::new(Mutex::new(Some(source))),
            receiver: None,
            config,
        })
    }

    /// Open a serial device and build an idle link around it.
    #[cfg(unix)]
    pub fn open_serial(
        path: impl AsRef<std::path::Path>,
        serial: kfplink_transport::SerialConfig,
        config: LinkConfig,
    ) -> Result<Self> {
        let port = kfplink_transport::SerialPort::open(path, serial)?;
        Self::new(port, config)
    }

    /// Spawn the receive thread.
    ///
    /// Every start decodes with a fresh decoder, so bytes of a frame that was
    /// in flight when the link last stopped are treated as noise. A loop that
    /// already ended on its own is reaped first.
    pub fn start(&mut self) -> Result<()> {
        if let Some(receiver) = self.receiver.take() {
            if !receiver.handle.is_finished() {
                self.receiver = Some(receiver);
                return Err(LinkError::AlreadyStarted(self.config.name.clone()));
            }
            match self.join(receiver) {
                Ok(reason) => {
                    debug!(link = %self.config.name, ?reason, "reaped finished receive loop")
                }
                Err(err) => {
                    warn!(link = %self.config.name, error = %err, "reaped failed receive loop")
                }
            }
        }
        if lock(&self.source).is_none() {
            return Err(LinkError::ChannelUnavailable(self.config.name.clone()));
        }

        let stop = Arc::new(StopSignal::new());
        let loop_stop = Arc::clone(&stop);
        let slot = Arc::clone(&self.source);
        let bus = Arc::clone(&self.bus);
        let name = self.config.name.clone();
        let quiescent = self.config.quiescent;

        let handle = thread::Builder::new()
            .name(format!("{name}-rx"))
            .stack_size(self.config.stack_size)
            .spawn(move || {
                let source = lock(&slot)
                    .take()
                    .ok_or_else(|| LinkError::ChannelUnavailable(name.clone()))?;
                let mut reader = FrameReader::new(source);
                let outcome = receive_loop(&mut reader, &bus, quiescent, &loop_stop);
                match &outcome {
                    Ok(reason) => info!(link = %name, ?reason, "receive loop stopped"),
                    Err(err) => warn!(link = %name, error = %err, "receive loop failed"),
                }
                *lock(&slot) = Some(reader.into_inner());
                outcome
            })
            .map_err(LinkError::Spawn)?;

        info!(link = %self.config.name, "link started");
        self.receiver = Some(Receiver { stop, handle });
        Ok(())
    }

    /// Signal the receive loop to stop and wait for it.
    ///
    /// Returns once the loop has exited, which takes at most one poll
    /// interval on an idle channel. The link can be started again afterwards.
    pub fn stop(&mut self) -> Result<StopReason> {
        let receiver = self.take_receiver()?;
        receiver.stop.trigger();
        self.join(receiver)
    }

    /// Wait for the receive loop to end on its own, typically because the
    /// channel closed.
    pub fn wait(&mut self) -> Result<StopReason> {
        let receiver = self.take_receiver()?;
        self.join(receiver)
    }

    /// Whether a receive loop has been started and has not yet exited.
    pub fn is_running(&self) -> bool {
        self.receiver
            .as_ref()
            .is_some_and(|receiver| !receiver.handle.is_finished())
    }

    /// Encode and write one frame. Returns the number of wire bytes written.
    pub fn send(&self, frame: &Frame) -> Result<usize> {
        let mut transmitter = lock(&self.transmitter);
        Ok(transmitter.send(frame)?)
    }

    /// Frames written by [`Link::send`] so far.
    pub fn frames_sent(&self) -> u64 {
        lock(&self.transmitter).frames_sent()
    }

    /// Register a listener with the link's default delivery.
    pub fn register(&self, listener: impl FrameListener + 'static) -> ListenerId {
        self.bus.register(listener)
    }

    pub fn register_with(
        &self,
        listener: impl FrameListener + 'static,
        delivery: Delivery,
    ) -> ListenerId {
        self.bus.register_with(listener, delivery)
    }

    /// Remove a listener. Returns `false` if it was not registered.
    pub fn remove(&self, id: ListenerId) -> bool {
        self.bus.remove(id)
    }

    /// The link's listener bus.
    pub fn bus(&self) -> &Arc<FrameBus> {
        &self.bus
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn config(&self) -> &LinkConfig {
        &self.config
    }

    fn take_receiver(&mut self) -> Result<Receiver> {
        self.receiver
            .take()
            .ok_or_else(|| LinkError::NotStarted(self.config.name.clone()))
    }

    fn join(&self, receiver: Receiver) -> Result<StopReason> {
        receiver
            .handle
            .join()
            .map_err(|_| LinkError::ReceiverPanicked(self.config.name.clone()))?
    }
}

impl Drop for Link {
    fn drop(&mut self) {
        if let Some(receiver) = self.receiver.take() {
            receiver.stop.trigger();
            let _ = receiver.handle.join();
        }
    }
}

impl std::fmt::Debug for Link {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Link")
            .field("name", &self.config.name)
            .field("running", &self.is_running())
            .field("listeners", &self.bus.len())
            .finish()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
