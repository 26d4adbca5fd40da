//! Tokio variant of [`Link`](crate::Link).
//!
//! The receive loop runs as a spawned task instead of a thread and is stopped
//! through a [`CancellationToken`], which interrupts both the pending byte
//! read and the post-frame pause.

use std::io::ErrorKind;
use std::sync::Arc;

use kfplink_frame::{encode, Decoder, Frame, FrameError, Step};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::bus::{Delivery, FrameBus, FrameListener, ListenerId};
use crate::error::{LinkError, Result};
use crate::link::LinkConfig;
use crate::receive::StopReason;

type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// A frame link whose receive loop is a tokio task.
///
/// Unlike the threaded link it starts on construction and cannot be
/// restarted: the reader is consumed by the task.
pub struct AsyncLink {
    config: LinkConfig,
    bus: Arc<FrameBus>,
    writer: Mutex<BoxedWriter>,
    cancel: CancellationToken,
    task: Option<JoinHandle<Result<StopReason>>>,
}

impl AsyncLink {
    /// Spawn the receive task on the current runtime.
    pub fn spawn<R, W>(reader: R, writer: W, config: LinkConfig) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let bus = Arc::new(FrameBus::with_delivery(config.delivery));
        let cancel = CancellationToken::new();
        let task = tokio::spawn(receive_task(
            reader,
            Arc::clone(&bus),
            config.clone(),
            cancel.clone(),
        ));
        info!(link = %config.name, "async link started");

        let writer: BoxedWriter = Box::new(writer);
        Self {
            config,
            bus,
            writer: Mutex::new(writer),
            cancel,
            task: Some(task),
        }
    }

    /// Encode and write one frame. Returns the number of wire bytes written.
    pub async fn send(&self, frame: &Frame) -> Result<usize> {
        let encoded = encode(frame);
        let mut writer = self.writer.lock().await;
        writer
            .write_all(encoded.as_bytes())
            .await
            .map_err(FrameError::Io)?;
        writer.flush().await.map_err(FrameError::Io)?;
        Ok(encoded.len())
    }

    /// Cancel the receive task and wait for it.
    pub async fn stop(&mut self) -> Result<StopReason> {
        self.cancel.cancel();
        self.wait().await
    }

    /// Wait for the receive task to end on its own.
    pub async fn wait(&mut self) -> Result<StopReason> {
        let task = self
            .task
            .take()
            .ok_or_else(|| LinkError::NotStarted(self.config.name.clone()))?;
        task.await
            .map_err(|_| LinkError::ReceiverPanicked(self.config.name.clone()))?
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

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

    pub fn remove(&self, id: ListenerId) -> bool {
        self.bus.remove(id)
    }

    pub fn bus(&self) -> &Arc<FrameBus> {
        &self.bus
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }
}

impl Drop for AsyncLink {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn receive_task<R>(
    mut reader: R,
    bus: Arc<FrameBus>,
    config: LinkConfig,
    cancel: CancellationToken,
) -> Result<StopReason>
where
    R: AsyncRead + Unpin,
{
    let mut decoder = Decoder::new();
    let outcome = loop {
        let byte = tokio::select! {
            biased;

            _ = cancel.cancelled() => break Ok(StopReason::Cancelled),

            read = reader.read_u8() => match read {
                Ok(byte) => byte,
                Err(err) if err.kind() == ErrorKind::UnexpectedEof => break Ok(StopReason::Closed),
                Err(err) => break Err(LinkError::Frame(FrameError::Io(err))),
            },
        };

        let step = decoder.step(byte);
        if let Step::Frame(frame) = step {
            let delivered = bus.dispatch(frame);
            debug!(delivered, id = ?frame.id, "frame dispatched");
        }

        if step.ends_frame() && !config.quiescent.is_zero() {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break Ok(StopReason::Cancelled),
                _ = tokio::time::sleep(config.quiescent) => {}
            }
        }
    };

    match &outcome {
        Ok(reason) => info!(link = %config.name, ?reason, "receive task stopped"),
        Err(err) => warn!(link = %config.name, error = %err, "receive task failed"),
    }
    outcome
}
