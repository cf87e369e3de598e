//! Message channel between the main context and its worker.
//!
//! The main context holds a [`WorkerHandle`]. Every posted message is
//! wrapped in a [`WorkerMessage`] that carries a [`ReplyPort`] back to the
//! handle, so the worker can answer without knowing who sent it.

use std::sync::Arc;

use tokio::sync::{Mutex, mpsc};

use wasm_boot_common::BootError;

/// What travels from the main context to the worker loop.
#[derive(Debug)]
pub enum Envelope {
    /// A message for the module's worker handler.
    Message(WorkerMessage),
    /// Stop the loop once every earlier envelope has been handled.
    Terminate,
}

/// An inbound message for the worker.
///
/// The payload is opaque to wasm-boot and forwarded unmodified.
#[derive(Debug)]
pub struct WorkerMessage {
    data: Vec<u8>,
    reply: ReplyPort,
}

impl WorkerMessage {
    /// Create a message with an explicit return channel.
    pub fn new(data: impl Into<Vec<u8>>, reply: ReplyPort) -> Self {
        Self {
            data: data.into(),
            reply,
        }
    }

    /// The message payload.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Consume the message, returning its payload.
    pub fn into_data(self) -> Vec<u8> {
        self.data
    }

    /// The return channel to the sender.
    pub fn reply_port(&self) -> &ReplyPort {
        &self.reply
    }

    /// Send a reply to the sender.
    pub fn reply(&self, data: impl Into<Vec<u8>>) -> Result<(), BootError> {
        self.reply.send(data)
    }
}

/// Return channel from the worker to the main context.
#[derive(Debug, Clone)]
pub struct ReplyPort {
    tx: mpsc::UnboundedSender<Vec<u8>>,
}

impl ReplyPort {
    /// Create a reply port and the receiver it feeds.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Vec<u8>>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Send data back to the main context.
    pub fn send(&self, data: impl Into<Vec<u8>>) -> Result<(), BootError> {
        self.tx
            .send(data.into())
            .map_err(|_| BootError::ChannelClosed { peer: "main" })
    }
}

/// Main-context handle to a worker.
///
/// Cheap to clone; all clones address the same worker and share one reply
/// queue.
#[derive(Debug, Clone)]
pub struct WorkerHandle {
    inbox: mpsc::UnboundedSender<Envelope>,
    reply_port: ReplyPort,
    replies: Arc<Mutex<mpsc::UnboundedReceiver<Vec<u8>>>>,
}

impl WorkerHandle {
    /// Create a handle and the inbox receiver the worker loop drains.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Envelope>) {
        let (inbox, inbox_rx) = mpsc::unbounded_channel();
        let (reply_port, replies) = ReplyPort::channel();

        let handle = Self {
            inbox,
            reply_port,
            replies: Arc::new(Mutex::new(replies)),
        };
        (handle, inbox_rx)
    }

    /// Post a message to the worker.
    ///
    /// # Errors
    ///
    /// Returns `ChannelClosed` if the worker loop has stopped.
    pub fn post_message(&self, data: impl Into<Vec<u8>>) -> Result<(), BootError> {
        let message = WorkerMessage::new(data, self.reply_port.clone());
        self.inbox
            .send(Envelope::Message(message))
            .map_err(|_| BootError::ChannelClosed { peer: "worker" })
    }

    /// Wait for the next reply from the worker.
    pub async fn recv(&self) -> Option<Vec<u8>> {
        self.replies.lock().await.recv().await
    }

    /// Take a reply if one is already queued.
    pub fn try_recv(&self) -> Option<Vec<u8>> {
        self.replies.try_lock().ok()?.try_recv().ok()
    }

    /// Ask the worker loop to stop after the messages already queued.
    ///
    /// Returns `false` if the loop had already stopped.
    pub fn terminate(&self) -> bool {
        self.inbox.send(Envelope::Terminate).is_ok()
    }

    /// Returns `true` once the worker loop has dropped its inbox.
    pub fn is_closed(&self) -> bool {
        self.inbox.is_closed()
    }
}
