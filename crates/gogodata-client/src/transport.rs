//! The host message channel.

use async_trait::async_trait;
use gogodata_core::HostRequest;
use serde_json::Value;
use tokio::sync::oneshot;

/// A request/reply channel to the host.
///
/// `call` resolves to `None` when the host never replies within the
/// transport's own timeout.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn call(&self, message: Value) -> Option<Value>;

    /// Release the underlying channel. Later calls may return `None`.
    fn close(&self) {}
}

/// A host-initiated request waiting for the plugin's reply.
#[derive(Debug)]
pub struct HostCall {
    pub message: Value,
    reply: oneshot::Sender<Value>,
}

impl HostCall {
    pub fn new(message: Value) -> (Self, oneshot::Receiver<Value>) {
        let (reply, rx) = oneshot::channel();
        (Self { message, reply }, rx)
    }

    /// Decode the message as a host request.
    pub fn request(&self) -> Result<HostRequest, serde_json::Error> {
        serde_json::from_value(self.message.clone())
    }

    /// Send the reply back to the host.
    pub fn respond(self, reply: Value) {
        // The transport may have gone away; nothing to do then.
        let _ = self.reply.send(reply);
    }
}

/// A transport backed by a synchronous closure.
///
/// Useful for in-process hosts and the daemon's standalone mode.
pub struct FnTransport<F> {
    handler: F,
}

impl<F> FnTransport<F>
where
    F: Fn(Value) -> Option<Value> + Send + Sync,
{
    pub fn new(handler: F) -> Self {
        Self { handler }
    }
}

#[async_trait]
impl<F> Transport for FnTransport<F>
where
    F: Fn(Value) -> Option<Value> + Send + Sync,
{
    async fn call(&self, message: Value) -> Option<Value> {
        (self.handler)(message)
    }
}
