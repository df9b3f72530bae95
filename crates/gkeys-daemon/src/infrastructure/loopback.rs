//! In-process bus connection.
//!
//! The wire encoding of the host bus (framing, authentication, routing) is
//! supplied by the external bus implementation; this daemon moves
//! already-structured [`Message`] values over a pair of in-process channels.
//! The [`ChannelSink`] is the [`ReplySink`] the dispatcher and completers
//! write to; [`run_pump`] is the connection's single-threaded dispatch loop.

use std::sync::Arc;

use gkeys_core::{
    BusAddress, DispatchError, Dispatcher, Message, MessageKind, ReplySink, SerialCounter,
    SinkError, WireValue,
};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::{debug, error, warn};

// ── Sink ──────────────────────────────────────────────────────────────────────

/// Sends outgoing messages to the peer's receive channel.
pub struct ChannelSink {
    tx: UnboundedSender<Message>,
}

impl ChannelSink {
    pub fn new(tx: UnboundedSender<Message>) -> Self {
        Self { tx }
    }
}

impl ReplySink for ChannelSink {
    fn send(&self, message: Message) -> Result<(), SinkError> {
        self.tx.send(message).map_err(|_| SinkError::Closed)
    }
}

// ── Connection ────────────────────────────────────────────────────────────────

/// Daemon half of a loopback connection.
pub struct ServerEnd {
    /// Messages arriving from clients, in arrival order.
    pub inbound: UnboundedReceiver<Message>,
    /// Outgoing half shared with the dispatcher and every completer.
    pub sink: Arc<dyn ReplySink>,
}

/// Client half of a loopback connection, used by tests and tooling.
pub struct ClientEnd {
    tx: UnboundedSender<Message>,
    /// Replies and signals sent by the daemon.
    pub inbound: UnboundedReceiver<Message>,
    serials: SerialCounter,
}

impl ClientEnd {
    /// Sends a method call; returns the serial to correlate the reply.
    pub fn call(&self, address: BusAddress, body: Vec<WireValue>) -> u32 {
        let serial = self.serials.next();
        let _ = self.tx.send(Message::method_call(address, serial, body));
        serial
    }

    /// Sends a one-way signal.
    pub fn emit_signal(&self, address: BusAddress, body: Vec<WireValue>) {
        let serial = self.serials.next();
        let _ = self.tx.send(Message::signal(address, serial, body));
    }

    /// Waits for the next message from the daemon.
    pub async fn next_message(&mut self) -> Option<Message> {
        self.inbound.recv().await
    }

    /// Waits for the reply (success or error) to the call with `serial`,
    /// buffering nothing: intervening signals are skipped.
    pub async fn reply_for(&mut self, serial: u32) -> Option<Message> {
        while let Some(msg) = self.inbound.recv().await {
            match msg.kind() {
                MessageKind::MethodReturn | MessageKind::Error if msg.serial() == serial => {
                    return Some(msg)
                }
                _ => continue,
            }
        }
        None
    }
}

/// Creates a connected client/server pair.
pub fn loopback() -> (ClientEnd, ServerEnd) {
    let (to_server_tx, to_server_rx) = mpsc::unbounded_channel();
    let (to_client_tx, to_client_rx) = mpsc::unbounded_channel();
    let client = ClientEnd {
        tx: to_server_tx,
        inbound: to_client_rx,
        serials: SerialCounter::new(),
    };
    let server = ServerEnd {
        inbound: to_server_rx,
        sink: Arc::new(ChannelSink::new(to_client_tx)),
    };
    (client, server)
}

// ── Pump ──────────────────────────────────────────────────────────────────────

/// Dispatch loop for one connection: one message at a time, in arrival order.
///
/// Unmatched method calls are answered here – resolving a caller that nobody
/// registered for is the transport layer's duty, not the dispatch core's.
/// The loop ends when the inbound channel closes or the connection becomes
/// unusable (an error reply could not be delivered).
pub async fn run_pump(
    dispatcher: Dispatcher,
    mut inbound: UnboundedReceiver<Message>,
    sink: Arc<dyn ReplySink>,
) {
    while let Some(message) = inbound.recv().await {
        match dispatcher.dispatch(&message) {
            Ok(outcome) => debug!("dispatched serial {}: {outcome:?}", message.serial()),
            Err(DispatchError::HandlerNotFound(address)) => {
                warn!("method call to unregistered member {address}");
                let reply =
                    Message::error_reply(message.serial(), format!("no such member: {address}"));
                if sink.send(reply).is_err() {
                    error!("connection unusable while reporting unknown member; closing");
                    break;
                }
            }
            Err(e @ DispatchError::Unroutable(_)) => debug!("ignoring message: {e}"),
            Err(e @ DispatchError::ErrorReplyFailed { .. }) => {
                error!("connection unusable: {e}; closing");
                break;
            }
        }
    }
    debug!("connection pump stopped");
}

// ── Tests ─────────────────────────────────────────────────────────────────────
