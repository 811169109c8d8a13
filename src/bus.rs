//! Bus views and pumped message streams.
//!
//! A [`Bus`] is a read-shared view of one graph's message bus: handles
//! plus an engine reference, looked up on every call, owning nothing.
//! [`Bus::messages`] derives a [`MessageStream`]: a background task
//! drains the engine bus into a bounded channel so consumers get a
//! blocking receive over an interface the engine only exposes as a
//! non-blocking poll.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use kanal::{AsyncReceiver, bounded_async};
use tokio::task::JoinHandle;
use tracing::trace;

use crate::engine::{BusHandle, Engine, GraphHandle};
use crate::message::Message;

/// How long the pump sleeps when the engine bus is empty.
const PUMP_IDLE: Duration = Duration::from_millis(2);

/// Pump channel depth. Bounded so a stalled consumer exerts backpressure
/// on the pump instead of growing memory.
const STREAM_CAPACITY: usize = 64;

/// Read-shared view of a graph's message bus.
///
/// The bus never owns graph resources; it must not be used to keep a
/// pipeline alive.
#[derive(Clone)]
pub struct Bus {
    engine: Arc<dyn Engine>,
    graph: GraphHandle,
    handle: BusHandle,
}

impl Bus {
    pub(crate) fn new(engine: Arc<dyn Engine>, graph: GraphHandle) -> Self {
        let handle = engine.bus(graph);
        Self {
            engine,
            graph,
            handle,
        }
    }

    /// The engine-side bus handle.
    pub fn handle(&self) -> BusHandle {
        self.handle
    }

    /// Take the next pending message without blocking.
    pub fn try_pop(&self) -> Option<Message> {
        self.engine
            .poll_message(self.handle)
            .map(|raw| Message::new(self.engine.clone(), raw))
    }

    /// Derive a consumable message stream.
    ///
    /// Messages arrive in emission order and are delivered at most once
    /// per stream. The stream closes once the graph is gone and
    /// everything still pending has been handed out. One logical
    /// consumer per derived stream; deriving two streams from the same
    /// bus splits messages between them rather than duplicating.
    ///
    /// Spawns the pump task, so this must be called from within a tokio
    /// runtime.
    pub fn messages(&self) -> MessageStream {
        let (tx, rx) = bounded_async(STREAM_CAPACITY);
        let engine = self.engine.clone();
        let graph = self.graph;
        let handle = self.handle;

        let pump = tokio::spawn(async move {
            loop {
                match engine.poll_message(handle) {
                    Some(raw) => {
                        let msg = Message::new(engine.clone(), raw);
                        if tx.send(msg).await.is_err() {
                            // Consumer went away.
                            break;
                        }
                    }
                    None if !engine.graph_alive(graph) => break,
                    None => tokio::time::sleep(PUMP_IDLE).await,
                }
            }
            trace!("bus pump finished");
        });

        MessageStream { rx, pump }
    }
}

impl fmt::Debug for Bus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bus")
            .field("graph", &self.graph)
            .field("handle", &self.handle)
            .finish()
    }
}

/// Ordered stream of messages pumped off an engine bus.
///
/// Dropping the stream stops the pump; messages still queued inside it
/// are released back to the engine.
pub struct MessageStream {
    rx: AsyncReceiver<Message>,
    pump: JoinHandle<()>,
}

impl MessageStream {
    /// Receive the next message.
    ///
    /// Returns `None` once the graph is dead and the stream is drained.
    pub async fn recv(&mut self) -> Option<Message> {
        self.rx.recv().await.ok()
    }

    /// Receive without waiting. `None` means nothing is ready right now,
    /// not that the stream has ended.
    pub fn try_recv(&mut self) -> Option<Message> {
        self.rx.try_recv().ok().flatten()
    }
}

impl Drop for MessageStream {
    fn drop(&mut self) {
        self.pump.abort();
    }
}

impl futures::Stream for MessageStream {
    type Item = Message;

    fn poll_next(
        self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Option<Self::Item>> {
        let fut = self.rx.recv();
        tokio::pin!(fut);
        fut.poll(cx).map(|r| r.ok())
    }
}
