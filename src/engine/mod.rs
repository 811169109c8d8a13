//! The external media engine driven by this crate.
//!
//! The engine owns element graphs, executes state transitions, and
//! publishes messages; Sluice only requests work through the [`Engine`]
//! trait and never reaches into engine internals. Element construction,
//! format negotiation and the data path are entirely the engine's
//! business.
//!
//! # Handles
//!
//! Every engine resource is addressed by a generational arena index
//! wrapped in a typed handle. A released handle stays resolvable but
//! dead, so stale use is detectable instead of undefined behavior.
//!
//! # Initialization
//!
//! Engines that need process-wide setup perform it in their constructor:
//! an [`Engine`] value *is* the initialized runtime. Construct it once,
//! share it via [`Arc`](std::sync::Arc), and drop the last clone to tear
//! the runtime down. There is no ambient global state in this layer.

mod mock;

pub use mock::MockEngine;

use thunderdome::Index;

use crate::error::Result;
use crate::message::MessageKind;
use crate::state::State;

/// Handle to an element graph owned by an engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GraphHandle(pub(crate) Index);

/// Handle to the message bus of a graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BusHandle(pub(crate) Index);

/// Handle to the clock of a graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClockHandle(pub(crate) Index);

/// Handle to the payload of a single bus message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MessageHandle(pub(crate) Index);

/// A message as produced by an engine, before the core takes ownership.
///
/// [`Bus`](crate::bus::Bus) wraps raw messages into owning
/// [`Message`](crate::message::Message)s that release the payload on
/// drop.
#[derive(Debug)]
pub struct RawMessage {
    /// Engine-side payload handle. The consumer releases it exactly once.
    pub handle: MessageHandle,
    /// Classification, immutable once produced.
    pub kind: MessageKind,
    /// Diagnostic text, if any (error messages).
    pub detail: Option<String>,
}

/// Interface the lifecycle layer needs from a media engine.
///
/// All methods are expected to be cheap and non-blocking except
/// [`set_state_blocking`](Engine::set_state_blocking). Implementations
/// must be safe to call from multiple threads; the authoritative pipeline
/// state lives behind this trait, never in caller-side fields.
pub trait Engine: Send + Sync + 'static {
    /// Allocate a new empty graph. An empty `name` lets the engine pick
    /// one.
    fn new_graph(&self, name: &str) -> Result<GraphHandle>;

    /// Parse a launch description into a graph. Parser diagnostics are
    /// surfaced verbatim through [`Error::Parse`](crate::Error::Parse).
    fn parse_description(&self, description: &str) -> Result<GraphHandle>;

    /// Request a transition without waiting for it to apply.
    fn set_state(&self, graph: GraphHandle, target: State) -> Result<()>;

    /// Request a transition and block the calling thread until the engine
    /// confirms it fully applied.
    fn set_state_blocking(&self, graph: GraphHandle, target: State) -> Result<()>;

    /// Authoritative current state. Released graphs report
    /// [`State::Null`].
    fn state(&self, graph: GraphHandle) -> State;

    /// Whether the graph is still allocated and unreleased.
    fn graph_alive(&self, graph: GraphHandle) -> bool;

    /// The graph's message bus.
    fn bus(&self, graph: GraphHandle) -> BusHandle;

    /// The graph's clock.
    fn clock(&self, graph: GraphHandle) -> ClockHandle;

    /// Control whether reaching [`State::Null`] discards messages still
    /// pending on the bus.
    fn set_auto_flush(&self, graph: GraphHandle, enabled: bool);

    /// Take the next pending message off a bus, if any. Never blocks.
    fn poll_message(&self, bus: BusHandle) -> Option<RawMessage>;

    /// Release a message payload. Exactly once per message.
    fn release_message(&self, message: MessageHandle);

    /// Release a graph and everything it owns. Exactly once per graph.
    fn release_graph(&self, graph: GraphHandle);
}
