//! Classified messages delivered over a pipeline bus.

use std::fmt;
use std::sync::Arc;

use crate::engine::{Engine, MessageHandle, RawMessage};
use crate::state::State;

/// Classification of a bus message, fixed at production time by the
/// engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    /// All data has been processed. The terminal success signal.
    Eos,
    /// The engine reported a runtime failure; the diagnostic is available
    /// through [`Message::detail`].
    Error,
    /// A lifecycle transition completed.
    StateChanged {
        /// State before the transition.
        from: State,
        /// State after the transition.
        to: State,
    },
    /// Any engine message this layer does not interpret.
    Other,
}

/// A message taken off an engine bus.
///
/// A message is single-owner: whoever pulls it off a stream holds the
/// engine-side payload, and dropping the message releases that payload
/// back to the engine. Move semantics make a double release
/// unrepresentable.
pub struct Message {
    engine: Arc<dyn Engine>,
    handle: MessageHandle,
    kind: MessageKind,
    detail: Option<String>,
}

impl Message {
    pub(crate) fn new(engine: Arc<dyn Engine>, raw: RawMessage) -> Self {
        Self {
            engine,
            handle: raw.handle,
            kind: raw.kind,
            detail: raw.detail,
        }
    }

    /// The message classification.
    pub fn kind(&self) -> MessageKind {
        self.kind
    }

    /// Diagnostic text, if the engine attached any (error messages do).
    pub fn detail(&self) -> Option<&str> {
        self.detail.as_deref()
    }

    /// The engine-side payload handle.
    pub fn handle(&self) -> MessageHandle {
        self.handle
    }
}

impl Drop for Message {
    fn drop(&mut self) {
        self.engine.release_message(self.handle);
    }
}

impl fmt::Debug for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Message")
            .field("kind", &self.kind)
            .field("detail", &self.detail)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::MockEngine;

    #[test]
    fn test_drop_releases_payload() {
        let engine = Arc::new(MockEngine::new());
        let graph = engine.new_graph("msg-test").unwrap();
        engine.emit_eos(graph);
        assert_eq!(engine.outstanding_messages(), 1);

        let raw = engine.poll_message(engine.bus(graph)).unwrap();
        let msg = Message::new(engine.clone(), raw);
        assert_eq!(msg.kind(), MessageKind::Eos);
        assert_eq!(engine.outstanding_messages(), 1);

        drop(msg);
        assert_eq!(engine.outstanding_messages(), 0);
    }

    #[test]
    fn test_error_detail_preserved() {
        let engine = Arc::new(MockEngine::new());
        let graph = engine.new_graph("msg-test").unwrap();
        engine.emit_error(graph, "decoder gave up");

        let raw = engine.poll_message(engine.bus(graph)).unwrap();
        let msg = Message::new(engine.clone(), raw);
        assert_eq!(msg.kind(), MessageKind::Error);
        assert_eq!(msg.detail(), Some("decoder gave up"));
    }
}
