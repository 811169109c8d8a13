//! Completion waiting.
//!
//! [`Pipeline::wait`] reconciles two independent signals into one
//! terminal decision: the bus (an end-of-stream or error message) and
//! the state machine (the pipeline driven to Null, possibly by a
//! concurrent [`Pipeline::destroy`] on another task). Waiting on only
//! one of them can hang forever: a pipeline torn down before finishing
//! never posts EOS, and with auto-flush enabled the message may be
//! discarded during the Null transition before anyone reads it.

use std::time::Duration;

use tracing::debug;

use super::Pipeline;
use crate::message::MessageKind;
use crate::state::State;

/// How often the waiter re-reads authoritative state. Covers Null
/// transitions the engine performs without going through this facade.
const STATE_RECHECK: Duration = Duration::from_millis(10);

/// Terminal condition that ended a [`Pipeline::wait`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WaitOutcome {
    /// The pipeline posted end-of-stream: all data was processed.
    Eos,
    /// The pipeline posted an error; the engine diagnostic is attached.
    Error(String),
    /// The pipeline was driven to Null (or was already gone) before
    /// finishing.
    TornDown,
}

impl Pipeline {
    /// Block until the pipeline reaches end-of-stream, posts an error,
    /// or is driven to Null.
    ///
    /// The wait is unbounded: if no terminal signal ever fires it never
    /// returns. Callers wanting a bound race it externally (e.g.
    /// `tokio::time::timeout`); abandoning the wait leaves the pipeline
    /// in whatever state the engine reports.
    ///
    /// Non-terminal messages (`StateChanged`, unclassified) are observed,
    /// released, and discarded.
    pub async fn wait(&self) -> WaitOutcome {
        if self.is_destroyed() || self.state() == State::Null {
            return WaitOutcome::TornDown;
        }

        let mut messages = self.bus().messages();
        let mut shutdown = self.shutdown_signal();
        let mut recheck = tokio::time::interval(STATE_RECHECK);

        loop {
            tokio::select! {
                msg = messages.recv() => match msg {
                    Some(msg) => match msg.kind() {
                        MessageKind::Eos => {
                            debug!("wait finished: end of stream");
                            return WaitOutcome::Eos;
                        }
                        MessageKind::Error => {
                            let detail = msg
                                .detail()
                                .unwrap_or("unspecified engine error")
                                .to_string();
                            debug!(detail = %detail, "wait finished: engine error");
                            return WaitOutcome::Error(detail);
                        }
                        MessageKind::StateChanged { .. } | MessageKind::Other => {}
                    },
                    // Stream closed: the graph is gone.
                    None => return WaitOutcome::TornDown,
                },
                _ = shutdown.changed() => {
                    if *shutdown.borrow_and_update() {
                        debug!("wait finished: pipeline torn down");
                        return WaitOutcome::TornDown;
                    }
                }
                _ = recheck.tick() => {
                    if self.is_destroyed() || self.state() == State::Null {
                        return WaitOutcome::TornDown;
                    }
                }
            }
        }
    }
}
