//! Pipeline lifecycle control.
//!
//! [`Pipeline`] wraps an engine-owned element graph and drives its
//! four-state lifecycle: construction (empty or from a launch
//! description), transition requests in fire-and-forget and blocking
//! flavors, bus auto-flush policy, and exactly-once teardown. Completion
//! waiting lives in [`Pipeline::wait`].
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use sluice::prelude::*;
//!
//! let engine: Arc<dyn Engine> = Arc::new(MockEngine::new());
//! let pipeline = Pipeline::from_description(engine, "filesrc location=in.bin ! decode ! sink")?;
//! pipeline.start()?;
//! match pipeline.wait().await {
//!     WaitOutcome::Eos => println!("finished"),
//!     WaitOutcome::Error(e) => eprintln!("failed: {e}"),
//!     WaitOutcome::TornDown => println!("stopped early"),
//! }
//! pipeline.destroy()?;
//! ```

mod wait;

pub use wait::WaitOutcome;

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::watch;
use tracing::{debug, warn};

use crate::bus::Bus;
use crate::clock::Clock;
use crate::engine::{Engine, GraphHandle};
use crate::error::{Error, Result};
use crate::state::State;

/// An engine-backed pipeline with an explicit four-state lifecycle.
///
/// All methods take `&self` and are safe to call from multiple threads:
/// the authoritative state lives in the engine, never in caller-side
/// fields, and teardown is guarded by an atomic released flag.
pub struct Pipeline {
    engine: Arc<dyn Engine>,
    handle: GraphHandle,
    name: Option<String>,
    released: AtomicBool,
    /// Flipped to `true` once the pipeline is confirmed at Null, so a
    /// waiter can block on it instead of polling.
    shutdown: watch::Sender<bool>,
}

impl Pipeline {
    /// Allocate a new empty pipeline. With an empty `name` the engine
    /// generates one.
    pub fn new(engine: Arc<dyn Engine>, name: &str) -> Result<Self> {
        let handle = engine.new_graph(name)?;
        let name = (!name.is_empty()).then(|| name.to_string());
        Ok(Self::wrap(engine, handle, name))
    }

    /// Build a pipeline from a launch description.
    ///
    /// A description must chain at least two stages with `!`; anything
    /// shorter fails with [`Error::Validation`] before the engine parser
    /// ever runs. Parser rejections surface as [`Error::Parse`] with the
    /// engine diagnostic verbatim.
    pub fn from_description(engine: Arc<dyn Engine>, description: &str) -> Result<Self> {
        if description.split('!').count() < 2 {
            return Err(Error::Validation(format!(
                "description is too short for a pipeline: {description}"
            )));
        }
        let handle = engine.parse_description(description)?;
        Ok(Self::wrap(engine, handle, None))
    }

    fn wrap(engine: Arc<dyn Engine>, handle: GraphHandle, name: Option<String>) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            engine,
            handle,
            name,
            released: AtomicBool::new(false),
            shutdown,
        }
    }

    /// Caller-supplied name, if one was given at construction.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Engine-side graph handle.
    pub fn handle(&self) -> GraphHandle {
        self.handle
    }

    /// Whether [`destroy`](Pipeline::destroy) has released this pipeline.
    pub fn is_destroyed(&self) -> bool {
        self.released.load(Ordering::Acquire)
    }

    /// Authoritative current state, re-read from the engine on every
    /// call.
    ///
    /// A destroyed pipeline reports [`State::Null`].
    pub fn state(&self) -> State {
        if self.is_destroyed() {
            return State::Null;
        }
        self.engine.state(self.handle)
    }

    /// Request a transition without waiting for it to apply.
    ///
    /// Returning `Ok` means the engine accepted the request, not that
    /// the transition has completed.
    pub fn set_state(&self, target: State) -> Result<()> {
        self.guard_live(target)?;
        self.engine.set_state(self.handle, target)
    }

    /// Request a transition and block the calling thread until the
    /// engine confirms it fully applied.
    ///
    /// This is the variant teardown needs: after it returns, the engine
    /// has committed the transition.
    pub fn block_set_state(&self, target: State) -> Result<()> {
        self.guard_live(target)?;
        self.engine.set_state_blocking(self.handle, target)?;
        if target == State::Null {
            self.shutdown.send_replace(true);
        }
        Ok(())
    }

    /// Convenience for `set_state(State::Playing)`.
    pub fn start(&self) -> Result<()> {
        self.set_state(State::Playing)
    }

    /// Drive the pipeline to Null, then release the graph.
    ///
    /// Idempotent: destroying an already-destroyed pipeline is an `Ok`
    /// no-op and never double-releases. On failure the handle stays
    /// unreleased and the call can be retried.
    pub fn destroy(&self) -> Result<()> {
        if self.is_destroyed() {
            return Ok(());
        }
        self.engine.set_state_blocking(self.handle, State::Null)?;
        self.shutdown.send_replace(true);
        if !self.released.swap(true, Ordering::AcqRel) {
            debug!(
                pipeline = self.name.as_deref().unwrap_or("<engine-named>"),
                "destroying pipeline"
            );
            self.engine.release_graph(self.handle);
        }
        Ok(())
    }

    /// Message bus view.
    pub fn bus(&self) -> Bus {
        Bus::new(self.engine.clone(), self.handle)
    }

    /// Pipeline clock view.
    pub fn clock(&self) -> Clock {
        Clock::new(self.engine.clock(self.handle))
    }

    /// Control whether reaching Null discards messages still pending on
    /// the bus.
    ///
    /// Enabled by default: the engine flushes the bus when the pipeline
    /// reaches Null, which breaks the reference cycles it would
    /// otherwise need to keep for cleanup. An application that relies on
    /// late bus messages (say, the final `StateChanged` of a shutdown)
    /// may never see them under auto-flush.
    ///
    /// When disabled, every message ever published must be drained and
    /// released by the caller for the lifetime of the bus, or the
    /// payloads leak. That trade-off is the caller's to make.
    pub fn set_auto_flush(&self, enabled: bool) {
        self.engine.set_auto_flush(self.handle, enabled);
    }

    fn guard_live(&self, target: State) -> Result<()> {
        if self.is_destroyed() {
            return Err(Error::StateChange {
                target,
                reason: "pipeline already destroyed".into(),
            });
        }
        Ok(())
    }

    pub(crate) fn shutdown_signal(&self) -> watch::Receiver<bool> {
        self.shutdown.subscribe()
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        if !self.released.swap(true, Ordering::AcqRel) {
            warn!(
                pipeline = self.name.as_deref().unwrap_or("<engine-named>"),
                "pipeline dropped without destroy; releasing graph"
            );
            self.engine.release_graph(self.handle);
        }
    }
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("name", &self.name)
            .field("handle", &self.handle)
            .field("destroyed", &self.is_destroyed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::MockEngine;

    fn engine() -> Arc<MockEngine> {
        Arc::new(MockEngine::new())
    }

    #[test]
    fn test_empty_name_is_engine_generated() {
        let engine = engine();
        let pipeline = Pipeline::new(engine.clone(), "").unwrap();
        assert_eq!(pipeline.name(), None);
        assert_eq!(
            engine.graph_name(pipeline.handle()).as_deref(),
            Some("pipeline0")
        );
    }

    #[test]
    fn test_short_description_never_reaches_engine() {
        let engine = engine();
        for description in ["", "source", "  lone-stage prop=1  "] {
            assert!(matches!(
                Pipeline::from_description(engine.clone(), description),
                Err(Error::Validation(_))
            ));
        }
        assert_eq!(engine.parse_calls(), 0);
    }

    #[test]
    fn test_description_stage_count_recorded() {
        let engine = engine();
        let pipeline =
            Pipeline::from_description(engine.clone(), "src ! mid ! sink").unwrap();
        assert_eq!(engine.stage_count(pipeline.handle()), 3);
    }

    #[test]
    fn test_operations_fail_fast_after_destroy() {
        let engine = engine();
        let pipeline = Pipeline::new(engine.clone(), "doomed").unwrap();
        pipeline.destroy().unwrap();

        assert!(matches!(
            pipeline.start(),
            Err(Error::StateChange { .. })
        ));
        assert!(matches!(
            pipeline.block_set_state(State::Ready),
            Err(Error::StateChange { .. })
        ));
        assert_eq!(pipeline.state(), State::Null);
    }

    #[test]
    fn test_drop_without_destroy_releases_graph() {
        let engine = engine();
        let handle = {
            let pipeline = Pipeline::new(engine.clone(), "leaky").unwrap();
            pipeline.handle()
        };
        assert_eq!(engine.release_count(handle), 1);
        assert!(!engine.graph_alive(handle));
    }

    #[test]
    fn test_destroy_then_drop_releases_once() {
        let engine = engine();
        let handle = {
            let pipeline = Pipeline::new(engine.clone(), "tidy").unwrap();
            pipeline.destroy().unwrap();
            pipeline.handle()
        };
        assert_eq!(engine.release_count(handle), 1);
    }
}
