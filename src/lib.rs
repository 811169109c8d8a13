//! # Sluice
//!
//! Lifecycle control and completion waiting for engine-backed streaming
//! pipelines.
//!
//! A media engine (reached through the [`engine::Engine`] trait) owns
//! the element graph, executes state transitions, and publishes messages
//! on a bus. Sluice layers the part a host application actually
//! interacts with on top of that black box:
//!
//! - **State machine**: the four-state lifecycle `Null → Ready → Paused
//!   → Playing`, with fire-and-forget and blocking transition requests
//! - **Bus**: an ordered, at-most-once message stream pumped off the
//!   engine, with release-on-drop payload discipline
//! - **Completion waiting**: one blocking call reconciling end-of-stream,
//!   engine errors, and external teardown into a single
//!   [`pipeline::WaitOutcome`]
//! - **Teardown**: exactly-once graph release with auto-flush policy
//!   control
//!
//! ## Quick start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use sluice::prelude::*;
//!
//! let engine: Arc<dyn Engine> = Arc::new(MockEngine::new());
//! let pipeline = Pipeline::from_description(engine, "filesrc location=in.bin ! decode ! sink")?;
//! pipeline.start()?;
//! match pipeline.wait().await {
//!     WaitOutcome::Eos => println!("done"),
//!     WaitOutcome::Error(e) => eprintln!("failed: {e}"),
//!     WaitOutcome::TornDown => println!("stopped early"),
//! }
//! pipeline.destroy()?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![forbid(unsafe_code)]

pub mod bus;
pub mod clock;
pub mod engine;
pub mod error;
pub mod message;
pub mod pipeline;
pub mod state;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::bus::{Bus, MessageStream};
    pub use crate::clock::Clock;
    pub use crate::engine::{Engine, MockEngine};
    pub use crate::error::{Error, Result};
    pub use crate::message::{Message, MessageKind};
    pub use crate::pipeline::{Pipeline, WaitOutcome};
    pub use crate::state::State;
}

pub use error::{Error, Result};
