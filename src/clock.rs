//! Opaque pipeline clock view.

use crate::engine::ClockHandle;

/// Read-only reference to a pipeline's timing source.
///
/// Sluice never interprets engine time. The handle exists so a host can
/// hand it to engine-specific APIs; it carries no lifecycle of its own
/// and must not be used after the owning pipeline is destroyed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Clock {
    handle: ClockHandle,
}

impl Clock {
    pub(crate) fn new(handle: ClockHandle) -> Self {
        Self { handle }
    }

    /// The engine-side clock handle.
    pub fn handle(&self) -> ClockHandle {
        self.handle
    }
}
