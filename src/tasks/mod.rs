//! Background Tasks Module
//!
//! Lifecycle management for periodic background work. Cleanup timers are
//! explicitly owned resources with a create/stop lifecycle; there is no
//! implicit process-wide state.

mod cleanup;

pub use cleanup::CleanupHandle;
pub(crate) use cleanup::CleanupSlot;
