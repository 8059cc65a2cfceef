//! Mission process supervision for the envmon field device.
//!
//! At most one mission process runs at a time. The supervisor launches
//! it, tracks it in a PID file, signals it on stop/abort, reaps it when it
//! exits, and heals the persisted device state whenever it disagrees
//! with the process table.

pub mod control;
pub mod error;
pub mod guard;
pub mod launcher;
pub mod liveness;
pub mod reaper;
pub mod reconciler;
pub mod registry;
pub mod supervisor;
#[cfg(test)]
mod testing;

pub use control::{signal_group, MissionSignal};
pub use error::{Result, SupervisorError};
pub use guard::{LaunchGuard, LaunchLock};
pub use launcher::LaunchReceipt;
pub use liveness::{Liveness, OsProcessProbe, ProcessProbe};
pub use reaper::{ReapOutcome, Reaper, REAPER_WARNING};
pub use reconciler::{MissionListing, StatusSnapshot, STALE_STATE_WARNING};
pub use registry::ProcessRegistry;
pub use supervisor::MissionSupervisor;
