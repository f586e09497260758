//! Condominium directory and record stores: units/residents, visits,
//! and resident notifications.
//!
//! All stores are in-memory maps guarded by locks, seeded from or
//! persisted to plain JSON/JSONL files under the configured state path.
//! They are deliberately simple: the gateway runs as a single process,
//! and the stores can be swapped for a shared backend without touching
//! the concierge core.

pub mod notifications;
pub mod units;
pub mod visits;

pub use notifications::{Notification, NotificationEvent, NotificationStore};
pub use units::{Resident, Unit, UnitDirectory};
pub use visits::{NewVisit, Visit, VisitKind, VisitStatus, VisitStore};
