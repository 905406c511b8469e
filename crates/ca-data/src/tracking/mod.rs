//! Change Tracking
//!
//! Every entity a session knows about lives in a [`TrackedEntry`]: the
//! owned entity, its state, the row it had when it was last saved or loaded,
//! and the row it has now. [`ChangeTracker`] owns the entries and keeps an
//! identity map so one stored row maps to at most one entry.

mod entry;
mod tracker;

pub use entry::{EntityState, EntryId, PropertyEntry, TrackedEntry};
pub use tracker::ChangeTracker;

pub(crate) use entry::key_string;
