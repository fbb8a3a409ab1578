//! Shared state store: the durable, observable record of every job's status.
//!
//! ```text
//! Orchestrator ──merge_patch──▶ StateStore ──StoreChange──▶ subscriber 1
//!                                  │        ──StoreChange──▶ subscriber 2
//!                                  ▼
//!                             jobs.json (optional)
//! ```

pub mod change;
pub mod persist;
pub mod state;

pub use change::{FieldChange, Patch, StoreChange, StoreState};
pub use persist::StoreError;
pub use state::{StateStore, Subscription};
