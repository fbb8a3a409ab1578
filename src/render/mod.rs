//! Observer-side presentation helpers.
//!
//! Pure functions over a [`JobRecord`](crate::job::JobRecord), applied when
//! a record is displayed.  Stored results are never rewritten.

pub mod format;
pub mod status;

pub use format::format_key_points;
pub use status::{render_result, StatusLine};
