//! View models folded from envelopes, one per dashboard surface.
//!
//! Reducers do no I/O and read no clocks. Callers pass the current wall time
//! and monotonic instant, and perform any HTTP work a reducer asks for.

pub mod activity;
pub mod counters;
pub mod media;

pub use activity::{ActivityView, FocusedApp};
pub use counters::{CountersSource, CountersView};
pub use media::{MediaView, RefreshTicket};
