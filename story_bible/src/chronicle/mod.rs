//! Chronicle module - append-only narrative records.
//!
//! - **Timeline**: Ordered time markers; non-decreasing outside flashbacks
//! - **Setting**: First-established descriptions of locations, objects and rules
//! - **Plot**: Threads that open, and later resolve, across chapters

mod plot;
mod setting;
mod timeline;

pub use plot::*;
pub use setting::*;
pub use timeline::*;
