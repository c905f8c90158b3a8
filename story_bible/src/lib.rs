//! # Story Bible
//!
//! The canonical narrative state for long-form generation. This crate is the
//! single source of truth for volumes, chapters, summaries, characters,
//! timeline, setting and plot threads, and does not contain any generation
//! logic.
//!
//! ## Core Components
//!
//! - **entities**: Volumes (units), chapters, summaries and character profiles
//! - **chronicle**: Append-only narrative records (timeline, setting facts, plot threads)
//! - **state_store**: `NarrativeStateStore`, the owner of every persistent entity
//! - **persistence**: Key-addressed storage contract for snapshots

pub mod chronicle;
pub mod entities;
pub mod error;
pub mod persistence;
pub mod state_store;

pub use chronicle::*;
pub use entities::*;
pub use error::*;
pub use persistence::*;
pub use state_store::*;
