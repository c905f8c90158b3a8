//! # Narrative Core (The Cortex)
//!
//! The context and consistency engine for long-form generation. This crate
//! reads and extends the narrative state kept by `story_bible`, assembles the
//! context for each new chapter under a token budget, validates generated text
//! against established facts, and decides when a volume is complete.
//!
//! ## Core Components
//!
//! - **context_assembler**: Tiered history, pyramid digest, retrieval and budget allocation
//! - **consistency**: Independent checks for characters, timeline, setting and plot threads
//! - **boundary**: Multi-signal volume completion detection
//! - **engine**: `ContextEngine`, the orchestrator driven by the generation loop
//! - **collaborators**: Contracts for generation, similarity search and goal judgement
//!
//! ## Design Philosophy
//!
//! - **State-Driven**: Every context and verdict derives from the committed narrative state
//! - **Fail Loudly**: Violated guarantees surface as errors instead of silent repairs
//! - **Extensible**: New consistency checks plug in without touching the engine

pub mod boundary;
pub mod collaborators;
pub mod config;
pub mod consistency;
pub mod context_assembler;
pub mod engine;
pub mod error;
pub mod ingest;
pub mod outline;
pub mod stage;
pub mod text;

pub use boundary::*;
pub use collaborators::*;
pub use config::*;
pub use consistency::*;
pub use context_assembler::*;
pub use engine::*;
pub use error::{EngineError, Result};
pub use ingest::*;
pub use outline::*;
pub use stage::*;
