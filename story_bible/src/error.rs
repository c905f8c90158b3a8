//! Errors raised when a mutation would break a narrative invariant.

use thiserror::Error;

use crate::entities::{ChapterId, UnitId};

#[derive(Debug, Error)]
pub enum StateError {
    #[error("unknown unit {0}")]
    UnknownUnit(UnitId),

    #[error("unknown chapter {0}")]
    UnknownChapter(ChapterId),

    #[error("unknown character '{0}'")]
    UnknownCharacter(String),

    #[error("character '{0}' is already registered")]
    DuplicateCharacter(String),

    #[error("unit {0} is closed")]
    UnitClosed(u32),

    #[error("unit {unit_ordinal} already holds {cap} chapters")]
    UnitFull { unit_ordinal: u32, cap: u32 },

    #[error("a summary for unit {0} already exists")]
    DuplicateSummary(UnitId),

    #[error("unit {0} must be closed before it can be summarized")]
    UnitNotClosed(u32),

    #[error("dead character '{0}' cannot return without a flashback exception")]
    ResurrectionForbidden(String),

    #[error("timeline marker '{label}' at {position} precedes the established position {current}")]
    TimelineRegression {
        label: String,
        position: i64,
        current: i64,
    },

    #[error("unknown plot thread '{0}'")]
    UnknownThread(String),

    #[error("persistence failure: {0}")]
    Persistence(String),
}
