//! Stage-scheduled generation parameters.
//!
//! Story progress (chapter / total) selects a stage, and each stage carries
//! its own sampling parameters:
//! - OPENING up to 10%: stable and inviting
//! - DEVELOPMENT up to 80%: more varied
//! - CLIMAX up to 93%: tense, longer chapters
//! - ENDING: converging, mirrors the outline settings

use serde::{Deserialize, Serialize};
use std::fmt;

use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NovelStage {
    Outline,
    Opening,
    Development,
    Climax,
    Ending,
}

impl fmt::Display for NovelStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            NovelStage::Outline => "outline",
            NovelStage::Opening => "opening",
            NovelStage::Development => "development",
            NovelStage::Climax => "climax",
            NovelStage::Ending => "ending",
        };
        f.write_str(name)
    }
}

/// Sampling parameters handed to the generation collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StageParams {
    pub temperature: f32,
    pub top_p: f32,
    pub repetition_penalty: f32,
    pub max_tokens: u32,
}

impl StageParams {
    pub const fn new(temperature: f32, top_p: f32, repetition_penalty: f32, max_tokens: u32) -> Self {
        Self {
            temperature,
            top_p,
            repetition_penalty,
            max_tokens,
        }
    }
}

/// Upper progress bounds of the first three chapter stages.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StageThresholds {
    pub opening_end: f32,
    pub development_end: f32,
    pub climax_end: f32,
}

impl Default for StageThresholds {
    fn default() -> Self {
        Self {
            opening_end: 0.10,
            development_end: 0.80,
            climax_end: 0.93,
        }
    }
}

/// Per-stage parameters plus the progress thresholds that pick a stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StageSchedule {
    /// When off, every chapter uses the development parameters.
    pub enabled: bool,
    pub thresholds: StageThresholds,
    pub outline: StageParams,
    pub opening: StageParams,
    pub development: StageParams,
    pub climax: StageParams,
    pub ending: StageParams,
}

impl Default for StageSchedule {
    fn default() -> Self {
        Self {
            enabled: true,
            thresholds: StageThresholds::default(),
            outline: StageParams::new(0.68, 0.91, 1.06, 6000),
            opening: StageParams::new(0.65, 0.92, 1.02, 5000),
            development: StageParams::new(0.85, 0.93, 1.03, 5000),
            climax: StageParams::new(0.75, 0.88, 1.03, 6000),
            ending: StageParams::new(0.68, 0.91, 1.06, 5000),
        }
    }
}

impl StageSchedule {
    pub fn params(&self, stage: NovelStage) -> StageParams {
        match stage {
            NovelStage::Outline => self.outline,
            NovelStage::Opening => self.opening,
            NovelStage::Development => self.development,
            NovelStage::Climax => self.climax,
            NovelStage::Ending => self.ending,
        }
    }

    /// Stage for a 1-based chapter number out of `total_chapters`.
    pub fn stage_for(&self, chapter: u32, total_chapters: u32) -> NovelStage {
        if !self.enabled || total_chapters == 0 {
            return NovelStage::Development;
        }
        let progress = chapter as f32 / total_chapters as f32;
        if progress <= self.thresholds.opening_end {
            NovelStage::Opening
        } else if progress <= self.thresholds.development_end {
            NovelStage::Development
        } else if progress <= self.thresholds.climax_end {
            NovelStage::Climax
        } else {
            NovelStage::Ending
        }
    }

    /// Whether `chapter` is the first chapter of its stage.
    pub fn is_transition(&self, chapter: u32, total_chapters: u32) -> bool {
        chapter <= 1
            || self.stage_for(chapter - 1, total_chapters) != self.stage_for(chapter, total_chapters)
    }

    /// Stage and parameters for a chapter.
    pub fn for_chapter(&self, chapter: u32, total_chapters: u32) -> (NovelStage, StageParams) {
        let stage = self.stage_for(chapter, total_chapters);
        let params = self.params(stage);
        if self.is_transition(chapter, total_chapters) {
            info!(
                chapter,
                total_chapters,
                %stage,
                temperature = params.temperature,
                top_p = params.top_p,
                repetition_penalty = params.repetition_penalty,
                max_tokens = params.max_tokens,
                "entering stage"
            );
        }
        debug!(
            chapter,
            total_chapters,
            %stage,
            temperature = params.temperature,
            top_p = params.top_p,
            "stage parameters selected"
        );
        (stage, params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_boundaries() {
        let schedule = StageSchedule::default();

        assert_eq!(schedule.stage_for(1, 100), NovelStage::Opening);
        assert_eq!(schedule.stage_for(10, 100), NovelStage::Opening);
        assert_eq!(schedule.stage_for(11, 100), NovelStage::Development);
        assert_eq!(schedule.stage_for(80, 100), NovelStage::Development);
        assert_eq!(schedule.stage_for(81, 100), NovelStage::Climax);
        assert_eq!(schedule.stage_for(93, 100), NovelStage::Climax);
        assert_eq!(schedule.stage_for(94, 100), NovelStage::Ending);
        assert_eq!(schedule.stage_for(100, 100), NovelStage::Ending);
    }

    #[test]
    fn test_transitions() {
        let schedule = StageSchedule::default();

        assert!(schedule.is_transition(1, 100));
        assert!(!schedule.is_transition(10, 100));
        assert!(schedule.is_transition(11, 100));
        assert!(!schedule.is_transition(50, 100));
        assert!(schedule.is_transition(81, 100));
        assert!(schedule.is_transition(94, 100));

        let disabled = StageSchedule {
            enabled: false,
            ..StageSchedule::default()
        };
        assert!(disabled.is_transition(1, 100));
        assert!(!disabled.is_transition(11, 100));
    }

    #[test]
    fn test_disabled_pins_development() {
        let schedule = StageSchedule {
            enabled: false,
            ..StageSchedule::default()
        };
        let (stage, params) = schedule.for_chapter(1, 100);
        assert_eq!(stage, NovelStage::Development);
        assert_eq!(params, StageParams::new(0.85, 0.93, 1.03, 5000));
    }

    #[test]
    fn test_zero_total_is_development() {
        assert_eq!(StageSchedule::default().stage_for(3, 0), NovelStage::Development);
    }

    #[test]
    fn test_climax_gets_longer_chapters() {
        let schedule = StageSchedule::default();
        let (_, params) = schedule.for_chapter(85, 100);
        assert_eq!(params.max_tokens, 6000);

        let outline = schedule.params(NovelStage::Outline);
        let ending = schedule.params(NovelStage::Ending);
        assert_eq!(outline.temperature, ending.temperature);
        assert_eq!(outline.repetition_penalty, ending.repetition_penalty);
        assert!(outline.max_tokens > ending.max_tokens);
    }
}
