//! Chapter outline validation: repetition, irreversible events, conflict
//! intensity and character growth.

use serde::{Deserialize, Serialize};
use std::fmt;

use tracing::info;

use crate::text::{contains_phrase, term_set};

/// Events the story cannot walk back once they happen.
const IRREVERSIBLE: &[&str] = &[
    "死亡", "身亡", "喪命", "殺死", "犧牲", "摧毀", "毀滅", "崩潰", "覆滅", "背叛", "決裂", "訣別",
    "重傷", "殘廢", "失明", "失憶", "曝光", "揭露", "公開", "突破", "頓悟", "覺醒", "dies", "died",
    "killed", "sacrificed", "sacrifices", "destroyed", "destroys", "betrayed", "betrays",
    "crippled", "blinded", "loses their memory", "exposed", "revealed", "breakthrough",
    "awakens", "awakened",
];

const CONFLICT_LOW: &[&str] = &[
    "遇見", "對話", "思考", "計劃", "準備", "觀察", "發現", "meets", "talks", "plans", "prepares",
    "observes", "discovers",
];

const CONFLICT_MEDIUM: &[&str] = &[
    "爭執", "質疑", "懷疑", "挑戰", "對抗", "抵抗", "argues", "questions", "doubts", "challenges",
    "confronts", "resists",
];

const CONFLICT_HIGH: &[&str] = &[
    "戰鬥", "決戰", "生死", "危機", "絕境", "崩潰", "背叛", "battle", "duel", "life or death",
    "crisis", "cornered", "collapse", "betrayal",
];

const GROWTH: &[&str] = &[
    "領悟", "覺醒", "突破", "掌握", "理解", "成長", "進步", "提升", "變強", "決心", "覺悟", "改變",
    "realizes", "awakens", "breakthrough", "masters", "understands", "grows", "improves",
    "grows stronger", "resolves to", "changes",
];

/// Normalisation divisor of the raw conflict score.
const CONFLICT_SCALE: f32 = 5.0;

const MIN_OUTLINE_CHARS: usize = 50;

fn found_in(outline: &str, keywords: &[&'static str]) -> Vec<&'static str> {
    keywords
        .iter()
        .copied()
        .filter(|keyword| contains_phrase(outline, keyword))
        .collect()
}

/// Jaccard similarity of the term sets of two texts.
pub fn jaccard(a: &str, b: &str) -> f32 {
    let (a, b) = (term_set(a), term_set(b));
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let shared = a.intersection(&b).count();
    let union = a.union(&b).count();
    shared as f32 / union as f32
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum OutlineWarning {
    /// Too close to earlier chapters (1-based chapter numbers).
    Repetitive { chapters: Vec<usize>, similarity: f32 },
    Irreversible { events: Vec<String> },
    LowConflict { intensity: f32 },
    NoGrowth,
    TooShort { chars: usize },
}

impl fmt::Display for OutlineWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutlineWarning::Repetitive {
                chapters,
                similarity,
            } => write!(
                f,
                "outline is too similar to chapter(s) {} ({:.2})",
                join(chapters),
                similarity
            ),
            OutlineWarning::Irreversible { events } => write!(
                f,
                "irreversible events detected: {}; later chapters must account for them",
                events.join(", ")
            ),
            OutlineWarning::LowConflict { intensity } => {
                write!(f, "conflict intensity is low ({:.2}); the story may lack tension", intensity)
            }
            OutlineWarning::NoGrowth => {
                write!(f, "no character growth; add a breakthrough to avoid stagnation")
            }
            OutlineWarning::TooShort { chars } => {
                write!(f, "outline is short ({} chars) and may lack detail", chars)
            }
        }
    }
}

fn join(chapters: &[usize]) -> String {
    chapters
        .iter()
        .map(usize::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Result of validating one chapter outline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutlineReport {
    pub is_valid: bool,

    /// Highest similarity to any earlier outline.
    pub similarity: f32,
    pub similar_chapters: Vec<usize>,
    pub irreversible_events: Vec<String>,

    /// 0.0 to 1.0.
    pub conflict_intensity: f32,
    pub growth_indicators: Vec<String>,
    pub warnings: Vec<OutlineWarning>,
    pub errors: Vec<String>,
}

impl OutlineReport {
    pub fn has_irreversible(&self) -> bool {
        !self.irreversible_events.is_empty()
    }

    pub fn has_growth(&self) -> bool {
        !self.growth_indicators.is_empty()
    }

    /// Concrete rewrites for the outline's weak spots.
    pub fn fix_suggestions(&self) -> Vec<String> {
        let mut suggestions = Vec::new();

        if !self.similar_chapters.is_empty() {
            suggestions.push(format!(
                "similar to chapter(s) {}; develop the plot from a different angle or reorder events",
                join(&self.similar_chapters)
            ));
        }
        if self.conflict_intensity < 0.3 {
            suggestions.push(
                "raise the conflict: a clash between characters, an outside threat, or an inner dilemma"
                    .to_string(),
            );
        }
        if !self.has_growth() {
            suggestions.push(
                "let a character learn a skill, break a mental barrier, or see the world anew"
                    .to_string(),
            );
        }
        if self.has_irreversible() {
            suggestions.push(format!(
                "irreversible events ({}): later chapters must show their consequences and reactions",
                self.irreversible_events.join(", ")
            ));
        }
        if suggestions.is_empty() {
            suggestions.push("outline is in good shape".to_string());
        }

        suggestions
    }
}

#[derive(Debug, Clone)]
pub struct OutlineValidator {
    similarity_threshold: f32,
    strict_threshold: f32,
}

impl Default for OutlineValidator {
    fn default() -> Self {
        Self {
            similarity_threshold: 0.85,
            strict_threshold: 0.65,
        }
    }
}

impl OutlineValidator {
    pub fn new(similarity_threshold: f32) -> Self {
        Self {
            similarity_threshold,
            ..Self::default()
        }
    }

    /// Conflict intensity in 0.0..=1.0: low, medium and high keywords weigh
    /// 0.2, 0.5 and 1.0 each.
    pub fn conflict_intensity(&self, outline: &str) -> f32 {
        let raw = found_in(outline, CONFLICT_LOW).len() as f32 * 0.2
            + found_in(outline, CONFLICT_MEDIUM).len() as f32 * 0.5
            + found_in(outline, CONFLICT_HIGH).len() as f32 * 1.0;
        (raw / CONFLICT_SCALE).min(1.0)
    }

    /// Validate the outline of 1-based `chapter` against all earlier outlines.
    ///
    /// In strict mode the similarity threshold is lower and a repetitive
    /// outline is invalid rather than merely warned about.
    pub fn validate(
        &self,
        outline: &str,
        previous: &[String],
        chapter: usize,
        strict: bool,
    ) -> OutlineReport {
        let mut warnings = Vec::new();
        let mut errors = Vec::new();

        let threshold = if strict {
            self.strict_threshold
        } else {
            self.similarity_threshold
        };
        let mut similarity: f32 = 0.0;
        let mut similar_chapters = Vec::new();
        for (index, earlier) in previous.iter().enumerate() {
            let score = jaccard(outline, earlier);
            similarity = similarity.max(score);
            if score > threshold {
                similar_chapters.push(index + 1);
            }
        }
        if !similar_chapters.is_empty() {
            warnings.push(OutlineWarning::Repetitive {
                chapters: similar_chapters.clone(),
                similarity,
            });
            if strict {
                errors.push("strict mode does not allow repetitive outlines".to_string());
            }
        }

        let irreversible_events: Vec<String> = found_in(outline, IRREVERSIBLE)
            .into_iter()
            .map(String::from)
            .collect();
        if !irreversible_events.is_empty() {
            warnings.push(OutlineWarning::Irreversible {
                events: irreversible_events.clone(),
            });
        }

        let conflict_intensity = self.conflict_intensity(outline);
        if chapter > 3 && conflict_intensity < 0.2 {
            warnings.push(OutlineWarning::LowConflict {
                intensity: conflict_intensity,
            });
        }

        let growth_indicators: Vec<String> =
            found_in(outline, GROWTH).into_iter().map(String::from).collect();
        if chapter > 5 && chapter % 5 == 0 && growth_indicators.is_empty() {
            warnings.push(OutlineWarning::NoGrowth);
        }

        let chars = outline.chars().count();
        if chars < MIN_OUTLINE_CHARS {
            warnings.push(OutlineWarning::TooShort { chars });
        }

        info!(
            chapter,
            similarity,
            conflict_intensity,
            irreversible = irreversible_events.len(),
            growth = growth_indicators.len(),
            "outline validated"
        );

        OutlineReport {
            is_valid: errors.is_empty(),
            similarity,
            similar_chapters,
            irreversible_events,
            conflict_intensity,
            growth_indicators,
            warnings,
            errors,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FIRST: &str = "主角在森林中遇到神秘老人，老人傳授他一套心法，主角開始修煉";
    const SECOND: &str = "主角繼續在森林修煉，突破第一層境界，遇到強大妖獸，決心變強";

    #[test]
    fn test_jaccard() {
        assert_eq!(jaccard("a b c", "a b c"), 1.0);
        assert_eq!(jaccard("a b", "c d"), 0.0);
        assert_eq!(jaccard("", "a"), 0.0);
        assert!((jaccard("alpha beta gamma", "alpha beta delta") - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_repeated_outline_warns_and_strict_rejects() {
        let previous = vec![FIRST.to_string(), SECOND.to_string()];
        let validator = OutlineValidator::default();

        let report = validator.validate(FIRST, &previous, 3, false);
        assert!(report.is_valid);
        assert_eq!(report.similar_chapters, vec![1]);
        assert_eq!(report.similarity, 1.0);

        let report = validator.validate(FIRST, &previous, 3, true);
        assert!(!report.is_valid);
        assert_eq!(report.errors.len(), 1);
    }

    #[test]
    fn test_irreversible_and_growth() {
        let validator = OutlineValidator::default();
        let report = validator.validate(SECOND, &[], 2, false);

        assert_eq!(report.irreversible_events, vec!["突破"]);
        assert!(report.growth_indicators.contains(&"突破".to_string()));
        assert!(report.growth_indicators.contains(&"決心".to_string()));
        assert!(report.growth_indicators.contains(&"變強".to_string()));
    }

    #[test]
    fn test_conflict_intensity() {
        let validator = OutlineValidator::default();

        assert_eq!(validator.conflict_intensity("A quiet morning."), 0.0);
        let mild = validator.conflict_intensity("She meets the envoy and plans the route.");
        assert!((mild - 0.08).abs() < 1e-6);
        let fierce = validator.conflict_intensity(
            "A battle, a duel, a crisis, then collapse and betrayal, life or death.",
        );
        assert_eq!(fierce, 1.0);
    }

    #[test]
    fn test_chapter_gated_warnings() {
        let validator = OutlineValidator::default();
        let outline = "The crew repairs the hull and waits for the supply ship to arrive at the dock.";

        let early = validator.validate(outline, &[], 3, false);
        assert!(early.warnings.is_empty());

        let report = validator.validate(outline, &[], 10, false);
        assert!(report
            .warnings
            .iter()
            .any(|w| matches!(w, OutlineWarning::LowConflict { .. })));
        assert!(report.warnings.contains(&OutlineWarning::NoGrowth));

        let short = validator.validate("Short.", &[], 1, false);
        assert_eq!(short.warnings, vec![OutlineWarning::TooShort { chars: 6 }]);
    }

    #[test]
    fn test_fix_suggestions() {
        let validator = OutlineValidator::default();
        let report = validator.validate(FIRST, &[FIRST.to_string()], 4, false);
        let suggestions = report.fix_suggestions();

        assert!(suggestions[0].contains("chapter(s) 1"));
        assert!(suggestions.iter().any(|s| s.contains("conflict")));
    }
}
