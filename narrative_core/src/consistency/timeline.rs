//! Timeline check and time-marker extraction.
//!
//! Markers are found with a fixed pattern set and resolved to story-day
//! positions, starting from the timeline's current position:
//! - absolute: "Day 12", "第12天"
//! - forward: "three days later", "the next morning", "三天後", "次日"
//! - backward: "two weeks earlier", "the day before", "前一天"
//! - same day: "that night", "當晚"

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

use story_bible::{MarkerKind, NarrativeStateStore};

use super::{ChapterText, ConsistencyCheck, ConsistencyIssue, IssueKind, NameIndex, Severity};

/// How a marker moves story time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkerShift {
    /// Sets the story day.
    Absolute(i64),
    /// Moves the story day by a number of days.
    Relative(i64),
}

/// A time marker as found in chapter text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeMarker {
    pub label: String,
    pub shift: MarkerShift,
    pub flashback: bool,
}

impl TimeMarker {
    pub fn kind(&self) -> MarkerKind {
        match self.shift {
            MarkerShift::Absolute(_) => MarkerKind::Absolute,
            MarkerShift::Relative(_) => MarkerKind::Relative,
        }
    }
}

/// A marker with its resolved story-day position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedMarker {
    pub marker: TimeMarker,
    pub position: i64,

    /// Story day the marker was measured against.
    pub established: i64,
}

impl ResolvedMarker {
    /// A present-time marker that moves story time backwards.
    pub fn regresses(&self) -> bool {
        !self.marker.flashback && self.position < self.established
    }
}

const COUNT: &str = r"(\d+|an?|one|two|three|four|five|six|seven|eight|nine|ten|eleven|twelve|several|a few)";
const CJK_COUNT: &str = r"(\d+|[一二兩两三四五六七八九十百]+)";

/// Largest day number or span read from text; larger numbers are not markers.
pub const MAX_STORY_DAY: i64 = 1_000_000;

static RE_DAY_NUMBER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\bday\s+(\d+)\b").expect("valid regex"));
static RE_CJK_DAY_NUMBER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"第\s*(\d+)\s*天").expect("valid regex"));
static RE_LATER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r"(?i)\b{}\s+(day|week|month|year)s?\s+(?:later|after|afterwards?)\b",
        COUNT
    ))
    .expect("valid regex")
});
static RE_EARLIER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(r"(?i)\b{}\s+(day|week|month|year)s?\s+earlier\b", COUNT)).expect("valid regex")
});
static RE_CJK_SPAN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(r"{}\s*(天|日|週|周|個月|个月|年)(之後|之后|後|后|之前|前)", CJK_COUNT))
        .expect("valid regex")
});
static RE_NEXT_DAY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\bthe\s+(?:next|following)\s+(?:day|morning)\b|次日|翌日|第二天").expect("valid regex")
});
static RE_SAME_DAY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\bthat\s+(?:night|evening|afternoon)\b|當晚|当晚").expect("valid regex")
});
static RE_PREVIOUS_DAY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\bthe\s+(?:previous|prior)\s+day\b|\bthe\s+day\s+before\b|前一天").expect("valid regex")
});

fn cjk_digit(ch: char) -> Option<i64> {
    let digit = match ch {
        '一' => 1,
        '二' | '兩' | '两' => 2,
        '三' => 3,
        '四' => 4,
        '五' => 5,
        '六' => 6,
        '七' => 7,
        '八' => 8,
        '九' => 9,
        _ => return None,
    };
    Some(digit)
}

/// Value of a CJK numeral up to the hundreds: 十五, 二十, 一百二十.
fn cjk_numeral(text: &str) -> Option<i64> {
    let mut total = 0;
    let mut digit: Option<i64> = None;
    for ch in text.chars() {
        match ch {
            '十' => total += digit.take().unwrap_or(1) * 10,
            '百' => total += digit.take().unwrap_or(1) * 100,
            _ if digit.is_some() => return None,
            _ => digit = Some(cjk_digit(ch)?),
        }
    }
    Some(total + digit.unwrap_or(0))
}

fn count_value(word: &str) -> Option<i64> {
    let value = match word.to_lowercase().as_str() {
        "a" | "an" | "one" => 1,
        "two" => 2,
        "three" | "several" | "a few" => 3,
        "four" => 4,
        "five" => 5,
        "six" => 6,
        "seven" => 7,
        "eight" => 8,
        "nine" => 9,
        "ten" => 10,
        "eleven" => 11,
        "twelve" => 12,
        digits if digits.chars().all(|c| c.is_ascii_digit()) => digits.parse().ok()?,
        numeral => cjk_numeral(numeral)?,
    };
    (value <= MAX_STORY_DAY).then_some(value)
}

fn day_number(digits: &str) -> Option<i64> {
    digits.parse().ok().filter(|day| *day <= MAX_STORY_DAY)
}

fn unit_days(unit: &str) -> i64 {
    match unit.to_lowercase().as_str() {
        "week" | "週" | "周" => 7,
        "month" | "個月" | "个月" => 30,
        "year" | "年" => 365,
        _ => 1,
    }
}

fn span(caps: &Captures<'_>) -> Option<i64> {
    let count = match caps.get(1) {
        Some(m) => count_value(m.as_str())?,
        None => 1,
    };
    let unit = caps.get(2).map_or(1, |m| unit_days(m.as_str()));
    Some(count.saturating_mul(unit))
}

#[derive(Debug, Clone, Copy)]
enum Pattern {
    DayNumber,
    CjkDayNumber,
    Later,
    Earlier,
    CjkSpan,
    NextDay,
    SameDay,
    PreviousDay,
}

impl Pattern {
    const ALL: [Pattern; 8] = [
        Pattern::DayNumber,
        Pattern::CjkDayNumber,
        Pattern::Later,
        Pattern::Earlier,
        Pattern::CjkSpan,
        Pattern::NextDay,
        Pattern::SameDay,
        Pattern::PreviousDay,
    ];

    fn regex(self) -> &'static Regex {
        match self {
            Pattern::DayNumber => &RE_DAY_NUMBER,
            Pattern::CjkDayNumber => &RE_CJK_DAY_NUMBER,
            Pattern::Later => &RE_LATER,
            Pattern::Earlier => &RE_EARLIER,
            Pattern::CjkSpan => &RE_CJK_SPAN,
            Pattern::NextDay => &RE_NEXT_DAY,
            Pattern::SameDay => &RE_SAME_DAY,
            Pattern::PreviousDay => &RE_PREVIOUS_DAY,
        }
    }

    fn shift(self, caps: &Captures<'_>) -> Option<MarkerShift> {
        match self {
            Pattern::DayNumber | Pattern::CjkDayNumber => caps
                .get(1)
                .and_then(|m| day_number(m.as_str()))
                .map(MarkerShift::Absolute),
            Pattern::Later => span(caps).map(MarkerShift::Relative),
            Pattern::Earlier => span(caps).map(|days| MarkerShift::Relative(-days)),
            Pattern::CjkSpan => {
                let backward = caps.get(3).is_some_and(|m| m.as_str().ends_with('前'));
                let days = span(caps)?;
                Some(MarkerShift::Relative(if backward { -days } else { days }))
            }
            Pattern::NextDay => Some(MarkerShift::Relative(1)),
            Pattern::SameDay => Some(MarkerShift::Relative(0)),
            Pattern::PreviousDay => Some(MarkerShift::Relative(-1)),
        }
    }
}

/// Time markers of a chapter in text order.
pub fn extract_markers(chapter: &ChapterText) -> Vec<TimeMarker> {
    let mut markers = Vec::new();

    for paragraph in chapter.paragraphs() {
        let mut found: Vec<(usize, usize, TimeMarker)> = Vec::new();
        for pattern in Pattern::ALL {
            for caps in pattern.regex().captures_iter(&paragraph.text) {
                let (Some(whole), Some(shift)) = (caps.get(0), pattern.shift(&caps)) else {
                    continue;
                };
                found.push((
                    whole.start(),
                    whole.end(),
                    TimeMarker {
                        label: whole.as_str().to_string(),
                        shift,
                        flashback: paragraph.flashback,
                    },
                ));
            }
        }

        found.sort_by_key(|(start, end, _)| (*start, std::cmp::Reverse(*end)));
        let mut covered_to = 0;
        for (start, end, marker) in found {
            if start < covered_to {
                continue;
            }
            covered_to = end;
            markers.push(marker);
        }
    }

    markers
}

/// Resolve markers to story days, starting at `start`.
///
/// A present-time marker that would move time backwards is resolved but does
/// not move the running position; flashback markers never move it.
pub fn resolve_markers(markers: Vec<TimeMarker>, start: i64) -> Vec<ResolvedMarker> {
    let mut cursor = start;
    markers
        .into_iter()
        .map(|marker| {
            let position = match marker.shift {
                MarkerShift::Absolute(day) => day,
                MarkerShift::Relative(days) => cursor.saturating_add(days),
            };
            let established = cursor;
            if !marker.flashback && position >= cursor {
                cursor = position;
            }
            ResolvedMarker {
                marker,
                position,
                established,
            }
        })
        .collect()
}

/// Flags present-time markers that contradict the established chronology (high).
#[derive(Debug, Clone, Copy, Default)]
pub struct TimelineCheck;

impl ConsistencyCheck for TimelineCheck {
    fn name(&self) -> &'static str {
        "timeline"
    }

    fn check(
        &self,
        chapter: &ChapterText,
        state: &NarrativeStateStore,
        _names: &NameIndex,
    ) -> Vec<ConsistencyIssue> {
        let start = state.timeline().current_position();
        resolve_markers(extract_markers(chapter), start)
            .into_iter()
            .filter(ResolvedMarker::regresses)
            .map(|resolved| {
                ConsistencyIssue::new(
                    IssueKind::TimelineError {
                        marker: resolved.marker.label.clone(),
                        position: resolved.position,
                        established: resolved.established,
                    },
                    Severity::High,
                    format!(
                        "\"{}\" places events on day {} but the story is already at day {}",
                        resolved.marker.label, resolved.position, resolved.established
                    ),
                )
            })
            .collect()
    }
}
