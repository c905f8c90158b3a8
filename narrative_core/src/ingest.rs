//! Lenient ingestion of structured collaborator output.
//!
//! Generated JSON arrives wrapped in prose, fenced in markdown, or keyed in
//! whichever language the model chose. Parsing tries, in order:
//! 1. The whole text
//! 2. A ```json fenced block
//! 3. Any fenced block
//! 4. The outermost `{...}`
//! 5. The outermost `[...]`
//!
//! Keys are mapped to a canonical [`ProfileField`] once, here, and nowhere else.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use thiserror::Error;

use story_bible::{CharacterProfile, LifeStatus};
use tracing::debug;

static RE_JSON_FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)```json\s*\n(.*?)\n```").expect("valid regex"));
static RE_ANY_FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)```\s*\n(.*?)\n```").expect("valid regex"));

const PREVIEW_CHARS: usize = 200;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("no JSON found in collaborator output: {preview}")]
    Unparseable { preview: String },

    #[error("expected a JSON object for a character profile")]
    NotAnObject,

    #[error("character profile is missing the {0} field")]
    MissingField(ProfileField),

    #[error("invalid {field} value: {reason}")]
    InvalidField { field: ProfileField, reason: String },
}

/// Parse JSON out of free-form collaborator output.
pub fn parse_lenient(text: &str) -> Result<Value, IngestError> {
    if let Ok(value) = serde_json::from_str(text) {
        return Ok(value);
    }

    for fence in [&*RE_JSON_FENCE, &*RE_ANY_FENCE] {
        if let Some(body) = fence.captures(text).and_then(|caps| caps.get(1)) {
            if let Ok(value) = serde_json::from_str(body.as_str()) {
                return Ok(value);
            }
        }
    }

    for (open, close) in [('{', '}'), ('[', ']')] {
        if let (Some(first), Some(last)) = (text.find(open), text.rfind(close)) {
            if first < last {
                if let Ok(value) = serde_json::from_str(&text[first..=last]) {
                    return Ok(value);
                }
            }
        }
    }

    Err(IngestError::Unparseable {
        preview: text.chars().take(PREVIEW_CHARS).collect(),
    })
}

/// Canonical character profile fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ProfileField {
    Name,
    Aliases,
    Traits,
    Abilities,
    Relationships,
    LifeStatus,
}

/// Every accepted key spelling, lowercased, with its canonical field.
const FIELD_ALIASES: &[(&str, ProfileField)] = &[
    ("name", ProfileField::Name),
    ("character_name", ProfileField::Name),
    ("角色名", ProfileField::Name),
    ("姓名", ProfileField::Name),
    ("名字", ProfileField::Name),
    ("aliases", ProfileField::Aliases),
    ("alias", ProfileField::Aliases),
    ("nicknames", ProfileField::Aliases),
    ("別名", ProfileField::Aliases),
    ("别名", ProfileField::Aliases),
    ("外號", ProfileField::Aliases),
    ("traits", ProfileField::Traits),
    ("personality", ProfileField::Traits),
    ("性格", ProfileField::Traits),
    ("個性", ProfileField::Traits),
    ("个性", ProfileField::Traits),
    ("abilities", ProfileField::Abilities),
    ("skills", ProfileField::Abilities),
    ("能力", ProfileField::Abilities),
    ("技能", ProfileField::Abilities),
    ("relationships", ProfileField::Relationships),
    ("relations", ProfileField::Relationships),
    ("關係", ProfileField::Relationships),
    ("关系", ProfileField::Relationships),
    ("人際關係", ProfileField::Relationships),
    ("status", ProfileField::LifeStatus),
    ("life_status", ProfileField::LifeStatus),
    ("狀態", ProfileField::LifeStatus),
    ("状态", ProfileField::LifeStatus),
    ("生死", ProfileField::LifeStatus),
];

impl ProfileField {
    pub fn from_key(key: &str) -> Option<Self> {
        let key = key.trim().to_lowercase();
        FIELD_ALIASES
            .iter()
            .find(|(alias, _)| *alias == key)
            .map(|(_, field)| *field)
    }
}

impl std::fmt::Display for ProfileField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ProfileField::Name => "name",
            ProfileField::Aliases => "aliases",
            ProfileField::Traits => "traits",
            ProfileField::Abilities => "abilities",
            ProfileField::Relationships => "relationships",
            ProfileField::LifeStatus => "life_status",
        };
        f.write_str(name)
    }
}

/// Keys that may wrap a list of character objects.
const LIST_KEYS: &[&str] = &["characters", "角色", "人物"];

fn canonical_fields(object: &Map<String, Value>) -> BTreeMap<ProfileField, &Value> {
    let mut fields = BTreeMap::new();
    for (key, value) in object {
        match ProfileField::from_key(key) {
            Some(field) => {
                fields.entry(field).or_insert(value);
            }
            None => debug!(key = %key, "ignoring unrecognised profile key"),
        }
    }
    fields
}

fn string_list(field: ProfileField, value: &Value) -> Result<Vec<String>, IngestError> {
    match value {
        Value::String(text) => Ok(text
            .split(|c: char| matches!(c, ',' | '，' | '、' | ';' | '；'))
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect()),
        Value::Array(items) => items
            .iter()
            .map(|item| match item {
                Value::String(s) => Ok(s.trim().to_string()),
                other => Err(IngestError::InvalidField {
                    field,
                    reason: format!("expected a string, found {}", other),
                }),
            })
            .collect(),
        Value::Null => Ok(Vec::new()),
        other => Err(IngestError::InvalidField {
            field,
            reason: format!("expected a string or list, found {}", other),
        }),
    }
}

fn relationships(value: &Value) -> Result<BTreeMap<String, String>, IngestError> {
    let field = ProfileField::Relationships;
    match value {
        Value::Object(map) => map
            .iter()
            .map(|(other, relation)| match relation {
                Value::String(s) => Ok((other.clone(), s.clone())),
                found => Err(IngestError::InvalidField {
                    field,
                    reason: format!("expected a string for {}, found {}", other, found),
                }),
            })
            .collect(),
        _ => Ok(string_list(field, value)?
            .into_iter()
            .filter_map(|entry| {
                let (other, relation) = entry.split_once([':', '：'])?;
                Some((other.trim().to_string(), relation.trim().to_string()))
            })
            .collect()),
    }
}

fn life_status(value: &Value) -> Result<LifeStatus, IngestError> {
    let text = value.as_str().map(|s| s.trim().to_lowercase()).unwrap_or_default();
    match text.as_str() {
        "alive" | "living" | "存活" | "活著" | "活着" => Ok(LifeStatus::Alive),
        "dead" | "deceased" | "死亡" | "已死" | "已故" => Ok(LifeStatus::Dead),
        "unknown" | "missing" | "未知" | "失蹤" | "失踪" | "" => Ok(LifeStatus::Unknown),
        other => Err(IngestError::InvalidField {
            field: ProfileField::LifeStatus,
            reason: format!("unrecognised status \"{}\"", other),
        }),
    }
}

/// Build one profile from a JSON object with any accepted key spelling.
pub fn profile_from_value(value: &Value) -> Result<CharacterProfile, IngestError> {
    let object = value.as_object().ok_or(IngestError::NotAnObject)?;
    let fields = canonical_fields(object);

    let name = fields
        .get(&ProfileField::Name)
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or(IngestError::MissingField(ProfileField::Name))?;

    let mut profile = CharacterProfile::new(name);
    for (field, value) in &fields {
        match field {
            ProfileField::Name => {}
            ProfileField::Aliases => profile.aliases = string_list(*field, value)?,
            ProfileField::Traits => profile.traits = string_list(*field, value)?,
            ProfileField::Abilities => profile.abilities = string_list(*field, value)?,
            ProfileField::Relationships => profile.relationships = relationships(value)?,
            ProfileField::LifeStatus => profile.life_status = life_status(value)?,
        }
    }

    Ok(profile)
}

/// Parse collaborator output into character profiles.
///
/// Accepts a single object, a list of objects, or an object wrapping a list
/// under a `characters` key.
pub fn ingest_characters(text: &str) -> Result<Vec<CharacterProfile>, IngestError> {
    let value = parse_lenient(text)?;

    let wrapped = value.as_object().and_then(|object| {
        object
            .iter()
            .find(|(key, _)| LIST_KEYS.contains(&key.trim().to_lowercase().as_str()))
            .and_then(|(_, list)| list.as_array())
    });

    match (wrapped, &value) {
        (Some(list), _) => list.iter().map(profile_from_value).collect(),
        (None, Value::Array(list)) => list.iter().map(profile_from_value).collect(),
        (None, single) => Ok(vec![profile_from_value(single)?]),
    }
}
