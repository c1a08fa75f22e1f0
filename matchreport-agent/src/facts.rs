//! Fact extraction - validate raw match data and annotate it with derived flags
//!
//! A match record is accepted only when it answers the basic questions of a
//! report: *when* (`date`), *who* (`home_team.name`, `away_team.name`) and
//! *what was the result* (`full_time_score` as `"X:Y"`, or integer team
//! scores). Everything else is optional and passed through unchanged.

use matchreport_error::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

// ============================================================================
// Payload intake
// ============================================================================

/// The match record of one report request.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchPayload(Value);

impl MatchPayload {
    /// Accept `{"match_json": {...}}`, `{"match_json_text": "..."}` or a bare record.
    pub fn from_value(value: &Value) -> Result<Self> {
        let Some(obj) = value.as_object() else {
            return Err(missing_payload());
        };

        match (obj.get("match_json"), obj.get("match_json_text")) {
            (Some(Value::Object(record)), _) => Ok(Self(Value::Object(record.clone()))),
            (_, Some(Value::String(text))) if !text.trim().is_empty() => {
                let record: Value = serde_json::from_str(text).map_err(|e| {
                    Error::parse_failed(format!("Invalid JSON: {}", e))
                        .with_operation("facts::payload")
                        .set_source(e)
                })?;
                Ok(Self(record))
            }
            (None, None) => Ok(Self(value.clone())),
            _ => Err(missing_payload()),
        }
    }

    /// Pull the match JSON out of a natural-language instruction such as
    /// `Vytvoř report z následujících dat: match_json:{...}`.
    ///
    /// The object following a `match_json` marker wins; without a marker the
    /// first balanced object in the text is used.
    pub fn from_instruction(text: &str) -> Result<Self> {
        let search_from = text.find("match_json").unwrap_or(0);
        let json = text[search_from..]
            .find('{')
            .and_then(|start| balanced_object(&text[search_from + start..]))
            .ok_or_else(|| {
                Error::parse_failed("no JSON object found in instruction")
                    .with_operation("facts::from_instruction")
            })?;

        let value: Value = serde_json::from_str(json).map_err(|e| {
            Error::parse_failed(format!("Invalid JSON: {}", e))
                .with_operation("facts::from_instruction")
                .set_source(e)
        })?;
        Self::from_value(&value)
    }

    pub fn record(&self) -> &Value {
        &self.0
    }

    pub fn into_record(self) -> Value {
        self.0
    }
}

fn missing_payload() -> Error {
    Error::validation_failed(["Provide match_json (object) or match_json_text (JSON string)"])
        .with_operation("facts::payload")
}

/// Slice of `text` (which starts with `{`) up to its matching `}`.
fn balanced_object(text: &str) -> Option<&str> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, c) in text.char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(&text[..=i]);
                }
            }
            _ => {}
        }
    }
    None
}

// ============================================================================
// Fact set
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeamFacts {
    pub name: String,
    pub score: Option<u32>,
}

/// A minute in the match; feeds may send `67` or `"90+3"`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Minute {
    Number(u32),
    Text(String),
}

impl Minute {
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => n.as_u64().and_then(|n| u32::try_from(n).ok()).map(Minute::Number),
            Value::String(s) if !s.trim().is_empty() => Some(Minute::Text(s.clone())),
            _ => None,
        }
    }
}

impl fmt::Display for Minute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Minute::Number(n) => write!(f, "{}", n),
            Minute::Text(s) => write!(f, "{}", s),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    YellowCard,
    SecondYellow,
    RedCard,
    Goal,
    OwnGoal,
    PenaltyScored,
    PenaltyMissed,
    Substitution,
    Other,
}

impl EventKind {
    pub fn parse(raw: &str) -> Self {
        match raw {
            "yellow_card" => EventKind::YellowCard,
            "second_yellow" => EventKind::SecondYellow,
            "red_card" => EventKind::RedCard,
            "goal" => EventKind::Goal,
            "own_goal" => EventKind::OwnGoal,
            "penalty_scored" => EventKind::PenaltyScored,
            "penalty_missed" => EventKind::PenaltyMissed,
            "substitution" => EventKind::Substitution,
            _ => EventKind::Other,
        }
    }

    pub fn is_card(&self) -> bool {
        matches!(self, EventKind::YellowCard | EventKind::SecondYellow | EventKind::RedCard)
    }

    pub fn is_penalty(&self) -> bool {
        matches!(self, EventKind::PenaltyScored | EventKind::PenaltyMissed)
    }
}

/// One entry of the match timeline.
///
/// Typed fields are filled only when the sent value fits them; anything else,
/// including a mistyped `minute` or `player`, stays in `extra` as sent.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchEvent {
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub event_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub minute: Option<Minute>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub player: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub team: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl MatchEvent {
    pub fn from_object(obj: &Map<String, Value>) -> Self {
        let mut extra = obj.clone();
        Self {
            event_type: take_field(&mut extra, "type", text_value),
            minute: take_field(&mut extra, "minute", Minute::from_value),
            player: take_field(&mut extra, "player", text_value),
            team: take_field(&mut extra, "team", text_value),
            extra,
        }
    }

    /// `Other` when `type` is missing or not a string
    pub fn kind(&self) -> EventKind {
        self.event_type.as_deref().map_or(EventKind::Other, EventKind::parse)
    }
}

/// One kick of a penalty shootout. Mistyped keys stay in `extra`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ShootoutKick {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub team: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub player: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scored: Option<bool>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ShootoutKick {
    pub fn from_object(obj: &Map<String, Value>) -> Self {
        let mut extra = obj.clone();
        Self {
            team: take_field(&mut extra, "team", text_value),
            player: take_field(&mut extra, "player", text_value),
            scored: take_field(&mut extra, "scored", Value::as_bool),
            extra,
        }
    }
}

/// Remove `key` from `map` when `convert` accepts its value.
fn take_field<T>(
    map: &mut Map<String, Value>,
    key: &str,
    convert: impl FnOnce(&Value) -> Option<T>,
) -> Option<T> {
    let value = map.get(key).and_then(convert)?;
    map.remove(key);
    Some(value)
}

fn text_value(value: &Value) -> Option<String> {
    value.as_str().map(str::to_string)
}

/// Validated, flag-annotated match data.
///
/// Produced by [`extract_facts`] from a record that passed the completeness
/// checks; a failing record yields a `ValidationFailed` error instead.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FactSet {
    pub date: String,
    pub competition: Option<String>,
    pub round: Option<String>,
    pub venue: Option<String>,
    pub city: Option<String>,
    pub home_team: TeamFacts,
    pub away_team: TeamFacts,
    pub half_time_score: Option<String>,
    /// Always `"X:Y"` (home:away)
    pub full_time_score: String,
    pub events: Vec<MatchEvent>,
    /// Card events, in timeline order
    pub cards: Vec<MatchEvent>,
    pub penalty_shootout: Vec<ShootoutKick>,
    pub has_cards: bool,
    pub has_penalties_in_match: bool,
    pub has_penalty_shootout: bool,
}

impl FactSet {
    pub fn to_json(&self) -> Result<Value> {
        serde_json::to_value(self).map_err(|e| {
            Error::serialization_failed("failed to serialize fact set")
                .with_operation("facts::to_json")
                .set_source(e)
        })
    }
}

// ============================================================================
// Extraction
// ============================================================================

/// Validate a match record and build its fact set.
///
/// All problems are collected before failing so the caller sees the full list
/// in one `ValidationFailed` error.
pub fn extract_facts(record: &Value) -> Result<FactSet> {
    let Some(data) = record.as_object() else {
        return Err(Error::validation_failed(["The match data must be a JSON object"])
            .with_operation("facts::extract"));
    };

    let mut problems: Vec<String> = Vec::new();

    // when
    let date = non_blank(data.get("date"));
    if date.is_none() {
        problems.push("Missing or empty 'date'".into());
    }

    // who
    let home = team_entry(data.get("home_team"));
    let away = team_entry(data.get("away_team"));
    if home.name.is_none() {
        problems.push("Missing 'home_team.name'".into());
    }
    if away.name.is_none() {
        problems.push("Missing 'away_team.name'".into());
    }

    // result
    let ft = data.get("full_time_score").and_then(Value::as_str).and_then(parse_score);
    let pair = home.score.zip(away.score);
    let full_time = match (ft, pair) {
        (Some(ft), Some(pair)) if ft != pair => {
            problems.push(format!(
                "'full_time_score' {}:{} disagrees with team scores {}:{}",
                ft.0, ft.1, pair.0, pair.1
            ));
            None
        }
        (Some(score), _) | (None, Some(score)) => Some(score),
        (None, None) => {
            problems.push(
                "Provide either 'full_time_score' as 'X:Y' or integer 'home_team.score' and 'away_team.score'"
                    .into(),
            );
            None
        }
    };

    // events (optional)
    let events = match data.get("events") {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(items)) => match parse_list(items, MatchEvent::from_object) {
            Ok(events) => events,
            Err(index) => {
                problems.push(format!("'events[{}]' must be an object", index));
                Vec::new()
            }
        },
        Some(_) => {
            problems.push("'events' must be an array when present".into());
            Vec::new()
        }
    };

    let penalty_shootout = match data.get("penalty_shootout") {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(items)) => match parse_list(items, ShootoutKick::from_object) {
            Ok(kicks) => kicks,
            Err(index) => {
                problems.push(format!("'penalty_shootout[{}]' must be an object", index));
                Vec::new()
            }
        },
        Some(_) => {
            problems.push("'penalty_shootout' must be an array when present".into());
            Vec::new()
        }
    };

    let (Some(date), Some(home_name), Some(away_name), Some((home_goals, away_goals)), true) =
        (date, home.name, away.name, full_time, problems.is_empty())
    else {
        return Err(Error::validation_failed(problems).with_operation("facts::extract"));
    };

    let cards: Vec<MatchEvent> = events.iter().filter(|e| e.kind().is_card()).cloned().collect();
    let has_penalties_in_match = events.iter().any(|e| e.kind().is_penalty());

    Ok(FactSet {
        date,
        competition: optional_text(data.get("competition")),
        round: optional_text(data.get("round")),
        venue: optional_text(data.get("venue")),
        city: optional_text(data.get("city")),
        home_team: TeamFacts {
            name: home_name,
            score: Some(home_goals),
        },
        away_team: TeamFacts {
            name: away_name,
            score: Some(away_goals),
        },
        half_time_score: optional_text(data.get("half_time_score")),
        full_time_score: format!("{}:{}", home_goals, away_goals),
        has_cards: !cards.is_empty(),
        has_penalties_in_match,
        has_penalty_shootout: !penalty_shootout.is_empty(),
        events,
        cards,
        penalty_shootout,
    })
}

struct TeamEntry {
    name: Option<String>,
    score: Option<u32>,
}

/// A team is either `{"name": ..., "score": ...}` or just its name.
fn team_entry(value: Option<&Value>) -> TeamEntry {
    match value {
        Some(Value::Object(team)) => TeamEntry {
            name: non_blank(team.get("name")),
            score: team
                .get("score")
                .and_then(Value::as_u64)
                .and_then(|n| u32::try_from(n).ok()),
        },
        Some(Value::String(_)) => TeamEntry {
            name: non_blank(value),
            score: None,
        },
        _ => TeamEntry { name: None, score: None },
    }
}

fn non_blank(value: Option<&Value>) -> Option<String> {
    value
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn optional_text(value: Option<&Value>) -> Option<String> {
    match value {
        Some(Value::Number(n)) => Some(n.to_string()),
        other => non_blank(other),
    }
}

/// `"2:1"` or `" 2 : 1 "` into `(2, 1)`
fn parse_score(text: &str) -> Option<(u32, u32)> {
    let (home, away) = text.split_once(':')?;
    Some((home.trim().parse().ok()?, away.trim().parse().ok()?))
}

/// Build each element, reporting the index of the first non-object
fn parse_list<T>(
    items: &[Value],
    build: impl Fn(&Map<String, Value>) -> T,
) -> std::result::Result<Vec<T>, usize> {
    items
        .iter()
        .enumerate()
        .map(|(i, item)| item.as_object().map(&build).ok_or(i))
        .collect()
}
