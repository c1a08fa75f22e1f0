//! Grounding check - numbers in a report must come from the fact set
//!
//! Names are hard to trace in an inflected language, numbers are not: a
//! score, minute or date part that appears in the text but nowhere in the
//! facts was invented by the model.

use serde_json::Value;
use std::collections::HashSet;

use crate::facts::FactSet;

/// Integer tokens of `text` that cannot be traced back to `facts`.
///
/// Values are compared numerically, so `"05"` in a date matches `5.` in the
/// text. Counts the facts imply (number of cards, events, shootout kicks and
/// goals converted per side) are traceable too. Each offending token is
/// reported once, in order of appearance.
pub fn untraceable_numbers(text: &str, facts: &FactSet) -> Vec<String> {
    let known = known_numbers(facts);
    let mut seen = HashSet::new();

    digit_runs(text)
        .filter(|token| match token.parse::<u64>() {
            Ok(n) => !known.contains(&n),
            Err(_) => true,
        })
        .filter(|token| seen.insert(token.to_string()))
        .map(str::to_string)
        .collect()
}

fn known_numbers(facts: &FactSet) -> HashSet<u64> {
    let mut known = HashSet::new();
    if let Ok(json) = serde_json::to_value(facts) {
        collect_numbers(&json, &mut known);
    }

    known.insert(facts.events.len() as u64);
    known.insert(facts.cards.len() as u64);
    known.insert(facts.penalty_shootout.len() as u64);
    // feeds name a side either by team name or as "home"/"away"
    let sides = [(facts.home_team.name.as_str(), "home"), (facts.away_team.name.as_str(), "away")];
    for (name, tag) in sides {
        let on_side = |team: Option<&str>| team == Some(name) || team == Some(tag);
        let team_cards = facts.cards.iter().filter(|c| on_side(c.team.as_deref())).count();
        let converted = facts
            .penalty_shootout
            .iter()
            .filter(|k| on_side(k.team.as_deref()) && k.scored == Some(true))
            .count();
        known.insert(team_cards as u64);
        known.insert(converted as u64);
    }
    known
}

fn collect_numbers(value: &Value, out: &mut HashSet<u64>) {
    match value {
        Value::Number(n) => {
            if let Some(n) = n.as_u64() {
                out.insert(n);
            }
        }
        Value::String(s) => {
            out.extend(digit_runs(s).filter_map(|t| t.parse::<u64>().ok()));
        }
        Value::Array(items) => items.iter().for_each(|v| collect_numbers(v, out)),
        Value::Object(map) => map.values().for_each(|v| collect_numbers(v, out)),
        Value::Bool(_) | Value::Null => {}
    }
}

/// Maximal runs of ASCII digits
fn digit_runs(text: &str) -> impl Iterator<Item = &str> {
    text.split(|c: char| !c.is_ascii_digit()).filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::facts::extract_facts;
    use serde_json::json;

    fn facts() -> FactSet {
        extract_facts(&json!({
            "date": "2024-05-01",
            "home_team": { "name": "Sparta", "score": 2 },
            "away_team": { "name": "Slavia", "score": 1 },
            "events": [
                { "type": "goal", "minute": 23, "player": "Kuchta", "team": "Sparta" },
                { "type": "yellow_card", "minute": "90+3", "player": "Holeš", "team": "Slavia" }
            ]
        }))
        .unwrap()
    }

    #[test]
    fn test_traceable_text() {
        let text = "Dne 1. 5. 2024 zvítězila Sparta nad Slavií 2:1. Kuchta skóroval ve 23. minutě, \
                    Holeš viděl v 90+3. minutě jednu žlutou kartu.";
        assert!(untraceable_numbers(text, &facts()).is_empty());
    }

    #[test]
    fn test_invented_numbers_reported_once() {
        let text = "Sparta vyhrála 4:1 před 18000 diváky, čtvrtý gól padl v 88. minutě, 4:1!";
        assert_eq!(untraceable_numbers(text, &facts()), vec!["4", "18000", "88"]);
    }

    #[test]
    fn test_side_counts_accept_names_and_tags() {
        for (home, away) in [("Sparta", "Slavia"), ("home", "away")] {
            let kick = |team: &str, scored: bool| json!({ "team": team, "scored": scored });
            let facts = extract_facts(&json!({
                "date": "2024-05-01",
                "home_team": { "name": "Sparta", "score": 1 },
                "away_team": { "name": "Slavia", "score": 1 },
                "events": [
                    { "type": "yellow_card", "minute": 10, "team": away },
                    { "type": "yellow_card", "minute": 20, "team": away },
                    { "type": "red_card", "minute": 30, "team": away }
                ],
                "penalty_shootout": [
                    kick(home, true), kick(away, true), kick(home, true), kick(away, false),
                    kick(home, true), kick(away, false), kick(home, true), kick(away, true)
                ]
            }))
            .unwrap();

            let text = "Slavia viděla 3 karty a v rozstřelu proměnila jen 2 pokusy, Sparta všechny 4.";
            assert!(untraceable_numbers(text, &facts).is_empty(), "{home}/{away}");
        }
    }

    #[test]
    fn test_text_without_numbers() {
        assert!(untraceable_numbers("Derby bez branek.", &facts()).is_empty());
    }
}
