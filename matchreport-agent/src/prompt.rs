//! Prompt text for the report model

use matchreport_error::{Error, Result};

use crate::config::AgentConfig;
use crate::facts::FactSet;

/// Builds the system and user prompts for one report.
#[derive(Debug, Clone)]
pub struct PromptBuilder {
    language: String,
    min_words: usize,
    max_words: usize,
    target_words: usize,
}

impl PromptBuilder {
    pub fn new(config: &AgentConfig) -> Self {
        Self {
            language: config.language.clone(),
            min_words: config.min_words,
            max_words: config.max_words,
            target_words: config.target_words(),
        }
    }

    pub fn system_prompt(&self) -> String {
        format!(
            "You are a sports reporter.\n\
             Write a football match recap in {language} that is STRICTLY between {min} and {max} words \
             (target about {target}).\n\
             \n\
             Rules:\n\
             - Use ONLY the facts you are given. Keep ALL numbers, names and minutes exactly as given.\n\
             - Do NOT invent events, causes, set pieces, attendances or any other details.\n\
             - The report must say when the match was played, who played, what the result was, \
             whether any cards were shown and whether penalties were taken.\n\
             - Structure: lead, first half, second half, discipline and cards, penalties or shootout, closing.\n\
             - Reply with the plain-text article only: no title, no markdown, no commentary.",
            language = self.language,
            min = self.min_words,
            max = self.max_words,
            target = self.target_words,
        )
    }

    /// First-attempt request carrying the facts as JSON
    pub fn facts_prompt(&self, facts: &FactSet) -> Result<String> {
        let json = serde_json::to_string_pretty(&facts.to_json()?).map_err(|e| {
            Error::serialization_failed("failed to render fact set")
                .with_operation("prompt::facts_prompt")
                .set_source(e)
        })?;
        let mut out = String::new();
        out.push_str("Write the match report from these validated facts.\n\n");
        out.push_str("```json\n");
        out.push_str(&json);
        out.push_str("\n```\n\n");
        out.push_str(&self.flag_notes(facts));
        Ok(out)
    }

    /// Revision request sent after a rejected draft
    pub fn revision_prompt(&self, feedback: &str) -> String {
        format!(
            "{}\nMinimally revise the previous draft; do not add new facts. \
             Reply with the full revised article only.",
            feedback
        )
    }

    fn flag_notes(&self, facts: &FactSet) -> String {
        let mut notes = Vec::new();
        notes.push(if facts.has_cards {
            format!("- Cards were shown ({} in total); mention each one.", facts.cards.len())
        } else {
            "- No cards were shown; say so.".to_string()
        });
        if facts.has_penalties_in_match {
            notes.push("- Penalties were taken during play; mention them.".to_string());
        }
        notes.push(if facts.has_penalty_shootout {
            "- The match went to a penalty shootout; describe it.".to_string()
        } else {
            "- There was no penalty shootout.".to_string()
        });
        format!("Notes:\n{}\n", notes.join("\n"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::facts::extract_facts;
    use serde_json::json;

    fn facts(events: serde_json::Value) -> FactSet {
        extract_facts(&json!({
            "date": "2024-05-01",
            "home_team": { "name": "Sparta", "score": 2 },
            "away_team": { "name": "Slavia", "score": 1 },
            "events": events
        }))
        .unwrap()
    }

    #[test]
    fn test_system_prompt_carries_range_and_language() {
        let prompts = PromptBuilder::new(&AgentConfig::default());
        let system = prompts.system_prompt();
        assert!(system.contains("in Czech"));
        assert!(system.contains("between 260 and 340 words"));
        assert!(system.contains("about 300"));
    }

    #[test]
    fn test_facts_prompt_embeds_json_and_notes() {
        let prompts = PromptBuilder::new(&AgentConfig::default());
        let text = prompts.facts_prompt(&facts(json!([]))).unwrap();
        assert!(text.contains("\"name\": \"Sparta\""));
        assert!(text.contains("No cards were shown"));
        assert!(text.contains("no penalty shootout"));

        let text = prompts
            .facts_prompt(&facts(json!([{ "type": "red_card", "minute": 55, "team": "Slavia" }])))
            .unwrap();
        assert!(text.contains("Cards were shown (1 in total)"));
    }

    #[test]
    fn test_revision_prompt() {
        let prompts = PromptBuilder::new(&AgentConfig::default());
        let text = prompts.revision_prompt("Expand it by at least 60 words.");
        assert!(text.starts_with("Expand it by at least 60 words."));
        assert!(text.contains("do not add new facts"));
    }
}
