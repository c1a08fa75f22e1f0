//! Length gate - word-count range check with directional feedback

use matchreport_error::{Error, Result};
use serde::{Deserialize, Serialize};

pub const DEFAULT_MIN_WORDS: usize = 260;
pub const DEFAULT_MAX_WORDS: usize = 340;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LengthStatus {
    Ok,
    TooShort,
    TooLong,
}

/// Outcome of checking one draft against the word range.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LengthVerdict {
    pub count: usize,
    pub min: usize,
    pub max: usize,
    pub status: LengthStatus,
    /// Words to add (positive) or remove (negative); `None` when ok
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delta: Option<i64>,
}

impl LengthVerdict {
    pub fn is_ok(&self) -> bool {
        self.status == LengthStatus::Ok
    }

    /// Words missing below `min`
    pub fn shortfall(&self) -> Option<usize> {
        match self.status {
            LengthStatus::TooShort => Some(self.min - self.count),
            _ => None,
        }
    }

    /// Words over `max`
    pub fn excess(&self) -> Option<usize> {
        match self.status {
            LengthStatus::TooLong => Some(self.count - self.max),
            _ => None,
        }
    }

    /// Midpoint of the range; the length a revision should aim for
    pub fn target(&self) -> usize {
        (self.min + self.max) / 2
    }

    /// Corrective instruction for the next generation attempt.
    ///
    /// Returns `None` for an accepted draft.
    pub fn feedback(&self) -> Option<String> {
        let target = self.target();
        match self.status {
            LengthStatus::Ok => None,
            LengthStatus::TooShort => Some(format!(
                "The draft has {} words, {} short of the minimum of {}. \
                 Expand it by at least {} words (about {} more, aiming for {} words in total) \
                 by elaborating on the facts already given. Do not add new facts.",
                self.count,
                self.min - self.count,
                self.min,
                self.min - self.count,
                target.saturating_sub(self.count),
                target,
            )),
            LengthStatus::TooLong => Some(format!(
                "The draft has {} words, {} over the maximum of {}. \
                 Trim it by at least {} words (about {} fewer, aiming for {} words in total) \
                 while keeping every fact, name, number and minute exactly as given.",
                self.count,
                self.count - self.max,
                self.max,
                self.count - self.max,
                self.count.saturating_sub(target),
                target,
            )),
        }
    }
}

/// Inclusive word-count range check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LengthGate {
    min: usize,
    max: usize,
}

impl Default for LengthGate {
    fn default() -> Self {
        Self {
            min: DEFAULT_MIN_WORDS,
            max: DEFAULT_MAX_WORDS,
        }
    }
}

impl LengthGate {
    pub fn new(min: usize, max: usize) -> Result<Self> {
        if min > max {
            return Err(Error::config_invalid(format!("word range {}..={} is empty", min, max))
                .with_operation("length::new")
                .with_context("min", min.to_string())
                .with_context("max", max.to_string()));
        }
        Ok(Self { min, max })
    }

    pub fn min(&self) -> usize {
        self.min
    }

    pub fn max(&self) -> usize {
        self.max
    }

    pub fn check(&self, text: &str) -> LengthVerdict {
        let count = count_words(text);
        let (status, delta) = if count < self.min {
            (LengthStatus::TooShort, Some((self.min - count) as i64))
        } else if count > self.max {
            (LengthStatus::TooLong, Some(-((count - self.max) as i64)))
        } else {
            (LengthStatus::Ok, None)
        };

        LengthVerdict {
            count,
            min: self.min,
            max: self.max,
            status,
            delta,
        }
    }
}

/// Number of whitespace-delimited tokens
pub fn count_words(text: &str) -> usize {
    text.split_whitespace().count()
}
