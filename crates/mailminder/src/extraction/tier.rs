//! Importance scores and the tiers derived from them.

use std::fmt;

use serde::{Deserialize, Serialize};

/// An importance score in `1..=10`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(into = "u8")]
pub struct ImportanceScore(u8);

impl ImportanceScore {
    pub const MIN: u8 = 1;
    pub const MAX: u8 = 10;

    pub fn new(value: i64) -> Option<Self> {
        if (Self::MIN as i64..=Self::MAX as i64).contains(&value) {
            Some(Self(value as u8))
        } else {
            None
        }
    }

    pub fn value(self) -> u8 {
        self.0
    }

    pub fn tier(self) -> Tier {
        Tier::from_score(self)
    }
}

impl From<ImportanceScore> for u8 {
    fn from(score: ImportanceScore) -> u8 {
        score.0
    }
}

impl TryFrom<i64> for ImportanceScore {
    type Error = i64;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        Self::new(value).ok_or(value)
    }
}

impl fmt::Display for ImportanceScore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Importance bucket driving reminder offsets and display color.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    Important,
    Normal,
    Unimportant,
}

impl Tier {
    /// 8..=10 is important, 4..=7 normal, 1..=3 unimportant.
    pub fn from_score(score: ImportanceScore) -> Self {
        match score.value() {
            8..=10 => Tier::Important,
            4..=7 => Tier::Normal,
            _ => Tier::Unimportant,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Important => "important",
            Tier::Normal => "normal",
            Tier::Unimportant => "unimportant",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "important" => Some(Tier::Important),
            "normal" => Some(Tier::Normal),
            "unimportant" => Some(Tier::Unimportant),
            _ => None,
        }
    }

    /// Human label, as shown in the archive.
    pub fn label(&self) -> &'static str {
        match self {
            Tier::Important => "Important",
            Tier::Normal => "Normal",
            Tier::Unimportant => "Unimportant",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
