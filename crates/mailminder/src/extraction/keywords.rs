//! Keyword classification of a message at save time.

use serde::{Deserialize, Serialize};

use crate::config::KeywordsConfig;

use super::tier::Tier;

/// One configured keyword found in a message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeywordMatch {
    pub tier: Tier,
    pub keyword: String,
}

/// Case-insensitive substring matcher over the configured keyword lists.
#[derive(Debug, Clone)]
pub struct KeywordMatcher {
    important: Vec<String>,
    normal: Vec<String>,
    unimportant: Vec<String>,
}

impl KeywordMatcher {
    pub fn new(config: &KeywordsConfig) -> Self {
        let lower = |words: &[String]| -> Vec<String> {
            words
                .iter()
                .map(|w| w.trim().to_lowercase())
                .filter(|w| !w.is_empty())
                .collect()
        };
        Self {
            important: lower(&config.important),
            normal: lower(&config.normal),
            unimportant: lower(&config.unimportant),
        }
    }

    /// Returns the matches of the highest-precedence tier that matched.
    ///
    /// Important wins over unimportant, which wins over normal.
    pub fn classify(&self, subject: &str, body: &str) -> Vec<KeywordMatch> {
        let text = format!("{}\n{}", subject, body).to_lowercase();

        for (tier, words) in [
            (Tier::Important, &self.important),
            (Tier::Unimportant, &self.unimportant),
            (Tier::Normal, &self.normal),
        ] {
            let matches: Vec<KeywordMatch> = words
                .iter()
                .filter(|w| text.contains(w.as_str()))
                .map(|w| KeywordMatch {
                    tier,
                    keyword: w.clone(),
                })
                .collect();
            if !matches.is_empty() {
                return matches;
            }
        }
        Vec::new()
    }
}
