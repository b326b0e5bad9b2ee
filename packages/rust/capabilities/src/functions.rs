//! Local text-analysis functions exposed as capabilities.

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use sitescribe_shared::{Result, SiteScribeError};

/// An invokable local analysis function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisFn {
    KeywordDensity,
    ReadingEase,
}

impl AnalysisFn {
    /// Stable name used as the capability name and in requests.
    pub fn name(&self) -> &'static str {
        match self {
            Self::KeywordDensity => "keyword_density",
            Self::ReadingEase => "reading_ease",
        }
    }

    /// Invoke the function with JSON arguments.
    pub fn invoke(&self, args: &Value) -> Result<Value> {
        let text = args
            .get("text")
            .and_then(Value::as_str)
            .ok_or_else(|| SiteScribeError::validation("missing 'text' argument"))?;

        match self {
            Self::KeywordDensity => {
                let keyword = args
                    .get("keyword")
                    .and_then(Value::as_str)
                    .ok_or_else(|| SiteScribeError::validation("missing 'keyword' argument"))?;
                Ok(json!(keyword_density(text, keyword)))
            }
            Self::ReadingEase => Ok(json!(reading_ease(text))),
        }
    }
}

/// Percentage of `text`'s token windows matching `keyword`'s token
/// sequence, rounded to two decimals.
pub fn keyword_density(text: &str, keyword: &str) -> f64 {
    let word = Regex::new(r"\w+").unwrap();
    let tokens: Vec<String> = word
        .find_iter(&text.to_lowercase())
        .map(|m| m.as_str().to_string())
        .collect();
    let kw_tokens: Vec<String> = word
        .find_iter(&keyword.to_lowercase())
        .map(|m| m.as_str().to_string())
        .collect();

    if kw_tokens.is_empty() {
        return 0.0;
    }

    let hits = (0..tokens.len())
        .filter(|&i| tokens[i..].starts_with(&kw_tokens))
        .count();

    round2(100.0 * hits as f64 / tokens.len().max(1) as f64)
}

/// Flesch reading-ease estimate. An English-centric metric, but usable as a
/// relative score across drafts in any language.
pub fn reading_ease(text: &str) -> f64 {
    let words: Vec<&str> = text.split_whitespace().collect();
    if words.is_empty() {
        return 0.0;
    }

    let sentences = text
        .chars()
        .filter(|c| matches!(c, '.' | '!' | '?'))
        .count()
        .max(1);
    let syllables: usize = words.iter().map(|w| syllable_estimate(w)).sum();

    let word_count = words.len() as f64;
    let score = 206.835 - 1.015 * (word_count / sentences as f64)
        - 84.6 * (syllables as f64 / word_count);
    round2(score)
}

/// Rough syllable count: runs of vowels, at least one per word.
fn syllable_estimate(word: &str) -> usize {
    let mut count = 0;
    let mut in_group = false;
    for c in word.to_lowercase().chars() {
        let is_vowel = matches!(c, 'a' | 'e' | 'i' | 'o' | 'u' | 'y');
        if is_vowel && !in_group {
            count += 1;
        }
        in_group = is_vowel;
    }
    count.max(1)
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}
