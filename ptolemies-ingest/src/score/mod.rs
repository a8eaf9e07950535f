//! Scalar quality score per fragment and topic extraction (C4).
//!
//! Weights and vocabulary are configuration, not code, per the design notes;
//! this module only defines the pure scoring function over whatever
//! vocabulary/weights the caller supplies.

use std::collections::HashMap;

#[derive(Debug, Clone)]
pub struct ScoringConfig {
    pub optimal_len_low: usize,
    pub optimal_len_high: usize,
    /// term -> topic category, used for both density scoring and topic
    /// extraction.
    pub vocabulary: HashMap<String, String>,
    pub weight_length: f64,
    pub weight_density: f64,
    pub weight_code: f64,
    pub weight_url_penalty: f64,
    pub weight_boilerplate_penalty: f64,
    pub topics_k: usize,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            optimal_len_low: 600,
            optimal_len_high: 900,
            vocabulary: HashMap::new(),
            weight_length: 0.35,
            weight_density: 0.35,
            weight_code: 0.15,
            weight_url_penalty: 0.1,
            weight_boilerplate_penalty: 0.05,
            topics_k: 8,
        }
    }
}

static URL_PATTERN: &str = "http";
static BOILERPLATE_NGRAMS: &[&str] = &["click here", "all rights reserved", "cookie policy", "subscribe now"];

fn length_factor(len: usize, low: usize, high: usize) -> f64 {
    if len < low {
        (len as f64 / low as f64).clamp(0.0, 1.0)
    } else if len <= high {
        1.0
    } else {
        let overshoot = (len - high) as f64 / high as f64;
        (1.0 - overshoot).clamp(0.0, 1.0)
    }
}

fn term_frequencies(content: &str, vocabulary: &HashMap<String, String>) -> HashMap<String, usize> {
    let lower = content.to_lowercase();
    let mut freqs = HashMap::new();
    for term in vocabulary.keys() {
        let count = lower.matches(term.as_str()).count();
        if count > 0 {
            freqs.insert(term.clone(), count);
        }
    }
    freqs
}

pub struct ScoredChunk {
    pub score: f64,
    pub topics: Vec<String>,
}

/// `score(chunk) -> float in [0,1]` and `topics(chunk) -> multiset<string>`.
pub fn score(content: &str, has_code: bool, config: &ScoringConfig) -> ScoredChunk {
    let len = content.chars().count();
    let length_score = length_factor(len, config.optimal_len_low, config.optimal_len_high);

    let freqs = term_frequencies(content, &config.vocabulary);
    let total_terms: usize = freqs.values().sum();
    let density_score = if len == 0 {
        0.0
    } else {
        (total_terms as f64 * 50.0 / len as f64).clamp(0.0, 1.0)
    };

    let code_score = if has_code { 1.0 } else { 0.0 };

    let lower = content.to_lowercase();
    let url_hits = lower.matches(URL_PATTERN).count();
    let url_penalty = (url_hits as f64 * 0.2).clamp(0.0, 1.0);

    let boilerplate_hits = BOILERPLATE_NGRAMS.iter().filter(|ng| lower.contains(*ng)).count();
    let boilerplate_penalty = (boilerplate_hits as f64 * 0.3).clamp(0.0, 1.0);

    let raw = config.weight_length * length_score
        + config.weight_density * density_score
        + config.weight_code * code_score
        - config.weight_url_penalty * url_penalty
        - config.weight_boilerplate_penalty * boilerplate_penalty;

    let score = raw.clamp(0.0, 1.0);

    let mut ranked: Vec<(String, usize)> = freqs
        .into_iter()
        .map(|(term, count)| (config.vocabulary.get(&term).cloned().unwrap_or(term), count))
        .collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    let topics = ranked.into_iter().take(config.topics_k).map(|(t, _)| t).collect();

    ScoredChunk { score, topics }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vocab() -> HashMap<String, String> {
        let mut m = HashMap::new();
        m.insert("async".to_string(), "async".to_string());
        m.insert("router".to_string(), "routing".to_string());
        m
    }

    #[test]
    fn optimal_length_scores_highly() {
        let content = "word ".repeat(150); // ~750 chars, in the optimal band
        let config = ScoringConfig::default();
        let result = score(&content, false, &config);
        assert!(result.score > 0.2);
    }

    #[test]
    fn url_heavy_content_is_penalized() {
        let mut config = ScoringConfig::default();
        config.vocabulary = vocab();
        let clean = score(&"a ".repeat(400), false, &config);
        let spammy = score(&"http http http http ".repeat(80), false, &config);
        assert!(spammy.score <= clean.score);
    }

    #[test]
    fn topics_limited_to_k() {
        let mut config = ScoringConfig::default();
        config.vocabulary = vocab();
        config.topics_k = 1;
        let result = score("async router async router async", false, &config);
        assert_eq!(result.topics.len(), 1);
    }
}
