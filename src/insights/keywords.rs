// src/insights/keywords.rs
// Frequency-based theme-keyword extraction over issue summaries, used by
// both clustering (cluster themes) and bug-pattern grouping (common terms).

use std::collections::HashMap;

const STOPWORDS: &[&str] = &[
    "the", "a", "an", "and", "or", "but", "in", "on", "at", "to", "for", "of", "with", "by",
    "from", "as", "is", "was", "are", "be", "been", "being", "have", "has", "had", "do", "does",
    "did", "will", "would", "could", "should", "may", "might", "must", "shall", "can", "need",
    "not", "this", "that", "these", "those", "it", "its", "we", "they", "them", "their", "our",
    "your", "my", "all", "any", "some", "no", "when", "where", "how", "what", "which", "who",
    "why", "if", "then", "than", "so", "just", "only", "also", "very", "too", "more", "most",
    "other", "into", "over", "after", "before", "between",
];

fn is_stopword(word: &str) -> bool {
    STOPWORDS.contains(&word)
}

/// Extract the `top_k` most frequent non-stopword tokens (length > 2)
/// across `texts`. Ties are broken by first-encountered order.
pub fn extract_keywords(texts: &[String], top_k: usize) -> Vec<(String, usize)> {
    let mut order: Vec<String> = Vec::new();
    let mut counts: HashMap<String, usize> = HashMap::new();

    for text in texts {
        for raw_token in text.to_lowercase().split_whitespace() {
            let token: String = raw_token.chars().filter(|c| c.is_alphanumeric()).collect();
            if token.chars().count() <= 2 || is_stopword(&token) {
                continue;
            }
            if !counts.contains_key(&token) {
                order.push(token.clone());
            }
            *counts.entry(token).or_insert(0) += 1;
        }
    }

    let mut ranked: Vec<(String, usize)> = order.into_iter().map(|word| {
        let count = counts[&word];
        (word, count)
    }).collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1));
    ranked.truncate(top_k);
    ranked
}
