//! Keyword taxonomy for market categories.
//!
//! Matching runs over the market's tags and question, lower-cased, and only
//! counts whole-word hits. The table order is the priority order: the first
//! category with any matching keyword wins.

use crate::types::Category;

const TAXONOMY: &[(Category, &[&str])] = &[
    (
        Category::Politics,
        &[
            "politics", "political", "election", "president", "senate", "congress",
            "congressional", "governor", "mayor", "trump", "biden", "democrat",
            "republican", "vote", "voting", "ballot", "campaign", "primary", "caucus",
            "impeachment", "supreme court", "scotus",
        ],
    ),
    (
        Category::Economics,
        &[
            "economics", "economy", "economic", "inflation", "gdp", "recession",
            "unemployment", "fed", "federal reserve", "interest rate", "stock market",
            "dow", "s&p", "nasdaq", "bitcoin", "btc", "ethereum", "eth", "crypto",
            "cryptocurrency", "defi", "nft", "dollar", "currency", "yuan", "euro",
            "trading", "market cap",
        ],
    ),
    (
        Category::Technology,
        &[
            "technology", "tech", "ai", "artificial intelligence", "machine learning", "ml",
            "llm", "gpt", "chatgpt", "openai", "anthropic", "claude", "google", "apple",
            "microsoft", "meta", "facebook", "twitter", "x", "tesla", "spacex", "neuralink",
            "quantum", "blockchain", "web3", "software", "hardware", "chip", "semiconductor",
            "nvidia", "amd", "intel",
        ],
    ),
    (
        Category::Sports,
        &[
            "sports", "sport", "football", "nfl", "nba", "mlb", "nhl", "soccer", "basketball",
            "baseball", "hockey", "tennis", "golf", "olympics", "super bowl", "world cup",
            "championship", "playoff", "mvp", "heisman", "draft", "trade", "player", "team",
            "coach",
        ],
    ),
    (
        Category::WorldEvents,
        &[
            "world", "international", "war", "conflict", "russia", "ukraine", "china", "iran",
            "israel", "palestine", "middle east", "nato", "un", "united nations", "sanctions",
            "embargo", "trade war", "military", "defense", "nuclear", "missile", "attack",
            "invasion", "peace", "treaty", "summit", "g7", "g20",
        ],
    ),
    (
        Category::Entertainment,
        &[
            "entertainment", "movie", "film", "oscar", "emmy", "grammy", "award", "netflix",
            "disney", "hbo", "streaming", "music", "album", "song", "artist", "actor",
            "actress", "director", "celebrity", "hollywood", "box office",
        ],
    ),
    (
        Category::HealthScience,
        &[
            "health", "medical", "medicine", "disease", "virus", "pandemic", "epidemic",
            "covid", "vaccine", "fda", "clinical trial", "drug", "pharmaceutical", "biotech",
            "research", "study", "scientific", "nasa", "space", "mars", "moon", "climate",
            "global warming", "environment", "green", "renewable", "energy",
        ],
    ),
    (
        Category::Business,
        &[
            "business", "company", "corporate", "merger", "acquisition", "ipo", "bankruptcy",
            "layoff", "hiring", "ceo", "executive", "startup", "unicorn", "venture capital",
            "vc", "earnings", "revenue", "profit", "loss", "quarterly", "annual report",
        ],
    ),
    (
        Category::Legal,
        &[
            "legal", "law", "court", "lawsuit", "trial", "verdict", "judge", "jury",
            "attorney", "lawyer", "crime", "criminal", "arrest", "charges", "indictment",
            "conviction", "prison", "jail", "sentencing",
        ],
    ),
];

/// Classify a market from its tags and question text.
pub fn categorize(tags: &[String], question: &str) -> Category {
    let text = format!("{} {}", tags.join(" "), question).to_lowercase();
    TAXONOMY
        .iter()
        .find(|(_, keywords)| keywords.iter().any(|kw| contains_word(&text, kw)))
        .map(|(category, _)| *category)
        .unwrap_or(Category::Other)
}

#[inline]
fn is_word_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

/// True if `needle` occurs in `haystack` with no word character on either side.
fn contains_word(haystack: &str, needle: &str) -> bool {
    let bytes = haystack.as_bytes();
    haystack.match_indices(needle).any(|(start, _)| {
        let end = start + needle.len();
        let left_ok = start == 0 || !is_word_byte(bytes[start - 1]);
        let right_ok = end == bytes.len() || !is_word_byte(bytes[end]);
        left_ok && right_ok
    })
}
