//! Lexicon-based sentiment and urgency analysis
//!
//! Writes the canonical `sentiment` record:
//!
//! ```json
//! {"label": "negative", "intensity": 0.8, "urgency": "high", "is_complaint": true, ...}
//! ```

use crate::protocol::messages::Payload;
use crate::protocol::stages::StageId;
use crate::signals::{SentimentLabel, Urgency};
use crate::stages::{ContentStage, StageFailure, annotate_failure, message_text, now_rfc3339};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::json;
use tracing::{debug, warn};

const POSITIVE_WORDS: &[&str] = &[
    "good", "great", "excellent", "amazing", "awesome", "fantastic", "wonderful", "perfect",
    "love", "like", "happy", "pleased", "satisfied", "delighted", "glad", "appreciate", "thank",
    "thanks", "grateful", "helpful", "smooth", "easy", "fast", "quick", "friendly", "reliable",
    "recommend", "impressed", "outstanding", "nice",
];

const NEGATIVE_WORDS: &[&str] = &[
    "bad", "terrible", "horrible", "awful", "worst", "hate", "angry", "frustrated", "annoyed",
    "disappointed", "upset", "mad", "furious", "disgusted", "outraged", "appalled", "worried",
    "confused", "stuck", "broken", "failed", "error", "problem", "issue", "trouble", "slow",
    "delayed", "late", "wrong", "incorrect", "useless", "waste", "poor", "fake", "scam", "fraud",
    "rude", "unprofessional", "unacceptable",
];

const URGENCY_WORDS: &[&str] = &[
    "urgent", "urgently", "emergency", "asap", "immediately", "now", "today", "critical",
    "important", "rush", "soon", "deadline", "expire", "expires", "expired", "overdue", "late",
    "delayed", "missing",
];

const COMPLAINT_WORDS: &[&str] = &[
    "complaint", "complain", "problem", "issue", "wrong", "error", "mistake", "broken",
    "defective", "damaged", "missing", "lost", "delayed", "late", "refund", "return",
    "replacement", "unacceptable", "terrible", "awful", "horrible",
];

const ESCALATION_WORDS: &[&str] = &[
    "manager", "supervisor", "escalate", "lawyer", "legal", "sue", "court", "attorney",
    "corporate", "ceo", "boycott", "press", "public",
];

const INTENSIFIERS: &[&str] = &[
    "very", "extremely", "really", "totally", "completely", "absolutely", "incredibly", "highly",
    "deeply", "truly", "seriously", "so",
];

const NEGATIONS: &[&str] = &[
    "not", "no", "never", "nothing", "hardly", "barely", "without", "doesn't", "don't", "won't",
    "can't", "isn't", "aren't", "wasn't", "weren't", "haven't", "hasn't", "didn't",
];

static WORD: Lazy<Regex> = Lazy::new(|| Regex::new(r"[a-z0-9']+").expect("word pattern is valid"));

static URGENCY_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"\b(today|tonight|this\s+week)\b",
        r"\b(need|want|require).{0,20}(immediately|asap|urgently)\b",
        r"\b(time\s+sensitive|time-sensitive)\b",
        r"\b(deadline|due\s+date)\b",
        r"\bshould\s+have\s+(arrived|come|been\s+here)\b",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("urgency and escalation patterns are valid"))
    .collect()
});

static ESCALATION_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"\bspeak\s+to\s+(your\s+)?(manager|supervisor)\b",
        r"\bthis\s+is\s+unacceptable\b",
        r"\bi\s+will\s+(sue|report)\b",
        r"\b(terrible\s+service|worst\s+experience)\b",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("urgency and escalation patterns are valid"))
    .collect()
});

/// Lexicon score for one message
#[derive(Debug, Clone, PartialEq)]
pub struct SentimentScore {
    pub label: SentimentLabel,
    pub intensity: f64,
    pub score: f64,
    pub keywords: Vec<String>,
}

pub fn score_sentiment(words: &[&str]) -> SentimentScore {
    let mut positive = 0.0_f64;
    let mut negative = 0.0_f64;
    let mut keywords = Vec::new();

    for (i, word) in words.iter().enumerate() {
        let window = &words[i.saturating_sub(2)..i];
        let negated = window.iter().any(|w| NEGATIONS.contains(w));
        let weight = if window.iter().any(|w| INTENSIFIERS.contains(w)) {
            1.5
        } else {
            1.0
        };

        let polarity = if POSITIVE_WORDS.contains(word) {
            1.0
        } else if NEGATIVE_WORDS.contains(word) {
            -1.0
        } else {
            continue;
        };
        let polarity = if negated { -polarity } else { polarity };
        if polarity > 0.0 {
            positive += weight;
        } else {
            negative += weight;
        }
        keywords.push(word.to_string());
    }

    if keywords.is_empty() {
        return SentimentScore {
            label: SentimentLabel::Neutral,
            intensity: 0.0,
            score: 0.0,
            keywords,
        };
    }

    let score = positive - negative;
    let label = if score > 0.5 {
        SentimentLabel::Positive
    } else if score < -0.5 {
        SentimentLabel::Negative
    } else {
        SentimentLabel::Neutral
    };

    SentimentScore {
        label,
        intensity: (score.abs() / keywords.len() as f64).min(1.0),
        score,
        keywords,
    }
}

pub fn score_urgency(text: &str, words: &[&str]) -> (Urgency, u32) {
    let word_hits = words.iter().filter(|w| URGENCY_WORDS.contains(w)).count() as u32;
    let pattern_hits = URGENCY_PATTERNS.iter().filter(|p| p.is_match(text)).count() as u32;
    let score = word_hits + 2 * pattern_hits;

    let level = match score {
        0 => Urgency::Low,
        1..=2 => Urgency::Medium,
        3..=5 => Urgency::High,
        _ => Urgency::Critical,
    };
    (level, score)
}

#[derive(Debug, Clone, Default)]
pub struct SentimentAnalyzer;

impl SentimentAnalyzer {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait::async_trait]
impl ContentStage for SentimentAnalyzer {
    fn id(&self) -> StageId {
        StageId::SentimentAnalyzer
    }

    async fn transform(&self, payload: &Payload) -> Result<Payload, StageFailure> {
        let text = message_text(payload)
            .ok_or_else(|| StageFailure::missing_field("customer_message"))?
            .to_lowercase();
        let words: Vec<&str> = WORD.find_iter(&text).map(|m| m.as_str()).collect();

        let sentiment = score_sentiment(&words);
        let (urgency, urgency_score) = score_urgency(&text, &words);
        let complaint_hits = words.iter().filter(|w| COMPLAINT_WORDS.contains(w)).count();
        let escalation_score = words.iter().filter(|w| ESCALATION_WORDS.contains(w)).count()
            + 3 * ESCALATION_PATTERNS.iter().filter(|p| p.is_match(&text)).count();

        debug!(
            label = ?sentiment.label,
            intensity = sentiment.intensity,
            urgency = ?urgency,
            "Sentiment analyzed"
        );

        let mut out = payload.clone();
        out.set(
            "sentiment",
            json!({
                "label": sentiment.label,
                "intensity": sentiment.intensity,
                "score": sentiment.score,
                "urgency": urgency,
                "urgency_score": urgency_score,
                "is_complaint": complaint_hits >= 2,
                "escalation_needed": escalation_score >= 3,
                "keywords": sentiment.keywords,
                "analysis_method": "rule_based",
                "processed_at": now_rfc3339(),
            }),
        );
        Ok(out)
    }

    /// Neutral sentiment, zero intensity, low urgency
    fn fallback(&self, mut payload: Payload, failure: &StageFailure) -> Payload {
        warn!(error = %failure, "Sentiment analysis failed, using neutral fallback");
        payload.set(
            "sentiment",
            json!({
                "label": SentimentLabel::Neutral,
                "intensity": 0.0,
                "urgency": Urgency::Low,
                "is_complaint": false,
                "escalation_needed": false,
                "analysis_method": "error_fallback",
                "error": failure.to_string(),
            }),
        );
        annotate_failure(&mut payload, self.id(), failure);
        payload
    }
}
