//! Knowledge base article lookup keyed by intent

use crate::protocol::messages::Payload;
use crate::protocol::stages::StageId;
use crate::signals::Signals;
use crate::stages::{ContentStage, StageFailure, annotate_failure};
use serde::Serialize;
use serde_json::{Value, json};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Article {
    pub content: &'static str,
    pub source: &'static str,
    pub relevance_score: f64,
}

const GENERAL_ARTICLE: Article = Article {
    content: "For assistance, please contact our support team.",
    source: "general_support.md",
    relevance_score: 0.5,
};

/// Articles for `intent`, or the general support article
pub fn articles_for(intent: &str) -> Vec<Article> {
    let article = |content, source, relevance_score| Article {
        content,
        source,
        relevance_score,
    };
    match intent {
        "refund_request" => vec![article(
            "Refunds are processed within 5-7 business days. Contact support with the order ID.",
            "refund_policy.md",
            0.9,
        )],
        "order_cancellation" => vec![article(
            "Orders can be cancelled until they leave the warehouse.",
            "cancellation_policy.md",
            0.9,
        )],
        "delivery_issue" | "shipping_change" => vec![
            article(
                "Tracking updates can take up to 24 hours to appear after dispatch.",
                "shipping_faq.md",
                0.85,
            ),
            article(
                "Address changes are possible while the order is still processing.",
                "address_changes.md",
                0.7,
            ),
        ],
        "technical_support" | "product_issue" => vec![article(
            "For technical issues, restart the device and check for firmware updates.",
            "troubleshooting.md",
            0.85,
        )],
        "billing_inquiry" | "payment_issue" => vec![article(
            "Charges appear under the merchant name and may take 3 days to settle.",
            "billing_faq.md",
            0.8,
        )],
        _ => vec![GENERAL_ARTICLE],
    }
}

#[derive(Debug, Clone, Default)]
pub struct KnowledgeRetriever;

impl KnowledgeRetriever {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait::async_trait]
impl ContentStage for KnowledgeRetriever {
    fn id(&self) -> StageId {
        StageId::KnowledgeRetriever
    }

    async fn transform(&self, payload: &Payload) -> Result<Payload, StageFailure> {
        let signals = Signals::from_payload(payload);
        let articles = articles_for(signals.intent_kind().unwrap_or("general_inquiry"));
        debug!(count = articles.len(), "Knowledge articles retrieved");

        let mut out = payload.clone();
        out.set(
            "context_sources",
            Value::from(articles.iter().map(|a| Value::from(a.source)).collect::<Vec<_>>()),
        );
        out.set("knowledge_context", json!(articles));
        Ok(out)
    }

    /// Empty article list
    fn fallback(&self, mut payload: Payload, failure: &StageFailure) -> Payload {
        payload.set("knowledge_context", json!([]));
        payload.set("context_sources", json!([]));
        annotate_failure(&mut payload, self.id(), failure);
        payload
    }
}
