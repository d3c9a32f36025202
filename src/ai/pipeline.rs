//! Retrieval-augmented chat
//!
//! One request, one pass: stock shortcut, policy scan, or retrieval plus a
//! model call with at most one continuation.

use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, instrument, warn};

use super::intent::{classify, Intent, PolicyCategory, POLICY_TITLE};
use super::sanitize::{clean_answer, ends_sentence, looks_degenerate, merge_no_overlap, tail};
use super::{AiError, ChatPrompt, ContextItem, Embedder, LanguageModel};
use crate::domain::aggregates::KnowledgeRecord;
use crate::storage::KnowledgeStore;

const SEARCH_LIMIT: usize = 8;
const MAX_CONTEXT_ITEMS: usize = 3;
const MAX_POLICY_CHARS: usize = 2000;
const CONTINUATION_TAIL: usize = 280;

pub const CLARIFICATION: &str =
    "Sorry, I couldn't find complete information for that. Could you ask a bit more specifically?";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplyMode {
    StockShortcut,
    DirectPolicy,
    PolicyFallback,
    Retrieval,
    Clarification,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ContextUsed {
    Product { product: Value, reason: &'static str },
    Items(Vec<ContextItem>),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatReply {
    pub answer: String,
    pub context_used: ContextUsed,
    pub mode: ReplyMode,
}

#[derive(Debug, Clone)]
pub struct AssistantSettings {
    pub store_name: String,
    pub language: String,
}

#[derive(Clone)]
pub struct ChatPipeline {
    knowledge: Arc<dyn KnowledgeStore>,
    embedder: Arc<dyn Embedder>,
    model: Arc<dyn LanguageModel>,
    settings: AssistantSettings,
}

enum Stock { Count(f64), InStock, OutOfStock }

impl ChatPipeline {
    pub fn new(
        knowledge: Arc<dyn KnowledgeStore>,
        embedder: Arc<dyn Embedder>,
        model: Arc<dyn LanguageModel>,
        settings: AssistantSettings,
    ) -> Self {
        Self { knowledge, embedder, model, settings }
    }

    /// Only main-call model failures are errors; every other failure degrades.
    #[instrument(skip(self, message, product), fields(message_len = message.len()))]
    pub async fn answer(&self, message: &str, product: Option<&Value>) -> Result<ChatReply, AiError> {
        let intent = classify(message);

        if intent.stock_inquiry {
            if let Some(reply) = product.filter(|p| p.is_object()).and_then(stock_reply) {
                return Ok(reply);
            }
        }

        if intent.policy {
            return Ok(self.policy_reply(&intent).await);
        }

        self.retrieval_reply(message, &intent).await
    }

    async fn policy_reply(&self, intent: &Intent) -> ChatReply {
        match self.knowledge.list_all().await {
            Ok(records) => {
                let candidates = policy_candidates(&records, intent.category);
                let best = candidates.iter().fold("", |best, r| {
                    if r.text.chars().count() > best.chars().count() { r.text.as_str() } else { best }
                });
                if !best.is_empty() {
                    let answer: String = best.chars().take(MAX_POLICY_CHARS).collect();
                    return ChatReply {
                        answer: answer.trim().to_string(),
                        context_used: ContextUsed::Items(
                            candidates.iter().take(MAX_CONTEXT_ITEMS).map(|r| ContextItem { title: r.title.clone(), text: r.text.clone() }).collect(),
                        ),
                        mode: ReplyMode::DirectPolicy,
                    };
                }
                debug!("No policy text in knowledge store");
            }
            Err(e) => warn!(error = %e, "Policy lookup failed, using canned answer"),
        }
        ChatReply {
            answer: canned_policy(intent.category).to_string(),
            context_used: ContextUsed::Items(Vec::new()),
            mode: ReplyMode::PolicyFallback,
        }
    }

    async fn retrieve(&self, message: &str, category: Option<PolicyCategory>) -> Result<Vec<ContextItem>, AiError> {
        let vector = self.embedder.embed(message).await?;
        let hits = self
            .knowledge
            .search(&vector, SEARCH_LIMIT)
            .await
            .map_err(|e| AiError::InvalidResponse(e.to_string()))?;
        let filtered: Vec<_> = match category {
            Some(c) => hits.iter().filter(|h| h.tags.iter().any(|t| c.tag_pattern().is_match(t))).collect(),
            None => hits.iter().collect(),
        };
        let picked = if filtered.is_empty() { hits.iter().collect() } else { filtered };
        Ok(picked.into_iter().take(MAX_CONTEXT_ITEMS).map(|h| ContextItem { title: h.title.clone(), text: h.text.clone() }).collect())
    }

    fn system_prompt(&self) -> String {
        format!(
            "You are the customer support assistant of {}.\n\
             - Always reply in {}, concisely (at most 3 sentences) and to the point.\n\
             - Use only the information in CONTEXT for refunds/returns, shipping, warranty and payment.\n\
             - If CONTEXT is not enough, ask one clarifying question.",
            self.settings.store_name, self.settings.language
        )
    }

    async fn retrieval_reply(&self, message: &str, intent: &Intent) -> Result<ChatReply, AiError> {
        let context = match self.retrieve(message, intent.category).await {
            Ok(items) => items,
            Err(e) => {
                warn!(error = %e, "Retrieval failed, answering without context");
                Vec::new()
            }
        };

        let prompt = ChatPrompt { system: self.system_prompt(), user: message.to_string(), context };
        let mut answer = clean_answer(&self.model.chat(&prompt).await?);

        if looks_degenerate(&answer) {
            return Ok(ChatReply {
                answer: CLARIFICATION.to_string(),
                context_used: ContextUsed::Items(prompt.context),
                mode: ReplyMode::Clarification,
            });
        }

        if !ends_sentence(&answer) {
            let follow_up = ChatPrompt {
                system: String::new(),
                user: format!(
                    "Continue the unfinished text below. Write only the continuation, without repeating it and without any preamble.\n\n[SO FAR]\n{}\n\n[CONTINUE]",
                    tail(answer.trim(), CONTINUATION_TAIL)
                ),
                context: prompt.context.clone(),
            };
            match self.model.chat(&follow_up).await {
                Ok(raw) => {
                    let cont = clean_answer(&raw);
                    if !looks_degenerate(&cont) {
                        answer = merge_no_overlap(&answer, &cont);
                    }
                }
                Err(e) => warn!(error = %e, "Continuation failed"),
            }
        }

        Ok(ChatReply { answer, context_used: ContextUsed::Items(prompt.context), mode: ReplyMode::Retrieval })
    }
}

/// Tagged records for the category, else policy-titled records, else all.
fn policy_candidates(records: &[KnowledgeRecord], category: Option<PolicyCategory>) -> Vec<&KnowledgeRecord> {
    let tagged: Vec<&KnowledgeRecord> = match category {
        Some(c) => records.iter().filter(|r| r.has_tag(c.tag_pattern())).collect(),
        None => records.iter().collect(),
    };
    if !tagged.is_empty() {
        return tagged;
    }
    let titled: Vec<&KnowledgeRecord> = records.iter().filter(|r| POLICY_TITLE.is_match(&r.title)).collect();
    if !titled.is_empty() {
        return titled;
    }
    records.iter().collect()
}

fn canned_policy(category: Option<PolicyCategory>) -> &'static str {
    match category {
        Some(PolicyCategory::Shipping) => "Shipping policy:\n\
            - We deliver nationwide through our shipping partners.\n\
            - Delivery takes 2 to 7 days depending on the address, with a tracking code for every order.\n\
            - Shipping fees are shown at checkout.\n\
            - Contact customer support if you need help with a delivery.",
        Some(PolicyCategory::Refund) => "Return policy:\n\
            - Returns are accepted within 7 days of receipt with tags and labels intact.\n\
            - Manufacturer defects are exchanged or refunded according to our terms.\n\
            - Used items or items damaged by the buyer cannot be returned.\n\
            - Contact customer support for step-by-step instructions.",
        Some(PolicyCategory::Warranty) => "Warranty policy:\n\
            - Products are covered by the manufacturer's warranty where one exists.\n\
            - Please keep your invoice or receipt for warranty claims.\n\
            - Contact customer support to confirm the warranty period and service point.",
        Some(PolicyCategory::Payment) => "Payment policy:\n\
            - We accept international cards, e-wallets and cash on delivery where available.\n\
            - Payments are encrypted and processed by our payment partners.\n\
            - A receipt is emailed to you after payment.",
        None => "Store policies:\n\
            - Return, shipping, warranty and payment policies apply as currently published.\n\
            - Please contact customer support for guidance on your case.",
    }
}

fn number(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) if !s.trim().is_empty() => s.trim().parse().ok(),
        _ => None,
    }
    .filter(|n: &f64| n.is_finite())
}

fn resolve_stock(product: &Value) -> Option<Stock> {
    let raw = ["stock", "stockQty", "quantity", "remain"].iter().find_map(|k| product.get(*k).filter(|v| !v.is_null()));
    if let Some(n) = raw.and_then(number) {
        return Some(Stock::Count(n));
    }
    if let Some(b) = product.get("inStock").and_then(Value::as_bool) {
        return Some(if b { Stock::InStock } else { Stock::OutOfStock });
    }
    let text = product.get("stockText").filter(|v| !v.is_null())?;
    let text = text.as_str().map(str::to_string).unwrap_or_else(|| text.to_string()).to_lowercase();
    if ["out of stock", "hết hàng", "sold out"].iter().any(|k| text.contains(k)) {
        return Some(Stock::OutOfStock);
    }
    let digits: String = text.chars().skip_while(|c| !c.is_ascii_digit()).take_while(char::is_ascii_digit).collect();
    if let Ok(n) = digits.parse::<u64>() {
        if n > 0 {
            return Some(Stock::Count(n as f64));
        }
    }
    if ["in stock", "còn hàng", "available"].iter().any(|k| text.contains(k)) {
        return Some(Stock::InStock);
    }
    None
}

fn stock_reply(product: &Value) -> Option<ChatReply> {
    let stock = resolve_stock(product)?;
    let name = ["name", "title"]
        .iter()
        .find_map(|k| product.get(*k).and_then(Value::as_str).filter(|s| !s.trim().is_empty()))
        .unwrap_or("This product");
    let answer = match stock {
        Stock::Count(n) if n > 0.0 => format!("{name} currently has {} in stock.", format_count(n)),
        Stock::Count(_) | Stock::OutOfStock => format!("{name} is currently out of stock."),
        Stock::InStock => format!("{name} is in stock."),
    };
    Some(ChatReply {
        answer,
        context_used: ContextUsed::Product { product: product.clone(), reason: "stock_shortcut" },
        mode: ReplyMode::StockShortcut,
    })
}

fn format_count(n: f64) -> String {
    if n.fract() == 0.0 { format!("{}", n as i64) } else { n.to_string() }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_stock_resolution() {
        let r = stock_reply(&json!({ "name": "Figure", "stock": 5 })).unwrap();
        assert_eq!(r.answer, "Figure currently has 5 in stock.");
        assert_eq!(r.mode, ReplyMode::StockShortcut);
        assert_eq!(stock_reply(&json!({ "title": "Mask", "stockQty": "0" })).unwrap().answer, "Mask is currently out of stock.");
        assert_eq!(stock_reply(&json!({ "inStock": true })).unwrap().answer, "This product is in stock.");
        assert_eq!(stock_reply(&json!({ "name": "Belt", "stockText": "Only 3 left" })).unwrap().answer, "Belt currently has 3 in stock.");
        assert_eq!(stock_reply(&json!({ "name": "Belt", "stockText": "Sold out" })).unwrap().answer, "Belt is currently out of stock.");
        assert!(stock_reply(&json!({ "name": "Belt", "stock": "lots" })).is_none());
        assert!(stock_reply(&json!({ "name": "Belt" })).is_none());
    }

    #[test]
    fn test_policy_candidates_fall_back() {
        let rec = |title: &str, tags: &[&str]| KnowledgeRecord {
            id: uuid::Uuid::new_v4(), title: title.into(), text: "t".into(),
            tags: tags.iter().map(|t| t.to_string()).collect(), embedding: vec![],
            created_at: chrono::Utc::now(), source: Default::default(),
        };
        let records = vec![rec("Returns", &["refund"]), rec("Shipping policy", &[]), rec("About us", &[])];
        assert_eq!(policy_candidates(&records, Some(PolicyCategory::Refund))[0].title, "Returns");
        let warranty = policy_candidates(&records, Some(PolicyCategory::Warranty));
        assert_eq!(warranty.len(), 1);
        assert_eq!(warranty[0].title, "Shipping policy");
        assert_eq!(policy_candidates(&records, None).len(), 3);
        assert_eq!(policy_candidates(&records[2..], Some(PolicyCategory::Payment)).len(), 1);
    }
}
