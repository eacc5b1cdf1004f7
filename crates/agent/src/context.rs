//! Per-conversation entity memory.
//!
//! A [`ConversationContext`] keeps the domain objects an operator mentioned
//! recently, newest first and bounded per category, plus a short intent
//! history used to interpret follow-ups such as "also" or "another one".

use std::collections::{BTreeMap, VecDeque};
use std::sync::LazyLock;

use chrono::{DateTime, Duration, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};

use storedesk_core::domain::entity::{EntityCategory, EntityMention};

pub const ENTITY_LIMIT: usize = 10;
pub const INTENT_HISTORY_LIMIT: usize = 10;
pub const HYDRATION_TURNS: usize = 5;
pub const DEFAULT_FRESHNESS_MINUTES: i64 = 30;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnRole {
    User,
    Assistant,
}

/// One raw message from the chat transport's history.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: TurnRole,
    pub text: String,
}

impl ChatTurn {
    pub fn user(text: impl Into<String>) -> Self {
        Self { role: TurnRole::User, text: text.into() }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self { role: TurnRole::Assistant, text: text.into() }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct IntentHistoryEntry {
    pub intent: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Clone, Debug)]
pub struct ConversationContext {
    entities: BTreeMap<EntityCategory, VecDeque<String>>,
    last_mentioned: BTreeMap<EntityCategory, String>,
    // Monotonic stamp of the latest live mention per category, used to pick
    // between categories that share a pronoun.
    mention_order: BTreeMap<EntityCategory, u64>,
    mention_counter: u64,
    intent_history: VecDeque<IntentHistoryEntry>,
    last_update: DateTime<Utc>,
    hydrated: bool,
}

impl Default for ConversationContext {
    fn default() -> Self {
        Self::new_at(Utc::now())
    }
}

impl ConversationContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn new_at(now: DateTime<Utc>) -> Self {
        Self {
            entities: BTreeMap::new(),
            last_mentioned: BTreeMap::new(),
            mention_order: BTreeMap::new(),
            mention_counter: 0,
            intent_history: VecDeque::new(),
            last_update: now,
            hydrated: false,
        }
    }

    pub fn record(&mut self, category: EntityCategory, value: &str) {
        self.record_at(category, value, Utc::now());
    }

    /// Puts `value` at the front of its category list. A value that is
    /// already remembered moves to the front instead of being duplicated.
    pub fn record_at(&mut self, category: EntityCategory, value: &str, now: DateTime<Utc>) {
        let value = value.trim();
        if value.is_empty() {
            return;
        }

        let values = self.entities.entry(category).or_default();
        values.retain(|existing| existing != value);
        values.push_front(value.to_string());
        values.truncate(ENTITY_LIMIT);

        self.last_mentioned.insert(category, value.to_string());
        self.mention_counter += 1;
        self.mention_order.insert(category, self.mention_counter);
        self.last_update = now;
    }

    pub fn record_mentions(&mut self, mentions: &[EntityMention], now: DateTime<Utc>) {
        for mention in mentions {
            self.record_at(mention.category, &mention.value, now);
        }
    }

    pub fn last(&self, category: EntityCategory) -> Option<&str> {
        self.last_mentioned.get(&category).map(String::as_str)
    }

    pub fn all(&self, category: EntityCategory) -> Vec<&str> {
        self.entities
            .get(&category)
            .map(|values| values.iter().map(String::as_str).collect())
            .unwrap_or_default()
    }

    /// Most recently mentioned category among `categories` that has a value.
    pub fn most_recent_of(&self, categories: &[EntityCategory]) -> Option<EntityCategory> {
        categories
            .iter()
            .copied()
            .filter(|category| self.last_mentioned.contains_key(category))
            .max_by_key(|category| self.mention_order.get(category).copied().unwrap_or(0))
    }

    pub fn is_fresh(&self, max_age: Duration) -> bool {
        self.is_fresh_at(Utc::now(), max_age)
    }

    pub fn is_fresh_at(&self, now: DateTime<Utc>, max_age: Duration) -> bool {
        now.signed_duration_since(self.last_update) <= max_age
    }

    pub fn last_update(&self) -> DateTime<Utc> {
        self.last_update
    }

    pub fn is_hydrated(&self) -> bool {
        self.hydrated
    }

    pub fn reset(&mut self) {
        *self = Self::new_at(Utc::now());
    }

    pub fn record_intent(&mut self, intent: &str, message: &str, now: DateTime<Utc>) {
        self.intent_history.push_back(IntentHistoryEntry {
            intent: intent.to_string(),
            message: message.to_string(),
            timestamp: now,
        });
        while self.intent_history.len() > INTENT_HISTORY_LIMIT {
            self.intent_history.pop_front();
        }
        self.last_update = now;
    }

    pub fn last_intent(&self) -> Option<&IntentHistoryEntry> {
        self.intent_history.back()
    }

    pub fn intent_history(&self) -> impl Iterator<Item = &IntentHistoryEntry> {
        self.intent_history.iter()
    }

    /// Backfills entities from the last few raw turns. Runs at most once per
    /// context; later calls return 0. Backfilled values are older than any
    /// live mention, so they go behind existing entries and never replace
    /// `last_mentioned`.
    pub fn hydrate_from_history(&mut self, turns: &[ChatTurn]) -> usize {
        if self.hydrated {
            return 0;
        }
        self.hydrated = true;

        let mut added = 0;
        let start = turns.len().saturating_sub(HYDRATION_TURNS);
        for turn in turns[start..].iter().rev() {
            for mention in extract_entities(&turn.text).into_iter().rev() {
                let values = self.entities.entry(mention.category).or_default();
                if values.len() >= ENTITY_LIMIT || values.iter().any(|v| v == &mention.value) {
                    continue;
                }
                values.push_back(mention.value.clone());
                self.last_mentioned.entry(mention.category).or_insert(mention.value);
                added += 1;
            }
        }
        added
    }
}

static ORDER_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\border\s*(?:#\s*|no\.?\s*|number\s*)?(\d{2,})\b").expect("valid regex")
});
static QUOTED_PRODUCT_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#""([^"]{2,60})""#).expect("valid regex"));
static NAMED_PRODUCT_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(?:named|called|product)\s+([A-Z0-9][\w\-]*(?:\s+[A-Z0-9][\w\-]*)*)")
        .expect("valid regex")
});
static EMAIL_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b[\w.+\-]+@[\w\-]+\.[\w.\-]*[A-Za-z]\b").expect("valid regex")
});
static CUSTOMER_NAME_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(?:[Cc]ustomer|[Cc]lient)\s+([A-Z][a-z]+(?:\s+[A-Z][a-z]+)?)")
        .expect("valid regex")
});
static CATEGORY_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bcategory\s+([A-Za-z][\w\-]*)|\bthe\s+([A-Za-z][\w\-]*)\s+category\b")
        .expect("valid regex")
});
static PRICE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)[$€£]\s?\d+(?:[.,]\d{1,2})?|\b\d+(?:[.,]\d{1,2})?\s?(?:usd|eur|gbp|dollars?|euros?)\b",
    )
    .expect("valid regex")
});
static QUANTITY_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b\d+\s+(?:units?|pieces?|pcs|items?|boxes|box|packs?)\b").expect("valid regex")
});
static DATE_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b\d{4}-\d{2}-\d{2}\b").expect("valid regex"));
static DOCUMENT_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(invoice|receipt|packing\s+slip)\s*(?:#|no\.?|number)?\s*(\d+)\b")
        .expect("valid regex")
});

/// Pulls entity mentions out of free text with the fixed per-category
/// patterns, in category order and then text order.
pub fn extract_entities(text: &str) -> Vec<EntityMention> {
    let mut mentions = Vec::new();

    for captures in QUOTED_PRODUCT_PATTERN.captures_iter(text) {
        push_mention(&mut mentions, EntityCategory::Product, &captures[1]);
    }
    for captures in NAMED_PRODUCT_PATTERN.captures_iter(text) {
        push_mention(&mut mentions, EntityCategory::Product, &captures[1]);
    }
    for captures in ORDER_PATTERN.captures_iter(text) {
        push_mention(&mut mentions, EntityCategory::Order, &format!("#{}", &captures[1]));
    }
    for found in EMAIL_PATTERN.find_iter(text) {
        push_mention(&mut mentions, EntityCategory::Customer, found.as_str());
    }
    for captures in CUSTOMER_NAME_PATTERN.captures_iter(text) {
        push_mention(&mut mentions, EntityCategory::Customer, &captures[1]);
    }
    for captures in CATEGORY_PATTERN.captures_iter(text) {
        if let Some(name) = captures.get(1).or_else(|| captures.get(2)) {
            push_mention(&mut mentions, EntityCategory::Category, &name.as_str().to_lowercase());
        }
    }
    for found in PRICE_PATTERN.find_iter(text) {
        push_mention(&mut mentions, EntityCategory::Price, found.as_str());
    }
    for found in QUANTITY_PATTERN.find_iter(text) {
        push_mention(&mut mentions, EntityCategory::Quantity, &found.as_str().to_lowercase());
    }
    for found in DATE_PATTERN.find_iter(text) {
        push_mention(&mut mentions, EntityCategory::Date, found.as_str());
    }
    for captures in DOCUMENT_PATTERN.captures_iter(text) {
        let kind = captures[1].split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase();
        push_mention(&mut mentions, EntityCategory::Document, &format!("{kind} #{}", &captures[2]));
    }

    mentions
}

fn push_mention(mentions: &mut Vec<EntityMention>, category: EntityCategory, value: &str) {
    let value = value.trim();
    if value.is_empty()
        || mentions.iter().any(|mention| mention.category == category && mention.value == value)
    {
        return;
    }
    mentions.push(EntityMention::new(category, value));
}
