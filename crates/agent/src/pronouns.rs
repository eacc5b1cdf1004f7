use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};

use storedesk_core::domain::entity::EntityCategory;

use crate::context::ConversationContext;

/// How many recent values a plural pronoun expands to.
const PLURAL_EXPANSION: usize = 3;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum PronounClass {
    Masculine,
    Feminine,
    Neuter,
    Plural,
}

impl PronounClass {
    pub const ALL: [PronounClass; 4] = [Self::Masculine, Self::Feminine, Self::Neuter, Self::Plural];

    pub fn categories(&self) -> &'static [EntityCategory] {
        match self {
            Self::Masculine | Self::Feminine => &[EntityCategory::Customer],
            Self::Neuter => &[EntityCategory::Product, EntityCategory::Order],
            Self::Plural => &[EntityCategory::Product, EntityCategory::Customer],
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum PronounForm {
    Plain,
    Possessive,
}

static PRONOUN_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(he|him|his|she|her|hers|it|its|they|them|their|theirs)\b")
        .expect("valid regex")
});
static WORD_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[A-Za-z']+").expect("valid regex"));

const CONTINUATION_MARKERS: &[&str] = &["also", "another"];
const MODIFICATION_MARKERS: &[&str] = &["change", "update", "modify"];
const UPDATABLE: [EntityCategory; 3] =
    [EntityCategory::Product, EntityCategory::Order, EntityCategory::Customer];

// Words that follow an object "her" rather than a possessed noun.
const NON_NOUN_FOLLOWERS: &[&str] = &[
    "a", "an", "the", "to", "and", "or", "about", "for", "with", "if", "that", "this", "please",
    "know", "back", "again", "now", "today", "up", "in", "on", "at", "of",
];

/// Context hints derived from referring expressions in one utterance.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnderstandingHints {
    pub referenced: BTreeMap<EntityCategory, String>,
    pub previous_intent: Option<String>,
    pub updates: BTreeMap<EntityCategory, String>,
}

impl UnderstandingHints {
    pub fn is_empty(&self) -> bool {
        self.referenced.is_empty() && self.previous_intent.is_none() && self.updates.is_empty()
    }

    /// Flat `referenced_<category>` / `previous_intent` / `update_<category>` view.
    pub fn to_map(&self) -> BTreeMap<String, String> {
        let mut map = BTreeMap::new();
        for (category, value) in &self.referenced {
            map.insert(format!("referenced_{category}"), value.clone());
        }
        if let Some(intent) = &self.previous_intent {
            map.insert("previous_intent".to_string(), intent.clone());
        }
        for (category, value) in &self.updates {
            map.insert(format!("update_{category}"), value.clone());
        }
        map
    }
}

pub fn understand(utterance: &str, context: &ConversationContext) -> UnderstandingHints {
    let mut hints = UnderstandingHints::default();
    let words: Vec<String> =
        WORD_PATTERN.find_iter(utterance).map(|word| word.as_str().to_lowercase()).collect();

    for class in PronounClass::ALL {
        let present = PRONOUN_PATTERN.captures_iter(utterance).any(|captures| {
            let followed_by_apostrophe =
                captures.get(0).is_some_and(|whole| is_contraction(&utterance[whole.end()..]));
            !followed_by_apostrophe
                && classify(&captures[1]).map(|(found, _)| found) == Some(class)
        });
        if !present {
            continue;
        }
        for category in class.categories() {
            if let Some(value) = context.last(*category) {
                hints.referenced.insert(*category, value.to_string());
            }
        }
    }

    if words.iter().any(|word| CONTINUATION_MARKERS.contains(&word.as_str())) {
        hints.previous_intent = context.last_intent().map(|entry| entry.intent.clone());
    }

    if words.iter().any(|word| MODIFICATION_MARKERS.contains(&word.as_str())) {
        for category in UPDATABLE {
            if let Some(value) = context.last(category) {
                hints.updates.insert(category, value.to_string());
            }
        }
    }

    hints
}

/// Rewrites recognized pronouns into explicit entity references. Each token
/// is replaced in a single left-to-right pass, so a substituted value is
/// never rewritten again. Pronouns without a matching entity stay as typed.
pub fn resolve(utterance: &str, context: &ConversationContext) -> String {
    PRONOUN_PATTERN
        .replace_all(utterance, |captures: &Captures<'_>| {
            let token = &captures[0];
            let Some(whole) = captures.get(0) else {
                return token.to_string();
            };
            let rest = &utterance[whole.end()..];
            if is_contraction(rest) {
                return token.to_string();
            }

            let Some((class, form)) = classify(token) else {
                return token.to_string();
            };
            let form = refine_her(token, form, rest);

            substitution(class, form, context).unwrap_or_else(|| token.to_string())
        })
        .into_owned()
}

/// Contractions such as "it's" are not references.
fn is_contraction(rest: &str) -> bool {
    rest.starts_with('\'') || rest.starts_with('\u{2019}')
}

fn classify(token: &str) -> Option<(PronounClass, PronounForm)> {
    let class_and_form = match token.to_ascii_lowercase().as_str() {
        "he" | "him" => (PronounClass::Masculine, PronounForm::Plain),
        "his" => (PronounClass::Masculine, PronounForm::Possessive),
        "she" | "her" => (PronounClass::Feminine, PronounForm::Plain),
        "hers" => (PronounClass::Feminine, PronounForm::Possessive),
        "it" => (PronounClass::Neuter, PronounForm::Plain),
        "its" => (PronounClass::Neuter, PronounForm::Possessive),
        "they" | "them" => (PronounClass::Plural, PronounForm::Plain),
        "their" | "theirs" => (PronounClass::Plural, PronounForm::Possessive),
        _ => return None,
    };
    Some(class_and_form)
}

/// "her" is possessive when a noun follows it ("her order").
fn refine_her(token: &str, form: PronounForm, rest: &str) -> PronounForm {
    if !token.eq_ignore_ascii_case("her") {
        return form;
    }
    let next = rest
        .trim_start()
        .split(|c: char| !c.is_alphanumeric())
        .next()
        .unwrap_or_default()
        .to_lowercase();
    let follows_immediately = rest.starts_with(' ');
    if follows_immediately && !next.is_empty() && !NON_NOUN_FOLLOWERS.contains(&next.as_str()) {
        PronounForm::Possessive
    } else {
        PronounForm::Plain
    }
}

fn substitution(
    class: PronounClass,
    form: PronounForm,
    context: &ConversationContext,
) -> Option<String> {
    let category = context.most_recent_of(class.categories())?;

    let reference = if class == PronounClass::Plural {
        let values: Vec<String> = context
            .all(category)
            .into_iter()
            .take(PLURAL_EXPANSION)
            .map(|value| display_entity(category, value))
            .collect();
        join_naturally(&values)?
    } else {
        display_entity(category, context.last(category)?)
    };

    Some(match form {
        PronounForm::Plain => reference,
        PronounForm::Possessive => format!("{reference}'s"),
    })
}

fn display_entity(category: EntityCategory, value: &str) -> String {
    match category {
        EntityCategory::Order if value.starts_with('#') => format!("order {value}"),
        _ => value.to_string(),
    }
}

fn join_naturally(values: &[String]) -> Option<String> {
    match values {
        [] => None,
        [only] => Some(only.clone()),
        [init @ .., last] => Some(format!("{} and {last}", init.join(", "))),
    }
}
