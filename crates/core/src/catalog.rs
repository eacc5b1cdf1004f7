//! Intent catalog
//!
//! Keyword and phrase tables used by intent arbitration. The built-in catalog
//! is embedded from `resources/intent_catalog.toml`; deployments can point
//! `catalog.path` at their own file with the same layout.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use crate::domain::task::TaskType;

const BUILTIN_CATALOG: &str = include_str!("../resources/intent_catalog.toml");

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("could not read intent catalog `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse intent catalog: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("intent catalog is invalid: {0}")]
    Invalid(String),
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct WeightedTerm {
    pub text: String,
    pub weight: f64,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct TaskTypeEntry {
    pub task_type: TaskType,
    pub keywords: Vec<String>,
    #[serde(default)]
    pub examples: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct IntentEntry {
    pub intent_type: String,
    pub task_type: TaskType,
    #[serde(default)]
    pub phrases: Vec<WeightedTerm>,
    #[serde(default)]
    pub keywords: Vec<WeightedTerm>,
}

impl IntentEntry {
    pub fn terms(&self) -> impl Iterator<Item = &WeightedTerm> {
        self.phrases.iter().chain(self.keywords.iter())
    }
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct IntentCatalog {
    #[serde(default)]
    pub general_examples: Vec<String>,
    pub task_types: Vec<TaskTypeEntry>,
    pub intents: Vec<IntentEntry>,
}

impl IntentCatalog {
    pub fn builtin() -> Result<Self, CatalogError> {
        Self::from_toml_str(BUILTIN_CATALOG)
    }

    pub fn load(path: &Path) -> Result<Self, CatalogError> {
        let raw = fs::read_to_string(path)
            .map_err(|source| CatalogError::ReadFile { path: path.to_path_buf(), source })?;
        Self::from_toml_str(&raw)
    }

    /// Loads `path` when given, the embedded catalog otherwise.
    pub fn load_or_builtin(path: Option<&Path>) -> Result<Self, CatalogError> {
        match path {
            Some(path) => Self::load(path),
            None => Self::builtin(),
        }
    }

    pub fn from_toml_str(raw: &str) -> Result<Self, CatalogError> {
        let mut catalog: IntentCatalog = toml::from_str(raw)?;
        catalog.normalize_terms();
        catalog.validate()?;
        Ok(catalog)
    }

    pub fn examples_for(&self, task_type: TaskType) -> &[String] {
        self.task_types
            .iter()
            .find(|entry| entry.task_type == task_type && !entry.examples.is_empty())
            .map(|entry| entry.examples.as_slice())
            .unwrap_or(self.general_examples.as_slice())
    }

    pub fn intent(&self, intent_type: &str) -> Option<&IntentEntry> {
        self.intents.iter().find(|entry| entry.intent_type == intent_type)
    }

    /// Adds promoted keyword phrases as extra phrases of known intents.
    /// Returns how many phrases were added; unknown intents are skipped.
    pub fn merge_learned(&mut self, learned: &BTreeMap<String, Vec<String>>, weight: f64) -> usize {
        let mut added = 0;
        for (intent_type, keywords) in learned {
            let Some(entry) =
                self.intents.iter_mut().find(|entry| &entry.intent_type == intent_type)
            else {
                continue;
            };

            for keyword in keywords {
                let text = normalize_for_matching(keyword);
                if text.is_empty() || entry.terms().any(|term| term.text == text) {
                    continue;
                }
                entry.phrases.push(WeightedTerm { text, weight });
                added += 1;
            }
        }
        added
    }

    fn normalize_terms(&mut self) {
        for entry in &mut self.task_types {
            for keyword in &mut entry.keywords {
                *keyword = normalize_for_matching(keyword);
            }
        }
        for entry in &mut self.intents {
            for term in entry.phrases.iter_mut().chain(entry.keywords.iter_mut()) {
                term.text = normalize_for_matching(&term.text);
            }
        }
    }

    fn validate(&self) -> Result<(), CatalogError> {
        if self.task_types.is_empty() {
            return Err(CatalogError::Invalid("at least one task type is required".to_string()));
        }

        for entry in &self.intents {
            if entry.intent_type.trim().is_empty() {
                return Err(CatalogError::Invalid("intent_type must not be empty".to_string()));
            }
            if entry.terms().next().is_none() {
                return Err(CatalogError::Invalid(format!(
                    "intent `{}` has no phrases or keywords",
                    entry.intent_type
                )));
            }
            if entry.terms().any(|term| term.weight <= 0.0 || term.text.is_empty()) {
                return Err(CatalogError::Invalid(format!(
                    "intent `{}` has an empty term or a non-positive weight",
                    entry.intent_type
                )));
            }
        }

        Ok(())
    }
}

/// Lowercases and reduces text to single-space separated words so terms can be
/// matched on word boundaries.
pub fn normalize_for_matching(text: &str) -> String {
    let mut sanitized = String::with_capacity(text.len());
    for character in text.chars() {
        if character.is_alphanumeric() || character == '\'' {
            sanitized.extend(character.to_lowercase());
        } else {
            sanitized.push(' ');
        }
    }
    sanitized.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Word-boundary containment on text produced by [`normalize_for_matching`].
pub fn contains_term(normalized_text: &str, normalized_term: &str) -> bool {
    if normalized_term.is_empty() {
        return false;
    }
    format!(" {normalized_text} ").contains(&format!(" {normalized_term} "))
}
