use serde::{Deserialize, Serialize};

/// Intent type used whenever no specific intent clears the arbitration threshold.
pub const GENERAL_INTENT: &str = "general";

/// Confidence attached to a coarse-classifier win.
pub const GENERAL_CONFIDENCE: f64 = 0.5;

/// Coarse storefront domain an utterance belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    Product,
    Order,
    Customer,
    Inventory,
    Sales,
    Category,
    Document,
    Marketing,
    General,
}

impl TaskType {
    pub const ALL: [TaskType; 9] = [
        Self::Product,
        Self::Order,
        Self::Customer,
        Self::Inventory,
        Self::Sales,
        Self::Category,
        Self::Document,
        Self::Marketing,
        Self::General,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Product => "product",
            Self::Order => "order",
            Self::Customer => "customer",
            Self::Inventory => "inventory",
            Self::Sales => "sales",
            Self::Category => "category",
            Self::Document => "document",
            Self::Marketing => "marketing",
            Self::General => "general",
        }
    }
}

impl std::fmt::Display for TaskType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TaskType {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|task_type| task_type.as_str() == normalized)
            .ok_or_else(|| format!("unknown task type `{value}`"))
    }
}

/// Shape of one sub-task produced by decomposition.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubTaskKind {
    Query,
    InfoLookup,
    Compare,
    CheckCondition,
    SimulateResult,
    AnalyzeResult,
}

impl SubTaskKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Query => "query",
            Self::InfoLookup => "info_lookup",
            Self::Compare => "compare",
            Self::CheckCondition => "check_condition",
            Self::SimulateResult => "simulate_result",
            Self::AnalyzeResult => "analyze_result",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SubTaskPayload {
    Text { text: String },
    Object { object: String },
    Objects { objects: [String; 2] },
    Condition { condition: String },
    Action { action: String },
    Scenario { condition: String, action: String },
}

impl SubTaskPayload {
    /// Plain-language rendering used for classification and prompts.
    pub fn describe(&self) -> String {
        match self {
            Self::Text { text } => text.clone(),
            Self::Object { object } => format!("show details of {object}"),
            Self::Objects { objects } => format!("compare {} with {}", objects[0], objects[1]),
            Self::Condition { condition } => format!("check whether {condition}"),
            Self::Action { action } => action.clone(),
            Self::Scenario { condition, action } => {
                format!("analyze {action} assuming {condition}")
            }
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubTask {
    pub task_type: SubTaskKind,
    /// Filled by arbitration; empty straight out of the decomposer.
    pub intent_type: Option<String>,
    pub order: usize,
    pub payload: SubTaskPayload,
}

impl SubTask {
    pub fn new(task_type: SubTaskKind, order: usize, payload: SubTaskPayload) -> Self {
        Self { task_type, intent_type: None, order, payload }
    }

    pub fn text(&self) -> String {
        self.payload.describe()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentSource {
    Specific,
    Coarse,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct IntentDecision {
    pub task_type: TaskType,
    pub intent_type: String,
    pub confidence: f64,
    pub source: IntentSource,
}

impl IntentDecision {
    pub fn general(task_type: TaskType) -> Self {
        Self {
            task_type,
            intent_type: GENERAL_INTENT.to_string(),
            confidence: GENERAL_CONFIDENCE,
            source: IntentSource::Coarse,
        }
    }

    pub fn is_general(&self) -> bool {
        self.intent_type == GENERAL_INTENT
    }
}
