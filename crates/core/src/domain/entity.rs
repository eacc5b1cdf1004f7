use serde::{Deserialize, Serialize};

/// Domain objects an operator can refer back to within a conversation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityCategory {
    Product,
    Order,
    Customer,
    Category,
    Price,
    Quantity,
    Date,
    Document,
}

impl EntityCategory {
    pub const ALL: [EntityCategory; 8] = [
        Self::Product,
        Self::Order,
        Self::Customer,
        Self::Category,
        Self::Price,
        Self::Quantity,
        Self::Date,
        Self::Document,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Product => "product",
            Self::Order => "order",
            Self::Customer => "customer",
            Self::Category => "category",
            Self::Price => "price",
            Self::Quantity => "quantity",
            Self::Date => "date",
            Self::Document => "document",
        }
    }
}

impl std::fmt::Display for EntityCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for EntityCategory {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|category| category.as_str() == value.trim().to_ascii_lowercase())
            .ok_or_else(|| format!("unknown entity category `{value}`"))
    }
}

/// One entity mention pulled out of free text.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityMention {
    pub category: EntityCategory,
    pub value: String,
}

impl EntityMention {
    pub fn new(category: EntityCategory, value: impl Into<String>) -> Self {
        Self { category, value: value.into() }
    }
}
