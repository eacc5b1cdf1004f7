use serde::{Deserialize, Serialize};

/// Failure classes an operator can run into during a conversation turn.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    Misunderstanding,
    ProviderQuota,
    ProviderTimeout,
    ProviderContentFilter,
    ProviderGeneral,
    Validation,
    Permission,
}

impl ErrorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Misunderstanding => "misunderstanding",
            Self::ProviderQuota => "provider_quota",
            Self::ProviderTimeout => "provider_timeout",
            Self::ProviderContentFilter => "provider_content_filter",
            Self::ProviderGeneral => "provider_general",
            Self::Validation => "validation",
            Self::Permission => "permission",
        }
    }

    pub fn user_message(&self) -> &'static str {
        match self {
            Self::Misunderstanding => "I'm not sure what you meant. Could you rephrase that?",
            Self::ProviderQuota => {
                "The assistant has reached its request quota for now. Please try again in a few minutes."
            }
            Self::ProviderTimeout => "The assistant took too long to answer. Please try again.",
            Self::ProviderContentFilter => {
                "The assistant could not process that request as phrased. Please rephrase it."
            }
            Self::ProviderGeneral => {
                "Something went wrong while preparing an answer. Please try again shortly."
            }
            Self::Validation => {
                "Some details in that request look incomplete or malformed. Check them and try again."
            }
            Self::Permission => "You don't have permission to do that.",
        }
    }
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
