//! Gated product features.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::domain::foundation::ValidationError;

/// A capability that can be unlocked by a subscription tier.
///
/// Wire and storage names are SCREAMING_SNAKE_CASE (`DOC_GENERATOR`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Feature {
    /// Conversational assistant.
    Chat,
    /// Document drafting and generation.
    DocGenerator,
    /// Case tracking dashboard.
    CaseTracker,
    /// AI-assisted analysis of documents and cases.
    AiAnalysis,
    /// PDF/DOCX export.
    Export,
    /// Programmatic API access.
    ApiAccess,
}

impl Feature {
    /// Every known feature.
    pub const ALL: [Feature; 6] = [
        Feature::Chat,
        Feature::DocGenerator,
        Feature::CaseTracker,
        Feature::AiAnalysis,
        Feature::Export,
        Feature::ApiAccess,
    ];

    /// Returns the canonical name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Feature::Chat => "CHAT",
            Feature::DocGenerator => "DOC_GENERATOR",
            Feature::CaseTracker => "CASE_TRACKER",
            Feature::AiAnalysis => "AI_ANALYSIS",
            Feature::Export => "EXPORT",
            Feature::ApiAccess => "API_ACCESS",
        }
    }
}

impl fmt::Display for Feature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Feature {
    type Err = ValidationError;

    /// Parses a feature name case-insensitively.
    ///
    /// `DRAFTS` is accepted as a legacy alias of `DOC_GENERATOR`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().replace('-', "_").as_str() {
            "CHAT" => Ok(Feature::Chat),
            "DOC_GENERATOR" | "DRAFTS" => Ok(Feature::DocGenerator),
            "CASE_TRACKER" => Ok(Feature::CaseTracker),
            "AI_ANALYSIS" => Ok(Feature::AiAnalysis),
            "EXPORT" => Ok(Feature::Export),
            "API_ACCESS" => Ok(Feature::ApiAccess),
            other => Err(ValidationError::invalid_format(
                "feature",
                format!("unknown feature '{}'", other),
            )),
        }
    }
}
