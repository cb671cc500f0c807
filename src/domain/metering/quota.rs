//! Per-feature usage quotas.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::domain::entitlement::Feature;
use crate::domain::foundation::{Timestamp, ValidationError};

const HOUR_MS: u64 = 60 * 60 * 1000;
const DAY_MS: u64 = 24 * HOUR_MS;

/// Length of a quota period.
///
/// Periods are fixed-length windows starting at first use, not calendar
/// boundaries. A month is 30 days.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum QuotaPeriod {
    Hourly,
    Daily,
    Weekly,
    Monthly,
    /// Arbitrary period in milliseconds.
    Millis(u64),
}

impl QuotaPeriod {
    /// Period length.
    pub fn duration(&self) -> Duration {
        Duration::from_millis(self.as_millis())
    }

    /// Period length in milliseconds.
    pub fn as_millis(&self) -> u64 {
        match self {
            QuotaPeriod::Hourly => HOUR_MS,
            QuotaPeriod::Daily => DAY_MS,
            QuotaPeriod::Weekly => 7 * DAY_MS,
            QuotaPeriod::Monthly => 30 * DAY_MS,
            QuotaPeriod::Millis(ms) => *ms,
        }
    }
}

impl fmt::Display for QuotaPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QuotaPeriod::Hourly => write!(f, "hourly"),
            QuotaPeriod::Daily => write!(f, "daily"),
            QuotaPeriod::Weekly => write!(f, "weekly"),
            QuotaPeriod::Monthly => write!(f, "monthly"),
            QuotaPeriod::Millis(ms) => write!(f, "{}", ms),
        }
    }
}

impl FromStr for QuotaPeriod {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "hourly" | "hour" => Ok(QuotaPeriod::Hourly),
            "daily" | "day" => Ok(QuotaPeriod::Daily),
            "weekly" | "week" => Ok(QuotaPeriod::Weekly),
            "monthly" | "month" => Ok(QuotaPeriod::Monthly),
            other => match other.parse::<u64>() {
                Ok(0) => Err(ValidationError::invalid_format(
                    "period",
                    "period must be greater than zero",
                )),
                Ok(ms) => Ok(QuotaPeriod::Millis(ms)),
                Err(_) => Err(ValidationError::invalid_format(
                    "period",
                    format!("expected hourly/daily/weekly/monthly or milliseconds, got '{}'", other),
                )),
            },
        }
    }
}

impl TryFrom<String> for QuotaPeriod {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<QuotaPeriod> for String {
    fn from(period: QuotaPeriod) -> Self {
        period.to_string()
    }
}

/// Allowance for one feature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaPolicy {
    pub quota: u32,
    pub period: QuotaPeriod,
}

impl QuotaPolicy {
    pub fn new(quota: u32, period: QuotaPeriod) -> Self {
        Self { quota, period }
    }

    pub fn daily(quota: u32) -> Self {
        Self::new(quota, QuotaPeriod::Daily)
    }

    pub fn monthly(quota: u32) -> Self {
        Self::new(quota, QuotaPeriod::Monthly)
    }
}

/// Result of a quota check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaDecision {
    pub feature: Feature,
    pub allowed: bool,
    /// `None` for features without a quota.
    pub limit: Option<u32>,
    pub remaining: u32,
    pub resets_at: Option<Timestamp>,
}

impl QuotaDecision {
    /// Decision for a feature with no configured quota.
    pub fn unmetered(feature: Feature) -> Self {
        Self {
            feature,
            allowed: true,
            limit: None,
            remaining: u32::MAX,
            resets_at: None,
        }
    }

    pub fn is_unmetered(&self) -> bool {
        self.limit.is_none()
    }
}
