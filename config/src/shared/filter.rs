use serde::{Deserialize, Serialize};

use crate::shared::ValidationError;

/// Sizing of the membership filter used to skip already seen keys.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub struct FilterConfig {
    /// Number of keys the filter is expected to hold.
    #[serde(default = "default_expected_items")]
    pub expected_items: u64,
    /// Target false positive probability at `expected_items` keys.
    #[serde(default = "default_false_positive_rate")]
    pub false_positive_rate: f64,
}

impl FilterConfig {
    pub const DEFAULT_EXPECTED_ITEMS: u64 = 1_000_000;

    pub const DEFAULT_FALSE_POSITIVE_RATE: f64 = 0.001;

    /// Validates filter sizing.
    ///
    /// Ensures a positive item count and a rate strictly between zero and one.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.expected_items == 0 {
            return Err(ValidationError::InvalidFieldValue {
                field: "filter.expected_items".to_string(),
                constraint: "must be greater than 0".to_string(),
            });
        }

        if !(self.false_positive_rate > 0.0 && self.false_positive_rate < 1.0) {
            return Err(ValidationError::InvalidFieldValue {
                field: "filter.false_positive_rate".to_string(),
                constraint: "must be strictly between 0 and 1".to_string(),
            });
        }

        Ok(())
    }
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            expected_items: default_expected_items(),
            false_positive_rate: default_false_positive_rate(),
        }
    }
}

fn default_expected_items() -> u64 {
    FilterConfig::DEFAULT_EXPECTED_ITEMS
}

fn default_false_positive_rate() -> f64 {
    FilterConfig::DEFAULT_FALSE_POSITIVE_RATE
}
