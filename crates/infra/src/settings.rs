use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use warehub_inventory::ValuationMethod;

/// Per-tenant preferences.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrganizationSettings {
    pub valuation_method: ValuationMethod,
    pub low_stock_notifications: bool,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Default for OrganizationSettings {
    fn default() -> Self {
        Self {
            valuation_method: ValuationMethod::AverageValue,
            low_stock_notifications: true,
            updated_at: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettingsPatch {
    pub valuation_method: Option<ValuationMethod>,
    pub low_stock_notifications: Option<bool>,
}

impl OrganizationSettings {
    pub fn apply(&mut self, patch: SettingsPatch, now: DateTime<Utc>) {
        if let Some(method) = patch.valuation_method {
            self.valuation_method = method;
        }
        if let Some(enabled) = patch.low_stock_notifications {
            self.low_stock_notifications = enabled;
        }
        self.updated_at = Some(now);
    }
}
