//! Energy supply contracts.

use super::{require, SyncMeta};
use crate::error::{CoreError, CoreResult};
use crmsync_protocol::{parse_timestamp_str, EntityId, EntityType};
use serde::{Deserialize, Serialize};

/// An energy contract attached to a customer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Energy {
    /// Sync metadata.
    #[serde(flatten)]
    pub meta: SyncMeta,
    /// Owning customer. Required.
    #[serde(default)]
    pub customer_id: Option<EntityId>,
    /// Electricity, gas...
    #[serde(default)]
    pub energy_type: Option<String>,
    /// Current supplier.
    #[serde(default)]
    pub supplier: Option<String>,
    /// Contract start date.
    #[serde(default)]
    pub contract_start: Option<String>,
    /// Contract end date.
    #[serde(default)]
    pub contract_end: Option<String>,
    /// Yearly consumption in kWh.
    #[serde(default)]
    pub annual_consumption: Option<f64>,
    /// Contract amount.
    #[serde(default)]
    pub amount: Option<f64>,
    /// Contract status.
    #[serde(default)]
    pub status: Option<String>,
}

impl Energy {
    fn check(&self) -> CoreResult<()> {
        if self.customer_id.is_none() {
            return Err(CoreError::validation("customerId is required"));
        }
        if let Some(kind) = &self.energy_type {
            require("energyType", Some(kind))?;
        }
        let start = self.contract_start.as_deref().and_then(parse_timestamp_str);
        let end = self.contract_end.as_deref().and_then(parse_timestamp_str);
        if let (Some(start), Some(end)) = (start, end) {
            if start > end {
                return Err(CoreError::validation("contractStart is after contractEnd"));
            }
        }
        Ok(())
    }
}

syncable!(Energy, EntityType::Energy);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::Syncable;

    fn contract() -> Energy {
        Energy {
            customer_id: Some(EntityId::new(1)),
            energy_type: Some("electricity".into()),
            contract_start: Some("2024-01-01".into()),
            contract_end: Some("2026-01-01".into()),
            ..Energy::default()
        }
    }

    #[test]
    fn valid_contract() {
        assert!(contract().validate().is_ok());
    }

    #[test]
    fn requires_customer() {
        let energy = Energy {
            customer_id: None,
            ..contract()
        };
        assert!(energy.validate().is_err());
    }

    #[test]
    fn rejects_inverted_dates() {
        let energy = Energy {
            contract_start: Some("2027-01-01".into()),
            ..contract()
        };
        assert!(energy.validate().is_err());
    }
}
