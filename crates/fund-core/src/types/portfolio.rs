use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Holdings fixed at one rebalance date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioSnapshot {
    pub rebalance_date: NaiveDate,
    /// Entity id to weight; weights sum to the configured gross exposure.
    pub weights: BTreeMap<String, Decimal>,
    /// Set when selection produced nothing usable for this date.
    pub degraded: bool,
    /// Set when the weights were copied from the previous period.
    pub carried_forward: bool,
}

impl PortfolioSnapshot {
    /// Equal weights over `entity_ids` summing exactly to `exposure`.
    ///
    /// Each weight is rounded to 10 decimal places; the last holding absorbs
    /// the rounding remainder.
    pub fn equal_weight(rebalance_date: NaiveDate, entity_ids: &[String], exposure: Decimal) -> Self {
        let mut weights = BTreeMap::new();
        if let Some((last, rest)) = entity_ids.split_last() {
            let each = (exposure / Decimal::from(entity_ids.len())).round_dp(10);
            let mut allocated = Decimal::ZERO;
            for id in rest {
                weights.insert(id.clone(), each);
                allocated += each;
            }
            weights.insert(last.clone(), exposure - allocated);
        }
        Self {
            rebalance_date,
            weights,
            degraded: false,
            carried_forward: false,
        }
    }

    /// An all-cash snapshot.
    pub fn cash(rebalance_date: NaiveDate) -> Self {
        Self {
            rebalance_date,
            weights: BTreeMap::new(),
            degraded: true,
            carried_forward: false,
        }
    }

    /// This snapshot's holdings re-dated to `rebalance_date`, marked degraded.
    pub fn carried_to(&self, rebalance_date: NaiveDate) -> Self {
        Self {
            rebalance_date,
            weights: self.weights.clone(),
            degraded: true,
            carried_forward: true,
        }
    }

    pub fn gross_exposure(&self) -> Decimal {
        self.weights.values().copied().sum()
    }

    pub fn is_cash(&self) -> bool {
        self.weights.is_empty()
    }

    pub fn holdings(&self) -> impl Iterator<Item = &str> {
        self.weights.keys().map(String::as_str)
    }
}
