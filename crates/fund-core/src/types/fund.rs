//! Fund attributes supplied by the entity registry.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::Error;

/// Peer-group comparison key.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PeerKey {
    pub category: String,
    #[serde(default)]
    pub subcategory: Option<String>,
}

impl PeerKey {
    pub fn new(category: impl Into<String>) -> Self {
        Self {
            category: category.into(),
            subcategory: None,
        }
    }

    pub fn with_subcategory(mut self, subcategory: impl Into<String>) -> Self {
        self.subcategory = Some(subcategory.into());
        self
    }
}

impl fmt::Display for PeerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.subcategory {
            Some(sub) => write!(f, "{}/{}", self.category, sub),
            None => f.write_str(&self.category),
        }
    }
}

/// Where an entity's data came from, tagged at ingestion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataProvenance {
    Reported,
    Estimated,
    Synthetic,
    #[default]
    Unknown,
}

impl DataProvenance {
    pub fn as_str(&self) -> &'static str {
        match self {
            DataProvenance::Reported => "reported",
            DataProvenance::Estimated => "estimated",
            DataProvenance::Synthetic => "synthetic",
            DataProvenance::Unknown => "unknown",
        }
    }
}

impl FromStr for DataProvenance {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "reported" => Ok(DataProvenance::Reported),
            "estimated" => Ok(DataProvenance::Estimated),
            "synthetic" => Ok(DataProvenance::Synthetic),
            "unknown" | "" => Ok(DataProvenance::Unknown),
            other => Err(Error::invalid(format!("unknown provenance tag: {}", other))),
        }
    }
}

/// Slowly-changing attributes of one fund.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FundAttributes {
    pub entity_id: String,
    #[serde(default)]
    pub name: String,
    pub peer_key: PeerKey,
    /// Annual expense ratio as a fraction (0.0075 = 0.75%).
    #[serde(default)]
    pub expense_ratio: Option<Decimal>,
    /// Assets under management in base currency units.
    #[serde(default)]
    pub aum: Option<Decimal>,
    #[serde(default)]
    pub inception_date: Option<NaiveDate>,
    #[serde(default)]
    pub benchmark_id: Option<String>,
    #[serde(default)]
    pub provenance: DataProvenance,
}

impl FundAttributes {
    pub fn new(entity_id: impl Into<String>, peer_key: PeerKey) -> Self {
        Self {
            entity_id: entity_id.into(),
            name: String::new(),
            peer_key,
            expense_ratio: None,
            aum: None,
            inception_date: None,
            benchmark_id: None,
            provenance: DataProvenance::Unknown,
        }
    }

    pub fn with_expense_ratio(mut self, ratio: Decimal) -> Self {
        self.expense_ratio = Some(ratio);
        self
    }

    pub fn with_aum(mut self, aum: Decimal) -> Self {
        self.aum = Some(aum);
        self
    }

    pub fn with_inception_date(mut self, date: NaiveDate) -> Self {
        self.inception_date = Some(date);
        self
    }

    pub fn with_benchmark(mut self, benchmark_id: impl Into<String>) -> Self {
        self.benchmark_id = Some(benchmark_id.into());
        self
    }

    pub fn with_provenance(mut self, provenance: DataProvenance) -> Self {
        self.provenance = provenance;
        self
    }

    /// Years of track record as of `as_of`, when the inception date is known.
    pub fn track_record_years(&self, as_of: NaiveDate) -> Option<f64> {
        self.inception_date
            .filter(|d| *d <= as_of)
            .map(|d| (as_of - d).num_days() as f64 / 365.25)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_peer_key_display() {
        assert_eq!(PeerKey::new("equity").to_string(), "equity");
        assert_eq!(
            PeerKey::new("equity").with_subcategory("large_cap").to_string(),
            "equity/large_cap"
        );
    }

    #[test]
    fn test_provenance_parse() {
        assert_eq!("Reported".parse::<DataProvenance>().unwrap(), DataProvenance::Reported);
        assert_eq!("".parse::<DataProvenance>().unwrap(), DataProvenance::Unknown);
        assert!("scraped".parse::<DataProvenance>().is_err());
    }

    #[test]
    fn test_track_record_years() {
        let attrs = FundAttributes::new("f", PeerKey::new("debt"))
            .with_inception_date(NaiveDate::from_ymd_opt(2020, 1, 1).unwrap());
        let years = attrs
            .track_record_years(NaiveDate::from_ymd_opt(2024, 1, 1).unwrap())
            .unwrap();
        assert!((years - 4.0).abs() < 0.01);

        // Inception after the as-of date is unknown, not negative
        assert!(attrs
            .track_record_years(NaiveDate::from_ymd_opt(2019, 1, 1).unwrap())
            .is_none());
    }

    #[test]
    fn test_attributes_deserialize_with_defaults() {
        let json = r#"{"entity_id":"f1","peer_key":{"category":"equity"}}"#;
        let attrs: FundAttributes = serde_json::from_str(json).unwrap();
        assert_eq!(attrs.provenance, DataProvenance::Unknown);
        assert!(attrs.expense_ratio.is_none());
    }
}
