//! Per-unit value (NAV) series.

use chrono::{Duration, NaiveDate};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// A single per-unit value observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NavPoint {
    pub date: NaiveDate,
    pub value: Decimal,
}

impl NavPoint {
    pub fn new(date: NaiveDate, value: Decimal) -> Self {
        Self { date, value }
    }
}

/// Time-ordered values for one entity.
///
/// Construction validates that dates are strictly increasing and every value
/// is positive; a series that exists is always well-formed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawSeries")]
pub struct ValueSeries {
    entity_id: String,
    points: Vec<NavPoint>,
}

#[derive(Deserialize)]
struct RawSeries {
    entity_id: String,
    points: Vec<NavPoint>,
}

impl TryFrom<RawSeries> for ValueSeries {
    type Error = Error;

    fn try_from(raw: RawSeries) -> Result<Self> {
        ValueSeries::new(raw.entity_id, raw.points)
    }
}

impl ValueSeries {
    pub fn new(entity_id: impl Into<String>, points: Vec<NavPoint>) -> Result<Self> {
        let entity_id = entity_id.into();

        for (i, point) in points.iter().enumerate() {
            if point.value <= Decimal::ZERO {
                return Err(Error::invalid(format!(
                    "{}: non-positive value {} on {}",
                    entity_id, point.value, point.date
                )));
            }
            if i > 0 && points[i - 1].date >= point.date {
                return Err(Error::invalid(format!(
                    "{}: dates not strictly increasing at {}",
                    entity_id, point.date
                )));
            }
        }

        Ok(Self { entity_id, points })
    }

    /// Build a series with one point per calendar day starting at `start`.
    pub fn daily(
        entity_id: impl Into<String>,
        start: NaiveDate,
        values: impl IntoIterator<Item = Decimal>,
    ) -> Result<Self> {
        let points = values
            .into_iter()
            .enumerate()
            .map(|(i, value)| NavPoint::new(start + Duration::days(i as i64), value))
            .collect();
        Self::new(entity_id, points)
    }

    pub fn entity_id(&self) -> &str {
        &self.entity_id
    }

    pub fn points(&self) -> &[NavPoint] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn first(&self) -> Option<&NavPoint> {
        self.points.first()
    }

    pub fn last(&self) -> Option<&NavPoint> {
        self.points.last()
    }

    /// Number of points dated on or before `date`.
    fn count_through(&self, date: NaiveDate) -> usize {
        self.points.partition_point(|p| p.date <= date)
    }

    /// Latest point dated on or before `date`.
    pub fn latest_on_or_before(&self, date: NaiveDate) -> Option<&NavPoint> {
        match self.count_through(date) {
            0 => None,
            n => self.points.get(n - 1),
        }
    }

    /// Points dated within `[from, to]`.
    pub fn range(&self, from: NaiveDate, to: NaiveDate) -> &[NavPoint] {
        let start = self.points.partition_point(|p| p.date < from);
        let end = self.count_through(to).max(start);
        &self.points[start..end]
    }

    /// Copy of the series restricted to points dated on or before `cutoff`.
    pub fn truncated(&self, cutoff: NaiveDate) -> ValueSeries {
        ValueSeries {
            entity_id: self.entity_id.clone(),
            points: self.points[..self.count_through(cutoff)].to_vec(),
        }
    }

    /// Simple returns between consecutive points, dated by the later point.
    pub fn daily_returns(&self) -> Vec<(NaiveDate, f64)> {
        point_returns(&self.points)
    }

    /// Calendar days between the first and last point.
    pub fn history_days(&self) -> i64 {
        match (self.first(), self.last()) {
            (Some(first), Some(last)) => (last.date - first.date).num_days(),
            _ => 0,
        }
    }
}

/// Consecutive simple returns over a slice of points.
pub fn point_returns(points: &[NavPoint]) -> Vec<(NaiveDate, f64)> {
    points
        .windows(2)
        .map(|w| {
            let ret = ((w[1].value - w[0].value) / w[0].value)
                .to_f64()
                .unwrap_or(0.0);
            (w[1].date, ret)
        })
        .collect()
}
