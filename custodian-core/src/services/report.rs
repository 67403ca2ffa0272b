//! Value report - positions valued in their own and the base currency

use std::io::Write;
use std::sync::Arc;

use anyhow::{Context, Result};
use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

use crate::domain::PositionView;
use crate::ports::{FxRateSource, Repository};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValueRow {
    pub instrument: String,
    pub currency: String,
    /// `None` for an unpriced security
    pub value: Option<Decimal>,
    /// `None` when there is no value or no rate to the base currency
    pub base_value: Option<Decimal>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValueReport {
    pub base_currency: String,
    pub rows: Vec<ValueRow>,
    /// Sum of the rows that have a base value
    pub total: Decimal,
}

impl ValueReport {
    pub fn from_positions(
        positions: &[PositionView],
        fx: &dyn FxRateSource,
        base_currency: &str,
    ) -> Self {
        let rows: Vec<ValueRow> = positions
            .iter()
            .map(|view| {
                let value = view.position.value();
                let base_value = value
                    .zip(fx.rate(&view.position.currency, base_currency))
                    .and_then(|(value, rate)| value.checked_mul(rate))
                    .map(|v| v.round_dp(2));
                ValueRow {
                    instrument: view.instrument_name.clone(),
                    currency: view.position.currency.clone(),
                    value: value.map(|v| v.round_dp(2)),
                    base_value,
                }
            })
            .collect();
        let total = rows
            .iter()
            .filter_map(|r| r.base_value)
            .try_fold(Decimal::ZERO, |sum, v| sum.checked_add(v))
            .unwrap_or(Decimal::MAX);

        Self {
            base_currency: base_currency.to_string(),
            rows,
            total,
        }
    }

    /// Rows without a base value, which the total leaves out
    pub fn unconverted(&self) -> usize {
        self.rows.iter().filter(|r| r.base_value.is_none()).count()
    }

    /// Securities stored without a price
    pub fn unpriced(&self) -> usize {
        self.rows.iter().filter(|r| r.value.is_none()).count()
    }

    /// `Instrument,Currency,Value,Value <BASE>` rows plus a trailing total
    pub fn write_csv<W: Write>(&self, writer: W) -> Result<()> {
        let mut csv = csv::Writer::from_writer(writer);
        let base_header = format!("Value {}", self.base_currency);
        csv.write_record(["Instrument", "Currency", "Value", base_header.as_str()])?;
        for row in &self.rows {
            let value = row.value.map(|v| format!("{:.2}", v)).unwrap_or_default();
            let base_value = row
                .base_value
                .map(|v| format!("{:.2}", v))
                .unwrap_or_default();
            csv.write_record([
                row.instrument.as_str(),
                row.currency.as_str(),
                value.as_str(),
                base_value.as_str(),
            ])?;
        }
        let total = format!("{:.2}", self.total);
        csv.write_record(["Total", self.base_currency.as_str(), "", total.as_str()])?;
        csv.flush().context("failed to write report")?;
        Ok(())
    }
}

pub struct ReportService {
    repository: Arc<dyn Repository>,
    fx: Arc<dyn FxRateSource>,
    base_currency: String,
}

impl ReportService {
    pub fn new(
        repository: Arc<dyn Repository>,
        fx: Arc<dyn FxRateSource>,
        base_currency: impl Into<String>,
    ) -> Self {
        Self {
            repository,
            fx,
            base_currency: base_currency.into(),
        }
    }

    pub fn base_currency(&self) -> &str {
        &self.base_currency
    }

    /// Value every stored position, optionally for one institution
    pub fn value_report(&self, institution_id: Option<Uuid>) -> Result<ValueReport> {
        let positions = self.repository.get_positions(institution_id)?;
        Ok(ValueReport::from_positions(
            &positions,
            self.fx.as_ref(),
            &self.base_currency,
        ))
    }
}
