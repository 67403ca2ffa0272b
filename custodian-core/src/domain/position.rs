//! Position domain model

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::record::RecordKind;

/// A holding of one instrument in one account on a statement date
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Position {
    pub id: Uuid,
    pub session_id: Uuid,
    pub institution_id: Uuid,
    pub account_id: Uuid,
    pub instrument_id: Uuid,
    pub kind: RecordKind,
    pub quantity: Decimal,
    pub price: Option<Decimal>,
    pub currency: String,
    pub as_of_date: NaiveDate,
    pub source_line: usize,
    pub created_at: DateTime<Utc>,
}

impl Position {
    /// Market value in the position currency. Cash counts at face value; a
    /// security without a price, or one whose value overflows, has none.
    pub fn value(&self) -> Option<Decimal> {
        match (self.kind, self.price) {
            (RecordKind::Cash, _) => Some(self.quantity),
            (RecordKind::Security, Some(price)) => self.quantity.checked_mul(price),
            (RecordKind::Security, None) => None,
        }
    }
}

/// A position joined with the names needed to display it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionView {
    #[serde(flatten)]
    pub position: Position,
    pub institution_code: String,
    pub account_number: String,
    pub instrument_name: String,
    pub isin: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn position(kind: RecordKind, quantity: i64, price: Option<Decimal>) -> Position {
        Position {
            id: Uuid::new_v4(),
            session_id: Uuid::new_v4(),
            institution_id: Uuid::new_v4(),
            account_id: Uuid::new_v4(),
            instrument_id: Uuid::new_v4(),
            kind,
            quantity: Decimal::from(quantity),
            price,
            currency: "CHF".to_string(),
            as_of_date: NaiveDate::from_ymd_opt(2024, 12, 31).unwrap(),
            source_line: 2,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_value() {
        let security = position(RecordKind::Security, 10, Some(Decimal::new(9550, 2)));
        assert_eq!(security.value(), Some(Decimal::new(95500, 2)));

        let unpriced = position(RecordKind::Security, 10, None);
        assert_eq!(unpriced.value(), None);

        let cash = position(RecordKind::Cash, 2500, None);
        assert_eq!(cash.value(), Some(Decimal::from(2500)));

        let huge = position(RecordKind::Security, i64::MAX, Some(Decimal::MAX));
        assert_eq!(huge.value(), None);
    }
}
