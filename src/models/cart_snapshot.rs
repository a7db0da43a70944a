//! Value types frozen into a checkout session at creation time.
//!
//! A `CartSnapshot` is written exactly once, as an embedded JSON document on
//! the session row, and is never updated afterwards. Catalog price or stock
//! changes after the snapshot do not alter it; materialization copies these
//! frozen values into order items instead of re-reading the catalog.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// One frozen cart line: product identity plus the price/name/sku as they
/// were at checkout time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct SnapshotLine {
    pub product_id: Uuid,
    pub product_name: String,
    pub sku: String,
    pub unit_price: Decimal,
    pub quantity: i32,
    pub line_total: Decimal,
    pub vendor_id: Uuid,
    pub store_id: Uuid,
}

/// Point-in-time copy of a cart. Totals exclude shipping, which is selected
/// later in the checkout flow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct CartSnapshot {
    pub lines: Vec<SnapshotLine>,
    pub sub_total: Decimal,
    pub tax_amount: Decimal,
    pub total_amount: Decimal,
}

impl CartSnapshot {
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn to_json(&self) -> Result<serde_json::Value, serde_json::Error> {
        serde_json::to_value(self)
    }

    pub fn from_json(value: &serde_json::Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(value.clone())
    }
}

/// Postal address captured as a value. Sessions and orders store the
/// formatted rendering, so later edits to a customer's address book never
/// retroactively alter a placed order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Address {
    pub line1: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line2: Option<String>,
    pub city: String,
    pub region: String,
    pub postal_code: String,
    pub country: String,
}

impl Address {
    /// Single-line rendering stored on sessions and orders.
    pub fn formatted(&self) -> String {
        let mut parts = vec![self.line1.clone()];
        if let Some(line2) = &self.line2 {
            if !line2.is_empty() {
                parts.push(line2.clone());
            }
        }
        parts.push(self.city.clone());
        parts.push(self.region.clone());
        parts.push(self.postal_code.clone());
        parts.push(self.country.clone());
        parts.join(", ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn sample_snapshot() -> CartSnapshot {
        let store_id = Uuid::new_v4();
        let vendor_id = Uuid::new_v4();
        CartSnapshot {
            lines: vec![SnapshotLine {
                product_id: Uuid::new_v4(),
                product_name: "Widget".into(),
                sku: "WID-1".into(),
                unit_price: dec!(9.99),
                quantity: 2,
                line_total: dec!(19.98),
                vendor_id,
                store_id,
            }],
            sub_total: dec!(19.98),
            tax_amount: dec!(1.75),
            total_amount: dec!(21.73),
        }
    }

    #[test]
    fn snapshot_round_trips_through_json() {
        let snapshot = sample_snapshot();
        let json = snapshot.to_json().unwrap();
        let restored = CartSnapshot::from_json(&json).unwrap();
        assert_eq!(restored, snapshot);
    }

    #[test]
    fn formatted_address_skips_blank_line2() {
        let address = Address {
            line1: "1 Market St".into(),
            line2: None,
            city: "San Francisco".into(),
            region: "CA".into(),
            postal_code: "94105".into(),
            country: "US".into(),
        };
        assert_eq!(
            address.formatted(),
            "1 Market St, San Francisco, CA, 94105, US"
        );
    }
}
