use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use crate::models::CartSnapshot;

/// Pre-order staging record. Owns the lifecycle of a pending purchase:
/// `Draft -> {Cod, Paid} -> Completed`, `Draft -> Expired`, and
/// `Draft -> Failed` for the online payment failure path. `Completed`,
/// `Expired` and `Failed` are terminal.
///
/// Invariants enforced by the services that mutate this row:
/// - `cart_snapshot` is written at creation and never overwritten;
/// - `order_id` is set at most once and never cleared or reassigned;
/// - `Completed` is only reachable after `order_id` is set.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "checkout_sessions")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub store_id: Uuid,
    pub user_id: Uuid,
    #[sea_orm(column_type = "Json")]
    pub cart_snapshot: Json,
    pub status: CheckoutSessionStatus,
    pub shipping_method: Option<String>,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))", nullable)]
    pub shipping_cost: Option<Decimal>,
    pub payment_method: Option<PaymentMethod>,
    /// External provider reference; set only when the Online method is
    /// selected. Webhooks look sessions up by this value.
    pub payment_intent_id: Option<String>,
    pub shipping_address: Option<String>,
    pub billing_address: Option<String>,
    pub customer_notes: Option<String>,
    pub order_id: Option<Uuid>,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Model {
    /// Decode the frozen cart snapshot embedded in this row.
    pub fn snapshot(&self) -> Result<CartSnapshot, serde_json::Error> {
        CartSnapshot::from_json(&self.cart_snapshot)
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::order::Entity",
        from = "Column::OrderId",
        to = "super::order::Column::Id"
    )]
    Order,
}

impl Related<super::order::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Order.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, EnumIter, DeriveActiveEnum)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(20))")]
#[serde(rename_all = "snake_case")]
pub enum CheckoutSessionStatus {
    #[sea_orm(string_value = "draft")]
    Draft,
    /// Cash on delivery selected; no provider confirmation needed.
    #[sea_orm(string_value = "cod")]
    Cod,
    #[sea_orm(string_value = "paid")]
    Paid,
    #[sea_orm(string_value = "completed")]
    Completed,
    #[sea_orm(string_value = "expired")]
    Expired,
    #[sea_orm(string_value = "failed")]
    Failed,
}

impl CheckoutSessionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Expired | Self::Failed)
    }

    /// Statuses from which the Order Materializer may run.
    pub fn is_materializable(&self) -> bool {
        matches!(self, Self::Paid | Self::Cod)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, EnumIter, DeriveActiveEnum)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(20))")]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    #[sea_orm(string_value = "online")]
    Online,
    #[sea_orm(string_value = "cash_on_delivery")]
    CashOnDelivery,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_statuses() {
        assert!(CheckoutSessionStatus::Completed.is_terminal());
        assert!(CheckoutSessionStatus::Expired.is_terminal());
        assert!(CheckoutSessionStatus::Failed.is_terminal());
        assert!(!CheckoutSessionStatus::Draft.is_terminal());
        assert!(!CheckoutSessionStatus::Paid.is_terminal());
        assert!(!CheckoutSessionStatus::Cod.is_terminal());
    }

    #[test]
    fn materializable_statuses() {
        assert!(CheckoutSessionStatus::Paid.is_materializable());
        assert!(CheckoutSessionStatus::Cod.is_materializable());
        assert!(!CheckoutSessionStatus::Draft.is_materializable());
        assert!(!CheckoutSessionStatus::Completed.is_materializable());
    }
}
