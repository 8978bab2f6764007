use chrono::{DateTime, Utc};
use macros::Entity;
use serde::{Deserialize, Serialize};
use sqlx::prelude::FromRow;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow, Entity)]
#[serde(rename_all = "camelCase")]
#[entity(table = "payments")]
pub struct Payment {
    #[entity(key)]
    pub id: i64,
    pub invoice_id: i64,
    pub amount_cents: i64,
    pub method: String,
    pub paid_at: DateTime<Utc>,
    #[entity(version)]
    pub row_version: i64,
}

impl Payment {
    pub fn new(invoice_id: i64, amount_cents: i64, method: impl Into<String>) -> Self {
        Self {
            id: 0,
            invoice_id,
            amount_cents,
            method: method.into(),
            paid_at: Utc::now(),
            row_version: 1,
        }
    }
}
