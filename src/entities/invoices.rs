use chrono::{DateTime, Utc};
use macros::Entity;
use serde::{Deserialize, Serialize};
use sqlx::prelude::FromRow;

use crate::storage::SqlValue;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum InvoiceStatus {
    Draft,
    Issued,
    PartiallyPaid,
    Paid,
    Void,
}

impl InvoiceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Issued => "issued",
            Self::PartiallyPaid => "partially_paid",
            Self::Paid => "paid",
            Self::Void => "void",
        }
    }

    /// Whether money is still expected on an invoice in this state
    pub fn is_outstanding(&self) -> bool {
        matches!(self, Self::Issued | Self::PartiallyPaid)
    }
}

impl From<InvoiceStatus> for SqlValue {
    fn from(status: InvoiceStatus) -> Self {
        SqlValue::Text(status.as_str().to_string())
    }
}

/// Amounts are kept in cents to avoid floating point money
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow, Entity)]
#[serde(rename_all = "camelCase")]
#[entity(table = "invoices")]
pub struct Invoice {
    #[entity(key)]
    pub id: i64,
    pub customer_id: i64,
    pub number: String,
    pub amount_cents: i64,
    pub status: InvoiceStatus,
    pub issued_at: DateTime<Utc>,
    pub due_at: Option<DateTime<Utc>>,
    #[entity(version)]
    pub row_version: i64,
}

impl Invoice {
    pub fn new(customer_id: i64, number: impl Into<String>, amount_cents: i64) -> Self {
        Self {
            id: 0,
            customer_id,
            number: number.into(),
            amount_cents,
            status: InvoiceStatus::Issued,
            issued_at: Utc::now(),
            due_at: None,
            row_version: 1,
        }
    }

    pub fn with_id(mut self, id: i64) -> Self {
        self.id = id;
        self
    }
}
