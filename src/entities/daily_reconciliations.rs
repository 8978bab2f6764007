use chrono::NaiveDate;
use macros::Entity;
use serde::{Deserialize, Serialize};
use sqlx::prelude::FromRow;

/// End-of-day totals; `closed` days are no longer edited
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow, Entity)]
#[serde(rename_all = "camelCase")]
#[entity(table = "daily_reconciliations")]
pub struct DailyReconciliation {
    #[entity(key)]
    pub id: i64,
    pub business_date: NaiveDate,
    pub total_loads: i64,
    pub total_invoiced_cents: i64,
    pub total_collected_cents: i64,
    pub closed: bool,
    #[entity(version)]
    pub row_version: i64,
}

impl DailyReconciliation {
    pub fn open(business_date: NaiveDate) -> Self {
        Self {
            id: 0,
            business_date,
            total_loads: 0,
            total_invoiced_cents: 0,
            total_collected_cents: 0,
            closed: false,
            row_version: 1,
        }
    }

    /// Collected minus invoiced; negative while money is owed
    pub fn balance_cents(&self) -> i64 {
        self.total_collected_cents - self.total_invoiced_cents
    }
}
