use chrono::{DateTime, Utc};
use macros::Entity;
use serde::{Deserialize, Serialize};
use sqlx::prelude::FromRow;

/// One delivery run: a truck carrying goods for a customer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow, Entity)]
#[serde(rename_all = "camelCase")]
#[entity(table = "truck_loads")]
pub struct TruckLoad {
    #[entity(key)]
    pub id: i64,
    pub truck_id: i64,
    pub customer_id: i64,
    pub weight_kg: i64,
    pub destination: String,
    pub loaded_at: DateTime<Utc>,
    #[entity(version)]
    pub row_version: i64,
}

impl TruckLoad {
    pub fn new(truck_id: i64, customer_id: i64, weight_kg: i64, destination: impl Into<String>) -> Self {
        Self {
            id: 0,
            truck_id,
            customer_id,
            weight_kg,
            destination: destination.into(),
            loaded_at: Utc::now(),
            row_version: 1,
        }
    }
}
