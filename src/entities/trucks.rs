use macros::Entity;
use serde::{Deserialize, Serialize};
use sqlx::prelude::FromRow;

/// A vehicle in the fleet
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow, Entity)]
#[serde(rename_all = "camelCase")]
#[entity(table = "trucks")]
pub struct Truck {
    #[entity(key)]
    pub id: i64,
    pub plate_number: String,
    pub model: String,
    pub capacity_kg: i64,
    pub active: bool,
    #[entity(version)]
    pub row_version: i64,
}

impl Truck {
    /// A new, not yet persisted truck
    pub fn new(plate_number: impl Into<String>, model: impl Into<String>, capacity_kg: i64) -> Self {
        Self {
            id: 0,
            plate_number: plate_number.into(),
            model: model.into(),
            capacity_kg,
            active: true,
            row_version: 1,
        }
    }

    /// Use a caller-chosen identity instead of a store-assigned one
    pub fn with_id(mut self, id: i64) -> Self {
        self.id = id;
        self
    }
}
