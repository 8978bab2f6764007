use chrono::{DateTime, Utc};
use macros::Entity;
use serde::{Deserialize, Serialize};
use sqlx::prelude::FromRow;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow, Entity)]
#[serde(rename_all = "camelCase")]
#[entity(table = "customers")]
pub struct Customer {
    #[entity(key)]
    pub id: i64,
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub created_at: DateTime<Utc>,
    #[entity(version)]
    pub row_version: i64,
}

impl Customer {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: 0,
            name: name.into(),
            email: None,
            phone: None,
            created_at: Utc::now(),
            row_version: 1,
        }
    }

    pub fn with_id(mut self, id: i64) -> Self {
        self.id = id;
        self
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }
}
