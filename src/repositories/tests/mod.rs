//! Test utilities for repositories
//!
//! Every test gets its own migrated SQLite file, plus generators for
//! representative entities.

use tempfile::TempDir;

use crate::storage::db::DatabaseManager;
use crate::unit_of_work::UnitOfWork;

mod specialized_repository_test;

/// A migrated database that lives as long as the value
pub struct TestDb {
    pub db: DatabaseManager,
    _dir: TempDir,
}

impl TestDb {
    pub async fn new() -> Self {
        let (db, dir) = DatabaseManager::setup_test_db().await;
        Self { db, _dir: dir }
    }

    pub fn unit_of_work(&self) -> UnitOfWork {
        self.db.unit_of_work_factory().create()
    }
}

/// Test data generator for repositories
pub mod generators {
    use chrono::{DateTime, Duration, TimeZone, Utc};

    use crate::entities::{Customer, Invoice, Payment, Truck, TruckLoad};

    /// Truck number `n` with a unique plate
    pub fn truck(n: i64) -> Truck {
        Truck::new(format!("HL-{n:04}"), "Volvo FH", 18_000 + n)
    }

    /// `count` trucks with keys `1..=count`
    pub fn trucks(count: i64) -> Vec<Truck> {
        (1..=count).map(|n| truck(n).with_id(n)).collect()
    }

    pub fn customer(n: i64) -> Customer {
        Customer::new(format!("Customer {n}"))
            .with_id(n)
            .with_email(format!("customer{n}@example.com"))
    }

    pub fn invoice(id: i64, customer_id: i64, amount_cents: i64) -> Invoice {
        Invoice::new(customer_id, format!("INV-{id:05}"), amount_cents).with_id(id)
    }

    pub fn payment(id: i64, invoice_id: i64, amount_cents: i64) -> Payment {
        let mut payment = Payment::new(invoice_id, amount_cents, "bank_transfer");
        payment.id = id;
        payment
    }

    /// A fixed point in time so ordering assertions are deterministic
    pub fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 14, 0, 0, 0).unwrap() + Duration::hours(i64::from(hour))
    }

    pub fn truck_load(id: i64, truck_id: i64, customer_id: i64, hour: u32) -> TruckLoad {
        let mut load = TruckLoad::new(truck_id, customer_id, 12_000, "Rotterdam");
        load.id = id;
        load.loaded_at = at(hour);
        load
    }
}
