//! Tests for the entity-specific repositories

use chrono::NaiveDate;
use tokio_util::sync::CancellationToken;

use crate::entities::{DailyReconciliation, InvoiceStatus};
use crate::error::{DataError, Result};
use crate::repositories::base::Repository;
use crate::repositories::tests::{TestDb, generators};

#[tokio::test]
async fn test_truck_lookups() -> Result<()> {
    let test_db = TestDb::new().await;
    let uow = test_db.unit_of_work();
    let cancel = CancellationToken::new();
    let trucks = uow.trucks()?;

    let mut fleet = generators::trucks(3);
    fleet[1].active = false;
    trucks.add_range(fleet, &cancel).await?;
    uow.save_changes(&cancel).await?;

    let found = trucks.find_by_plate("HL-0002", &cancel).await?.expect("plate should exist");
    assert_eq!(found.id, 2);
    assert!(trucks.find_by_plate("XX-0000", &cancel).await?.is_none());

    let active: Vec<i64> = trucks.active_trucks(&cancel).await?.iter().map(|t| t.id).collect();
    assert_eq!(active, vec![1, 3]);
    Ok(())
}

#[tokio::test]
async fn test_customer_lookups() -> Result<()> {
    let test_db = TestDb::new().await;
    let uow = test_db.unit_of_work();
    let cancel = CancellationToken::new();
    let customers = uow.customers()?;

    let mut acme = generators::customer(1);
    acme.name = "Acme Freight".to_string();
    let mut north = generators::customer(2);
    north.name = "Northern Logistics".to_string();
    let mut acme_south = generators::customer(3);
    acme_south.name = "ACME South".to_string();
    customers.add_range(vec![acme, north, acme_south], &cancel).await?;
    uow.save_changes(&cancel).await?;

    let by_email = customers.find_by_email("customer2@example.com", &cancel).await?;
    assert_eq!(by_email.map(|c| c.name), Some("Northern Logistics".to_string()));

    let names: Vec<String> = customers
        .search_by_name("acme", &cancel)
        .await?
        .into_iter()
        .map(|c| c.name)
        .collect();
    assert_eq!(names, vec!["ACME South".to_string(), "Acme Freight".to_string()]);
    Ok(())
}

#[tokio::test]
async fn test_invoice_and_payment_totals() -> Result<()> {
    let test_db = TestDb::new().await;
    let uow = test_db.unit_of_work();
    let cancel = CancellationToken::new();

    uow.customers()?
        .add_range(vec![generators::customer(1), generators::customer(2)], &cancel)
        .await?;
    let mut paid = generators::invoice(3, 1, 5_000);
    paid.status = InvoiceStatus::Paid;
    let mut partial = generators::invoice(4, 2, 7_500);
    partial.status = InvoiceStatus::PartiallyPaid;
    uow.invoices()?
        .add_range(
            vec![
                generators::invoice(1, 1, 10_000),
                generators::invoice(2, 1, 2_500),
                paid,
                partial,
            ],
            &cancel,
        )
        .await?;
    uow.payments()?
        .add_range(
            vec![generators::payment(1, 4, 2_000), generators::payment(2, 4, 500)],
            &cancel,
        )
        .await?;
    uow.save_changes(&cancel).await?;

    let invoices = uow.invoices()?;
    assert_eq!(invoices.for_customer(1, &cancel).await?.len(), 3);
    let outstanding: Vec<i64> = invoices.outstanding(&cancel).await?.iter().map(|i| i.id).collect();
    assert_eq!(outstanding.len(), 3);
    assert!(!outstanding.contains(&3));
    assert_eq!(invoices.outstanding_total_cents(None, &cancel).await?, 20_000);
    assert_eq!(invoices.outstanding_total_cents(Some(1), &cancel).await?, 12_500);

    let payments = uow.payments()?;
    assert_eq!(payments.for_invoice(4, &cancel).await?.len(), 2);
    assert_eq!(payments.total_paid_cents(4, &cancel).await?, 2_500);
    assert_eq!(payments.total_paid_cents(1, &cancel).await?, 0);

    let stored = invoices.get_by_id(4, &cancel).await?.expect("invoice should exist");
    assert_eq!(stored.status, InvoiceStatus::PartiallyPaid);
    Ok(())
}

#[tokio::test]
async fn test_truck_load_windows() -> Result<()> {
    let test_db = TestDb::new().await;
    let uow = test_db.unit_of_work();
    let cancel = CancellationToken::new();

    uow.trucks()?.add_range(generators::trucks(2), &cancel).await?;
    uow.customers()?.add(generators::customer(1), &cancel).await?;
    uow.truck_loads()?
        .add_range(
            vec![
                generators::truck_load(1, 1, 1, 6),
                generators::truck_load(2, 1, 1, 12),
                generators::truck_load(3, 2, 1, 18),
                generators::truck_load(4, 1, 1, 30),
            ],
            &cancel,
        )
        .await?;
    uow.save_changes(&cancel).await?;

    let loads = uow.truck_loads()?;
    let for_first: Vec<i64> = loads.for_truck(1, &cancel).await?.iter().map(|l| l.id).collect();
    assert_eq!(for_first, vec![4, 2, 1]);

    let first_day: Vec<i64> = loads
        .loaded_between(generators::at(0), generators::at(24), &cancel)
        .await?
        .iter()
        .map(|l| l.id)
        .collect();
    assert_eq!(first_day, vec![1, 2, 3]);

    let backwards = loads.loaded_between(generators::at(24), generators::at(0), &cancel).await;
    assert!(matches!(backwards, Err(DataError::Argument(_))));
    Ok(())
}

#[tokio::test]
async fn test_reconciliation_days() -> Result<()> {
    let test_db = TestDb::new().await;
    let uow = test_db.unit_of_work();
    let cancel = CancellationToken::new();
    let days = uow.daily_reconciliations()?;

    let monday = NaiveDate::from_ymd_opt(2025, 3, 10).expect("valid date");
    let tuesday = NaiveDate::from_ymd_opt(2025, 3, 11).expect("valid date");
    let wednesday = NaiveDate::from_ymd_opt(2025, 3, 12).expect("valid date");
    let mut closed = DailyReconciliation::open(monday);
    closed.closed = true;
    closed.total_invoiced_cents = 10_000;
    closed.total_collected_cents = 12_000;
    days.add_range(
        vec![closed, DailyReconciliation::open(wednesday), DailyReconciliation::open(tuesday)],
        &cancel,
    )
    .await?;
    uow.save_changes(&cancel).await?;

    let stored = days.for_date(monday, &cancel).await?.expect("monday should exist");
    assert!(stored.closed);
    assert_eq!(stored.balance_cents(), 2_000);

    let open: Vec<NaiveDate> = days.open_days(&cancel).await?.into_iter().map(|d| d.business_date).collect();
    assert_eq!(open, vec![tuesday, wednesday]);
    assert!(days.for_date(NaiveDate::from_ymd_opt(2024, 1, 1).expect("valid date"), &cancel).await?.is_none());
    Ok(())
}

#[tokio::test]
async fn test_audit_log_lookups() -> Result<()> {
    let test_db = TestDb::new().await;
    let cancel = CancellationToken::new();

    for (n, user) in ["dispatcher", "accountant", "dispatcher"].iter().enumerate() {
        let uow = test_db.unit_of_work();
        uow.trucks()?.add(generators::truck(n as i64 + 1), &cancel).await?;
        uow.save_changes_for_user(user, &cancel).await?;
    }

    let uow = test_db.unit_of_work();
    let audit = uow.audit_logs()?;
    assert_eq!(audit.by_user("dispatcher", &cancel).await?.len(), 2);
    let recent = audit.recent(2, &cancel).await?;
    assert_eq!(recent.len(), 2);
    assert!(recent[0].id > recent[1].id || recent[0].timestamp > recent[1].timestamp);
    assert!(matches!(audit.recent(0, &cancel).await, Err(DataError::Argument(_))));
    Ok(())
}
