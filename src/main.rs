use color_eyre::Result;
use haulage_data::{
    DataConfig, DatabaseManager, Repository, UnitOfWorkFactory, entities::DailyReconciliation, logging, provider,
};
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Apply migrations to the configured database and report table sizes
#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let config = DataConfig::from_env()?;
    logging::init(&config.log_filter)?;

    let provider = provider::bootstrap(config).await?;
    provider::global().configure(provider)?;

    let factory = provider::global().get_service::<UnitOfWorkFactory>()?;
    let mut uow = factory.create();
    let cancel = CancellationToken::new();

    info!(count = uow.trucks()?.count(None, &cancel).await?, "trucks");
    info!(count = uow.customers()?.count(None, &cancel).await?, "customers");
    info!(count = uow.invoices()?.count(None, &cancel).await?, "invoices");
    info!(count = uow.payments()?.count(None, &cancel).await?, "payments");
    info!(count = uow.truck_loads()?.count(None, &cancel).await?, "truck_loads");
    info!(
        count = uow.repository::<DailyReconciliation>()?.count(None, &cancel).await?,
        "daily_reconciliations"
    );
    info!(count = uow.audit_logs()?.count(None, &cancel).await?, "audit_logs");

    uow.dispose().await;
    if let Ok(db) = provider::global().get_service::<DatabaseManager>() {
        db.close().await;
    }
    provider::global().dispose();
    Ok(())
}
