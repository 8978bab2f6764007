//! Service provider and locator
//!
//! The application's bootstrap builds one [`ServiceProvider`] holding the
//! configured data layer and hands it to a [`ServiceLocator`]. Components
//! resolve shared capabilities by type. The locator is `Unconfigured` until
//! configured exactly once, and `Disposed` for good after shutdown.

use std::any::{Any, TypeId, type_name};
use std::collections::HashMap;
use std::sync::{Arc, LazyLock};

use parking_lot::Mutex;
use tracing::{info, instrument};

use crate::config::DataConfig;
use crate::error::{DataError, Result};
use crate::storage::DatabaseManager;

/// Immutable map from type to a shared instance of that type
#[derive(Clone, Default)]
pub struct ServiceProvider {
    services: Arc<HashMap<TypeId, Arc<dyn Any + Send + Sync>>>,
}

impl ServiceProvider {
    pub fn builder() -> ServiceProviderBuilder {
        ServiceProviderBuilder::default()
    }

    /// Resolve the registered instance of `T`
    pub fn get<T: Any + Send + Sync>(&self) -> Result<Arc<T>> {
        self.services
            .get(&TypeId::of::<T>())
            .cloned()
            .and_then(|service| service.downcast::<T>().ok())
            .ok_or(DataError::ServiceNotRegistered(type_name::<T>()))
    }

    pub fn contains<T: Any + Send + Sync>(&self) -> bool {
        self.services.contains_key(&TypeId::of::<T>())
    }

    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }
}

#[derive(Default)]
pub struct ServiceProviderBuilder {
    services: HashMap<TypeId, Arc<dyn Any + Send + Sync>>,
}

impl ServiceProviderBuilder {
    /// Register `service`, replacing any earlier registration of the same type
    pub fn register<T: Any + Send + Sync>(mut self, service: Arc<T>) -> Self {
        self.services.insert(TypeId::of::<T>(), service);
        self
    }

    pub fn build(self) -> ServiceProvider {
        ServiceProvider {
            services: Arc::new(self.services),
        }
    }
}

enum LocatorState {
    Unconfigured,
    Configured(ServiceProvider),
    Disposed,
}

/// Process-wide access point to a [`ServiceProvider`]
pub struct ServiceLocator {
    state: Mutex<LocatorState>,
}

impl Default for ServiceLocator {
    fn default() -> Self {
        Self::new()
    }
}

impl ServiceLocator {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(LocatorState::Unconfigured),
        }
    }

    /// Install the provider. Allowed once, and never after disposal.
    pub fn configure(&self, provider: ServiceProvider) -> Result<()> {
        let mut state = self.state.lock();
        match *state {
            LocatorState::Unconfigured => {
                info!(services = provider.len(), "Service locator configured");
                *state = LocatorState::Configured(provider);
                Ok(())
            }
            LocatorState::Configured(_) => Err(DataError::invalid_operation("service locator is already configured")),
            LocatorState::Disposed => Err(DataError::disposed("service locator")),
        }
    }

    /// Resolve `T` from the configured provider
    pub fn get_service<T: Any + Send + Sync>(&self) -> Result<Arc<T>> {
        match &*self.state.lock() {
            LocatorState::Configured(provider) => provider.get::<T>(),
            LocatorState::Unconfigured => Err(DataError::invalid_operation("service locator is not configured")),
            LocatorState::Disposed => Err(DataError::disposed("service locator")),
        }
    }

    pub fn is_configured(&self) -> bool {
        matches!(*self.state.lock(), LocatorState::Configured(_))
    }

    /// Drop the provider; later lookups fail. Safe to call repeatedly.
    pub fn dispose(&self) {
        let previous = std::mem::replace(&mut *self.state.lock(), LocatorState::Disposed);
        if let LocatorState::Configured(_) = previous {
            info!("Service locator disposed");
        }
    }
}

static GLOBAL: LazyLock<ServiceLocator> = LazyLock::new(ServiceLocator::new);

/// The process-wide locator used by the application bootstrap
pub fn global() -> &'static ServiceLocator {
    &GLOBAL
}

/// Connect the database, apply migrations when configured to, and build a
/// provider exposing the configuration, the database and a unit of work
/// factory
#[instrument(skip_all, err)]
pub async fn bootstrap(config: DataConfig) -> Result<ServiceProvider> {
    let db = DatabaseManager::connect(&config).await?;
    if config.run_migrations {
        db.run_migrations().await?;
    }
    let factory = db.unit_of_work_factory();
    Ok(ServiceProvider::builder()
        .register(Arc::new(config))
        .register(Arc::new(db))
        .register(Arc::new(factory))
        .build())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::unit_of_work::UnitOfWorkFactory;

    #[derive(Debug, PartialEq)]
    struct Clock(u32);

    fn provider() -> ServiceProvider {
        ServiceProvider::builder().register(Arc::new(Clock(7))).build()
    }

    #[test]
    fn provider_resolves_registered_types_only() {
        let provider = provider();
        assert_eq!(*provider.get::<Clock>().unwrap(), Clock(7));
        assert!(matches!(
            provider.get::<String>(),
            Err(DataError::ServiceNotRegistered(name)) if name.contains("String")
        ));
    }

    #[test]
    fn locator_lifecycle() {
        let locator = ServiceLocator::new();
        assert!(matches!(locator.get_service::<Clock>(), Err(DataError::InvalidOperation(_))));

        locator.configure(provider()).unwrap();
        assert!(locator.is_configured());
        assert_eq!(locator.get_service::<Clock>().unwrap().0, 7);
        assert!(matches!(locator.configure(provider()), Err(DataError::InvalidOperation(_))));

        locator.dispose();
        locator.dispose();
        assert!(!locator.is_configured());
        assert!(matches!(locator.get_service::<Clock>(), Err(DataError::InvalidOperation(_))));
        assert!(matches!(locator.configure(provider()), Err(DataError::InvalidOperation(_))));
    }

    #[test]
    fn global_locator_is_a_single_instance() {
        assert!(std::ptr::eq(global(), global()));
    }

    #[tokio::test]
    async fn bootstrap_registers_the_data_layer() {
        let dir = tempfile::tempdir().unwrap();
        let provider = bootstrap(DataConfig::for_path(dir.path().join("boot.db"))).await.unwrap();

        assert!(provider.contains::<DataConfig>());
        assert!(provider.contains::<DatabaseManager>());
        let factory = provider.get::<UnitOfWorkFactory>().unwrap();
        let uow = factory.create();
        assert_eq!(uow.pending_changes_count().await.unwrap(), 0);
    }
}
