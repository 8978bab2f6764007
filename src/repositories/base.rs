//! Base repository trait and the generic implementation
//!
//! `Repository<T>` is the CRUD and query surface every entity gets.
//! `GenericRepository<T>` implements it once over the shared persistence
//! context; entity-specific repositories wrap it and add domain queries.
//!
//! Writes are only staged here. Nothing reaches the store until the owning
//! unit of work saves.

use std::marker::PhantomData;
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use sqlx::{FromRow, sqlite::SqliteRow};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{instrument, warn};

use crate::entities::Entity;
use crate::error::{DataError, Result};
use crate::repositories::query_builder::{AggregateFunction, EntityQueryBuilder, Filter, OrderBy, Projection};
use crate::storage::{EntityState, PersistenceContext};
use crate::utils::cancellable;

/// Common operations for all repositories
#[async_trait]
pub trait Repository<T: Entity>: Send + Sync {
    /// Get the entity by key, preferring staged state over the store
    async fn get_by_id(&self, id: i64, cancel: &CancellationToken) -> Result<Option<T>>;

    /// First entity matching `filter`
    async fn get(&self, filter: &Filter, cancel: &CancellationToken) -> Result<Option<T>>;

    async fn get_all(&self, cancel: &CancellationToken) -> Result<Vec<T>>;

    /// Every entity matching `filter`
    async fn find(&self, filter: &Filter, cancel: &CancellationToken) -> Result<Vec<T>>;

    /// Whether any entity matches; `None` asks whether the table has rows at all
    async fn exists(&self, filter: Option<&Filter>, cancel: &CancellationToken) -> Result<bool>;

    async fn count(&self, filter: Option<&Filter>, cancel: &CancellationToken) -> Result<i64>;

    /// Stage an insert
    async fn add(&self, entity: T, cancel: &CancellationToken) -> Result<T>;

    /// Stage several inserts; a rejected entity rejects the whole batch
    async fn add_range(&self, entities: Vec<T>, cancel: &CancellationToken) -> Result<Vec<T>>;

    /// Stage a full-entity update
    async fn update(&self, entity: T, cancel: &CancellationToken) -> Result<()>;

    /// Stage removal of the entity with key `id`; `false` when there is none
    async fn delete_by_id(&self, id: i64, cancel: &CancellationToken) -> Result<bool>;

    /// Stage removal without looking the entity up
    async fn delete(&self, entity: T, cancel: &CancellationToken) -> Result<()>;

    /// Stage removal of every match, returning how many were staged
    async fn delete_range(&self, filter: &Filter, cancel: &CancellationToken) -> Result<usize>;

    /// One page of matches. Pages are 1-based.
    async fn get_paged(
        &self,
        page_number: u32,
        page_size: u32,
        filter: Option<&Filter>,
        order_by: &[OrderBy],
        cancel: &CancellationToken,
    ) -> Result<Vec<T>>;

    /// Project matches into a lighter row shape without loading entities
    async fn select<R>(
        &self,
        projection: &Projection,
        filter: Option<&Filter>,
        cancel: &CancellationToken,
    ) -> Result<Vec<R>>
    where
        R: for<'r> FromRow<'r, SqliteRow> + Send + Unpin + 'static;
}

/// Repository for any [`Entity`], bound to one unit of work's context
pub struct GenericRepository<T> {
    context: Weak<Mutex<PersistenceContext>>,
    _entity: PhantomData<fn() -> T>,
}

impl<T: Entity> GenericRepository<T> {
    /// Create a repository over `context`; it does not keep the context alive
    pub fn new(context: &Arc<Mutex<PersistenceContext>>) -> Self {
        Self {
            context: Arc::downgrade(context),
            _entity: PhantomData,
        }
    }

    fn context(&self) -> Result<Arc<Mutex<PersistenceContext>>> {
        self.context.upgrade().ok_or_else(|| DataError::disposed("UnitOfWork"))
    }

    /// Matches of `filter` in the given order, optionally capped at `limit`
    #[instrument(skip_all, fields(entity = T::NAME))]
    pub async fn find_ordered(
        &self,
        filter: Option<&Filter>,
        order_by: &[OrderBy],
        limit: Option<i64>,
        cancel: &CancellationToken,
    ) -> Result<Vec<T>> {
        cancellable(cancel, "find_ordered", async {
            let context = self.context()?;
            let mut context = context.lock().await;
            load(&mut context, filter, order_by, limit.map(|l| (l, 0)), "find_ordered").await
        })
        .await
    }

    /// `SUM(column)` over the matches, zero when nothing matches
    #[instrument(skip_all, fields(entity = T::NAME, column = %column))]
    pub async fn sum(&self, column: &str, filter: Option<&Filter>, cancel: &CancellationToken) -> Result<i64> {
        let projection = Projection::new().aggregate(AggregateFunction::Sum, Some(column), "total");
        let rows: Vec<(Option<i64>,)> = self.select(&projection, filter, cancel).await?;
        Ok(rows.first().and_then(|(total,)| *total).unwrap_or(0))
    }
}

async fn load<T: Entity>(
    context: &mut PersistenceContext,
    filter: Option<&Filter>,
    order_by: &[OrderBy],
    limit: Option<(i64, i64)>,
    operation: &'static str,
) -> Result<Vec<T>> {
    let mut query = EntityQueryBuilder::select_entity::<T>()?;
    query.filter(filter)?.order_by(order_by)?;
    if let Some((limit, offset)) = limit {
        query.limit(limit, offset);
    }
    context
        .fetch_all::<T>(query.builder_mut())
        .await
        .map_err(|e| DataError::data_access(T::NAME, operation, e).logged())
}

async fn load_by_id<T: Entity>(context: &mut PersistenceContext, id: i64, operation: &'static str) -> Result<Option<T>> {
    let mut query = EntityQueryBuilder::select_entity::<T>()?;
    query.filter(Some(&Filter::eq(T::KEY, id)))?;
    context
        .fetch_optional::<T>(query.builder_mut())
        .await
        .map_err(|e| DataError::data_access(T::NAME, operation, e).logged())
}

#[async_trait]
impl<T: Entity> Repository<T> for GenericRepository<T> {
    #[instrument(skip(self, cancel), fields(entity = T::NAME))]
    async fn get_by_id(&self, id: i64, cancel: &CancellationToken) -> Result<Option<T>> {
        cancellable(cancel, "get_by_id", async {
            let context = self.context()?;
            let mut context = context.lock().await;
            // staged state wins over the store
            match context.tracker().find::<T>(id) {
                Some((EntityState::Deleted, _)) => return Ok(None),
                Some((_, staged)) => return Ok(Some(staged.clone())),
                None => {}
            }
            load_by_id(&mut context, id, "get_by_id").await
        })
        .await
    }

    #[instrument(skip_all, fields(entity = T::NAME))]
    async fn get(&self, filter: &Filter, cancel: &CancellationToken) -> Result<Option<T>> {
        cancellable(cancel, "get", async {
            let context = self.context()?;
            let mut context = context.lock().await;
            let mut rows: Vec<T> = load(&mut context, Some(filter), &[], Some((1, 0)), "get").await?;
            Ok(rows.pop())
        })
        .await
    }

    #[instrument(skip_all, fields(entity = T::NAME))]
    async fn get_all(&self, cancel: &CancellationToken) -> Result<Vec<T>> {
        cancellable(cancel, "get_all", async {
            let context = self.context()?;
            let mut context = context.lock().await;
            load(&mut context, None, &[], None, "get_all").await
        })
        .await
    }

    #[instrument(skip_all, fields(entity = T::NAME))]
    async fn find(&self, filter: &Filter, cancel: &CancellationToken) -> Result<Vec<T>> {
        cancellable(cancel, "find", async {
            let context = self.context()?;
            let mut context = context.lock().await;
            load(&mut context, Some(filter), &[], None, "find").await
        })
        .await
    }

    #[instrument(skip_all, fields(entity = T::NAME))]
    async fn exists(&self, filter: Option<&Filter>, cancel: &CancellationToken) -> Result<bool> {
        cancellable(cancel, "exists", async {
            let mut query = EntityQueryBuilder::exists::<T>()?;
            query.filter(filter)?;
            let mut query = query.finish();
            let context = self.context()?;
            let mut context = context.lock().await;
            let found = context
                .fetch_scalar(&mut query)
                .await
                .map_err(|e| DataError::data_access(T::NAME, "exists", e).logged())?;
            Ok(found != 0)
        })
        .await
    }

    #[instrument(skip_all, fields(entity = T::NAME))]
    async fn count(&self, filter: Option<&Filter>, cancel: &CancellationToken) -> Result<i64> {
        cancellable(cancel, "count", async {
            let mut query = EntityQueryBuilder::count::<T>()?;
            query.filter(filter)?;
            let context = self.context()?;
            let mut context = context.lock().await;
            context
                .fetch_scalar(query.builder_mut())
                .await
                .map_err(|e| DataError::data_access(T::NAME, "count", e).logged())
        })
        .await
    }

    #[instrument(skip_all, fields(entity = T::NAME, key = ?entity.key()))]
    async fn add(&self, entity: T, cancel: &CancellationToken) -> Result<T> {
        cancellable(cancel, "add", async {
            let context = self.context()?;
            let mut context = context.lock().await;
            context.tracker_mut().stage_added(entity.clone())?;
            Ok(entity)
        })
        .await
    }

    #[instrument(skip_all, fields(entity = T::NAME, batch = entities.len()))]
    async fn add_range(&self, entities: Vec<T>, cancel: &CancellationToken) -> Result<Vec<T>> {
        cancellable(cancel, "add_range", async {
            let context = self.context()?;
            let mut context = context.lock().await;
            context.tracker_mut().stage_added_range(entities.clone())?;
            Ok(entities)
        })
        .await
    }

    #[instrument(skip_all, fields(entity = T::NAME, key = ?entity.key()))]
    async fn update(&self, entity: T, cancel: &CancellationToken) -> Result<()> {
        cancellable(cancel, "update", async {
            let context = self.context()?;
            let mut context = context.lock().await;
            context.stage_modified(entity)
        })
        .await
    }

    #[instrument(skip(self, cancel), fields(entity = T::NAME))]
    async fn delete_by_id(&self, id: i64, cancel: &CancellationToken) -> Result<bool> {
        cancellable(cancel, "delete_by_id", async {
            let context = self.context()?;
            let mut context = context.lock().await;
            let staged = context
                .tracker()
                .find::<T>(id)
                .map(|(state, entity)| (state, entity.clone()));
            let target = match staged {
                Some((EntityState::Deleted, _)) => None,
                Some((_, entity)) => Some(entity),
                None => load_by_id::<T>(&mut context, id, "delete_by_id").await?,
            };
            match target {
                Some(entity) => {
                    context.stage_deleted(entity)?;
                    Ok(true)
                }
                None => Ok(false),
            }
        })
        .await
    }

    #[instrument(skip_all, fields(entity = T::NAME, key = ?entity.key()))]
    async fn delete(&self, entity: T, cancel: &CancellationToken) -> Result<()> {
        cancellable(cancel, "delete", async {
            let context = self.context()?;
            let mut context = context.lock().await;
            context.stage_deleted(entity)
        })
        .await
    }

    #[instrument(skip_all, fields(entity = T::NAME))]
    async fn delete_range(&self, filter: &Filter, cancel: &CancellationToken) -> Result<usize> {
        cancellable(cancel, "delete_range", async {
            let context = self.context()?;
            let mut context = context.lock().await;
            let matches: Vec<T> = load(&mut context, Some(filter), &[], None, "delete_range").await?;
            let staged = matches.len();
            for entity in matches {
                context.stage_deleted(entity)?;
            }
            Ok(staged)
        })
        .await
    }

    #[instrument(skip(self, filter, order_by, cancel), fields(entity = T::NAME))]
    async fn get_paged(
        &self,
        page_number: u32,
        page_size: u32,
        filter: Option<&Filter>,
        order_by: &[OrderBy],
        cancel: &CancellationToken,
    ) -> Result<Vec<T>> {
        if page_number == 0 || page_size == 0 {
            return Err(DataError::argument(format!(
                "page number and page size must be at least 1 (got {page_number} and {page_size})"
            )));
        }
        cancellable(cancel, "get_paged", async {
            let fallback;
            let order_by = if order_by.is_empty() {
                warn!(entity = T::NAME, "Paging without an ordering, falling back to key order");
                fallback = [OrderBy::asc(T::KEY)];
                &fallback[..]
            } else {
                order_by
            };
            let offset = i64::from(page_number - 1) * i64::from(page_size);
            let context = self.context()?;
            let mut context = context.lock().await;
            load(&mut context, filter, order_by, Some((i64::from(page_size), offset)), "get_paged").await
        })
        .await
    }

    #[instrument(skip_all, fields(entity = T::NAME))]
    async fn select<R>(
        &self,
        projection: &Projection,
        filter: Option<&Filter>,
        cancel: &CancellationToken,
    ) -> Result<Vec<R>>
    where
        R: for<'r> FromRow<'r, SqliteRow> + Send + Unpin + 'static,
    {
        cancellable(cancel, "select", async {
            let mut query = EntityQueryBuilder::select_projection::<T>(projection)?;
            query.filter(filter)?;
            let context = self.context()?;
            let mut context = context.lock().await;
            context
                .fetch_all::<R>(query.builder_mut())
                .await
                .map_err(|e| DataError::data_access(T::NAME, "select", e).logged())
        })
        .await
    }
}
