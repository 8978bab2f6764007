// Core storage modules
pub mod context;
pub mod db;
pub mod tracker;
pub mod value;

pub use context::PersistenceContext;
pub use db::DatabaseManager;
pub use tracker::{ChangeCounts, ChangeTracker, EntityState};
pub use value::SqlValue;
