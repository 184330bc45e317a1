pub mod analytics;
pub mod db;
pub mod domain;
pub mod error;
pub mod services;
pub mod store;

pub use error::{AnalyticsError, StoreError};
pub use services::Services;
