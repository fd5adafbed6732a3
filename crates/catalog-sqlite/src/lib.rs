//! SQLite-backed catalog of profiles, services and site settings.

mod error;
mod open;
mod profiles;
mod query;
mod schema;
mod services;
mod settings;

pub use error::{StoreError, StoreResult};
pub use open::Db;
