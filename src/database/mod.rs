/*!
 * SQLite checkpoint store.
 *
 * Persists succeeded unit translations so that an interrupted or partially
 * failed run can be resumed without translating the same units again.
 */

pub mod connection;
pub mod models;
pub mod repository;
pub mod schema;

pub use connection::DatabaseConnection;
pub use models::{RunRecord, RunStatus, UnitTranslationRecord};
pub use repository::Repository;
