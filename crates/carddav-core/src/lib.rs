//! carddav-core: shared foundation for the CardDAV contact bridge
//!
//! Configuration, the error taxonomy, and the SQLite-backed store that
//! remembers vendor labels (custom subtypes) per addressbook.

pub mod config;
pub mod error;
pub mod store;

pub use config::{AddressbookConfig, Config, DatabaseConfig, HttpConfig, PhotoConfig};
pub use error::{Error, Result};
pub use store::{SqliteSubtypeStore, SubtypeRow, SubtypeStore};
