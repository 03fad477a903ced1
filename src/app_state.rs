//! The shared state handed to every route handler.

use std::sync::{Arc, Mutex};

use rusqlite::Connection;

use crate::{
    Error,
    cache::{CacheConfig, OccurrenceCache},
    db::initialize,
    transaction::{SQLiteTransactionStore, TracedStore},
};

/// The state of the REST server, cloned into every handler.
#[derive(Debug, Clone)]
pub struct AppState {
    /// The local timezone as a canonical timezone name, e.g. "America/Sao_Paulo".
    pub local_timezone: String,

    /// The SQLite connection used by categories and goals.
    pub db_connection: Arc<Mutex<Connection>>,

    /// The income and expense store, sharing `db_connection`.
    pub transaction_store: TracedStore<SQLiteTransactionStore>,

    /// Memoized occurrence listings.
    pub cache: OccurrenceCache,
}

impl AppState {
    /// Create a new [AppState] with a SQLite database connection.
    ///
    /// Missing tables are created before the state is returned.
    /// `local_timezone` should be a valid, canonical timezone name, e.g. "America/Sao_Paulo".
    ///
    /// # Errors
    /// Returns an error if the database cannot be initialized.
    pub fn new(
        db_connection: Connection,
        local_timezone: &str,
        cache_config: CacheConfig,
    ) -> Result<Self, Error> {
        initialize(&db_connection)?;

        let connection = Arc::new(Mutex::new(db_connection));

        Ok(Self {
            local_timezone: local_timezone.to_owned(),
            transaction_store: TracedStore::new(SQLiteTransactionStore::new(connection.clone())),
            db_connection: connection,
            cache: OccurrenceCache::new(cache_config),
        })
    }
}
