//! Implements a SQLite backed transaction store.

use std::sync::{Arc, Mutex, MutexGuard};

use rusqlite::{
    Connection, OptionalExtension, Row, ToSql, params_from_iter,
    types::{FromSql, FromSqlError, FromSqlResult, ToSqlOutput, ValueRef},
};

use crate::{
    Error,
    category::{Category, CategoryId, find_category},
    database_id::{TransactionId, UserId},
};

use super::{
    domain::{NewTransaction, RecurrenceType, Transaction, TransactionKind, TransactionPatch},
    query::{TRANSACTION_COLUMNS, TransactionQuery},
    store::TransactionStore,
};

/// Stores incomes and expenses in a SQLite database, one table per kind.
///
/// The category table must exist before the transaction tables are created.
#[derive(Debug, Clone)]
pub struct SQLiteTransactionStore {
    connection: Arc<Mutex<Connection>>,
}

impl SQLiteTransactionStore {
    /// Create a new store for the SQLite `connection`.
    pub fn new(connection: Arc<Mutex<Connection>>) -> Self {
        Self { connection }
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, Error> {
        self.connection.lock().map_err(|_| Error::DatabaseLockError)
    }
}

impl ToSql for RecurrenceType {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(self.as_str().into())
    }
}

impl FromSql for RecurrenceType {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value
            .as_str()?
            .parse()
            .map_err(|error: String| FromSqlError::Other(error.into()))
    }
}

impl TransactionStore for SQLiteTransactionStore {
    fn find_transactions(&self, query: &TransactionQuery) -> Result<Vec<Transaction>, Error> {
        let (sql, parameters) = query.to_sql();
        let kind = query.kind();

        self.lock()?
            .prepare(&sql)?
            .query_map(params_from_iter(parameters.iter()), |row| {
                map_transaction_row(row, kind)
            })?
            .map(|maybe_transaction| maybe_transaction.map_err(Error::from))
            .collect()
    }

    /// # Errors
    /// This function will return a:
    /// - [Error::NotFound] if `id` does not refer to a row owned by `user_id`,
    /// - or [Error::SqlError] if there is some other SQL error.
    fn get_transaction(
        &self,
        kind: TransactionKind,
        user_id: UserId,
        id: TransactionId,
    ) -> Result<Transaction, Error> {
        get_transaction(kind, user_id, id, &*self.lock()?)
    }

    fn find_category(
        &self,
        category_id: CategoryId,
        user_id: UserId,
    ) -> Result<Option<Category>, Error> {
        find_category(category_id, user_id, &*self.lock()?)
    }

    /// Insert a new row.
    ///
    /// # Errors
    /// This function will return a:
    /// - [Error::InvalidCategory] if the category does not exist,
    /// - or [Error::SqlError] if there is some other SQL error.
    fn create_transaction(&self, new_transaction: NewTransaction) -> Result<Transaction, Error> {
        let connection = self.lock()?;

        connection
            .execute(
                &format!(
                    "INSERT INTO {} (user_id, description, value, date, category_id, is_fixed, \
                     recurrence_type, start_date, end_date, linked_template_id) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                    new_transaction.kind.table_name()
                ),
                rusqlite::params![
                    new_transaction.user_id,
                    new_transaction.description,
                    new_transaction.value,
                    new_transaction.date,
                    new_transaction.category_id,
                    new_transaction.is_fixed,
                    new_transaction.recurrence_type,
                    new_transaction.start_date,
                    new_transaction.end_date,
                    new_transaction.linked_template_id,
                ],
            )
            .map_err(|error| match error {
                // Code 787 occurs when a FOREIGN KEY constraint failed.
                rusqlite::Error::SqliteFailure(error, Some(_)) if error.extended_code == 787 => {
                    Error::InvalidCategory(new_transaction.category_id)
                }
                error => error.into(),
            })?;

        let id = connection.last_insert_rowid();

        get_transaction(new_transaction.kind, new_transaction.user_id, id, &connection)
    }

    fn update_transaction(
        &self,
        kind: TransactionKind,
        user_id: UserId,
        id: TransactionId,
        patch: &TransactionPatch,
    ) -> Result<Transaction, Error> {
        let connection = self.lock()?;

        let existing = match get_transaction(kind, user_id, id, &connection) {
            Ok(existing) => existing,
            Err(Error::NotFound) => return Err(Error::UpdateMissingTransaction),
            Err(error) => return Err(error),
        };
        let updated = patch.apply(&existing);

        connection
            .execute(
                &format!(
                    "UPDATE {} SET description = ?1, value = ?2, date = ?3, category_id = ?4, \
                     recurrence_type = ?5, start_date = ?6, end_date = ?7 \
                     WHERE id = ?8 AND user_id = ?9",
                    kind.table_name()
                ),
                rusqlite::params![
                    updated.description,
                    updated.value,
                    updated.date,
                    updated.category_id,
                    updated.recurrence_type,
                    updated.start_date,
                    updated.end_date,
                    id,
                    user_id,
                ],
            )
            .map_err(|error| match error {
                rusqlite::Error::SqliteFailure(error, Some(_)) if error.extended_code == 787 => {
                    Error::InvalidCategory(updated.category_id)
                }
                error => error.into(),
            })?;

        // Re-read to pick up the joined category name.
        get_transaction(kind, user_id, id, &connection)
    }

    fn link_to_template(
        &self,
        kind: TransactionKind,
        user_id: UserId,
        row_id: TransactionId,
        template_id: TransactionId,
    ) -> Result<bool, Error> {
        let rows_affected = self.lock()?.execute(
            &format!(
                "UPDATE {} SET linked_template_id = ?1 \
                 WHERE id = ?2 AND user_id = ?3 AND is_fixed = 0 AND linked_template_id IS NULL",
                kind.table_name()
            ),
            (template_id, row_id, user_id),
        )?;

        Ok(rows_affected > 0)
    }

    fn delete_transaction(
        &self,
        kind: TransactionKind,
        user_id: UserId,
        id: TransactionId,
    ) -> Result<(), Error> {
        let rows_affected = self.lock()?.execute(
            &format!(
                "DELETE FROM {} WHERE id = ?1 AND user_id = ?2 AND is_fixed = 0",
                kind.table_name()
            ),
            (id, user_id),
        )?;

        if rows_affected == 0 {
            return Err(Error::DeleteMissingTransaction);
        }

        Ok(())
    }

    fn delete_transactions_by_template(
        &self,
        kind: TransactionKind,
        user_id: UserId,
        template_id: TransactionId,
    ) -> Result<usize, Error> {
        delete_linked_rows(kind, user_id, template_id, &*self.lock()?)
    }

    fn delete_template_cascade(
        &self,
        kind: TransactionKind,
        user_id: UserId,
        template_id: TransactionId,
    ) -> Result<usize, Error> {
        let connection = self.lock()?;
        let transaction = connection.unchecked_transaction()?;

        let linked_rows_deleted = delete_linked_rows(kind, user_id, template_id, &transaction)?;
        let templates_deleted = transaction.execute(
            &format!(
                "DELETE FROM {} WHERE id = ?1 AND user_id = ?2 AND is_fixed = 1",
                kind.table_name()
            ),
            (template_id, user_id),
        )?;

        if templates_deleted == 0 {
            // Dropping the SQL transaction rolls back the linked row deletes.
            return Err(Error::DeleteMissingTemplate);
        }

        transaction.commit()?;

        Ok(linked_rows_deleted)
    }
}

fn get_transaction(
    kind: TransactionKind,
    user_id: UserId,
    id: TransactionId,
    connection: &Connection,
) -> Result<Transaction, Error> {
    connection
        .prepare(&format!(
            "SELECT {TRANSACTION_COLUMNS} FROM {} t \
             LEFT JOIN category c ON t.category_id = c.id \
             WHERE t.id = ?1 AND t.user_id = ?2",
            kind.table_name()
        ))?
        .query_row((id, user_id), |row| map_transaction_row(row, kind))
        .optional()?
        .ok_or(Error::NotFound)
}

fn delete_linked_rows(
    kind: TransactionKind,
    user_id: UserId,
    template_id: TransactionId,
    connection: &Connection,
) -> Result<usize, Error> {
    let rows_affected = connection.execute(
        &format!(
            "DELETE FROM {} WHERE linked_template_id = ?1 AND user_id = ?2 AND is_fixed = 0",
            kind.table_name()
        ),
        (template_id, user_id),
    )?;

    Ok(rows_affected)
}

/// Create the income and expense tables and their indexes.
pub fn create_transaction_tables(connection: &Connection) -> Result<(), rusqlite::Error> {
    for kind in TransactionKind::ALL {
        let table = kind.table_name();

        connection.execute_batch(&format!(
            "CREATE TABLE IF NOT EXISTS {table} (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL,
                description TEXT,
                value REAL NOT NULL CHECK (value > 0),
                date TEXT NOT NULL,
                category_id INTEGER,
                is_fixed INTEGER NOT NULL DEFAULT 0,
                recurrence_type TEXT,
                start_date TEXT,
                end_date TEXT,
                linked_template_id INTEGER,
                FOREIGN KEY(category_id) REFERENCES category(id) ON UPDATE CASCADE ON DELETE SET NULL
            );

            CREATE INDEX IF NOT EXISTS idx_{table}_user_date ON {table}(user_id, is_fixed, date);
            CREATE INDEX IF NOT EXISTS idx_{table}_linked_template ON {table}(linked_template_id);"
        ))?;
    }

    Ok(())
}

/// Map a row selected with [TRANSACTION_COLUMNS] to a [Transaction].
pub(crate) fn map_transaction_row(
    row: &Row,
    kind: TransactionKind,
) -> Result<Transaction, rusqlite::Error> {
    Ok(Transaction {
        id: row.get(0)?,
        kind,
        user_id: row.get(1)?,
        description: row.get(2)?,
        value: row.get(3)?,
        date: row.get(4)?,
        category_id: row.get(5)?,
        is_fixed: row.get(6)?,
        recurrence_type: row.get(7)?,
        start_date: row.get(8)?,
        end_date: row.get(9)?,
        linked_template_id: row.get(10)?,
        category_name: row.get(11)?,
    })
}
