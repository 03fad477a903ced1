//! Defines the transaction store trait and a logging wrapper for it.

use crate::{
    Error,
    category::{Category, CategoryId},
    database_id::{TransactionId, UserId},
};

use super::{
    domain::{NewTransaction, Transaction, TransactionKind, TransactionPatch},
    query::TransactionQuery,
};

/// Handles the creation, retrieval and removal of incomes and expenses,
/// both templates and concrete rows.
///
/// Every operation is scoped to a user: rows owned by other users behave as
/// if they do not exist.
pub trait TransactionStore {
    /// Retrieve the rows described by `query`, ordered by date then id.
    fn find_transactions(&self, query: &TransactionQuery) -> Result<Vec<Transaction>, Error>;

    /// Retrieve a single row, template or concrete.
    ///
    /// # Errors
    /// Returns [Error::NotFound] if there is no such row for the user.
    fn get_transaction(
        &self,
        kind: TransactionKind,
        user_id: UserId,
        id: TransactionId,
    ) -> Result<Transaction, Error>;

    /// Retrieve a category if it is owned by `user_id`.
    fn find_category(
        &self,
        category_id: CategoryId,
        user_id: UserId,
    ) -> Result<Option<Category>, Error>;

    /// Insert a new row.
    fn create_transaction(&self, new_transaction: NewTransaction) -> Result<Transaction, Error>;

    /// Apply `patch` to a row and return the updated row.
    ///
    /// # Errors
    /// Returns [Error::UpdateMissingTransaction] if there is no such row for the user.
    fn update_transaction(
        &self,
        kind: TransactionKind,
        user_id: UserId,
        id: TransactionId,
        patch: &TransactionPatch,
    ) -> Result<Transaction, Error>;

    /// Link the concrete row `row_id` to `template_id` if it is not linked yet.
    ///
    /// Returns whether the link was written. Setting a link twice is harmless.
    fn link_to_template(
        &self,
        kind: TransactionKind,
        user_id: UserId,
        row_id: TransactionId,
        template_id: TransactionId,
    ) -> Result<bool, Error>;

    /// Delete a concrete row. Templates are not affected.
    ///
    /// # Errors
    /// Returns [Error::DeleteMissingTransaction] if there is no such concrete row.
    fn delete_transaction(
        &self,
        kind: TransactionKind,
        user_id: UserId,
        id: TransactionId,
    ) -> Result<(), Error>;

    /// Delete every concrete row linked to `template_id` and return how many
    /// were deleted.
    fn delete_transactions_by_template(
        &self,
        kind: TransactionKind,
        user_id: UserId,
        template_id: TransactionId,
    ) -> Result<usize, Error>;

    /// Delete a template along with its linked rows, all or nothing.
    ///
    /// Returns the number of linked rows that were deleted.
    ///
    /// # Errors
    /// Returns [Error::DeleteMissingTemplate] if there is no such template.
    fn delete_template_cascade(
        &self,
        kind: TransactionKind,
        user_id: UserId,
        template_id: TransactionId,
    ) -> Result<usize, Error>;
}

/// Wraps a [TransactionStore] and logs each call and any failure.
#[derive(Debug, Clone)]
pub struct TracedStore<S> {
    inner: S,
}

impl<S> TracedStore<S> {
    /// Wrap `inner`.
    pub fn new(inner: S) -> Self {
        Self { inner }
    }
}

fn traced<T>(operation: &str, result: Result<T, Error>) -> Result<T, Error> {
    if let Err(error) = &result {
        match error {
            // Expected outcomes the caller turns into client errors.
            Error::NotFound
            | Error::UpdateMissingTransaction
            | Error::DeleteMissingTransaction
            | Error::DeleteMissingTemplate => {
                tracing::debug!("{operation} failed: {error}")
            }
            _ => tracing::error!("{operation} failed: {error}"),
        }
    }

    result
}

impl<S: TransactionStore> TransactionStore for TracedStore<S> {
    fn find_transactions(&self, query: &TransactionQuery) -> Result<Vec<Transaction>, Error> {
        tracing::debug!(?query, "find_transactions");
        let result = self.inner.find_transactions(query);

        if let Ok(rows) = &result {
            tracing::debug!("find_transactions returned {} rows", rows.len());
        }

        traced("find_transactions", result)
    }

    fn get_transaction(
        &self,
        kind: TransactionKind,
        user_id: UserId,
        id: TransactionId,
    ) -> Result<Transaction, Error> {
        tracing::debug!(%kind, user_id, id, "get_transaction");
        traced("get_transaction", self.inner.get_transaction(kind, user_id, id))
    }

    fn find_category(
        &self,
        category_id: CategoryId,
        user_id: UserId,
    ) -> Result<Option<Category>, Error> {
        tracing::debug!(category_id, user_id, "find_category");
        traced("find_category", self.inner.find_category(category_id, user_id))
    }

    fn create_transaction(&self, new_transaction: NewTransaction) -> Result<Transaction, Error> {
        tracing::debug!(?new_transaction, "create_transaction");
        traced(
            "create_transaction",
            self.inner.create_transaction(new_transaction),
        )
    }

    fn update_transaction(
        &self,
        kind: TransactionKind,
        user_id: UserId,
        id: TransactionId,
        patch: &TransactionPatch,
    ) -> Result<Transaction, Error> {
        tracing::debug!(%kind, user_id, id, ?patch, "update_transaction");
        traced(
            "update_transaction",
            self.inner.update_transaction(kind, user_id, id, patch),
        )
    }

    fn link_to_template(
        &self,
        kind: TransactionKind,
        user_id: UserId,
        row_id: TransactionId,
        template_id: TransactionId,
    ) -> Result<bool, Error> {
        tracing::debug!(%kind, user_id, row_id, template_id, "link_to_template");
        traced(
            "link_to_template",
            self.inner.link_to_template(kind, user_id, row_id, template_id),
        )
    }

    fn delete_transaction(
        &self,
        kind: TransactionKind,
        user_id: UserId,
        id: TransactionId,
    ) -> Result<(), Error> {
        tracing::debug!(%kind, user_id, id, "delete_transaction");
        traced(
            "delete_transaction",
            self.inner.delete_transaction(kind, user_id, id),
        )
    }

    fn delete_transactions_by_template(
        &self,
        kind: TransactionKind,
        user_id: UserId,
        template_id: TransactionId,
    ) -> Result<usize, Error> {
        tracing::debug!(%kind, user_id, template_id, "delete_transactions_by_template");
        traced(
            "delete_transactions_by_template",
            self.inner
                .delete_transactions_by_template(kind, user_id, template_id),
        )
    }

    fn delete_template_cascade(
        &self,
        kind: TransactionKind,
        user_id: UserId,
        template_id: TransactionId,
    ) -> Result<usize, Error> {
        tracing::debug!(%kind, user_id, template_id, "delete_template_cascade");
        traced(
            "delete_template_cascade",
            self.inner.delete_template_cascade(kind, user_id, template_id),
        )
    }
}
