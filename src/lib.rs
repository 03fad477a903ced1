//! Fintrack is a backend for tracking personal incomes, expenses and savings
//! goals.
//!
//! Most of the crate is plain request/validate/persist/respond plumbing. The
//! interesting part lives in [transaction]: recurring ("fixed") incomes and
//! expenses are stored as templates, and for any queried month the
//! application reconstructs which occurrences are already booked and which
//! are still pending, without ever booking the same occurrence twice.
//!
//! The library exposes a JSON REST API built with axum over a SQLite database.

#![warn(missing_docs)]

use std::{net::SocketAddr, time::Duration};

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use axum_server::Handle;
use serde_json::json;
use tokio::signal;

mod app_state;
mod auth;
mod cache;
mod category;
pub mod cleanup;
mod dashboard;
mod database_id;
pub mod date;
mod db;
pub mod endpoints;
mod goal;
mod logging;
mod routing;
mod timezone;
pub mod transaction;

pub use app_state::AppState;
pub use auth::USER_ID_HEADER;
pub use cache::{CacheConfig, Generation, OccurrenceCache};
pub use category::{Category, CategoryId, CategoryName, create_category};
pub use database_id::{DatabaseId, TransactionId, UserId};
pub use db::initialize as initialize_db;
pub use logging::{LOG_BODY_LENGTH_LIMIT, logging_middleware};
pub use routing::build_router;
pub use timezone::local_today;

use crate::date::MonthPeriod;

/// An async task that waits for either the ctrl+c or terminate signal, whichever comes first, and
/// then signals the server to shut down gracefully.
///
/// `handle` is a handle to an Axum `Server`.
pub async fn graceful_shutdown(handle: Handle<SocketAddr>) {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::debug!("Received ctrl+c signal.");
            handle.graceful_shutdown(Some(Duration::from_secs(1)));
        },
        _ = terminate => {
            tracing::debug!("Received terminate signal.");
            handle.graceful_shutdown(Some(Duration::from_secs(1)));
        },
    }
}

/// The errors that may occur in the application.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum Error {
    /// The request did not identify an authenticated user.
    #[error("the request is not authenticated")]
    Unauthorized,

    /// A date could not be parsed or does not exist.
    ///
    /// Callers should pass in the offending input.
    #[error("\"{0}\" is not a valid date, expected the format YYYY-MM-DD")]
    InvalidDate(String),

    /// The month/year filter of a query was malformed or incomplete.
    #[error("invalid month or year: {0}")]
    InvalidPeriod(String),

    /// An amount of money was zero, negative or not a number.
    #[error("{0} is not a valid amount, amounts must be greater than zero")]
    InvalidAmount(f64),

    /// The `fixed` query flag was not one of `1`, `0`, `true` or `false`.
    #[error("\"{0}\" is not a valid value for the fixed flag")]
    InvalidFixedFlag(String),

    /// A recurring transaction would end before it starts.
    #[error("the end date {end} is before the start date {start}")]
    EndDateBeforeStartDate {
        /// The first date the recurrence is active.
        start: time::Date,
        /// The requested last active date.
        end: time::Date,
    },

    /// An empty string was used to create a category name.
    #[error("Category name cannot be empty")]
    EmptyCategoryName,

    /// An empty string was used to create a goal name.
    #[error("Goal name cannot be empty")]
    EmptyGoalName,

    /// The category ID used to create a transaction did not match a category
    /// owned by the user.
    #[error("the category ID does not refer to a valid category")]
    InvalidCategory(Option<CategoryId>),

    /// The template ID used to create a transaction did not match a template
    /// of the same kind owned by the user.
    #[error("the ID {0} does not refer to a valid recurring transaction")]
    InvalidTemplate(TransactionId),

    /// The recurring transaction does not occur in the month of the date
    /// given for one of its occurrences.
    #[error("the recurring transaction does not occur in {0}")]
    OccurrenceOutsideSchedule(MonthPeriod),

    /// The recurring transaction already has a booked occurrence in the month.
    ///
    /// Booking a second one would show the same occurrence twice.
    #[error("the recurring transaction already has an occurrence in {0}")]
    DuplicateOccurrence(MonthPeriod),

    /// The user already has a category with this name.
    #[error("the category \"{0}\" already exists")]
    DuplicateCategoryName(String),

    /// The requested resource was not found.
    ///
    /// For HTTP request handlers, the client should check that the parameters
    /// (e.g., ID) are correct and that the resource has been created.
    ///
    /// Internally, this error may occur when a query returns no rows.
    #[error("the requested resource could not be found")]
    NotFound,

    /// Tried to update a transaction that does not exist
    #[error("tried to update a transaction that is not in the database")]
    UpdateMissingTransaction,

    /// Tried to delete a transaction that does not exist
    #[error("tried to delete a transaction that is not in the database")]
    DeleteMissingTransaction,

    /// Tried to delete a recurring transaction that does not exist
    #[error("tried to delete a recurring transaction that is not in the database")]
    DeleteMissingTemplate,

    /// Tried to update a goal that does not exist
    #[error("tried to update a goal that is not in the database")]
    UpdateMissingGoal,

    /// Tried to delete a goal that does not exist
    #[error("tried to delete a goal that is not in the database")]
    DeleteMissingGoal,

    /// An unhandled/unexpected SQL error.
    #[error("an unexpected SQL error occurred: {0}")]
    SqlError(rusqlite::Error),

    /// Could not acquire the database lock
    #[error("could not acquire the database lock")]
    DatabaseLockError,

    /// An error occurred while getting the local timezone from a canonical timezone string.
    #[error("invalid timezone {0}")]
    InvalidTimezoneError(String),
}

impl From<rusqlite::Error> for Error {
    fn from(value: rusqlite::Error) -> Self {
        match value {
            rusqlite::Error::QueryReturnedNoRows => Error::NotFound,
            error => {
                tracing::error!("an unhandled SQL error occurred: {}", error);
                Error::SqlError(error)
            }
        }
    }
}

impl Error {
    fn status_code(&self) -> StatusCode {
        match self {
            Error::Unauthorized => StatusCode::UNAUTHORIZED,
            Error::InvalidDate(_)
            | Error::InvalidPeriod(_)
            | Error::InvalidAmount(_)
            | Error::InvalidFixedFlag(_)
            | Error::EndDateBeforeStartDate { .. }
            | Error::EmptyCategoryName
            | Error::EmptyGoalName
            | Error::InvalidCategory(_)
            | Error::InvalidTemplate(_)
            | Error::OccurrenceOutsideSchedule(_) => StatusCode::BAD_REQUEST,
            Error::DuplicateOccurrence(_) | Error::DuplicateCategoryName(_) => {
                StatusCode::CONFLICT
            }
            Error::NotFound
            | Error::UpdateMissingTransaction
            | Error::DeleteMissingTransaction
            | Error::DeleteMissingTemplate
            | Error::UpdateMissingGoal
            | Error::DeleteMissingGoal => StatusCode::NOT_FOUND,
            Error::SqlError(_) | Error::DatabaseLockError | Error::InvalidTimezoneError(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status_code();

        let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            // Any errors that are not handled above are not intended to be shown to the client.
            tracing::error!("An unexpected error occurred: {}", self);
            "An unexpected error occurred, check the server logs for more details.".to_owned()
        } else {
            self.to_string()
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}
