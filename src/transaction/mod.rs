//! Incomes and expenses, one-off and recurring.
//!
//! A recurring income or expense is stored as a template: a row with
//! `is_fixed` set that carries a schedule. Booked transactions are concrete
//! rows, optionally linked to the template they are an occurrence of. For a
//! given month, [list_occurrences] lists the booked rows plus a pending entry
//! for every template that is due but not booked yet:
//! - `linking` decides whether a template already has an occurrence in a month,
//! - `materialize` projects templates onto a month,
//! - `history` builds the per-month timeline of one template.

mod domain;
mod endpoints;
mod history;
mod linking;
mod materialize;
mod query;
mod service;
mod sqlite;
mod store;
mod view;

pub use domain::{
    NewTransaction, RecurrenceType, RowRole, Transaction, TransactionKind, TransactionPatch,
};
pub use endpoints::{
    TransactionState, create_occurrence_endpoint, create_template_endpoint,
    delete_occurrence_endpoint, delete_template_endpoint, get_template_endpoint,
    list_occurrences_endpoint, list_templates_endpoint, template_history_endpoint,
    update_occurrence_endpoint, update_template_endpoint,
};
pub(crate) use domain::{to_cents, validate_value};
pub(crate) use endpoints::{nullable, parse_period};
pub use history::assemble_history;
pub use linking::{MatchVia, OccurrenceMatch, has_occurrence, is_fallback_match, match_via};
pub use materialize::{occurrence_date, project_month, should_appear};
pub use query::TransactionQuery;
pub use service::{
    NewOccurrence, NewTemplate, OccurrenceFilter, create_one_off_or_promote, create_template,
    delete_template, delete_transaction, get_template, get_template_history, list_occurrences,
    list_templates, update_template, update_transaction,
};
pub use sqlite::{SQLiteTransactionStore, create_transaction_tables};
pub use store::{TracedStore, TransactionStore};
pub use view::{OccurrenceId, OccurrenceView};
