//! The shape of an income or expense as shown to clients.

use std::fmt::Display;

use serde::{Serialize, Serializer};
use time::Date;

use crate::{
    category::CategoryId,
    database_id::{TransactionId, UserId},
    date::MonthPeriod,
};

use super::domain::{RecurrenceType, Transaction, TransactionKind};

/// Identifies an entry in a listing or history.
///
/// Stored rows keep their numeric id. Projected entries get a string id
/// derived from their template, so they can never collide with a stored row
/// and stay the same across repeated queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OccurrenceId {
    /// A row in the database.
    Stored(TransactionId),
    /// A month where `template_id` should have an occurrence but none is booked yet.
    Pending {
        /// The template that is due.
        template_id: TransactionId,
        /// The month it is due in.
        period: MonthPeriod,
    },
    /// The first occurrence of `template_id`, at its start date.
    Initial {
        /// The template that starts then.
        template_id: TransactionId,
    },
}

impl Display for OccurrenceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OccurrenceId::Stored(id) => write!(f, "{id}"),
            OccurrenceId::Pending {
                template_id,
                period,
            } => write!(
                f,
                "pending-{template_id}-{}-{}",
                period.month(),
                period.year()
            ),
            OccurrenceId::Initial { template_id } => write!(f, "initial-{template_id}"),
        }
    }
}

impl Serialize for OccurrenceId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            OccurrenceId::Stored(id) => serializer.serialize_i64(*id),
            synthetic => serializer.collect_str(synthetic),
        }
    }
}

/// A stored row or a projected occurrence, with its category name flattened in.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OccurrenceView {
    /// A stored id, or a string id for projected entries.
    pub id: OccurrenceId,
    /// Income or expense.
    pub kind: TransactionKind,
    /// The user that owns the entry.
    pub user_id: UserId,
    /// A free-text label.
    pub description: Option<String>,
    /// A positive amount of money.
    pub value: f64,
    /// The booking date, or the due date of a projected entry.
    pub date: Date,
    /// The category, if any.
    pub category_id: Option<CategoryId>,
    /// The category's name, if any.
    pub category_name: Option<String>,
    /// Whether the entry is a template.
    pub is_fixed: bool,
    /// How often a template recurs.
    pub recurrence_type: Option<RecurrenceType>,
    /// The first date a template is active.
    pub start_date: Option<Date>,
    /// The last date a template is active, inclusive.
    pub end_date: Option<Date>,
    /// The template this entry is an occurrence of.
    pub linked_template_id: Option<TransactionId>,
    /// True when the entry is projected from a template rather than stored.
    pub pending: bool,
}

impl OccurrenceView {
    /// Show a stored row as is.
    pub fn stored(row: &Transaction) -> Self {
        Self::from_row(OccurrenceId::Stored(row.id), row, row.date, false)
    }

    /// The not yet booked occurrence of `template` in `period`, dated `date`.
    pub fn pending(template: &Transaction, period: MonthPeriod, date: Date) -> Self {
        let id = OccurrenceId::Pending {
            template_id: template.id,
            period,
        };

        Self::from_row(id, template, date, true)
    }

    /// The conceptual first occurrence of `template`, if it has a start date.
    pub fn initial(template: &Transaction) -> Option<Self> {
        let start_date = template.start_date?;
        let id = OccurrenceId::Initial {
            template_id: template.id,
        };

        Some(Self::from_row(id, template, start_date, true))
    }

    fn from_row(id: OccurrenceId, row: &Transaction, date: Date, pending: bool) -> Self {
        Self {
            id,
            kind: row.kind,
            user_id: row.user_id,
            description: row.description.clone(),
            value: row.value,
            date,
            category_id: row.category_id,
            category_name: row.category_name.clone(),
            is_fixed: row.is_fixed,
            recurrence_type: row.recurrence_type,
            start_date: row.start_date,
            end_date: row.end_date,
            linked_template_id: row.linked_template_id,
            pending,
        }
    }

    /// The month the entry falls in.
    pub fn period(&self) -> MonthPeriod {
        MonthPeriod::of(self.date)
    }
}
