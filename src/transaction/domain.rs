//! The income/expense record shared by templates and concrete rows.

use std::{fmt::Display, str::FromStr};

use serde::{Deserialize, Serialize};
use time::Date;

use crate::{
    Error,
    category::CategoryId,
    database_id::{TransactionId, UserId},
    date::MonthPeriod,
};

/// Whether a transaction is money coming in or going out.
///
/// Incomes and expenses have the same shape but live in separate tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionKind {
    /// Money coming in.
    Income,
    /// Money going out.
    Expense,
}

impl TransactionKind {
    /// Both kinds, incomes first.
    pub const ALL: [TransactionKind; 2] = [TransactionKind::Income, TransactionKind::Expense];

    /// The SQL table that holds rows of this kind.
    pub fn table_name(self) -> &'static str {
        match self {
            TransactionKind::Income => "income",
            TransactionKind::Expense => "expense",
        }
    }
}

impl Display for TransactionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.table_name())
    }
}

/// How often a template recurs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecurrenceType {
    /// Every month from the start date onward.
    Monthly,
    /// Once a year, in the month of the start date.
    Yearly,
}

impl RecurrenceType {
    /// The name used in the database and in JSON.
    pub fn as_str(self) -> &'static str {
        match self {
            RecurrenceType::Monthly => "monthly",
            RecurrenceType::Yearly => "yearly",
        }
    }
}

impl FromStr for RecurrenceType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "monthly" => Ok(RecurrenceType::Monthly),
            "yearly" => Ok(RecurrenceType::Yearly),
            other => Err(format!("unknown recurrence type \"{other}\"")),
        }
    }
}

/// Whether a stored row is a booked transaction or a recurrence template.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RowRole {
    /// A booked, one-off or promoted, transaction (`is_fixed = 0`).
    Concrete,
    /// A recurring pattern (`is_fixed = 1`).
    Template,
}

impl RowRole {
    /// The value of the `is_fixed` column for rows of this role.
    pub fn is_fixed(self) -> bool {
        self == RowRole::Template
    }
}

/// An income or expense as stored in the database.
///
/// When `is_fixed` is true the row is a recurrence template and
/// `recurrence_type`, `start_date` and `end_date` describe its schedule.
/// Otherwise the row is a concrete transaction and `linked_template_id`
/// optionally names the template that generated it.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    /// The row's id, unique within its table.
    pub id: TransactionId,
    /// Income or expense.
    pub kind: TransactionKind,
    /// The user that owns the row.
    pub user_id: UserId,
    /// A free-text label.
    pub description: Option<String>,
    /// A positive amount of money.
    pub value: f64,
    /// The booking date, or the start date for templates.
    pub date: Date,
    /// The category, if any.
    pub category_id: Option<CategoryId>,
    /// Whether the row is a template.
    pub is_fixed: bool,
    /// How often a template recurs.
    pub recurrence_type: Option<RecurrenceType>,
    /// The first date a template is active.
    pub start_date: Option<Date>,
    /// The last active date, inclusive. `None` recurs indefinitely.
    pub end_date: Option<Date>,
    /// The template a concrete row is an occurrence of.
    pub linked_template_id: Option<TransactionId>,
    /// The name of the category, joined in when the row is read.
    pub category_name: Option<String>,
}

impl Transaction {
    /// Whether the row is a template or a booked transaction.
    pub fn role(&self) -> RowRole {
        if self.is_fixed {
            RowRole::Template
        } else {
            RowRole::Concrete
        }
    }

    /// The amount in hundredths, used to compare amounts for equality.
    pub fn value_cents(&self) -> i64 {
        to_cents(self.value)
    }

    /// The month the row is booked against.
    pub fn period(&self) -> MonthPeriod {
        MonthPeriod::of(self.date)
    }

    /// The day of the month a template's occurrences fall on.
    pub fn anchor_day(&self) -> u8 {
        self.start_date.map(|date| date.day()).unwrap_or(1)
    }
}

pub(crate) fn to_cents(value: f64) -> i64 {
    (value * 100.0).round() as i64
}

/// The data needed to insert a new income or expense row.
///
/// Start with [NewTransaction::one_off] or [NewTransaction::template] and
/// chain the optional fields.
#[derive(Debug, Clone, PartialEq)]
pub struct NewTransaction {
    /// Income or expense.
    pub kind: TransactionKind,
    /// The user that will own the row.
    pub user_id: UserId,
    /// A free-text label.
    pub description: Option<String>,
    /// A positive amount of money.
    pub value: f64,
    /// The booking date, or the start date for templates.
    pub date: Date,
    /// The category, if any.
    pub category_id: Option<CategoryId>,
    /// Whether the row is a template.
    pub is_fixed: bool,
    /// How often a template recurs.
    pub recurrence_type: Option<RecurrenceType>,
    /// The first date a template is active.
    pub start_date: Option<Date>,
    /// The last date a template is active, inclusive.
    pub end_date: Option<Date>,
    /// The template a concrete row is an occurrence of.
    pub linked_template_id: Option<TransactionId>,
}

impl NewTransaction {
    /// A concrete transaction booked on `date`.
    pub fn one_off(kind: TransactionKind, user_id: UserId, value: f64, date: Date) -> Self {
        Self {
            kind,
            user_id,
            description: None,
            value,
            date,
            category_id: None,
            is_fixed: false,
            recurrence_type: None,
            start_date: None,
            end_date: None,
            linked_template_id: None,
        }
    }

    /// A template recurring from `start_date`. The row's own date is the start date.
    pub fn template(
        kind: TransactionKind,
        user_id: UserId,
        value: f64,
        recurrence_type: RecurrenceType,
        start_date: Date,
    ) -> Self {
        Self {
            kind,
            user_id,
            description: None,
            value,
            date: start_date,
            category_id: None,
            is_fixed: true,
            recurrence_type: Some(recurrence_type),
            start_date: Some(start_date),
            end_date: None,
            linked_template_id: None,
        }
    }

    /// Set the description.
    pub fn description(mut self, description: Option<String>) -> Self {
        self.description = description;
        self
    }

    /// Set the category.
    pub fn category_id(mut self, category_id: Option<CategoryId>) -> Self {
        self.category_id = category_id;
        self
    }

    /// Set the last active date of a template.
    pub fn end_date(mut self, end_date: Option<Date>) -> Self {
        self.end_date = end_date;
        self
    }

    /// Link a concrete row to the template that generated it.
    ///
    /// Templates never carry a link, so this is ignored for templates.
    pub fn linked_template_id(mut self, template_id: Option<TransactionId>) -> Self {
        if !self.is_fixed {
            self.linked_template_id = template_id;
        }
        self
    }

    /// Check the amount and the schedule.
    ///
    /// # Errors
    /// Returns [Error::InvalidAmount] if the value is not a positive number,
    /// or [Error::EndDateBeforeStartDate] if the end date precedes the start date.
    pub fn validate(&self) -> Result<(), Error> {
        validate_value(self.value)?;
        validate_schedule(self.start_date, self.end_date)
    }
}

pub(crate) fn validate_value(value: f64) -> Result<(), Error> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(Error::InvalidAmount(value))
    }
}

pub(crate) fn validate_schedule(start: Option<Date>, end: Option<Date>) -> Result<(), Error> {
    match (start, end) {
        (Some(start), Some(end)) if end < start => Err(Error::EndDateBeforeStartDate { start, end }),
        _ => Ok(()),
    }
}

/// A partial update of a stored row. `None` leaves a field unchanged.
///
/// The nested options distinguish "leave as is" (`None`) from "clear"
/// (`Some(None)`).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransactionPatch {
    /// A new description, or `Some(None)` to clear it.
    pub description: Option<Option<String>>,
    /// A new amount.
    pub value: Option<f64>,
    /// A new date. Ignored for templates.
    pub date: Option<Date>,
    /// A new category, or `Some(None)` to clear it.
    pub category_id: Option<Option<CategoryId>>,
    /// A new recurrence. Templates only.
    pub recurrence_type: Option<RecurrenceType>,
    /// A new start date. Templates only.
    pub start_date: Option<Date>,
    /// A new end date, or `Some(None)` to recur indefinitely. Templates only.
    pub end_date: Option<Option<Date>>,
}

impl TransactionPatch {
    /// The row as it would look after the update.
    ///
    /// Schedule fields are only applied to templates, and a template's date
    /// follows its start date.
    pub fn apply(&self, transaction: &Transaction) -> Transaction {
        let mut updated = transaction.clone();

        if let Some(description) = &self.description {
            updated.description = description.clone();
        }
        if let Some(value) = self.value {
            updated.value = value;
        }
        if let Some(category_id) = self.category_id {
            updated.category_id = category_id;
        }

        if updated.is_fixed {
            if let Some(recurrence_type) = self.recurrence_type {
                updated.recurrence_type = Some(recurrence_type);
            }
            if let Some(start_date) = self.start_date {
                updated.start_date = Some(start_date);
                updated.date = start_date;
            }
            if let Some(end_date) = self.end_date {
                updated.end_date = end_date;
            }
        } else if let Some(date) = self.date {
            updated.date = date;
        }

        updated
    }
}
