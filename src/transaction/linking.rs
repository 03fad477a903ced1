//! Decides whether a template already has a booked occurrence in a month.
//!
//! A concrete row belongs to a template when it is linked to it. Rows booked
//! before links were recorded have no link, so an unlinked row with the same
//! description, category and amount as the template also counts. Such
//! fallback matches are reported so the caller can write the missing link.

use std::collections::HashSet;

use crate::{
    database_id::TransactionId,
    date::{MonthPeriod, make_local_date},
};

use super::domain::Transaction;

/// How a concrete row was attributed to a template.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchVia {
    /// The row is linked to the template.
    Link,
    /// The row is unlinked but looks the same as the template.
    Fallback,
}

/// The concrete row chosen to represent a template in a month.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OccurrenceMatch {
    /// The chosen row.
    pub row_id: TransactionId,
    /// How the row was matched.
    pub via: MatchVia,
}

/// Whether `row` is linked to `template`.
pub fn is_linked(template: &Transaction, row: &Transaction) -> bool {
    !row.is_fixed && row.linked_template_id == Some(template.id)
}

/// Whether the unlinked `row` has the same description, category and amount as `template`.
///
/// Amounts are compared in hundredths.
pub fn is_fallback_match(template: &Transaction, row: &Transaction) -> bool {
    !row.is_fixed
        && row.linked_template_id.is_none()
        && row.description == template.description
        && row.category_id == template.category_id
        && row.value_cents() == template.value_cents()
}

/// How `row` is attributed to `template`, if at all.
pub fn match_via(template: &Transaction, row: &Transaction) -> Option<MatchVia> {
    if is_linked(template, row) {
        Some(MatchVia::Link)
    } else if is_fallback_match(template, row) {
        Some(MatchVia::Fallback)
    } else {
        None
    }
}

/// Pick the row that represents `template` in `period`.
///
/// Linked rows win over fallback matches, and the earliest row (by date then
/// id) wins within each group. Fallback rows in `claimed` are skipped, so one
/// legacy row is never attributed to two templates.
///
/// Finding more than one candidate means the data holds duplicates. This is
/// logged and otherwise tolerated.
pub fn resolve_occurrence(
    template: &Transaction,
    period: MonthPeriod,
    rows: &[Transaction],
    claimed: &HashSet<TransactionId>,
) -> Option<OccurrenceMatch> {
    let mut candidates: Vec<(&Transaction, MatchVia)> = rows
        .iter()
        .filter(|row| period.contains(row.date))
        .filter_map(|row| match_via(template, row).map(|via| (row, via)))
        .filter(|(row, via)| *via == MatchVia::Link || !claimed.contains(&row.id))
        .collect();

    candidates.sort_by_key(|(row, via)| (*via != MatchVia::Link, row.date, row.id));

    if candidates.len() > 1 {
        tracing::warn!(
            "template {} has {} occurrences in {period}, showing row {}",
            template.id,
            candidates.len(),
            candidates[0].0.id
        );
    }

    candidates.first().map(|(row, via)| OccurrenceMatch {
        row_id: row.id,
        via: *via,
    })
}

/// Whether `rows` already hold an occurrence of `template` in `month`/`year`.
///
/// An invalid month never has an occurrence.
pub fn has_occurrence(template: &Transaction, year: i32, month: u8, rows: &[Transaction]) -> bool {
    let Ok(date) = make_local_date(year, month, 1) else {
        return false;
    };

    resolve_occurrence(template, MonthPeriod::of(date), rows, &HashSet::new()).is_some()
}
