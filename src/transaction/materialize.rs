//! Projects recurring templates onto a month.
//!
//! Everything here is pure: the same rows and templates always give the same
//! projection, which is what makes listings safe to cache and retry.

use std::{cmp::Reverse, collections::HashSet};

use time::Date;

use crate::{database_id::TransactionId, date::MonthPeriod};

use super::{
    domain::{RecurrenceType, Transaction},
    linking::{MatchVia, resolve_occurrence},
    view::OccurrenceView,
};

/// A legacy row that matched a template by fallback and should be linked to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backfill {
    /// The unlinked row.
    pub row_id: TransactionId,
    /// The template it matched.
    pub template_id: TransactionId,
}

/// The result of projecting templates onto one month.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MonthProjection {
    /// Occurrences with no booked row, ordered by date then template id.
    pub pending: Vec<OccurrenceView>,
    /// Links to write for rows that were matched by fallback.
    pub backfills: Vec<Backfill>,
}

/// Whether `template` has an occurrence in `period`.
///
/// The schedule is month granular: a template is in range from the month of
/// its start date to the month of its end date, both included. Monthly
/// templates occur in every month in range. Yearly templates only occur in
/// the calendar month of their start date.
pub fn should_appear(template: &Transaction, period: MonthPeriod) -> bool {
    let starts_by = template
        .start_date
        .is_none_or(|start| MonthPeriod::of(start) <= period);
    let ends_after = template
        .end_date
        .is_none_or(|end| period <= MonthPeriod::of(end));

    if !(starts_by && ends_after) {
        return false;
    }

    match template.recurrence_type {
        Some(RecurrenceType::Monthly) => true,
        Some(RecurrenceType::Yearly) => template
            .start_date
            .is_some_and(|start| start.month() as u8 == period.month()),
        None => false,
    }
}

/// The date of `template`'s occurrence in `period`.
///
/// The day of the start date is kept, clamped to the last day of the month.
pub fn occurrence_date(template: &Transaction, period: MonthPeriod) -> Date {
    period.day_clamped(template.anchor_day())
}

/// Project `templates` onto `period`.
///
/// `real_rows` are the concrete rows booked in `period`. Templates that should
/// appear but have no row get a pending occurrence. Rows attributed to a
/// template by fallback are returned as backfills.
pub fn project_month(
    period: MonthPeriod,
    real_rows: &[Transaction],
    templates: &[Transaction],
) -> MonthProjection {
    let mut templates: Vec<&Transaction> = templates.iter().collect();
    templates.sort_by_key(|template| template.id);

    let mut claimed = HashSet::new();
    let mut projection = MonthProjection::default();

    for template in templates {
        if !should_appear(template, period) {
            continue;
        }

        match resolve_occurrence(template, period, real_rows, &claimed) {
            Some(found) if found.via == MatchVia::Link => {}
            Some(found) => {
                claimed.insert(found.row_id);
                projection.backfills.push(Backfill {
                    row_id: found.row_id,
                    template_id: template.id,
                });
            }
            None => projection.pending.push(OccurrenceView::pending(
                template,
                period,
                occurrence_date(template, period),
            )),
        }
    }

    // Stable, so templates sharing a date stay in id order.
    projection.pending.sort_by_key(|view| view.date);

    projection
}

/// Write the links in `backfills` into the in-memory `rows`.
pub fn apply_backfills(rows: &mut [Transaction], backfills: &[Backfill]) {
    for backfill in backfills {
        if let Some(row) = rows.iter_mut().find(|row| row.id == backfill.row_id) {
            row.linked_template_id = Some(backfill.template_id);
        }
    }
}

/// Merge stored rows and pending occurrences into one listing.
///
/// Stored rows come first, newest first. With `fixed_only`, stored rows not
/// linked to a template are left out.
pub fn merge_views(
    mut real_rows: Vec<Transaction>,
    pending: Vec<OccurrenceView>,
    fixed_only: bool,
) -> Vec<OccurrenceView> {
    if fixed_only {
        real_rows.retain(|row| row.linked_template_id.is_some());
    }

    real_rows.sort_by_key(|row| Reverse((row.date, row.id)));

    real_rows
        .iter()
        .map(OccurrenceView::stored)
        .chain(pending)
        .collect()
}
