//! Assembles the timeline of a template's occurrences.

use std::collections::HashSet;

use crate::date::MonthPeriod;

use super::{
    domain::Transaction,
    linking::{MatchVia, match_via},
    view::OccurrenceView,
};

/// The occurrences of `template`, at most one per month, oldest first.
///
/// `candidates` are concrete rows that may belong to the template: rows
/// linked to it and unlinked rows resembling it. Rows that do neither are
/// ignored.
///
/// The start month is represented by a booked row if there is one, linked
/// rows first, otherwise by a synthetic entry dated at the start date. When
/// a month holds several rows, linked rows win over fallback matches and
/// earlier rows win over later ones.
pub fn assemble_history(template: &Transaction, candidates: &[Transaction]) -> Vec<OccurrenceView> {
    let start_period = template.start_date.map(MonthPeriod::of);

    let mut matched: Vec<(&Transaction, MatchVia)> = candidates
        .iter()
        .filter_map(|row| match_via(template, row).map(|via| (row, via)))
        .collect();
    matched.sort_by_key(|(row, via)| (*via != MatchVia::Link, row.date, row.id));

    let (in_start_month, other_months): (Vec<_>, Vec<_>) = matched
        .into_iter()
        .partition(|(row, _)| Some(row.period()) == start_period);

    let mut entries: Vec<OccurrenceView> = Vec::new();

    if in_start_month.is_empty() {
        entries.extend(OccurrenceView::initial(template));
    }

    entries.extend(
        in_start_month
            .into_iter()
            .chain(other_months)
            .map(|(row, _)| OccurrenceView::stored(row)),
    );

    let mut seen_months = HashSet::new();
    let mut history: Vec<OccurrenceView> = Vec::new();

    for entry in entries {
        if seen_months.insert(entry.period()) {
            history.push(entry);
        } else {
            tracing::warn!(
                "template {} has more than one occurrence in {}, hiding {}",
                template.id,
                entry.period(),
                entry.id
            );
        }
    }

    history.sort_by_key(|entry| entry.date);

    history
}
