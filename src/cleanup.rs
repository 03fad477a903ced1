//! Repairs recurring incomes and expenses recorded before occurrences were linked to templates.
//!
//! Older data can hold the same template several times, booked rows that were
//! never linked to their template, and more than one booked row for the same
//! template and month. [cleanup_user] fixes one user and kind at a time:
//! 1. templates with the same description, amount and category are merged into
//!    the oldest one, deleting the rest along with their occurrences,
//! 2. unlinked rows matching a template are linked to it, at most one per month,
//! 3. rows linked to the same template in the same month beyond the earliest are
//!    reported, and deleted when asked to.

use std::collections::{BTreeMap, HashMap, HashSet};

use rusqlite::Connection;

use crate::{
    Error,
    category::CategoryId,
    database_id::{TransactionId, UserId},
    date::MonthPeriod,
    transaction::{
        Transaction, TransactionKind, TransactionQuery, TransactionStore, is_fallback_match,
        should_appear,
    },
};

/// How much [cleanup_user] is allowed to change.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CleanupOptions {
    /// Work out what would change without writing anything.
    pub dry_run: bool,
    /// Delete surplus occurrences instead of only reporting them.
    pub delete_duplicates: bool,
}

/// A template removed in favour of an older identical one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MergedTemplate {
    /// The template that was removed.
    pub removed_id: TransactionId,
    /// The older template that was kept.
    pub kept_id: TransactionId,
}

/// A legacy row linked to its template.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkedRow {
    /// The booked row.
    pub row_id: TransactionId,
    /// The template it now points to.
    pub template_id: TransactionId,
}

/// A booked row that repeats an occurrence already booked earlier in the same month.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SurplusRow {
    /// The repeated row.
    pub row_id: TransactionId,
    /// The template both rows are linked to.
    pub template_id: TransactionId,
    /// The month of the occurrence.
    pub period: MonthPeriod,
}

/// What [cleanup_user] changed, or would change in a dry run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CleanupReport {
    /// Duplicate templates, removed unless this was a dry run.
    pub merged_templates: Vec<MergedTemplate>,
    /// The number of occurrences deleted along with duplicate templates.
    pub deleted_occurrences: usize,
    /// Legacy rows linked to a template.
    pub linked_rows: Vec<LinkedRow>,
    /// Rows repeating an occurrence.
    pub surplus_rows: Vec<SurplusRow>,
    /// The number of surplus rows deleted.
    pub deleted_surplus_rows: usize,
}

impl CleanupReport {
    /// Add the findings of `other` to this report.
    pub fn merge(&mut self, other: CleanupReport) {
        self.merged_templates.extend(other.merged_templates);
        self.deleted_occurrences += other.deleted_occurrences;
        self.linked_rows.extend(other.linked_rows);
        self.surplus_rows.extend(other.surplus_rows);
        self.deleted_surplus_rows += other.deleted_surplus_rows;
    }

    /// Whether nothing needed fixing.
    pub fn is_empty(&self) -> bool {
        self.merged_templates.is_empty() && self.linked_rows.is_empty() && self.surplus_rows.is_empty()
    }
}

/// The ids of every user with at least one income or expense.
///
/// # Errors
/// Returns an error if the query fails.
pub fn user_ids(connection: &Connection) -> Result<Vec<UserId>, Error> {
    connection
        .prepare("SELECT user_id FROM income UNION SELECT user_id FROM expense ORDER BY user_id")?
        .query_map([], |row| row.get(0))?
        .map(|maybe_id| maybe_id.map_err(Error::from))
        .collect()
}

/// Clean up the recurring incomes or expenses of one user.
///
/// # Errors
/// Returns an error if the store fails. Changes written before the failure are kept.
pub fn cleanup_user(
    store: &impl TransactionStore,
    user_id: UserId,
    kind: TransactionKind,
    options: CleanupOptions,
) -> Result<CleanupReport, Error> {
    let mut report = CleanupReport::default();

    let mut templates = store.find_transactions(&TransactionQuery::templates(user_id, kind))?;
    templates.sort_by_key(|template| template.id);
    let mut rows = store.find_transactions(&TransactionQuery::concrete(user_id, kind))?;

    let (templates, merged) = split_duplicate_templates(templates);
    let removed: HashSet<TransactionId> = merged.iter().map(|merge| merge.removed_id).collect();

    for merge in &merged {
        tracing::info!(
            %kind,
            user_id,
            removed = merge.removed_id,
            kept = merge.kept_id,
            "merging duplicate template"
        );

        if !options.dry_run {
            report.deleted_occurrences +=
                store.delete_template_cascade(kind, user_id, merge.removed_id)?;
        }
    }
    report.merged_templates = merged;
    rows.retain(|row| !row.linked_template_id.is_some_and(|id| removed.contains(&id)));

    report.linked_rows = link_legacy_rows(store, user_id, kind, &templates, &mut rows, options)?;

    report.surplus_rows = find_surplus_rows(&templates, &rows);
    if options.delete_duplicates && !options.dry_run {
        for surplus in &report.surplus_rows {
            store.delete_transaction(kind, user_id, surplus.row_id)?;
            report.deleted_surplus_rows += 1;
        }
    }

    Ok(report)
}

type TemplateKey = (Option<String>, i64, Option<CategoryId>);

fn template_key(template: &Transaction) -> TemplateKey {
    (
        template.description.clone(),
        template.value_cents(),
        template.category_id,
    )
}

/// Split `templates`, sorted by id, into the ones to keep and the duplicates of older ones.
fn split_duplicate_templates(
    templates: Vec<Transaction>,
) -> (Vec<Transaction>, Vec<MergedTemplate>) {
    let mut oldest: HashMap<TemplateKey, TransactionId> = HashMap::new();
    let mut kept = Vec::new();
    let mut merged = Vec::new();

    for template in templates {
        match oldest.get(&template_key(&template)) {
            Some(kept_id) => merged.push(MergedTemplate {
                removed_id: template.id,
                kept_id: *kept_id,
            }),
            None => {
                oldest.insert(template_key(&template), template.id);
                kept.push(template);
            }
        }
    }

    (kept, merged)
}

/// Link unlinked rows matching a template, at most one per template and month.
///
/// The earliest matching row of a month wins. Months where the template
/// already has a linked row or does not occur are left alone.
fn link_legacy_rows(
    store: &impl TransactionStore,
    user_id: UserId,
    kind: TransactionKind,
    templates: &[Transaction],
    rows: &mut [Transaction],
    options: CleanupOptions,
) -> Result<Vec<LinkedRow>, Error> {
    rows.sort_by_key(|row| (row.date, row.id));
    let mut linked = Vec::new();

    for template in templates {
        let mut covered: HashSet<MonthPeriod> = rows
            .iter()
            .filter(|row| row.linked_template_id == Some(template.id))
            .map(Transaction::period)
            .collect();

        for row in rows.iter_mut() {
            let period = row.period();

            if !is_fallback_match(template, row)
                || covered.contains(&period)
                || !should_appear(template, period)
            {
                continue;
            }

            if !options.dry_run && !store.link_to_template(kind, user_id, row.id, template.id)? {
                tracing::warn!(row = row.id, "row was linked elsewhere, skipping");
                continue;
            }

            tracing::info!(%kind, user_id, row = row.id, template = template.id, "linking legacy row");
            row.linked_template_id = Some(template.id);
            covered.insert(period);
            linked.push(LinkedRow {
                row_id: row.id,
                template_id: template.id,
            });
        }
    }

    Ok(linked)
}

/// Rows linked to the same template in the same month, except the earliest.
fn find_surplus_rows(templates: &[Transaction], rows: &[Transaction]) -> Vec<SurplusRow> {
    let template_ids: HashSet<TransactionId> = templates.iter().map(|template| template.id).collect();
    let mut by_occurrence: BTreeMap<(TransactionId, MonthPeriod), Vec<&Transaction>> =
        BTreeMap::new();

    for row in rows {
        if let Some(template_id) = row.linked_template_id.filter(|id| template_ids.contains(id)) {
            by_occurrence
                .entry((template_id, row.period()))
                .or_default()
                .push(row);
        }
    }

    let mut surplus = Vec::new();

    for ((template_id, period), mut occurrence_rows) in by_occurrence {
        occurrence_rows.sort_by_key(|row| (row.date, row.id));

        for row in occurrence_rows.into_iter().skip(1) {
            tracing::warn!(
                row = row.id,
                template = template_id,
                %period,
                "surplus occurrence"
            );
            surplus.push(SurplusRow {
                row_id: row.id,
                template_id,
                period,
            });
        }
    }

    surplus
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use rusqlite::Connection;
    use time::{Date, macros::date};

    use crate::{
        db::initialize,
        date::MonthPeriod,
        transaction::{
            NewTransaction, RecurrenceType, SQLiteTransactionStore, Transaction, TransactionKind,
            TransactionQuery, TransactionStore,
        },
    };

    use super::{CleanupOptions, LinkedRow, MergedTemplate, SurplusRow, cleanup_user, user_ids};

    const USER: i64 = 1;
    const KIND: TransactionKind = TransactionKind::Expense;

    fn get_store() -> SQLiteTransactionStore {
        let connection = Connection::open_in_memory().unwrap();
        initialize(&connection).unwrap();
        SQLiteTransactionStore::new(Arc::new(Mutex::new(connection)))
    }

    fn template(store: &SQLiteTransactionStore, description: &str, start: Date) -> Transaction {
        store
            .create_transaction(
                NewTransaction::template(KIND, USER, 100.0, RecurrenceType::Monthly, start)
                    .description(Some(description.to_owned())),
            )
            .unwrap()
    }

    fn row(
        store: &SQLiteTransactionStore,
        description: &str,
        date: Date,
        template_id: Option<i64>,
    ) -> Transaction {
        store
            .create_transaction(
                NewTransaction::one_off(KIND, USER, 100.0, date)
                    .description(Some(description.to_owned()))
                    .linked_template_id(template_id),
            )
            .unwrap()
    }

    fn all_rows(store: &SQLiteTransactionStore) -> Vec<Transaction> {
        store
            .find_transactions(&TransactionQuery::concrete(USER, KIND))
            .unwrap()
    }

    #[test]
    fn merges_duplicate_templates_into_oldest() {
        let store = get_store();
        let kept = template(&store, "Rent", date!(2024 - 01 - 01));
        let duplicate = template(&store, "Rent", date!(2024 - 02 - 01));
        template(&store, "Gym", date!(2024 - 01 - 01));
        row(&store, "Rent", date!(2024 - 02 - 01), Some(duplicate.id));

        let report = cleanup_user(&store, USER, KIND, CleanupOptions::default()).unwrap();

        assert_eq!(
            report.merged_templates,
            vec![MergedTemplate {
                removed_id: duplicate.id,
                kept_id: kept.id,
            }]
        );
        assert_eq!(report.deleted_occurrences, 1);
        let templates = store
            .find_transactions(&TransactionQuery::templates(USER, KIND))
            .unwrap();
        assert_eq!(templates.len(), 2);
        assert!(templates.iter().all(|template| template.id != duplicate.id));
    }

    #[test]
    fn links_one_legacy_row_per_month() {
        let store = get_store();
        let rent = template(&store, "Rent", date!(2024 - 01 - 01));
        let january = row(&store, "Rent", date!(2024 - 01 - 03), None);
        let january_again = row(&store, "Rent", date!(2024 - 01 - 20), None);
        let february = row(&store, "Rent", date!(2024 - 02 - 03), Some(rent.id));
        let march = row(&store, "Rent", date!(2024 - 03 - 03), None);
        let before_start = row(&store, "Rent", date!(2023 - 12 - 03), None);

        let report = cleanup_user(&store, USER, KIND, CleanupOptions::default()).unwrap();

        assert_eq!(
            report.linked_rows,
            vec![
                LinkedRow {
                    row_id: january.id,
                    template_id: rent.id,
                },
                LinkedRow {
                    row_id: march.id,
                    template_id: rent.id,
                },
            ]
        );
        let rows = all_rows(&store);
        let link_of = |id| {
            rows.iter()
                .find(|row| row.id == id)
                .and_then(|row| row.linked_template_id)
        };
        assert_eq!(link_of(january_again.id), None);
        assert_eq!(link_of(february.id), Some(rent.id));
        assert_eq!(link_of(before_start.id), None);
    }

    #[test]
    fn reports_surplus_rows_without_deleting() {
        let store = get_store();
        let rent = template(&store, "Rent", date!(2024 - 01 - 01));
        row(&store, "Rent", date!(2024 - 01 - 03), Some(rent.id));
        let surplus = row(&store, "Rent", date!(2024 - 01 - 05), Some(rent.id));

        let report = cleanup_user(&store, USER, KIND, CleanupOptions::default()).unwrap();

        assert_eq!(
            report.surplus_rows,
            vec![SurplusRow {
                row_id: surplus.id,
                template_id: rent.id,
                period: MonthPeriod::new(2024, 1).unwrap(),
            }]
        );
        assert_eq!(report.deleted_surplus_rows, 0);
        assert_eq!(all_rows(&store).len(), 2);
    }

    #[test]
    fn deletes_surplus_rows_when_asked() {
        let store = get_store();
        let rent = template(&store, "Rent", date!(2024 - 01 - 01));
        let first = row(&store, "Rent", date!(2024 - 01 - 03), Some(rent.id));
        row(&store, "Rent", date!(2024 - 01 - 05), Some(rent.id));
        let options = CleanupOptions {
            delete_duplicates: true,
            ..Default::default()
        };

        let report = cleanup_user(&store, USER, KIND, options).unwrap();

        assert_eq!(report.deleted_surplus_rows, 1);
        let rows = all_rows(&store);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].id, first.id);
    }

    #[test]
    fn dry_run_writes_nothing() {
        let store = get_store();
        let rent = template(&store, "Rent", date!(2024 - 01 - 01));
        template(&store, "Rent", date!(2024 - 01 - 01));
        row(&store, "Rent", date!(2024 - 01 - 03), None);
        row(&store, "Rent", date!(2024 - 02 - 03), Some(rent.id));
        row(&store, "Rent", date!(2024 - 02 - 04), Some(rent.id));
        let options = CleanupOptions {
            dry_run: true,
            delete_duplicates: true,
        };
        let rows_before = all_rows(&store);

        let report = cleanup_user(&store, USER, KIND, options).unwrap();

        assert_eq!(report.merged_templates.len(), 1);
        assert_eq!(report.linked_rows.len(), 1);
        assert_eq!(report.surplus_rows.len(), 1);
        assert_eq!(report.deleted_occurrences, 0);
        assert_eq!(report.deleted_surplus_rows, 0);
        assert_eq!(all_rows(&store), rows_before);
        assert_eq!(
            store
                .find_transactions(&TransactionQuery::templates(USER, KIND))
                .unwrap()
                .len(),
            2
        );
    }

    #[test]
    fn lists_users_with_transactions() {
        let connection = Connection::open_in_memory().unwrap();
        initialize(&connection).unwrap();
        connection
            .execute_batch(
                "INSERT INTO income (user_id, value, date, is_fixed) VALUES (3, 1.0, '2024-01-01', 0);
                 INSERT INTO expense (user_id, value, date, is_fixed) VALUES (1, 1.0, '2024-01-01', 0);
                 INSERT INTO expense (user_id, value, date, is_fixed) VALUES (3, 1.0, '2024-01-01', 0);",
            )
            .unwrap();

        assert_eq!(user_ids(&connection).unwrap(), vec![1, 3]);
    }
}
