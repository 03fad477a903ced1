//! The income and expense operations offered to the HTTP layer.
//!
//! Reads go through the occurrence cache; every successful write drops the
//! user's cache entries before returning.

use std::collections::HashSet;

use time::Date;

use crate::{
    Error,
    cache::{CacheKey, OccurrenceCache},
    category::CategoryId,
    database_id::{TransactionId, UserId},
    date::MonthPeriod,
};

use super::{
    domain::{
        NewTransaction, RecurrenceType, Transaction, TransactionKind, TransactionPatch,
        validate_schedule, validate_value,
    },
    history::assemble_history,
    linking::resolve_occurrence,
    materialize::{Backfill, apply_backfills, merge_views, project_month, should_appear},
    query::TransactionQuery,
    store::TransactionStore,
    view::OccurrenceView,
};

/// Which entries [list_occurrences] returns.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OccurrenceFilter {
    /// Only this month, with pending occurrences. `None` lists every stored
    /// row and projects nothing.
    pub period: Option<MonthPeriod>,
    /// Only stored rows linked to a template.
    pub fixed_only: bool,
}

/// The data for a new recurring income or expense.
#[derive(Debug, Clone, PartialEq)]
pub struct NewTemplate {
    /// A free-text label.
    pub description: Option<String>,
    /// A positive amount of money.
    pub value: f64,
    /// The category, if any.
    pub category_id: Option<CategoryId>,
    /// How often the template recurs.
    pub recurrence_type: RecurrenceType,
    /// Defaults to today.
    pub start_date: Option<Date>,
    /// The last active date, inclusive.
    pub end_date: Option<Date>,
}

/// The data for a one-off income or expense, or for booking a pending occurrence.
#[derive(Debug, Clone, PartialEq)]
pub struct NewOccurrence {
    /// A free-text label.
    pub description: Option<String>,
    /// A positive amount of money.
    pub value: f64,
    /// The booking date.
    pub date: Date,
    /// The category, if any.
    pub category_id: Option<CategoryId>,
    /// The template this row is an occurrence of.
    pub linked_template_id: Option<TransactionId>,
}

/// The stored rows and projected occurrences of one kind for a user.
///
/// With a period, stored rows booked that month are listed newest first,
/// followed by a pending entry for each template due that month with no
/// booked occurrence. Legacy rows matched to a template are linked to it as
/// a side effect.
///
/// # Errors
/// Returns an error if the store fails.
pub fn list_occurrences(
    store: &impl TransactionStore,
    cache: &OccurrenceCache,
    user_id: UserId,
    kind: TransactionKind,
    filter: OccurrenceFilter,
) -> Result<Vec<OccurrenceView>, Error> {
    let key = CacheKey {
        user_id,
        kind,
        period: filter.period,
        fixed_only: filter.fixed_only,
    };

    if let Some(views) = cache.get(&key) {
        tracing::debug!(?key, "occurrence cache hit");
        return Ok(views);
    }

    let generation = cache.generation(user_id);
    let concrete = TransactionQuery::concrete(user_id, kind);

    let views = match filter.period {
        None => {
            // Nothing is backfilled without a period, so links can be filtered in SQL.
            let query = if filter.fixed_only {
                concrete.linked_only()
            } else {
                concrete
            };
            let rows = store.find_transactions(&query)?;
            merge_views(rows, Vec::new(), false)
        }
        Some(period) => {
            let bounds = period.bounds();
            let mut rows = store.find_transactions(&concrete.in_range(bounds))?;
            let templates = store.find_transactions(
                &TransactionQuery::templates(user_id, kind).active_during(bounds),
            )?;

            let projection = project_month(period, &rows, &templates);
            let written = write_backfills(store, kind, user_id, &projection.backfills);

            if !written.is_empty() {
                // Listings cached for other filters still show these rows unlinked.
                // This listing is not stored either; the next read caches it.
                cache.invalidate_user(user_id);
            }

            apply_backfills(&mut rows, &written);
            merge_views(rows, projection.pending, filter.fixed_only)
        }
    };

    cache.insert(key, generation, views.clone());

    Ok(views)
}

/// Link legacy rows to the templates they were matched to.
///
/// Failures are logged and skipped: the match is found again on the next read.
fn write_backfills(
    store: &impl TransactionStore,
    kind: TransactionKind,
    user_id: UserId,
    backfills: &[Backfill],
) -> Vec<Backfill> {
    backfills
        .iter()
        .filter(|backfill| {
            match store.link_to_template(kind, user_id, backfill.row_id, backfill.template_id) {
                Ok(linked) => {
                    if linked {
                        tracing::info!(
                            "linked {kind} {} to template {}",
                            backfill.row_id,
                            backfill.template_id
                        );
                    }
                    true
                }
                Err(error) => {
                    tracing::warn!(
                        "could not link {kind} {} to template {}: {error}",
                        backfill.row_id,
                        backfill.template_id
                    );
                    false
                }
            }
        })
        .copied()
        .collect()
}

/// Every template of `kind` owned by the user, ordered by start date.
pub fn list_templates(
    store: &impl TransactionStore,
    user_id: UserId,
    kind: TransactionKind,
) -> Result<Vec<Transaction>, Error> {
    store.find_transactions(&TransactionQuery::templates(user_id, kind))
}

/// A single template.
///
/// # Errors
/// Returns [Error::NotFound] if `template_id` is not a template of `kind`
/// owned by the user.
pub fn get_template(
    store: &impl TransactionStore,
    user_id: UserId,
    kind: TransactionKind,
    template_id: TransactionId,
) -> Result<Transaction, Error> {
    let template = store.get_transaction(kind, user_id, template_id)?;

    if template.is_fixed {
        Ok(template)
    } else {
        Err(Error::NotFound)
    }
}

/// The occurrences of a template, one per month, oldest first.
///
/// Reading the history never writes links.
///
/// # Errors
/// Returns [Error::NotFound] if `template_id` is not a template of `kind`
/// owned by the user.
pub fn get_template_history(
    store: &impl TransactionStore,
    user_id: UserId,
    kind: TransactionKind,
    template_id: TransactionId,
) -> Result<Vec<OccurrenceView>, Error> {
    let template = get_template(store, user_id, kind, template_id)?;
    let candidates = store
        .find_transactions(&TransactionQuery::concrete(user_id, kind).candidates_for(&template))?;

    Ok(assemble_history(&template, &candidates))
}

/// Create a recurring income or expense.
///
/// `today` is used when no start date is given.
///
/// # Errors
/// This function will return a:
/// - [Error::InvalidAmount] if the value is not positive,
/// - [Error::EndDateBeforeStartDate] if the schedule ends before it starts,
/// - [Error::InvalidCategory] if the category is not owned by the user,
/// - or an error if the store fails.
pub fn create_template(
    store: &impl TransactionStore,
    cache: &OccurrenceCache,
    user_id: UserId,
    kind: TransactionKind,
    new_template: NewTemplate,
    today: Date,
) -> Result<Transaction, Error> {
    let start_date = new_template.start_date.unwrap_or(today);
    let new_transaction = NewTransaction::template(
        kind,
        user_id,
        new_template.value,
        new_template.recurrence_type,
        start_date,
    )
    .description(new_template.description)
    .category_id(new_template.category_id)
    .end_date(new_template.end_date);

    new_transaction.validate()?;
    check_category(store, user_id, new_transaction.category_id)?;

    let template = store.create_transaction(new_transaction)?;
    cache.invalidate_user(user_id);

    Ok(template)
}

/// Book a one-off income or expense, or book an occurrence of a template.
///
/// # Errors
/// This function will return a:
/// - [Error::InvalidAmount] if the value is not positive,
/// - [Error::InvalidCategory] if the category is not owned by the user,
/// - [Error::InvalidTemplate] if the linked template is not a template of
///   `kind` owned by the user,
/// - [Error::OccurrenceOutsideSchedule] if the template does not occur in the
///   month of `date`,
/// - [Error::DuplicateOccurrence] if the template already has an occurrence
///   booked that month,
/// - or an error if the store fails.
pub fn create_one_off_or_promote(
    store: &impl TransactionStore,
    cache: &OccurrenceCache,
    user_id: UserId,
    kind: TransactionKind,
    new_occurrence: NewOccurrence,
) -> Result<Transaction, Error> {
    let new_transaction =
        NewTransaction::one_off(kind, user_id, new_occurrence.value, new_occurrence.date)
            .description(new_occurrence.description)
            .category_id(new_occurrence.category_id)
            .linked_template_id(new_occurrence.linked_template_id);

    new_transaction.validate()?;
    check_category(store, user_id, new_transaction.category_id)?;

    if let Some(template_id) = new_transaction.linked_template_id {
        let template = match get_template(store, user_id, kind, template_id) {
            Ok(template) => template,
            Err(Error::NotFound) => return Err(Error::InvalidTemplate(template_id)),
            Err(error) => return Err(error),
        };

        let period = MonthPeriod::of(new_transaction.date);

        if !should_appear(&template, period) {
            return Err(Error::OccurrenceOutsideSchedule(period));
        }

        ensure_month_is_free(store, &template, period, None)?;
    }

    let transaction = store.create_transaction(new_transaction)?;
    cache.invalidate_user(user_id);

    Ok(transaction)
}

/// Update a concrete income or expense.
///
/// # Errors
/// This function will return a:
/// - [Error::UpdateMissingTransaction] if there is no such concrete row,
/// - [Error::InvalidAmount] or [Error::InvalidCategory] for invalid changes,
/// - [Error::DuplicateOccurrence] if the row is linked to a template and is
///   moved into a month where that template already has an occurrence,
/// - or an error if the store fails.
pub fn update_transaction(
    store: &impl TransactionStore,
    cache: &OccurrenceCache,
    user_id: UserId,
    kind: TransactionKind,
    id: TransactionId,
    patch: TransactionPatch,
) -> Result<Transaction, Error> {
    let existing = match store.get_transaction(kind, user_id, id) {
        Ok(existing) if !existing.is_fixed => existing,
        Ok(_) | Err(Error::NotFound) => return Err(Error::UpdateMissingTransaction),
        Err(error) => return Err(error),
    };

    check_patch(store, user_id, &patch)?;

    let updated = patch.apply(&existing);

    let moved_month = updated.period() != existing.period();

    if let (Some(template_id), true) = (existing.linked_template_id, moved_month) {
        match get_template(store, user_id, kind, template_id) {
            Ok(template) => ensure_month_is_free(store, &template, updated.period(), Some(id))?,
            // A dangling link has no month to protect.
            Err(Error::NotFound) => {}
            Err(error) => return Err(error),
        }
    }

    let transaction = store.update_transaction(kind, user_id, id, &patch)?;
    cache.invalidate_user(user_id);

    Ok(transaction)
}

/// Update a template's description, value, category or schedule.
///
/// # Errors
/// This function will return a:
/// - [Error::UpdateMissingTransaction] if there is no such template,
/// - [Error::InvalidAmount], [Error::InvalidCategory] or
///   [Error::EndDateBeforeStartDate] for invalid changes,
/// - or an error if the store fails.
pub fn update_template(
    store: &impl TransactionStore,
    cache: &OccurrenceCache,
    user_id: UserId,
    kind: TransactionKind,
    template_id: TransactionId,
    patch: TransactionPatch,
) -> Result<Transaction, Error> {
    let existing = match get_template(store, user_id, kind, template_id) {
        Ok(existing) => existing,
        Err(Error::NotFound) => return Err(Error::UpdateMissingTransaction),
        Err(error) => return Err(error),
    };

    check_patch(store, user_id, &patch)?;

    let updated = patch.apply(&existing);
    validate_schedule(updated.start_date, updated.end_date)?;

    let template = store.update_transaction(kind, user_id, template_id, &patch)?;
    cache.invalidate_user(user_id);

    Ok(template)
}

/// Delete a concrete income or expense. Its template, if any, is kept.
///
/// # Errors
/// Returns [Error::DeleteMissingTransaction] if there is no such concrete row.
pub fn delete_transaction(
    store: &impl TransactionStore,
    cache: &OccurrenceCache,
    user_id: UserId,
    kind: TransactionKind,
    id: TransactionId,
) -> Result<(), Error> {
    store.delete_transaction(kind, user_id, id)?;
    cache.invalidate_user(user_id);

    Ok(())
}

/// Delete a template and every row linked to it, all or nothing.
///
/// Returns the number of linked rows deleted.
///
/// # Errors
/// Returns [Error::DeleteMissingTemplate] if there is no such template.
pub fn delete_template(
    store: &impl TransactionStore,
    cache: &OccurrenceCache,
    user_id: UserId,
    kind: TransactionKind,
    template_id: TransactionId,
) -> Result<usize, Error> {
    let deleted = store.delete_template_cascade(kind, user_id, template_id)?;
    cache.invalidate_user(user_id);

    tracing::info!("deleted {kind} template {template_id} and {deleted} linked rows");

    Ok(deleted)
}

fn check_category(
    store: &impl TransactionStore,
    user_id: UserId,
    category_id: Option<CategoryId>,
) -> Result<(), Error> {
    let Some(category_id) = category_id else {
        return Ok(());
    };

    match store.find_category(category_id, user_id)? {
        Some(_) => Ok(()),
        None => Err(Error::InvalidCategory(Some(category_id))),
    }
}

fn check_patch(
    store: &impl TransactionStore,
    user_id: UserId,
    patch: &TransactionPatch,
) -> Result<(), Error> {
    if let Some(value) = patch.value {
        validate_value(value)?;
    }

    if let Some(category_id) = patch.category_id {
        check_category(store, user_id, category_id)?;
    }

    Ok(())
}

/// Fail if `template` already has an occurrence in `period`, ignoring the row `except`.
fn ensure_month_is_free(
    store: &impl TransactionStore,
    template: &Transaction,
    period: MonthPeriod,
    except: Option<TransactionId>,
) -> Result<(), Error> {
    let mut rows = store.find_transactions(
        &TransactionQuery::concrete(template.user_id, template.kind).in_range(period.bounds()),
    )?;
    rows.retain(|row| Some(row.id) != except);

    match resolve_occurrence(template, period, &rows, &HashSet::new()) {
        Some(_) => Err(Error::DuplicateOccurrence(period)),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use std::{
        cell::Cell,
        sync::{Arc, Mutex},
    };

    use rusqlite::Connection;
    use time::{Date, macros::date};

    use crate::{
        Error,
        cache::{CacheConfig, OccurrenceCache},
        category::{Category, CategoryId, CategoryName, create_category},
        database_id::{TransactionId, UserId},
        date::MonthPeriod,
        db::initialize,
        transaction::{
            domain::{
                NewTransaction, RecurrenceType, RowRole, Transaction, TransactionKind,
                TransactionPatch,
            },
            query::TransactionQuery,
            sqlite::SQLiteTransactionStore,
            store::{TracedStore, TransactionStore},
            view::{OccurrenceId, OccurrenceView},
        },
    };

    use super::{
        NewOccurrence, NewTemplate, OccurrenceFilter, create_one_off_or_promote,
        create_template, delete_template, delete_transaction, get_template_history,
        list_occurrences, update_template, update_transaction,
    };

    const USER: i64 = 1;
    const KIND: TransactionKind = TransactionKind::Expense;
    const TODAY: Date = date!(2024 - 06 - 01);

    struct Fixture {
        store: TracedStore<SQLiteTransactionStore>,
        cache: OccurrenceCache,
        housing: Category,
    }

    fn fixture() -> Fixture {
        let connection = Connection::open_in_memory().unwrap();
        initialize(&connection).unwrap();
        let housing =
            create_category(USER, CategoryName::new_unchecked("Housing"), &connection).unwrap();

        Fixture {
            store: TracedStore::new(SQLiteTransactionStore::new(Arc::new(Mutex::new(
                connection,
            )))),
            cache: OccurrenceCache::new(CacheConfig::default()),
            housing,
        }
    }

    impl Fixture {
        fn rent(&self) -> Transaction {
            self.template(NewTemplate {
                description: Some("Rent".to_owned()),
                value: 1200.0,
                category_id: Some(self.housing.id),
                recurrence_type: RecurrenceType::Monthly,
                start_date: Some(date!(2024 - 01 - 10)),
                end_date: None,
            })
        }

        fn template(&self, new_template: NewTemplate) -> Transaction {
            create_template(&self.store, &self.cache, USER, KIND, new_template, TODAY).unwrap()
        }

        fn book(
            &self,
            template: &Transaction,
            date: Date,
            linked: bool,
        ) -> Result<Transaction, Error> {
            create_one_off_or_promote(
                &self.store,
                &self.cache,
                USER,
                KIND,
                NewOccurrence {
                    description: template.description.clone(),
                    value: template.value,
                    date,
                    category_id: template.category_id,
                    linked_template_id: linked.then_some(template.id),
                },
            )
        }

        fn list(&self, year: i32, month: u8) -> Vec<OccurrenceView> {
            self.list_filtered(OccurrenceFilter {
                period: Some(MonthPeriod::new(year, month).unwrap()),
                fixed_only: false,
            })
        }

        fn list_filtered(&self, filter: OccurrenceFilter) -> Vec<OccurrenceView> {
            list_occurrences(&self.store, &self.cache, USER, KIND, filter).unwrap()
        }
    }

    fn entries_for(views: &[OccurrenceView], template_id: i64) -> usize {
        views
            .iter()
            .filter(|view| match view.id {
                OccurrenceId::Pending {
                    template_id: id, ..
                } => id == template_id,
                _ => view.linked_template_id == Some(template_id),
            })
            .count()
    }

    #[test]
    fn empty_month_lists_nothing() {
        let fixture = fixture();

        assert!(fixture.list(2024, 3).is_empty());
    }

    #[test]
    fn monthly_template_has_one_entry_per_month() {
        let fixture = fixture();
        let rent = fixture.rent();
        fixture.book(&rent, date!(2024 - 03 - 10), true).unwrap();

        for month in 1..=6 {
            let views = fixture.list(2024, month);
            assert_eq!(entries_for(&views, rent.id), 1, "month {month}");
        }
        assert_eq!(entries_for(&fixture.list(2023, 12), rent.id), 0);
    }

    #[test]
    fn listing_is_idempotent() {
        let fixture = fixture();
        fixture.rent();

        let first = serde_json::to_string(&fixture.list(2024, 2)).unwrap();
        fixture.cache.invalidate_user(USER);
        let second = serde_json::to_string(&fixture.list(2024, 2)).unwrap();

        assert_eq!(first, second);
    }

    #[test]
    fn yearly_template_only_in_start_month() {
        let fixture = fixture();
        let insurance = fixture.template(NewTemplate {
            description: Some("Car insurance".to_owned()),
            value: 900.0,
            category_id: None,
            recurrence_type: RecurrenceType::Yearly,
            start_date: Some(date!(2024 - 03 - 15)),
            end_date: None,
        });

        for month in [1, 2, 4, 12] {
            assert_eq!(entries_for(&fixture.list(2025, month), insurance.id), 0);
        }
        assert_eq!(entries_for(&fixture.list(2025, 3), insurance.id), 1);
    }

    #[test]
    fn end_date_month_is_last_month() {
        let fixture = fixture();
        let gym = fixture.template(NewTemplate {
            description: Some("Gym".to_owned()),
            value: 50.0,
            category_id: None,
            recurrence_type: RecurrenceType::Monthly,
            start_date: Some(date!(2024 - 01 - 20)),
            end_date: Some(date!(2024 - 06 - 15)),
        });

        assert_eq!(entries_for(&fixture.list(2024, 6), gym.id), 1);
        assert_eq!(entries_for(&fixture.list(2024, 7), gym.id), 0);
    }

    #[test]
    fn promoted_occurrence_replaces_pending_entry() {
        let fixture = fixture();
        let rent = fixture.rent();
        assert!(fixture.list(2024, 2)[0].pending);

        let booked = fixture.book(&rent, date!(2024 - 02 - 10), true).unwrap();
        let views = fixture.list(2024, 2);

        assert_eq!(views.len(), 1);
        assert_eq!(views[0].id, OccurrenceId::Stored(booked.id));
        assert!(!views[0].pending);
        assert_eq!(views[0].category_name.as_deref(), Some("Housing"));
    }

    #[test]
    fn promoting_twice_in_a_month_is_rejected() {
        let fixture = fixture();
        let rent = fixture.rent();
        fixture.book(&rent, date!(2024 - 02 - 10), true).unwrap();

        let result = fixture.book(&rent, date!(2024 - 02 - 28), true);

        assert_eq!(
            result,
            Err(Error::DuplicateOccurrence(MonthPeriod::new(2024, 2).unwrap()))
        );
    }

    #[test]
    fn promoting_outside_schedule_is_rejected() {
        let fixture = fixture();
        let rent = fixture.rent();

        let result = fixture.book(&rent, date!(2023 - 12 - 10), true);

        assert_eq!(
            result,
            Err(Error::OccurrenceOutsideSchedule(
                MonthPeriod::new(2023, 12).unwrap()
            ))
        );
    }

    #[test]
    fn promoting_to_unknown_template_is_rejected() {
        let fixture = fixture();
        let rent = fixture.rent();
        let missing_id = rent.id + 100;
        let missing = Transaction {
            id: missing_id,
            ..rent
        };

        let result = fixture.book(&missing, date!(2024 - 02 - 10), true);

        assert_eq!(result, Err(Error::InvalidTemplate(missing_id)));
    }

    #[test]
    fn foreign_category_is_rejected() {
        let fixture = fixture();

        let result = create_one_off_or_promote(
            &fixture.store,
            &fixture.cache,
            USER + 1,
            KIND,
            NewOccurrence {
                description: None,
                value: 10.0,
                date: date!(2024 - 02 - 10),
                category_id: Some(fixture.housing.id),
                linked_template_id: None,
            },
        );

        assert_eq!(result, Err(Error::InvalidCategory(Some(fixture.housing.id))));
    }

    #[test]
    fn template_defaults_to_today() {
        let fixture = fixture();

        let template = fixture.template(NewTemplate {
            description: None,
            value: 10.0,
            category_id: None,
            recurrence_type: RecurrenceType::Monthly,
            start_date: None,
            end_date: None,
        });

        assert_eq!(template.start_date, Some(TODAY));
        assert_eq!(template.date, TODAY);
    }

    #[test]
    fn legacy_row_suppresses_pending_and_gets_linked() {
        let fixture = fixture();
        let rent = fixture.rent();
        let legacy = fixture.book(&rent, date!(2024 - 02 - 10), false).unwrap();

        let views = fixture.list(2024, 2);

        assert_eq!(views.len(), 1);
        assert_eq!(views[0].id, OccurrenceId::Stored(legacy.id));
        assert_eq!(views[0].linked_template_id, Some(rent.id));
        assert_eq!(
            fixture
                .store
                .get_transaction(KIND, USER, legacy.id)
                .unwrap()
                .linked_template_id,
            Some(rent.id)
        );
    }

    #[test]
    fn fixed_only_lists_linked_rows_and_pending() {
        let fixture = fixture();
        let rent = fixture.rent();
        let linked = fixture.book(&rent, date!(2024 - 03 - 10), true).unwrap();
        create_one_off_or_promote(
            &fixture.store,
            &fixture.cache,
            USER,
            KIND,
            NewOccurrence {
                description: Some("Coffee".to_owned()),
                value: 4.5,
                date: date!(2024 - 03 - 02),
                category_id: None,
                linked_template_id: None,
            },
        )
        .unwrap();

        let views = fixture.list_filtered(OccurrenceFilter {
            period: Some(MonthPeriod::new(2024, 3).unwrap()),
            fixed_only: true,
        });

        assert_eq!(views.len(), 1);
        assert_eq!(views[0].id, OccurrenceId::Stored(linked.id));
    }

    #[test]
    fn listing_without_period_has_no_pending_entries() {
        let fixture = fixture();
        let rent = fixture.rent();
        fixture.book(&rent, date!(2024 - 03 - 10), true).unwrap();
        fixture.book(&rent, date!(2024 - 04 - 10), true).unwrap();

        let views = fixture.list_filtered(OccurrenceFilter::default());

        assert_eq!(views.len(), 2);
        assert!(views.iter().all(|view| !view.pending));
        assert_eq!(views[0].date, date!(2024 - 04 - 10));
    }

    #[test]
    fn fixed_only_without_period_lists_linked_rows() {
        let fixture = fixture();
        let rent = fixture.rent();
        let linked = fixture.book(&rent, date!(2024 - 03 - 10), true).unwrap();
        create_one_off_or_promote(
            &fixture.store,
            &fixture.cache,
            USER,
            KIND,
            NewOccurrence {
                description: Some("Coffee".to_owned()),
                value: 4.5,
                date: date!(2024 - 04 - 02),
                category_id: None,
                linked_template_id: None,
            },
        )
        .unwrap();

        let views = fixture.list_filtered(OccurrenceFilter {
            period: None,
            fixed_only: true,
        });

        assert_eq!(views.len(), 1);
        assert_eq!(views[0].id, OccurrenceId::Stored(linked.id));
    }

    #[test]
    fn writes_invalidate_cached_listings() {
        let fixture = fixture();
        let rent = fixture.rent();
        assert!(fixture.list(2024, 2)[0].pending);
        assert!(!fixture.cache.is_empty());

        fixture.book(&rent, date!(2024 - 02 - 10), true).unwrap();

        assert!(fixture.cache.is_empty());
        assert!(!fixture.list(2024, 2)[0].pending);
    }

    /// Books March's rent the first time templates are read, as a request
    /// running alongside the listing would.
    struct BooksDuringTemplateRead<'a> {
        fixture: &'a Fixture,
        rent: Transaction,
        booked: Cell<bool>,
    }

    impl TransactionStore for BooksDuringTemplateRead<'_> {
        fn find_transactions(&self, query: &TransactionQuery) -> Result<Vec<Transaction>, Error> {
            if query.role() == RowRole::Template && !self.booked.replace(true) {
                self.fixture.book(&self.rent, date!(2024 - 03 - 10), true)?;
            }

            self.fixture.store.find_transactions(query)
        }

        fn get_transaction(
            &self,
            kind: TransactionKind,
            user_id: UserId,
            id: TransactionId,
        ) -> Result<Transaction, Error> {
            self.fixture.store.get_transaction(kind, user_id, id)
        }

        fn find_category(
            &self,
            category_id: CategoryId,
            user_id: UserId,
        ) -> Result<Option<Category>, Error> {
            self.fixture.store.find_category(category_id, user_id)
        }

        fn create_transaction(&self, new_transaction: NewTransaction) -> Result<Transaction, Error> {
            self.fixture.store.create_transaction(new_transaction)
        }

        fn update_transaction(
            &self,
            kind: TransactionKind,
            user_id: UserId,
            id: TransactionId,
            patch: &TransactionPatch,
        ) -> Result<Transaction, Error> {
            self.fixture.store.update_transaction(kind, user_id, id, patch)
        }

        fn link_to_template(
            &self,
            kind: TransactionKind,
            user_id: UserId,
            row_id: TransactionId,
            template_id: TransactionId,
        ) -> Result<bool, Error> {
            self.fixture
                .store
                .link_to_template(kind, user_id, row_id, template_id)
        }

        fn delete_transaction(
            &self,
            kind: TransactionKind,
            user_id: UserId,
            id: TransactionId,
        ) -> Result<(), Error> {
            self.fixture.store.delete_transaction(kind, user_id, id)
        }

        fn delete_transactions_by_template(
            &self,
            kind: TransactionKind,
            user_id: UserId,
            template_id: TransactionId,
        ) -> Result<usize, Error> {
            self.fixture
                .store
                .delete_transactions_by_template(kind, user_id, template_id)
        }

        fn delete_template_cascade(
            &self,
            kind: TransactionKind,
            user_id: UserId,
            template_id: TransactionId,
        ) -> Result<usize, Error> {
            self.fixture
                .store
                .delete_template_cascade(kind, user_id, template_id)
        }
    }

    #[test]
    fn listing_overtaken_by_a_write_is_not_cached() {
        let fixture = fixture();
        let rent = fixture.rent();
        let store = BooksDuringTemplateRead {
            fixture: &fixture,
            rent: rent.clone(),
            booked: Cell::new(false),
        };
        let march = OccurrenceFilter {
            period: Some(MonthPeriod::new(2024, 3).unwrap()),
            fixed_only: false,
        };

        let stale = list_occurrences(&store, &fixture.cache, USER, KIND, march).unwrap();
        assert!(stale[0].pending);

        let views = fixture.list(2024, 3);

        assert_eq!(views.len(), 1);
        assert!(!views[0].pending);
        assert_eq!(views[0].linked_template_id, Some(rent.id));
    }

    #[test]
    fn history_has_initial_and_booked_entries() {
        let fixture = fixture();
        let rent = fixture.rent();
        let march = fixture.book(&rent, date!(2024 - 03 - 10), true).unwrap();

        let history = get_template_history(&fixture.store, USER, KIND, rent.id).unwrap();

        let ids: Vec<_> = history.iter().map(|entry| entry.id).collect();
        assert_eq!(
            ids,
            vec![
                OccurrenceId::Initial {
                    template_id: rent.id
                },
                OccurrenceId::Stored(march.id)
            ]
        );
        assert_eq!(history[0].date, date!(2024 - 01 - 10));
    }

    #[test]
    fn history_of_concrete_row_is_not_found() {
        let fixture = fixture();
        let rent = fixture.rent();
        let row = fixture.book(&rent, date!(2024 - 03 - 10), true).unwrap();

        assert_eq!(
            get_template_history(&fixture.store, USER, KIND, row.id),
            Err(Error::NotFound)
        );
        assert_eq!(
            get_template_history(&fixture.store, USER, KIND, 999),
            Err(Error::NotFound)
        );
    }

    #[test]
    fn deleting_template_removes_rows_and_projection() {
        let fixture = fixture();
        let rent = fixture.rent();
        for date in [date!(2024 - 02 - 10), date!(2024 - 03 - 10), date!(2024 - 04 - 10)] {
            fixture.book(&rent, date, true).unwrap();
        }

        let deleted = delete_template(&fixture.store, &fixture.cache, USER, KIND, rent.id);

        assert_eq!(deleted, Ok(3));
        for month in 1..=5 {
            assert!(fixture.list(2024, month).is_empty(), "month {month}");
        }
    }

    #[test]
    fn deleting_missing_template_fails() {
        let fixture = fixture();

        assert_eq!(
            delete_template(&fixture.store, &fixture.cache, USER, KIND, 42),
            Err(Error::DeleteMissingTemplate)
        );
    }

    #[test]
    fn deleting_booked_row_brings_back_pending_entry() {
        let fixture = fixture();
        let rent = fixture.rent();
        let booked = fixture.book(&rent, date!(2024 - 02 - 10), true).unwrap();
        assert!(!fixture.list(2024, 2)[0].pending);

        delete_transaction(&fixture.store, &fixture.cache, USER, KIND, booked.id).unwrap();

        let views = fixture.list(2024, 2);
        assert_eq!(views.len(), 1);
        assert!(views[0].pending);
    }

    #[test]
    fn moving_booked_row_into_covered_month_is_rejected() {
        let fixture = fixture();
        let rent = fixture.rent();
        fixture.book(&rent, date!(2024 - 02 - 10), true).unwrap();
        let march = fixture.book(&rent, date!(2024 - 03 - 10), true).unwrap();

        let result = update_transaction(
            &fixture.store,
            &fixture.cache,
            USER,
            KIND,
            march.id,
            TransactionPatch {
                date: Some(date!(2024 - 02 - 20)),
                ..Default::default()
            },
        );

        assert_eq!(
            result,
            Err(Error::DuplicateOccurrence(MonthPeriod::new(2024, 2).unwrap()))
        );
    }

    #[test]
    fn moving_booked_row_within_its_month_is_allowed() {
        let fixture = fixture();
        let rent = fixture.rent();
        let booked = fixture.book(&rent, date!(2024 - 02 - 10), true).unwrap();

        let updated = update_transaction(
            &fixture.store,
            &fixture.cache,
            USER,
            KIND,
            booked.id,
            TransactionPatch {
                date: Some(date!(2024 - 02 - 12)),
                ..Default::default()
            },
        )
        .unwrap();

        assert_eq!(updated.date, date!(2024 - 02 - 12));
    }

    #[test]
    fn update_transaction_does_not_touch_templates() {
        let fixture = fixture();
        let rent = fixture.rent();

        let result = update_transaction(
            &fixture.store,
            &fixture.cache,
            USER,
            KIND,
            rent.id,
            TransactionPatch::default(),
        );

        assert_eq!(result, Err(Error::UpdateMissingTransaction));
    }

    #[test]
    fn update_template_can_end_schedule() {
        let fixture = fixture();
        let rent = fixture.rent();

        let updated = update_template(
            &fixture.store,
            &fixture.cache,
            USER,
            KIND,
            rent.id,
            TransactionPatch {
                end_date: Some(Some(date!(2024 - 03 - 31))),
                ..Default::default()
            },
        )
        .unwrap();

        assert_eq!(updated.end_date, Some(date!(2024 - 03 - 31)));
        assert!(fixture.list(2024, 4).is_empty());
    }

    #[test]
    fn update_template_rejects_end_before_start() {
        let fixture = fixture();
        let rent = fixture.rent();

        let result = update_template(
            &fixture.store,
            &fixture.cache,
            USER,
            KIND,
            rent.id,
            TransactionPatch {
                end_date: Some(Some(date!(2023 - 12 - 31))),
                ..Default::default()
            },
        );

        assert_eq!(
            result,
            Err(Error::EndDateBeforeStartDate {
                start: date!(2024 - 01 - 10),
                end: date!(2023 - 12 - 31)
            })
        );
    }
}
