//! The monthly summary shown on the dashboard.
//!
//! Totals are summed in cents and converted back to amounts at the end, so a
//! month of small expenses does not pick up floating point noise.

use std::collections::{BTreeMap, HashMap};

use axum::{
    Extension, Json,
    extract::{FromRef, State},
    response::IntoResponse,
};
use axum_extra::extract::Query;
use serde::{Deserialize, Serialize};
use time::Month;

use crate::{
    AppState, Error,
    cache::OccurrenceCache,
    category::CategoryId,
    database_id::UserId,
    date::{DateRange, MonthPeriod},
    timezone::local_today,
    transaction::{
        OccurrenceFilter, OccurrenceView, SQLiteTransactionStore, TracedStore, TransactionKind,
        TransactionQuery, TransactionStore, list_occurrences, parse_period, to_cents,
    },
};

/// The state needed for the dashboard.
#[derive(Debug, Clone)]
pub struct DashboardState {
    /// The income and expense store.
    pub store: TracedStore<SQLiteTransactionStore>,
    /// The occurrence cache shared with the listing routes.
    pub cache: OccurrenceCache,
    /// The local timezone as a canonical timezone name, e.g. "Pacific/Auckland".
    pub local_timezone: String,
}

impl FromRef<AppState> for DashboardState {
    fn from_ref(state: &AppState) -> Self {
        Self {
            store: state.transaction_store.clone(),
            cache: state.cache.clone(),
            local_timezone: state.local_timezone.clone(),
        }
    }
}

/// The query string of the dashboard route. Without a month the current month is shown.
#[derive(Debug, Default, Deserialize)]
pub struct DashboardQuery {
    /// The month number, 1-12.
    pub month: Option<String>,
    /// The year. Required together with `month`.
    pub year: Option<String>,
}

/// What has been booked and what is still expected for one kind in a month.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct KindTotals {
    /// The sum of booked rows.
    pub realized: f64,
    /// The sum of occurrences still to be booked.
    pub pending: f64,
}

/// Booked incomes and expenses for one month of the year.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MonthTotals {
    /// The month number, 1-12.
    pub month: u8,
    /// Three letter month name, e.g. "Jan".
    pub label: String,
    /// Booked income.
    pub income: f64,
    /// Booked expenses.
    pub expense: f64,
}

/// Booked expenses of one category in a month.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryTotal {
    /// The category's id.
    pub category_id: CategoryId,
    /// The category's name.
    pub name: String,
    /// The sum of booked expenses in the category.
    pub value: f64,
}

/// The dashboard data for one month.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardSummary {
    /// The summarized year.
    pub year: i32,
    /// The summarized month, 1-12.
    pub month: u8,
    /// Incomes in the month.
    pub income: KindTotals,
    /// Expenses in the month.
    pub expense: KindTotals,
    /// Booked income minus booked expenses.
    pub realized_balance: f64,
    /// The balance once every pending occurrence is booked as well.
    pub projected_balance: f64,
    /// Booked totals for every month of the year, January first.
    pub monthly: Vec<MonthTotals>,
    /// The month's booked expenses per category, largest first.
    pub expenses_by_category: Vec<CategoryTotal>,
}

/// A route handler for the dashboard summary of a month.
pub async fn get_dashboard_endpoint(
    State(state): State<DashboardState>,
    Extension(user_id): Extension<UserId>,
    Query(query): Query<DashboardQuery>,
) -> Result<impl IntoResponse, Error> {
    let period = match parse_period(query.month.as_deref(), query.year.as_deref())? {
        Some(period) => period,
        None => MonthPeriod::of(local_today(&state.local_timezone)?),
    };

    let summary = build_summary(&state.store, &state.cache, user_id, period)?;

    Ok(Json(summary))
}

/// Summarize the user's incomes and expenses in `period`.
///
/// Pending amounts come from the same projection used to list the month, so
/// a template that was already booked is not counted twice.
///
/// # Errors
/// Returns an error if the store fails.
pub fn build_summary(
    store: &impl TransactionStore,
    cache: &OccurrenceCache,
    user_id: UserId,
    period: MonthPeriod,
) -> Result<DashboardSummary, Error> {
    let filter = OccurrenceFilter {
        period: Some(period),
        fixed_only: false,
    };
    let incomes = list_occurrences(store, cache, user_id, TransactionKind::Income, filter)?;
    let expenses = list_occurrences(store, cache, user_id, TransactionKind::Expense, filter)?;

    let (income_realized, income_pending) = split_totals(&incomes);
    let (expense_realized, expense_pending) = split_totals(&expenses);

    let realized_balance = income_realized - expense_realized;
    let projected_balance = realized_balance + income_pending - expense_pending;

    Ok(DashboardSummary {
        year: period.year(),
        month: period.month(),
        income: KindTotals {
            realized: from_cents(income_realized),
            pending: from_cents(income_pending),
        },
        expense: KindTotals {
            realized: from_cents(expense_realized),
            pending: from_cents(expense_pending),
        },
        realized_balance: from_cents(realized_balance),
        projected_balance: from_cents(projected_balance),
        monthly: monthly_totals(store, user_id, period.year())?,
        expenses_by_category: category_totals(&expenses),
    })
}

/// The booked and pending totals of `views`, in cents.
fn split_totals(views: &[OccurrenceView]) -> (i64, i64) {
    views.iter().fold((0, 0), |(realized, pending), view| {
        let cents = to_cents(view.value);

        if view.pending {
            (realized, pending + cents)
        } else {
            (realized + cents, pending)
        }
    })
}

fn monthly_totals(
    store: &impl TransactionStore,
    user_id: UserId,
    year: i32,
) -> Result<Vec<MonthTotals>, Error> {
    let year_range = DateRange {
        start: MonthPeriod::new(year, 1)?.bounds().start,
        end: MonthPeriod::new(year, 12)?.bounds().end,
    };

    let mut cents_per_month: HashMap<(TransactionKind, u8), i64> = HashMap::new();

    for kind in TransactionKind::ALL {
        let query = TransactionQuery::concrete(user_id, kind).in_range(year_range);
        let rows = store.find_transactions(&query)?;

        for row in rows {
            *cents_per_month
                .entry((kind, row.date.month() as u8))
                .or_insert(0) += row.value_cents();
        }
    }

    let totals = (1..=12u8)
        .map(|month| {
            let total = |kind: TransactionKind| {
                cents_per_month
                    .get(&(kind, month))
                    .copied()
                    .unwrap_or(0)
            };

            MonthTotals {
                month,
                label: month_label(month),
                income: from_cents(total(TransactionKind::Income)),
                expense: from_cents(total(TransactionKind::Expense)),
            }
        })
        .collect();

    Ok(totals)
}

/// Sum the booked expenses per category. Expenses without a category are left out.
fn category_totals(expenses: &[OccurrenceView]) -> Vec<CategoryTotal> {
    let mut cents_per_category: BTreeMap<CategoryId, (String, i64)> = BTreeMap::new();

    for view in expenses.iter().filter(|view| !view.pending) {
        let Some(category_id) = view.category_id else {
            continue;
        };

        let entry = cents_per_category
            .entry(category_id)
            .or_insert_with(|| (view.category_name.clone().unwrap_or_default(), 0));
        entry.1 += to_cents(view.value);
    }

    let mut totals: Vec<(CategoryId, String, i64)> = cents_per_category
        .into_iter()
        .map(|(category_id, (name, cents))| (category_id, name, cents))
        .collect();
    // Largest first, ties by category id.
    totals.sort_by(|a, b| b.2.cmp(&a.2).then(a.0.cmp(&b.0)));

    totals
        .into_iter()
        .map(|(category_id, name, cents)| CategoryTotal {
            category_id,
            name,
            value: from_cents(cents),
        })
        .collect()
}

fn month_label(month: u8) -> String {
    match Month::try_from(month) {
        Ok(month) => month.to_string().chars().take(3).collect(),
        Err(_) => String::new(),
    }
}

fn from_cents(cents: i64) -> f64 {
    cents as f64 / 100.0
}
