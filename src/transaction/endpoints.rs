//! JSON route handlers for incomes, expenses and their templates.

use axum::{
    Extension, Json,
    extract::{FromRef, Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use axum_extra::extract::Query;
use serde::{Deserialize, Deserializer};
use serde_json::json;

use crate::{
    AppState, Error,
    cache::OccurrenceCache,
    category::CategoryId,
    database_id::{TransactionId, UserId},
    date::{MonthPeriod, parse_date},
    timezone::local_today,
};

use super::{
    domain::{RecurrenceType, Transaction, TransactionKind, TransactionPatch},
    service::{
        self, NewOccurrence, NewTemplate, OccurrenceFilter, create_one_off_or_promote,
        create_template, get_template, get_template_history, list_occurrences, list_templates,
    },
    sqlite::SQLiteTransactionStore,
    store::TracedStore,
    view::OccurrenceView,
};

/// The state needed by the income and expense handlers.
#[derive(Debug, Clone)]
pub struct TransactionState {
    /// The income and expense store.
    pub store: TracedStore<SQLiteTransactionStore>,
    /// The occurrence cache, dropped for the user on every write.
    pub cache: OccurrenceCache,
    /// The canonical timezone used to work out today's date, e.g. "Pacific/Auckland".
    pub local_timezone: String,
}

impl FromRef<AppState> for TransactionState {
    fn from_ref(state: &AppState) -> Self {
        Self {
            store: state.transaction_store.clone(),
            cache: state.cache.clone(),
            local_timezone: state.local_timezone.clone(),
        }
    }
}

/// Deserialize a field that may be absent, null or set.
///
/// Use with `#[serde(default)]` so an absent field stays `None` and an
/// explicit null becomes `Some(None)`.
pub(crate) fn nullable<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

/// The query string of the listing route.
#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    /// The month number, 1-12.
    pub month: Option<String>,
    /// The year. Required together with `month`.
    pub year: Option<String>,
    /// `1`/`true` to only list rows linked to a template.
    pub fixed: Option<String>,
}

impl ListQuery {
    fn into_filter(self) -> Result<OccurrenceFilter, Error> {
        Ok(OccurrenceFilter {
            period: parse_period(self.month.as_deref(), self.year.as_deref())?,
            fixed_only: parse_fixed_flag(self.fixed.as_deref())?,
        })
    }
}

/// Parse an optional month and year given as text.
///
/// # Errors
/// Returns [Error::InvalidPeriod] if only one of them is given or either is
/// not a valid number.
pub(crate) fn parse_period(
    month: Option<&str>,
    year: Option<&str>,
) -> Result<Option<MonthPeriod>, Error> {
    match (month, year) {
        (None, None) => Ok(None),
        (Some(month), Some(year)) => {
            let invalid = || Error::InvalidPeriod(format!("{month}/{year}"));
            let month: u8 = month.trim().parse().map_err(|_| invalid())?;
            let year: i32 = year.trim().parse().map_err(|_| invalid())?;

            MonthPeriod::new(year, month).map(Some)
        }
        _ => Err(Error::InvalidPeriod(
            "month and year must be given together".to_owned(),
        )),
    }
}

fn parse_fixed_flag(fixed: Option<&str>) -> Result<bool, Error> {
    match fixed.map(str::trim) {
        None | Some("") | Some("0") | Some("false") => Ok(false),
        Some("1") | Some("true") => Ok(true),
        Some(other) => Err(Error::InvalidFixedFlag(other.to_owned())),
    }
}

fn parse_optional_date(text: Option<String>) -> Result<Option<time::Date>, Error> {
    text.as_deref().map(parse_date).transpose()
}

/// The request body for booking a one-off row or an occurrence of a template.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OccurrenceData {
    /// A free-text label.
    pub description: Option<String>,
    /// A positive amount of money.
    pub value: f64,
    /// The booking date.
    pub date: String,
    /// The category, if any.
    pub category_id: Option<CategoryId>,
    /// The template this row is an occurrence of.
    pub linked_template_id: Option<TransactionId>,
}

impl TryFrom<OccurrenceData> for NewOccurrence {
    type Error = Error;

    fn try_from(data: OccurrenceData) -> Result<Self, Self::Error> {
        Ok(NewOccurrence {
            description: data.description,
            value: data.value,
            date: parse_date(&data.date)?,
            category_id: data.category_id,
            linked_template_id: data.linked_template_id,
        })
    }
}

/// The request body for updating a concrete row. Absent fields are left as is.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OccurrenceUpdateData {
    /// A new description, or null to clear it.
    #[serde(default, deserialize_with = "nullable")]
    pub description: Option<Option<String>>,
    /// A new amount.
    pub value: Option<f64>,
    /// A new booking date.
    pub date: Option<String>,
    /// A new category, or null to clear it.
    #[serde(default, deserialize_with = "nullable")]
    pub category_id: Option<Option<CategoryId>>,
}

impl TryFrom<OccurrenceUpdateData> for TransactionPatch {
    type Error = Error;

    fn try_from(data: OccurrenceUpdateData) -> Result<Self, Self::Error> {
        Ok(TransactionPatch {
            description: data.description,
            value: data.value,
            date: parse_optional_date(data.date)?,
            category_id: data.category_id,
            ..Default::default()
        })
    }
}

/// The request body for creating a template.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateData {
    /// A free-text label.
    pub description: Option<String>,
    /// A positive amount of money.
    pub value: f64,
    /// The category, if any.
    pub category_id: Option<CategoryId>,
    /// How often the template recurs.
    pub recurrence_type: RecurrenceType,
    /// The first active date. Defaults to today.
    pub start_date: Option<String>,
    /// The last active date, inclusive.
    pub end_date: Option<String>,
}

impl TryFrom<TemplateData> for NewTemplate {
    type Error = Error;

    fn try_from(data: TemplateData) -> Result<Self, Self::Error> {
        Ok(NewTemplate {
            description: data.description,
            value: data.value,
            category_id: data.category_id,
            recurrence_type: data.recurrence_type,
            start_date: parse_optional_date(data.start_date)?,
            end_date: parse_optional_date(data.end_date)?,
        })
    }
}

/// The request body for updating a template. Absent fields are left as is and
/// a null end date makes the template open ended.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateUpdateData {
    /// A new description, or null to clear it.
    #[serde(default, deserialize_with = "nullable")]
    pub description: Option<Option<String>>,
    /// A new amount.
    pub value: Option<f64>,
    /// A new category, or null to clear it.
    #[serde(default, deserialize_with = "nullable")]
    pub category_id: Option<Option<CategoryId>>,
    /// A new recurrence.
    pub recurrence_type: Option<RecurrenceType>,
    /// A new start date.
    pub start_date: Option<String>,
    /// A new end date, or null to recur indefinitely.
    #[serde(default, deserialize_with = "nullable")]
    pub end_date: Option<Option<String>>,
}

impl TryFrom<TemplateUpdateData> for TransactionPatch {
    type Error = Error;

    fn try_from(data: TemplateUpdateData) -> Result<Self, Self::Error> {
        let end_date = match data.end_date {
            Some(end_date) => Some(parse_optional_date(end_date)?),
            None => None,
        };

        Ok(TransactionPatch {
            description: data.description,
            value: data.value,
            category_id: data.category_id,
            recurrence_type: data.recurrence_type,
            start_date: parse_optional_date(data.start_date)?,
            end_date,
            ..Default::default()
        })
    }
}

/// A route handler for listing the stored and pending rows of one kind.
pub async fn list_occurrences_endpoint(
    State(state): State<TransactionState>,
    Extension(user_id): Extension<UserId>,
    Path(kind): Path<TransactionKind>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<OccurrenceView>>, Error> {
    let filter = query.into_filter()?;

    list_occurrences(&state.store, &state.cache, user_id, kind, filter).map(Json)
}

/// A route handler for booking a one-off row or an occurrence of a template.
pub async fn create_occurrence_endpoint(
    State(state): State<TransactionState>,
    Extension(user_id): Extension<UserId>,
    Path(kind): Path<TransactionKind>,
    Json(data): Json<OccurrenceData>,
) -> Result<(StatusCode, Json<Transaction>), Error> {
    let new_occurrence = data.try_into()?;
    let transaction =
        create_one_off_or_promote(&state.store, &state.cache, user_id, kind, new_occurrence)?;

    Ok((StatusCode::CREATED, Json(transaction)))
}

/// A route handler for updating a concrete row.
pub async fn update_occurrence_endpoint(
    State(state): State<TransactionState>,
    Extension(user_id): Extension<UserId>,
    Path((kind, transaction_id)): Path<(TransactionKind, TransactionId)>,
    Json(data): Json<OccurrenceUpdateData>,
) -> Result<Json<Transaction>, Error> {
    let patch = data.try_into()?;

    service::update_transaction(
        &state.store,
        &state.cache,
        user_id,
        kind,
        transaction_id,
        patch,
    )
    .map(Json)
}

/// A route handler for deleting a concrete row.
pub async fn delete_occurrence_endpoint(
    State(state): State<TransactionState>,
    Extension(user_id): Extension<UserId>,
    Path((kind, transaction_id)): Path<(TransactionKind, TransactionId)>,
) -> Result<StatusCode, Error> {
    service::delete_transaction(&state.store, &state.cache, user_id, kind, transaction_id)?;

    Ok(StatusCode::NO_CONTENT)
}

/// A route handler for listing templates.
pub async fn list_templates_endpoint(
    State(state): State<TransactionState>,
    Extension(user_id): Extension<UserId>,
    Path(kind): Path<TransactionKind>,
) -> Result<Json<Vec<Transaction>>, Error> {
    list_templates(&state.store, user_id, kind).map(Json)
}

/// A route handler for creating a template.
pub async fn create_template_endpoint(
    State(state): State<TransactionState>,
    Extension(user_id): Extension<UserId>,
    Path(kind): Path<TransactionKind>,
    Json(data): Json<TemplateData>,
) -> Result<(StatusCode, Json<Transaction>), Error> {
    let new_template = data.try_into()?;
    let today = local_today(&state.local_timezone)?;
    let template = create_template(
        &state.store,
        &state.cache,
        user_id,
        kind,
        new_template,
        today,
    )?;

    Ok((StatusCode::CREATED, Json(template)))
}

/// A route handler for getting a template.
pub async fn get_template_endpoint(
    State(state): State<TransactionState>,
    Extension(user_id): Extension<UserId>,
    Path((kind, template_id)): Path<(TransactionKind, TransactionId)>,
) -> Result<Json<Transaction>, Error> {
    get_template(&state.store, user_id, kind, template_id).map(Json)
}

/// A route handler for updating a template.
pub async fn update_template_endpoint(
    State(state): State<TransactionState>,
    Extension(user_id): Extension<UserId>,
    Path((kind, template_id)): Path<(TransactionKind, TransactionId)>,
    Json(data): Json<TemplateUpdateData>,
) -> Result<Json<Transaction>, Error> {
    let patch = data.try_into()?;

    service::update_template(&state.store, &state.cache, user_id, kind, template_id, patch)
        .map(Json)
}

/// A route handler for deleting a template and its booked occurrences.
pub async fn delete_template_endpoint(
    State(state): State<TransactionState>,
    Extension(user_id): Extension<UserId>,
    Path((kind, template_id)): Path<(TransactionKind, TransactionId)>,
) -> Result<impl IntoResponse, Error> {
    let deleted =
        service::delete_template(&state.store, &state.cache, user_id, kind, template_id)?;

    Ok(Json(json!({ "deletedOccurrences": deleted })))
}

/// A route handler for a template's history.
pub async fn template_history_endpoint(
    State(state): State<TransactionState>,
    Extension(user_id): Extension<UserId>,
    Path((kind, template_id)): Path<(TransactionKind, TransactionId)>,
) -> Result<Json<Vec<OccurrenceView>>, Error> {
    get_template_history(&state.store, user_id, kind, template_id).map(Json)
}
