//! Savings goals: a target amount the user is saving towards, optionally by a deadline.

use std::{
    fmt::Display,
    str::FromStr,
    sync::{Arc, Mutex},
};

use axum::{
    Extension, Json,
    extract::{FromRef, Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use rusqlite::{
    Connection, Row, ToSql,
    types::{FromSql, FromSqlError, FromSqlResult, ToSqlOutput, ValueRef},
};
use serde::{Deserialize, Serialize};
use time::Date;

use crate::{
    AppState, Error,
    database_id::{DatabaseId, UserId},
    date::parse_date,
    transaction::{nullable, validate_value},
};

/// Database identifier for a savings goal.
pub type GoalId = DatabaseId;

/// Where a goal is at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GoalStatus {
    /// Still being saved for.
    #[default]
    Active,
    /// The target has been reached.
    Completed,
    /// Set aside for now.
    Paused,
}

impl GoalStatus {
    fn as_str(self) -> &'static str {
        match self {
            GoalStatus::Active => "active",
            GoalStatus::Completed => "completed",
            GoalStatus::Paused => "paused",
        }
    }
}

impl Display for GoalStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GoalStatus {
    type Err = String;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        match text {
            "active" => Ok(GoalStatus::Active),
            "completed" => Ok(GoalStatus::Completed),
            "paused" => Ok(GoalStatus::Paused),
            other => Err(format!("\"{other}\" is not a goal status")),
        }
    }
}

impl ToSql for GoalStatus {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(self.as_str().into())
    }
}

impl FromSql for GoalStatus {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value
            .as_str()?
            .parse()
            .map_err(|error: String| FromSqlError::Other(error.into()))
    }
}

/// An amount of money a user is saving towards.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Goal {
    /// The goal's id.
    pub id: GoalId,
    /// The user that owns the goal.
    pub user_id: UserId,
    /// A short name, never empty.
    pub name: String,
    /// Free-form notes.
    pub description: Option<String>,
    /// The amount to save.
    pub target: f64,
    /// The amount saved so far.
    pub saved: f64,
    /// The date the goal should be reached by.
    pub deadline: Option<Date>,
    /// Where the goal is at.
    pub status: GoalStatus,
}

/// The fields needed to create a goal. New goals start active with nothing saved.
#[derive(Debug, Clone, PartialEq)]
pub struct NewGoal {
    /// A short name, never empty.
    pub name: String,
    /// Free-form notes.
    pub description: Option<String>,
    /// The amount to save, positive.
    pub target: f64,
    /// The date the goal should be reached by.
    pub deadline: Option<Date>,
}

/// Changes to a goal. Absent fields are left as is.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GoalPatch {
    /// A new name.
    pub name: Option<String>,
    /// A new description, or `Some(None)` to clear it.
    pub description: Option<Option<String>>,
    /// A new target amount.
    pub target: Option<f64>,
    /// A new deadline, or `Some(None)` to clear it.
    pub deadline: Option<Option<Date>>,
    /// A new status.
    pub status: Option<GoalStatus>,
}

fn validate_name(name: &str) -> Result<String, Error> {
    let name = name.trim();

    if name.is_empty() {
        Err(Error::EmptyGoalName)
    } else {
        Ok(name.to_owned())
    }
}

/// The state needed for the goal handlers.
#[derive(Debug, Clone)]
pub struct GoalState {
    /// The database connection.
    pub db_connection: Arc<Mutex<Connection>>,
}

impl FromRef<AppState> for GoalState {
    fn from_ref(state: &AppState) -> Self {
        Self {
            db_connection: state.db_connection.clone(),
        }
    }
}

impl GoalState {
    fn connection(&self) -> Result<std::sync::MutexGuard<'_, Connection>, Error> {
        self.db_connection
            .lock()
            .map_err(|_| Error::DatabaseLockError)
    }
}

/// The request body for creating a goal.
#[derive(Debug, Deserialize)]
pub struct GoalData {
    /// A short name, never empty.
    pub name: String,
    /// Free-form notes.
    pub description: Option<String>,
    /// The amount to save.
    pub target: f64,
    /// A `YYYY-MM-DD` date.
    pub deadline: Option<String>,
}

impl TryFrom<GoalData> for NewGoal {
    type Error = Error;

    fn try_from(data: GoalData) -> Result<Self, Self::Error> {
        Ok(NewGoal {
            name: data.name,
            description: data.description,
            target: data.target,
            deadline: data.deadline.as_deref().map(parse_date).transpose()?,
        })
    }
}

/// The request body for updating a goal.
#[derive(Debug, Default, Deserialize)]
pub struct GoalUpdateData {
    /// A new name.
    pub name: Option<String>,
    /// A new description, or null to clear it.
    #[serde(default, deserialize_with = "nullable")]
    pub description: Option<Option<String>>,
    /// A new target amount.
    pub target: Option<f64>,
    /// A new `YYYY-MM-DD` deadline, or null to clear it.
    #[serde(default, deserialize_with = "nullable")]
    pub deadline: Option<Option<String>>,
    /// A new status.
    pub status: Option<GoalStatus>,
}

impl TryFrom<GoalUpdateData> for GoalPatch {
    type Error = Error;

    fn try_from(data: GoalUpdateData) -> Result<Self, Self::Error> {
        let deadline = match data.deadline {
            Some(Some(text)) => Some(Some(parse_date(&text)?)),
            Some(None) => Some(None),
            None => None,
        };

        Ok(GoalPatch {
            name: data.name,
            description: data.description,
            target: data.target,
            deadline,
            status: data.status,
        })
    }
}

/// The request body for adding to the amount saved.
#[derive(Debug, Deserialize)]
pub struct SavingsData {
    /// The amount to add, positive.
    pub amount: f64,
}

/// A route handler for listing the user's goals, newest first.
pub async fn get_goals_endpoint(
    State(state): State<GoalState>,
    Extension(user_id): Extension<UserId>,
) -> Result<impl IntoResponse, Error> {
    let goals = get_goals(user_id, &*state.connection()?)?;

    Ok(Json(goals))
}

/// A route handler for creating a goal, responds with the created goal.
pub async fn create_goal_endpoint(
    State(state): State<GoalState>,
    Extension(user_id): Extension<UserId>,
    Json(data): Json<GoalData>,
) -> Result<impl IntoResponse, Error> {
    let new_goal = NewGoal::try_from(data)?;
    let goal = create_goal(user_id, new_goal, &*state.connection()?)?;

    Ok((StatusCode::CREATED, Json(goal)))
}

/// A route handler for updating a goal, responds with the updated goal.
pub async fn update_goal_endpoint(
    State(state): State<GoalState>,
    Extension(user_id): Extension<UserId>,
    Path(goal_id): Path<GoalId>,
    Json(data): Json<GoalUpdateData>,
) -> Result<impl IntoResponse, Error> {
    let patch = GoalPatch::try_from(data)?;
    let goal = update_goal(user_id, goal_id, &patch, &*state.connection()?)?;

    Ok(Json(goal))
}

/// A route handler for deleting a goal.
pub async fn delete_goal_endpoint(
    State(state): State<GoalState>,
    Extension(user_id): Extension<UserId>,
    Path(goal_id): Path<GoalId>,
) -> Result<impl IntoResponse, Error> {
    delete_goal(user_id, goal_id, &*state.connection()?)?;

    Ok(StatusCode::NO_CONTENT)
}

/// A route handler for adding money to a goal, responds with the updated goal.
pub async fn add_to_goal_endpoint(
    State(state): State<GoalState>,
    Extension(user_id): Extension<UserId>,
    Path(goal_id): Path<GoalId>,
    Json(data): Json<SavingsData>,
) -> Result<impl IntoResponse, Error> {
    let goal = add_to_goal(user_id, goal_id, data.amount, &*state.connection()?)?;

    Ok(Json(goal))
}

const GOAL_COLUMNS: &str = "id, user_id, name, description, target, saved, deadline, status";

/// Create a goal in the database.
///
/// # Errors
/// This function will return a:
/// - [Error::EmptyGoalName] if the name is empty or only whitespace,
/// - [Error::InvalidAmount] if the target is not a positive number,
/// - or [Error::SqlError] if there is some other SQL error.
pub fn create_goal(
    user_id: UserId,
    new_goal: NewGoal,
    connection: &Connection,
) -> Result<Goal, Error> {
    let name = validate_name(&new_goal.name)?;
    validate_value(new_goal.target)?;

    connection.execute(
        "INSERT INTO goal (user_id, name, description, target, deadline)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        (
            user_id,
            &name,
            &new_goal.description,
            new_goal.target,
            new_goal.deadline,
        ),
    )?;

    get_goal(user_id, connection.last_insert_rowid(), connection)
}

/// Get one of the user's goals.
///
/// # Errors
/// Returns [Error::NotFound] if the user has no goal with `goal_id`.
pub fn get_goal(user_id: UserId, goal_id: GoalId, connection: &Connection) -> Result<Goal, Error> {
    connection
        .prepare(&format!(
            "SELECT {GOAL_COLUMNS} FROM goal WHERE id = ?1 AND user_id = ?2"
        ))?
        .query_row((goal_id, user_id), map_row)
        .map_err(Error::from)
}

/// Get the user's goals, newest first.
pub fn get_goals(user_id: UserId, connection: &Connection) -> Result<Vec<Goal>, Error> {
    connection
        .prepare(&format!(
            "SELECT {GOAL_COLUMNS} FROM goal WHERE user_id = ?1 ORDER BY id DESC"
        ))?
        .query_map([user_id], map_row)?
        .map(|maybe_goal| maybe_goal.map_err(Error::from))
        .collect()
}

/// Apply `patch` to one of the user's goals and return the result.
///
/// # Errors
/// This function will return a:
/// - [Error::UpdateMissingGoal] if the user has no goal with `goal_id`,
/// - [Error::EmptyGoalName] or [Error::InvalidAmount] if the patch holds an invalid value,
/// - or [Error::SqlError] if there is some other SQL error.
pub fn update_goal(
    user_id: UserId,
    goal_id: GoalId,
    patch: &GoalPatch,
    connection: &Connection,
) -> Result<Goal, Error> {
    let current = match get_goal(user_id, goal_id, connection) {
        Ok(goal) => goal,
        Err(Error::NotFound) => return Err(Error::UpdateMissingGoal),
        Err(error) => return Err(error),
    };

    let name = match &patch.name {
        Some(name) => validate_name(name)?,
        None => current.name,
    };
    let target = patch.target.unwrap_or(current.target);
    validate_value(target)?;
    let description = patch.description.clone().unwrap_or(current.description);
    let deadline = patch.deadline.unwrap_or(current.deadline);
    let status = patch.status.unwrap_or(current.status);

    connection.execute(
        "UPDATE goal SET name = ?1, description = ?2, target = ?3, deadline = ?4, status = ?5
         WHERE id = ?6 AND user_id = ?7",
        (
            &name,
            &description,
            target,
            deadline,
            status,
            goal_id,
            user_id,
        ),
    )?;

    get_goal(user_id, goal_id, connection)
}

/// Add `amount` to what has been saved towards a goal.
///
/// # Errors
/// This function will return a:
/// - [Error::InvalidAmount] if `amount` is not a positive number,
/// - [Error::UpdateMissingGoal] if the user has no goal with `goal_id`,
/// - or [Error::SqlError] if there is some other SQL error.
pub fn add_to_goal(
    user_id: UserId,
    goal_id: GoalId,
    amount: f64,
    connection: &Connection,
) -> Result<Goal, Error> {
    validate_value(amount)?;

    let rows_affected = connection.execute(
        "UPDATE goal SET saved = saved + ?1 WHERE id = ?2 AND user_id = ?3",
        (amount, goal_id, user_id),
    )?;

    if rows_affected == 0 {
        return Err(Error::UpdateMissingGoal);
    }

    get_goal(user_id, goal_id, connection)
}

/// Delete one of the user's goals.
///
/// # Errors
/// Returns [Error::DeleteMissingGoal] if the user has no goal with `goal_id`.
pub fn delete_goal(user_id: UserId, goal_id: GoalId, connection: &Connection) -> Result<(), Error> {
    let rows_affected = connection.execute(
        "DELETE FROM goal WHERE id = ?1 AND user_id = ?2",
        (goal_id, user_id),
    )?;

    if rows_affected == 0 {
        return Err(Error::DeleteMissingGoal);
    }

    Ok(())
}

/// Initialize the goal table.
pub fn create_goal_table(connection: &Connection) -> Result<(), rusqlite::Error> {
    connection.execute_batch(
        "CREATE TABLE IF NOT EXISTS goal (
            id INTEGER PRIMARY KEY,
            user_id INTEGER NOT NULL,
            name TEXT NOT NULL,
            description TEXT,
            target REAL NOT NULL CHECK (target > 0),
            saved REAL NOT NULL DEFAULT 0,
            deadline TEXT,
            status TEXT NOT NULL DEFAULT 'active'
        );

        CREATE INDEX IF NOT EXISTS idx_goal_user ON goal(user_id);",
    )?;

    Ok(())
}

fn map_row(row: &Row) -> Result<Goal, rusqlite::Error> {
    Ok(Goal {
        id: row.get(0)?,
        user_id: row.get(1)?,
        name: row.get(2)?,
        description: row.get(3)?,
        target: row.get(4)?,
        saved: row.get(5)?,
        deadline: row.get(6)?,
        status: row.get(7)?,
    })
}

#[cfg(test)]
mod goal_query_tests {
    use rusqlite::Connection;
    use time::macros::date;

    use crate::{Error, db::initialize};

    use super::{
        GoalPatch, GoalStatus, NewGoal, add_to_goal, create_goal, delete_goal, get_goal,
        get_goals, update_goal,
    };

    fn get_test_db_connection() -> Connection {
        let connection = Connection::open_in_memory().unwrap();
        initialize(&connection).unwrap();
        connection
    }

    fn new_goal(name: &str, target: f64) -> NewGoal {
        NewGoal {
            name: name.to_owned(),
            description: None,
            target,
            deadline: None,
        }
    }

    #[test]
    fn create_goal_starts_active_with_nothing_saved() {
        let connection = get_test_db_connection();
        let goal = NewGoal {
            deadline: Some(date!(2025 - 12 - 31)),
            ..new_goal("  Holiday  ", 3000.0)
        };

        let created = create_goal(1, goal, &connection).unwrap();

        assert_eq!(created.name, "Holiday");
        assert_eq!(created.saved, 0.0);
        assert_eq!(created.status, GoalStatus::Active);
        assert_eq!(created.deadline, Some(date!(2025 - 12 - 31)));
        assert_eq!(get_goal(1, created.id, &connection), Ok(created));
    }

    #[test]
    fn create_goal_rejects_bad_input() {
        let connection = get_test_db_connection();

        assert_eq!(
            create_goal(1, new_goal(" ", 10.0), &connection),
            Err(Error::EmptyGoalName)
        );
        assert_eq!(
            create_goal(1, new_goal("Car", 0.0), &connection),
            Err(Error::InvalidAmount(0.0))
        );
    }

    #[test]
    fn get_goals_lists_newest_first_for_one_user() {
        let connection = get_test_db_connection();
        let first = create_goal(1, new_goal("Car", 10_000.0), &connection).unwrap();
        let second = create_goal(1, new_goal("House", 90_000.0), &connection).unwrap();
        create_goal(2, new_goal("Boat", 5_000.0), &connection).unwrap();

        let goals = get_goals(1, &connection).unwrap();

        assert_eq!(goals, vec![second, first]);
    }

    #[test]
    fn update_goal_changes_only_given_fields() {
        let connection = get_test_db_connection();
        let goal = create_goal(
            1,
            NewGoal {
                description: Some("A new car".to_owned()),
                deadline: Some(date!(2026 - 01 - 01)),
                ..new_goal("Car", 10_000.0)
            },
            &connection,
        )
        .unwrap();
        let patch = GoalPatch {
            target: Some(12_000.0),
            deadline: Some(None),
            status: Some(GoalStatus::Paused),
            ..Default::default()
        };

        let updated = update_goal(1, goal.id, &patch, &connection).unwrap();

        assert_eq!(updated.name, "Car");
        assert_eq!(updated.description.as_deref(), Some("A new car"));
        assert_eq!(updated.target, 12_000.0);
        assert_eq!(updated.deadline, None);
        assert_eq!(updated.status, GoalStatus::Paused);
    }

    #[test]
    fn update_goal_of_other_user_fails() {
        let connection = get_test_db_connection();
        let goal = create_goal(1, new_goal("Car", 10_000.0), &connection).unwrap();

        let result = update_goal(2, goal.id, &GoalPatch::default(), &connection);

        assert_eq!(result, Err(Error::UpdateMissingGoal));
    }

    #[test]
    fn add_to_goal_accumulates_savings() {
        let connection = get_test_db_connection();
        let goal = create_goal(1, new_goal("Car", 10_000.0), &connection).unwrap();

        add_to_goal(1, goal.id, 250.0, &connection).unwrap();
        let updated = add_to_goal(1, goal.id, 100.5, &connection).unwrap();

        assert_eq!(updated.saved, 350.5);
    }

    #[test]
    fn add_to_goal_rejects_bad_amounts_and_missing_goals() {
        let connection = get_test_db_connection();
        let goal = create_goal(1, new_goal("Car", 10_000.0), &connection).unwrap();

        assert_eq!(
            add_to_goal(1, goal.id, -5.0, &connection),
            Err(Error::InvalidAmount(-5.0))
        );
        assert_eq!(
            add_to_goal(1, goal.id + 1, 5.0, &connection),
            Err(Error::UpdateMissingGoal)
        );
    }

    #[test]
    fn delete_goal_removes_goal() {
        let connection = get_test_db_connection();
        let goal = create_goal(1, new_goal("Car", 10_000.0), &connection).unwrap();

        assert_eq!(delete_goal(2, goal.id, &connection), Err(Error::DeleteMissingGoal));
        assert_eq!(delete_goal(1, goal.id, &connection), Ok(()));
        assert_eq!(get_goal(1, goal.id, &connection), Err(Error::NotFound));
        assert!(get_goals(1, &connection).unwrap().is_empty());
    }
}
