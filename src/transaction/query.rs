//! An immutable description of which income/expense rows to load.

use rusqlite::types::Value;

use crate::{
    category::CategoryId,
    database_id::{TransactionId, UserId},
    date::DateRange,
};

use super::domain::{RowRole, Transaction, TransactionKind};

/// The columns selected for every row, in the order `map_transaction_row` reads them.
///
/// `t` is the income or expense table and `c` the joined category.
pub(crate) const TRANSACTION_COLUMNS: &str = "t.id, t.user_id, t.description, t.value, t.date, \
     t.category_id, t.is_fixed, t.recurrence_type, t.start_date, t.end_date, \
     t.linked_template_id, c.name";

/// Rows that may be occurrences of one template: linked to it, or unlinked
/// with the same description and category.
///
/// The amount is compared after loading since it is stored as a float.
#[derive(Debug, Clone, PartialEq)]
pub struct TemplateCandidates {
    /// The template whose occurrences are searched for.
    pub template_id: TransactionId,
    /// The template's description.
    pub description: Option<String>,
    /// The template's category.
    pub category_id: Option<CategoryId>,
}

/// Defines which rows [TransactionStore::find_transactions](super::store::TransactionStore::find_transactions)
/// returns.
///
/// Build one with [TransactionQuery::concrete] or [TransactionQuery::templates]
/// and narrow it with the other methods. Each method returns a new query.
/// Rows are always owned by the query's user and ordered by date, then id.
#[derive(Debug, Clone, PartialEq)]
pub struct TransactionQuery {
    user_id: UserId,
    kind: TransactionKind,
    role: RowRole,
    date_range: Option<DateRange>,
    active_during: Option<DateRange>,
    candidates: Option<TemplateCandidates>,
    linked_only: bool,
}

impl TransactionQuery {
    /// Every concrete row of `kind` owned by `user_id`.
    pub fn concrete(user_id: UserId, kind: TransactionKind) -> Self {
        Self::new(user_id, kind, RowRole::Concrete)
    }

    /// Every template of `kind` owned by `user_id`.
    pub fn templates(user_id: UserId, kind: TransactionKind) -> Self {
        Self::new(user_id, kind, RowRole::Template)
    }

    fn new(user_id: UserId, kind: TransactionKind, role: RowRole) -> Self {
        Self {
            user_id,
            kind,
            role,
            date_range: None,
            active_during: None,
            candidates: None,
            linked_only: false,
        }
    }

    /// Only rows booked within `range`.
    pub fn in_range(self, range: DateRange) -> Self {
        Self {
            date_range: Some(range),
            ..self
        }
    }

    /// Only templates whose schedule intersects `window`: started on or
    /// before its end and not ended before its start.
    ///
    /// Has no effect on concrete rows.
    pub fn active_during(self, window: DateRange) -> Self {
        Self {
            active_during: Some(window),
            ..self
        }
    }

    /// Only rows that may be occurrences of `template`.
    pub fn candidates_for(self, template: &Transaction) -> Self {
        Self {
            candidates: Some(TemplateCandidates {
                template_id: template.id,
                description: template.description.clone(),
                category_id: template.category_id,
            }),
            ..self
        }
    }

    /// Only rows linked to some template.
    pub fn linked_only(self) -> Self {
        Self {
            linked_only: true,
            ..self
        }
    }

    /// The owner of the queried rows.
    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    /// The table the query reads.
    pub fn kind(&self) -> TransactionKind {
        self.kind
    }

    /// Whether templates or concrete rows are queried.
    pub fn role(&self) -> RowRole {
        self.role
    }

    /// The SQL statement and its positional parameters.
    pub(crate) fn to_sql(&self) -> (String, Vec<Value>) {
        let mut where_clause_parts = vec!["t.user_id = ?1".to_owned(), "t.is_fixed = ?2".to_owned()];
        let mut parameters = vec![
            Value::Integer(self.user_id),
            Value::Integer(self.role.is_fixed() as i64),
        ];

        if let Some(range) = self.date_range {
            where_clause_parts.push(format!(
                "t.date BETWEEN ?{} AND ?{}",
                parameters.len() + 1,
                parameters.len() + 2
            ));
            parameters.push(Value::Text(range.start.to_string()));
            parameters.push(Value::Text(range.end.to_string()));
        }

        if let (Some(window), RowRole::Template) = (self.active_during, self.role) {
            where_clause_parts.push(format!(
                "t.start_date <= ?{} AND (t.end_date IS NULL OR t.end_date >= ?{})",
                parameters.len() + 1,
                parameters.len() + 2
            ));
            parameters.push(Value::Text(window.end.to_string()));
            parameters.push(Value::Text(window.start.to_string()));
        }

        if let Some(candidates) = &self.candidates {
            let first = parameters.len() + 1;
            where_clause_parts.push(format!(
                "(t.linked_template_id = ?{first} OR (t.linked_template_id IS NULL \
                 AND t.description IS ?{} AND t.category_id IS ?{}))",
                first + 1,
                first + 2
            ));
            parameters.push(Value::Integer(candidates.template_id));
            parameters.push(
                candidates
                    .description
                    .clone()
                    .map(Value::Text)
                    .unwrap_or(Value::Null),
            );
            parameters.push(
                candidates
                    .category_id
                    .map(Value::Integer)
                    .unwrap_or(Value::Null),
            );
        }

        if self.linked_only {
            where_clause_parts.push("t.linked_template_id IS NOT NULL".to_owned());
        }

        // Sort by date, and then ID to keep the order stable after updates
        let sql = format!(
            "SELECT {TRANSACTION_COLUMNS} FROM {} t \
             LEFT JOIN category c ON t.category_id = c.id \
             WHERE {} \
             ORDER BY t.date ASC, t.id ASC",
            self.kind.table_name(),
            where_clause_parts.join(" AND ")
        );

        (sql, parameters)
    }
}
