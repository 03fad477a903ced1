//! Database ID type definitions.

/// Alias for the integer type used for mapping to database IDs.
pub type DatabaseId = i64;

/// Database identifier for an income or expense row, template or concrete.
pub type TransactionId = DatabaseId;

/// Database identifier for the user that owns a row.
pub type UserId = DatabaseId;
