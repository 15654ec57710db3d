//! Per-day document sequences for order and test numbers

use chrono::NaiveDate;
use sqlx::PgConnection;

use crate::error::{AppError, AppResult};

/// Sequence key for order numbers
pub const ORDER_SEQUENCE: &str = "order";
/// Sequence key for test numbers
pub const TEST_SEQUENCE: &str = "test";

/// Draw the next value of the `(prefix, day)` sequence.
///
/// A single upsert increments and returns the counter, so concurrent callers
/// never observe the same value. Running it on the caller's transaction ties
/// the increment to the document insert.
pub async fn next_value(conn: &mut PgConnection, prefix: &str, day: NaiveDate) -> AppResult<u32> {
    let value = sqlx::query_scalar::<_, i32>(
        r#"
        INSERT INTO document_sequences (prefix, day, last_value)
        VALUES ($1, $2, 1)
        ON CONFLICT (prefix, day)
        DO UPDATE SET last_value = document_sequences.last_value + 1
        RETURNING last_value
        "#,
    )
    .bind(prefix)
    .bind(day)
    .fetch_one(conn)
    .await?;

    u32::try_from(value)
        .map_err(|_| AppError::Internal(format!("Sequence {} produced {}", prefix, value)))
}
