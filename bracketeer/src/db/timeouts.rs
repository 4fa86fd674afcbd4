//! Time budgets for storage calls
//!
//! Every unit of work runs under a deadline so a stuck lock or connection
//! surfaces as an error instead of hanging a sweep.

use crate::error::{CoreError, CoreResult};
use std::time::Duration;
use tokio::time::timeout;

/// Default timeout for single queries such as the health check (5 seconds)
pub const DEFAULT_QUERY_TIMEOUT: Duration = Duration::from_secs(5);

/// Default timeout for a unit of work (10 seconds)
pub const DEFAULT_TRANSACTION_TIMEOUT: Duration = Duration::from_secs(10);

/// Execute a storage operation with timeout
///
/// # Arguments
///
/// * `duration` - Timeout duration
/// * `future` - Async operation to execute
///
/// # Returns
///
/// * `CoreResult<T>` - Result, or `CoreError::Timeout` when the budget ran out
///
/// # Example
///
/// ```no_run
/// use bracketeer::db::timeouts::{with_timeout, DEFAULT_QUERY_TIMEOUT};
/// # use sqlx::PgPool;
/// # async fn example(pool: &PgPool) -> bracketeer::CoreResult<()> {
///
/// let row = with_timeout(
///     DEFAULT_QUERY_TIMEOUT,
///     sqlx::query("SELECT id FROM brackets WHERE tournament_id = $1")
///         .bind(1_i64)
///         .fetch_optional(pool),
/// )
/// .await?;
///
/// # Ok(())
/// # }
/// ```
pub async fn with_timeout<F, T, E>(duration: Duration, future: F) -> CoreResult<T>
where
    F: std::future::Future<Output = Result<T, E>>,
    E: Into<CoreError>,
{
    match timeout(duration, future).await {
        Ok(result) => result.map_err(Into::into),
        Err(_) => Err(CoreError::Timeout(duration)),
    }
}
