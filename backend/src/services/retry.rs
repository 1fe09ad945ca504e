//! Transaction re-entry on write-write conflicts

use std::future::Future;

use crate::error::{AppError, AppResult};

/// Run `attempt` until it succeeds, fails for another reason, or has
/// conflicted `retries + 1` times.
///
/// Each attempt must open and commit its own transaction.
pub async fn retry_on_conflict<T, F, Fut>(
    retries: u32,
    resource: &str,
    mut attempt: F,
) -> AppResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = AppResult<T>>,
{
    let mut conflicts = 0;
    loop {
        match attempt().await {
            Err(err) if err.is_conflict() => {
                conflicts += 1;
                if conflicts > retries {
                    tracing::warn!(resource, conflicts, "Giving up after repeated write conflicts");
                    return Err(AppError::ConcurrentMutationConflict(resource.to_string()));
                }
                tracing::warn!(resource, conflicts, error = %err, "Write conflict, re-running transaction");
            }
            result => return result,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn conflict() -> AppError {
        AppError::ConcurrentMutationConflict("Part".to_string())
    }

    #[test]
    fn test_success_is_returned_immediately() {
        let calls = Cell::new(0);
        let result = tokio_test::block_on(retry_on_conflict(1, "Part", || {
            calls.set(calls.get() + 1);
            async { Ok::<_, AppError>(7) }
        }));

        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn test_one_conflict_is_retried() {
        let calls = Cell::new(0);
        let result = tokio_test::block_on(retry_on_conflict(1, "Part", || {
            calls.set(calls.get() + 1);
            let n = calls.get();
            async move {
                if n == 1 {
                    Err(conflict())
                } else {
                    Ok(n)
                }
            }
        }));

        assert_eq!(result.unwrap(), 2);
    }

    #[test]
    fn test_persistent_conflict_surfaces_as_transient_error() {
        let calls = Cell::new(0);
        let result: AppResult<()> = tokio_test::block_on(retry_on_conflict(1, "Part", || {
            calls.set(calls.get() + 1);
            async { Err(conflict()) }
        }));

        assert!(matches!(result, Err(AppError::ConcurrentMutationConflict(_))));
        assert_eq!(calls.get(), 2);
    }

    #[test]
    fn test_other_errors_are_not_retried() {
        let calls = Cell::new(0);
        let result: AppResult<()> = tokio_test::block_on(retry_on_conflict(3, "Part", || {
            calls.set(calls.get() + 1);
            async { Err(AppError::NotFound("Part".to_string())) }
        }));

        assert!(matches!(result, Err(AppError::NotFound(_))));
        assert_eq!(calls.get(), 1);
    }
}
