use std::{future::Future, time::Duration};

use tokio_util::sync::CancellationToken;

#[derive(Debug, thiserror::Error)]
pub enum PollError<E> {
    /// The cancellation token fired before the condition was met.
    #[error("timed out waiting for the condition")]
    Cancelled,
    /// The condition check itself failed.
    #[error(transparent)]
    Check(E),
}

/// Evaluates `check` now and then every `interval` until it returns `Ok(Some(_))`,
/// and returns that value.
///
/// A check error aborts the wait immediately. There is no attempt limit;
/// the wait only ends early when `cancel` fires, which is observed between checks.
pub async fn await_condition<T, F, Fut, E>(
    interval: Duration,
    cancel: &CancellationToken,
    mut check: F,
) -> Result<T, PollError<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Option<T>, E>>,
{
    loop {
        if let Some(value) = check().await.map_err(PollError::Check)? {
            return Ok(value);
        }

        tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(PollError::Cancelled),
            () = tokio::time::sleep(interval) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{
        convert::Infallible,
        sync::atomic::{AtomicUsize, Ordering},
    };

    use tokio::time::Instant;

    use super::*;

    const INTERVAL: Duration = Duration::from_millis(200);

    #[tokio::test(start_paused = true)]
    async fn done_on_third_check() {
        let calls = AtomicUsize::new(0);
        let mut seen = Vec::new();
        let start = Instant::now();

        let done = await_condition(INTERVAL, &CancellationToken::new(), || {
            seen.push(start.elapsed());
            let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
            async move { Ok::<_, Infallible>((n == 3).then_some(n)) }
        })
        .await
        .unwrap();

        assert_eq!(done, 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(seen[0], Duration::ZERO);
        for pair in seen.windows(2) {
            assert!(pair[1] - pair[0] >= INTERVAL);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn check_error_aborts() {
        let calls = AtomicUsize::new(0);
        let err = await_condition(INTERVAL, &CancellationToken::new(), || {
            let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
            async move {
                if n == 2 {
                    Err("pods \"registry\" is forbidden")
                } else {
                    Ok(None::<()>)
                }
            }
        })
        .await
        .unwrap_err();

        assert!(matches!(err, PollError::Check("pods \"registry\" is forbidden")));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn already_cancelled_stops_after_first_check() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let calls = AtomicUsize::new(0);
        let start = Instant::now();

        let err = await_condition(INTERVAL, &cancel, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Ok::<Option<()>, Infallible>(None) }
        })
        .await
        .unwrap_err();

        assert!(matches!(err, PollError::Cancelled));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(start.elapsed() < INTERVAL);
    }

    #[tokio::test(start_paused = true)]
    async fn stops_within_one_interval_of_cancellation() {
        let cancel = CancellationToken::new();
        let deadline = Duration::from_millis(500);
        tokio::spawn({
            let cancel = cancel.clone();
            async move {
                tokio::time::sleep(deadline).await;
                cancel.cancel();
            }
        });
        let start = Instant::now();

        let err = await_condition(INTERVAL, &cancel, || async { Ok::<Option<()>, Infallible>(None) })
            .await
            .unwrap_err();

        assert!(matches!(err, PollError::Cancelled));
        let elapsed = start.elapsed();
        assert!(elapsed >= deadline);
        assert!(elapsed < deadline + INTERVAL);
    }
}
