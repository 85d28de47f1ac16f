use std::future::Future;
use std::pin::pin;

use futures::{StreamExt, stream};
use tokio::time::{Instant, sleep_until};

/// Drives `count` jobs with at most `max_concurrency` in flight until they
/// all finish or `deadline` passes.
///
/// Results are stored by job index so the output never depends on completion
/// order. Jobs still pending at the deadline are dropped and left as `None`;
/// the returned flag reports whether that happened.
pub(crate) async fn run_until_deadline<T, F, Fut>(
    count: usize,
    max_concurrency: usize,
    deadline: Instant,
    job: F,
) -> (Vec<Option<T>>, bool)
where
    F: Fn(usize) -> Fut,
    Fut: Future<Output = T>,
{
    let mut results: Vec<Option<T>> = std::iter::repeat_with(|| None).take(count).collect();
    if count == 0 {
        return (results, false);
    }

    let mut pending = pin!(
        stream::iter(0..count)
            .map(|idx| {
                let fut = job(idx);
                async move { (idx, fut.await) }
            })
            .buffer_unordered(max_concurrency.max(1))
    );
    let mut expired = pin!(sleep_until(deadline));

    loop {
        tokio::select! {
            next = pending.next() => match next {
                Some((idx, value)) => results[idx] = Some(value),
                None => return (results, false),
            },
            _ = &mut expired => return (results, true),
        }
    }
}
