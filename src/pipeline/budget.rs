use std::future::Future;
use std::time::Duration;

use tokio::time::{Instant, sleep, timeout_at};
use tracing::debug;

use crate::config::CallBudget;
use crate::error::PharmyrusError;

fn retry_sleep_duration(attempt: u32) -> Duration {
    let backoff_ms = 100_u64.saturating_mul(2_u64.saturating_pow(attempt));
    Duration::from_millis(backoff_ms)
}

fn timeout_error(api: &str, budget: CallBudget) -> PharmyrusError {
    PharmyrusError::UpstreamTimeout {
        api: api.to_string(),
        timeout_ms: budget.timeout.as_millis() as u64,
    }
}

/// Runs `op` under `budget`: each attempt is cut off after `budget.timeout`
/// (or at `deadline`, whichever comes first) and upstream failures are
/// retried with exponential backoff until the attempts run out.
///
/// Non-upstream errors (bad input, not found) are returned immediately.
pub(crate) async fn call_with_budget<T, F, Fut>(
    api: &str,
    budget: CallBudget,
    deadline: Instant,
    mut op: F,
) -> Result<T, PharmyrusError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, PharmyrusError>>,
{
    let mut last_err: Option<PharmyrusError> = None;

    for attempt in 0..budget.attempts {
        let now = Instant::now();
        if now >= deadline {
            break;
        }
        let attempt_deadline = (now + budget.timeout).min(deadline);

        match timeout_at(attempt_deadline, op()).await {
            Ok(Ok(value)) => return Ok(value),
            Ok(Err(err)) if !err.is_upstream() => return Err(err),
            Ok(Err(err)) => {
                debug!(source = api, attempt, "upstream call failed: {err}");
                last_err = Some(err);
            }
            Err(_) => {
                debug!(source = api, attempt, "upstream call timed out");
                last_err = Some(timeout_error(api, budget));
            }
        }

        if attempt + 1 < budget.attempts {
            let pause = retry_sleep_duration(attempt);
            if Instant::now() + pause >= deadline {
                break;
            }
            sleep(pause).await;
        }
    }

    Err(last_err.unwrap_or_else(|| timeout_error(api, budget)))
}
