use std::time::Duration;

use tracing::{info, warn};

use super::{PipelineContext, PipelineJob};
use crate::error::Result;
use crate::models::job::Stage;

/// Bounded retry keyed on the durable `attempts` counter of a stage row, so
/// transport redeliveries never reset the budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    RetryAfter(Duration),
    GiveUp,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
            max_delay,
        }
    }

    /// Decide what to do after attempt number `attempts` (1-based) failed.
    pub fn decide(&self, attempts: i32) -> RetryDecision {
        if attempts < self.max_attempts as i32 {
            RetryDecision::RetryAfter(self.backoff(attempts.max(1) as u32))
        } else {
            RetryDecision::GiveUp
        }
    }

    /// `base * 2^(attempt - 1)`, capped at `max_delay`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

/// Either put the stage back to Pending and requeue its job after the backoff,
/// or mark the stage Failed. Returns the decision taken.
pub async fn requeue_or_fail(
    ctx: &PipelineContext,
    job: &PipelineJob,
    stage: Stage,
    attempts: i32,
    policy: &RetryPolicy,
    error: &str,
) -> Result<RetryDecision> {
    let video_id = job.video_id();
    let decision = policy.decide(attempts);

    match decision {
        RetryDecision::RetryAfter(delay) => {
            ctx.ledger.requeue_job(video_id, stage, error).await?;
            ctx.queue.enqueue_delayed(job, delay).await?;
            metrics::counter!("pipeline_stage_retried_total", "stage" => job.kind()).increment(1);
            info!(
                video_id = %video_id,
                stage = %stage,
                attempts,
                delay_ms = delay.as_millis() as u64,
                "Stage re-queued for retry"
            );
        }
        RetryDecision::GiveUp => {
            ctx.ledger.fail_job(video_id, stage, error).await?;
            super::record_failed(job.kind());
            warn!(
                video_id = %video_id,
                stage = %stage,
                attempts,
                "Stage failed after max attempts"
            );
        }
    }

    Ok(decision)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> RetryPolicy {
        RetryPolicy::new(3, Duration::from_millis(500), Duration::from_secs(3))
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let p = policy();
        assert_eq!(p.backoff(1), Duration::from_millis(500));
        assert_eq!(p.backoff(2), Duration::from_millis(1000));
        assert_eq!(p.backoff(3), Duration::from_millis(2000));
        assert_eq!(p.backoff(4), Duration::from_secs(3));
        assert_eq!(p.backoff(40), Duration::from_secs(3));
    }

    #[test]
    fn test_decide_gives_up_at_cap() {
        let p = policy();
        assert_eq!(p.decide(1), RetryDecision::RetryAfter(Duration::from_millis(500)));
        assert_eq!(p.decide(2), RetryDecision::RetryAfter(Duration::from_millis(1000)));
        assert_eq!(p.decide(3), RetryDecision::GiveUp);
        assert_eq!(p.decide(7), RetryDecision::GiveUp);
    }
}
