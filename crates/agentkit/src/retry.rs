//! Endpoint fallback for idempotent reads, and the bounded wait used for confirmations.
//!
//! Nothing in here is used for broadcasts: a rejected submission is reported, never replayed.

use std::convert::Infallible;
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone)]
pub struct BackoffConfig {
    /// Number of full rounds. Each round tries every endpoint once.
    pub rounds: usize,
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Random jitter (`0..=jitter_max_ms`) added to each backoff sleep.
    pub jitter_max_ms: u64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            rounds: 3,
            base_delay: Duration::from_millis(400),
            max_delay: Duration::from_secs(4),
            jitter_max_ms: 250,
        }
    }
}

impl BackoffConfig {
    /// Single pass over the endpoints, no sleeping.
    pub const fn single_round() -> Self {
        Self {
            rounds: 1,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            jitter_max_ms: 0,
        }
    }

    fn delay_after(&self, round: usize) -> Duration {
        let shift = u32::try_from(round.min(16)).unwrap_or(16_u32);
        let factor = 1_u64.checked_shl(shift).unwrap_or(u64::MAX);
        let base_ms = u64::try_from(self.base_delay.as_millis()).unwrap_or(u64::MAX);
        let max_ms = u64::try_from(self.max_delay.as_millis()).unwrap_or(u64::MAX);
        let ms = base_ms.saturating_mul(factor).min(max_ms);
        let jitter = if cfg!(test) || self.jitter_max_ms == 0 {
            0
        } else {
            rand::random::<u64>() % self.jitter_max_ms.saturating_add(1).max(1)
        };
        Duration::from_millis(ms.saturating_add(jitter))
    }
}

/// Try `op(item)` across all items, in order, for `cfg.rounds` rounds, sleeping with exponential
/// backoff between rounds once every item has failed.
pub async fn try_all_with_backoff<I, T, Fut>(
    items: &[I],
    cfg: &BackoffConfig,
    mut op: impl FnMut(&I) -> Fut + Send,
    context_label: &'static str,
) -> eyre::Result<T>
where
    I: Sync,
    Fut: Future<Output = eyre::Result<T>> + Send,
{
    if items.is_empty() {
        eyre::bail!("{context_label}: no endpoints configured");
    }
    if cfg.rounds == 0 {
        eyre::bail!("{context_label}: backoff configured with zero rounds");
    }

    let mut last_err: Option<eyre::Report> = None;
    for round in 0..cfg.rounds {
        for (idx, item) in items.iter().enumerate() {
            match op(item).await {
                Ok(v) => return Ok(v),
                Err(e) => {
                    tracing::debug!(op = context_label, round, endpoint = idx, error = %format!("{e:#}"), "endpoint failed");
                    last_err = Some(e);
                }
            }
        }
        if round + 1 < cfg.rounds {
            tokio::time::sleep(cfg.delay_after(round)).await;
        }
    }

    Err(last_err
        .unwrap_or_else(|| eyre::eyre!("all endpoints failed"))
        .wrap_err(context_label))
}

/// Outcome of a bounded wait.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Polled<T> {
    Ready(T),
    TimedOut(Duration),
}

/// Call `op` until it yields `Some`, sleeping `interval` between attempts, for at most `timeout`.
///
/// Errors from `op` end the wait immediately. The first attempt always runs, even with a zero
/// timeout.
pub async fn poll_until<T, E, Fut>(
    timeout: Duration,
    interval: Duration,
    mut op: impl FnMut() -> Fut + Send,
) -> Result<Polled<T>, E>
where
    Fut: Future<Output = Result<Option<T>, E>> + Send,
{
    let start = Instant::now();
    loop {
        if let Some(v) = op().await? {
            return Ok(Polled::Ready(v));
        }
        let waited = start.elapsed();
        if waited >= timeout {
            return Ok(Polled::TimedOut(waited));
        }
        let remaining = timeout.saturating_sub(waited);
        tokio::time::sleep(interval.min(remaining)).await;
    }
}

/// Bounded confirmation wait for something already broadcast.
///
/// A failed status query is logged and counts as "not ready yet", so the wait only ends as
/// `Ready` or `TimedOut`.
pub async fn poll_confirmation<T, Fut>(
    id: &str,
    timeout: Duration,
    interval: Duration,
    mut op: impl FnMut() -> Fut + Send,
) -> Polled<T>
where
    Fut: Future<Output = eyre::Result<Option<T>>> + Send,
{
    let polled = poll_until(timeout, interval, || {
        let attempt = op();
        async move {
            Ok::<_, Infallible>(match attempt.await {
                Ok(v) => v,
                Err(e) => {
                    tracing::warn!(id, error = %format!("{e:#}"), "status query failed; still waiting");
                    None
                }
            })
        }
    })
    .await;
    match polled {
        Ok(p) => p,
        Err(never) => match never {},
    }
}
