use futures_util::stream::{FuturesUnordered, StreamExt};
use haven_core::repository::AvailabilityCheck;
use haven_core::search::SearchHit;
use haven_core::StayDates;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct FanoutConfig {
    /// Budget for a single availability check.
    pub check_timeout: Duration,
    /// Slack added on top of the slowest check for the whole page.
    pub network_margin: Duration,
}

impl Default for FanoutConfig {
    fn default() -> Self {
        Self {
            check_timeout: Duration::from_secs(3),
            network_margin: Duration::from_millis(250),
        }
    }
}

/// Attaches an availability flag to every hit, checking all of them at once.
///
/// Answers are written back by position, so the hit order is whatever the
/// index returned. A check that fails, times out or is still running when
/// the page deadline passes leaves its hit unavailable. Returns the number
/// of hits that were defaulted this way.
pub async fn enrich_availability(
    hits: &mut [SearchHit],
    checker: &Arc<dyn AvailabilityCheck>,
    stay: &StayDates,
    config: &FanoutConfig,
) -> usize {
    if hits.is_empty() {
        return 0;
    }

    let deadline = Instant::now() + config.check_timeout + config.network_margin;
    let mut answers: Vec<Option<bool>> = vec![None; hits.len()];

    let mut pending: FuturesUnordered<_> = hits
        .iter()
        .enumerate()
        .map(|(position, hit)| {
            let checker = checker.clone();
            let hotel_id = hit.document.id.clone();
            let stay = *stay;
            let budget = config.check_timeout;
            async move {
                let result = tokio::time::timeout(budget, checker.is_available(&hotel_id, &stay)).await;
                (position, hotel_id, result)
            }
        })
        .collect();

    loop {
        match tokio::time::timeout_at(deadline, pending.next()).await {
            Ok(Some((position, _, Ok(Ok(available))))) => answers[position] = Some(available),
            Ok(Some((_, hotel_id, Ok(Err(e))))) => {
                warn!(%hotel_id, error = %e, "Availability check failed, reporting unavailable");
            }
            Ok(Some((_, hotel_id, Err(_)))) => {
                warn!(%hotel_id, "Availability check timed out, reporting unavailable");
            }
            Ok(None) => break,
            Err(_) => {
                warn!(outstanding = pending.len(), "Availability fan-out deadline passed, abandoning checks");
                break;
            }
        }
    }
    drop(pending);

    let mut degraded = 0;
    for (hit, answer) in hits.iter_mut().zip(answers) {
        if answer.is_none() {
            degraded += 1;
        }
        hit.availability = Some(answer.unwrap_or(false));
    }
    debug!(hits = hits.len(), degraded, "Availability fan-out complete");
    degraded
}
