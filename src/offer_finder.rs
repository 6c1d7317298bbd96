use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::Utc;
use futures::future::join_all;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{info, warn};

use crate::debounce::{Action, ConfirmThreshold, decide};
use crate::dedup::deduplicate;
use crate::fingerprint::Fingerprinter;
use crate::format::NotificationFormatter;
use crate::models::{Bucket, BucketOutcome, Observation, PublishReason};
use crate::publisher::{Publication, Publisher};
use crate::traits::{OfferSource, StateStore};

/// What started a cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    /// Timer tick; skipped while another cycle runs
    Periodic,
    /// Operator or boot request; waits for the running cycle, then publishes
    Forced,
}

/// Result of one decision-and-publish cycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Another cycle was in flight
    Skipped,
    Unchanged,
    /// A change was seen `count` times so far
    Pending { count: u32 },
    Published { reason: PublishReason, message_id: String },
}

/// Runs poll cycles: fetch every source, fingerprint, decide, publish.
///
/// Clones share the same cycle lock, so at most one cycle runs at a time
/// across all of them.
#[derive(Clone)]
pub struct OfferFinder {
    sources: Arc<Vec<Box<dyn OfferSource>>>,
    store: Arc<dyn StateStore>,
    publisher: Publisher,
    fingerprinter: Arc<Fingerprinter>,
    formatter: Arc<NotificationFormatter>,
    threshold: ConfirmThreshold,
    request_timeout: Duration,
    cycle_lock: Arc<Mutex<()>>,
}

impl OfferFinder {
    pub fn new(
        sources: Vec<Box<dyn OfferSource>>,
        store: Arc<dyn StateStore>,
        publisher: Publisher,
        threshold: ConfirmThreshold,
        request_timeout: Duration,
    ) -> Self {
        let profiles: Vec<_> = sources.iter().map(|s| s.profile()).collect();
        let fingerprinter = Fingerprinter::from_profiles(profiles.iter().copied());
        let formatter = NotificationFormatter::new(profiles.iter().copied());

        Self {
            sources: Arc::new(sources),
            store,
            publisher,
            fingerprinter: Arc::new(fingerprinter),
            formatter: Arc::new(formatter),
            threshold,
            request_timeout,
            cycle_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Run a cycle, honouring the single-writer rule.
    pub async fn check_for_offers(&self, trigger: Trigger) -> Result<CycleOutcome> {
        let _guard = match trigger {
            Trigger::Periodic => match self.cycle_lock.try_lock() {
                Ok(guard) => guard,
                Err(_) => {
                    info!("Previous check still running, skipping this tick");
                    return Ok(CycleOutcome::Skipped);
                }
            },
            Trigger::Forced => self.cycle_lock.lock().await,
        };

        self.run_cycle(trigger == Trigger::Forced).await
    }

    /// Wait for the in-flight cycle, then keep every later one out for as
    /// long as the returned guard lives.
    pub async fn shut_down(&self) -> OwnedMutexGuard<()> {
        self.cycle_lock.clone().lock_owned().await
    }

    async fn run_cycle(&self, force: bool) -> Result<CycleOutcome> {
        let now = Utc::now();
        let observation = self.observe().await;
        let fingerprint = self.fingerprinter.fingerprint(&observation);

        let state = self.store.load().await;
        let decision = decide(&fingerprint, force, &state, self.threshold);

        match decision.action {
            Action::None => {
                self.store.save(&decision.next).await?;
                if decision.next.is_stable() {
                    info!("No changes since last notification");
                    Ok(CycleOutcome::Unchanged)
                } else {
                    info!(
                        "Change seen {}/{} times, waiting for confirmation",
                        decision.next.pending_count,
                        self.threshold.get()
                    );
                    Ok(CycleOutcome::Pending {
                        count: decision.next.pending_count,
                    })
                }
            }
            Action::Publish(reason) => {
                let message = self.formatter.render(&observation, reason, now);
                let published = self
                    .publisher
                    .publish(
                        &state,
                        Publication {
                            fingerprint: &fingerprint,
                            message: &message,
                            observation: &observation,
                            reason,
                            now,
                        },
                    )
                    .await?;

                Ok(CycleOutcome::Published {
                    reason,
                    message_id: published.last_message_id.unwrap_or_default(),
                })
            }
        }
    }

    /// Fetch all sources concurrently; each failure or timeout becomes an
    /// unavailable bucket for every classification the source reports.
    pub async fn observe(&self) -> Observation {
        let now = Utc::now();

        let fetches = self.sources.iter().map(|source| async move {
            let deadline = self.request_timeout * source.profile().fetch_requests.max(1);
            let result = tokio::time::timeout(deadline, source.fetch(now)).await;
            (source, deadline, result)
        });

        let mut buckets = Vec::new();
        for (source, deadline, result) in join_all(fetches).await {
            let profile = source.profile();
            let offers = match result {
                Ok(Ok(offers)) => Some(offers),
                Ok(Err(e)) => {
                    warn!("Source {} failed: {:#}", profile.name, e);
                    None
                }
                Err(_) => {
                    warn!("Source {} timed out after {:?}", profile.name, deadline);
                    None
                }
            };

            for &classification in &profile.classifications {
                let outcome = match &offers {
                    None => BucketOutcome::Unavailable,
                    Some(offers) => {
                        let bucket: Vec<_> = offers
                            .iter()
                            .filter(|o| o.classification == classification)
                            .cloned()
                            .collect();
                        BucketOutcome::Offers(deduplicate(bucket, &profile.dedup))
                    }
                };
                buckets.push(Bucket {
                    source: profile.id.clone(),
                    classification,
                    outcome,
                });
            }
        }

        Observation { buckets }
    }
}
