//! Reconciliation Loop
//!
//! Consumes change events, fans each signup out to its own task and keeps
//! attempts for the same user strictly serialized. A record is only deleted
//! once its pull request exists; anything else leaves it in place so the
//! next snapshot retries it.
//!
//! Per-user ordering uses a slot holding an async mutex and a completion
//! counter. Each attempt remembers the counter at enqueue time; if another
//! attempt for the same user succeeded in the meantime the queued one is
//! dropped as superseded instead of opening a duplicate pull request.

use crate::error::{EventSourceError, ProcessError};
use crate::events::EventSource;
use crate::models::{PullRequestRef, SignupRecord};
use crate::pipeline::processor::process_signup;
use crate::state::{AppContext, SharedContext};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::task::{JoinError, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

// =============================================================================
// SUMMARY
// =============================================================================

/// Counters for one run of the loop
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Change events read from the source
    pub events: usize,
    /// Per-user attempts dispatched
    pub attempts: usize,
    /// Attempts that ended with a pull request
    pub published: usize,
    /// Permanently rejected (bad record, missing name, low score)
    pub rejected: usize,
    /// Transient failures, retried on a later event
    pub failed: usize,
    /// Dropped because an earlier attempt already published
    pub superseded: usize,
}

impl RunSummary {
    fn record(&mut self, joined: Result<AttemptOutcome, JoinError>) {
        match joined {
            Ok(AttemptOutcome::Published(pull)) => {
                debug!("Pull request {}#{} recorded", pull.repository, pull.number);
                self.published += 1;
            }
            Ok(AttemptOutcome::Superseded) => self.superseded += 1,
            Ok(AttemptOutcome::Failed(err)) if err.is_transient() => self.failed += 1,
            Ok(AttemptOutcome::Failed(_)) => self.rejected += 1,
            Err(err) => {
                error!("❌ Signup task aborted: {}", err);
                self.failed += 1;
            }
        }
    }
}

#[derive(Debug)]
enum AttemptOutcome {
    Published(PullRequestRef),
    Superseded,
    Failed(ProcessError),
}

// =============================================================================
// PER-USER SLOTS
// =============================================================================

#[derive(Default)]
struct UserSlot {
    lock: tokio::sync::Mutex<()>,
    completions: AtomicU64,
}

type SlotMap = Arc<Mutex<HashMap<String, Arc<UserSlot>>>>;

fn acquire_slot(slots: &SlotMap, user_id: &str) -> Arc<UserSlot> {
    let mut slots = slots.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    slots.entry(user_id.to_string()).or_default().clone()
}

/// Drop the slot once no other attempt references it
fn release_slot(slots: &SlotMap, user_id: &str, slot: Arc<UserSlot>) {
    let mut slots = slots.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    if Arc::strong_count(&slot) <= 2 {
        slots.remove(user_id);
    }
}

// =============================================================================
// LOOP
// =============================================================================

pub struct ReconciliationLoop {
    ctx: SharedContext,
    slots: SlotMap,
}

impl ReconciliationLoop {
    pub fn new(ctx: SharedContext) -> Self {
        Self {
            ctx,
            slots: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Drive the loop until the stream ends, fails, or `cancel` fires.
    ///
    /// In-flight attempts are always drained before returning. A stream
    /// error is returned after draining; the summary is lost in that case.
    pub async fn run(
        &self,
        source: &mut dyn EventSource,
        cancel: CancellationToken,
    ) -> Result<RunSummary, EventSourceError> {
        let mut tasks: JoinSet<AttemptOutcome> = JoinSet::new();
        let mut summary = RunSummary::default();

        let outcome = loop {
            let next = tokio::select! {
                _ = cancel.cancelled() => {
                    info!("🛑 Cancellation requested, no longer reading events");
                    break Ok(());
                }
                next = source.next_event() => next,
            };

            match next {
                Ok(Some(event)) => {
                    summary.events += 1;
                    let signups = event.signups();
                    if signups.is_empty() {
                        debug!("Ignoring {:?} event at {}", event.change_type, event.path);
                    }
                    for (user_id, payload) in signups {
                        summary.attempts += 1;
                        self.spawn_attempt(&mut tasks, user_id, payload, cancel.clone());
                    }
                }
                Ok(None) => {
                    info!("📭 Event stream ended");
                    break Ok(());
                }
                Err(err) => {
                    error!("❌ Event stream failed: {}", err);
                    break Err(err);
                }
            }

            while let Some(done) = tasks.try_join_next() {
                summary.record(done);
            }
        };

        source.stop().await;

        while let Some(done) = tasks.join_next().await {
            summary.record(done);
        }

        info!(
            "📊 Run finished: {} events, {} attempts, {} published, {} rejected, {} failed, {} superseded",
            summary.events,
            summary.attempts,
            summary.published,
            summary.rejected,
            summary.failed,
            summary.superseded
        );

        outcome.map(|_| summary)
    }

    fn spawn_attempt(
        &self,
        tasks: &mut JoinSet<AttemptOutcome>,
        user_id: String,
        payload: Value,
        cancel: CancellationToken,
    ) {
        let ctx = self.ctx.clone();
        let slots = self.slots.clone();
        let slot = acquire_slot(&slots, &user_id);
        let epoch = slot.completions.load(Ordering::SeqCst);
        let span = info_span!("signup", user = %user_id, attempt = %Uuid::new_v4());

        tasks.spawn(
            async move {
                let outcome = run_attempt(&ctx, &slot, epoch, &user_id, &payload, &cancel).await;
                release_slot(&slots, &user_id, slot);
                outcome
            }
            .instrument(span),
        );
    }
}

async fn run_attempt(
    ctx: &AppContext,
    slot: &UserSlot,
    epoch: u64,
    user_id: &str,
    payload: &Value,
    cancel: &CancellationToken,
) -> AttemptOutcome {
    let _turn = tokio::select! {
        _ = cancel.cancelled() => return AttemptOutcome::Failed(ProcessError::Cancelled),
        guard = slot.lock.lock() => guard,
    };

    if slot.completions.load(Ordering::SeqCst) != epoch {
        debug!("Signup for {} already published by an earlier attempt", user_id);
        return AttemptOutcome::Superseded;
    }

    let record = match SignupRecord::decode(user_id, payload) {
        Ok(record) => record,
        Err(err) => {
            warn!("⚠️  Skipping malformed signup: {}", err);
            return AttemptOutcome::Failed(err.into());
        }
    };

    let result = tokio::select! {
        _ = cancel.cancelled() => Err(ProcessError::Cancelled),
        res = tokio::time::timeout(ctx.attempt_timeout, process_signup(ctx, &record)) => {
            res.unwrap_or(Err(ProcessError::TimedOut(ctx.attempt_timeout)))
        }
    };

    match result {
        Ok(pull) => {
            slot.completions.fetch_add(1, Ordering::SeqCst);
            info!("✅ Processed signup for {} on branch {}: {}", user_id, pull.branch, pull.url);

            if let Err(err) = ctx.records.delete(user_id).await {
                error!("❌ Error removing processed signup {}: {}", user_id, err);
            }
            AttemptOutcome::Published(pull)
        }
        Err(err) if err.is_transient() => {
            warn!("⚠️  Signup for {} will be retried: {}", user_id, err);
            AttemptOutcome::Failed(err)
        }
        Err(err) => {
            info!("Signup for {} not published: {}", user_id, err);
            AttemptOutcome::Failed(err)
        }
    }
}
