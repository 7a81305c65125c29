//! Batch orchestration: normalize, fan out over a bounded worker pool,
//! collect results back into input order.

use std::{
    collections::{HashMap, VecDeque},
    sync::{Arc, Mutex as StdMutex},
};

use chrono::{DateTime, Utc};
use tokio::{sync::Mutex, task::JoinSet};
use tokio_util::sync::CancellationToken;

use crate::{
    classify::classify,
    clock::Clock,
    directory::{DirectoryCapabilities, DirectoryClient},
    domain::{CheckResult, CheckStatus, RunReport, RunSummary},
    identifier::{normalize, Identifier},
    retry::{LastFailure, Retrier, RetryPolicy, Terminal},
};

pub const REASON_USERNAME_NOT_FOUND: &str = "username not found";
pub const REASON_INVALID_INVITE: &str = "invalid invite";
pub const REASON_RATE_LIMITED: &str = "rate limit, try later";
pub const REASON_EXHAUSTED: &str = "service unavailable, retries exhausted";
pub const REASON_ABORTED: &str = "run aborted";
pub const REASON_INVITES_UNSUPPORTED: &str = "invite links are not supported by this session";
pub const REASON_WORKER_FAILED: &str = "internal error, check not completed";

#[derive(Clone, Debug)]
pub struct PipelineConfig {
    /// Concurrent lookups. Higher values mostly buy more rate limiting.
    pub concurrency: usize,
    pub retry: RetryPolicy,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            concurrency: 5,
            retry: RetryPolicy::default(),
        }
    }
}

/// Result slots shared by all workers, indexed by input position.
#[derive(Clone)]
struct Slots(Arc<StdMutex<Vec<Option<ItemOutcome>>>>);

impl Slots {
    fn fill(&self, positions: &[usize], outcome: &ItemOutcome) {
        let mut slots = self.0.lock().unwrap_or_else(|e| e.into_inner());
        for &pos in positions {
            slots[pos] = Some(outcome.clone());
        }
    }

    fn take(self) -> Vec<Option<ItemOutcome>> {
        std::mem::take(&mut *self.0.lock().unwrap_or_else(|e| e.into_inner()))
    }
}

/// One distinct lookup and every input position that asked for it.
#[derive(Debug)]
struct Job {
    id: Identifier,
    positions: Vec<usize>,
}

#[derive(Clone, Debug)]
struct ItemOutcome {
    status: CheckStatus,
    finished_at: DateTime<Utc>,
    attempts: u32,
}

pub struct Pipeline {
    client: Arc<dyn DirectoryClient>,
    retrier: Arc<Retrier>,
    concurrency: usize,
    cancel: CancellationToken,
}

impl Pipeline {
    pub fn new(
        client: Arc<dyn DirectoryClient>,
        clock: Arc<dyn Clock>,
        cfg: PipelineConfig,
    ) -> Self {
        Self::with_retrier(client, Retrier::new(cfg.retry, clock), cfg.concurrency)
    }

    pub fn with_retrier(
        client: Arc<dyn DirectoryClient>,
        retrier: Retrier,
        concurrency: usize,
    ) -> Self {
        Self {
            client,
            retrier: Arc::new(retrier),
            concurrency: concurrency.max(1),
            cancel: CancellationToken::new(),
        }
    }

    /// Token that aborts the run when cancelled (e.g. on Ctrl-C).
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Check every input and return one result per input, in input order.
    ///
    /// Consumes the pipeline: the directory session is disconnected once all
    /// workers have finished.
    pub async fn run(self, inputs: Vec<String>) -> RunReport {
        let caps = self.client.capabilities();
        let clock = Arc::clone(self.retrier.clock());
        let mut slots: Vec<Option<ItemOutcome>> = vec![None; inputs.len()];

        let mut jobs: Vec<Job> = Vec::new();
        let mut by_key: HashMap<String, usize> = HashMap::new();
        for (pos, raw) in inputs.iter().enumerate() {
            let id = match normalize(raw) {
                Ok(id) => id,
                Err(e) => {
                    slots[pos] = Some(immediate(CheckStatus::Invalid(e.to_string()), &*clock));
                    continue;
                }
            };
            if id.invite_hash().is_some() && !caps.supports_invite_links {
                slots[pos] = Some(immediate(
                    CheckStatus::Unknown(REASON_INVITES_UNSUPPORTED.to_string()),
                    &*clock,
                ));
                continue;
            }
            match by_key.get(&id.dedup_key()) {
                Some(&j) => jobs[j].positions.push(pos),
                None => {
                    by_key.insert(id.dedup_key(), jobs.len());
                    jobs.push(Job {
                        id,
                        positions: vec![pos],
                    });
                }
            }
        }

        let workers = self.concurrency.min(jobs.len());
        tracing::info!(
            inputs = inputs.len(),
            lookups = jobs.len(),
            workers,
            "starting checks"
        );

        let slots = Slots(Arc::new(StdMutex::new(slots)));
        let queue = Arc::new(Mutex::new(VecDeque::from(jobs)));
        let mut set = JoinSet::new();
        for _ in 0..workers {
            let worker = Worker {
                client: Arc::clone(&self.client),
                retrier: Arc::clone(&self.retrier),
                cancel: self.cancel.clone(),
                caps,
            };
            let queue = Arc::clone(&queue);
            let slots = slots.clone();
            set.spawn(async move { worker.drain(queue, slots).await });
        }

        while let Some(joined) = set.join_next().await {
            if let Err(e) = joined {
                tracing::error!("worker failed: {e}");
            }
        }

        self.client.disconnect().await;

        let aborted = self.cancel.is_cancelled();
        // Unfilled slots were either cut off by the abort or lost with a
        // crashed worker.
        let missing = if aborted {
            REASON_ABORTED
        } else {
            REASON_WORKER_FAILED
        };
        let results: Vec<CheckResult> = inputs
            .into_iter()
            .zip(slots.take())
            .map(|(input, slot)| {
                let outcome = slot.unwrap_or_else(|| {
                    immediate(CheckStatus::Unknown(missing.to_string()), &*clock)
                });
                CheckResult {
                    input,
                    status: outcome.status,
                    finished_at: outcome.finished_at,
                    attempts: outcome.attempts,
                }
            })
            .collect();
        let summary = RunSummary::from_results(&results);

        if aborted {
            tracing::warn!(
                valid = summary.valid,
                invalid = summary.invalid,
                unknown = summary.unknown,
                "run aborted"
            );
        } else {
            tracing::info!(
                valid = summary.valid,
                invalid = summary.invalid,
                unknown = summary.unknown,
                "run finished"
            );
        }

        RunReport {
            results,
            summary,
            aborted,
        }
    }
}

fn immediate(status: CheckStatus, clock: &dyn Clock) -> ItemOutcome {
    ItemOutcome {
        status,
        finished_at: clock.wall_now(),
        attempts: 0,
    }
}

struct Worker {
    client: Arc<dyn DirectoryClient>,
    retrier: Arc<Retrier>,
    cancel: CancellationToken,
    caps: DirectoryCapabilities,
}

impl Worker {
    /// Take jobs until the queue is empty or the run is cancelled. Each
    /// outcome is stored as soon as it is known.
    async fn drain(self, queue: Arc<Mutex<VecDeque<Job>>>, slots: Slots) {
        while !self.cancel.is_cancelled() {
            let Some(job) = queue.lock().await.pop_front() else {
                break;
            };
            let outcome = self.check(&job.id).await;
            slots.fill(&job.positions, &outcome);
        }
    }

    async fn check(&self, id: &Identifier) -> ItemOutcome {
        let label = id.canonical();
        let client = &self.client;

        let resolved = self
            .retrier
            .run(&label, &self.cancel, || client.resolve(id))
            .await;

        let entity = match resolved.terminal {
            Terminal::Succeeded(entity) => entity,
            other => {
                let status = self.failure_status(id, &label, other);
                return ItemOutcome {
                    status,
                    finished_at: resolved.finished_at,
                    attempts: resolved.attempts,
                };
            }
        };

        let mut attempts = resolved.attempts;
        let mut finished_at = resolved.finished_at;
        let mut full = None;
        if self.caps.supports_full_info && entity.wants_full_info() {
            // Both phases share the item's retry budget.
            let budget = self
                .retrier
                .policy()
                .max_retries
                .saturating_sub(resolved.retries);
            let report = self
                .retrier
                .run_with_budget(&label, &self.cancel, budget, || {
                    client.fetch_full_info(&entity)
                })
                .await;
            attempts += report.attempts;
            finished_at = report.finished_at;
            match report.terminal {
                Terminal::Succeeded(info) => full = Some(info),
                Terminal::Aborted => {
                    return ItemOutcome {
                        status: CheckStatus::Unknown(REASON_ABORTED.to_string()),
                        finished_at,
                        attempts,
                    };
                }
                Terminal::Permanent {
                    reason,
                    session_fatal: true,
                } => {
                    self.abort(&label, &reason);
                    return ItemOutcome {
                        status: CheckStatus::Unknown(reason),
                        finished_at,
                        attempts,
                    };
                }
                other => {
                    // Second phase is best effort; unknown fields stay unknown.
                    tracing::debug!(id = %label, outcome = ?other, "full info unavailable");
                }
            }
        }

        ItemOutcome {
            status: CheckStatus::Valid(classify(&entity, full.as_ref())),
            finished_at,
            attempts,
        }
    }

    fn failure_status<T>(
        &self,
        id: &Identifier,
        label: &str,
        terminal: Terminal<T>,
    ) -> CheckStatus {
        match terminal {
            Terminal::Succeeded(_) => CheckStatus::Unknown("unexpected success".to_string()),
            Terminal::NotFound => CheckStatus::Invalid(
                if id.username().is_some() {
                    REASON_USERNAME_NOT_FOUND
                } else {
                    REASON_INVALID_INVITE
                }
                .to_string(),
            ),
            Terminal::Permanent {
                reason,
                session_fatal: true,
            } => {
                self.abort(label, &reason);
                CheckStatus::Unknown(reason)
            }
            Terminal::Permanent { reason, .. } => CheckStatus::Invalid(reason),
            Terminal::Exhausted(LastFailure::RateLimited(_)) => {
                CheckStatus::Unknown(REASON_RATE_LIMITED.to_string())
            }
            Terminal::Exhausted(LastFailure::Transient(_)) => {
                CheckStatus::Unknown(REASON_EXHAUSTED.to_string())
            }
            Terminal::Aborted => CheckStatus::Unknown(REASON_ABORTED.to_string()),
        }
    }

    fn abort(&self, label: &str, reason: &str) {
        if !self.cancel.is_cancelled() {
            tracing::error!(id = %label, "session unusable, aborting run: {reason}");
            self.cancel.cancel();
        }
    }
}
