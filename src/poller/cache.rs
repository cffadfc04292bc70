use arc_swap::ArcSwapOption;
use log::{debug, error, info, warn};
use parking_lot::Mutex;
use snafu::prelude::*;
use stv_tally::{aggregate, Ballot, ElectionConfig, TallyResult};
use tokio::runtime::Handle;
use tokio::sync::watch;

use std::sync::Arc;
use std::time::Duration;

use crate::poller::ballot_log::BallotLog;
use crate::poller::worker::TallyWorker;
use crate::poller::ResultMode;
use crate::teller::config_reader::ElectionId;
use crate::teller::{EngineFailureSnafu, NotReadySnafu, TellerResult};

// idle -> running -> running-with-pending -> (one more pass) -> idle
#[derive(Eq, PartialEq, Debug, Clone, Copy)]
enum Phase {
    Idle,
    Running,
    RunningWithPending,
}

#[derive(Debug)]
struct Schedule {
    phase: Phase,
    pending: Vec<Ballot>,
    // Number of the pass running or about to run. 0 before the first one.
    current: u64,
}

struct CacheShared {
    id: ElectionId,
    config: ElectionConfig,
    log: BallotLog,
    worker: TallyWorker,
    recount_timeout: Duration,
    runtime: Handle,
    // Replaced as a whole by each successful recount.
    cached: ArcSwapOption<TallyResult>,
    schedule: Mutex<Schedule>,
    // True while recounts are running. Only changed with `schedule` locked.
    busy: watch::Sender<bool>,
    // Number of the last finished pass. Only changed with `schedule` locked.
    finished: watch::Sender<u64>,
}

/// The results of one poll, kept up to date as ballots arrive.
///
/// Submitted ballots wait in a queue. A single background task at a time
/// writes the queue to the vote file and recounts the whole file. Ballots
/// received during a recount are handled by exactly one more recount.
#[derive(Clone)]
pub struct ResultCache {
    shared: Arc<CacheShared>,
}

impl ResultCache {
    /// The background recounts are spawned on `runtime`.
    pub fn new(
        id: ElectionId,
        config: ElectionConfig,
        log: BallotLog,
        worker: TallyWorker,
        recount_timeout: Duration,
        runtime: Handle,
    ) -> ResultCache {
        let (busy, _) = watch::channel(false);
        let (finished, _) = watch::channel(0);
        ResultCache {
            shared: Arc::new(CacheShared {
                id,
                config,
                log,
                worker,
                recount_timeout,
                runtime,
                cached: ArcSwapOption::empty(),
                schedule: Mutex::new(Schedule {
                    phase: Phase::Idle,
                    pending: Vec::new(),
                    current: 0,
                }),
                busy,
                finished,
            }),
        }
    }

    pub fn config(&self) -> &ElectionConfig {
        &self.shared.config
    }

    pub fn log(&self) -> &BallotLog {
        &self.shared.log
    }

    /// Queues a ballot that has already been validated. Never waits for the count.
    pub fn submit(&self, ballot: Ballot) {
        self.schedule(Some(ballot));
    }

    /// Asks for a recount even if no ballot is waiting.
    pub fn refresh(&self) {
        self.schedule(None);
    }

    /// With `ResultMode::Consistent`, waits for the recount running at the
    /// time of the call, but not for the ballots queued after it.
    pub async fn result(&self, mode: ResultMode) -> TellerResult<Arc<TallyResult>> {
        if mode == ResultMode::Consistent {
            self.wait_for_current_pass().await;
        }
        self.shared
            .cached
            .load_full()
            .context(NotReadySnafu { id: self.shared.id })
    }

    async fn wait_for_current_pass(&self) {
        let target = {
            let s = self.shared.schedule.lock();
            if s.phase == Phase::Idle {
                return;
            }
            s.current
        };
        let mut rx = self.shared.finished.subscribe();
        let _ = rx.wait_for(|done| *done >= target).await;
    }

    /// Waits until no recount is running or scheduled.
    ///
    /// Under a steady flow of ballots this may not return.
    pub async fn settle(&self) {
        let mut rx = self.shared.busy.subscribe();
        // The sender is owned by `self`: the channel cannot be closed here.
        let _ = rx.wait_for(|busy| !*busy).await;
    }

    pub fn is_busy(&self) -> bool {
        *self.shared.busy.borrow()
    }

    /// Ballots submitted but not written to the vote file yet.
    pub fn pending_len(&self) -> usize {
        self.shared.schedule.lock().pending.len()
    }

    /// Number of recounts started or about to start.
    pub fn passes(&self) -> u64 {
        self.shared.schedule.lock().current
    }

    /// Number of the last finished recount.
    pub fn finished_passes(&self) -> u64 {
        *self.shared.finished.borrow()
    }

    fn schedule(&self, ballot: Option<Ballot>) {
        let mut s = self.shared.schedule.lock();
        if let Some(b) = ballot {
            s.pending.push(b);
        }
        match s.phase {
            Phase::Idle => {
                s.phase = Phase::Running;
                s.current += 1;
                self.shared.busy.send_replace(true);
                let shared = Arc::clone(&self.shared);
                self.shared.runtime.spawn(shared.run_passes());
            }
            Phase::Running => s.phase = Phase::RunningWithPending,
            Phase::RunningWithPending => {}
        }
    }
}

impl CacheShared {
    async fn run_passes(self: Arc<Self>) {
        loop {
            let (pass, batch) = {
                let mut s = self.schedule.lock();
                s.phase = Phase::Running;
                (s.current, std::mem::take(&mut s.pending))
            };
            self.recompute(pass, batch).await;

            let mut s = self.schedule.lock();
            self.finished.send_replace(pass);
            if s.phase == Phase::RunningWithPending {
                debug!(
                    "poll {}: {} ballots arrived during the recount",
                    self.id,
                    s.pending.len()
                );
                s.current += 1;
                continue;
            }
            s.phase = Phase::Idle;
            self.busy.send_replace(false);
            return;
        }
    }

    async fn recompute(&self, pass: u64, batch: Vec<Ballot>) {
        debug!(
            "poll {}: recount #{} with {} new ballots",
            self.id,
            pass,
            batch.len()
        );

        if !batch.is_empty() {
            if let Err(e) = self.log.append(&batch).await {
                error!(
                    "poll {}: {} ballots could not be recorded: {}",
                    self.id,
                    batch.len(),
                    e
                );
            }
        }

        let (recorded, unreadable) = match self.log.read_all().await {
            Ok(x) => x,
            Err(e) => {
                error!("poll {}: cannot read the vote file: {}", self.id, e);
                return;
            }
        };
        // Lenient aggregation does not fail: bad ballots are only dropped.
        let (ballots, dropped) = match aggregate(&recorded, &self.config, false) {
            Ok(x) => x,
            Err(e) => {
                error!("poll {}: aggregation failed: {}", self.id, e);
                return;
            }
        };
        if dropped + unreadable > 0 {
            warn!(
                "poll {}: {} recorded ballots are invalid and not counted",
                self.id,
                dropped + unreadable
            );
        }

        if ballots.is_empty() {
            debug!("poll {}: no ballot to count, all candidates tied", self.id);
            self.cached.store(Some(Arc::new(TallyResult::full_tie(
                self.config.candidate_count,
            ))));
            return;
        }

        match self
            .worker
            .run(ballots, self.config.clone(), self.recount_timeout)
            .await
            .context(EngineFailureSnafu {})
        {
            Ok(res) => {
                info!(
                    "poll {}: recount #{} done, winners: {:?}, tied: {:?}",
                    self.id, pass, res.winners, res.tied_winners
                );
                self.cached.store(Some(Arc::new(res)));
            }
            Err(e) => {
                error!(
                    "poll {}: recount #{} failed, keeping the previous result: {}",
                    self.id, pass, e
                );
            }
        }
    }
}
