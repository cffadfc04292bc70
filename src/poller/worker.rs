use log::{debug, warn};
use snafu::Snafu;
use stv_tally::{AggregatedBallots, ElectionConfig, TallyError, TallyResult};

use std::any::Any;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Why a recount did not produce a result.
#[derive(Debug, Clone, PartialEq, Eq, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum WorkerFailure {
    #[snafu(display("tally worker crashed: {details}"))]
    Crash { details: String },
    #[snafu(display("tally worker did not finish within {} ms", after.as_millis()))]
    Timeout { after: Duration },
}

impl WorkerFailure {
    pub fn reason(&self) -> &'static str {
        match self {
            WorkerFailure::Crash { .. } => "crash",
            WorkerFailure::Timeout { .. } => "timeout",
        }
    }
}

/// Something that counts ballots.
///
/// The count runs on a blocking thread. Implementations should return
/// early once `abort` is set: it means that the result is not wanted anymore.
pub trait Counter: Send + Sync + 'static {
    fn count(
        &self,
        ballots: &AggregatedBallots,
        config: &ElectionConfig,
        abort: &AtomicBool,
    ) -> Result<TallyResult, TallyError>;
}

/// The single transferable vote count of `stv_tally`.
#[derive(Debug, Default, Clone, Copy)]
pub struct StvCounter;

impl Counter for StvCounter {
    fn count(
        &self,
        ballots: &AggregatedBallots,
        config: &ElectionConfig,
        abort: &AtomicBool,
    ) -> Result<TallyResult, TallyError> {
        stv_tally::tally_until(ballots, config, || abort.load(Ordering::Relaxed))
    }
}

/// Runs counts away from the async tasks, with a time limit.
///
/// A count that panics or fails is reported as a crash. A count that is too
/// slow is abandoned: its abort flag is raised and its output is discarded.
#[derive(Clone)]
pub struct TallyWorker {
    counter: Arc<dyn Counter>,
}

impl Default for TallyWorker {
    fn default() -> Self {
        TallyWorker::new(Arc::new(StvCounter))
    }
}

impl TallyWorker {
    pub fn new(counter: Arc<dyn Counter>) -> TallyWorker {
        TallyWorker { counter }
    }

    pub async fn run(
        &self,
        ballots: AggregatedBallots,
        config: ElectionConfig,
        timeout: Duration,
    ) -> Result<TallyResult, WorkerFailure> {
        let abort = Arc::new(AtomicBool::new(false));
        let counter = Arc::clone(&self.counter);
        let flag = Arc::clone(&abort);
        let handle =
            tokio::task::spawn_blocking(move || counter.count(&ballots, &config, &flag));

        match tokio::time::timeout(timeout, handle).await {
            Ok(Ok(Ok(res))) => {
                debug!("TallyWorker: count finished");
                Ok(res)
            }
            Ok(Ok(Err(e))) => CrashSnafu {
                details: e.to_string(),
            }
            .fail(),
            Ok(Err(join_err)) => {
                let details = if join_err.is_panic() {
                    panic_details(join_err.into_panic())
                } else {
                    join_err.to_string()
                };
                CrashSnafu { details }.fail()
            }
            Err(_) => {
                // The blocking thread cannot be killed; the counter sees the flag and stops.
                warn!("TallyWorker: count timed out after {:?}, aborting it", timeout);
                abort.store(true, Ordering::Relaxed);
                TimeoutSnafu { after: timeout }.fail()
            }
        }
    }
}

fn panic_details(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("panic: {}", s)
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("panic: {}", s)
    } else {
        "panic".to_string()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use stv_tally::{aggregate, Ballot};

    /// A counter for tests: counts its calls and can be slowed down, hang or panic.
    #[derive(Default)]
    pub(crate) struct ScriptedCounter {
        pub calls: AtomicUsize,
        pub delay: Duration,
        /// Calls with this number (starting at 1) hang until aborted.
        pub hang_on_call: Option<usize>,
        pub panic: bool,
        pub aborted: AtomicBool,
    }

    impl Counter for ScriptedCounter {
        fn count(
            &self,
            ballots: &AggregatedBallots,
            config: &ElectionConfig,
            abort: &AtomicBool,
        ) -> Result<TallyResult, TallyError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if self.panic {
                panic!("scripted failure");
            }
            if self.hang_on_call == Some(call) {
                while !abort.load(Ordering::Relaxed) {
                    std::thread::sleep(Duration::from_millis(5));
                }
                self.aborted.store(true, Ordering::SeqCst);
                return Err(TallyError::Aborted);
            }
            std::thread::sleep(self.delay);
            stv_tally::tally(ballots, config)
        }
    }

    fn inputs() -> (AggregatedBallots, ElectionConfig) {
        let config = ElectionConfig::new(1, 0, 3).unwrap();
        let ballots = vec![Ballot::from(vec![0]), Ballot::from(vec![0, 1])];
        let (agg, _) = aggregate(&ballots, &config, true).unwrap();
        (agg, config)
    }

    #[tokio::test]
    async fn returns_the_count() {
        let (agg, config) = inputs();
        let res = TallyWorker::default()
            .run(agg, config, Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(res.winners, vec![0]);
    }

    #[tokio::test]
    async fn contains_panics() {
        let counter = Arc::new(ScriptedCounter {
            panic: true,
            ..Default::default()
        });
        let (agg, config) = inputs();
        let err = TallyWorker::new(counter)
            .run(agg, config, Duration::from_secs(5))
            .await
            .unwrap_err();
        assert_eq!(err.reason(), "crash");
        assert_eq!(
            err,
            WorkerFailure::Crash {
                details: "panic: scripted failure".to_string()
            }
        );
    }

    #[tokio::test]
    async fn aborts_slow_counts() {
        let counter = Arc::new(ScriptedCounter {
            hang_on_call: Some(1),
            ..Default::default()
        });
        let (agg, config) = inputs();
        let err = TallyWorker::new(counter.clone())
            .run(agg, config, Duration::from_millis(50))
            .await
            .unwrap_err();
        assert_eq!(err.reason(), "timeout");
        // The abandoned count notices the flag shortly after.
        for _ in 0..200 {
            if counter.aborted.load(Ordering::SeqCst) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert!(counter.aborted.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn count_errors_are_crashes() {
        let config = ElectionConfig::new(1, 0, 3).unwrap();
        let err = TallyWorker::default()
            .run(AggregatedBallots::new(), config, Duration::from_secs(5))
            .await
            .unwrap_err();
        assert_eq!(err.reason(), "crash");
    }
}
