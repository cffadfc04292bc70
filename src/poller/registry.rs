// The set of polls served by the process.

use log::{debug, info, warn};
use parking_lot::RwLock;
use snafu::prelude::*;
use stv_tally::{validate_ballot, Ballot, ElectionConfig};
use tokio::fs;
use tokio::runtime::Handle;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use crate::poller::ballot_log::BallotLog;
use crate::poller::cache::ResultCache;
use crate::poller::worker::TallyWorker;
use crate::poller::ResultMode;
use crate::teller::config_reader::*;
use crate::teller::{
    InvalidBallotSnafu, ParsingJsonSnafu, ReadingFileSnafu, TellerError, TellerResult,
    UnknownPollSnafu, WritingFileSnafu, WritingJsonSnafu,
};

pub const CONFIG_FILE: &str = "config.json";
pub const VOTES_FILE: &str = "votes.csv";

/// A poll and its results.
pub struct Poll {
    data: PollData,
    cache: ResultCache,
}

impl Poll {
    pub fn data(&self) -> &PollData {
        &self.data
    }

    pub fn config(&self) -> &ElectionConfig {
        self.cache.config()
    }

    pub fn cache(&self) -> &ResultCache {
        &self.cache
    }

    /// Checks a ballot for this poll, failing on the first broken rule.
    pub fn validate_vote(&self, preferences: &[usize]) -> TellerResult<()> {
        validate_ballot(preferences, self.config()).context(InvalidBallotSnafu {})
    }
}

/// All the polls stored in a folder, one sub-folder per poll.
///
/// Each sub-folder holds the description of the poll (`config.json`) and its
/// votes (`votes.csv`).
pub struct PollRegistry {
    folder: PathBuf,
    settings: ServiceSettings,
    worker: TallyWorker,
    runtime: Handle,
    polls: RwLock<BTreeMap<ElectionId, Arc<Poll>>>,
    next_id: AtomicU32,
}

impl PollRegistry {
    pub async fn open(settings: ServiceSettings) -> TellerResult<PollRegistry> {
        PollRegistry::open_with_worker(settings, TallyWorker::default()).await
    }

    /// Loads the polls found in the folder of the settings. The folder is
    /// created if needed. Every loaded poll starts a recount.
    pub async fn open_with_worker(
        settings: ServiceSettings,
        worker: TallyWorker,
    ) -> TellerResult<PollRegistry> {
        let folder = settings.polls_folder.clone();
        fs::create_dir_all(&folder)
            .await
            .context(WritingFileSnafu { path: &folder })?;

        let registry = PollRegistry {
            folder: folder.clone(),
            settings,
            worker,
            runtime: Handle::current(),
            polls: RwLock::new(BTreeMap::new()),
            next_id: AtomicU32::new(0),
        };

        let mut entries = fs::read_dir(&folder)
            .await
            .context(ReadingFileSnafu { path: &folder })?;
        while let Some(child) = entries
            .next_entry()
            .await
            .context(ReadingFileSnafu { path: &folder })?
        {
            let child_p = child.path();
            if !child_p.is_dir() {
                warn!("Non poll file {:?} is in the poll folder", child_p);
                continue;
            }
            let config_p = child_p.join(CONFIG_FILE);
            let votes_p = child_p.join(VOTES_FILE);
            if !(config_p.is_file() && votes_p.is_file()) {
                warn!(
                    "Folder {:?} is in the poll folder but does not contain poll files",
                    child_p
                );
                continue;
            }
            match registry.load_poll(&config_p, votes_p).await {
                Ok(poll) => registry.insert_loaded(poll),
                Err(e) => warn!("Skipping poll in {:?}: {}", child_p, e),
            }
        }
        info!(
            "Loaded {} polls from {:?}",
            registry.polls.read().len(),
            folder
        );
        Ok(registry)
    }

    async fn load_poll(&self, config_p: &Path, votes_p: PathBuf) -> TellerResult<Poll> {
        let contents = fs::read_to_string(config_p)
            .await
            .context(ReadingFileSnafu { path: config_p })?;
        let data: PollData =
            serde_json::from_str(&contents).context(ParsingJsonSnafu { path: config_p })?;
        let config = data.election_config()?;
        let log = BallotLog::open(votes_p, self.settings.max_append_bytes);
        Ok(self.make_poll(data, config, log))
    }

    fn insert_loaded(&self, poll: Poll) {
        let id = poll.data.election_id;
        let mut polls = self.polls.write();
        if polls.contains_key(&id) {
            warn!("Multiple polls using id {}, keeping the first one", id);
            return;
        }
        debug!("Loaded poll {}: {:?}", id, poll.data.election_name);
        poll.cache.refresh();
        polls.insert(id, Arc::new(poll));
        self.next_id.fetch_max(id.saturating_add(1), Ordering::SeqCst);
    }

    fn make_poll(&self, data: PollData, config: ElectionConfig, log: BallotLog) -> Poll {
        let cache = ResultCache::new(
            data.election_id,
            config,
            log,
            self.worker.clone(),
            self.settings.recount_timeout(),
            self.runtime.clone(),
        );
        Poll { data, cache }
    }

    pub fn folder(&self) -> &Path {
        &self.folder
    }

    pub fn poll_list(&self) -> Vec<PollSummary> {
        self.polls
            .read()
            .values()
            .map(|p| p.data.summary())
            .collect()
    }

    pub fn get(&self, id: ElectionId) -> TellerResult<Arc<Poll>> {
        self.polls
            .read()
            .get(&id)
            .cloned()
            .context(UnknownPollSnafu { id })
    }

    pub fn details(&self, id: ElectionId) -> TellerResult<PollData> {
        Ok(self.get(id)?.data.clone())
    }

    /// Stores a new poll and returns its id.
    pub async fn add_poll(&self, new_poll: NewPoll) -> TellerResult<ElectionId> {
        let config = new_poll.election_config()?;
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let data = new_poll.with_id(id);

        let poll_dir = self.folder.join(id.to_string());
        fs::create_dir_all(&poll_dir)
            .await
            .context(WritingFileSnafu { path: &poll_dir })?;
        let config_p = poll_dir.join(CONFIG_FILE);
        let js = serde_json::to_string_pretty(&data).context(WritingJsonSnafu {})?;
        fs::write(&config_p, js)
            .await
            .context(WritingFileSnafu { path: &config_p })?;
        let log = BallotLog::create(poll_dir.join(VOTES_FILE), self.settings.max_append_bytes)
            .await?;

        let poll = self.make_poll(data, config, log);
        poll.cache.refresh();
        self.polls.write().insert(id, Arc::new(poll));
        info!("Created poll {} in {:?}", id, poll_dir);
        Ok(id)
    }

    /// Validates the vote and queues it. The vote is counted in the background.
    pub fn submit(&self, vote: &Vote) -> TellerResult<()> {
        let poll = self.get(vote.election_id)?;
        poll.validate_vote(&vote.preferences)?;
        poll.cache.submit(Ballot::from(vote.preferences.clone()));
        Ok(())
    }

    pub async fn results(&self, id: ElectionId, mode: ResultMode) -> TellerResult<PollResults> {
        let poll = self.get(id)?;
        let res = poll.cache.result(mode).await?;
        Ok(PollResults::from(res.as_ref()))
    }

    /// The content of the vote file of a poll.
    pub async fn export(&self, id: ElectionId) -> TellerResult<String> {
        let poll = self.get(id)?;
        poll.cache.log().export().await
    }

    /// Stops serving a poll once its queued ballots are recorded. The files are kept.
    pub async fn close(&self, id: ElectionId) -> TellerResult<()> {
        let poll = self
            .polls
            .write()
            .remove(&id)
            .ok_or(TellerError::UnknownPoll { id })?;
        poll.cache.settle().await;
        info!("Closed poll {}", id);
        Ok(())
    }

    /// Waits for all the queued ballots to be recorded and counted.
    pub async fn shutdown(&self) {
        let polls: Vec<Arc<Poll>> = self.polls.read().values().cloned().collect();
        for poll in polls {
            poll.cache.settle().await;
        }
    }
}
