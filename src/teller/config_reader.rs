use log::debug;
use serde::{Deserialize, Serialize};
use snafu::prelude::*;
use stv_tally::{ElectionConfig, TallyResult};

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::teller::{
    DescriptionMismatchSnafu, InvalidConfigSnafu, ParsingJsonSnafu, ReadingFileSnafu,
    TellerResult,
};

pub type ElectionId = u32;

/// A poll as sent by a client, before it is given an id.
#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct NewPoll {
    pub election_name: String,
    pub minimum_preferences: u32,
    pub winner_amount: u32,
    pub candidate_names: Vec<String>,
    pub candidate_descriptions: Vec<String>,
    #[serde(default)]
    pub randomise_order: bool,
}

impl NewPoll {
    /// Checks the poll and returns the rules used to count it.
    pub fn election_config(&self) -> TellerResult<ElectionConfig> {
        ensure!(
            self.candidate_names.len() == self.candidate_descriptions.len(),
            DescriptionMismatchSnafu {
                names: self.candidate_names.len(),
                descriptions: self.candidate_descriptions.len(),
            }
        );
        ElectionConfig::new(
            self.winner_amount,
            self.minimum_preferences,
            self.candidate_names.len(),
        )
        .context(InvalidConfigSnafu {})
    }

    pub fn with_id(self, election_id: ElectionId) -> PollData {
        PollData {
            election_name: self.election_name,
            minimum_preferences: self.minimum_preferences,
            winner_amount: self.winner_amount,
            candidate_names: self.candidate_names,
            candidate_descriptions: self.candidate_descriptions,
            randomise_order: self.randomise_order,
            election_id,
        }
    }
}

/// The stored description of a poll.
#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct PollData {
    pub election_name: String,
    pub minimum_preferences: u32,
    pub winner_amount: u32,
    pub candidate_names: Vec<String>,
    pub candidate_descriptions: Vec<String>,
    pub randomise_order: bool,
    pub election_id: ElectionId,
}

impl PollData {
    pub fn election_config(&self) -> TellerResult<ElectionConfig> {
        self.to_new_poll().election_config()
    }

    pub fn summary(&self) -> PollSummary {
        PollSummary {
            election_name: self.election_name.clone(),
            election_id: self.election_id,
        }
    }

    fn to_new_poll(&self) -> NewPoll {
        NewPoll {
            election_name: self.election_name.clone(),
            minimum_preferences: self.minimum_preferences,
            winner_amount: self.winner_amount,
            candidate_names: self.candidate_names.clone(),
            candidate_descriptions: self.candidate_descriptions.clone(),
            randomise_order: self.randomise_order,
        }
    }
}

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct PollSummary {
    pub election_name: String,
    pub election_id: ElectionId,
}

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct PollResults {
    pub winners: Vec<usize>,
    pub tied_winners: Vec<usize>,
    pub first_preferences: Vec<u64>,
}

impl From<&TallyResult> for PollResults {
    fn from(res: &TallyResult) -> Self {
        PollResults {
            winners: res.winners.clone(),
            tied_winners: res.tied_winners.clone(),
            first_preferences: res.first_preferences.clone(),
        }
    }
}

/// A ballot for a given poll.
#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct Vote {
    pub election_id: ElectionId,
    pub preferences: Vec<usize>,
}

/// Settings of the poll service.
///
/// All the entries are optional in the settings file.
#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct ServiceSettings {
    #[serde(rename = "pollsFolder", default = "default_polls_folder")]
    pub polls_folder: PathBuf,
    /// Wall-clock limit of a single recount.
    #[serde(rename = "recountTimeoutMs", default = "default_recount_timeout_ms")]
    pub recount_timeout_ms: u64,
    /// Largest batch of ballots that can be appended at once to a vote file.
    #[serde(rename = "maxAppendBytes", default = "default_max_append_bytes")]
    pub max_append_bytes: u64,
}

pub const DEFAULT_POLLS_FOLDER: &str = "polls";

fn default_polls_folder() -> PathBuf {
    PathBuf::from(DEFAULT_POLLS_FOLDER)
}

fn default_recount_timeout_ms() -> u64 {
    10_000
}

fn default_max_append_bytes() -> u64 {
    1024 * 1024
}

impl Default for ServiceSettings {
    fn default() -> Self {
        ServiceSettings {
            polls_folder: default_polls_folder(),
            recount_timeout_ms: default_recount_timeout_ms(),
            max_append_bytes: default_max_append_bytes(),
        }
    }
}

impl ServiceSettings {
    pub fn recount_timeout(&self) -> Duration {
        Duration::from_millis(self.recount_timeout_ms)
    }

    pub fn with_polls_folder(self, polls_folder: impl Into<PathBuf>) -> ServiceSettings {
        ServiceSettings {
            polls_folder: polls_folder.into(),
            ..self
        }
    }
}

pub fn read_settings(path: &Path) -> TellerResult<ServiceSettings> {
    read_json(path)
}

pub fn read_new_poll(path: &Path) -> TellerResult<NewPoll> {
    read_json(path)
}

pub fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> TellerResult<T> {
    let contents = fs::read_to_string(path).context(ReadingFileSnafu { path })?;
    debug!("read content of {}: {:?}", path.display(), contents);
    serde_json::from_str(contents.as_str()).context(ParsingJsonSnafu { path })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::teller::TellerError;
    use stv_tally::ConfigError;

    fn new_poll(names: usize, descriptions: usize, winners: u32) -> NewPoll {
        NewPoll {
            election_name: "Board".to_string(),
            minimum_preferences: 0,
            winner_amount: winners,
            candidate_names: (0..names).map(|i| format!("c{}", i)).collect(),
            candidate_descriptions: (0..descriptions).map(|_| String::new()).collect(),
            randomise_order: false,
        }
    }

    #[test]
    fn valid_poll() {
        let config = new_poll(3, 3, 2).election_config().unwrap();
        assert_eq!(config.candidate_count, 3);
        assert_eq!(config.winner_amount, 2);
    }

    #[test]
    fn descriptions_must_match_names() {
        let err = new_poll(3, 2, 1).election_config().unwrap_err();
        assert!(matches!(
            err,
            TellerError::DescriptionMismatch {
                names: 3,
                descriptions: 2
            }
        ));
    }

    #[test]
    fn at_least_one_winner() {
        let err = new_poll(3, 3, 0).election_config().unwrap_err();
        assert!(matches!(
            err,
            TellerError::InvalidConfig {
                source: ConfigError::NoWinners
            }
        ));
    }

    #[test]
    fn settings_defaults() {
        let s: ServiceSettings = serde_json::from_str(r#"{"recountTimeoutMs": 250}"#).unwrap();
        assert_eq!(s.recount_timeout(), Duration::from_millis(250));
        assert_eq!(s.polls_folder, PathBuf::from("polls"));
        assert_eq!(s.max_append_bytes, 1024 * 1024);
    }

    #[test]
    fn poll_data_format() {
        let js = r#"{
            "election_name": "Board",
            "minimum_preferences": 1,
            "winner_amount": 1,
            "candidate_names": ["Alice", "Bob"],
            "candidate_descriptions": ["", ""],
            "randomise_order": true,
            "election_id": 4
        }"#;
        let data: PollData = serde_json::from_str(js).unwrap();
        assert_eq!(data.election_id, 4);
        assert_eq!(data.summary().election_name, "Board");
        // The id is not needed to describe a new poll.
        let np: NewPoll = serde_json::from_str(js).unwrap();
        assert_eq!(np.with_id(4), data);
    }
}
