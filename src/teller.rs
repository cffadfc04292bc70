use log::{debug, info, warn};

use snafu::{prelude::*, Snafu};
use stv_tally::*;

use std::fs;
use std::path::{Path, PathBuf};

use serde_json::json;
use serde_json::Map as JSMap;
use serde_json::Value as JSValue;
use text_diff::print_diff;

use crate::poller::worker::WorkerFailure;
use crate::teller::config_reader::*;
use crate::teller::io_votes::parse_votes;

pub mod config_reader;
pub mod io_votes;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum TellerError {
    #[snafu(display("Invalid ballot: {source}"))]
    InvalidBallot { source: BallotError },
    #[snafu(display("Invalid poll: {source}"))]
    InvalidConfig { source: ConfigError },
    #[snafu(display(
        "Invalid poll: {names} candidate names but {descriptions} candidate descriptions"
    ))]
    DescriptionMismatch { names: usize, descriptions: usize },
    #[snafu(display("Invalid poll id {id}"))]
    UnknownPoll { id: ElectionId },
    #[snafu(display("No result has been computed yet for poll {id}"))]
    NotReady { id: ElectionId },
    #[snafu(display(
        "Appending {size} bytes to the vote file exceeds the limit of {limit} bytes"
    ))]
    CapacityExceeded { size: usize, limit: u64 },
    #[snafu(display("Counting failed: {source}"))]
    EngineFailure { source: WorkerFailure },
    #[snafu(display("Error reading {}", path.display()))]
    ReadingFile {
        source: std::io::Error,
        path: PathBuf,
    },
    #[snafu(display("Error writing {}", path.display()))]
    WritingFile {
        source: std::io::Error,
        path: PathBuf,
    },
    #[snafu(display("Error parsing JSON in {}", path.display()))]
    ParsingJson {
        source: serde_json::Error,
        path: PathBuf,
    },
    #[snafu(display("Error writing JSON"))]
    WritingJson { source: serde_json::Error },
    #[snafu(display("Error encoding votes"))]
    EncodingVotes { source: csv::Error },
    #[snafu(display("Difference detected between calculated summary and reference summary"))]
    ReferenceMismatch {},

    #[snafu(whatever, display("{message}"))]
    Whatever {
        message: String,
        #[snafu(source(from(Box<dyn std::error::Error + Send + Sync>, Some)))]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

pub type TellerResult<T> = Result<T, TellerError>;

/// Counts the ballots, or returns the result of an election without ballots.
pub fn count_ballots(ballots: &[Ballot], config: &ElectionConfig) -> TellerResult<TallyResult> {
    let (agg, dropped) = aggregate(ballots, config, false).context(InvalidBallotSnafu {})?;
    if dropped > 0 {
        warn!("count_ballots: {} invalid ballots were not counted", dropped);
    }
    if agg.is_empty() {
        info!("count_ballots: no valid ballot, all candidates are tied");
        return Ok(TallyResult::full_tie(config.candidate_count));
    }
    match tally(&agg, config) {
        Ok(res) => Ok(res),
        Err(e) => whatever!("Counting error: {}", e),
    }
}

fn candidate_name(poll: &NewPoll, cid: usize) -> String {
    poll.candidate_names
        .get(cid)
        .cloned()
        .unwrap_or_else(|| format!("#{}", cid))
}

fn names(poll: &NewPoll, cids: &[usize]) -> Vec<String> {
    cids.iter().map(|&cid| candidate_name(poll, cid)).collect()
}

fn round_stats_to_json(poll: &NewPoll, res: &TallyResult) -> Vec<JSValue> {
    let mut l: Vec<JSValue> = Vec::new();
    for round_stat in res.rounds.iter() {
        let mut tally: JSMap<String, JSValue> = JSMap::new();
        for (cid, votes) in round_stat.votes.iter().enumerate() {
            if *votes > 0.0 {
                tally.insert(candidate_name(poll, cid), json!(format!("{:.4}", votes)));
            }
        }

        let mut tally_results: Vec<JSValue> = Vec::new();
        for name in names(poll, &round_stat.elected) {
            tally_results.push(json!({ "elected": name }));
        }
        for name in names(poll, &round_stat.excluded) {
            tally_results.push(json!({ "eliminated": name }));
        }

        l.push(json!({"round": round_stat.round, "tally": tally, "tallyResults": tally_results}));
    }
    l
}

/// The summary of an election, as printed by the `count` command.
pub fn build_summary_js(poll: &NewPoll, res: &TallyResult) -> JSValue {
    let mut first_preferences: JSMap<String, JSValue> = JSMap::new();
    for (cid, count) in res.first_preferences.iter().enumerate() {
        first_preferences.insert(candidate_name(poll, cid), json!(count));
    }
    json!({
        "config": {
            "contest": poll.election_name,
            "seats": poll.winner_amount,
            "threshold": res.quota.to_string(),
        },
        "winners": names(poll, &res.winners),
        "tiedWinners": names(poll, &res.tied_winners),
        "firstPreferences": first_preferences,
        "results": round_stats_to_json(poll, res),
    })
}

pub fn read_summary(path: &Path) -> TellerResult<JSValue> {
    read_json(path)
}

/// Counts a vote file for the poll described in `config_path`.
///
/// `out` is either a file path or `stdout`. When a reference summary is given,
/// the computed summary must match it.
pub fn run_count(
    config_path: &Path,
    votes_path: &Path,
    out: Option<String>,
    check_summary_path: Option<PathBuf>,
) -> TellerResult<TallyResult> {
    let poll = read_new_poll(config_path)?;
    info!("config: {:?}", poll);
    let config = poll.election_config()?;

    info!("Attempting to read vote file {:?}", votes_path);
    let data = fs::read(votes_path).context(ReadingFileSnafu { path: votes_path })?;
    let (ballots, unreadable) = parse_votes(&data);
    if unreadable > 0 {
        warn!("run_count: {} unreadable lines in {:?}", unreadable, votes_path);
    }
    debug!("run_count: {} ballots read", ballots.len());

    let result = count_ballots(&ballots, &config)?;
    info!("res {:?}", result);

    let result_js = build_summary_js(&poll, &result);
    let pretty_js_stats = serde_json::to_string_pretty(&result_js).context(WritingJsonSnafu {})?;
    match out.as_deref() {
        None | Some("stdout") => println!("{}", pretty_js_stats),
        Some(path) => {
            info!("Writing summary to {}", path);
            fs::write(path, &pretty_js_stats).context(WritingFileSnafu { path })?;
        }
    }

    // The reference summary, if provided for comparison
    if let Some(summary_p) = check_summary_path {
        let summary_ref = read_summary(&summary_p)?;
        let pretty_js_summary_ref =
            serde_json::to_string_pretty(&summary_ref).context(WritingJsonSnafu {})?;
        if pretty_js_summary_ref != pretty_js_stats {
            warn!("Found differences with the reference string");
            print_diff(
                pretty_js_summary_ref.as_str(),
                pretty_js_stats.as_ref(),
                "\n",
            );
            return ReferenceMismatchSnafu {}.fail();
        }
    }

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn poll() -> NewPoll {
        NewPoll {
            election_name: "Lunch".to_string(),
            minimum_preferences: 0,
            winner_amount: 1,
            candidate_names: vec!["Pizza".into(), "Sushi".into(), "Tacos".into()],
            candidate_descriptions: vec!["".into(), "".into(), "".into()],
            randomise_order: false,
        }
    }

    fn write_inputs(dir: &Path, votes: &str) -> (PathBuf, PathBuf) {
        let config_p = dir.join("config.json");
        let votes_p = dir.join("votes.csv");
        fs::write(&config_p, serde_json::to_string(&poll()).unwrap()).unwrap();
        fs::write(&votes_p, votes).unwrap();
        (config_p, votes_p)
    }

    #[test]
    fn counts_a_vote_file() {
        let dir = tempfile::tempdir().unwrap();
        let (config_p, votes_p) = write_inputs(dir.path(), "0\n0\n1\n");
        let out_p = dir.path().join("summary.json");
        let res = run_count(
            &config_p,
            &votes_p,
            Some(out_p.display().to_string()),
            None,
        )
        .unwrap();
        assert_eq!(res.winners, vec![0]);
        assert_eq!(res.first_preferences, vec![2, 1, 0]);

        let summary = read_summary(&out_p).unwrap();
        assert_eq!(summary["winners"], json!(["Pizza"]));
        assert_eq!(summary["config"]["threshold"], json!("2"));
        assert_eq!(summary["results"][0]["tallyResults"][0]["elected"], "Pizza");
    }

    #[test]
    fn matches_its_own_reference() {
        let dir = tempfile::tempdir().unwrap();
        let (config_p, votes_p) = write_inputs(dir.path(), "0,1\n1,0\n2,1\n1\n");
        let out_p = dir.path().join("summary.json");
        run_count(&config_p, &votes_p, Some(out_p.display().to_string()), None).unwrap();
        let res = run_count(
            &config_p,
            &votes_p,
            Some(out_p.display().to_string()),
            Some(out_p.clone()),
        );
        assert!(res.is_ok());
    }

    #[test]
    fn reports_reference_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        let (config_p, votes_p) = write_inputs(dir.path(), "0\n");
        let ref_p = dir.path().join("reference.json");
        fs::write(&ref_p, r#"{"winners": ["Sushi"]}"#).unwrap();
        let out_p = dir.path().join("summary.json");
        let res = run_count(
            &config_p,
            &votes_p,
            Some(out_p.display().to_string()),
            Some(ref_p),
        );
        assert!(matches!(res, Err(TellerError::ReferenceMismatch {})));
    }

    #[test]
    fn empty_vote_file_is_a_full_tie() {
        let dir = tempfile::tempdir().unwrap();
        let (config_p, votes_p) = write_inputs(dir.path(), "");
        let out_p = dir.path().join("summary.json");
        let res =
            run_count(&config_p, &votes_p, Some(out_p.display().to_string()), None).unwrap();
        assert!(res.winners.is_empty());
        assert_eq!(res.tied_winners, vec![0, 1, 2]);
    }

    #[test]
    fn invalid_ballots_are_not_counted() {
        let res = count_ballots(
            &[
                Ballot::from(vec![1, 1]),
                Ballot::from(vec![4]),
                Ballot::from(vec![2]),
            ],
            &ElectionConfig::new(1, 0, 3).unwrap(),
        )
        .unwrap();
        assert_eq!(res.winners, vec![2]);
        assert_eq!(res.first_preferences, vec![0, 0, 1]);
    }
}
