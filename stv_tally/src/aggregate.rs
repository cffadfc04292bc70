use log::{debug, warn};

use std::collections::{BTreeMap, HashSet};

use crate::config::*;

/// How many identical ballots were cast, and how much each one still weighs.
#[derive(PartialEq, Debug, Clone, Copy)]
pub struct BallotWeight {
    pub count: u64,
    pub weight: f64,
}

/// The ballots of an election, grouped by identical ranking.
///
/// Rankings are kept sorted so that iterating over the table always happens
/// in the same order. The floating point sums of the count depend on it.
#[derive(PartialEq, Debug, Clone, Default)]
pub struct AggregatedBallots {
    entries: BTreeMap<Vec<usize>, BallotWeight>,
}

impl AggregatedBallots {
    pub fn new() -> AggregatedBallots {
        AggregatedBallots::default()
    }

    /// Records one more ballot with this ranking. The ranking is expected to be valid.
    pub fn add(&mut self, ranking: &[usize]) {
        if let Some(entry) = self.entries.get_mut(ranking) {
            entry.count += 1;
        } else {
            self.entries.insert(
                ranking.to_vec(),
                BallotWeight {
                    count: 1,
                    weight: 1.0,
                },
            );
        }
    }

    /// The number of ballots, including the duplicates.
    pub fn total(&self) -> u64 {
        self.entries.values().map(|e| e.count).sum()
    }

    /// The number of distinct rankings.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, ranking: &[usize]) -> Option<&BallotWeight> {
        self.entries.get(ranking)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Vec<usize>, &BallotWeight)> {
        self.entries.iter()
    }
}

/// Checks a single ballot against the rules of the election.
///
/// The checks run in a fixed order and the first failing one is reported.
pub fn validate_ballot(preferences: &[usize], config: &ElectionConfig) -> Result<(), BallotError> {
    if preferences.is_empty() {
        return Err(BallotError::EmptyBallot);
    }
    if preferences.len() > config.candidate_count {
        return Err(BallotError::TooManyPreferences {
            count: preferences.len(),
            max: config.candidate_count,
        });
    }
    let min = config.minimum_preferences as usize;
    if min > 0 && preferences.len() < min {
        return Err(BallotError::InsufficientPreferences {
            count: preferences.len(),
            min,
        });
    }
    if let Some(&candidate) = preferences
        .iter()
        .find(|&&cid| cid >= config.candidate_count)
    {
        return Err(BallotError::PreferenceOutOfRange {
            candidate,
            candidates: config.candidate_count,
        });
    }
    let mut seen: HashSet<usize> = HashSet::new();
    for &cid in preferences.iter() {
        if !seen.insert(cid) {
            return Err(BallotError::DuplicatePreference { candidate: cid });
        }
    }
    Ok(())
}

/// Groups the ballots by ranking.
///
/// With `reject_invalid`, the first invalid ballot fails the whole call. Otherwise
/// invalid ballots are skipped, and the number of skipped ballots is returned
/// along with the table.
pub fn aggregate(
    ballots: &[Ballot],
    config: &ElectionConfig,
    reject_invalid: bool,
) -> Result<(AggregatedBallots, usize), BallotError> {
    let mut res = AggregatedBallots::new();
    let mut dropped: usize = 0;
    for (idx, ballot) in ballots.iter().enumerate() {
        match validate_ballot(&ballot.preferences, config) {
            Ok(()) => res.add(&ballot.preferences),
            Err(e) if reject_invalid => return Err(e),
            Err(e) => {
                warn!("aggregate: dropping ballot #{} {:?}: {}", idx, ballot, e);
                dropped += 1;
            }
        }
    }
    debug!(
        "aggregate: {} ballots, {} distinct rankings, {} dropped",
        res.total(),
        res.len(),
        dropped
    );
    Ok((res, dropped))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(winners: u32, minimum: u32, candidates: usize) -> ElectionConfig {
        ElectionConfig::new(winners, minimum, candidates).unwrap()
    }

    fn ballots(rankings: &[&[usize]]) -> Vec<Ballot> {
        rankings.iter().map(|r| Ballot::from(*r)).collect()
    }

    #[test]
    fn identical_rankings_are_merged() {
        let (agg, dropped) =
            aggregate(&ballots(&[&[0, 1], &[0, 1], &[1]]), &config(1, 0, 3), true).unwrap();
        assert_eq!(dropped, 0);
        assert_eq!(agg.len(), 2);
        assert_eq!(agg.total(), 3);
        assert_eq!(
            agg.get(&[0, 1]),
            Some(&BallotWeight {
                count: 2,
                weight: 1.0
            })
        );
    }

    #[test]
    fn checks_run_in_order() {
        let c = config(1, 2, 3);
        assert_eq!(validate_ballot(&[], &c), Err(BallotError::EmptyBallot));
        assert_eq!(
            validate_ballot(&[0, 1, 2, 0], &c),
            Err(BallotError::TooManyPreferences { count: 4, max: 3 })
        );
        // Too short and out of range at the same time: the length wins.
        assert_eq!(
            validate_ballot(&[7], &c),
            Err(BallotError::InsufficientPreferences { count: 1, min: 2 })
        );
        assert_eq!(
            validate_ballot(&[0, 3], &c),
            Err(BallotError::PreferenceOutOfRange {
                candidate: 3,
                candidates: 3
            })
        );
        assert_eq!(
            validate_ballot(&[2, 2], &c),
            Err(BallotError::DuplicatePreference { candidate: 2 })
        );
        assert_eq!(validate_ballot(&[2, 0], &c), Ok(()));
    }

    #[test]
    fn no_minimum_when_zero() {
        assert_eq!(validate_ballot(&[1], &config(1, 0, 3)), Ok(()));
    }

    #[test]
    fn strict_mode_fails_on_first_invalid_ballot() {
        let res = aggregate(&ballots(&[&[0], &[1, 1], &[]]), &config(1, 0, 2), true);
        assert_eq!(res, Err(BallotError::DuplicatePreference { candidate: 1 }));
    }

    #[test]
    fn lenient_mode_drops_invalid_ballots() {
        let _ = env_logger::builder().is_test(true).try_init();
        let (agg, dropped) = aggregate(
            &ballots(&[&[0], &[1, 1], &[], &[5], &[1, 0]]),
            &config(1, 0, 2),
            false,
        )
        .unwrap();
        assert_eq!(dropped, 3);
        assert_eq!(agg.total(), 2);
        assert_eq!(agg.len(), 2);
    }
}
