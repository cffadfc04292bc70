mod aggregate;
mod config;
pub mod manual;

use log::{debug, info};

use std::collections::BTreeSet;

pub use crate::aggregate::*;
pub use crate::config::*;

/// Slack granted when comparing a vote total with the quota. Surplus
/// transfers multiply weights by fractions, and the sums may land a hair
/// below a quota they mathematically reach.
pub const QUOTA_EPSILON: f64 = 1e-9;

// How many ballot entries are credited between two checks of the stop hook.
const STOP_CHECK_INTERVAL: usize = 1024;

// **** Private structures ****

// A ballot entry while the count is running. The weight is a private copy:
// the aggregated ballots given by the caller are never modified.
#[derive(Debug, Clone)]
struct WorkingEntry<'a> {
    ranking: &'a [usize],
    count: u64,
    weight: f64,
    // The candidate this entry was credited to in the current round.
    holder: Option<usize>,
}

/// The Droop quota: the smallest whole number of votes that is strictly more
/// than a `1 / (winner_amount + 1)` share of the ballots.
pub fn droop_quota(total: u64, winner_amount: u32) -> u64 {
    total / (winner_amount as u64 + 1) + 1
}

/// Number of ballots that rank each candidate first, regardless of their weight.
pub fn first_preferences(ballots: &AggregatedBallots, candidate_count: usize) -> Vec<u64> {
    let mut res = vec![0u64; candidate_count];
    for (ranking, bw) in ballots.iter() {
        if let Some(slot) = ranking.first().and_then(|&cid| res.get_mut(cid)) {
            *slot += bw.count;
        }
    }
    res
}

/// Runs the count for the given ballots.
///
/// Arguments:
/// * `ballots` the ballots, already validated and grouped by `aggregate`
/// * `config` the rules of this election
pub fn tally(
    ballots: &AggregatedBallots,
    config: &ElectionConfig,
) -> Result<TallyResult, TallyError> {
    tally_until(ballots, config, || false)
}

/// Same as `tally`, but gives up with `TallyError::Aborted` as soon as
/// `should_stop` returns true. It is checked before every round and
/// regularly while crediting the ballots.
pub fn tally_until<F>(
    ballots: &AggregatedBallots,
    config: &ElectionConfig,
    should_stop: F,
) -> Result<TallyResult, TallyError>
where
    F: Fn() -> bool,
{
    let total = ballots.total();
    if total == 0 {
        return Err(TallyError::NoBallots);
    }
    let candidate_count = config.candidate_count;
    let winner_amount = config.winner_amount as usize;
    let quota = droop_quota(total, config.winner_amount);
    info!(
        "Processing {} ballots ({} distinct rankings), candidates: {}, seats: {}, quota: {}",
        total,
        ballots.len(),
        candidate_count,
        winner_amount,
        quota
    );

    let first_preferences = first_preferences(ballots, candidate_count);
    debug!("tally: first preferences: {:?}", first_preferences);

    let mut entries: Vec<WorkingEntry> = ballots
        .iter()
        .map(|(ranking, bw)| WorkingEntry {
            ranking: ranking.as_slice(),
            count: bw.count,
            weight: bw.weight,
            holder: None,
        })
        .collect();

    let mut winners: BTreeSet<usize> = BTreeSet::new();
    let mut excluded: Vec<bool> = vec![false; candidate_count];
    let mut tied_winners: Vec<usize> = Vec::new();
    let mut rounds: Vec<RoundStats> = Vec::new();

    while winners.len() < winner_amount && tied_winners.is_empty() {
        if should_stop() {
            info!("tally: stop requested after {} rounds", rounds.len());
            return Err(TallyError::Aborted);
        }
        let round_id = (rounds.len() + 1) as u32;

        let continuing: Vec<usize> = (0..candidate_count).filter(|&c| !excluded[c]).collect();
        if continuing.is_empty() {
            // Only happens when more seats than candidates are left.
            debug!("tally: no continuing candidate left in round {}", round_id);
            break;
        }

        let votes = credit_votes(&mut entries, &excluded, &should_stop)?;
        let (max_votes, max_candidates) = extreme_candidates(&votes, &continuing, |a, b| a > b);
        debug!(
            "tally: round {}: votes {:?}, max {} for {:?}",
            round_id, votes, max_votes, max_candidates
        );

        let mut stats = RoundStats {
            round: round_id,
            votes: votes.clone(),
            elected: Vec::new(),
            excluded: Vec::new(),
        };

        if max_votes + QUOTA_EPSILON >= quota as f64 {
            let remaining_seats = winner_amount - winners.len();
            if max_candidates.len() <= remaining_seats {
                winners.extend(max_candidates.iter().copied());
                if winners.len() < winner_amount {
                    let transfer_value = ((max_votes - quota as f64) / max_votes).max(0.0);
                    debug!(
                        "tally: round {}: transfer value {} for the ballots of {:?}",
                        round_id, transfer_value, max_candidates
                    );
                    for e in entries.iter_mut() {
                        if matches!(e.holder, Some(cid) if max_candidates.contains(&cid)) {
                            e.weight *= transfer_value;
                        }
                    }
                }
                for &cid in max_candidates.iter() {
                    excluded[cid] = true;
                }
                stats.elected = max_candidates;
            } else {
                debug!(
                    "tally: round {}: {} candidates reach the quota for {} seats",
                    round_id,
                    max_candidates.len(),
                    remaining_seats
                );
                tied_winners = max_candidates;
            }
        } else {
            let (min_votes, min_candidates) =
                extreme_candidates(&votes, &continuing, |a, b| a < b);
            if min_candidates.len() == continuing.len() {
                // Excluding them would leave nobody who could still reach the quota.
                debug!(
                    "tally: round {}: all continuing candidates tied at {}",
                    round_id, min_votes
                );
                tied_winners = min_candidates;
            } else {
                for &cid in min_candidates.iter() {
                    excluded[cid] = true;
                }
                stats.excluded = min_candidates;
            }
        }

        log_round(&stats, &continuing, &tied_winners);
        rounds.push(stats);
    }

    let winners: Vec<usize> = winners.into_iter().collect();
    info!(
        "tally: done after {} rounds, winners: {:?}, tied: {:?}",
        rounds.len(),
        winners,
        tied_winners
    );
    Ok(TallyResult {
        winners,
        tied_winners,
        first_preferences,
        quota,
        rounds,
    })
}

// Credits every entry to its first continuing candidate and returns the
// total held by each candidate.
fn credit_votes<F>(
    entries: &mut [WorkingEntry],
    excluded: &[bool],
    should_stop: &F,
) -> Result<Vec<f64>, TallyError>
where
    F: Fn() -> bool,
{
    let mut votes = vec![0.0f64; excluded.len()];
    for (idx, e) in entries.iter_mut().enumerate() {
        if idx > 0 && idx % STOP_CHECK_INTERVAL == 0 && should_stop() {
            return Err(TallyError::Aborted);
        }
        e.holder = e
            .ranking
            .iter()
            .copied()
            .find(|&cid| excluded.get(cid) == Some(&false));
        if let Some(cid) = e.holder {
            votes[cid] += e.count as f64 * e.weight;
        }
    }
    Ok(votes)
}

// All the continuing candidates sharing the best score according to `better`.
// Ties use exact equality.
fn extreme_candidates<B>(votes: &[f64], continuing: &[usize], better: B) -> (f64, Vec<usize>)
where
    B: Fn(f64, f64) -> bool,
{
    let mut best = votes[continuing[0]];
    let mut res: Vec<usize> = Vec::new();
    for &cid in continuing.iter() {
        let v = votes[cid];
        if better(v, best) {
            best = v;
            res.clear();
            res.push(cid);
        } else if v == best {
            res.push(cid);
        }
    }
    (best, res)
}

fn log_round(stats: &RoundStats, continuing: &[usize], tied: &[usize]) {
    info!("Round {}", stats.round);
    for &cid in continuing.iter() {
        let status = if stats.elected.contains(&cid) {
            "elected"
        } else if stats.excluded.contains(&cid) {
            "excluded"
        } else if tied.contains(&cid) {
            "tied"
        } else {
            "continuing"
        };
        info!("      {:.4} {} -> {}", stats.votes[cid], cid, status);
    }
}
