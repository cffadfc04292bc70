// ********* Input data structures ***********

use std::error::Error;
use std::fmt::Display;

/// The parameters of an election that matter for counting.
///
/// The candidates themselves are only known by their position in the
/// ordered candidate list, so only the length of that list is kept here.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct ElectionConfig {
    /// Number of seats to fill. At least 1.
    pub winner_amount: u32,
    /// Minimum length of a ranking. 0 means no minimum.
    pub minimum_preferences: u32,
    pub candidate_count: usize,
}

impl ElectionConfig {
    /// Builds a configuration, checking that it can be counted.
    pub fn new(
        winner_amount: u32,
        minimum_preferences: u32,
        candidate_count: usize,
    ) -> Result<ElectionConfig, ConfigError> {
        let config = ElectionConfig {
            winner_amount,
            minimum_preferences,
            candidate_count,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.winner_amount < 1 {
            return Err(ConfigError::NoWinners);
        }
        if self.candidate_count == 0 {
            return Err(ConfigError::NoCandidates);
        }
        if self.winner_amount as usize > self.candidate_count {
            return Err(ConfigError::TooManyWinners {
                winners: self.winner_amount,
                candidates: self.candidate_count,
            });
        }
        if self.minimum_preferences as usize > self.candidate_count {
            return Err(ConfigError::MinimumPreferencesTooHigh {
                minimum: self.minimum_preferences,
                candidates: self.candidate_count,
            });
        }
        Ok(())
    }
}

/// A ranking of candidates, most preferred first.
#[derive(Eq, PartialEq, Debug, Clone, Hash)]
pub struct Ballot {
    pub preferences: Vec<usize>,
}

impl Ballot {
    pub fn new(preferences: Vec<usize>) -> Ballot {
        Ballot { preferences }
    }
}

impl From<Vec<usize>> for Ballot {
    fn from(preferences: Vec<usize>) -> Self {
        Ballot { preferences }
    }
}

impl From<&[usize]> for Ballot {
    fn from(preferences: &[usize]) -> Self {
        Ballot {
            preferences: preferences.to_vec(),
        }
    }
}

// ******** Output data structures *********

/// Statistics for one round of the count.
#[derive(PartialEq, Debug, Clone)]
pub struct RoundStats {
    pub round: u32,
    /// The weighted votes held by each candidate at the start of the round.
    /// Excluded candidates hold zero.
    pub votes: Vec<f64>,
    pub elected: Vec<usize>,
    pub excluded: Vec<usize>,
}

#[derive(PartialEq, Debug, Clone)]
pub struct TallyResult {
    /// Elected candidates, in increasing order.
    pub winners: Vec<usize>,
    /// Only filled when the count ended on a tie that the seats left
    /// cannot resolve. In that case, `winners` is not complete.
    pub tied_winners: Vec<usize>,
    /// Number of ballots ranking each candidate first.
    pub first_preferences: Vec<u64>,
    pub quota: u64,
    pub rounds: Vec<RoundStats>,
}

impl TallyResult {
    /// The result of an election that has not received any ballot yet:
    /// every candidate is tied.
    pub fn full_tie(candidate_count: usize) -> TallyResult {
        TallyResult {
            winners: Vec::new(),
            tied_winners: (0..candidate_count).collect(),
            first_preferences: vec![0; candidate_count],
            quota: 0,
            rounds: Vec::new(),
        }
    }

    pub fn is_tie(&self) -> bool {
        !self.tied_winners.is_empty()
    }
}

// ********* Errors **********

/// The reasons a ballot cannot be counted.
///
/// The variants are listed in the order the checks are applied.
#[derive(Eq, PartialEq, Debug, Clone)]
pub enum BallotError {
    EmptyBallot,
    TooManyPreferences { count: usize, max: usize },
    InsufficientPreferences { count: usize, min: usize },
    PreferenceOutOfRange { candidate: usize, candidates: usize },
    DuplicatePreference { candidate: usize },
}

impl Error for BallotError {}

impl Display for BallotError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BallotError::EmptyBallot => write!(f, "Ballot has no preferences"),
            BallotError::TooManyPreferences { count, max } => write!(
                f,
                "Ballot has {} preferences but only {} candidates are running",
                count, max
            ),
            BallotError::InsufficientPreferences { count, min } => write!(
                f,
                "Ballot has {} preferences but at least {} are required",
                count, min
            ),
            BallotError::PreferenceOutOfRange {
                candidate,
                candidates,
            } => write!(
                f,
                "Preference {} is not a valid candidate (expected 0..{})",
                candidate, candidates
            ),
            BallotError::DuplicatePreference { candidate } => {
                write!(f, "Candidate {} is ranked more than once", candidate)
            }
        }
    }
}

#[derive(Eq, PartialEq, Debug, Clone)]
pub enum ConfigError {
    NoWinners,
    NoCandidates,
    TooManyWinners { winners: u32, candidates: usize },
    MinimumPreferencesTooHigh { minimum: u32, candidates: usize },
}

impl Error for ConfigError {}

impl Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::NoWinners => write!(f, "At least one winner is required"),
            ConfigError::NoCandidates => write!(f, "At least one candidate is required"),
            ConfigError::TooManyWinners {
                winners,
                candidates,
            } => write!(
                f,
                "Cannot elect {} winners out of {} candidates",
                winners, candidates
            ),
            ConfigError::MinimumPreferencesTooHigh {
                minimum,
                candidates,
            } => write!(
                f,
                "Cannot require {} preferences out of {} candidates",
                minimum, candidates
            ),
        }
    }
}

/// Errors that prevent the count from completing.
#[derive(Eq, PartialEq, Debug, Clone)]
pub enum TallyError {
    /// The caller asked for a count without any ballot.
    NoBallots,
    /// The count was stopped from the outside before it finished.
    Aborted,
}

impl Error for TallyError {}

impl Display for TallyError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TallyError::NoBallots => write!(f, "Cannot count an election without ballots"),
            TallyError::Aborted => write!(f, "The count was aborted"),
        }
    }
}
