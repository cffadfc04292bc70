//! Live polls: ballots are accepted at any time and the results are
//! recounted in the background, one recount at a time per poll.

pub mod ballot_log;
pub mod cache;
pub mod registry;
pub mod worker;

/// How fresh a result must be.
#[derive(Eq, PartialEq, Debug, Clone, Copy)]
pub enum ResultMode {
    /// The last computed result, even if some ballots are not counted in it yet.
    Immediate,
    /// Waits for the recount in progress, if any.
    Consistent,
}
