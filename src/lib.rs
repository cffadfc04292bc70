//! Preferential polls counted with the single transferable vote.
//!
//! The `teller` module counts a stored vote file in one go. The `poller`
//! module keeps the results of live polls up to date while ballots arrive.

pub mod poller;
pub mod teller;

pub use crate::poller::registry::{Poll, PollRegistry};
pub use crate::poller::ResultMode;
pub use crate::teller::config_reader::{
    ElectionId, NewPoll, PollData, PollResults, PollSummary, ServiceSettings, Vote,
};
pub use crate::teller::{TellerError, TellerResult};
