use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Preferential polls counted with the single transferable vote.
#[derive(Parser, Debug, Clone)]
#[clap(author, version, about, long_about = None)]
pub struct Args {
    /// (file path, optional) The JSON settings of the poll service. All the entries are optional.
    #[clap(long, value_parser, global = true)]
    pub settings: Option<PathBuf>,

    /// (folder path, optional) The folder containing the polls. Overrides the settings.
    #[clap(long, value_parser, global = true)]
    pub polls: Option<PathBuf>,

    /// If passed as an argument, will turn on verbose logging to the standard output.
    #[clap(long, takes_value = false, global = true)]
    pub verbose: bool,

    #[clap(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Counts a vote file in one go and prints the summary of the election.
    Count {
        /// (file path) The description of the poll in JSON format.
        #[clap(value_parser)]
        config: PathBuf,
        /// (file path) The vote file: one ballot per line, candidate indexes separated by commas.
        #[clap(value_parser)]
        votes: PathBuf,
        /// (file path, 'stdout' or empty) Where to write the summary of the election.
        #[clap(short, long, value_parser)]
        out: Option<String>,
        /// (file path) A reference summary in JSON format. If provided, the computed summary
        /// must match it.
        #[clap(short, long, value_parser)]
        reference: Option<PathBuf>,
    },
    #[clap(flatten)]
    Poll(PollCommand),
}

/// Commands working on the polls stored in the poll folder.
#[derive(Subcommand, Debug, Clone)]
pub enum PollCommand {
    /// Creates a poll from a JSON description and prints its id.
    Create {
        #[clap(long, value_parser)]
        poll: PathBuf,
    },
    /// Lists the polls.
    List,
    /// Prints the description of a poll.
    Details {
        #[clap(long, value_parser)]
        election: u32,
    },
    /// Casts a ballot.
    Vote {
        #[clap(long, value_parser)]
        election: u32,
        /// (list of comma-separated candidate indexes) The candidates, most preferred first.
        #[clap(long, value_parser, use_value_delimiter = true, value_delimiter = ',')]
        preferences: Vec<usize>,
    },
    /// Prints the results of a poll.
    Results {
        #[clap(long, value_parser)]
        election: u32,
        /// Returns the last computed results without waiting for the ballots being counted.
        #[clap(long, takes_value = false)]
        immediate: bool,
    },
    /// Prints the vote file of a poll.
    Export {
        #[clap(long, value_parser)]
        election: u32,
    },
}
