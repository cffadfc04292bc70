// Primitives for reading and writing vote files.

use log::{debug, warn};
use snafu::prelude::*;
use stv_tally::Ballot;

use crate::teller::{EncodingVotesSnafu, TellerResult};

/// Reads the ballots of a vote file.
///
/// Lines that are not a list of candidate indices are skipped. Returns the
/// ballots and the number of skipped lines. Whether the ballots are valid for
/// an election is not checked here.
pub fn parse_votes(data: &[u8]) -> (Vec<Ballot>, usize) {
    let rdr = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(data);
    let mut res: Vec<Ballot> = Vec::new();
    let mut skipped: usize = 0;
    for (idx, line_r) in rdr.into_records().enumerate() {
        let line = match line_r {
            Ok(line) => line,
            Err(e) => {
                warn!("parse_votes: record #{}: unreadable: {}", idx + 1, e);
                skipped += 1;
                continue;
            }
        };
        let parsed: Result<Vec<usize>, _> = line.iter().map(|s| s.parse::<usize>()).collect();
        match parsed {
            Ok(preferences) => res.push(Ballot { preferences }),
            Err(e) => {
                warn!(
                    "parse_votes: record #{}: {:?} is not a ballot: {}",
                    idx + 1,
                    line,
                    e
                );
                skipped += 1;
            }
        }
    }
    debug!("parse_votes: {} ballots, {} skipped", res.len(), skipped);
    (res, skipped)
}

/// Writes ballots in the vote file format: one line per ballot.
pub fn encode_votes(ballots: &[Ballot]) -> TellerResult<Vec<u8>> {
    let mut wtr = csv::WriterBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_writer(Vec::new());
    for b in ballots.iter() {
        wtr.write_record(b.preferences.iter().map(|cid| cid.to_string()))
            .context(EncodingVotesSnafu {})?;
    }
    wtr.into_inner()
        .map_err(|e| csv::Error::from(e.into_error()))
        .context(EncodingVotesSnafu {})
}
