use log::debug;
use snafu::prelude::*;
use stv_tally::Ballot;
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;

use std::path::{Path, PathBuf};

use crate::teller::io_votes::{encode_votes, parse_votes};
use crate::teller::{CapacityExceededSnafu, ReadingFileSnafu, TellerResult, WritingFileSnafu};

/// The append-only vote file of a poll.
///
/// Only one writer is expected at a time for a given file.
#[derive(Debug, Clone)]
pub struct BallotLog {
    path: PathBuf,
    max_append_bytes: u64,
}

impl BallotLog {
    /// Opens an existing vote file.
    pub fn open(path: PathBuf, max_append_bytes: u64) -> BallotLog {
        BallotLog {
            path,
            max_append_bytes,
        }
    }

    /// Creates the vote file if it does not exist yet.
    pub async fn create(path: PathBuf, max_append_bytes: u64) -> TellerResult<BallotLog> {
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .context(WritingFileSnafu { path: &path })?;
        Ok(BallotLog::open(path, max_append_bytes))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends the ballots at the end of the file and returns the number of bytes written.
    ///
    /// A batch larger than the configured limit is refused as a whole.
    pub async fn append(&self, ballots: &[Ballot]) -> TellerResult<usize> {
        let data = encode_votes(ballots)?;
        ensure!(
            data.len() as u64 <= self.max_append_bytes,
            CapacityExceededSnafu {
                size: data.len(),
                limit: self.max_append_bytes,
            }
        );
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .context(WritingFileSnafu { path: &self.path })?;
        file.write_all(&data)
            .await
            .context(WritingFileSnafu { path: &self.path })?;
        file.flush()
            .await
            .context(WritingFileSnafu { path: &self.path })?;
        debug!(
            "BallotLog: appended {} ballots ({} bytes) to {:?}",
            ballots.len(),
            data.len(),
            self.path
        );
        Ok(data.len())
    }

    /// Reads all the recorded ballots. Lines that cannot be read are skipped
    /// and counted in the second element.
    pub async fn read_all(&self) -> TellerResult<(Vec<Ballot>, usize)> {
        let data = fs::read(&self.path)
            .await
            .context(ReadingFileSnafu { path: &self.path })?;
        Ok(parse_votes(&data))
    }

    /// The raw content of the file.
    pub async fn export(&self) -> TellerResult<String> {
        fs::read_to_string(&self.path)
            .await
            .context(ReadingFileSnafu { path: &self.path })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::teller::TellerError;

    #[tokio::test]
    async fn appends_and_reads_back() {
        let dir = tempfile::tempdir().unwrap();
        let log = BallotLog::create(dir.path().join("votes.csv"), 1024)
            .await
            .unwrap();
        assert_eq!(log.read_all().await.unwrap(), (vec![], 0));

        log.append(&[Ballot::from(vec![0, 1])]).await.unwrap();
        log.append(&[Ballot::from(vec![2]), Ballot::from(vec![1, 2])])
            .await
            .unwrap();

        assert_eq!(log.export().await.unwrap(), "0,1\n2\n1,2\n");
        let (ballots, skipped) = log.read_all().await.unwrap();
        assert_eq!(skipped, 0);
        assert_eq!(ballots.len(), 3);
        assert_eq!(ballots[2], Ballot::from(vec![1, 2]));
    }

    #[tokio::test]
    async fn refuses_oversized_batches() {
        let dir = tempfile::tempdir().unwrap();
        let log = BallotLog::create(dir.path().join("votes.csv"), 8)
            .await
            .unwrap();
        let err = log
            .append(&[Ballot::from(vec![0, 1, 2]), Ballot::from(vec![2, 1, 0])])
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            TellerError::CapacityExceeded { size: 12, limit: 8 }
        ));
        assert_eq!(log.export().await.unwrap(), "");
        // Smaller batches still go through.
        assert_eq!(log.append(&[Ballot::from(vec![1])]).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn create_keeps_existing_votes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("votes.csv");
        std::fs::write(&path, "1,0\n").unwrap();
        let log = BallotLog::create(path, 1024).await.unwrap();
        assert_eq!(log.read_all().await.unwrap().0, vec![Ballot::from(vec![1, 0])]);
    }
}
