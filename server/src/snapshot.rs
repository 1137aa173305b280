use std::path::PathBuf;
use tracing::{debug, info, warn};

#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    #[error("failed to write snapshot {0}: {1}")]
    Write(String, std::io::Error),
    #[error("failed to list snapshot directory {0}: {1}")]
    ReadDir(String, std::io::Error),
}

/// Persists motion snapshots as `<dir>/<prefix>NNNNN.jpg`.
///
/// The counter starts at zero for each run and only advances after a file
/// was written successfully, so numbering never skips.
pub struct SnapshotStore {
    dir: PathBuf,
    prefix: String,
    counter: u64,
}

impl SnapshotStore {
    pub fn new(dir: impl Into<PathBuf>, prefix: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            prefix: prefix.into(),
            counter: 0,
        }
    }

    /// Number of snapshots written so far.
    pub fn counter(&self) -> u64 {
        self.counter
    }

    /// e.g. "motion_00042.jpg"
    pub fn path_for(&self, n: u64) -> PathBuf {
        self.dir.join(format!("{}{n:05}.jpg", self.prefix))
    }

    /// Write `jpeg` under the next sequence number and advance the counter.
    pub async fn persist(&mut self, jpeg: &[u8]) -> Result<PathBuf, SnapshotError> {
        let path = self.path_for(self.counter);
        tokio::fs::write(&path, jpeg)
            .await
            .map_err(|e| SnapshotError::Write(path.display().to_string(), e))?;
        self.counter += 1;
        debug!(path = %path.display(), bytes = jpeg.len(), "snapshot written");
        Ok(path)
    }

    /// Delete files left over from earlier runs. Only names of the exact
    /// form `<prefix><digits>.jpg` are touched.
    pub async fn clear_existing(&self) -> Result<usize, SnapshotError> {
        let mut entries = tokio::fs::read_dir(&self.dir)
            .await
            .map_err(|e| SnapshotError::ReadDir(self.dir.display().to_string(), e))?;

        let mut removed = 0;
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| SnapshotError::ReadDir(self.dir.display().to_string(), e))?
        {
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            if !self.is_snapshot_name(name) {
                continue;
            }
            match tokio::fs::remove_file(entry.path()).await {
                Ok(()) => removed += 1,
                Err(e) => warn!(file = name, error = %e, "failed to remove old snapshot"),
            }
        }

        if removed > 0 {
            info!(removed, dir = %self.dir.display(), "cleared old snapshots");
        }
        Ok(removed)
    }

    fn is_snapshot_name(&self, name: &str) -> bool {
        name.strip_prefix(self.prefix.as_str())
            .and_then(|rest| rest.strip_suffix(".jpg"))
            .is_some_and(|digits| !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_are_zero_padded() {
        let store = SnapshotStore::new("/tmp/snaps", "motion_");
        assert_eq!(store.path_for(0), PathBuf::from("/tmp/snaps/motion_00000.jpg"));
        assert_eq!(store.path_for(42), PathBuf::from("/tmp/snaps/motion_00042.jpg"));
        assert_eq!(store.path_for(123456), PathBuf::from("/tmp/snaps/motion_123456.jpg"));
    }

    #[tokio::test]
    async fn persist_advances_counter() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = SnapshotStore::new(dir.path(), "motion_");

        let first = store.persist(b"one").await.unwrap();
        let second = store.persist(b"two").await.unwrap();

        assert!(first.ends_with("motion_00000.jpg"));
        assert!(second.ends_with("motion_00001.jpg"));
        assert_eq!(store.counter(), 2);
        assert_eq!(std::fs::read(&second).unwrap(), b"two");
    }

    #[tokio::test]
    async fn failed_write_keeps_counter() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = SnapshotStore::new(dir.path().join("missing"), "motion_");
        assert!(matches!(
            store.persist(b"x").await,
            Err(SnapshotError::Write(..))
        ));
        assert_eq!(store.counter(), 0);
    }

    #[tokio::test]
    async fn clear_only_removes_matching_files() {
        let dir = tempfile::tempdir().unwrap();
        for name in [
            "motion_00000.jpg",
            "motion_00017.jpg",
            "motion_notes.jpg",
            "motion_.jpg",
            "other_00001.jpg",
            "motion_00002.png",
        ] {
            std::fs::write(dir.path().join(name), b"x").unwrap();
        }

        let store = SnapshotStore::new(dir.path(), "motion_");
        assert_eq!(store.clear_existing().await.unwrap(), 2);

        let mut left: Vec<String> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        left.sort();
        assert_eq!(
            left,
            vec!["motion_.jpg", "motion_00002.png", "motion_notes.jpg", "other_00001.jpg"]
        );
    }
}
