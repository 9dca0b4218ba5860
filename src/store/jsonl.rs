use super::{InMemoryStore, NewRunRecord, RecordId, ResultStore, RunRecord};
use crate::error::StoreError;
use crate::NNVFloat;
use chrono::Utc;
use log::{debug, info, warn};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// Append-only file of one JSON [`RunRecord`] per line. The file is replayed
/// into memory on open; queries never touch the disk.
///
/// Only whole records are ever left behind: a write that fails part way is
/// cut back to the last committed byte, and an unterminated final line that
/// does not parse is treated as a torn write and dropped on open.
#[derive(Debug)]
pub struct JsonLinesStore {
    path: PathBuf,
    file: File,
    index: InMemoryStore,
    /// Length of the file up to the end of the last accepted record.
    committed: u64,
    /// The last accepted record was not newline-terminated.
    unterminated: bool,
}

impl JsonLinesStore {
    /// Opens `path`, creating it if absent.
    ///
    /// # Errors
    /// Unreadable file, or a complete line that is not a valid record.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let io_err = |source| StoreError::Io {
            path: path.clone(),
            source,
        };
        let mut index = InMemoryStore::new();
        let mut committed = 0;
        let mut unterminated = false;
        if path.exists() {
            let raw = fs::read(&path).map_err(io_err)?;
            for (lineno, line) in raw.split_inclusive(|&b| b == b'\n').enumerate() {
                let terminated = line.ends_with(b"\n");
                if !line.iter().all(u8::is_ascii_whitespace) {
                    match serde_json::from_slice::<RunRecord>(line) {
                        Ok(record) => index.insert(record),
                        Err(source) if !terminated => {
                            warn!(
                                "dropping torn final line {} of {} ({})",
                                lineno + 1,
                                path.display(),
                                source
                            );
                            break;
                        }
                        Err(source) => {
                            return Err(StoreError::Corrupt {
                                path: path.clone(),
                                line: lineno + 1,
                                source,
                            });
                        }
                    }
                }
                committed += line.len() as u64;
                unterminated = !terminated;
            }
            debug!("replayed {} records from {}", index.len(), path.display());
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(io_err)?;
        let mut store = Self {
            path: path.clone(),
            file,
            index,
            committed,
            unterminated,
        };
        store.discard_tail().map_err(io_err)?;
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Cuts the file back to the last committed record.
    fn discard_tail(&mut self) -> io::Result<()> {
        let len = self.file.metadata()?.len();
        if len != self.committed {
            warn!(
                "discarding {} uncommitted bytes at the end of {}",
                len.abs_diff(self.committed),
                self.path.display()
            );
            self.file.set_len(self.committed)?;
        }
        Ok(())
    }

    /// Appends `bytes` as one unit; on failure the file is restored to its
    /// committed length.
    fn append(&mut self, bytes: &[u8]) -> io::Result<()> {
        let written = self
            .discard_tail()
            .and_then(|()| self.file.write_all(bytes))
            .and_then(|()| self.file.flush());
        if let Err(err) = written {
            if let Err(rollback) = self.file.set_len(self.committed) {
                warn!(
                    "could not roll back partial write to {}: {}",
                    self.path.display(),
                    rollback
                );
            }
            return Err(err);
        }
        self.committed += bytes.len() as u64;
        self.unterminated = false;
        Ok(())
    }
}

impl ResultStore for JsonLinesStore {
    fn save(&mut self, record: NewRunRecord) -> Result<RecordId, StoreError> {
        let stamped = self.index.stamp(record, Utc::now())?;
        let mut line = String::new();
        if self.unterminated {
            line.push('\n');
        }
        line.push_str(&serde_json::to_string(&stamped)?);
        line.push('\n');
        self.append(line.as_bytes())
            .map_err(|source| StoreError::Io {
                path: self.path.clone(),
                source,
            })?;
        let id = stamped.id;
        self.index.insert(stamped);
        info!("saved run record {} to {}", id, self.path.display());
        Ok(id)
    }

    fn recent(&self, limit: usize) -> Result<Vec<RunRecord>, StoreError> {
        self.index.recent(limit)
    }

    fn by_model(&self, model_name: &str) -> Result<Vec<RunRecord>, StoreError> {
        self.index.by_model(model_name)
    }

    fn by_attack(
        &self,
        model_name: &str,
        attack: &str,
        epsilon: Option<NNVFloat>,
    ) -> Result<Vec<RunRecord>, StoreError> {
        self.index.by_attack(model_name, attack, epsilon)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::tests::record;

    const TORN: &str = r#"{"id":2,"timestamp":"20"#;

    fn append_raw(path: &Path, text: &str) {
        let mut file = OpenOptions::new().append(true).open(path).unwrap();
        file.write_all(text.as_bytes()).unwrap();
    }

    #[test]
    fn replays_records_after_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("results.jsonl");
        {
            let mut store = JsonLinesStore::open(&path).unwrap();
            store.save(record("m", "fgsm", 0.05, 80.)).unwrap();
            store.save(record("m", "fgsm", 0.05, 70.)).unwrap();
        }
        let mut store = JsonLinesStore::open(&path).unwrap();
        assert_eq!(store.len(), 2);
        assert_eq!(store.save(record("m", "fgsm", 0.05, 90.)).unwrap(), RecordId(3));
        let curve = store.robustness_curve("m", "fgsm").unwrap();
        assert_eq!(curve[0].num_tests, 3);
        assert_eq!(curve[0].avg_robust_accuracy, 80.);
        assert_eq!(std::fs::read_to_string(&path).unwrap().lines().count(), 3);
    }

    #[test]
    fn corrupt_line_is_reported_with_its_number() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("results.jsonl");
        {
            let mut store = JsonLinesStore::open(&path).unwrap();
            store.save(record("m", "fgsm", 0.05, 80.)).unwrap();
        }
        append_raw(&path, "{not json\n");
        match JsonLinesStore::open(&path) {
            Err(StoreError::Corrupt { line, .. }) => assert_eq!(line, 2),
            other => panic!("unexpected {:?}", other.map(|s| s.len())),
        }
    }

    #[test]
    fn rejected_record_leaves_file_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("results.jsonl");
        let mut store = JsonLinesStore::open(&path).unwrap();
        assert!(store.save(record("m", "", 0.05, 80.)).is_err());
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "");
        assert!(store.is_empty());
    }

    #[test]
    fn torn_final_line_is_dropped_on_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("results.jsonl");
        {
            let mut store = JsonLinesStore::open(&path).unwrap();
            store.save(record("m", "fgsm", 0.05, 80.)).unwrap();
        }
        append_raw(&path, TORN);
        {
            let mut store = JsonLinesStore::open(&path).unwrap();
            assert_eq!(store.len(), 1);
            assert_eq!(store.save(record("m", "fgsm", 0.1, 60.)).unwrap(), RecordId(2));
        }
        let store = JsonLinesStore::open(&path).unwrap();
        assert_eq!(store.len(), 2);
        assert_eq!(std::fs::read_to_string(&path).unwrap().lines().count(), 2);
    }

    #[test]
    fn partial_write_while_open_does_not_poison_later_saves() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("results.jsonl");
        let mut store = JsonLinesStore::open(&path).unwrap();
        store.save(record("m", "fgsm", 0.05, 80.)).unwrap();
        append_raw(&path, TORN);
        assert_eq!(store.save(record("m", "fgsm", 0.1, 60.)).unwrap(), RecordId(2));
        drop(store);

        let reopened = JsonLinesStore::open(&path).unwrap();
        assert_eq!(reopened.len(), 2);
        let curve = reopened.robustness_curve("m", "fgsm").unwrap();
        assert_eq!(curve.len(), 2);
        assert_eq!(curve[1].avg_robust_accuracy, 60.);
    }

    #[test]
    fn unterminated_valid_record_is_kept() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("results.jsonl");
        {
            let mut store = JsonLinesStore::open(&path).unwrap();
            store.save(record("m", "fgsm", 0.05, 80.)).unwrap();
        }
        let text = std::fs::read_to_string(&path).unwrap();
        std::fs::write(&path, text.trim_end()).unwrap();

        let mut store = JsonLinesStore::open(&path).unwrap();
        assert_eq!(store.len(), 1);
        store.save(record("m", "pgd", 0.05, 40.)).unwrap();
        drop(store);
        assert_eq!(JsonLinesStore::open(&path).unwrap().len(), 2);
    }
}
