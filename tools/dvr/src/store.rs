//! In-memory interaction store backed by a fixture file.
//!
//! Record mode creates a fresh fixture and appends to it through a dedicated
//! writer thread. Replay mode loads a fixture once and hands out each record at
//! most once via `find_and_consume`.

use crate::errors::DvrError;
use crate::fixture::{self, CURRENT_VERSION};
use crate::interaction::InteractionRecord;
use crate::matcher::matches;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::thread;
use tokio::sync::mpsc;

type StoreResult<T> = Result<T, DvrError>;

struct FixtureWriter {
    tx: mpsc::UnboundedSender<Vec<u8>>,
    join: thread::JoinHandle<StoreResult<()>>,
}

impl FixtureWriter {
    fn spawn(mut file: File, path: PathBuf) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<Vec<u8>>();
        let join = thread::spawn(move || {
            let mut first_error = None;
            while let Some(line) = rx.blocking_recv() {
                if first_error.is_some() {
                    continue;
                }
                if let Err(e) = file.write_all(&line).and_then(|_| file.flush()) {
                    first_error = Some(DvrError::Io(format!("{}: {e}", path.display())));
                }
            }
            match first_error {
                Some(err) => Err(err),
                None => Ok(()),
            }
        });
        Self { tx, join }
    }

    fn finish(self) -> StoreResult<()> {
        drop(self.tx);
        self.join
            .join()
            .map_err(|_| DvrError::Io("fixture writer thread panicked".to_string()))?
    }
}

enum Backing {
    Memory,
    /// Loaded from disk; appends are refused.
    Loaded,
    /// `None` once `close` has stopped the writer.
    File(Option<FixtureWriter>),
}

pub struct Store {
    version: u32,
    records: Mutex<Vec<InteractionRecord>>,
    backing: Mutex<Backing>,
}

impl Drop for Store {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

impl Store {
    /// Creates (or truncates) the fixture at `path` and writes the version
    /// header. Appends are persisted as they happen.
    pub fn create(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| DvrError::Io(e.to_string()))?;
            }
        }
        let mut file = File::create(&path)
            .map_err(|e| DvrError::Io(format!("{}: {e}", path.display())))?;
        file.write_all(&fixture::encode_header(CURRENT_VERSION))
            .map_err(|e| DvrError::Io(format!("{}: {e}", path.display())))?;
        let writer = FixtureWriter::spawn(file, path);
        Ok(Self {
            version: CURRENT_VERSION,
            records: Mutex::new(Vec::new()),
            backing: Mutex::new(Backing::File(Some(writer))),
        })
    }

    /// Reads and decodes the whole fixture. Every record starts unconsumed.
    pub fn load(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref().to_path_buf();
        let bytes =
            fs::read(&path).map_err(|e| DvrError::Io(format!("{}: {e}", path.display())))?;
        let (version, records) = fixture::decode(&bytes)?;
        Ok(Self {
            version,
            records: Mutex::new(records),
            backing: Mutex::new(Backing::Loaded),
        })
    }

    /// Store with no backing file.
    pub fn in_memory(records: Vec<InteractionRecord>) -> Self {
        Self {
            version: CURRENT_VERSION,
            records: Mutex::new(records),
            backing: Mutex::new(Backing::Memory),
        }
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    /// Fails with the error `append` would return right now.
    pub fn ensure_writable(&self) -> StoreResult<()> {
        writable(&lock(&self.backing)).map(|_| ())
    }

    pub fn append(&self, record: InteractionRecord) -> StoreResult<()> {
        let line = fixture::encode_record(&record)?;
        let mut records = lock(&self.records);
        // Sent while holding the records lock so file order matches memory order.
        let backing = lock(&self.backing);
        if let Some(writer) = writable(&backing)? {
            writer
                .tx
                .send(line)
                .map_err(|_| DvrError::Io(WRITER_CLOSED.to_string()))?;
        }
        records.push(record);
        Ok(())
    }

    /// Returns the first unconsumed record matching `live`, in recorded
    /// order, and marks it consumed. `None` is a replay miss.
    pub fn find_and_consume(&self, live: &InteractionRecord) -> Option<InteractionRecord> {
        let mut records = lock(&self.records);
        let found = records
            .iter_mut()
            .find(|record| !record.consumed && matches(record, live))?;
        found.consumed = true;
        Some(found.clone())
    }

    pub fn len(&self) -> usize {
        lock(&self.records).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn remaining(&self) -> usize {
        lock(&self.records).iter().filter(|r| !r.consumed).count()
    }

    pub fn snapshot(&self) -> Vec<InteractionRecord> {
        lock(&self.records).clone()
    }

    pub fn oldest_recorded_at_unix_ms(&self) -> Option<u64> {
        lock(&self.records)
            .iter()
            .map(|r| r.recorded_at_unix_ms)
            .min()
    }

    /// Stops the writer after every pending append reached the file. Later
    /// appends fail. Safe to call more than once.
    pub fn close(&self) -> StoreResult<()> {
        let writer = match &mut *lock(&self.backing) {
            Backing::File(writer) => writer.take(),
            Backing::Memory | Backing::Loaded => None,
        };
        match writer {
            Some(writer) => writer.finish(),
            None => Ok(()),
        }
    }
}

const WRITER_CLOSED: &str = "fixture writer is closed";

/// The writer to send through, `None` for memory-only stores.
fn writable(backing: &Backing) -> StoreResult<Option<&FixtureWriter>> {
    match backing {
        Backing::Memory => Ok(None),
        Backing::Loaded => Err(DvrError::Io("loaded fixture is read-only".to_string())),
        Backing::File(Some(writer)) => Ok(Some(writer)),
        Backing::File(None) => Err(DvrError::Io(WRITER_CLOSED.to_string())),
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
