//! kgraph-ledger: allocates entity identifiers and remembers every one issued.
//!
//! The registry owns an append-only ledger file. Every issued identifier is
//! appended and synced before it is handed out, and the whole ledger is
//! loaded back at startup, so an identifier is never issued twice across
//! process restarts or backend switches.

pub mod generator;
pub mod record;

use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};

pub use generator::{IdGenerator, KindCounter, RandomToken};
pub use record::{is_valid_identifier, IdentifierRecord};

pub const DEFAULT_MAX_ATTEMPTS: usize = 5;

#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("Identifier '{id}' has already been issued")]
    Collision { id: String },

    #[error("No unused identifier for kind '{kind}' after {attempts} attempts")]
    Exhausted { kind: String, attempts: usize },

    #[error("Invalid identifier or kind: {0:?}")]
    InvalidIdentifier(String),

    #[error("Ledger IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, LedgerError>;

/// Durable destination of ledger lines.
trait LedgerSink: Write + Send + Sync {
    fn sync(&mut self) -> io::Result<()>;
}

impl LedgerSink for File {
    fn sync(&mut self) -> io::Result<()> {
        self.sync_data()
    }
}

struct LedgerState {
    issued: HashMap<String, IdentifierRecord>,
    sink: Box<dyn LedgerSink>,
    /// The last append failed, so the file may end mid-line.
    torn: bool,
    generator: Box<dyn IdGenerator>,
}

impl LedgerState {
    /// Append and sync one record, then admit it to the issued set.
    ///
    /// A failed append may still have reached the file, so the record is
    /// admitted either way and the identifier is never handed out again.
    fn issue(&mut self, record: IdentifierRecord) -> Result<()> {
        let appended = self.append(&record.to_line());
        self.generator.observe(&record);
        self.issued.insert(record.id.clone(), record);
        appended.map_err(LedgerError::from)
    }

    fn append(&mut self, line: &str) -> io::Result<()> {
        if self.torn {
            self.sink.write_all(b"\n")?;
            self.torn = false;
        }
        let written = self
            .sink
            .write_all(format!("{line}\n").as_bytes())
            .and_then(|()| self.sink.sync());
        if let Err(e) = &written {
            tracing::warn!(error = %e, "Ledger append failed");
            self.torn = true;
        }
        written
    }
}

/// Thread-safe identifier registry.
///
/// `allocate` and `reserve` hold the writer lock across the membership check
/// and the durable append; lookups take the read lock.
pub struct IdentifierRegistry {
    path: PathBuf,
    max_attempts: usize,
    state: RwLock<LedgerState>,
}

impl IdentifierRegistry {
    /// Open (or create) the ledger at `path` with the default random generator.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        Self::with_generator(path, Box::new(RandomToken), DEFAULT_MAX_ATTEMPTS)
    }

    pub fn with_generator(
        path: impl Into<PathBuf>,
        mut generator: Box<dyn IdGenerator>,
        max_attempts: usize,
    ) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let mut file = OpenOptions::new()
            .read(true)
            .append(true)
            .create(true)
            .open(&path)?;

        let mut contents = String::new();
        file.read_to_string(&mut contents)?;

        let mut issued: HashMap<String, IdentifierRecord> = HashMap::new();
        let mut legacy = 0usize;
        for line in contents.lines() {
            let Some(record) = IdentifierRecord::parse_line(line) else {
                continue;
            };
            if record.kind.is_none() {
                legacy += 1;
            }
            generator.observe(&record);
            if issued.contains_key(&record.id) {
                tracing::warn!(id = %record.id, "Duplicate identifier in ledger");
                continue;
            }
            issued.insert(record.id.clone(), record);
        }
        if legacy > 0 {
            tracing::warn!(
                path = %path.display(),
                count = legacy,
                "Ledger contains identifiers without kind"
            );
        }

        // A torn final line is kept as issued; make sure the next append
        // starts on a fresh line.
        if !contents.is_empty() && !contents.ends_with('\n') {
            tracing::warn!(path = %path.display(), "Ledger ends with a partial line");
            file.seek(SeekFrom::End(0))?;
            writeln!(file)?;
            file.sync_data()?;
        }

        tracing::info!(
            path = %path.display(),
            issued = issued.len(),
            "Identifier ledger opened"
        );

        Ok(Self {
            path,
            max_attempts: max_attempts.max(1),
            state: RwLock::new(LedgerState {
                issued,
                sink: Box::new(file),
                torn: false,
                generator,
            }),
        })
    }

    /// Issue a fresh identifier for `kind`.
    pub fn allocate(&self, kind: &str) -> Result<String> {
        if !is_valid_identifier(kind) || kind.contains('/') {
            return Err(LedgerError::InvalidIdentifier(kind.to_string()));
        }

        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        for attempt in 1..=self.max_attempts {
            let candidate = state.generator.generate(kind);
            if state.issued.contains_key(&candidate) {
                tracing::warn!(id = %candidate, attempt, "Generated identifier collides, regenerating");
                continue;
            }
            state.issue(IdentifierRecord::new(candidate.clone(), kind))?;
            tracing::debug!(id = %candidate, kind, "Identifier allocated");
            return Ok(candidate);
        }

        Err(LedgerError::Exhausted {
            kind: kind.to_string(),
            attempts: self.max_attempts,
        })
    }

    /// Issue a caller-chosen identifier, failing if it was ever issued before.
    pub fn reserve(&self, id: &str, kind: &str) -> Result<()> {
        if !is_valid_identifier(id) {
            return Err(LedgerError::InvalidIdentifier(id.to_string()));
        }
        if !is_valid_identifier(kind) {
            return Err(LedgerError::InvalidIdentifier(kind.to_string()));
        }

        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        if state.issued.contains_key(id) {
            return Err(LedgerError::Collision { id: id.to_string() });
        }
        state.issue(IdentifierRecord::new(id, kind))?;
        tracing::debug!(id, kind, "Identifier reserved");
        Ok(())
    }

    pub fn is_issued(&self, id: &str) -> bool {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .issued
            .contains_key(id)
    }

    pub fn record(&self, id: &str) -> Option<IdentifierRecord> {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .issued
            .get(id)
            .cloned()
    }

    pub fn issued_count(&self) -> usize {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .issued
            .len()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl std::fmt::Debug for IdentifierRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentifierRegistry")
            .field("path", &self.path)
            .field("max_attempts", &self.max_attempts)
            .field("issued", &self.issued_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::{Arc, Mutex};

    /// Hands out a fixed sequence of candidates, then repeats the last one.
    struct Scripted(Vec<&'static str>);

    impl IdGenerator for Scripted {
        fn generate(&mut self, _kind: &str) -> String {
            if self.0.len() > 1 {
                self.0.remove(0).to_string()
            } else {
                self.0[0].to_string()
            }
        }
    }

    /// In-memory sink that accepts a limited number of bytes, then fails
    /// like a full disk.
    #[derive(Clone, Default)]
    struct FlakySink {
        bytes: Arc<Mutex<Vec<u8>>>,
        budget: Arc<Mutex<Option<usize>>>,
        fail_sync: Arc<AtomicBool>,
    }

    impl FlakySink {
        fn lines(&self) -> Vec<IdentifierRecord> {
            let bytes = self.bytes.lock().unwrap();
            String::from_utf8_lossy(&bytes)
                .lines()
                .filter_map(IdentifierRecord::parse_line)
                .collect()
        }
    }

    impl Write for FlakySink {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            let mut budget = self.budget.lock().unwrap();
            let n = match *budget {
                Some(0) => return Err(io::Error::other("no space left on device")),
                Some(left) => left.min(buf.len()),
                None => buf.len(),
            };
            if let Some(left) = budget.as_mut() {
                *left -= n;
            }
            self.bytes.lock().unwrap().extend_from_slice(&buf[..n]);
            Ok(n)
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl LedgerSink for FlakySink {
        fn sync(&mut self) -> io::Result<()> {
            if self.fail_sync.load(Ordering::SeqCst) {
                return Err(io::Error::other("sync failed"));
            }
            Ok(())
        }
    }

    fn flaky_registry(sink: &FlakySink, generator: Scripted) -> IdentifierRegistry {
        IdentifierRegistry {
            path: PathBuf::from("flaky"),
            max_attempts: 3,
            state: RwLock::new(LedgerState {
                issued: HashMap::new(),
                sink: Box::new(sink.clone()),
                torn: false,
                generator: Box::new(generator),
            }),
        }
    }

    #[test]
    fn test_torn_append_keeps_identifier_and_next_line_intact() {
        let sink = FlakySink::default();
        *sink.budget.lock().unwrap() = Some(4);
        let registry = flaky_registry(&sink, Scripted(vec!["K/ab", "K/cd"]));

        assert!(matches!(registry.allocate("K"), Err(LedgerError::Io(_))));
        assert!(registry.is_issued("K/ab"));
        assert!(matches!(
            registry.reserve("K/ab", "K"),
            Err(LedgerError::Collision { .. })
        ));

        *sink.budget.lock().unwrap() = None;
        assert_eq!(registry.allocate("K").unwrap(), "K/cd");

        let ids: Vec<_> = sink.lines().into_iter().map(|r| r.id).collect();
        assert_eq!(ids, vec!["K/ab", "K/cd"]);
    }

    #[test]
    fn test_failed_sync_still_blocks_reissue() {
        let sink = FlakySink::default();
        sink.fail_sync.store(true, Ordering::SeqCst);
        let registry = flaky_registry(&sink, Scripted(vec!["K/1"]));

        assert!(matches!(
            registry.reserve("K/x", "K"),
            Err(LedgerError::Io(_))
        ));
        assert!(registry.is_issued("K/x"));

        sink.fail_sync.store(false, Ordering::SeqCst);
        assert!(matches!(
            registry.reserve("K/x", "K"),
            Err(LedgerError::Collision { id }) if id == "K/x"
        ));
        assert_eq!(registry.allocate("K").unwrap(), "K/1");

        let ids: Vec<_> = sink.lines().into_iter().map(|r| r.id).collect();
        assert_eq!(ids, vec!["K/x", "K/1"]);
    }

    #[test]
    fn test_allocate_persists_before_returning() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ids.txt");
        let registry = IdentifierRegistry::open(&path).unwrap();

        let id = registry.allocate("Person").unwrap();
        assert!(id.starts_with("Person/"));
        assert!(registry.is_issued(&id));
        assert_eq!(registry.record(&id).unwrap().kind.as_deref(), Some("Person"));

        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(contents.starts_with(&format!("{id}\tPerson\t")));
        assert!(contents.ends_with('\n'));
    }

    #[test]
    fn test_identifiers_survive_restart() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("ids.txt");

        let first = {
            let registry = IdentifierRegistry::open(&path).unwrap();
            registry.reserve("Person/alice", "Person").unwrap();
            registry.allocate("Person").unwrap()
        };

        let registry = IdentifierRegistry::open(&path).unwrap();
        assert_eq!(registry.issued_count(), 2);
        assert!(registry.is_issued(&first));
        assert!(matches!(
            registry.reserve("Person/alice", "Person"),
            Err(LedgerError::Collision { id }) if id == "Person/alice"
        ));
    }

    #[test]
    fn test_counter_resumes_from_ledger() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ids.txt");
        {
            let registry =
                IdentifierRegistry::with_generator(&path, Box::new(KindCounter::new()), 5).unwrap();
            assert_eq!(registry.allocate("Habit").unwrap(), "Habit/1");
            assert_eq!(registry.allocate("Habit").unwrap(), "Habit/2");
        }
        let registry =
            IdentifierRegistry::with_generator(&path, Box::new(KindCounter::new()), 5).unwrap();
        assert_eq!(registry.allocate("Habit").unwrap(), "Habit/3");
    }

    #[test]
    fn test_collisions_regenerate_then_exhaust() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ids.txt");
        let registry = IdentifierRegistry::with_generator(
            &path,
            Box::new(Scripted(vec!["K/1", "K/1", "K/2", "K/2"])),
            3,
        )
        .unwrap();

        assert_eq!(registry.allocate("K").unwrap(), "K/1");
        assert_eq!(registry.allocate("K").unwrap(), "K/2");
        assert!(matches!(
            registry.allocate("K"),
            Err(LedgerError::Exhausted { attempts: 3, .. })
        ));
        assert_eq!(registry.issued_count(), 2);
    }

    #[test]
    fn test_legacy_and_torn_lines_are_loaded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ids.txt");
        std::fs::write(&path, "Person/1\n\nPerson/2\tPerson\t2024-01-01T00:00:00+00:00\nPers").unwrap();

        let registry = IdentifierRegistry::open(&path).unwrap();
        assert_eq!(registry.issued_count(), 3);
        assert!(registry.is_issued("Person/1"));
        assert!(registry.is_issued("Pers"));

        let id = registry.allocate("Person").unwrap();
        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(contents.contains(&format!("Pers\n{id}\t")));
    }

    #[test]
    fn test_invalid_identifiers_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let registry = IdentifierRegistry::open(dir.path().join("ids.txt")).unwrap();
        assert!(matches!(
            registry.reserve("has space", "Person"),
            Err(LedgerError::InvalidIdentifier(_))
        ));
        assert!(matches!(
            registry.allocate(""),
            Err(LedgerError::InvalidIdentifier(_))
        ));
        assert_eq!(registry.issued_count(), 0);
    }

    #[test]
    fn test_concurrent_allocation_is_unique() {
        let dir = tempfile::tempdir().unwrap();
        let registry = Arc::new(IdentifierRegistry::open(dir.path().join("ids.txt")).unwrap());

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let registry = Arc::clone(&registry);
                std::thread::spawn(move || {
                    (0..50)
                        .map(|_| registry.allocate("Person").unwrap())
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let mut all = HashSet::new();
        for handle in handles {
            for id in handle.join().unwrap() {
                assert!(all.insert(id));
            }
        }
        assert_eq!(all.len(), 400);
        assert_eq!(registry.issued_count(), 400);

        let reopened = IdentifierRegistry::open(registry.path()).unwrap();
        assert_eq!(reopened.issued_count(), 400);
    }
}
