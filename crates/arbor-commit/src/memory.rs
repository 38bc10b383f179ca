//! In-memory commit log.
//!
//! Commits are keyed by `(branch, timestamp)` in a `BTreeMap`, so the commits
//! of one branch inside a timestamp range are a single range scan. Secondary
//! indexes by id, author and affected object point back into that map.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::ops::Bound;
use std::sync::{Arc, Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};

use arbor_branch::{BranchError, BranchEvent, BranchStore, Segment};
use arbor_types::{BranchPath, CommitId, Timestamp, TimestampAuthority};
use tracing::{debug, info, warn};

use crate::error::{CommitError, Result};
use crate::records::{Commit, NewCommit};
use crate::search::{CommitQuery, Page};
use crate::traits::CommitLog;

/// Attempts [`InMemoryCommitLog::append`] makes before giving up on a branch
/// whose head keeps moving underneath it.
pub const DEFAULT_MAX_APPEND_RETRIES: u32 = 5;

type CommitKey = (BranchPath, Timestamp);

#[derive(Default)]
struct LogState {
    commits: BTreeMap<CommitKey, Commit>,
    by_id: HashMap<CommitId, CommitKey>,
    by_author: HashMap<String, BTreeSet<CommitKey>>,
    by_object: HashMap<String, BTreeSet<CommitKey>>,
}

impl LogState {
    fn insert(&mut self, commit: Commit) {
        let key = (commit.branch.clone(), commit.timestamp);
        self.by_id.insert(commit.id, key.clone());
        self.by_author
            .entry(commit.author.clone())
            .or_default()
            .insert(key.clone());
        for detail in &commit.details {
            for object_id in detail.affected_ids() {
                self.by_object
                    .entry(object_id.to_string())
                    .or_default()
                    .insert(key.clone());
            }
        }
        self.commits.insert(key, commit);
    }

    fn resolve<'a>(&'a self, keys: &'a BTreeSet<CommitKey>) -> impl Iterator<Item = &'a Commit> {
        keys.iter().filter_map(|key| self.commits.get(key))
    }
}

/// An in-memory [`CommitLog`] bound to a branch store and a timestamp
/// authority.
///
/// Appends to one branch are sequenced; appends to different branches run
/// in parallel. Writing a commit and advancing its branch head happen under
/// the log's write lock, so a reader never sees one without the other.
/// Branch listeners are notified after that lock is released.
pub struct InMemoryCommitLog {
    branches: Arc<dyn BranchStore>,
    clock: Arc<dyn TimestampAuthority>,
    max_retries: u32,
    sequencers: Mutex<HashMap<BranchPath, Arc<Mutex<()>>>>,
    inner: RwLock<LogState>,
}

impl InMemoryCommitLog {
    pub fn new(branches: Arc<dyn BranchStore>, clock: Arc<dyn TimestampAuthority>) -> Self {
        Self {
            branches,
            clock,
            max_retries: DEFAULT_MAX_APPEND_RETRIES,
            sequencers: Mutex::new(HashMap::new()),
            inner: RwLock::new(LogState::default()),
        }
    }

    /// Override the number of append attempts (at least one).
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries.max(1);
        self
    }

    /// The branch store this log writes heads to.
    pub fn branches(&self) -> &Arc<dyn BranchStore> {
        &self.branches
    }

    /// Total number of commits across all branches.
    pub fn len(&self) -> Result<usize> {
        Ok(self.read()?.commits.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, LogState>> {
        self.inner
            .read()
            .map_err(|e| CommitError::Storage(format!("lock poisoned: {e}")))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, LogState>> {
        self.inner
            .write()
            .map_err(|e| CommitError::Storage(format!("lock poisoned: {e}")))
    }

    fn sequencer(&self, branch: &BranchPath) -> Result<Arc<Mutex<()>>> {
        let mut sequencers = self
            .sequencers
            .lock()
            .map_err(|e| CommitError::Storage(format!("lock poisoned: {e}")))?;
        Ok(Arc::clone(sequencers.entry(branch.clone()).or_default()))
    }

    /// A timestamp from the authority that is strictly after `head`.
    fn next_timestamp(&self, head: Timestamp) -> Timestamp {
        let timestamp = self.clock.tick();
        if timestamp > head {
            return timestamp;
        }
        self.clock.observe(head);
        self.clock.tick()
    }

    /// Advance the head and record the commit as one step. The head event
    /// is returned for publishing once the log lock is released.
    fn write_at(&self, commit: NewCommit, timestamp: Timestamp) -> Result<(Commit, BranchEvent)> {
        let mut state = self.write()?;
        let (_, event) = self.branches.advance_head_deferred(&commit.branch, timestamp)?;
        let commit = commit.into_commit(timestamp);
        state.insert(commit.clone());
        Ok((commit, event))
    }
}

impl CommitLog for InMemoryCommitLog {
    fn append(&self, commit: NewCommit) -> Result<Commit> {
        let branch = commit.branch.clone();
        let sequencer = self.sequencer(&branch)?;
        let _sequenced = sequencer
            .lock()
            .map_err(|e| CommitError::Storage(format!("lock poisoned: {e}")))?;

        let mut attempts = 0;
        loop {
            attempts += 1;
            self.branches.check_writable(&branch)?;
            let head = self.branches.get(&branch)?.head_timestamp;
            let timestamp = self.next_timestamp(head);

            match self.write_at(commit.clone(), timestamp) {
                Ok((written, event)) => {
                    self.branches.publish(&event);
                    info!(
                        branch = %branch,
                        timestamp = %timestamp,
                        id = %written.id.short_id(),
                        details = written.details.len(),
                        "commit appended"
                    );
                    return Ok(written);
                }
                Err(CommitError::Branch(BranchError::ConcurrentModification { current, .. })) => {
                    if attempts >= self.max_retries {
                        warn!(branch = %branch, attempts, "append gave up");
                        return Err(CommitError::ConcurrentModification { branch, attempts });
                    }
                    debug!(branch = %branch, head = %current, attempt = attempts, "head moved, retrying append");
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn append_at(&self, commit: NewCommit, timestamp: Timestamp) -> Result<Commit> {
        let branch = commit.branch.clone();
        let sequencer = self.sequencer(&branch)?;
        let _sequenced = sequencer
            .lock()
            .map_err(|e| CommitError::Storage(format!("lock poisoned: {e}")))?;

        self.branches.check_writable(&branch)?;
        let (written, event) = self.write_at(commit, timestamp)?;
        self.branches.publish(&event);
        self.clock.observe(timestamp);
        info!(branch = %branch, timestamp = %timestamp, id = %written.id.short_id(), "commit appended at explicit timestamp");
        Ok(written)
    }

    fn get(&self, id: &CommitId) -> Result<Commit> {
        let state = self.read()?;
        state
            .by_id
            .get(id)
            .and_then(|key| state.commits.get(key))
            .cloned()
            .ok_or(CommitError::NotFound { id: *id })
    }

    fn search(&self, query: &CommitQuery) -> Result<Page<Commit>> {
        let state = self.read()?;
        let empty = BTreeSet::new();

        // Start from the narrowest index the query allows.
        let candidates: Box<dyn Iterator<Item = &Commit>> =
            if let Some(ref object_id) = query.affected_object {
                Box::new(state.resolve(state.by_object.get(object_id).unwrap_or(&empty)))
            } else if let Some(ref author) = query.author {
                Box::new(state.resolve(state.by_author.get(author).unwrap_or(&empty)))
            } else if let Some(ref branch) = query.branch {
                let start = (branch.clone(), Timestamp::new(i64::MIN));
                let end = (branch.clone(), Timestamp::new(i64::MAX));
                Box::new(state.commits.range(start..=end).map(|(_, commit)| commit))
            } else {
                Box::new(state.commits.values())
            };

        let matching: Vec<Commit> = candidates
            .filter(|commit| query.matches(commit))
            .cloned()
            .collect();
        Ok(query.paginate(matching))
    }

    fn commits_in(&self, segment: &Segment) -> Result<Vec<Commit>> {
        if segment.is_empty() {
            return Ok(Vec::new());
        }
        let state = self.read()?;
        let range = (
            Bound::Excluded((segment.path.clone(), segment.after)),
            Bound::Included((segment.path.clone(), segment.until)),
        );
        Ok(state
            .commits
            .range(range)
            .map(|(_, commit)| commit.clone())
            .collect())
    }
}
