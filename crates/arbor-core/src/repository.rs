//! One repository: every branching operation behind a single handle.

use std::sync::{Arc, Weak};
use std::time::Duration;

use arbor_branch::{compare, Branch, BranchEvent, BranchListener, BranchStore, CompareState, InMemoryBranchStore};
use arbor_commit::{
    validate_history, Commit, CommitDetail, CommitLog, CommitQuery, HistoryReport, InMemoryCommitLog,
    NewCommit, Page, SortOrder,
};
use arbor_lock::{LockContext, LockCoordinator, Lockable};
use arbor_merge::{branch_deltas, ConflictDetector, MergeConflict, TypeResolver};
use arbor_review::{ConceptChanges, Review, ReviewManager};
use arbor_types::{BranchPath, CommitId, LogicalClock, ReviewId, Timestamp, TimestampAuthority, WallClock};
use chrono::{DateTime, Utc};
use tracing::{debug, info};

use crate::config::{ClockKind, CoreConfig};
use crate::error::Result;
use crate::maintenance::MaintenanceReport;

/// Every branching operation of one repository.
///
/// The review manager listens to the branch store, so reviews turn `STALE`
/// as soon as a commit lands on one of their branches.
pub struct Repository {
    id: String,
    clock: Arc<dyn TimestampAuthority>,
    branches: Arc<InMemoryBranchStore>,
    commits: Arc<InMemoryCommitLog>,
    reviews: Arc<ReviewManager>,
    detector: ConflictDetector,
    locks: Arc<LockCoordinator>,
}

impl Repository {
    pub fn new(id: impl Into<String>, config: &CoreConfig, locks: Arc<LockCoordinator>) -> Result<Self> {
        let id = id.into();
        let (clock, initial): (Arc<dyn TimestampAuthority>, Timestamp) = match config.clock.kind {
            ClockKind::Logical => (
                Arc::new(LogicalClock::starting_at(config.clock.start)),
                Timestamp::new(config.clock.start),
            ),
            ClockKind::Wall => {
                let clock = WallClock::new();
                let initial = clock.tick();
                (Arc::new(clock), initial)
            }
        };

        let branches = Arc::new(InMemoryBranchStore::new(initial));
        let commits = Arc::new(
            InMemoryCommitLog::new(branches.clone(), clock.clone())
                .with_max_retries(config.commit.max_append_retries),
        );
        let reviews = Arc::new(ReviewManager::new(
            branches.clone(),
            commits.clone(),
            config.review.clone(),
        ));
        branches.add_listener(Arc::new(ReviewInvalidation(Arc::downgrade(&reviews))))?;

        let resolver = Arc::new(HistoryTypeResolver {
            commits: commits.clone(),
        });
        let detector = ConflictDetector::new(config.conflicts).with_resolver(resolver);

        info!(repository = %id, main_head = %initial, "repository opened");
        Ok(Self {
            id,
            clock,
            branches,
            commits,
            reviews,
            detector,
            locks,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn clock(&self) -> &Arc<dyn TimestampAuthority> {
        &self.clock
    }

    pub fn branch_store(&self) -> &Arc<InMemoryBranchStore> {
        &self.branches
    }

    pub fn commit_log(&self) -> &Arc<InMemoryCommitLog> {
        &self.commits
    }

    pub fn review_manager(&self) -> &Arc<ReviewManager> {
        &self.reviews
    }

    // ---- Branches ----

    pub fn create_branch(&self, parent: &BranchPath, name: &str) -> Result<Branch> {
        Ok(self.branches.create(parent, name)?)
    }

    pub fn get_branch(&self, path: &BranchPath) -> Result<Branch> {
        Ok(self.branches.get(path)?)
    }

    /// Branches whose path starts with `prefix`, sorted by path.
    pub fn branches(&self, prefix: &str) -> Result<Vec<Branch>> {
        Ok(self.branches.list(prefix)?)
    }

    pub fn delete_branch(&self, path: &BranchPath) -> Result<Branch> {
        Ok(self.branches.delete(path)?)
    }

    pub fn compare(&self, left: &BranchPath, right: &BranchPath) -> Result<CompareState> {
        Ok(compare(self.branches.as_ref(), left, right)?)
    }

    // ---- Commits ----

    pub fn commit(&self, commit: NewCommit) -> Result<Commit> {
        Ok(self.commits.append(commit)?)
    }

    /// Commit at an explicit timestamp, for imports and replays.
    pub fn commit_at(&self, commit: NewCommit, timestamp: Timestamp) -> Result<Commit> {
        Ok(self.commits.append_at(commit, timestamp)?)
    }

    pub fn get_commit(&self, id: &CommitId) -> Result<Commit> {
        Ok(self.commits.get(id)?)
    }

    pub fn search_commits(&self, query: &CommitQuery) -> Result<Page<Commit>> {
        Ok(self.commits.search(query)?)
    }

    pub fn validate_history(&self, branch: &BranchPath) -> Result<HistoryReport> {
        Ok(validate_history(self.branches.as_ref(), self.commits.as_ref(), branch)?)
    }

    // ---- Reviews ----

    pub fn create_review(&self, source: &BranchPath, target: &BranchPath) -> Result<Review> {
        Ok(self.reviews.create_review(source, target)?)
    }

    pub fn get_review(&self, id: &ReviewId) -> Result<Review> {
        Ok(self.reviews.get_review(id)?)
    }

    pub fn get_concept_changes(&self, id: &ReviewId) -> Result<ConceptChanges> {
        Ok(self.reviews.get_concept_changes(id)?)
    }

    pub fn delete_review(&self, id: &ReviewId) -> Result<Review> {
        Ok(self.reviews.delete_review(id)?)
    }

    // ---- Conflicts ----

    /// Conflicts between the changes on `source` and on `target` since
    /// their fork point. An empty list means the two can be combined.
    pub fn detect_conflicts(&self, source: &BranchPath, target: &BranchPath) -> Result<Vec<MergeConflict>> {
        let (source_delta, target_delta) =
            branch_deltas(self.branches.as_ref(), self.commits.as_ref(), source, target)?;
        let conflicts = self.detector.detect(&source_delta, &target_delta);
        debug!(
            repository = %self.id,
            source = %source,
            target = %target,
            conflicts = conflicts.len(),
            "detected conflicts"
        );
        Ok(conflicts)
    }

    // ---- Locks ----

    fn lockables(&self, targets: &[BranchPath]) -> Vec<Lockable> {
        targets
            .iter()
            .map(|path| Lockable::branch(self.id.clone(), path.clone()))
            .collect()
    }

    /// Lock `targets` of this repository, all or none. Waits up to
    /// `timeout`, or the configured default when `None`.
    pub async fn lock(
        &self,
        context: &LockContext,
        timeout: Option<Duration>,
        targets: &[BranchPath],
    ) -> Result<()> {
        let timeout = timeout.unwrap_or_else(|| self.locks.default_timeout());
        self.locks.lock(context, timeout, &self.lockables(targets)).await?;
        Ok(())
    }

    /// Lock the whole repository.
    pub async fn lock_repository(&self, context: &LockContext, timeout: Option<Duration>) -> Result<()> {
        let timeout = timeout.unwrap_or_else(|| self.locks.default_timeout());
        self.locks
            .lock(context, timeout, &[Lockable::repository(self.id.clone())])
            .await?;
        Ok(())
    }

    /// Release `targets` held by `context`. Returns `false` if none was held.
    pub fn unlock(&self, context: &LockContext, targets: &[BranchPath]) -> Result<bool> {
        Ok(self.locks.unlock(context, &self.lockables(targets))?)
    }

    pub fn unlock_repository(&self, context: &LockContext) -> Result<bool> {
        Ok(self
            .locks
            .unlock(context, &[Lockable::repository(self.id.clone())])?)
    }

    // ---- Maintenance ----

    /// Mark moved reviews `STALE` and drop reviews past retention.
    pub fn maintain(&self, now: DateTime<Utc>) -> Result<MaintenanceReport> {
        let stale = self.reviews.refresh_staleness()?;
        let swept = self.reviews.sweep(now)?;
        Ok(MaintenanceReport { stale, swept })
    }
}

/// Forwards branch events to the review manager without keeping it alive;
/// the manager itself holds the branch store.
struct ReviewInvalidation(Weak<ReviewManager>);

impl BranchListener for ReviewInvalidation {
    fn on_branch_event(&self, event: &BranchEvent) {
        if let Some(reviews) = self.0.upgrade() {
            reviews.on_branch_event(event);
        }
    }
}

/// Resolves an object's type from the latest commit that touched it.
struct HistoryTypeResolver {
    commits: Arc<InMemoryCommitLog>,
}

impl TypeResolver for HistoryTypeResolver {
    fn resolve(&self, object_id: &str) -> Option<String> {
        let query = CommitQuery::new()
            .affecting(object_id)
            .sort(SortOrder::TimestampDesc)
            .page(0, 1);
        let page = self.commits.search(&query).ok()?;
        let commit = page.items.first()?;
        commit.details.iter().find_map(|detail| type_in(detail, object_id))
    }
}

fn type_in(detail: &CommitDetail, object_id: &str) -> Option<String> {
    if detail.object_ids.iter().any(|id| id == object_id)
        || detail.components_by_object.contains_key(object_id)
    {
        return Some(detail.object_type.clone());
    }
    if detail
        .components_by_object
        .values()
        .any(|components| components.contains(object_id))
    {
        return detail.component_type.clone();
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use arbor_branch::BranchError;
    use arbor_lock::LockError;
    use arbor_merge::ConflictKind;
    use arbor_review::{ReviewError, ReviewStatus};
    use serde_json::json;

    use crate::config::ClockConfig;
    use crate::error::CoreError;

    fn path(p: &str) -> BranchPath {
        BranchPath::parse(p).unwrap()
    }

    fn logical_config(start: i64) -> CoreConfig {
        CoreConfig {
            clock: ClockConfig {
                kind: ClockKind::Logical,
                start,
            },
            ..CoreConfig::default()
        }
    }

    fn repo() -> Repository {
        Repository::new("snomed", &logical_config(100), Arc::new(LockCoordinator::default())).unwrap()
    }

    fn rename(branch: &BranchPath, from: &str, to: &str) -> NewCommit {
        NewCommit::new(branch.clone(), "alice", format!("rename C1 to {to}"))
            .with_detail(CommitDetail::changed("Concept", "C1", "name", json!(from), json!(to)))
    }

    #[test]
    fn concurrent_renames_conflict_on_the_name() {
        let repo = repo();
        let task = repo.create_branch(&BranchPath::main(), "task1").unwrap();
        assert_eq!(task.base_timestamp, Timestamp::new(100));
        assert_eq!(task.head_timestamp, Timestamp::new(100));

        repo.commit_at(rename(&task.path, "Foo", "Bar"), Timestamp::new(105)).unwrap();
        repo.commit_at(rename(&BranchPath::main(), "Foo", "Baz"), Timestamp::new(110))
            .unwrap();

        let conflicts = repo.detect_conflicts(&task.path, &BranchPath::main()).unwrap();
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].artefact_id, "C1");
        assert_eq!(conflicts[0].artefact_type, "Concept");
        assert_eq!(conflicts[0].kind, ConflictKind::ConflictingChange);
        assert_eq!(conflicts[0].conflicting_attributes, vec!["name"]);
        assert_eq!(repo.compare(&task.path, &BranchPath::main()).unwrap(), CompareState::Diverged);
    }

    #[test]
    fn review_goes_stale_after_a_commit() {
        let repo = repo();
        let task = repo.create_branch(&BranchPath::main(), "task").unwrap().path;
        repo.commit(
            NewCommit::new(task.clone(), "alice", "new concept")
                .with_detail(CommitDetail::added("Concept", ["N1"])),
        )
        .unwrap();

        let review = repo.create_review(&task, &BranchPath::main()).unwrap();
        assert_eq!(review.status, ReviewStatus::Current);
        let changes = repo.get_concept_changes(&review.id).unwrap();
        assert_eq!(changes.new_ids().collect::<Vec<_>>(), vec!["N1"]);

        repo.commit(rename(&task, "Foo", "Bar")).unwrap();
        assert_eq!(repo.get_review(&review.id).unwrap().status, ReviewStatus::Stale);
        assert!(matches!(
            repo.get_concept_changes(&review.id),
            Err(CoreError::Review(ReviewError::ChangesNotAvailable { .. }))
        ));
    }

    #[test]
    fn review_of_a_branch_against_itself_is_empty() {
        let repo = repo();
        repo.commit(rename(&BranchPath::main(), "Foo", "Bar")).unwrap();
        let review = repo.create_review(&BranchPath::main(), &BranchPath::main()).unwrap();
        let changes = repo.get_concept_changes(&review.id).unwrap();
        assert_eq!(changes.new_ids().count(), 0);
        assert_eq!(changes.changed_ids().count(), 0);
        assert_eq!(changes.deleted_ids().count(), 0);
    }

    #[test]
    fn deleted_branch_refuses_commits() {
        let repo = repo();
        let task = repo.create_branch(&BranchPath::main(), "task").unwrap().path;
        repo.delete_branch(&task).unwrap();
        assert!(matches!(
            repo.commit(rename(&task, "a", "b")),
            Err(CoreError::Commit(_))
        ));
        assert!(matches!(
            repo.create_branch(&BranchPath::main(), "task"),
            Err(CoreError::Branch(BranchError::AlreadyExists { .. }))
        ));
    }

    #[test]
    fn resolver_finds_types_of_objects_the_deltas_do_not_name() {
        let repo = repo();
        repo.commit(
            NewCommit::new(BranchPath::main(), "alice", "seed")
                .with_detail(CommitDetail::added("Description", ["D1"])),
        )
        .unwrap();
        let resolver = HistoryTypeResolver {
            commits: repo.commit_log().clone(),
        };
        assert_eq!(resolver.resolve("D1").as_deref(), Some("Description"));
        assert_eq!(resolver.resolve("missing"), None);
    }

    #[test]
    fn commit_search_and_history() {
        let repo = repo();
        let first = repo.commit(rename(&BranchPath::main(), "Foo", "Bar")).unwrap();
        repo.commit(rename(&BranchPath::main(), "Bar", "Baz")).unwrap();

        let page = repo
            .search_commits(&CommitQuery::new().author("alice").comment("BAR"))
            .unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.items[0].id, first.id);
        assert_eq!(repo.get_commit(&first.id).unwrap(), first);
        assert!(repo.validate_history(&BranchPath::main()).unwrap().is_valid());
    }

    #[tokio::test(start_paused = true)]
    async fn branch_locks_are_scoped_to_the_repository() {
        let locks = Arc::new(LockCoordinator::default());
        let snomed = Repository::new("snomed", &logical_config(0), locks.clone()).unwrap();
        let loinc = Repository::new("loinc", &logical_config(0), locks).unwrap();
        let alice = LockContext::new("alice", "merge");
        let bob = LockContext::new("bob", "rebase");

        snomed.lock(&alice, None, &[BranchPath::main()]).await.unwrap();
        loinc
            .lock(&bob, Some(Duration::from_millis(10)), &[BranchPath::main()])
            .await
            .unwrap();

        let err = snomed
            .lock(&bob, Some(Duration::from_millis(500)), &[path("MAIN/task")])
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::Lock(LockError::LockTimeout { timeout_ms: 500, .. })));

        assert!(snomed.unlock(&alice, &[BranchPath::main()]).unwrap());
        assert!(!snomed.unlock(&alice, &[BranchPath::main()]).unwrap());
        snomed.lock_repository(&bob, Some(Duration::from_millis(10))).await.unwrap();
        assert!(snomed.unlock_repository(&bob).unwrap());
    }

    #[test]
    fn maintenance_marks_and_sweeps_reviews() {
        let repo = repo();
        let review = repo.create_review(&BranchPath::main(), &BranchPath::main()).unwrap();
        let report = repo.maintain(Utc::now()).unwrap();
        assert_eq!(report, MaintenanceReport { stale: 0, swept: 0 });

        let later = Utc::now() + chrono::Duration::hours(1);
        let report = repo.maintain(later).unwrap();
        assert_eq!(report.swept, 1);
        assert!(matches!(
            repo.get_review(&review.id),
            Err(CoreError::Review(ReviewError::NotFound { .. }))
        ));
    }
}
