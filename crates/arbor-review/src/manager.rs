//! Review creation, caching, invalidation and retention.
//!
//! At most one computation runs per `(source, target)` branch pair. The pair
//! map is guarded by a short critical section; the diff itself runs outside
//! of it. Requests for a pair that is being computed wait for the running
//! computation and receive its review id.

use std::collections::HashMap;
use std::fmt::Display;
use std::sync::{Arc, Condvar, Mutex, MutexGuard};

use arbor_branch::{divergence, relation, BranchEvent, BranchListener, BranchState, BranchStore, Relation};
use arbor_commit::CommitLog;
use arbor_types::{BranchPath, ReviewId};
use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::changes::{classify, ChangeSet};
use crate::config::ReviewConfig;
use crate::error::{Result, ReviewError};
use crate::review::{ConceptChanges, Review, ReviewStatus};

type PairKey = (BranchPath, BranchPath);

fn poisoned(e: impl Display) -> ReviewError {
    ReviewError::Internal(format!("lock poisoned: {e}"))
}

struct Entry {
    review: Review,
    changes: Option<Arc<ConceptChanges>>,
}

#[derive(Default)]
struct ReviewState {
    reviews: HashMap<ReviewId, Entry>,
    /// Most recently requested review per pair.
    latest: HashMap<PairKey, ReviewId>,
    in_flight: HashMap<PairKey, Arc<InFlight>>,
}

/// A running computation that later requests can wait on.
struct InFlight {
    review_id: ReviewId,
    done: Mutex<bool>,
    finished: Condvar,
}

impl InFlight {
    fn new(review_id: ReviewId) -> Self {
        Self {
            review_id,
            done: Mutex::new(false),
            finished: Condvar::new(),
        }
    }

    fn wait(&self) -> Result<()> {
        let mut done = self.done.lock().map_err(poisoned)?;
        while !*done {
            done = self.finished.wait(done).map_err(poisoned)?;
        }
        Ok(())
    }

    fn finish(&self) {
        if let Ok(mut done) = self.done.lock() {
            *done = true;
        }
        self.finished.notify_all();
    }
}

/// Releases waiters when the leading computation ends, also by unwinding.
struct Flight<'a> {
    manager: &'a ReviewManager,
    key: PairKey,
    in_flight: Arc<InFlight>,
    armed: bool,
}

impl Drop for Flight<'_> {
    fn drop(&mut self) {
        if self.armed {
            if let Ok(mut state) = self.manager.state.lock() {
                state.in_flight.remove(&self.key);
                if let Some(entry) = state.reviews.get_mut(&self.in_flight.review_id) {
                    if entry.review.status == ReviewStatus::Pending {
                        entry.review.transition(ReviewStatus::Failed, Utc::now());
                        entry.review.error = Some("computation aborted".into());
                    }
                }
            }
        }
        self.in_flight.finish();
    }
}

enum Plan {
    Reuse(Review),
    Join(Arc<InFlight>),
    Lead(Arc<InFlight>, ReviewId),
}

/// Creates and serves reviews for one repository.
///
/// Register the manager as a [`BranchListener`] on the branch store so that
/// reviews turn `STALE` as soon as one of their branches moves; reads also
/// re-check staleness lazily.
pub struct ReviewManager {
    branches: Arc<dyn BranchStore>,
    commits: Arc<dyn CommitLog>,
    config: ReviewConfig,
    state: Mutex<ReviewState>,
}

impl ReviewManager {
    pub fn new(
        branches: Arc<dyn BranchStore>,
        commits: Arc<dyn CommitLog>,
        config: ReviewConfig,
    ) -> Self {
        Self {
            branches,
            commits,
            config,
            state: Mutex::new(ReviewState::default()),
        }
    }

    pub fn config(&self) -> &ReviewConfig {
        &self.config
    }

    fn lock_state(&self) -> Result<MutexGuard<'_, ReviewState>> {
        self.state.lock().map_err(poisoned)
    }

    /// Returns `true` if the branch still exists, is not deleted and has not
    /// moved since `snapshot`.
    fn is_live(&self, snapshot: &BranchState) -> Result<bool> {
        Ok(self
            .branches
            .find(&snapshot.path)?
            .is_some_and(|branch| snapshot.matches(&branch) && !branch.is_deleted()))
    }

    /// Request the review of `source` against `target`.
    ///
    /// The branches must be the same or one must be an ancestor of the
    /// other. Returns the cached review if the pair's latest review is still
    /// `CURRENT`, joins a running computation for the pair, or computes a
    /// new one. A failing computation yields a `FAILED` review, not an error.
    pub fn create_review(&self, source: &BranchPath, target: &BranchPath) -> Result<Review> {
        if relation(source, target) == Relation::Unrelated {
            return Err(ReviewError::UnrelatedBranches {
                source_branch: source.clone(),
                target_branch: target.clone(),
            });
        }
        let source_state = self.branches.state(source)?;
        let target_state = self.branches.state(target)?;
        let key = (source.clone(), target.clone());

        let plan = {
            let mut state = self.lock_state()?;
            let ReviewState {
                reviews,
                latest,
                in_flight,
            } = &mut *state;

            let reusable = latest
                .get(&key)
                .and_then(|id| reviews.get(id))
                .filter(|entry| {
                    entry.review.status == ReviewStatus::Current
                        && entry.review.source == source_state
                        && entry.review.target == target_state
                })
                .map(|entry| entry.review.clone());

            if let Some(review) = reusable {
                Plan::Reuse(review)
            } else if let Some(running) = in_flight.get(&key) {
                Plan::Join(Arc::clone(running))
            } else {
                let review = Review::pending(source_state.clone(), target_state.clone(), Utc::now());
                let id = review.id;
                let running = Arc::new(InFlight::new(id));
                in_flight.insert(key.clone(), Arc::clone(&running));
                latest.insert(key.clone(), id);
                reviews.insert(
                    id,
                    Entry {
                        review,
                        changes: None,
                    },
                );
                Plan::Lead(running, id)
            }
        };

        match plan {
            Plan::Reuse(review) => {
                debug!(review_id = %review.id, "reusing current review");
                Ok(review)
            }
            Plan::Join(in_flight) => {
                debug!(review_id = %in_flight.review_id, "joining in-flight review");
                in_flight.wait()?;
                self.get_review(&in_flight.review_id)
            }
            Plan::Lead(in_flight, id) => {
                let mut flight = Flight {
                    manager: self,
                    key,
                    in_flight,
                    armed: true,
                };
                let outcome = self.compute(&source_state, &target_state);
                let review = self.complete(&flight.key, id, outcome)?;
                flight.armed = false;
                Ok(review)
            }
        }
    }

    /// Diff the descendant side of the pair since the fork point.
    fn compute(&self, source: &BranchState, target: &BranchState) -> Result<ChangeSet> {
        let divergence = divergence(self.branches.as_ref(), source, target)?;
        let segments = match relation(&source.path, &target.path) {
            Relation::Same => return Ok(ChangeSet::default()),
            Relation::DescendantOf => divergence.left,
            Relation::AncestorOf => divergence.right,
            Relation::Unrelated => {
                return Err(ReviewError::UnrelatedBranches {
                    source_branch: source.path.clone(),
                    target_branch: target.path.clone(),
                })
            }
        };
        let commits = self.commits.commits_in_all(&segments)?;
        Ok(classify(&commits))
    }

    fn complete(&self, key: &PairKey, id: ReviewId, outcome: Result<ChangeSet>) -> Result<Review> {
        let mut state = self.lock_state()?;
        state.in_flight.remove(key);

        let (source, target) = {
            let entry = state.reviews.get(&id).ok_or(ReviewError::NotFound { id })?;
            (entry.review.source.clone(), entry.review.target.clone())
        };
        let live = outcome.is_ok() && self.is_live(&source)? && self.is_live(&target)?;

        let entry = state.reviews.get_mut(&id).ok_or(ReviewError::NotFound { id })?;
        let now = Utc::now();
        match outcome {
            Ok(changes) if live => {
                info!(
                    review_id = %id,
                    source = %source.path,
                    target = %target.path,
                    new = changes.new_ids.len(),
                    changed = changes.changed_ids.len(),
                    deleted = changes.deleted_ids.len(),
                    "review computed"
                );
                entry.changes = Some(Arc::new(ConceptChanges {
                    review_id: id,
                    changes,
                }));
                entry.review.transition(ReviewStatus::Current, now);
            }
            Ok(_) => {
                warn!(review_id = %id, source = %source.path, target = %target.path, "branches moved during review computation");
                entry.review.transition(ReviewStatus::Stale, now);
            }
            Err(e) => {
                warn!(review_id = %id, error = %e, "review computation failed");
                entry.review.transition(ReviewStatus::Failed, now);
                entry.review.error = Some(e.to_string());
            }
        }
        Ok(entry.review.clone())
    }

    /// Read a review, marking it `STALE` first if a branch has moved.
    pub fn get_review(&self, id: &ReviewId) -> Result<Review> {
        let mut state = self.lock_state()?;
        let entry = state
            .reviews
            .get_mut(id)
            .ok_or(ReviewError::NotFound { id: *id })?;
        if entry.review.status == ReviewStatus::Current
            && !(self.is_live(&entry.review.source)? && self.is_live(&entry.review.target)?)
        {
            debug!(review_id = %id, "review went stale");
            entry.review.transition(ReviewStatus::Stale, Utc::now());
            entry.changes = None;
        }
        Ok(entry.review.clone())
    }

    /// The new/changed/deleted ids of a `CURRENT` review.
    pub fn get_concept_changes(&self, id: &ReviewId) -> Result<ConceptChanges> {
        let review = self.get_review(id)?;
        let state = self.lock_state()?;
        match state.reviews.get(id) {
            Some(Entry {
                review: current,
                changes: Some(changes),
            }) if current.status == ReviewStatus::Current => Ok(changes.as_ref().clone()),
            Some(entry) => Err(ReviewError::ChangesNotAvailable {
                id: *id,
                status: entry.review.status,
            }),
            None => Err(ReviewError::ChangesNotAvailable {
                id: *id,
                status: review.status,
            }),
        }
    }

    /// Every stored review, oldest update first.
    pub fn reviews(&self) -> Result<Vec<Review>> {
        let state = self.lock_state()?;
        let mut reviews: Vec<Review> = state.reviews.values().map(|e| e.review.clone()).collect();
        reviews.sort_by_key(|review| review.last_updated);
        Ok(reviews)
    }

    /// Remove a review.
    pub fn delete_review(&self, id: &ReviewId) -> Result<Review> {
        let mut state = self.lock_state()?;
        let entry = state
            .reviews
            .remove(id)
            .ok_or(ReviewError::NotFound { id: *id })?;
        state.latest.retain(|_, latest| latest != id);
        info!(review_id = %id, "review deleted");
        Ok(entry.review)
    }

    /// Mark every `CURRENT` review whose branches moved as `STALE`.
    ///
    /// Returns the number of reviews that changed status.
    pub fn refresh_staleness(&self) -> Result<usize> {
        let current: Vec<(ReviewId, BranchState, BranchState)> = {
            let state = self.lock_state()?;
            state
                .reviews
                .values()
                .filter(|entry| entry.review.status == ReviewStatus::Current)
                .map(|entry| {
                    let review = &entry.review;
                    (review.id, review.source.clone(), review.target.clone())
                })
                .collect()
        };

        // Branch reads happen without the review lock held.
        let mut moved = Vec::new();
        for (id, source, target) in current {
            if !(self.is_live(&source)? && self.is_live(&target)?) {
                moved.push(id);
            }
        }
        if moved.is_empty() {
            return Ok(0);
        }

        let mut state = self.lock_state()?;
        let now = Utc::now();
        let mut count = 0;
        for id in moved {
            let Some(entry) = state.reviews.get_mut(&id) else {
                continue;
            };
            if entry.review.status == ReviewStatus::Current {
                entry.review.transition(ReviewStatus::Stale, now);
                entry.changes = None;
                count += 1;
            }
        }
        if count > 0 {
            debug!(count, "reviews marked stale");
        }
        Ok(count)
    }

    /// Drop reviews past retention as of `now`.
    ///
    /// The latest `CURRENT` review of a pair is kept for `keep_current_mins`
    /// after its last update, everything else for `keep_other_mins`. A
    /// retention too large to represent keeps reviews forever. Reviews still
    /// computing are never dropped. Returns the number removed.
    pub fn sweep(&self, now: DateTime<Utc>) -> Result<usize> {
        let keep_current = self.config.keep_current();
        let keep_other = self.config.keep_other();

        let mut state = self.lock_state()?;
        let ReviewState {
            reviews, latest, ..
        } = &mut *state;

        let expired: Vec<ReviewId> = reviews
            .values()
            .filter(|entry| entry.review.status != ReviewStatus::Pending)
            .filter(|entry| {
                let review = &entry.review;
                let key = (review.source.path.clone(), review.target.path.clone());
                let is_head = review.status == ReviewStatus::Current
                    && latest.get(&key) == Some(&review.id);
                let keep = if is_head { keep_current } else { keep_other };
                keep.is_some_and(|keep| now - review.last_updated > keep)
            })
            .map(|entry| entry.review.id)
            .collect();

        for id in &expired {
            reviews.remove(id);
        }
        latest.retain(|_, id| reviews.contains_key(id));

        if !expired.is_empty() {
            info!(removed = expired.len(), "expired reviews removed");
        }
        Ok(expired.len())
    }

    fn invalidate(&self, path: &BranchPath) {
        let Ok(mut state) = self.state.lock() else {
            return;
        };
        let now = Utc::now();
        for entry in state.reviews.values_mut() {
            let review = &mut entry.review;
            if review.status == ReviewStatus::Current
                && (&review.source.path == path || &review.target.path == path)
            {
                debug!(review_id = %review.id, path = %path, "review invalidated by branch change");
                review.transition(ReviewStatus::Stale, now);
                entry.changes = None;
            }
        }
    }
}

impl BranchListener for ReviewManager {
    fn on_branch_event(&self, event: &BranchEvent) {
        match event {
            BranchEvent::HeadAdvanced { path, .. } | BranchEvent::Deleted { path } => {
                self.invalidate(path)
            }
            BranchEvent::Created { .. } => {}
        }
    }
}
