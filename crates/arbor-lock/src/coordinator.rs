//! The lock registry and acquisition logic.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::LockConfig;
use crate::error::{LockError, Result};
use crate::notify::{LockEvent, LockEventKind, LockListener};
use crate::types::{LockContext, LockInfo, Lockable};

/// One context's acquisitions of a lockable.
struct Holding {
    context: LockContext,
    count: u32,
}

/// A held lockable. Related contexts may share it; it is released when the
/// last of them leaves.
struct LockEntry {
    /// The context that first acquired it.
    owner: LockContext,
    holders: Vec<Holding>,
    acquired_at: DateTime<Utc>,
}

impl LockEntry {
    fn new(context: &LockContext, now: DateTime<Utc>) -> Self {
        Self {
            owner: context.clone(),
            holders: vec![Holding {
                context: context.clone(),
                count: 1,
            }],
            acquired_at: now,
        }
    }

    fn enter(&mut self, context: &LockContext) {
        match self
            .holders
            .iter_mut()
            .find(|holding| holding.context.same_owner(context))
        {
            Some(holding) => holding.count += 1,
            None => self.holders.push(Holding {
                context: context.clone(),
                count: 1,
            }),
        }
    }

    /// Undo one acquisition by `context`. Returns `false` if it holds none.
    fn leave(&mut self, context: &LockContext) -> bool {
        let Some(index) = self
            .holders
            .iter()
            .position(|holding| holding.context.same_owner(context))
        else {
            return false;
        };
        self.holders[index].count -= 1;
        if self.holders[index].count == 0 {
            self.holders.remove(index);
        }
        true
    }

    fn count(&self) -> u32 {
        self.holders.iter().map(|holding| holding.count).sum()
    }
}

/// The first target that could not be taken, and who holds it.
struct Blocked {
    lockable: Lockable,
    holder: LockContext,
}

/// Exclusive, hierarchical locks over repositories and branch paths.
///
/// All state lives in one registry behind a mutex; waiters sleep on a
/// [`Notify`] that is signalled whenever a lock is fully released.
pub struct LockCoordinator {
    registry: Mutex<BTreeMap<Lockable, LockEntry>>,
    released: Notify,
    listeners: RwLock<Vec<Arc<dyn LockListener>>>,
    default_timeout: Duration,
}

impl LockCoordinator {
    pub fn new(config: &LockConfig) -> Self {
        Self {
            registry: Mutex::new(BTreeMap::new()),
            released: Notify::new(),
            listeners: RwLock::new(Vec::new()),
            default_timeout: config.default_timeout(),
        }
    }

    pub fn default_timeout(&self) -> Duration {
        self.default_timeout
    }

    /// Register a listener for lock transitions of session-bound contexts.
    pub fn add_listener(&self, listener: Arc<dyn LockListener>) -> Result<()> {
        self.listeners
            .write()
            .map_err(|e| LockError::Internal(format!("lock poisoned: {e}")))?
            .push(listener);
        Ok(())
    }

    fn registry(&self) -> Result<MutexGuard<'_, BTreeMap<Lockable, LockEntry>>> {
        self.registry
            .lock()
            .map_err(|e| LockError::Internal(format!("lock poisoned: {e}")))
    }

    /// Acquire every target or none, waiting up to `timeout` for holders
    /// to release. Dropping the returned future abandons the wait without
    /// leaving anything behind.
    pub async fn lock(
        &self,
        context: &LockContext,
        timeout: Duration,
        targets: &[Lockable],
    ) -> Result<()> {
        let targets = normalize(targets)?;
        let deadline = Instant::now() + timeout;
        loop {
            // Register for wake-ups before checking, so a release between the
            // check and the wait is not missed.
            let released = self.released.notified();
            tokio::pin!(released);
            released.as_mut().enable();

            let blocked = match self.acquire(context, &targets)? {
                None => return Ok(()),
                Some(blocked) => blocked,
            };
            debug!(
                lockable = %blocked.lockable,
                holder = %blocked.holder,
                requester = %context,
                "waiting for lock"
            );
            if tokio::time::timeout_at(deadline, released).await.is_err() {
                // One last attempt: a release may have raced the deadline.
                return match self.acquire(context, &targets)? {
                    None => Ok(()),
                    Some(blocked) => {
                        warn!(
                            lockable = %blocked.lockable,
                            holder = %blocked.holder,
                            timeout_ms = timeout.as_millis() as u64,
                            "lock timed out"
                        );
                        Err(LockError::LockTimeout {
                            lockable: blocked.lockable,
                            holder: blocked.holder.to_string(),
                            timeout_ms: timeout.as_millis() as u64,
                        })
                    }
                };
            }
        }
    }

    /// [`lock`](Self::lock) with the configured default timeout.
    pub async fn lock_default(&self, context: &LockContext, targets: &[Lockable]) -> Result<()> {
        self.lock(context, self.default_timeout, targets).await
    }

    /// Acquire every target or none, without waiting.
    pub fn try_lock(&self, context: &LockContext, targets: &[Lockable]) -> Result<bool> {
        let targets = normalize(targets)?;
        Ok(self.acquire(context, &targets)?.is_none())
    }

    fn acquire(&self, context: &LockContext, targets: &BTreeSet<Lockable>) -> Result<Option<Blocked>> {
        let now = Utc::now();
        let mut acquired = Vec::new();
        {
            let mut registry = self.registry()?;
            let chain = chain_of(&registry, context);
            for target in targets {
                let conflict = registry.iter().find_map(|(held, entry)| {
                    if !held.overlaps(target) {
                        return None;
                    }
                    entry
                        .holders
                        .iter()
                        .find(|holding| !chain.iter().any(|member| member.same_owner(&holding.context)))
                        .map(|holding| (held, holding))
                });
                if let Some((held, holding)) = conflict {
                    return Ok(Some(Blocked {
                        lockable: held.clone(),
                        holder: holding.context.clone(),
                    }));
                }
            }
            for target in targets {
                match registry.get_mut(target) {
                    Some(entry) => entry.enter(context),
                    None => {
                        registry.insert(target.clone(), LockEntry::new(context, now));
                        acquired.push((target.clone(), context.clone()));
                    }
                }
            }
        }
        for (lockable, _) in &acquired {
            info!(lockable = %lockable, holder = %context, "lock acquired");
        }
        self.publish(LockEventKind::Acquired, acquired);
        Ok(None)
    }

    /// Release `targets` held by `context`. Targets it does not hold are
    /// skipped. Returns `true` if anything was released.
    pub fn unlock(&self, context: &LockContext, targets: &[Lockable]) -> Result<bool> {
        let targets = normalize(targets)?;
        let mut touched = false;
        let mut released = Vec::new();
        {
            let mut registry = self.registry()?;
            for target in &targets {
                let Some(entry) = registry.get_mut(target) else {
                    continue;
                };
                if !entry.leave(context) {
                    continue;
                }
                touched = true;
                if entry.holders.is_empty() {
                    if let Some(entry) = registry.remove(target) {
                        released.push((target.clone(), entry.owner));
                    }
                }
            }
        }
        if !touched {
            debug!(requester = %context, "unlock of locks not held");
        }
        self.finish_release(released);
        Ok(touched)
    }

    /// Drop every acquisition made on behalf of a disconnected session.
    /// Returns the number of acquisitions dropped.
    pub fn release_session(&self, session_id: &str) -> Result<usize> {
        let mut dropped = 0;
        let mut released = Vec::new();
        {
            let mut registry = self.registry()?;
            registry.retain(|lockable, entry| {
                let before = entry.holders.len();
                entry
                    .holders
                    .retain(|holding| holding.context.session_id.as_deref() != Some(session_id));
                dropped += before - entry.holders.len();
                if entry.holders.is_empty() {
                    released.push((lockable.clone(), entry.owner.clone()));
                    return false;
                }
                true
            });
        }
        if dropped > 0 {
            info!(session = session_id, dropped, "released session locks");
        }
        self.finish_release(released);
        Ok(dropped)
    }

    fn finish_release(&self, released: Vec<(Lockable, LockContext)>) {
        if released.is_empty() {
            return;
        }
        for (lockable, owner) in &released {
            info!(lockable = %lockable, holder = %owner, "lock released");
        }
        self.released.notify_waiters();
        self.publish(LockEventKind::Released, released);
    }

    /// Publish transitions of session-bound owners.
    fn publish(&self, kind: LockEventKind, transitions: Vec<(Lockable, LockContext)>) {
        let events: Vec<LockEvent> = transitions
            .into_iter()
            .filter_map(|(lockable, context)| {
                let session_id = context.session_id.clone()?;
                Some(LockEvent {
                    kind,
                    lockable,
                    context,
                    session_id,
                })
            })
            .collect();
        if events.is_empty() {
            return;
        }
        let listeners = match self.listeners.read() {
            Ok(listeners) => listeners.clone(),
            Err(_) => return,
        };
        for event in &events {
            for listener in &listeners {
                listener.on_lock_event(event);
            }
        }
    }

    /// Every held lock, ordered by lockable.
    pub fn locks(&self) -> Result<Vec<LockInfo>> {
        let registry = self.registry()?;
        Ok(registry
            .iter()
            .map(|(lockable, entry)| info_of(lockable, entry))
            .collect())
    }

    /// The lock held on exactly `lockable`, if any.
    pub fn lock_info(&self, lockable: &Lockable) -> Result<Option<LockInfo>> {
        let registry = self.registry()?;
        Ok(registry.get(lockable).map(|entry| info_of(lockable, entry)))
    }

    /// Returns `true` if `lockable` or anything overlapping it is held.
    pub fn is_locked(&self, lockable: &Lockable) -> Result<bool> {
        let registry = self.registry()?;
        Ok(registry.keys().any(|held| held.overlaps(lockable)))
    }
}

impl Default for LockCoordinator {
    fn default() -> Self {
        Self::new(&LockConfig::default())
    }
}

fn normalize(targets: &[Lockable]) -> Result<BTreeSet<Lockable>> {
    if targets.is_empty() {
        return Err(LockError::NoTargets);
    }
    Ok(targets.iter().cloned().collect())
}

fn info_of(lockable: &Lockable, entry: &LockEntry) -> LockInfo {
    LockInfo {
        lockable: lockable.clone(),
        holder: entry.owner.clone(),
        count: entry.count(),
        acquired_at: entry.acquired_at,
    }
}

/// `context` plus every held context of the same user linked to it through
/// a chain of parent descriptions, however deep.
fn chain_of(registry: &BTreeMap<Lockable, LockEntry>, context: &LockContext) -> Vec<LockContext> {
    let mut chain = vec![context.clone()];
    let mut held: Vec<&LockContext> = registry
        .values()
        .flat_map(|entry| entry.holders.iter().map(|holding| &holding.context))
        .filter(|held| held.user_id == context.user_id)
        .collect();
    loop {
        let (linked, rest): (Vec<&LockContext>, Vec<&LockContext>) = held
            .into_iter()
            .partition(|held| chain.iter().any(|member| member.is_related_to(held)));
        if linked.is_empty() {
            break;
        }
        chain.extend(linked.into_iter().cloned());
        held = rest;
    }
    chain
}
