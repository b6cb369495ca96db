//! Saved-listing synchronizer.
//!
//! Keeps the signed-in user's bookmarks as a local set that flips
//! immediately on toggle, then confirms the change against the store and
//! rolls it back if the store refuses. At most one toggle per listing is in
//! flight at a time; toggles for different listings are independent.

pub mod state;

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

pub use state::{SaveState, ToggleOutcome};

use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::models::{Listing, UserId};
use crate::notice::Notice;
use crate::store::ListingStore;

#[derive(Debug, Default)]
struct SyncState {
    user: Option<UserId>,
    saved: HashSet<String>,
    entries: HashMap<String, SaveState>,
    notices: Vec<Notice>,
    /// Bumped on every user change so late completions for the old user are dropped
    generation: u64,
    /// Bumped on every local membership change; `touched` records the value per listing
    changes: u64,
    touched: HashMap<String, u64>,
}

impl SyncState {
    fn touch(&mut self, listing_id: &str) {
        self.changes += 1;
        self.touched.insert(listing_id.to_string(), self.changes);
    }
}

/// Point-in-time view for rendering
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SavedSnapshot {
    pub saved: Vec<String>,
    pub pending: Vec<String>,
}

pub struct SavedListings<S> {
    store: Arc<S>,
    state: Arc<Mutex<SyncState>>,
    timeout: Option<Duration>,
}

impl<S> Clone for SavedListings<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            state: Arc::clone(&self.state),
            timeout: self.timeout,
        }
    }
}

impl<S: ListingStore + 'static> SavedListings<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            state: Arc::new(Mutex::new(SyncState::default())),
            timeout: None,
        }
    }

    pub fn from_config(store: Arc<S>, config: &Config) -> Self {
        Self::new(store).with_timeout(config.toggle_timeout)
    }

    /// Treat a remote write that outlives `timeout` as failed.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    fn lock(&self) -> MutexGuard<'_, SyncState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn notify(&self, notice: Notice) {
        self.lock().notices.push(notice);
    }

    pub fn user(&self) -> Option<UserId> {
        self.lock().user.clone()
    }

    /// Switch the session user. A different user starts from an empty set.
    pub fn set_user(&self, user: Option<UserId>) {
        let mut state = self.lock();
        if state.user == user {
            return;
        }
        debug!("Saved listings session user changed to {:?}", user);
        state.user = user;
        state.saved.clear();
        state.entries.clear();
        state.touched.clear();
        state.generation += 1;
    }

    /// Resolve the session user and fetch their saved ids.
    ///
    /// Failures leave the set empty and queue an error notice; nothing here
    /// blocks rendering. Returns the number of saved listings loaded.
    pub async fn load(&self) -> usize {
        let user = match self.store.get_current_user().await {
            Ok(Some(user)) => user.id,
            Ok(None) => {
                debug!("No signed-in user, saved listings stay empty");
                self.set_user(None);
                return 0;
            }
            Err(e) => {
                warn!("Failed to resolve current user: {}", e);
                self.notify(load_failed_notice());
                return 0;
            }
        };

        self.set_user(Some(user.clone()));
        let (generation, since) = {
            let state = self.lock();
            (state.generation, state.changes)
        };

        match self.store.get_saved_listing_ids(&user).await {
            Ok(ids) => {
                let mut state = self.lock();
                if state.generation != generation {
                    return 0;
                }
                let mut saved: HashSet<String> = ids.into_iter().collect();
                // In-flight toggles and changes made while the fetch ran win over it.
                for (id, entry) in &state.entries {
                    let recent = state.touched.get(id).is_some_and(|stamp| *stamp > since);
                    if !(entry.is_pending() || recent) {
                        continue;
                    }
                    match entry.saved() {
                        Some(true) => {
                            saved.insert(id.clone());
                        }
                        Some(false) => {
                            saved.remove(id);
                        }
                        None => {}
                    }
                }
                state.saved = saved;
                info!("Loaded {} saved listings for {}", state.saved.len(), user);
                state.saved.len()
            }
            Err(e) => {
                warn!("Failed to fetch saved listings: {}", e);
                self.notify(load_failed_notice());
                0
            }
        }
    }

    /// Flip the saved state of `listing_id` now, then confirm it remotely.
    ///
    /// Returns [`ToggleOutcome::Skipped`] without touching the store when a
    /// toggle for the same listing is already in flight. A failed remote write
    /// is rolled back and reported as [`AppError::RemoteOperationFailed`].
    pub async fn toggle(&self, listing_id: &str) -> AppResult<ToggleOutcome> {
        let (user, was_saved, generation) = {
            let mut state = self.lock();
            let Some(user) = state.user.clone() else {
                state.notices.push(Notice::error(
                    "Authentication required",
                    "Please sign in to save listings",
                ));
                return Err(AppError::AuthenticationRequired);
            };

            let was_saved = state.saved.contains(listing_id);
            let current = state.entries.get(listing_id).copied().unwrap_or_default();
            let Some(pending) = current.begin(was_saved) else {
                debug!("Toggle for {} already in flight, skipping", listing_id);
                return Ok(ToggleOutcome::Skipped);
            };

            state.entries.insert(listing_id.to_string(), pending);
            state.touch(listing_id);
            if was_saved {
                state.saved.remove(listing_id);
                state.notices.push(Notice::info(
                    "Listing unsaved",
                    "The listing has been removed from your saved deals",
                ));
            } else {
                state.saved.insert(listing_id.to_string());
                state.notices.push(Notice::info(
                    "Listing saved",
                    "The listing has been added to your saved deals",
                ));
            }
            (user, was_saved, state.generation)
        };

        let mut guard = PendingGuard {
            sync: self,
            listing_id,
            generation,
            settled: false,
        };

        let remote = async {
            if was_saved {
                self.store.delete_saved_mark(&user, listing_id).await
            } else {
                self.store.insert_saved_mark(&user, listing_id).await
            }
        };
        let result = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, remote)
                .await
                .unwrap_or_else(|_| Err(AppError::Timeout(limit))),
            None => remote.await,
        };

        match result {
            Ok(()) => {
                guard.settle(true);
                let outcome = if was_saved {
                    ToggleOutcome::Unsaved
                } else {
                    ToggleOutcome::Saved
                };
                info!("Listing {} {:?} for {}", listing_id, outcome, user);
                Ok(outcome)
            }
            Err(e) => {
                guard.settle(false);
                warn!("Error toggling saved status of {}: {}", listing_id, e);
                self.notify(Notice::error(
                    "Operation failed",
                    "There was a problem updating your saved listings",
                ));
                Err(AppError::RemoteOperationFailed(e.to_string()))
            }
        }
    }

    /// Fire-and-forget toggle; observe the result through the snapshots.
    pub fn spawn_toggle(&self, listing_id: impl Into<String>) -> JoinHandle<AppResult<ToggleOutcome>> {
        let sync = self.clone();
        let listing_id = listing_id.into();
        tokio::spawn(async move { sync.toggle(&listing_id).await })
    }

    fn settle(&self, listing_id: &str, generation: u64, success: bool) {
        let mut state = self.lock();
        if state.generation != generation {
            return;
        }
        let Some(entry) = state.entries.get(listing_id).copied() else {
            return;
        };
        let SaveState::Pending { previous, .. } = entry else {
            return;
        };

        state.touch(listing_id);
        if success {
            state.entries.insert(listing_id.to_string(), entry.confirm());
            return;
        }
        if previous {
            state.saved.insert(listing_id.to_string());
        } else {
            state.saved.remove(listing_id);
        }
        state.entries.insert(listing_id.to_string(), entry.roll_back());
    }

    pub fn is_saved(&self, listing_id: &str) -> bool {
        self.lock().saved.contains(listing_id)
    }

    pub fn is_pending(&self, listing_id: &str) -> bool {
        self.state_of(listing_id).is_pending()
    }

    pub fn state_of(&self, listing_id: &str) -> SaveState {
        self.lock().entries.get(listing_id).copied().unwrap_or_default()
    }

    pub fn saved_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.lock().saved.iter().cloned().collect();
        ids.sort();
        ids
    }

    pub fn pending_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .lock()
            .entries
            .iter()
            .filter(|(_, entry)| entry.is_pending())
            .map(|(id, _)| id.clone())
            .collect();
        ids.sort();
        ids
    }

    pub fn snapshot(&self) -> SavedSnapshot {
        SavedSnapshot {
            saved: self.saved_ids(),
            pending: self.pending_ids(),
        }
    }

    pub fn take_notices(&self) -> Vec<Notice> {
        std::mem::take(&mut self.lock().notices)
    }

    /// Full records for the session user's saved listings, for a saved-deals view.
    ///
    /// Saved ids whose listing no longer exists are skipped.
    pub async fn saved_deals(&self) -> AppResult<Vec<Listing>> {
        let user = self.user().ok_or(AppError::AuthenticationRequired)?;
        let ids = self.store.get_saved_listing_ids(&user).await?;

        let mut listings = Vec::with_capacity(ids.len());
        for id in ids {
            let Some(mut listing) = self.store.get_listing_by_id(&id).await? else {
                warn!("Saved listing {} no longer exists", id);
                continue;
            };
            let images = self.store.get_images_for_listing(&id).await?;
            if !images.is_empty() {
                listing.images = images;
            }
            listings.push(listing);
        }
        Ok(listings)
    }
}

fn load_failed_notice() -> Notice {
    Notice::error(
        "Error loading saved listings",
        "Your saved listings couldn't be retrieved",
    )
}

/// Clears the pending entry on every exit from a toggle. If the toggle future
/// is dropped before the remote write settles, the flip is rolled back.
struct PendingGuard<'a, S: ListingStore + 'static> {
    sync: &'a SavedListings<S>,
    listing_id: &'a str,
    generation: u64,
    settled: bool,
}

impl<S: ListingStore + 'static> PendingGuard<'_, S> {
    fn settle(&mut self, success: bool) {
        self.settled = true;
        self.sync.settle(self.listing_id, self.generation, success);
    }
}

impl<S: ListingStore + 'static> Drop for PendingGuard<'_, S> {
    fn drop(&mut self) {
        if !self.settled {
            debug!("Toggle for {} dropped before completion, rolling back", self.listing_id);
            self.sync.settle(self.listing_id, self.generation, false);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::{demo_listings, StoreCall};
    use crate::store::MemoryStore;

    fn signed_in(user: &str) -> (MemoryStore, SavedListings<MemoryStore>) {
        let store = MemoryStore::new(demo_listings());
        store.sign_in(user);
        let sync = SavedListings::new(Arc::new(store.clone()));
        (store, sync)
    }

    async fn wait_for_writes(store: &MemoryStore, count: usize) {
        while store.write_calls().len() < count {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn test_toggle_requires_authentication() {
        let store = MemoryStore::new(demo_listings());
        let sync = SavedListings::new(Arc::new(store.clone()));
        assert_eq!(sync.load().await, 0);

        let err = sync.toggle("demo-1").await.unwrap_err();
        assert!(matches!(err, AppError::AuthenticationRequired));
        assert!(sync.saved_ids().is_empty());
        assert!(sync.pending_ids().is_empty());
        assert_eq!(sync.state_of("demo-1"), SaveState::Idle);
        assert!(store.write_calls().is_empty());

        let notices = sync.take_notices();
        assert_eq!(notices.len(), 1);
        assert_eq!(notices[0].title, "Authentication required");
    }

    #[tokio::test]
    async fn test_toggle_twice_round_trips() {
        let (store, sync) = signed_in("u1");
        sync.load().await;

        assert_eq!(sync.toggle("demo-1").await.unwrap(), ToggleOutcome::Saved);
        assert!(sync.is_saved("demo-1"));
        assert!(store.has_saved("u1", "demo-1"));

        assert_eq!(sync.toggle("demo-1").await.unwrap(), ToggleOutcome::Unsaved);
        assert!(!sync.is_saved("demo-1"));
        assert!(!store.has_saved("u1", "demo-1"));
        assert_eq!(sync.state_of("demo-1"), SaveState::Confirmed { saved: false });

        assert_eq!(
            store.write_calls(),
            vec![
                StoreCall::Insert("u1".into(), "demo-1".into()),
                StoreCall::Delete("u1".into(), "demo-1".into()),
            ]
        );
        assert!(sync.pending_ids().is_empty());
    }

    #[tokio::test]
    async fn test_failed_insert_rolls_back() {
        let (store, sync) = signed_in("u1");
        sync.load().await;
        store.fail_next_insert();

        let err = sync.toggle("demo-2").await.unwrap_err();
        assert!(matches!(err, AppError::RemoteOperationFailed(_)));
        assert!(!sync.is_saved("demo-2"));
        assert!(sync.pending_ids().is_empty());
        assert_eq!(sync.state_of("demo-2"), SaveState::RolledBack { saved: false });

        let notices = sync.take_notices();
        assert_eq!(notices.last().map(|n| n.title.as_str()), Some("Operation failed"));
        assert!(notices.last().unwrap().is_error());
    }

    #[tokio::test]
    async fn test_failed_delete_restores_saved() {
        let (store, sync) = signed_in("u1");
        store.seed_saved("u1", "demo-3");
        assert_eq!(sync.load().await, 1);
        store.fail_next_delete();

        assert!(sync.toggle("demo-3").await.is_err());
        assert!(sync.is_saved("demo-3"));
        assert!(store.has_saved("u1", "demo-3"));
    }

    #[tokio::test]
    async fn test_duplicate_toggle_is_skipped_while_pending() {
        let (store, sync) = signed_in("u1");
        sync.load().await;
        store.hold_writes();

        let first = sync.spawn_toggle("demo-1");
        wait_for_writes(&store, 1).await;
        assert!(sync.is_pending("demo-1"));
        assert!(sync.is_saved("demo-1"));

        assert_eq!(sync.toggle("demo-1").await.unwrap(), ToggleOutcome::Skipped);
        assert_eq!(store.write_calls().len(), 1);

        store.release_writes(1);
        assert_eq!(first.await.unwrap().unwrap(), ToggleOutcome::Saved);
        assert!(sync.pending_ids().is_empty());
        assert!(sync.is_saved("demo-1"));
    }

    #[tokio::test]
    async fn test_toggles_on_different_listings_are_independent() {
        let (store, sync) = signed_in("u1");
        sync.load().await;
        store.hold_writes();

        let first = sync.spawn_toggle("demo-1");
        wait_for_writes(&store, 1).await;
        let second = sync.spawn_toggle("demo-2");
        wait_for_writes(&store, 2).await;
        assert_eq!(sync.pending_ids(), vec!["demo-1".to_string(), "demo-2".to_string()]);

        store.fail_next_insert();
        store.release_writes(1);
        assert!(first.await.unwrap().is_err());
        assert!(!sync.is_saved("demo-1"));
        assert!(sync.is_pending("demo-2"));
        assert!(sync.is_saved("demo-2"));

        store.release_writes(1);
        assert_eq!(second.await.unwrap().unwrap(), ToggleOutcome::Saved);
        assert_eq!(sync.snapshot(), SavedSnapshot { saved: vec!["demo-2".into()], pending: vec![] });
    }

    #[tokio::test]
    async fn test_stuck_write_times_out_and_rolls_back() {
        let (store, sync) = signed_in("u1");
        let sync = sync.with_timeout(Some(Duration::from_millis(20)));
        sync.load().await;
        store.hold_writes();

        let err = sync.toggle("demo-4").await.unwrap_err();
        assert!(matches!(err, AppError::RemoteOperationFailed(_)));
        assert!(!sync.is_saved("demo-4"));
        assert!(!sync.is_pending("demo-4"));
    }

    #[tokio::test]
    async fn test_dropped_toggle_rolls_back() {
        let (store, sync) = signed_in("u1");
        sync.load().await;
        store.hold_writes();

        let abandoned = tokio::time::timeout(Duration::from_millis(10), sync.toggle("demo-5")).await;
        assert!(abandoned.is_err());
        assert!(!sync.is_saved("demo-5"));
        assert!(!sync.is_pending("demo-5"));
        assert_eq!(sync.state_of("demo-5"), SaveState::RolledBack { saved: false });
    }

    #[tokio::test]
    async fn test_load_failure_leaves_set_empty() {
        let (store, sync) = signed_in("u1");
        store.seed_saved("u1", "demo-1");
        store.fail_next_saved_ids();

        assert_eq!(sync.load().await, 0);
        assert!(sync.saved_ids().is_empty());
        assert_eq!(sync.user().as_deref(), Some("u1"));
        let notices = sync.take_notices();
        assert_eq!(notices[0].title, "Error loading saved listings");

        assert_eq!(sync.load().await, 1);
        assert_eq!(sync.saved_ids(), vec!["demo-1".to_string()]);
    }

    #[tokio::test]
    async fn test_toggle_settled_during_load_survives_it() {
        let (store, sync) = signed_in("u1");
        store.hold_saved_reads();

        let loader = {
            let sync = sync.clone();
            tokio::spawn(async move { sync.load().await })
        };
        while !store.calls().contains(&StoreCall::GetSavedIds("u1".into())) {
            tokio::task::yield_now().await;
        }

        assert_eq!(sync.toggle("demo-1").await.unwrap(), ToggleOutcome::Saved);
        assert!(store.has_saved("u1", "demo-1"));

        store.release_saved_reads(1);
        assert_eq!(loader.await.unwrap(), 1);
        assert!(sync.is_saved("demo-1"));
        assert_eq!(sync.saved_ids(), vec!["demo-1".to_string()]);
    }

    #[tokio::test]
    async fn test_load_keeps_rollback_made_during_fetch() {
        let (store, sync) = signed_in("u1");
        store.seed_saved("u1", "demo-2");
        sync.load().await;
        store.hold_saved_reads();

        let loader = {
            let sync = sync.clone();
            tokio::spawn(async move { sync.load().await })
        };
        while store.calls().iter().filter(|c| matches!(c, StoreCall::GetSavedIds(_))).count() < 2 {
            tokio::task::yield_now().await;
        }

        store.fail_next_delete();
        assert!(sync.toggle("demo-2").await.is_err());
        store.release_saved_reads(1);
        loader.await.unwrap();
        assert!(sync.is_saved("demo-2"));
        assert_eq!(sync.state_of("demo-2"), SaveState::RolledBack { saved: true });
    }

    #[tokio::test]
    async fn test_user_switch_discards_old_state() {
        let (store, sync) = signed_in("u1");
        sync.load().await;
        store.hold_writes();

        let pending = sync.spawn_toggle("demo-1");
        wait_for_writes(&store, 1).await;
        sync.set_user(Some("u2".into()));
        assert!(sync.saved_ids().is_empty());
        assert!(sync.pending_ids().is_empty());

        store.release_writes(1);
        assert_eq!(pending.await.unwrap().unwrap(), ToggleOutcome::Saved);
        assert!(!sync.is_saved("demo-1"));
        assert_eq!(sync.state_of("demo-1"), SaveState::Idle);
    }

    #[tokio::test]
    async fn test_saved_deals_resolves_full_listings() {
        let (store, sync) = signed_in("u1");
        store.seed_saved("u1", "demo-1");
        store.seed_saved("u1", "demo-3");
        store.seed_saved("u1", "gone");
        sync.load().await;

        let deals = sync.saved_deals().await.unwrap();
        let ids: Vec<&str> = deals.iter().map(|l| l.id.as_str()).collect();
        assert_eq!(ids, vec!["demo-1", "demo-3"]);
        assert!(deals.iter().all(|l| !l.images.is_empty()));
        assert!(store.calls().contains(&StoreCall::GetImages("demo-3".into())));
    }

    #[tokio::test]
    async fn test_saved_deals_requires_user() {
        let store = MemoryStore::new(demo_listings());
        let sync = SavedListings::new(Arc::new(store));
        assert!(matches!(sync.saved_deals().await, Err(AppError::AuthenticationRequired)));
    }
}
