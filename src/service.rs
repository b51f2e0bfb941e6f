/// The background service: every operation the router can reach.
///
/// Each mutating operation is a whole-list read-modify-write done under
/// `write_lock`, so two handlers interleaving at an await point cannot
/// overwrite each other's changes. Reads go straight to the store.

use crate::checker::{PageFetcher, aggregate_badge, apply_scans, scan_tracked};
use crate::error::{Error, Result};
use crate::lists::{self, Toggle};
use crate::notifier::{Event, Notifier, badge_text};
use crate::page::normalize_post;
use crate::post_data::{KEY_HIDDEN_THREADS, KEY_NG_IDS, TrackedPost, post_id};
use crate::scheduler::{self, AlarmScheduler, Job};
use crate::storage::{self, Store};
use futures::lock::Mutex;

pub struct Service<S, F, N, A> {
    store: S,
    fetcher: F,
    notifier: N,
    alarms: A,
    clock: fn() -> f64,
    write_lock: Mutex<()>,
}

impl<S, F, N, A> Service<S, F, N, A>
where
    S: Store,
    F: PageFetcher,
    N: Notifier,
    A: AlarmScheduler,
{
    /// `clock` returns the current time in epoch milliseconds.
    pub fn new(store: S, fetcher: F, notifier: N, alarms: A, clock: fn() -> f64) -> Self {
        Service {
            store,
            fetcher,
            notifier,
            alarms,
            clock,
            write_lock: Mutex::new(()),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn notifier(&self) -> &N {
        &self.notifier
    }

    pub fn alarms(&self) -> &A {
        &self.alarms
    }

    fn now(&self) -> f64 {
        (self.clock)()
    }

    /// First install: seed missing keys and schedule both jobs
    pub async fn install(&self) -> Result<()> {
        let written = {
            let _guard = self.write_lock.lock().await;
            storage::seed_defaults(&self.store).await?
        };
        if !written.is_empty() {
            log::info!("Seeded defaults for {:?}", written);
        }
        self.schedule_jobs().await
    }

    /// Browser start: alarms and the badge do not survive a restart
    pub async fn startup(&self) -> Result<()> {
        self.schedule_jobs().await?;
        let posts = storage::load_posts(&self.store).await?;
        self.refresh_badge(&posts).await;
        Ok(())
    }

    async fn schedule_jobs(&self) -> Result<()> {
        self.update_alarm().await?;
        scheduler::configure_cleanup_alarm(&self.alarms).await
    }

    /// Re-read the check settings and replace the check alarm
    pub async fn update_alarm(&self) -> Result<Option<u64>> {
        let settings = storage::load_settings(&self.store).await?;
        scheduler::configure_check_alarm(&self.alarms, &settings).await
    }

    pub async fn on_alarm(&self, name: &str) -> Result<()> {
        match Job::from_alarm(name) {
            Some(Job::CheckUpdates) => self.check_updates().await.map(|_| ()),
            Some(Job::Cleanup) => self.expire_old_entries().await.map(|_| ()),
            None => {
                log::debug!("Ignoring alarm {}", name);
                Ok(())
            }
        }
    }

    pub async fn all_posts(&self) -> Result<Vec<TrackedPost>> {
        storage::load_posts(&self.store).await
    }

    pub async fn is_post_saved(&self, post_no: u64) -> Result<bool> {
        let id = post_id(post_no);
        let posts = storage::load_posts(&self.store).await?;
        Ok(posts.iter().any(|p| p.id == id))
    }

    /// Save the post, or un-save it if it is already saved.
    ///
    /// Returns the post's new saved state.
    pub async fn toggle_saved(&self, post: TrackedPost) -> Result<bool> {
        let post = normalize_post(post);
        let post_no = post.post_no;

        let (outcome, posts) = {
            let _guard = self.write_lock.lock().await;
            let settings = storage::load_settings(&self.store).await?;
            let mut posts = storage::load_posts(&self.store).await?;
            let outcome = lists::toggle_saved(&mut posts, post, settings.max_records);
            storage::save_posts(&self.store, &posts).await?;
            (outcome, posts)
        };

        let is_saved = match outcome {
            Toggle::Saved { evicted } => {
                log::info!("Saved post {}", post_no);
                self.notify_saved_state(post_no, true).await;
                self.notify_evicted(&evicted).await;
                true
            }
            Toggle::Unsaved(_) => {
                log::info!("Unsaved post {}", post_no);
                self.notify_saved_state(post_no, false).await;
                false
            }
        };
        self.refresh_badge(&posts).await;
        Ok(is_saved)
    }

    /// Apply the current record cap, returning how many posts were evicted
    pub async fn trim_records(&self) -> Result<usize> {
        let (evicted, posts) = {
            let _guard = self.write_lock.lock().await;
            let settings = storage::load_settings(&self.store).await?;
            let mut posts = storage::load_posts(&self.store).await?;
            let evicted = lists::trim(&mut posts, settings.max_records);
            if !evicted.is_empty() {
                storage::save_posts(&self.store, &posts).await?;
            }
            (evicted, posts)
        };

        if !evicted.is_empty() {
            log::info!("Trimmed {} saved posts", evicted.len());
            self.notify_evicted(&evicted).await;
            self.refresh_badge(&posts).await;
        }
        Ok(evicted.len())
    }

    pub async fn delete_post(&self, id: &str) -> Result<()> {
        let (removed, posts) = {
            let _guard = self.write_lock.lock().await;
            let mut posts = storage::load_posts(&self.store).await?;
            let removed = lists::remove_post(&mut posts, id);
            if removed.is_some() {
                storage::save_posts(&self.store, &posts).await?;
            }
            (removed, posts)
        };

        if let Some(removed) = removed {
            log::info!("Deleted saved post {}", removed.post_no);
            self.notify_saved_state(removed.post_no, false).await;
            self.refresh_badge(&posts).await;
        }
        Ok(())
    }

    pub async fn clear_update_flag(&self, id: &str) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut posts = storage::load_posts(&self.store).await?;
        if lists::clear_update(&mut posts, id) {
            storage::save_posts(&self.store, &posts).await?;
            self.refresh_badge(&posts).await;
        }
        Ok(())
    }

    pub async fn hide_thread(&self, thread_no: &str) -> Result<()> {
        let now = self.now();
        let _guard = self.write_lock.lock().await;
        let (mut entries, migrated) = storage::load_entries(&self.store, KEY_HIDDEN_THREADS, now).await?;
        if lists::add_entry(&mut entries, thread_no, now) || migrated {
            storage::save_entries(&self.store, KEY_HIDDEN_THREADS, &entries).await?;
        }
        Ok(())
    }

    pub async fn unhide_thread(&self, thread_no: &str) -> Result<()> {
        let now = self.now();
        {
            let _guard = self.write_lock.lock().await;
            let (mut entries, migrated) = storage::load_entries(&self.store, KEY_HIDDEN_THREADS, now).await?;
            if lists::remove_entry(&mut entries, thread_no) || migrated {
                storage::save_entries(&self.store, KEY_HIDDEN_THREADS, &entries).await?;
            }
        }
        self.notifier
            .broadcast(&Event::UnhideThread {
                thread_no: thread_no.to_string(),
            })
            .await;
        Ok(())
    }

    pub async fn hidden_threads(&self) -> Result<Vec<String>> {
        let (entries, _) = storage::load_entries(&self.store, KEY_HIDDEN_THREADS, self.now()).await?;
        Ok(lists::entry_ids(&entries))
    }

    pub async fn add_blocked_id(&self, ng_id: &str) -> Result<()> {
        let ng_id = ng_id.trim();
        if ng_id.is_empty() {
            return Err(Error::InvalidInput("ID cannot be empty".to_string()));
        }

        let now = self.now();
        let added = {
            let _guard = self.write_lock.lock().await;
            let (mut entries, migrated) = storage::load_entries(&self.store, KEY_NG_IDS, now).await?;
            let added = lists::add_entry(&mut entries, ng_id, now);
            if added || migrated {
                storage::save_entries(&self.store, KEY_NG_IDS, &entries).await?;
            }
            added
        };

        if added {
            log::info!("Blocking id {}", ng_id);
            self.notifier.broadcast(&Event::ApplyNgIdFilter).await;
        }
        Ok(())
    }

    pub async fn remove_blocked_id(&self, ng_id: &str) -> Result<()> {
        let ng_id = ng_id.trim();
        let now = self.now();
        {
            let _guard = self.write_lock.lock().await;
            let (mut entries, migrated) = storage::load_entries(&self.store, KEY_NG_IDS, now).await?;
            if lists::remove_entry(&mut entries, ng_id) || migrated {
                storage::save_entries(&self.store, KEY_NG_IDS, &entries).await?;
            }
        }
        self.notifier
            .broadcast(&Event::UnhidePostsByNgId {
                ng_id: ng_id.to_string(),
            })
            .await;
        Ok(())
    }

    pub async fn blocked_ids(&self) -> Result<Vec<String>> {
        let (entries, _) = storage::load_entries(&self.store, KEY_NG_IDS, self.now()).await?;
        Ok(lists::entry_ids(&entries))
    }

    /// Drop hidden threads and blocked ids older than the retention window.
    ///
    /// Does nothing unless auto-cleanup is on. Returns how many entries went.
    pub async fn expire_old_entries(&self) -> Result<usize> {
        let settings = storage::load_settings(&self.store).await?;
        if !settings.auto_cleanup_enabled {
            return Ok(0);
        }

        let now = self.now();
        let threshold = lists::retention_threshold(now, settings.cleanup_retention_days);
        let mut removed = 0;
        {
            let _guard = self.write_lock.lock().await;
            for key in [KEY_HIDDEN_THREADS, KEY_NG_IDS] {
                let (mut entries, migrated) = storage::load_entries(&self.store, key, now).await?;
                let expired = lists::expire(&mut entries, threshold);
                if migrated || !expired.is_empty() {
                    storage::save_entries(&self.store, key, &entries).await?;
                }
                removed += expired.len();
            }
        }

        if removed > 0 {
            log::info!("Cleanup removed {} entries older than {} days", removed, settings.cleanup_retention_days);
            self.notifier.broadcast(&Event::ReapplyFunctions).await;
        }
        Ok(removed)
    }

    /// One pass of the update checker. Returns the aggregate badge count.
    pub async fn check_updates(&self) -> Result<u32> {
        let snapshot = storage::load_posts(&self.store).await?;
        if !snapshot.iter().any(TrackedPost::is_tracked) {
            return Ok(aggregate_badge(&snapshot));
        }

        let scans = scan_tracked(&self.fetcher, &snapshot).await;

        let _guard = self.write_lock.lock().await;
        let mut posts = storage::load_posts(&self.store).await?;
        if apply_scans(&mut posts, &scans) {
            storage::save_posts(&self.store, &posts).await?;
            self.refresh_badge(&posts).await;
        }
        Ok(aggregate_badge(&posts))
    }

    async fn refresh_badge(&self, posts: &[TrackedPost]) {
        self.notifier.set_badge(&badge_text(aggregate_badge(posts))).await;
    }

    async fn notify_saved_state(&self, post_no: u64, is_saved: bool) {
        self.notifier
            .broadcast(&Event::UpdateButtonUi { post_no, is_saved })
            .await;
    }

    async fn notify_evicted(&self, evicted: &[TrackedPost]) {
        for post in evicted {
            self.notify_saved_state(post.post_no, false).await;
        }
    }
}
