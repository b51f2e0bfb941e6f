/// Thread update checking.
///
/// A pass has two halves: `scan_tracked` fetches every tracked thread one at
/// a time, then `apply_scans` folds the results into the saved posts. The
/// service keeps the store unlocked during the first half.

use crate::error::Result;
use crate::page::{PageScan, scan_thread_page};
use crate::post_data::TrackedPost;

/// Fetches a thread page's HTML
#[allow(async_fn_in_trait)]
pub trait PageFetcher {
    async fn fetch_page(&self, url: &str) -> Result<String>;
}

/// Fetch and scan the thread of every tracked post.
///
/// Failed fetches and pages without a root post are logged and left out; the
/// rest of the pass carries on.
pub async fn scan_tracked<F: PageFetcher>(fetcher: &F, posts: &[TrackedPost]) -> Vec<(String, PageScan)> {
    let mut scans = Vec::new();

    for post in posts.iter().filter(|p| p.is_tracked()) {
        let html = match fetcher.fetch_page(&post.thread_url).await {
            Ok(html) => html,
            Err(e) => {
                log::warn!("Skipping {} this pass: {}", post.id, e);
                continue;
            }
        };

        match scan_thread_page(&html) {
            Some(scan) => {
                log::debug!("{}: last post on page is {}", post.id, scan.last_no());
                scans.push((post.id.clone(), scan));
            }
            None => log::warn!("Skipping {} this pass: no thread post on page", post.id),
        }
    }

    scans
}

/// Fold one page scan into a post. Returns whether the post changed.
pub fn apply_scan(post: &mut TrackedPost, scan: &PageScan) -> bool {
    let (Some(initial), Some(last_checked)) = (post.initial_reply_no, post.last_checked_reply_no) else {
        return false;
    };

    let observed_last = scan.last_no();
    if observed_last <= last_checked {
        return false;
    }

    let new_since: Vec<u64> = scan
        .reply_nos
        .iter()
        .copied()
        .filter(|&no| no > initial)
        .collect();

    post.last_checked_reply_no = Some(observed_last);

    if new_since.is_empty() {
        // Nothing the user has not seen; move the baseline along quietly.
        return true;
    }

    if !post.has_update {
        post.first_new_reply_no = new_since.first().copied();
    }
    post.new_reply_count = new_since.len() as u32;
    post.has_update = true;
    true
}

/// Apply scans by post id; posts removed since the scan are ignored
pub fn apply_scans(posts: &mut [TrackedPost], scans: &[(String, PageScan)]) -> bool {
    let mut changed = false;
    for (id, scan) in scans {
        if let Some(post) = posts.iter_mut().find(|p| &p.id == id) {
            changed |= apply_scan(post, scan);
        }
    }
    changed
}

/// Total of new replies across posts with a pending update
pub fn aggregate_badge(posts: &[TrackedPost]) -> u32 {
    posts
        .iter()
        .filter(|p| p.has_update)
        .map(|p| p.new_reply_count)
        .sum()
}
