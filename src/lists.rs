/// List maintenance: saved posts, hidden threads and blocked ids.
///
/// Everything here works on in-memory lists; the service loads a list, calls
/// one of these and writes the whole list back.

use crate::post_data::{ListEntry, StoredEntry, TrackedPost};
use std::collections::HashSet;

const DAY_MS: f64 = 24.0 * 60.0 * 60.0 * 1000.0;

/// Outcome of toggling a post's saved state
#[derive(Debug, Clone, PartialEq)]
pub enum Toggle {
    /// Inserted at the front; `evicted` holds posts pushed past the cap.
    Saved { evicted: Vec<TrackedPost> },
    Unsaved(TrackedPost),
}

/// Un-save the post if a record with its id exists, otherwise save it at the front
pub fn toggle_saved(posts: &mut Vec<TrackedPost>, post: TrackedPost, max_records: usize) -> Toggle {
    match posts.iter().position(|p| p.id == post.id) {
        Some(index) => Toggle::Unsaved(posts.remove(index)),
        None => {
            posts.insert(0, post);
            Toggle::Saved {
                evicted: trim(posts, max_records),
            }
        }
    }
}

/// Cut the list down to `max_records`, returning the evicted tail
pub fn trim(posts: &mut Vec<TrackedPost>, max_records: usize) -> Vec<TrackedPost> {
    if posts.len() > max_records {
        posts.split_off(max_records)
    } else {
        Vec::new()
    }
}

pub fn remove_post(posts: &mut Vec<TrackedPost>, id: &str) -> Option<TrackedPost> {
    posts
        .iter()
        .position(|p| p.id == id)
        .map(|index| posts.remove(index))
}

/// Mark a post's pending replies as seen.
///
/// Returns false when the post is missing or has nothing pending.
pub fn clear_update(posts: &mut [TrackedPost], id: &str) -> bool {
    match posts.iter_mut().find(|p| p.id == id && p.has_update) {
        Some(post) => {
            post.has_update = false;
            post.new_reply_count = 0;
            if post.last_checked_reply_no.is_some() {
                post.initial_reply_no = post.last_checked_reply_no;
            }
            post.first_new_reply_no = None;
            true
        }
        None => false,
    }
}

/// Insert `id` at the front unless already present
pub fn add_entry(entries: &mut Vec<ListEntry>, id: &str, now: f64) -> bool {
    if entries.iter().any(|e| e.id == id) {
        return false;
    }
    entries.insert(
        0,
        ListEntry {
            id: id.to_string(),
            added_at: now,
        },
    );
    true
}

pub fn remove_entry(entries: &mut Vec<ListEntry>, id: &str) -> bool {
    let original_len = entries.len();
    entries.retain(|e| e.id != id);
    entries.len() < original_len
}

/// Oldest `addedAt` that survives a sweep with the given retention
pub fn retention_threshold(now: f64, retention_days: u32) -> f64 {
    now - f64::from(retention_days) * DAY_MS
}

/// Drop entries added strictly before `threshold`, returning them
pub fn expire(entries: &mut Vec<ListEntry>, threshold: f64) -> Vec<ListEntry> {
    let (keep, expired): (Vec<ListEntry>, Vec<ListEntry>) =
        entries.drain(..).partition(|e| e.added_at >= threshold);
    *entries = keep;
    expired
}

/// Decode stored elements into canonical entries, keeping the first of any duplicate id
/// and dropping blank ones.
///
/// The flag reports whether the stored form differs from the canonical one.
pub fn canonicalize(stored: Vec<StoredEntry>, now: f64) -> (Vec<ListEntry>, bool) {
    let mut seen = HashSet::new();
    let mut changed = false;
    let mut entries = Vec::with_capacity(stored.len());

    for item in stored {
        let (entry, migrated) = item.into_entry(now);
        changed |= migrated;
        if entry.id.is_empty() {
            changed = true;
        } else if seen.insert(entry.id.clone()) {
            entries.push(entry);
        } else {
            changed = true;
        }
    }

    (entries, changed)
}

/// Ids only, in list order
pub fn entry_ids(entries: &[ListEntry]) -> Vec<String> {
    entries.iter().map(|e| e.id.clone()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_post(post_no: u64) -> TrackedPost {
        TrackedPost::new(
            post_no,
            format!("https://gita.komica1.org/00b/pixmicat.php?res={}", post_no),
            format!("No.{}", post_no),
            "preview".to_string(),
        )
        .with_baseline(post_no)
    }

    fn ids(posts: &[TrackedPost]) -> Vec<u64> {
        posts.iter().map(|p| p.post_no).collect()
    }

    #[test]
    fn test_toggle_inserts_at_front() {
        let mut posts = vec![create_test_post(1)];

        let outcome = toggle_saved(&mut posts, create_test_post(2), 50);

        assert_eq!(outcome, Toggle::Saved { evicted: vec![] });
        assert_eq!(ids(&posts), vec![2, 1]);
    }

    #[test]
    fn test_toggle_twice_restores_list() {
        let mut posts = vec![create_test_post(1), create_test_post(2)];
        let before = posts.clone();

        toggle_saved(&mut posts, create_test_post(3), 50);
        let outcome = toggle_saved(&mut posts, create_test_post(3), 50);

        assert!(matches!(outcome, Toggle::Unsaved(ref p) if p.post_no == 3));
        assert_eq!(posts, before);
    }

    #[test]
    fn test_toggle_sequence_keeps_ids_unique() {
        let mut posts = Vec::new();
        let mut saved = HashSet::new();
        let mut seed: u64 = 7;

        for _ in 0..200 {
            seed = seed.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            let no = (seed >> 33) % 6 + 1;

            match toggle_saved(&mut posts, create_test_post(no), 4) {
                Toggle::Saved { evicted } => {
                    assert!(saved.insert(no));
                    for post in evicted {
                        assert!(saved.remove(&post.post_no));
                    }
                }
                Toggle::Unsaved(post) => assert!(saved.remove(&post.post_no)),
            }

            let unique: HashSet<&str> = posts.iter().map(|p| p.id.as_str()).collect();
            assert_eq!(unique.len(), posts.len());
            assert!(posts.len() <= 4);
            assert_eq!(posts.len(), saved.len());
        }
    }

    #[test]
    fn test_toggle_existing_removes_in_place() {
        let mut posts = vec![create_test_post(1), create_test_post(2), create_test_post(3)];

        toggle_saved(&mut posts, create_test_post(2), 50);

        assert_eq!(ids(&posts), vec![1, 3]);
    }

    #[test]
    fn test_toggle_evicts_tail_over_cap() {
        let mut posts = Vec::new();
        toggle_saved(&mut posts, create_test_post(1), 2);
        toggle_saved(&mut posts, create_test_post(2), 2);

        let outcome = toggle_saved(&mut posts, create_test_post(3), 2);

        assert_eq!(ids(&posts), vec![3, 2]);
        match outcome {
            Toggle::Saved { evicted } => assert_eq!(ids(&evicted), vec![1]),
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    #[test]
    fn test_trim_returns_exact_overflow() {
        let mut posts: Vec<TrackedPost> = (1..=5).map(create_test_post).collect();

        let evicted = trim(&mut posts, 2);

        assert_eq!(ids(&posts), vec![1, 2]);
        assert_eq!(ids(&evicted), vec![3, 4, 5]);
        assert!(trim(&mut posts, 2).is_empty());
    }

    #[test]
    fn test_remove_missing_post_is_noop() {
        let mut posts = vec![create_test_post(1)];
        assert!(remove_post(&mut posts, "post-9").is_none());
        assert_eq!(posts.len(), 1);
    }

    #[test]
    fn test_clear_update_resets_baseline() {
        let mut post = create_test_post(100);
        post.last_checked_reply_no = Some(102);
        post.new_reply_count = 2;
        post.has_update = true;
        post.first_new_reply_no = Some(101);
        let mut posts = vec![post];

        assert!(clear_update(&mut posts, "post-100"));

        let post = &posts[0];
        assert!(!post.has_update);
        assert_eq!(post.new_reply_count, 0);
        assert_eq!(post.initial_reply_no, Some(102));
        assert_eq!(post.first_new_reply_no, None);
    }

    #[test]
    fn test_clear_update_is_idempotent() {
        let mut post = create_test_post(100);
        post.last_checked_reply_no = Some(105);
        post.new_reply_count = 5;
        post.has_update = true;
        let mut posts = vec![post];

        assert!(clear_update(&mut posts, "post-100"));
        let once = posts.clone();
        assert!(!clear_update(&mut posts, "post-100"));
        assert_eq!(posts, once);
    }

    #[test]
    fn test_add_entry_is_unique() {
        let mut entries = Vec::new();
        assert!(add_entry(&mut entries, "123", 1.0));
        assert!(add_entry(&mut entries, "456", 2.0));
        assert!(!add_entry(&mut entries, "123", 3.0));

        assert_eq!(entry_ids(&entries), vec!["456", "123"]);
        assert_eq!(entries[1].added_at, 1.0);
    }

    #[test]
    fn test_remove_entry() {
        let mut entries = Vec::new();
        add_entry(&mut entries, "a", 1.0);

        assert!(remove_entry(&mut entries, "a"));
        assert!(!remove_entry(&mut entries, "a"));
        assert!(entries.is_empty());
    }

    #[test]
    fn test_expire_removes_strictly_older() {
        let now = 100.0 * DAY_MS;
        let threshold = retention_threshold(now, 30);
        let mut entries = vec![
            ListEntry { id: "old".to_string(), added_at: threshold - 1.0 },
            ListEntry { id: "edge".to_string(), added_at: threshold },
            ListEntry { id: "fresh".to_string(), added_at: now },
        ];

        let expired = expire(&mut entries, threshold);

        assert_eq!(entry_ids(&expired), vec!["old"]);
        assert_eq!(entry_ids(&entries), vec!["edge", "fresh"]);
    }

    #[test]
    fn test_canonicalize_dedupes() {
        let stored = vec![
            StoredEntry::Bare("1".to_string()),
            StoredEntry::Record { id: "1".to_string(), added_at: Some(5.0) },
            StoredEntry::Record { id: "2".to_string(), added_at: Some(6.0) },
        ];

        let (entries, changed) = canonicalize(stored, 9.0);

        assert!(changed);
        assert_eq!(
            entries,
            vec![
                ListEntry { id: "1".to_string(), added_at: 9.0 },
                ListEntry { id: "2".to_string(), added_at: 6.0 },
            ]
        );
    }

    #[test]
    fn test_canonicalize_trims_and_merges_ids() {
        let stored = vec![
            StoredEntry::Record { id: " abc".to_string(), added_at: Some(5.0) },
            StoredEntry::Bare("abc ".to_string()),
            StoredEntry::Bare("   ".to_string()),
        ];

        let (entries, changed) = canonicalize(stored, 9.0);

        assert!(changed);
        assert_eq!(entries, vec![ListEntry { id: "abc".to_string(), added_at: 5.0 }]);
    }

    #[test]
    fn test_canonicalize_clean_list_unchanged() {
        let stored = vec![StoredEntry::Record { id: "1".to_string(), added_at: Some(5.0) }];
        let (_, changed) = canonicalize(stored, 9.0);
        assert!(!changed);
    }
}
