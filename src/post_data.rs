/// Data structures persisted by Komica Saver
use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

pub const KEY_SAVED_POSTS: &str = "savedPosts";
pub const KEY_HIDDEN_THREADS: &str = "hiddenThreads";
pub const KEY_NG_IDS: &str = "ngIds";
pub const KEY_MAX_RECORDS: &str = "maxRecords";
pub const KEY_AUTO_CHECK_ENABLED: &str = "autoCheckEnabled";
pub const KEY_CHECK_INTERVAL: &str = "checkInterval";
pub const KEY_AUTO_CLEANUP_ENABLED: &str = "autoCleanupEnabled";
pub const KEY_CLEANUP_DAYS: &str = "cleanupDays";
pub const KEY_OPEN_IN_NEW_TAB: &str = "openInNewTab";

/// A bookmarked thread post
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TrackedPost {
    #[serde(default)]
    pub id: String,
    #[serde(deserialize_with = "de_number")]
    pub post_no: u64,
    #[serde(rename = "url", alias = "threadUrl")]
    pub thread_url: String,
    #[serde(default)]
    pub title: String,
    #[serde(default, rename = "preview", alias = "previewText")]
    pub preview_text: String,
    #[serde(default, rename = "timestamp", alias = "createdAt")]
    pub created_at: String,
    #[serde(default, deserialize_with = "de_opt_number", skip_serializing_if = "Option::is_none")]
    pub initial_reply_no: Option<u64>,
    #[serde(default, deserialize_with = "de_opt_number", skip_serializing_if = "Option::is_none")]
    pub last_checked_reply_no: Option<u64>,
    #[serde(default)]
    pub has_update: bool,
    #[serde(default)]
    pub new_reply_count: u32,
    #[serde(default, deserialize_with = "de_opt_number", skip_serializing_if = "Option::is_none")]
    pub first_new_reply_no: Option<u64>,
}

impl TrackedPost {
    pub fn new(post_no: u64, thread_url: String, title: String, preview_text: String) -> TrackedPost {
        TrackedPost {
            id: post_id(post_no),
            post_no,
            thread_url,
            title,
            preview_text,
            created_at: String::new(),
            initial_reply_no: None,
            last_checked_reply_no: None,
            has_update: false,
            new_reply_count: 0,
            first_new_reply_no: None,
        }
    }

    /// Start tracking replies from `reply_no` onwards.
    pub fn with_baseline(mut self, reply_no: u64) -> TrackedPost {
        self.initial_reply_no = Some(reply_no);
        self.last_checked_reply_no = Some(reply_no);
        self
    }

    /// Records saved before update tracking existed carry no baseline.
    pub fn is_tracked(&self) -> bool {
        self.initial_reply_no.is_some() && self.last_checked_reply_no.is_some()
    }
}

/// Stable id of the saved record for a post number
pub fn post_id(post_no: u64) -> String {
    format!("post-{}", post_no)
}

/// A hidden thread or a blocked poster id
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ListEntry {
    pub id: String,
    pub added_at: f64,
}

/// Any shape a hidden-thread or blocked-id element has been stored in.
///
/// Older versions stored bare ids (strings, or numbers for thread numbers),
/// later ones `{id}` objects, and the current one `{id, addedAt}`.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum StoredEntry {
    Record {
        #[serde(deserialize_with = "de_id")]
        id: String,
        #[serde(default, rename = "addedAt")]
        added_at: Option<f64>,
    },
    Bare(#[serde(deserialize_with = "de_id")] String),
}

impl StoredEntry {
    /// Canonical form; entries without a timestamp are stamped with `now`
    /// and ids lose surrounding whitespace.
    ///
    /// The flag is set when the stored shape differs from the canonical one.
    pub fn into_entry(self, now: f64) -> (ListEntry, bool) {
        let (raw_id, added_at, mut migrated) = match self {
            StoredEntry::Record { id, added_at: Some(added_at) } => (id, added_at, false),
            StoredEntry::Record { id, added_at: None } | StoredEntry::Bare(id) => (id, now, true),
        };
        let id = match raw_id.trim() {
            trimmed if trimmed.len() == raw_id.len() => raw_id,
            trimmed => {
                migrated = true;
                trimmed.to_string()
            }
        };
        (ListEntry { id, added_at }, migrated)
    }
}

/// User settings, one storage key each
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub max_records: usize,
    pub auto_check_enabled: bool,
    pub check_interval_seconds: u64,
    pub auto_cleanup_enabled: bool,
    pub cleanup_retention_days: u32,
    pub open_in_new_tab: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            max_records: 50,
            auto_check_enabled: false,
            check_interval_seconds: 300,
            auto_cleanup_enabled: false,
            cleanup_retention_days: 30,
            open_in_new_tab: true,
        }
    }
}

impl Settings {
    /// Every persisted key with its install-time default
    pub fn install_defaults() -> Vec<(&'static str, Value)> {
        let defaults = Settings::default();
        vec![
            (KEY_SAVED_POSTS, json!([])),
            (KEY_HIDDEN_THREADS, json!([])),
            (KEY_NG_IDS, json!([])),
            (KEY_MAX_RECORDS, json!(defaults.max_records)),
            (KEY_AUTO_CHECK_ENABLED, json!(defaults.auto_check_enabled)),
            (KEY_CHECK_INTERVAL, json!(defaults.check_interval_seconds)),
            (KEY_AUTO_CLEANUP_ENABLED, json!(defaults.auto_cleanup_enabled)),
            (KEY_CLEANUP_DAYS, json!(defaults.cleanup_retention_days)),
            (KEY_OPEN_IN_NEW_TAB, json!(defaults.open_in_new_tab)),
        ]
    }
}

// The content pages read numbers out of `data-no` attributes, so post and
// thread numbers arrive as strings as often as numbers.
#[derive(Deserialize)]
#[serde(untagged)]
enum Scalar {
    Int(u64),
    Float(f64),
    Text(String),
}

impl Scalar {
    fn into_number<E: de::Error>(self) -> Result<u64, E> {
        match self {
            Scalar::Int(n) => Ok(n),
            Scalar::Float(f) if f >= 0.0 && f.fract() == 0.0 => Ok(f as u64),
            Scalar::Float(f) => Err(E::custom(format!("not a post number: {}", f))),
            Scalar::Text(s) => s
                .trim()
                .parse()
                .map_err(|_| E::custom(format!("not a post number: {:?}", s))),
        }
    }

    fn into_id(self) -> String {
        match self {
            Scalar::Int(n) => n.to_string(),
            Scalar::Float(f) if f.fract() == 0.0 && f >= 0.0 => (f as u64).to_string(),
            Scalar::Float(f) => f.to_string(),
            Scalar::Text(s) => s,
        }
    }
}

pub(crate) fn de_number<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
    Scalar::deserialize(deserializer)?.into_number()
}

pub(crate) fn de_opt_number<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<u64>, D::Error> {
    Option::<Scalar>::deserialize(deserializer)?
        .map(Scalar::into_number)
        .transpose()
}

/// A post number as the content script may send it: integer, whole float or digits
pub fn parse_post_no(value: Value) -> crate::error::Result<u64> {
    de_number(value).map_err(|e| crate::error::Error::InvalidInput(e.to_string()))
}

pub(crate) fn de_id<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(Scalar::deserialize(deserializer)?.into_id())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_post_from_content_page_json() {
        let json = r#"{
            "id": "post-100",
            "postNo": "100",
            "url": "https://gita.komica1.org/00b/pixmicat.php?res=100",
            "title": "No.100",
            "preview": "hello",
            "timestamp": "2024-10-28T10:30:00.000Z",
            "initialReplyNo": 100,
            "lastCheckedReplyNo": 100
        }"#;

        let post: TrackedPost = serde_json::from_str(json).unwrap();

        assert_eq!(post.post_no, 100);
        assert_eq!(post.id, "post-100");
        assert_eq!(post.initial_reply_no, Some(100));
        assert!(!post.has_update);
        assert_eq!(post.first_new_reply_no, None);
        assert!(post.is_tracked());
    }

    #[test]
    fn test_legacy_post_without_tracking_fields() {
        let json = r#"{"id":"post-7","postNo":7,"url":"https://x/res=7","title":"t","preview":"p"}"#;
        let post: TrackedPost = serde_json::from_str(json).unwrap();

        assert!(!post.is_tracked());
        assert_eq!(post.new_reply_count, 0);
    }

    #[test]
    fn test_post_serializes_camel_case() {
        let post = TrackedPost::new(5, "https://x".to_string(), "t".to_string(), "p".to_string())
            .with_baseline(9);
        let value = serde_json::to_value(&post).unwrap();

        assert_eq!(value["postNo"], 5);
        assert_eq!(value["url"], "https://x");
        assert_eq!(value["preview"], "p");
        assert_eq!(value["lastCheckedReplyNo"], 9);
        assert!(value.get("firstNewReplyNo").is_none());
    }

    #[test]
    fn test_post_number_rejects_garbage() {
        let json = r#"{"postNo":"abc","url":"https://x"}"#;
        assert!(serde_json::from_str::<TrackedPost>(json).is_err());
    }

    #[test]
    fn test_stored_entry_shapes() {
        let entries: Vec<StoredEntry> =
            serde_json::from_str(r#"["555", 556, {"id":"557"}, {"id":"558","addedAt":12.0}]"#).unwrap();

        assert_eq!(entries[0], StoredEntry::Bare("555".to_string()));
        assert_eq!(entries[1], StoredEntry::Bare("556".to_string()));
        assert_eq!(
            entries[2],
            StoredEntry::Record { id: "557".to_string(), added_at: None }
        );
        assert_eq!(
            entries[3].clone().into_entry(99.0),
            (ListEntry { id: "558".to_string(), added_at: 12.0 }, false)
        );
    }

    #[test]
    fn test_bare_entry_is_stamped() {
        let (entry, migrated) = StoredEntry::Bare("555".to_string()).into_entry(1000.0);
        assert!(migrated);
        assert_eq!(entry, ListEntry { id: "555".to_string(), added_at: 1000.0 });
    }

    #[test]
    fn test_untrimmed_id_is_cleaned() {
        let (entry, migrated) = StoredEntry::Record { id: " abc ".to_string(), added_at: Some(7.0) }.into_entry(1000.0);
        assert!(migrated);
        assert_eq!(entry, ListEntry { id: "abc".to_string(), added_at: 7.0 });

        let (entry, migrated) = StoredEntry::Record { id: "abc".to_string(), added_at: Some(7.0) }.into_entry(1000.0);
        assert!(!migrated);
        assert_eq!(entry.id, "abc");
    }

    #[test]
    fn test_parse_post_no_accepts_wide_numbers() {
        assert_eq!(parse_post_no(json!(5_000_000_000u64)).unwrap(), 5_000_000_000);
        assert_eq!(parse_post_no(json!("5000000000")).unwrap(), 5_000_000_000);
        assert_eq!(parse_post_no(json!(42.0)).unwrap(), 42);
        assert!(parse_post_no(json!(-1)).is_err());
        assert!(parse_post_no(json!("abc")).is_err());
    }

    #[test]
    fn test_install_defaults_cover_every_key() {
        let keys: Vec<&str> = Settings::install_defaults().iter().map(|(k, _)| *k).collect();
        assert_eq!(keys.len(), 9);
        assert!(keys.contains(&KEY_CLEANUP_DAYS));
        assert!(keys.contains(&KEY_OPEN_IN_NEW_TAB));
    }
}
