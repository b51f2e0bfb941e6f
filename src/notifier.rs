/// Best-effort UI sync events for open board tabs.
///
/// Events are hints: a tab that misses one rebuilds its view from storage
/// the next time it loads.

use serde::Serialize;
use url::Url;

/// Hosts whose tabs receive broadcasts
pub const SITE_HOSTS: &[&str] = &["gita.komica1.org"];

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "action")]
pub enum Event {
    #[serde(rename = "updateButtonUI", rename_all = "camelCase")]
    UpdateButtonUi { post_no: u64, is_saved: bool },
    #[serde(rename = "unhideThread", rename_all = "camelCase")]
    UnhideThread { thread_no: String },
    #[serde(rename = "applyNgIdFilter")]
    ApplyNgIdFilter,
    #[serde(rename = "unhidePostsByNgId", rename_all = "camelCase")]
    UnhidePostsByNgId { ng_id: String },
    #[serde(rename = "reapplyFunctions")]
    ReapplyFunctions,
}

/// Pushes events to open tabs and sets the toolbar badge.
///
/// Both are fire-and-forget; implementations swallow delivery failures.
#[allow(async_fn_in_trait)]
pub trait Notifier {
    async fn broadcast(&self, event: &Event);

    async fn set_badge(&self, text: &str);
}

/// Badge text for the number of new replies; empty hides the badge
pub fn badge_text(count: u32) -> String {
    if count == 0 {
        String::new()
    } else {
        count.to_string()
    }
}

/// Whether a tab URL belongs to one of the supported boards
pub fn is_site_tab(tab_url: &str) -> bool {
    Url::parse(tab_url)
        .ok()
        .filter(|url| matches!(url.scheme(), "http" | "https"))
        .and_then(|url| url.host_str().map(|host| SITE_HOSTS.contains(&host)))
        .unwrap_or(false)
}

#[cfg(test)]
pub(crate) use recording::RecordingNotifier;
