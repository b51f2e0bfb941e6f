/// Thread page scanning and post capture helpers

use crate::error::{Error, Result};
use crate::post_data::{TrackedPost, post_id};
use regex::Regex;
use std::collections::BTreeSet;
use std::sync::LazyLock;
use url::Url;

pub const PREVIEW_MAX_CHARS: usize = 150;
const UNTITLED: &str = "無題";
const EMPTY_PREVIEW: &str = "沒有內文";

static OPEN_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<[A-Za-z][A-Za-z0-9]*\s([^>]*)>").expect("valid tag pattern"));
static CLASS_ATTR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?:^|\s)class\s*=\s*(?:"([^"]*)"|'([^']*)')"#).expect("valid class pattern")
});
static DATA_NO_ATTR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?:^|\s)data-no\s*=\s*["']?(\d+)"#).expect("valid data-no pattern")
});
static QUOTE_LINK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r">>\d+").expect("valid quote pattern"));

/// Post numbers found on a fetched thread page
#[derive(Debug, Clone, PartialEq)]
pub struct PageScan {
    pub root_no: u64,
    pub reply_nos: BTreeSet<u64>,
}

impl PageScan {
    /// Highest post number on the page; the root when there are no replies
    pub fn last_no(&self) -> u64 {
        self.reply_nos.last().copied().unwrap_or(self.root_no)
    }
}

/// Scan a thread page for its root post and replies.
///
/// Posts are elements carrying a `data-no` attribute and a class list with
/// `post` plus either `threadpost` (the root) or `reply`. Returns `None`
/// when no root post is present.
pub fn scan_thread_page(html: &str) -> Option<PageScan> {
    let mut root_no = None;
    let mut reply_nos = BTreeSet::new();

    for tag in OPEN_TAG.captures_iter(html) {
        let attrs = &tag[1];
        let Some(number) = DATA_NO_ATTR
            .captures(attrs)
            .and_then(|c| c[1].parse::<u64>().ok())
        else {
            continue;
        };
        let Some(classes) = CLASS_ATTR
            .captures(attrs)
            .and_then(|c| c.get(1).or_else(|| c.get(2)))
        else {
            continue;
        };

        let mut is_post = false;
        let mut is_reply = false;
        let mut is_root = false;
        for class in classes.as_str().split_whitespace() {
            match class {
                "post" => is_post = true,
                "reply" => is_reply = true,
                "threadpost" => is_root = true,
                _ => {}
            }
        }

        if !is_post {
            continue;
        }
        if is_reply {
            reply_nos.insert(number);
        } else if is_root && root_no.is_none() {
            root_no = Some(number);
        }
    }

    root_no.map(|root_no| PageScan { root_no, reply_nos })
}

/// Dedicated thread URL for `thread_no` on the board of `page_url`.
///
/// The board is the first path segment: a post seen on
/// `https://host/00b/pixmicat.php?page_num=2` lives in
/// `https://host/00b/pixmicat.php?res=<thread_no>`.
pub fn thread_url(page_url: &str, thread_no: u64) -> Result<String> {
    let page = Url::parse(page_url).map_err(|e| Error::InvalidInput(format!("bad page URL {}: {}", page_url, e)))?;
    let board = page
        .path_segments()
        .and_then(|mut segments| segments.next())
        .filter(|segment| !segment.is_empty() && !segment.contains('.'));

    let path = match board {
        Some(board) => format!("/{}/pixmicat.php", board),
        None => "/pixmicat.php".to_string(),
    };

    let mut url = page;
    url.set_path(&path);
    url.set_query(Some(&format!("res={}", thread_no)));
    url.set_fragment(None);
    Ok(url.to_string())
}

/// Where opening a saved post should land: the first unseen reply if any
pub fn reply_link(post: &TrackedPost) -> String {
    let base = post.thread_url.split('#').next().unwrap_or_default();
    let anchor = match (post.has_update, post.first_new_reply_no) {
        (true, Some(first_new)) => first_new,
        _ => post.post_no,
    };
    format!("{}#r{}", base, anchor)
}

/// Display title for a post; blank and placeholder titles fall back to its number
pub fn display_title(title: &str, post_no: u64) -> String {
    let title = title.trim();
    if title.is_empty() || title == UNTITLED {
        format!("No.{}", post_no)
    } else {
        title.to_string()
    }
}

/// Preview snippet without quote links, bounded to `PREVIEW_MAX_CHARS`
pub fn preview_snippet(text: &str) -> String {
    let bounded: String = text.trim().chars().take(PREVIEW_MAX_CHARS).collect();
    let cleaned = QUOTE_LINK.replace_all(&bounded, "");
    let cleaned = cleaned.trim();
    if cleaned.is_empty() {
        EMPTY_PREVIEW.to_string()
    } else {
        cleaned.to_string()
    }
}

/// Bring a post sent by a content page into its stored shape
pub fn normalize_post(mut post: TrackedPost) -> TrackedPost {
    post.id = post_id(post.post_no);
    post.title = display_title(&post.title, post.post_no);
    post.preview_text = preview_snippet(&post.preview_text);
    if post.last_checked_reply_no.is_none() {
        post.last_checked_reply_no = post.initial_reply_no;
    }
    if let (Some(initial), Some(last)) = (post.initial_reply_no, post.last_checked_reply_no) {
        post.last_checked_reply_no = Some(last.max(initial));
    }
    post
}
