/// Komica Saver - background core for the Komica thread saver extension
/// Built with Rust + WASM

pub mod bridge;
pub mod checker;
pub mod error;
pub mod lists;
pub mod notifier;
pub mod page;
pub mod post_data;
pub mod router;
pub mod scheduler;
pub mod service;
pub mod storage;

use wasm_bindgen::prelude::*;

// Set up panic hook for better error messages in the browser console
#[wasm_bindgen(start)]
pub fn main() {
    console_error_panic_hook::set_once();
    wasm_logger::init(wasm_logger::Config::default());
}

// Helpers the content script and popup share with the background core

/// `thread_no` may be a number or a string of digits
#[wasm_bindgen]
pub fn thread_url_for(page_url: &str, thread_no: JsValue) -> Result<String, JsValue> {
    let thread_no: serde_json::Value =
        serde_wasm_bindgen::from_value(thread_no).map_err(|e| JsValue::from_str(&e.to_string()))?;
    post_data::parse_post_no(thread_no)
        .and_then(|no| page::thread_url(page_url, no))
        .map_err(|e| JsValue::from_str(&e.to_string()))
}

#[wasm_bindgen]
pub fn badge_text(count: u32) -> String {
    notifier::badge_text(count)
}
