/// Browser glue: chrome.* APIs behind the core traits, and the entry points
/// the service worker calls.

use crate::checker::PageFetcher;
use crate::error::{self, Error};
use crate::notifier::{Event, Notifier, is_site_tab};
use crate::router;
use crate::scheduler::AlarmScheduler;
use crate::service::Service;
use crate::storage::Store;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::rc::Rc;
use wasm_bindgen::prelude::*;

// Import JS bridge functions
#[wasm_bindgen(module = "/background.js")]
extern "C" {
    #[wasm_bindgen(catch)]
    async fn getStorage(key: &str) -> Result<JsValue, JsValue>;

    #[wasm_bindgen(catch)]
    async fn setStorage(key: &str, value: JsValue) -> Result<(), JsValue>;

    #[wasm_bindgen(catch)]
    async fn fetchText(url: &str) -> Result<JsValue, JsValue>;

    #[wasm_bindgen(catch)]
    async fn queryTabs() -> Result<JsValue, JsValue>;

    #[wasm_bindgen(catch)]
    async fn sendTabMessage(tab_id: i32, message: JsValue) -> Result<(), JsValue>;

    #[wasm_bindgen(catch)]
    async fn setBadgeText(text: &str) -> Result<(), JsValue>;

    #[wasm_bindgen(catch)]
    async fn clearAlarm(name: &str) -> Result<(), JsValue>;

    #[wasm_bindgen(catch)]
    async fn createAlarm(name: &str, period_minutes: f64) -> Result<(), JsValue>;
}

/// chrome.storage.local
pub struct ChromeStore;

/// fetch() against the board
pub struct ChromeFetcher;

/// chrome.tabs + chrome.action badge
pub struct ChromeNotifier;

/// chrome.alarms
pub struct ChromeAlarms;

#[derive(Debug, Deserialize)]
struct OpenTab {
    id: i32,
    #[serde(default)]
    url: Option<String>,
}

type BrowserService = Service<ChromeStore, ChromeFetcher, ChromeNotifier, ChromeAlarms>;

thread_local! {
    static SERVICE: Rc<BrowserService> = Rc::new(Service::new(
        ChromeStore,
        ChromeFetcher,
        ChromeNotifier,
        ChromeAlarms,
        js_sys::Date::now,
    ));
}

fn service() -> Rc<BrowserService> {
    SERVICE.with(Rc::clone)
}

fn describe(err: JsValue) -> String {
    err.as_string().unwrap_or_else(|| format!("{:?}", err))
}

fn to_js<T: Serialize>(value: &T) -> Result<JsValue, serde_wasm_bindgen::Error> {
    // Plain objects rather than JS Maps, so chrome.storage can hold them.
    value.serialize(&serde_wasm_bindgen::Serializer::json_compatible())
}

fn js_error(err: Error) -> JsValue {
    JsValue::from_str(&err.to_string())
}

impl Store for ChromeStore {
    async fn get(&self, key: &str) -> error::Result<Option<Value>> {
        let value = getStorage(key).await.map_err(|e| Error::Storage(describe(e)))?;
        if value.is_null() || value.is_undefined() {
            return Ok(None);
        }
        serde_wasm_bindgen::from_value(value)
            .map(Some)
            .map_err(|e| Error::Storage(format!("failed to read `{}`: {}", key, e)))
    }

    async fn set(&self, key: &str, value: Value) -> error::Result<()> {
        let value = to_js(&value).map_err(|e| Error::Storage(format!("failed to write `{}`: {}", key, e)))?;
        setStorage(key, value).await.map_err(|e| Error::Storage(describe(e)))
    }
}

impl PageFetcher for ChromeFetcher {
    async fn fetch_page(&self, url: &str) -> error::Result<String> {
        let body = fetchText(url).await.map_err(|e| Error::Fetch {
            url: url.to_string(),
            reason: describe(e),
        })?;
        body.as_string().ok_or_else(|| Error::Fetch {
            url: url.to_string(),
            reason: "response body is not text".to_string(),
        })
    }
}

impl Notifier for ChromeNotifier {
    async fn broadcast(&self, event: &Event) {
        let message = match to_js(event) {
            Ok(message) => message,
            Err(e) => {
                log::error!("Could not encode {:?}: {}", event, e);
                return;
            }
        };

        let tabs: Vec<OpenTab> = match queryTabs().await {
            Ok(tabs) => serde_wasm_bindgen::from_value(tabs).unwrap_or_else(|e| {
                log::warn!("Unreadable tab list: {}", e);
                Vec::new()
            }),
            Err(e) => {
                log::warn!("Could not list tabs: {}", describe(e));
                return;
            }
        };

        for tab in tabs {
            if !tab.url.as_deref().is_some_and(is_site_tab) {
                continue;
            }
            if let Err(e) = sendTabMessage(tab.id, message.clone()).await {
                log::debug!("Tab {} missed {:?}: {}", tab.id, event, describe(e));
            }
        }
    }

    async fn set_badge(&self, text: &str) {
        if let Err(e) = setBadgeText(text).await {
            log::warn!("Could not set badge: {}", describe(e));
        }
    }
}

impl AlarmScheduler for ChromeAlarms {
    async fn clear(&self, name: &str) -> error::Result<()> {
        clearAlarm(name).await.map_err(|e| Error::Alarm(describe(e)))
    }

    async fn create(&self, name: &str, period_minutes: u64) -> error::Result<()> {
        createAlarm(name, period_minutes as f64)
            .await
            .map_err(|e| Error::Alarm(describe(e)))
    }
}

/// runtime.onMessage: resolves to the response, or `undefined` for messages
/// meant for someone else
#[wasm_bindgen]
pub async fn handle_message(message: JsValue) -> Result<JsValue, JsValue> {
    let message: Value = match serde_wasm_bindgen::from_value(message) {
        Ok(message) => message,
        Err(e) => {
            log::warn!("Ignoring undecodable message: {}", e);
            return Ok(JsValue::UNDEFINED);
        }
    };

    let service = service();
    match router::handle(&*service, message).await {
        Some(response) => to_js(&response).map_err(|e| JsValue::from_str(&e.to_string())),
        None => Ok(JsValue::UNDEFINED),
    }
}

/// runtime.onInstalled
#[wasm_bindgen]
pub async fn on_installed() -> Result<(), JsValue> {
    service().install().await.map_err(js_error)
}

/// runtime.onStartup
#[wasm_bindgen]
pub async fn on_startup() -> Result<(), JsValue> {
    service().startup().await.map_err(js_error)
}

/// alarms.onAlarm
#[wasm_bindgen]
pub async fn on_alarm(name: String) -> Result<(), JsValue> {
    let service = service();
    service.on_alarm(&name).await.map_err(|e| {
        log::error!("Alarm {} failed: {}", name, e);
        js_error(e)
    })
}
