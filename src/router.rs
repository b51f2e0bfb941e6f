/// Message routing between content pages / popup and the background service

use crate::checker::PageFetcher;
use crate::error::{Error, Result};
use crate::notifier::Notifier;
use crate::post_data::{TrackedPost, de_id, de_number};
use crate::scheduler::AlarmScheduler;
use crate::service::Service;
use crate::storage::Store;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Inbound request, tagged by `action`
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "action")]
pub enum Request {
    #[serde(rename = "toggleSavePost")]
    ToggleSavePost { data: TrackedPost },
    #[serde(rename = "getAllPosts")]
    GetAllPosts,
    #[serde(rename = "deletePost")]
    DeletePost { id: String },
    #[serde(rename = "isPostSaved", rename_all = "camelCase")]
    IsPostSaved {
        #[serde(deserialize_with = "de_number")]
        post_no: u64,
    },
    #[serde(rename = "trimRecords")]
    TrimRecords,
    #[serde(rename = "updateAlarm")]
    UpdateAlarm,
    #[serde(rename = "runCleanup")]
    RunCleanup,
    #[serde(rename = "checkNow")]
    CheckNow,
    #[serde(rename = "clearUpdateFlag", rename_all = "camelCase")]
    ClearUpdateFlag { post_id: String },
    #[serde(rename = "hideThread", rename_all = "camelCase")]
    HideThread {
        #[serde(deserialize_with = "de_id")]
        thread_no: String,
    },
    #[serde(rename = "unhideThread", rename_all = "camelCase")]
    UnhideThread {
        #[serde(deserialize_with = "de_id")]
        thread_no: String,
    },
    #[serde(rename = "getHiddenThreads")]
    GetHiddenThreads,
    #[serde(rename = "addNgId", rename_all = "camelCase")]
    AddNgId {
        #[serde(default)]
        ng_id: String,
    },
    #[serde(rename = "removeNgId", rename_all = "camelCase")]
    RemoveNgId {
        #[serde(deserialize_with = "de_id")]
        ng_id: String,
    },
    #[serde(rename = "getNgIds")]
    GetNgIds,
}

impl Request {
    pub const ACTIONS: &'static [&'static str] = &[
        "toggleSavePost",
        "getAllPosts",
        "deletePost",
        "isPostSaved",
        "trimRecords",
        "updateAlarm",
        "runCleanup",
        "checkNow",
        "clearUpdateFlag",
        "hideThread",
        "unhideThread",
        "getHiddenThreads",
        "addNgId",
        "removeNgId",
        "getNgIds",
    ];

    /// Decode a raw message. `Ok(None)` for messages this router does not handle.
    pub fn parse(message: Value) -> Result<Option<Request>> {
        let known = message
            .get("action")
            .and_then(Value::as_str)
            .is_some_and(|action| Request::ACTIONS.contains(&action));
        if !known {
            return Ok(None);
        }
        serde_json::from_value(message)
            .map(Some)
            .map_err(|e| Error::Message(e.to_string()))
    }
}

/// Reply sent back to the requester
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Response {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_saved: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Response {
    pub fn ok() -> Response {
        Response {
            success: true,
            data: None,
            is_saved: None,
            error: None,
        }
    }

    pub fn with_data(data: Value) -> Response {
        Response {
            data: Some(data),
            ..Response::ok()
        }
    }

    pub fn failure(error: &Error) -> Response {
        Response {
            success: false,
            data: None,
            is_saved: None,
            error: Some(error.to_string()),
        }
    }
}

/// Handle a raw message. `None` means the message was not for us.
pub async fn handle<S, F, N, A>(service: &Service<S, F, N, A>, message: Value) -> Option<Response>
where
    S: Store,
    F: PageFetcher,
    N: Notifier,
    A: AlarmScheduler,
{
    match Request::parse(message) {
        Ok(Some(request)) => Some(dispatch(service, request).await),
        Ok(None) => None,
        Err(e) => {
            log::error!("Rejected message: {}", e);
            Some(Response::failure(&e))
        }
    }
}

/// Run a request; failures become `{success: false, error}`
pub async fn dispatch<S, F, N, A>(service: &Service<S, F, N, A>, request: Request) -> Response
where
    S: Store,
    F: PageFetcher,
    N: Notifier,
    A: AlarmScheduler,
{
    match run(service, request).await {
        Ok(response) => response,
        Err(e) => {
            log::error!("Request failed: {}", e);
            Response::failure(&e)
        }
    }
}

async fn run<S, F, N, A>(service: &Service<S, F, N, A>, request: Request) -> Result<Response>
where
    S: Store,
    F: PageFetcher,
    N: Notifier,
    A: AlarmScheduler,
{
    let response = match request {
        Request::ToggleSavePost { data } => {
            let is_saved = service.toggle_saved(data).await?;
            Response {
                is_saved: Some(is_saved),
                ..Response::ok()
            }
        }
        Request::GetAllPosts => Response::with_data(to_json(&service.all_posts().await?)?),
        Request::DeletePost { id } => {
            service.delete_post(&id).await?;
            Response::ok()
        }
        Request::IsPostSaved { post_no } => Response {
            is_saved: Some(service.is_post_saved(post_no).await?),
            ..Response::ok()
        },
        Request::TrimRecords => {
            service.trim_records().await?;
            Response::ok()
        }
        Request::UpdateAlarm => {
            service.update_alarm().await?;
            Response::ok()
        }
        Request::RunCleanup => {
            service.expire_old_entries().await?;
            Response::ok()
        }
        Request::CheckNow => Response::with_data(Value::from(service.check_updates().await?)),
        Request::ClearUpdateFlag { post_id } => {
            service.clear_update_flag(&post_id).await?;
            Response::ok()
        }
        Request::HideThread { thread_no } => {
            service.hide_thread(&thread_no).await?;
            Response::ok()
        }
        Request::UnhideThread { thread_no } => {
            service.unhide_thread(&thread_no).await?;
            Response::ok()
        }
        Request::GetHiddenThreads => Response::with_data(to_json(&service.hidden_threads().await?)?),
        Request::AddNgId { ng_id } => {
            service.add_blocked_id(&ng_id).await?;
            Response::ok()
        }
        Request::RemoveNgId { ng_id } => {
            service.remove_blocked_id(&ng_id).await?;
            Response::ok()
        }
        Request::GetNgIds => Response::with_data(to_json(&service.blocked_ids().await?)?),
    };
    Ok(response)
}

fn to_json<T: Serialize>(value: &T) -> Result<Value> {
    serde_json::to_value(value).map_err(|source| Error::Encode {
        key: "response".to_string(),
        source,
    })
}
