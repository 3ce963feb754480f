//! OneBot-compatible directory and transport client.
//!
//! Exposes the contact directory (friends, groups, group members) and the
//! outbound message capability behind traits so the pipeline can be exercised
//! without a live endpoint. The HTTP client speaks the OneBot v11 envelope.

pub mod batch;

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::cq;
use crate::error::{Result, SnapError};
use crate::types::{Contact, GroupInfo, GroupMember, GroupRole};

const SEND_PRIVATE_MSG: &str = "/send_private_msg";
const SEND_GROUP_MSG: &str = "/send_group_msg";
const GET_FRIEND_LIST: &str = "/get_friend_list";
const GET_GROUP_LIST: &str = "/get_group_list";
const GET_GROUP_MEMBER_LIST: &str = "/get_group_member_list";
const GET_LOGIN_INFO: &str = "/get_login_info";
const GET_STATUS: &str = "/get_status";

/// OneBot endpoint configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OneBotConfig {
    pub base_url: String,
    /// Bearer token; empty means no authentication.
    pub token: String,
    pub timeout_secs: u64,
}

impl Default for OneBotConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:3000".to_string(),
            token: String::new(),
            timeout_secs: 10,
        }
    }
}

/// Contact directory capability. Each listing may independently be empty;
/// the pipeline never invents contact data.
#[async_trait]
pub trait Directory: Send + Sync {
    async fn list_friends(&self) -> Result<Vec<Contact>>;
    async fn list_groups(&self) -> Result<Vec<GroupInfo>>;
    async fn list_group_members(&self, group_id: &str) -> Result<Vec<GroupMember>>;
}

/// Outbound message capability. No retries here; callers get one verdict per
/// send.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send_private(&self, user_id: &str, text: &str) -> Result<()>;
    async fn send_group(&self, group_id: &str, text: &str, at_users: &[String]) -> Result<()>;
}

/// Fetches every group's member list concurrently, completion order
/// unspecified. A failing group degrades to an empty list instead of
/// aborting the whole fetch.
pub async fn fetch_all_group_members(
    directory: &dyn Directory,
    groups: &[GroupInfo],
) -> HashMap<String, Vec<GroupMember>> {
    let fetches = groups.iter().map(|group| async move {
        match directory.list_group_members(&group.group_id).await {
            Ok(members) => (group.group_id.clone(), members),
            Err(e) => {
                warn!(group_id = %group.group_id, "member fetch failed, using empty list: {e}");
                (group.group_id.clone(), Vec::new())
            }
        }
    });
    join_all(fetches).await.into_iter().collect()
}

/// Default QQ avatar URL for friends whose payload omits one.
fn default_avatar(user_id: &str) -> String {
    format!("http://q1.qlogo.cn/g?b=qq&nk={user_id}&s=100")
}

/// Ids arrive as numbers from some endpoints and strings from others.
fn coerce_id(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        _ => String::new(),
    }
}

fn field_str(entry: &Value, key: &str) -> String {
    entry
        .get(key)
        .and_then(Value::as_str)
        .unwrap_or("")
        .to_string()
}

fn field_u32(entry: &Value, key: &str) -> u32 {
    entry.get(key).and_then(Value::as_u64).unwrap_or(0) as u32
}

/// HTTP client for a OneBot v11 endpoint (NapCat, go-cqhttp and friends).
pub struct OneBotClient {
    config: OneBotConfig,
    client: reqwest::Client,
}

impl OneBotClient {
    pub fn new(config: OneBotConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| SnapError::Transport(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { config, client })
    }

    /// Posts one API call and unwraps the OneBot envelope. Non-zero retcodes
    /// are errors; payloads without an envelope pass through as data.
    async fn call(&self, path: &str, payload: Value) -> Result<Value> {
        let url = format!("{}{}", self.config.base_url.trim_end_matches('/'), path);
        let mut request = self.client.post(&url).json(&payload);
        if !self.config.token.is_empty() {
            request = request.bearer_auth(&self.config.token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| SnapError::Transport(format!("{path} request failed: {e}")))?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| SnapError::Transport(format!("{path} response unreadable: {e}")))?;

        if !status.is_success() {
            return Err(SnapError::Transport(format!(
                "{path} returned HTTP {status}: {body}"
            )));
        }

        let value: Value = serde_json::from_str(&body)
            .map_err(|e| SnapError::Transport(format!("{path} returned invalid JSON: {e}")))?;
        unwrap_envelope(path, value)
    }

    pub async fn login_info(&self) -> Result<Value> {
        self.call(GET_LOGIN_INFO, json!({})).await
    }

    pub async fn status(&self) -> Result<Value> {
        self.call(GET_STATUS, json!({})).await
    }

    /// Whether the endpoint reports itself healthy.
    pub async fn check_connection(&self) -> bool {
        match self.status().await {
            Ok(data) => data.get("good").and_then(Value::as_bool).unwrap_or(false),
            Err(e) => {
                warn!("status probe failed: {e}");
                false
            }
        }
    }
}

/// Unwraps the `{status, retcode, data, message, wording}` envelope.
fn unwrap_envelope(path: &str, value: Value) -> Result<Value> {
    let Some(retcode) = value.get("retcode").and_then(Value::as_i64) else {
        // Not an envelope: hand the payload back untouched.
        return Ok(value);
    };

    if retcode != 0 {
        let message = value.get("message").and_then(Value::as_str).unwrap_or("");
        let wording = value.get("wording").and_then(Value::as_str).unwrap_or("");
        let detail = if !message.is_empty() {
            message
        } else if !wording.is_empty() {
            wording
        } else {
            "unknown error"
        };
        return Err(SnapError::Transport(format!(
            "{path} failed with retcode {retcode}: {detail}"
        )));
    }

    Ok(value.get("data").cloned().unwrap_or(Value::Null))
}

#[async_trait]
impl Directory for OneBotClient {
    async fn list_friends(&self) -> Result<Vec<Contact>> {
        let data = self.call(GET_FRIEND_LIST, json!({})).await?;
        let Some(entries) = data.as_array() else {
            return Ok(Vec::new());
        };

        Ok(entries
            .iter()
            .map(|entry| {
                let user_id = coerce_id(entry.get("user_id"));
                let avatar = {
                    let given = field_str(entry, "avatar");
                    if given.is_empty() {
                        default_avatar(&user_id)
                    } else {
                        given
                    }
                };
                Contact {
                    user_id,
                    nickname: field_str(entry, "nickname"),
                    remark: field_str(entry, "remark"),
                    avatar,
                }
            })
            .collect())
    }

    async fn list_groups(&self) -> Result<Vec<GroupInfo>> {
        let data = self.call(GET_GROUP_LIST, json!({})).await?;
        let Some(entries) = data.as_array() else {
            return Ok(Vec::new());
        };

        Ok(entries
            .iter()
            .map(|entry| GroupInfo {
                group_id: coerce_id(entry.get("group_id")),
                group_name: field_str(entry, "group_name"),
                member_count: field_u32(entry, "member_count"),
                max_member_count: field_u32(entry, "max_member_count"),
            })
            .collect())
    }

    async fn list_group_members(&self, group_id: &str) -> Result<Vec<GroupMember>> {
        let data = self
            .call(GET_GROUP_MEMBER_LIST, json!({ "group_id": group_id }))
            .await?;
        let Some(entries) = data.as_array() else {
            return Ok(Vec::new());
        };

        Ok(entries
            .iter()
            .map(|entry| GroupMember {
                user_id: coerce_id(entry.get("user_id")),
                nickname: field_str(entry, "nickname"),
                card: field_str(entry, "card"),
                role: GroupRole::parse(&field_str(entry, "role")),
            })
            .collect())
    }
}

#[async_trait]
impl Transport for OneBotClient {
    async fn send_private(&self, user_id: &str, text: &str) -> Result<()> {
        self.call(
            SEND_PRIVATE_MSG,
            json!({ "user_id": user_id, "message": text, "auto_escape": false }),
        )
        .await?;
        info!(user_id, "private message sent");
        Ok(())
    }

    async fn send_group(&self, group_id: &str, text: &str, at_users: &[String]) -> Result<()> {
        let message = cq::format_at_message(at_users, text);
        self.call(
            SEND_GROUP_MSG,
            json!({ "group_id": group_id, "message": message, "auto_escape": false }),
        )
        .await?;
        info!(group_id, "group message sent");
        Ok(())
    }
}
