//! Client-facing response bodies.

use serde::{Deserialize, Serialize};

pub const RESULT_SUCCESS: &str = "Success";
pub const RESULT_ERROR: &str = "Error";

pub const MSG_ADDED: &str = "Added successfully";
pub const MSG_UPDATED: &str = "Updated successfully";
pub const MSG_DELETED: &str = "Key deleted";

#[derive(Debug, Serialize, Deserialize)]
pub struct PutResponse {
    pub msg: String,
    pub replaced: bool,
    pub payload: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct GetResponse {
    pub result: String,
    pub value: String,
    pub owner: String,
    pub payload: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SearchResponse {
    pub result: String,
    #[serde(rename = "isExists")]
    pub is_exists: bool,
    pub payload: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DeleteResponse {
    pub result: String,
    pub msg: String,
    pub payload: String,
}

/// Body of every failed request. Key-value errors also carry the merged payload.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub result: String,
    pub msg: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub payload: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MessageResponse {
    pub result: String,
    pub msg: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ViewResponse {
    pub view: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ShardIdResponse {
    pub id: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ShardIdsResponse {
    pub result: String,
    pub shard_ids: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MembersResponse {
    pub result: String,
    pub members: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CountResponse {
    pub result: String,
    #[serde(rename = "Count")]
    pub count: usize,
}
