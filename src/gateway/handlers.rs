use super::forward::{forward_key_request, is_forwarded, relay};
use super::params::RequestParams;
use super::protocol::*;
use crate::causal::context::CausalContext;
use crate::error::KvsError;
use crate::membership::types::join_ids;
use crate::node::Node;

use axum::{
    Json,
    body::Bytes,
    extract::{Extension, Path},
    http::{HeaderMap, Method, StatusCode, Uri},
    response::{IntoResponse, Response},
};
use std::sync::Arc;

impl IntoResponse for KvsError {
    fn into_response(self) -> Response {
        error_response(self, None)
    }
}

/// Error body; key-value failures pass the merged context so the client keeps it.
fn error_response(err: KvsError, context: Option<&CausalContext>) -> Response {
    tracing::debug!("Request rejected: {:?}", err);
    let body = ErrorResponse {
        result: RESULT_ERROR.to_string(),
        msg: err.to_string(),
        payload: context.map(CausalContext::to_wire),
    };
    (err.status(), Json(body)).into_response()
}

/// Parses fields and the causal context, or produces the rejection to send back.
fn parse_request(
    headers: &HeaderMap,
    uri: &Uri,
    body: &Bytes,
) -> Result<(RequestParams, CausalContext), Response> {
    let params = RequestParams::parse(headers, uri, body).map_err(|e| error_response(e, None))?;
    let context = params.context().map_err(|e| error_response(e, None))?;
    Ok((params, context))
}

// ============================================================
// KEY-VALUE STORE
// ============================================================

pub async fn handle_put_key(
    Extension(node): Extension<Arc<Node>>,
    Path(key): Path<String>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if let Some(reply) = forward_key_request(&node, &key, &method, &uri, &headers, &body).await {
        return reply;
    }
    let (params, mut context) = match parse_request(&headers, &uri, &body) {
        Ok(parsed) => parsed,
        Err(rejection) => return rejection,
    };
    let Some(value) = params.val else {
        return error_response(KvsError::MissingField("val"), Some(&context));
    };

    match node.kv.put(&key, value, &mut context).await {
        Ok(replaced) => {
            let (status, msg) = if replaced {
                (StatusCode::OK, MSG_UPDATED)
            } else {
                (StatusCode::CREATED, MSG_ADDED)
            };
            let body = PutResponse {
                msg: msg.to_string(),
                replaced,
                payload: context.to_wire(),
            };
            (status, Json(body)).into_response()
        }
        Err(e) => error_response(e, Some(&context)),
    }
}

pub async fn handle_get_key(
    Extension(node): Extension<Arc<Node>>,
    Path(key): Path<String>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if let Some(reply) = forward_key_request(&node, &key, &method, &uri, &headers, &body).await {
        return reply;
    }
    let (_, mut context) = match parse_request(&headers, &uri, &body) {
        Ok(parsed) => parsed,
        Err(rejection) => return rejection,
    };

    match node.kv.get(&key, &mut context).await {
        Ok(read) => {
            let body = GetResponse {
                result: RESULT_SUCCESS.to_string(),
                value: read.value,
                owner: read.owner.to_string(),
                payload: context.to_wire(),
            };
            (StatusCode::OK, Json(body)).into_response()
        }
        Err(e) => error_response(e, Some(&context)),
    }
}

pub async fn handle_search_key(
    Extension(node): Extension<Arc<Node>>,
    Path(key): Path<String>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if let Some(reply) = forward_key_request(&node, &key, &method, &uri, &headers, &body).await {
        return reply;
    }
    let (_, mut context) = match parse_request(&headers, &uri, &body) {
        Ok(parsed) => parsed,
        Err(rejection) => return rejection,
    };

    match node.kv.exists(&key, &mut context).await {
        Ok(is_exists) => {
            let body = SearchResponse {
                result: RESULT_SUCCESS.to_string(),
                is_exists,
                payload: context.to_wire(),
            };
            (StatusCode::OK, Json(body)).into_response()
        }
        Err(e) => error_response(e, Some(&context)),
    }
}

pub async fn handle_delete_key(
    Extension(node): Extension<Arc<Node>>,
    Path(key): Path<String>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if let Some(reply) = forward_key_request(&node, &key, &method, &uri, &headers, &body).await {
        return reply;
    }
    let (_, mut context) = match parse_request(&headers, &uri, &body) {
        Ok(parsed) => parsed,
        Err(rejection) => return rejection,
    };

    match node.kv.delete(&key, &mut context).await {
        Ok(()) => {
            let body = DeleteResponse {
                result: RESULT_SUCCESS.to_string(),
                msg: MSG_DELETED.to_string(),
                payload: context.to_wire(),
            };
            (StatusCode::OK, Json(body)).into_response()
        }
        Err(e) => error_response(e, Some(&context)),
    }
}

// ============================================================
// VIEW
// ============================================================

pub async fn handle_get_view(Extension(node): Extension<Arc<Node>>) -> Json<ViewResponse> {
    Json(ViewResponse {
        view: node.membership.snapshot().view_string(),
    })
}

pub async fn handle_add_node(
    Extension(node): Extension<Arc<Node>>,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<MessageResponse>, KvsError> {
    let params = RequestParams::parse(&headers, &uri, &body)?;
    let addr = params.ip_port()?;

    node.membership.add_node(addr)?;
    Ok(Json(MessageResponse {
        result: RESULT_SUCCESS.to_string(),
        msg: format!("Successfully added {} to view", addr),
    }))
}

pub async fn handle_remove_node(
    Extension(node): Extension<Arc<Node>>,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<MessageResponse>, KvsError> {
    let params = RequestParams::parse(&headers, &uri, &body)?;
    let addr = params.ip_port()?;

    node.membership.remove_node(addr)?;
    Ok(Json(MessageResponse {
        result: RESULT_SUCCESS.to_string(),
        msg: format!("Successfully removed {} from view", addr),
    }))
}

// ============================================================
// SHARDS
// ============================================================

pub async fn handle_my_shard(
    Extension(node): Extension<Arc<Node>>,
) -> Result<Json<ShardIdResponse>, KvsError> {
    let id = node
        .membership
        .my_shard()
        .ok_or_else(|| KvsError::NotInView(node.membership.local_addr.clone()))?;
    Ok(Json(ShardIdResponse { id: id.to_string() }))
}

pub async fn handle_all_shards(Extension(node): Extension<Arc<Node>>) -> Json<ShardIdsResponse> {
    Json(ShardIdsResponse {
        result: RESULT_SUCCESS.to_string(),
        shard_ids: join_ids(&node.membership.layout().shard_ids()),
    })
}

pub async fn handle_shard_members(
    Extension(node): Extension<Arc<Node>>,
    Path(id): Path<String>,
) -> Result<Json<MembersResponse>, KvsError> {
    let layout = node.membership.layout();
    let members = layout
        .resolve(&id)
        .and_then(|shard| layout.members(shard))
        .ok_or(KvsError::UnknownShard(id))?;

    Ok(Json(MembersResponse {
        result: RESULT_SUCCESS.to_string(),
        members: members.join(","),
    }))
}

pub async fn handle_shard_count(
    Extension(node): Extension<Arc<Node>>,
    Path(id): Path<String>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let layout = node.membership.layout();
    let Some(shard) = layout.resolve(&id) else {
        return KvsError::UnknownShard(id).into_response();
    };

    // Only members of the shard hold its keys.
    if node.membership.my_shard() != Some(shard) && !is_forwarded(&headers) {
        let members = layout.members(shard).unwrap_or_default();
        return match relay(&node, members, &method, &uri, &headers, &body).await {
            Some(reply) => reply,
            None => KvsError::PeerUnreachable(format!("shard {}", shard)).into_response(),
        };
    }

    Json(CountResponse {
        result: RESULT_SUCCESS.to_string(),
        count: node.kv.count(shard),
    })
    .into_response()
}

pub async fn handle_change_shard_number(
    Extension(node): Extension<Arc<Node>>,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<ShardIdsResponse>, KvsError> {
    let params = RequestParams::parse(&headers, &uri, &body)?;
    let requested = params
        .num
        .as_deref()
        .and_then(|raw| raw.trim().parse::<i64>().ok())
        .ok_or(KvsError::InvalidShardCount)?;

    let config = node.membership.change_shard_count(requested)?;
    Ok(Json(ShardIdsResponse {
        result: RESULT_SUCCESS.to_string(),
        shard_ids: join_ids(&config.layout().shard_ids()),
    }))
}
