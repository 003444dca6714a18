//! Relaying client requests to the shard that owns them.

use crate::node::Node;
use crate::replication::client::PeerReply;
use crate::replication::protocol::FORWARDED_HEADER;
use crate::storage::service::Route;

use axum::body::{Body, Bytes};
use axum::http::{HeaderMap, Method, StatusCode, Uri, header};
use axum::response::{IntoResponse, Response};
use tracing::{debug, warn};

pub fn is_forwarded(headers: &HeaderMap) -> bool {
    headers.contains_key(FORWARDED_HEADER)
}

/// Relays a key request when the key's shard does not include this node.
///
/// Returns `None` when the request should be served locally: the node owns the
/// key, the request was already forwarded once, or no owner could be reached.
pub async fn forward_key_request(
    node: &Node,
    key: &str,
    method: &Method,
    uri: &Uri,
    headers: &HeaderMap,
    body: &Bytes,
) -> Option<Response> {
    if is_forwarded(headers) {
        return None;
    }
    match node.kv.route(key) {
        Route::Local => None,
        Route::Remote { shard, members } => {
            debug!("Forwarding {} {} to shard {}", method, key, shard);
            let reply = relay(node, &members, method, uri, headers, body).await;
            if reply.is_none() {
                warn!("No owner of {} reachable, serving it locally", key);
            }
            reply
        }
    }
}

/// Tries `members` in order and hands back the first answer received.
pub async fn relay(
    node: &Node,
    members: &[String],
    method: &Method,
    uri: &Uri,
    headers: &HeaderMap,
    body: &Bytes,
) -> Option<Response> {
    let path_and_query = uri
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or_else(|| uri.path());

    for member in members {
        match node
            .client
            .forward(member, method.clone(), path_and_query, headers, body.clone())
            .await
        {
            Ok(reply) => return Some(into_response(reply)),
            Err(e) => warn!("Failed to forward to {}: {}", member, e),
        }
    }

    warn!("No member of {:?} reachable for {}", members, path_and_query);
    None
}

fn into_response(reply: PeerReply) -> Response {
    let status = StatusCode::from_u16(reply.status).unwrap_or(StatusCode::BAD_GATEWAY);
    let mut response = (status, Body::from(reply.body)).into_response();
    if let Some(content_type) = reply.content_type {
        response
            .headers_mut()
            .insert(header::CONTENT_TYPE, content_type);
    }
    response
}
