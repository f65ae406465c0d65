use axum::{
    body::Body,
    extract::{Path, Query, Request, State, rejection::PathRejection},
    http::Method,
    response::{IntoResponse, Response},
};
use chrono::Utc;
use futures::future;
use http_body_util::{BodyExt, LengthLimitError, Limited};
use serde::Deserialize;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tower_cookies::Cookies;

use crate::{
    context::{CreateContextOptions, RequestHandle, ResponseHandle, RpcContext},
    middleware_layer::session::ResolvedSession,
    rpc::{
        envelope::{BatchEnvelope, Envelope},
        error::RpcError,
    },
    state::RpcState,
};

/// The query string of an RPC call.
#[derive(Deserialize, Debug, Default)]
pub struct RpcQuery {
    /// URL-encoded JSON input.
    pub input: Option<String>,
    /// `1` or `true` for a batched call.
    pub batch: Option<String>,
}

impl RpcQuery {
    fn is_batch(&self) -> bool {
        matches!(self.batch.as_deref(), Some("1") | Some("true"))
    }
}

/// The raw, still URL-encoded values of a query string. A pair without `=`
/// yields itself.
fn raw_query_values(query: Option<&str>) -> impl Iterator<Item = &str> {
    query
        .into_iter()
        .flat_map(|query| query.split('&'))
        .map(|pair| pair.split_once('=').map_or(pair, |(_, value)| value))
}

/// Enforces the parameter limit on the still URL-encoded procedure path and
/// query values.
///
/// Keys are decoded before the query is matched, so an encoded key such as
/// `inp%75t` still reaches the procedure; every raw value is bounded.
fn check_param_lengths(request: &Request, max: usize) -> Result<(), RpcError> {
    let uri = request.uri();
    let procedure = uri.path().rsplit('/').next().unwrap_or_default();
    if procedure.len() > max {
        return Err(RpcError::payload_too_large(format!(
            "Procedure path exceeds {} characters",
            max
        )));
    }

    if raw_query_values(uri.query()).any(|value| value.len() > max) {
        return Err(RpcError::payload_too_large(format!(
            "Query parameter exceeds {} characters",
            max
        )));
    }

    Ok(())
}

/// Reads a POST body, failing with `PAYLOAD_TOO_LARGE` above `limit` bytes.
async fn read_body(body: Body, limit: usize) -> Result<Option<String>, RpcError> {
    let bytes = match Limited::new(body, limit).collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) if e.is::<LengthLimitError>() => {
            return Err(RpcError::payload_too_large(format!(
                "Request body exceeds {} bytes",
                limit
            )));
        }
        Err(e) => {
            tracing::warn!("Failed to read request body: {}", e);
            return Err(RpcError::bad_input("Failed to read request body"));
        }
    };

    if bytes.is_empty() {
        return Ok(None);
    }

    String::from_utf8(bytes.to_vec())
        .map(Some)
        .map_err(|_| RpcError::bad_input("Request body is not valid UTF-8"))
}

fn parse_input(raw: Option<String>) -> Result<Value, RpcError> {
    match raw {
        None => Ok(Value::Null),
        Some(text) => serde_json::from_str(&text)
            .map_err(|e| RpcError::bad_input(format!("Input is not valid JSON: {}", e))),
    }
}

/// Splits a batched input `{"0": …, "1": …}` into one input per call.
fn split_batch_input(input: Value, calls: usize) -> Result<Vec<Value>, RpcError> {
    match input {
        Value::Null => Ok(vec![Value::Null; calls]),
        Value::Object(mut inputs) => Ok((0..calls)
            .map(|i| inputs.remove(&i.to_string()).unwrap_or(Value::Null))
            .collect()),
        _ => Err(RpcError::bad_input("Batch input must be an object keyed by call index")),
    }
}

/// The RPC endpoint: `GET|POST <prefix>/<procedure>[,<procedure>…]`.
///
/// The session was resolved upstream; the context is built once here and
/// cloned into every call. Calls run in their own tasks so a panicking
/// handler only fails its own envelope. If the client disconnects, this
/// future is dropped and the request's cancellation token fires.
pub async fn dispatch<C: RpcContext>(
    State(state): State<RpcState<C>>,
    path: Result<Path<String>, PathRejection>,
    cookies: Cookies,
    request: Request,
) -> Response {
    if let Err(err) = check_param_lengths(&request, state.limits.max_param_length) {
        tracing::warn!("❌ RPC: {}", err.message);
        return Envelope::from(err).into_response();
    }

    let path = match path {
        Ok(Path(path)) => path,
        Err(rejection) => {
            return Envelope::from(RpcError::bad_input(rejection.body_text())).into_response();
        }
    };

    let query = match Query::<RpcQuery>::try_from_uri(request.uri()) {
        Ok(Query(query)) => query,
        Err(rejection) => {
            return Envelope::from(RpcError::bad_input(rejection.body_text())).into_response();
        }
    };

    let batch = query.is_batch();
    let names: Vec<String> = if batch {
        path.split(',').map(str::to_string).collect()
    } else {
        vec![path]
    };

    let (mut parts, body) = request.into_parts();
    let method = parts.method.clone();

    let raw_input = if method == Method::POST {
        match read_body(body, state.limits.max_body_bytes).await {
            Ok(Some(text)) => Some(text),
            Ok(None) => query.input,
            Err(err) => return Envelope::from(err).into_response(),
        }
    } else {
        query.input
    };

    let inputs = match parse_input(raw_input).and_then(|input| {
        if batch {
            split_batch_input(input, names.len())
        } else {
            Ok(vec![input])
        }
    }) {
        Ok(inputs) => inputs,
        Err(err) => return Envelope::from(err).into_response(),
    };

    let session = parts
        .extensions
        .remove::<ResolvedSession>()
        .and_then(|resolved| resolved.0)
        .filter(|session| session.is_active_at(Utc::now()));

    let cancel = CancellationToken::new();
    let guard = cancel.clone().drop_guard();
    let res = ResponseHandle::new(cookies);

    let ctx = (state.factory)(CreateContextOptions {
        req: RequestHandle::new(parts),
        res: res.clone(),
        session,
        cancel,
    });

    let calls = names
        .iter()
        .zip(inputs)
        .map(|(name, input)| tokio::spawn(state.router.call(ctx.clone(), name, &method, input)));

    let envelopes: Vec<Envelope> = future::join_all(calls)
        .await
        .into_iter()
        .zip(&names)
        .map(|(joined, name)| {
            let outcome = joined.unwrap_or_else(|e| {
                tracing::error!("Procedure {} panicked: {}", name, e);
                Err(RpcError::internal())
            });
            if let Err(err) = &outcome {
                tracing::debug!("Procedure {} failed: {}", name, err);
            }
            Envelope::from(outcome)
        })
        .collect();

    guard.disarm();

    let mut response = if batch {
        BatchEnvelope(envelopes).into_response()
    } else {
        envelopes
            .into_iter()
            .next()
            .map(IntoResponse::into_response)
            .unwrap_or_else(|| Envelope::from(RpcError::internal()).into_response())
    };

    res.drain_into(response.headers_mut());
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn raw_values_are_not_decoded() {
        let values: Vec<_> = raw_query_values(Some("batch=1&input=%7B%7D&x")).collect();
        assert_eq!(values, vec!["1", "%7B%7D", "x"]);
        assert_eq!(raw_query_values(None).count(), 0);
    }

    fn request(uri: &str) -> Request {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    #[test]
    fn encoded_keys_do_not_escape_the_limit() {
        let long = "a".repeat(11);
        assert!(check_param_lengths(&request(&format!("/trpc/echo?input={}", long)), 10).is_err());
        assert!(check_param_lengths(&request(&format!("/trpc/echo?inp%75t={}", long)), 10).is_err());
        assert!(check_param_lengths(&request(&format!("/trpc/echo?{}", long)), 10).is_err());
        assert!(check_param_lengths(&request(&format!("/trpc/{}", long)), 10).is_err());

        let exact = "a".repeat(10);
        assert!(check_param_lengths(&request(&format!("/trpc/{}?inp%75t={}", exact, exact)), 10).is_ok());
    }

    #[test]
    fn batch_inputs_follow_call_indices() {
        let inputs = split_batch_input(json!({"1": "b", "0": "a"}), 3).unwrap();
        assert_eq!(inputs, vec![json!("a"), json!("b"), Value::Null]);

        assert_eq!(split_batch_input(Value::Null, 2).unwrap().len(), 2);
        assert!(split_batch_input(json!([1, 2]), 2).is_err());
    }

    #[test]
    fn invalid_json_is_bad_input() {
        assert_eq!(parse_input(None).unwrap(), Value::Null);
        assert_eq!(parse_input(Some("\"hi\"".to_string())).unwrap(), json!("hi"));
        assert!(parse_input(Some("{".to_string())).is_err());
    }
}
