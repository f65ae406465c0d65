use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use serde_json::Value;

use crate::rpc::error::{RpcError, RpcErrorCode};

#[derive(Debug, Serialize)]
pub struct ResultBody {
    pub data: Value,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: RpcErrorCode,
    pub message: String,
}

/// The JSON shape of one procedure call's outcome:
/// `{"result":{"data":…}}` or `{"error":{"code":…,"message":…}}`.
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum Envelope {
    Success { result: ResultBody },
    Failure { error: ErrorBody },
}

impl Envelope {
    pub fn status(&self) -> StatusCode {
        match self {
            Envelope::Success { .. } => StatusCode::OK,
            Envelope::Failure { error } => error.code.status(),
        }
    }
}

impl From<Result<Value, RpcError>> for Envelope {
    fn from(outcome: Result<Value, RpcError>) -> Self {
        match outcome {
            Ok(data) => Envelope::Success {
                result: ResultBody { data },
            },
            Err(err) => Envelope::Failure {
                error: ErrorBody {
                    code: err.code,
                    message: err.message,
                },
            },
        }
    }
}

impl From<RpcError> for Envelope {
    fn from(err: RpcError) -> Self {
        Envelope::from(Err(err))
    }
}

impl IntoResponse for Envelope {
    fn into_response(self) -> Response {
        (self.status(), Json(self)).into_response()
    }
}

/// The response to a batched call: one envelope per call, in call order.
///
/// The HTTP status is the one all calls agree on, or `207 Multi-Status`.
pub struct BatchEnvelope(pub Vec<Envelope>);

impl IntoResponse for BatchEnvelope {
    fn into_response(self) -> Response {
        let mut statuses = self.0.iter().map(Envelope::status);
        let status = match statuses.next() {
            Some(first) if statuses.all(|s| s == first) => first,
            Some(_) => StatusCode::MULTI_STATUS,
            None => StatusCode::OK,
        };

        (status, Json(self.0)).into_response()
    }
}
