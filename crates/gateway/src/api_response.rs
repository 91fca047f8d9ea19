//! Response envelope shared by every admin route.
//!
//! Success: `{ "success": true, "data"?: .., "message"?: .. }`.
//! Failure: `{ "success": false, "message": .., "error"?: .., "details"?: .. }`.

use {
    axum::{
        Json,
        body::Bytes,
        http::StatusCode,
        response::{IntoResponse, Response},
    },
    serde::{Serialize, de::DeserializeOwned},
    serde_json::{Value, json},
};

pub type ApiResult = Result<Response, ApiError>;

#[derive(Debug, Serialize)]
pub struct ApiSuccess<T> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
}

impl<T: Serialize> ApiSuccess<T> {
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

impl<T: Serialize> IntoResponse for ApiSuccess<T> {
    fn into_response(self) -> Response {
        Json(self).into_response()
    }
}

/// `{ "success": true, "data": data }`.
pub fn success<T: Serialize>(data: T) -> ApiSuccess<T> {
    ApiSuccess {
        success: true,
        data: Some(data),
        message: None,
    }
}

#[derive(Debug, Clone)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
    pub error: Option<String>,
    pub details: Option<Value>,
}

impl ApiError {
    #[must_use]
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            error: None,
            details: None,
        }
    }

    #[must_use]
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    #[must_use]
    pub fn unauthorized() -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "not authenticated")
    }

    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }

    #[must_use]
    pub fn with_error(mut self, error: impl ToString) -> Self {
        self.error = Some(error.to_string());
        self
    }

    #[must_use]
    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut body = json!({ "success": false, "message": self.message });
        if let Some(error) = self.error {
            body["error"] = Value::String(error);
        }
        if let Some(details) = self.details {
            body["details"] = details;
        }
        (self.status, Json(body)).into_response()
    }
}

impl From<ferrygram_plugins::Error> for ApiError {
    fn from(err: ferrygram_plugins::Error) -> Self {
        use ferrygram_plugins::Error;

        let status = match &err {
            Error::NotFound { .. } => StatusCode::NOT_FOUND,
            Error::Conflict { .. } => StatusCode::CONFLICT,
            Error::InvalidInput { .. } | Error::InvalidPackage { .. } => StatusCode::BAD_REQUEST,
            Error::Io(_) | Error::Json(_) | Error::TomlDe(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self::new(status, err.to_string())
    }
}

impl From<ferrygram_runtime::Error> for ApiError {
    fn from(err: ferrygram_runtime::Error) -> Self {
        use ferrygram_runtime::Error;

        let status = match &err {
            Error::UnknownPlugin { .. } => StatusCode::NOT_FOUND,
            Error::NotRunning => StatusCode::CONFLICT,
            Error::BuiltinFeature { .. } => StatusCode::BAD_REQUEST,
            Error::Construction { .. } | Error::Activation { .. } | Error::Aborted { .. } => {
                StatusCode::INTERNAL_SERVER_ERROR
            },
        };
        Self::new(status, err.to_string())
    }
}

/// Parse a JSON request body. An empty body reads as `{}`.
///
/// Reads raw bytes rather than going through `Json` so clients that omit
/// the content type, or send nothing at all, still work.
pub fn parse_body<T: DeserializeOwned>(body: &Bytes) -> Result<T, ApiError> {
    let raw: &[u8] = if body.iter().all(u8::is_ascii_whitespace) {
        b"{}"
    } else {
        body
    };
    serde_json::from_slice(raw).map_err(|e| {
        ApiError::bad_request("invalid request")
            .with_error("invalid request body")
            .with_details(json!([{
                "message": e.to_string(),
                "line": e.line(),
                "column": e.column(),
            }]))
    })
}
