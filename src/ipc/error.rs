use crate::calc::CalcError;
use serde_json::json;

pub fn ok(id: &str, result: serde_json::Value) -> serde_json::Value {
    json!({
        "id": id,
        "ok": true,
        "result": result
    })
}

pub fn err(
    id: &str,
    code: &str,
    message: impl Into<String>,
    details: Option<serde_json::Value>,
) -> serde_json::Value {
    let mut error = json!({
        "code": code,
        "message": message.into(),
    });
    if let Some(d) = details {
        error["details"] = d;
    }
    json!({
        "id": id,
        "ok": false,
        "error": error,
    })
}

#[derive(Debug, thiserror::Error)]
pub enum HandlerErr {
    #[error("select a workspace first")]
    NoWorkspace,
    #[error("{0}")]
    BadParams(String),
    #[error("{message}")]
    Invalid {
        message: String,
        details: serde_json::Value,
    },
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    #[error(transparent)]
    Db(#[from] rusqlite::Error),
    #[error("{cause:#}")]
    Failed {
        code: &'static str,
        cause: anyhow::Error,
    },
}

impl HandlerErr {
    pub fn bad_params(message: impl Into<String>) -> Self {
        Self::BadParams(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict(message.into())
    }

    pub fn failed(code: &'static str, cause: anyhow::Error) -> Self {
        Self::Failed { code, cause }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::NoWorkspace => "no_workspace",
            Self::BadParams(_) | Self::Invalid { .. } => "bad_params",
            Self::NotFound(_) => "not_found",
            Self::Conflict(_) => "conflict",
            Self::Db(_) => "db_query_failed",
            Self::Failed { code, .. } => *code,
        }
    }

    pub fn response(self, id: &str) -> serde_json::Value {
        let code = self.code();
        let message = self.to_string();
        let details = match self {
            Self::Invalid { details, .. } => Some(details),
            _ => None,
        };
        err(id, code, message, details)
    }
}

impl From<CalcError> for HandlerErr {
    fn from(e: CalcError) -> Self {
        match &e {
            CalcError::ScoreOutOfRange { field, value, max } => Self::Invalid {
                message: e.to_string(),
                details: json!({ "field": field, "value": value, "max": max }),
            },
            CalcError::InvalidScaleItem(_) => Self::BadParams(e.to_string()),
        }
    }
}

pub fn respond(
    req_id: &str,
    method: &str,
    result: Result<serde_json::Value, HandlerErr>,
) -> serde_json::Value {
    match result {
        Ok(v) => ok(req_id, v),
        Err(e) => {
            tracing::warn!(method, code = e.code(), error = %e, "request failed");
            e.response(req_id)
        }
    }
}
