//! Wire-format frame types.

use confab_core::{ErrorKind, Event, Gid, WireError};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Outgoing request frame.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Request {
    /// Unique request identifier, echoed by the response.
    pub id: String,
    /// Operation name (e.g. `user.get_email`).
    pub method: String,
    /// Parameters object.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl Request {
    /// Build a request with a fresh time-ordered identifier.
    pub fn new(method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            id: Uuid::now_v7().to_string(),
            method: method.into(),
            params,
        }
    }
}

/// Response frame answering one request.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Response {
    /// Echoed request identifier.
    pub id: String,
    /// Whether the operation succeeded.
    pub success: bool,
    /// Result payload (present when `success == true`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Error payload (present when `success == false`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
}

impl Response {
    /// Build a success response.
    pub fn success(id: impl Into<String>, result: Value) -> Self {
        Self {
            id: id.into(),
            success: true,
            result: Some(result),
            error: None,
        }
    }

    /// Build an error response from a typed wire error.
    pub fn error(id: impl Into<String>, error: &WireError) -> Self {
        Self {
            id: id.into(),
            success: false,
            result: None,
            error: Some(ErrorBody::from_wire_error(error)),
        }
    }
}

/// Structured error body inside a [`Response`].
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorBody {
    /// Machine-readable error code (e.g. `RESTRICTED`).
    pub code: String,
    /// Enumerated problem sub-code, for kinds that carry one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub problem: Option<String>,
    /// Human-readable message.
    pub message: String,
    /// The offending identifier, for kinds that reference one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub offending: Option<Gid>,
}

impl ErrorBody {
    /// Encode a typed wire error.
    #[must_use]
    pub fn from_wire_error(error: &WireError) -> Self {
        Self {
            code: error.code().to_owned(),
            problem: error.problem_code().map(str::to_owned),
            message: error.to_string(),
            offending: error.offending(),
        }
    }

    /// Decode back into the closed taxonomy.
    ///
    /// Returns `None` when the code or problem is not a legal member —
    /// the caller treats that as a protocol violation, never a domain
    /// error.
    #[must_use]
    pub fn decode(&self) -> Option<WireError> {
        let kind = ErrorKind::from_code(&self.code)?;
        WireError::from_wire(kind, self.problem.as_deref(), self.offending)
    }
}

/// One structured unit on a connection's inbound stream.
///
/// A request-connection only ever sees responses; an event-connection
/// only ever sees events. The shapes are disjoint (`success` vs `type`),
/// so the untagged representation is unambiguous.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Frame {
    /// Answer to a previously sent request.
    Response(Response),
    /// Server-pushed notification.
    Event(Event),
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use confab_core::{AuthProblem, LoginProblem};
    use serde_json::json;

    #[test]
    fn request_ids_are_unique() {
        let a = Request::new("user.get_email", None);
        let b = Request::new("user.get_email", None);
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn request_roundtrip_with_params() {
        let req = Request::new("account.login", Some(json!({"name": "ada"})));
        let json = serde_json::to_string(&req).unwrap();
        let back: Request = serde_json::from_str(&json).unwrap();
        assert_eq!(back.method, "account.login");
        assert_eq!(back.params.unwrap()["name"], "ada");
    }

    #[test]
    fn request_without_params_omits_field() {
        let req = Request::new("user.get_own", None);
        let json = serde_json::to_string(&req).unwrap();
        assert!(!json.contains("params"));
    }

    #[test]
    fn success_response_serde() {
        let resp = Response::success("r1", json!({"email": "a@b.c"}));
        let json = serde_json::to_string(&resp).unwrap();
        let v: Value = serde_json::from_str(&json).unwrap();
        assert_eq!(v["id"], "r1");
        assert_eq!(v["success"], true);
        assert!(v.get("error").is_none());
    }

    #[test]
    fn error_response_carries_code_and_problem() {
        let resp = Response::error("r2", &WireError::Login(LoginProblem::WrongSecret));
        let v: Value = serde_json::to_value(&resp).unwrap();
        assert_eq!(v["success"], false);
        assert_eq!(v["error"]["code"], "LOGIN_FAILED");
        assert_eq!(v["error"]["problem"], "WRONG_SECRET");
        assert!(v["error"].get("offending").is_none());
    }

    #[test]
    fn error_body_decode_roundtrip() {
        let original = WireError::Auth(AuthProblem::Expired);
        let body = ErrorBody::from_wire_error(&original);
        assert_eq!(body.decode(), Some(original));
    }

    #[test]
    fn error_body_decode_carries_offending() {
        let gid = Gid::new();
        let original = WireError::ObjectNotFound { gid: Some(gid) };
        let body = ErrorBody::from_wire_error(&original);
        assert_eq!(body.decode().unwrap().offending(), Some(gid));
    }

    #[test]
    fn unknown_code_fails_decode() {
        let body = ErrorBody {
            code: "NOT_IN_TAXONOMY".into(),
            problem: None,
            message: "??".into(),
            offending: None,
        };
        assert_eq!(body.decode(), None);
    }

    #[test]
    fn unknown_problem_fails_decode() {
        let body = ErrorBody {
            code: "LOGIN_FAILED".into(),
            problem: Some("BAD_HAIR_DAY".into()),
            message: "".into(),
            offending: None,
        };
        assert_eq!(body.decode(), None);
    }

    #[test]
    fn frame_distinguishes_response_from_event() {
        let resp_json = r#"{"id":"r1","success":true,"result":42}"#;
        let event_json = r#"{"type":"user.notification","timestamp":"2026-08-01T00:00:00.000Z"}"#;

        match serde_json::from_str::<Frame>(resp_json).unwrap() {
            Frame::Response(r) => assert!(r.success),
            Frame::Event(_) => panic!("parsed response as event"),
        }
        match serde_json::from_str::<Frame>(event_json).unwrap() {
            Frame::Event(ev) => assert_eq!(ev.event_type, "user.notification"),
            Frame::Response(_) => panic!("parsed event as response"),
        }
    }

    #[test]
    fn wire_format_error_response_fixture() {
        let raw = r#"{"id":"r9","success":false,"error":{"code":"RESTRICTED","message":"not allowed"}}"#;
        let resp: Response = serde_json::from_str(raw).unwrap();
        assert!(!resp.success);
        assert_eq!(resp.error.unwrap().decode(), Some(WireError::Restricted));
    }
}
