//! Secure-passthrough wire types and response error classification.
//!
//! Devices report failures at several layers of a response. The checks are run
//! as one ordered pipeline; the first layer that reports a non-zero code wins:
//!
//! 1. Outer envelope: `error_code`, or `result.data.code`
//! 2. Decrypted payload: `err_code` / `err_msg`
//! 3. Decrypted payload: `error_code`
//! 4. Batched payload: `result.responses[i].error_code`, with the method name
//!
//! Layer 1 only exists for SSL-AES. Layers 2 to 4 are applied to every
//! decrypted payload, whichever transport carried it.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, ErrorLayer};

/// Outer request: `{"method":"securePassthrough","params":{"request":...}}`.
#[derive(Debug, Serialize)]
pub struct PassthroughRequest<'a> {
    pub method: &'static str,
    pub params: PassthroughParams<'a>,
}

#[derive(Debug, Serialize)]
pub struct PassthroughParams<'a> {
    pub request: &'a str,
}

impl<'a> PassthroughRequest<'a> {
    pub fn new(ciphertext: &'a str) -> Self {
        Self {
            method: "securePassthrough",
            params: PassthroughParams {
                request: ciphertext,
            },
        }
    }
}

/// Outer response. Every field is optional on the wire.
#[derive(Debug, Default, Deserialize)]
pub struct PassthroughResponse {
    #[serde(default)]
    pub error_code: i64,
    #[serde(default)]
    pub result: Option<PassthroughResult>,
}

#[derive(Debug, Default, Deserialize)]
pub struct PassthroughResult {
    #[serde(default)]
    pub response: Option<String>,
    #[serde(default)]
    pub data: Option<ResultData>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ResultData {
    #[serde(default)]
    pub code: i64,
}

impl PassthroughResponse {
    pub fn parse(body: &[u8]) -> Result<Self, Error> {
        serde_json::from_slice(body)
            .map_err(|e| Error::Protocol(format!("invalid passthrough response: {}", e)))
    }

    /// The encrypted payload, after the outer error check.
    pub fn into_ciphertext(self) -> Result<String, Error> {
        if let Some(failure) = self.failure() {
            return Err(failure.into());
        }
        self.result
            .and_then(|r| r.response)
            .ok_or_else(|| Error::Protocol("missing result.response".into()))
    }

    fn failure(&self) -> Option<Failure> {
        let data_code = self
            .result
            .as_ref()
            .and_then(|r| r.data.as_ref())
            .map(|d| d.code)
            .unwrap_or(0);

        if self.error_code == 0 && data_code == 0 {
            return None;
        }
        Some(Failure::Passthrough {
            error_code: self.error_code,
            data_code,
        })
    }
}

/// A failure found in a response, tagged by the layer that reported it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Failure {
    Passthrough {
        error_code: i64,
        data_code: i64,
    },
    Device {
        code: i64,
        message: Option<String>,
    },
    SubRequest {
        index: usize,
        code: i64,
        method: Option<String>,
    },
}

impl From<Failure> for Error {
    fn from(failure: Failure) -> Self {
        match failure {
            Failure::Passthrough {
                error_code,
                data_code,
            } => Error::Application {
                layer: ErrorLayer::Passthrough,
                code: if data_code != 0 { data_code } else { error_code },
                context: Some(format!("error_code {}", error_code)),
            },
            Failure::Device { code, message } => Error::Application {
                layer: ErrorLayer::Device,
                code,
                context: message,
            },
            Failure::SubRequest {
                index,
                code,
                method,
            } => Error::Application {
                layer: ErrorLayer::SubRequest,
                code,
                context: Some(match method {
                    Some(method) => method,
                    None => format!("responses[{}]", index),
                }),
            },
        }
    }
}

type PayloadCheck = fn(&Value) -> Option<Failure>;

/// Checks applied to a decrypted payload, in priority order.
const PAYLOAD_CHECKS: [PayloadCheck; 3] = [err_code, error_code, sub_request_error];

/// Returns the highest-priority failure reported by a decrypted payload.
pub fn payload_failure(payload: &Value) -> Option<Failure> {
    PAYLOAD_CHECKS.iter().find_map(|check| check(payload))
}

/// Parses a decrypted payload and fails on any reported error code.
pub fn check_payload(plaintext: &[u8]) -> Result<Value, Error> {
    let payload: Value = serde_json::from_slice(plaintext)
        .map_err(|e| Error::Protocol(format!("invalid decrypted payload: {}", e)))?;
    match payload_failure(&payload) {
        Some(failure) => Err(failure.into()),
        None => Ok(payload),
    }
}

fn code_of(value: &Value, key: &str) -> i64 {
    value.get(key).and_then(Value::as_i64).unwrap_or(0)
}

fn err_code(payload: &Value) -> Option<Failure> {
    let code = code_of(payload, "err_code");
    (code != 0).then(|| Failure::Device {
        code,
        message: payload
            .get("err_msg")
            .and_then(Value::as_str)
            .map(str::to_string),
    })
}

fn error_code(payload: &Value) -> Option<Failure> {
    let code = code_of(payload, "error_code");
    (code != 0).then_some(Failure::Device {
        code,
        message: None,
    })
}

fn sub_request_error(payload: &Value) -> Option<Failure> {
    let responses = payload.pointer("/result/responses")?.as_array()?;
    responses.iter().enumerate().find_map(|(index, response)| {
        let code = code_of(response, "error_code");
        (code != 0).then(|| Failure::SubRequest {
            index,
            code,
            method: response
                .get("method")
                .and_then(Value::as_str)
                .map(str::to_string),
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_shape() {
        let body = serde_json::to_value(PassthroughRequest::new("Y2lwaGVy")).unwrap();
        assert_eq!(
            body,
            json!({"method": "securePassthrough", "params": {"request": "Y2lwaGVy"}})
        );
    }

    #[test]
    fn test_outer_success_yields_ciphertext() {
        let response =
            PassthroughResponse::parse(br#"{"error_code":0,"result":{"response":"abc"}}"#).unwrap();
        assert_eq!(response.into_ciphertext().unwrap(), "abc");
    }

    #[test]
    fn test_outer_data_code_takes_precedence() {
        let response = PassthroughResponse::parse(
            br#"{"error_code":-40401,"result":{"data":{"code":-40413}}}"#,
        )
        .unwrap();
        match response.into_ciphertext().unwrap_err() {
            Error::Application { layer, code, .. } => {
                assert_eq!(layer, ErrorLayer::Passthrough);
                assert_eq!(code, -40413);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_outer_error_code_alone() {
        let response = PassthroughResponse::parse(br#"{"error_code":-1301}"#).unwrap();
        assert!(matches!(
            response.into_ciphertext(),
            Err(Error::Application {
                layer: ErrorLayer::Passthrough,
                code: -1301,
                ..
            })
        ));
    }

    #[test]
    fn test_missing_response_is_protocol_error() {
        let response = PassthroughResponse::parse(br#"{"error_code":0,"result":{}}"#).unwrap();
        assert!(matches!(
            response.into_ciphertext(),
            Err(Error::Protocol(_))
        ));
        assert!(PassthroughResponse::parse(b"<html>").is_err());
    }

    #[test]
    fn test_device_err_code_carries_message() {
        let err = check_payload(br#"{"err_code":-1,"err_msg":"bad"}"#).unwrap_err();
        match err {
            Error::Application {
                layer,
                code,
                context,
            } => {
                assert_eq!(layer, ErrorLayer::Device);
                assert_eq!(code, -1);
                assert_eq!(context.as_deref(), Some("bad"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_sub_request_error_is_distinct() {
        let payload = br#"{"error_code":0,"result":{"responses":[
            {"method":"getDeviceInfo","error_code":0,"result":{}},
            {"method":"getLensMaskConfig","error_code":-40106}
        ]}}"#;
        match check_payload(payload).unwrap_err() {
            Error::Application {
                layer,
                code,
                context,
            } => {
                assert_eq!(layer, ErrorLayer::SubRequest);
                assert_eq!(code, -40106);
                assert_eq!(context.as_deref(), Some("getLensMaskConfig"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_pipeline_order() {
        let payload = json!({
            "err_code": -1,
            "error_code": -2,
            "result": {"responses": [{"method": "m", "error_code": -3}]}
        });
        assert_eq!(
            payload_failure(&payload),
            Some(Failure::Device {
                code: -1,
                message: None
            })
        );

        let payload = json!({
            "error_code": -2,
            "result": {"responses": [{"method": "m", "error_code": -3}]}
        });
        assert_eq!(
            payload_failure(&payload),
            Some(Failure::Device {
                code: -2,
                message: None
            })
        );
    }

    #[test]
    fn test_clean_payload_passes() {
        let payload = check_payload(br#"{"error_code":0,"result":{"device_on":true}}"#).unwrap();
        assert_eq!(payload["result"]["device_on"], json!(true));
        assert!(matches!(check_payload(b"not json"), Err(Error::Protocol(_))));
    }
}
