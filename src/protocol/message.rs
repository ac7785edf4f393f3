use bytes::Bytes;

use crate::codec::{self, Value};
use crate::error::RemoteError;
use crate::{Result, RpcError};

const FIELD_SEQ: &str = "seq";
const FIELD_FN: &str = "fn";
const FIELD_ARGS: &str = "args";
const FIELD_RESULT: &str = "result";
const FIELD_ERROR: &str = "error";

const FIELD_CODE: &str = "code";
const FIELD_MESSAGE: &str = "message";

/// One protocol message, as carried in a single binary frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    // ---
    /// Invoke `path` on the peer.
    Request {
        seq: u64,
        path: String,
        args: Vec<Value>,
    },
    /// The call with `seq` succeeded.
    Success { seq: u64, result: Value },
    /// The call with `seq` failed.
    Error { seq: u64, error: RemoteError },
}

impl Message {
    // ---
    pub fn seq(&self) -> u64 {
        match self {
            Message::Request { seq, .. }
            | Message::Success { seq, .. }
            | Message::Error { seq, .. } => {
                *seq
            }
        }
    }

    /// Wire layout of the message.
    ///
    /// Success responses carry an explicit nil `error` field.
    pub fn to_value(&self) -> Value {
        // ---
        let seq = (FIELD_SEQ, Value::Int(self.seq() as i64));
        match self {
            Message::Request { path, args, .. } => Value::map([
                seq,
                (FIELD_FN, Value::from(path.as_str())),
                (FIELD_ARGS, Value::Array(args.clone())),
            ]),
            Message::Success { result, .. } => Value::map([
                seq,
                (FIELD_RESULT, result.clone()),
                (FIELD_ERROR, Value::Nil),
            ]),
            Message::Error { error, .. } => Value::map([
                seq,
                (
                    FIELD_ERROR,
                    Value::map([
                        (FIELD_CODE, Value::from(error.code.as_str())),
                        (FIELD_MESSAGE, Value::from(error.message.as_str())),
                    ]),
                ),
            ]),
        }
    }

    /// Encode into one binary frame.
    pub fn encode(&self) -> Result<Bytes> {
        Ok(codec::encode(&self.to_value())?)
    }

    /// Classify a decoded value.
    ///
    /// A map with `fn` is a request. A map with `result` or `error` is a
    /// response; a nil `error` means success. Anything else, including
    /// recognized fields holding the wrong kind of value, fails with
    /// [`RpcError::UnrecognizedMessage`].
    pub fn from_value(value: &Value) -> Result<Self> {
        // ---
        if !matches!(value, Value::Map(_)) {
            return Err(RpcError::UnrecognizedMessage);
        }
        let seq = value
            .get(FIELD_SEQ)
            .and_then(Value::as_i64)
            .and_then(|n| u64::try_from(n).ok())
            .ok_or(RpcError::UnrecognizedMessage)?;

        if let Some(path) = value.get(FIELD_FN) {
            let path = path.as_str().ok_or(RpcError::UnrecognizedMessage)?;
            let args = value
                .get(FIELD_ARGS)
                .and_then(Value::as_array)
                .ok_or(RpcError::UnrecognizedMessage)?;
            return Ok(Message::Request {
                seq,
                path: path.to_string(),
                args: args.to_vec(),
            });
        }

        match (value.get(FIELD_RESULT), value.get(FIELD_ERROR)) {
            (_, Some(error)) if !error.is_nil() => {
                let code = error.get(FIELD_CODE).and_then(Value::as_str);
                let message = error.get(FIELD_MESSAGE).and_then(Value::as_str);
                match (code, message) {
                    (Some(code), Some(message)) => Ok(Message::Error {
                        seq,
                        error: RemoteError::new(code, message),
                    }),
                    _ => Err(RpcError::UnrecognizedMessage),
                }
            }
            (Some(result), _) => Ok(Message::Success {
                seq,
                result: result.clone(),
            }),
            (None, Some(_)) => Ok(Message::Success {
                seq,
                result: Value::Nil,
            }),
            (None, None) => Err(RpcError::UnrecognizedMessage),
        }
    }
}
