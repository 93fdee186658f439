//! JSON frame format of the WebSocket peer
//!
//! Every frame is one JSON object tagged by `type`:
//!
//! Client → server:
//! - `auth {user, password}` (first frame)
//! - `message {action, data}` (fire-and-forget)
//! - `call {id, action, data}`
//!
//! Server → client:
//! - `ready`
//! - `reply {id, data}` or `reply {id, error}`
//! - `stream {data}` (a `StreamPush`)
//! - `error {message}`

use super::{Command, Reply, StreamPush};
use crate::error::{Result, SinkError};
use crate::record::LogRecord;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Frame sent by the client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ClientFrame {
    Auth {
        user: String,
        password: String,
    },
    Message {
        action: String,
        data: Value,
    },
    Call {
        id: u64,
        action: String,
        data: Value,
    },
}

/// Frame sent by the server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ServerFrame {
    Ready,
    Reply {
        id: u64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        data: Option<Value>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    Stream {
        data: StreamPush,
    },
    Error {
        message: String,
    },
}

impl ClientFrame {
    pub fn message(command: &Command) -> Result<Self> {
        Ok(ClientFrame::Message {
            action: command.action().to_string(),
            data: payload(command)?,
        })
    }

    pub fn call(id: u64, command: &Command) -> Result<Self> {
        Ok(ClientFrame::Call {
            id,
            action: command.action().to_string(),
            data: payload(command)?,
        })
    }

    pub fn encode(&self) -> Result<Bytes> {
        encode(self)
    }
}

impl ServerFrame {
    pub fn decode(data: &[u8]) -> Result<Self> {
        serde_json::from_slice(data).map_err(|e| SinkError::Protocol {
            message: format!("invalid server frame: {}", e),
        })
    }

    pub fn encode(&self) -> Result<Bytes> {
        encode(self)
    }
}

fn encode<T: Serialize>(frame: &T) -> Result<Bytes> {
    serde_json::to_vec(frame)
        .map(Bytes::from)
        .map_err(|e| SinkError::Protocol {
            message: format!("cannot encode frame: {}", e),
        })
}

/// Wire payload of a command
pub fn payload(command: &Command) -> Result<Value> {
    let value = match command {
        Command::Log(record) => serde_json::to_value(record),
        Command::SetStream(set) => serde_json::to_value(set),
        Command::UnsetStream(id) => Ok(Value::String(id.clone())),
        Command::UnsetAllStreams | Command::GetPermissions => Ok(Value::Null),
        Command::Query(request) => serde_json::to_value(request),
    };
    value.map_err(|e| SinkError::Protocol {
        message: format!("cannot encode {}: {}", command.action(), e),
    })
}

/// Typed reply for `action`, from the `data` of a successful reply frame
pub fn decode_reply(action: &str, data: Option<Value>) -> Result<Reply> {
    let data = data.unwrap_or(Value::Null);
    let invalid = |e: serde_json::Error| SinkError::Protocol {
        message: format!("invalid reply to {}: {}", action, e),
    };

    match action {
        "unsetStream" => serde_json::from_value(data).map(Reply::Unset).map_err(invalid),
        "query" => serde_json::from_value::<Vec<LogRecord>>(data)
            .map(Reply::Logs)
            .map_err(invalid),
        "getPermissions" => serde_json::from_value::<Vec<String>>(data)
            .map(Reply::Permissions)
            .map_err(invalid),
        _ => Ok(Reply::Done),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{Level, LogRecord, Relevance};
    use serde_json::json;

    fn record() -> LogRecord {
        LogRecord {
            origin: None,
            date: "2024-01-02T03:04:05Z".parse().unwrap(),
            name: "mocha".into(),
            level: Level::Info,
            relevance: Relevance::Normal,
            time: None,
            message: Some("my-message".into()),
            commit: None,
            extra: None,
        }
    }

    #[test]
    fn test_auth_frame() {
        let frame = ClientFrame::Auth {
            user: "test".into(),
            password: "pass".into(),
        };
        let bytes = frame.encode().unwrap();
        let value: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(
            value,
            json!({ "type": "auth", "user": "test", "password": "pass" })
        );
    }

    #[test]
    fn test_log_message_frame() {
        let frame = ClientFrame::message(&Command::Log(record())).unwrap();
        let value = serde_json::to_value(&frame).unwrap();
        assert_eq!(value["type"], json!("message"));
        assert_eq!(value["action"], json!("log"));
        assert_eq!(value["data"]["name"], json!("mocha"));
        assert!(value["data"].get("origin").is_none());
    }

    #[test]
    fn test_call_frame_payloads() {
        let frame = ClientFrame::call(7, &Command::UnsetStream("abc".into())).unwrap();
        assert_eq!(
            serde_json::to_value(&frame).unwrap(),
            json!({ "type": "call", "id": 7, "action": "unsetStream", "data": "abc" })
        );

        let frame = ClientFrame::call(8, &Command::GetPermissions).unwrap();
        assert_eq!(serde_json::to_value(&frame).unwrap()["data"], Value::Null);
    }

    #[test]
    fn test_decode_server_frames() {
        let ready = ServerFrame::decode(br#"{"type":"ready"}"#).unwrap();
        assert_eq!(ready, ServerFrame::Ready);

        let reply = ServerFrame::decode(br#"{"type":"reply","id":3,"error":"denied"}"#).unwrap();
        assert_eq!(
            reply,
            ServerFrame::Reply {
                id: 3,
                data: None,
                error: Some("denied".into())
            }
        );

        assert!(ServerFrame::decode(b"not json").is_err());
        assert!(ServerFrame::decode(br#"{"type":"bogus"}"#).is_err());
    }

    #[test]
    fn test_decode_reply_by_action() {
        assert_eq!(decode_reply("log", None).unwrap(), Reply::Done);
        assert_eq!(
            decode_reply("unsetStream", Some(json!(true))).unwrap(),
            Reply::Unset(true)
        );
        assert_eq!(
            decode_reply("getPermissions", Some(json!(["test", "test2"]))).unwrap(),
            Reply::Permissions(vec!["test".into(), "test2".into()])
        );

        let logs = decode_reply(
            "query",
            Some(json!([{
                "origin": "test",
                "date": "2024-01-02T03:04:05Z",
                "name": "mocha",
                "level": 1,
                "relevance": 1
            }])),
        )
        .unwrap();
        assert!(matches!(logs, Reply::Logs(ref l) if l.len() == 1));

        assert!(decode_reply("query", Some(json!("nope"))).is_err());
    }
}
