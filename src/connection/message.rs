//! §4.9 message taxonomy: the nine WAMP v1 wire shapes, each a JSON array
//! whose first element is an integer type id. Hand-written
//! `Serialize`/`Deserialize` dispatching on that leading integer, with
//! flat, variable-arity `Call`/`Publish` argument lists rather than a
//! fixed options-dict shape.

use std::fmt;

use serde::de::{self, SeqAccess, Visitor};
use serde::ser::SerializeSeq;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

macro_rules! next_or {
    ($visitor:expr, $msg:expr) => {
        match $visitor.next_element()? {
            Some(val) => val,
            None => return Err(de::Error::custom($msg)),
        }
    };
}

#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    /// `[0, sessionId, version=1, serverId]`
    Welcome { session_id: String, server_id: String },
    /// `[1, shortPrefix, expansionUri]`
    Prefix { short: String, uri: String },
    /// `[2, callId, methodUri, arg...]`
    Call {
        call_id: String,
        uri: String,
        args: Vec<Value>,
    },
    /// `[3, callId, result]`
    CallResult { call_id: String, result: Value },
    /// `[4, callId, errorUri, description, details?]`
    CallError {
        call_id: String,
        error_uri: String,
        description: String,
        details: Option<Value>,
    },
    /// `[5, topicUri]`
    Subscribe { uri: String },
    /// `[6, topicUri]`
    Unsubscribe { uri: String },
    /// `[7, topicUri, event, excludeMe? | excludeList?, eligibleList?]`
    Publish {
        uri: String,
        event: Value,
        exclude_me: bool,
        exclude: Vec<String>,
        eligible: Vec<String>,
    },
    /// `[8, topicUri, event]`
    Event { uri: String, event: Value },
}

const WELCOME: u64 = 0;
const PREFIX: u64 = 1;
const CALL: u64 = 2;
const CALL_RESULT: u64 = 3;
const CALL_ERROR: u64 = 4;
const SUBSCRIBE: u64 = 5;
const UNSUBSCRIBE: u64 = 6;
const PUBLISH: u64 = 7;
const EVENT: u64 = 8;

impl Serialize for Message {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            Message::Welcome { session_id, server_id } => {
                (WELCOME, session_id, 1u64, server_id).serialize(serializer)
            }
            Message::Prefix { short, uri } => (PREFIX, short, uri).serialize(serializer),
            Message::Call { call_id, uri, args } => {
                let mut seq = serializer.serialize_seq(Some(3 + args.len()))?;
                seq.serialize_element(&CALL)?;
                seq.serialize_element(call_id)?;
                seq.serialize_element(uri)?;
                for arg in args {
                    seq.serialize_element(arg)?;
                }
                seq.end()
            }
            Message::CallResult { call_id, result } => {
                (CALL_RESULT, call_id, result).serialize(serializer)
            }
            Message::CallError { call_id, error_uri, description, details } => {
                let mut seq = serializer.serialize_seq(Some(if details.is_some() { 5 } else { 4 }))?;
                seq.serialize_element(&CALL_ERROR)?;
                seq.serialize_element(call_id)?;
                seq.serialize_element(error_uri)?;
                seq.serialize_element(description)?;
                if let Some(details) = details {
                    seq.serialize_element(details)?;
                }
                seq.end()
            }
            Message::Subscribe { uri } => (SUBSCRIBE, uri).serialize(serializer),
            Message::Unsubscribe { uri } => (UNSUBSCRIBE, uri).serialize(serializer),
            Message::Publish { uri, event, exclude_me, exclude, eligible } => {
                if !eligible.is_empty() {
                    (PUBLISH, uri, event, exclude, eligible).serialize(serializer)
                } else if !exclude.is_empty() {
                    (PUBLISH, uri, event, exclude).serialize(serializer)
                } else if *exclude_me {
                    (PUBLISH, uri, event, true).serialize(serializer)
                } else {
                    (PUBLISH, uri, event).serialize(serializer)
                }
            }
            Message::Event { uri, event } => (EVENT, uri, event).serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for Message {
    fn deserialize<D>(deserializer: D) -> Result<Message, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_any(MessageVisitor)
    }
}

struct MessageVisitor;

impl MessageVisitor {
    fn visit_welcome<'de, V>(&self, mut v: V) -> Result<Message, V::Error>
    where
        V: SeqAccess<'de>,
    {
        let session_id = next_or!(v, "Welcome ended before sessionId");
        let _version: u64 = next_or!(v, "Welcome ended before version");
        let server_id = next_or!(v, "Welcome ended before serverId");
        Ok(Message::Welcome { session_id, server_id })
    }

    fn visit_prefix<'de, V>(&self, mut v: V) -> Result<Message, V::Error>
    where
        V: SeqAccess<'de>,
    {
        let short = next_or!(v, "Prefix ended before short prefix");
        let uri = next_or!(v, "Prefix ended before expansion uri");
        Ok(Message::Prefix { short, uri })
    }

    fn visit_call<'de, V>(&self, mut v: V) -> Result<Message, V::Error>
    where
        V: SeqAccess<'de>,
    {
        let call_id = next_or!(v, "Call ended before callId");
        let uri = next_or!(v, "Call ended before methodUri");
        let mut args = Vec::new();
        while let Some(arg) = v.next_element()? {
            args.push(arg);
        }
        Ok(Message::Call { call_id, uri, args })
    }

    fn visit_call_result<'de, V>(&self, mut v: V) -> Result<Message, V::Error>
    where
        V: SeqAccess<'de>,
    {
        let call_id = next_or!(v, "CallResult ended before callId");
        let result = v.next_element()?.unwrap_or(Value::Null);
        Ok(Message::CallResult { call_id, result })
    }

    fn visit_call_error<'de, V>(&self, mut v: V) -> Result<Message, V::Error>
    where
        V: SeqAccess<'de>,
    {
        let call_id = next_or!(v, "CallError ended before callId");
        let error_uri = next_or!(v, "CallError ended before errorUri");
        let description = next_or!(v, "CallError ended before description");
        let details = v.next_element()?;
        Ok(Message::CallError { call_id, error_uri, description, details })
    }

    fn visit_subscribe<'de, V>(&self, mut v: V) -> Result<Message, V::Error>
    where
        V: SeqAccess<'de>,
    {
        let uri = next_or!(v, "Subscribe ended before topicUri");
        Ok(Message::Subscribe { uri })
    }

    fn visit_unsubscribe<'de, V>(&self, mut v: V) -> Result<Message, V::Error>
    where
        V: SeqAccess<'de>,
    {
        let uri = next_or!(v, "Unsubscribe ended before topicUri");
        Ok(Message::Unsubscribe { uri })
    }

    fn visit_publish<'de, V>(&self, mut v: V) -> Result<Message, V::Error>
    where
        V: SeqAccess<'de>,
    {
        let uri = next_or!(v, "Publish ended before topicUri");
        let event = next_or!(v, "Publish ended before event");
        let third: Option<Value> = v.next_element()?;
        let fourth: Option<Value> = v.next_element()?;

        let mut exclude_me = false;
        let mut exclude = Vec::new();
        let mut eligible = Vec::new();

        match third {
            None => {}
            Some(Value::Bool(b)) => exclude_me = b,
            Some(Value::Array(ids)) => {
                exclude = ids
                    .into_iter()
                    .filter_map(|v| v.as_str().map(str::to_string))
                    .collect();
                if let Some(Value::Array(elig)) = fourth {
                    eligible = elig
                        .into_iter()
                        .filter_map(|v| v.as_str().map(str::to_string))
                        .collect();
                }
            }
            Some(_) => return Err(de::Error::custom("Publish exclude field was neither bool nor array")),
        }
        Ok(Message::Publish { uri, event, exclude_me, exclude, eligible })
    }

    fn visit_event<'de, V>(&self, mut v: V) -> Result<Message, V::Error>
    where
        V: SeqAccess<'de>,
    {
        let uri = next_or!(v, "Event ended before topicUri");
        let event = next_or!(v, "Event ended before event payload");
        Ok(Message::Event { uri, event })
    }
}

impl<'de> Visitor<'de> for MessageVisitor {
    type Value = Message;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter.write_str("a WAMP v1 message array")
    }

    fn visit_seq<V>(self, mut visitor: V) -> Result<Message, V::Error>
    where
        V: SeqAccess<'de>,
    {
        let message_type: u64 = next_or!(visitor, "no message type id found");
        match message_type {
            WELCOME => self.visit_welcome(visitor),
            PREFIX => self.visit_prefix(visitor),
            CALL => self.visit_call(visitor),
            CALL_RESULT => self.visit_call_result(visitor),
            CALL_ERROR => self.visit_call_error(visitor),
            SUBSCRIBE => self.visit_subscribe(visitor),
            UNSUBSCRIBE => self.visit_unsubscribe(visitor),
            PUBLISH => self.visit_publish(visitor),
            EVENT => self.visit_event(visitor),
            other => Err(de::Error::custom(format!("unknown message type {}", other))),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    macro_rules! two_way_test {
        ($message:expr, $wire:expr) => {{
            let message = $message;
            assert_eq!(serde_json::to_string(&message).unwrap(), $wire);
            assert_eq!(serde_json::from_str::<Message>($wire).unwrap(), message);
        }};
    }

    #[test]
    fn welcome_round_trips() {
        two_way_test!(
            Message::Welcome { session_id: "s1".to_string(), server_id: "general.ai-Intercom/1".to_string() },
            r#"[0,"s1",1,"general.ai-Intercom/1"]"#
        );
    }

    #[test]
    fn prefix_round_trips() {
        two_way_test!(
            Message::Prefix { short: "curie".to_string(), uri: "wamp://u@host/rpc/".to_string() },
            r#"[1,"curie","wamp://u@host/rpc/"]"#
        );
    }

    #[test]
    fn call_round_trips_with_flat_args() {
        two_way_test!(
            Message::Call {
                call_id: "id1".to_string(),
                uri: "/rpc/method2".to_string(),
                args: vec![Value::from(2), Value::from(3), Value::from(5)],
            },
            r#"[2,"id1","/rpc/method2",2,3,5]"#
        );
    }

    #[test]
    fn call_result_round_trips() {
        two_way_test!(
            Message::CallResult { call_id: "id1".to_string(), result: Value::from(10) },
            r#"[3,"id1",10]"#
        );
    }

    #[test]
    fn call_error_round_trips_without_details() {
        two_way_test!(
            Message::CallError {
                call_id: "id1".to_string(),
                error_uri: "/rpc/m1#rpc_error".to_string(),
                description: "undefined method".to_string(),
                details: None,
            },
            r#"[4,"id1","/rpc/m1#rpc_error","undefined method"]"#
        );
    }

    #[test]
    fn subscribe_and_unsubscribe_round_trip() {
        two_way_test!(Message::Subscribe { uri: "/event/topic1".to_string() }, r#"[5,"/event/topic1"]"#);
        two_way_test!(Message::Unsubscribe { uri: "/event/topic1".to_string() }, r#"[6,"/event/topic1"]"#);
    }

    #[test]
    fn publish_bare_round_trips() {
        two_way_test!(
            Message::Publish {
                uri: "/t".to_string(),
                event: Value::from("x"),
                exclude_me: false,
                exclude: vec![],
                eligible: vec![],
            },
            r#"[7,"/t","x"]"#
        );
    }

    #[test]
    fn publish_exclude_me_round_trips() {
        two_way_test!(
            Message::Publish {
                uri: "/t".to_string(),
                event: Value::from("x"),
                exclude_me: true,
                exclude: vec![],
                eligible: vec![],
            },
            r#"[7,"/t","x",true]"#
        );
    }

    #[test]
    fn publish_exclude_and_eligible_lists_round_trip() {
        two_way_test!(
            Message::Publish {
                uri: "/t".to_string(),
                event: Value::from("x"),
                exclude_me: false,
                exclude: vec!["A".to_string()],
                eligible: vec!["B".to_string(), "C".to_string()],
            },
            r#"[7,"/t","x",["A"],["B","C"]]"#
        );
    }

    #[test]
    fn event_round_trips() {
        two_way_test!(
            Message::Event { uri: "/event/topic1".to_string(), event: Value::from("hello") },
            r#"[8,"/event/topic1","hello"]"#
        );
    }

    #[test]
    fn malformed_frame_with_missing_fields_is_rejected() {
        assert!(serde_json::from_str::<Message>(r#"[5]"#).is_err());
        assert!(serde_json::from_str::<Message>(r#"[99,"x"]"#).is_err());
    }
}
