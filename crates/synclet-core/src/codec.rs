//! JSON wire encoding of protocol messages.
//!
//! A message is encoded as `[version, type, depth, address, node, context]`
//! where `type` is always [`MESSAGE_TYPE_NODE`]. Nodes are distinguished by
//! shape alone:
//!
//! ```text
//! "ts"                    TimestampLeaf
//! ["ts", atom|null]       TimestampAtomLeaf
//! 1234                    Digest
//! [{"id": node, ...}]     SubNodes, complete
//! [{"id": node, ...}, 1]  SubNodes, partial
//! ```
//!
//! Decoding happens once, here; everything past this module works with the
//! closed [`ProtocolNode`] enum.

use serde_json::{json, Value};

use crate::error::{CoreError, Result};
use crate::node::{Context, Message, ProtocolNode, SubNodeMap, MESSAGE_TYPE_NODE};
use crate::types::{Address, Atom, Hash, Timestamp};

/// Encode a message to its wire string.
pub fn encode_message(message: &Message) -> Result<String> {
    let value = json!([
        message.version,
        MESSAGE_TYPE_NODE,
        message.depth,
        message.address,
        encode_node(&message.node),
        message.context,
    ]);
    Ok(serde_json::to_string(&value)?)
}

/// Decode a message from its wire string.
pub fn decode_message(payload: &str) -> Result<Message> {
    let value: Value = serde_json::from_str(payload)?;
    let Value::Array(mut fields) = value else {
        return Err(CoreError::MalformedMessage("expected array".into()));
    };
    if fields.len() < 5 {
        return Err(CoreError::MalformedMessage(format!(
            "expected at least 5 fields, got {}",
            fields.len()
        )));
    }

    let context = match fields.get_mut(5).map(Value::take) {
        None | Some(Value::Null) => Context::new(),
        Some(Value::Object(map)) => map,
        Some(other) => {
            return Err(CoreError::MalformedMessage(format!(
                "context must be an object, got {other}"
            )))
        }
    };

    let version = as_u32(&fields[0], "version")?;
    let message_type = as_u32(&fields[1], "type")?;
    if message_type != MESSAGE_TYPE_NODE {
        return Err(CoreError::MalformedMessage(format!(
            "unsupported message type {message_type}"
        )));
    }
    let depth = as_u32(&fields[2], "depth")? as usize;
    let address: Address = serde_json::from_value(fields[3].take())
        .map_err(|e| CoreError::MalformedMessage(format!("address: {e}")))?;
    let node = decode_node(fields[4].take())?;

    Ok(Message {
        version,
        depth,
        address,
        node,
        context,
    })
}

/// Encode a single protocol node.
pub fn encode_node(node: &ProtocolNode) -> Value {
    match node {
        ProtocolNode::TimestampLeaf(ts) => Value::String(ts.as_str().to_owned()),
        ProtocolNode::TimestampAtomLeaf(ts, atom) => json!([ts.as_str(), atom]),
        ProtocolNode::Digest(hash) => Value::from(*hash),
        ProtocolNode::SubNodes { children, partial } => {
            let map: serde_json::Map<String, Value> = children
                .iter()
                .map(|(id, child)| (id.clone(), encode_node(child)))
                .collect();
            if *partial {
                json!([map, 1])
            } else {
                json!([map])
            }
        }
    }
}

/// Decode a single protocol node.
pub fn decode_node(value: Value) -> Result<ProtocolNode> {
    match value {
        Value::String(ts) => Ok(ProtocolNode::TimestampLeaf(Timestamp::new(ts))),
        Value::Number(number) => number
            .as_u64()
            .and_then(|n| Hash::try_from(n).ok())
            .map(ProtocolNode::Digest)
            .ok_or_else(|| CoreError::MalformedNode(format!("digest out of range: {number}"))),
        Value::Array(items) => decode_array_node(items),
        other => Err(CoreError::MalformedNode(format!("unexpected node {other}"))),
    }
}

fn decode_array_node(mut items: Vec<Value>) -> Result<ProtocolNode> {
    let leads_with_timestamp = matches!(items.first(), Some(Value::String(_)));
    let leads_with_children = matches!(items.first(), Some(Value::Object(_)));

    match items.len() {
        2 if leads_with_timestamp => {
            let atom = items.pop().unwrap_or(Value::Null);
            let Some(Value::String(ts)) = items.pop() else {
                return Err(CoreError::MalformedNode("missing timestamp".into()));
            };
            let atom: Option<Atom> = serde_json::from_value(atom)
                .map_err(|e| CoreError::MalformedNode(format!("atom: {e}")))?;
            Ok(ProtocolNode::TimestampAtomLeaf(Timestamp::new(ts), atom))
        }
        1 | 2 if leads_with_children => {
            let partial = match items.get(1) {
                None | Some(Value::Null) => false,
                Some(Value::Bool(flag)) => *flag,
                Some(Value::Number(n)) => n.as_u64().is_some_and(|n| n != 0),
                Some(other) => {
                    return Err(CoreError::MalformedNode(format!(
                        "partial flag must be a bool or number, got {other}"
                    )))
                }
            };
            let Value::Object(map) = items.swap_remove(0) else {
                return Err(CoreError::MalformedNode("missing children".into()));
            };
            let children = map
                .into_iter()
                .map(|(id, child)| Ok((id, decode_node(child)?)))
                .collect::<Result<SubNodeMap>>()?;
            Ok(ProtocolNode::SubNodes { children, partial })
        }
        _ => Err(CoreError::MalformedNode(format!(
            "unrecognized array node of length {}",
            items.len()
        ))),
    }
}

fn as_u32(value: &Value, field: &str) -> Result<u32> {
    value
        .as_u64()
        .and_then(|n| u32::try_from(n).ok())
        .ok_or_else(|| CoreError::MalformedMessage(format!("{field} must be an unsigned integer")))
}
