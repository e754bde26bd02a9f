//! Golden wire vectors.
//!
//! Each vector pairs a message with its exact JSON wire string. Every
//! implementation must encode the message to that string byte for byte and
//! decode the string back to the same message.

use std::collections::BTreeMap;

use serde_json::json;

use synclet_core::{
    decode_message, encode_message, Address, Atom, Context, Message, ProtocolNode, Timestamp,
};

/// A golden wire vector.
#[derive(Debug, Clone)]
pub struct WireVector {
    /// Human-readable name for the vector.
    pub name: &'static str,
    /// Expected wire encoding.
    pub wire: &'static str,
    /// The decoded message.
    pub message: Message,
}

fn leaf(ts: &str, atom: Option<Atom>) -> ProtocolNode {
    ProtocolNode::TimestampAtomLeaf(Timestamp::from(ts), atom)
}

fn sub_nodes<const N: usize>(children: [(&str, ProtocolNode); N], partial: bool) -> ProtocolNode {
    ProtocolNode::SubNodes {
        children: children
            .into_iter()
            .map(|(id, node)| (id.to_owned(), node))
            .collect::<BTreeMap<_, _>>(),
        partial,
    }
}

fn message(depth: usize, address: &[&str], node: ProtocolNode) -> Message {
    Message::new(
        depth,
        Address::new(address.iter().copied()),
        node,
        Context::new(),
    )
}

/// Get all golden wire vectors.
pub fn all_vectors() -> Vec<WireVector> {
    let mut with_context = message(1, &[], ProtocolNode::Digest(0));
    with_context.context.insert("hops".into(), json!(1));

    vec![
        WireVector {
            name: "root digest",
            wire: "[1,0,2,[],305419896,{}]",
            message: message(2, &[], ProtocolNode::Digest(305_419_896)),
        },
        WireVector {
            name: "bare leaf timestamp",
            wire: r#"[1,0,1,["k"],"0001",{}]"#,
            message: message(
                1,
                &["k"],
                ProtocolNode::TimestampLeaf(Timestamp::from("0001")),
            ),
        },
        WireVector {
            name: "string atom",
            wire: r#"[1,0,1,["k"],["0001","v1"],{}]"#,
            message: message(1, &["k"], leaf("0001", Some(Atom::from("v1")))),
        },
        WireVector {
            name: "tombstone",
            wire: r#"[1,0,1,["k"],["0002",null],{}]"#,
            message: message(1, &["k"], leaf("0002", None)),
        },
        WireVector {
            name: "boolean atom at depth two",
            wire: r#"[1,0,2,["t","r"],["0003",true],{}]"#,
            message: message(2, &["t", "r"], leaf("0003", Some(Atom::from(true)))),
        },
        WireVector {
            name: "number atom",
            wire: r#"[1,0,1,["n"],["0004",1.5],{}]"#,
            message: message(1, &["n"], leaf("0004", Some(Atom::from(1.5)))),
        },
        WireVector {
            name: "empty complete sub-nodes",
            wire: "[1,0,1,[],[{}],{}]",
            message: message(1, &[], sub_nodes([], false)),
        },
        WireVector {
            name: "complete sub-nodes",
            wire: r#"[1,0,2,[],[{"t":123,"u":7}],{}]"#,
            message: message(
                2,
                &[],
                sub_nodes(
                    [
                        ("t", ProtocolNode::Digest(123)),
                        ("u", ProtocolNode::Digest(7)),
                    ],
                    false,
                ),
            ),
        },
        WireVector {
            name: "partial sub-nodes",
            wire: r#"[1,0,2,["t"],[{"r":"0001"},1],{}]"#,
            message: message(
                2,
                &["t"],
                sub_nodes(
                    [("r", ProtocolNode::TimestampLeaf(Timestamp::from("0001")))],
                    true,
                ),
            ),
        },
        WireVector {
            name: "nested full read",
            wire: r#"[1,0,2,[],[{"t":[{"r":["0001","x"]}]}],{}]"#,
            message: message(
                2,
                &[],
                sub_nodes(
                    [(
                        "t",
                        sub_nodes([("r", leaf("0001", Some(Atom::from("x"))))], false),
                    )],
                    false,
                ),
            ),
        },
        WireVector {
            name: "context",
            wire: r#"[1,0,1,[],0,{"hops":1}]"#,
            message: with_context,
        },
    ]
}

/// Check every vector in both directions.
pub fn verify_all_vectors() -> Result<(), String> {
    for vector in all_vectors() {
        let encoded = encode_message(&vector.message)
            .map_err(|e| format!("{}: encode failed: {e}", vector.name))?;
        if encoded != vector.wire {
            return Err(format!(
                "{}: encoded {encoded}, expected {}",
                vector.name, vector.wire
            ));
        }
        let decoded = decode_message(vector.wire)
            .map_err(|e| format!("{}: decode failed: {e}", vector.name))?;
        if decoded != vector.message {
            return Err(format!("{}: decoded {decoded:?}", vector.name));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_vectors_verify() {
        verify_all_vectors().unwrap();
    }

    #[test]
    fn test_vector_names_unique() {
        let vectors = all_vectors();
        let mut names: Vec<_> = vectors.iter().map(|v| v.name).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), vectors.len());
    }

    #[test]
    fn test_lenient_decoding_accepts_boolean_partial_flag() {
        let decoded = decode_message(r#"[1,0,2,["t"],[{"r":"0001"},true]]"#).unwrap();
        let expected = all_vectors()
            .into_iter()
            .find(|v| v.name == "partial sub-nodes")
            .unwrap();
        assert_eq!(decoded, expected.message);
    }
}
