//! Packet layer: fragmentation and reassembly of protocol messages.
//!
//! A message is serialized to its JSON wire string, split into fragments of
//! at most `fragment_size` characters, and each fragment is wrapped as
//!
//! ```text
//! <peer> <message id> <index> <total> <fragment>
//! ```
//!
//! On send `<peer>` is the recipient (or `*`); on receive the transport has
//! rewritten it to the sender. Fragments may arrive in any order and may be
//! duplicated. A message whose fragments never all arrive keeps its buffer
//! until [`PacketLayer::clear`] is called.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, PoisonError};

use tracing::trace;

use synclet_core::{decode_message, encode_message, Message, BROADCAST_ID};

use crate::error::{Result, SyncError};
use crate::transport::{split_recipient, Transport};

/// Default maximum fragment length, in characters.
pub const DEFAULT_FRAGMENT_SIZE: usize = 4096;

/// Upper bound on the fragment count of one inbound message.
pub const MAX_FRAGMENTS: usize = 1 << 20;

/// Partially received message. Fragments are stored as they arrive.
struct FragmentBuffer {
    total: usize,
    fragments: BTreeMap<usize, String>,
}

impl FragmentBuffer {
    fn new(total: usize) -> Self {
        Self {
            total,
            fragments: BTreeMap::new(),
        }
    }

    /// Store a fragment. Duplicates overwrite.
    fn insert(&mut self, index: usize, fragment: &str) {
        self.fragments.insert(index, fragment.to_owned());
    }

    fn is_complete(&self) -> bool {
        self.fragments.len() == self.total
    }

    fn assemble(self) -> String {
        self.fragments.into_values().collect()
    }
}

/// Per-transport fragmenter and reassembly buffer.
pub struct PacketLayer {
    fragment_size: usize,
    /// (sender id, message id) -> fragments received so far.
    buffers: Mutex<HashMap<(String, String), FragmentBuffer>>,
}

impl PacketLayer {
    /// Create a packet layer. A zero fragment size is treated as one.
    pub fn new(fragment_size: usize) -> Self {
        Self {
            fragment_size: fragment_size.max(1),
            buffers: Mutex::new(HashMap::new()),
        }
    }

    /// Maximum fragment length, in characters.
    pub fn fragment_size(&self) -> usize {
        self.fragment_size
    }

    /// Serialize and fragment a message addressed to `to`.
    pub fn fragment(&self, message: &Message, to: &str) -> Result<Vec<String>> {
        let payload = encode_message(message)?;
        let message_id = new_message_id();

        let chars: Vec<char> = payload.chars().collect();
        let chunks: Vec<String> = chars
            .chunks(self.fragment_size)
            .map(|chunk| chunk.iter().collect())
            .collect();
        let total = chunks.len();

        Ok(chunks
            .into_iter()
            .enumerate()
            .map(|(index, chunk)| format!("{to} {message_id} {index} {total} {chunk}"))
            .collect())
    }

    /// Fragment a message and push every packet through `transport`.
    ///
    /// `None` broadcasts to every peer on the transport.
    pub async fn send_packets(
        &self,
        transport: &dyn Transport,
        message: &Message,
        to: Option<&str>,
    ) -> Result<()> {
        let to = to.unwrap_or(BROADCAST_ID);
        for packet in self.fragment(message, to)? {
            transport.send_packet(packet).await?;
        }
        Ok(())
    }

    /// Accept one inbound packet.
    ///
    /// Returns the sender id and message once the last missing fragment
    /// arrives, `None` while fragments are still outstanding.
    pub fn receive_packet(&self, packet: &str) -> Result<Option<(String, Message)>> {
        let (from, rest) = split_recipient(packet)?;
        let mut fields = rest.splitn(4, ' ');
        let (Some(message_id), Some(index), Some(total), Some(fragment)) =
            (fields.next(), fields.next(), fields.next(), fields.next())
        else {
            return Err(SyncError::MalformedPacket(format!(
                "expected 5 fields in packet from {from}"
            )));
        };
        let index: usize = parse_field(index, "index")?;
        let total: usize = parse_field(total, "total")?;
        if total > MAX_FRAGMENTS {
            return Err(SyncError::MalformedPacket(format!(
                "fragment total {total} exceeds {MAX_FRAGMENTS}"
            )));
        }
        if total == 0 || index >= total {
            return Err(SyncError::MalformedPacket(format!(
                "fragment {index} of {total} out of range"
            )));
        }

        let key = (from.to_owned(), message_id.to_owned());
        let mut buffers = self.buffers.lock().unwrap_or_else(PoisonError::into_inner);
        let buffer = buffers
            .entry(key.clone())
            .or_insert_with(|| FragmentBuffer::new(total));
        if buffer.total != total {
            return Err(SyncError::MalformedPacket(format!(
                "message {message_id} from {from} changed fragment total to {total}"
            )));
        }
        buffer.insert(index, fragment);
        trace!(from = %from, message_id, index, total, "fragment received");

        if !buffer.is_complete() {
            return Ok(None);
        }
        let payload = buffers
            .remove(&key)
            .map(FragmentBuffer::assemble)
            .unwrap_or_default();
        drop(buffers);

        let message = decode_message(&payload)?;
        Ok(Some((key.0, message)))
    }

    /// Number of messages still waiting for fragments.
    pub fn pending(&self) -> usize {
        self.buffers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Discard every partially received message.
    pub fn clear(&self) {
        self.buffers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

fn parse_field(field: &str, name: &str) -> Result<usize> {
    field
        .parse()
        .map_err(|_| SyncError::MalformedPacket(format!("{name} is not a number: {field:?}")))
}

fn new_message_id() -> String {
    hex::encode(rand::random::<[u8; 8]>())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use synclet_core::{Address, Context, ProtocolNode};

    fn sample_message() -> Message {
        Message::new(
            1,
            Address::new(["key with spaces"]),
            ProtocolNode::TimestampAtomLeaf("0001".into(), Some("a value with spaces ✓".into())),
            Context::new(),
        )
    }

    /// Turn outbound packets into what a transport would deliver.
    fn delivered(packets: Vec<String>, from: &str) -> Vec<String> {
        packets
            .into_iter()
            .map(|packet| {
                let (_, rest) = packet.split_once(' ').unwrap();
                format!("{from} {rest}")
            })
            .collect()
    }

    #[test]
    fn test_single_fragment_round_trip() {
        let layer = PacketLayer::new(DEFAULT_FRAGMENT_SIZE);
        let packets = layer.fragment(&sample_message(), "b").unwrap();
        assert_eq!(packets.len(), 1);
        assert!(packets[0].starts_with("b "));

        let packet = &delivered(packets, "a")[0];
        let (from, message) = layer.receive_packet(packet).unwrap().unwrap();
        assert_eq!(from, "a");
        assert_eq!(message, sample_message());
        assert_eq!(layer.pending(), 0);
    }

    #[test]
    fn test_fragments_split_on_characters() {
        let layer = PacketLayer::new(3);
        let packets = layer.fragment(&sample_message(), "*").unwrap();
        assert!(packets.len() > 1);

        let receiver = PacketLayer::new(3);
        let mut completed = None;
        for packet in delivered(packets, "a").iter().rev() {
            completed = receiver.receive_packet(packet).unwrap();
        }
        assert_eq!(completed.unwrap().1, sample_message());
    }

    #[test]
    fn test_incomplete_message_stays_buffered_until_cleared() {
        let layer = PacketLayer::new(4);
        let packets = delivered(layer.fragment(&sample_message(), "b").unwrap(), "a");

        assert!(layer.receive_packet(&packets[0]).unwrap().is_none());
        assert_eq!(layer.pending(), 1);

        layer.clear();
        assert_eq!(layer.pending(), 0);
    }

    #[test]
    fn test_buffers_keyed_by_sender() {
        let layer = PacketLayer::new(4);
        let packets = layer.fragment(&sample_message(), "c").unwrap();
        let from_a = delivered(packets.clone(), "a");
        let from_b = delivered(packets, "b");

        for packet in &from_a[..from_a.len() - 1] {
            assert!(layer.receive_packet(packet).unwrap().is_none());
        }
        for packet in &from_b[..from_b.len() - 1] {
            assert!(layer.receive_packet(packet).unwrap().is_none());
        }
        assert_eq!(layer.pending(), 2);

        let (from, _) = layer.receive_packet(from_b.last().unwrap()).unwrap().unwrap();
        assert_eq!(from, "b");
        assert_eq!(layer.pending(), 1);
    }

    #[test]
    fn test_malformed_packets_rejected() {
        let layer = PacketLayer::new(4);
        assert!(layer.receive_packet("a m 0").is_err());
        assert!(layer.receive_packet("a m x 1 data").is_err());
        assert!(layer.receive_packet("a m 1 1 data").is_err());
        assert!(layer.receive_packet("a m 0 0 data").is_err());
        assert!(matches!(
            layer.receive_packet("a m 0 1 not json"),
            Err(SyncError::Core(_))
        ));
    }

    #[test]
    fn test_oversized_total_rejected() {
        let layer = PacketLayer::new(4);
        assert!(matches!(
            layer.receive_packet("a m 0 18446744073709551615 x"),
            Err(SyncError::MalformedPacket(_))
        ));
        let too_many = format!("a m 0 {} x", MAX_FRAGMENTS + 1);
        assert!(layer.receive_packet(&too_many).is_err());
        assert_eq!(layer.pending(), 0);

        // The largest accepted total buffers lazily.
        let largest = format!("a m 0 {MAX_FRAGMENTS} x");
        assert!(layer.receive_packet(&largest).unwrap().is_none());
        assert_eq!(layer.pending(), 1);
    }

    proptest! {
        #[test]
        fn test_reassembly_tolerates_permutation_and_duplicates(
            fragment_size in 1usize..64,
            value in ".{0,200}",
            order in any::<u64>(),
        ) {
            let message = Message::new(
                2,
                Address::new(["t", "r"]),
                ProtocolNode::TimestampAtomLeaf("0001".into(), Some(value.into())),
                Context::new(),
            );
            let layer = PacketLayer::new(fragment_size);
            let mut packets = delivered(layer.fragment(&message, "b").unwrap(), "a");

            // Deterministic shuffle driven by the generated seed.
            let len = packets.len();
            for i in 0..len {
                let j = ((order >> (i % 64)) as usize).wrapping_add(i * 7) % len;
                packets.swap(i, j);
            }
            // Repeat a fragment while the message is still incomplete.
            if len > 1 {
                let duplicate = packets[0].clone();
                packets.insert(1, duplicate);
            }

            let receiver = PacketLayer::new(fragment_size);
            let mut completed = Vec::new();
            for packet in &packets {
                if let Some(done) = receiver.receive_packet(packet).unwrap() {
                    completed.push(done);
                }
            }

            prop_assert_eq!(completed.len(), 1);
            prop_assert_eq!(receiver.pending(), 0);
            prop_assert_eq!(&completed[0].1, &message);
        }
    }
}
