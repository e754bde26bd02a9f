//! Hybrid logical clock producing sortable timestamps.
//!
//! Timestamps are rendered as 16 hex digits of NTP64 time followed by an
//! 8 hex digit node tag, so lexicographic order matches clock order and two
//! replicas never mint the same timestamp.

use uhlc::{HLCBuilder, HLC, ID, NTP64};

use crate::types::Timestamp;

const TIME_DIGITS: usize = 16;

/// Per-replica timestamp source.
pub struct HlcClock {
    hlc: HLC,
    id: ID,
    tag: String,
}

impl HlcClock {
    /// Create a clock for the replica with the given id.
    ///
    /// The HLC id and the node tag are both derived from Blake3 of the
    /// replica id, so they are stable across restarts.
    pub fn new(replica_id: &str) -> Self {
        let hash = blake3::hash(replica_id.as_bytes());
        let bytes = hash.as_bytes();

        let mut id_bytes = [0u8; 16];
        id_bytes.copy_from_slice(&bytes[..16]);
        // An all-zero id is invalid for uhlc; fall back to a random one.
        let id = ID::try_from(id_bytes).unwrap_or_else(|_| ID::rand());

        let tag = format!(
            "{:08x}",
            u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
        );

        Self {
            hlc: HLCBuilder::new().with_id(id).build(),
            id,
            tag,
        }
    }

    /// Mint a new timestamp, strictly greater than any previously minted or
    /// observed one.
    pub fn next(&self) -> Timestamp {
        self.render(self.hlc.new_timestamp().get_time().as_u64())
    }

    /// Mint a timestamp that sorts after `floor`.
    ///
    /// `floor` is observed first. If the clock still lags behind it (a peer
    /// running ahead of the local wall clock), the result is one tick past
    /// `floor`'s time. Returns `None` when nothing in this format sorts
    /// after `floor`.
    pub fn next_after(&self, floor: &Timestamp) -> Option<Timestamp> {
        self.observe(floor);
        let minted = self.next();
        if minted > *floor {
            return Some(minted);
        }
        let bumped = self.render(parse_time(floor)?.checked_add(1)?);
        (bumped > *floor).then_some(bumped)
    }

    fn render(&self, time: u64) -> Timestamp {
        Timestamp::new(format!("{time:016x}{}", self.tag))
    }

    /// Advance the clock past a remote timestamp.
    ///
    /// Returns `false` if the timestamp was not produced by an [`HlcClock`]
    /// or is too far ahead of the local wall clock to be accepted.
    pub fn observe(&self, timestamp: &Timestamp) -> bool {
        let Some(time) = parse_time(timestamp) else {
            return false;
        };
        let remote = uhlc::Timestamp::new(NTP64(time), self.id);
        self.hlc.update_with_timestamp(&remote).is_ok()
    }
}

impl std::fmt::Debug for HlcClock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HlcClock").field("tag", &self.tag).finish()
    }
}

fn parse_time(timestamp: &Timestamp) -> Option<u64> {
    let digits = timestamp.as_str().get(..TIME_DIGITS)?;
    u64::from_str_radix(digits, 16).ok()
}
