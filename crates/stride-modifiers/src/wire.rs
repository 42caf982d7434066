//! Wire payloads and the versioned message envelope.
//!
//! All messages are serialized with [`postcard`] and prefixed with a
//! protocol version byte. Level sets travel as [`PackedLevels`], which
//! postcard encodes as a tagged varint mask or a length-prefixed list, so an
//! empty mask body costs one byte and a disabled tier costs one `None` byte.
//!
//! Decoded payloads come from an untrusted peer. [`RequestPayload::sanitize`]
//! and [`CorrectionPayload::sanitize`] drop entries that do not match the
//! local catalog; per-level bounds are enforced again when levels are
//! unpacked into a tier.

use serde::{Deserialize, Serialize};

use crate::bitset::Level;
use crate::category::CategoryId;
use crate::error::ModifierError;
use crate::levels::PackedLevels;

/// Current wire-protocol version. Prepended to every serialized message.
pub const WIRE_VERSION: u8 = 1;

// ---------------------------------------------------------------------------
// Client -> server
// ---------------------------------------------------------------------------

/// One category's levels in a client move.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryRequest {
    /// Category index.
    pub category: CategoryId,
    /// Local-predicted `wanted`.
    pub local_wanted: Option<PackedLevels>,
    /// With-correction `wanted` as the client predicted it.
    pub correction_wanted: Option<PackedLevels>,
    /// With-correction `active` the client ended the tick with.
    pub correction_active: Option<PackedLevels>,
    /// The client's mirror of the server-authoritative `active`.
    pub server_active: Option<PackedLevels>,
}

/// Modifier data carried by one client move.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestPayload {
    /// Client tick the move was simulated on.
    pub tick: u64,
    /// Per-category levels, in catalog order.
    pub categories: Vec<CategoryRequest>,
}

impl RequestPayload {
    /// Entry for `category`, if present.
    pub fn category(&self, category: CategoryId) -> Option<&CategoryRequest> {
        self.categories.iter().find(|c| c.category == category)
    }

    /// Drops entries for unknown or repeated categories. Returns how many
    /// were dropped.
    pub fn sanitize(&mut self, category_count: usize) -> usize {
        let dropped = retain_known(&mut self.categories, category_count, |c| c.category);
        if dropped > 0 {
            tracing::warn!(tick = self.tick, dropped, "dropping malformed request entries");
        }
        dropped
    }
}

/// Up to three moves sent together: the newest, a held pending move that
/// could not be combined, and the oldest unacknowledged important move.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerMovePacket {
    /// Newest move.
    pub new: Option<RequestPayload>,
    /// Previously held move.
    pub pending: Option<RequestPayload>,
    /// Resent unacknowledged move.
    pub old: Option<RequestPayload>,
    /// Tick of the newest correction the client had applied when sending.
    pub correction_seen: Option<u64>,
}

impl ServerMovePacket {
    /// Returns `true` if no move is carried.
    pub fn is_empty(&self) -> bool {
        self.new.is_none() && self.pending.is_none() && self.old.is_none()
    }

    /// Carried moves in ascending tick order.
    pub fn into_ordered(self) -> Vec<RequestPayload> {
        let mut moves: Vec<RequestPayload> =
            [self.old, self.pending, self.new].into_iter().flatten().collect();
        moves.sort_by_key(|m| m.tick);
        moves
    }
}

// ---------------------------------------------------------------------------
// Server -> client
// ---------------------------------------------------------------------------

/// Authoritative active levels for one category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryCorrection {
    /// Category index.
    pub category: CategoryId,
    /// Authoritative with-correction `active`.
    pub correction_active: Option<PackedLevels>,
    /// Authoritative server-authoritative `active`.
    pub server_active: Option<PackedLevels>,
}

/// Modifier data attached to a correction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorrectionPayload {
    /// Client tick the correction applies to.
    pub tick: u64,
    /// Per-category authoritative levels.
    pub categories: Vec<CategoryCorrection>,
}

impl CorrectionPayload {
    /// Drops entries for unknown or repeated categories. Returns how many
    /// were dropped.
    pub fn sanitize(&mut self, category_count: usize) -> usize {
        let dropped = retain_known(&mut self.categories, category_count, |c| c.category);
        if dropped > 0 {
            tracing::warn!(tick = self.tick, dropped, "dropping malformed correction entries");
        }
        dropped
    }
}

/// Effective levels replicated to simulated proxies, in catalog order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplicatedLevels {
    /// Server tick of the snapshot.
    pub tick: u64,
    /// Effective level per category.
    pub levels: Vec<Level>,
}

// ---------------------------------------------------------------------------
// Envelope
// ---------------------------------------------------------------------------

/// Top-level modifier message. The enum discriminant is the type tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum WireMessage {
    /// Client moves.
    Moves(ServerMovePacket),
    /// Server accepted every move up to `tick`.
    Ack {
        /// Newest accepted client tick.
        tick: u64,
    },
    /// Server disagreed; client must roll back and replay.
    Correction(CorrectionPayload),
    /// Proxy replication snapshot.
    Replicated(ReplicatedLevels),
}

/// Serialize a [`WireMessage`] into a versioned binary payload.
///
/// Wire format: `[version: u8] [postcard-encoded WireMessage]`
pub fn serialize_message(msg: &WireMessage) -> Result<Vec<u8>, ModifierError> {
    let body = postcard::to_allocvec(msg)?;
    let mut out = Vec::with_capacity(1 + body.len());
    out.push(WIRE_VERSION);
    out.extend_from_slice(&body);
    Ok(out)
}

/// Deserialize a versioned binary payload into a [`WireMessage`].
pub fn deserialize_message(data: &[u8]) -> Result<WireMessage, ModifierError> {
    let (&version, body) = data.split_first().ok_or(ModifierError::EmptyPayload)?;
    if version != WIRE_VERSION {
        return Err(ModifierError::WireVersion(version));
    }
    Ok(postcard::from_bytes(body)?)
}

fn retain_known<T>(entries: &mut Vec<T>, category_count: usize, id: impl Fn(&T) -> CategoryId) -> usize {
    let before = entries.len();
    let mut seen = vec![false; category_count];
    entries.retain(|entry| {
        let index = usize::from(id(entry).0);
        match seen.get_mut(index) {
            Some(slot) if !*slot => {
                *slot = true;
                true
            }
            _ => false,
        }
    });
    before - entries.len()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bitset::LevelMask;

    fn request(tick: u64) -> RequestPayload {
        RequestPayload {
            tick,
            categories: vec![CategoryRequest {
                category: CategoryId(0),
                local_wanted: Some(PackedLevels::Mask(LevelMask(0b10))),
                correction_wanted: None,
                correction_active: Some(PackedLevels::Stack(vec![1, 1])),
                server_active: None,
            }],
        }
    }

    #[test]
    fn test_moves_roundtrip() {
        let msg = WireMessage::Moves(ServerMovePacket {
            new: Some(request(7)),
            pending: None,
            old: Some(request(3)),
            correction_seen: Some(2),
        });
        let bytes = serialize_message(&msg).unwrap();
        assert_eq!(bytes[0], WIRE_VERSION);
        assert_eq!(deserialize_message(&bytes).unwrap(), msg);
    }

    #[test]
    fn test_unsupported_version_rejected() {
        let mut bytes = serialize_message(&WireMessage::Ack { tick: 1 }).unwrap();
        bytes[0] = 9;
        assert!(matches!(
            deserialize_message(&bytes),
            Err(ModifierError::WireVersion(9))
        ));
    }

    #[test]
    fn test_empty_payload_rejected() {
        assert!(matches!(
            deserialize_message(&[]),
            Err(ModifierError::EmptyPayload)
        ));
    }

    #[test]
    fn test_corrupted_payload_rejected() {
        let result = deserialize_message(&[WIRE_VERSION, 0xFF, 0xFF, 0xFF]);
        assert!(matches!(result, Err(ModifierError::Postcard(_))));
    }

    #[test]
    fn test_empty_tier_costs_one_byte() {
        let empty = postcard::to_allocvec(&Some(PackedLevels::Mask(LevelMask::EMPTY))).unwrap();
        let absent = postcard::to_allocvec(&None::<PackedLevels>).unwrap();
        assert_eq!(absent.len(), 1);
        assert_eq!(empty.len(), 3);
    }

    #[test]
    fn test_packet_orders_by_tick() {
        let packet = ServerMovePacket {
            new: Some(request(9)),
            pending: Some(request(8)),
            old: Some(request(2)),
            correction_seen: None,
        };
        let ticks: Vec<u64> = packet.into_ordered().iter().map(|m| m.tick).collect();
        assert_eq!(ticks, vec![2, 8, 9]);
    }

    #[test]
    fn test_sanitize_drops_unknown_and_duplicate_categories() {
        let mut payload = request(1);
        let mut extra = payload.categories[0].clone();
        payload.categories.push(extra.clone());
        extra.category = CategoryId(40);
        payload.categories.push(extra);
        assert_eq!(payload.sanitize(2), 2);
        assert_eq!(payload.categories.len(), 1);
    }

    #[test]
    fn test_payload_serde_json_shape() {
        let json = serde_json::to_value(request(4)).unwrap();
        assert_eq!(json["tick"], 4);
        assert_eq!(json["categories"][0]["local_wanted"]["Mask"], 2);
    }
}
