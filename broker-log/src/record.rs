// On-disk record framing. The external layout describes a `.msg` file as
// "record payload (raw bytes)", but the consumer-facing handler contract
// is `(key, payload, partition, offset)` — the key has to survive the
// round trip through disk somehow. We frame it as a 4-byte little-endian
// key length followed by the key bytes, followed by the rest of the file
// as payload. A record with an empty key still has its length prefix (it's
// just zero), so decoding is unconditional.

/// A record as delivered to a consumer handler: the payload is opaque to
/// the core, the key exists only for routing and is handed back verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub partition: u32,
    pub offset: u64,
    pub key: Vec<u8>,
    pub payload: Vec<u8>,
}

pub(crate) fn encode(key: &[u8], payload: &[u8]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(4 + key.len() + payload.len());
    buf.extend_from_slice(&(key.len() as u32).to_le_bytes());
    buf.extend_from_slice(key);
    buf.extend_from_slice(payload);
    buf
}

pub(crate) fn decode(bytes: &[u8]) -> Option<(Vec<u8>, Vec<u8>)> {
    if bytes.len() < 4 {
        return None;
    }
    let key_len = u32::from_le_bytes(bytes[0..4].try_into().ok()?) as usize;
    if bytes.len() < 4 + key_len {
        return None;
    }
    let key = bytes[4..4 + key_len].to_vec();
    let payload = bytes[4 + key_len..].to_vec();
    Some((key, payload))
}
