//! Versioned CBOR codec for persisted engine state.
//!
//! Every blob is a CBOR map `{ "v": <u16>, "body": <state> }`. The version is
//! checked before the body is decoded so an old build refuses a newer blob
//! instead of misreading it.

use crate::error::{ProtocolError, ProtocolResult};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// State format version written by this build.
pub const STATE_FORMAT_VERSION: u16 = 1;

#[derive(Serialize)]
struct EnvelopeRef<'a, T> {
    v: u16,
    body: &'a T,
}

#[derive(Deserialize)]
struct Envelope<T> {
    #[allow(dead_code)]
    v: u16,
    body: T,
}

#[derive(Deserialize)]
struct VersionHeader {
    v: u16,
}

/// Encodes `state` into a versioned CBOR blob.
pub fn encode_state<T: Serialize>(state: &T) -> ProtocolResult<Vec<u8>> {
    let envelope = EnvelopeRef {
        v: STATE_FORMAT_VERSION,
        body: state,
    };
    let mut buf = Vec::new();
    ciborium::into_writer(&envelope, &mut buf).map_err(|e| ProtocolError::Encode(e.to_string()))?;
    Ok(buf)
}

/// Decodes a blob produced by [`encode_state`].
pub fn decode_state<T: DeserializeOwned>(bytes: &[u8]) -> ProtocolResult<T> {
    let header: VersionHeader =
        ciborium::from_reader(bytes).map_err(|e| ProtocolError::Decode(e.to_string()))?;
    if header.v != STATE_FORMAT_VERSION {
        return Err(ProtocolError::UnsupportedVersion {
            found: header.v,
            expected: STATE_FORMAT_VERSION,
        });
    }

    let envelope: Envelope<T> =
        ciborium::from_reader(bytes).map_err(|e| ProtocolError::Decode(e.to_string()))?;
    Ok(envelope.body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pending::PendingWrite;
    use serde_json::json;

    #[test]
    fn pending_writes_survive_encoding() {
        let payload = json!({"id": "s1", "name": "A", "score": 3.5, "tags": ["x"], "n": -2})
            .as_object()
            .cloned()
            .unwrap();
        let writes = vec![PendingWrite::new("students", "s1", payload)];

        let bytes = encode_state(&writes).unwrap();
        let decoded: Vec<PendingWrite> = decode_state(&bytes).unwrap();
        assert_eq!(decoded, writes);
    }

    #[test]
    fn rejects_future_version() {
        let mut buf = Vec::new();
        ciborium::into_writer(
            &EnvelopeRef {
                v: STATE_FORMAT_VERSION + 1,
                body: &Vec::<u8>::new(),
            },
            &mut buf,
        )
        .unwrap();

        let result: ProtocolResult<Vec<u8>> = decode_state(&buf);
        assert!(matches!(
            result,
            Err(ProtocolError::UnsupportedVersion { found: 2, expected: 1 })
        ));
    }

    #[test]
    fn rejects_garbage() {
        let result: ProtocolResult<Vec<PendingWrite>> = decode_state(&[0xff, 0x00, 0x13]);
        assert!(matches!(result, Err(ProtocolError::Decode(_))));
    }
}
