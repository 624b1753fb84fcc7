//! Capability tokens that hand a client over from the master to a node
//!
//! The master seals `{user_id, room_id, issued_at}` under the key the node sent
//! when it registered. The node opens the token with the same key and checks
//! that the room inside matches the room the client asked for. No call back to
//! the master is needed.
//!
//! Token layout: `nonce (12 bytes) || ChaCha20-Poly1305 ciphertext || tag (16 bytes)`.
//! A fresh random nonce is drawn for every token. The authentication tag makes
//! a token opened under the wrong key, or a tampered token, fail outright
//! instead of decoding into a plausible capability.

use crate::utils::{get_timestamp, timestamp_distance};
use crate::{RoomId, UserId};
use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

pub const KEY_LEN: usize = 32;
pub const NONCE_LEN: usize = 12;
pub const TAG_LEN: usize = 16;

#[derive(Debug, Error)]
pub enum HandoffError {
    #[error("unable to gather randomness: {0}")]
    Randomness(#[from] rand::Error),
    #[error("invalid key length {0}, expected {KEY_LEN}")]
    InvalidKeyLength(usize),
    #[error("token too short ({0} bytes)")]
    TokenTooShort(usize),
    #[error("failed to encode capability: {0}")]
    Encode(bincode::Error),
    #[error("failed to encrypt capability")]
    Encrypt,
    #[error("token failed to decrypt")]
    Decrypt,
    #[error("capability is malformed")]
    Malformed,
    #[error("capability is for room {actual}, not {expected}")]
    RoomMismatch { expected: RoomId, actual: RoomId },
    #[error("capability is outside the accepted age window ({age_ms} ms)")]
    Expired { age_ms: u64 },
    #[error("no handoff key is available")]
    NoKey,
}

/// Symmetric key shared between the master and exactly one node connection
#[derive(Clone, PartialEq, Eq)]
pub struct HandoffKey([u8; KEY_LEN]);

impl HandoffKey {
    /// Draws a fresh key from the operating system's CSPRNG
    pub fn generate() -> Result<Self, HandoffError> {
        let mut bytes = [0u8; KEY_LEN];
        OsRng.try_fill_bytes(&mut bytes)?;
        Ok(Self(bytes))
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, HandoffError> {
        let key: [u8; KEY_LEN] = bytes
            .try_into()
            .map_err(|_| HandoffError::InvalidKeyLength(bytes.len()))?;
        Ok(Self(key))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for HandoffKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("HandoffKey(..)")
    }
}

/// Plaintext content of a handoff token
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub struct HandoffCapability {
    pub user_id: UserId,
    pub room_id: RoomId,
    /// Issuance time in unix milliseconds
    pub issued_at: u64,
}

impl HandoffCapability {
    pub fn new(user_id: UserId, room_id: RoomId) -> Self {
        Self {
            user_id,
            room_id,
            issued_at: get_timestamp(),
        }
    }
}

/// Seals and opens handoff tokens under one node key
///
/// `max_age` is off by default: the issuance timestamp is carried but not
/// checked. When set, tokens whose timestamp is further than `max_age` from the
/// node's clock, in either direction, are rejected.
#[derive(Clone)]
pub struct HandoffCodec {
    cipher: ChaCha20Poly1305,
    max_age: Option<Duration>,
}

impl HandoffCodec {
    pub fn new(key: &HandoffKey) -> Self {
        Self {
            cipher: ChaCha20Poly1305::new(Key::from_slice(key.as_bytes())),
            max_age: None,
        }
    }

    pub fn with_max_age(mut self, max_age: Option<Duration>) -> Self {
        self.max_age = max_age;
        self
    }

    pub fn max_age(&self) -> Option<Duration> {
        self.max_age
    }

    /// Mints a token for `user_id` to enter `room_id`, stamped with the current time
    pub fn issue(&self, user_id: UserId, room_id: RoomId) -> Result<Vec<u8>, HandoffError> {
        self.seal(&HandoffCapability::new(user_id, room_id))
    }

    pub fn seal(&self, capability: &HandoffCapability) -> Result<Vec<u8>, HandoffError> {
        let plaintext = bincode::serialize(capability).map_err(HandoffError::Encode)?;

        let mut nonce = [0u8; NONCE_LEN];
        OsRng.try_fill_bytes(&mut nonce)?;

        let ciphertext = self
            .cipher
            .encrypt(Nonce::from_slice(&nonce), plaintext.as_slice())
            .map_err(|_| HandoffError::Encrypt)?;

        let mut token = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        token.extend_from_slice(&nonce);
        token.extend_from_slice(&ciphertext);
        Ok(token)
    }

    /// Decrypts a token without checking which room it was issued for
    pub fn open(&self, token: &[u8]) -> Result<HandoffCapability, HandoffError> {
        if token.len() < NONCE_LEN + TAG_LEN {
            return Err(HandoffError::TokenTooShort(token.len()));
        }

        let (nonce, ciphertext) = token.split_at(NONCE_LEN);
        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| HandoffError::Decrypt)?;

        bincode::deserialize(&plaintext).map_err(|_| HandoffError::Malformed)
    }

    /// Opens a token presented for `room_id` and returns the capability it carries
    ///
    /// Every failure means the same thing to the caller: the client is not
    /// allowed in. The variants only exist for the node's own logs.
    pub fn verify(
        &self,
        room_id: RoomId,
        token: &[u8],
    ) -> Result<HandoffCapability, HandoffError> {
        let capability = self.open(token)?;

        if capability.room_id != room_id {
            return Err(HandoffError::RoomMismatch {
                expected: room_id,
                actual: capability.room_id,
            });
        }

        if let Some(max_age) = self.max_age {
            let age = timestamp_distance(get_timestamp(), capability.issued_at);
            if age > max_age {
                return Err(HandoffError::Expired {
                    age_ms: age.as_millis() as u64,
                });
            }
        }

        Ok(capability)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::{assert_err, assert_ok};

    fn codec() -> (HandoffKey, HandoffCodec) {
        let key = HandoffKey::generate().unwrap();
        let codec = HandoffCodec::new(&key);
        (key, codec)
    }

    #[test]
    fn test_round_trip_preserves_identity() {
        let (_, codec) = codec();
        let before = get_timestamp();

        let token = codec.issue(17, 4242).unwrap();
        let capability = codec.verify(4242, &token).unwrap();

        assert_eq!(capability.user_id, 17);
        assert_eq!(capability.room_id, 4242);
        assert!(capability.issued_at >= before);
    }

    #[test]
    fn test_same_key_on_both_sides() {
        let key = HandoffKey::generate().unwrap();
        let master_side = HandoffCodec::new(&key);
        let node_side = HandoffCodec::new(&HandoffKey::from_bytes(key.as_bytes()).unwrap());

        let token = master_side.issue(1, 2).unwrap();
        let capability = node_side.verify(2, &token).unwrap();
        assert_eq!(capability.user_id, 1);
    }

    #[test]
    fn test_wrong_key_always_fails() {
        let (_, master_side) = codec();

        for user_id in 0..64 {
            let token = master_side.issue(user_id, 9).unwrap();
            let (_, other) = codec();
            assert!(matches!(other.open(&token), Err(HandoffError::Decrypt)));
        }
    }

    #[test]
    fn test_room_mismatch_rejected() {
        let (_, codec) = codec();
        let token = codec.issue(5, 100).unwrap();

        match codec.verify(101, &token) {
            Err(HandoffError::RoomMismatch { expected, actual }) => {
                assert_eq!(expected, 101);
                assert_eq!(actual, 100);
            }
            other => panic!("Expected room mismatch, got {:?}", other),
        }
    }

    #[test]
    fn test_fresh_nonce_per_token() {
        let (_, codec) = codec();
        let capability = HandoffCapability {
            user_id: 1,
            room_id: 1,
            issued_at: 1_000,
        };

        let first = codec.seal(&capability).unwrap();
        let second = codec.seal(&capability).unwrap();

        assert_ne!(first[..NONCE_LEN], second[..NONCE_LEN]);
        assert_ne!(first, second);
    }

    #[test]
    fn test_short_token_rejected() {
        let (_, codec) = codec();
        assert!(matches!(
            codec.open(&[0u8; NONCE_LEN]),
            Err(HandoffError::TokenTooShort(NONCE_LEN))
        ));
        assert!(matches!(
            codec.open(&[]),
            Err(HandoffError::TokenTooShort(0))
        ));
    }

    #[test]
    fn test_tampered_token_rejected() {
        let (_, codec) = codec();
        let mut token = codec.issue(3, 3).unwrap();
        let last = token.len() - 1;
        token[last] ^= 0x01;
        assert!(matches!(codec.open(&token), Err(HandoffError::Decrypt)));

        let mut token = codec.issue(3, 3).unwrap();
        token[NONCE_LEN] ^= 0x80;
        assert_err!(codec.verify(3, &token));
    }

    #[test]
    fn test_max_age_disabled_by_default() {
        let (_, codec) = codec();
        assert!(codec.max_age().is_none());

        let stale = HandoffCapability {
            user_id: 1,
            room_id: 8,
            issued_at: 0,
        };
        let token = codec.seal(&stale).unwrap();
        assert_ok!(codec.verify(8, &token));
    }

    #[test]
    fn test_max_age_rejects_stale_and_future_tokens() {
        let (_, codec) = codec();
        let codec = codec.with_max_age(Some(Duration::from_secs(60)));

        let stale = HandoffCapability {
            user_id: 1,
            room_id: 8,
            issued_at: get_timestamp() - 10 * 60 * 1000,
        };
        let token = codec.seal(&stale).unwrap();
        assert!(matches!(
            codec.verify(8, &token),
            Err(HandoffError::Expired { .. })
        ));

        let future = HandoffCapability {
            user_id: 1,
            room_id: 8,
            issued_at: get_timestamp() + 10 * 60 * 1000,
        };
        let token = codec.seal(&future).unwrap();
        assert_err!(codec.verify(8, &token));

        let token = codec.issue(1, 8).unwrap();
        assert_ok!(codec.verify(8, &token));
    }

    #[test]
    fn test_key_length_validation() {
        assert!(matches!(
            HandoffKey::from_bytes(&[0u8; 24]),
            Err(HandoffError::InvalidKeyLength(24))
        ));
        assert_ok!(HandoffKey::from_bytes(&[0u8; KEY_LEN]));
    }

    #[test]
    fn test_generated_keys_differ() {
        let a = HandoffKey::generate().unwrap();
        let b = HandoffKey::generate().unwrap();
        assert_ne!(a, b);
        assert_eq!(format!("{:?}", a), "HandoffKey(..)");
    }
}
