//! Resync tokens for the push channel.
//!
//! A client that loses its WebSocket re-attaches with the token it was handed
//! at attach time, then re-fetches the current snapshot; no event replay. The
//! token is an HMAC over the principal id: possession proves the bearer was
//! the principal the engine attached earlier, without another round-trip to
//! the external auth service.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::protocol::UserId;

type HmacSha256 = Hmac<Sha256>;

const MAC_LEN: usize = 32;

/// Issues and verifies resync tokens with a process-wide key.
pub struct ResyncTokens {
    key: Vec<u8>,
}

impl ResyncTokens {
    /// Key from config, or a random per-process key (which invalidates
    /// outstanding tokens on restart; acceptable outside production).
    pub fn new(configured_secret: Option<&str>) -> anyhow::Result<Self> {
        let key = match configured_secret {
            Some(secret) => secret.as_bytes().to_vec(),
            None => {
                let mut key = vec![0u8; 32];
                getrandom::fill(&mut key)
                    .map_err(|e| anyhow::anyhow!("no entropy source for resync key: {e}"))?;
                key
            }
        };
        Ok(Self { key })
    }

    /// Token = base64url(user_id bytes || HMAC(user_id bytes)).
    pub fn issue(&self, user_id: &UserId) -> String {
        let payload = user_id.as_bytes();
        let mac = self.mac_of(payload);
        let mut token = Vec::with_capacity(payload.len() + mac.len());
        token.extend_from_slice(payload);
        token.extend_from_slice(&mac);
        URL_SAFE_NO_PAD.encode(token)
    }

    /// Verify a token and recover the principal it was issued to.
    pub fn verify(&self, token: &str) -> Option<UserId> {
        let raw = URL_SAFE_NO_PAD.decode(token).ok()?;
        if raw.len() != 16 + MAC_LEN {
            return None;
        }
        let (payload, presented_mac) = raw.split_at(16);
        let expected_mac = self.mac_of(payload);
        // Constant-time comparison; a timing oracle here would let an
        // attacker forge attachment as another principal.
        if expected_mac.ct_eq(presented_mac).into() {
            UserId::from_slice(payload).ok()
        } else {
            None
        }
    }

    fn mac_of(&self, payload: &[u8]) -> [u8; MAC_LEN] {
        // SAFETY: HMAC accepts keys of any length.
        #[allow(clippy::expect_used)]
        let mut mac = HmacSha256::new_from_slice(&self.key).expect("HMAC accepts any key length");
        mac.update(payload);
        mac.finalize().into_bytes().into()
    }
}
