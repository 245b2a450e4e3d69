//! Room tokens: scoped credentials for a spawned game server.
//!
//! A room token proves that one player may join one room's game server.
//! It is a signed, self-describing string:
//!
//! ```text
//! base64url(claims JSON) "." hex(HMAC-SHA256(key, base64url part))
//! ```
//!
//! The lobby side ([`TokenAuthority`]) holds one fresh signing key per
//! spawn attempt and remembers the single live issuance for every
//! (room, player) pair. The game-server side ([`TokenVerifier`]) only
//! receives its own room's key through the process handoff, and enforces
//! that each token opens at most one connection.
//!
//! Expiry uses wall-clock Unix milliseconds because tokens are checked
//! in a different process than the one that issued them. Every method
//! that looks at the clock has an `_at` variant taking `now_ms`, which
//! is what the tests use.

use std::collections::{HashMap, HashSet};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use hmac::{Hmac, Mac};
use parlor_protocol::{PlayerId, RoomId};
use rand::Rng;
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use crate::TokenError;

type HmacSha256 = Hmac<Sha256>;

/// Current wall-clock time in Unix milliseconds.
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

// ---------------------------------------------------------------------------
// Configuration and value types
// ---------------------------------------------------------------------------

/// Token lifetime settings.
#[derive(Debug, Clone)]
pub struct TokenConfig {
    /// How long an unused token stays valid after issuance.
    ///
    /// Default: 60 seconds. Zero makes every token expire immediately.
    pub ttl: Duration,
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(60),
        }
    }
}

/// A 256-bit HMAC key.
#[derive(Clone, PartialEq, Eq)]
pub struct SigningKey([u8; 32]);

impl SigningKey {
    /// Generates a new random key.
    pub fn generate() -> Self {
        Self(rand::rng().random())
    }

    /// Hex encoding, as carried in the process handoff.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parses a hex-encoded key.
    pub fn from_hex(s: &str) -> Result<Self, TokenError> {
        let bytes =
            hex::decode(s).map_err(|e| TokenError::InvalidKey(e.to_string()))?;
        let key: [u8; 32] = bytes.try_into().map_err(|v: Vec<u8>| {
            TokenError::InvalidKey(format!("expected 32 bytes, got {}", v.len()))
        })?;
        Ok(Self(key))
    }

    fn mac(&self) -> HmacSha256 {
        // HMAC accepts keys of any length; 32 bytes can never fail.
        <HmacSha256 as Mac>::new_from_slice(&self.0)
            .unwrap_or_else(|_| unreachable!("HMAC accepts any key length"))
    }
}

impl std::fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SigningKey(..)")
    }
}

/// An issued room token. Opaque to clients.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomToken(String);

impl RoomToken {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

/// What a valid token grants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenGrant {
    pub room_id: RoomId,
    pub player_id: PlayerId,
    pub expires_at_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Claims {
    room: RoomId,
    player: PlayerId,
    nonce: String,
    iat: u64,
    exp: u64,
}

// ---------------------------------------------------------------------------
// Signing helpers
// ---------------------------------------------------------------------------

fn sign(key: &SigningKey, claims: &Claims) -> RoomToken {
    // Claims are plain ids and strings; serializing them cannot fail.
    let json = serde_json::to_vec(claims).unwrap_or_default();
    let body = URL_SAFE_NO_PAD.encode(json);
    let mut mac = key.mac();
    mac.update(body.as_bytes());
    let sig = hex::encode(mac.finalize().into_bytes());
    RoomToken(format!("{body}.{sig}"))
}

/// Splits a token and decodes its claims without checking the signature.
fn parse(token: &str) -> Result<(&str, Vec<u8>, Claims), TokenError> {
    let (body, sig_hex) = token.split_once('.').ok_or(TokenError::Unknown)?;
    let sig = hex::decode(sig_hex).map_err(|_| TokenError::Unknown)?;
    let json = URL_SAFE_NO_PAD
        .decode(body)
        .map_err(|_| TokenError::Unknown)?;
    let claims: Claims =
        serde_json::from_slice(&json).map_err(|_| TokenError::Unknown)?;
    Ok((body, sig, claims))
}

fn verify(key: &SigningKey, body: &str, sig: &[u8]) -> Result<(), TokenError> {
    let mut mac = key.mac();
    mac.update(body.as_bytes());
    mac.verify_slice(sig).map_err(|_| TokenError::Unknown)
}

fn new_nonce() -> String {
    let bytes: [u8; 16] = rand::rng().random();
    hex::encode(bytes)
}

// ---------------------------------------------------------------------------
// TokenAuthority (lobby side)
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct Issuance {
    nonce: String,
    expires_at_ms: u64,
    consumed: bool,
}

#[derive(Debug)]
struct Keyring {
    key: SigningKey,
    issued: HashMap<PlayerId, Issuance>,
    revoked: bool,
}

/// Issues room tokens and tracks the one live token per (room, player).
///
/// Process-wide state of the lobby. Like the session manager it is not
/// thread-safe by itself; the lobby serializes access with a mutex.
#[derive(Debug)]
pub struct TokenAuthority {
    config: TokenConfig,
    rooms: HashMap<RoomId, Keyring>,
}

impl TokenAuthority {
    pub fn new(config: TokenConfig) -> Self {
        Self {
            config,
            rooms: HashMap::new(),
        }
    }

    /// Installs a fresh signing key for a room's next spawn attempt and
    /// returns it for the process handoff.
    ///
    /// Any tokens from an earlier attempt stop validating.
    pub fn register_room(&mut self, room_id: RoomId) -> SigningKey {
        let key = SigningKey::generate();
        self.rooms.insert(
            room_id,
            Keyring {
                key: key.clone(),
                issued: HashMap::new(),
                revoked: false,
            },
        );
        tracing::debug!(%room_id, "room signing key registered");
        key
    }

    /// Issues a token for `player_id` in `room_id`.
    ///
    /// A previous token for the same pair is invalidated: there is never
    /// more than one live token per player per room.
    pub fn issue_token(
        &mut self,
        room_id: RoomId,
        player_id: PlayerId,
    ) -> Result<RoomToken, TokenError> {
        self.issue_token_at(room_id, player_id, now_ms())
    }

    pub fn issue_token_at(
        &mut self,
        room_id: RoomId,
        player_id: PlayerId,
        now_ms: u64,
    ) -> Result<RoomToken, TokenError> {
        let ttl_ms = self.config.ttl.as_millis() as u64;
        let ring = self
            .rooms
            .get_mut(&room_id)
            .filter(|r| !r.revoked)
            .ok_or(TokenError::RoomNotRegistered(room_id))?;

        let claims = Claims {
            room: room_id,
            player: player_id,
            nonce: new_nonce(),
            iat: now_ms,
            exp: now_ms.saturating_add(ttl_ms),
        };
        let token = sign(&ring.key, &claims);

        let replaced = ring.issued.insert(
            player_id,
            Issuance {
                nonce: claims.nonce,
                expires_at_ms: claims.exp,
                consumed: false,
            },
        );
        tracing::debug!(
            %room_id,
            %player_id,
            reissued = replaced.is_some(),
            "room token issued"
        );
        Ok(token)
    }

    /// Checks a token without using it up.
    pub fn validate(&self, token: &str) -> Result<TokenGrant, TokenError> {
        self.validate_at(token, now_ms())
    }

    pub fn validate_at(
        &self,
        token: &str,
        now_ms: u64,
    ) -> Result<TokenGrant, TokenError> {
        let (body, sig, claims) = parse(token)?;
        let ring = self.rooms.get(&claims.room).ok_or(TokenError::Unknown)?;
        verify(&ring.key, body, &sig)?;

        let live = ring
            .issued
            .get(&claims.player)
            .filter(|i| i.nonce == claims.nonce);

        if ring.revoked || live.is_some_and(|i| i.consumed) {
            return Err(TokenError::Revoked);
        }
        if now_ms >= claims.exp {
            return Err(TokenError::Expired);
        }
        // Signed by us but no longer the live issuance: superseded.
        if live.is_none() {
            return Err(TokenError::Revoked);
        }

        Ok(TokenGrant {
            room_id: claims.room,
            player_id: claims.player,
            expires_at_ms: claims.exp,
        })
    }

    /// Validates a token and marks it used, so it can never open a
    /// second connection.
    pub fn consume(&mut self, token: &str) -> Result<TokenGrant, TokenError> {
        self.consume_at(token, now_ms())
    }

    pub fn consume_at(
        &mut self,
        token: &str,
        now_ms: u64,
    ) -> Result<TokenGrant, TokenError> {
        let grant = self.validate_at(token, now_ms)?;
        if let Some(issuance) = self
            .rooms
            .get_mut(&grant.room_id)
            .and_then(|r| r.issued.get_mut(&grant.player_id))
        {
            issuance.consumed = true;
        }
        Ok(grant)
    }

    /// Revokes every token of a room. Used when the room closes.
    ///
    /// Returns how many issuances were live.
    pub fn revoke_room(&mut self, room_id: RoomId) -> usize {
        match self.rooms.get_mut(&room_id) {
            Some(ring) if !ring.revoked => {
                ring.revoked = true;
                let count = ring.issued.len();
                ring.issued.clear();
                tracing::debug!(%room_id, count, "room tokens revoked");
                count
            }
            _ => 0,
        }
    }

    /// Drops expired, unused issuances and fully revoked rooms.
    ///
    /// Returns the number of issuances removed.
    pub fn expire_stale(&mut self) -> usize {
        self.expire_stale_at(now_ms())
    }

    pub fn expire_stale_at(&mut self, now_ms: u64) -> usize {
        let mut removed = 0;
        for ring in self.rooms.values_mut() {
            let before = ring.issued.len();
            ring.issued
                .retain(|_, i| i.consumed || i.expires_at_ms > now_ms);
            removed += before - ring.issued.len();
        }
        self.rooms.retain(|_, r| !r.revoked);
        removed
    }

    /// Returns `true` if `room_id` has a usable signing key.
    pub fn is_registered(&self, room_id: RoomId) -> bool {
        self.rooms.get(&room_id).is_some_and(|r| !r.revoked)
    }
}

impl Default for TokenAuthority {
    fn default() -> Self {
        Self::new(TokenConfig::default())
    }
}

// ---------------------------------------------------------------------------
// TokenVerifier (game-server side)
// ---------------------------------------------------------------------------

/// Validates tokens inside a spawned game server.
///
/// It knows only its own room and that room's key. Every token signed
/// with the key was issued by the lobby for this spawn attempt; a token
/// is accepted once and then reported as [`TokenError::Revoked`].
#[derive(Debug)]
pub struct TokenVerifier {
    room_id: RoomId,
    key: SigningKey,
    /// Consumed nonces, kept for the life of the game server.
    consumed: HashSet<String>,
}

impl TokenVerifier {
    pub fn new(room_id: RoomId, key: SigningKey) -> Self {
        Self {
            room_id,
            key,
            consumed: HashSet::new(),
        }
    }

    /// Builds a verifier from a hex key received in the process handoff.
    pub fn from_hex(room_id: RoomId, key_hex: &str) -> Result<Self, TokenError> {
        Ok(Self::new(room_id, SigningKey::from_hex(key_hex)?))
    }

    pub fn validate(&self, token: &str) -> Result<TokenGrant, TokenError> {
        self.validate_at(token, now_ms())
    }

    pub fn validate_at(
        &self,
        token: &str,
        now_ms: u64,
    ) -> Result<TokenGrant, TokenError> {
        let (body, sig, claims) = parse(token)?;
        verify(&self.key, body, &sig)?;
        if claims.room != self.room_id {
            return Err(TokenError::Unknown);
        }
        if self.consumed.contains(&claims.nonce) {
            return Err(TokenError::Revoked);
        }
        if now_ms >= claims.exp {
            return Err(TokenError::Expired);
        }
        Ok(TokenGrant {
            room_id: claims.room,
            player_id: claims.player,
            expires_at_ms: claims.exp,
        })
    }

    /// Accepts a handshake token exactly once.
    pub fn consume(&mut self, token: &str) -> Result<TokenGrant, TokenError> {
        self.consume_at(token, now_ms())
    }

    pub fn consume_at(
        &mut self,
        token: &str,
        now_ms: u64,
    ) -> Result<TokenGrant, TokenError> {
        let grant = self.validate_at(token, now_ms)?;
        // The nonce is only reachable through a verified token, so
        // parsing again cannot fail here.
        let (_, _, claims) = parse(token)?;
        self.consumed.insert(claims.nonce);
        Ok(grant)
    }
}

// =========================================================================
// Tests
// =========================================================================
