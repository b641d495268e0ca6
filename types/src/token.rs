use bytes::{Buf, BufMut, BytesMut};
use thiserror::Error;
use uuid::Uuid;

use crate::{AccountId, Tier, MAX_THROWS};

/// Layout version prefix. Bump when the wire layout changes.
const TOKEN_VERSION: u8 = 1;

/// Encoded token length in bytes: version + beneficiary + throws + tier + nonce.
const TOKEN_LEN: usize = 1 + 8 + 1 + 1 + 16;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TokenError {
    #[error("token is not valid hex")]
    InvalidEncoding,
    #[error("token has wrong length: {0}")]
    WrongLength(usize),
    #[error("unknown token version: {0}")]
    UnknownVersion(u8),
    #[error("invalid tier byte: {0}")]
    InvalidTier(u8),
    #[error("throw count out of range: {0}")]
    InvalidThrows(u8),
}

/// Session parameters carried through the external payment round trip.
///
/// Encoded as an opaque hex string; the nonce makes every issued token unique
/// and single-use. The token must survive pre-authorization and confirmation
/// byte-for-byte, so the layout is fixed-width and versioned.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PaymentToken {
    pub beneficiary: AccountId,
    pub throws: u8,
    pub tier: Tier,
    pub nonce: Uuid,
}

impl PaymentToken {
    /// Build a token with a fresh random nonce.
    pub fn new(beneficiary: AccountId, throws: u8, tier: Tier) -> Self {
        Self {
            beneficiary,
            throws,
            tier,
            nonce: Uuid::new_v4(),
        }
    }

    /// Encode into the opaque string handed to the payment subsystem.
    pub fn encode(&self) -> String {
        let mut buf = BytesMut::with_capacity(TOKEN_LEN);
        buf.put_u8(TOKEN_VERSION);
        buf.put_i64(self.beneficiary);
        buf.put_u8(self.throws);
        buf.put_u8(self.tier as u8);
        buf.put_slice(self.nonce.as_bytes());
        hex::encode(buf)
    }

    /// Decode a confirmation payload back into session parameters.
    pub fn decode(token: &str) -> Result<Self, TokenError> {
        let bytes = hex::decode(token).map_err(|_| TokenError::InvalidEncoding)?;
        if bytes.len() != TOKEN_LEN {
            return Err(TokenError::WrongLength(bytes.len()));
        }
        let mut reader = &bytes[..];
        let version = reader.get_u8();
        if version != TOKEN_VERSION {
            return Err(TokenError::UnknownVersion(version));
        }
        let beneficiary = reader.get_i64();
        let throws = reader.get_u8();
        if throws == 0 || throws > MAX_THROWS {
            return Err(TokenError::InvalidThrows(throws));
        }
        let tier_byte = reader.get_u8();
        let tier = Tier::from_u8(tier_byte).ok_or(TokenError::InvalidTier(tier_byte))?;
        let mut nonce = [0u8; 16];
        reader.copy_to_slice(&mut nonce);
        Ok(Self {
            beneficiary,
            throws,
            tier,
            nonce: Uuid::from_bytes(nonce),
        })
    }
}
