//! # Signer Recovery (secp256k1)
//!
//! A signature counts toward quorum only if it recovers to the address that
//! claims it. Signers sign the proposal digest directly (no message prefix).
//!
//! ## Checks
//!
//! - `r` and `s` in `[1, n-1]`
//! - `s` strictly below `n/2` (EIP-2), compared in constant time
//! - recovery id `v` in `{0, 1, 27, 28}`

use k256::ecdsa::{RecoveryId, Signature as K256Signature, VerifyingKey};
use serde::{Deserialize, Serialize};
use sha3::{Digest, Keccak256};
use shared_types::{Address, Hash};
use subtle::{Choice, ConstantTimeEq};

use super::errors::SignatureError;

/// secp256k1 curve order n
const SECP256K1_ORDER: [u8; 32] = [
    0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFE,
    0xBA, 0xAE, 0xDC, 0xE6, 0xAF, 0x48, 0xA0, 0x3B, 0xBF, 0xD2, 0x5E, 0x8C, 0xD0, 0x36, 0x41, 0x41,
];

/// n/2
const SECP256K1_HALF_ORDER: [u8; 32] = [
    0x7F, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF,
    0x5D, 0x57, 0x6E, 0x73, 0x57, 0xA4, 0x50, 0x1D, 0xDF, 0xE9, 0x2F, 0x46, 0x68, 0x1B, 0x20, 0xA0,
];

/// Recoverable ECDSA signature over a proposal digest.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature {
    pub r: [u8; 32],
    pub s: [u8; 32],
    pub v: u8,
}

impl Signature {
    /// Parse the 65-byte `r || s || v` wire form.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, SignatureError> {
        if bytes.len() != 65 {
            return Err(SignatureError::InvalidLength(bytes.len()));
        }
        let mut r = [0u8; 32];
        let mut s = [0u8; 32];
        r.copy_from_slice(&bytes[..32]);
        s.copy_from_slice(&bytes[32..64]);
        Ok(Self { r, s, v: bytes[64] })
    }

    pub fn to_bytes(&self) -> [u8; 65] {
        let mut out = [0u8; 65];
        out[..32].copy_from_slice(&self.r);
        out[32..64].copy_from_slice(&self.s);
        out[64] = self.v;
        out
    }
}

/// Recover the address that produced `signature` over `digest`.
pub fn recover_signer(digest: &Hash, signature: &Signature) -> Result<Address, SignatureError> {
    if !is_valid_scalar(&signature.r) || !is_valid_scalar(&signature.s) {
        return Err(SignatureError::InvalidFormat);
    }
    if !is_low_s(&signature.s) {
        return Err(SignatureError::MalleableSignature);
    }
    let recovery_id = parse_recovery_id(signature.v)?;

    let mut sig_bytes = [0u8; 64];
    sig_bytes[..32].copy_from_slice(&signature.r);
    sig_bytes[32..].copy_from_slice(&signature.s);
    let sig = K256Signature::from_slice(&sig_bytes).map_err(|_| SignatureError::InvalidFormat)?;

    let key = VerifyingKey::recover_from_prehash(digest, &sig, recovery_id)
        .map_err(|_| SignatureError::RecoveryFailed)?;
    Ok(address_from_pubkey(&key))
}

/// Recover and compare against the claimed signer.
pub fn verify_signer(
    digest: &Hash,
    signature: &Signature,
    expected: Address,
) -> Result<(), SignatureError> {
    let recovered = recover_signer(digest, signature)?;
    if recovered != expected {
        return Err(SignatureError::SignerMismatch {
            expected,
            actual: recovered,
        });
    }
    Ok(())
}

pub fn keccak256(data: &[u8]) -> Hash {
    let mut hasher = Keccak256::new();
    hasher.update(data);
    let mut hash = [0u8; 32];
    hash.copy_from_slice(&hasher.finalize());
    hash
}

/// Ethereum-style address: last 20 bytes of keccak256 of the uncompressed key.
pub fn address_from_pubkey(public_key: &VerifyingKey) -> Address {
    let encoded = public_key.to_encoded_point(false);
    let hash = keccak256(&encoded.as_bytes()[1..]);
    let mut address = [0u8; 20];
    address.copy_from_slice(&hash[12..]);
    address
}

/// `s < n/2`, constant time.
fn is_low_s(s: &[u8; 32]) -> bool {
    ct_less_than(s, &SECP256K1_HALF_ORDER).into()
}

/// `0 < scalar < n`, constant time.
fn is_valid_scalar(scalar: &[u8; 32]) -> bool {
    let mut is_zero = Choice::from(1u8);
    for byte in scalar {
        is_zero &= byte.ct_eq(&0u8);
    }
    (!is_zero & ct_less_than(scalar, &SECP256K1_ORDER)).into()
}

/// Big-endian `a < b` without early exit.
fn ct_less_than(a: &[u8; 32], b: &[u8; 32]) -> Choice {
    let mut less = Choice::from(0u8);
    let mut greater = Choice::from(0u8);
    for (x, y) in a.iter().zip(b.iter()) {
        let undecided = !(less | greater);
        less |= undecided & Choice::from((x < y) as u8);
        greater |= undecided & Choice::from((x > y) as u8);
    }
    less
}

fn parse_recovery_id(v: u8) -> Result<RecoveryId, SignatureError> {
    let id = match v {
        0 | 27 => 0,
        1 | 28 => 1,
        _ => return Err(SignatureError::InvalidRecoveryId(v)),
    };
    RecoveryId::try_from(id).map_err(|_| SignatureError::InvalidRecoveryId(v))
}

#[cfg(any(test, feature = "test-helpers"))]
pub mod test_helpers {
    use super::*;
    use k256::ecdsa::SigningKey;

    /// Random key and its address.
    pub fn generate_signer() -> (SigningKey, Address) {
        let key = SigningKey::random(&mut rand::thread_rng());
        let address = address_from_pubkey(key.verifying_key());
        (key, address)
    }

    /// Sign a digest, normalized to low-s.
    pub fn sign(digest: &Hash, key: &SigningKey) -> Signature {
        let (sig, recid) = key
            .sign_prehash_recoverable(digest)
            .expect("signing failed");
        let (sig, recid) = match sig.normalize_s() {
            Some(normalized) => (
                normalized,
                RecoveryId::new(!recid.is_y_odd(), recid.is_x_reduced()),
            ),
            None => (sig, recid),
        };

        let bytes = sig.to_bytes();
        let mut r = [0u8; 32];
        let mut s = [0u8; 32];
        r.copy_from_slice(&bytes[..32]);
        s.copy_from_slice(&bytes[32..]);
        Signature {
            r,
            s,
            v: recid.to_byte() + 27,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_helpers::*;
    use super::*;

    #[test]
    fn test_recovers_signer() {
        let (key, address) = generate_signer();
        let digest = keccak256(b"proposal");
        let signature = sign(&digest, &key);

        assert_eq!(recover_signer(&digest, &signature), Ok(address));
        assert!(verify_signer(&digest, &signature, address).is_ok());
    }

    #[test]
    fn test_wrong_digest_recovers_other_address() {
        let (key, address) = generate_signer();
        let signature = sign(&keccak256(b"proposal"), &key);

        assert!(matches!(
            verify_signer(&keccak256(b"tampered"), &signature, address),
            Err(SignatureError::SignerMismatch { .. }) | Err(SignatureError::RecoveryFailed)
        ));
    }

    #[test]
    fn test_rejects_high_s() {
        let (key, _) = generate_signer();
        let digest = keccak256(b"proposal");
        let mut signature = sign(&digest, &key);
        signature.s = [0xFF; 32];
        assert!(recover_signer(&digest, &signature).is_err());

        signature.s = SECP256K1_HALF_ORDER;
        assert_eq!(
            recover_signer(&digest, &signature),
            Err(SignatureError::MalleableSignature)
        );
    }

    #[test]
    fn test_rejects_zero_scalars_and_bad_v() {
        let digest = keccak256(b"proposal");
        let zero = Signature {
            r: [0; 32],
            s: [1; 32],
            v: 27,
        };
        assert_eq!(
            recover_signer(&digest, &zero),
            Err(SignatureError::InvalidFormat)
        );

        let (key, _) = generate_signer();
        let mut signature = sign(&digest, &key);
        signature.v = 35;
        assert_eq!(
            recover_signer(&digest, &signature),
            Err(SignatureError::InvalidRecoveryId(35))
        );
    }

    #[test]
    fn test_wire_form() {
        let (key, _) = generate_signer();
        let signature = sign(&keccak256(b"wire"), &key);
        assert_eq!(Signature::from_bytes(&signature.to_bytes()), Ok(signature));
        assert_eq!(
            Signature::from_bytes(&[0u8; 64]),
            Err(SignatureError::InvalidLength(64))
        );
    }
}
