// src/utils/crypto.rs
//! secp256k1 key helpers (via the `k256` crate).
//!
//! DID keys are compared by their public halves. Resolvers hand those out as
//! compressed or uncompressed SEC1 hex, or as a JWK, so everything is normalised
//! to uncompressed SEC1 bytes before comparison.

use crate::error::{PublishError, Result};
use crate::models::did::PublicKeyJwk;
use k256::ecdsa::signature::Signer;
use k256::ecdsa::{Signature, SigningKey};
use k256::elliptic_curve::sec1::ToEncodedPoint;
use k256::{PublicKey, SecretKey};

/// Lowercase hex rendering used for key comparison.
pub fn public_key_hex(bytes: &[u8]) -> String {
    hex::encode(bytes)
}

/// Re-encodes any SEC1 public key as uncompressed bytes (`04 || x || y`).
pub fn normalize_public_key(sec1: &[u8]) -> Result<Vec<u8>> {
    let key = PublicKey::from_sec1_bytes(sec1)
        .map_err(|e| PublishError::InvalidKey(format!("bad SEC1 public key: {}", e).into()))?;
    Ok(key.to_encoded_point(false).as_bytes().to_vec())
}

/// Decodes a secp256k1 JWK into uncompressed SEC1 bytes.
pub fn public_key_from_jwk(jwk: &PublicKeyJwk) -> Result<Vec<u8>> {
    if jwk.kty != "EC" || jwk.crv != "secp256k1" {
        return Err(PublishError::InvalidKey(
            format!("unsupported JWK kty={} crv={}", jwk.kty, jwk.crv).into(),
        ));
    }
    let decode = |coord: &str| {
        base64::decode_config(coord, base64::URL_SAFE_NO_PAD)
            .map_err(|e| PublishError::InvalidKey(format!("bad JWK coordinate: {}", e).into()))
    };
    let (x, y) = (decode(&jwk.x)?, decode(&jwk.y)?);
    if x.len() != 32 || y.len() != 32 {
        return Err(PublishError::InvalidKey("JWK coordinates must be 32 bytes".into()));
    }
    let mut sec1 = Vec::with_capacity(65);
    sec1.push(0x04);
    sec1.extend_from_slice(&x);
    sec1.extend_from_slice(&y);
    normalize_public_key(&sec1)
}

/// Encodes uncompressed SEC1 bytes as a secp256k1 JWK.
pub fn public_key_to_jwk(sec1: &[u8]) -> Result<PublicKeyJwk> {
    let uncompressed = normalize_public_key(sec1)?;
    Ok(PublicKeyJwk {
        kty: "EC".to_string(),
        crv: "secp256k1".to_string(),
        x: base64::encode_config(&uncompressed[1..33], base64::URL_SAFE_NO_PAD),
        y: base64::encode_config(&uncompressed[33..65], base64::URL_SAFE_NO_PAD),
    })
}

fn secret_key(raw: &[u8]) -> Result<SecretKey> {
    if raw.len() != 32 {
        return Err(PublishError::InvalidKey(
            format!("secp256k1 private key must be 32 bytes, got {}", raw.len()).into(),
        ));
    }
    SecretKey::from_slice(raw)
        .map_err(|e| PublishError::InvalidKey(format!("bad private key: {}", e).into()))
}

/// Derives the uncompressed SEC1 public key of a raw 32-byte private key.
pub fn derive_public_key(raw: &[u8]) -> Result<Vec<u8>> {
    let public_key = secret_key(raw)?.public_key();
    Ok(public_key.to_encoded_point(false).as_bytes().to_vec())
}

/// ECDSA/secp256k1 (SHA-256, RFC 6979) signature in 64-byte compact form.
pub fn sign(raw: &[u8], message: &[u8]) -> Result<Vec<u8>> {
    let signing_key = SigningKey::from(&secret_key(raw)?);
    let signature: Signature = signing_key.sign(message);
    Ok(signature.to_bytes().to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;
    use k256::ecdsa::signature::Verifier;
    use k256::ecdsa::VerifyingKey;

    const SECRET: [u8; 32] = [7u8; 32];

    #[test]
    fn test_compressed_and_uncompressed_normalise_equal() {
        let uncompressed = derive_public_key(&SECRET).unwrap();
        let compressed = secret_key(&SECRET)
            .unwrap()
            .public_key()
            .to_encoded_point(true)
            .as_bytes()
            .to_vec();
        assert_eq!(compressed.len(), 33);
        assert_eq!(normalize_public_key(&compressed).unwrap(), uncompressed);
    }

    #[test]
    fn test_jwk_round_trips_through_sec1() {
        let public = derive_public_key(&SECRET).unwrap();
        let jwk = public_key_to_jwk(&public).unwrap();
        assert_eq!(public_key_from_jwk(&jwk).unwrap(), public);
    }

    #[test]
    fn test_rejects_wrong_curve_and_short_keys() {
        let jwk = PublicKeyJwk {
            kty: "OKP".into(),
            crv: "Ed25519".into(),
            x: "AA".into(),
            y: String::new(),
        };
        assert!(public_key_from_jwk(&jwk).is_err());
        assert!(derive_public_key(&[1, 2, 3]).is_err());
        assert!(normalize_public_key(&[0x04, 1, 2]).is_err());
    }

    #[test]
    fn test_signature_verifies_with_derived_key() {
        let signature = sign(&SECRET, b"anchor").unwrap();
        let verifying_key = VerifyingKey::from_sec1_bytes(&derive_public_key(&SECRET).unwrap()).unwrap();
        let signature = Signature::from_slice(&signature).unwrap();
        assert!(verifying_key.verify(b"anchor", &signature).is_ok());
    }

    #[test]
    fn test_random_keys_sign_and_verify() {
        for _ in 0..8 {
            let raw = SecretKey::random(&mut rand::thread_rng()).to_bytes().to_vec();
            let public = derive_public_key(&raw).unwrap();
            assert_eq!(public.len(), 65);
            let verifying_key = VerifyingKey::from_sec1_bytes(&public).unwrap();
            let signature = Signature::from_slice(&sign(&raw, b"msg").unwrap()).unwrap();
            assert!(verifying_key.verify(b"msg", &signature).is_ok());
        }
    }

    #[test]
    fn test_hex_is_lowercase() {
        assert_eq!(public_key_hex(&[0x01, 0xAB, 0x02, 0xCD]), "01ab02cd");
    }
}
