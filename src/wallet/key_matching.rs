// src/wallet/key_matching.rs
//! Locates the private key that controls a DID.
//!
//! A DID is anchored with the key behind its `#master` verification method. The
//! wallet only knows the DID's private keys, so every stored key is turned into
//! its public half and compared against the master method's public key as
//! lowercase hex.

use crate::error::{PublishError, Result};
use crate::models::did::{DidDocument, PrivateKeyHandle, VerificationMethod};
use crate::utils::crypto::public_key_hex;

/// Returns the master verification method of `document`.
///
/// # Errors
/// `NoMasterKey` if no method id contains `#master`.
pub fn find_master_method(document: &DidDocument) -> Result<&VerificationMethod> {
    document
        .verification_method
        .iter()
        .find(|vm| vm.is_master())
        .ok_or_else(|| PublishError::NoMasterKey(document.id.clone()))
}

/// Finds the handle in `keys` whose public key equals `target_public_key`.
///
/// `derive_public_key` is the key task turning a private key into public key
/// bytes in the same encoding as `target_public_key`. A key that fails to derive
/// is skipped, it cannot be the master key.
///
/// # Errors
/// `NoMatchingSecret` when no key matches.
pub fn match_master_key<'a, F>(
    did: &str,
    target_public_key: &[u8],
    keys: &'a [PrivateKeyHandle],
    mut derive_public_key: F,
) -> Result<&'a PrivateKeyHandle>
where
    F: FnMut(&PrivateKeyHandle) -> Result<Vec<u8>>,
{
    let target = public_key_hex(target_public_key);
    for key in keys {
        match derive_public_key(key) {
            Ok(public_key) if public_key_hex(&public_key) == target => {
                log::debug!("matched master key {} (index {}) for {}", key.uuid, key.index, did);
                return Ok(key);
            }
            Ok(_) => {}
            Err(e) => log::debug!("skipping key {} of {}: {}", key.uuid, did, e),
        }
    }
    Err(PublishError::NoMatchingSecret(did.to_string()))
}
