//! Reversible obfuscation for secrets at rest.
//!
//! This is NOT encryption. The pad is a constant compiled into the binary,
//! so anyone with the store file and this source can recover every value.
//! It only keeps credentials from showing up verbatim in the database file,
//! in backups or in a casual `SELECT`. Hosts that need real protection should
//! put the store on an encrypted volume.

use crate::error::{StoreError, StoreResult};

/// Prefix marking values written by [`obfuscate`]. Bumped if the scheme changes.
pub const OBFUSCATION_PREFIX: &str = "obf1:";

const PAD: &[u8] = b"marginalia/plugin-store/secrets";

fn apply_pad(bytes: &[u8]) -> Vec<u8> {
    bytes
        .iter()
        .enumerate()
        .map(|(i, b)| b ^ PAD[i % PAD.len()] ^ (i as u8).wrapping_mul(31))
        .collect()
}

/// Encodes a secret for storage.
pub fn obfuscate(plain: &str) -> String {
    format!("{OBFUSCATION_PREFIX}{}", hex::encode(apply_pad(plain.as_bytes())))
}

/// Decodes a value produced by [`obfuscate`].
pub fn deobfuscate(stored: &str) -> StoreResult<String> {
    let body = stored
        .strip_prefix(OBFUSCATION_PREFIX)
        .ok_or_else(|| StoreError::InvalidData("missing obfuscation prefix".into()))?;
    let bytes = hex::decode(body)
        .map_err(|e| StoreError::InvalidData(format!("bad secret encoding: {e}")))?;
    String::from_utf8(apply_pad(&bytes))
        .map_err(|e| StoreError::InvalidData(format!("secret is not UTF-8: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn roundtrip() {
        let stored = obfuscate("secret123");
        assert_eq!(deobfuscate(&stored).unwrap(), "secret123");
    }

    #[test]
    fn stored_form_differs_from_plaintext() {
        let stored = obfuscate("secret123");
        assert_ne!(stored, "secret123");
        assert!(!stored.contains("secret123"));
        assert!(stored.starts_with(OBFUSCATION_PREFIX));
    }

    #[test]
    fn empty_secret() {
        assert_eq!(deobfuscate(&obfuscate("")).unwrap(), "");
    }

    #[test]
    fn plaintext_is_rejected() {
        assert!(deobfuscate("secret123").is_err());
    }

    #[test]
    fn corrupt_hex_is_rejected() {
        assert!(deobfuscate("obf1:zz").is_err());
        assert!(deobfuscate("obf1:abc").is_err());
    }

    proptest! {
        #[test]
        fn any_string_survives(s in ".{0,200}") {
            prop_assert_eq!(deobfuscate(&obfuscate(&s)).unwrap(), s);
        }
    }
}
