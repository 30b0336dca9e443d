//! Private stream key issuance
//!
//! A key is `base64url("{owner_id}:{hex nonce}")`, so the owner can be
//! recovered from the key alone. Keys minted before a rotation therefore
//! still identify their owner.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};

use crate::models::UserId;

/// Mint a fresh private key bound to `owner`
#[must_use]
pub fn mint_private_key(owner: &UserId) -> String {
    let nonce = uuid::Uuid::new_v4().simple().to_string();
    URL_SAFE_NO_PAD.encode(format!("{}:{nonce}", owner.as_str()))
}

/// Recover the owner prefix of a well-formed key
///
/// Returns `None` for anything that is not base64url of `owner:hexnonce`.
#[must_use]
pub fn decode_key_owner(key: &str) -> Option<UserId> {
    let raw = URL_SAFE_NO_PAD.decode(key.trim()).ok()?;
    let text = String::from_utf8(raw).ok()?;
    let (owner, nonce) = text.rsplit_once(':')?;

    if owner.is_empty() || nonce.is_empty() || !nonce.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }

    Some(UserId::from(owner))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minted_key_decodes_to_owner() {
        let owner = UserId::from("user_123");
        let key = mint_private_key(&owner);

        assert_eq!(decode_key_owner(&key), Some(owner));
    }

    #[test]
    fn test_keys_are_unique_per_mint() {
        let owner = UserId::from("user_123");
        assert_ne!(mint_private_key(&owner), mint_private_key(&owner));
    }

    #[test]
    fn test_owner_may_contain_colons() {
        let owner = UserId::from("oidc:github:42");
        let key = mint_private_key(&owner);
        assert_eq!(decode_key_owner(&key), Some(owner));
    }

    #[test]
    fn test_malformed_keys_are_rejected() {
        assert_eq!(decode_key_owner("not base64 at all!"), None);
        assert_eq!(decode_key_owner(&URL_SAFE_NO_PAD.encode("no-separator")), None);
        assert_eq!(decode_key_owner(&URL_SAFE_NO_PAD.encode(":abcdef")), None);
        assert_eq!(decode_key_owner(&URL_SAFE_NO_PAD.encode("owner:not-hex")), None);
    }

    #[test]
    fn test_hand_built_key_with_owner_prefix_decodes() {
        let legacy = URL_SAFE_NO_PAD.encode("alice:00ff");
        assert_eq!(decode_key_owner(&legacy), Some(UserId::from("alice")));
    }
}
