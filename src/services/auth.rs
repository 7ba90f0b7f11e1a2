//! Administrator authentication and entry access tokens
//!
//! The admin panel and login-protected entries are guarded by HTTP Basic
//! authentication against the single configured administrator, whose
//! password is stored as an Argon2id PHC string.
//!
//! Password-protected entries hand out a cookie once the visitor has typed
//! the right password. The cookie value is an HMAC-SHA256 over the entry id
//! and its current password, so changing the password invalidates it.

use anyhow::{Context, Result};
use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use data_encoding::{BASE64, HEXLOWER};
use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::config::AdminConfig;

type HmacSha256 = Hmac<Sha256>;

/// Prefix of the per-entry access cookie names
pub const ENTRY_COOKIE_PREFIX: &str = "marigold_entry_";

/// Hash a password using Argon2id with a random salt.
pub fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let password_hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("Failed to hash password: {}", e))
        .context("Password hashing failed")?;

    Ok(password_hash.to_string())
}

/// Verify a password against a stored PHC hash.
///
/// Returns an error only when the hash itself is malformed.
pub fn verify_password(password: &str, hash: &str) -> Result<bool> {
    let parsed_hash = PasswordHash::new(hash)
        .map_err(|e| anyhow::anyhow!("Invalid password hash format: {}", e))
        .context("Failed to parse password hash")?;

    match Argon2::default().verify_password(password.as_bytes(), &parsed_hash) {
        Ok(()) => Ok(true),
        Err(argon2::password_hash::Error::Password) => Ok(false),
        Err(e) => Err(anyhow::anyhow!("Password verification failed: {}", e)),
    }
}

/// Credentials carried by an `Authorization: Basic ...` header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BasicCredentials {
    pub username: String,
    pub password: String,
}

impl BasicCredentials {
    /// Decode the value of an `Authorization` header
    pub fn parse(header: &str) -> Option<Self> {
        let (scheme, encoded) = header.trim().split_once(' ')?;
        if !scheme.eq_ignore_ascii_case("basic") {
            return None;
        }
        let decoded = BASE64.decode(encoded.trim().as_bytes()).ok()?;
        let decoded = String::from_utf8(decoded).ok()?;
        let (username, password) = decoded.split_once(':')?;
        Some(Self {
            username: username.to_string(),
            password: password.to_string(),
        })
    }

    /// Encode as an `Authorization` header value
    pub fn header_value(&self) -> String {
        let raw = format!("{}:{}", self.username, self.password);
        format!("Basic {}", BASE64.encode(raw.as_bytes()))
    }
}

/// True when the credentials match the configured administrator.
///
/// An administrator without a password hash can never log in.
pub fn authenticate_admin(admin: &AdminConfig, credentials: &BasicCredentials) -> bool {
    if admin.password_hash.is_empty() || credentials.username != admin.username {
        return false;
    }
    match verify_password(&credentials.password, &admin.password_hash) {
        Ok(valid) => valid,
        Err(e) => {
            tracing::error!("Administrator password hash is unusable: {}", e);
            false
        }
    }
}

/// Cookie name remembering access to one protected entry
pub fn entry_cookie_name(entry_id: i64) -> String {
    format!("{}{}", ENTRY_COOKIE_PREFIX, entry_id)
}

/// Signed token proving the visitor knows the entry's password
pub fn sign_entry_access(secret: &str, entry_id: i64, password: &str) -> Result<String> {
    let mac = entry_mac(secret, entry_id, password)?;
    Ok(HEXLOWER.encode(&mac.finalize().into_bytes()))
}

/// Check a token produced by [`sign_entry_access`] in constant time
pub fn verify_entry_access(secret: &str, entry_id: i64, password: &str, token: &str) -> bool {
    let Ok(expected) = HEXLOWER.decode(token.trim().as_bytes()) else {
        return false;
    };
    match entry_mac(secret, entry_id, password) {
        Ok(mac) => mac.verify_slice(&expected).is_ok(),
        Err(_) => false,
    }
}

fn entry_mac(secret: &str, entry_id: i64, password: &str) -> Result<HmacSha256> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| anyhow::anyhow!("Invalid entry access key: {}", e))?;
    mac.update(entry_id.to_string().as_bytes());
    mac.update(b":");
    mac.update(password.as_bytes());
    Ok(mac)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn admin(password: &str) -> AdminConfig {
        AdminConfig {
            username: "admin".to_string(),
            password_hash: hash_password(password).expect("Failed to hash password"),
        }
    }

    #[test]
    fn test_hash_password_produces_argon2id_hash() {
        let hash = hash_password("test_password_123").expect("Failed to hash password");
        assert!(hash.starts_with("$argon2id$"));
        assert_ne!(hash, hash_password("test_password_123").unwrap());
    }

    #[test]
    fn test_verify_password() {
        let hash = hash_password("correct").unwrap();
        assert!(verify_password("correct", &hash).unwrap());
        assert!(!verify_password("wrong", &hash).unwrap());
        assert!(verify_password("correct", "invalid_hash_format").is_err());
    }

    #[test]
    fn test_basic_credentials_roundtrip() {
        let credentials = BasicCredentials {
            username: "admin".to_string(),
            password: "p:ss word".to_string(),
        };
        let header = credentials.header_value();
        assert!(header.starts_with("Basic "));
        assert_eq!(BasicCredentials::parse(&header), Some(credentials));
    }

    #[test]
    fn test_basic_credentials_rejects_garbage() {
        assert_eq!(BasicCredentials::parse("Bearer abc"), None);
        assert_eq!(BasicCredentials::parse("Basic !!!"), None);
        // "nocolon" in base64
        assert_eq!(BasicCredentials::parse("Basic bm9jb2xvbg=="), None);
        assert_eq!(BasicCredentials::parse(""), None);
    }

    #[test]
    fn test_authenticate_admin() {
        let config = admin("secret");
        let good = BasicCredentials {
            username: "admin".to_string(),
            password: "secret".to_string(),
        };
        assert!(authenticate_admin(&config, &good));

        let wrong_user = BasicCredentials {
            username: "root".to_string(),
            ..good.clone()
        };
        assert!(!authenticate_admin(&config, &wrong_user));

        let wrong_password = BasicCredentials {
            password: "nope".to_string(),
            ..good.clone()
        };
        assert!(!authenticate_admin(&config, &wrong_password));

        let unset = AdminConfig {
            username: "admin".to_string(),
            password_hash: String::new(),
        };
        assert!(!authenticate_admin(&unset, &good));
    }

    #[test]
    fn test_entry_access_token() {
        let token = sign_entry_access("key", 7, "open sesame").unwrap();
        assert_eq!(token.len(), 64);
        assert!(verify_entry_access("key", 7, "open sesame", &token));

        assert!(!verify_entry_access("key", 8, "open sesame", &token));
        assert!(!verify_entry_access("key", 7, "changed", &token));
        assert!(!verify_entry_access("other-key", 7, "open sesame", &token));
        assert!(!verify_entry_access("key", 7, "open sesame", "not-hex"));
    }

    #[test]
    fn test_entry_cookie_name() {
        assert_eq!(entry_cookie_name(42), "marigold_entry_42");
    }
}
