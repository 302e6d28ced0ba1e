//! Password hashing for password columns.
//!
//! Columns hash through the [`PasswordHasher`] trait. The bundled
//! [`Sha256PasswordHasher`] is a single salted SHA-256 round: fast to compute
//! and therefore weak against offline guessing. Deployments storing real user
//! passwords should register a hasher backed by a slow KDF (argon2, scrypt or
//! bcrypt) instead.

use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::value::hex_encode;

/// Hashes plain-text passwords on assignment.
pub trait PasswordHasher: Send + Sync {
    fn hash(&self, plain: &str) -> String;

    fn verify(&self, plain: &str, hashed: &str) -> bool;

    /// Whether the value already is a hash produced by this hasher.
    ///
    /// Hashes are never re-hashed, so normalizing a password twice is a no-op.
    fn is_hash(&self, value: &str) -> bool;
}

const SHA256_PREFIX: &str = "sha256";

/// Salted SHA-256 hasher producing `sha256$<salt>$<digest>`.
///
/// One hash round, no key stretching. Suitable for tests and low-value
/// secrets only; see the module docs.
#[derive(Debug, Clone, Copy, Default)]
pub struct Sha256PasswordHasher;

impl Sha256PasswordHasher {
    fn digest(salt: &str, plain: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(salt.as_bytes());
        hasher.update(plain.as_bytes());
        hex_encode(&hasher.finalize())
    }
}

impl PasswordHasher for Sha256PasswordHasher {
    fn hash(&self, plain: &str) -> String {
        let salt = Uuid::new_v4().simple().to_string();
        format!("{}${}${}", SHA256_PREFIX, salt, Self::digest(&salt, plain))
    }

    fn verify(&self, plain: &str, hashed: &str) -> bool {
        let mut parts = hashed.splitn(3, '$');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(SHA256_PREFIX), Some(salt), Some(digest)) => Self::digest(salt, plain) == digest,
            _ => false,
        }
    }

    fn is_hash(&self, value: &str) -> bool {
        let parts: Vec<&str> = value.split('$').collect();
        parts.len() == 3
            && parts[0] == SHA256_PREFIX
            && parts[1].len() == 32
            && parts[2].len() == 64
            && parts[1..].iter().all(|p| p.chars().all(|c| c.is_ascii_hexdigit()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_and_verify() {
        let hasher = Sha256PasswordHasher;
        let hashed = hasher.hash("s3cret");
        assert!(hasher.is_hash(&hashed));
        assert!(hasher.verify("s3cret", &hashed));
        assert!(!hasher.verify("wrong", &hashed));
        assert!(!hasher.is_hash("s3cret"));
    }

    /// Stretched hasher standing in for a slow KDF.
    struct Stretched {
        rounds: usize,
    }

    impl Stretched {
        fn derive(&self, salt: &str, plain: &str) -> String {
            let mut digest = Sha256PasswordHasher::digest(salt, plain);
            for _ in 1..self.rounds {
                digest = Sha256PasswordHasher::digest(salt, &digest);
            }
            digest
        }
    }

    impl PasswordHasher for Stretched {
        fn hash(&self, plain: &str) -> String {
            format!("stretched${}", self.derive("fixed-salt", plain))
        }

        fn verify(&self, plain: &str, hashed: &str) -> bool {
            self.hash(plain) == hashed
        }

        fn is_hash(&self, value: &str) -> bool {
            value.starts_with("stretched$")
        }
    }

    #[test]
    fn test_custom_hasher_replaces_builtin() {
        use crate::column::{Column, ColumnType};
        use crate::value::Value;

        let column = Column::new("password", ColumnType::Password)
            .password_hasher(Stretched { rounds: 1_000 })
            .unwrap();
        let hashed = column.normalize(Value::from("s3cret"), false);
        let Value::String(hash) = &hashed else {
            panic!("expected string");
        };
        assert!(hash.starts_with("stretched$"));
        assert!(!Sha256PasswordHasher.is_hash(hash));
        assert!(column.password_hasher_ref().unwrap().verify("s3cret", hash));
        // already hashed input is not hashed again
        assert_eq!(column.normalize(hashed.clone(), false), hashed);
    }

    #[test]
    fn test_hashes_are_salted() {
        let hasher = Sha256PasswordHasher;
        assert_ne!(hasher.hash("same"), hasher.hash("same"));
    }
}
