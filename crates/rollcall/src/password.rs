//! Password hashing.
//!
//! New hashes use the `pbkdf2:sha256:<iterations>$<salt>$<hex>` layout.
//! Verification also accepts `scrypt:<n>:<r>:<p>$<salt>$<hex>`, so that
//! credentials written by Werkzeug-based deployments keep verifying.

use pbkdf2::pbkdf2_hmac;
use scrypt::Params;
use sha2::Sha256;
use tracing::warn;
use uuid::Uuid;

/// Default PBKDF2 rounds for new hashes.
pub const DEFAULT_ITERATIONS: u32 = 600_000;

/// Length of generated salts, in characters.
const SALT_LEN: usize = 16;

/// Output length of SHA-256.
const DIGEST_LEN: usize = 32;

/// Werkzeug derives 64-byte scrypt keys.
const SCRYPT_LEN: usize = 64;

/// Key derivation named in a stored hash.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Method {
    Pbkdf2 { iterations: u32 },
    Scrypt { log_n: u8, r: u32, p: u32 },
}

/// Hash `password` with a fresh random salt.
#[must_use]
pub fn hash_password(password: &str, iterations: u32) -> String {
    let salt = generate_salt();
    let digest = derive(password, &salt, iterations);
    format!("pbkdf2:sha256:{iterations}${salt}${digest}")
}

/// Check `candidate` against a stored hash.
///
/// Unknown methods and malformed hashes never verify.
#[must_use]
pub fn verify_password(stored: &str, candidate: &str) -> bool {
    let mut parts = stored.splitn(3, '$');
    let (Some(method), Some(salt), Some(expected)) = (parts.next(), parts.next(), parts.next())
    else {
        warn!("Malformed password hash");
        return false;
    };

    let Some(parsed) = parse_method(method) else {
        warn!(method, "Unsupported password hash method");
        return false;
    };

    let actual = match parsed {
        Method::Pbkdf2 { iterations } => derive(candidate, salt, iterations),
        Method::Scrypt { log_n, r, p } => match derive_scrypt(candidate, salt, log_n, r, p) {
            Some(digest) => digest,
            None => {
                warn!(method, "Invalid scrypt parameters");
                return false;
            }
        },
    };
    blake3::hash(actual.as_bytes()) == blake3::hash(expected.as_bytes())
}

/// Parse `pbkdf2:sha256[:<iterations>]` or `scrypt[:<n>:<r>:<p>]`.
fn parse_method(method: &str) -> Option<Method> {
    let mut fields = method.split(':');
    let parsed = match fields.next()? {
        "pbkdf2" => {
            if fields.next() != Some("sha256") {
                return None;
            }
            let iterations = match fields.next() {
                None => DEFAULT_ITERATIONS,
                Some(raw) => raw.parse().ok().filter(|n| *n > 0)?,
            };
            Method::Pbkdf2 { iterations }
        }
        "scrypt" => match (fields.next(), fields.next(), fields.next()) {
            (None, _, _) => Method::Scrypt {
                log_n: 15,
                r: 8,
                p: 1,
            },
            (Some(n), Some(r), Some(p)) => {
                let n: u64 = n.parse().ok()?;
                if n < 2 || !n.is_power_of_two() {
                    return None;
                }
                Method::Scrypt {
                    log_n: u8::try_from(n.trailing_zeros()).ok()?,
                    r: r.parse().ok()?,
                    p: p.parse().ok()?,
                }
            }
            _ => return None,
        },
        _ => return None,
    };
    if fields.next().is_some() {
        return None;
    }
    Some(parsed)
}

fn derive_scrypt(password: &str, salt: &str, log_n: u8, r: u32, p: u32) -> Option<String> {
    let params = Params::new(log_n, r, p, SCRYPT_LEN).ok()?;
    let mut out = [0u8; SCRYPT_LEN];
    scrypt::scrypt(password.as_bytes(), salt.as_bytes(), &params, &mut out).ok()?;
    Some(hex::encode(out))
}

fn derive(password: &str, salt: &str, iterations: u32) -> String {
    let mut out = [0u8; DIGEST_LEN];
    pbkdf2_hmac::<Sha256>(password.as_bytes(), salt.as_bytes(), iterations, &mut out);
    hex::encode(out)
}

fn generate_salt() -> String {
    let mut salt = Uuid::new_v4().simple().to_string();
    salt.truncate(SALT_LEN);
    salt
}

#[cfg(test)]
mod tests {
    use super::*;

    const FAST: u32 = 1_000;

    #[test]
    fn test_hash_then_verify() {
        let hash = hash_password("hunter2", FAST);
        assert!(hash.starts_with("pbkdf2:sha256:1000$"));
        assert!(verify_password(&hash, "hunter2"));
        assert!(!verify_password(&hash, "hunter3"));
    }

    #[test]
    fn test_salts_differ() {
        let a = hash_password("same", FAST);
        let b = hash_password("same", FAST);
        assert_ne!(a, b);

        let salt = a.split('$').nth(1).unwrap();
        assert_eq!(salt.len(), SALT_LEN);
    }

    #[test]
    fn test_rfc7914_vector_verifies() {
        // RFC 7914 section 11, PBKDF2-HMAC-SHA256 with one round; the first
        // 32 bytes of the 64-byte vector.
        let stored = "pbkdf2:sha256:1$salt$\
                      55ac046e56e3089fec1691c22544b605f94185216dde0465e68b9d57c20dacbc";
        assert!(verify_password(stored, "passwd"));
        assert!(!verify_password(stored, "password"));
    }

    #[test]
    fn test_werkzeug_scrypt_hash_verifies() {
        // Produced by hashlib.scrypt the way Werkzeug stores it.
        let stored = "scrypt:1024:8:1$Zt4vQ9xLm2Pa7RcK$\
                      bc07d4d1c3cb16e887c4f38771501fc22ae772d396744995306356ad7f71e28b\
                      d248bc2e7964b7399e2b24613377d9b8997d50ff4a14f198dba9f1bdd33ea704";
        assert!(verify_password(stored, "hunter2"));
        assert!(!verify_password(stored, "hunter3"));
    }

    #[test]
    fn test_scrypt_method_parsing() {
        assert_eq!(
            parse_method("scrypt:32768:8:1"),
            Some(Method::Scrypt {
                log_n: 15,
                r: 8,
                p: 1
            })
        );
        assert_eq!(parse_method("scrypt"), parse_method("scrypt:32768:8:1"));
        assert_eq!(parse_method("scrypt:1000:8:1"), None);
        assert_eq!(parse_method("scrypt:32768:8"), None);
        assert_eq!(parse_method("scrypt:32768:8:1:2"), None);
        assert!(!verify_password("scrypt:1024:0:1$abc$def", "x"));
    }

    #[test]
    fn test_unsupported_method_fails() {
        assert!(!verify_password("argon2:1$abc$def", "x"));
        assert!(!verify_password("pbkdf2:sha1:1000$abc$def", "x"));
        assert!(!verify_password("pbkdf2:sha256:0$abc$def", "x"));
        assert!(!verify_password("pbkdf2:sha256:10:extra$abc$def", "x"));
    }

    #[test]
    fn test_malformed_hash_fails() {
        assert!(!verify_password("", "x"));
        assert!(!verify_password("pbkdf2:sha256:1000", "x"));
        assert!(!verify_password("plaintext", "plaintext"));
    }

    #[test]
    fn test_method_without_iterations_uses_default() {
        assert_eq!(
            parse_method("pbkdf2:sha256"),
            Some(Method::Pbkdf2 {
                iterations: DEFAULT_ITERATIONS
            })
        );
        assert_eq!(
            parse_method("pbkdf2:sha256:260000"),
            Some(Method::Pbkdf2 {
                iterations: 260_000
            })
        );
    }
}
