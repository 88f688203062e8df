use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::{Algorithm, Argon2, Params, Version};

/// Shortest admin password accepted at bootstrap.
pub const MIN_LENGTH: usize = 8;

// argon2id: 19 MiB, 2 passes, 1 lane.
const MEMORY_KIB: u32 = 19 * 1024;
const PASSES: u32 = 2;
const LANES: u32 = 1;

#[derive(Debug)]
pub enum PasswordError {
    TooShort,
    Hash(String),
    /// The stored hash could not be parsed; the admin row is corrupt.
    MalformedHash(String),
}

impl std::fmt::Display for PasswordError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PasswordError::TooShort => {
                write!(f, "Admin password must be at least {MIN_LENGTH} characters")
            }
            PasswordError::Hash(e) => write!(f, "Password hashing failed: {e}"),
            PasswordError::MalformedHash(e) => write!(f, "Stored password hash is invalid: {e}"),
        }
    }
}

impl std::error::Error for PasswordError {}

fn hasher() -> Result<Argon2<'static>, PasswordError> {
    let params = Params::new(MEMORY_KIB, PASSES, LANES, None)
        .map_err(|e| PasswordError::Hash(e.to_string()))?;
    Ok(Argon2::new(Algorithm::Argon2id, Version::V0x13, params))
}

/// Hash a new admin password for storage in `admin_users.password_hash`.
pub fn hash(password: &str) -> Result<String, PasswordError> {
    if password.chars().count() < MIN_LENGTH {
        return Err(PasswordError::TooShort);
    }

    let salt = SaltString::generate(&mut OsRng);
    hasher()?
        .hash_password(password.as_bytes(), &salt)
        .map(|h| h.to_string())
        .map_err(|e| PasswordError::Hash(e.to_string()))
}

/// Check a login attempt against the admin's stored hash. The hash carries
/// its own parameters, so hashes made with older settings still verify.
pub fn verify(attempt: &str, stored: &str) -> Result<bool, PasswordError> {
    let parsed = PasswordHash::new(stored).map_err(|e| PasswordError::MalformedHash(e.to_string()))?;
    Ok(hasher()?
        .verify_password(attempt.as_bytes(), &parsed)
        .is_ok())
}
