// Password hashing and validation service

use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Algorithm, Argon2, Params, Version,
};
use rand::rngs::OsRng;

use crate::auth::error::AuthError;

pub const MIN_PASSWORD_LENGTH: usize = 8;
pub const MAX_PASSWORD_LENGTH: usize = 128;

/// Password service for hashing and verification
///
/// Hashes are Argon2id PHC strings with a random salt. Verification reads
/// the cost parameters from the stored hash, so changing `params` only
/// affects new hashes.
#[derive(Debug, Clone)]
pub struct PasswordService {
    params: Params,
}

impl Default for PasswordService {
    fn default() -> Self {
        Self {
            params: Params::default(),
        }
    }
}

impl PasswordService {
    pub fn new(params: Params) -> Self {
        Self { params }
    }

    fn hasher(&self) -> Argon2<'static> {
        Argon2::new(Algorithm::Argon2id, Version::V0x13, self.params.clone())
    }

    /// Hash a password using Argon2id
    pub fn hash_password(&self, password: &str) -> Result<String, AuthError> {
        let salt = SaltString::generate(&mut OsRng);
        self.hasher()
            .hash_password(password.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|e| AuthError::Internal(format!("Password hashing failed: {}", e)))
    }

    /// Verify a password against a stored hash
    ///
    /// A wrong password is `InvalidArgument`; an unreadable stored hash is
    /// `Internal`.
    pub fn verify_password(&self, hash: &str, password: &str) -> Result<(), AuthError> {
        let parsed = PasswordHash::new(hash)
            .map_err(|e| AuthError::Internal(format!("Stored password hash is invalid: {}", e)))?;

        self.hasher()
            .verify_password(password.as_bytes(), &parsed)
            .map_err(|_| AuthError::InvalidArgument("Invalid email or password".to_string()))
    }

    /// Validate password strength requirements
    pub fn validate_password_strength(password: &str) -> Result<(), AuthError> {
        let length = password.chars().count();
        if length < MIN_PASSWORD_LENGTH {
            return Err(AuthError::InvalidArgument(format!(
                "Password must be at least {} characters",
                MIN_PASSWORD_LENGTH
            )));
        }
        if length > MAX_PASSWORD_LENGTH {
            return Err(AuthError::InvalidArgument(format!(
                "Password must be at most {} characters",
                MAX_PASSWORD_LENGTH
            )));
        }
        if !password.chars().any(char::is_alphabetic) || !password.chars().any(|c| c.is_ascii_digit()) {
            return Err(AuthError::InvalidArgument(
                "Password must contain at least one letter and one digit".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
pub(crate) fn fast_password_service() -> PasswordService {
    // minimum Argon2 cost, keeps tests quick
    PasswordService::new(Params::new(8, 1, 1, None).expect("valid argon2 params"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_and_verify() {
        let service = fast_password_service();
        let hash = service.hash_password("correct horse 1").unwrap();

        assert!(hash.starts_with("$argon2id$"));
        assert!(service.verify_password(&hash, "correct horse 1").is_ok());
        assert!(matches!(
            service.verify_password(&hash, "wrong horse 1"),
            Err(AuthError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_hashes_are_salted() {
        let service = fast_password_service();
        let first = service.hash_password("password1").unwrap();
        let second = service.hash_password("password1").unwrap();
        assert_ne!(first, second);
    }

    #[test]
    fn test_corrupt_hash_is_internal_error() {
        let service = fast_password_service();
        assert!(matches!(
            service.verify_password("not-a-phc-string", "password1"),
            Err(AuthError::Internal(_))
        ));
    }

    #[test]
    fn test_password_strength() {
        assert!(PasswordService::validate_password_strength("abcdefg1").is_ok());
        assert!(PasswordService::validate_password_strength("abc1").is_err());
        assert!(PasswordService::validate_password_strength("abcdefgh").is_err());
        assert!(PasswordService::validate_password_strength("12345678").is_err());
        assert!(PasswordService::validate_password_strength(&"a1".repeat(65)).is_err());
    }
}
