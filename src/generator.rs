//! # Credential Generator
//!
//! Produces candidate credential values for the create step.
//!
//! The default generator draws uniformly from a character pool using the
//! operating system's CSPRNG. The pool always contains ASCII letters and
//! digits; punctuation can be added and individual characters excluded through
//! [`PasswordPolicy`].

use crate::constants::{DEFAULT_PASSWORD_LENGTH, MAX_PASSWORD_LENGTH};
use crate::secret_value::SecretValue;
use anyhow::{bail, Result};
use rand::rngs::OsRng;
use rand::Rng;

const LETTERS: &str = "abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ";
const DIGITS: &str = "0123456789";
const PUNCTUATION: &str = "!#$%&()*+,-./:;<=>?@[]^_{|}~";

/// Source of new credential values
pub trait CredentialGenerator: Send + Sync {
    /// Generate a value of exactly `length` characters
    ///
    /// # Errors
    ///
    /// Returns an error for a zero or oversized length.
    fn generate(&self, length: usize) -> Result<SecretValue>;
}

/// Length and character-set policy for generated credentials
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PasswordPolicy {
    /// Number of characters to generate
    pub length: usize,
    /// Add ASCII punctuation to the pool
    pub include_punctuation: bool,
    /// Characters removed from the pool
    pub exclude_characters: String,
}

impl Default for PasswordPolicy {
    fn default() -> Self {
        Self {
            length: DEFAULT_PASSWORD_LENGTH,
            include_punctuation: false,
            exclude_characters: String::new(),
        }
    }
}

impl PasswordPolicy {
    /// Characters a generated value may contain
    #[must_use]
    pub fn character_pool(&self) -> Vec<char> {
        let mut pool = String::from(LETTERS);
        pool.push_str(DIGITS);
        if self.include_punctuation {
            pool.push_str(PUNCTUATION);
        }
        pool.chars()
            .filter(|c| !self.exclude_characters.contains(*c))
            .collect()
    }
}

/// Generator backed by the operating system's random number generator
#[derive(Debug, Clone)]
pub struct RandomPasswordGenerator {
    pool: Vec<char>,
}

impl RandomPasswordGenerator {
    /// Build a generator for the policy's character pool
    ///
    /// # Errors
    ///
    /// Returns an error if exclusions leave the pool without letters or digits.
    pub fn from_policy(policy: &PasswordPolicy) -> Result<Self> {
        let pool = policy.character_pool();
        if !pool.iter().any(char::is_ascii_alphabetic) || !pool.iter().any(char::is_ascii_digit) {
            bail!("character pool must keep at least one letter and one digit after exclusions");
        }
        Ok(Self { pool })
    }
}

impl Default for RandomPasswordGenerator {
    fn default() -> Self {
        Self {
            pool: PasswordPolicy::default().character_pool(),
        }
    }
}

impl CredentialGenerator for RandomPasswordGenerator {
    fn generate(&self, length: usize) -> Result<SecretValue> {
        if length == 0 || length > MAX_PASSWORD_LENGTH {
            bail!("credential length must be between 1 and {MAX_PASSWORD_LENGTH}, got {length}");
        }

        let mut rng = OsRng;
        let value: String = (0..length)
            .map(|_| self.pool[rng.gen_range(0..self.pool.len())])
            .collect();
        Ok(SecretValue::new(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generates_requested_length() {
        let generator = RandomPasswordGenerator::default();
        let value = generator.generate(16).unwrap();
        assert_eq!(value.expose().len(), 16);
        assert!(value.expose().chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn test_generation_is_not_deterministic() {
        let generator = RandomPasswordGenerator::default();
        let first = generator.generate(32).unwrap();
        let second = generator.generate(32).unwrap();
        assert_ne!(first.expose(), second.expose());
    }

    #[test]
    fn test_zero_length_rejected() {
        let generator = RandomPasswordGenerator::default();
        assert!(generator.generate(0).is_err());
    }

    #[test]
    fn test_punctuation_policy() {
        let policy = PasswordPolicy {
            include_punctuation: true,
            ..PasswordPolicy::default()
        };
        let pool = policy.character_pool();
        assert!(pool.contains(&'!'));
        assert!(pool.contains(&'a'));
        assert!(pool.contains(&'7'));
    }

    #[test]
    fn test_excluded_characters_never_generated() {
        let policy = PasswordPolicy {
            exclude_characters: "0OIl1".to_string(),
            ..PasswordPolicy::default()
        };
        let generator = RandomPasswordGenerator::from_policy(&policy).unwrap();
        let value = generator.generate(512).unwrap();
        assert!(!value.expose().chars().any(|c| "0OIl1".contains(c)));
    }

    #[test]
    fn test_excluding_all_digits_rejected() {
        let policy = PasswordPolicy {
            exclude_characters: DIGITS.to_string(),
            ..PasswordPolicy::default()
        };
        assert!(RandomPasswordGenerator::from_policy(&policy).is_err());
    }
}
