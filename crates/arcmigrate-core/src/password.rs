//! Random password generation for newly created accounts.
//!
//! The target system requires at least one uppercase letter, one lowercase
//! letter, one digit, and one symbol. The alphabets drop characters that
//! read ambiguously when a coordinator dictates a password over the phone:
//! no `O` (vs `0`), no `0`, no `I`/`l` pair.

use std::collections::HashSet;

use anyhow::{ensure, Context, Result};

/// Uppercase alphabet, `O` and `I` removed.
pub const UPPERCASE: &str = "ABCDEFGHJKLMNPQRSTUVWXYZ";
/// Lowercase alphabet, `l` removed.
pub const LOWERCASE: &str = "abcdefghijkmnopqrstuvwxyz";
/// Digits, `0` removed.
pub const NUMERIC: &str = "123456789";
/// Symbols easy to communicate verbally.
pub const SYMBOLIC: &str = "&.!?";

/// Default generated password length.
pub const DEFAULT_PASSWORD_LENGTH: usize = 9;

/// Generates passwords that always contain all four character classes.
#[derive(Debug, Clone, Copy, Default)]
pub struct PasswordGenerator;

impl PasswordGenerator {
    /// Generate a password of [`DEFAULT_PASSWORD_LENGTH`].
    pub fn next_password(&self) -> Result<String> {
        self.next_password_of_length(DEFAULT_PASSWORD_LENGTH)
    }

    /// Generate a password of the given length.
    ///
    /// `length` must be at least 4 so that one position per character class
    /// exists.
    pub fn next_password_of_length(&self, length: usize) -> Result<String> {
        ensure!(length >= 4, "password length must be at least 4, got {length}");

        let alphanumeric: Vec<char> = UPPERCASE
            .chars()
            .chain(LOWERCASE.chars())
            .chain(NUMERIC.chars())
            .collect();

        let mut buffer: Vec<char> = Vec::with_capacity(length);
        for _ in 0..length {
            buffer.push(random_char(&alphanumeric)?);
        }

        // Overwrite four distinct positions so every class is present.
        let mut positions = HashSet::with_capacity(4);
        while positions.len() < 4 {
            positions.insert(random_index(length)?);
        }
        let mut positions = positions.into_iter();
        for alphabet in [UPPERCASE, LOWERCASE, NUMERIC, SYMBOLIC] {
            let chars: Vec<char> = alphabet.chars().collect();
            let pos = positions.next().context("ran out of positions")?;
            buffer[pos] = random_char(&chars)?;
        }

        Ok(buffer.into_iter().collect())
    }
}

fn random_char(alphabet: &[char]) -> Result<char> {
    Ok(alphabet[random_index(alphabet.len())?])
}

/// Uniform index below `bound`, via rejection sampling.
fn random_index(bound: usize) -> Result<usize> {
    let bound = u64::try_from(bound).context("index bound out of range")?;
    // Reject draws above the largest multiple of `bound` in the u32 range.
    let limit = (1u64 << 32) / bound * bound;
    loop {
        let mut bytes = [0u8; 4];
        getrandom::fill(&mut bytes).context("failed to read system randomness")?;
        let value = u64::from(u32::from_le_bytes(bytes));
        if value < limit {
            return Ok((value % bound) as usize);
        }
    }
}
