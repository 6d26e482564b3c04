//! Brazilian phone number parsing for range lookups.
//!
//! A national number is a two digit DDD (area code) followed by an 8 digit
//! landline or 9 digit mobile subscriber number. Operator ranges are keyed by
//! DDD, a four digit prefix, and the last four digits of the number.

use serde::{Deserialize, Serialize};

use crate::error::{NumportError, Result};

/// Shortest accepted national number (DDD + 8 digit landline).
pub const MIN_DIGITS: usize = 10;

/// Longest accepted national number (DDD + 9 digit mobile).
pub const MAX_DIGITS: usize = 11;

/// A validated national phone number split into its lookup components.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhoneNumber {
    digits: String,
}

impl PhoneNumber {
    /// Normalise and validate user input.
    ///
    /// Spaces, dashes and parentheses are stripped. The remainder must be
    /// 10 or 11 ASCII digits.
    pub fn parse(raw: &str) -> Result<Self> {
        let digits: String = raw
            .chars()
            .filter(|c| !matches!(c, ' ' | '-' | '(' | ')'))
            .collect();

        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(NumportError::invalid_phone(raw, "only digits are allowed"));
        }

        if !(MIN_DIGITS..=MAX_DIGITS).contains(&digits.len()) {
            return Err(NumportError::invalid_phone(
                raw,
                format!("expected {} to {} digits, got {}", MIN_DIGITS, MAX_DIGITS, digits.len()),
            ));
        }

        Ok(Self { digits })
    }

    pub fn digits(&self) -> &str {
        &self.digits
    }

    pub fn ddd(&self) -> &str {
        &self.digits[..2]
    }

    pub fn prefix(&self) -> &str {
        &self.digits[2..6]
    }

    /// Digits after the prefix.
    pub fn suffix(&self) -> &str {
        &self.digits[6..]
    }

    pub fn is_mobile(&self) -> bool {
        self.digits.len() == MAX_DIGITS
    }

    /// The full number as stored in `portability_history.phone_number`.
    pub fn as_i64(&self) -> i64 {
        // at most 11 ASCII digits, always fits
        self.digits
            .bytes()
            .fold(0i64, |acc, b| acc * 10 + i64::from(b - b'0'))
    }

    /// Position of the number inside its prefix block, compared against
    /// `faixa_inicio`/`faixa_fim` of the operator range table.
    pub fn range_key(&self) -> i64 {
        self.as_i64() % 10_000
    }
}

impl std::fmt::Display for PhoneNumber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.digits)
    }
}

impl std::str::FromStr for PhoneNumber {
    type Err = NumportError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}
