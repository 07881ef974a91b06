//! Fixed-width decimal text encoding for big integers.
//!
//! Block numbers, timestamps, and 256-bit quantities are stored in TEXT
//! columns. Encoding them as zero-padded decimal of a fixed width makes
//! lexicographic comparison in SQL agree with numeric comparison, so range
//! predicates and `ORDER BY` work directly on the stored text.

use alloy_primitives::U256;

use crate::error::{StoreError, StoreResult};

/// Width of every encoded value, in decimal digits.
///
/// `U256::MAX` has 78 digits, so 79 covers every 256-bit quantity.
pub const ENCODED_WIDTH: usize = 79;

/// Encode a 256-bit quantity as fixed-width decimal text.
pub fn encode_as_text(value: U256) -> String {
    let digits = value.to_string();
    format!("{digits:0>width$}", width = ENCODED_WIDTH)
}

/// Encode a block number or timestamp as fixed-width decimal text.
pub fn encode_u64(value: u64) -> String {
    encode_as_text(U256::from(value))
}

/// Decode fixed-width decimal text back into a 256-bit quantity.
pub fn decode_to_u256(text: &str) -> StoreResult<U256> {
    if text.len() != ENCODED_WIDTH || !text.bytes().all(|b| b.is_ascii_digit()) {
        return Err(StoreError::EncodeOverflow(format!(
            "not a {ENCODED_WIDTH}-digit encoded integer: {text:?}"
        )));
    }
    let digits = text.trim_start_matches('0');
    if digits.is_empty() {
        return Ok(U256::ZERO);
    }
    U256::from_str_radix(digits, 10)
        .map_err(|_| StoreError::EncodeOverflow(format!("value out of range: {text:?}")))
}

/// Decode fixed-width decimal text into a `u64`.
///
/// Fails if the stored value does not fit, which for block numbers and
/// timestamps indicates a corrupt row rather than a legal chain value.
pub fn decode_to_u64(text: &str) -> StoreResult<u64> {
    let value = decode_to_u256(text)?;
    u64::try_from(value)
        .map_err(|_| StoreError::EncodeOverflow(format!("value exceeds u64: {text:?}")))
}

/// Render raw bytes as lowercase `0x`-prefixed hex, the canonical form for
/// every hash, address, and byte-blob column.
pub(crate) fn hex_text(bytes: impl AsRef<[u8]>) -> String {
    format!("0x{}", alloy_primitives::hex::encode(bytes))
}

/// Parse a lowercase `0x`-prefixed hex column back into a fixed-size type.
pub(crate) fn parse_hex<T>(text: &str) -> StoreResult<T>
where
    T: std::str::FromStr,
{
    text.parse()
        .map_err(|_| StoreError::Corrupt(format!("invalid hex column: {text:?}")))
}
