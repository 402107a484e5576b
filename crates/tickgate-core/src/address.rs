//! Address-space constants and the textual address parser.

use crate::error::BridgeError;
use crate::id::Address;

/// Number of bytes in the simulation's address space.
pub const ADDRESS_SPACE_LEN: usize = 0x1_0000;

/// Largest byte count a single range read or write may touch.
pub const MAX_RANGE_LEN: usize = 4096;

/// Parse an address written by a human or a request layer.
///
/// A `0x`/`0X` prefix means hexadecimal. Without a prefix, a string
/// containing any of the letters `a`-`f` is read as hexadecimal and a
/// string of decimal digits as decimal. Values above `0xFFFF` are
/// rejected.
///
/// # Examples
///
/// ```
/// use tickgate_core::{parse_address, Address};
///
/// assert_eq!(parse_address("0x6000").unwrap(), Address(0x6000));
/// assert_eq!(parse_address("7ff").unwrap(), Address(0x07FF));
/// assert_eq!(parse_address("768").unwrap(), Address(768));
/// assert!(parse_address("0x10000").is_err());
/// ```
pub fn parse_address(text: &str) -> Result<Address, BridgeError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(BridgeError::invalid("empty address"));
    }

    let (digits, radix) = match trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
    {
        Some(hex) => (hex, 16),
        None if trimmed.chars().any(|c| matches!(c, 'a'..='f' | 'A'..='F')) => (trimmed, 16),
        None => (trimmed, 10),
    };

    if digits.is_empty() || !digits.chars().all(|c| c.is_digit(radix)) {
        return Err(BridgeError::invalid(format!("malformed address '{trimmed}'")));
    }

    // Digits were checked above, so a parse failure here is overflow.
    u32::from_str_radix(digits, radix)
        .ok()
        .and_then(|v| u16::try_from(v).ok())
        .map(Address)
        .ok_or_else(|| BridgeError::invalid(format!("address '{trimmed}' out of range")))
}
