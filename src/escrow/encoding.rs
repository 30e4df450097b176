//! Address and amount encoding at the user-input boundary.
//!
//! Everything here is pure: no network access, so invalid input is rejected
//! before any RPC round-trip.

use alloy::primitives::utils::{format_ether, parse_ether};
use alloy::primitives::{Address, U256};
use std::str::FromStr;

use crate::escrow::types::{EscrowError, EscrowResult};

/// Decimal places of the native unit.
pub const ETHER_DECIMALS: usize = 18;

/// Parse a `0x`-prefixed, 40 hex digit account identifier.
///
/// All-lowercase and all-uppercase forms are accepted as is; mixed case must
/// be a valid EIP-55 checksum.
pub fn parse_address(input: &str) -> EscrowResult<Address> {
    let invalid = || EscrowError::InvalidAddressFormat(input.to_string());
    let trimmed = input.trim();

    let digits = trimmed.strip_prefix("0x").ok_or_else(invalid)?;
    if digits.len() != 40 || !digits.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(invalid());
    }

    let has_lower = digits.bytes().any(|b| b.is_ascii_lowercase());
    let has_upper = digits.bytes().any(|b| b.is_ascii_uppercase());
    if has_lower && has_upper {
        Address::parse_checksummed(trimmed, None).map_err(|_| invalid())
    } else {
        Address::from_str(trimmed).map_err(|_| invalid())
    }
}

/// Whether `input` would be accepted by [`parse_address`].
pub fn is_address(input: &str) -> bool {
    parse_address(input).is_ok()
}

/// Convert a human decimal ether amount (e.g. `"1.5"`) to wei.
pub fn parse_amount(input: &str) -> EscrowResult<U256> {
    let invalid = |reason: &str| EscrowError::InvalidAmountFormat {
        input: input.to_string(),
        reason: reason.to_string(),
    };
    let trimmed = input.trim();

    if trimmed.is_empty() {
        return Err(invalid("empty amount"));
    }
    if trimmed.starts_with('-') || trimmed.starts_with('+') {
        return Err(invalid("amount must be an unsigned decimal"));
    }

    let (whole, fraction) = trimmed.split_once('.').unwrap_or((trimmed, ""));
    if whole.is_empty() && fraction.is_empty() {
        return Err(invalid("no digits"));
    }
    if !whole.bytes().all(|b| b.is_ascii_digit()) || !fraction.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid("not a decimal number"));
    }
    if fraction.len() > ETHER_DECIMALS {
        return Err(invalid("more than 18 decimal places"));
    }

    let whole = if whole.is_empty() { "0" } else { whole };
    let normalized = if fraction.is_empty() {
        whole.to_string()
    } else {
        format!("{}.{}", whole, fraction)
    };

    parse_ether(&normalized).map_err(|e| invalid(&e.to_string()))
}

/// Render wei as a decimal ether string without trailing zeros (`"1.5"`).
pub fn format_amount(value: U256) -> String {
    let formatted = format_ether(value);
    match formatted.split_once('.') {
        Some((whole, fraction)) => {
            let fraction = fraction.trim_end_matches('0');
            if fraction.is_empty() {
                format!("{}.0", whole)
            } else {
                format!("{}.{}", whole, fraction)
            }
        }
        None => formatted,
    }
}

/// Abbreviated checksummed form, `0x1234...abcd`.
pub fn short_address(address: &Address) -> String {
    let full = address.to_checksum(None);
    format!("{}...{}", &full[..6], &full[full.len() - 4..])
}
