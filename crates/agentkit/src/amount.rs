//! Integer amount handling. Nothing here touches floats.

use crate::errors::{WalletError, WalletResult};
use alloy::primitives::U256;

fn ten_pow(decimals: u32) -> WalletResult<U256> {
    if decimals > 77 {
        return Err(WalletError::InvalidInput(format!(
            "decimals too large: {decimals}"
        )));
    }
    Ok(U256::from(10_u64).pow(U256::from(decimals)))
}

/// Parse an integer amount already expressed in the chain's base unit (wei, lamports).
pub fn parse_base_units(s: &str) -> WalletResult<U256> {
    let s = s.trim();
    if s.is_empty() {
        return Err(WalletError::InvalidInput("empty amount".into()));
    }
    if !s.bytes().all(|b| b.is_ascii_digit()) {
        return Err(WalletError::InvalidInput(format!(
            "amount must be a non-negative integer in base units, got {s:?}"
        )));
    }
    s.parse::<U256>().map_err(WalletError::invalid_input)
}

/// Parse a whole-unit decimal string ("1.5") into base units for an asset with `decimals`.
pub fn parse_units(s: &str, decimals: u32) -> WalletResult<U256> {
    let s = s.trim();
    if s.is_empty() {
        return Err(WalletError::InvalidInput("empty amount".into()));
    }
    let (whole, frac) = s.split_once('.').unwrap_or((s, ""));
    let digits_only = |p: &str| p.bytes().all(|b| b.is_ascii_digit());
    if !digits_only(whole) || !digits_only(frac) || (whole.is_empty() && frac.is_empty()) {
        return Err(WalletError::InvalidInput(format!(
            "amount must be a non-negative decimal, got {s:?}"
        )));
    }
    let max_frac = usize::try_from(decimals).unwrap_or(usize::MAX);
    if frac.len() > max_frac {
        return Err(WalletError::InvalidInput(format!(
            "too many decimal places (asset has {decimals})"
        )));
    }

    let scale = ten_pow(decimals)?;
    let whole_v = if whole.is_empty() {
        U256::ZERO
    } else {
        whole.parse::<U256>().map_err(WalletError::invalid_input)?
    };
    let frac_v = if frac.is_empty() {
        U256::ZERO
    } else {
        let pad = u32::try_from(max_frac - frac.len()).unwrap_or(0);
        frac.parse::<U256>()
            .map_err(WalletError::invalid_input)?
            .checked_mul(ten_pow(pad)?)
            .ok_or_else(|| WalletError::InvalidInput("amount overflow".into()))?
    };

    whole_v
        .checked_mul(scale)
        .and_then(|x| x.checked_add(frac_v))
        .ok_or_else(|| WalletError::InvalidInput("amount overflow".into()))
}

/// Render base units as a trimmed whole-unit decimal string.
///
/// - base=1500000, decimals=6 => "1.5"
/// - base=1, decimals=6 => "0.000001"
pub fn format_units(base: U256, decimals: u32) -> String {
    let Ok(scale) = ten_pow(decimals) else {
        return base.to_string();
    };
    if decimals == 0 {
        return base.to_string();
    }
    let whole = base / scale;
    let frac = base % scale;
    if frac.is_zero() {
        return whole.to_string();
    }
    let width = usize::try_from(decimals).unwrap_or(0);
    let padded = format!("{:0>width$}", frac.to_string());
    format!("{whole}.{}", padded.trim_end_matches('0'))
}
