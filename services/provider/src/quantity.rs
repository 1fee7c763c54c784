//! Memory quantities such as `256Mi`, `1Gi` or `500M`.
//!
//! Accepts the usual resource-quantity notation: a non-negative decimal
//! number followed by an optional binary suffix (`Ki`..`Ei`), decimal suffix
//! (`m`, `k`, `M`..`E`) or decimal exponent (`e3`, `E-2`). Fractional byte
//! counts are rounded up.

use thiserror::Error;

/// Bytes in one megabyte as understood by the instance API.
pub const BYTES_PER_MEGABYTE: u64 = 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QuantityError {
    #[error("quantity is empty")]
    Empty,

    #[error("invalid number in quantity '{0}'")]
    InvalidNumber(String),

    #[error("unknown suffix '{suffix}' in quantity '{input}'")]
    UnknownSuffix { input: String, suffix: String },

    #[error("quantity '{0}' must not be negative")]
    Negative(String),

    #[error("quantity '{0}' is out of range")]
    OutOfRange(String),
}

/// Scale applied by a suffix: `base^exponent`.
#[derive(Debug, Clone, Copy)]
struct Scale {
    base: u128,
    exponent: i32,
}

/// Parse a quantity into a whole number of bytes.
pub fn parse_bytes(input: &str) -> Result<u64, QuantityError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(QuantityError::Empty);
    }

    let unsigned = match trimmed.as_bytes()[0] {
        b'-' => return Err(QuantityError::Negative(input.to_string())),
        b'+' => &trimmed[1..],
        _ => trimmed,
    };

    let number_len = unsigned
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(unsigned.len());
    let (number, suffix) = unsigned.split_at(number_len);

    let (mantissa, fraction_digits) = parse_decimal(number)
        .ok_or_else(|| QuantityError::InvalidNumber(input.to_string()))?;
    let scale = parse_suffix(suffix).ok_or_else(|| QuantityError::UnknownSuffix {
        input: input.to_string(),
        suffix: suffix.to_string(),
    })?;

    let out_of_range = || QuantityError::OutOfRange(input.to_string());

    // value = mantissa * base^exponent / 10^fraction_digits
    let mut numerator = mantissa;
    let mut denominator = pow(10, fraction_digits).ok_or_else(out_of_range)?;
    let factor = pow(scale.base, scale.exponent.unsigned_abs()).ok_or_else(out_of_range)?;
    if scale.exponent >= 0 {
        numerator = numerator.checked_mul(factor).ok_or_else(out_of_range)?;
    } else {
        denominator = denominator.checked_mul(factor).ok_or_else(out_of_range)?;
    }

    let bytes = numerator.div_ceil(denominator);
    if bytes > i64::MAX as u128 {
        return Err(out_of_range());
    }
    Ok(bytes as u64)
}

/// Convert bytes to whole megabytes, dropping the remainder.
pub fn bytes_to_megabytes(bytes: u64) -> u64 {
    bytes / BYTES_PER_MEGABYTE
}

/// Parse a quantity and convert it to whole megabytes.
pub fn memory_megabytes(input: &str) -> Result<u64, QuantityError> {
    parse_bytes(input).map(bytes_to_megabytes)
}

/// Parse `123`, `1.5` or `.5` into (digits without the dot, digits after the dot).
fn parse_decimal(number: &str) -> Option<(u128, u32)> {
    let (whole, fraction) = match number.split_once('.') {
        Some((whole, fraction)) => (whole, fraction),
        None => (number, ""),
    };
    if whole.is_empty() && fraction.is_empty() {
        return None;
    }
    if fraction.contains('.') {
        return None;
    }

    let mut mantissa: u128 = 0;
    for c in whole.chars().chain(fraction.chars()) {
        let digit = c.to_digit(10)? as u128;
        mantissa = mantissa.checked_mul(10)?.checked_add(digit)?;
    }
    Some((mantissa, u32::try_from(fraction.len()).ok()?))
}

fn parse_suffix(suffix: &str) -> Option<Scale> {
    let binary = |exponent| Scale {
        base: 1024,
        exponent,
    };
    let decimal = |exponent| Scale { base: 10, exponent };

    let scale = match suffix {
        "" => decimal(0),
        "Ki" => binary(1),
        "Mi" => binary(2),
        "Gi" => binary(3),
        "Ti" => binary(4),
        "Pi" => binary(5),
        "Ei" => binary(6),
        "m" => decimal(-3),
        "k" => decimal(3),
        "M" => decimal(6),
        "G" => decimal(9),
        "T" => decimal(12),
        "P" => decimal(15),
        "E" => decimal(18),
        _ => {
            let exponent = suffix
                .strip_prefix('e')
                .or_else(|| suffix.strip_prefix('E'))?;
            decimal(exponent.parse::<i32>().ok()?)
        }
    };
    Some(scale)
}

fn pow(base: u128, exponent: u32) -> Option<u128> {
    base.checked_pow(exponent)
}
