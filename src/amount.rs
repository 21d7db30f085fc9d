use rust_decimal::{Decimal, RoundingStrategy};
use std::str::FromStr;

use crate::error::{AmountError, OfaError};

// Characters that carry meaning inside a formula and so cannot act as separators
const RESERVED_CHARS: &[char] = &['+', '-', '*', '/', '(', ')', '%'];

const MAX_DIGITS: u32 = 8;

/// How amounts are displayed and read back, as configured for the dossier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AmountFormat {
    pub decimal_sep: char,
    pub thousands_sep: Option<char>,
    pub digits: u32,
}

impl Default for AmountFormat {
    fn default() -> AmountFormat {
        AmountFormat {
            decimal_sep: '.',
            thousands_sep: Some(','),
            digits: 2,
        }
    }
}

impl AmountFormat {
    pub fn new(
        decimal_sep: char,
        thousands_sep: Option<char>,
        digits: u32,
    ) -> Result<AmountFormat, OfaError> {
        fn check_separator(sep: char, what: &str) -> Result<(), OfaError> {
            if sep.is_ascii_digit() || RESERVED_CHARS.contains(&sep) {
                return Err(OfaError::Config(format!(
                    "{:?} cannot be used as {} separator",
                    sep, what
                )));
            }
            Ok(())
        }

        check_separator(decimal_sep, "decimal")?;
        if let Some(sep) = thousands_sep {
            check_separator(sep, "thousands")?;
            if sep == decimal_sep {
                return Err(OfaError::Config(String::from(
                    "Decimal and thousands separators must differ",
                )));
            }
        }
        if digits > MAX_DIGITS {
            return Err(OfaError::Config(format!(
                "At most {} decimal digits are supported",
                MAX_DIGITS
            )));
        }

        Ok(AmountFormat {
            decimal_sep,
            thousands_sep,
            digits,
        })
    }

    /// Round the way displayed amounts are rounded.
    pub fn round(&self, amount: &Decimal) -> Decimal {
        amount.round_dp_with_strategy(self.digits, RoundingStrategy::MidpointAwayFromZero)
    }
}

/**
 * Format the amount for display with the configured separators.
 *
 * The integer part is grouped by thousands; the fractional part is always
 * padded to the configured number of digits.
 */
pub fn amount_to_str(amount: &Decimal, format: &AmountFormat) -> String {
    let rounded = format.round(amount);
    let unsigned = format!("{:.*}", format.digits as usize, rounded.abs());

    let (int_part, frac_part) = match unsigned.split_once('.') {
        Some((int_part, frac_part)) => (int_part, Some(frac_part)),
        None => (unsigned.as_str(), None),
    };

    let grouped = match format.thousands_sep {
        Some(sep) => {
            let digits: Vec<char> = int_part.chars().collect();
            digits
                .rchunks(3)
                .rev()
                .map(|chunk| chunk.iter().collect::<String>())
                .collect::<Vec<String>>()
                .join(&sep.to_string())
        }
        None => int_part.to_string(),
    };

    let sign = if rounded.is_sign_negative() && !rounded.is_zero() {
        "-"
    } else {
        ""
    };
    match frac_part {
        Some(frac) => format!("{}{}{}{}", sign, grouped, format.decimal_sep, frac),
        None => format!("{}{}", sign, grouped),
    }
}

/// Read an amount typed (or displayed) with the configured separators.
pub fn amount_from_str(text: &str, format: &AmountFormat) -> Result<Decimal, AmountError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(AmountError::Empty);
    }

    let normalized: String = trimmed
        .chars()
        .filter(|c| Some(*c) != format.thousands_sep)
        .map(|c| if c == format.decimal_sep { '.' } else { c })
        .collect();

    Decimal::from_str(&normalized).map_err(|_| AmountError::Invalid(trimmed.to_string()))
}
