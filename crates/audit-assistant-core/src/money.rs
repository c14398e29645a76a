//! Exact monetary amounts.
//!
//! Amounts are held as signed integer cents so sums over the invoice table
//! are exact. Parsing accepts the shapes found in invoice CSV exports
//! (`2500`, `2500.0`, `45,231.10`, `$1,200.00`, `-12.5`); more than two
//! fractional digits are rounded half away from zero.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Sub};
use std::str::FromStr;

use crate::error::AuditError;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Money(i64);

impl Money {
    pub const ZERO: Money = Money(0);

    pub fn from_cents(cents: i64) -> Self {
        Self(cents)
    }

    pub fn cents(self) -> i64 {
        self.0
    }

    /// Render as `$1,234.56`.
    pub fn usd(self) -> String {
        if self.0 < 0 {
            format!("-${}", Money(-self.0))
        } else {
            format!("${}", self)
        }
    }

    /// Multiply by a rate (e.g. a tax rate of `0.08`), rounding to the cent.
    pub fn scale(self, rate: f64) -> Self {
        Self((self.0 as f64 * rate).round() as i64)
    }
}

/// Insert `,` every three digits from the right.
pub fn group_thousands(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        write!(f, "{}{}.{:02}", sign, group_thousands(abs / 100), abs % 100)
    }
}

impl FromStr for Money {
    type Err = AuditError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || AuditError::invalid_record(format!("invalid monetary amount: '{}'", s));

        let trimmed = s.trim();
        let (negative, rest) = match trimmed.strip_prefix('-') {
            Some(r) => (true, r),
            None => (false, trimmed),
        };
        let cleaned: String = rest
            .trim_start_matches('$')
            .chars()
            .filter(|c| *c != ',')
            .collect();
        if cleaned.is_empty() {
            return Err(invalid());
        }

        let (whole, frac) = match cleaned.split_once('.') {
            Some((w, f)) => (w, f),
            None => (cleaned.as_str(), ""),
        };
        if !whole.chars().all(|c| c.is_ascii_digit()) || !frac.chars().all(|c| c.is_ascii_digit())
        {
            return Err(invalid());
        }
        if whole.is_empty() && frac.is_empty() {
            return Err(invalid());
        }

        let whole_value: i64 = if whole.is_empty() {
            0
        } else {
            whole.parse().map_err(|_| invalid())?
        };

        let frac_digits: Vec<i64> = frac
            .chars()
            .map(|c| c.to_digit(10).map(i64::from).unwrap_or(0))
            .collect();
        let mut cents = frac_digits.first().copied().unwrap_or(0) * 10
            + frac_digits.get(1).copied().unwrap_or(0);
        if frac_digits.get(2).copied().unwrap_or(0) >= 5 {
            cents += 1;
        }

        let total = whole_value
            .checked_mul(100)
            .and_then(|v| v.checked_add(cents))
            .ok_or_else(invalid)?;

        Ok(Money(if negative { -total } else { total }))
    }
}

impl TryFrom<String> for Money {
    type Error = AuditError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Money> for String {
    fn from(value: Money) -> Self {
        let sign = if value.0 < 0 { "-" } else { "" };
        let abs = value.0.unsigned_abs();
        format!("{}{}.{:02}", sign, abs / 100, abs % 100)
    }
}

impl Add for Money {
    type Output = Money;

    fn add(self, rhs: Money) -> Money {
        Money(self.0 + rhs.0)
    }
}

impl AddAssign for Money {
    fn add_assign(&mut self, rhs: Money) {
        self.0 += rhs.0;
    }
}

impl Sub for Money {
    type Output = Money;

    fn sub(self, rhs: Money) -> Money {
        Money(self.0 - rhs.0)
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Money {
        iter.fold(Money::ZERO, |acc, m| acc + m)
    }
}

impl<'a> Sum<&'a Money> for Money {
    fn sum<I: Iterator<Item = &'a Money>>(iter: I) -> Money {
        iter.fold(Money::ZERO, |acc, m| acc + *m)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_thousands() {
        assert_eq!(Money::from_cents(4_523_110).to_string(), "45,231.10");
        assert_eq!(Money::from_cents(5).to_string(), "0.05");
        assert_eq!(Money::from_cents(123_456_789_00).to_string(), "123,456,789.00");
        assert_eq!(Money::from_cents(-250_000).usd(), "-$2,500.00");
    }

    #[test]
    fn test_parse_shapes() {
        assert_eq!("2500".parse::<Money>().unwrap().cents(), 250_000);
        assert_eq!("2500.0".parse::<Money>().unwrap().cents(), 250_000);
        assert_eq!("$45,231.10".parse::<Money>().unwrap().cents(), 4_523_110);
        assert_eq!("-12.5".parse::<Money>().unwrap().cents(), -1_250);
        assert_eq!(".75".parse::<Money>().unwrap().cents(), 75);
    }

    #[test]
    fn test_parse_rounds_third_digit() {
        assert_eq!("1234.5600000000001".parse::<Money>().unwrap().cents(), 123_456);
        assert_eq!("0.125".parse::<Money>().unwrap().cents(), 13);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!("".parse::<Money>().is_err());
        assert!("abc".parse::<Money>().is_err());
        assert!("12.3.4".parse::<Money>().is_err());
        assert!("$".parse::<Money>().is_err());
    }

    #[test]
    fn test_sum_is_exact() {
        let parts = ["0.10", "0.20", "0.30"];
        let total: Money = parts.iter().map(|p| p.parse::<Money>().unwrap()).sum();
        assert_eq!(total.to_string(), "0.60");
    }

    #[test]
    fn test_group_thousands() {
        assert_eq!(group_thousands(0), "0");
        assert_eq!(group_thousands(999), "999");
        assert_eq!(group_thousands(1000), "1,000");
        assert_eq!(group_thousands(1234567), "1,234,567");
    }
}
