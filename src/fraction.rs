//! Exact rational numbers for measure beats and durations.
//!
//! Beats are compared exactly; floating point never takes part in an
//! ordering decision. A `Fraction` keeps the terms it was built with so a
//! 6/8 time component still reads as 6/8, while every arithmetic result is
//! reduced.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

use num_rational::Ratio;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Fraction {
    pub numerator: i64,
    pub denominator: i64,
}

impl Fraction {
    /// Build a fraction, panicking on a zero denominator.
    ///
    /// Use this for terms the crate derives itself; input coming from a
    /// document goes through [`Fraction::try_new`].
    pub fn new(numerator: i64, denominator: i64) -> Self {
        assert!(denominator != 0, "fraction {numerator}/0 has a zero denominator");
        let (numerator, denominator) = if denominator < 0 {
            (-numerator, -denominator)
        } else {
            (numerator, denominator)
        };
        Self { numerator, denominator }
    }

    pub fn try_new(numerator: i64, denominator: i64) -> Result<Self> {
        if denominator == 0 {
            return Err(Error::InvalidFraction(format!(
                "{numerator}/0 has a zero denominator"
            )));
        }
        Ok(Self::new(numerator, denominator))
    }

    pub const fn zero() -> Self {
        Self { numerator: 0, denominator: 1 }
    }

    pub fn from_integer(value: i64) -> Self {
        Self::new(value, 1)
    }

    /// Convert a decimal into a fraction by scaling with the power of ten
    /// implied by its written digits, e.g. `0.375` → `375/1000` → `3/8`.
    pub fn from_decimal(value: f64) -> Result<Self> {
        if !value.is_finite() {
            return Err(Error::InvalidFraction(format!("{value} is not a finite decimal")));
        }
        let text = format!("{value}");
        let decimals = text.split_once('.').map_or(0, |(_, frac)| frac.len()) as u32;
        let scale = 10i64
            .checked_pow(decimals)
            .ok_or_else(|| Error::InvalidFraction(format!("{value} has too many decimals")))?;
        let scaled = (value * scale as f64).round();
        if scaled.abs() >= i64::MAX as f64 {
            return Err(Error::InvalidFraction(format!("{value} is out of range")));
        }
        Ok(Self::new(scaled as i64, scale).simplify())
    }

    pub fn simplify(&self) -> Self {
        Self::from_ratio(self.ratio())
    }

    pub fn add(&self, other: &Fraction) -> Self {
        Self::from_ratio(self.ratio() + other.ratio())
    }

    pub fn subtract(&self, other: &Fraction) -> Self {
        Self::from_ratio(self.ratio() - other.ratio())
    }

    pub fn multiply(&self, other: &Fraction) -> Self {
        Self::from_ratio(self.ratio() * other.ratio())
    }

    pub fn divide(&self, other: &Fraction) -> Self {
        assert!(other.numerator != 0, "division of {self} by zero");
        Self::from_ratio(self.ratio() / other.ratio())
    }

    pub fn is_equal(&self, other: &Fraction) -> bool {
        self.cmp(other) == Ordering::Equal
    }

    pub fn is_less_than(&self, other: &Fraction) -> bool {
        self.cmp(other) == Ordering::Less
    }

    pub fn is_less_than_or_equal_to(&self, other: &Fraction) -> bool {
        self.cmp(other) != Ordering::Greater
    }

    pub fn is_greater_than(&self, other: &Fraction) -> bool {
        self.cmp(other) == Ordering::Greater
    }

    pub fn is_zero(&self) -> bool {
        self.numerator == 0
    }

    /// Lossy conversion for geometry only; never used to order beats.
    pub fn to_f64(&self) -> f64 {
        self.numerator as f64 / self.denominator as f64
    }

    fn ratio(&self) -> Ratio<i64> {
        Ratio::new(self.numerator, self.denominator)
    }

    fn from_ratio(ratio: Ratio<i64>) -> Self {
        Self {
            numerator: *ratio.numer(),
            denominator: *ratio.denom(),
        }
    }
}

impl Default for Fraction {
    fn default() -> Self {
        Self::zero()
    }
}

impl PartialEq for Fraction {
    fn eq(&self, other: &Self) -> bool {
        self.is_equal(other)
    }
}

impl Eq for Fraction {}

impl PartialOrd for Fraction {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Fraction {
    fn cmp(&self, other: &Self) -> Ordering {
        // Denominators are positive, so cross-multiplication keeps the order.
        let lhs = self.numerator as i128 * other.denominator as i128;
        let rhs = other.numerator as i128 * self.denominator as i128;
        lhs.cmp(&rhs)
    }
}

impl Hash for Fraction {
    fn hash<H: Hasher>(&self, state: &mut H) {
        let simplified = self.simplify();
        simplified.numerator.hash(state);
        simplified.denominator.hash(state);
    }
}

impl fmt::Display for Fraction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.numerator, self.denominator)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn adding_the_negation_gives_zero_over_one() {
        for (n, d) in [(1, 4), (3, 8), (-5, 6), (7, 1), (0, 3)] {
            let sum = Fraction::new(n, d).add(&Fraction::new(-n, d)).simplify();
            assert_eq!((sum.numerator, sum.denominator), (0, 1));
        }
    }

    #[test]
    fn add_then_subtract_round_trips() {
        let values = [Fraction::new(1, 3), Fraction::new(-2, 5), Fraction::new(7, 4)];
        for a in values {
            for b in values {
                assert!(a.add(&b).subtract(&b).is_equal(&a), "{a} {b}");
            }
        }
    }

    #[test]
    fn multiply_then_divide_round_trips() {
        let a = Fraction::new(3, 7);
        let b = Fraction::new(-9, 2);
        assert!(a.multiply(&b).divide(&b).is_equal(&a));
    }

    #[test]
    fn zero_denominator_is_rejected() {
        assert!(matches!(Fraction::try_new(1, 0), Err(Error::InvalidFraction(_))));
    }

    #[test]
    #[should_panic]
    fn zero_denominator_panics_in_new() {
        let _ = Fraction::new(3, 0);
    }

    #[test]
    fn raw_terms_are_kept_until_simplified() {
        let six_eighths = Fraction::new(6, 8);
        assert_eq!(six_eighths.numerator, 6);
        assert_eq!(six_eighths.simplify().numerator, 3);
        assert_eq!(six_eighths, Fraction::new(3, 4));
    }

    #[test]
    fn negative_denominator_moves_sign_to_numerator() {
        let f = Fraction::new(1, -2);
        assert_eq!((f.numerator, f.denominator), (-1, 2));
    }

    #[test]
    fn decimals_scale_to_their_implied_denominator() {
        let f = Fraction::from_decimal(0.375).unwrap();
        assert_eq!((f.numerator, f.denominator), (3, 8));
        let whole = Fraction::from_decimal(2.0).unwrap();
        assert_eq!((whole.numerator, whole.denominator), (2, 1));
        assert!(Fraction::from_decimal(f64::NAN).is_err());
    }

    #[test]
    fn comparisons_are_exact() {
        let third = Fraction::new(1, 3);
        let quarter = Fraction::new(1, 4);
        assert!(quarter.is_less_than(&third));
        assert!(third.is_greater_than(&quarter));
        assert!(third.is_less_than_or_equal_to(&Fraction::new(2, 6)));
        assert_eq!(quarter.add(&quarter), Fraction::new(1, 2));
    }
}
