//! # Money Module
//!
//! Provides the `Money` type for handling monetary values safely.
//!
//! ## Why Integer Money?
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  THE FLOATING POINT PROBLEM                                             │
//! │                                                                         │
//! │    0.1 + 0.2 = 0.30000000000000004  ❌ WRONG!                           │
//! │                                                                         │
//! │  A ledger built on floats drifts: profit != selling - buying after     │
//! │  enough rows. OUR SOLUTION: integer minor units (cents).               │
//! │                                                                         │
//! │    profit = 24000 - 15000 = 9000 cents, exactly                        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The payment gateway only accepts whole currency units, so the one
//! conversion that rounds lives here too: [`Money::whole_units_ceil`].

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, AddAssign, Mul, Sub, SubAssign};

/// Number of minor units in one major unit.
pub const MINOR_UNITS_PER_MAJOR: i64 = 100;

// =============================================================================
// Money Type
// =============================================================================

/// A monetary value in the smallest currency unit.
///
/// ## Design Decisions
/// - **i64 (signed)**: a cash sale's balance is negative on underpayment
/// - **Single field tuple struct**: serializes as a bare JSON number
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Money(i64);

impl Money {
    /// Creates a Money value from cents (the smallest currency unit).
    ///
    /// ```rust
    /// use duka_core::money::Money;
    ///
    /// let price = Money::from_cents(1099);
    /// assert_eq!(price.cents(), 1099);
    /// ```
    #[inline]
    pub const fn from_cents(cents: i64) -> Self {
        Money(cents)
    }

    /// Creates a Money value from whole currency units.
    ///
    /// ```rust
    /// use duka_core::money::Money;
    ///
    /// assert_eq!(Money::from_major(25).cents(), 2500);
    /// ```
    #[inline]
    pub const fn from_major(units: i64) -> Self {
        Money(units * MINOR_UNITS_PER_MAJOR)
    }

    /// Returns the value in cents.
    #[inline]
    pub const fn cents(&self) -> i64 {
        self.0
    }

    /// Returns zero money value.
    #[inline]
    pub const fn zero() -> Self {
        Money(0)
    }

    /// Checks if the value is zero.
    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Checks if the value is negative (less than zero).
    #[inline]
    pub const fn is_negative(&self) -> bool {
        self.0 < 0
    }

    /// Multiplies money by a quantity.
    ///
    /// ```rust
    /// use duka_core::money::Money;
    ///
    /// let unit_price = Money::from_cents(80);
    /// assert_eq!(unit_price.multiply_quantity(3).cents(), 240);
    /// ```
    #[inline]
    pub const fn multiply_quantity(&self, qty: i64) -> Self {
        Money(self.0 * qty)
    }

    /// Whole currency units, rounded up.
    ///
    /// STK push amounts are integers; rounding up means the customer is
    /// never prompted for less than the sale total.
    ///
    /// ```rust
    /// use duka_core::money::Money;
    ///
    /// assert_eq!(Money::from_cents(24000).whole_units_ceil(), 240);
    /// assert_eq!(Money::from_cents(24001).whole_units_ceil(), 241);
    /// ```
    pub fn whole_units_ceil(&self) -> i64 {
        let whole = self.0.div_euclid(MINOR_UNITS_PER_MAJOR);
        if self.0.rem_euclid(MINOR_UNITS_PER_MAJOR) == 0 {
            whole
        } else {
            whole + 1
        }
    }
}

// =============================================================================
// Trait Implementations
// =============================================================================

/// Debug-oriented display: `240.00`, `-5.50`. Currency symbols are a client
/// concern.
impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.abs();
        write!(
            f,
            "{}{}.{:02}",
            sign,
            abs / MINOR_UNITS_PER_MAJOR,
            abs % MINOR_UNITS_PER_MAJOR
        )
    }
}

impl Default for Money {
    fn default() -> Self {
        Money::zero()
    }
}

impl Add for Money {
    type Output = Self;

    #[inline]
    fn add(self, other: Self) -> Self {
        Money(self.0 + other.0)
    }
}

impl AddAssign for Money {
    #[inline]
    fn add_assign(&mut self, other: Self) {
        self.0 += other.0;
    }
}

impl Sub for Money {
    type Output = Self;

    #[inline]
    fn sub(self, other: Self) -> Self {
        Money(self.0 - other.0)
    }
}

impl SubAssign for Money {
    #[inline]
    fn sub_assign(&mut self, other: Self) {
        self.0 -= other.0;
    }
}

/// Multiplication by i64 (for quantity calculations).
impl Mul<i64> for Money {
    type Output = Self;

    #[inline]
    fn mul(self, qty: i64) -> Self {
        Money(self.0 * qty)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
