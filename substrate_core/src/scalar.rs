use std::cmp::Ordering;
use std::fmt;
use std::ops::{Add, AddAssign, Div, Mul, MulAssign, Neg, Sub, SubAssign};

use serde::{Deserialize, Serialize};

/// Q16.16 fixed-point scalar carried in an `i64` so long accumulations
/// (path costs, overburden loads) cannot wrap.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Scalar(pub i64);

impl Scalar {
    pub const FRAC_BITS: u32 = 16;
    pub const SCALE: i64 = 1 << Self::FRAC_BITS;
    pub const ZERO: Scalar = Scalar(0);
    pub const ONE: Scalar = Scalar(Self::SCALE);
    pub const HALF: Scalar = Scalar(Self::SCALE / 2);
    /// sqrt(2) in Q16.16, the 8-neighbour diagonal step factor.
    pub const DIAGONAL: Scalar = Scalar(92_682);
    pub const MAX: Scalar = Scalar(i64::MAX);
    pub const MIN: Scalar = Scalar(i64::MIN);

    pub fn from_f32(value: f32) -> Self {
        Self((value * Self::SCALE as f32).round() as i64)
    }

    pub fn from_int(value: i64) -> Self {
        Self(value.saturating_mul(Self::SCALE))
    }

    pub fn from_u32(value: u32) -> Self {
        Self((value as i64) * Self::SCALE)
    }

    /// Exact ratio `num / den`; zero when `den == 0`.
    pub fn from_ratio(num: i64, den: i64) -> Self {
        if den == 0 {
            return Self::ZERO;
        }
        Self((((num as i128) << Self::FRAC_BITS) / den as i128) as i64)
    }

    pub fn to_f32(self) -> f32 {
        self.0 as f32 / Self::SCALE as f32
    }

    pub fn zero() -> Self {
        Self::ZERO
    }

    pub fn one() -> Self {
        Self::ONE
    }

    pub fn raw(self) -> i64 {
        self.0
    }

    pub fn from_raw(value: i64) -> Self {
        Self(value)
    }

    pub fn abs(self) -> Self {
        Self(self.0.saturating_abs())
    }

    pub fn is_negative(self) -> bool {
        self.0 < 0
    }

    pub fn clamp(self, min: Self, max: Self) -> Self {
        match self.cmp(&min) {
            Ordering::Less => min,
            Ordering::Equal | Ordering::Greater => {
                if self > max {
                    max
                } else {
                    self
                }
            }
        }
    }

    /// Largest integer not greater than `self`.
    pub fn floor_to_int(self) -> i64 {
        self.0 >> Self::FRAC_BITS
    }

    /// Nearest integer, halves rounded away from zero.
    pub fn round_to_int(self) -> i64 {
        if self.0 >= 0 {
            self.0.saturating_add(Self::HALF.0) >> Self::FRAC_BITS
        } else {
            -(self.0.saturating_neg().saturating_add(Self::HALF.0) >> Self::FRAC_BITS)
        }
    }

    pub fn saturating_add(self, rhs: Self) -> Self {
        Self(self.0.saturating_add(rhs.0))
    }

    pub fn saturating_sub(self, rhs: Self) -> Self {
        Self(self.0.saturating_sub(rhs.0))
    }

    pub fn saturating_mul(self, rhs: Self) -> Self {
        let wide = (self.0 as i128 * rhs.0 as i128) >> Self::FRAC_BITS;
        Self(wide.clamp(i64::MIN as i128, i64::MAX as i128) as i64)
    }

    /// Multiplies by a plain integer factor.
    pub fn mul_int(self, factor: i64) -> Self {
        Self(self.0.saturating_mul(factor))
    }

    pub fn checked_div(self, rhs: Self) -> Option<Self> {
        if rhs.0 == 0 {
            return None;
        }
        let wide = ((self.0 as i128) << Self::FRAC_BITS) / rhs.0 as i128;
        Some(Self(wide.clamp(i64::MIN as i128, i64::MAX as i128) as i64))
    }
}

impl Add for Scalar {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        self.saturating_add(rhs)
    }
}

impl AddAssign for Scalar {
    fn add_assign(&mut self, rhs: Self) {
        *self = self.saturating_add(rhs);
    }
}

impl Sub for Scalar {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self::Output {
        self.saturating_sub(rhs)
    }
}

impl SubAssign for Scalar {
    fn sub_assign(&mut self, rhs: Self) {
        *self = self.saturating_sub(rhs);
    }
}

impl Mul for Scalar {
    type Output = Self;

    fn mul(self, rhs: Self) -> Self::Output {
        self.saturating_mul(rhs)
    }
}

impl MulAssign for Scalar {
    fn mul_assign(&mut self, rhs: Self) {
        *self = self.saturating_mul(rhs);
    }
}

/// Division by zero saturates toward the sign of the dividend.
impl Div for Scalar {
    type Output = Self;

    fn div(self, rhs: Self) -> Self::Output {
        self.checked_div(rhs).unwrap_or(if self.0 < 0 {
            Self::MIN
        } else {
            Self::MAX
        })
    }
}

impl Neg for Scalar {
    type Output = Self;

    fn neg(self) -> Self::Output {
        Self(self.0.saturating_neg())
    }
}

impl fmt::Debug for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.5}", self.to_f32())
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.5}", self.to_f32())
    }
}

pub fn scalar_from_f32(value: f32) -> Scalar {
    Scalar::from_f32(value)
}

pub fn scalar_from_int(value: i64) -> Scalar {
    Scalar::from_int(value)
}

pub fn scalar_zero() -> Scalar {
    Scalar::zero()
}

pub fn scalar_one() -> Scalar {
    Scalar::one()
}
