//! Integer and fixed-point arithmetic
//!
//! One value representation per declared width. All binary operations go
//! through a single arbitrary-precision path: compute in `BigInt`, then
//! convert back under the kind's bounds. Checked widths raise `Overflow`
//! or `Underflow` on bounds violations, word widths wrap in two's
//! complement, and `Int`/`UInt` never overflow (`UInt` still underflows
//! below zero). Division and modulo by zero raise `DivisionByZero`.

use crate::error::RuntimeError;
use num_bigint::BigInt;
use num_traits::{One, ToPrimitive, Zero};
use std::cmp::Ordering;
use tally_core::types::{FixedKind, IntegerKind};

/// A runtime integer of a specific declared kind
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum IntegerValue {
    Int(BigInt),
    UInt(BigInt),
    Int8(i8),
    Int16(i16),
    Int32(i32),
    Int64(i64),
    Int128(i128),
    Int256(BigInt),
    UInt8(u8),
    UInt16(u16),
    UInt32(u32),
    UInt64(u64),
    UInt128(u128),
    UInt256(BigInt),
    Word8(u8),
    Word16(u16),
    Word32(u32),
    Word64(u64),
    Word128(u128),
}

/// Width in bits of a fixed-width kind; `None` for `Int`/`UInt`
fn bit_width(kind: IntegerKind) -> Option<u32> {
    match kind {
        IntegerKind::Int | IntegerKind::UInt => None,
        IntegerKind::Int8 | IntegerKind::UInt8 | IntegerKind::Word8 => Some(8),
        IntegerKind::Int16 | IntegerKind::UInt16 | IntegerKind::Word16 => Some(16),
        IntegerKind::Int32 | IntegerKind::UInt32 | IntegerKind::Word32 => Some(32),
        IntegerKind::Int64 | IntegerKind::UInt64 | IntegerKind::Word64 => Some(64),
        IntegerKind::Int128 | IntegerKind::UInt128 | IntegerKind::Word128 => Some(128),
        IntegerKind::Int256 | IntegerKind::UInt256 => Some(256),
    }
}

/// Inclusive bounds of a kind; `None` side means unbounded
fn bounds(kind: IntegerKind) -> (Option<BigInt>, Option<BigInt>) {
    match (bit_width(kind), kind.is_signed(), kind.is_word()) {
        (None, true, _) => (None, None),
        (None, false, _) => (Some(BigInt::zero()), None),
        (Some(bits), true, _) => {
            let half = BigInt::one() << (bits - 1);
            (Some(-half.clone()), Some(half - 1))
        }
        (Some(bits), false, _) => (Some(BigInt::zero()), Some((BigInt::one() << bits) - 1)),
    }
}

impl IntegerValue {
    pub fn kind(&self) -> IntegerKind {
        match self {
            IntegerValue::Int(_) => IntegerKind::Int,
            IntegerValue::UInt(_) => IntegerKind::UInt,
            IntegerValue::Int8(_) => IntegerKind::Int8,
            IntegerValue::Int16(_) => IntegerKind::Int16,
            IntegerValue::Int32(_) => IntegerKind::Int32,
            IntegerValue::Int64(_) => IntegerKind::Int64,
            IntegerValue::Int128(_) => IntegerKind::Int128,
            IntegerValue::Int256(_) => IntegerKind::Int256,
            IntegerValue::UInt8(_) => IntegerKind::UInt8,
            IntegerValue::UInt16(_) => IntegerKind::UInt16,
            IntegerValue::UInt32(_) => IntegerKind::UInt32,
            IntegerValue::UInt64(_) => IntegerKind::UInt64,
            IntegerValue::UInt128(_) => IntegerKind::UInt128,
            IntegerValue::UInt256(_) => IntegerKind::UInt256,
            IntegerValue::Word8(_) => IntegerKind::Word8,
            IntegerValue::Word16(_) => IntegerKind::Word16,
            IntegerValue::Word32(_) => IntegerKind::Word32,
            IntegerValue::Word64(_) => IntegerKind::Word64,
            IntegerValue::Word128(_) => IntegerKind::Word128,
        }
    }

    pub fn to_bigint(&self) -> BigInt {
        match self {
            IntegerValue::Int(v) | IntegerValue::UInt(v) => v.clone(),
            IntegerValue::Int256(v) | IntegerValue::UInt256(v) => v.clone(),
            IntegerValue::Int8(v) => BigInt::from(*v),
            IntegerValue::Int16(v) => BigInt::from(*v),
            IntegerValue::Int32(v) => BigInt::from(*v),
            IntegerValue::Int64(v) => BigInt::from(*v),
            IntegerValue::Int128(v) => BigInt::from(*v),
            IntegerValue::UInt8(v) => BigInt::from(*v),
            IntegerValue::UInt16(v) => BigInt::from(*v),
            IntegerValue::UInt32(v) => BigInt::from(*v),
            IntegerValue::UInt64(v) => BigInt::from(*v),
            IntegerValue::UInt128(v) => BigInt::from(*v),
            IntegerValue::Word8(v) => BigInt::from(*v),
            IntegerValue::Word16(v) => BigInt::from(*v),
            IntegerValue::Word32(v) => BigInt::from(*v),
            IntegerValue::Word64(v) => BigInt::from(*v),
            IntegerValue::Word128(v) => BigInt::from(*v),
        }
    }

    /// Convert an unbounded result back into a kind, raising on bounds
    /// violations. Word kinds never fail here; callers wrap first.
    pub fn from_bigint(kind: IntegerKind, value: BigInt) -> Result<IntegerValue, RuntimeError> {
        let (min, max) = bounds(kind);
        if let Some(min) = &min
            && value < *min
        {
            return Err(RuntimeError::Underflow {
                ty: kind.name().to_string(),
            });
        }
        if let Some(max) = &max
            && value > *max
        {
            return Err(RuntimeError::Overflow {
                ty: kind.name().to_string(),
            });
        }
        Ok(Self::from_bigint_unchecked(kind, value))
    }

    fn from_bigint_unchecked(kind: IntegerKind, value: BigInt) -> IntegerValue {
        match kind {
            IntegerKind::Int => IntegerValue::Int(value),
            IntegerKind::UInt => IntegerValue::UInt(value),
            IntegerKind::Int256 => IntegerValue::Int256(value),
            IntegerKind::UInt256 => IntegerValue::UInt256(value),
            IntegerKind::Int8 => IntegerValue::Int8(value.to_i8().unwrap_or_default()),
            IntegerKind::Int16 => IntegerValue::Int16(value.to_i16().unwrap_or_default()),
            IntegerKind::Int32 => IntegerValue::Int32(value.to_i32().unwrap_or_default()),
            IntegerKind::Int64 => IntegerValue::Int64(value.to_i64().unwrap_or_default()),
            IntegerKind::Int128 => IntegerValue::Int128(value.to_i128().unwrap_or_default()),
            IntegerKind::UInt8 | IntegerKind::Word8 => {
                let v = value.to_u8().unwrap_or_default();
                if kind == IntegerKind::UInt8 {
                    IntegerValue::UInt8(v)
                } else {
                    IntegerValue::Word8(v)
                }
            }
            IntegerKind::UInt16 | IntegerKind::Word16 => {
                let v = value.to_u16().unwrap_or_default();
                if kind == IntegerKind::UInt16 {
                    IntegerValue::UInt16(v)
                } else {
                    IntegerValue::Word16(v)
                }
            }
            IntegerKind::UInt32 | IntegerKind::Word32 => {
                let v = value.to_u32().unwrap_or_default();
                if kind == IntegerKind::UInt32 {
                    IntegerValue::UInt32(v)
                } else {
                    IntegerValue::Word32(v)
                }
            }
            IntegerKind::UInt64 | IntegerKind::Word64 => {
                let v = value.to_u64().unwrap_or_default();
                if kind == IntegerKind::UInt64 {
                    IntegerValue::UInt64(v)
                } else {
                    IntegerValue::Word64(v)
                }
            }
            IntegerKind::UInt128 | IntegerKind::Word128 => {
                let v = value.to_u128().unwrap_or_default();
                if kind == IntegerKind::UInt128 {
                    IntegerValue::UInt128(v)
                } else {
                    IntegerValue::Word128(v)
                }
            }
        }
    }

    /// Wrap an unbounded result into a word width's two's-complement
    /// range
    fn wrap(kind: IntegerKind, value: BigInt) -> IntegerValue {
        let bits = bit_width(kind).unwrap_or(128);
        let modulus = BigInt::one() << bits;
        let wrapped = ((value % &modulus) + &modulus) % &modulus;
        Self::from_bigint_unchecked(kind, wrapped)
    }

    fn binary(
        &self,
        other: &IntegerValue,
        op: impl FnOnce(BigInt, BigInt) -> BigInt,
    ) -> Result<IntegerValue, RuntimeError> {
        let kind = self.kind();
        let result = op(self.to_bigint(), other.to_bigint());
        if kind.is_word() {
            Ok(Self::wrap(kind, result))
        } else {
            Self::from_bigint(kind, result)
        }
    }

    pub fn add(&self, other: &IntegerValue) -> Result<IntegerValue, RuntimeError> {
        self.binary(other, |a, b| a + b)
    }

    pub fn subtract(&self, other: &IntegerValue) -> Result<IntegerValue, RuntimeError> {
        self.binary(other, |a, b| a - b)
    }

    pub fn multiply(&self, other: &IntegerValue) -> Result<IntegerValue, RuntimeError> {
        self.binary(other, |a, b| a * b)
    }

    pub fn divide(&self, other: &IntegerValue) -> Result<IntegerValue, RuntimeError> {
        if other.to_bigint().is_zero() {
            return Err(RuntimeError::DivisionByZero);
        }
        self.binary(other, |a, b| a / b)
    }

    pub fn modulo(&self, other: &IntegerValue) -> Result<IntegerValue, RuntimeError> {
        if other.to_bigint().is_zero() {
            return Err(RuntimeError::DivisionByZero);
        }
        self.binary(other, |a, b| a % b)
    }

    pub fn negate(&self) -> Result<IntegerValue, RuntimeError> {
        let kind = self.kind();
        if kind.is_word() {
            return Ok(Self::wrap(kind, -self.to_bigint()));
        }
        Self::from_bigint(kind, -self.to_bigint())
    }

    /// Numeric ordering; kinds are compared by magnitude, mixed kinds
    /// only ever reach here through checked programs comparing same
    /// kinds
    pub fn compare(&self, other: &IntegerValue) -> Ordering {
        self.to_bigint().cmp(&other.to_bigint())
    }
}

impl std::fmt::Display for IntegerValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_bigint())
    }
}

/// Mantissa scale of the fixed-point types: 10^8
pub const FIXED_SCALE: i128 = 100_000_000;

/// A runtime fixed-point number carrying its raw mantissa
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FixedValue {
    Fix64(i64),
    UFix64(u64),
}

impl FixedValue {
    pub fn kind(&self) -> FixedKind {
        match self {
            FixedValue::Fix64(_) => FixedKind::Fix64,
            FixedValue::UFix64(_) => FixedKind::UFix64,
        }
    }

    fn raw(&self) -> i128 {
        match self {
            FixedValue::Fix64(v) => *v as i128,
            FixedValue::UFix64(v) => *v as i128,
        }
    }

    fn from_raw(kind: FixedKind, raw: i128) -> Result<FixedValue, RuntimeError> {
        match kind {
            FixedKind::Fix64 => {
                if raw > i64::MAX as i128 {
                    Err(RuntimeError::Overflow {
                        ty: kind.name().to_string(),
                    })
                } else if raw < i64::MIN as i128 {
                    Err(RuntimeError::Underflow {
                        ty: kind.name().to_string(),
                    })
                } else {
                    Ok(FixedValue::Fix64(raw as i64))
                }
            }
            FixedKind::UFix64 => {
                if raw > u64::MAX as i128 {
                    Err(RuntimeError::Overflow {
                        ty: kind.name().to_string(),
                    })
                } else if raw < 0 {
                    Err(RuntimeError::Underflow {
                        ty: kind.name().to_string(),
                    })
                } else {
                    Ok(FixedValue::UFix64(raw as u64))
                }
            }
        }
    }

    /// Construct from a raw mantissa (literal elaboration)
    pub fn from_mantissa(kind: FixedKind, raw: i128) -> Result<FixedValue, RuntimeError> {
        Self::from_raw(kind, raw)
    }

    pub fn add(&self, other: &FixedValue) -> Result<FixedValue, RuntimeError> {
        Self::from_raw(self.kind(), self.raw() + other.raw())
    }

    pub fn subtract(&self, other: &FixedValue) -> Result<FixedValue, RuntimeError> {
        Self::from_raw(self.kind(), self.raw() - other.raw())
    }

    pub fn multiply(&self, other: &FixedValue) -> Result<FixedValue, RuntimeError> {
        Self::from_raw(self.kind(), self.raw() * other.raw() / FIXED_SCALE)
    }

    pub fn divide(&self, other: &FixedValue) -> Result<FixedValue, RuntimeError> {
        if other.raw() == 0 {
            return Err(RuntimeError::DivisionByZero);
        }
        Self::from_raw(self.kind(), self.raw() * FIXED_SCALE / other.raw())
    }

    pub fn negate(&self) -> Result<FixedValue, RuntimeError> {
        match self {
            FixedValue::Fix64(v) => Self::from_raw(FixedKind::Fix64, -(*v as i128)),
            FixedValue::UFix64(_) => Err(RuntimeError::Underflow {
                ty: FixedKind::UFix64.name().to_string(),
            }),
        }
    }

    pub fn compare(&self, other: &FixedValue) -> Ordering {
        self.raw().cmp(&other.raw())
    }
}

impl std::fmt::Display for FixedValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let raw = self.raw();
        let negative = raw < 0;
        let magnitude = raw.unsigned_abs();
        let integer = magnitude / FIXED_SCALE as u128;
        let fraction = magnitude % FIXED_SCALE as u128;
        let mut fraction_digits = format!("{:08}", fraction);
        while fraction_digits.len() > 1 && fraction_digits.ends_with('0') {
            fraction_digits.pop();
        }
        if negative {
            write!(f, "-{}.{}", integer, fraction_digits)
        } else {
            write!(f, "{}.{}", integer, fraction_digits)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uint8_overflow() {
        let a = IntegerValue::UInt8(250);
        let b = IntegerValue::UInt8(10);
        assert!(matches!(a.add(&b), Err(RuntimeError::Overflow { .. })));
    }

    #[test]
    fn test_uint8_underflow() {
        let a = IntegerValue::UInt8(3);
        let b = IntegerValue::UInt8(10);
        assert!(matches!(a.subtract(&b), Err(RuntimeError::Underflow { .. })));
    }

    #[test]
    fn test_word8_wraps() {
        let a = IntegerValue::Word8(250);
        let b = IntegerValue::Word8(10);
        assert_eq!(a.add(&b).unwrap(), IntegerValue::Word8(4));

        let c = IntegerValue::Word8(3);
        assert_eq!(c.subtract(&b).unwrap(), IntegerValue::Word8(249));
    }

    #[test]
    fn test_int_is_arbitrary_precision() {
        let big = IntegerValue::Int(BigInt::from(i128::MAX));
        let result = big.multiply(&big).unwrap();
        assert_eq!(
            result.to_bigint(),
            BigInt::from(i128::MAX) * BigInt::from(i128::MAX)
        );
    }

    #[test]
    fn test_uint_underflows_below_zero() {
        let a = IntegerValue::UInt(BigInt::from(1));
        let b = IntegerValue::UInt(BigInt::from(2));
        assert!(matches!(a.subtract(&b), Err(RuntimeError::Underflow { .. })));
    }

    #[test]
    fn test_int256_bounds() {
        let max = (BigInt::one() << 255) - 1;
        let a = IntegerValue::Int256(max);
        let one = IntegerValue::Int256(BigInt::one());
        assert!(matches!(a.add(&one), Err(RuntimeError::Overflow { .. })));
    }

    #[test]
    fn test_division_by_zero() {
        let a = IntegerValue::Int64(10);
        let zero = IntegerValue::Int64(0);
        assert_eq!(a.divide(&zero), Err(RuntimeError::DivisionByZero));
        assert_eq!(a.modulo(&zero), Err(RuntimeError::DivisionByZero));
    }

    #[test]
    fn test_fixed_multiply_scales() {
        // 1.5 * 2.0 == 3.0
        let a = FixedValue::UFix64(150_000_000);
        let b = FixedValue::UFix64(200_000_000);
        assert_eq!(a.multiply(&b).unwrap(), FixedValue::UFix64(300_000_000));
    }

    #[test]
    fn test_fixed_divide() {
        // 3.0 / 2.0 == 1.5
        let a = FixedValue::UFix64(300_000_000);
        let b = FixedValue::UFix64(200_000_000);
        assert_eq!(a.divide(&b).unwrap(), FixedValue::UFix64(150_000_000));
        let zero = FixedValue::UFix64(0);
        assert_eq!(a.divide(&zero), Err(RuntimeError::DivisionByZero));
    }

    #[test]
    fn test_fixed_display() {
        assert_eq!(format!("{}", FixedValue::UFix64(150_000_000)), "1.5");
        assert_eq!(format!("{}", FixedValue::UFix64(100_000_000)), "1.0");
        assert_eq!(format!("{}", FixedValue::Fix64(-123_456)), "-0.00123456");
    }

    #[test]
    fn test_ufix64_negate_underflows() {
        assert!(matches!(
            FixedValue::UFix64(1).negate(),
            Err(RuntimeError::Underflow { .. })
        ));
    }
}
