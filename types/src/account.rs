//! Account identifiers.
//!
//! An account is a 256-bit number (the Ed25519 public key of the chain
//! owner). Byte order is big-endian, so lexicographic comparison of the raw
//! bytes matches numeric comparison; the frontier scanner relies on this to
//! partition the account space into ordered ranges.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A 256-bit account identifier.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Account([u8; 32]);

impl Account {
    pub const ZERO: Self = Self([0u8; 32]);
    pub const MAX: Self = Self([0xFF; 32]);

    pub fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 32]
    }

    /// Big-endian 64-bit limbs of the account number, most significant first.
    fn limbs(&self) -> [u64; 4] {
        let mut limbs = [0u64; 4];
        for (i, limb) in limbs.iter_mut().enumerate() {
            let mut chunk = [0u8; 8];
            chunk.copy_from_slice(&self.0[i * 8..(i + 1) * 8]);
            *limb = u64::from_be_bytes(chunk);
        }
        limbs
    }

    fn from_limbs(limbs: [u64; 4]) -> Self {
        let mut bytes = [0u8; 32];
        for (i, limb) in limbs.iter().enumerate() {
            bytes[i * 8..(i + 1) * 8].copy_from_slice(&limb.to_be_bytes());
        }
        Self(bytes)
    }

    /// Divide the account number by a small divisor, truncating.
    fn div(&self, divisor: u64) -> Self {
        debug_assert!(divisor > 0);
        let limbs = self.limbs();
        let mut quotient = [0u64; 4];
        let mut remainder: u128 = 0;
        for i in 0..4 {
            let current = (remainder << 64) | u128::from(limbs[i]);
            quotient[i] = (current / u128::from(divisor)) as u64;
            remainder = current % u128::from(divisor);
        }
        Self::from_limbs(quotient)
    }

    /// Multiply the account number by a small factor, saturating at `MAX`.
    fn mul(&self, factor: u64) -> Self {
        let limbs = self.limbs();
        let mut result = [0u64; 4];
        let mut carry: u128 = 0;
        for i in (0..4).rev() {
            let product = u128::from(limbs[i]) * u128::from(factor) + carry;
            result[i] = product as u64;
            carry = product >> 64;
        }
        if carry != 0 {
            return Self::MAX;
        }
        Self::from_limbs(result)
    }

    fn checked_add(&self, other: &Self) -> Option<Self> {
        let a = self.limbs();
        let b = other.limbs();
        let mut result = [0u64; 4];
        let mut carry: u128 = 0;
        for i in (0..4).rev() {
            let sum = u128::from(a[i]) + u128::from(b[i]) + carry;
            result[i] = sum as u64;
            carry = sum >> 64;
        }
        if carry != 0 {
            return None;
        }
        Some(Self::from_limbs(result))
    }

    /// The numerically next account, or `None` at the top of the space.
    /// Range scans use this to resume after the last visited account.
    pub fn increment(&self) -> Option<Self> {
        let mut bytes = *self.as_bytes();
        for byte in bytes.iter_mut().rev() {
            if *byte == 0xFF {
                *byte = 0;
            } else {
                *byte += 1;
                return Some(Self(bytes));
            }
        }
        None
    }

    /// Bounds of the `index`-th of `count` consecutive, equal partitions of
    /// the account space. The last partition absorbs the division remainder
    /// so the ranges cover the full space. Returns `(start, end)` with the
    /// end exclusive (the last range ends at `MAX`).
    pub fn range_bounds(index: u64, count: u64) -> (Self, Self) {
        debug_assert!(count > 0);
        debug_assert!(index < count);
        let range_size = Self::MAX.div(count);
        let start = range_size.mul(index);
        let end = if index == count - 1 {
            Self::MAX
        } else {
            start
                .checked_add(&range_size)
                .expect("partition end overflows only on the final range")
        };
        (start, end)
    }
}

impl fmt::Debug for Account {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Account(")?;
        for b in &self.0[..4] {
            write!(f, "{:02x}", b)?;
        }
        write!(f, ")")
    }
}

impl fmt::Display for Account {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for b in &self.0 {
            write!(f, "{:02X}", b)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ordering_matches_numeric() {
        let small = Account::new([0u8; 32]);
        let mut one = [0u8; 32];
        one[31] = 1;
        let big = Account::new([0xFF; 32]);
        assert!(small < Account::new(one));
        assert!(Account::new(one) < big);
    }

    #[test]
    fn range_bounds_cover_space() {
        let parallelism = 4;
        let mut previous_end = Account::ZERO;
        for i in 0..parallelism {
            let (start, end) = Account::range_bounds(i, parallelism);
            assert_eq!(start, previous_end, "ranges must be consecutive");
            assert!(start < end);
            previous_end = end;
        }
        assert_eq!(previous_end, Account::MAX);
    }

    #[test]
    fn single_range_is_whole_space() {
        let (start, end) = Account::range_bounds(0, 1);
        assert_eq!(start, Account::ZERO);
        assert_eq!(end, Account::MAX);
    }

    #[test]
    fn div_by_one_is_identity() {
        let account = Account::new([0xAB; 32]);
        assert_eq!(account.div(1), account);
    }
}
