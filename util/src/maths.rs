//! Utility maths functions

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use num_traits::{Float, Signed, Zero};

/// Clamp a value into the range `[min, max]`.
pub fn clamp<T>(value: &T, min: &T, max: &T) -> T 
where
    T: Float
{
    let mut ret = *value;

    if ret > *max {
        ret = *max
    }
    if ret < *min {
        ret = *min
    }

    ret
}

/// Clamp a value into the symmetric range `[-limit, limit]`.
pub fn clamp_sym<T>(value: T, limit: T) -> T
where
    T: Float
{
    let limit = limit.abs();
    clamp(&value, &-limit, &limit)
}

/// Sign of an integer-like value as -1, 0 or +1.
///
/// Unlike `signum` on floats, zero maps to zero.
pub fn sign<T>(value: T) -> T
where
    T: Signed + Zero + Copy
{
    if value.is_zero() {
        T::zero()
    }
    else {
        value.signum()
    }
}
