//! Fractional baud-rate divider search.
//!
//! The USART derives its bit clock as `pclk / (16 * divisor * (1 + d/m))`
//! with a 16-bit integer `divisor`, a multiplier `m ∈ [1, 15]` and a
//! fractional add value `d ∈ [0, m)`. [`compute`] searches all 120 `(m, d)`
//! pairs for the combination closest to a target rate. The function is pure;
//! committing the result to the divisor latches is the caller's job.

use fugit::HertzU32;

use crate::Error;

/// Largest accepted relative error between target and achieved rate, in
/// percent.
pub const MAX_ERROR_PERCENT: u32 = 3;

/// A committed divider solution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Divisors {
    /// Integer divisor, in `[1, 65536]`.
    pub divisor: u32,
    /// Fractional multiplier `m`, in `[1, 15]`.
    pub mul: u8,
    /// Fractional add value `d`, in `[0, m)`.
    pub div_add: u8,
    /// Rate actually produced by this combination.
    pub actual: HertzU32,
}

/// Finds the divider combination closest to `target` for a peripheral clock
/// of `pclk`.
///
/// Evaluates every `(m, d)` pair over a 32.32 fixed-point quotient, rounds
/// to the nearest integer divisor, rejects divisors outside `[1, 65536]` and
/// keeps the candidate with the smallest scaled error, short-circuiting on
/// an exact match. Fails with [`Error::NoDivisorFound`] when no pair yields
/// a valid divisor and with [`Error::BaudRateOutOfTolerance`] when the best
/// candidate misses the target by [`MAX_ERROR_PERCENT`] or more.
pub fn compute(target: HertzU32, pclk: HertzU32) -> Result<Divisors, Error> {
    let target = target.to_Hz() as u64;
    let pclk = pclk.to_Hz() as u64;
    if target == 0 || pclk == 0 {
        return Err(Error::InvalidParameter);
    }

    let mut best_error = u64::MAX;
    let mut best_divisor = 0u64;
    let mut best_m = 0u64;
    let mut best_d = 0u64;

    'search: for m in 1..=15u64 {
        for d in 0..m {
            // 32.32 fixed-point quotient; the low word is the distance to
            // the nearest integer divisor after rounding.
            let quotient = (pclk << 28) * m / (target * (m + d));
            let mut divisor = quotient >> 32;
            let mut error = quotient & 0xFFFF_FFFF;
            if error > 1 << 31 {
                error = (1u64 << 32) - error;
                divisor += 1;
            }

            if !(1..=65536).contains(&divisor) {
                continue;
            }

            if error < best_error {
                best_error = error;
                best_divisor = divisor;
                best_m = m;
                best_d = d;
                if best_error == 0 {
                    break 'search;
                }
            }
        }
    }

    if best_divisor == 0 {
        return Err(Error::NoDivisorFound);
    }

    let actual = (pclk >> 4) * best_m / (best_divisor * (best_m + best_d));
    let off_by = target.abs_diff(actual);
    if off_by * 100 / target >= u64::from(MAX_ERROR_PERCENT) {
        return Err(Error::BaudRateOutOfTolerance);
    }

    Ok(Divisors {
        divisor: best_divisor as u32,
        mul: best_m as u8,
        div_add: best_d as u8,
        actual: HertzU32::from_raw(actual as u32),
    })
}
