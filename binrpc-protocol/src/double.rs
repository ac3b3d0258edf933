//! Mantissa/exponent representation of BIN-RPC doubles.
//!
//! A double travels as two signed 32-bit integers. The mantissa is the
//! normalized fraction `m` with `0.5 <= |m| < 1.0`, scaled by `2^30`, so
//! `value = mantissa / 2^30 * 2^exponent`.
//!
//! On the wire the exponent comes first, then the mantissa. That is what CCU
//! firmware emits and accepts; the order published on the HomeMatic forum
//! (mantissa first) is not what the devices do. Homegear and the Node.js
//! `binrpc` package follow the published order and are therefore not
//! interoperable with this codec for doubles.

/// Scale applied to the normalized mantissa (`2^30`).
pub const MANTISSA_SCALE: f64 = (1u32 << 30) as f64;

/// Size of a double body on the wire: exponent + mantissa.
pub const DOUBLE_WIRE_SIZE: usize = 8;

/// Splits a finite, non-zero `value` into a fraction in `[0.5, 1.0)` (by
/// magnitude) and a power-of-two exponent, so `value == fraction * 2^exp`.
///
/// Zero and non-finite input come back unchanged with exponent 0.
pub fn frexp(value: f64) -> (f64, i32) {
    if value == 0.0 || !value.is_finite() {
        return (value, 0);
    }

    let bits = value.to_bits();
    let biased = ((bits >> 52) & 0x7FF) as i32;
    if biased == 0 {
        // Subnormal: lift into the normal range first.
        let (fraction, exp) = frexp(value * 2f64.powi(54));
        return (fraction, exp - 54);
    }

    let fraction = f64::from_bits((bits & !(0x7FFu64 << 52)) | (1022u64 << 52));
    (fraction, biased - 1022)
}

/// Computes `value * 2^exp` without overflowing the intermediate power.
pub fn ldexp(value: f64, exp: i32) -> f64 {
    let mut value = value;
    let mut exp = exp;
    while exp > 1000 {
        value *= 2f64.powi(1000);
        exp -= 1000;
        if value.is_infinite() {
            return value;
        }
    }
    while exp < -1000 {
        value *= 2f64.powi(-1000);
        exp += 1000;
        if value == 0.0 {
            return value;
        }
    }
    value * 2f64.powi(exp)
}

/// Converts a double into its `(exponent, mantissa)` wire pair.
///
/// `NaN` and the infinities have no wire representation and encode as zero,
/// the same as `0.0` and `-0.0`.
pub fn to_wire(value: f64) -> (i32, i32) {
    if value == 0.0 || !value.is_finite() {
        return (0, 0);
    }

    let (fraction, mut exponent) = frexp(value);
    let mut mantissa = (fraction * MANTISSA_SCALE).round() as i64;

    // Rounding can carry a fraction just below 1.0 up to exactly 2^30.
    if mantissa.abs() >= 1 << 30 {
        mantissa /= 2;
        exponent += 1;
    }

    (exponent, mantissa as i32)
}

/// Converts an `(exponent, mantissa)` wire pair back into a double.
pub fn from_wire(exponent: i32, mantissa: i32) -> f64 {
    if mantissa == 0 {
        return 0.0;
    }
    ldexp(mantissa as f64 / MANTISSA_SCALE, exponent)
}
