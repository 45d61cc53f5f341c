//! Float codec for RGBA8 texel storage.
//!
//! Every texture this crate touches is `Rgba8Unorm`, so each 32-bit float is
//! packed into the four 8-bit channels of one texel using the IEEE-754 single
//! precision layout:
//!
//! | channel | contents                                        |
//! |---------|-------------------------------------------------|
//! | `r`     | mantissa bits 0..8                              |
//! | `g`     | mantissa bits 8..16                             |
//! | `b`     | exponent low bit, then mantissa bits 16..23     |
//! | `a`     | sign bit, then exponent bits 1..8               |
//!
//! The shader side cannot reinterpret float bits, so the exponent is estimated
//! with `log2` and checked by re-decoding the result. The host side mirrors the
//! exact same algorithm (including the `log2` estimate in `f32`) so uploads,
//! readbacks and tests all agree with what the generated program does.
//!
//! Zero (of either sign) encodes to four zero bytes. Subnormal magnitudes are
//! flushed to zero, and so are non-finite values.

use rayon::prelude::*;

/// Channel order of the 4 bytes inside a texel, as seen by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endianness {
    /// `r` holds the least significant byte.
    Little,
    /// `r` holds the most significant byte; the shader swizzles `abgr`.
    Big,
}

impl Endianness {
    /// Endianness of the machine this crate was compiled for.
    #[must_use]
    pub const fn host() -> Self {
        if cfg!(target_endian = "little") {
            Self::Little
        } else {
            Self::Big
        }
    }

    const fn order(self, bytes: [u8; 4]) -> [u8; 4] {
        match self {
            Self::Little => bytes,
            Self::Big => [bytes[3], bytes[2], bytes[1], bytes[0]],
        }
    }
}

impl Default for Endianness {
    fn default() -> Self {
        Self::host()
    }
}

fn mantissa_parts(magnitude: f32, exponent: i32) -> [i32; 3] {
    let mantissa = f64::from(magnitude) * 2f64.powi(-exponent);
    [
        ((mantissa * 8_388_608.0) as i64).rem_euclid(256) as i32,
        ((mantissa * 32_768.0) as i64).rem_euclid(256) as i32,
        ((mantissa * 128.0) as i64).rem_euclid(128) as i32,
    ]
}

fn reconstruct(parts: [i32; 3], exponent: i32) -> f64 {
    let [low, mid, high] = parts.map(f64::from);
    2f64.powi(exponent) * (1.0 + high / 128.0 + mid / 32_768.0 + low / 8_388_608.0)
}

/// Encodes one float into texel bytes, exactly as the generated `encode32` does.
#[must_use]
pub fn encode(value: f32, endianness: Endianness) -> [u8; 4] {
    if value == 0.0 || !value.is_finite() {
        return [0; 4];
    }

    let magnitude = value.abs();
    let sign = i32::from(value < 0.0);
    let log2_magnitude = magnitude.log2();

    let mut exponent = log2_magnitude.floor() as i32;
    let mut parts = mantissa_parts(magnitude, exponent);

    // log2 may land on the wrong side of a power of two
    let test = reconstruct(parts, exponent);
    if (test.log2() - f64::from(log2_magnitude)).abs() > 0.5 {
        exponent += if test > f64::from(magnitude) { -1 } else { 1 };
        parts = mantissa_parts(magnitude, exponent);
    }

    let biased = exponent + 127;
    if biased <= 0 {
        return [0; 4];
    }

    let [r, g, high] = parts;
    let b = 128 * (biased % 2) + high;
    let a = 128 * sign + biased / 2;

    endianness.order([r as u8, g as u8, b as u8, a as u8])
}

/// Decodes texel bytes back into a float, exactly as the generated `decode32` does.
#[must_use]
pub fn decode(texel: [u8; 4], endianness: Endianness) -> f32 {
    let [r, g, b, a] = endianness.order(texel).map(i32::from);

    let sign = if a > 127 { -1.0 } else { 1.0 };
    let exponent = 2 * (a & 0x7f) + i32::from(b > 127);
    if exponent == 0 {
        return (sign * 0.0) as f32;
    }

    let mantissa = 1.0
        + f64::from(b & 0x7f) / 128.0
        + f64::from(g) / 32_768.0
        + f64::from(r) / 8_388_608.0;

    (sign * mantissa * 2f64.powi(exponent - 127)) as f32
}

/// Encodes `values` into a texel buffer holding `capacity` texels.
///
/// Texels past `values.len()` stay zero, which is also the encoding of `0.0`.
#[must_use]
pub fn encode_texels(values: &[f32], capacity: usize, endianness: Endianness) -> Vec<u8> {
    let mut texels = vec![0u8; capacity.max(values.len()) * 4];
    texels
        .par_chunks_exact_mut(4)
        .zip(values.par_iter())
        .for_each(|(texel, &value)| texel.copy_from_slice(&encode(value, endianness)));
    texels
}

/// Decodes the first `count` texels of `bytes`.
///
/// Returns `None` when `bytes` holds fewer than `count` texels.
#[must_use]
pub fn decode_texels(bytes: &[u8], count: usize, endianness: Endianness) -> Option<Vec<f32>> {
    let bytes = bytes.get(..count * 4)?;
    Some(
        bytes
            .par_chunks_exact(4)
            .map(|texel| decode([texel[0], texel[1], texel[2], texel[3]], endianness))
            .collect(),
    )
}

/// WGSL source of `decode32`/`encode32` for the given host byte order.
///
/// Relies on `integer_mod_i` being declared elsewhere in the program.
#[must_use]
pub fn wgsl_source(endianness: Endianness) -> String {
    let (swizzle_in, swizzle_out) = match endianness {
        Endianness::Little => ("", ""),
        Endianness::Big => (
            "    rgba = rgba.abgr;\n",
            "    rgba = rgba.abgr;\n",
        ),
    };

    format!(
        r"fn decode32(texel: vec4<f32>) -> f32 {{
    var rgba = texel;
{swizzle_in}    rgba = rgba * 255.0;
    let r = i32(rgba.r + 0.5);
    let g = i32(rgba.g + 0.5);
    let b = i32(rgba.b + 0.5);
    let a = i32(rgba.a + 0.5);
    let sign_value = select(1.0, -1.0, a > 127);
    var exponent = 2 * select(a, a - 128, a > 127) + select(0, 1, b > 127);
    if (exponent == 0) {{
        return sign_value * 0.0;
    }}
    exponent = exponent - 127;
    var mantissa = 1.0;
    mantissa = mantissa + f32(select(b, b - 128, b > 127)) / 128.0;
    mantissa = mantissa + f32(g) / 32768.0;
    mantissa = mantissa + f32(r) / 8388608.0;
    return sign_value * ldexp(mantissa, exponent);
}}

fn mantissa_parts(magnitude: f32, exponent: i32) -> vec3<i32> {{
    let mantissa = ldexp(magnitude, -exponent);
    return vec3<i32>(
        integer_mod_i(i32(mantissa * 8388608.0), 256),
        integer_mod_i(i32(mantissa * 32768.0), 256),
        integer_mod_i(i32(mantissa * 128.0), 128),
    );
}}

fn encode32(f: f32) -> vec4<f32> {{
    if (f == 0.0) {{
        return vec4<f32>(0.0);
    }}
    let magnitude = abs(f);
    let sign_bit = select(0, 1, f < 0.0);
    let log2_magnitude = log2(magnitude);
    var exponent = i32(floor(log2_magnitude));
    var parts = mantissa_parts(magnitude, exponent);
    var test = 1.0 + f32(parts.z) / 128.0 + f32(parts.y) / 32768.0 + f32(parts.x) / 8388608.0;
    test = ldexp(test, exponent);
    if (abs(log2(test) - log2_magnitude) > 0.5) {{
        exponent = exponent + select(1, -1, test > magnitude);
        parts = mantissa_parts(magnitude, exponent);
    }}
    exponent = exponent + 127;
    if (exponent <= 0) {{
        return vec4<f32>(0.0);
    }}
    let a = 128 * sign_bit + exponent / 2;
    let b = 128 * integer_mod_i(exponent, 2) + parts.z;
    var rgba = vec4<f32>(f32(parts.x), f32(parts.y), f32(b), f32(a));
{swizzle_out}    return rgba / 255.0;
}}
"
    )
}
