use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use texel_kernels::codec::{decode, decode_texels, encode, encode_texels};
use texel_kernels::Endianness;

const REPRESENTATIVE: [f32; 9] = [
    0.0,
    1.0,
    -1.0,
    0.5,
    -3.5,
    1e6 + 0.25,
    1e-4,
    f32::MAX,
    f32::MIN_POSITIVE,
];

#[test]
fn test_representative_values_round_trip() {
    for endianness in [Endianness::Little, Endianness::Big] {
        for value in REPRESENTATIVE {
            let decoded = decode(encode(value, endianness), endianness);
            assert_eq!(decoded.to_bits(), value.to_bits(), "{value} ({endianness:?})");
        }
    }
}

#[test]
fn test_signed_zero_encodes_to_zero() {
    assert_eq!(encode(-0.0, Endianness::Little), [0; 4]);
    assert_eq!(decode(encode(-0.0, Endianness::Little), Endianness::Little), 0.0);
}

#[test]
fn test_random_normal_floats_round_trip_exactly() {
    let mut rng = StdRng::seed_from_u64(0x7e7e1);
    let mut checked = 0;
    while checked < 100_000 {
        let value = f32::from_bits(rng.random::<u32>());
        if !value.is_normal() {
            continue;
        }
        let texel = encode(value, Endianness::Little);
        assert_eq!(texel, value.to_le_bytes(), "{value:e}");
        assert_eq!(decode(texel, Endianness::Little), value, "{value:e}");
        checked += 1;
    }
}

#[test]
fn test_powers_of_two_pick_the_right_exponent() {
    for exponent in -126..=127 {
        let value = 2f32.powi(exponent);
        assert_eq!(encode(value, Endianness::Little), value.to_le_bytes(), "2^{exponent}");

        let below = f32::from_bits(value.to_bits() - 1);
        if below.is_normal() {
            assert_eq!(encode(below, Endianness::Little), below.to_le_bytes(), "2^{exponent}-ulp");
        }
    }
}

#[test]
fn test_texel_buffers_in_bulk() {
    let mut rng = StdRng::seed_from_u64(42);
    let values: Vec<f32> = (0..1000).map(|_| rng.random_range(-1e3..1e3)).collect();

    let texels = encode_texels(&values, 32 * 32, Endianness::host());
    assert_eq!(texels.len(), 32 * 32 * 4);

    let decoded = decode_texels(&texels, values.len(), Endianness::host()).unwrap();
    assert_eq!(decoded, values);

    let padding = decode_texels(&texels, 32 * 32, Endianness::host()).unwrap();
    assert!(padding[values.len()..].iter().all(|&v| v == 0.0));
}
