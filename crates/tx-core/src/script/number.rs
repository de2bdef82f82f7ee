//! Script numbers
//!
//! Stack elements interpreted as integers use sign-and-magnitude
//! little-endian encoding: the high bit of the final byte is the sign.
//! Magnitude is unbounded (post-Genesis rules), so arithmetic runs on
//! `BigInt`; callers that want the classic 4-byte policy bound pass a
//! size limit when decoding.

use num_bigint::{BigInt, Sign};

/// Decode a stack element as a script number.
///
/// `max_size` bounds the encoded length of the operand; `None` accepts any
/// length. Returns `None` (not an error type, the interpreter maps it)
/// when the element exceeds the bound.
pub fn decode(bytes: &[u8], max_size: Option<usize>) -> Option<BigInt> {
    if let Some(limit) = max_size {
        if bytes.len() > limit {
            return None;
        }
    }
    if bytes.is_empty() {
        return Some(BigInt::from(0));
    }

    let last = bytes[bytes.len() - 1];
    let negative = last & 0x80 != 0;

    let mut magnitude = bytes.to_vec();
    let end = magnitude.len() - 1;
    magnitude[end] = last & 0x7f;

    let n = BigInt::from_bytes_le(Sign::Plus, &magnitude);
    Some(if negative { -n } else { n })
}

/// Encode a script number in minimal form.
///
/// Zero encodes as the empty element. A sign byte is appended only when
/// the magnitude's top bit is already set.
pub fn encode(n: &BigInt) -> Vec<u8> {
    if n.sign() == Sign::NoSign {
        return Vec::new();
    }

    let negative = n.sign() == Sign::Minus;
    // to_bytes_le on a nonzero magnitude never yields trailing zeros
    let mut bytes = n.magnitude().to_bytes_le();

    if bytes.last().map_or(false, |&b| b & 0x80 != 0) {
        bytes.push(if negative { 0x80 } else { 0x00 });
    } else if negative {
        let end = bytes.len() - 1;
        bytes[end] |= 0x80;
    }

    bytes
}

/// Boolean reading of a stack element: false is empty, all zeros, or
/// negative zero (0x80 in the final byte with zeros before it).
pub fn is_truthy(bytes: &[u8]) -> bool {
    for (i, &b) in bytes.iter().enumerate() {
        if b != 0 {
            // negative zero counts as false
            return !(i == bytes.len() - 1 && b == 0x80);
        }
    }
    false
}

/// Narrow a script number to i64 for opcodes that index or size things
/// (OP_PICK, OP_ROLL, OP_NUM2BIN, locktime comparisons).
pub fn to_i64(n: &BigInt) -> Option<i64> {
    let (sign, digits) = n.to_u64_digits();
    if digits.len() > 1 {
        return None;
    }
    let mag = digits.first().copied().unwrap_or(0) as i128;
    let v = if sign == Sign::Minus { -mag } else { mag };
    if v < i64::MIN as i128 || v > i64::MAX as i128 {
        return None;
    }
    Some(v as i64)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn enc(n: i64) -> Vec<u8> {
        encode(&BigInt::from(n))
    }

    fn dec(bytes: &[u8]) -> BigInt {
        decode(bytes, None).unwrap()
    }

    #[test]
    fn test_encode_zero_is_empty() {
        assert_eq!(enc(0), Vec::<u8>::new());
    }

    #[test]
    fn test_encode_positive() {
        assert_eq!(enc(1), vec![0x01]);
        assert_eq!(enc(127), vec![0x7f]);
        assert_eq!(enc(128), vec![0x80, 0x00]); // needs sign byte
        assert_eq!(enc(255), vec![0xff, 0x00]);
        assert_eq!(enc(256), vec![0x00, 0x01]);
        assert_eq!(enc(520), vec![0x08, 0x02]);
    }

    #[test]
    fn test_encode_negative() {
        assert_eq!(enc(-1), vec![0x81]);
        assert_eq!(enc(-127), vec![0xff]);
        assert_eq!(enc(-128), vec![0x80, 0x80]);
        assert_eq!(enc(-255), vec![0xff, 0x80]);
    }

    #[test]
    fn test_round_trip() {
        for n in [-70000i64, -520, -128, -1, 0, 1, 127, 128, 65535, 1 << 40] {
            assert_eq!(dec(&enc(n)), BigInt::from(n), "round trip {n}");
        }
    }

    #[test]
    fn test_decode_respects_limit() {
        assert!(decode(&[1, 2, 3, 4], Some(4)).is_some());
        assert!(decode(&[1, 2, 3, 4, 5], Some(4)).is_none());
        assert!(decode(&[1, 2, 3, 4, 5], None).is_some());
    }

    #[test]
    fn test_decode_non_minimal_accepted() {
        // parsers accept padded encodings; the engine re-encodes minimally
        assert_eq!(dec(&[0x01, 0x00]), BigInt::from(1));
        assert_eq!(dec(&[0x01, 0x80]), BigInt::from(-1));
        assert_eq!(dec(&[0x00, 0x00]), BigInt::from(0));
    }

    #[test]
    fn test_truthiness() {
        assert!(!is_truthy(&[]));
        assert!(!is_truthy(&[0x00]));
        assert!(!is_truthy(&[0x00, 0x00]));
        assert!(!is_truthy(&[0x00, 0x80])); // negative zero
        assert!(is_truthy(&[0x01]));
        assert!(is_truthy(&[0x80, 0x00]));
        assert!(is_truthy(&[0x00, 0x01]));
    }

    #[test]
    fn test_big_magnitude_round_trip() {
        // well past any fixed-width integer
        let mut big = BigInt::from(1);
        for _ in 0..100 {
            big *= 7;
        }
        assert_eq!(decode(&encode(&big), None).unwrap(), big);
        assert_eq!(decode(&encode(&-&big), None).unwrap(), -big);
    }

    #[test]
    fn test_to_i64_bounds() {
        assert_eq!(to_i64(&BigInt::from(42)), Some(42));
        assert_eq!(to_i64(&BigInt::from(-42)), Some(-42));
        assert_eq!(to_i64(&(BigInt::from(i64::MAX) + 1)), None);
    }
}
