//! Base-58 encoding with the Bitcoin alphabet.
//!
//! Each leading zero byte maps to exactly one leading `1`, and decoding
//! restores the same number of zero bytes.

use thiserror::Error;

const ALPHABET: &[u8; 58] = b"123456789ABCDEFGHJKLMNPQRSTUVWXYZabcdefghijkmnopqrstuvwxyz";

/// Reverse lookup table, `0xff` marks characters outside the alphabet.
const INDEXES: [u8; 128] = {
    let mut table = [0xffu8; 128];
    let mut i = 0;
    while i < ALPHABET.len() {
        table[ALPHABET[i] as usize] = i as u8;
        i += 1;
    }
    table
};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Base58Error {
    #[error("invalid base-58 character {character:?} at position {position}")]
    InvalidCharacter { character: char, position: usize },

    #[error("decoded length {actual}, expected {expected}")]
    InvalidLength { expected: usize, actual: usize },
}

/// Encode bytes as base-58.
pub fn encode(bytes: &[u8]) -> String {
    let zeros = bytes.iter().take_while(|&&b| b == 0).count();

    // Little-endian base-58 digits of the non-zero tail
    let mut digits: Vec<u8> = Vec::with_capacity(bytes.len() * 138 / 100 + 1);
    for &byte in &bytes[zeros..] {
        let mut carry = u32::from(byte);
        for digit in digits.iter_mut() {
            carry += u32::from(*digit) << 8;
            *digit = (carry % 58) as u8;
            carry /= 58;
        }
        while carry > 0 {
            digits.push((carry % 58) as u8);
            carry /= 58;
        }
    }

    let mut out = String::with_capacity(zeros + digits.len());
    out.extend(std::iter::repeat('1').take(zeros));
    out.extend(digits.iter().rev().map(|&d| ALPHABET[d as usize] as char));
    out
}

/// Decode a base-58 string into bytes.
pub fn decode(input: &str) -> Result<Vec<u8>, Base58Error> {
    let zeros = input.bytes().take_while(|&c| c == b'1').count();

    // Little-endian base-256 accumulator
    let mut bytes: Vec<u8> = Vec::with_capacity(input.len() * 733 / 1000 + 1);
    for (position, character) in input.chars().enumerate().skip(zeros) {
        let value = lookup(character).ok_or(Base58Error::InvalidCharacter { character, position })?;

        let mut carry = u32::from(value);
        for byte in bytes.iter_mut() {
            carry += u32::from(*byte) * 58;
            *byte = (carry & 0xff) as u8;
            carry >>= 8;
        }
        while carry > 0 {
            bytes.push((carry & 0xff) as u8);
            carry >>= 8;
        }
    }

    let mut out = vec![0u8; zeros];
    out.extend(bytes.iter().rev());
    Ok(out)
}

/// Decode a base-58 string that must hold exactly `N` bytes.
pub fn decode_fixed<const N: usize>(input: &str) -> Result<[u8; N], Base58Error> {
    let bytes = decode(input)?;
    bytes
        .as_slice()
        .try_into()
        .map_err(|_| Base58Error::InvalidLength { expected: N, actual: bytes.len() })
}

fn lookup(character: char) -> Option<u8> {
    let code = character as usize;
    if code >= INDEXES.len() {
        return None;
    }
    match INDEXES[code] {
        0xff => None,
        value => Some(value),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_known_vectors() {
        let vectors: &[(&str, &str)] = &[
            ("", ""),
            ("61", "2g"),
            ("626262", "a3gV"),
            ("636363", "aPEr"),
            ("572e4794", "3EFU7m"),
            ("10c8511e", "Rt5zm"),
            ("00000000000000000000", "1111111111"),
            ("00eb15231dfceb60925886b67d065299925915aeb172c06647", "1NS17iag9jJgTHD1VXjvLCEnZuQ3rJDE9L"),
        ];

        for (hex_input, expected) in vectors {
            let bytes = hex::decode(hex_input).unwrap();
            assert_eq!(encode(&bytes), *expected);
            assert_eq!(decode(expected).unwrap(), bytes);
        }
    }

    #[test]
    fn test_leading_zero_bytes_map_to_ones() {
        for zeros in 1..=3 {
            let mut key = [0xabu8; 32];
            key[..zeros].fill(0);

            let encoded = encode(&key);
            let ones = encoded.chars().take_while(|&c| c == '1').count();
            assert_eq!(ones, zeros, "one leading '1' per zero byte");

            let decoded: [u8; 32] = decode_fixed(&encoded).unwrap();
            assert_eq!(decoded, key);
        }
    }

    #[test]
    fn test_all_zero_key() {
        let key = [0u8; 32];
        let encoded = encode(&key);
        assert_eq!(encoded, "1".repeat(32));
        assert_eq!(decode_fixed::<32>(&encoded).unwrap(), key);
    }

    #[test]
    fn test_rejects_excluded_characters() {
        for bad in ["0abc", "abcO", "Iabc", "abl", "ab+c", "äbc"] {
            assert!(matches!(decode(bad), Err(Base58Error::InvalidCharacter { .. })), "{bad}");
        }
    }

    #[test]
    fn test_decode_fixed_wrong_length() {
        let encoded = encode(&[1u8; 31]);
        assert_eq!(
            decode_fixed::<32>(&encoded),
            Err(Base58Error::InvalidLength { expected: 32, actual: 31 })
        );
    }

    proptest! {
        #[test]
        fn prop_roundtrip_32_bytes(bytes in proptest::array::uniform32(any::<u8>())) {
            let decoded: [u8; 32] = decode_fixed(&encode(&bytes)).unwrap();
            prop_assert_eq!(decoded, bytes);
        }

        #[test]
        fn prop_roundtrip_with_leading_zeros(
            zeros in 1usize..=3,
            bytes in proptest::array::uniform32(any::<u8>()),
        ) {
            let mut key = bytes;
            key[..zeros].fill(0);
            let decoded: [u8; 32] = decode_fixed(&encode(&key)).unwrap();
            prop_assert_eq!(decoded, key);
        }
    }
}
