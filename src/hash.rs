//! Hashes over RPC call names.
//!
//! Both functions must stay bit-for-bit identical to the ones the host
//! software has always used, since hashes of a call table may be persisted
//! and compared against later builds.

const HASH_SEED: u32 = 31;
const HASH_MULTIPLIER: u32 = 54059;
const HASH_CHAR_FACTOR: i32 = 76963;
const HASH_MODULUS: u32 = 86969;

/// Hashes a single call name. The result is always in `0..86969`.
pub fn hash_str(s: &str) -> u32 {
    let mut h = HASH_SEED;
    for &b in s.as_bytes() {
        // Characters are signed bytes in the reference implementation
        let c = (b as i8 as i32).wrapping_mul(HASH_CHAR_FACTOR) as u32;
        h = h.wrapping_mul(HASH_MULTIPLIER) ^ c;
    }
    h % HASH_MODULUS
}

/// Hashes an ordered list of call names as `sum((i + 1) * hash_str(name[i]))`.
///
/// The accumulator is not reduced, it simply wraps at 32 bits.
pub fn hash_call_table<S: AsRef<str>>(names: &[S]) -> u32 {
    names.iter().enumerate().fold(0u32, |acc, (i, name)| {
        acc.wrapping_add((i as u32 + 1).wrapping_mul(hash_str(name.as_ref())))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_string_is_seed() {
        assert_eq!(hash_str(""), 31);
    }

    #[test]
    fn single_character() {
        let expected = ((31u32 * 54059) ^ (65u32 * 76963)) % 86969;
        assert_eq!(hash_str("A"), expected);
    }

    #[test]
    fn deterministic_and_in_range() {
        for name in ["Daq_Open", "Pg_SetCmd", "roc_I2cAddr", "x", "GetRpcCallName"] {
            let h = hash_str(name);
            assert_eq!(h, hash_str(name));
            assert!(h < 86969);
        }
    }

    #[test]
    fn table_hash_is_position_weighted() {
        let table = ["Daq_Open", "Daq_Close", "Pg_Single"];
        let reversed = ["Pg_Single", "Daq_Close", "Daq_Open"];
        assert_ne!(hash_call_table(&table), hash_call_table(&reversed));
    }

    #[test]
    fn table_hash_weights() {
        let table = ["a", "b"];
        assert_eq!(hash_call_table(&table), hash_str("a") + 2 * hash_str("b"));
        assert_eq!(hash_call_table::<&str>(&[]), 0);
    }
}
