//! Bit-per-resource free maps.
//!
//! These work on raw buffer payloads. The caller marks the owning
//! buffer dirty and holds the superblock lock.

/// Index of the first clear bit below `nbits`, or `None` if the map is full.
pub fn first_free(bitmap: &[u8], nbits: usize) -> Option<usize> {
    let nbytes = nbits.div_ceil(8).min(bitmap.len());
    for (i, byte) in bitmap[..nbytes].iter().enumerate() {
        if *byte == 0xff {
            continue;
        }
        let bit = i * 8 + byte.trailing_ones() as usize;
        return if bit < nbits { Some(bit) } else { None };
    }
    None
}

pub fn set(bitmap: &mut [u8], index: usize) {
    bitmap[index / 8] |= 1 << (index % 8);
}

pub fn clear(bitmap: &mut [u8], index: usize) {
    bitmap[index / 8] &= !(1 << (index % 8));
}

pub fn is_set(bitmap: &[u8], index: usize) -> bool {
    bitmap[index / 8] & (1 << (index % 8)) != 0
}

/// Number of clear bits below `nbits`.
pub fn count_free(bitmap: &[u8], nbits: usize) -> usize {
    (0..nbits.min(bitmap.len() * 8))
        .filter(|i| !is_set(bitmap, *i))
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_free_skips_full_bytes() {
        let mut map = [0xffu8, 0xff, 0b0000_0111, 0];
        assert_eq!(first_free(&map, 32), Some(19));
        set(&mut map, 19);
        assert_eq!(first_free(&map, 32), Some(20));
        clear(&mut map, 3);
        assert_eq!(first_free(&map, 32), Some(3));
    }

    #[test]
    fn bits_past_the_limit_are_never_free() {
        let map = [0xffu8, 0b0000_0011];
        assert_eq!(first_free(&map, 10), None);
        assert_eq!(first_free(&map, 11), Some(10));
        assert_eq!(count_free(&map, 10), 0);
        assert_eq!(count_free(&map, 16), 6);
    }

    #[test]
    fn set_and_clear_touch_one_bit() {
        let mut map = [0u8; 2];
        set(&mut map, 9);
        assert!(is_set(&map, 9));
        assert!(!is_set(&map, 8));
        assert_eq!(map, [0, 0b10]);
        clear(&mut map, 9);
        assert_eq!(map, [0, 0]);
    }
}
