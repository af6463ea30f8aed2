//! RFC 1071 internet checksum arithmetic.
//!
//! Sums are accumulated in a `u64` over big-endian 32-bit words and only
//! folded to 16 bits at the end, so partial sums (a pseudo-header, then the
//! segment that follows it) can be chained through the `initial` argument.

use byteorder::{BigEndian, ByteOrder};

/// Accumulates `b` onto `initial` without folding.
///
/// An odd trailing byte counts as the high byte of a zero-padded word.
pub fn checksum_no_fold(b: &[u8], initial: u64) -> u64 {
    let mut acc = initial;
    let mut words = b.chunks_exact(4);
    for w in &mut words {
        acc += BigEndian::read_u32(w) as u64;
    }
    let mut rest = words.remainder();
    if rest.len() >= 2 {
        acc += BigEndian::read_u16(rest) as u64;
        rest = &rest[2..];
    }
    if let Some(&last) = rest.first() {
        acc += (last as u64) << 8;
    }
    acc
}

/// Folds a 64-bit accumulator into a 16-bit one's-complement sum.
pub fn fold(mut acc: u64) -> u16 {
    while acc > 0xFFFF {
        acc = (acc >> 16) + (acc & 0xFFFF);
    }
    acc as u16
}

/// One's-complement sum of `b` seeded with `initial`, folded to 16 bits.
///
/// A region whose embedded checksum is correct sums to `0xFFFF`, so callers
/// verify with `!checksum(..) == 0`.
pub fn checksum(b: &[u8], initial: u64) -> u16 {
    fold(checksum_no_fold(b, initial))
}

/// Unfolded sum of the TCP/UDP pseudo-header `{src, dst, 0, proto, len}`.
///
/// `src_addr` and `dst_addr` are 4 bytes for IPv4 and 16 for IPv6; IPv6's
/// 32-bit length field sums the same as a 16-bit one for lengths below 64K.
pub fn pseudo_header_checksum_no_fold(
    protocol: u8,
    src_addr: &[u8],
    dst_addr: &[u8],
    total_len: u16,
) -> u64 {
    let sum = checksum_no_fold(src_addr, 0);
    let sum = checksum_no_fold(dst_addr, sum);
    let len = total_len.to_be_bytes();
    checksum_no_fold(&[0, protocol, len[0], len[1]], sum)
}

#[cfg(test)]
mod tests {
    use super::*;

    // Example header from RFC 1071 / Wikipedia "IPv4 header checksum".
    const V4_HEADER: [u8; 20] = [
        0x45, 0x00, 0x00, 0x73, 0x00, 0x00, 0x40, 0x00, 0x40, 0x11, 0xb8, 0x61, 0xc0, 0xa8, 0x00,
        0x01, 0xc0, 0xa8, 0x00, 0xc7,
    ];

    #[test]
    fn valid_header_sums_to_all_ones() {
        assert_eq!(!checksum(&V4_HEADER, 0), 0);
    }

    #[test]
    fn recompute_header_checksum() {
        let mut hdr = V4_HEADER;
        hdr[10] = 0;
        hdr[11] = 0;
        assert_eq!(!checksum(&hdr, 0), 0xb861);
    }

    #[test]
    fn odd_length_pads_low_byte() {
        assert_eq!(checksum(&[0xab], 0), 0xab00);
        assert_eq!(checksum(&[0x00, 0x01, 0xf2], 0), 0xf201);
    }

    #[test]
    fn word_split_does_not_matter() {
        let data: Vec<u8> = (0..=255u8).cycle().take(1001).collect();
        let whole = checksum(&data, 0);
        // splits on an even boundary chain exactly
        let chained = checksum(&data[500..], checksum_no_fold(&data[..500], 0));
        assert_eq!(whole, chained);
    }

    #[test]
    fn fold_handles_large_accumulators() {
        assert_eq!(fold(0x1_0000), 1);
        assert_eq!(fold(u64::MAX), 0xFFFF);
        assert_eq!(fold(0), 0);
    }

    #[test]
    fn pseudo_header_matches_manual_sum() {
        let src = [10, 0, 0, 1];
        let dst = [10, 0, 0, 2];
        let manual = checksum(&[10, 0, 0, 1, 10, 0, 0, 2, 0, 17, 0, 12], 0);
        assert_eq!(fold(pseudo_header_checksum_no_fold(17, &src, &dst, 12)), manual);
    }
}
