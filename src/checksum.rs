//! CRC-32 combination over GF(2).
//!
//! Given `crc(A)`, `crc(B)` and `len(B)`, computes `crc(A ++ B)` without
//! touching the bytes of either sequence. The year index rolls up per-image
//! checksums with it. Arithmetic follows zlib's `crc32_combine`.

/// Reflected CRC-32 (IEEE 802.3) generator polynomial.
const POLY: u32 = 0xedb8_8320;

/// `x^0` in the reflected bit order.
const X0: u32 = 1 << 31;

/// `x^(2^k) mod p(x)` for `k = 0..32`, built at compile time.
const X2N_TABLE: [u32; 32] = build_x2n_table();

const fn build_x2n_table() -> [u32; 32] {
    let mut table = [0u32; 32];
    // x^1
    let mut p: u32 = 1 << 30;
    table[0] = p;
    let mut n = 1;
    while n < 32 {
        p = multiply_mod_poly(p, p);
        table[n] = p;
        n += 1;
    }
    table
}

/// Carry-less multiplication of `a(x)` and `b(x)` reduced modulo the
/// reflected generator polynomial.
const fn multiply_mod_poly(a: u32, mut b: u32) -> u32 {
    if a == 0 {
        return 0;
    }
    let mut m: u32 = 1 << 31;
    let mut p: u32 = 0;
    loop {
        if a & m != 0 {
            p ^= b;
            if a & (m - 1) == 0 {
                break;
            }
        }
        m >>= 1;
        b = if b & 1 != 0 { (b >> 1) ^ POLY } else { b >> 1 };
    }
    p
}

/// `x^(n * 2^k) mod p(x)` by square-and-multiply over [`X2N_TABLE`].
fn x2n_mod_poly(mut n: u64, mut k: u32) -> u32 {
    let mut p = X0;
    while n > 0 {
        if n & 1 != 0 {
            p = multiply_mod_poly(X2N_TABLE[(k & 31) as usize], p);
        }
        n >>= 1;
        k += 1;
    }
    p
}

/// CRC-32 of the concatenation of two sequences.
///
/// `crc1` is the checksum of the leading sequence, `crc2` the checksum of the
/// trailing one and `len2` its length in bytes. The result only matches the
/// physical concatenation when the arguments are given in that order.
pub fn combine(crc1: u32, crc2: u32, len2: u64) -> u32 {
    // x^(8 * len2): shifting crc1 past len2 bytes of zeroes.
    multiply_mod_poly(x2n_mod_poly(len2, 3), crc1) ^ crc2
}

/// Running `(crc, size)` rollup of a sequence of checksummed chunks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rollup {
    pub crc: u32,
    pub size: u64,
}

impl Rollup {
    pub fn new(crc: u32, size: u64) -> Self {
        Self { crc, size }
    }

    /// Append a chunk after everything already rolled up.
    #[must_use]
    pub fn append(self, crc: u32, size: u64) -> Self {
        Self {
            crc: combine(self.crc, crc, size),
            size: self.size + size,
        }
    }

    /// Fold `(crc, size)` pairs left to right, seeded with the first pair.
    ///
    /// Returns `None` for an empty input.
    pub fn fold<I>(parts: I) -> Option<Self>
    where
        I: IntoIterator<Item = (u32, u64)>,
    {
        let mut parts = parts.into_iter();
        let (crc, size) = parts.next()?;
        Some(parts.fold(Self::new(crc, size), |acc, (crc, size)| {
            acc.append(crc, size)
        }))
    }
}
