//! Base-p digit decomposition of record values.

/// The `i`-th digit of `m` in base `p`, i.e. `(m / p^i) mod p`.
pub fn base_p(p: u64, m: u64, i: usize) -> u64 {
    let mut m = m;
    for _ in 0..i {
        m /= p;
    }
    m % p
}

/// The value whose base-`p` digit expansion is `digits` (least significant
/// first). Horner evaluation with wrapping arithmetic; callers size the digit
/// count so the true value fits in a `u64`.
pub fn reconstruct_from_base_p(p: u64, digits: &[u64]) -> u64 {
    let mut res: u64 = 0;
    let mut coeff: u64 = 1;
    for &d in digits {
        res = res.wrapping_add(coeff.wrapping_mul(d));
        coeff = coeff.wrapping_mul(p);
    }
    res
}

/// How many `Z_p` digits are needed to cover a `logq`-bit value.
pub fn num_entries_base_p(p: u64, logq: u64) -> usize {
    let log_p = (p as f64).log2();
    (logq as f64 / log_p).ceil() as usize
}
