//! LWE parameter selection.
//!
//! Parameters come from fixed tables keyed by the ciphertext modulus: for
//! each supported sample count `m` the table pins the largest plaintext
//! modulus `p` that keeps the decryption error below 2^-40. The secret
//! dimension and noise width are constants per `logq`.

use tracing::debug;

/// Table rows: (max supported samples, plaintext modulus).
const PLAINTEXT_MOD_32: &[(usize, u64)] = &[
    (1 << 13, 991),
    (1 << 14, 833),
    (1 << 15, 701),
    (1 << 16, 589),
    (1 << 17, 495),
    (1 << 18, 416),
    (1 << 19, 350),
    (1 << 20, 294),
    (1 << 21, 247),
];

// At q = 2^64 the noise budget would admit plaintext moduli far beyond what
// the packed column layout can hold, so every row is clamped to the 20-bit
// squish basis.
const PLAINTEXT_MOD_64: &[(usize, u64)] = &[
    (1 << 13, 1 << 20),
    (1 << 14, 1 << 20),
    (1 << 15, 1 << 20),
    (1 << 16, 1 << 20),
    (1 << 17, 1 << 20),
    (1 << 18, 1 << 20),
    (1 << 19, 1 << 20),
    (1 << 20, 1 << 20),
    (1 << 21, 1 << 20),
];

const SECRET_DIM_32: usize = 1024;
const ERROR_STDDEV_32: f64 = 6.4;

const SECRET_DIM_64: usize = 4096;
const ERROR_STDDEV_64: f64 = 5.0;

/// Regev encryption parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LweParams {
    /// LWE secret dimension.
    pub n: usize,
    /// Error distribution stddev.
    pub sigma: f64,
    /// Number of samples the parameters support.
    pub m: usize,
    /// log2 of the ciphertext modulus; 32 or 64.
    pub logq: u64,
    /// Plaintext modulus.
    pub p: u64,
}

fn table(logq: u64) -> Option<(&'static [(usize, u64)], usize, f64)> {
    match logq {
        32 => Some((PLAINTEXT_MOD_32, SECRET_DIM_32, ERROR_STDDEV_32)),
        64 => Some((PLAINTEXT_MOD_64, SECRET_DIM_64, ERROR_STDDEV_64)),
        _ => None,
    }
}

impl LweParams {
    /// Parameters supporting at least `m` homomorphic additions: the table
    /// row with the smallest sample count `>= m`, or `None` when the request
    /// exceeds every row.
    pub fn new(logq: u64, m: usize) -> Option<Self> {
        let (rows, n, sigma) = table(logq)?;
        let &(table_m, p) = rows.iter().find(|&&(table_m, _)| table_m >= m)?;

        let params = Self {
            n,
            sigma,
            m: table_m,
            logq,
            p,
        };
        debug!(n, m = table_m, logq, p, sigma, "selected lwe params");
        Some(params)
    }

    /// Parameters with a caller-chosen plaintext modulus, accepted iff some
    /// table row dominates the request in both sample count and modulus.
    pub fn new_fixed_p(logq: u64, m: usize, p: u64) -> Option<Self> {
        let (rows, n, sigma) = table(logq)?;
        rows.iter().any(|&(table_m, table_p)| table_m >= m && table_p >= p).then(|| Self {
            n,
            sigma,
            m,
            logq,
            p,
        })
    }

    /// Plaintext scaling factor `Δ = ⌊2^logq / p⌋`.
    pub fn delta(&self) -> u64 {
        ((1u128 << self.logq) / self.p as u128) as u64
    }

    /// Bitmask selecting the low `logq` bits.
    pub fn q_mask(&self) -> u64 {
        if self.logq >= 64 {
            u64::MAX
        } else {
            (1u64 << self.logq) - 1
        }
    }

    /// Decode a noisy scaled plaintext: `((x + Δ/2) / Δ) mod p`, treating `x`
    /// as an element of `Z_{2^logq}`.
    pub fn round(&self, x: u64) -> u64 {
        let delta = self.delta();
        let v = (x & self.q_mask()).wrapping_add(delta / 2) / delta;
        v % self.p
    }
}
