//! Deterministic randomness for the protocol.
//!
//! Both sides of the protocol regenerate the public matrix `A` from a 128-bit
//! key, so the stream here must be reproducible byte-for-byte: AES-128 in
//! counter mode, with a 64-bit big-endian block counter that is advanced
//! before every block encryption. The buffered reader on top amortizes the
//! cipher calls and feeds the samplers.

use aes::cipher::{BlockEncrypt, KeyInit};
use aes::Aes128;
use rand::{RngCore, TryRngCore};
use rand_distr::{Distribution, Normal};

use crate::error::PirError;

/// AES-128 key seeding a PRG stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrgKey(pub [u8; 16]);

impl PrgKey {
    /// Fresh key from OS entropy.
    pub fn random() -> Result<Self, PirError> {
        let mut key = [0u8; 16];
        rand::rngs::OsRng
            .try_fill_bytes(&mut key)
            .map_err(|_| PirError::BadRandomness)?;
        Ok(Self(key))
    }
}

/// Raw AES-CTR stream. Infallible once seeded; re-seeding with the same key
/// reproduces the stream exactly.
pub struct PrgStream {
    cipher: Aes128,
    ctr: u64,
}

impl PrgStream {
    pub fn new(key: &PrgKey) -> Self {
        Self {
            cipher: Aes128::new(&key.0.into()),
            ctr: 0,
        }
    }

    /// Fill `out` with stream bytes. Each 16-byte block encrypts the next
    /// counter value; a trailing partial block discards the unused tail.
    pub fn fill(&mut self, out: &mut [u8]) {
        for chunk in out.chunks_mut(16) {
            self.ctr += 1;
            let mut block = [0u8; 16];
            block[..8].copy_from_slice(&self.ctr.to_be_bytes());
            let mut ga = block.into();
            self.cipher.encrypt_block(&mut ga);
            chunk.copy_from_slice(&ga[..chunk.len()]);
        }
    }
}

const BUF_SIZE: usize = 8192;

/// Buffered PRG reader: raw bytes, uniform words, and bias-free sampling
/// modulo arbitrary bounds.
pub struct BufPrg {
    key: PrgKey,
    stream: PrgStream,
    buf: Box<[u8; BUF_SIZE]>,
    pos: usize,
}

impl BufPrg {
    pub fn new(key: &PrgKey) -> Self {
        Self {
            key: *key,
            stream: PrgStream::new(key),
            buf: Box::new([0u8; BUF_SIZE]),
            pos: BUF_SIZE,
        }
    }

    /// Reader seeded from OS entropy.
    pub fn from_entropy() -> Result<Self, PirError> {
        Ok(Self::new(&PrgKey::random()?))
    }

    pub fn key(&self) -> &PrgKey {
        &self.key
    }

    pub fn read_bytes(&mut self, dst: &mut [u8]) {
        let mut done = 0;
        while done < dst.len() {
            if self.pos == BUF_SIZE {
                self.stream.fill(&mut self.buf[..]);
                self.pos = 0;
            }
            let n = (dst.len() - done).min(BUF_SIZE - self.pos);
            dst[done..done + n].copy_from_slice(&self.buf[self.pos..self.pos + n]);
            self.pos += n;
            done += n;
        }
    }

    pub fn uint64(&mut self) -> u64 {
        let mut buf = [0u8; 8];
        self.read_bytes(&mut buf);
        u64::from_le_bytes(buf)
    }

    /// Uniform value in `[0, m)` by rejection: draw just enough bytes to
    /// cover `m - 1`, mask the excess top bits, retry until the value lands
    /// below the bound. No modulo bias.
    pub fn sample_mod(&mut self, m: u64) -> u64 {
        debug_assert!(m > 0, "modulus must be positive");
        if m == 1 {
            return 0;
        }
        let bits = 64 - (m - 1).leading_zeros() as usize;
        let nbytes = (bits + 7) / 8;
        let top_mask: u8 = if bits % 8 == 0 {
            0xff
        } else {
            (1u8 << (bits % 8)) - 1
        };
        loop {
            let mut buf = [0u8; 8];
            self.read_bytes(&mut buf[8 - nbytes..]);
            buf[8 - nbytes] &= top_mask;
            let v = u64::from_be_bytes(buf);
            if v < m {
                return v;
            }
        }
    }

    /// Uniform value over the full `bitlen`-bit width.
    pub fn sample_full(&mut self, bitlen: u64) -> u64 {
        let nbytes = (bitlen / 8) as usize;
        let mut buf = [0u8; 8];
        self.read_bytes(&mut buf[8 - nbytes..]);
        u64::from_be_bytes(buf)
    }
}

impl RngCore for BufPrg {
    fn next_u32(&mut self) -> u32 {
        let mut buf = [0u8; 4];
        self.read_bytes(&mut buf);
        u32::from_le_bytes(buf)
    }

    fn next_u64(&mut self) -> u64 {
        self.uint64()
    }

    fn fill_bytes(&mut self, dst: &mut [u8]) {
        self.read_bytes(dst);
    }
}

/// One discrete-Gaussian sample of width `sigma`, centered at zero, rounded
/// to the nearest integer. Callers wrap negatives into the element ring.
pub fn gauss_sample(src: &mut BufPrg, sigma: f64) -> i64 {
    if sigma == 0.0 {
        return 0;
    }
    let normal = Normal::new(0.0, sigma).expect("stddev must be finite and positive");
    let sample: f64 = normal.sample(src);
    sample.round() as i64
}

/// Uniform sample from `{-1, 0, 1}`.
pub fn ternary_sample(src: &mut BufPrg) -> i64 {
    match src.sample_mod(3) {
        0 => 0,
        1 => 1,
        _ => -1,
    }
}
