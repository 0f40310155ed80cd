//! Linearly-homomorphic flavor: instead of selecting one record, the query
//! encodes a whole vector `v` and the reply decodes to `DB * v mod p`.
//!
//! This only works when every record is a single `Z_p` residue and the
//! plaintext modulus is a power of two (so that `p` divides the ciphertext
//! modulus exactly and rounding commutes with the wrap-around).

use crate::client::{Answer, Client, Query};
use crate::elem::Elem;
use crate::error::PirError;
use crate::matrix::Matrix;

/// Per-query client state for the LHE flavor. Keeps the (unscaled) vector
/// the query was parameterized by.
pub struct SecretLhe<T: Elem> {
    pub(crate) query: Matrix<T>,
    pub(crate) secret: Matrix<T>,
    pub(crate) interm: Matrix<T>,
    pub(crate) arr: Option<Matrix<T>>,
}

impl<T: Elem> SecretLhe<T> {
    pub fn secret(&self) -> &Matrix<T> {
        &self.secret
    }
}

impl<T: Elem> Client<T> {
    /// Index-independent half of an LHE query. Fails with `NotSupported`
    /// when the database shape is outside what the scheme can express.
    pub fn preprocess_query_lhe(&mut self) -> Result<SecretLhe<T>, PirError> {
        if self.dbinfo.ne != 1 {
            return Err(PirError::NotSupported(
                "records must fit in a single Z_p element",
            ));
        }
        if self.dbinfo.row_length >= 64 || (1u64 << self.dbinfo.row_length) > self.params.p {
            return Err(PirError::NotSupported(
                "record width must not exceed the plaintext modulus",
            ));
        }
        if !self.params.p.is_power_of_two() {
            return Err(PirError::NotSupported(
                "plaintext modulus must divide the ciphertext modulus",
            ));
        }

        let secret = Matrix::<T>::ternary(&mut self.prg, self.params.n, 1);
        let s = self.preprocess_with_secret(secret);
        Ok(SecretLhe {
            query: s.query,
            secret: s.secret,
            interm: s.interm,
            arr: None,
        })
    }

    /// Fold `Δ * arr` into the preprocessed mask and emit the query. `arr`
    /// is an `m x 1` vector over `Z_p`.
    pub fn query_lhe(&self, arr: &Matrix<T>, secret: &mut SecretLhe<T>) -> Query<T> {
        assert_eq!(
            (arr.rows(), arr.cols()),
            (self.dbinfo.m, 1),
            "vector shape must match the database width"
        );

        secret.arr = Some(arr.clone());

        let mut scaled = arr.clone();
        scaled.mul_const(self.params.delta());
        scaled.append_zeros(secret.query.rows() - arr.rows());
        secret.query.add(&scaled);

        Query(secret.query.clone())
    }

    /// Decode the reply to `DB * arr mod p`, componentwise over the rows.
    ///
    /// Rounding yields the product against the centered residues; adding
    /// `(p/2) * Σ_j arr[j] mod p` maps it back to the raw record values.
    pub fn recover_many_lhe(&self, secret: &SecretLhe<T>, ans: &Answer<T>) -> Vec<u64> {
        let arr = secret
            .arr
            .as_ref()
            .expect("query_lhe must run before recovery");

        let offset = self.recovery_offset(&secret.query);

        let p = self.params.p;
        let mut arr_sum: u64 = 0;
        for j in 0..arr.rows() {
            arr_sum = arr_sum.wrapping_add(arr.get(j, 0));
        }
        let shift = (arr_sum % p).wrapping_mul(p / 2) % p;

        let mut denoised = ans.0.clone();
        denoised.sub(&secret.interm);

        (0..denoised.rows())
            .map(|row| {
                let noised = denoised.get(row, 0).wrapping_add(offset);
                (self.params.round(noised) + shift) % p
            })
            .collect()
    }
}
