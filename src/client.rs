//! Client side of the protocol.
//!
//! A query runs in three steps against one `Secret`: `preprocess_query`
//! (everything independent of the index), `query` (fold the scaled unit
//! vector in), `recover` (strip the mask and round). A `Secret` supports
//! exactly one `preprocess -> query -> recover` pass; re-issuing `query`
//! with a different index on the same state is undefined.

use crate::database::DbInfo;
use crate::elem::Elem;
use crate::error::PirError;
use crate::matrix::{Matrix, SeededMatrix};
use crate::params::LweParams;
use crate::rng::{BufPrg, PrgKey};

/// An encrypted selection vector, shipped to the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query<T: Elem>(pub Matrix<T>);

/// The server's reply, one ring element per database row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Answer<T: Elem>(pub Matrix<T>);

/// Per-query client state.
pub struct Secret<T: Elem> {
    pub(crate) query: Matrix<T>,
    pub(crate) secret: Matrix<T>,
    /// Cached `hint * s`.
    pub(crate) interm: Matrix<T>,
    pub(crate) index: usize,
}

impl<T: Elem> Secret<T> {
    pub fn index(&self) -> usize {
        self.index
    }

    pub(crate) fn from_parts(
        query: Matrix<T>,
        secret: Matrix<T>,
        interm: Matrix<T>,
        index: usize,
    ) -> Self {
        Self {
            query,
            secret,
            interm,
            index,
        }
    }
}

pub struct Client<T: Elem> {
    pub(crate) prg: BufPrg,
    pub(crate) params: LweParams,
    pub(crate) dbinfo: DbInfo,
    pub(crate) hint: Matrix<T>,
    a_seeds: Vec<PrgKey>,
    a_rows: Vec<usize>,
}

impl<T: Elem> Client<T> {
    /// Client whose public matrix comes from a single seed.
    pub fn new(hint: &Matrix<T>, seed: &PrgKey, dbinfo: &DbInfo) -> Result<Self, PirError> {
        Self::new_distributed(hint, vec![*seed], vec![dbinfo.m], dbinfo)
    }

    /// Client whose public matrix is split into row bands, one PRG seed per
    /// band. The matrix itself is never stored; bands are regenerated on
    /// demand during preprocessing.
    pub fn new_distributed(
        hint: &Matrix<T>,
        a_seeds: Vec<PrgKey>,
        a_rows: Vec<usize>,
        dbinfo: &DbInfo,
    ) -> Result<Self, PirError> {
        assert_eq!(
            dbinfo.params.logq,
            T::BITLEN,
            "parameter modulus does not match the element width"
        );
        assert_eq!(
            a_rows.iter().sum::<usize>(),
            dbinfo.m,
            "seed bands must cover the database width"
        );

        Ok(Self {
            prg: BufPrg::from_entropy()?,
            params: dbinfo.params,
            dbinfo: dbinfo.clone(),
            hint: hint.clone(),
            a_seeds,
            a_rows,
        })
    }

    /// Everything about a query that does not depend on the index: sample a
    /// ternary secret, mask it under the regenerated `A`, cache `hint * s`.
    pub fn preprocess_query(&mut self) -> Secret<T> {
        let secret = Matrix::<T>::ternary(&mut self.prg, self.params.n, 1);
        self.preprocess_with_secret(secret)
    }

    pub(crate) fn preprocess_with_secret(&mut self, secret: Matrix<T>) -> Secret<T> {
        let interm = self.hint.mul(&secret);

        let matrix_a = SeededMatrix::new(self.a_seeds.clone(), self.a_rows.clone(), self.params.n);
        let mut query = matrix_a.mul(&secret);

        let err = Matrix::<T>::gaussian(&mut self.prg, self.params.sigma, self.dbinfo.m, 1);
        query.add(&err);

        // pad to the width of the squished database
        let ratio = T::SQUISH_RATIO;
        if self.dbinfo.m % ratio != 0 {
            query.append_zeros(ratio - self.dbinfo.m % ratio);
        }

        Secret {
            query,
            secret,
            interm,
            index: 0,
        }
    }

    /// Bind a preprocessed secret to record `i` and emit the query. The
    /// returned query is a snapshot; the secret keeps its own copy for
    /// recovery.
    pub fn query(&self, i: usize, secret: &mut Secret<T>) -> Query<T> {
        assert!(i < self.dbinfo.num, "record index out of range");
        secret.index = i;
        let (_, col) = self.dbinfo.record_coords(i);
        secret.query.add_at(col, 0, self.params.delta());
        Query(secret.query.clone())
    }

    /// `-(p/2) * Σ_j query[j]` over `Z_q`: cancels the `+p/2` shift the
    /// server applied to the database before packing it.
    pub(crate) fn recovery_offset(&self, query: &Matrix<T>) -> u64 {
        let half_p = self.params.p / 2;
        let mut offset: u64 = 0;
        for j in 0..self.dbinfo.m {
            offset = offset.wrapping_add(query.get(j, 0).wrapping_mul(half_p));
        }
        offset.wrapping_neg() & self.params.q_mask()
    }

    /// Recover the queried record from the answer.
    pub fn recover(&self, secret: &Secret<T>, ans: &Answer<T>) -> u64 {
        let offset = self.recovery_offset(&secret.query);

        let (row_start, _) = self.dbinfo.record_coords(secret.index);
        let mut denoised = ans.0.clone();
        denoised.sub(&secret.interm);

        let vals: Vec<u64> = (0..self.dbinfo.ne)
            .map(|j| {
                let noised = denoised.get(row_start + j, 0).wrapping_add(offset);
                self.params.round(noised)
            })
            .collect();

        self.dbinfo.reconstruct_elem(&vals, secret.index)
    }

    /// Recover one record per row band: the answer column decodes to the
    /// records at `band * m + (i mod m)` for every band.
    pub fn recover_many(&self, secret: &Secret<T>, ans: &Answer<T>) -> Vec<u64> {
        let offset = self.recovery_offset(&secret.query);

        let mut denoised = ans.0.clone();
        denoised.sub(&secret.interm);

        let ne = self.dbinfo.ne;
        let mut out = Vec::with_capacity(denoised.rows() / ne);
        for band in 0..denoised.rows() / ne {
            let vals: Vec<u64> = (0..ne)
                .map(|j| {
                    let noised = denoised.get(band * ne + j, 0).wrapping_add(offset);
                    self.params.round(noised)
                })
                .collect();
            out.push(self.dbinfo.reconstruct_elem(&vals, 0));
        }
        out
    }

    pub fn db_info(&self) -> &DbInfo {
        &self.dbinfo
    }

    /// Discard the hint (the per-query cache in each `Secret` survives).
    pub fn clear_hint(&mut self) {
        self.hint = Matrix::new(0, 0);
    }
}
