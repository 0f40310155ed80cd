//! Record encoding: a logical stream of fixed-width records becomes an
//! `L x M` matrix of `Z_p` residues, centered around zero for the benefit of
//! the noise budget, and later packed column-wise for the online phase.

use tracing::debug;

use crate::arith::{base_p, num_entries_base_p, reconstruct_from_base_p};
use crate::elem::Elem;
use crate::error::PirError;
use crate::matrix::Matrix;
use crate::params::LweParams;
use crate::rng::BufPrg;

/// Shape and encoding metadata of a database.
#[derive(Debug, Clone, PartialEq)]
pub struct DbInfo {
    /// Number of records.
    pub num: usize,
    /// Bits per record.
    pub row_length: usize,
    /// Records per `Z_p` element, when `log p >= row_length` (else 0).
    pub packing: usize,
    /// `Z_p` elements per record, when `row_length > log p` (else 1).
    pub ne: usize,
    /// Matrix height.
    pub l: usize,
    /// Matrix width; also the LWE sample count the parameters must support.
    pub m: usize,
    /// Column compression ratio applied by the server's in-memory packing.
    pub squishing: usize,
    pub params: LweParams,
}

/// How many `Z_p` elements a database of `num` records of `row_length` bits
/// needs. Returns `(db_elems, ne, packing)`: either several records pack into
/// one element (`ne = 1`), or each record spans `ne` elements (`packing = 0`).
fn num_entries(num: usize, row_length: usize, p: u64) -> (usize, usize, usize) {
    let log_p = (p as f64).log2();
    if row_length as f64 <= log_p {
        let entries_per_elem = log_p as usize / row_length;
        let db_elems = (num + entries_per_elem - 1) / entries_per_elem;
        assert!(
            db_elems > 0 && db_elems <= num,
            "bad element count {db_elems} for {num} records"
        );
        (db_elems, 1, entries_per_elem)
    } else {
        let ne = num_entries_base_p(p, row_length as u64);
        (num * ne, ne, 0)
    }
}

/// Smallest near-square `(l, m)` with `l * m >= db_elems` and `ne | l`.
fn approx_square_dims(db_elems: usize, ne: usize) -> (usize, usize) {
    let mut l = (db_elems as f64).sqrt().floor() as usize;
    let rem = l % ne;
    if rem != 0 {
        l += ne - rem;
    }
    let m = (db_elems + l - 1) / l;
    (l, m)
}

impl DbInfo {
    /// Database shape for `num` records of `row_length` bits: guess a
    /// plaintext modulus to estimate the width, ask the parameter tables for
    /// the real modulus, and reshape around it.
    pub fn new(logq: u64, num: usize, row_length: usize) -> Result<Self, PirError> {
        assert!(num > 0 && row_length > 0, "empty database");

        let temp_p = 256;
        let (db_elems, ne, _) = num_entries(num, row_length, temp_p);
        let (_, m) = approx_square_dims(db_elems, ne);

        let params = LweParams::new(logq, m).ok_or(PirError::NoParams { logq, m })?;
        Self::with_params(num, row_length, params, false)
    }

    /// Database shape under concrete LWE parameters. When `fixed` is false
    /// the parameters are re-selected for the final matrix width.
    pub fn with_params(
        num: usize,
        row_length: usize,
        params: LweParams,
        fixed: bool,
    ) -> Result<Self, PirError> {
        let (db_elems, ne, packing) = num_entries(num, row_length, params.p);
        let (l, m) = approx_square_dims(db_elems, ne);

        assert!(db_elems <= l * m, "params and database size don't match");
        assert!(l % ne == 0, "element count per record must divide db height");

        let params = if fixed {
            params
        } else {
            LweParams::new(params.logq, m).ok_or(PirError::NoParams {
                logq: params.logq,
                m,
            })?
        };

        debug!(
            num,
            row_length,
            l,
            m,
            ne,
            packing,
            size_mb = (l * m) as f64 * (params.p as f64).log2() / (8.0 * 1024.0 * 1024.0),
            "computed database shape"
        );

        Ok(Self {
            num,
            row_length,
            packing,
            ne,
            l,
            m,
            squishing: 0,
            params,
        })
    }

    /// `Z_p` elements per record.
    pub fn record_size(&self) -> usize {
        self.ne
    }

    pub fn p(&self) -> u64 {
        self.params.p
    }

    /// Rebuild a record from its residues, which are taken in the centered
    /// `[-p/2, p/2)` representation: normalize each by `+p/2` over `Z_q`,
    /// reduce mod `p`, and evaluate the base-`p` expansion. When several
    /// records share one element, `index` selects the digit.
    pub fn reconstruct_elem(&self, vals: &[u64], index: usize) -> u64 {
        let p = self.p();
        let qm = self.params.q_mask();
        let digits: Vec<u64> = vals
            .iter()
            .map(|&v| (v.wrapping_add(p / 2) & qm) % p)
            .collect();
        self.decode_record(&digits, index)
    }

    /// Same, but for residues already in `[0, p)`.
    pub(crate) fn decode_record(&self, digits: &[u64], index: usize) -> u64 {
        let val = reconstruct_from_base_p(self.p(), digits);
        if self.packing > 0 {
            base_p(1 << self.row_length, val, index % self.packing)
        } else {
            val
        }
    }

    /// Element-matrix coordinates `(first_row, col)` of record `i`.
    pub(crate) fn record_coords(&self, i: usize) -> (usize, usize) {
        let elem = if self.packing > 1 { i / self.packing } else { i };
        ((elem / self.m) * self.ne, elem % self.m)
    }

    /// Total element slots the matrix offers.
    fn elem_capacity(&self) -> usize {
        (self.l / self.ne) * self.m
    }
}

/// A database bound to an element width: shape metadata plus the residue
/// matrix, `L x M` before squishing.
#[derive(Debug, Clone, PartialEq)]
pub struct Database<T: Elem> {
    pub info: DbInfo,
    pub data: Matrix<T>,
}

impl<T: Elem> Database<T> {
    /// Database of uniform random records.
    pub fn random(
        src: &mut BufPrg,
        logq: u64,
        num: usize,
        row_length: usize,
    ) -> Result<Self, PirError> {
        let info = DbInfo::new(logq, num, row_length)?;
        Self::random_fixed_params(src, num, row_length, &info.params)
    }

    pub fn random_fixed_params(
        src: &mut BufPrg,
        num: usize,
        row_length: usize,
        params: &LweParams,
    ) -> Result<Self, PirError> {
        let mut info = DbInfo::with_params(num, row_length, *params, true)?;
        info.squishing = T::SQUISH_RATIO;

        let mut modulus = info.p();
        if row_length < 64 && (1u64 << row_length) < modulus && info.packing == 1 {
            modulus = 1 << row_length;
        }

        let mut data = Matrix::<T>::rand(src, info.l, info.m, modulus);

        // zero the element slots past the end of the record stream
        let (used, capacity) = (elem_count(&info), info.elem_capacity());
        for e in used..capacity {
            let (row, col) = ((e / info.m) * info.ne, e % info.m);
            for j in 0..info.ne {
                data.set(row + j, col, 0);
            }
        }

        data.sub_const(info.p() / 2);
        Ok(Self { info, data })
    }

    /// Encode `vals` (one `u64` per record, `row_length` significant bits).
    pub fn new(
        logq: u64,
        num: usize,
        row_length: usize,
        vals: &[u64],
    ) -> Result<Self, PirError> {
        let info = DbInfo::new(logq, num, row_length)?;
        Self::new_fixed_params(num, row_length, vals, &info.params)
    }

    pub fn new_fixed_params(
        num: usize,
        row_length: usize,
        vals: &[u64],
        params: &LweParams,
    ) -> Result<Self, PirError> {
        assert_eq!(vals.len(), num, "bad input database");

        let mut info = DbInfo::with_params(num, row_length, *params, true)?;
        info.squishing = T::SQUISH_RATIO;

        let mut data = Matrix::<T>::zeros(info.l, info.m);

        if info.packing > 0 {
            // several records per Z_p element
            let mut at = 0usize;
            let mut cur = 0u64;
            let mut coeff = 1u64;
            for (i, &v) in vals.iter().enumerate() {
                cur = cur.wrapping_add(v.wrapping_mul(coeff));
                coeff = coeff.wrapping_mul(1 << row_length);
                if (i + 1) % info.packing == 0 || i == vals.len() - 1 {
                    data.set(at / info.m, at % info.m, cur);
                    at += 1;
                    cur = 0;
                    coeff = 1;
                }
            }
        } else {
            // several Z_p elements per record, stacked vertically
            for (i, &v) in vals.iter().enumerate() {
                for j in 0..info.ne {
                    data.set(
                        (i / info.m) * info.ne + j,
                        i % info.m,
                        base_p(info.p(), v, j),
                    );
                }
            }
        }

        // center the residues at zero
        data.sub_const(info.p() / 2);
        Ok(Self { info, data })
    }

    /// Decode record `i` from the pre-squish (centered) layout.
    pub fn get_elem(&self, i: usize) -> u64 {
        assert!(i < self.info.num, "record index out of range");

        let (row, col) = self.info.record_coords(i);
        let vals: Vec<u64> = (0..self.info.ne)
            .map(|j| self.data.get(row + j, col))
            .collect();
        self.info.reconstruct_elem(&vals, i)
    }

    /// Pack the residue matrix column-wise for the memory-bound online
    /// phase. Entries must already have been shifted back to `[0, p)`.
    pub fn squish(&mut self) -> Result<(), PirError> {
        if !Matrix::<T>::can_squish(self.info.p()) {
            return Err(PirError::CannotSquish {
                p: self.info.p(),
                basis: T::SQUISH_BASIS,
            });
        }
        self.info.squishing = T::SQUISH_RATIO;
        self.data.squish();
        Ok(())
    }
}

/// Number of element slots the record stream actually fills.
fn elem_count(info: &DbInfo) -> usize {
    if info.packing > 0 {
        (info.num + info.packing - 1) / info.packing
    } else {
        info.num
    }
}
