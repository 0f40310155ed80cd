//! Dense matrix kernel over the wrapping element ring.
//!
//! All arithmetic is modulo `2^BITLEN`; there is no signed representation at
//! this layer. Encoding signed residues is the caller's business (the
//! database layer keeps entries centered via `±p/2` offsets).

use rayon::prelude::*;

use crate::elem::Elem;
use crate::rng::{gauss_sample, ternary_sample, BufPrg, PrgKey};

/// Row-major `rows x cols` rectangle of ring elements.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Matrix<T: Elem> {
    rows: usize,
    cols: usize,
    data: Vec<T>,
}

impl<T: Elem> Matrix<T> {
    pub fn new(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            data: vec![T::default(); rows * cols],
        }
    }

    pub fn zeros(rows: usize, cols: usize) -> Self {
        Self::new(rows, cols)
    }

    pub(crate) fn from_raw(rows: usize, cols: usize, data: Vec<T>) -> Self {
        assert_eq!(data.len(), rows * cols, "data length does not match shape");
        Self { rows, cols, data }
    }

    /// Uniform residues mod `modulus`; `modulus == 0` means uniform over the
    /// full element width.
    pub fn rand(src: &mut BufPrg, rows: usize, cols: usize, modulus: u64) -> Self {
        let mut out = Self::new(rows, cols);
        for v in &mut out.data {
            *v = if modulus == 0 {
                T::from_u64(src.sample_full(T::BITLEN))
            } else {
                T::from_u64(src.sample_mod(modulus))
            };
        }
        out
    }

    /// I.i.d. discrete-Gaussian entries of width `sigma`, negatives wrapped
    /// into the ring.
    pub fn gaussian(src: &mut BufPrg, sigma: f64, rows: usize, cols: usize) -> Self {
        let mut out = Self::new(rows, cols);
        for v in &mut out.data {
            *v = T::from_u64(gauss_sample(src, sigma) as u64);
        }
        out
    }

    /// I.i.d. uniform entries from `{-1, 0, 1}`, wrapped into the ring.
    pub fn ternary(src: &mut BufPrg, rows: usize, cols: usize) -> Self {
        let mut out = Self::new(rows, cols);
        for v in &mut out.data {
            *v = T::from_u64(ternary_sample(src) as u64);
        }
        out
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn size(&self) -> usize {
        self.rows * self.cols
    }

    pub(crate) fn data(&self) -> &[T] {
        &self.data
    }

    #[inline]
    fn row(&self, i: usize) -> &[T] {
        &self.data[i * self.cols..(i + 1) * self.cols]
    }

    pub fn get(&self, i: usize, j: usize) -> u64 {
        assert!(i < self.rows, "row index {i} out of bounds ({})", self.rows);
        assert!(j < self.cols, "col index {j} out of bounds ({})", self.cols);
        self.data[i * self.cols + j].to_u64()
    }

    pub fn set(&mut self, i: usize, j: usize, val: u64) {
        assert!(i < self.rows, "row index {i} out of bounds ({})", self.rows);
        assert!(j < self.cols, "col index {j} out of bounds ({})", self.cols);
        self.data[i * self.cols + j] = T::from_u64(val);
    }

    pub fn add_at(&mut self, i: usize, j: usize, val: u64) {
        let cur = self.get(i, j);
        let idx = i * self.cols + j;
        self.data[idx] = T::from_u64(cur).wrapping_add(T::from_u64(val));
    }

    pub fn add(&mut self, b: &Self) {
        assert_eq!(
            (self.rows, self.cols),
            (b.rows, b.cols),
            "dimension mismatch: {}x{} vs {}x{}",
            self.rows,
            self.cols,
            b.rows,
            b.cols
        );
        for (a, &v) in self.data.iter_mut().zip(&b.data) {
            *a = a.wrapping_add(v);
        }
    }

    pub fn sub(&mut self, b: &Self) {
        assert_eq!(
            (self.rows, self.cols),
            (b.rows, b.cols),
            "dimension mismatch: {}x{} vs {}x{}",
            self.rows,
            self.cols,
            b.rows,
            b.cols
        );
        for (a, &v) in self.data.iter_mut().zip(&b.data) {
            *a = a.wrapping_sub(v);
        }
    }

    pub fn add_const(&mut self, val: u64) {
        let v = T::from_u64(val);
        for a in &mut self.data {
            *a = a.wrapping_add(v);
        }
    }

    pub fn sub_const(&mut self, val: u64) {
        let v = T::from_u64(val);
        for a in &mut self.data {
            *a = a.wrapping_sub(v);
        }
    }

    pub fn mul_const(&mut self, val: u64) {
        let v = T::from_u64(val);
        for a in &mut self.data {
            *a = a.wrapping_mul(v);
        }
    }

    /// Elementwise reduction of the raw residues mod `modulus`.
    pub fn reduce_mod(&mut self, modulus: u64) {
        for a in &mut self.data {
            *a = T::from_u64(a.to_u64() % modulus);
        }
    }

    /// Elementwise `((x + to/2) / to) mod modulus`.
    pub fn round(&mut self, to: u64, modulus: u64) {
        for a in &mut self.data {
            let v = a.to_u64().wrapping_add(to / 2) / to;
            *a = T::from_u64(v % modulus);
        }
    }

    /// Stack `below` underneath `self`. A zero-dimension receiver inherits
    /// the other matrix.
    pub fn concat(&mut self, below: &Self) {
        if self.rows == 0 && self.cols == 0 {
            *self = below.clone();
            return;
        }
        assert_eq!(
            self.cols, below.cols,
            "dimension mismatch: {}x{} vs {}x{}",
            self.rows, self.cols, below.rows, below.cols
        );
        self.rows += below.rows;
        self.data.extend_from_slice(&below.data);
    }

    /// Append `n` zero rows to a column vector.
    pub fn append_zeros(&mut self, n: usize) {
        self.concat(&Self::zeros(n, 1));
    }

    pub fn drop_last_rows(&mut self, n: usize) {
        assert!(n <= self.rows, "dropping more rows than the matrix has");
        self.rows -= n;
        self.data.truncate(self.rows * self.cols);
    }

    /// Dense product `self * b`. Work fans out across rows; entries wrap.
    pub fn mul(&self, b: &Self) -> Self {
        if b.cols == 1 {
            return self.mul_vec(b);
        }
        assert_eq!(
            self.cols, b.rows,
            "dimension mismatch: {}x{} vs {}x{}",
            self.rows, self.cols, b.rows, b.cols
        );

        let mut out = Self::new(self.rows, b.cols);
        let bcols = b.cols;
        out.data
            .par_chunks_mut(bcols)
            .enumerate()
            .for_each(|(i, out_row)| {
                for (k, &a) in self.row(i).iter().enumerate() {
                    let b_row = &b.data[k * bcols..(k + 1) * bcols];
                    for (o, &bv) in out_row.iter_mut().zip(b_row) {
                        *o = o.wrapping_add(a.wrapping_mul(bv));
                    }
                }
            });
        out
    }

    /// Matrix-vector product. The vector may carry up to two extra rows of
    /// zero padding left over from matching a squished database width.
    pub fn mul_vec(&self, b: &Self) -> Self {
        assert!(
            b.rows >= self.cols && b.rows <= self.cols + 2,
            "dimension mismatch: {}x{} vs {}x{}",
            self.rows,
            self.cols,
            b.rows,
            b.cols
        );
        assert_eq!(b.cols, 1, "second operand is not a vector");

        let mut out = Self::new(self.rows, 1);
        for i in 0..self.rows {
            let mut acc = T::default();
            for (j, &a) in self.row(i).iter().enumerate() {
                acc = acc.wrapping_add(a.wrapping_mul(b.data[j]));
            }
            out.data[i] = acc;
        }
        out
    }

    /// Matrix-vector product where `self` is in squished layout: each stored
    /// word packs `SQUISH_RATIO` digits of `SQUISH_BASIS` bits, matched
    /// against consecutive vector entries.
    ///
    /// Rows are processed eight at a time; the output is allocated with eight
    /// rows of slack so the final block can write all lanes, then trimmed.
    pub fn mul_vec_packed(&self, b: &Self) -> Self {
        let ratio = T::SQUISH_RATIO;
        let basis = T::SQUISH_BASIS;
        assert_eq!(
            self.cols * ratio,
            b.rows,
            "dimension mismatch: {}x{} (packed x{ratio}) vs {}x{}",
            self.rows,
            self.cols,
            b.rows,
            b.cols
        );
        assert_eq!(b.cols, 1, "second operand is not a vector");

        let mask = T::from_u64((1u64 << basis) - 1);
        let mut out = Self::new(self.rows + 8, 1);

        let mut block = 0;
        while block < self.rows {
            let live = (self.rows - block).min(8);
            let mut acc = [T::default(); 8];
            for j in 0..self.cols {
                for (r, a) in acc.iter_mut().enumerate().take(live) {
                    let word = self.data[(block + r) * self.cols + j];
                    for d in 0..ratio {
                        let digit = word.shr(d as u64 * basis).bitand(mask);
                        *a = a.wrapping_add(digit.wrapping_mul(b.data[j * ratio + d]));
                    }
                }
            }
            out.data[block..block + 8].copy_from_slice(&acc);
            block += 8;
        }

        out.drop_last_rows(out.rows - self.rows);
        out
    }

    /// Whether residues mod `p` fit in the packed digit basis.
    pub fn can_squish(p: u64) -> bool {
        p <= (1u64 << T::SQUISH_BASIS)
    }

    /// Pack each group of `SQUISH_RATIO` consecutive columns into one word,
    /// `SQUISH_BASIS` bits per digit, zero-padding the tail group. Every
    /// entry must already be below `2^SQUISH_BASIS`.
    pub fn squish(&mut self) {
        let ratio = T::SQUISH_RATIO;
        let basis = T::SQUISH_BASIS;
        let new_cols = (self.cols + ratio - 1) / ratio;

        let mut out = Self::new(self.rows, new_cols);
        for i in 0..self.rows {
            for j in 0..new_cols {
                let mut word = T::default();
                for k in 0..ratio {
                    let col = ratio * j + k;
                    if col < self.cols {
                        let v = self.data[i * self.cols + col];
                        debug_assert!(
                            v.to_u64() < (1u64 << basis),
                            "entry {v} too large to squish"
                        );
                        word = word.wrapping_add(v.shl(k as u64 * basis));
                    }
                }
                out.data[i * new_cols + j] = word;
            }
        }
        *self = out;
    }
}

/// A matrix whose rows are never materialized: bands of rows are defined by
/// PRG keys, one band per key, sharing a column count. Its only consumer is
/// the seeded-left multiply.
#[derive(Debug, Clone)]
pub struct SeededMatrix {
    seeds: Vec<PrgKey>,
    rows_per_seed: Vec<usize>,
    cols: usize,
}

impl SeededMatrix {
    pub fn new(seeds: Vec<PrgKey>, rows_per_seed: Vec<usize>, cols: usize) -> Self {
        assert_eq!(
            seeds.len(),
            rows_per_seed.len(),
            "each band needs exactly one seed"
        );
        Self {
            seeds,
            rows_per_seed,
            cols,
        }
    }

    pub fn rows(&self) -> usize {
        self.rows_per_seed.iter().sum()
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    /// `A * b` where `A` is this seeded matrix, uniform over the full element
    /// width. Each band is regenerated from its key into a scratch matrix and
    /// multiplied into a disjoint slice of the output, all bands in parallel.
    pub fn mul<T: Elem>(&self, b: &Matrix<T>) -> Matrix<T> {
        assert_eq!(
            self.cols,
            b.rows,
            "dimension mismatch: {}x{} vs {}x{}",
            self.rows(),
            self.cols,
            b.rows,
            b.cols
        );

        let bcols = b.cols;
        let mut out = Matrix::<T>::new(self.rows(), bcols);

        let mut bands: Vec<(&PrgKey, usize, &mut [T])> = Vec::with_capacity(self.seeds.len());
        let mut rest: &mut [T] = &mut out.data;
        for (seed, &band_rows) in self.seeds.iter().zip(&self.rows_per_seed) {
            let (head, tail) = rest.split_at_mut(band_rows * bcols);
            bands.push((seed, band_rows, head));
            rest = tail;
        }

        bands.into_par_iter().for_each(|(seed, band_rows, out_band)| {
            let mut src = BufPrg::new(seed);
            let a = Matrix::<T>::rand(&mut src, band_rows, self.cols, 0);
            for i in 0..band_rows {
                let out_row = &mut out_band[i * bcols..(i + 1) * bcols];
                for (k, &av) in a.row(i).iter().enumerate() {
                    let b_row = &b.data[k * bcols..(k + 1) * bcols];
                    for (o, &bv) in out_row.iter_mut().zip(b_row) {
                        *o = o.wrapping_add(av.wrapping_mul(bv));
                    }
                }
            }
        });

        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::elem::Elem;

    fn key(b: u8) -> PrgKey {
        PrgKey([b; 16])
    }

    #[test]
    fn test_zeros_shape() {
        let m = Matrix::<u32>::zeros(3, 4);
        assert_eq!(m.rows(), 3);
        assert_eq!(m.cols(), 4);
        assert_eq!(m.size(), 12);
        assert!(m.data.iter().all(|&v| v == 0));
    }

    #[test]
    fn test_get_set_round_trip() {
        let mut m = Matrix::<u64>::new(2, 3);
        m.set(1, 2, 77);
        assert_eq!(m.get(1, 2), 77);
        m.add_at(1, 2, 3);
        assert_eq!(m.get(1, 2), 80);
    }

    #[test]
    #[should_panic]
    fn test_get_out_of_bounds() {
        let m = Matrix::<u32>::new(2, 2);
        m.get(2, 0);
    }

    #[test]
    fn test_add_zeros_is_identity() {
        let mut src = BufPrg::new(&key(1));
        let m = Matrix::<u32>::rand(&mut src, 7, 5, 0);
        let mut z = Matrix::<u32>::zeros(7, 5);
        z.add(&m);
        assert_eq!(z, m);
    }

    #[test]
    fn test_add_sub_cancel() {
        let mut src = BufPrg::new(&key(2));
        let a = Matrix::<u64>::rand(&mut src, 4, 4, 0);
        let b = Matrix::<u64>::rand(&mut src, 4, 4, 0);
        let mut c = a.clone();
        c.add(&b);
        c.sub(&b);
        assert_eq!(c, a);
    }

    #[test]
    fn test_const_ops_wrap() {
        let mut m = Matrix::<u32>::new(1, 1);
        m.set(0, 0, u32::MAX as u64);
        m.add_const(2);
        assert_eq!(m.get(0, 0), 1);
        m.sub_const(2);
        assert_eq!(m.get(0, 0), u32::MAX as u64);
        m.mul_const(2);
        assert_eq!(m.get(0, 0), (u32::MAX as u64).wrapping_mul(2) & 0xffff_ffff);
    }

    fn naive_mul<T: Elem>(a: &Matrix<T>, b: &Matrix<T>) -> Matrix<T> {
        let mut out = Matrix::<T>::new(a.rows(), b.cols());
        for i in 0..a.rows() {
            for j in 0..b.cols() {
                let mut acc = T::default();
                for k in 0..a.cols() {
                    acc = acc.wrapping_add(a.data[i * a.cols + k].wrapping_mul(b.data[k * b.cols + j]));
                }
                out.data[i * b.cols + j] = acc;
            }
        }
        out
    }

    #[test]
    fn test_mul_against_naive_32() {
        let mut src = BufPrg::new(&key(3));
        let a = Matrix::<u32>::rand(&mut src, 9, 14, 0);
        let b = Matrix::<u32>::rand(&mut src, 14, 6, 0);
        assert_eq!(a.mul(&b), naive_mul(&a, &b));
    }

    #[test]
    fn test_mul_against_naive_64() {
        let mut src = BufPrg::new(&key(4));
        let a = Matrix::<u64>::rand(&mut src, 2, 8, 0);
        let b = Matrix::<u64>::rand(&mut src, 8, 7, 0);
        assert_eq!(a.mul(&b), naive_mul(&a, &b));
    }

    #[test]
    fn test_mul_by_zero_matrix() {
        let mut src = BufPrg::new(&key(5));
        let a = Matrix::<u32>::rand(&mut src, 5, 5, 0);
        let z = Matrix::<u32>::zeros(5, 5);
        assert_eq!(a.mul(&z), Matrix::<u32>::zeros(5, 5));
    }

    #[test]
    fn test_mul_vec_matches_mul() {
        let mut src = BufPrg::new(&key(6));
        let a = Matrix::<u64>::rand(&mut src, 60, 83, 0);
        let v = Matrix::<u64>::rand(&mut src, 83, 1, 0);
        assert_eq!(a.mul_vec(&v), naive_mul(&a, &v));
    }

    #[test]
    fn test_mul_vec_tolerates_padding() {
        let mut src = BufPrg::new(&key(7));
        let a = Matrix::<u32>::rand(&mut src, 10, 9, 0);
        let mut v = Matrix::<u32>::rand(&mut src, 9, 1, 0);
        let base = a.mul_vec(&v);
        v.append_zeros(2);
        assert_eq!(a.mul_vec(&v), base);
    }

    #[test]
    #[should_panic]
    fn test_mul_vec_dimension_mismatch() {
        let a = Matrix::<u32>::new(4, 4);
        let v = Matrix::<u32>::new(7, 1);
        a.mul_vec(&v);
    }

    fn check_seeded_mul<T: Elem>(rows: usize, inner: usize, cols: usize) {
        let k = key(11);
        let mut src = BufPrg::new(&k);
        let mut src2 = BufPrg::new(&key(12));

        let a = Matrix::<T>::rand(&mut src, rows, inner, 0);
        let b = Matrix::<T>::rand(&mut src2, inner, cols, 0);

        let seeded = SeededMatrix::new(vec![k], vec![rows], inner);
        assert_eq!(seeded.mul(&b), a.mul(&b));
    }

    #[test]
    fn test_seeded_mul_matches_materialized() {
        check_seeded_mul::<u32>(17, 23, 4);
        check_seeded_mul::<u64>(17, 23, 4);
        check_seeded_mul::<u32>(60, 83, 1);
        check_seeded_mul::<u64>(60, 83, 1);
    }

    #[test]
    fn test_seeded_mul_multiple_bands() {
        // two bands with distinct keys must equal the vertical concat of the
        // two materialized band matrices
        let (k1, k2) = (key(21), key(22));
        let mut src_b = BufPrg::new(&key(23));
        let b = Matrix::<u32>::rand(&mut src_b, 12, 3, 0);

        let mut top = Matrix::<u32>::rand(&mut BufPrg::new(&k1), 5, 12, 0);
        let bottom = Matrix::<u32>::rand(&mut BufPrg::new(&k2), 9, 12, 0);
        top.concat(&bottom);

        let seeded = SeededMatrix::new(vec![k1, k2], vec![5, 9], 12);
        assert_eq!(seeded.mul(&b), top.mul(&b));
    }

    #[test]
    fn test_squish_manual() {
        // one row of digits [1, 2, 3, 4]: first word packs 1|2|3, second
        // packs the zero-padded tail 4|0|0
        let basis = <u32 as Elem>::SQUISH_BASIS;
        let mut m = Matrix::<u32>::from_raw(1, 4, vec![1, 2, 3, 4]);
        m.squish();
        assert_eq!(m.rows(), 1);
        assert_eq!(m.cols(), 2);
        assert_eq!(m.get(0, 0), 1 | (2 << basis) | (3 << (2 * basis)));
        assert_eq!(m.get(0, 1), 4);
    }

    fn check_packed_mul<T: Elem>(rows: usize, cols: usize, seed: u8) {
        let mut src = BufPrg::new(&key(seed));
        let mut v = Matrix::<T>::rand(&mut src, cols, 1, 0);
        let mut a = Matrix::<T>::rand(&mut src, rows, cols, 1u64 << T::SQUISH_BASIS);

        let expect = a.mul_vec(&v);
        a.squish();
        v.append_zeros(a.cols() * T::SQUISH_RATIO - cols);
        assert_eq!(a.mul_vec_packed(&v), expect);
    }

    #[test]
    fn test_packed_mul_matches_dense() {
        check_packed_mul::<u32>(8, 13, 31);
        check_packed_mul::<u64>(8, 13, 32);
    }

    #[test]
    fn test_packed_mul_matches_dense_big() {
        check_packed_mul::<u32>(812, 1391, 33);
        check_packed_mul::<u64>(810, 132, 34);
    }

    #[test]
    fn test_packed_mul_ragged_rows() {
        // row counts that are not multiples of the 8-row block
        check_packed_mul::<u32>(1, 6, 35);
        check_packed_mul::<u32>(13, 9, 36);
        check_packed_mul::<u64>(7, 21, 37);
    }

    #[test]
    fn test_concat_and_drop() {
        let mut a = Matrix::<u32>::from_raw(1, 2, vec![1, 2]);
        let b = Matrix::<u32>::from_raw(2, 2, vec![3, 4, 5, 6]);
        a.concat(&b);
        assert_eq!(a.rows(), 3);
        assert_eq!(a.get(2, 1), 6);
        a.drop_last_rows(2);
        assert_eq!(a, Matrix::<u32>::from_raw(1, 2, vec![1, 2]));
    }

    #[test]
    fn test_concat_into_empty() {
        let mut a = Matrix::<u64>::new(0, 0);
        let b = Matrix::<u64>::from_raw(2, 1, vec![8, 9]);
        a.concat(&b);
        assert_eq!(a, b);
    }

    #[test]
    fn test_round() {
        let mut m = Matrix::<u32>::from_raw(1, 4, vec![0, 99, 100, 250]);
        m.round(100, 5);
        assert_eq!(m.data, vec![0, 1, 1, 3]);
    }

    #[test]
    fn test_gaussian_wraps_negatives() {
        let mut src = BufPrg::new(&key(40));
        let m = Matrix::<u32>::gaussian(&mut src, 6.4, 200, 1);
        // every entry is within a few sigma of zero, on either side of the
        // wrap-around
        for &v in &m.data {
            let centered = v as i32 as i64;
            assert!(centered.abs() < 64, "sample {centered} implausibly large");
        }
    }

    #[test]
    fn test_ternary_entries() {
        let mut src = BufPrg::new(&key(41));
        let m = Matrix::<u64>::ternary(&mut src, 100, 1);
        for &v in &m.data {
            assert!(v == 0 || v == 1 || v == u64::MAX);
        }
    }

    #[test]
    fn test_rand_respects_modulus() {
        let mut src = BufPrg::new(&key(42));
        let m = Matrix::<u32>::rand(&mut src, 50, 3, 991);
        assert!(m.data.iter().all(|&v| v < 991));
    }
}
