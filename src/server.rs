//! Server side of the protocol: one-time offline setup, then a linear scan
//! per query.

use tracing::info;

use crate::client::{Answer, Query};
use crate::database::{Database, DbInfo};
use crate::elem::Elem;
use crate::error::PirError;
use crate::matrix::Matrix;
use crate::params::LweParams;
use crate::rng::{BufPrg, PrgKey};

pub struct Server<T: Elem> {
    params: LweParams,
    seed: PrgKey,
    db: Database<T>,
    hint: Matrix<T>,
}

impl<T: Elem> Server<T> {
    /// Setup with a fresh public-matrix seed from OS entropy.
    pub fn new(db: Database<T>) -> Result<Self, PirError> {
        let seed = PrgKey::random()?;
        Self::new_seeded(db, &seed)
    }

    /// Setup with a caller-chosen seed. Two servers built from equal
    /// databases and equal seeds are bytewise identical.
    ///
    /// The hint `DB * A` is computed over the centered residues; afterwards
    /// the database is shifted back to `[0, p)` and packed, since the online
    /// scan is memory-bandwidth-bound.
    pub fn new_seeded(mut db: Database<T>, seed: &PrgKey) -> Result<Self, PirError> {
        assert_eq!(
            db.info.params.logq,
            T::BITLEN,
            "parameter modulus does not match the element width"
        );

        let mut src = BufPrg::new(seed);
        let matrix_a = Matrix::<T>::rand(&mut src, db.info.m, db.info.params.n, 0);

        let hint = db.data.mul(&matrix_a);

        db.data.add_const(db.info.p() / 2);
        db.squish()?;

        info!(
            l = db.info.l,
            m = db.info.m,
            n = db.info.params.n,
            "server setup complete"
        );

        Ok(Self {
            params: db.info.params,
            seed: *seed,
            db,
            hint,
        })
    }

    pub fn hint(&self) -> &Matrix<T> {
        &self.hint
    }

    /// Free the hint once it has been shipped to the client.
    pub fn drop_hint(&mut self) {
        self.hint = Matrix::new(0, 0);
    }

    pub fn matrix_a_seed(&self) -> &PrgKey {
        &self.seed
    }

    pub fn params(&self) -> &LweParams {
        &self.params
    }

    pub fn db_info(&self) -> &DbInfo {
        &self.db.info
    }

    /// One pass of the packed database over the query vector.
    pub fn answer(&self, query: &Query<T>) -> Answer<T> {
        Answer(self.db.data.mul_vec_packed(&query.0))
    }

    /// Decode record `i` straight out of the squished, shifted layout.
    pub fn get(&self, i: usize) -> u64 {
        let info = &self.db.info;
        assert!(i < info.num, "record index out of range");

        let (row, col) = info.record_coords(i);
        let ratio = info.squishing;
        let basis = T::SQUISH_BASIS;
        let mask = (1u64 << basis) - 1;

        let digits: Vec<u64> = (0..info.ne)
            .map(|j| {
                let word = self.db.data.get(row + j, col / ratio);
                (word >> ((col % ratio) as u64 * basis)) & mask
            })
            .collect();
        info.decode_record(&digits, i)
    }

    pub(crate) fn from_parts(
        params: LweParams,
        seed: PrgKey,
        db: Database<T>,
        hint: Matrix<T>,
    ) -> Self {
        Self {
            params,
            seed,
            db,
            hint,
        }
    }

    pub(crate) fn db(&self) -> &Database<T> {
        &self.db
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prg() -> BufPrg {
        BufPrg::new(&PrgKey([23u8; 16]))
    }

    #[test]
    fn test_setup_is_deterministic() {
        let mut src = prg();
        let db = Database::<u32>::random(&mut src, 32, 1 << 10, 8).unwrap();
        let seed = PrgKey([1u8; 16]);

        let s1 = Server::new_seeded(db.clone(), &seed).unwrap();
        let s2 = Server::new_seeded(db, &seed).unwrap();

        assert_eq!(s1.hint(), s2.hint());
        assert_eq!(s1.db().data, s2.db().data);
    }

    #[test]
    fn test_setup_squishes_database() {
        let mut src = prg();
        let db = Database::<u32>::random(&mut src, 32, 1 << 10, 8).unwrap();
        let m = db.info.m;

        let server = Server::new(db).unwrap();
        assert_eq!(server.db().data.cols(), (m + 2) / 3);
        assert_eq!(server.db_info().squishing, 3);
    }

    #[test]
    fn test_get_matches_unsquished_db() {
        let mut src = prg();
        for row_length in [3usize, 8, 12, 32] {
            let db = Database::<u32>::random(&mut src, 32, 1 << 9, row_length).unwrap();
            let server = Server::new(db.clone()).unwrap();
            for i in (0..db.info.num).step_by(37) {
                assert_eq!(server.get(i), db.get_elem(i), "row_length={row_length} i={i}");
            }
        }
    }

    #[test]
    fn test_get_matches_unsquished_db_64() {
        let mut src = prg();
        let db = Database::<u64>::random(&mut src, 64, 1 << 9, 48).unwrap();
        let server = Server::new(db.clone()).unwrap();
        for i in (0..db.info.num).step_by(29) {
            assert_eq!(server.get(i), db.get_elem(i));
        }
    }

    #[test]
    fn test_drop_hint() {
        let mut src = prg();
        let db = Database::<u32>::random(&mut src, 32, 1 << 8, 8).unwrap();
        let mut server = Server::new(db).unwrap();
        assert!(server.hint().size() > 0);
        server.drop_hint();
        assert_eq!(server.hint().size(), 0);
    }
}
