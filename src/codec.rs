//! Binary (de)serialization for transport, plus the ASCII dump format used
//! for offline debugging.
//!
//! A matrix is `(rows: u64-LE, cols: u64-LE, data: rows*cols elements, LE)`.
//! Queries and answers encode their inner matrix. A server encodes as
//! `(params, A-seed, db-info, db-matrix, hint)`; the public matrix itself is
//! never stored, since it is regenerable from the seed.

use std::io::{self, BufRead, Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use thiserror::Error;

use crate::client::{Answer, Query, Secret};
use crate::database::{Database, DbInfo};
use crate::elem::Elem;
use crate::matrix::Matrix;
use crate::params::LweParams;
use crate::rng::PrgKey;
use crate::server::Server;

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("i/o failure during (de)serialization")]
    Io(#[from] io::Error),

    #[error("matrix shape {rows}x{cols} is not representable")]
    ShapeMismatch { rows: u64, cols: u64 },

    #[error("unknown ciphertext modulus logq={0}")]
    UnknownLogq(u64),

    #[error("encoded element width (logq={got}) does not match the expected {want}")]
    ElemWidthMismatch { got: u64, want: u64 },

    #[error("inconsistent parameter encoding")]
    MalformedParams,

    #[error("malformed ascii matrix dump")]
    MalformedAscii,
}

fn write_elem<T: Elem, W: Write>(w: &mut W, v: T) -> Result<(), CodecError> {
    match T::BITLEN {
        32 => w.write_u32::<LittleEndian>(v.to_u64() as u32)?,
        _ => w.write_u64::<LittleEndian>(v.to_u64())?,
    }
    Ok(())
}

fn read_elem<T: Elem, R: Read>(r: &mut R) -> Result<T, CodecError> {
    let v = match T::BITLEN {
        32 => r.read_u32::<LittleEndian>()? as u64,
        _ => r.read_u64::<LittleEndian>()?,
    };
    Ok(T::from_u64(v))
}

impl<T: Elem> Matrix<T> {
    pub fn encode<W: Write>(&self, w: &mut W) -> Result<(), CodecError> {
        w.write_u64::<LittleEndian>(self.rows() as u64)?;
        w.write_u64::<LittleEndian>(self.cols() as u64)?;
        for &v in self.data() {
            write_elem(w, v)?;
        }
        Ok(())
    }

    pub fn decode<R: Read>(r: &mut R) -> Result<Self, CodecError> {
        let rows = r.read_u64::<LittleEndian>()?;
        let cols = r.read_u64::<LittleEndian>()?;
        let len = rows
            .checked_mul(cols)
            .and_then(|n| usize::try_from(n).ok())
            .ok_or(CodecError::ShapeMismatch { rows, cols })?;

        let mut data = Vec::with_capacity(len);
        for _ in 0..len {
            data.push(read_elem::<T, R>(r)?);
        }
        Ok(Self::from_raw(rows as usize, cols as usize, data))
    }

    /// Debug dump: `"{rows},{cols}\n{v0},{v1},...,"` with decimal values and
    /// no whitespace.
    pub fn write_ascii<W: Write>(&self, w: &mut W) -> Result<(), CodecError> {
        writeln!(w, "{},{}", self.rows(), self.cols())?;
        for &v in self.data() {
            write!(w, "{},", v.to_u64())?;
        }
        Ok(())
    }

    pub fn read_ascii<R: BufRead>(r: &mut R) -> Result<Self, CodecError> {
        let mut header = String::new();
        r.read_line(&mut header)?;
        let mut dims = header.trim_end_matches('\n').split(',');
        let rows: usize = dims
            .next()
            .and_then(|s| s.parse().ok())
            .ok_or(CodecError::MalformedAscii)?;
        let cols: usize = dims
            .next()
            .and_then(|s| s.parse().ok())
            .ok_or(CodecError::MalformedAscii)?;

        let mut body = String::new();
        r.read_to_string(&mut body)?;
        let mut data = Vec::with_capacity(rows * cols);
        for tok in body.split(',') {
            if tok.is_empty() {
                continue;
            }
            let v: u64 = tok.parse().map_err(|_| CodecError::MalformedAscii)?;
            data.push(T::from_u64(v));
        }
        if data.len() != rows * cols {
            return Err(CodecError::MalformedAscii);
        }
        Ok(Self::from_raw(rows, cols, data))
    }
}

impl<T: Elem> Query<T> {
    pub fn encode<W: Write>(&self, w: &mut W) -> Result<(), CodecError> {
        self.0.encode(w)
    }

    pub fn decode<R: Read>(r: &mut R) -> Result<Self, CodecError> {
        Ok(Self(Matrix::decode(r)?))
    }
}

impl<T: Elem> Answer<T> {
    pub fn encode<W: Write>(&self, w: &mut W) -> Result<(), CodecError> {
        self.0.encode(w)
    }

    pub fn decode<R: Read>(r: &mut R) -> Result<Self, CodecError> {
        Ok(Self(Matrix::decode(r)?))
    }
}

impl LweParams {
    pub fn encode<W: Write>(&self, w: &mut W) -> Result<(), CodecError> {
        w.write_u64::<LittleEndian>(self.n as u64)?;
        w.write_f64::<LittleEndian>(self.sigma)?;
        w.write_u64::<LittleEndian>(self.m as u64)?;
        w.write_u64::<LittleEndian>(self.logq)?;
        w.write_u64::<LittleEndian>(self.p)?;
        w.write_u64::<LittleEndian>(self.delta())?;
        Ok(())
    }

    pub fn decode<R: Read>(r: &mut R) -> Result<Self, CodecError> {
        let n = r.read_u64::<LittleEndian>()? as usize;
        let sigma = r.read_f64::<LittleEndian>()?;
        let m = r.read_u64::<LittleEndian>()? as usize;
        let logq = r.read_u64::<LittleEndian>()?;
        let p = r.read_u64::<LittleEndian>()?;
        let delta = r.read_u64::<LittleEndian>()?;

        if logq != 32 && logq != 64 {
            return Err(CodecError::UnknownLogq(logq));
        }
        let params = Self {
            n,
            sigma,
            m,
            logq,
            p,
        };
        if p == 0 || params.delta() != delta {
            return Err(CodecError::MalformedParams);
        }
        Ok(params)
    }
}

impl DbInfo {
    fn encode_fields<W: Write>(&self, w: &mut W) -> Result<(), CodecError> {
        for v in [
            self.num,
            self.row_length,
            self.packing,
            self.ne,
            self.l,
            self.m,
            self.squishing,
        ] {
            w.write_u64::<LittleEndian>(v as u64)?;
        }
        Ok(())
    }

    fn decode_fields<R: Read>(r: &mut R, params: LweParams) -> Result<Self, CodecError> {
        let mut vals = [0usize; 7];
        for v in &mut vals {
            *v = r.read_u64::<LittleEndian>()? as usize;
        }
        let [num, row_length, packing, ne, l, m, squishing] = vals;
        Ok(Self {
            num,
            row_length,
            packing,
            ne,
            l,
            m,
            squishing,
            params,
        })
    }
}

impl<T: Elem> Secret<T> {
    pub fn encode<W: Write>(&self, w: &mut W) -> Result<(), CodecError> {
        w.write_u64::<LittleEndian>(self.index() as u64)?;
        self.query.encode(w)?;
        self.secret.encode(w)?;
        self.interm.encode(w)
    }

    pub fn decode<R: Read>(r: &mut R) -> Result<Self, CodecError> {
        let index = r.read_u64::<LittleEndian>()? as usize;
        let query = Matrix::decode(r)?;
        let secret = Matrix::decode(r)?;
        let interm = Matrix::decode(r)?;
        Ok(Self::from_parts(query, secret, interm, index))
    }
}

impl<T: Elem> Server<T> {
    pub fn encode<W: Write>(&self, w: &mut W) -> Result<(), CodecError> {
        self.params().encode(w)?;
        w.write_all(&self.matrix_a_seed().0)?;
        self.db_info().encode_fields(w)?;
        self.db().data.encode(w)?;
        self.hint().encode(w)
    }

    pub fn decode<R: Read>(r: &mut R) -> Result<Self, CodecError> {
        let params = LweParams::decode(r)?;
        if params.logq != T::BITLEN {
            return Err(CodecError::ElemWidthMismatch {
                got: params.logq,
                want: T::BITLEN,
            });
        }

        let mut seed = [0u8; 16];
        r.read_exact(&mut seed)?;

        let info = DbInfo::decode_fields(r, params)?;
        let data = Matrix::decode(r)?;
        let hint = Matrix::decode(r)?;

        Ok(Self::from_parts(
            params,
            PrgKey(seed),
            Database { info, data },
            hint,
        ))
    }
}
