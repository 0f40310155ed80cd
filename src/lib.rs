//! Single-server private information retrieval from LWE.
//!
//! A server holds a public database; a client retrieves a record (or, in the
//! linearly-homomorphic flavor, an inner product against the whole database)
//! without the server learning which one. The database is packed into an
//! `L x M` matrix of `Z_p` residues; the server's entire online work is one
//! matrix-vector product over that matrix.
//!
//! ```text
//! Server::new(db, seed)  ──►  hint = DB * A          (offline, once)
//! Client::new(hint, seed, dbinfo)
//!   preprocess_query()   ──►  Secret { s, A*s + e, hint*s }
//!   query(i, secret)     ──►  Query  (mask + Δ at the record's column)
//!   Server::answer(q)    ──►  Answer (= DB * query)
//!   recover(secret, ans) ──►  DB[i]
//! ```
//!
//! Both 32- and 64-bit ciphertext moduli are supported; every protocol type
//! is generic over the [`Elem`] width.

pub mod arith;
pub mod client;
pub mod codec;
pub mod database;
pub mod elem;
pub mod error;
pub mod lhe;
pub mod matrix;
pub mod params;
pub mod rng;
pub mod server;

pub use client::{Answer, Client, Query, Secret};
pub use codec::CodecError;
pub use database::{Database, DbInfo};
pub use elem::Elem;
pub use error::PirError;
pub use lhe::SecretLhe;
pub use matrix::{Matrix, SeededMatrix};
pub use params::LweParams;
pub use rng::{BufPrg, PrgKey, PrgStream};
pub use server::Server;
