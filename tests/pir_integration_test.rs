//! End-to-end protocol tests: offline setup, query, answer, recover, at the
//! database scales the parameter tables are built for.

use simplepir::{BufPrg, Client, Database, Elem, PrgKey, Server};

fn run_pir<T: Elem>(
    client: &mut Client<T>,
    server: &Server<T>,
    db: &Database<T>,
    index: usize,
) {
    let mut secret = client.preprocess_query();
    let query = client.query(index, &mut secret);
    let answer = server.answer(&query);

    let val = client.recover(&secret, &answer);
    assert_eq!(val, db.get_elem(index), "reconstruct failed at {index}");
}

fn run_pir_many<T: Elem>(
    client: &mut Client<T>,
    server: &Server<T>,
    db: &Database<T>,
    index: usize,
) {
    let mut secret = client.preprocess_query();
    let query = client.query(index, &mut secret);
    let answer = server.answer(&query);

    let vals = client.recover_many(&secret, &answer);
    let col = index % db.info.m;
    assert_eq!(vals.len(), db.info.l / db.info.ne);
    for (band, &val) in vals.iter().enumerate() {
        let idx = band * db.info.m + col;
        if idx < db.info.num {
            assert_eq!(val, db.get_elem(idx), "reconstruct failed at {idx}");
        }
    }
}

fn test_pir<T: Elem>(key: [u8; 16], num: usize, row_length: usize, index: usize) {
    let mut src = BufPrg::new(&PrgKey(key));
    let db = Database::<T>::random(&mut src, T::BITLEN, num, row_length).unwrap();

    let server = Server::new_seeded(db.clone(), &PrgKey(key)).unwrap();
    let mut client =
        Client::new(server.hint(), server.matrix_a_seed(), server.db_info()).unwrap();

    run_pir(&mut client, &server, &db, index);
}

#[test]
fn test_pir_short_records_32() {
    test_pir::<u32>([0u8; 16], 1 << 20, 8, 262144);
}

#[test]
fn test_pir_short_records_many_32() {
    let mut src = BufPrg::new(&PrgKey([0u8; 16]));
    let db = Database::<u32>::random(&mut src, 32, 1 << 20, 8).unwrap();

    let server = Server::new_seeded(db.clone(), &PrgKey([0u8; 16])).unwrap();
    let mut client =
        Client::new(server.hint(), server.matrix_a_seed(), server.db_info()).unwrap();

    run_pir_many(&mut client, &server, &db, 262144);
}

#[test]
fn test_pir_long_records_32() {
    // 32-bit records span four Z_p residues each
    let mut src = BufPrg::new(&PrgKey([0u8; 16]));
    let db = Database::<u32>::random(&mut src, 32, 1 << 20, 32).unwrap();
    assert!(db.info.ne > 1);

    let server = Server::new_seeded(db.clone(), &PrgKey([0u8; 16])).unwrap();
    let mut client =
        Client::new(server.hint(), server.matrix_a_seed(), server.db_info()).unwrap();

    run_pir(&mut client, &server, &db, 1);
    run_pir_many(&mut client, &server, &db, 1);
}

#[test]
fn test_pir_six_bit_records_32() {
    test_pir::<u32>([0u8; 16], 1 << 20, 6, 999_999);
}

#[test]
fn test_pir_word_records_64() {
    // full 64-bit records: four 20-bit residues each
    let mut src = BufPrg::new(&PrgKey([1u8; 16]));
    let db = Database::<u64>::random(&mut src, 64, 1 << 14, 64).unwrap();
    assert_eq!(db.info.ne, 4);

    let server = Server::new_seeded(db.clone(), &PrgKey([1u8; 16])).unwrap();
    let mut client =
        Client::new(server.hint(), server.matrix_a_seed(), server.db_info()).unwrap();

    run_pir(&mut client, &server, &db, 4097);
    run_pir_many(&mut client, &server, &db, 4097);
}

#[test]
fn test_pir_medium_db_64() {
    test_pir::<u64>([1u8; 16], 1 << 16, 7, 12345);
}

#[test]
fn test_pir_big_db_64() {
    // 2^25 seven-bit records; two records pack into each 20-bit residue
    test_pir::<u64>([1u8; 16], 1 << 25, 7, 0);
}

#[test]
fn test_pir_repeated_queries() {
    let mut src = BufPrg::new(&PrgKey([9u8; 16]));
    let db = Database::<u32>::random(&mut src, 32, 1 << 14, 8).unwrap();

    let server = Server::new_seeded(db.clone(), &PrgKey([9u8; 16])).unwrap();
    let mut client =
        Client::new(server.hint(), server.matrix_a_seed(), server.db_info()).unwrap();

    for index in [0usize, 1, 77, 4095, (1 << 14) - 1] {
        run_pir(&mut client, &server, &db, index);
    }
}

#[test]
fn test_pir_deterministic_setup_and_answer() {
    let mut src = BufPrg::new(&PrgKey([5u8; 16]));
    let db = Database::<u32>::random(&mut src, 32, 1 << 12, 8).unwrap();
    let seed = PrgKey([6u8; 16]);

    let s1 = Server::new_seeded(db.clone(), &seed).unwrap();
    let s2 = Server::new_seeded(db, &seed).unwrap();
    assert_eq!(s1.hint(), s2.hint());

    let mut client = Client::new(s1.hint(), s1.matrix_a_seed(), s1.db_info()).unwrap();
    let mut secret = client.preprocess_query();
    let query = client.query(3, &mut secret);
    assert_eq!(s1.answer(&query), s2.answer(&query));
}

#[test]
fn test_pir_explicit_records() {
    // non-random records: value i+1 at index i survives the full protocol
    let num = 1 << 12;
    let vals: Vec<u64> = (0..num as u64).map(|i| (i + 1) & 0xff).collect();
    let db = Database::<u32>::new(32, num, 8, &vals).unwrap();

    let server = Server::new_seeded(db.clone(), &PrgKey([11u8; 16])).unwrap();
    let mut client =
        Client::new(server.hint(), server.matrix_a_seed(), server.db_info()).unwrap();

    for index in [0usize, 255, 256, num - 1] {
        let mut secret = client.preprocess_query();
        let query = client.query(index, &mut secret);
        let answer = server.answer(&query);
        assert_eq!(client.recover(&secret, &answer), vals[index]);
        assert_eq!(server.get(index), vals[index]);
    }
}
