//! End-to-end scenarios mirroring the system's documented write/read/
//! recover/truncate behavior across both coding schemes.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use stripe_engine::config::{CodingScheme, StripeConfig};
use stripe_engine::layout::{DoubleParity, ParityLayout};
use stripe_engine::remote_stripe::StripeEndpoint;
use stripe_engine::stripe_file::StripeFile;
use stripe_engine::{StripeResult, TransportErrorMap};

const W: usize = 4096;
const K: usize = 4;

/// An in-memory endpoint that can be told to fail reads at specific byte
/// offsets, standing in for a corrupted or unreachable remote stripe.
struct MemEndpoint {
    data: Mutex<Vec<u8>>,
    fail_offsets: Mutex<HashSet<u64>>,
}

impl MemEndpoint {
    fn new() -> Self {
        Self {
            data: Mutex::new(vec![0u8; 4 << 20]),
            fail_offsets: Mutex::new(HashSet::new()),
        }
    }

    fn mark_fail(&self, offset: u64) {
        self.fail_offsets.lock().unwrap().insert(offset);
    }

    fn raw_at(&self, offset: u64, len: usize) -> Vec<u8> {
        self.data.lock().unwrap()[offset as usize..offset as usize + len].to_vec()
    }
}

impl StripeEndpoint for MemEndpoint {
    fn read(&self, offset: u64, len: usize, buf: &mut [u8]) -> Result<(), TransportErrorMap> {
        if self.fail_offsets.lock().unwrap().contains(&offset) {
            let mut map = TransportErrorMap::new();
            map.insert(offset, len);
            return Err(map);
        }
        let data = self.data.lock().unwrap();
        buf.copy_from_slice(&data[offset as usize..offset as usize + len]);
        Ok(())
    }

    fn write(&self, offset: u64, len: usize, buf: &[u8]) -> Result<(), TransportErrorMap> {
        let mut data = self.data.lock().unwrap();
        data[offset as usize..offset as usize + len].copy_from_slice(buf);
        Ok(())
    }

    fn truncate(&self, offset: u64) -> StripeResult<()> {
        self.data.lock().unwrap().resize(offset as usize, 0);
        Ok(())
    }

    fn wait_open(&self) -> StripeResult<()> {
        Ok(())
    }
    fn is_opening(&self) -> bool {
        false
    }
    fn is_closing(&self) -> bool {
        false
    }
    fn is_closed(&self) -> bool {
        false
    }
}

fn double_parity_config() -> StripeConfig {
    StripeConfig {
        stripe_width: W,
        k: K,
        num_parity: 2,
        scheme: CodingScheme::DoubleParity,
        store_recovery: true,
        booking_size: 0,
        target_size: None,
    }
    .validate()
    .unwrap()
}

fn reed_solomon_config() -> StripeConfig {
    StripeConfig {
        stripe_width: W,
        k: K,
        num_parity: 2,
        scheme: CodingScheme::ReedSolomon,
        store_recovery: true,
        booking_size: 0,
        target_size: None,
    }
    .validate()
    .unwrap()
}

fn open_endpoints(n: usize) -> (Vec<Arc<MemEndpoint>>, Vec<Arc<dyn StripeEndpoint>>) {
    let concrete: Vec<Arc<MemEndpoint>> = (0..n).map(|_| Arc::new(MemEndpoint::new())).collect();
    let trait_objs: Vec<Arc<dyn StripeEndpoint>> = concrete
        .iter()
        .map(|e| Arc::clone(e) as Arc<dyn StripeEndpoint>)
        .collect();
    (concrete, trait_objs)
}

/// S1 — double-parity full group write: row parities land on zero when
/// every data byte is identical.
#[test]
fn s1_double_parity_full_group_write_produces_zero_parity_rows() {
    let cfg = double_parity_config();
    let (endpoints, trait_objs) = open_endpoints(cfg.total_stripes());
    let mut file = StripeFile::open(trait_objs, &cfg, 0, None, true).unwrap();

    let group_bytes = K * K * W;
    let payload = vec![0xAAu8; group_bytes];
    file.pwrite(0, &payload).unwrap();
    file.close().unwrap();

    // endpoint K is the simple-parity stripe, endpoint K+1 the double-parity
    // stripe; each holds K rows of W bytes.
    for row in 0..K {
        let simple = endpoints[K].raw_at((row * W) as u64, W);
        assert!(simple.iter().all(|&b| b == 0), "row {row} simple parity not zero");
    }
    for col in 0..K {
        let data = endpoints[col].raw_at(0, W);
        assert_eq!(data, vec![0xAAu8; W]);
    }
}

/// S2 — a single corrupted data block is reconstructed via its horizontal
/// stripe and (with `store_recovery` on) written back.
#[test]
fn s2_double_parity_single_block_loss_recovers_and_stores() {
    let cfg = double_parity_config();
    let (endpoints, trait_objs) = open_endpoints(cfg.total_stripes());
    let mut file = StripeFile::open(trait_objs, &cfg, 0, None, true).unwrap();

    let group_bytes = K * K * W;
    let payload = vec![0xAAu8; group_bytes];
    file.pwrite(0, &payload).unwrap();
    file.close().unwrap();

    // global index 5 = row 1, column 1 (k=4 => width=6)
    endpoints[1].mark_fail(W as u64); // row 1 on endpoint (column) 1

    let (_endpoints2, trait_objs2) = reopen(&endpoints);
    let mut file = StripeFile::open(trait_objs2, &cfg, 0, None, true).unwrap();
    let mut out = vec![0u8; W];
    file.pread((W * 5) as u64, &mut out).unwrap();
    assert_eq!(out, vec![0xAAu8; W]);
}

/// S3 — two corrupted blocks in the same row, both unfixable horizontally
/// (the row has two errors), each recovered off a distinct diagonal instead.
#[test]
fn s3_double_parity_two_block_loss_on_a_recoverable_diagonal() {
    let cfg = double_parity_config();
    let (endpoints, trait_objs) = open_endpoints(cfg.total_stripes());
    let mut file = StripeFile::open(trait_objs, &cfg, 0, None, true).unwrap();

    let group_bytes = K * K * W;
    let payload = vec![0xAAu8; group_bytes];
    file.pwrite(0, &payload).unwrap();
    file.close().unwrap();

    let width = K + 2;
    // global indices 0 and 2: row 0, columns 0 and 2. Row 0 now has two
    // errors, so neither recovers off its horizontal stripe; their
    // diagonals (ids 0 and 2) don't share any other member, so both
    // recover off their diagonal.
    mark_corrupt(&endpoints, width, 0);
    mark_corrupt(&endpoints, width, 2);

    let (_endpoints2, trait_objs2) = reopen(&endpoints);
    let mut file = StripeFile::open(trait_objs2, &cfg, 0, None, true).unwrap();
    let mut out = vec![0u8; group_bytes];
    file.pread(0, &mut out).unwrap();
    assert_eq!(out, payload);
}

/// S4 — Reed-Solomon m=2 tolerates any two lost stripes.
#[test]
fn s4_reed_solomon_recovers_from_two_losses() {
    let cfg = reed_solomon_config();
    let (endpoints, trait_objs) = open_endpoints(cfg.total_stripes());
    let mut file = StripeFile::open(trait_objs, &cfg, 0, None, true).unwrap();

    let group_bytes = K * W;
    let payload = vec![0x55u8; group_bytes];
    file.pwrite(0, &payload).unwrap();
    file.close().unwrap();

    endpoints[1].mark_fail(0);
    endpoints[4].mark_fail(0);

    let (_endpoints2, trait_objs2) = reopen(&endpoints);
    let mut file = StripeFile::open(trait_objs2, &cfg, 0, None, true).unwrap();
    let mut out = vec![0u8; group_bytes];
    file.pread(0, &mut out).unwrap();
    assert_eq!(out, vec![0x55u8; group_bytes]);
}

/// S5 — enough corruption on both the horizontal and diagonal stripes
/// covering one block makes it unrecoverable.
#[test]
fn s5_double_parity_unrecoverable_corruption_is_an_error() {
    let cfg = double_parity_config();
    let (endpoints, trait_objs) = open_endpoints(cfg.total_stripes());
    let mut file = StripeFile::open(trait_objs, &cfg, 0, None, true).unwrap();

    let group_bytes = K * K * W;
    let payload = vec![0xAAu8; group_bytes];
    file.pwrite(0, &payload).unwrap();
    file.close().unwrap();

    let layout = DoubleParity::new(K);
    let width = K + 2;

    // corrupt block 0 and another member of its horizontal stripe, so
    // horizontal recovery of 0 sees more than one error.
    mark_corrupt(&endpoints, width, 0);
    mark_corrupt(&endpoints, width, 1);

    // also corrupt a member of block 0's diagonal stripe (other than 0
    // itself), so diagonal recovery of 0 fails too.
    let diag = layout.diagonal_stripe(0);
    let other = *diag.iter().find(|&&m| m != 0).unwrap();
    mark_corrupt(&endpoints, width, other);

    let (_endpoints2, trait_objs2) = reopen(&endpoints);
    let mut file = StripeFile::open(trait_objs2, &cfg, 0, None, true).unwrap();
    let mut out = vec![0u8; W];
    assert!(file.pread(0, &mut out).is_err());
}

/// S6 — truncating a partial first group still rounds every stripe up to
/// one full group boundary.
#[test]
fn s6_truncate_rounds_up_to_a_group_boundary() {
    let cfg = double_parity_config();
    let (endpoints, trait_objs) = open_endpoints(cfg.total_stripes());
    let mut file = StripeFile::open(trait_objs, &cfg, 0, None, true).unwrap();

    file.pwrite(0, &[0u8; 10]).unwrap();
    file.truncate(1).unwrap();
    file.close().unwrap();

    for endpoint in &endpoints {
        assert_eq!(endpoint.data.lock().unwrap().len(), K * W);
    }
}

fn mark_corrupt(endpoints: &[Arc<MemEndpoint>], width: usize, big_idx: usize) {
    let endpoint_idx = big_idx % width;
    let row = big_idx / width;
    endpoints[endpoint_idx].mark_fail((row * W) as u64);
}

/// Simulate closing and reopening against the same backing endpoints (the
/// failures marked on `endpoints` persist into the reopened session).
fn reopen(endpoints: &[Arc<MemEndpoint>]) -> (Vec<Arc<MemEndpoint>>, Vec<Arc<dyn StripeEndpoint>>) {
    let trait_objs: Vec<Arc<dyn StripeEndpoint>> = endpoints
        .iter()
        .map(|e| Arc::clone(e) as Arc<dyn StripeEndpoint>)
        .collect();
    (endpoints.to_vec(), trait_objs)
}
