//! The parity-group state machine: streaming write, parity computation,
//! and read-with-recovery.
//!
//! Grounded throughout on `original_source/fst/io/RaidDpFile.cc`
//! (`AddDataBlock`, `ComputeParity`, `WriteParityToFiles`,
//! `DoubleParityRecover`, `truncate`) and `ReedSFile.cc` (the same
//! operations for the Reed-Solomon scheme).

use std::sync::{Arc, Mutex};

use log::{debug, warn};

use crate::checksum_map::BlockChecksumMap;
use crate::erasure_code::{xor_into, Block, RsCodec};
use crate::layout::{DoubleParity, ParityLayout, ReedSolomon};
use crate::remote_stripe::RemoteStripe;
use crate::stripe_buffer::StripeBuffer;
use crate::{StripeError, StripeResult};

enum Scheme {
    DoubleParity(DoubleParity),
    ReedSolomon { layout: ReedSolomon, codec: RsCodec },
}

/// Drives one open stripe file's parity group: accumulates data, computes
/// and dispatches parity, and recovers corrupted blocks on read.
pub struct GroupEngine {
    scheme: Scheme,
    remotes: Vec<RemoteStripe>,
    checksum_maps: Vec<Option<Arc<BlockChecksumMap>>>,
    buffer: StripeBuffer,
    width: usize,
    header: u64,
    store_recovery: bool,
    /// `None` until the first byte is written; see `original_source`'s
    /// `mOffGroupParity`.
    group_offset_parity: Option<u64>,
}

impl GroupEngine {
    fn new(
        scheme: Scheme,
        remotes: Vec<RemoteStripe>,
        checksum_maps: Vec<Option<Arc<BlockChecksumMap>>>,
        width: usize,
        header: u64,
        store_recovery: bool,
    ) -> StripeResult<Self> {
        let group_block_count = match &scheme {
            Scheme::DoubleParity(l) => l.group_block_count(),
            Scheme::ReedSolomon { layout, .. } => layout.group_block_count(),
        };
        if remotes.len() != checksum_maps.len() {
            return Err(StripeError::invalid_arg(
                "remotes and checksum_maps must have the same length",
            ));
        }
        Ok(Self {
            scheme,
            remotes,
            checksum_maps,
            buffer: StripeBuffer::new(group_block_count, width),
            width,
            header,
            store_recovery,
            group_offset_parity: None,
        })
    }

    pub fn double_parity(
        k: usize,
        remotes: Vec<RemoteStripe>,
        checksum_maps: Vec<Option<Arc<BlockChecksumMap>>>,
        width: usize,
        header: u64,
        store_recovery: bool,
    ) -> StripeResult<Self> {
        if remotes.len() != k + 2 {
            return Err(StripeError::invalid_arg(format!(
                "double-parity layout needs {} endpoints, got {}",
                k + 2,
                remotes.len()
            )));
        }
        Self::new(
            Scheme::DoubleParity(DoubleParity::new(k)),
            remotes,
            checksum_maps,
            width,
            header,
            store_recovery,
        )
    }

    pub fn reed_solomon(
        k: usize,
        m: usize,
        remotes: Vec<RemoteStripe>,
        checksum_maps: Vec<Option<Arc<BlockChecksumMap>>>,
        width: usize,
        header: u64,
        store_recovery: bool,
    ) -> StripeResult<Self> {
        if remotes.len() != k + m {
            return Err(StripeError::invalid_arg(format!(
                "reed-solomon layout needs {} endpoints, got {}",
                k + m,
                remotes.len()
            )));
        }
        Self::new(
            Scheme::ReedSolomon {
                layout: ReedSolomon::new(k, m),
                codec: RsCodec::new(k, m),
            },
            remotes,
            checksum_maps,
            width,
            header,
            store_recovery,
        )
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn n(&self) -> usize {
        self.remotes.len()
    }

    /// Start offset of the group currently accumulating, if any data has
    /// been written yet.
    pub(crate) fn group_offset_parity(&self) -> Option<u64> {
        self.group_offset_parity
    }

    fn k(&self) -> usize {
        match &self.scheme {
            Scheme::DoubleParity(l) => l.k(),
            Scheme::ReedSolomon { layout, .. } => layout.k(),
        }
    }

    /// Bytes of logical (data-only) content per group.
    pub fn group_data_bytes(&self) -> usize {
        match &self.scheme {
            Scheme::DoubleParity(l) => l.k() * l.k() * self.width,
            Scheme::ReedSolomon { layout, .. } => layout.k() * self.width,
        }
    }

    fn rows_per_group(&self) -> usize {
        match &self.scheme {
            Scheme::DoubleParity(l) => l.k(),
            Scheme::ReedSolomon { .. } => 1,
        }
    }

    fn small_to_big(&self, i: usize) -> usize {
        match &self.scheme {
            Scheme::DoubleParity(l) => l.small_to_big(i),
            Scheme::ReedSolomon { layout, .. } => layout.small_to_big(i),
        }
    }

    /// `(endpoint index, row within the group at that endpoint)` for a flat
    /// group-local block index.
    fn endpoint_and_row(&self, big_idx: usize) -> (usize, usize) {
        match &self.scheme {
            Scheme::DoubleParity(l) => {
                let width = l.k() + 2;
                (big_idx % width, big_idx / width)
            }
            Scheme::ReedSolomon { .. } => (big_idx, 0),
        }
    }

    /// Byte offset within one endpoint's stripe file, per spec §6.
    fn local_offset(&self, group_index: u64, row: usize) -> u64 {
        group_index * self.rows_per_group() as u64 * self.width as u64
            + row as u64 * self.width as u64
            + self.header
    }

    /// Streaming write entry point. `offset` must continue the file's write
    /// cursor; enforced by the caller (`StripeFile::pwrite`).
    pub fn add_data(&mut self, offset: u64, mut data: &[u8]) -> StripeResult<()> {
        let group_bytes = self.group_data_bytes() as u64;
        if self.group_offset_parity.is_none() && offset < group_bytes {
            self.group_offset_parity = Some(0);
        }

        let mut cursor = offset;
        while !data.is_empty() {
            if cursor % group_bytes == 0 {
                self.buffer.clear();
            }
            let group_index = cursor / group_bytes;
            let offset_in_group = cursor % group_bytes;
            let small_idx = (offset_in_group / self.width as u64) as usize;
            let col_off = (offset_in_group % self.width as u64) as usize;
            let big_idx = self.small_to_big(small_idx);

            let take = (self.width - col_off).min(data.len());
            self.buffer.block_mut(big_idx).as_mut()[col_off..col_off + take]
                .copy_from_slice(&data[..take]);

            if col_off + take == self.width {
                self.dispatch_data_write(group_index, big_idx);
            }

            data = &data[take..];
            cursor += take as u64;

            if cursor % group_bytes == 0 {
                let group_offset = cursor - group_bytes;
                self.compute_parity();
                self.write_parity(group_offset)?;
                self.group_offset_parity = Some(cursor);
                self.buffer.clear();
            }
        }
        Ok(())
    }

    fn dispatch_data_write(&mut self, group_index: u64, big_idx: usize) {
        let (endpoint_idx, row) = self.endpoint_and_row(big_idx);
        let local_offset = self.local_offset(group_index, row);
        let block = Arc::new(self.buffer.block(big_idx).clone());
        if let Some(map) = &self.checksum_maps[endpoint_idx] {
            map.add(local_offset, &block);
        }
        self.remotes[endpoint_idx].write_async(local_offset, self.width, block, 0);
    }

    pub(crate) fn compute_parity(&mut self) {
        let width = self.width;
        match &self.scheme {
            Scheme::DoubleParity(layout) => {
                let k = layout.k();
                let mut targets: Vec<(usize, Vec<usize>)> = (0..k)
                    .map(|r| {
                        let target = r * (k + 2) + k;
                        let sources = (0..k).map(|c| r * (k + 2) + c).collect();
                        (target, sources)
                    })
                    .collect();
                for dp_idx in layout.double_parity_indices() {
                    let mut members = layout.diagonal_stripe(dp_idx);
                    members.retain(|&m| m != dp_idx);
                    targets.push((dp_idx, members));
                }
                for (target, sources) in targets {
                    xor_rows_into_buffer(&mut self.buffer, width, target, &sources);
                }
            }
            Scheme::ReedSolomon { layout, codec } => {
                let k = layout.k();
                let m = codec.m();
                let (data, parity) = self.buffer.blocks_mut().split_at_mut(k);
                codec.encode(data, &mut parity[..m], width);
            }
        }
    }

    pub(crate) fn write_parity(&mut self, group_offset: u64) -> StripeResult<()> {
        let group_index = group_offset / self.group_data_bytes() as u64;
        let parity_indices: Vec<usize> = match &self.scheme {
            Scheme::DoubleParity(layout) => {
                let mut v = layout.simple_parity_indices();
                v.extend(layout.double_parity_indices());
                v
            }
            Scheme::ReedSolomon { layout, .. } => layout.simple_parity_indices(),
        };
        for idx in parity_indices {
            let (endpoint_idx, row) = self.endpoint_and_row(idx);
            let local_offset = self.local_offset(group_index, row);
            let block = Arc::new(self.buffer.block(idx).clone());
            if let Some(map) = &self.checksum_maps[endpoint_idx] {
                map.add(local_offset, &block);
            }
            self.remotes[endpoint_idx].write_async(local_offset, self.width, block, 0);
        }
        self.join_writes()
    }

    fn join_writes(&self) -> StripeResult<()> {
        let mut first_err = None;
        for remote in &self.remotes {
            let res = remote.write_handler().wait_ok();
            remote.write_handler().reset();
            if let Err(e) = res {
                warn!("group write failed on an endpoint: {e}");
                if first_err.is_none() {
                    first_err = Some(e);
                }
            }
        }
        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Read `buf.len()` bytes starting at `offset`, transparently recovering
    /// any corrupted block along the way.
    pub fn pread(&mut self, offset: u64, buf: &mut [u8]) -> StripeResult<()> {
        let group_bytes = self.group_data_bytes() as u64;
        let mut delivered = 0usize;
        while delivered < buf.len() {
            let cursor = offset + delivered as u64;
            let group_index = cursor / group_bytes;
            let offset_in_group = cursor % group_bytes;
            let small_idx = (offset_in_group / self.width as u64) as usize;
            let col_off = (offset_in_group % self.width as u64) as usize;
            let big_idx = self.small_to_big(small_idx);
            let take = (self.width - col_off).min(buf.len() - delivered);

            let block = self.read_data_block(group_index, big_idx)?;
            buf[delivered..delivered + take].copy_from_slice(&block.as_ref()[col_off..col_off + take]);
            delivered += take;
        }
        Ok(())
    }

    fn read_data_block(&mut self, group_index: u64, big_idx: usize) -> StripeResult<Block> {
        let (block, valid) = self.read_and_validate(group_index, big_idx)?;
        if valid {
            Ok(block)
        } else {
            debug!("block {big_idx} of group {group_index} failed validation, recovering");
            self.recover_block(group_index, big_idx)
        }
    }

    /// Read one block and report whether it passed both transport and
    /// checksum validation.
    fn read_and_validate(&mut self, group_index: u64, big_idx: usize) -> StripeResult<(Block, bool)> {
        let (endpoint_idx, row) = self.endpoint_and_row(big_idx);
        let local_offset = self.local_offset(group_index, row);
        let dst = Arc::new(Mutex::new(Block::zero(self.width)));
        self.remotes[endpoint_idx].read_async(local_offset, self.width, Arc::clone(&dst), 0);
        let transport_result = self.remotes[endpoint_idx].read_handler().wait_ok();
        self.remotes[endpoint_idx].read_handler().reset();

        let block = Arc::try_unwrap(dst)
            .unwrap_or_else(|arc| Mutex::new((*arc.lock().unwrap()).clone()))
            .into_inner()
            .unwrap();

        let transport_ok = transport_result.is_ok();
        let checksum_ok = match &self.checksum_maps[endpoint_idx] {
            Some(map) => map.check(local_offset, block.as_ref()),
            None => true,
        };
        Ok((block, transport_ok && checksum_ok))
    }

    fn recover_block(&mut self, group_index: u64, target_idx: usize) -> StripeResult<Block> {
        match &self.scheme {
            Scheme::DoubleParity(_) => self.recover_double_parity(group_index, target_idx),
            Scheme::ReedSolomon { .. } => self.recover_reed_solomon(group_index, target_idx),
        }
    }

    fn recover_double_parity(&mut self, group_index: u64, target_idx: usize) -> StripeResult<Block> {
        let (horiz, diag) = match &self.scheme {
            Scheme::DoubleParity(layout) => (
                layout.horizontal_stripe(target_idx),
                layout.diagonal_stripe(target_idx),
            ),
            Scheme::ReedSolomon { .. } => unreachable!(),
        };

        if !horiz.is_empty() {
            if let Some(block) = self.try_recover_from(group_index, target_idx, &horiz)? {
                return Ok(block);
            }
        }
        if !diag.is_empty() {
            if let Some(block) = self.try_recover_from(group_index, target_idx, &diag)? {
                return Ok(block);
            }
        }
        Err(StripeError::corruption(format!(
            "block {target_idx} in group {group_index} has more than one corrupt member on every covering stripe"
        )))
    }

    /// Attempt to reconstruct `target_idx` as the XOR of the other members
    /// of `stripe`. Returns `Ok(None)` if more than one other member also
    /// fails validation (stripe not usable for recovery).
    fn try_recover_from(
        &mut self,
        group_index: u64,
        target_idx: usize,
        stripe: &[usize],
    ) -> StripeResult<Option<Block>> {
        let mut acc = vec![0u8; self.width];
        for &idx in stripe {
            if idx == target_idx {
                continue;
            }
            let (block, valid) = self.read_and_validate(group_index, idx)?;
            if !valid {
                return Ok(None);
            }
            xor_into(&mut acc, block.as_ref());
        }
        let recovered = Block::from(bytes::BytesMut::from(&acc[..]));
        if self.store_recovery {
            self.write_back(group_index, target_idx, &recovered)?;
        }
        Ok(Some(recovered))
    }

    fn recover_reed_solomon(&mut self, group_index: u64, target_idx: usize) -> StripeResult<Block> {
        let (k, total) = match &self.scheme {
            Scheme::ReedSolomon { layout, codec } => (layout.k(), layout.k() + codec.m()),
            Scheme::DoubleParity(_) => unreachable!(),
        };

        let mut present: Vec<(usize, Block)> = Vec::new();
        for idx in 0..total {
            if idx == target_idx {
                continue;
            }
            let (block, valid) = self.read_and_validate(group_index, idx)?;
            if valid {
                present.push((idx, block));
                if present.len() >= k {
                    break;
                }
            }
        }
        if present.len() < k {
            return Err(StripeError::corruption(format!(
                "cannot recover block {target_idx}: only {} of {k} required siblings are valid",
                present.len()
            )));
        }

        let width = self.width;
        let recovered = {
            let codec = match &self.scheme {
                Scheme::ReedSolomon { codec, .. } => codec,
                Scheme::DoubleParity(_) => unreachable!(),
            };
            let present_refs: Vec<(usize, &Block)> = present.iter().map(|(i, b)| (*i, b)).collect();
            codec.decode(&present_refs, &[target_idx], width)?
        };
        let block = recovered.into_iter().next().expect("decode returns one block per absent index");

        if self.store_recovery {
            self.write_back(group_index, target_idx, &block)?;
        }
        Ok(block)
    }

    fn write_back(&mut self, group_index: u64, big_idx: usize, block: &Block) -> StripeResult<()> {
        let (endpoint_idx, row) = self.endpoint_and_row(big_idx);
        let local_offset = self.local_offset(group_index, row);
        if let Some(map) = &self.checksum_maps[endpoint_idx] {
            map.add(local_offset, block.as_ref());
        }
        self.remotes[endpoint_idx].write_async(local_offset, self.width, Arc::new(block.clone()), 0);
        let res = self.remotes[endpoint_idx].write_handler().wait_ok();
        self.remotes[endpoint_idx].write_handler().reset();
        res
    }

    /// Number of physical block-rows written per endpoint once the file
    /// reaches `logical_size` bytes of logical content.
    pub(crate) fn physical_rows(&self, logical_size: u64) -> u64 {
        if logical_size == 0 {
            return 0;
        }
        let group_bytes = self.group_data_bytes() as u64;
        let groups = logical_size.div_ceil(group_bytes);
        groups * self.rows_per_group() as u64
    }

    /// Read one physical block directly from `endpoint_idx`, bypassing
    /// validation and recovery. Used to fill checksum-map holes at close
    /// with the block's real content.
    pub(crate) fn read_raw_block(&self, endpoint_idx: usize, block_idx: u64) -> StripeResult<Vec<u8>> {
        let rows_per_group = self.rows_per_group() as u64;
        let group_index = block_idx / rows_per_group;
        let row = (block_idx % rows_per_group) as usize;
        let local_offset = self.local_offset(group_index, row);

        let dst = Arc::new(Mutex::new(Block::zero(self.width)));
        self.remotes[endpoint_idx].read_async(local_offset, self.width, Arc::clone(&dst), 0);
        self.remotes[endpoint_idx].read_handler().wait_ok()?;
        self.remotes[endpoint_idx].read_handler().reset();

        let block = Arc::try_unwrap(dst)
            .unwrap_or_else(|arc| Mutex::new((*arc.lock().unwrap()).clone()))
            .into_inner()
            .unwrap();
        Ok(block.as_ref().to_vec())
    }

    /// Round up to a group boundary and truncate every endpoint.
    pub fn truncate(&mut self, byte_offset: u64) -> StripeResult<()> {
        let group_bytes = self.group_data_bytes() as u64;
        let group_count = byte_offset.div_ceil(group_bytes);
        let truncate_local =
            group_count * self.rows_per_group() as u64 * self.width as u64 + self.header;
        for remote in &self.remotes {
            remote.truncate(truncate_local)?;
        }
        Ok(())
    }
}

fn xor_rows_into_buffer(buffer: &mut StripeBuffer, width: usize, target: usize, sources: &[usize]) {
    let mut acc = vec![0u8; width];
    for &idx in sources {
        xor_into(&mut acc, buffer.block(idx).as_ref());
    }
    buffer.block_mut(target).as_mut().copy_from_slice(&acc);
}
