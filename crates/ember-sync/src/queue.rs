//! Header/body reassembly queue.
//!
//! Tracks headers learned from peers, attaches bodies as they arrive, and
//! emits blocks in chain order starting right above the last block handed to
//! the import pipeline.

use crate::HeaderWrapper;
use ember_core::{Block, BlockHeader, H256};
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, trace};

/// A header range to fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeadersRequest {
    /// First height to request.
    pub start: u64,
    /// Number of headers to request.
    pub count: u32,
    /// Whether the peer should walk backwards from `start`.
    pub reverse: bool,
}

/// A set of headers whose bodies should be fetched.
#[derive(Debug, Clone, Default)]
pub struct BlocksRequest {
    /// Headers ordered by ascending height.
    pub headers: Vec<BlockHeader>,
}

impl BlocksRequest {
    /// Partition into chunks for fan-out across peers.
    pub fn split(self, chunk: usize) -> Vec<BlocksRequest> {
        let chunk = chunk.max(1);
        self.headers
            .chunks(chunk)
            .map(|headers| BlocksRequest {
                headers: headers.to_vec(),
            })
            .collect()
    }

    /// Number of headers in the request.
    pub fn len(&self) -> usize {
        self.headers.len()
    }

    /// Whether the request is empty.
    pub fn is_empty(&self) -> bool {
        self.headers.is_empty()
    }
}

/// Reassembly queue between peer responses and the import pipeline.
///
/// The anchor is the last block emitted for import; everything the queue
/// emits is parent-linked and contiguous from it. Heights at or below the
/// anchor are never retained, so a re-delivered body cannot cause a second
/// emission. A height may transiently hold competing header candidates from
/// different peers; assembly picks the candidate descending from the emitted
/// chain and discards the rest once the height is resolved.
pub struct SyncQueue {
    anchor_number: u64,
    anchor_hash: H256,
    headers: BTreeMap<u64, Vec<HeaderWrapper>>,
    bodies: HashMap<H256, Block>,
    request_window: u64,
}

impl SyncQueue {
    /// Create a queue anchored at the current chain head.
    pub fn new(head: &BlockHeader, request_window: u64) -> Self {
        Self {
            anchor_number: head.number,
            anchor_hash: head.hash(),
            headers: BTreeMap::new(),
            bodies: HashMap::new(),
            request_window: request_window.max(1),
        }
    }

    /// Headers known to the queue but not yet assembled.
    pub fn headers_count(&self) -> usize {
        self.headers.values().map(Vec::len).sum()
    }

    /// Bodies waiting for assembly.
    pub fn bodies_count(&self) -> usize {
        self.bodies.len()
    }

    /// Height and hash of the last block emitted for import.
    pub fn anchor(&self) -> (u64, H256) {
        (self.anchor_number, self.anchor_hash)
    }

    /// Insert headers, ignoring stale heights and exact duplicates.
    ///
    /// No validation happens here; callers admit only headers that already
    /// passed the header validator.
    pub fn add_headers(&mut self, wrappers: Vec<HeaderWrapper>) {
        for wrapper in wrappers {
            let number = wrapper.number();
            if number <= self.anchor_number {
                trace!(number, anchor = self.anchor_number, "Ignoring stale header");
                continue;
            }
            let hash = wrapper.hash();
            let slot = self.headers.entry(number).or_default();
            if slot.iter().any(|candidate| candidate.hash() == hash) {
                continue;
            }
            slot.push(wrapper);
        }
    }

    /// Attach bodies and return the newly contiguous blocks, ascending.
    ///
    /// A body without a matching known header is discarded; a body for an
    /// already-emitted height is ignored.
    pub fn add_blocks(&mut self, blocks: Vec<Block>) -> Vec<Block> {
        for block in blocks {
            if block.number() <= self.anchor_number {
                trace!(number = block.number(), "Ignoring body below the anchor");
                continue;
            }
            let hash = block.hash();
            if !self.has_header(block.number(), hash) {
                debug!(
                    number = block.number(),
                    hash = %hash,
                    "Discarding body without a matching header"
                );
                continue;
            }
            self.bodies.insert(hash, block);
        }
        self.assemble()
    }

    /// Next header range to fetch: the lowest uncovered run above the
    /// anchor, capped by the request window. Heights are never skipped; a
    /// gap wider than the window is covered by successive requests.
    pub fn request_headers(&self) -> HeadersRequest {
        let mut start = self.anchor_number + 1;
        while self.headers.contains_key(&start) {
            start += 1;
        }
        let mut count = 0u64;
        while count < self.request_window && !self.headers.contains_key(&(start + count)) {
            count += 1;
        }
        HeadersRequest {
            start,
            count: count as u32,
            reverse: false,
        }
    }

    /// Up to `max` known headers whose bodies are missing, ascending.
    pub fn request_blocks(&self, max: usize) -> BlocksRequest {
        let mut headers = Vec::new();
        'outer: for slot in self.headers.values() {
            for candidate in slot {
                if headers.len() >= max {
                    break 'outer;
                }
                if !self.bodies.contains_key(&candidate.hash()) {
                    headers.push(candidate.header.clone());
                }
            }
        }
        BlocksRequest { headers }
    }

    fn has_header(&self, number: u64, hash: H256) -> bool {
        self.headers
            .get(&number)
            .is_some_and(|slot| slot.iter().any(|candidate| candidate.hash() == hash))
    }

    /// Walk forward from the anchor, moving header+body pairs out in order.
    fn assemble(&mut self) -> Vec<Block> {
        let mut ready = Vec::new();
        loop {
            let next = self.anchor_number + 1;
            let Some((chosen, losers)) = self.resolve(next) else {
                break;
            };
            let Some(block) = self.bodies.remove(&chosen) else {
                break;
            };
            for orphan in &losers {
                self.bodies.remove(orphan);
            }
            self.headers.remove(&next);
            self.anchor_number = next;
            self.anchor_hash = chosen;
            ready.push(block);
        }
        if !ready.is_empty() {
            debug!(
                from = ready[0].number(),
                to = self.anchor_number,
                "Assembled contiguous blocks"
            );
        }
        ready
    }

    /// Pick a candidate at `number` that descends from the emitted chain and
    /// has its body present, and collect the losing candidates.
    fn resolve(&self, number: u64) -> Option<(H256, Vec<H256>)> {
        let slot = self.headers.get(&number)?;
        let chosen = slot
            .iter()
            .filter(|candidate| candidate.header.parent_hash == self.anchor_hash)
            .map(|candidate| candidate.hash())
            .find(|hash| self.bodies.contains_key(hash))?;
        let losers = slot
            .iter()
            .map(|candidate| candidate.hash())
            .filter(|hash| *hash != chosen)
            .collect();
        Some((chosen, losers))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ember_core::U256;
    use ember_network::PeerId;

    fn peer() -> PeerId {
        PeerId::from_bytes(vec![1, 2, 3])
    }

    fn genesis_header() -> BlockHeader {
        BlockHeader::new(H256::zero(), 0, U256::from(0x20000), 0, vec![])
    }

    fn chain_from(parent: &BlockHeader, len: usize) -> Vec<Block> {
        let mut blocks = Vec::with_capacity(len);
        let mut parent = parent.clone();
        for _ in 0..len {
            let header = BlockHeader::new(
                parent.hash(),
                parent.number + 1,
                U256::from(0x20000),
                parent.timestamp + 13,
                vec![],
            );
            parent = header.clone();
            blocks.push(Block::new(header, vec![]));
        }
        blocks
    }

    fn wrappers(blocks: &[Block]) -> Vec<HeaderWrapper> {
        blocks
            .iter()
            .map(|b| HeaderWrapper::new(b.header.clone(), peer()))
            .collect()
    }

    fn queue() -> (SyncQueue, BlockHeader) {
        let head = genesis_header();
        (SyncQueue::new(&head, 192), head)
    }

    #[test]
    fn emits_contiguous_blocks_in_order() {
        let (mut queue, head) = queue();
        let blocks = chain_from(&head, 10);
        queue.add_headers(wrappers(&blocks));

        let ready = queue.add_blocks(blocks.clone());
        assert_eq!(ready.len(), 10);
        for (i, block) in ready.iter().enumerate() {
            assert_eq!(block.number(), i as u64 + 1);
        }
        assert_eq!(queue.headers_count(), 0);
        assert_eq!(queue.bodies_count(), 0);
        assert_eq!(queue.anchor().0, 10);
    }

    #[test]
    fn out_of_order_bodies_wait_for_the_gap() {
        let (mut queue, head) = queue();
        let blocks = chain_from(&head, 5);
        queue.add_headers(wrappers(&blocks));

        // Bodies 2..5 first: nothing contiguous yet.
        let ready = queue.add_blocks(blocks[1..].to_vec());
        assert!(ready.is_empty());
        assert_eq!(queue.bodies_count(), 4);

        // Body 1 releases the whole run.
        let ready = queue.add_blocks(vec![blocks[0].clone()]);
        assert_eq!(
            ready.iter().map(Block::number).collect::<Vec<_>>(),
            vec![1, 2, 3, 4, 5]
        );
    }

    #[test]
    fn ready_blocks_are_parent_linked() {
        let (mut queue, head) = queue();
        let blocks = chain_from(&head, 8);
        queue.add_headers(wrappers(&blocks));
        let ready = queue.add_blocks(blocks);

        let mut parent = head.hash();
        for block in ready {
            assert_eq!(block.parent_hash(), parent);
            parent = block.hash();
        }
    }

    #[test]
    fn duplicate_headers_are_ignored() {
        let (mut queue, head) = queue();
        let blocks = chain_from(&head, 3);
        queue.add_headers(wrappers(&blocks));
        queue.add_headers(wrappers(&blocks));
        assert_eq!(queue.headers_count(), 3);
    }

    #[test]
    fn duplicate_bodies_emit_once() {
        let (mut queue, head) = queue();
        let blocks = chain_from(&head, 3);
        queue.add_headers(wrappers(&blocks));

        let first = queue.add_blocks(blocks.clone());
        assert_eq!(first.len(), 3);
        let second = queue.add_blocks(blocks);
        assert!(second.is_empty());
    }

    #[test]
    fn stale_headers_are_dropped() {
        let (mut queue, head) = queue();
        let blocks = chain_from(&head, 4);
        queue.add_headers(wrappers(&blocks));
        queue.add_blocks(blocks.clone());
        assert_eq!(queue.anchor().0, 4);

        // Everything at or below the anchor is ignored on re-insertion.
        queue.add_headers(wrappers(&blocks));
        assert_eq!(queue.headers_count(), 0);
    }

    #[test]
    fn body_for_unknown_header_is_discarded() {
        let (mut queue, head) = queue();
        let blocks = chain_from(&head, 2);
        let ready = queue.add_blocks(blocks);
        assert!(ready.is_empty());
        assert_eq!(queue.bodies_count(), 0);
    }

    #[test]
    fn empty_queue_requests_forward_from_the_anchor() {
        let (queue, _) = queue();
        let req = queue.request_headers();
        assert_eq!(req.start, 1);
        assert_eq!(req.count, 192);
        assert!(!req.reverse);
    }

    #[test]
    fn request_targets_the_lowest_gap() {
        let (mut queue, head) = queue();
        let blocks = chain_from(&head, 10);
        // Know heights 5..=10 only; the gap is 1..=4.
        queue.add_headers(wrappers(&blocks[4..]));

        let req = queue.request_headers();
        assert_eq!(req.start, 1);
        assert_eq!(req.count, 4);
    }

    #[test]
    fn request_skips_the_known_prefix() {
        let (mut queue, head) = queue();
        let blocks = chain_from(&head, 6);
        // Know heights 1..=3; next uncovered run starts at 4.
        queue.add_headers(wrappers(&blocks[..3]));

        let req = queue.request_headers();
        assert_eq!(req.start, 4);
        assert_eq!(req.count, 192);
    }

    #[test]
    fn wide_gaps_are_window_capped() {
        let head = genesis_header();
        let mut queue = SyncQueue::new(&head, 16);
        let blocks = chain_from(&head, 100);
        queue.add_headers(wrappers(&blocks[80..]));

        let req = queue.request_headers();
        assert_eq!(req.start, 1);
        assert_eq!(req.count, 16);
    }

    #[test]
    fn request_blocks_skips_present_bodies() {
        let (mut queue, head) = queue();
        let blocks = chain_from(&head, 10);
        queue.add_headers(wrappers(&blocks));
        // Bodies for 2..=4 arrive early and stay buffered.
        queue.add_blocks(blocks[1..4].to_vec());

        let req = queue.request_blocks(100);
        let numbers: Vec<u64> = req.headers.iter().map(|h| h.number).collect();
        assert_eq!(numbers, vec![1, 5, 6, 7, 8, 9, 10]);
    }

    #[test]
    fn request_blocks_honors_the_limit_and_splits() {
        let (mut queue, head) = queue();
        let blocks = chain_from(&head, 30);
        queue.add_headers(wrappers(&blocks));

        let req = queue.request_blocks(25);
        assert_eq!(req.len(), 25);

        let chunks = req.split(10);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].len(), 10);
        assert_eq!(chunks[2].len(), 5);
        assert_eq!(chunks[0].headers[0].number, 1);
        assert_eq!(chunks[2].headers[4].number, 25);
    }

    #[test]
    fn competing_candidates_resolve_by_parent_linkage() {
        let (mut queue, head) = queue();
        let blocks = chain_from(&head, 1);
        let canonical = blocks[0].clone();

        // A competing header at height 1 with an unknown parent.
        let stranger = Block::new(
            BlockHeader::new(H256::repeat_byte(0xee), 1, U256::from(0x20000), 99, vec![]),
            vec![],
        );
        queue.add_headers(wrappers(&[stranger.clone(), canonical.clone()]));
        assert_eq!(queue.headers_count(), 2);

        let ready = queue.add_blocks(vec![stranger, canonical.clone()]);
        assert_eq!(ready.len(), 1);
        assert_eq!(ready[0].hash(), canonical.hash());
        // The losing candidate and its body are gone with the height.
        assert_eq!(queue.headers_count(), 0);
        assert_eq!(queue.bodies_count(), 0);
    }

    #[test]
    fn headers_backlog_stays_window_bounded() {
        let head = genesis_header();
        let mut queue = SyncQueue::new(&head, 192);
        let blocks = chain_from(&head, 300);

        // Simulate the fetch cycle: request, deliver, repeat.
        let mut delivered = 0usize;
        while delivered < blocks.len() {
            let req = queue.request_headers();
            assert!(req.count <= 192);
            let end = (req.start as usize - 1 + req.count as usize).min(blocks.len());
            queue.add_headers(wrappers(&blocks[req.start as usize - 1..end]));
            delivered = end;
        }
        assert_eq!(queue.headers_count(), 300);
    }
}
