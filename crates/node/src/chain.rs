use std::collections::HashSet;

use santitham_primitives::block::{Block, BlockHash};

/// The locally collected chain fragment: every block ever accepted plus the
/// set of their hashes, kept sorted by header timestamp.
pub struct ChainStore {
    blocks: Vec<Block>,
    hashes: HashSet<BlockHash>,
}

impl ChainStore {
    pub fn new(blocks: Vec<Block>) -> Self {
        let hashes = blocks.iter().map(Block::hash).collect();
        Self { blocks, hashes }
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn contains(&self, hash: &BlockHash) -> bool {
        self.hashes.contains(hash)
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    /// Accepts a block unless its hash is already known. Returns the
    /// parent hashes missing from the fragment after this block joined,
    /// oldest gap first, or `None` for a duplicate.
    pub fn ingest(&mut self, hash: BlockHash, block: Block) -> Option<Vec<BlockHash>> {
        if !self.hashes.insert(hash) {
            return None;
        }
        self.blocks.push(block);
        Some(self.missing_parents())
    }

    /// Sorts by header timestamp and reports, for every consecutive pair
    /// that is not parent-linked, the child's prev-block hash.
    fn missing_parents(&mut self) -> Vec<BlockHash> {
        self.blocks.sort_by_key(|block| block.header.timestamp);

        let mut missing = Vec::new();
        for pair in self.blocks.windows(2) {
            let prev_hash = pair[0].hash();
            if pair[1].header.prev_block != prev_hash {
                missing.push(pair[1].header.prev_block);
            }
        }
        missing
    }
}
