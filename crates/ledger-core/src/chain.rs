use crate::constants::GENESIS_PROOF;
use crate::error::LedgerError;
use crate::pow::valid_proof;
use crate::{now_secs, Block, Number, PreviousHash, Transaction};
use parking_lot::RwLock;
use tracing::{debug, info};

#[derive(Debug)]
struct LedgerState {
    chain: Vec<Block>,
    pending: Vec<Transaction>,
}

impl LedgerState {
    fn tip(&self) -> &Block {
        self.chain
            .last()
            .expect("ledger chain always holds at least the genesis block")
    }

    /// Appends a block built from the pending pool, which is left empty.
    fn push_block(&mut self, proof: u64, previous_hash: Option<PreviousHash>) -> Block {
        let previous_hash = match previous_hash {
            Some(h) => h,
            None => PreviousHash::of(self.tip()),
        };
        let block = Block {
            index: self.chain.len() as u64 + 1,
            previous_hash,
            proof,
            timestamp: now_secs(),
            transactions: std::mem::take(&mut self.pending),
        };
        self.chain.push(block.clone());
        block
    }
}

/// In-memory chain plus pending-transaction pool behind a single lock.
///
/// Every read-modify-write (index computation and append, pool drain, chain swap) runs
/// under one write guard, so concurrent callers never observe a half-built block.
/// Transactions still pending when the chain is replaced are kept as they are and may end
/// up mined again on top of the adopted chain.
#[derive(Debug)]
pub struct Ledger {
    state: RwLock<LedgerState>,
}

impl Default for Ledger {
    fn default() -> Self {
        Self::new()
    }
}

impl Ledger {
    /// A ledger holding only the genesis block.
    pub fn new() -> Self {
        let mut state = LedgerState {
            chain: Vec::new(),
            pending: Vec::new(),
        };
        state.push_block(GENESIS_PROOF, Some(PreviousHash::genesis()));
        Self {
            state: RwLock::new(state),
        }
    }

    /// Queues a transaction and returns the index of the block expected to include it.
    pub fn new_transaction(
        &self,
        sender: impl Into<String>,
        recipient: impl Into<String>,
        amount: impl Into<Number>,
    ) -> u64 {
        let mut state = self.state.write();
        state.pending.push(Transaction::new(sender, recipient, amount));
        state.tip().index + 1
    }

    /// Seals the pending pool into a new block. Without `previous_hash` the block links to
    /// the hash of the current tip.
    pub fn new_block(&self, proof: u64, previous_hash: Option<PreviousHash>) -> Block {
        let block = self.state.write().push_block(proof, previous_hash);
        debug!(index = block.index, txs = block.transactions.len(), "block appended");
        block
    }

    /// Appends a mined block only if the tip is still the one the proof was found for.
    /// `reward` joins the pool in the same critical section so it is never queued twice.
    pub fn append_mined(
        &self,
        expected_tip: &str,
        proof: u64,
        reward: Transaction,
    ) -> Result<Block, LedgerError> {
        let mut state = self.state.write();
        let tip = state.tip().hash();
        if tip != expected_tip {
            return Err(LedgerError::StaleTip {
                expected: expected_tip.to_string(),
            });
        }
        state.pending.push(reward);
        Ok(state.push_block(proof, Some(PreviousHash::Digest(tip))))
    }

    /// Swaps in `candidate` if it is still strictly longer than the local chain.
    pub fn replace_chain(&self, candidate: Vec<Block>) -> bool {
        let mut state = self.state.write();
        if candidate.len() <= state.chain.len() {
            debug!(
                candidate = candidate.len(),
                local = state.chain.len(),
                "candidate chain no longer longer than local chain"
            );
            return false;
        }
        info!(from = state.chain.len(), to = candidate.len(), "replacing local chain");
        state.chain = candidate;
        true
    }

    pub fn last_block(&self) -> Block {
        self.state.read().tip().clone()
    }

    pub fn chain(&self) -> Vec<Block> {
        self.state.read().chain.clone()
    }

    pub fn pending(&self) -> Vec<Transaction> {
        self.state.read().pending.clone()
    }

    pub fn len(&self) -> usize {
        self.state.read().chain.len()
    }

    /// Always false: genesis is created with the ledger.
    pub fn is_empty(&self) -> bool {
        self.state.read().chain.is_empty()
    }
}

/// Walks `chain` from its first block, which is trusted as-is, and reports the first
/// broken hash link or invalid proof.
pub fn check_chain(chain: &[Block]) -> Result<(), LedgerError> {
    let first = chain.first().ok_or(LedgerError::EmptyChain)?;
    let mut last = first;
    for block in &chain[1..] {
        if block.previous_hash != PreviousHash::of(last) {
            return Err(LedgerError::BrokenLink { index: block.index });
        }
        if !valid_proof(last.proof, block.proof) {
            return Err(LedgerError::InvalidProof { index: block.index });
        }
        last = block;
    }
    Ok(())
}

pub fn valid_chain(chain: &[Block]) -> bool {
    check_chain(chain).is_ok()
}
