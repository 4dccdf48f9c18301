use crate::{
    chain::Ledger,
    pow::{proof_of_work, proof_of_work_cancellable},
    Block, Transaction,
};
use std::sync::atomic::AtomicBool;
use tracing::{debug, info};

/// Mines one block on top of the current tip, crediting `node_id` with the reward.
///
/// The proof search runs without holding the ledger lock. If another block lands while
/// searching, the proof no longer fits the tip and the search restarts on the new one.
pub fn mine(ledger: &Ledger, node_id: &str) -> Block {
    loop {
        let last = ledger.last_block();
        let proof = proof_of_work(last.proof);
        if let Some(block) = try_append(ledger, &last, proof, node_id) {
            return block;
        }
    }
}

/// Like [`mine`], but returns `None` as soon as `cancel` is observed set.
pub fn mine_cancellable(ledger: &Ledger, node_id: &str, cancel: &AtomicBool) -> Option<Block> {
    loop {
        let last = ledger.last_block();
        let proof = proof_of_work_cancellable(last.proof, cancel)?;
        if let Some(block) = try_append(ledger, &last, proof, node_id) {
            return Some(block);
        }
    }
}

fn try_append(ledger: &Ledger, last: &Block, proof: u64, node_id: &str) -> Option<Block> {
    match ledger.append_mined(&last.hash(), proof, Transaction::reward(node_id)) {
        Ok(block) => {
            info!(
                "Mined block {} with proof {} on top of {}",
                block.index, proof, block.previous_hash
            );
            Some(block)
        }
        Err(err) => {
            debug!(%err, "restarting proof search");
            None
        }
    }
}
