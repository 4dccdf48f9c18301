use thiserror::Error;

/// Failures raised by the ledger and by chain validation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    #[error("chain is empty")]
    EmptyChain,
    #[error("block {index} does not link to the hash of its predecessor")]
    BrokenLink { index: u64 },
    #[error("block {index} carries an invalid proof of work")]
    InvalidProof { index: u64 },
    #[error("chain tip moved away from {expected} while mining")]
    StaleTip { expected: String },
}

/// Why a peer's chain could not be obtained. Always non-fatal to conflict resolution.
#[derive(Debug, Error)]
pub enum PeerError {
    #[error("peer {peer} unreachable: {reason}")]
    Unreachable { peer: String, reason: String },
    #[error("peer {peer} answered with status {status}")]
    Status { peer: String, status: u16 },
    #[error("peer {peer} sent an undecodable chain: {reason}")]
    Decode { peer: String, reason: String },
}
