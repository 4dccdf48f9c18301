pub const HASH_SIZE: usize = 32;
pub const HASH_HEX_SIZE: usize = HASH_SIZE * 2;
pub const GENESIS_PROOF: u64 = 100;
/// Out-of-band `previous_hash` marker carried by the genesis block.
pub const GENESIS_PREVIOUS_HASH: u64 = 1;
pub const POW_DIFFICULTY_PREFIX: &str = "0000";
/// How many nonces the cancellable search tries between flag checks.
pub const POW_CANCEL_CHECK_INTERVAL: u64 = 4096;
pub const REWARD_SENDER: &str = "0";
pub const MINING_REWARD: u64 = 1;
