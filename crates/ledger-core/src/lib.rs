use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::io;
use std::time::{SystemTime, UNIX_EPOCH};

pub mod chain;
pub mod consensus;
pub mod constants;
pub mod error;
pub mod mine;

pub use chain::{check_chain, valid_chain, Ledger};
pub use consensus::{ChainSnapshot, ConsensusResolver, PeerFetcher, PeerSet};
pub use error::{LedgerError, PeerError};
pub use serde_json::Number;

use constants::{GENESIS_PREVIOUS_HASH, MINING_REWARD, REWARD_SENDER};

// Field order of `Transaction` and `Block` is lexicographic: it is part of the hash format.

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    /// Any JSON number; integers and floats keep their wire form so hashes match.
    pub amount: Number,
    pub recipient: String,
    pub sender: String,
}

impl Transaction {
    pub fn new(
        sender: impl Into<String>,
        recipient: impl Into<String>,
        amount: impl Into<Number>,
    ) -> Self {
        Self {
            amount: amount.into(),
            recipient: recipient.into(),
            sender: sender.into(),
        }
    }

    /// The synthetic transaction crediting `node_id` for a mined block.
    pub fn reward(node_id: impl Into<String>) -> Self {
        Self::new(REWARD_SENDER, node_id, MINING_REWARD)
    }
}

/// Link from a block to its predecessor.
///
/// Genesis carries the integer sentinel `1`; every other block carries the hex digest of
/// the block before it. Both forms travel over the wire exactly as the reference nodes
/// encode them (a bare JSON integer vs. a JSON string).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PreviousHash {
    Sentinel(u64),
    Digest(String),
}

impl PreviousHash {
    pub fn genesis() -> Self {
        PreviousHash::Sentinel(GENESIS_PREVIOUS_HASH)
    }

    pub fn of(block: &Block) -> Self {
        PreviousHash::Digest(block.hash())
    }
}

impl fmt::Display for PreviousHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PreviousHash::Sentinel(v) => write!(f, "{v}"),
            PreviousHash::Digest(h) => f.write_str(h),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Block {
    pub index: u64,
    pub previous_hash: PreviousHash,
    pub proof: u64,
    pub timestamp: f64,
    pub transactions: Vec<Transaction>,
}

impl Block {
    pub fn hash(&self) -> String {
        hash_block(self)
    }
}

/// Seconds since the Unix epoch with sub-second precision.
pub fn now_secs() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("time went backwards")
        .as_secs_f64()
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// Canonical byte form of a block: sorted keys, `", "` / `": "` separators, printable
/// ASCII only (everything else as `\uXXXX`) and floats in Python `repr` form. Independent nodes hashing the same logical
/// block must agree on these bytes.
pub fn canonical_json(block: &Block) -> Vec<u8> {
    let mut out = Vec::with_capacity(256);
    let mut ser = serde_json::Serializer::with_formatter(&mut out, CanonicalFormatter);
    block
        .serialize(&mut ser)
        .expect("serializing a block into memory cannot fail");
    out
}

/// SHA-256 of [`canonical_json`], hex encoded.
pub fn hash_block(block: &Block) -> String {
    sha256_hex(&canonical_json(block))
}

struct CanonicalFormatter;

impl serde_json::ser::Formatter for CanonicalFormatter {
    fn begin_array_value<W>(&mut self, writer: &mut W, first: bool) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_key<W>(&mut self, writer: &mut W, first: bool) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_value<W>(&mut self, writer: &mut W) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        writer.write_all(b": ")
    }

    fn write_string_fragment<W>(&mut self, writer: &mut W, fragment: &str) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        let bytes = fragment.as_bytes();
        let mut start = 0;
        for (i, ch) in fragment.char_indices() {
            if ch.is_ascii() && ch != '\u{7f}' {
                continue;
            }
            writer.write_all(&bytes[start..i])?;
            let mut units = [0u16; 2];
            for unit in ch.encode_utf16(&mut units).iter() {
                write!(writer, "\\u{unit:04x}")?;
            }
            start = i + ch.len_utf8();
        }
        writer.write_all(&bytes[start..])
    }

    fn write_f64<W>(&mut self, writer: &mut W, value: f64) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        writer.write_all(float_repr(value).as_bytes())
    }
}

/// Shortest round-trip rendering of a finite float, laid out the way Python's `repr`
/// does: positional for exponents in `-4..16` (always with a fractional part),
/// scientific with a signed two-digit exponent otherwise.
fn float_repr(value: f64) -> String {
    let sci = format!("{value:e}");
    let (mantissa, exp) = sci.split_once('e').unwrap_or((sci.as_str(), "0"));
    let exp: i32 = exp.parse().unwrap_or(0);
    let (sign, mantissa) = match mantissa.strip_prefix('-') {
        Some(m) => ("-", m),
        None => ("", mantissa),
    };
    if !(-4..16).contains(&exp) {
        let exp_sign = if exp < 0 { '-' } else { '+' };
        return format!("{sign}{mantissa}e{exp_sign}{:02}", exp.abs());
    }
    let digits = mantissa.replace('.', "");
    if exp < 0 {
        let zeros = "0".repeat((-exp - 1) as usize);
        return format!("{sign}0.{zeros}{digits}");
    }
    let int_len = exp as usize + 1;
    if digits.len() <= int_len {
        let pad = "0".repeat(int_len - digits.len());
        format!("{sign}{digits}{pad}.0")
    } else {
        format!("{sign}{}.{}", &digits[..int_len], &digits[int_len..])
    }
}

pub mod pow {
    use crate::constants::{POW_CANCEL_CHECK_INTERVAL, POW_DIFFICULTY_PREFIX};
    use crate::sha256_hex;
    use std::sync::atomic::{AtomicBool, Ordering};

    /// `sha256("{last_proof}{proof}")` must start with the difficulty prefix.
    pub fn valid_proof(last_proof: u64, proof: u64) -> bool {
        let guess = format!("{last_proof}{proof}");
        sha256_hex(guess.as_bytes()).starts_with(POW_DIFFICULTY_PREFIX)
    }

    /// Smallest non-negative nonce satisfying [`valid_proof`] against `last_proof`.
    pub fn proof_of_work(last_proof: u64) -> u64 {
        let mut proof = 0u64;
        while !valid_proof(last_proof, proof) {
            proof += 1;
        }
        proof
    }

    /// Same search as [`proof_of_work`], giving up with `None` once `cancel` is set.
    pub fn proof_of_work_cancellable(last_proof: u64, cancel: &AtomicBool) -> Option<u64> {
        let mut proof = 0u64;
        loop {
            if proof % POW_CANCEL_CHECK_INTERVAL == 0 && cancel.load(Ordering::Relaxed) {
                return None;
            }
            if valid_proof(last_proof, proof) {
                return Some(proof);
            }
            proof += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;

    const GENESIS_HASH: &str = "fe7a808a1ee0b45ac72fa89fd71f8f7dadbd98e4aba8356cd9287a62f720e791";

    fn fixed_genesis() -> Block {
        Block {
            index: 1,
            previous_hash: PreviousHash::genesis(),
            proof: 100,
            timestamp: 1_600_000_000.0,
            transactions: vec![],
        }
    }

    fn fixed_second_block() -> Block {
        Block {
            index: 2,
            previous_hash: PreviousHash::Digest(GENESIS_HASH.to_string()),
            proof: 35293,
            timestamp: 1_600_000_123.25,
            transactions: vec![Transaction::new("A", "B", 5), Transaction::reward("node")],
        }
    }

    #[test]
    fn canonical_json_genesis_example() {
        let json = String::from_utf8(canonical_json(&fixed_genesis())).unwrap();
        assert_eq!(
            json,
            r#"{"index": 1, "previous_hash": 1, "proof": 100, "timestamp": 1600000000.0, "transactions": []}"#
        );
    }

    #[test]
    fn canonical_json_nested_transactions_example() {
        let json = String::from_utf8(canonical_json(&fixed_second_block())).unwrap();
        let expected = concat!(
            r#"{"index": 2, "previous_hash": "fe7a808a1ee0b45ac72fa89fd71f8f7dadbd98e4aba8356cd9287a62f720e791", "#,
            r#""proof": 35293, "timestamp": 1600000123.25, "transactions": ["#,
            r#"{"amount": 5, "recipient": "B", "sender": "A"}, "#,
            r#"{"amount": 1, "recipient": "node", "sender": "0"}]}"#
        );
        assert_eq!(json, expected);
    }

    #[test]
    fn canonical_json_escapes_non_ascii() {
        let mut block = fixed_genesis();
        block.transactions.push(Transaction::new("Zoë", "😀", 1));
        let json = String::from_utf8(canonical_json(&block)).unwrap();
        assert!(json.is_ascii());
        assert!(json.contains(r#"{"amount": 1, "recipient": "\ud83d\ude00", "sender": "Zo\u00eb"}"#));
    }

    #[test]
    fn canonical_json_escapes_delete() {
        let mut block = fixed_genesis();
        block.transactions.push(Transaction::new("a\u{7f}", "b", 1));
        let json = String::from_utf8(canonical_json(&block)).unwrap();
        assert!(json.contains(r#""sender": "a\u007f""#));
        assert_eq!(
            block.hash(),
            "33fe25a136e6a8c7de41b93330234b33e140b243ad587b5aa522be5480cc313f"
        );
    }

    #[test]
    fn canonical_json_number_amounts() {
        let float = |v: f64| Number::from_f64(v).unwrap();
        let mut block = fixed_second_block();
        block.transactions = vec![
            Transaction::new("A", "B", float(2.5)),
            Transaction::new("B", "C", -3),
            Transaction::new("C", "D", float(0.00001)),
            Transaction::new("D", "E", float(1e16)),
        ];
        let json = String::from_utf8(canonical_json(&block)).unwrap();
        assert!(json.contains(concat!(
            r#"[{"amount": 2.5, "recipient": "B", "sender": "A"}, "#,
            r#"{"amount": -3, "recipient": "C", "sender": "B"}, "#,
            r#"{"amount": 1e-05, "recipient": "D", "sender": "C"}, "#,
            r#"{"amount": 1e+16, "recipient": "E", "sender": "D"}]"#
        )));
        assert_eq!(
            block.hash(),
            "d926878d4123d191d0487b35d4cdccb41ba29c4db75a973edcf26b241acb626f"
        );
    }

    #[test]
    fn fractional_amount_survives_the_wire() {
        let body = r#"{"amount":2.5,"recipient":"B","sender":"A"}"#;
        let tx: Transaction = serde_json::from_str(body).unwrap();
        assert_eq!(tx.amount.as_f64(), Some(2.5));
        assert!(tx.amount.is_f64());
        assert_eq!(serde_json::to_string(&tx).unwrap(), body);

        let int: Transaction =
            serde_json::from_str(r#"{"amount":5,"recipient":"B","sender":"A"}"#).unwrap();
        assert_eq!(int, Transaction::new("A", "B", 5));
    }

    #[test]
    fn float_repr_matches_python_layout() {
        assert_eq!(float_repr(0.0), "0.0");
        assert_eq!(float_repr(-0.0), "-0.0");
        assert_eq!(float_repr(2.5), "2.5");
        assert_eq!(float_repr(100.0), "100.0");
        assert_eq!(float_repr(1_600_000_123.25), "1600000123.25");
        assert_eq!(float_repr(0.0001), "0.0001");
        assert_eq!(float_repr(0.00001), "1e-05");
        assert_eq!(float_repr(-1.5e-7), "-1.5e-07");
        assert_eq!(float_repr(1234567890123456.0), "1234567890123456.0");
        assert_eq!(float_repr(1e16), "1e+16");
        assert_eq!(float_repr(1.5e300), "1.5e+300");
    }

    #[test]
    fn block_hash_example() {
        assert_eq!(fixed_genesis().hash(), GENESIS_HASH);
        assert_eq!(
            fixed_second_block().hash(),
            "0f64f1343fae7bb96e4a3cae797837ebd7b36049a1ecdc6a4205c83a72a262af"
        );
        assert_eq!(fixed_genesis().hash().len(), constants::HASH_HEX_SIZE);
    }

    #[test]
    fn block_hash_consistency() {
        let a = fixed_second_block();
        let b = fixed_second_block();
        let first = b.hash();
        assert_eq!(a.hash(), first);
        assert_eq!(b.hash(), first);
    }

    #[test]
    fn block_hash_changes_with_proof() {
        let mut block = fixed_second_block();
        let before = block.hash();
        block.proof += 1;
        assert_ne!(before, block.hash());
    }

    #[test]
    fn previous_hash_wire_forms() {
        let json = serde_json::to_string(&fixed_genesis()).unwrap();
        assert!(json.contains(r#""previous_hash":1"#));
        let back: Block = serde_json::from_str(&json).unwrap();
        assert_eq!(back.previous_hash, PreviousHash::genesis());

        let json = serde_json::to_string(&fixed_second_block()).unwrap();
        let back: Block = serde_json::from_str(&json).unwrap();
        assert_eq!(back, fixed_second_block());
    }

    #[test]
    fn reward_transaction_example() {
        let tx = Transaction::reward("abc");
        assert_eq!(tx.sender, "0");
        assert_eq!(tx.recipient, "abc");
        assert_eq!(tx.amount, Number::from(1));
    }

    #[test]
    fn valid_proof_matches_digest_prefix() {
        assert!(pow::valid_proof(100, 35293));
        assert!(sha256_hex(b"10035293").starts_with("0000"));
        assert!(!pow::valid_proof(100, 0));
        assert!(!sha256_hex(b"1000").starts_with("0000"));
    }

    #[test]
    fn proof_of_work_returns_smallest_nonce() {
        let proof = pow::proof_of_work(100);
        assert_eq!(proof, 35293);
        assert!((0..proof).all(|p| !pow::valid_proof(100, p)));
        assert_eq!(pow::proof_of_work(proof), 35089);
    }

    #[test]
    fn cancelled_search_gives_up() {
        let cancel = AtomicBool::new(true);
        assert_eq!(pow::proof_of_work_cancellable(100, &cancel), None);
        let cancel = AtomicBool::new(false);
        assert_eq!(pow::proof_of_work_cancellable(100, &cancel), Some(35293));
    }
}
