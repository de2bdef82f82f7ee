//! BEEF (Background Evaluation Extended Format)
//!
//! A BEEF is a list of BUMPs (merkle paths) and a list of transactions
//! in dependency order, oldest first: everything a recipient needs to
//! verify the newest transaction offline. Atomic BEEF wraps a bundle
//! with a pinned subject txid.
//!
//! Writers deduplicate: identical ancestors appear once and same-block
//! merkle paths are combined into one BUMP. Readers re-link ancestry by
//! txid and reject bundles whose unmined transactions reference parents
//! the bundle does not carry.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use thiserror::Error;

use crate::chain::ChainTracker;
use crate::codec::{CodecError, Reader, Writer};
use crate::transaction::merkle_path::{MerklePath, MerklePathError};
use crate::transaction::{Transaction, TransactionError};

/// BEEF version constants, as the little-endian u32 whose wire bytes
/// spell `0100BEEF` / `0200BEEF`.
pub const BEEF_V1: u32 = 0xEFBE_0001;
pub const BEEF_V2: u32 = 0xEFBE_0002;

/// Atomic BEEF prefix (`01010101` on the wire).
pub const ATOMIC_BEEF: u32 = 0x0101_0101;

/// Transaction entry format in a V2 BEEF.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxDataFormat {
    /// Raw transaction without a BUMP.
    RawTx = 0,
    /// Raw transaction plus BUMP index.
    RawTxAndBumpIndex = 1,
    /// Opaque entry: txid only, ancestry pruned (V2 only).
    TxidOnly = 2,
}

/// BEEF errors
#[derive(Debug, Error)]
pub enum BeefError {
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("unknown BEEF version 0x{0:08x}")]
    UnknownVersion(u32),

    #[error("transaction {child} references parent {parent} missing from the bundle")]
    DanglingReference { child: String, parent: String },

    #[error("subject transaction {0} not present in the bundle")]
    SubjectMissing(String),

    #[error("bump index {index} out of range ({len} bumps)")]
    InvalidBumpIndex { index: usize, len: usize },

    #[error("bump does not prove txid {0}")]
    BumpMissingTxid(String),

    #[error("txid-only entries require BEEF V2")]
    TxidOnlyNotAllowed,

    #[error("merkle path error: {0}")]
    MerklePath(#[from] MerklePathError),

    #[error("transaction error: {0}")]
    Transaction(#[from] TransactionError),
}

pub type BeefResult<T> = Result<T, BeefError>;

/// One transaction entry.
#[derive(Debug, Clone)]
pub struct BeefTx {
    /// Transaction ID (hex, display order)
    pub txid: String,

    /// Parsed transaction, ancestry re-linked. Absent on txid-only
    /// entries.
    pub tx: Option<Arc<Transaction>>,

    /// Index into the bundle's BUMP list, for mined transactions.
    pub bump_index: Option<usize>,

    pub data_format: TxDataFormat,
}

/// BEEF bundle: merkle paths plus transactions in dependency order.
#[derive(Debug, Clone, Default)]
pub struct Beef {
    pub version: u32,
    pub bumps: Vec<MerklePath>,
    pub txs: Vec<BeefTx>,
}

impl Beef {
    pub fn new(version: u32) -> Self {
        Self {
            version,
            bumps: Vec::new(),
            txs: Vec::new(),
        }
    }

    pub fn new_v1() -> Self {
        Self::new(BEEF_V1)
    }

    pub fn new_v2() -> Self {
        Self::new(BEEF_V2)
    }

    pub fn find_txid(&self, txid: &str) -> Option<&BeefTx> {
        self.txs.iter().find(|t| t.txid == txid)
    }

    /// Linked transaction for `txid`, when the bundle carries it.
    pub fn find_transaction(&self, txid: &str) -> Option<Arc<Transaction>> {
        self.find_txid(txid).and_then(|t| t.tx.clone())
    }

    /// Index of the BUMP proving `txid`, if any.
    pub fn find_bump_index(&self, txid: &str) -> Option<usize> {
        self.bumps
            .iter()
            .position(|bump| bump_contains(bump, txid))
    }

    /// Add a merkle path, deduplicating against existing BUMPs: a path
    /// for an already-covered block is combined rather than appended.
    /// Returns the index the path lives at.
    pub fn merge_bump(&mut self, bump: MerklePath) -> BeefResult<usize> {
        for (i, existing) in self.bumps.iter_mut().enumerate() {
            if existing.block_height == bump.block_height
                && existing.root().ok() == bump.root().ok()
            {
                existing.combine(&bump)?;
                return Ok(i);
            }
        }
        self.bumps.push(bump);
        Ok(self.bumps.len() - 1)
    }

    /// Add a transaction and, recursively, its unmined ancestry.
    ///
    /// Mined transactions contribute their merkle path as a BUMP and
    /// stop the recursion. Inputs holding only a raw txid become
    /// txid-only entries in V2 and are a dangling-reference error in V1.
    pub fn merge_transaction(&mut self, tx: &Arc<Transaction>) -> BeefResult<()> {
        let txid = tx.txid()?;
        if let Some(existing) = self.find_txid(&txid) {
            if existing.tx.is_some() {
                return Ok(());
            }
            // upgrade a txid-only placeholder below
        }

        let bump_index = match &tx.merkle_path {
            Some(path) => Some(self.merge_bump(path.clone())?),
            None => None,
        };

        if bump_index.is_none() {
            for input in &tx.inputs {
                if let Some(source) = &input.source_transaction {
                    self.merge_transaction(source)?;
                } else {
                    let parent = input.source_txid_hex()?;
                    if self.find_txid(&parent).is_none() {
                        if self.version == BEEF_V2 {
                            self.merge_txid_only(&parent);
                        } else {
                            return Err(BeefError::DanglingReference {
                                child: txid,
                                parent,
                            });
                        }
                    }
                }
            }
        }

        let data_format = if bump_index.is_some() {
            TxDataFormat::RawTxAndBumpIndex
        } else {
            TxDataFormat::RawTx
        };
        let entry = BeefTx {
            txid: txid.clone(),
            tx: Some(tx.clone()),
            bump_index,
            data_format,
        };
        match self.txs.iter_mut().find(|t| t.txid == txid) {
            Some(placeholder) => *placeholder = entry,
            None => self.txs.push(entry),
        }
        Ok(())
    }

    /// Add an opaque txid-only entry (V2 pruning).
    pub fn merge_txid_only(&mut self, txid: &str) {
        if self.find_txid(txid).is_none() {
            self.txs.push(BeefTx {
                txid: txid.to_string(),
                tx: None,
                bump_index: None,
                data_format: TxDataFormat::TxidOnly,
            });
        }
    }

    /// Merge another bundle: BUMPs are deduplicated, transactions join
    /// by txid with raw entries winning over txid-only placeholders.
    pub fn merge_beef(&mut self, other: &Beef) -> BeefResult<()> {
        for entry in &other.txs {
            match (&entry.tx, self.find_txid(&entry.txid)) {
                (Some(tx), existing) => {
                    if existing.map_or(true, |e| e.tx.is_none()) {
                        let mut tx = tx.clone();
                        if let Some(bump_index) = entry.bump_index {
                            // re-home the bump into this bundle
                            let bump = other.bumps.get(bump_index).ok_or(
                                BeefError::InvalidBumpIndex {
                                    index: bump_index,
                                    len: other.bumps.len(),
                                },
                            )?;
                            let mut cloned = (*tx).clone();
                            cloned.merkle_path = Some(bump.clone());
                            tx = Arc::new(cloned);
                        }
                        self.merge_transaction(&tx)?;
                    }
                }
                (None, None) => self.merge_txid_only(&entry.txid),
                (None, Some(_)) => {}
            }
        }
        Ok(())
    }

    /// Transactions in dependency order: every entry follows the
    /// in-bundle parents it references.
    fn ordered(&self) -> Vec<&BeefTx> {
        let known: HashSet<&str> = self.txs.iter().map(|t| t.txid.as_str()).collect();
        let mut emitted: HashSet<&str> = HashSet::new();
        let mut out: Vec<&BeefTx> = Vec::with_capacity(self.txs.len());
        let mut pending: Vec<&BeefTx> = self.txs.iter().collect();

        while !pending.is_empty() {
            let mut progressed = false;
            pending.retain(|entry| {
                let ready = match &entry.tx {
                    None => true,
                    Some(tx) => tx.inputs.iter().all(|input| {
                        input
                            .source_txid_hex()
                            .map(|parent| {
                                !known.contains(parent.as_str())
                                    || emitted.contains(parent.as_str())
                            })
                            .unwrap_or(true)
                    }),
                };
                if ready {
                    emitted.insert(entry.txid.as_str());
                    out.push(*entry);
                    progressed = true;
                }
                !ready
            });
            if !progressed {
                // cycles are impossible for honest content; emit the
                // rest in stored order rather than looping
                out.extend(pending.iter().copied());
                break;
            }
        }
        out
    }

    pub fn to_binary(&self) -> BeefResult<Vec<u8>> {
        let mut w = Writer::new();
        w.write_u32_le(self.version);

        w.write_var_int(self.bumps.len() as u64);
        for bump in &self.bumps {
            bump.write(&mut w)?;
        }

        let ordered = self.ordered();
        w.write_var_int(ordered.len() as u64);
        for entry in ordered {
            match (&entry.tx, self.version) {
                (None, BEEF_V2) => {
                    w.write_u8(TxDataFormat::TxidOnly as u8);
                    w.write_reverse(&decode_txid(&entry.txid)?);
                }
                (None, _) => return Err(BeefError::TxidOnlyNotAllowed),
                (Some(tx), version) => {
                    if version == BEEF_V2 {
                        let format = match entry.bump_index {
                            Some(_) => TxDataFormat::RawTxAndBumpIndex,
                            None => TxDataFormat::RawTx,
                        };
                        w.write_u8(format as u8);
                        w.write_bytes(&tx.to_binary()?);
                        if let Some(index) = entry.bump_index {
                            w.write_var_int(index as u64);
                        }
                    } else {
                        w.write_bytes(&tx.to_binary()?);
                        match entry.bump_index {
                            Some(index) => {
                                w.write_u8(1);
                                w.write_var_int(index as u64);
                            }
                            None => w.write_u8(0),
                        }
                    }
                }
            }
        }
        Ok(w.into_bytes())
    }

    pub fn to_hex(&self) -> BeefResult<String> {
        Ok(hex::encode(self.to_binary()?))
    }

    pub fn from_binary(bytes: &[u8]) -> BeefResult<Self> {
        let mut reader = Reader::new(bytes);
        let version = reader.read_u32_le()?;
        if version != BEEF_V1 && version != BEEF_V2 {
            return Err(BeefError::UnknownVersion(version));
        }

        let n_bumps = reader.read_var_int()? as usize;
        let mut bumps = Vec::with_capacity(n_bumps);
        for _ in 0..n_bumps {
            bumps.push(MerklePath::read(&mut reader)?);
        }

        let n_txs = reader.read_var_int()? as usize;
        let mut beef = Self {
            version,
            bumps,
            txs: Vec::with_capacity(n_txs),
        };
        let mut by_txid: HashMap<String, Arc<Transaction>> = HashMap::new();
        let mut known: HashSet<String> = HashSet::new();

        for _ in 0..n_txs {
            let (mut tx, data_format) = if version == BEEF_V2 {
                match reader.read_u8()? {
                    2 => {
                        let txid = hex::encode(reader.read_reverse(32)?);
                        if known.insert(txid.clone()) {
                            beef.txs.push(BeefTx {
                                txid,
                                tx: None,
                                bump_index: None,
                                data_format: TxDataFormat::TxidOnly,
                            });
                        }
                        continue;
                    }
                    1 => (Transaction::read(&mut reader)?, TxDataFormat::RawTxAndBumpIndex),
                    _ => (Transaction::read(&mut reader)?, TxDataFormat::RawTx),
                }
            } else {
                (Transaction::read(&mut reader)?, TxDataFormat::RawTx)
            };

            let has_bump = match (version, data_format) {
                (BEEF_V2, TxDataFormat::RawTxAndBumpIndex) => true,
                (BEEF_V2, _) => false,
                _ => reader.read_u8()? != 0,
            };
            let bump_index = if has_bump {
                let index = reader.read_var_int()? as usize;
                if index >= beef.bumps.len() {
                    return Err(BeefError::InvalidBumpIndex {
                        index,
                        len: beef.bumps.len(),
                    });
                }
                Some(index)
            } else {
                None
            };

            let txid = tx.txid()?;
            if known.contains(&txid) {
                // producers in the wild repeat transactions; first wins
                continue;
            }

            if let Some(index) = bump_index {
                if !bump_contains(&beef.bumps[index], &txid) {
                    return Err(BeefError::BumpMissingTxid(txid));
                }
                tx.merkle_path = Some(beef.bumps[index].clone());
            } else {
                // unmined: every parent must already be in the bundle
                for input in &tx.inputs {
                    let parent = input.source_txid_hex()?;
                    if !known.contains(&parent) {
                        return Err(BeefError::DanglingReference {
                            child: txid,
                            parent,
                        });
                    }
                }
            }

            for input in &mut tx.inputs {
                if let Some(parent) = &input.source_txid {
                    if let Some(source) = by_txid.get(parent) {
                        input.source_transaction = Some(source.clone());
                    }
                }
            }

            let tx = Arc::new(tx);
            by_txid.insert(txid.clone(), tx.clone());
            known.insert(txid.clone());
            let data_format = if bump_index.is_some() {
                TxDataFormat::RawTxAndBumpIndex
            } else {
                TxDataFormat::RawTx
            };
            beef.txs.push(BeefTx {
                txid,
                tx: Some(tx),
                bump_index,
                data_format,
            });
        }

        Ok(beef)
    }

    /// Atomic framing: prefix, subject txid, then the bundle.
    pub fn to_binary_atomic(&self, subject_txid: &str) -> BeefResult<Vec<u8>> {
        if self.find_txid(subject_txid).is_none() {
            return Err(BeefError::SubjectMissing(subject_txid.to_string()));
        }
        let mut w = Writer::new();
        w.write_u32_le(ATOMIC_BEEF);
        w.write_reverse(&decode_txid(subject_txid)?);
        w.write_bytes(&self.to_binary()?);
        Ok(w.into_bytes())
    }

    /// Parse an Atomic BEEF, returning the bundle and the subject txid.
    /// The subject must exist inside the bundle.
    pub fn from_binary_atomic(bytes: &[u8]) -> BeefResult<(Self, String)> {
        let mut reader = Reader::new(bytes);
        let prefix = reader.read_u32_le()?;
        if prefix != ATOMIC_BEEF {
            return Err(BeefError::UnknownVersion(prefix));
        }
        let subject = hex::encode(reader.read_reverse(32)?);
        let beef = Self::from_binary(reader.read_bytes(reader.remaining())?)?;
        if beef.find_txid(&subject).is_none() {
            return Err(BeefError::SubjectMissing(subject));
        }
        Ok((beef, subject))
    }

    /// Check every BUMP root against the chain oracle.
    pub async fn verify(&self, chain_tracker: &dyn ChainTracker) -> BeefResult<bool> {
        for entry in &self.txs {
            let Some(index) = entry.bump_index else {
                continue;
            };
            let bump = &self.bumps[index];
            let valid = bump.verify(&entry.txid, chain_tracker).await?;
            if !valid {
                return Ok(false);
            }
        }
        Ok(true)
    }

    pub fn to_log_string(&self) -> String {
        format!(
            "BEEF 0x{:08x}: {} BUMPs, {} txs ({} txid-only)",
            self.version,
            self.bumps.len(),
            self.txs.len(),
            self.txs.iter().filter(|t| t.tx.is_none()).count()
        )
    }
}

fn bump_contains(bump: &MerklePath, txid: &str) -> bool {
    bump.path
        .first()
        .map(|leaves| leaves.iter().any(|l| l.hash.as_deref() == Some(txid)))
        .unwrap_or(false)
}

fn decode_txid(txid: &str) -> BeefResult<Vec<u8>> {
    let bytes = hex::decode(txid)
        .map_err(|e| BeefError::Transaction(TransactionError::InvalidTxid(e.to_string())))?;
    if bytes.len() != 32 {
        return Err(BeefError::Transaction(TransactionError::InvalidTxid(
            format!("txid must be 32 bytes, got {}", bytes.len()),
        )));
    }
    Ok(bytes)
}

impl Transaction {
    /// Bundle this transaction with its ancestry and proofs.
    pub fn to_beef(&self, version: u32) -> BeefResult<Beef> {
        let mut beef = Beef::new(version);
        beef.merge_transaction(&Arc::new(self.clone()))?;
        Ok(beef)
    }

    /// Atomic BEEF with this transaction as the subject.
    pub fn to_atomic_beef(&self, version: u32) -> BeefResult<Vec<u8>> {
        let beef = self.to_beef(version)?;
        beef.to_binary_atomic(&self.txid()?)
    }

    /// Extract `txid` from a serialized BEEF, ancestry linked.
    pub fn from_beef(bytes: &[u8], txid: &str) -> BeefResult<Arc<Transaction>> {
        let beef = Beef::from_binary(bytes)?;
        beef.find_transaction(txid)
            .ok_or_else(|| BeefError::SubjectMissing(txid.to_string()))
    }

    /// Extract the subject of an Atomic BEEF.
    pub fn from_atomic_beef(bytes: &[u8]) -> BeefResult<Arc<Transaction>> {
        let (beef, subject) = Beef::from_binary_atomic(bytes)?;
        beef.find_transaction(&subject)
            .ok_or(BeefError::SubjectMissing(subject))
    }
}
