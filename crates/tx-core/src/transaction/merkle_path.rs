//! Merkle path
//!
//! Compact inclusion proof for transactions in a block (the BUMP
//! structure carried inside BEEF). Level 0 holds the proved txids and
//! their siblings; each higher level holds one sibling per proved
//! branch. Offsets pair even with odd; a duplicate leaf stands in for an
//! absent sibling at the right edge of an odd-sized level.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::chain::{ChainTracker, ChainTrackerError};
use crate::codec::{CodecError, Reader, Writer};
use crate::crypto;

/// Merkle path errors
#[derive(Debug, Error)]
pub enum MerklePathError {
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("txid {0} not found on the bottom level")]
    TxidNotFound(String),

    #[error("level {level} has no leaf at offset {offset}")]
    MissingLeaf { level: usize, offset: u32 },

    #[error("leaf at level {level} offset {offset} carries no hash")]
    MissingHash { level: usize, offset: u32 },

    #[error("invalid merkle path structure: {0}")]
    InvalidStructure(String),

    #[error("cannot combine paths: {0}")]
    CombineMismatch(String),

    #[error("chain tracker: {0}")]
    ChainTracker(#[from] ChainTrackerError),

    #[error("invalid hash hex: {0}")]
    InvalidHash(String),
}

pub type MerklePathResult<T> = Result<T, MerklePathError>;

/// One node of one level.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathLeaf {
    /// Position within the level.
    pub offset: u32,

    /// Node hash (hex, display order). Absent on duplicate leaves.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,

    /// Marks a bottom-level leaf holding a proved txid.
    #[serde(default)]
    pub txid: bool,

    /// The sibling equals the working hash (right edge of an odd level).
    #[serde(default)]
    pub duplicate: bool,
}

impl PathLeaf {
    pub fn hash(offset: u32, hash: impl Into<String>) -> Self {
        Self {
            offset,
            hash: Some(hash.into()),
            txid: false,
            duplicate: false,
        }
    }

    pub fn txid(offset: u32, hash: impl Into<String>) -> Self {
        Self {
            offset,
            hash: Some(hash.into()),
            txid: true,
            duplicate: false,
        }
    }

    pub fn duplicate(offset: u32) -> Self {
        Self {
            offset,
            hash: None,
            txid: false,
            duplicate: true,
        }
    }
}

const FLAG_DUPLICATE: u8 = 0x01;
const FLAG_TXID: u8 = 0x02;

/// Inclusion proof for one or more transactions of one block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MerklePath {
    #[serde(rename = "blockHeight")]
    pub block_height: u32,

    /// Levels bottom-up; `path[0]` is the transaction level.
    pub path: Vec<Vec<PathLeaf>>,
}

impl MerklePath {
    pub fn new(block_height: u32, path: Vec<Vec<PathLeaf>>) -> Self {
        Self { block_height, path }
    }

    /// Parse from a reader positioned at a BUMP: varint height, varint
    /// level count, then per level a varint leaf count and leaves as
    /// varint offset, flag byte, and hash unless the duplicate flag is
    /// set.
    pub fn read(reader: &mut Reader<'_>) -> MerklePathResult<Self> {
        let block_height = read_u32_var(reader, "block height")?;
        let levels = reader.read_var_int()? as usize;
        let mut path = Vec::with_capacity(levels);
        for _ in 0..levels {
            let n_leaves = reader.read_var_int()? as usize;
            let mut leaves = Vec::with_capacity(n_leaves);
            for _ in 0..n_leaves {
                let offset = read_u32_var(reader, "leaf offset")?;
                let flags = reader.read_u8()?;
                let duplicate = flags & FLAG_DUPLICATE != 0;
                let txid = flags & FLAG_TXID != 0;
                let hash = if duplicate {
                    None
                } else {
                    Some(hex::encode(reader.read_reverse(32)?))
                };
                leaves.push(PathLeaf {
                    offset,
                    hash,
                    txid,
                    duplicate,
                });
            }
            leaves.sort_by_key(|l| l.offset);
            path.push(leaves);
        }
        Ok(Self { block_height, path })
    }

    pub fn from_binary(bytes: &[u8]) -> MerklePathResult<Self> {
        let mut reader = Reader::new(bytes);
        let path = Self::read(&mut reader)?;
        Ok(path)
    }

    pub fn write(&self, writer: &mut Writer) -> MerklePathResult<()> {
        writer.write_var_int(self.block_height as u64);
        writer.write_var_int(self.path.len() as u64);
        for (level, leaves) in self.path.iter().enumerate() {
            writer.write_var_int(leaves.len() as u64);
            for leaf in leaves {
                writer.write_var_int(leaf.offset as u64);
                let mut flags = 0u8;
                if leaf.duplicate {
                    flags |= FLAG_DUPLICATE;
                }
                if leaf.txid {
                    flags |= FLAG_TXID;
                }
                writer.write_u8(flags);
                if !leaf.duplicate {
                    let hash = leaf.hash.as_ref().ok_or(MerklePathError::MissingHash {
                        level,
                        offset: leaf.offset,
                    })?;
                    writer.write_reverse(&decode_hash(hash)?);
                }
            }
        }
        Ok(())
    }

    pub fn to_binary(&self) -> MerklePathResult<Vec<u8>> {
        let mut writer = Writer::new();
        self.write(&mut writer)?;
        Ok(writer.into_bytes())
    }

    /// Every proved txid on the bottom level.
    pub fn txids(&self) -> Vec<&str> {
        self.path
            .first()
            .map(|leaves| {
                leaves
                    .iter()
                    .filter(|l| l.txid)
                    .filter_map(|l| l.hash.as_deref())
                    .collect()
            })
            .unwrap_or_default()
    }

    fn leaf_at(&self, level: usize, offset: u32) -> Option<&PathLeaf> {
        self.path.get(level)?.iter().find(|l| l.offset == offset)
    }

    /// Walk bottom-up from `txid` to the block's merkle root.
    pub fn compute_root(&self, txid: &str) -> MerklePathResult<String> {
        let start = self
            .path
            .first()
            .and_then(|leaves| leaves.iter().find(|l| l.hash.as_deref() == Some(txid)))
            .ok_or_else(|| MerklePathError::TxidNotFound(txid.to_string()))?;

        let mut offset = start.offset;
        let mut working = decode_hash(txid)?;

        for level in 0..self.path.len() {
            // even offsets pair rightward, odd leftward
            let sibling_offset = offset ^ 1;
            let sibling = self
                .leaf_at(level, sibling_offset)
                .ok_or(MerklePathError::MissingLeaf {
                    level,
                    offset: sibling_offset,
                })?;

            let sibling_hash = if sibling.duplicate {
                working.clone()
            } else {
                decode_hash(sibling.hash.as_ref().ok_or(MerklePathError::MissingHash {
                    level,
                    offset: sibling_offset,
                })?)?
            };

            working = if offset & 1 == 0 {
                combine_hashes(&working, &sibling_hash)
            } else {
                combine_hashes(&sibling_hash, &working)
            };
            offset >>= 1;
        }

        Ok(encode_hash(&working))
    }

    /// Root computed from the first proved txid, for comparing paths.
    pub fn root(&self) -> MerklePathResult<String> {
        let txid = self
            .txids()
            .first()
            .map(|t| t.to_string())
            .or_else(|| {
                self.path
                    .first()
                    .and_then(|l| l.iter().find_map(|leaf| leaf.hash.clone()))
            })
            .ok_or_else(|| {
                MerklePathError::InvalidStructure("path proves no txid".to_string())
            })?;
        self.compute_root(&txid)
    }

    /// Check the computed root against the chain oracle.
    pub async fn verify(
        &self,
        txid: &str,
        chain_tracker: &dyn ChainTracker,
    ) -> MerklePathResult<bool> {
        let root = self.compute_root(txid)?;
        Ok(chain_tracker
            .is_valid_root_for_height(&root, self.block_height)
            .await?)
    }

    /// Merge another proof of the same block into this one. Levels are
    /// unioned by offset; the same offset with different hashes is a
    /// conflict.
    pub fn combine(&mut self, other: &MerklePath) -> MerklePathResult<()> {
        if self.block_height != other.block_height {
            return Err(MerklePathError::CombineMismatch(format!(
                "block heights differ: {} vs {}",
                self.block_height, other.block_height
            )));
        }
        if self.path.len() != other.path.len() {
            return Err(MerklePathError::CombineMismatch(
                "level counts differ".to_string(),
            ));
        }
        if self.root()? != other.root()? {
            return Err(MerklePathError::CombineMismatch(
                "computed roots differ".to_string(),
            ));
        }

        for (level, (ours, theirs)) in
            self.path.iter_mut().zip(other.path.iter()).enumerate()
        {
            for leaf in theirs {
                match ours.iter_mut().find(|l| l.offset == leaf.offset) {
                    None => ours.push(leaf.clone()),
                    Some(existing) => {
                        if existing.hash.is_some()
                            && leaf.hash.is_some()
                            && existing.hash != leaf.hash
                        {
                            return Err(MerklePathError::CombineMismatch(format!(
                                "conflicting hashes at level {level} offset {}",
                                leaf.offset
                            )));
                        }
                        // a hash-bearing or txid-marked copy wins
                        if existing.hash.is_none() {
                            existing.hash = leaf.hash.clone();
                            existing.duplicate = leaf.duplicate;
                        }
                        existing.txid |= leaf.txid;
                    }
                }
            }
            ours.sort_by_key(|l| l.offset);
        }
        Ok(())
    }
}

fn read_u32_var(reader: &mut Reader<'_>, what: &str) -> MerklePathResult<u32> {
    let v = reader.read_var_int()?;
    u32::try_from(v)
        .map_err(|_| MerklePathError::InvalidStructure(format!("{what} {v} exceeds u32")))
}

/// Display-order hex to wire-order bytes.
fn decode_hash(hash: &str) -> MerklePathResult<Vec<u8>> {
    let bytes = hex::decode(hash).map_err(|e| MerklePathError::InvalidHash(e.to_string()))?;
    if bytes.len() != 32 {
        return Err(MerklePathError::InvalidHash(format!(
            "expected 32 bytes, got {}",
            bytes.len()
        )));
    }
    Ok(bytes.into_iter().rev().collect())
}

fn encode_hash(wire: &[u8]) -> String {
    hex::encode(wire.iter().rev().copied().collect::<Vec<u8>>())
}

fn combine_hashes(left: &[u8], right: &[u8]) -> Vec<u8> {
    let mut concat = Vec::with_capacity(64);
    concat.extend_from_slice(left);
    concat.extend_from_slice(right);
    crypto::sha256d(&concat)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn h(seed: u8) -> String {
        hex::encode([seed; 32])
    }

    fn parent(left: &str, right: &str) -> String {
        encode_hash(&combine_hashes(
            &decode_hash(left).unwrap(),
            &decode_hash(right).unwrap(),
        ))
    }

    /// Four-leaf block: txids t0..t3, proving t1.
    fn four_leaf_path() -> (MerklePath, String) {
        let (t0, t1, t2, t3) = (h(0), h(1), h(2), h(3));
        let n01 = parent(&t0, &t1);
        let n23 = parent(&t2, &t3);
        let root = parent(&n01, &n23);

        let path = MerklePath::new(
            814_435,
            vec![
                vec![PathLeaf::hash(0, t0), PathLeaf::txid(1, t1)],
                vec![PathLeaf::hash(1, n23)],
            ],
        );
        (path, root)
    }

    #[test]
    fn test_compute_root() {
        let (path, root) = four_leaf_path();
        assert_eq!(path.compute_root(&h(1)).unwrap(), root);
    }

    #[test]
    fn test_unknown_txid_rejected() {
        let (path, _) = four_leaf_path();
        assert!(matches!(
            path.compute_root(&h(9)).unwrap_err(),
            MerklePathError::TxidNotFound(_)
        ));
    }

    #[test]
    fn test_duplicate_leaf_at_odd_right_edge() {
        // three-leaf block: t2 at offset 2 pairs with a duplicate
        let (t0, t1, t2) = (h(0), h(1), h(2));
        let n01 = parent(&t0, &t1);
        let n22 = parent(&t2, &t2);
        let root = parent(&n01, &n22);

        let path = MerklePath::new(
            100,
            vec![
                vec![PathLeaf::txid(2, t2.clone()), PathLeaf::duplicate(3)],
                vec![PathLeaf::hash(0, n01)],
            ],
        );
        assert_eq!(path.compute_root(&t2).unwrap(), root);
    }

    #[test]
    fn test_binary_round_trip() {
        let (path, _) = four_leaf_path();
        let bytes = path.to_binary().unwrap();
        let back = MerklePath::from_binary(&bytes).unwrap();
        assert_eq!(back, path);
        assert_eq!(back.to_binary().unwrap(), bytes);
    }

    #[test]
    fn test_truncated_binary_rejected() {
        let (path, _) = four_leaf_path();
        let bytes = path.to_binary().unwrap();
        let err = MerklePath::from_binary(&bytes[..bytes.len() - 5]).unwrap_err();
        assert!(matches!(err, MerklePathError::Codec(_)));
    }

    #[test]
    fn test_combine_unions_leaves() {
        // proofs for t1 and t2 of the same block merge into one path
        let (t0, t1, t2, t3) = (h(0), h(1), h(2), h(3));
        let n01 = parent(&t0, &t1);
        let n23 = parent(&t2, &t3);

        let mut proof_t1 = MerklePath::new(
            7,
            vec![
                vec![PathLeaf::hash(0, t0.clone()), PathLeaf::txid(1, t1.clone())],
                vec![PathLeaf::hash(1, n23.clone())],
            ],
        );
        let proof_t2 = MerklePath::new(
            7,
            vec![
                vec![PathLeaf::txid(2, t2.clone()), PathLeaf::hash(3, t3.clone())],
                vec![PathLeaf::hash(0, n01.clone())],
            ],
        );

        proof_t1.combine(&proof_t2).unwrap();
        assert_eq!(proof_t1.path[0].len(), 4);
        assert_eq!(proof_t1.path[1].len(), 2);
        // the merged path proves both txids
        let root = proof_t1.compute_root(&t1).unwrap();
        assert_eq!(proof_t1.compute_root(&t2).unwrap(), root);
    }

    #[test]
    fn test_combine_rejects_height_mismatch() {
        let (mut a, _) = four_leaf_path();
        let (mut b, _) = four_leaf_path();
        b.block_height += 1;
        assert!(matches!(
            a.combine(&b).unwrap_err(),
            MerklePathError::CombineMismatch(_)
        ));
    }

    #[test]
    fn test_combine_rejects_conflicting_hash() {
        let (t0, t1, t2, t3) = (h(0), h(1), h(2), h(3));
        let n23 = parent(&t2, &t3);
        let mut a = MerklePath::new(
            7,
            vec![
                vec![PathLeaf::hash(0, t0.clone()), PathLeaf::txid(1, t1.clone())],
                vec![PathLeaf::hash(1, n23.clone())],
            ],
        );
        // same offsets, corrupted sibling hash
        let b = MerklePath::new(
            7,
            vec![
                vec![PathLeaf::hash(0, h(9)), PathLeaf::txid(1, t1)],
                vec![PathLeaf::hash(1, n23)],
            ],
        );
        assert!(matches!(
            a.combine(&b).unwrap_err(),
            MerklePathError::CombineMismatch(_)
        ));
    }

    #[test]
    fn test_combine_associativity() {
        let (t0, t1, t2, t3) = (h(0), h(1), h(2), h(3));
        let n01 = parent(&t0, &t1);
        let n23 = parent(&t2, &t3);

        let p0 = MerklePath::new(
            7,
            vec![
                vec![PathLeaf::txid(0, t0.clone()), PathLeaf::hash(1, t1.clone())],
                vec![PathLeaf::hash(1, n23.clone())],
            ],
        );
        let p1 = MerklePath::new(
            7,
            vec![
                vec![PathLeaf::hash(0, t0.clone()), PathLeaf::txid(1, t1.clone())],
                vec![PathLeaf::hash(1, n23.clone())],
            ],
        );
        let p2 = MerklePath::new(
            7,
            vec![
                vec![PathLeaf::txid(2, t2.clone()), PathLeaf::hash(3, t3.clone())],
                vec![PathLeaf::hash(0, n01.clone())],
            ],
        );

        let mut left = p0.clone();
        left.combine(&p1).unwrap();
        left.combine(&p2).unwrap();

        let mut right_inner = p1.clone();
        right_inner.combine(&p2).unwrap();
        let mut right = p0.clone();
        right.combine(&right_inner).unwrap();

        assert_eq!(left, right);
    }
}
