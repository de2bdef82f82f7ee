//! BEEF bundle round-trips, ordering, and Atomic framing.

use std::sync::Arc;

use tx_core::crypto;
use tx_core::script::Script;
use tx_core::transaction::beef::{Beef, BeefError, BEEF_V1, BEEF_V2};
use tx_core::transaction::merkle_path::{MerklePath, PathLeaf};
use tx_core::transaction::{Transaction, TransactionInput, TransactionOutput};

fn lock() -> Script {
    Script::from_asm("OP_DUP OP_HASH160 1111111111111111111111111111111111111111 OP_EQUALVERIFY OP_CHECKSIG").unwrap()
}

fn mined(satoshis: u64, seed: u8) -> Arc<Transaction> {
    let mut tx = Transaction::new();
    let mut input = TransactionInput::from_outpoint(format!("{seed:02x}").repeat(32), 0);
    input.unlocking_script = Some(Script::from_hex("5151").unwrap());
    tx.add_input(input);
    tx.add_output(TransactionOutput::new(satoshis, lock()));

    let txid = tx.txid().unwrap();
    let sibling = hex::encode(crypto::sha256d(&[seed]));
    tx.merkle_path = Some(MerklePath::new(
        814_435,
        vec![vec![PathLeaf::txid(0, txid), PathLeaf::hash(1, sibling)]],
    ));
    Arc::new(tx)
}

fn spend(source: &Arc<Transaction>, satoshis: u64) -> Transaction {
    let mut tx = Transaction::new();
    let mut input = TransactionInput::from_outpoint(source.txid().unwrap(), 0);
    input.source_transaction = Some(source.clone());
    input.unlocking_script = Some(Script::from_hex("51").unwrap());
    tx.add_input(input);
    tx.add_output(TransactionOutput::new(satoshis, lock()));
    tx
}

#[test]
fn decode_reencode_is_byte_exact() {
    // three-deep chain: mined grandparent, unmined parent and child
    let grandparent = mined(10_000, 0x0a);
    let parent = Arc::new(spend(&grandparent, 9_000));
    let child = spend(&parent, 8_000);

    for version in [BEEF_V1, BEEF_V2] {
        let bytes = child.to_beef(version).unwrap().to_binary().unwrap();
        let decoded = Beef::from_binary(&bytes).unwrap();
        assert_eq!(decoded.to_binary().unwrap(), bytes, "version {version:#x}");
    }
}

#[test]
fn merkle_root_of_contained_leaf() {
    let source = mined(10_000, 0x0b);
    let tx = spend(&source, 9_000);
    let bytes = tx.to_beef(BEEF_V1).unwrap().to_binary().unwrap();

    let decoded = Beef::from_binary(&bytes).unwrap();
    assert_eq!(decoded.bumps.len(), 1);
    assert_eq!(decoded.bumps[0].block_height, 814_435);

    let source_txid = source.txid().unwrap();
    let expected = source
        .merkle_path
        .as_ref()
        .unwrap()
        .compute_root(&source_txid)
        .unwrap();
    assert_eq!(decoded.bumps[0].compute_root(&source_txid).unwrap(), expected);
}

#[test]
fn topological_order_holds() {
    let grandparent = mined(10_000, 0x0c);
    let parent = Arc::new(spend(&grandparent, 9_000));
    let child = spend(&parent, 8_000);

    let bytes = child.to_beef(BEEF_V1).unwrap().to_binary().unwrap();
    let decoded = Beef::from_binary(&bytes).unwrap();

    // every unmined transaction's parents appear earlier
    for (i, entry) in decoded.txs.iter().enumerate() {
        if entry.bump_index.is_some() {
            continue;
        }
        let tx = entry.tx.as_ref().unwrap();
        for input in &tx.inputs {
            let parent_txid = input.source_txid_hex().unwrap();
            let parent_pos = decoded
                .txs
                .iter()
                .position(|t| t.txid == parent_txid)
                .expect("parent present");
            assert!(parent_pos < i);
        }
    }
}

#[test]
fn duplicate_ancestor_encoded_once() {
    let source = mined(10_000, 0x0d);

    // both inputs draw on the same ancestor
    let mut tx = Transaction::new();
    for _ in 0..2 {
        let mut input = TransactionInput::from_outpoint(source.txid().unwrap(), 0);
        input.source_transaction = Some(source.clone());
        input.unlocking_script = Some(Script::from_hex("51").unwrap());
        tx.add_input(input);
    }
    tx.add_output(TransactionOutput::new(19_000, lock()));

    let beef = tx.to_beef(BEEF_V1).unwrap();
    assert_eq!(beef.txs.len(), 2);
    assert_eq!(beef.bumps.len(), 1);
}

#[test]
fn atomic_subject_selection() {
    let source = mined(10_000, 0x0e);
    let a = Arc::new(spend(&source, 9_000));
    let b = spend(&a, 8_000);

    let beef_bytes = b.to_beef(BEEF_V1).unwrap().to_binary().unwrap();
    let a_txid = a.txid().unwrap();
    let b_txid = b.txid().unwrap();

    assert_eq!(
        Transaction::from_beef(&beef_bytes, &a_txid)
            .unwrap()
            .txid()
            .unwrap(),
        a_txid
    );
    assert_eq!(
        Transaction::from_beef(&beef_bytes, &b_txid)
            .unwrap()
            .txid()
            .unwrap(),
        b_txid
    );
    assert!(matches!(
        Transaction::from_beef(&beef_bytes, &"00".repeat(32)).unwrap_err(),
        BeefError::SubjectMissing(_)
    ));
}

#[test]
fn atomic_bracket_preserves_subject() {
    let source = mined(10_000, 0x0f);
    let tx = spend(&source, 9_000);
    let txid = tx.txid().unwrap();

    let atomic = tx.to_atomic_beef(BEEF_V1).unwrap();
    assert_eq!(&atomic[..4], &[0x01, 0x01, 0x01, 0x01]);

    let subject = Transaction::from_atomic_beef(&atomic).unwrap();
    assert_eq!(subject.txid().unwrap(), txid);
    // the subject comes back with its ancestry linked and proof attached
    let linked = subject.inputs[0].source_transaction.as_ref().unwrap();
    assert!(linked.merkle_path.is_some());
}

#[test]
fn truncated_bundles_rejected() {
    let source = mined(10_000, 0x10);
    let tx = spend(&source, 9_000);
    let bytes = tx.to_beef(BEEF_V1).unwrap().to_binary().unwrap();

    for cut in [2, 10, bytes.len() / 2, bytes.len() - 1] {
        assert!(Beef::from_binary(&bytes[..cut]).is_err(), "cut {cut}");
    }
}
