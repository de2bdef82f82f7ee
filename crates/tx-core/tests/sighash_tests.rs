//! Sighash scope behavior across transaction mutations.

use std::sync::Arc;

use tx_core::crypto;
use tx_core::script::templates::{P2pkh, UnlockingScriptTemplate};
use tx_core::script::{Interpreter, Limits, Script, SpendContext};
use tx_core::transaction::sighash::SighashScope;
use tx_core::transaction::{Transaction, TransactionInput, TransactionOutput};

fn key(tag: u8) -> [u8; 32] {
    let mut k = [0u8; 32];
    k[31] = tag;
    k
}

fn lock_for(tag: u8) -> Script {
    let public_key = crypto::derive_public_key(&key(tag)).unwrap();
    P2pkh::lock_from_public_key(&public_key).unwrap()
}

fn source_for(tag: u8, satoshis: u64) -> Arc<Transaction> {
    let mut tx = Transaction::new();
    let mut input = TransactionInput::from_outpoint(format!("{tag:02x}").repeat(32), 0);
    input.unlocking_script = Some(Script::from_hex("51").unwrap());
    tx.add_input(input);
    tx.add_output(TransactionOutput::new(satoshis, lock_for(tag)));
    Arc::new(tx)
}

fn spend_input(tag: u8, source: &Arc<Transaction>) -> TransactionInput {
    TransactionInput::from_source(source.clone(), 0, Arc::new(P2pkh::unlock(key(tag))))
}

/// Runs input 0's materialized unlocking script against its source lock.
fn input0_still_valid(tx: &Transaction) -> bool {
    let unlocking = tx.inputs[0].unlocking_script.as_ref().unwrap();
    let source_output = tx.inputs[0].source_output().unwrap();
    let ctx = SpendContext {
        tx,
        input_index: 0,
        source_satoshis: source_output.satoshis.unwrap(),
    };
    Interpreter::new(Limits::default())
        .evaluate(unlocking, &source_output.locking_script, Some(&ctx))
        .is_ok()
}

#[tokio::test]
async fn single_anyonecanpay_survives_added_inputs() {
    let source_a = source_for(1, 4000);
    let source_b = source_for(2, 3000);

    let mut tx = Transaction::new();
    tx.add_input(spend_input(1, &source_a));
    tx.add_input(spend_input(2, &source_b));
    tx.add_output(TransactionOutput::new(3500, lock_for(3)));
    tx.add_output(TransactionOutput::new(3000, lock_for(4)));

    // sign input 0 committing only to itself and output 0
    let unlocker = P2pkh::unlock_with_scope(key(1), SighashScope::Single, true);
    let script = unlocker.sign(&tx, 0).await.unwrap();
    tx.inputs[0].unlocking_script = Some(script);
    tx.inputs[0].unlocking_script_template = None;
    assert!(input0_still_valid(&tx));

    // a third input appended after the fact leaves the signature valid
    let source_c = source_for(5, 1000);
    tx.add_input(spend_input(5, &source_c));
    assert!(input0_still_valid(&tx));

    // changing the uncommitted output leaves it valid too
    tx.outputs[1].satoshis = Some(2999);
    assert!(input0_still_valid(&tx));

    // but the committed output (same index as the input) is load-bearing
    tx.outputs[0].satoshis = Some(3499);
    assert!(!input0_still_valid(&tx));
}

#[tokio::test]
async fn sighash_all_breaks_on_any_output_change() {
    let source = source_for(1, 4000);
    let mut tx = Transaction::new();
    tx.add_input(spend_input(1, &source));
    tx.add_output(TransactionOutput::new(1500, lock_for(3)));
    tx.add_output(TransactionOutput::new(2000, lock_for(4)));

    let script = P2pkh::unlock(key(1)).sign(&tx, 0).await.unwrap();
    tx.inputs[0].unlocking_script = Some(script);
    tx.inputs[0].unlocking_script_template = None;
    assert!(input0_still_valid(&tx));

    tx.outputs[1].satoshis = Some(1999);
    assert!(!input0_still_valid(&tx));
}

#[tokio::test]
async fn sighash_all_breaks_on_added_input() {
    let source_a = source_for(1, 4000);
    let source_b = source_for(2, 3000);

    let mut tx = Transaction::new();
    tx.add_input(spend_input(1, &source_a));
    tx.add_output(TransactionOutput::new(3999, lock_for(3)));

    let script = P2pkh::unlock(key(1)).sign(&tx, 0).await.unwrap();
    tx.inputs[0].unlocking_script = Some(script);
    tx.inputs[0].unlocking_script_template = None;
    assert!(input0_still_valid(&tx));

    tx.add_input(spend_input(2, &source_b));
    assert!(!input0_still_valid(&tx));
}
