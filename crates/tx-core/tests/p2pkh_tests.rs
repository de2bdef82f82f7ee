//! End-to-end P2PKH spends: build, solve fees, sign, verify.

use std::sync::Arc;

use tx_core::chain::{ChainTracker, ChainTrackerResult};
use tx_core::crypto;
use tx_core::script::templates::P2pkh;
use tx_core::script::Script;
use tx_core::transaction::merkle_path::{MerklePath, PathLeaf};
use tx_core::transaction::spv::VerifyMode;
use tx_core::transaction::{
    ChangeDistribution, FixedFee, SatoshisPerKilobyte, Transaction, TransactionInput,
    TransactionOutput,
};

use async_trait::async_trait;

struct AcceptRoot(String, u32);

#[async_trait]
impl ChainTracker for AcceptRoot {
    async fn current_height(&self) -> ChainTrackerResult<u32> {
        Ok(self.1)
    }
    async fn is_valid_root_for_height(&self, root: &str, height: u32) -> ChainTrackerResult<bool> {
        Ok(root == self.0 && height == self.1)
    }
}

fn private_key() -> [u8; 32] {
    let mut k = [0u8; 32];
    k[31] = 0x11;
    k
}

fn lock() -> Script {
    let public_key = crypto::derive_public_key(&private_key()).unwrap();
    P2pkh::lock_from_public_key(&public_key).unwrap()
}

/// A mined source holding `satoshis` at our key, plus an oracle that
/// accepts its inclusion proof.
fn mined_source(satoshis: u64) -> (Arc<Transaction>, AcceptRoot) {
    let mut tx = Transaction::new();
    let mut funding_input = TransactionInput::from_outpoint("55".repeat(32), 0);
    funding_input.unlocking_script = Some(Script::from_hex("51").unwrap());
    tx.add_input(funding_input);
    tx.add_output(TransactionOutput::new(satoshis, lock()));

    let txid = tx.txid().unwrap();
    let path = MerklePath::new(
        814_435,
        vec![vec![PathLeaf::txid(0, txid.clone()), PathLeaf::duplicate(1)]],
    );
    let root = path.compute_root(&txid).unwrap();
    tx.merkle_path = Some(path);
    (Arc::new(tx), AcceptRoot(root, 814_435))
}

fn spend_shape(source: &Arc<Transaction>) -> Transaction {
    let mut tx = Transaction::new();
    tx.add_input(TransactionInput::from_source(
        source.clone(),
        0,
        Arc::new(P2pkh::unlock(private_key())),
    ));
    tx.add_output(TransactionOutput::new(1000, lock()));
    tx.add_output(TransactionOutput::change(lock()));
    tx
}

#[tokio::test]
async fn default_fee_model_change() {
    // 4000-sat input, 1000-sat output, one change output at 1 sat/kB:
    // the ~225-byte estimate costs 1 satoshi, leaving 2999 in change
    let (source, _) = mined_source(4000);
    let mut tx = spend_shape(&source);

    tx.fee(&SatoshisPerKilobyte::default(), ChangeDistribution::Equal)
        .await
        .unwrap();

    assert_eq!(tx.outputs[1].satoshis, Some(2999));
    assert_eq!(tx.get_fee().unwrap(), 1);
}

#[tokio::test]
async fn custom_fee_and_idempotence() {
    let (source, _) = mined_source(4000);
    let mut tx = spend_shape(&source);
    let model = FixedFee::new(1033);

    tx.fee(&model, ChangeDistribution::Equal).await.unwrap();
    assert_eq!(tx.outputs[1].satoshis, Some(1967));

    // solving again changes nothing
    tx.fee(&model, ChangeDistribution::Equal).await.unwrap();
    assert_eq!(tx.outputs[1].satoshis, Some(1967));
    assert_eq!(tx.get_fee().unwrap(), 1033);
}

#[tokio::test]
async fn signed_spend_verifies() {
    let (source, oracle) = mined_source(4000);
    let mut tx = spend_shape(&source);

    tx.fee(&SatoshisPerKilobyte::default(), ChangeDistribution::Equal)
        .await
        .unwrap();

    let unsigned_txid = tx.txid().unwrap();
    tx.sign().await.unwrap();
    assert_ne!(tx.txid().unwrap(), unsigned_txid);

    // signature and public key, nothing else
    let unlocking = tx.inputs[0].unlocking_script.as_ref().unwrap();
    assert_eq!(unlocking.chunks.len(), 2);
    assert!(unlocking.is_push_only());

    tx.verify(&oracle, VerifyMode::Full).await.unwrap();
}

#[tokio::test]
async fn fee_conservation_over_strategies() {
    // remainder 50_000 - 1000 - 1000 = 48_000 splits evenly over the
    // three change outputs, so both strategies land the fee exactly
    for distribution in [ChangeDistribution::Equal, ChangeDistribution::Random] {
        let (source, _) = mined_source(50_000);
        let mut tx = spend_shape(&source);
        tx.add_output(TransactionOutput::change(lock()));
        tx.add_output(TransactionOutput::change(lock()));

        tx.fee(&FixedFee::new(1000), distribution).await.unwrap();

        let total_out: u64 = tx.outputs.iter().map(|o| o.satoshis.unwrap()).sum();
        assert_eq!(50_000 - total_out, 1000, "{distribution:?}");
    }
}

#[tokio::test]
async fn equal_change_residual_goes_to_fee() {
    // remainder 48_250 over three outputs leaves a 1-sat residual that
    // raises the realized fee; a random partition sums exactly
    let (source, _) = mined_source(50_000);
    let mut tx = spend_shape(&source);
    tx.add_output(TransactionOutput::change(lock()));
    tx.add_output(TransactionOutput::change(lock()));

    tx.fee(&FixedFee::new(750), ChangeDistribution::Equal)
        .await
        .unwrap();

    assert_eq!(tx.get_fee().unwrap(), 751);
    for output in &tx.outputs[1..] {
        assert_eq!(output.satoshis, Some(48_250 / 3));
    }

    let (source, _) = mined_source(50_000);
    let mut tx = spend_shape(&source);
    tx.add_output(TransactionOutput::change(lock()));
    tx.add_output(TransactionOutput::change(lock()));
    tx.fee(&FixedFee::new(750), ChangeDistribution::Random)
        .await
        .unwrap();
    assert_eq!(tx.get_fee().unwrap(), 750);
}

#[tokio::test]
async fn serialization_round_trip_after_signing() {
    let (source, _) = mined_source(4000);
    let mut tx = spend_shape(&source);
    tx.fee(&SatoshisPerKilobyte::default(), ChangeDistribution::Equal)
        .await
        .unwrap();
    tx.sign().await.unwrap();

    let bytes = tx.to_binary().unwrap();
    let back = Transaction::from_binary(&bytes).unwrap();
    assert_eq!(back.to_binary().unwrap(), bytes);
    assert_eq!(back.txid().unwrap(), tx.txid().unwrap());

    let offsets = Transaction::parse_script_offsets(&bytes).unwrap();
    assert_eq!(offsets.inputs.len(), 1);
    assert_eq!(offsets.outputs.len(), 2);
    let slice = &offsets.inputs[0];
    assert_eq!(
        &bytes[slice.offset..slice.offset + slice.length],
        tx.inputs[0]
            .unlocking_script
            .as_ref()
            .unwrap()
            .to_binary()
            .as_slice()
    );
}
