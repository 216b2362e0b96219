//! Bitcoin transfer, speed-up and cancel operations against in-memory
//! services, checking the signed transactions that reach the relay.

mod common;

use chain_btc::transaction::{decode_transaction, sign_p2wpkh_transaction, DecodedTransaction};
use chain_btc::{BtcNetwork, Output};

use common::*;
use wallet_ops::error::OperationError;
use wallet_ops::operation::btc;
use wallet_ops::{Chain, FeeOptions, NotActionableReason, Simulation, State};

const RECEIVER: &str = "bc1qw508d6qejxtdg4y5r3zarvary0c5xw7kv8f3t4";

fn funding() -> Output {
    Output::unspent("ab".repeat(32), 0, 100_000, btc_address())
}

fn funded_harness() -> Harness {
    let harness = Harness::default();
    {
        let mut store = harness.store.state.lock().unwrap();
        store.unspent = vec![funding()];
        store.outputs = vec![funding()];
    }
    harness
}

fn posted(harness: &Harness, index: usize) -> DecodedTransaction {
    decode_transaction(&harness.relay.posted()[index].1, BtcNetwork::Mainnet).unwrap()
}

/// A pending transfer of 50 000 sat at 10 sat/vB, spending [`funding`].
fn pending_transfer() -> String {
    sign_p2wpkh_transaction(
        &[funding()],
        &btc_address(),
        RECEIVER,
        50_000,
        1_410,
        &BTC_KEY,
        BtcNetwork::Mainnet,
    )
    .unwrap()
    .raw_hex
}

// ─── Transfers ──────────────────────────────────────────────────────

#[tokio::test]
async fn transfer_returns_change_and_marks_inputs_spent() {
    let harness = funded_harness();
    let operation = btc::transfer(
        &harness.services(),
        Chain::Bitcoin,
        &btc_address(),
        RECEIVER,
        &decimal("0.0005"),
    )
    .unwrap();

    let fee = operation.load_fee(FeeOptions::default()).await.unwrap();
    assert_eq!(fee.amount, decimal("0.0000141"));
    assert_eq!(
        operation.simulate().await.unwrap(),
        Simulation::BalanceChange {
            asset_id: "btc".into(),
            amount: decimal("-0.0005"),
        }
    );
    assert!(operation.start(pin()).await.unwrap().is_success());

    let sent = posted(&harness, 0);
    assert_eq!(sent.inputs.len(), 1);
    assert_eq!(sent.inputs[0].output_id(), funding().id);
    assert_eq!(sent.outputs[0].address.as_deref(), Some(RECEIVER));
    assert_eq!(sent.outputs[0].amount_sat, 50_000);
    assert_eq!(sent.outputs[1].address, Some(btc_address()));
    assert_eq!(sent.outputs[1].amount_sat, 48_590);

    let saved = harness.store.saved();
    assert_eq!(saved.len(), 1);
    assert_eq!(saved[0].spent_outputs, vec![funding().id]);
    assert_eq!(saved[0].fee_rate_sat_vb, Some(10));
    assert_eq!(saved[0].fee, Some(decimal("0.0000141")));
    let change = saved[0].change.clone().unwrap();
    assert_eq!(change.amount_sat, 48_590);
    assert_eq!(change.vout, 1);
}

#[tokio::test]
async fn transfer_beyond_balance_fails_the_fee_load() {
    let harness = funded_harness();
    let operation = btc::transfer(
        &harness.services(),
        Chain::Bitcoin,
        &btc_address(),
        RECEIVER,
        &decimal("0.001"),
    )
    .unwrap();
    let err = operation.load_fee(FeeOptions::default()).await.unwrap_err();
    assert!(matches!(err, OperationError::Btc(_)));
    assert!(matches!(operation.state(), State::Loading));
}

#[test]
fn transfer_to_a_testnet_address_is_refused() {
    let harness = funded_harness();
    let result = btc::transfer(
        &harness.services(),
        Chain::Bitcoin,
        &btc_address(),
        "tb1qw508d6qejxtdg4y5r3zarvary0c5xw7kxpjzsx",
        &decimal("0.0005"),
    );
    assert!(matches!(result, Err(wallet_ops::InitError::InvalidReceiver(_))));
}

#[tokio::test]
async fn failed_broadcast_cannot_be_resent() {
    let harness = funded_harness();
    harness.relay.state.lock().unwrap().post_failures = 1;
    let operation = btc::transfer(
        &harness.services(),
        Chain::Bitcoin,
        &btc_address(),
        RECEIVER,
        &decimal("0.0005"),
    )
    .unwrap();
    operation.load_fee(FeeOptions::default()).await.unwrap();

    let state = operation.start(pin()).await.unwrap();
    assert!(matches!(state, State::SendingFailed(_)));
    assert!(matches!(
        operation.resend().await,
        Err(OperationError::ResendUnavailable)
    ));
    assert!(!operation.info().supports_resend);
}

// ─── Speed-up ───────────────────────────────────────────────────────

#[tokio::test]
async fn speed_up_at_the_same_rate_is_not_actionable() {
    let harness = funded_harness();
    harness.store.state.lock().unwrap().unspent.clear();
    let operation = btc::speed_up(
        &harness.services(),
        Chain::Bitcoin,
        &btc_address(),
        &pending_transfer(),
        10,
    )
    .unwrap();

    operation.load_fee(FeeOptions::default()).await.unwrap();
    assert!(matches!(
        operation.state(),
        State::NotActionable(NotActionableReason::AlreadyFast)
    ));
    assert!(matches!(
        operation.start(pin()).await,
        Err(OperationError::NotReady(_))
    ));
    assert!(harness.relay.posted().is_empty());
}

#[tokio::test]
async fn speed_up_respends_the_original_input_at_the_new_rate() {
    let harness = funded_harness();
    harness.store.state.lock().unwrap().unspent.clear();
    harness.relay.state.lock().unwrap().network_fee.rate_sat_vb = 20;
    let operation = btc::speed_up(
        &harness.services(),
        Chain::Bitcoin,
        &btc_address(),
        &pending_transfer(),
        10,
    )
    .unwrap();
    assert_eq!(operation.info().to_address.as_deref(), Some(RECEIVER));

    let fee = operation.load_fee(FeeOptions::default()).await.unwrap();
    assert_eq!(fee.amount, decimal("0.0000282"));
    assert_eq!(
        operation.simulate().await.unwrap(),
        Simulation::BalanceChange {
            asset_id: "btc".into(),
            amount: decimal("-0.0005"),
        }
    );
    assert!(operation.start(pin()).await.unwrap().is_success());

    let sent = posted(&harness, 0);
    assert_eq!(sent.inputs[0].output_id(), funding().id);
    assert_eq!(sent.outputs[0].amount_sat, 50_000);
    assert_eq!(sent.outputs[1].amount_sat, 47_180);
    assert_eq!(harness.store.saved()[0].fee_rate_sat_vb, Some(20));
}

#[tokio::test]
async fn speed_up_without_the_spent_outputs_fails() {
    let harness = Harness::default();
    let operation = btc::speed_up(
        &harness.services(),
        Chain::Bitcoin,
        &btc_address(),
        &pending_transfer(),
        10,
    )
    .unwrap();
    assert!(operation.load_fee(FeeOptions::default()).await.is_err());
}

// ─── Cancel ─────────────────────────────────────────────────────────

#[tokio::test]
async fn cancel_returns_everything_to_the_sender() {
    let harness = funded_harness();
    let operation = btc::cancel(
        &harness.services(),
        Chain::Bitcoin,
        &btc_address(),
        &pending_transfer(),
    )
    .unwrap();
    assert_eq!(operation.simulate().await.unwrap(), Simulation::Empty);

    // Previous fee 1 410 plus 1 sat/vB over 110 vB.
    let fee = operation.load_fee(FeeOptions::default()).await.unwrap();
    assert_eq!(fee.amount, decimal("0.0000152"));
    assert!(operation.start(pin()).await.unwrap().is_success());

    let sent = posted(&harness, 0);
    assert_eq!(sent.inputs.len(), 1);
    assert_eq!(sent.outputs.len(), 1);
    assert_eq!(sent.outputs[0].address, Some(btc_address()));
    assert_eq!(sent.outputs[0].amount_sat, 98_480);
    assert!(harness.store.saved()[0].change.is_none());
}

#[test]
fn cancel_of_a_self_transfer_is_refused() {
    let harness = funded_harness();
    let raw = sign_p2wpkh_transaction(
        &[funding()],
        &btc_address(),
        &btc_address(),
        50_000,
        1_410,
        &BTC_KEY,
        BtcNetwork::Mainnet,
    )
    .unwrap()
    .raw_hex;
    let result = btc::cancel(&harness.services(), Chain::Bitcoin, &btc_address(), &raw);
    assert!(matches!(result, Err(wallet_ops::InitError::InvalidReceiver(_))));
}

#[tokio::test]
async fn cancel_spends_only_the_original_inputs_without_change() {
    let harness = funded_harness();
    let unrelated = Output::unspent("cd".repeat(32), 1, 70_000, btc_address());
    harness.store.state.lock().unwrap().unspent.push(unrelated.clone());
    let operation = btc::cancel(
        &harness.services(),
        Chain::Bitcoin,
        &btc_address(),
        &pending_transfer(),
    )
    .unwrap();
    operation.load_fee(FeeOptions::default()).await.unwrap();
    assert!(operation.start(pin()).await.unwrap().is_success());

    let sent = posted(&harness, 0);
    assert_eq!(harness.relay.posted().len(), 1);
    assert!(sent.inputs.iter().all(|input| input.output_id() != unrelated.id));
    assert_eq!(sent.outputs.len(), 1);
    let saved = harness.store.saved();
    assert_eq!(saved[0].spent_outputs, vec![funding().id]);
    assert!(saved[0].change.is_none());
}

#[tokio::test(start_paused = true)]
async fn rejection_while_signing_a_cancel_is_refused() {
    let harness = funded_harness();
    *harness.keys.delay.lock().unwrap() = Some(std::time::Duration::from_millis(200));
    let operation = btc::cancel(
        &harness.services(),
        Chain::Bitcoin,
        &btc_address(),
        &pending_transfer(),
    )
    .unwrap();
    operation.load_fee(FeeOptions::default()).await.unwrap();

    let starting = operation.clone();
    let start = tokio::spawn(async move { starting.start(pin()).await });
    assert!(eventually(|| matches!(operation.state(), State::Signing)).await);
    assert!(!operation.reject_if_not_sent().await);

    assert!(start.await.unwrap().unwrap().is_success());
    assert_eq!(harness.relay.posted().len(), 1);
}
