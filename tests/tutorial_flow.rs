use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use dlc_node_lib::commands;
use dlc_node_lib::{NodeConfig, NodeState};
use dlc_sdk::testing::{
    FixedClock, LoopbackNetwork, MockWallet, ONE_BTC, TUTORIAL_COIN_TYPE, TUTORIAL_ORACLE_PUBKEY,
    TUTORIAL_R_POINT, TUTORIAL_SETTLEMENT_TIME, TUTORIAL_SIGNATURE, TUTORIAL_VALUE,
};
use dlc_sdk::{
    ContractBackend, ContractFingerprint, ContractStatus, DlcNode, FundingEvent, MemoryBackend,
    NegotiatorConfig, PeerTransport,
};
use nostr_relay_builder::prelude::*;
use tokio::sync::mpsc;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

async fn start_node(
    dir: &Path,
    relay_url: &str,
) -> (NodeState, mpsc::Sender<FundingEvent>) {
    NodeConfig {
        relays: vec![relay_url.to_string()],
        ..Default::default()
    }
    .save(dir)
    .unwrap();
    let (funding_tx, funding_rx) = mpsc::channel(8);
    let state = NodeState::start(dir, Arc::new(MockWallet::new()), funding_rx)
        .await
        .unwrap();
    (state, funding_tx)
}

/// Steps 1-4 of the tutorial script on the offering node: oracle, draft,
/// fields. Returns the draft's index.
async fn configure_tutorial_draft<B: ContractBackend, T: PeerTransport>(
    node: &DlcNode<B, T>,
) -> u64 {
    let oracle = commands::ensure_oracle(node, TUTORIAL_ORACLE_PUBKEY, "Tutorial").unwrap();
    let idx = commands::new_contract(node).unwrap().idx;
    commands::set_contract_oracle(node, idx, oracle.idx)
        .await
        .unwrap();
    commands::set_contract_r_point(node, idx, TUTORIAL_R_POINT)
        .await
        .unwrap();
    commands::set_contract_settlement_time(node, idx, TUTORIAL_SETTLEMENT_TIME)
        .await
        .unwrap();
    commands::set_contract_coin_type(node, idx, TUTORIAL_COIN_TYPE)
        .await
        .unwrap();
    commands::set_contract_funding(node, idx, ONE_BTC, ONE_BTC)
        .await
        .unwrap();
    let draft = commands::set_contract_division(node, idx, 20_000, 10_000)
        .await
        .unwrap();
    assert_eq!(draft.status, ContractStatus::Draft);
    idx
}

/// Poll until the node holds a contract in `status`.
async fn first_in_status<B: ContractBackend, T: PeerTransport>(
    node: &DlcNode<B, T>,
    status: ContractStatus,
) -> u64 {
    for _ in 0..100 {
        if let Some(c) = commands::list_contracts(node, Some(status))
            .unwrap()
            .into_iter()
            .next()
        {
            return c.idx;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    panic!("no contract reached {status:?}");
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[tokio::test]
async fn tutorial_script_over_relay() {
    let mock = MockRelay::run().await.unwrap();
    let alice_dir = tempfile::tempdir().unwrap();
    let bob_dir = tempfile::tempdir().unwrap();
    let (alice, alice_funding) = start_node(alice_dir.path(), &mock.url()).await;
    let (bob, bob_funding) = start_node(bob_dir.path(), &mock.url()).await;
    tokio::time::sleep(Duration::from_millis(500)).await;

    commands::ensure_oracle(&bob.node, TUTORIAL_ORACLE_PUBKEY, "Tutorial").unwrap();
    let peer = alice
        .connect_peer(&bob.identity().unwrap().pubkey_hex)
        .unwrap();

    let ours = configure_tutorial_draft(&alice.node).await;
    let offered = commands::offer_contract(&alice.node, ours, peer)
        .await
        .unwrap();
    assert_eq!(offered.status, ContractStatus::OfferedByMe);

    let theirs = first_in_status(&bob.node, ContractStatus::OfferedToMe).await;
    commands::accept_contract(&bob.node, theirs).await.unwrap();
    let accepted =
        commands::wait_for_contract(&alice.node, ours, ContractStatus::Accepted, 10)
            .await
            .unwrap();

    let fingerprint = ContractFingerprint::from_hex(&accepted.fingerprint.unwrap()).unwrap();
    for funding in [&alice_funding, &bob_funding] {
        funding
            .send(FundingEvent {
                fingerprint,
                txid: [0xab; 32],
            })
            .await
            .unwrap();
    }
    commands::wait_for_contract(&alice.node, ours, ContractStatus::Active, 10)
        .await
        .unwrap();
    commands::wait_for_contract(&bob.node, theirs, ContractStatus::Active, 10)
        .await
        .unwrap();
    assert!(commands::contract_status(&alice.node, ours).unwrap().is_active);

    // Both sides restart between funding and settlement; the contracts'
    // peer indices must still reach the same counterparties.
    alice.shutdown();
    bob.shutdown();
    let (alice, _alice_funding) = start_node(alice_dir.path(), &mock.url()).await;
    let (bob, _bob_funding) = start_node(bob_dir.path(), &mock.url()).await;
    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(
        alice
            .connect_peer(&bob.identity().unwrap().pubkey_hex)
            .unwrap(),
        peer
    );

    let settled =
        commands::settle_contract(&alice.node, ours, TUTORIAL_VALUE, TUTORIAL_SIGNATURE)
            .await
            .unwrap();
    let payout = settled.settlement.unwrap();
    assert_eq!(payout.payout_ours, 103_220_000);
    assert_eq!(payout.payout_theirs, 96_780_000);

    let bob_side = commands::wait_for_contract(&bob.node, theirs, ContractStatus::Settled, 10)
        .await
        .unwrap();
    let bob_payout = bob_side.settlement.unwrap();
    assert_eq!(bob_payout.payout_ours, 96_780_000);
    assert_eq!(bob_payout.payout_theirs, 103_220_000);
    assert!(commands::contract_status(&bob.node, theirs).unwrap().is_settled);

    alice.shutdown();
    bob.shutdown();

    // Settled state survives another restart.
    let (_, reopened_rx) = mpsc::channel(1);
    let restarted = NodeState::start(alice_dir.path(), Arc::new(MockWallet::new()), reopened_rx)
        .await
        .unwrap();
    let after = commands::get_contract(&restarted.node, ours).unwrap();
    assert_eq!(after.status, ContractStatus::Settled);
    restarted.shutdown();
}

#[tokio::test]
async fn declined_offer_over_loopback() {
    let network = LoopbackNetwork::new();
    let (alice_transport, _alice_rx) = network.endpoint();
    let (bob_transport, mut bob_rx) = network.endpoint();
    let bob_id = bob_transport.id();
    let clock = Arc::new(FixedClock::new(TUTORIAL_SETTLEMENT_TIME));

    let node = |transport| {
        DlcNode::new(
            Arc::new(Mutex::new(MemoryBackend::default())),
            Arc::new(transport),
            Arc::new(MockWallet::new()),
            clock.clone(),
            NegotiatorConfig::default(),
        )
    };
    let alice = node(alice_transport);
    let bob = node(bob_transport);
    commands::ensure_oracle(&bob, TUTORIAL_ORACLE_PUBKEY, "Tutorial").unwrap();

    let ours = configure_tutorial_draft(&alice).await;
    commands::offer_contract(&alice, ours, bob_id.0).await.unwrap();
    let (from, bytes) = bob_rx.recv().await.unwrap();
    let theirs = bob.handle_inbound(from, &bytes).await.unwrap().idx().0;

    let declined = commands::decline_contract(&bob, theirs).await.unwrap();
    assert_eq!(declined.status, ContractStatus::Rejected);
    let err = commands::accept_contract(&bob, theirs).await.unwrap_err();
    assert!(err.contains("Rejected"));
}

#[test]
fn ensure_oracle_is_idempotent() {
    let network = LoopbackNetwork::new();
    let (transport, _rx) = network.endpoint();
    let node = DlcNode::new(
        Arc::new(Mutex::new(MemoryBackend::default())),
        Arc::new(transport),
        Arc::new(MockWallet::new()),
        Arc::new(FixedClock::new(0)),
        NegotiatorConfig::default(),
    );

    let first = commands::ensure_oracle(&node, TUTORIAL_ORACLE_PUBKEY, "Tutorial").unwrap();
    let second = commands::ensure_oracle(&node, TUTORIAL_ORACLE_PUBKEY, "Other").unwrap();
    assert_eq!(first.idx, second.idx);
    assert_eq!(second.label, "Tutorial");
    assert!(commands::add_oracle(&node, TUTORIAL_ORACLE_PUBKEY, "Again").is_err());
    assert_eq!(commands::list_oracles(&node).unwrap().len(), 1);
}
