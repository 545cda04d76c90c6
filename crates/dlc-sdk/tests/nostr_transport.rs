use std::sync::{Arc, Mutex};
use std::time::Duration;

use dlc_sdk::testing::{
    FixedClock, MockWallet, ONE_BTC, TUTORIAL_COIN_TYPE, TUTORIAL_SETTLEMENT_TIME,
    tutorial_oracle_pubkey, tutorial_r_point,
};
use dlc_sdk::{
    ContractFilter, ContractStatus, DlcNode, MemoryBackend, NegotiatorConfig, NostrTransport,
    NostrTransportConfig, PEER_MESSAGE_KIND, PeerIdx, PeerTransport, TransportError,
    build_inbox_filter, build_peer_event,
};
use nostr_relay_builder::prelude::*;
use nostr_sdk::prelude::*;

fn transport(url: &str) -> NostrTransport {
    let config = NostrTransportConfig {
        relays: vec![url.to_string()],
        ..Default::default()
    };
    NostrTransport::new(Keys::generate(), config)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[test]
fn peer_event_is_addressed_by_hashtag() {
    let sender = Keys::generate();
    let recipient = Keys::generate();
    let event = build_peer_event(&sender, &recipient.public_key(), b"{\"type\":\"x\"}").unwrap();

    assert_eq!(event.kind, PEER_MESSAGE_KIND);
    assert_eq!(event.pubkey, sender.public_key());
    assert_eq!(event.content, "{\"type\":\"x\"}");
    assert!(build_inbox_filter(&recipient.public_key()).match_event(&event));
    assert!(!build_inbox_filter(&sender.public_key()).match_event(&event));
}

#[test]
fn non_utf8_payload_is_refused() {
    let keys = Keys::generate();
    assert!(build_peer_event(&keys, &keys.public_key(), &[0xff, 0xfe]).is_err());
}

#[tokio::test]
async fn send_to_unregistered_peer_fails() {
    let mock = MockRelay::run().await.unwrap();
    let alice = transport(&mock.url());
    let err = alice.send(PeerIdx(5), b"{}".to_vec()).await.unwrap_err();
    assert!(matches!(err, TransportError::UnknownPeer(PeerIdx(5))));
}

#[tokio::test]
async fn bytes_arrive_tagged_with_sender_peer() {
    let mock = MockRelay::run().await.unwrap();
    let alice = transport(&mock.url());
    let bob = transport(&mock.url());

    let (_bob_loop, mut bob_rx) = bob.start(16).await.unwrap();
    tokio::time::sleep(Duration::from_millis(500)).await;

    let bob_idx = alice.connect_peer(bob.public_key()).unwrap();
    alice
        .send(bob_idx, b"{\"hello\":1}".to_vec())
        .await
        .unwrap();

    let (from, bytes) = tokio::time::timeout(Duration::from_secs(5), bob_rx.recv())
        .await
        .expect("message within timeout")
        .expect("channel open");
    assert_eq!(bytes, b"{\"hello\":1}");
    assert_eq!(bob.peer_public_key(from), Some(alice.public_key()));

    // Replies go back over the index bob assigned on first contact.
    assert_eq!(bob.connect_peer(alice.public_key()).unwrap(), from);
}

#[tokio::test]
async fn offer_travels_between_nodes_over_relay() {
    let mock = MockRelay::run().await.unwrap();
    let clock = Arc::new(FixedClock::new(TUTORIAL_SETTLEMENT_TIME - 60));

    let node = |t: NostrTransport| {
        let node = DlcNode::new(
            Arc::new(Mutex::new(MemoryBackend::default())),
            Arc::new(t),
            Arc::new(MockWallet::new()),
            clock.clone(),
            NegotiatorConfig::default(),
        );
        node.add_oracle(&tutorial_oracle_pubkey(), "Tutorial")
            .unwrap();
        node
    };
    let alice = node(transport(&mock.url()));
    let bob = node(transport(&mock.url()));

    let (_bob_loop, bob_rx) = bob.transport().start(16).await.unwrap();
    let _bob_router = bob.spawn_inbound_loop(bob_rx);
    tokio::time::sleep(Duration::from_millis(500)).await;

    let bob_idx = alice
        .transport()
        .connect_peer(bob.transport().public_key())
        .unwrap();
    let oracle = alice.find_oracle(&tutorial_oracle_pubkey()).unwrap();
    let idx = alice.new_contract().unwrap().idx;
    alice.set_contract_oracle(idx, oracle).await.unwrap();
    alice
        .set_contract_r_point(idx, tutorial_r_point())
        .await
        .unwrap();
    alice
        .set_contract_settlement_time(idx, TUTORIAL_SETTLEMENT_TIME)
        .await
        .unwrap();
    alice
        .set_contract_coin_type(idx, TUTORIAL_COIN_TYPE)
        .await
        .unwrap();
    alice
        .set_contract_funding(idx, ONE_BTC, ONE_BTC)
        .await
        .unwrap();
    alice
        .set_contract_division(idx, 20_000, 10_000)
        .await
        .unwrap();
    alice.offer_contract(idx, bob_idx).await.unwrap();

    let filter = ContractFilter {
        status: Some(ContractStatus::OfferedToMe),
        ..Default::default()
    };
    let mut received = Vec::new();
    for _ in 0..50 {
        received = bob.list_contracts(&filter).unwrap();
        if !received.is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    assert_eq!(received.len(), 1);
    assert_eq!(
        received[0].fingerprint,
        alice.get_contract(idx).unwrap().fingerprint
    );
}

#[tokio::test]
async fn peer_indices_outlive_the_transport() {
    let backend = Arc::new(Mutex::new(MemoryBackend::default()));
    let bob = Keys::generate().public_key();
    let carol = Keys::generate().public_key();
    let with_backend = || {
        NostrTransport::with_directory(
            Keys::generate(),
            NostrTransportConfig::default(),
            backend.clone(),
        )
        .unwrap()
    };

    let first = with_backend();
    let bob_idx = first.connect_peer(bob).unwrap();
    let carol_idx = first.connect_peer(carol).unwrap();
    drop(first);

    let second = with_backend();
    assert_eq!(second.peer_public_key(bob_idx), Some(bob));
    assert_eq!(second.peer_public_key(carol_idx), Some(carol));
    assert_eq!(second.connect_peer(carol).unwrap(), carol_idx);
    let dave = second.connect_peer(Keys::generate().public_key()).unwrap();
    assert!(dave.0 > carol_idx.0);
}
