//! HTTP relay channel against an in-process test relay.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use ethers::types::{Address, Bytes, H256, U256};
use serde_json::{json, Value};
use shieldswap_common::TxidVersion;
use shieldswap_relay::{
    ChainRef, HttpRelayChannel, HttpRelayConfig, RelayChannel, RelayError, RelaySubmission,
    TestRelayFees,
};

#[derive(Clone, Default)]
struct RelayState {
    received: Arc<Mutex<Vec<Value>>>,
    reject_with: Option<String>,
}

async fn fees() -> Json<TestRelayFees> {
    let mut fees = BTreeMap::new();
    fees.insert(Address::repeat_byte(0xaa), U256::from(10u64));
    fees.insert(Address::repeat_byte(0xbb), U256::from(20u64));
    Json(TestRelayFees {
        relay_address: "0zk1testrelay".into(),
        fees_id: "fees-42".into(),
        expires_at: u64::MAX,
        fee_rate_scale: U256::one(),
        fees,
    })
}

async fn transact(State(state): State<RelayState>, Json(body): Json<Value>) -> (StatusCode, Json<Value>) {
    state.received.lock().unwrap().push(body);
    match &state.reject_with {
        Some(error) => (StatusCode::BAD_REQUEST, Json(json!({ "error": error }))),
        None => (
            StatusCode::OK,
            Json(json!({ "txHash": format!("{:?}", H256::repeat_byte(0x5e)) })),
        ),
    }
}

async fn spawn_relay(state: RelayState) -> SocketAddr {
    let app = Router::new()
        .route("/fees", get(fees))
        .route("/transact", post(transact))
        .with_state(state);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

fn submission() -> RelaySubmission {
    RelaySubmission {
        chain: ChainRef {
            chain_type: 0,
            id: 11_155_111,
        },
        txid_version: TxidVersion::V2PoseidonMerkle,
        to: Address::repeat_byte(0x01),
        data: Bytes::from(vec![1, 2, 3]),
        relay_address: "0zk1testrelay".into(),
        fees_id: "fees-42".into(),
        nullifiers: vec![H256::repeat_byte(0x09)],
        min_gas_price: U256::from(2u64),
        use_relay_adapt: false,
        poi_proofs: json!({}),
    }
}

#[tokio::test]
async fn fee_adverts_are_filtered_by_token() {
    let addr = spawn_relay(RelayState::default()).await;
    let channel = HttpRelayChannel::with_url(format!("http://{}", addr)).unwrap();

    channel.connect().await.unwrap();
    let adverts = channel.fee_adverts(Address::repeat_byte(0xbb)).await.unwrap();
    assert_eq!(adverts.len(), 1);
    assert_eq!(adverts[0].fee_per_unit_gas, U256::from(20u64));
    assert_eq!(adverts[0].fees_id, "fees-42");
}

#[tokio::test]
async fn submit_posts_wire_body_and_returns_hash() {
    let state = RelayState::default();
    let addr = spawn_relay(state.clone()).await;
    let channel = HttpRelayChannel::with_url(format!("http://{}/", addr)).unwrap();

    let tx_hash = channel.submit(&submission()).await.unwrap();
    assert_eq!(tx_hash, H256::repeat_byte(0x5e));

    let received = state.received.lock().unwrap();
    assert_eq!(received.len(), 1);
    assert_eq!(received[0]["feesID"], "fees-42");
    assert_eq!(received[0]["chainId"], 11_155_111);
    assert_eq!(received[0]["useRelayAdapt"], false);
    assert_eq!(received[0]["txidVersion"], "V2_PoseidonMerkle");
}

#[tokio::test]
async fn relay_error_body_is_a_rejection() {
    let addr = spawn_relay(RelayState {
        reject_with: Some("fee too low".into()),
        ..Default::default()
    })
    .await;
    let channel = HttpRelayChannel::with_url(format!("http://{}", addr)).unwrap();

    let err = channel.submit(&submission()).await.unwrap_err();
    assert_eq!(err, RelayError::Rejected("fee too low".into()));
}

async fn spawn_rate_limited_relay(limited: usize, hits: Arc<Mutex<usize>>) -> SocketAddr {
    let app = Router::new().route(
        "/fees",
        get(move || {
            let hits = hits.clone();
            async move {
                let hit = {
                    let mut hits = hits.lock().unwrap();
                    *hits += 1;
                    *hits
                };
                if hit <= limited {
                    Err(StatusCode::TOO_MANY_REQUESTS)
                } else {
                    Ok(fees().await)
                }
            }
        }),
    );
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

#[tokio::test]
async fn rate_limited_fee_lookup_is_retried() {
    let hits = Arc::new(Mutex::new(0));
    let addr = spawn_rate_limited_relay(2, hits.clone()).await;
    let channel = HttpRelayChannel::with_url(format!("http://{}", addr)).unwrap();

    let adverts = channel.fee_adverts(Address::repeat_byte(0xaa)).await.unwrap();

    assert_eq!(adverts.len(), 1);
    assert_eq!(*hits.lock().unwrap(), 3);
}

#[tokio::test]
async fn persistent_rate_limiting_gives_up() {
    let hits = Arc::new(Mutex::new(0));
    let addr = spawn_rate_limited_relay(usize::MAX, hits.clone()).await;
    let mut config = HttpRelayConfig::new(format!("http://{}", addr));
    config.retry.max_attempts = 2;
    let channel = HttpRelayChannel::new(config).unwrap();

    let err = channel.connect().await.unwrap_err();

    assert_eq!(err, RelayError::RateLimited);
    assert_eq!(*hits.lock().unwrap(), 2);
}
