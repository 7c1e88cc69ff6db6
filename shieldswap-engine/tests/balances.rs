//! Balance refresh coalescing, throttling and the update listener.

use std::sync::Arc;
use std::time::Duration;

use ethers::types::U256;
use shieldswap_common::{NetworkName, RetryPolicy, ShieldedBalanceInfo, WalletId};
use shieldswap_engine::{
    BalanceSynchronizer, BalanceUpdate, EngineError, EngineEvents, RefreshOutcome, TokenBalance,
};
use shieldswap_test_fixtures::{MockEngine, SPEND_TOKEN};

const INTERVAL: Duration = Duration::from_secs(30);

fn synchronizer(engine: Arc<MockEngine>) -> BalanceSynchronizer {
    BalanceSynchronizer::new(engine, RetryPolicy::default(), INTERVAL)
}

fn network() -> NetworkName {
    NetworkName::new("testnet")
}

fn wallets() -> Vec<WalletId> {
    vec![WalletId::new("w1")]
}

#[tokio::test(start_paused = true)]
async fn overlapping_refreshes_share_one_scan() {
    let engine = Arc::new(MockEngine::new());
    engine.set_refresh_delay(Duration::from_secs(5));
    let sync = synchronizer(engine.clone());
    let (network, wallets) = (network(), wallets());

    let (first, second) = tokio::join!(
        sync.refresh(&network, &wallets, false),
        sync.refresh(&network, &wallets, false),
    );

    assert_eq!(first, Ok(RefreshOutcome::Refreshed));
    assert_eq!(second, Ok(RefreshOutcome::Joined));
    assert_eq!(engine.refresh_calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn forced_refresh_rescans_after_a_running_scan() {
    let engine = Arc::new(MockEngine::new());
    engine.set_refresh_delay(Duration::from_secs(5));
    let sync = synchronizer(engine.clone());
    let network = network();

    let background_wallets = wallets();
    let (background, forced) = tokio::join!(
        sync.refresh(&network, &background_wallets, false),
        async {
            tokio::time::sleep(Duration::from_secs(1)).await;
            sync.refresh(&network, &wallets(), true).await
        },
    );

    assert_eq!(background, Ok(RefreshOutcome::Refreshed));
    assert_eq!(forced, Ok(RefreshOutcome::Refreshed));
    assert_eq!(engine.refresh_calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn forced_refresh_scans_its_own_wallets() {
    let engine = Arc::new(MockEngine::new());
    engine.set_refresh_delay(Duration::from_secs(5));
    let sync = synchronizer(engine.clone());
    let network = network();
    let (w1, w2) = (WalletId::new("w1"), WalletId::new("w2"));

    let first_wallets = [w1.clone()];
    let (_, forced) = tokio::join!(
        sync.refresh(&network, &first_wallets, false),
        async {
            tokio::time::sleep(Duration::from_secs(1)).await;
            sync.refresh(&network, &[w2.clone()], true).await
        },
    );

    assert_eq!(forced, Ok(RefreshOutcome::Refreshed));
    assert_eq!(engine.scanned_wallets(), vec![vec![w1], vec![w2]]);
}

#[tokio::test(start_paused = true)]
async fn unforced_refresh_for_uncovered_wallets_rescans_after_waiting() {
    let engine = Arc::new(MockEngine::new());
    engine.set_refresh_delay(Duration::from_secs(5));
    let sync = synchronizer(engine.clone());
    let network = network();
    let (w1, w2) = (WalletId::new("w1"), WalletId::new("w2"));

    let (both_wallets, second_wallets) = ([w1.clone(), w2.clone()], [w2.clone()]);
    let (first, second) = tokio::join!(
        sync.refresh(&network, &both_wallets, false),
        sync.refresh(&network, &second_wallets, false),
    );
    assert_eq!(first, Ok(RefreshOutcome::Refreshed));
    assert_eq!(second, Ok(RefreshOutcome::Joined));

    let forced_wallets = [w1.clone()];
    let (_, other) = tokio::join!(
        sync.refresh(&network, &forced_wallets, true),
        async {
            tokio::time::sleep(Duration::from_secs(1)).await;
            sync.refresh(&network, &[w2.clone()], false).await
        },
    );
    assert_eq!(other, Ok(RefreshOutcome::Refreshed));
    assert_eq!(
        engine.scanned_wallets(),
        vec![vec![w1.clone(), w2.clone()], vec![w1], vec![w2]]
    );
}

#[tokio::test(start_paused = true)]
async fn unforced_refresh_inside_interval_is_throttled() {
    let engine = Arc::new(MockEngine::new());
    let sync = synchronizer(engine.clone());
    let (network, wallets) = (network(), wallets());

    assert_eq!(sync.refresh(&network, &wallets, false).await, Ok(RefreshOutcome::Refreshed));
    assert_eq!(sync.refresh(&network, &wallets, false).await, Ok(RefreshOutcome::Throttled));
    assert_eq!(engine.refresh_calls(), 1);

    assert_eq!(sync.refresh(&network, &wallets, true).await, Ok(RefreshOutcome::Refreshed));
    assert_eq!(engine.refresh_calls(), 2);

    tokio::time::advance(INTERVAL + Duration::from_millis(1)).await;
    assert_eq!(sync.refresh(&network, &wallets, false).await, Ok(RefreshOutcome::Refreshed));
    assert_eq!(engine.refresh_calls(), 3);
}

#[tokio::test(start_paused = true)]
async fn throttling_is_per_network() {
    let engine = Arc::new(MockEngine::new());
    let sync = synchronizer(engine.clone());
    let wallets = wallets();

    sync.refresh(&network(), &wallets, false).await.unwrap();
    let other = sync.refresh(&NetworkName::new("other"), &wallets, false).await;

    assert_eq!(other, Ok(RefreshOutcome::Refreshed));
    assert_eq!(engine.refresh_calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn transient_refresh_errors_are_retried() {
    let engine = Arc::new(MockEngine::new());
    engine.fail_next_refresh(EngineError::Network("connection reset".into()));
    let sync = synchronizer(engine.clone());

    let outcome = sync.refresh(&network(), &wallets(), true).await;

    assert_eq!(outcome, Ok(RefreshOutcome::Refreshed));
    assert_eq!(engine.refresh_calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn failed_refresh_does_not_start_the_throttle() {
    let engine = Arc::new(MockEngine::new());
    engine.fail_next_refresh(EngineError::Corrupted("merkletree".into()));
    let sync = synchronizer(engine.clone());
    let (network, wallets) = (network(), wallets());

    let failed = sync.refresh(&network, &wallets, false).await;
    assert_eq!(failed, Err(EngineError::Corrupted("merkletree".into())));

    assert_eq!(sync.refresh(&network, &wallets, false).await, Ok(RefreshOutcome::Refreshed));
    assert_eq!(engine.refresh_calls(), 2);
}

#[tokio::test]
async fn balance_queries_are_cached() {
    let engine = Arc::new(MockEngine::new());
    let wallet = WalletId::new("w1");
    engine.set_balance(&wallet, SPEND_TOKEN, U256::from(1_000u64), U256::from(600u64));
    let sync = synchronizer(engine);

    let info = sync.balance(&network(), &wallet, SPEND_TOKEN).await.unwrap();

    assert_eq!(info.spendable, U256::from(600u64));
    assert_eq!(info.pending, U256::from(400u64));
    assert_eq!(sync.cached(&network(), &wallet, SPEND_TOKEN), Some(info));
    assert_eq!(
        sync.spendable(&network(), &wallet, SPEND_TOKEN).await,
        Ok(U256::from(600u64))
    );
}

#[tokio::test]
async fn listener_applies_engine_balance_updates() {
    let engine = Arc::new(MockEngine::new());
    let sync = synchronizer(engine);
    let events = EngineEvents::default();
    let listener = sync.spawn_listener(&events);
    let wallet = WalletId::new("w1");
    let balance = ShieldedBalanceInfo::new(U256::from(50u64), U256::from(50u64));

    let reached = events.publish_balance(BalanceUpdate {
        network: network(),
        wallet: wallet.clone(),
        balances: vec![TokenBalance {
            token: SPEND_TOKEN,
            balance,
        }],
    });
    assert_eq!(reached, 1);

    let mut cached = None;
    for _ in 0..50 {
        cached = sync.cached(&network(), &wallet, SPEND_TOKEN);
        if cached.is_some() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert_eq!(cached, Some(balance));
    listener.abort();
}
