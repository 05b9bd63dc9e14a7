//! Forecast pipeline under concurrent load.
//!
//! - Many clients asking for a few distinct forecasts must trigger one engine run per
//!   distinct fingerprint.
//! - Repeated traffic after warm-up must be served entirely from the cache.

use std::time::{Duration, Instant};

use tokio::task::JoinSet;

use crate::common::{state, FakeEngine};
use flood_forecast::domain::{ForecastRequest, Sample};

const CLIENTS: usize = 64;
const DISTINCT: usize = 4;

fn request(variant: usize) -> ForecastRequest {
    ForecastRequest {
        series: Some(vec![
            Sample::new(0.0, 1.0),
            Sample::new(60.0, 1.0 + variant as f64),
        ]),
        ..Default::default()
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
#[ignore]
async fn test_concurrent_clients_coalesce_per_fingerprint() {
    let engine = FakeEngine::flooding(Duration::from_millis(200));
    let (st, _dir) = state(engine.clone());

    let started = Instant::now();
    let mut set = JoinSet::new();
    for client in 0..CLIENTS {
        let st = st.clone();
        set.spawn(async move {
            let req = request(client % DISTINCT);
            st.orchestrator.forecast_all(&req).await.map(|r| r.fingerprint.clone())
        });
    }

    let mut fingerprints = Vec::with_capacity(CLIENTS);
    while let Some(joined) = set.join_next().await {
        fingerprints.push(joined.unwrap().unwrap());
    }
    let elapsed = started.elapsed();

    fingerprints.sort();
    fingerprints.dedup();
    assert_eq!(fingerprints.len(), DISTINCT);
    assert_eq!(engine.calls(), DISTINCT);

    let stats = st.orchestrator.cache().stats();
    assert_eq!(stats.misses as usize, DISTINCT);
    assert_eq!((stats.hits + stats.coalesced) as usize, CLIENTS - DISTINCT);
    println!("{CLIENTS} clients, {DISTINCT} fingerprints in {elapsed:?}");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
#[ignore]
async fn test_warm_cache_serves_repeat_traffic() {
    let engine = FakeEngine::flooding(Duration::from_millis(50));
    let (st, _dir) = state(engine.clone());
    for variant in 0..DISTINCT {
        st.orchestrator.forecast_all(&request(variant)).await.unwrap();
    }

    let started = Instant::now();
    let mut set = JoinSet::new();
    for client in 0..CLIENTS * 4 {
        let st = st.clone();
        set.spawn(async move { st.orchestrator.forecast_all(&request(client % DISTINCT)).await });
    }
    while let Some(joined) = set.join_next().await {
        joined.unwrap().unwrap();
    }

    assert_eq!(engine.calls(), DISTINCT);
    assert!(
        started.elapsed() < Duration::from_secs(2),
        "cache hits took {:?}",
        started.elapsed()
    );
}
