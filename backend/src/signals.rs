use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use lru::LruCache;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Deserialize;
use shared::{Coordinate, SignalKind, TrafficSignal};

pub const OVERPASS_API_URL: &str = "https://overpass-api.de/api/interpreter";
/// One synthetic signal per this many metres of search radius.
const SYNTHETIC_SIGNAL_SPACING_M: f64 = 200.0;
const CACHE_CAPACITY: usize = 32;
pub const CACHE_TTL_SECS: i64 = 5 * 60;

/// Time source for cache expiry. Production uses [`SystemClock`]; tests drive
/// expiry with a fake.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Signal data within a radius of a point. Infallible by contract: signal
/// data is an enhancement, so implementations degrade to synthetic signals
/// instead of surfacing provider errors.
#[async_trait]
pub trait SignalGateway: Send + Sync {
    async fn fetch_signals(&self, center: Coordinate, radius_m: f64) -> Vec<TrafficSignal>;
}

type CacheKey = (i64, i64, u64);

struct CachedSignals {
    signals: Vec<TrafficSignal>,
    fetched_at: DateTime<Utc>,
}

/// TTL cache for signal fetches, keyed by rounded centre and radius. Owned by
/// the gateway that populates it; the clock is injected so expiry is
/// testable.
pub struct SignalCache {
    entries: Mutex<LruCache<CacheKey, CachedSignals>>,
    ttl: TimeDelta,
    clock: Arc<dyn Clock>,
}

impl SignalCache {
    pub fn new(ttl: TimeDelta, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Mutex::new(LruCache::new(
                NonZeroUsize::new(CACHE_CAPACITY).expect("nonzero cache capacity"),
            )),
            ttl,
            clock,
        }
    }

    pub fn with_default_ttl(clock: Arc<dyn Clock>) -> Self {
        Self::new(TimeDelta::seconds(CACHE_TTL_SECS), clock)
    }

    fn key(center: Coordinate, radius_m: f64) -> CacheKey {
        (
            (center.lat * 1000.0).round() as i64,
            (center.lon * 1000.0).round() as i64,
            radius_m.round() as u64,
        )
    }

    pub fn get(&self, center: Coordinate, radius_m: f64) -> Option<Vec<TrafficSignal>> {
        let key = Self::key(center, radius_m);
        let now = self.clock.now();

        if let Ok(mut entries) = self.entries.lock() {
            if let Some(cached) = entries.get(&key) {
                if now - cached.fetched_at < self.ttl {
                    return Some(cached.signals.clone());
                }
                entries.pop(&key);
            }
        }
        None
    }

    pub fn put(&self, center: Coordinate, radius_m: f64, signals: Vec<TrafficSignal>) {
        let key = Self::key(center, radius_m);
        let fetched_at = self.clock.now();

        if let Ok(mut entries) = self.entries.lock() {
            entries.put(
                key,
                CachedSignals {
                    signals,
                    fetched_at,
                },
            );
        }
    }
}

fn estimated_wait_s(rng: &mut StdRng) -> f64 {
    30.0 + rng.random::<f64>() * 60.0
}

/// Fabricate signals around `center` at a density of one per 200 m of
/// radius, at pseudo-random bearings and distances within the radius.
fn synthetic_signals(center: Coordinate, radius_m: f64, rng: &mut StdRng) -> Vec<TrafficSignal> {
    let count = (radius_m / SYNTHETIC_SIGNAL_SPACING_M).floor() as usize;
    if count == 0 {
        return Vec::new();
    }

    let mut signals = Vec::with_capacity(count);
    for i in 0..count {
        let angle =
            2.0 * std::f64::consts::PI * i as f64 / count as f64 + rng.random::<f64>() * 0.5;
        let distance = (0.3 + rng.random::<f64>() * 0.7) * radius_m;

        let lat = center.lat + (distance / 111_000.0) * angle.cos();
        let lon = center.lon
            + (distance / (111_000.0 * center.lat.to_radians().cos())) * angle.sin();

        signals.push(TrafficSignal {
            location: Coordinate { lat, lon },
            kind: SignalKind::TrafficSignals,
            wait_time_s: Some(estimated_wait_s(rng)),
        });
    }

    signals
}

#[derive(Deserialize)]
struct OverpassResponse {
    elements: Vec<OverpassElement>,
}

#[derive(Deserialize)]
struct OverpassElement {
    lat: f64,
    lon: f64,
    #[serde(default)]
    tags: HashMap<String, String>,
}

fn signal_kind(tags: &HashMap<String, String>) -> SignalKind {
    match (
        tags.get("highway").map(String::as_str),
        tags.get("crossing").map(String::as_str),
    ) {
        (Some("traffic_signals"), _) => SignalKind::TrafficSignals,
        (_, Some("traffic_signals")) => SignalKind::Crossing,
        (Some("stop"), _) => SignalKind::Stop,
        _ => SignalKind::TrafficSignals,
    }
}

#[derive(Debug, thiserror::Error)]
enum OverpassError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("API error: {0}")]
    Api(u16),
}

pub struct OverpassSignalsParams {
    pub base_url: String,
    pub timeout: Duration,
}

/// Live Overpass (OpenStreetMap) signal source with TTL caching and a
/// synthetic fallback on any provider failure.
pub struct OverpassSignals {
    params: OverpassSignalsParams,
    client: reqwest::Client,
    cache: SignalCache,
    rng: Mutex<StdRng>,
}

impl OverpassSignals {
    pub fn new(
        params: OverpassSignalsParams,
        cache: SignalCache,
        seed: u64,
    ) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(params.timeout)
            .build()?;
        Ok(Self {
            params,
            client,
            cache,
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        })
    }

    fn query(center: Coordinate, radius_m: f64) -> String {
        format!(
            "[out:json][timeout:25];\
             (\
               node[\"highway\"=\"traffic_signals\"](around:{radius},{lat},{lon});\
               node[\"crossing\"=\"traffic_signals\"](around:{radius},{lat},{lon});\
             );\
             out body;",
            radius = radius_m,
            lat = center.lat,
            lon = center.lon
        )
    }

    async fn fetch_uncached(
        &self,
        center: Coordinate,
        radius_m: f64,
    ) -> Result<Vec<TrafficSignal>, OverpassError> {
        let response = self
            .client
            .post(&self.params.base_url)
            .form(&[("data", Self::query(center, radius_m))])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(OverpassError::Api(response.status().as_u16()));
        }

        let payload: OverpassResponse = response.json().await?;
        let signals = payload
            .elements
            .into_iter()
            .map(|element| {
                let wait = match self.rng.lock() {
                    Ok(mut rng) => estimated_wait_s(&mut rng),
                    Err(_) => 30.0,
                };
                TrafficSignal {
                    location: Coordinate {
                        lat: element.lat,
                        lon: element.lon,
                    },
                    kind: signal_kind(&element.tags),
                    wait_time_s: Some(wait),
                }
            })
            .collect();

        Ok(signals)
    }

    fn synthetic(&self, center: Coordinate, radius_m: f64) -> Vec<TrafficSignal> {
        match self.rng.lock() {
            Ok(mut rng) => synthetic_signals(center, radius_m, &mut rng),
            Err(_) => Vec::new(),
        }
    }
}

#[async_trait]
impl SignalGateway for OverpassSignals {
    async fn fetch_signals(&self, center: Coordinate, radius_m: f64) -> Vec<TrafficSignal> {
        if let Some(cached) = self.cache.get(center, radius_m) {
            tracing::debug!("signal cache hit for ({:.3}, {:.3})", center.lat, center.lon);
            return cached;
        }

        let signals = match self.fetch_uncached(center, radius_m).await {
            Ok(signals) => {
                tracing::debug!("Overpass returned {} signals", signals.len());
                signals
            }
            Err(err) => {
                tracing::warn!("Overpass fetch failed, using synthetic signals: {err}");
                self.synthetic(center, radius_m)
            }
        };

        self.cache.put(center, radius_m, signals.clone());
        signals
    }
}

/// Offline signal source: synthesizes every response. Used when the whole
/// stack runs in mock mode.
pub struct SyntheticSignals {
    rng: Mutex<StdRng>,
}

impl SyntheticSignals {
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }
}

#[async_trait]
impl SignalGateway for SyntheticSignals {
    async fn fetch_signals(&self, center: Coordinate, radius_m: f64) -> Vec<TrafficSignal> {
        match self.rng.lock() {
            Ok(mut rng) => synthetic_signals(center, radius_m, &mut rng),
            Err(_) => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::haversine_m;

    const CENTER: Coordinate = Coordinate {
        lat: 35.6812,
        lon: 139.7671,
    };

    struct FakeClock {
        now: Mutex<DateTime<Utc>>,
    }

    impl FakeClock {
        fn new() -> Self {
            Self {
                now: Mutex::new(Utc::now()),
            }
        }

        fn advance(&self, delta: TimeDelta) {
            let mut now = self.now.lock().unwrap();
            *now = *now + delta;
        }
    }

    impl Clock for FakeClock {
        fn now(&self) -> DateTime<Utc> {
            *self.now.lock().unwrap()
        }
    }

    fn sample_signals(count: usize) -> Vec<TrafficSignal> {
        (0..count)
            .map(|i| TrafficSignal {
                location: Coordinate {
                    lat: CENTER.lat + i as f64 * 0.001,
                    lon: CENTER.lon,
                },
                kind: SignalKind::TrafficSignals,
                wait_time_s: Some(45.0),
            })
            .collect()
    }

    #[test]
    fn test_cache_hit_within_ttl_returns_same_list() {
        let clock = Arc::new(FakeClock::new());
        let cache = SignalCache::with_default_ttl(clock.clone());

        cache.put(CENTER, 2000.0, sample_signals(3));
        clock.advance(TimeDelta::minutes(4));

        let cached = cache.get(CENTER, 2000.0).unwrap();
        assert_eq!(cached.len(), 3);
        assert_eq!(cached[0].wait_time_s, Some(45.0));
    }

    #[test]
    fn test_cache_expires_after_ttl() {
        let clock = Arc::new(FakeClock::new());
        let cache = SignalCache::with_default_ttl(clock.clone());

        cache.put(CENTER, 2000.0, sample_signals(3));
        clock.advance(TimeDelta::minutes(6));

        assert!(cache.get(CENTER, 2000.0).is_none());
    }

    #[test]
    fn test_cache_key_rounds_to_three_decimals() {
        let clock = Arc::new(FakeClock::new());
        let cache = SignalCache::with_default_ttl(clock);

        cache.put(CENTER, 2000.0, sample_signals(2));

        // 4th-decimal jitter lands on the same key...
        let nearby = Coordinate {
            lat: CENTER.lat + 0.0002,
            lon: CENTER.lon - 0.0003,
        };
        assert!(cache.get(nearby, 2000.0).is_some());

        // ...a 3rd-decimal move does not.
        let elsewhere = Coordinate {
            lat: CENTER.lat + 0.002,
            lon: CENTER.lon,
        };
        assert!(cache.get(elsewhere, 2000.0).is_none());
    }

    #[test]
    fn test_cache_distinguishes_radius() {
        let clock = Arc::new(FakeClock::new());
        let cache = SignalCache::with_default_ttl(clock);

        cache.put(CENTER, 2000.0, sample_signals(2));
        assert!(cache.get(CENTER, 2500.0).is_none());
    }

    #[test]
    fn test_synthetic_density_is_one_per_200m() {
        let mut rng = StdRng::seed_from_u64(1);
        assert_eq!(synthetic_signals(CENTER, 2000.0, &mut rng).len(), 10);
        assert_eq!(synthetic_signals(CENTER, 199.0, &mut rng).len(), 0);
    }

    #[test]
    fn test_synthetic_signals_stay_within_radius() {
        let mut rng = StdRng::seed_from_u64(2);
        let radius_m = 2000.0;
        for signal in synthetic_signals(CENTER, radius_m, &mut rng) {
            let dist = haversine_m(CENTER, signal.location);
            assert!(dist <= radius_m * 1.05);
        }
    }

    #[test]
    fn test_synthetic_signals_deterministic_per_seed() {
        let mut a = StdRng::seed_from_u64(9);
        let mut b = StdRng::seed_from_u64(9);

        let first = synthetic_signals(CENTER, 1000.0, &mut a);
        let second = synthetic_signals(CENTER, 1000.0, &mut b);

        assert_eq!(first.len(), second.len());
        for (x, y) in first.iter().zip(&second) {
            assert_eq!(x.location.lat, y.location.lat);
            assert_eq!(x.location.lon, y.location.lon);
            assert_eq!(x.wait_time_s, y.wait_time_s);
        }
    }

    #[test]
    fn test_overpass_kind_mapping() {
        let mut highway = HashMap::new();
        highway.insert("highway".to_string(), "traffic_signals".to_string());
        assert_eq!(signal_kind(&highway), SignalKind::TrafficSignals);

        let mut crossing = HashMap::new();
        crossing.insert("crossing".to_string(), "traffic_signals".to_string());
        assert_eq!(signal_kind(&crossing), SignalKind::Crossing);

        let mut stop = HashMap::new();
        stop.insert("highway".to_string(), "stop".to_string());
        assert_eq!(signal_kind(&stop), SignalKind::Stop);
    }

    #[test]
    fn test_overpass_response_parsing() {
        let json = r#"{
            "elements": [
                {"type": "node", "id": 1, "lat": 35.68, "lon": 139.76,
                 "tags": {"highway": "traffic_signals"}},
                {"type": "node", "id": 2, "lat": 35.69, "lon": 139.77}
            ]
        }"#;

        let payload: OverpassResponse = serde_json::from_str(json).unwrap();
        assert_eq!(payload.elements.len(), 2);
        assert_eq!(payload.elements[0].lat, 35.68);
        assert!(payload.elements[1].tags.is_empty());
    }

    #[tokio::test]
    async fn test_unreachable_provider_falls_back_to_synthetic() {
        let clock = Arc::new(FakeClock::new());
        let gateway = OverpassSignals::new(
            OverpassSignalsParams {
                base_url: "http://127.0.0.1:1/api/interpreter".to_string(),
                timeout: Duration::from_secs(1),
            },
            SignalCache::with_default_ttl(clock),
            5,
        )
        .unwrap();

        let signals = gateway.fetch_signals(CENTER, 2000.0).await;
        assert_eq!(signals.len(), 10);
    }

    #[tokio::test]
    async fn test_fallback_result_is_cached() {
        let clock = Arc::new(FakeClock::new());
        let gateway = OverpassSignals::new(
            OverpassSignalsParams {
                base_url: "http://127.0.0.1:1/api/interpreter".to_string(),
                timeout: Duration::from_secs(1),
            },
            SignalCache::with_default_ttl(clock),
            5,
        )
        .unwrap();

        let first = gateway.fetch_signals(CENTER, 2000.0).await;
        let second = gateway.fetch_signals(CENTER, 2000.0).await;

        // A fresh synthetic draw would differ; the cache returns the same
        // list by value.
        assert_eq!(first.len(), second.len());
        for (x, y) in first.iter().zip(&second) {
            assert_eq!(x.location.lat, y.location.lat);
            assert_eq!(x.location.lon, y.location.lon);
        }
    }

    #[tokio::test]
    async fn test_synthetic_gateway_never_fails() {
        let gateway = SyntheticSignals::seeded(11);
        let signals = gateway.fetch_signals(CENTER, 1000.0).await;
        assert_eq!(signals.len(), 5);
    }
}
