//! Feasible-leg discovery between representative stations.
//!
//! Pairs whose great-circle distance already reaches the vehicle range are
//! pruned without a query: road distance is never shorter than the
//! great-circle distance, so such a pair can never become a leg. Remaining
//! pairs are resolved against a [`DirectionsService`] on the tokio blocking
//! pool, bounded by a semaphore, and every outcome lands in a shared
//! [`PairCache`] so repeated builds skip pairs that are already known.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::cluster::{cluster_stations, ClusterConfig};
use crate::directions::{
    DirectionsError, DirectionsRequest, DirectionsService, QuerySession, RetryPolicy, SessionPolicy,
};
use crate::error::{Error, Result};
use crate::network::{ChargeNetwork, Leg, NetworkMeta};
use crate::station::{great_circle_km, PairKey, Station, StationId};

/// Default maximum vehicle range used to gate pairs, in kilometres.
pub const DEFAULT_MAX_RANGE_KM: f64 = 700.0;
/// Default bound on concurrent directions queries.
pub const DEFAULT_MAX_IN_FLIGHT: usize = 8;
/// Default number of unresolved pairs tolerated before a build is abandoned.
pub const DEFAULT_MAX_FAILED_PAIRS: usize = 25;

/// Resolved outcome of a directions query for a station pair.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PairOutcome {
    Route { distance_km: f64, duration_s: f64 },
    NoRoute,
}

/// Cached outcome plus the session token that resolved it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CachedPair {
    pub outcome: PairOutcome,
    pub session_token: Option<Uuid>,
}

/// Concurrent cache of pair outcomes keyed by canonical station pair.
#[derive(Debug, Clone, Default)]
pub struct PairCache {
    inner: Arc<DashMap<PairKey, CachedPair>>,
}

impl PairCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &PairKey) -> Option<CachedPair> {
        self.inner.get(key).map(|entry| *entry.value())
    }

    /// Store `value` unless an outcome for `key` already exists.
    ///
    /// Returns `true` when the value was inserted.
    pub fn insert_if_absent(&self, key: PairKey, value: CachedPair) -> bool {
        match self.inner.entry(key) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(value);
                true
            }
        }
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Snapshot of every cached entry ordered by pair key.
    pub fn entries(&self) -> Vec<(PairKey, CachedPair)> {
        let mut entries: Vec<_> = self
            .inner
            .iter()
            .map(|entry| (*entry.key(), *entry.value()))
            .collect();
        entries.sort_by_key(|(key, _)| *key);
        entries
    }
}

/// Settings for [`discover_legs`].
#[derive(Debug, Clone)]
pub struct DiscoveryConfig {
    pub max_range_km: f64,
    pub max_in_flight: usize,
    /// Pairs allowed to stay unresolved after retries before the build aborts.
    pub max_failed_pairs: usize,
    pub retry: RetryPolicy,
    pub session: SessionPolicy,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            max_range_km: DEFAULT_MAX_RANGE_KM,
            max_in_flight: DEFAULT_MAX_IN_FLIGHT,
            max_failed_pairs: DEFAULT_MAX_FAILED_PAIRS,
            retry: RetryPolicy::default(),
            session: SessionPolicy::default(),
        }
    }
}

impl DiscoveryConfig {
    pub fn validate(&self) -> Result<()> {
        if !self.max_range_km.is_finite() || self.max_range_km <= 0.0 {
            return Err(Error::InvalidInput {
                message: format!("max range must be positive, got {}", self.max_range_km),
            });
        }
        if self.max_in_flight == 0 {
            return Err(Error::InvalidInput {
                message: "max_in_flight must be at least 1".to_string(),
            });
        }
        if self.retry.max_attempts == 0 {
            return Err(Error::InvalidInput {
                message: "retry policy needs at least one attempt".to_string(),
            });
        }
        Ok(())
    }
}

/// Summary of a discovery run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DiscoveryReport {
    /// Legs with a road distance below the maximum range, ordered by pair.
    pub legs: Vec<Leg>,
    /// Pairs that passed the great-circle gate.
    pub candidates: usize,
    /// Pairs skipped by the great-circle gate.
    pub pruned: usize,
    /// Candidates answered from the pair cache.
    pub cache_hits: usize,
    /// Directions queries issued, retries included.
    pub queries: usize,
    /// Pairs the service reported as unroutable.
    pub no_route: usize,
    /// Pairs still failing after every retry.
    pub failed: Vec<PairKey>,
    /// Times the query session token was renewed.
    pub session_renewals: usize,
}

/// Unordered station pairs that survive the great-circle gate.
///
/// Returns the canonical `(min_id, max_id)` pairs in input index order along
/// with the number of pairs pruned because their great-circle distance is at
/// least `max_range_km`.
pub fn candidate_pairs(
    stations: &[Station],
    max_range_km: f64,
) -> (Vec<(StationId, StationId)>, usize) {
    let mut pairs = Vec::new();
    let mut pruned = 0;
    for (i, a) in stations.iter().enumerate() {
        for b in &stations[i + 1..] {
            if great_circle_km(a, b) >= max_range_km {
                pruned += 1;
                continue;
            }
            let key = PairKey::new(a.id, b.id);
            pairs.push((key.low(), key.high()));
        }
    }
    (pairs, pruned)
}

#[derive(Debug)]
enum PairResult {
    Resolved,
    Failed,
    Rejected(String),
}

#[derive(Debug, Default)]
struct DispatchState {
    abort: AtomicBool,
    failed: AtomicUsize,
    queries: AtomicUsize,
}

/// Resolve candidate pairs among `stations` into legs.
///
/// `session` is renewed in place whenever it expires under the configured
/// [`SessionPolicy`]. New outcomes are added to `cache`; existing entries are
/// never overwritten.
pub async fn discover_legs(
    service: Arc<dyn DirectionsService>,
    stations: &[Station],
    config: &DiscoveryConfig,
    cache: &PairCache,
    session: &mut QuerySession,
) -> Result<DiscoveryReport> {
    config.validate()?;

    let by_id: HashMap<StationId, &Station> = stations.iter().map(|s| (s.id, s)).collect();
    let (pairs, pruned) = candidate_pairs(stations, config.max_range_km);
    info!(
        stations = stations.len(),
        candidates = pairs.len(),
        pruned,
        cached = cache.len(),
        "discovering feasible legs"
    );

    let mut report = DiscoveryReport {
        candidates: pairs.len(),
        pruned,
        ..DiscoveryReport::default()
    };

    let semaphore = Arc::new(Semaphore::new(config.max_in_flight));
    let state = Arc::new(DispatchState::default());
    let mut handles = Vec::new();

    for &(a, b) in &pairs {
        let key = PairKey::new(a, b);
        if cache.get(&key).is_some() {
            report.cache_hits += 1;
            continue;
        }
        if state.abort.load(Ordering::SeqCst) {
            break;
        }

        let permit = semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|err| Error::Worker {
                message: err.to_string(),
            })?;
        // Workers may have aborted while this dispatch waited for a slot.
        if state.abort.load(Ordering::SeqCst) {
            break;
        }

        if session.renew_if_expired(Utc::now(), &config.session) {
            report.session_renewals += 1;
        }
        let request = DirectionsRequest {
            origin: by_id[&a].coord,
            destination: by_id[&b].coord,
            session_token: session.record_query(),
        };

        let service = Arc::clone(&service);
        let state = Arc::clone(&state);
        let cache = cache.clone();
        let retry = config.retry;
        let max_failed = config.max_failed_pairs;
        let handle = tokio::spawn(async move {
            let _permit = permit;
            resolve_pair(service, request, key, retry, max_failed, &cache, &state).await
        });
        handles.push((key, handle));
    }

    let mut rejection: Option<(PairKey, String)> = None;
    for (key, handle) in handles {
        let result = handle.await.map_err(|err| Error::Worker {
            message: err.to_string(),
        })??;
        match result {
            PairResult::Resolved => {}
            PairResult::Failed => report.failed.push(key),
            PairResult::Rejected(message) => {
                if rejection.is_none() {
                    rejection = Some((key, message));
                }
            }
        }
    }
    report.queries = state.queries.load(Ordering::SeqCst);

    if let Some((key, message)) = rejection {
        return Err(Error::DirectionsRejected {
            a: key.low(),
            b: key.high(),
            message,
        });
    }
    if report.failed.len() > config.max_failed_pairs {
        return Err(Error::DirectionsUnavailable {
            failed: report.failed.len(),
            threshold: config.max_failed_pairs,
        });
    }

    for &(a, b) in &pairs {
        let key = PairKey::new(a, b);
        match cache.get(&key).map(|entry| entry.outcome) {
            Some(PairOutcome::Route {
                distance_km,
                duration_s,
            }) => {
                if distance_km < config.max_range_km {
                    report.legs.push(Leg::new(a, b, distance_km, duration_s));
                }
            }
            Some(PairOutcome::NoRoute) => report.no_route += 1,
            None => {}
        }
    }
    report.legs.sort_by_key(|leg| leg.key());

    info!(
        legs = report.legs.len(),
        queries = report.queries,
        cache_hits = report.cache_hits,
        no_route = report.no_route,
        failed = report.failed.len(),
        "leg discovery complete"
    );
    Ok(report)
}

async fn resolve_pair(
    service: Arc<dyn DirectionsService>,
    request: DirectionsRequest,
    key: PairKey,
    retry: RetryPolicy,
    max_failed: usize,
    cache: &PairCache,
    state: &DispatchState,
) -> Result<PairResult> {
    let token = request.session_token;
    let request = Arc::new(request);
    let mut attempt = 0;

    loop {
        attempt += 1;
        state.queries.fetch_add(1, Ordering::SeqCst);

        let svc = Arc::clone(&service);
        let req = Arc::clone(&request);
        let outcome = tokio::task::spawn_blocking(move || svc.route(&req))
            .await
            .map_err(|err| Error::Worker {
                message: err.to_string(),
            })?;

        match outcome {
            Ok(route) => {
                debug!(
                    pair = %key,
                    distance_km = route.distance_km,
                    duration_s = route.duration_s,
                    "resolved pair"
                );
                cache.insert_if_absent(
                    key,
                    CachedPair {
                        outcome: PairOutcome::Route {
                            distance_km: route.distance_km,
                            duration_s: route.duration_s,
                        },
                        session_token: Some(token),
                    },
                );
                return Ok(PairResult::Resolved);
            }
            Err(DirectionsError::NoRoute { status }) => {
                debug!(pair = %key, %status, "no driving route between pair");
                cache.insert_if_absent(
                    key,
                    CachedPair {
                        outcome: PairOutcome::NoRoute,
                        session_token: Some(token),
                    },
                );
                return Ok(PairResult::Resolved);
            }
            Err(DirectionsError::Fatal { message }) => {
                warn!(
                    pair = %key,
                    %message,
                    "directions service rejected request; aborting discovery"
                );
                state.abort.store(true, Ordering::SeqCst);
                return Ok(PairResult::Rejected(message));
            }
            Err(DirectionsError::Transient { message }) => {
                if attempt >= retry.max_attempts || state.abort.load(Ordering::SeqCst) {
                    warn!(
                        pair = %key,
                        attempts = attempt,
                        %message,
                        "skipping pair after transient failures"
                    );
                    let failed = state.failed.fetch_add(1, Ordering::SeqCst) + 1;
                    if failed > max_failed {
                        state.abort.store(true, Ordering::SeqCst);
                    }
                    return Ok(PairResult::Failed);
                }
                let delay = retry.backoff(attempt);
                debug!(pair = %key, attempt, ?delay, %message, "retrying pair");
                tokio::time::sleep(delay).await;
            }
        }
    }
}

/// Settings for [`build_network`].
#[derive(Debug, Clone)]
pub struct BuildConfig {
    pub cluster: ClusterConfig,
    pub discovery: DiscoveryConfig,
    /// Fast-charger filter that was applied at ingest, recorded in the metadata.
    pub min_fast_chargers: u32,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            cluster: ClusterConfig::default(),
            discovery: DiscoveryConfig::default(),
            min_fast_chargers: crate::ingest::DEFAULT_MIN_FAST_CHARGERS,
        }
    }
}

/// Cluster ingested stations, discover legs between the representatives and
/// assemble the resulting [`ChargeNetwork`].
pub async fn build_network(
    service: Arc<dyn DirectionsService>,
    stations: &[Station],
    config: &BuildConfig,
    cache: &PairCache,
    session: &mut QuerySession,
) -> Result<(ChargeNetwork, DiscoveryReport)> {
    let clustering = cluster_stations(stations, &config.cluster)?;
    let representatives = clustering.representatives();

    let discovery = &config.discovery;
    let report = discover_legs(service, &representatives, discovery, cache, session).await?;

    let meta = NetworkMeta {
        max_range_km: discovery.max_range_km,
        min_fast_chargers: config.min_fast_chargers,
        cluster_diameter_km: config.cluster.max_diameter_km,
        built_at: Utc::now(),
    };
    let network = ChargeNetwork::new(meta, representatives, report.legs.clone())?;
    info!(
        stations = network.stations().len(),
        legs = network.legs().len(),
        "built charge network"
    );
    Ok((network, report))
}
