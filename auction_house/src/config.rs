use std::collections::HashSet;
use std::env::var;
use std::time::Duration;

use anyhow::{Context, Result};
use helper::{env_load, env_var};
use model::domain::auction::SelectionPolicy;
use model::{PeerUri, RingType};
use nutype::nutype;

use crate::repository::broker::MqttSettings;
use crate::service::auction::AwardTimeoutPolicy;

env_var!(SERVER_PORT);
env_var!(AUCTION_HOUSE_URI);
env_var!(RING_TYPE);
env_var!(ENTRY_POINT_URI);
env_var!(HUB_URI);
env_var!(MQTT_ENABLED);
env_var!(MQTT_HOST);
env_var!(MQTT_PORT);
env_var!(MQTT_TOPIC);
env_var!(MQTT_CLIENT_ID);
env_var!(MQTT_USERNAME);
env_var!(MQTT_PASSWORD);
env_var!(SUPPORTED_JOB_TYPES);
env_var!(BIDDER_NAME);
env_var!(BID_VALUE);
env_var!(WORKER_URI);
env_var!(DISCOVERY_REFRESH_SECS);
env_var!(CRAWL_MAX_HOPS);
env_var!(CRAWL_TIMEOUT_SECS);
env_var!(POLL_INTERVAL_SECS);
env_var!(DEDUP_CAPACITY);
env_var!(AWARD_TIMEOUT_SECS);
env_var!(AWARD_TIMEOUT_POLICY);
env_var!(WINNER_POLICY);
env_var!(LIVENESS_PROBE);

#[nutype(derive(Debug, Clone, Copy), validate(greater = 0))]
pub struct ServerPort(u16);

#[nutype(derive(Debug, Clone, Copy), validate(greater = 0))]
pub struct MqttPort(u16);

#[nutype(
    derive(Debug, Clone),
    sanitize(trim),
    validate(not_empty, len_char_max = 255)
)]
pub struct MqttTopic(String);

#[nutype(derive(Debug, Clone), sanitize(trim), validate(not_empty))]
pub struct BidderName(String);

#[nutype(derive(Debug, Clone, Copy), validate(finite))]
pub struct BidValue(f64);

/// Seconds between two runs of a periodic job.
#[nutype(derive(Debug, Clone, Copy), validate(greater = 0))]
pub struct PeriodSecs(u64);

/// `0` disables the job.
#[nutype(derive(Debug, Clone, Copy), validate(less_or_equal = 86_400))]
pub struct OptionalPeriodSecs(u64);

#[nutype(derive(Debug, Clone, Copy), validate(greater = 0, less_or_equal = 64))]
pub struct CrawlMaxHops(usize);

#[nutype(derive(Debug, Clone, Copy), validate(greater = 0))]
pub struct DedupCapacity(usize);

fn optional(name: &str) -> Option<String> {
    var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn optional_uri(name: &str) -> Result<Option<PeerUri>> {
    optional(name)
        .map(|raw| {
            PeerUri::try_new(raw)
                .with_context(|| format!("{} was not formatted right", name))
        })
        .transpose()
}

fn parse_or<T>(name: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match optional(name) {
        Some(raw) => raw
            .parse()
            .with_context(|| format!("{} env var cannot be parsed", name)),
        None => Ok(default),
    }
}

/// `true`/`false` in any case.
fn parse_flag(raw: &str) -> Result<bool, std::str::ParseBoolError> {
    raw.to_ascii_lowercase().parse()
}

fn flag_or(name: &str, default: bool) -> Result<bool> {
    match optional(name) {
        Some(raw) => parse_flag(&raw)
            .with_context(|| format!("{} env var cannot be parsed", name)),
        None => Ok(default),
    }
}

fn seconds(period: PeriodSecs) -> Duration {
    Duration::from_secs(period.into_inner())
}

/// Everything the node reads from its environment.
#[derive(Debug, Clone)]
pub struct Config {
    pub server_port:          ServerPort,
    pub house:                PeerUri,
    pub ring_type:            RingType,
    pub entry_point:          Option<PeerUri>,
    /// `None` when the embedded hub is used.
    pub hub_uri:              Option<String>,
    pub mqtt:                 Option<MqttSettings>,
    pub supported_job_types:  HashSet<String>,
    pub bidder_name:          BidderName,
    pub bid_value:            BidValue,
    pub worker_uri:           Option<String>,
    pub discovery_refresh:    Duration,
    pub crawl_max_hops:       CrawlMaxHops,
    pub crawl_timeout:        Duration,
    pub poll_interval:        Option<Duration>,
    pub dedup_capacity:       DedupCapacity,
    pub award_timeout:        Duration,
    pub award_timeout_policy: AwardTimeoutPolicy,
    pub winner_policy:        SelectionPolicy,
    pub liveness_probe:       bool,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let house = env_load!(PeerUri, AUCTION_HOUSE_URI);
        let ring_type: RingType = var(RING_TYPE)
            .with_context(|| format!("Missing {} env var", RING_TYPE))?
            .parse()
            .with_context(|| format!("{} was not formatted right", RING_TYPE))?;

        let mqtt = if flag_or(MQTT_ENABLED, true)? {
            let port = env_load!(MqttPort, MQTT_PORT, u16, 1883);
            let topic = env_load!(
                MqttTopic,
                MQTT_TOPIC,
                String,
                "ch/unisg/pitas/auctions".to_string()
            );
            Some(MqttSettings {
                host:      optional(MQTT_HOST)
                    .unwrap_or_else(|| "broker.hivemq.com".to_string()),
                port:      port.into_inner(),
                topic:     topic.into_inner(),
                client_id: optional(MQTT_CLIENT_ID).unwrap_or_else(|| {
                    format!("auction-house-{}", uuid::Uuid::new_v4().simple())
                }),
                username:  optional(MQTT_USERNAME),
                password:  optional(MQTT_PASSWORD),
            })
        } else {
            None
        };

        let supported_job_types = optional(SUPPORTED_JOB_TYPES)
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|job_type| !job_type.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        let poll_interval =
            env_load!(OptionalPeriodSecs, POLL_INTERVAL_SECS, u64, 0)
                .into_inner();

        Ok(Self {
            server_port: env_load!(ServerPort, SERVER_PORT, u16),
            house,
            ring_type,
            entry_point: optional_uri(ENTRY_POINT_URI)?,
            hub_uri: optional(HUB_URI),
            mqtt,
            supported_job_types,
            bidder_name: env_load!(
                BidderName,
                BIDDER_NAME,
                String,
                "auction-house".to_string()
            ),
            bid_value: env_load!(BidValue, BID_VALUE, f64, 1.0),
            worker_uri: optional(WORKER_URI),
            discovery_refresh: seconds(env_load!(
                PeriodSecs,
                DISCOVERY_REFRESH_SECS,
                u64,
                30
            )),
            crawl_max_hops: env_load!(CrawlMaxHops, CRAWL_MAX_HOPS, usize, 8),
            crawl_timeout: seconds(env_load!(
                PeriodSecs,
                CRAWL_TIMEOUT_SECS,
                u64,
                20
            )),
            poll_interval: (poll_interval > 0)
                .then(|| Duration::from_secs(poll_interval)),
            dedup_capacity: env_load!(
                DedupCapacity,
                DEDUP_CAPACITY,
                usize,
                1024
            ),
            award_timeout: seconds(env_load!(
                PeriodSecs,
                AWARD_TIMEOUT_SECS,
                u64,
                300
            )),
            award_timeout_policy: parse_or(
                AWARD_TIMEOUT_POLICY,
                AwardTimeoutPolicy::default(),
            )?,
            winner_policy: parse_or(WINNER_POLICY, SelectionPolicy::default())?,
            liveness_probe: flag_or(LIVENESS_PROBE, false)?,
        })
    }

    /// The hub this node publishes to.
    pub fn effective_hub_uri(&self) -> String {
        self.hub_uri.clone().unwrap_or_else(|| self.house.join("hub"))
    }
}
