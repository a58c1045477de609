//! Configuration for dialog-sync
//!
//! CLI arguments and environment variable handling using clap. The argument
//! groups are shared by the service binary and the bus worker.

use clap::Parser;
use std::net::SocketAddr;
use std::time::Duration;
use uuid::Uuid;

use crate::pipeline::RetryPolicy;
use crate::streamer::BackoffSchedule;

/// dialog-sync - keeps dialogs in step with case-management instances
#[derive(Parser, Debug, Clone)]
#[command(name = "dialog-sync")]
#[command(about = "Change feed and migration engine for dialog synchronization")]
pub struct Args {
    /// Unique node identifier for this instance
    #[arg(long, env = "NODE_ID", default_value_t = Uuid::new_v4())]
    pub node_id: Uuid,

    /// Address the control surface listens on
    #[arg(long, env = "LISTEN", default_value = "0.0.0.0:8080")]
    pub listen: SocketAddr,

    /// Development mode: MongoDB and NATS become optional
    #[arg(long, env = "DEV_MODE", default_value = "false")]
    pub dev_mode: bool,

    #[command(flatten)]
    pub upstream: UpstreamArgs,

    #[command(flatten)]
    pub nats: NatsArgs,

    #[command(flatten)]
    pub mongo: MongoArgs,

    #[command(flatten)]
    pub retry: RetryArgs,

    #[command(flatten)]
    pub logging: LogArgs,

    /// Number of pipeline consumers reconciling notifications
    #[arg(long, env = "CONSUMERS", default_value = "8")]
    pub consumers: usize,

    /// Capacity of the shared notification queue
    #[arg(long, env = "QUEUE_CAPACITY", default_value = "1000")]
    pub queue_capacity: usize,

    /// Per-organization buffer between discovery and the pause gate
    #[arg(long, env = "FORWARD_BUFFER", default_value = "100")]
    pub forward_buffer: usize,

    /// Page size requested from the origin store (capped at 100)
    #[arg(long, env = "PAGE_SIZE", default_value = "100")]
    pub page_size: usize,

    /// Comma-separated poll delays in milliseconds used when the feed is quiet
    #[arg(long, env = "POLL_DELAYS_MS", default_value = "1000,2000,5000,10000,30000")]
    pub poll_delays_ms: String,

    /// Jitter applied to each poll delay, in percent
    #[arg(long, env = "POLL_JITTER_PERCENT", default_value = "10")]
    pub poll_jitter_percent: u8,

    /// Run one live discovery loop per known organization
    #[arg(long, env = "LIVE_SYNC_ENABLED", default_value = "true")]
    pub live_sync_enabled: bool,

    /// Persist a partition checkpoint after this many instances
    #[arg(long, env = "CHECKPOINT_EVERY", default_value = "100")]
    pub checkpoint_every: u64,

    /// Partitions executed at the same time by one process
    #[arg(long, env = "MAX_CONCURRENT_PARTITIONS", default_value = "4")]
    pub max_concurrent_partitions: usize,
}

/// Upstream HTTP services
#[derive(Parser, Debug, Clone)]
pub struct UpstreamArgs {
    /// Base URL of the origin (case-management) store API
    #[arg(long, env = "ORIGIN_URL", default_value = "http://localhost:5101/storage/api/v1")]
    pub origin_url: String,

    /// Base URL of the dialog service API
    #[arg(long, env = "DIALOG_URL", default_value = "http://localhost:5102/api/v1/serviceowner")]
    pub dialog_url: String,

    /// Base URL used to build links into apps, `{org}` is substituted
    #[arg(long, env = "APP_BASE_URL", default_value = "https://{org}.apps.localhost")]
    pub app_base_url: String,

    /// Request timeout in milliseconds
    #[arg(long, env = "REQUEST_TIMEOUT_MS", default_value = "30000")]
    pub request_timeout_ms: u64,
}

/// NATS connection configuration
#[derive(Parser, Debug, Clone)]
pub struct NatsArgs {
    /// NATS server URL
    #[arg(long, env = "NATS_URL", default_value = "nats://127.0.0.1:4222")]
    pub nats_url: String,

    /// NATS username (optional)
    #[arg(long, env = "NATS_USER")]
    pub nats_user: Option<String>,

    /// NATS password (optional)
    #[arg(long, env = "NATS_PASSWORD")]
    pub nats_password: Option<String>,
}

/// MongoDB connection configuration
#[derive(Parser, Debug, Clone)]
pub struct MongoArgs {
    /// MongoDB connection URI
    #[arg(long, env = "MONGODB_URI", default_value = "mongodb://localhost:27017")]
    pub mongodb_uri: String,

    /// MongoDB database name
    #[arg(long, env = "MONGODB_DB", default_value = "dialog_sync")]
    pub mongodb_db: String,
}

/// Delivery retry configuration
#[derive(Parser, Debug, Clone)]
pub struct RetryArgs {
    /// First retry delay in milliseconds
    #[arg(long, env = "RETRY_INITIAL_MS", default_value = "500")]
    pub retry_initial_ms: u64,

    /// Upper bound for retry delays in milliseconds
    #[arg(long, env = "RETRY_MAX_MS", default_value = "60000")]
    pub retry_max_ms: u64,

    /// Attempts for 409/412/422 failures before a notification is parked
    #[arg(long, env = "CONFLICT_MAX_ATTEMPTS", default_value = "5")]
    pub conflict_max_attempts: u32,
}

/// Logging configuration
#[derive(Parser, Debug, Clone)]
pub struct LogArgs {
    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Log output format (text or json)
    #[arg(long, env = "LOG_FORMAT", default_value = "text")]
    pub log_format: String,
}

impl UpstreamArgs {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn validate(&self) -> Result<(), String> {
        for (name, url) in [("ORIGIN_URL", &self.origin_url), ("DIALOG_URL", &self.dialog_url)] {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err(format!("{} must be an http(s) URL, got '{}'", name, url));
            }
        }
        Ok(())
    }
}

impl RetryArgs {
    /// Policy for reconciliation deliveries
    pub fn delivery_policy(&self) -> RetryPolicy {
        RetryPolicy {
            initial_delay: Duration::from_millis(self.retry_initial_ms),
            max_delay: Duration::from_millis(self.retry_max_ms),
            conflict_max_attempts: self.conflict_max_attempts,
            ..RetryPolicy::default()
        }
    }

    /// Policy wrapping a whole partition run: no attempt limit, capped growth
    pub fn partition_policy(&self) -> RetryPolicy {
        RetryPolicy {
            initial_delay: Duration::from_millis(self.retry_initial_ms),
            max_delay: Duration::from_millis(self.retry_max_ms),
            conflict_max_attempts: u32::MAX,
            ..RetryPolicy::default()
        }
    }
}

impl Args {
    /// Parse the poll delay list into a backoff schedule
    pub fn poll_schedule(&self) -> Result<BackoffSchedule, String> {
        let delays = parse_delays(&self.poll_delays_ms)?;
        Ok(BackoffSchedule::new(delays, self.poll_jitter_percent))
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        self.upstream.validate()?;

        if self.consumers == 0 {
            return Err("CONSUMERS must be at least 1".to_string());
        }
        if self.queue_capacity == 0 || self.forward_buffer == 0 {
            return Err("QUEUE_CAPACITY and FORWARD_BUFFER must be at least 1".to_string());
        }
        if self.page_size == 0 {
            return Err("PAGE_SIZE must be at least 1".to_string());
        }
        if self.poll_jitter_percent > 100 {
            return Err("POLL_JITTER_PERCENT must be between 0 and 100".to_string());
        }
        if self.checkpoint_every == 0 {
            return Err("CHECKPOINT_EVERY must be at least 1".to_string());
        }
        if self.max_concurrent_partitions == 0 {
            return Err("MAX_CONCURRENT_PARTITIONS must be at least 1".to_string());
        }
        self.poll_schedule()?;

        Ok(())
    }
}

/// Parse a comma-separated list of millisecond delays
pub fn parse_delays(raw: &str) -> Result<Vec<Duration>, String> {
    let delays = raw
        .split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<u64>()
                .map(Duration::from_millis)
                .map_err(|_| format!("Invalid poll delay '{}'", s))
        })
        .collect::<Result<Vec<_>, _>>()?;

    if delays.is_empty() {
        return Err("POLL_DELAYS_MS must contain at least one delay".to_string());
    }
    Ok(delays)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_delays() {
        let delays = parse_delays("100, 250,1000").unwrap();
        assert_eq!(
            delays,
            vec![
                Duration::from_millis(100),
                Duration::from_millis(250),
                Duration::from_millis(1000)
            ]
        );
        assert!(parse_delays("").is_err());
        assert!(parse_delays("10,abc").is_err());
    }

    #[test]
    fn test_defaults_validate() {
        let args = Args::parse_from(["dialog-sync"]);
        assert!(args.validate().is_ok());
        assert_eq!(args.consumers, 8);
        assert_eq!(args.mongo.mongodb_db, "dialog_sync");
    }

    #[test]
    fn test_rejects_zero_consumers() {
        let args = Args::parse_from(["dialog-sync", "--consumers", "0"]);
        assert!(args.validate().is_err());
    }
}
