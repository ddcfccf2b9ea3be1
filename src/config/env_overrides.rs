use super::{LogFormat, RuntimeConfig};
use anyhow::{anyhow, Context, Result};

pub const ENV_PREFIX: &str = "APM_INTAKE_";

/// Abstraction over environment-variable lookups so tests can supply their
/// own source of overrides.
pub trait EnvSource {
    /// Get a variable by its name without the APM_INTAKE_ prefix.
    fn get(&self, key: &str) -> Option<String>;
}

/// Apply environment-variable overrides (highest priority) to the runtime config.
pub fn apply_env_overrides<E: EnvSource>(config: &mut RuntimeConfig, env: &E) -> Result<()> {
    // Server configuration (listen addr, log level/format)
    if let Some(addr) = get_env_string(env, "LISTEN_ADDR") {
        config.server.listen_addr = addr;
    }
    if let Some(level) = get_env_string(env, "LOG_LEVEL") {
        config.server.log_level = level;
    }
    if let Some(format) = get_env_string(env, "LOG_FORMAT") {
        config.server.log_format = format
            .parse::<LogFormat>()
            .context("Invalid APM_INTAKE_LOG_FORMAT value")?;
    }

    // Request configuration
    if let Some(val) = get_env_u64(env, "MAX_UNZIPPED_SIZE")? {
        config.request.max_unzipped_size = val;
    }
    if let Some(val) = get_env_usize(env, "CONCURRENT_REQUESTS")? {
        config.request.concurrent_requests = val;
    }
    if let Some(val) = get_env_u64(env, "MAX_REQUEST_QUEUE_TIME_MS")? {
        config.request.max_request_queue_time_ms = val;
    }
    if let Some(val) = get_env_bool(env, "AUGMENT_ENABLED")? {
        config.request.augment_enabled = val;
    }

    // Auth
    if let Some(token) = get_env_string(env, "SECRET_TOKEN") {
        config.auth.secret_token = Some(token);
    }

    // RUM endpoints
    if let Some(val) = get_env_bool(env, "RUM_ENABLED")? {
        config.rum.enabled = val;
    }
    if let Some(val) = get_env_u32(env, "RUM_RATE_LIMIT")? {
        config.rum.rate_limit = val;
    }
    if let Some(origins) = get_env_string(env, "RUM_ALLOW_ORIGINS") {
        config.rum.allow_origins = split_list(&origins);
    }

    // Legacy metrics endpoint
    if let Some(val) = get_env_bool(env, "METRICS_ENABLED")? {
        config.metrics.enabled = val;
    }

    // Publishing queue
    if let Some(val) = get_env_usize(env, "QUEUE_CAPACITY")? {
        config.queue.capacity = val;
    }
    if let Some(val) = get_env_u64(env, "PROCESSING_TIMEOUT_MS")? {
        config.queue.processing_timeout_ms = val;
    }

    Ok(())
}

fn get_env_string<E: EnvSource>(env: &E, key: &str) -> Option<String> {
    env.get(key)
}

fn parse_env<E, T>(env: &E, key: &str) -> Result<Option<T>>
where
    E: EnvSource,
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match get_env_string(env, key) {
        Some(val) => {
            let parsed = val
                .trim()
                .parse::<T>()
                .map_err(|e| anyhow!("Failed to parse {}{}: {}", ENV_PREFIX, key, e))?;
            Ok(Some(parsed))
        }
        None => Ok(None),
    }
}

fn get_env_usize<E: EnvSource>(env: &E, key: &str) -> Result<Option<usize>> {
    parse_env(env, key)
}

fn get_env_u64<E: EnvSource>(env: &E, key: &str) -> Result<Option<u64>> {
    parse_env(env, key)
}

fn get_env_u32<E: EnvSource>(env: &E, key: &str) -> Result<Option<u32>> {
    parse_env(env, key)
}

fn get_env_bool<E: EnvSource>(env: &E, key: &str) -> Result<Option<bool>> {
    match get_env_string(env, key) {
        Some(val) => {
            let parsed = val.trim().parse::<bool>().map_err(|e| {
                anyhow!(
                    "Failed to parse {}{} (expected bool): {}",
                    ENV_PREFIX,
                    key,
                    e
                )
            })?;
            Ok(Some(parsed))
        }
        None => Ok(None),
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
