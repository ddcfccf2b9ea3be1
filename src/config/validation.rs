// Configuration validation
//
// Validates that required fields are present and values are sensible

use super::*;
use anyhow::{bail, Result};
use std::net::SocketAddr;
use tracing::warn;

pub fn validate_config(config: &RuntimeConfig) -> Result<()> {
    validate_server_config(&config.server)?;
    validate_request_config(&config.request)?;
    validate_rum_config(&config.rum)?;
    validate_queue_config(&config.queue)?;
    Ok(())
}

fn validate_server_config(config: &ServerConfig) -> Result<()> {
    if config.listen_addr.is_empty() {
        bail!("server.listen_addr must not be empty");
    }

    if config.listen_addr.parse::<SocketAddr>().is_err() {
        bail!(
            "server.listen_addr must be in format 'host:port', got '{}'",
            config.listen_addr
        );
    }

    Ok(())
}

fn validate_request_config(config: &RequestConfig) -> Result<()> {
    if config.max_unzipped_size == 0 {
        bail!("request.max_unzipped_size must be greater than 0");
    }

    if config.concurrent_requests == 0 {
        bail!("request.concurrent_requests must be greater than 0");
    }

    if config.max_unzipped_size > 512 * 1024 * 1024 {
        warn!(
            max_unzipped_size = config.max_unzipped_size,
            "request.max_unzipped_size is very large; may cause memory issues"
        );
    }

    if config.concurrent_requests > 10_000 {
        warn!(
            concurrent_requests = config.concurrent_requests,
            "request.concurrent_requests is very large"
        );
    }

    Ok(())
}

fn validate_rum_config(config: &RumConfig) -> Result<()> {
    if config.rate_limit == 0 {
        bail!("rum.rate_limit must be greater than 0");
    }

    if config.enabled && config.allow_origins.is_empty() {
        bail!(
            "rum.allow_origins must not be empty when RUM is enabled\n\n\
            How to fix:\n\
              • Environment: export {}RUM_ALLOW_ORIGINS='*'\n\
              • TOML: [rum]\n              allow_origins = [\"*\"]\n",
            ENV_PREFIX
        );
    }

    Ok(())
}

fn validate_queue_config(config: &QueueConfig) -> Result<()> {
    if config.capacity == 0 {
        bail!("queue.capacity must be greater than 0");
    }

    if config.capacity > 1_000_000 {
        warn!(
            capacity = config.capacity,
            "queue.capacity is very large; may cause memory issues"
        );
    }

    Ok(())
}
