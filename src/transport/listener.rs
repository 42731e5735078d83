//! TCP listener binding with bounded retry.
//!
//! # Responsibilities
//! - Parse the configured bind address
//! - Bind, retrying after a fixed delay on failure (port still held by a
//!   previous process, interface not up yet)
//! - Report every failed attempt to the caller
//!
//! # Design Decisions
//! - Retry count is bounded so startup always terminates
//! - An unparsable address is not retried; it will never succeed

use std::net::SocketAddr;

use thiserror::Error;
use tokio::net::TcpListener;

use crate::config::BindRetryConfig;

/// Error type for listener operations.
#[derive(Debug, Error)]
pub enum ListenerError {
    /// The configured address is not a socket address.
    #[error("Invalid bind address `{address}`: {reason}")]
    InvalidAddress { address: String, reason: String },

    /// Every bind attempt failed.
    #[error("Failed to bind after {attempts} attempts: {last_error}")]
    Exhausted {
        attempts: u32,
        last_error: std::io::Error,
    },
}

/// A successfully bound listener.
#[derive(Debug)]
pub struct BoundListener {
    pub listener: TcpListener,
    pub local_addr: SocketAddr,
    /// Attempts made, including the successful one.
    pub attempts: u32,
}

/// Bind `address`, retrying per `retry`. `on_failure` is called with the
/// attempt number and error after each failed attempt.
pub async fn bind_with_retry<F>(
    address: &str,
    retry: &BindRetryConfig,
    mut on_failure: F,
) -> Result<BoundListener, ListenerError>
where
    F: FnMut(u32, &std::io::Error),
{
    let addr: SocketAddr = address.parse().map_err(|e: std::net::AddrParseError| {
        ListenerError::InvalidAddress {
            address: address.to_string(),
            reason: e.to_string(),
        }
    })?;

    let max_attempts = retry.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        attempt += 1;

        let bound = match TcpListener::bind(addr).await {
            Ok(listener) => listener.local_addr().map(|local| (listener, local)),
            Err(e) => Err(e),
        };

        match bound {
            Ok((listener, local_addr)) => {
                tracing::info!(address = %local_addr, attempt, "Listener bound");
                return Ok(BoundListener {
                    listener,
                    local_addr,
                    attempts: attempt,
                });
            }
            Err(e) => {
                tracing::warn!(
                    address = %addr,
                    attempt,
                    max_attempts,
                    error = %e,
                    "Bind failed"
                );
                on_failure(attempt, &e);

                if attempt >= max_attempts {
                    return Err(ListenerError::Exhausted {
                        attempts: attempt,
                        last_error: e,
                    });
                }
                tokio::time::sleep(retry.delay()).await;
            }
        }
    }
}
