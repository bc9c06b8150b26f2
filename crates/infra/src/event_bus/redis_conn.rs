//! Connection handling shared by the Redis transports.
//!
//! Every connection is opened with a connect timeout and carries read/write
//! timeouts, so a hung server surfaces as [`RedisBusError::Timeout`] instead of
//! blocking the caller.

use std::time::Duration;

use thiserror::Error;

/// Default bound on connecting to Redis and on each command round-trip.
pub const DEFAULT_IO_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Error)]
pub enum RedisBusError {
    #[error("redis did not answer in time: {0}")]
    Timeout(String),

    #[error("redis not connected: {0}")]
    NotConnected(String),

    #[error("redis error: {0}")]
    Redis(String),

    #[error("failed to encode envelope: {0}")]
    Serialize(String),

    #[error("subscription for {0} did not become ready")]
    NotReady(String),
}

impl RedisBusError {
    /// Transport-level failure (the server could not be reached in time).
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Timeout(_) | Self::NotConnected(_))
    }
}

impl From<redis::RedisError> for RedisBusError {
    fn from(err: redis::RedisError) -> Self {
        if err.is_timeout() {
            Self::Timeout(err.to_string())
        } else if err.is_connection_refusal() || err.is_connection_dropped() || err.is_io_error() {
            Self::NotConnected(err.to_string())
        } else {
            Self::Redis(err.to_string())
        }
    }
}

/// Open a connection bounded by `timeout` for connect, reads and writes.
pub(crate) fn connect(
    client: &redis::Client,
    timeout: Duration,
) -> Result<redis::Connection, RedisBusError> {
    let conn = client.get_connection_with_timeout(timeout)?;
    conn.set_read_timeout(Some(timeout))?;
    conn.set_write_timeout(Some(timeout))?;
    Ok(conn)
}

#[cfg(test)]
mod tests {
    use std::io;
    use std::time::Instant;

    use super::*;

    #[test]
    fn io_failures_map_to_transport_errors() {
        let timed_out = RedisBusError::from(redis::RedisError::from(io::Error::new(
            io::ErrorKind::TimedOut,
            "read timed out",
        )));
        assert!(matches!(timed_out, RedisBusError::Timeout(_)));

        let refused = RedisBusError::from(redis::RedisError::from(io::Error::new(
            io::ErrorKind::ConnectionRefused,
            "refused",
        )));
        assert!(matches!(refused, RedisBusError::NotConnected(_)));
        assert!(refused.is_transport());
    }

    #[test]
    fn unreachable_server_fails_within_timeout() {
        // Non-routable address: the connect either times out or is rejected.
        let client = redis::Client::open("redis://10.255.255.1:6379").unwrap();

        let started = Instant::now();
        let err = connect(&client, Duration::from_millis(200)).err().expect("connect should fail");

        assert!(err.is_transport(), "unexpected error: {err}");
        assert!(started.elapsed() < Duration::from_secs(2));
    }
}
