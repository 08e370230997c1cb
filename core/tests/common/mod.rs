//! Shared helpers for the filexfer core integration tests.
//!
//! The SFTP suite runs against the container from
//! `tests/docker/docker-compose.yml` and skips when it is not reachable.

// Each integration test is its own crate and uses a subset of these helpers.
#![allow(dead_code)]

use std::net::{TcpStream, ToSocketAddrs};
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use filexfer_core::config::StorageSettings;
use filexfer_core::retry::RetryOptions;

/// Default port of the `sftp` test container.
pub const PORT_SFTP: u16 = 2222;

/// Host of the SFTP test server (`FILEXFER_SFTP_HOST`, default `127.0.0.1`).
pub fn sftp_host() -> String {
    std::env::var("FILEXFER_SFTP_HOST").unwrap_or_else(|_| "127.0.0.1".to_string())
}

/// Port of the SFTP test server (`FILEXFER_SFTP_PORT`, default [`PORT_SFTP`]).
pub fn sftp_port() -> u16 {
    std::env::var("FILEXFER_SFTP_PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(PORT_SFTP)
}

/// `true` if a TCP connection to `host:port` succeeds within 2 seconds.
pub fn is_port_reachable(host: &str, port: u16) -> bool {
    let Ok(mut addrs) = (host, port).to_socket_addrs() else {
        return false;
    };
    addrs.any(|addr| TcpStream::connect_timeout(&addr, Duration::from_secs(2)).is_ok())
}

/// Skip the current test when the SFTP test server is not reachable.
///
/// Uses a runtime check rather than `#[ignore]` so the suite runs
/// automatically wherever the container is up.
macro_rules! require_sftp {
    () => {
        if !common::is_port_reachable(&common::sftp_host(), common::sftp_port()) {
            eprintln!(
                "SKIPPED: SFTP server not reachable on {}:{} \
                 (start with: cd tests/docker && docker compose up -d)",
                common::sftp_host(),
                common::sftp_port()
            );
            return;
        }
    };
}
pub(crate) use require_sftp;

/// Password-auth config for the test server, rooted at its writable upload
/// directory.
#[cfg(feature = "sftp")]
pub fn sftp_config() -> filexfer_core::config::SftpConfig {
    filexfer_core::config::SftpConfig {
        host: sftp_host(),
        port: sftp_port(),
        username: "testuser".to_string(),
        auth_method: "password".to_string(),
        password: Some("testpass".to_string()),
        root: "/upload".to_string(),
        timeout_ms: 10_000,
        ..Default::default()
    }
}

/// Storage settings with short retry delays so failing tests finish quickly.
pub fn fast_settings() -> StorageSettings {
    StorageSettings {
        retry: RetryOptions {
            max_retries: 2,
            base_delay_ms: 5,
            ..RetryOptions::default()
        },
        ..StorageSettings::default()
    }
}

/// A container name no other test run has used.
pub fn unique_container(prefix: &str) -> String {
    static COUNTER: AtomicU32 = AtomicU32::new(0);
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.subsec_nanos())
        .unwrap_or_default();
    format!(
        "{prefix}-{}-{nanos}-{}",
        std::process::id(),
        COUNTER.fetch_add(1, Ordering::Relaxed)
    )
}

/// Deterministic pseudo-random bytes.
pub fn patterned_bytes(len: usize) -> Vec<u8> {
    let mut state: u32 = 0x9e37_79b9;
    (0..len)
        .map(|_| {
            state ^= state << 13;
            state ^= state >> 17;
            state ^= state << 5;
            (state & 0xff) as u8
        })
        .collect()
}
