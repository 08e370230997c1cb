//! The SFTP session as a [`Connectable`].

use tracing::{debug, info, warn};

use super::auth::connect_and_authenticate;
use crate::config::SftpConfig;
use crate::connection::{Connectable, ConnectionStatus};
use crate::errors::TransferError;

/// Live handles of an open session.
struct SftpState {
    session: ssh2::Session,
    sftp: ssh2::Sftp,
}

/// One SSH session with its SFTP subsystem.
pub struct SftpConnection {
    config: SftpConfig,
    status: ConnectionStatus,
    state: Option<SftpState>,
    lost: bool,
}

impl SftpConnection {
    pub fn new(config: SftpConfig) -> Self {
        Self {
            config,
            status: ConnectionStatus::Closed,
            state: None,
            lost: false,
        }
    }

    pub fn config(&self) -> &SftpConfig {
        &self.config
    }

    /// The SFTP channel, present only while the connection is open.
    pub(crate) fn sftp(&self) -> Option<&ssh2::Sftp> {
        match (&self.state, self.status) {
            (Some(state), ConnectionStatus::Open) => Some(&state.sftp),
            _ => None,
        }
    }

    fn establish(&self) -> Result<SftpState, TransferError> {
        let session = connect_and_authenticate(&self.config)?;
        session.set_blocking(true);
        let sftp = session
            .sftp()
            .map_err(|e| TransferError::ConnectionFailed(format!("SFTP init failed: {e}")))?;
        Ok(SftpState { session, sftp })
    }
}

impl Connectable for SftpConnection {
    fn status(&self) -> ConnectionStatus {
        self.status
    }

    fn open(&mut self) -> Result<(), TransferError> {
        if self.is_open() {
            return Ok(());
        }
        self.status = ConnectionStatus::Opening;
        debug!(host = %self.config.host, port = self.config.port, "opening sftp connection");

        match self.establish() {
            Ok(state) => {
                self.state = Some(state);
                self.status = ConnectionStatus::Open;
                self.lost = false;
                info!(host = %self.config.host, "sftp connection open");
                Ok(())
            }
            Err(e) => {
                self.state = None;
                self.status = ConnectionStatus::Closed;
                warn!(host = %self.config.host, error = %e, "sftp connection failed");
                Err(match e {
                    TransferError::ConnectionFailed(_) => e,
                    other => TransferError::ConnectionFailed(other.to_string()),
                })
            }
        }
    }

    fn close(&mut self) {
        self.lost = false;
        let Some(state) = self.state.take() else {
            self.status = ConnectionStatus::Closed;
            return;
        };
        self.status = ConnectionStatus::Closing;

        let SftpState { session, sftp } = state;
        drop(sftp);
        if let Err(e) = session.disconnect(None, "closing", None) {
            debug!(error = %e, "sftp disconnect reported an error");
        }

        self.status = ConnectionStatus::Closed;
        debug!(host = %self.config.host, "sftp connection closed");
    }

    fn is_lost(&self) -> bool {
        self.lost
    }

    fn mark_lost(&mut self) {
        self.close();
        self.lost = true;
    }
}

impl Drop for SftpConnection {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unreachable_config() -> SftpConfig {
        SftpConfig {
            host: "127.0.0.1".to_string(),
            // Port 1 is reserved and refuses connections on test hosts.
            port: 1,
            username: "nobody".to_string(),
            timeout_ms: 500,
            ..SftpConfig::default()
        }
    }

    #[test]
    fn new_connection_is_closed() {
        let conn = SftpConnection::new(unreachable_config());
        assert_eq!(conn.status(), ConnectionStatus::Closed);
        assert!(conn.sftp().is_none());
    }

    #[test]
    fn failed_open_leaves_connection_closed() {
        let mut conn = SftpConnection::new(unreachable_config());
        let err = conn.open().unwrap_err();
        assert!(matches!(err, TransferError::ConnectionFailed(_)));
        assert_eq!(conn.status(), ConnectionStatus::Closed);
        assert!(conn.sftp().is_none());
    }

    #[test]
    fn closing_closed_connection_is_noop() {
        let mut conn = SftpConnection::new(unreachable_config());
        conn.close();
        conn.close();
        assert_eq!(conn.status(), ConnectionStatus::Closed);
    }

    #[test]
    fn lost_mark_survives_failed_reopen_until_closed() {
        let mut conn = SftpConnection::new(unreachable_config());
        conn.mark_lost();
        assert!(conn.is_lost());
        assert!(conn.open().is_err());
        assert!(conn.is_lost());
        conn.close();
        assert!(!conn.is_lost());
    }
}
