//! Remote connection lifecycle.
//!
//! A [`Connectable`] walks the state machine
//! `Closed → Opening → Open → Closing → Closed`. Backends never call
//! [`Connectable::open`] directly; every public operation enters a
//! [`ConnectionScope`] instead, which opens the connection only when it is
//! closed and closes it again only if it was the one that opened it.
//!
//! A connection is shared by every operation on one backend instance and is
//! not safe for concurrent use by independent callers: the mutex keeps
//! individual libssh2 calls from interleaving, but it does not stop one
//! caller's scope from closing a session another caller is relying on.
//! Callers that issue concurrent operations on one backend should pre-open
//! the connection or serialize their calls.
//!
//! A transport failure inside a scope drops the session and marks it lost;
//! the next step run through [`with_live_connection`] reopens it, so retries
//! never reuse a dead session.

pub mod scope;

pub use scope::ConnectionScope;

use std::sync::{Mutex, MutexGuard};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::errors::TransferError;

/// Observable state of a remote connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ConnectionStatus {
    Closed,
    Opening,
    Open,
    Closing,
}

/// A connection that can be opened and closed in place.
pub trait Connectable {
    fn status(&self) -> ConnectionStatus;

    fn is_open(&self) -> bool {
        self.status() == ConnectionStatus::Open
    }

    /// Transition `Closed → Opening → Open`.
    ///
    /// On failure the connection must be left `Closed` and the error
    /// reported as [`TransferError::ConnectionFailed`].
    fn open(&mut self) -> Result<(), TransferError>;

    /// Transition `Open → Closing → Closed`. Closing a closed connection
    /// is a no-op. Clears the lost mark.
    fn close(&mut self);

    /// Whether a transport failure dropped the connection since it was last
    /// opened or closed on purpose.
    fn is_lost(&self) -> bool;

    /// Close after a transport failure, leaving the connection marked lost.
    fn mark_lost(&mut self);
}

/// Lock a shared connection, mapping poisoning to a transfer error.
pub(crate) fn lock_connection<C>(connection: &Mutex<C>) -> Result<MutexGuard<'_, C>, TransferError> {
    connection
        .lock()
        .map_err(|e| TransferError::OperationFailed(format!("Failed to lock connection: {e}")))
}

/// Run one step against the open connection in `connection`.
///
/// A [`TransferError::Transport`] from `f` marks the connection lost. A lost
/// connection is reopened before `f` runs; a failed reopen is reported as a
/// transport error so it counts against the caller's retry budget. A
/// connection that was never opened is handed to `f` as-is.
pub(crate) fn with_live_connection<C, T, F>(
    connection: &Mutex<C>,
    f: F,
) -> Result<T, TransferError>
where
    C: Connectable,
    F: FnOnce(&C) -> Result<T, TransferError>,
{
    let mut guard = lock_connection(connection)?;
    if guard.is_lost() {
        guard
            .open()
            .map_err(|e| TransferError::Transport(format!("Reconnect failed: {e}")))?;
        info!("connection reopened after transport failure");
    }

    let result = f(&*guard);
    if let Err(TransferError::Transport(e)) = &result {
        warn!(error = %e, "transport failure, dropping connection");
        guard.mark_lost();
    }
    result
}
