//! RAII guard that opens a connection for the duration of one call.

use std::sync::{Arc, Mutex};

use tracing::debug;

use super::{lock_connection, Connectable};
use crate::errors::TransferError;

/// Keeps a shared connection open for the lifetime of the guard.
///
/// Entering a scope on a closed connection opens it and marks the scope as
/// its owner; dropping an owning scope closes the connection again. Entering
/// a scope on an already-open connection borrows it and leaves it open on
/// exit, so a caller can pre-open a connection and run a batch of operations
/// without reconnecting between them.
///
/// Opening is attempted once. Retrying belongs to the
/// [`RetryExecutor`](crate::retry::RetryExecutor) wrapping the operation.
pub struct ConnectionScope<C: Connectable> {
    connection: Arc<Mutex<C>>,
    owns_connection: bool,
}

impl<C: Connectable> ConnectionScope<C> {
    /// Enter a scope, opening the connection if it is closed.
    ///
    /// This may block on network I/O; async callers run it on a blocking
    /// thread.
    pub fn enter(connection: &Arc<Mutex<C>>) -> Result<Self, TransferError> {
        let mut guard = lock_connection(connection)?;
        let owns_connection = if guard.is_open() {
            false
        } else {
            guard.open()?;
            debug!("connection opened by scope");
            true
        };
        drop(guard);

        Ok(Self {
            connection: Arc::clone(connection),
            owns_connection,
        })
    }

    /// Whether this scope opened the connection and will close it.
    pub fn owns_connection(&self) -> bool {
        self.owns_connection
    }
}

impl<C: Connectable> Drop for ConnectionScope<C> {
    fn drop(&mut self) {
        if !self.owns_connection {
            return;
        }
        match self.connection.lock() {
            Ok(mut guard) => {
                guard.close();
                debug!("connection closed by scope");
            }
            // Still release the session if a panic poisoned the lock.
            Err(poisoned) => poisoned.into_inner().close(),
        }
    }
}
