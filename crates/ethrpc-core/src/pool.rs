//! Bounded pool of reusable transport connections.
//!
//! Capacity is fixed at construction and enforced by a semaphore: a caller
//! must hold a permit to hold a connection, so the number of checked-out
//! connections can never exceed capacity. Connections are opened lazily the
//! first time a permit finds the idle list empty.
//!
//! A checked-out connection is a [`PooledConnection`] guard. Dropping it (on
//! success, error or panic) returns the connection and its slot to the pool.
//! Because the guard is moved into `release`/`discard`, a connection cannot be
//! released twice.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio::sync::{OwnedSemaphorePermit, Semaphore, TryAcquireError};

use crate::error::TransportError;
use crate::transport::{Connection, Transport};

/// Configuration for the connection pool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Maximum number of connections, idle and checked out together.
    pub size: usize,
    /// How long `acquire` waits for a free slot before `PoolExhausted`.
    pub acquire_timeout_ms: u64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            size: 8,
            acquire_timeout_ms: 5_000,
        }
    }
}

struct PoolShared {
    transport: Arc<dyn Transport>,
    idle: Mutex<Vec<Box<dyn Connection>>>,
    permits: Arc<Semaphore>,
    capacity: usize,
}

impl PoolShared {
    fn idle(&self) -> MutexGuard<'_, Vec<Box<dyn Connection>>> {
        self.idle.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Fixed-capacity connection pool over one [`Transport`].
pub struct ConnectionPool {
    shared: Arc<PoolShared>,
    acquire_timeout: Duration,
}

impl ConnectionPool {
    /// Build a pool. A configured size of zero is raised to one.
    pub fn new(transport: Arc<dyn Transport>, config: PoolConfig) -> Self {
        let capacity = config.size.max(1);
        Self {
            shared: Arc::new(PoolShared {
                transport,
                idle: Mutex::new(Vec::with_capacity(capacity)),
                permits: Arc::new(Semaphore::new(capacity)),
                capacity,
            }),
            acquire_timeout: Duration::from_millis(config.acquire_timeout_ms),
        }
    }

    /// Total number of slots.
    pub fn capacity(&self) -> usize {
        self.shared.capacity
    }

    /// Number of connections currently checked out.
    pub fn in_use(&self) -> usize {
        self.shared.capacity - self.shared.permits.available_permits()
    }

    /// Number of open connections waiting in the free list.
    pub fn idle(&self) -> usize {
        self.shared.idle().len()
    }

    pub fn is_closed(&self) -> bool {
        self.shared.permits.is_closed()
    }

    /// Check out a connection, waiting up to the configured timeout for a slot.
    pub async fn acquire(&self) -> Result<PooledConnection, TransportError> {
        let start = Instant::now();
        let permits = Arc::clone(&self.shared.permits);
        let permit = match tokio::time::timeout(self.acquire_timeout, permits.acquire_owned()).await
        {
            Ok(Ok(permit)) => permit,
            Ok(Err(_)) => return Err(TransportError::PoolClosed),
            Err(_) => {
                let waited_ms = start.elapsed().as_millis() as u64;
                tracing::warn!(
                    waited_ms,
                    capacity = self.shared.capacity,
                    url = %self.shared.transport.url(),
                    "connection pool exhausted"
                );
                return Err(TransportError::PoolExhausted { waited_ms });
            }
        };
        self.checkout(permit).await
    }

    /// Check out a connection only if a slot is free right now.
    pub async fn try_acquire(&self) -> Result<PooledConnection, TransportError> {
        let permit = match Arc::clone(&self.shared.permits).try_acquire_owned() {
            Ok(permit) => permit,
            Err(TryAcquireError::Closed) => return Err(TransportError::PoolClosed),
            Err(TryAcquireError::NoPermits) => {
                return Err(TransportError::PoolExhausted { waited_ms: 0 })
            }
        };
        self.checkout(permit).await
    }

    /// Return a connection to the pool. Equivalent to dropping the guard.
    pub fn release(&self, conn: PooledConnection) {
        drop(conn);
    }

    /// Close every idle connection and refuse further checkouts.
    ///
    /// Connections still checked out are dropped, not closed, when their
    /// guards are: `Drop` cannot await `Connection::close`. Callers that need
    /// an orderly shutdown should `discard` outstanding guards themselves.
    /// Returns the number of idle connections closed.
    pub async fn close(&self) -> usize {
        self.shared.permits.close();
        let conns = std::mem::take(&mut *self.shared.idle());
        let count = conns.len();
        for mut conn in conns {
            if let Err(e) = conn.close().await {
                tracing::debug!(error = %e, "error closing pooled connection");
            }
        }
        tracing::info!(closed = count, url = %self.shared.transport.url(), "connection pool closed");
        count
    }

    async fn checkout(
        &self,
        permit: OwnedSemaphorePermit,
    ) -> Result<PooledConnection, TransportError> {
        let reused = self.shared.idle().pop();
        let conn = match reused {
            Some(conn) => conn,
            None => {
                tracing::debug!(url = %self.shared.transport.url(), "opening pooled connection");
                // On failure the permit drops here and the slot is free again.
                self.shared.transport.open().await?
            }
        };
        Ok(PooledConnection {
            conn: Some(conn),
            shared: Arc::clone(&self.shared),
            mid_send: false,
            _permit: permit,
        })
    }
}

impl std::fmt::Debug for ConnectionPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionPool")
            .field("url", &self.shared.transport.url())
            .field("capacity", &self.capacity())
            .field("in_use", &self.in_use())
            .field("idle", &self.idle())
            .finish()
    }
}

/// A connection checked out of a [`ConnectionPool`].
pub struct PooledConnection {
    conn: Option<Box<dyn Connection>>,
    shared: Arc<PoolShared>,
    // Set while a send is outstanding; a guard dropped mid-send holds a
    // connection in an unknown state and must not return it.
    mid_send: bool,
    // Dropped after `Drop::drop` has put the connection back.
    _permit: OwnedSemaphorePermit,
}

impl PooledConnection {
    /// Send a serialized request on this connection.
    pub async fn send(&mut self, payload: &[u8]) -> Result<Vec<u8>, TransportError> {
        match self.conn.as_mut() {
            Some(conn) => {
                self.mid_send = true;
                let sent = conn.send(payload).await;
                if sent.is_ok() {
                    self.mid_send = false;
                }
                sent
            }
            None => Err(TransportError::Other("connection already discarded".into())),
        }
    }

    /// Close a broken connection instead of returning it to the free list.
    /// The slot is still released.
    pub async fn discard(mut self) {
        if let Some(mut conn) = self.conn.take() {
            if let Err(e) = conn.close().await {
                tracing::debug!(error = %e, "error closing discarded connection");
            }
        }
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            if self.mid_send {
                tracing::debug!(url = %self.shared.transport.url(), "dropping connection abandoned mid-send");
            } else if !self.shared.permits.is_closed() {
                self.shared.idle().push(conn);
            }
        }
    }
}

impl std::fmt::Debug for PooledConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PooledConnection")
            .field("url", &self.shared.transport.url())
            .field("has_conn", &self.conn.is_some())
            .field("mid_send", &self.mid_send)
            .finish()
    }
}
