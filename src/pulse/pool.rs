//! Reusable connections for blocking pops.
//!
//! A blocking pop ties up its connection until it returns, so it cannot share
//! the store's multiplexed connection. Checked-out connections go back to the
//! pool only after a completed pop; a checkout dropped mid-command (timeout,
//! cancellation, error) closes its connection so the server abandons the pop
//! instead of swallowing the next token.

use std::future::Future;
use std::sync::Mutex;

use crate::error_handling::AttenuatorError;

/// Idle connections, created on demand and kept up to `max_idle`.
#[derive(Debug)]
pub(crate) struct ConnectionPool<C> {
    idle: Mutex<Vec<C>>,
    max_idle: usize,
}

impl<C> ConnectionPool<C> {
    pub(crate) fn new(max_idle: usize) -> Self {
        ConnectionPool {
            idle: Mutex::new(Vec::with_capacity(max_idle)),
            max_idle,
        }
    }

    /// Takes an idle connection, or opens one with `connect` if none is idle.
    ///
    /// Never waits on other checkouts.
    pub(crate) async fn checkout<F, Fut>(&self, connect: F) -> Result<Checkout<'_, C>, AttenuatorError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<C, AttenuatorError>>,
    {
        let reused = self.idle.lock().unwrap_or_else(|e| e.into_inner()).pop();
        let conn = match reused {
            Some(conn) => conn,
            None => connect().await?,
        };
        Ok(Checkout { pool: self, conn })
    }

    #[cfg(test)]
    fn idle_len(&self) -> usize {
        self.idle.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    fn put_back(&self, conn: C) {
        let mut idle = self.idle.lock().unwrap_or_else(|e| e.into_inner());
        if idle.len() < self.max_idle {
            idle.push(conn);
        }
    }
}

/// A connection on loan from a [`ConnectionPool`].
///
/// Dropping it without [`Checkout::release`] closes the connection.
pub(crate) struct Checkout<'a, C> {
    pool: &'a ConnectionPool<C>,
    conn: C,
}

impl<C> Checkout<'_, C> {
    pub(crate) fn conn(&mut self) -> &mut C {
        &mut self.conn
    }

    /// Returns the connection to the pool for reuse.
    pub(crate) fn release(self) {
        self.pool.put_back(self.conn);
    }
}
