//! Poll group receive loop
//!
//! Drains every pending message of the poll group within one call. A round
//! that fills the whole buffer means more may be waiting, so another round
//! follows immediately; a short round ends the tick.

use tracing::{trace, warn};

use super::handler::SessionHandler;
use super::manager::SessionManager;
use super::message::MessageGuard;
use crate::config::HandlerErrorPolicy;
use crate::error::{Result, SessionError};
use crate::metrics::METRICS;
use crate::transport::Transport;

/// Outcome of one `receive` call
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReceiveStats {
    /// Receive calls made on the poll group
    pub rounds: usize,
    /// Messages handed to `on_message`
    pub dispatched: usize,
    /// Handler failures tolerated under the `continue` policy
    pub failed: usize,
    /// Payload bytes dispatched
    pub bytes: usize,
    /// The round limit stopped the drain with the buffer still saturated
    pub truncated: bool,
}

impl<T: Transport, H: SessionHandler<T>> SessionManager<T, H> {
    /// Drain the poll group using the configured buffer capacity
    pub fn receive(&mut self) -> Result<ReceiveStats> {
        let capacity = self.context.config.receive_capacity;
        self.receive_with_capacity(capacity)
    }

    /// Drain the poll group, `capacity` message handles per round
    ///
    /// `BufferExhausted` is transient; retry next tick. A transport failure
    /// is reported as `Transport`, never as an empty drain.
    pub fn receive_with_capacity(&mut self, capacity: usize) -> Result<ReceiveStats> {
        if capacity == 0 {
            return Err(SessionError::InvalidCapacity);
        }
        if self.context.poll_group.is_none() {
            return Err(SessionError::NotInitialized);
        }

        let max_rounds = self.context.config.max_drain_rounds;
        let mut stats = ReceiveStats::default();

        loop {
            let received = self.receive_round(capacity, &mut stats)?;
            if received < capacity {
                break;
            }
            if max_rounds > 0 && stats.rounds >= max_rounds {
                warn!(
                    rounds = stats.rounds,
                    capacity,
                    "Drain round limit reached; backlog left for next tick"
                );
                stats.truncated = true;
                break;
            }
        }

        trace!(
            rounds = stats.rounds,
            dispatched = stats.dispatched,
            bytes = stats.bytes,
            "Receive complete"
        );
        Ok(stats)
    }

    /// One buffer's worth: fetch, dispatch, release
    fn receive_round(&mut self, capacity: usize, stats: &mut ReceiveStats) -> Result<usize> {
        let mut buffer = self.pool.acquire(capacity)?;

        let received = match buffer.fill(&self.context.transport, self.context.poll_group) {
            Ok(received) => received,
            Err(e) => {
                METRICS.transport_error();
                warn!(group = %self.context.poll_group, error = %e, "Poll group receive failed");
                return Err(e.into());
            }
        };
        stats.rounds += 1;
        METRICS.drain_round();

        while let Some(raw) = buffer.take_next() {
            let guard = MessageGuard::new(raw);
            let Some(message) = guard.message() else {
                continue;
            };

            let connection = message.connection;
            let bytes = message.len();
            self.context.registry.record_message(connection, bytes);
            METRICS.message_received(bytes);

            let result = self.handler.on_message(&self.context, &message);
            drop(guard);

            stats.dispatched += 1;
            stats.bytes += bytes;

            if let Err(source) = result {
                METRICS.handler_failure();
                match self.context.config.on_handler_error {
                    HandlerErrorPolicy::Stop => {
                        let skipped = buffer.release_remaining();
                        warn!(
                            conn = %connection,
                            skipped,
                            error = %source,
                            "Message handler failed; released remaining buffered messages"
                        );
                        return Err(SessionError::Handler { connection, source });
                    }
                    HandlerErrorPolicy::Continue => {
                        stats.failed += 1;
                        warn!(conn = %connection, error = %source, "Message handler failed");
                    }
                }
            }
        }

        Ok(received)
    }
}
