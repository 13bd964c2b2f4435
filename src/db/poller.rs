//! Readiness polling.
//!
//! Drives a non-blocking handle until its pending operation completes. The
//! readiness wait is the only place an execution suspends, and the only place
//! cancellation is observed.

use super::{Connection, DriverError, Interest, PollState};
use std::io;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::trace;

/// Reasons a readiness loop stops before the handle is ready.
#[derive(Error, Debug)]
pub enum PollError {
    /// The handle reported a state the loop cannot act on.
    #[error("poll() returned {0}")]
    UnknownState(i32),

    /// Waiting for socket readiness failed.
    #[error("readiness wait interrupted: {0}")]
    Interrupted(#[source] io::Error),

    /// The cancellation token fired during the readiness wait.
    #[error("cancelled while waiting for the server")]
    Cancelled,

    /// The handle itself reported an error.
    #[error(transparent)]
    Driver(#[from] DriverError),
}

/// Polls `conn` until it reports [`PollState::Ok`].
///
/// Between polls the task sleeps until the transport is ready for the
/// direction the handle asked for.
pub async fn wait_until_ready<C>(
    conn: &mut C,
    cancel: &CancellationToken,
) -> Result<(), PollError>
where
    C: Connection + ?Sized,
{
    loop {
        let interest = match conn.poll()? {
            PollState::Ok => return Ok(()),
            PollState::Write => Interest::Writable,
            PollState::Read => Interest::Readable,
            PollState::Unknown(code) => return Err(PollError::UnknownState(code)),
        };
        trace!(?interest, "Waiting for socket readiness");

        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(PollError::Cancelled),
            ready = conn.wait_ready(interest) => ready.map_err(PollError::Interrupted)?,
        }
    }
}
