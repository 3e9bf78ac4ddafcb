//! Command handlers for Ping operations.
//!
//! This module performs the request/response round trip: encode a
//! [`CommandDescriptor`], arm the correlator, write the frame and wait for
//! the matching reply within the caller's timeout.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;

use crate::correlator::{Correlator, Expectation};
use crate::error::{Error, Result};
use crate::protocol::{CommandDescriptor, Message};
use crate::transport::Transport;
use crate::verify::{VerificationResult, verify};

/// Result of a completed round trip.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandOutcome {
    /// The reply that completed the request.
    pub reply: Message,
    /// Echo verification, when it was requested.
    pub verification: Option<VerificationResult>,
}

impl CommandOutcome {
    /// Returns true if the round trip worked and, when verification ran,
    /// every echoed field matched.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.verification.as_ref().is_none_or(|v| v.overall)
    }
}

/// Command handler for Ping operations.
pub struct CommandHandler<T> {
    transport: Arc<Mutex<T>>,
    correlator: Correlator,
    host_id: u8,
    device_id: u8,
}

impl<T> Clone for CommandHandler<T> {
    fn clone(&self) -> Self {
        Self {
            transport: Arc::clone(&self.transport),
            correlator: self.correlator.clone(),
            host_id: self.host_id,
            device_id: self.device_id,
        }
    }
}

impl<T: Transport> CommandHandler<T> {
    /// Creates a new command handler.
    #[must_use]
    pub const fn new(
        transport: Arc<Mutex<T>>,
        correlator: Correlator,
        host_id: u8,
        device_id: u8,
    ) -> Self {
        Self {
            transport,
            correlator,
            host_id,
            device_id,
        }
    }

    /// Sends `command` and waits for its reply.
    ///
    /// The timeout covers the write as well as the wait. A `nack` for the
    /// command ends the wait early with [`Error::Nack`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::Busy`] without sending if another command is still
    /// waiting, [`Error::Timeout`] if no reply arrives in time, or the
    /// transport's error if the write fails.
    pub async fn send_and_await(
        &self,
        command: &CommandDescriptor,
        timeout: Duration,
    ) -> Result<Message> {
        let frame = command
            .to_message(self.host_id, self.device_id)?
            .encode()?;
        let expect = Expectation {
            command_id: command.id().as_u16(),
            reply_id: command.reply_id(),
        };

        // Arm before sending so a fast reply cannot be missed.
        let pending = self.correlator.arm(expect, timeout)?;

        tracing::debug!(
            "sending {} (expecting {})",
            command.id(),
            command.reply_id()
        );

        let send = async {
            let mut transport = self.transport.lock().await;
            transport.send(frame).await
        };
        match tokio::time::timeout_at(pending.deadline(), send).await {
            Ok(result) => result?,
            Err(_) => {
                return Err(Error::Timeout {
                    timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
                });
            }
        }

        let reply = pending.wait().await?;
        tracing::debug!("{} completed by {}", command.id(), reply);
        Ok(reply)
    }

    /// Runs a round trip and, if `verify_echo` is set, checks the echoed
    /// fields.
    ///
    /// A verification mismatch is reported in the outcome, not as an error.
    ///
    /// # Errors
    ///
    /// Same as [`CommandHandler::send_and_await`].
    pub async fn execute(
        &self,
        command: &CommandDescriptor,
        timeout: Duration,
        verify_echo: bool,
    ) -> Result<CommandOutcome> {
        let reply = self.send_and_await(command, timeout).await?;
        let verification = verify_echo.then(|| verify(command, &reply));
        Ok(CommandOutcome {
            reply,
            verification,
        })
    }

    /// Returns the correlator shared with the dispatcher.
    #[must_use]
    pub const fn correlator(&self) -> &Correlator {
        &self.correlator
    }
}
