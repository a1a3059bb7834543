//! One mail transaction over an open session.

use failmail_common::{config::ClientTimeouts, internal, tracing};
use failmail_smtp::SmtpClient;

use crate::error::{Step, StepError, bounded};

/// MAIL FROM, one RCPT TO per destination, DATA and the message.
///
/// Nothing is sent once a step fails; cleaning up the session is left to
/// the caller.
pub struct Transaction<'a> {
    client: &'a mut SmtpClient,
    timeouts: &'a ClientTimeouts,
}

impl<'a> Transaction<'a> {
    pub(crate) const fn new(client: &'a mut SmtpClient, timeouts: &'a ClientTimeouts) -> Self {
        Self { client, timeouts }
    }

    /// # Errors
    ///
    /// Returns the first step that timed out, failed on the wire, or was
    /// answered with an unexpected code.
    pub async fn execute(
        mut self,
        from: &str,
        destinations: &[String],
        message: &[u8],
    ) -> Result<(), StepError> {
        self.send_mail_from(from).await?;
        self.send_rcpt_to(destinations).await?;
        self.send_message_data(message).await?;

        internal!(
            level = DEBUG,
            "Delivered {} bytes to {} destination(s)",
            message.len(),
            destinations.len()
        );
        Ok(())
    }

    async fn send_mail_from(&mut self, from: &str) -> Result<(), StepError> {
        let response = bounded(
            Step::MailFrom,
            self.timeouts.mail_from(),
            self.client.mail_from(from),
        )
        .await?;

        if !response.is_success() {
            return Err(StepError::rejected(Step::MailFrom, &response));
        }
        Ok(())
    }

    async fn send_rcpt_to(&mut self, destinations: &[String]) -> Result<(), StepError> {
        for destination in destinations {
            let response = bounded(
                Step::RcptTo,
                self.timeouts.rcpt_to(),
                self.client.rcpt_to(destination),
            )
            .await?;

            if !response.is_success() {
                tracing::debug!(%destination, code = response.code, "Recipient refused");
                return Err(StepError::rejected(Step::RcptTo, &response));
            }
        }
        Ok(())
    }

    async fn send_message_data(&mut self, message: &[u8]) -> Result<(), StepError> {
        let response = bounded(Step::Data, self.timeouts.data(), self.client.data()).await?;
        if !response.is_intermediate() {
            return Err(StepError::rejected(Step::Data, &response));
        }

        let response = bounded(
            Step::DataEnd,
            self.timeouts.data(),
            self.client.send_data(message),
        )
        .await?;
        if !response.is_success() {
            return Err(StepError::rejected(Step::DataEnd, &response));
        }
        Ok(())
    }
}
