//! Startup notification mail.

use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use tracing::info;

use crate::error::{Error, Result};

const SENDER: &str = "Camlistore Website <noreply@camlistore.org>";
const SUBJECT: &str = "Camlistore camweb restarting";
const DEFAULT_SMTP_PORT: u16 = 25;

/// Tells the commits list that the site is restarting, and at which revision.
pub struct StartupMail {
    pub recipients: Vec<String>,
    /// Unauthenticated relay, `host[:port]`.
    pub relay: String,
}

impl StartupMail {
    pub fn message(&self, revision: &str) -> Result<Message> {
        let from: Mailbox = SENDER.parse().map_err(|e| Error::Mail(format!("sender: {e}")))?;
        let mut builder = Message::builder().from(from).subject(SUBJECT).header(ContentType::TEXT_PLAIN);
        for to in &self.recipients {
            let to: Mailbox = to.parse().map_err(|e| Error::Mail(format!("recipient {to:?}: {e}")))?;
            builder = builder.to(to);
        }
        builder
            .body(format!("Camlistore website starting with revision {revision}.\n"))
            .map_err(|e| Error::Mail(e.to_string()))
    }

    /// Sends the mail through the relay. No recipients is not an error.
    pub async fn send(&self, revision: &str) -> Result<()> {
        if self.recipients.is_empty() {
            return Ok(());
        }
        let message = self.message(revision)?;
        let (host, port) = split_relay(&self.relay)?;
        let transport = AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(host).port(port).build();
        transport.send(message).await.map_err(|e| Error::Mail(format!("{}: {e}", self.relay)))?;
        info!(recipients = self.recipients.len(), "sent startup email");
        Ok(())
    }
}

fn split_relay(relay: &str) -> Result<(&str, u16)> {
    match relay.rsplit_once(':') {
        Some((host, port)) => {
            let port = port.parse().map_err(|_| Error::Mail(format!("bad relay port in {relay:?}")))?;
            Ok((host, port))
        }
        None if relay.is_empty() => Err(Error::Mail("no SMTP relay configured".into())),
        None => Ok((relay, DEFAULT_SMTP_PORT)),
    }
}
