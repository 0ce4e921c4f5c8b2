//! Email delivery abstraction.
//!
//! Verifier links go out through an `EmailSender`. Dispatch is fire-and-forget:
//! the request that issued the verifier never waits on delivery, and failures
//! are only logged. The default sender is `LogEmailSender`, which logs the
//! message and returns `Ok(())`.

use anyhow::Result;
use std::sync::Arc;
use tracing::{error, info};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EmailMessage {
    pub to_email: String,
    pub subject: String,
    pub html_body: String,
    pub text_body: String,
}

pub trait EmailSender: Send + Sync {
    /// Deliver a message or return an error to have it logged.
    fn send(&self, message: &EmailMessage) -> Result<()>;
}

/// Local dev sender that logs the message instead of sending real email.
#[derive(Clone, Debug)]
pub struct LogEmailSender;

impl EmailSender for LogEmailSender {
    fn send(&self, message: &EmailMessage) -> Result<()> {
        info!(
            to_email = %message.to_email,
            subject = %message.subject,
            body = %message.text_body,
            "email send stub"
        );
        Ok(())
    }
}

/// Send `message` on the blocking pool without holding up the caller.
pub fn dispatch(sender: Arc<dyn EmailSender>, message: EmailMessage) {
    tokio::spawn(async move {
        let to_email = message.to_email.clone();
        match tokio::task::spawn_blocking(move || sender.send(&message)).await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => error!(to_email = %to_email, "Failed to send email: {err:#}"),
            Err(err) => error!(to_email = %to_email, "Email task failed: {err}"),
        }
    });
}


#[cfg(test)]
mod tests {
    use super::test_support::RecordingEmailSender;
    use super::*;
    use anyhow::anyhow;
    use std::time::Duration;

    fn message() -> EmailMessage {
        EmailMessage {
            to_email: "alice@example.com".to_string(),
            subject: "Login to Tessera".to_string(),
            html_body: "<p>hi</p>".to_string(),
            text_body: "hi".to_string(),
        }
    }

    struct FailingSender;

    impl EmailSender for FailingSender {
        fn send(&self, _message: &EmailMessage) -> Result<()> {
            Err(anyhow!("smtp down"))
        }
    }

    #[test]
    fn log_sender_accepts() {
        assert!(LogEmailSender.send(&message()).is_ok());
    }

    #[tokio::test]
    async fn dispatch_delivers_in_background() {
        let sender = Arc::new(RecordingEmailSender::default());
        dispatch(sender.clone(), message());

        for _ in 0..50 {
            if !sender.messages().is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(sender.messages(), vec![message()]);
    }

    #[tokio::test]
    async fn dispatch_swallows_failures() {
        dispatch(Arc::new(FailingSender), message());
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}
