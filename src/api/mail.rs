//! Outgoing email. Without an SMTP relay configured, messages are written to the log instead.
use crate::config::Config;
use crate::twoface::{BlockingResp, Fallible};
use actix_web::web;
use lettre::{
    message::{header::ContentType, Mailbox},
    Message, SmtpTransport, Transport,
};
#[cfg(test)]
use std::sync::Mutex;
use tracing::info;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMail {
    pub to: String,
    pub subject: String,
    pub body: String,
}

pub enum Mailer {
    /// Log the whole formatted message.
    Console { from: Mailbox },
    Smtp {
        from: Mailbox,
        transport: SmtpTransport,
    },
    /// Keep sent mail in memory so tests can read it.
    #[cfg(test)]
    Outbox(Mutex<Vec<OutgoingMail>>),
}

impl Mailer {
    pub fn from_config(config: &Config) -> Fallible<Self> {
        let from: Mailbox = config.mail_from.parse()?;
        let mailer = match &config.smtp_host {
            Some(host) => Mailer::Smtp {
                from,
                transport: SmtpTransport::builder_dangerous(host)
                    .port(config.smtp_port)
                    .build(),
            },
            None => Mailer::Console { from },
        };
        Ok(mailer)
    }

    #[cfg(test)]
    pub fn outbox() -> Self {
        Mailer::Outbox(Mutex::new(Vec::new()))
    }

    #[cfg(test)]
    pub fn sent(&self) -> Vec<OutgoingMail> {
        match self {
            Mailer::Outbox(sent) => sent.lock().unwrap().clone(),
            _ => Vec::new(),
        }
    }

    pub async fn send(&self, mail: OutgoingMail) -> Fallible<()> {
        match self {
            Mailer::Console { from } => {
                let message = build_message(from, &mail)?;
                info!(
                    to = &mail.to[..],
                    message = %String::from_utf8_lossy(&message.formatted()),
                    "email not sent, no SMTP relay configured"
                );
            }
            Mailer::Smtp { from, transport } => {
                let message = build_message(from, &mail)?;
                let transport = transport.clone();
                web::block(move || transport.send(&message))
                    .await
                    .to_resp()?;
                info!(to = &mail.to[..], subject = &mail.subject[..], "sent email");
            }
            #[cfg(test)]
            Mailer::Outbox(sent) => sent.lock().unwrap().push(mail),
        }
        Ok(())
    }
}

fn build_message(from: &Mailbox, mail: &OutgoingMail) -> Fallible<Message> {
    let message = Message::builder()
        .from(from.clone())
        .to(mail.to.parse()?)
        .subject(mail.subject.clone())
        .header(ContentType::TEXT_PLAIN)
        .body(mail.body.clone())?;
    Ok(message)
}
