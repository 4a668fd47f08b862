//! Envio do CSV por e-mail via SMTP (`lettre`).
//!
//! STARTTLS é exigido por padrão (`require_tls`). Com ele desligado o upgrade
//! só acontece quando o servidor anuncia suporte.

use crate::error::ExportError;
use lettre::message::header::ContentType;
use lettre::message::{Attachment as MimeAttachment, Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::transport::smtp::client::{Tls, TlsParameters};
use lettre::{Message, SmtpTransport, Transport};
use sensornet_core::config::MailConfig;
use std::time::Duration;
use tracing::{debug, info};

/// Anexo único da mensagem.
#[derive(Debug, Clone)]
pub struct Attachment {
    pub filename: String,
    pub content_type: String,
    pub content: Vec<u8>,
}

/// Mensagem com um anexo.
#[derive(Debug, Clone)]
pub struct MailMessage {
    pub from: String,
    /// Destinatários (separados por vírgula no config)
    pub to: Vec<String>,
    pub subject: String,
    pub body: String,
    pub attachment: Attachment,
}

impl MailMessage {
    /// Mensagem do export semanal.
    pub fn csv_export(config: &MailConfig, filename: &str, csv: &str) -> Self {
        Self {
            from: config.sender().to_string(),
            to: config
                .to
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect(),
            subject: config.subject.clone(),
            body: String::new(),
            attachment: Attachment {
                filename: filename.to_string(),
                content_type: "text/csv".into(),
                content: csv.as_bytes().to_vec(),
            },
        }
    }

    /// Monta a mensagem MIME multipart (texto + anexo).
    pub fn to_email(&self) -> Result<Message, ExportError> {
        let mut builder = Message::builder()
            .from(self.from.parse::<Mailbox>()?)
            .subject(self.subject.as_str());
        for rcpt in &self.to {
            builder = builder.to(rcpt.parse::<Mailbox>()?);
        }

        let att = &self.attachment;
        let content_type = ContentType::parse(&att.content_type)
            .map_err(|e| ExportError::Mail(format!("content-type {}: {e}", att.content_type)))?;
        let attachment =
            MimeAttachment::new(att.filename.clone()).body(att.content.clone(), content_type);

        let email = builder.multipart(
            MultiPart::mixed()
                .singlepart(SinglePart::plain(self.body.clone()))
                .singlepart(attachment),
        )?;
        Ok(email)
    }
}

/// Transporte de e-mail.
pub trait MailTransport {
    fn send(&self, message: &MailMessage) -> Result<(), ExportError>;
}

/// Transporte SMTP com STARTTLS.
pub struct SmtpMailer {
    transport: SmtpTransport,
}

impl SmtpMailer {
    pub fn new(config: &MailConfig) -> Result<Self, ExportError> {
        let params = TlsParameters::new(config.smtp_host.clone())?;
        let tls = if config.require_tls {
            Tls::Required(params)
        } else {
            Tls::Opportunistic(params)
        };

        let mut builder = SmtpTransport::builder_dangerous(config.smtp_host.as_str())
            .port(config.smtp_port)
            .tls(tls)
            .timeout(Some(Duration::from_secs(30)));

        if !config.smtp_user.is_empty() {
            debug!("SMTP com autenticação como {}", config.smtp_user);
            builder = builder.credentials(Credentials::new(
                config.smtp_user.clone(),
                config.smtp_pass.clone(),
            ));
        }

        Ok(Self {
            transport: builder.build(),
        })
    }
}

impl MailTransport for SmtpMailer {
    fn send(&self, message: &MailMessage) -> Result<(), ExportError> {
        if message.to.is_empty() {
            return Err(ExportError::Config("nenhum destinatário".into()));
        }

        let email = message.to_email()?;
        self.transport.send(&email)?;

        info!(
            "E-mail enviado para {} ({})",
            message.to.join(", "),
            message.attachment.filename
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{BufRead, BufReader, Write};
    use std::net::TcpListener;
    use std::sync::mpsc;

    fn config() -> MailConfig {
        MailConfig {
            smtp_user: "gw@example.org".into(),
            to: "a@example.org, b@example.org".into(),
            ..Default::default()
        }
    }

    #[test]
    fn splits_recipients() {
        let msg = MailMessage::csv_export(&config(), "x.csv", "timestamp\n");
        assert_eq!(msg.to, ["a@example.org", "b@example.org"]);
        assert_eq!(msg.from, "gw@example.org");
        assert_eq!(msg.subject, "ThingsBoard: 7-day-CSV-Export");
    }

    #[test]
    fn explicit_sender_wins_over_user() {
        let mut cfg = config();
        cfg.from = "export@example.org".into();
        let msg = MailMessage::csv_export(&cfg, "x.csv", "");
        assert_eq!(msg.from, "export@example.org");
    }

    #[test]
    fn email_carries_csv_attachment() {
        let msg = MailMessage::csv_export(&config(), "export.csv", "timestamp,node\n");
        let raw = String::from_utf8(msg.to_email().unwrap().formatted()).unwrap();
        assert!(raw.contains("Subject: ThingsBoard: 7-day-CSV-Export"));
        assert!(raw.contains("multipart/mixed"));
        assert!(raw.contains("Content-Type: text/csv"));
        assert!(raw.contains("filename=\"export.csv\""));
    }

    #[test]
    fn invalid_address_is_an_error() {
        let mut cfg = config();
        cfg.to = "sem-arroba".into();
        let msg = MailMessage::csv_export(&cfg, "x.csv", "");
        assert!(matches!(msg.to_email(), Err(ExportError::MailAddress(_))));
    }

    /// Servidor SMTP falso sem STARTTLS: responde em sequência e devolve o
    /// que recebeu.
    fn fake_server() -> (u16, mpsc::Receiver<Vec<String>>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let (tx, rx) = mpsc::channel();

        std::thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            let mut reader = BufReader::new(stream.try_clone().unwrap());
            let mut writer = stream;
            let mut seen = Vec::new();
            let mut in_data = false;

            let _ = writer.write_all(b"220 fake ESMTP\r\n");
            loop {
                let mut line = String::new();
                if reader.read_line(&mut line).unwrap_or(0) == 0 {
                    break;
                }
                let line = line.trim_end().to_string();
                seen.push(line.clone());

                if in_data {
                    if line == "." {
                        in_data = false;
                        let _ = writer.write_all(b"250 queued\r\n");
                    }
                    continue;
                }

                let reply: &[u8] = if line.starts_with("EHLO") {
                    b"250 fake\r\n"
                } else if line == "DATA" {
                    in_data = true;
                    b"354 go\r\n"
                } else if line == "QUIT" {
                    let _ = writer.write_all(b"221 bye\r\n");
                    break;
                } else {
                    b"250 ok\r\n"
                };
                let _ = writer.write_all(reply);
            }
            let _ = tx.send(seen);
        });

        (port, rx)
    }

    fn local_config(port: u16, require_tls: bool) -> MailConfig {
        MailConfig {
            smtp_host: "127.0.0.1".into(),
            smtp_port: port,
            smtp_user: String::new(),
            from: "gw@example.org".into(),
            require_tls,
            to: "a@example.org, b@example.org".into(),
            ..Default::default()
        }
    }

    #[test]
    fn smtp_dialogue_without_tls_offer() {
        let (port, rx) = fake_server();
        let cfg = local_config(port, false);

        let msg = MailMessage::csv_export(&cfg, "export.csv", "timestamp\n.hidden\n");
        SmtpMailer::new(&cfg).unwrap().send(&msg).unwrap();

        let seen = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert!(seen[0].starts_with("EHLO"));
        assert!(!seen.iter().any(|l| l.starts_with("AUTH")));
        assert!(seen.iter().any(|l| l.starts_with("MAIL FROM:<gw@example.org>")));
        assert!(seen.iter().any(|l| l.starts_with("RCPT TO:<a@example.org>")));
        assert!(seen.iter().any(|l| l.starts_with("RCPT TO:<b@example.org>")));
        assert!(seen.iter().any(|l| l == "Subject: ThingsBoard: 7-day-CSV-Export"));
        assert_eq!(seen.last().unwrap(), "QUIT");
    }

    #[test]
    fn required_tls_refuses_plain_server() {
        let (port, _rx) = fake_server();
        let cfg = local_config(port, true);

        let msg = MailMessage::csv_export(&cfg, "export.csv", "timestamp\n");
        let result = SmtpMailer::new(&cfg).unwrap().send(&msg);
        assert!(matches!(result, Err(ExportError::Smtp(_))));
    }

    #[test]
    fn rejects_without_recipients() {
        let cfg = MailConfig::default();
        let msg = MailMessage::csv_export(&cfg, "x.csv", "");
        assert!(matches!(
            SmtpMailer::new(&cfg).unwrap().send(&msg),
            Err(ExportError::Config(_))
        ));
    }
}
