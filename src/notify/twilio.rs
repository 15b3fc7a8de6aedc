use anyhow::{anyhow, Context, Result};
use base64::Engine;
use serde::Deserialize;
use std::time::Duration;
use url::Url;

use super::{Notification, Notifier};

pub const DEFAULT_TWILIO_API_BASE: &str = "https://api.twilio.com";

/// Account and addressing for the Twilio Messages API.
#[derive(Clone, Debug)]
pub struct TwilioSettings {
    pub account_sid: String,
    pub auth_token: String,
    /// Sender, e.g. `whatsapp:+14155238886` or a bare number.
    pub from: String,
    /// Recipient, same format as `from`.
    pub to: String,
    /// Prefix bare numbers with `whatsapp:`.
    pub whatsapp: bool,
    pub api_base: String,
    pub timeout: Duration,
}

#[derive(Debug, Deserialize)]
struct MessageCreated {
    sid: String,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    code: Option<u64>,
    message: Option<String>,
}

/// Sends the advisory as a WhatsApp (or SMS) message through Twilio.
pub struct TwilioNotifier {
    settings: TwilioSettings,
    agent: ureq::Agent,
}

impl TwilioNotifier {
    pub fn new(settings: TwilioSettings) -> Result<Self> {
        if settings.account_sid.trim().is_empty() || settings.auth_token.trim().is_empty() {
            return Err(anyhow!("twilio account sid and auth token must be set"));
        }
        if settings.from.trim().is_empty() || settings.to.trim().is_empty() {
            return Err(anyhow!("twilio sender and recipient must be set"));
        }
        Url::parse(&settings.api_base)
            .with_context(|| format!("invalid twilio api base {}", settings.api_base))?;
        let agent = ureq::AgentBuilder::new().timeout(settings.timeout).build();
        Ok(Self { settings, agent })
    }

    fn messages_url(&self) -> Result<Url> {
        let mut url = Url::parse(&self.settings.api_base)?;
        url.path_segments_mut()
            .map_err(|_| anyhow!("twilio api base cannot carry a path"))?
            .pop_if_empty()
            .extend([
                "2010-04-01",
                "Accounts",
                self.settings.account_sid.as_str(),
                "Messages.json",
            ]);
        Ok(url)
    }

    fn authorization(&self) -> String {
        let credentials = format!("{}:{}", self.settings.account_sid, self.settings.auth_token);
        format!(
            "Basic {}",
            base64::engine::general_purpose::STANDARD.encode(credentials)
        )
    }

    fn address(&self, raw: &str) -> String {
        let raw = raw.trim();
        if self.settings.whatsapp && !raw.starts_with("whatsapp:") {
            format!("whatsapp:{}", raw)
        } else {
            raw.to_string()
        }
    }

    fn form_fields(&self, notification: &Notification) -> Vec<(&'static str, String)> {
        let mut fields = vec![
            ("To", self.address(&self.settings.to)),
            ("From", self.address(&self.settings.from)),
            ("Body", notification.body.clone()),
        ];
        if let Some(media) = &notification.media_url {
            fields.push(("MediaUrl", media.clone()));
        }
        fields
    }
}

impl Notifier for TwilioNotifier {
    fn name(&self) -> &'static str {
        "twilio"
    }

    fn send(&self, notification: &Notification) -> Result<String> {
        let url = self.messages_url()?;
        let fields = self.form_fields(notification);
        let form: Vec<(&str, &str)> = fields.iter().map(|(k, v)| (*k, v.as_str())).collect();

        let response = match self
            .agent
            .post(url.as_str())
            .set("Authorization", &self.authorization())
            .send_form(&form)
        {
            Ok(response) => response,
            Err(ureq::Error::Status(status, response)) => {
                let body = response.into_string().unwrap_or_default();
                let detail = serde_json::from_str::<ApiError>(&body)
                    .ok()
                    .map(|e| {
                        format!(
                            "code {}: {}",
                            e.code.map(|c| c.to_string()).unwrap_or_else(|| "?".into()),
                            e.message.unwrap_or_default()
                        )
                    })
                    .unwrap_or(body);
                return Err(anyhow!("twilio rejected message (HTTP {}): {}", status, detail));
            }
            Err(e) => return Err(anyhow::Error::new(e).context("twilio request failed")),
        };

        let body = response
            .into_string()
            .context("read twilio response body")?;
        let created: MessageCreated =
            serde_json::from_str(&body).context("unexpected twilio response")?;
        Ok(created.sid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{BufRead, BufReader, Read, Write};
    use std::net::TcpListener;
    use std::thread::JoinHandle;

    fn settings(api_base: String) -> TwilioSettings {
        TwilioSettings {
            account_sid: "AC123".into(),
            auth_token: "secret".into(),
            from: "+14155238886".into(),
            to: "whatsapp:+5511999999999".into(),
            whatsapp: true,
            api_base,
            timeout: Duration::from_secs(5),
        }
    }

    /// Serves one HTTP request with a canned response and returns the raw
    /// request text.
    fn one_shot_server(status: &'static str, body: &'static str) -> (String, JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = std::thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            let mut reader = BufReader::new(stream.try_clone().unwrap());
            let mut head = String::new();
            let mut content_length = 0usize;
            loop {
                let mut line = String::new();
                reader.read_line(&mut line).unwrap();
                if let Some(value) = line.to_lowercase().strip_prefix("content-length:") {
                    content_length = value.trim().parse().unwrap();
                }
                head.push_str(&line);
                if line == "\r\n" || line.is_empty() {
                    break;
                }
            }
            let mut payload = vec![0u8; content_length];
            reader.read_exact(&mut payload).unwrap();
            let mut stream = stream;
            write!(
                stream,
                "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                status,
                body.len(),
                body
            )
            .unwrap();
            head + &String::from_utf8_lossy(&payload)
        });
        (format!("http://{}", addr), handle)
    }

    #[test]
    fn builds_messages_url() -> Result<()> {
        let notifier = TwilioNotifier::new(settings("https://api.twilio.com/".into()))?;
        assert_eq!(
            notifier.messages_url()?.as_str(),
            "https://api.twilio.com/2010-04-01/Accounts/AC123/Messages.json"
        );
        Ok(())
    }

    #[test]
    fn prefixes_whatsapp_addresses_once() -> Result<()> {
        let notifier = TwilioNotifier::new(settings(DEFAULT_TWILIO_API_BASE.into()))?;
        let fields = notifier.form_fields(&Notification::advisory());
        assert_eq!(fields[0], ("To", "whatsapp:+5511999999999".to_string()));
        assert_eq!(fields[1], ("From", "whatsapp:+14155238886".to_string()));
        assert_eq!(fields[3].0, "MediaUrl");
        Ok(())
    }

    #[test]
    fn rejects_missing_credentials() {
        let mut missing = settings(DEFAULT_TWILIO_API_BASE.into());
        missing.auth_token = " ".into();
        assert!(TwilioNotifier::new(missing).is_err());
    }

    #[test]
    fn posts_form_and_returns_sid() -> Result<()> {
        let (base, server) = one_shot_server("201 Created", r#"{"sid": "SM42", "status": "queued"}"#);
        let notifier = TwilioNotifier::new(settings(base))?;

        let sid = notifier.send(&Notification {
            body: "Varroa Mite detected".into(),
            media_url: None,
        })?;
        let request = server.join().unwrap();

        assert_eq!(sid, "SM42");
        assert!(request.starts_with("POST /2010-04-01/Accounts/AC123/Messages.json"));
        assert!(request.contains("Basic QUMxMjM6c2VjcmV0"));
        assert!(request.contains("Body=Varroa+Mite+detected"));
        assert!(!request.contains("MediaUrl"));
        Ok(())
    }

    #[test]
    fn surfaces_api_errors() -> Result<()> {
        let (base, server) = one_shot_server(
            "400 Bad Request",
            r#"{"code": 21211, "message": "Invalid 'To' Phone Number", "status": 400}"#,
        );
        let notifier = TwilioNotifier::new(settings(base))?;

        let err = notifier.send(&Notification::advisory()).unwrap_err();
        server.join().unwrap();

        let text = err.to_string();
        assert!(text.contains("HTTP 400"));
        assert!(text.contains("21211"));
        Ok(())
    }
}
