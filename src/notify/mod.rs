//! Outbound threat notifications.
//!
//! Delivery is best-effort and at-most-once: one attempt per raised alert, no
//! retry, no queue that outlives the process. Failures are logged and
//! swallowed; they never reach the alert state or the frame loop.

mod twilio;

use anyhow::Result;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread::JoinHandle;

pub use twilio::{TwilioNotifier, TwilioSettings, DEFAULT_TWILIO_API_BASE};

/// Advisory sent to the beekeeper when a mite is first seen.
pub const DEFAULT_ADVISORY_BODY: &str = "\
🐝 Alerta de Saúde Apícola - Hive-Defenders 🐝

Prezado Apicultor,

Identificamos a presença do ácaro Varroa destructor na colmeia #A123. Esta situação requer atenção imediata para garantir a saúde e produtividade de sua colônia.

🔍 Ações Recomendadas:

1. Inspeção Imediata:
   - Realize uma vistoria detalhada da colmeia afetada.
   - Verifique outras colmeias próximas para possível contaminação.

2. Tratamento:
   - Considere a aplicação de ácido oxálico ou fórmico.
   - Consulte um especialista para determinar a dosagem adequada.

3. Controle Biológico:
   - Avalie a introdução de ácaros predadores naturais.
   - Implemente técnicas de manejo integrado de pragas.

4. Monitoramento Contínuo:
   - Aumente a frequência das inspeções nas próximas semanas.
   - Utilize fundos de colmeia com tela para contagem de ácaros.

5. Fortalecimento da Colônia:
   - Garanta alimentação suplementar se necessário.
   - Considere a união de colônias fracas.

⚠️ Lembre-se: O tratamento precoce é crucial para prevenir a propagação e minimizar os danos à sua operação apícola.

A equipe Hive-Defenders está à disposição para orientações adicionais. Entre em contato conosco pelo telefone (XX) XXXX-XXXX ou e-mail suporte@hive-defenders.com.

Proteja suas abelhas, proteja seu investimento!

Atenciosamente,
Equipe Hive-Defenders";

/// Reference image attached to the advisory.
pub const DEFAULT_ADVISORY_MEDIA_URL: &str =
    "https://i.pinimg.com/1200x/9d/d8/88/9dd888584a7891413b880a3770e04ddf.jpg";

/// A pre-composed message for the fixed recipient.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Notification {
    pub body: String,
    pub media_url: Option<String>,
}

impl Notification {
    pub fn advisory() -> Self {
        Self {
            body: DEFAULT_ADVISORY_BODY.to_string(),
            media_url: Some(DEFAULT_ADVISORY_MEDIA_URL.to_string()),
        }
    }
}

/// Messaging channel that delivers to one configured recipient.
pub trait Notifier: Send {
    /// Channel identifier.
    fn name(&self) -> &'static str;

    /// Deliver the message. Returns the channel's delivery id.
    fn send(&self, notification: &Notification) -> Result<String>;
}

/// Notifier that only writes the message to the log. Used for dry runs.
#[derive(Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn name(&self) -> &'static str {
        "log"
    }

    fn send(&self, notification: &Notification) -> Result<String> {
        log::info!(
            "notification (log channel, {} chars, media={})",
            notification.body.chars().count(),
            notification.media_url.as_deref().unwrap_or("none")
        );
        Ok("log".to_string())
    }
}

/// Where the notifier call runs.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DispatchMode {
    /// On the frame-loop thread; the loop waits for the call.
    Inline,
    /// On a dedicated worker thread; the loop only enqueues.
    Background,
}

impl std::str::FromStr for DispatchMode {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_lowercase().as_str() {
            "inline" => Ok(Self::Inline),
            "background" => Ok(Self::Background),
            other => Err(anyhow::anyhow!(
                "unknown dispatch mode '{}' (expected inline or background)",
                other
            )),
        }
    }
}

/// Delivery counters, shared with the background worker.
#[derive(Debug, Default)]
pub struct DispatchStats {
    requested: AtomicU64,
    delivered: AtomicU64,
    failed: AtomicU64,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DispatchSnapshot {
    pub requested: u64,
    pub delivered: u64,
    pub failed: u64,
}

impl DispatchStats {
    pub fn snapshot(&self) -> DispatchSnapshot {
        DispatchSnapshot {
            requested: self.requested.load(Ordering::SeqCst),
            delivered: self.delivered.load(Ordering::SeqCst),
            failed: self.failed.load(Ordering::SeqCst),
        }
    }
}

enum Channel {
    Disabled,
    Inline(Box<dyn Notifier>),
    Background {
        tx: Option<mpsc::Sender<Notification>>,
        worker: Option<JoinHandle<()>>,
    },
}

/// Fires the advisory once per raised alert.
pub struct NotificationDispatcher {
    channel: Channel,
    message: Notification,
    stats: Arc<DispatchStats>,
}

impl NotificationDispatcher {
    pub fn new(notifier: Box<dyn Notifier>, message: Notification, mode: DispatchMode) -> Self {
        let stats = Arc::new(DispatchStats::default());
        let channel = match mode {
            DispatchMode::Inline => Channel::Inline(notifier),
            DispatchMode::Background => spawn_worker(notifier, stats.clone()),
        };
        Self {
            channel,
            message,
            stats,
        }
    }

    /// Dispatcher that never contacts anyone.
    pub fn disabled() -> Self {
        Self {
            channel: Channel::Disabled,
            message: Notification::advisory(),
            stats: Arc::new(DispatchStats::default()),
        }
    }

    pub fn is_enabled(&self) -> bool {
        !matches!(self.channel, Channel::Disabled)
    }

    pub fn stats(&self) -> DispatchSnapshot {
        self.stats.snapshot()
    }

    /// Send the advisory. Never fails; problems are logged.
    pub fn dispatch(&mut self) {
        match &mut self.channel {
            Channel::Disabled => {
                log::warn!("threat raised but notifications are disabled");
            }
            Channel::Inline(notifier) => {
                self.stats.requested.fetch_add(1, Ordering::SeqCst);
                deliver(notifier.as_ref(), &self.message, &self.stats);
            }
            Channel::Background { tx, .. } => {
                self.stats.requested.fetch_add(1, Ordering::SeqCst);
                let sent = tx
                    .as_ref()
                    .map(|tx| tx.send(self.message.clone()).is_ok())
                    .unwrap_or(false);
                if !sent {
                    self.stats.failed.fetch_add(1, Ordering::SeqCst);
                    log::error!("notification dropped: dispatch worker is not running");
                }
            }
        }
    }

    /// Stop the worker, letting an in-flight delivery finish. Idempotent.
    pub fn shutdown(&mut self) {
        if let Channel::Background { tx, worker } = &mut self.channel {
            tx.take();
            if let Some(handle) = worker.take() {
                if handle.join().is_err() {
                    log::error!("notification worker panicked");
                }
            }
        }
    }
}

impl Drop for NotificationDispatcher {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn spawn_worker(notifier: Box<dyn Notifier>, stats: Arc<DispatchStats>) -> Channel {
    let (tx, rx) = mpsc::channel::<Notification>();
    let spawned = std::thread::Builder::new()
        .name("notify".to_string())
        .spawn(move || {
            for message in rx {
                deliver(notifier.as_ref(), &message, &stats);
            }
        });
    match spawned {
        Ok(handle) => Channel::Background {
            tx: Some(tx),
            worker: Some(handle),
        },
        Err(e) => {
            log::error!("failed to start notification worker: {}", e);
            Channel::Background {
                tx: None,
                worker: None,
            }
        }
    }
}

fn deliver(notifier: &dyn Notifier, message: &Notification, stats: &DispatchStats) {
    match notifier.send(message) {
        Ok(id) => {
            stats.delivered.fetch_add(1, Ordering::SeqCst);
            log::info!("notification sent via {} (id {})", notifier.name(), id);
        }
        Err(e) => {
            stats.failed.fetch_add(1, Ordering::SeqCst);
            log::error!("notification via {} failed: {:#}", notifier.name(), e);
        }
    }
}
