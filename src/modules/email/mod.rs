pub mod manager;
mod notifier;
mod smtp;
mod templates;

pub use manager::SecureEmailManager;
pub use notifier::{NotificationPayload, Notifier, NotifyError, TemplateKind};
pub use smtp::{SmtpCredentials, SmtpNotifier};
pub use templates::{render, RenderedEmail};
