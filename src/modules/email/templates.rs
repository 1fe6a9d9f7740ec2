use super::notifier::{NotificationPayload, TemplateKind};
use crate::utils::format_duration;

pub struct RenderedEmail {
    pub subject: String,
    pub body: String,
}

/// Render the plain-text message for `kind`
pub fn render(kind: TemplateKind, name: &str, payload: &NotificationPayload) -> RenderedEmail {
    let greeting = match name.split_whitespace().next() {
        Some(first) => format!("Hi {},", first),
        None => "Hi,".to_string(),
    };

    match kind {
        TemplateKind::EmailConfirm => RenderedEmail {
            subject: "Welcome to Trailpass - please confirm your email".to_string(),
            body: format!(
                "{}\n\
                \n\
                Welcome aboard! Please confirm your email address by opening the link below:\n\
                \n\
                {}\n\
                \n\
                Until you do, you can sign in but protected pages stay locked.\n\
                \n\
                Best regards,\n\
                The Trailpass Team",
                greeting, payload.link
            ),
        },
        TemplateKind::PasswordReset => {
            let validity = payload
                .valid_for
                .map(|secs| format!("This link is valid for {} only.\n\n", format_duration(secs)))
                .unwrap_or_default();
            RenderedEmail {
                subject: "Your password reset link".to_string(),
                body: format!(
                    "{}\n\
                    \n\
                    Forgot your password? Submit a new password and its confirmation at:\n\
                    \n\
                    {}\n\
                    \n\
                    {}\
                    If you did not request this reset, please ignore this email. \
                    Your password will stay unchanged.\n\
                    \n\
                    Best regards,\n\
                    The Trailpass Team",
                    greeting, payload.link, validity
                ),
            }
        }
    }
}
