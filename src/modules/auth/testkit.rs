//! Wiring for the end-to-end tests: in-memory stores, a manual clock and
//! notifiers that record or fail.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::model::{Account, AccountProfile};
use super::password::hash_password;
use super::service::AuthService;
use super::store::{AccountStore, MemoryAccountStore, MemorySessionStore};
use crate::config::AuthConfig;
use crate::email::{NotificationPayload, Notifier, NotifyError, TemplateKind};
use crate::utils::{Clock, ManualClock};

/// Keeps every message instead of sending it
#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<(AccountProfile, TemplateKind, NotificationPayload)>>,
    fail_next: AtomicBool,
    stall_next: AtomicBool,
}

impl RecordingNotifier {
    pub fn fail_next(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }

    /// The next send hangs well past any notifier deadline
    pub fn stall_next(&self) {
        self.stall_next.store(true, Ordering::SeqCst);
    }

    pub fn last(&self, kind: TemplateKind) -> Option<NotificationPayload> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|(_, k, _)| *k == kind)
            .map(|(_, _, payload)| payload.clone())
    }

    pub fn count(&self, kind: TemplateKind) -> usize {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, k, _)| *k == kind)
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.sent.lock().unwrap().is_empty()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(
        &self,
        recipient: &AccountProfile,
        kind: TemplateKind,
        payload: &NotificationPayload,
    ) -> Result<(), NotifyError> {
        if self.stall_next.swap(false, Ordering::SeqCst) {
            tokio::time::sleep(Duration::from_secs(30)).await;
        }
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(NotifyError::Delivery("mailbox unavailable".to_string()));
        }
        self.sent
            .lock()
            .unwrap()
            .push((recipient.clone(), kind, payload.clone()));
        Ok(())
    }
}

/// Fails every send
pub struct FailingNotifier;

#[async_trait]
impl Notifier for FailingNotifier {
    async fn send(
        &self,
        _recipient: &AccountProfile,
        _kind: TemplateKind,
        _payload: &NotificationPayload,
    ) -> Result<(), NotifyError> {
        Err(NotifyError::Delivery("connection refused".to_string()))
    }
}

pub struct Harness {
    pub service: AuthService,
    pub config: AuthConfig,
    pub clock: Arc<ManualClock>,
    pub accounts: Arc<MemoryAccountStore>,
    pub sessions: Arc<MemorySessionStore>,
    pub notifier: Arc<RecordingNotifier>,
}

impl Harness {
    pub fn new() -> Self {
        let notifier = Arc::new(RecordingNotifier::default());
        Self::with_notifier(notifier.clone(), notifier)
    }

    /// `recorder` is only for inspection; `notifier` is what the service uses
    pub fn with_notifier(notifier: Arc<dyn Notifier>, recorder: Arc<RecordingNotifier>) -> Self {
        let config = AuthConfig::ephemeral();
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let accounts = Arc::new(MemoryAccountStore::new());
        let sessions = Arc::new(MemorySessionStore::new());
        let service = AuthService::with_clock(
            config.clone(),
            accounts.clone(),
            sessions.clone(),
            notifier,
            clock.clone(),
        )
        .unwrap();

        Self {
            service,
            config,
            clock,
            accounts,
            sessions,
            notifier: recorder,
        }
    }

    pub fn clock_now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// An account that has already confirmed its email
    pub async fn seed_verified(&self, email: &str, password: &str) -> Account {
        let mut account = Account::new(
            "Seeded".to_string(),
            email.to_string(),
            hash_password(password, self.config.pbkdf2_iterations),
            String::new(),
            self.clock_now(),
        );
        account.verified = true;
        account.verification_token_digest = None;
        self.accounts.create(account.clone()).await.unwrap();
        account
    }

    /// Stored state of an active account
    pub async fn account(&self, email: &str) -> Account {
        self.accounts.find_by_email(email).await.unwrap().unwrap()
    }
}
