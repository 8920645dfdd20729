//! Delivery of activation tokens to newly registered users.

use crate::domain::{Token, User};
use async_trait::async_trait;
use parking_lot::Mutex;

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send_activation(&self, user: &User, token: &Token) -> anyhow::Result<()>;
}

/// Records that a token was issued without ever writing the secret out.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send_activation(&self, user: &User, token: &Token) -> anyhow::Result<()> {
        tracing::info!(
            user_id = user.id,
            expiry = %token.expiry,
            "activation token issued"
        );
        Ok(())
    }
}

/// Keeps every delivered `(email, plaintext)` pair in memory.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<(String, String)>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn token_for(&self, email: &str) -> Option<String> {
        self.sent
            .lock()
            .iter()
            .rev()
            .find(|(to, _)| to == email)
            .map(|(_, token)| token.clone())
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send_activation(&self, user: &User, token: &Token) -> anyhow::Result<()> {
        self.sent
            .lock()
            .push((user.email.clone(), token.plaintext.clone()));
        Ok(())
    }
}
