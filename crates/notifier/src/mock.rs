//! `MockNotifier` — a test double for `Notifier`.
//!
//! Useful in unit and integration tests where a real transport is either
//! unavailable or irrelevant.

use async_trait::async_trait;
use std::sync::{Arc, Mutex};

use crate::{DeliveryError, Notification, Notifier};

/// Behaviour injected into `MockNotifier` at construction time.
pub enum MockBehaviour {
    /// Accept every notification.
    Accept,
    /// Fail every notification with the given error.
    Fail(DeliveryError),
    /// Accept the first `n` notifications, then fail with the given error.
    FailAfter(usize, DeliveryError),
}

/// A mock notifier that records every notification it receives and returns
/// a programmer-specified result.
pub struct MockNotifier {
    /// What the notifier will do when `deliver` is called.
    pub behaviour: MockBehaviour,
    /// All notifications seen (in call order), including failed ones.
    pub calls: Arc<Mutex<Vec<Notification>>>,
}

impl MockNotifier {
    /// Create a mock that accepts everything.
    pub fn accepting() -> Self {
        Self::with(MockBehaviour::Accept)
    }

    /// Create a mock that always fails with `error`.
    pub fn failing(error: DeliveryError) -> Self {
        Self::with(MockBehaviour::Fail(error))
    }

    /// Create a mock that accepts `n` notifications and then fails.
    pub fn failing_after(n: usize, error: DeliveryError) -> Self {
        Self::with(MockBehaviour::FailAfter(n, error))
    }

    fn with(behaviour: MockBehaviour) -> Self {
        Self {
            behaviour,
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Number of times `deliver` has been called.
    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    /// Snapshot of every notification received so far.
    pub fn delivered(&self) -> Vec<Notification> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for MockNotifier {
    async fn deliver(&self, notification: &Notification) -> Result<(), DeliveryError> {
        let seen = {
            let mut calls = self.calls.lock().unwrap();
            calls.push(notification.clone());
            calls.len()
        };

        match &self.behaviour {
            MockBehaviour::Accept => Ok(()),
            MockBehaviour::Fail(err) => Err(err.clone()),
            MockBehaviour::FailAfter(n, err) if seen > *n => Err(err.clone()),
            MockBehaviour::FailAfter(..) => Ok(()),
        }
    }
}
