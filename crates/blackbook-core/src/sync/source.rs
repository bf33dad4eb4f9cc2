//! External contact source seam
//!
//! Any connected account is driven through [`ContactSource`]. The engine
//! treats every call as a fallible remote operation: transient failures
//! (network, rate limit) are retried with bounded backoff, permanent
//! failures are logged and surfaced in the per-account result.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::Result;
use crate::models::{ExternalAccount, Person};

use super::notes::truncate_for_remote;

/// Errors a contact source can produce
#[derive(Debug, Error)]
pub enum SourceError {
    /// Worth retrying: network trouble, rate limiting, 5xx-class failures
    #[error("transient source error: {0}")]
    Transient(String),
    /// Not worth retrying: not found, malformed data, auth failure
    #[error("permanent source error: {0}")]
    Permanent(String),
}

impl SourceError {
    #[must_use]
    pub fn transient(message: impl Into<String>) -> Self {
        Self::Transient(message.into())
    }

    #[must_use]
    pub fn permanent(message: impl Into<String>) -> Self {
        Self::Permanent(message.into())
    }

    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

/// One contact record as the external system reports it
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalContact {
    /// The external system's stable identifier for this record
    pub resource_id: String,
    /// Full display name
    pub name: String,
    /// Email addresses
    pub emails: Vec<String>,
    /// Phone numbers
    pub phones: Vec<String>,
    /// Job title
    pub title: Option<String>,
    /// Free-text notes
    pub notes: Option<String>,
    /// City / location
    pub location: Option<String>,
    /// Birthday as `YYYY-MM-DD`
    pub birthday: Option<String>,
}

/// The fields pushed to an external system on create/update
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactPayload {
    pub name: String,
    pub emails: Vec<String>,
    pub phones: Vec<String>,
    pub title: Option<String>,
    pub notes: Option<String>,
    pub location: Option<String>,
    pub birthday: Option<String>,
}

impl ContactPayload {
    /// Build the outbound payload for a person, truncating notes at the
    /// source's hard limit
    #[must_use]
    pub fn from_person(person: &Person, note_limit: usize) -> Self {
        let notes = if person.notes.trim().is_empty() {
            None
        } else {
            Some(truncate_for_remote(&person.notes, note_limit))
        };
        Self {
            name: person.display_name.clone(),
            emails: person.emails.iter().map(|e| e.address.clone()).collect(),
            phones: person.phones.clone(),
            title: person.title.clone(),
            notes,
            location: person.location.clone(),
            birthday: person.birthday.clone(),
        }
    }
}

/// Capability set required of any connected contact source
#[async_trait]
pub trait ContactSource: Send + Sync {
    /// All contact records with stable resource identifiers
    async fn list(&self) -> std::result::Result<Vec<ExternalContact>, SourceError>;

    /// Create a contact, returning the new resource identifier
    async fn create(&self, fields: &ContactPayload) -> std::result::Result<String, SourceError>;

    /// Update the contact behind the given resource identifier
    async fn update(
        &self,
        resource_id: &str,
        fields: &ContactPayload,
    ) -> std::result::Result<(), SourceError>;

    /// Delete the contact behind the given resource identifier
    async fn delete(&self, resource_id: &str) -> std::result::Result<(), SourceError>;

    /// Hard length limit for outbound notes on this source
    fn note_limit(&self) -> usize;
}

/// Builds a [`ContactSource`] for a connected account
pub trait SourceFactory: Send + Sync {
    fn source_for(&self, account: &ExternalAccount) -> Result<Box<dyn ContactSource>>;
}

/// Bounded exponential backoff for transient failures
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff_ms: 250,
            max_backoff_ms: 2_000,
        }
    }
}

impl RetryPolicy {
    /// Backoff before retrying after the given 1-based attempt
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = 2u64.saturating_pow(attempt.saturating_sub(1));
        let delay = self
            .initial_backoff_ms
            .saturating_mul(exponent)
            .min(self.max_backoff_ms);
        Duration::from_millis(delay)
    }
}

/// Drive one source call with a per-attempt timeout and transient retries.
///
/// Timeouts count as transient. Permanent errors return immediately.
pub async fn call_with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    timeout: Duration,
    what: &str,
    mut call: F,
) -> std::result::Result<T, SourceError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = std::result::Result<T, SourceError>>,
{
    let attempts = policy.max_attempts.max(1);
    for attempt in 1..=attempts {
        let outcome = match tokio::time::timeout(timeout, call()).await {
            Ok(result) => result,
            Err(_) => Err(SourceError::transient(format!(
                "{what} timed out after {timeout:?}"
            ))),
        };

        match outcome {
            Ok(value) => return Ok(value),
            Err(err) if err.is_transient() && attempt < attempts => {
                let delay = policy.delay_for(attempt);
                tracing::warn!(
                    "{what} attempt {attempt}/{attempts} failed ({err}), retrying in {delay:?}"
                );
                tokio::time::sleep(delay).await;
            }
            Err(err) => return Err(err),
        }
    }

    Err(SourceError::transient(format!("{what} exhausted retries")))
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use pretty_assertions::assert_eq;

    use super::*;
    use crate::models::EmailAddress;

    #[test]
    fn test_payload_from_person_truncates_notes() {
        let mut person = Person::new("Mira Kovač");
        person.notes = "x".repeat(50);
        person.emails.push(EmailAddress::new("work", "a@x.com"));

        let payload = ContactPayload::from_person(&person, 40);
        let notes = payload.notes.unwrap();
        assert!(notes.chars().count() <= 40);
        assert_eq!(payload.emails, vec!["a@x.com".to_string()]);
    }

    #[test]
    fn test_payload_empty_notes_omitted() {
        let person = Person::new("Mira Kovač");
        let payload = ContactPayload::from_person(&person, 40);
        assert!(payload.notes.is_none());
    }

    #[test]
    fn test_retry_delay_is_bounded() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for(1), Duration::from_millis(250));
        assert_eq!(policy.delay_for(2), Duration::from_millis(500));
        assert_eq!(policy.delay_for(10), Duration::from_millis(2_000));
    }

    #[tokio::test]
    async fn test_retry_recovers_from_transient() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy {
            max_attempts: 3,
            initial_backoff_ms: 1,
            max_backoff_ms: 2,
        };

        let result = call_with_retry(&policy, Duration::from_secs(1), "list", || {
            let attempt = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if attempt < 2 {
                    Err(SourceError::transient("flaky"))
                } else {
                    Ok(42)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retry_gives_up_after_max_attempts() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy {
            max_attempts: 3,
            initial_backoff_ms: 1,
            max_backoff_ms: 2,
        };

        let result: std::result::Result<(), _> =
            call_with_retry(&policy, Duration::from_secs(1), "list", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(SourceError::transient("down")) }
            })
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_permanent_error_not_retried() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::default();

        let result: std::result::Result<(), _> =
            call_with_retry(&policy, Duration::from_secs(1), "delete", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(SourceError::permanent("not found")) }
            })
            .await;

        assert!(matches!(result, Err(SourceError::Permanent(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
