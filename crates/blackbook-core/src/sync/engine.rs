//! Sync engine
//!
//! Drives one full bidirectional pass, or pushes a single person, and
//! returns a structured per-account report. At most one pass runs at a
//! time; per-account phases run inside their own failure boundary so one
//! broken account never aborts the others. The import phase across all
//! accounts completes before the export phase begins.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::db::{
    AccountRepository, Database, PersonRepository, ReviewRepository, RunRepository,
    SettingsRepository, SqliteAccountRepository, SqlitePersonRepository, SqliteReviewRepository,
    SqliteRunRepository, SqliteSettingsRepository, SqliteSyncLogRepository, SyncLogRepository,
    SyncRunStatus,
};
use crate::error::{Error, Result};
use crate::models::{
    DeletionSource, EmailAddress, ExternalAccount, NewSyncLogEntry, Person, PersonId, ReviewId,
    ReviewItem, SyncAction, SyncDirection, SyncLogStatus, SyncStatus,
};

use super::archive::ArchiveManager;
use super::conflict::plan_merge;
use super::nicknames::{names_equivalent, normalize_name};
use super::source::{
    call_with_retry, ContactPayload, ContactSource, ExternalContact, RetryPolicy, SourceError,
    SourceFactory,
};

/// Default bound on any single source call
const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(30);

/// Counters and errors for one account phase
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseResult {
    pub created: u32,
    pub updated: u32,
    pub deleted: u32,
    pub archived: u32,
    pub conflicts: u32,
    pub errors: Vec<String>,
}

/// The outcome of one pass, keyed `"{account email}:{phase}"`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncReport {
    pub phases: BTreeMap<String, PhaseResult>,
    /// True when the pass was canceled before finishing
    pub partial: bool,
    pub started_at: i64,
    pub finished_at: i64,
}

/// How a user settles a review item
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "choice", content = "value", rename_all = "snake_case")]
pub enum ReviewResolution {
    /// Keep the local value as-is
    KeepLocal,
    /// Apply the external side's value
    UseExternal,
    /// Apply a custom value
    Custom(serde_json::Value),
}

/// The bidirectional sync orchestrator
pub struct SyncEngine {
    db: Arc<Database>,
    factory: Arc<dyn SourceFactory>,
    retry: RetryPolicy,
    call_timeout: Duration,
    pass_lock: tokio::sync::Mutex<()>,
    cancelled: AtomicBool,
}

impl SyncEngine {
    #[must_use]
    pub fn new(db: Arc<Database>, factory: Arc<dyn SourceFactory>) -> Self {
        Self {
            db,
            factory,
            retry: RetryPolicy::default(),
            call_timeout: DEFAULT_CALL_TIMEOUT,
            pass_lock: tokio::sync::Mutex::new(()),
            cancelled: AtomicBool::new(false),
        }
    }

    /// Override the retry policy for source calls
    #[must_use]
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Override the per-call timeout for source calls
    #[must_use]
    pub const fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    /// Request cancellation of the running pass.
    ///
    /// Committed log and archive entries stay; the pass result is marked
    /// partial.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Run one full bidirectional pass across all sync-enabled accounts.
    ///
    /// Fails fast with [`Error::SyncInProgress`] when a pass is already
    /// running.
    pub async fn run_full_sync(&self) -> Result<SyncReport> {
        let _guard = self
            .pass_lock
            .try_lock()
            .map_err(|_| Error::SyncInProgress)?;
        self.cancelled.store(false, Ordering::SeqCst);

        let started_at = now_ms();
        let run_id = self
            .db
            .with_conn(|conn| SqliteRunRepository::new(conn).start(started_at))?;
        tracing::info!("Starting full sync pass (run {run_id})");

        let accounts = self
            .db
            .with_conn(|conn| SqliteAccountRepository::new(conn).list_sync_enabled())?;

        let mut phases = BTreeMap::new();

        // Import everything before exporting anything: the export fans
        // out the post-import person set.
        for account in &accounts {
            if self.is_cancelled() {
                break;
            }
            let result = self.import_account(account).await;
            phases.insert(format!("{}:import", account.email), result);
        }

        if !self.is_cancelled() {
            // Persons with a pending review keep their current values on
            // both sides until the review settles
            let (persons, blocked) = self.db.with_conn(|conn| {
                let persons = SqlitePersonRepository::new(conn).list_sync_enabled()?;
                let blocked: HashSet<PersonId> = SqliteReviewRepository::new(conn)
                    .list_pending()?
                    .into_iter()
                    .map(|item| item.person_id)
                    .collect();
                Ok((persons, blocked))
            })?;
            let mut persons: Vec<Person> = persons
                .into_iter()
                .filter(|p| !blocked.contains(&p.id))
                .collect();
            let mut person_ok: HashMap<PersonId, bool> =
                persons.iter().map(|p| (p.id, true)).collect();
            let next_sync_at = self.next_scheduled_ms();

            for account in &accounts {
                if self.is_cancelled() {
                    break;
                }
                let result = self
                    .export_to_account(account, &mut persons, &mut person_ok)
                    .await;
                phases.insert(format!("{}:export", account.email), result);

                let now = now_ms();
                if let Err(e) = self.db.with_conn(|conn| {
                    SqliteAccountRepository::new(conn).mark_synced(&account.id, now, next_sync_at)
                }) {
                    tracing::warn!("Failed to mark account {} synced: {e}", account.email);
                }
            }

            self.finalize_person_statuses(&person_ok)?;
        }

        let partial = self.is_cancelled();
        let finished_at = now_ms();
        let report = SyncReport {
            phases,
            partial,
            started_at,
            finished_at,
        };

        let status = if partial {
            SyncRunStatus::Partial
        } else {
            SyncRunStatus::Completed
        };
        let summary = serde_json::to_value(&report.phases)?;
        self.db.with_conn(|conn| {
            SqliteRunRepository::new(conn).finish(run_id, finished_at, status, &summary)
        })?;

        tracing::info!(
            "Sync pass finished ({}) in {} ms",
            status.as_str(),
            finished_at - started_at
        );
        Ok(report)
    }

    /// Push one person to all sync-enabled accounts ("sync now").
    ///
    /// Shares the pass lock with [`Self::run_full_sync`], so it is
    /// rejected while a full pass is in flight.
    pub async fn sync_single_person(&self, id: &PersonId) -> Result<SyncReport> {
        let _guard = self
            .pass_lock
            .try_lock()
            .map_err(|_| Error::SyncInProgress)?;

        let person = self
            .db
            .with_conn(|conn| SqlitePersonRepository::new(conn).get(id))?
            .ok_or_else(|| Error::NotFound(id.to_string()))?;

        let accounts = self
            .db
            .with_conn(|conn| SqliteAccountRepository::new(conn).list_sync_enabled())?;

        let started_at = now_ms();
        let mut persons = vec![person];
        let mut person_ok: HashMap<PersonId, bool> = HashMap::from([(*id, true)]);
        let mut phases = BTreeMap::new();

        for account in &accounts {
            let result = self
                .export_to_account(account, &mut persons, &mut person_ok)
                .await;
            phases.insert(format!("{}:export", account.email), result);
        }

        self.finalize_person_statuses(&person_ok)?;

        Ok(SyncReport {
            phases,
            partial: false,
            started_at,
            finished_at: now_ms(),
        })
    }

    /// Archive a person, push the deletion to every mapped account, then
    /// delete the local record. Archive-then-delete ordering holds on
    /// both sides.
    pub async fn delete_person(&self, id: &PersonId) -> Result<()> {
        let _guard = self
            .pass_lock
            .try_lock()
            .map_err(|_| Error::SyncInProgress)?;

        let person = self
            .db
            .with_conn(|conn| SqlitePersonRepository::new(conn).get(id))?
            .ok_or_else(|| Error::NotFound(id.to_string()))?;

        // Snapshot first; only then may deletes touch either side
        self.db
            .with_conn(|conn| ArchiveManager::new(conn).archive(&person, DeletionSource::Local, None))?;

        let accounts = self
            .db
            .with_conn(|conn| SqliteAccountRepository::new(conn).list_sync_enabled())?;

        for account in &accounts {
            let Some(resource_id) = person.resource_id_for(&account.id.as_str()) else {
                continue;
            };
            let resource_id = resource_id.to_string();

            let outcome = match self.factory.source_for(account) {
                Ok(source) => {
                    let source_ref: &dyn ContactSource = source.as_ref();
                    call_with_retry(&self.retry, self.call_timeout, "delete contact", || {
                        source_ref.delete(&resource_id)
                    })
                    .await
                }
                Err(e) => Err(SourceError::permanent(e.to_string())),
            };

            let entry = match &outcome {
                Ok(()) => NewSyncLogEntry::new(
                    SyncDirection::LocalToExternal,
                    SyncAction::Delete,
                    SyncLogStatus::Success,
                ),
                Err(e) => NewSyncLogEntry::new(
                    SyncDirection::LocalToExternal,
                    SyncAction::Delete,
                    SyncLogStatus::Failed,
                )
                .error(e.to_string()),
            }
            .person(person.id)
            .account(account.id);
            self.db
                .with_conn(|conn| SqliteSyncLogRepository::new(conn).append(&entry))?;

            if let Err(e) = outcome {
                tracing::warn!(
                    "Failed to delete {} from {}: {e}",
                    person.id,
                    account.email
                );
            }
        }

        self.db.with_conn(|conn| {
            SqliteSyncLogRepository::new(conn).append(
                &NewSyncLogEntry::new(
                    SyncDirection::LocalToExternal,
                    SyncAction::Delete,
                    SyncLogStatus::Success,
                )
                .person(person.id),
            )?;
            SqlitePersonRepository::new(conn).delete(&person.id)
        })?;

        Ok(())
    }

    /// Settle a review item, applying the chosen value to the person
    pub fn resolve_review(&self, id: &ReviewId, resolution: &ReviewResolution) -> Result<ReviewItem> {
        self.db.with_conn(|conn| {
            let reviews = SqliteReviewRepository::new(conn);
            let item = reviews
                .get(id)?
                .ok_or_else(|| Error::NotFound(id.to_string()))?;

            let applied = match resolution {
                ReviewResolution::KeepLocal => None,
                ReviewResolution::UseExternal => Some(item.external_value.clone()),
                ReviewResolution::Custom(value) => Some(value.clone()),
            };

            if let Some(value) = &applied {
                let persons = SqlitePersonRepository::new(conn);
                // The person may have been deleted since; the item still settles
                if let Some(mut person) = persons.get(&item.person_id)? {
                    apply_field(&mut person, &item.field, value)?;

                    let mut changed = serde_json::Map::new();
                    changed.insert(item.field.clone(), value.clone());
                    let mut entry = NewSyncLogEntry::new(
                        SyncDirection::ExternalToLocal,
                        SyncAction::Update,
                        SyncLogStatus::Success,
                    )
                    .person(person.id)
                    .changed_fields(changed);
                    if let Some(account_id) = item.account_id {
                        entry = entry.account(account_id);
                    }
                    SqliteSyncLogRepository::new(conn).append(&entry)?;

                    person.sync_status = SyncStatus::Pending;
                    persons.update(&person)?;
                }
            }

            reviews.resolve(id, &serde_json::to_value(resolution)?)
        })
    }

    /// Import phase for one account: pull the external list, match each
    /// record locally, create-or-update, and archive records the remote
    /// side deleted. Errors are folded into the result, never propagated.
    async fn import_account(&self, account: &ExternalAccount) -> PhaseResult {
        let mut result = PhaseResult::default();

        let source = match self.factory.source_for(account) {
            Ok(source) => source,
            Err(e) => {
                result.errors.push(format!("{}: {e}", account.email));
                return result;
            }
        };
        let source_ref: &dyn ContactSource = source.as_ref();

        let remote = match call_with_retry(&self.retry, self.call_timeout, "list contacts", || {
            source_ref.list()
        })
        .await
        {
            Ok(remote) => remote,
            Err(e) => {
                result.errors.push(format!("{}: {e}", account.email));
                return result;
            }
        };

        tracing::debug!("{}: imported {} remote records", account.email, remote.len());

        for record in &remote {
            if self.is_cancelled() {
                return result;
            }
            if let Err(e) = self.import_record(account, record, &mut result) {
                result
                    .errors
                    .push(format!("{} ({}): {e}", account.email, record.resource_id));
            }
        }

        if let Err(e) = self.archive_remote_deletions(account, &remote, &mut result) {
            result.errors.push(format!("{}: {e}", account.email));
        }

        result
    }

    /// Match one inbound record and merge or create
    fn import_record(
        &self,
        account: &ExternalAccount,
        record: &ExternalContact,
        result: &mut PhaseResult,
    ) -> Result<()> {
        let account_key = account.id.as_str();

        let matched = self.db.with_conn(|conn| {
            let persons = SqlitePersonRepository::new(conn);
            if let Some(person) = persons.find_by_external_id(&account_key, &record.resource_id)? {
                return Ok(Some(person));
            }
            Ok(match_record(&persons.list_sync_enabled()?, record))
        })?;

        match matched {
            Some(person) => {
                let plan = plan_merge(&person, record, account);
                let mut merged = plan.person;
                let mut changed = plan.changed_fields;
                let reviews = plan.reviews;

                if merged.resource_id_for(&account_key) != Some(record.resource_id.as_str()) {
                    merged
                        .external_ids
                        .insert(account_key.clone(), record.resource_id.clone());
                    changed.insert("external_ids".to_string(), json!(merged.external_ids));
                }

                if changed.is_empty() && reviews.is_empty() {
                    return Ok(());
                }

                let has_changes = !changed.is_empty();
                let conflict_count = reviews.len();
                let status = if conflict_count > 0 {
                    SyncLogStatus::PendingReview
                } else {
                    SyncLogStatus::Success
                };

                self.db.with_conn(|conn| {
                    // Log first so a crash never leaves an unlogged mutation
                    SqliteSyncLogRepository::new(conn).append(
                        &NewSyncLogEntry::new(
                            SyncDirection::ExternalToLocal,
                            SyncAction::Update,
                            status,
                        )
                        .person(merged.id)
                        .account(account.id)
                        .changed_fields(changed.clone()),
                    )?;
                    if has_changes {
                        SqlitePersonRepository::new(conn).update(&merged)?;
                    }
                    let review_repo = SqliteReviewRepository::new(conn);
                    for draft in reviews {
                        review_repo.create(&ReviewItem::from_draft(
                            draft,
                            merged.id,
                            Some(account.id),
                        ))?;
                    }
                    Ok(())
                })?;

                if has_changes {
                    result.updated += 1;
                }
                result.conflicts += u32::try_from(conflict_count).unwrap_or(u32::MAX);
            }
            None => {
                let person = person_from_external(record, account);
                self.db.with_conn(|conn| {
                    SqliteSyncLogRepository::new(conn).append(
                        &NewSyncLogEntry::new(
                            SyncDirection::ExternalToLocal,
                            SyncAction::Create,
                            SyncLogStatus::Success,
                        )
                        .person(person.id)
                        .account(account.id),
                    )?;
                    SqlitePersonRepository::new(conn).create(&person)
                })?;
                result.created += 1;
            }
        }

        Ok(())
    }

    /// A person mapped to this account but missing from its list was
    /// deleted remotely: archive the snapshot, then delete locally.
    fn archive_remote_deletions(
        &self,
        account: &ExternalAccount,
        remote: &[ExternalContact],
        result: &mut PhaseResult,
    ) -> Result<()> {
        let remote_ids: HashSet<&str> = remote.iter().map(|r| r.resource_id.as_str()).collect();
        let account_key = account.id.as_str();

        let mapped = self
            .db
            .with_conn(|conn| SqlitePersonRepository::new(conn).list_sync_enabled())?;

        for person in mapped {
            if self.is_cancelled() {
                return Ok(());
            }
            let Some(resource_id) = person.resource_id_for(&account_key) else {
                continue;
            };
            if remote_ids.contains(resource_id) {
                continue;
            }

            self.db.with_conn(|conn| {
                ArchiveManager::new(conn).archive_then_delete(
                    &person,
                    DeletionSource::External,
                    Some(account.id),
                )
            })?;
            result.archived += 1;
            result.deleted += 1;
        }

        Ok(())
    }

    /// Export phase for one account: fan the person set out, creating
    /// unmapped contacts (check-before-create on the stored resource id)
    /// and updating mapped ones.
    async fn export_to_account(
        &self,
        account: &ExternalAccount,
        persons: &mut [Person],
        person_ok: &mut HashMap<PersonId, bool>,
    ) -> PhaseResult {
        let mut result = PhaseResult::default();

        let source = match self.factory.source_for(account) {
            Ok(source) => source,
            Err(e) => {
                result.errors.push(format!("{}: {e}", account.email));
                for ok in person_ok.values_mut() {
                    *ok = false;
                }
                return result;
            }
        };
        let source_ref: &dyn ContactSource = source.as_ref();

        for person in persons.iter_mut() {
            if self.is_cancelled() {
                return result;
            }
            match self.export_person(account, source_ref, person).await {
                Ok(ExportOutcome::Created) => result.created += 1,
                Ok(ExportOutcome::Updated) => result.updated += 1,
                Err(e) => {
                    person_ok.insert(person.id, false);
                    result.errors.push(format!(
                        "{} ({}): {e}",
                        account.email, person.display_name
                    ));
                }
            }
        }

        result
    }

    /// Push one person to one account, recording exactly one log entry
    async fn export_person(
        &self,
        account: &ExternalAccount,
        source: &dyn ContactSource,
        person: &mut Person,
    ) -> std::result::Result<ExportOutcome, String> {
        let payload = ContactPayload::from_person(person, source.note_limit());
        let account_key = account.id.as_str();

        if let Some(resource_id) = person.resource_id_for(&account_key) {
            let resource_id = resource_id.to_string();
            let outcome = call_with_retry(&self.retry, self.call_timeout, "update contact", || {
                source.update(&resource_id, &payload)
            })
            .await;

            match outcome {
                Ok(()) => {
                    self.log_export(person, account, SyncAction::Update, None)
                        .map_err(|e| e.to_string())?;
                    Ok(ExportOutcome::Updated)
                }
                Err(e) => {
                    self.log_export(person, account, SyncAction::Update, Some(&e.to_string()))
                        .map_err(|e| e.to_string())?;
                    Err(e.to_string())
                }
            }
        } else {
            // No stored resource id for this account: create
            let outcome = call_with_retry(&self.retry, self.call_timeout, "create contact", || {
                source.create(&payload)
            })
            .await;

            match outcome {
                Ok(resource_id) => {
                    person
                        .external_ids
                        .insert(account_key.clone(), resource_id);
                    let mapped = person.clone();
                    self.db.with_conn(|conn| {
                        SqliteSyncLogRepository::new(conn).append(
                            &NewSyncLogEntry::new(
                                SyncDirection::LocalToExternal,
                                SyncAction::Create,
                                SyncLogStatus::Success,
                            )
                            .person(mapped.id)
                            .account(account.id),
                        )?;
                        SqlitePersonRepository::new(conn).update(&mapped)
                    })
                    .map_err(|e| e.to_string())?;
                    Ok(ExportOutcome::Created)
                }
                Err(e) => {
                    self.log_export(person, account, SyncAction::Create, Some(&e.to_string()))
                        .map_err(|e| e.to_string())?;
                    Err(e.to_string())
                }
            }
        }
    }

    fn log_export(
        &self,
        person: &Person,
        account: &ExternalAccount,
        action: SyncAction,
        error: Option<&str>,
    ) -> Result<()> {
        let mut entry = match error {
            None => NewSyncLogEntry::new(
                SyncDirection::LocalToExternal,
                action,
                SyncLogStatus::Success,
            ),
            Some(message) => NewSyncLogEntry::new(
                SyncDirection::LocalToExternal,
                action,
                SyncLogStatus::Failed,
            )
            .error(message),
        };
        entry = entry.person(person.id).account(account.id);
        self.db
            .with_conn(|conn| SqliteSyncLogRepository::new(conn).append(&entry))?;
        Ok(())
    }

    /// The next scheduled trigger as Unix ms, when auto-sync is on
    fn next_scheduled_ms(&self) -> Option<i64> {
        let settings = self
            .db
            .with_conn(|conn| SqliteSettingsRepository::new(conn).load())
            .ok()?;
        if !settings.auto_sync_enabled {
            return None;
        }
        super::scheduler::next_run_times(&settings, chrono::Utc::now())
            .ok()?
            .first()
            .map(chrono::DateTime::timestamp_millis)
    }

    /// After export: mark fully-exported persons synced and failed ones
    /// errored. Persons untouched by the pass keep their prior status.
    fn finalize_person_statuses(&self, person_ok: &HashMap<PersonId, bool>) -> Result<()> {
        let now = now_ms();
        self.db.with_conn(|conn| {
            let persons = SqlitePersonRepository::new(conn);
            for (id, ok) in person_ok {
                let (status, synced_at) = if *ok {
                    (SyncStatus::Synced, Some(now))
                } else {
                    (SyncStatus::Error, None)
                };
                // The person may have been archived mid-pass
                match persons.set_sync_state(id, status, synced_at) {
                    Ok(()) | Err(Error::NotFound(_)) => {}
                    Err(e) => return Err(e),
                }
            }
            Ok(())
        })
    }
}

/// What an export did for one person
enum ExportOutcome {
    Created,
    Updated,
}

/// Apply a resolved review value to the person's field
fn apply_field(person: &mut Person, field: &str, value: &serde_json::Value) -> Result<()> {
    let text = value.as_str().map(str::to_string);
    match field {
        "display_name" => {
            person.display_name = text.ok_or_else(|| {
                Error::InvalidInput("display_name resolution must be a string".to_string())
            })?;
        }
        "title" => person.title = text,
        "location" => person.location = text,
        "birthday" => person.birthday = text,
        other => {
            return Err(Error::InvalidInput(format!(
                "cannot apply a resolution to field {other}"
            )))
        }
    }
    Ok(())
}

/// Match an inbound record against local persons: exact normalized name
/// first, then nickname equivalence, then shared email.
fn match_record(persons: &[Person], record: &ExternalContact) -> Option<Person> {
    let record_name = normalize_name(&record.name);
    if !record_name.is_empty() {
        if let Some(person) = persons
            .iter()
            .find(|p| normalize_name(&p.display_name) == record_name)
        {
            return Some(person.clone());
        }
        if let Some(person) = persons
            .iter()
            .find(|p| names_equivalent(&p.display_name, &record.name))
        {
            return Some(person.clone());
        }
    }

    record
        .emails
        .iter()
        .find_map(|address| persons.iter().find(|p| p.has_email(address)).cloned())
}

/// Build a new local person from an inbound external record
fn person_from_external(record: &ExternalContact, account: &ExternalAccount) -> Person {
    let name = if record.name.trim().is_empty() {
        record
            .emails
            .first()
            .cloned()
            .unwrap_or_else(|| record.resource_id.clone())
    } else {
        record.name.trim().to_string()
    };

    let mut person = Person::new(name);
    person.title = record.title.clone();
    person.location = record.location.clone();
    person.birthday = record.birthday.clone();
    person.notes = record.notes.clone().unwrap_or_default();
    person.phones = record.phones.clone();
    person.emails = record
        .emails
        .iter()
        .map(|address| EmailAddress::new("other", address.trim()))
        .collect();
    person
        .external_ids
        .insert(account.id.as_str(), record.resource_id.clone());
    person
}

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicU32;
    use std::sync::Mutex as StdMutex;

    use async_trait::async_trait;
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::db::{ArchiveRepository, SqliteArchiveRepository, SyncLogFilter};
    use crate::models::{ReviewDraft, ReviewStatus, ReviewType};

    /// In-memory contact source; clones share state so tests can inspect
    /// what the engine pushed.
    #[derive(Clone, Default)]
    struct MockSource {
        prefix: String,
        contacts: Arc<StdMutex<BTreeMap<String, ExternalContact>>>,
        next_id: Arc<AtomicU32>,
        create_calls: Arc<AtomicU32>,
        fail_creates_named: Arc<StdMutex<HashSet<String>>>,
        list_delay_ms: Arc<AtomicU32>,
    }

    impl MockSource {
        fn new(prefix: &str) -> Self {
            Self {
                prefix: prefix.to_string(),
                ..Self::default()
            }
        }

        fn insert_remote(&self, resource_id: &str, contact: ExternalContact) {
            self.contacts.lock().unwrap().insert(
                resource_id.to_string(),
                ExternalContact {
                    resource_id: resource_id.to_string(),
                    ..contact
                },
            );
        }

        fn fail_creates_for(&self, name: &str) {
            self.fail_creates_named
                .lock()
                .unwrap()
                .insert(name.to_string());
        }

        fn get(&self, resource_id: &str) -> Option<ExternalContact> {
            self.contacts.lock().unwrap().get(resource_id).cloned()
        }

        fn len(&self) -> usize {
            self.contacts.lock().unwrap().len()
        }

        fn create_calls(&self) -> u32 {
            self.create_calls.load(Ordering::SeqCst)
        }
    }

    fn contact_from_payload(resource_id: &str, fields: &ContactPayload) -> ExternalContact {
        ExternalContact {
            resource_id: resource_id.to_string(),
            name: fields.name.clone(),
            emails: fields.emails.clone(),
            phones: fields.phones.clone(),
            title: fields.title.clone(),
            notes: fields.notes.clone(),
            location: fields.location.clone(),
            birthday: fields.birthday.clone(),
        }
    }

    #[async_trait]
    impl ContactSource for MockSource {
        async fn list(&self) -> std::result::Result<Vec<ExternalContact>, SourceError> {
            let delay = self.list_delay_ms.load(Ordering::SeqCst);
            if delay > 0 {
                tokio::time::sleep(Duration::from_millis(u64::from(delay))).await;
            }
            Ok(self.contacts.lock().unwrap().values().cloned().collect())
        }

        async fn create(
            &self,
            fields: &ContactPayload,
        ) -> std::result::Result<String, SourceError> {
            self.create_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_creates_named.lock().unwrap().contains(&fields.name) {
                return Err(SourceError::permanent(format!(
                    "invalid contact data for {}",
                    fields.name
                )));
            }
            let n = self.next_id.fetch_add(1, Ordering::SeqCst);
            let resource_id = format!("people/{}{n}", self.prefix);
            self.contacts
                .lock()
                .unwrap()
                .insert(resource_id.clone(), contact_from_payload(&resource_id, fields));
            Ok(resource_id)
        }

        async fn update(
            &self,
            resource_id: &str,
            fields: &ContactPayload,
        ) -> std::result::Result<(), SourceError> {
            let mut contacts = self.contacts.lock().unwrap();
            if !contacts.contains_key(resource_id) {
                return Err(SourceError::permanent(format!("{resource_id} not found")));
            }
            contacts.insert(
                resource_id.to_string(),
                contact_from_payload(resource_id, fields),
            );
            Ok(())
        }

        async fn delete(&self, resource_id: &str) -> std::result::Result<(), SourceError> {
            if self.contacts.lock().unwrap().remove(resource_id).is_none() {
                return Err(SourceError::permanent(format!("{resource_id} not found")));
            }
            Ok(())
        }

        fn note_limit(&self) -> usize {
            2_000
        }
    }

    struct MockFactory {
        sources: HashMap<String, MockSource>,
    }

    impl SourceFactory for MockFactory {
        fn source_for(&self, account: &ExternalAccount) -> Result<Box<dyn ContactSource>> {
            self.sources
                .get(&account.email)
                .cloned()
                .map(|source| Box::new(source) as Box<dyn ContactSource>)
                .ok_or_else(|| {
                    Error::InvalidInput(format!("no source for {}", account.email))
                })
        }
    }

    struct Harness {
        db: Arc<Database>,
        engine: Arc<SyncEngine>,
        accounts: Vec<ExternalAccount>,
        sources: HashMap<String, MockSource>,
    }

    fn setup(emails: &[&str]) -> Harness {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let mut sources = HashMap::new();
        let mut accounts = Vec::new();

        db.with_conn(|conn| {
            let repo = SqliteAccountRepository::new(conn);
            for (index, email) in emails.iter().enumerate() {
                let account = ExternalAccount::new(*email);
                repo.create(&account).unwrap();
                sources.insert((*email).to_string(), MockSource::new(&format!("s{index}-")));
                accounts.push(account);
            }
            Ok(())
        })
        .unwrap();

        let factory = Arc::new(MockFactory {
            sources: sources.clone(),
        });
        let engine = Arc::new(
            SyncEngine::new(db.clone(), factory)
                .with_retry_policy(RetryPolicy {
                    max_attempts: 2,
                    initial_backoff_ms: 1,
                    max_backoff_ms: 2,
                })
                .with_call_timeout(Duration::from_secs(5)),
        );

        Harness {
            db,
            engine,
            accounts,
            sources,
        }
    }

    impl Harness {
        fn add_person(&self, name: &str, email: Option<&str>) -> Person {
            let mut person = Person::new(name);
            if let Some(address) = email {
                person.emails.push(EmailAddress::new("work", address));
            }
            self.db
                .with_conn(|conn| {
                    SqlitePersonRepository::new(conn).create(&person)?;
                    Ok(person.clone())
                })
                .unwrap()
        }

        fn person(&self, id: &PersonId) -> Option<Person> {
            self.db
                .with_conn(|conn| SqlitePersonRepository::new(conn).get(id))
                .unwrap()
        }

        fn persons(&self) -> Vec<Person> {
            self.db
                .with_conn(|conn| SqlitePersonRepository::new(conn).list(100, 0))
                .unwrap()
        }

        fn source(&self, email: &str) -> &MockSource {
            &self.sources[email]
        }

        fn pending_reviews(&self) -> Vec<ReviewItem> {
            self.db
                .with_conn(|conn| SqliteReviewRepository::new(conn).list_pending())
                .unwrap()
        }
    }

    #[tokio::test]
    async fn test_full_sync_maps_every_person_to_every_account() {
        let h = setup(&["a@example.com", "b@example.com"]);
        let alice = h.add_person("Ana Horvat", Some("ana@x.com"));
        let bob = h.add_person("Robert Smith", Some("rob@x.com"));

        let report = h.engine.run_full_sync().await.unwrap();

        assert_eq!(report.phases.len(), 4);
        assert!(!report.partial);
        assert_eq!(report.phases["a@example.com:export"].created, 2);
        assert_eq!(report.phases["b@example.com:export"].created, 2);

        for id in [alice.id, bob.id] {
            let person = h.person(&id).unwrap();
            for account in &h.accounts {
                assert!(
                    person.resource_id_for(&account.id.as_str()).is_some(),
                    "missing mapping for {}",
                    account.email
                );
            }
            assert_eq!(person.sync_status, SyncStatus::Synced);
            assert!(person.last_synced_at.is_some());
        }
    }

    #[tokio::test]
    async fn test_export_is_idempotent() {
        let h = setup(&["a@example.com"]);
        h.add_person("Ana Horvat", Some("ana@x.com"));
        h.add_person("Robert Smith", None);

        h.engine.run_full_sync().await.unwrap();
        let creates_after_first = h.source("a@example.com").create_calls();
        assert_eq!(creates_after_first, 2);

        let second = h.engine.run_full_sync().await.unwrap();
        // Zero additional creates; mapped persons get metadata-only updates
        assert_eq!(h.source("a@example.com").create_calls(), creates_after_first);
        assert_eq!(second.phases["a@example.com:export"].created, 0);
        assert_eq!(second.phases["a@example.com:export"].updated, 2);
        assert!(h.pending_reviews().is_empty());
    }

    #[tokio::test]
    async fn test_import_creates_local_and_fans_out() {
        let h = setup(&["a@example.com", "b@example.com"]);
        h.source("a@example.com").insert_remote(
            "people/r1",
            ExternalContact {
                name: "Nikola Tesla".to_string(),
                emails: vec!["nikola@x.com".to_string()],
                ..ExternalContact::default()
            },
        );

        let report = h.engine.run_full_sync().await.unwrap();

        assert_eq!(report.phases["a@example.com:import"].created, 1);
        assert_eq!(report.phases["b@example.com:export"].created, 1);

        let persons = h.persons();
        assert_eq!(persons.len(), 1);
        let person = &persons[0];
        assert_eq!(person.display_name, "Nikola Tesla");
        assert_eq!(
            person.resource_id_for(&h.accounts[0].id.as_str()),
            Some("people/r1")
        );
        // Fanned out to the second account too
        assert!(person.resource_id_for(&h.accounts[1].id.as_str()).is_some());
        assert_eq!(h.source("b@example.com").len(), 1);
    }

    #[tokio::test]
    async fn test_nickname_match_attaches_mapping() {
        let h = setup(&["a@example.com"]);
        let person = h.add_person("Robert Smith", None);
        h.source("a@example.com").insert_remote(
            "people/r9",
            ExternalContact {
                name: "Bob Smith".to_string(),
                ..ExternalContact::default()
            },
        );

        let report = h.engine.run_full_sync().await.unwrap();

        // Matched, not duplicated, and no review raised
        assert_eq!(h.persons().len(), 1);
        assert!(h.pending_reviews().is_empty());
        assert_eq!(report.phases["a@example.com:import"].created, 0);

        let person = h.person(&person.id).unwrap();
        assert_eq!(person.display_name, "Robert Smith");
        assert_eq!(
            person.resource_id_for(&h.accounts[0].id.as_str()),
            Some("people/r9")
        );
    }

    #[tokio::test]
    async fn test_name_conflict_routes_to_review_and_blocks_export() {
        let h = setup(&["a@example.com"]);
        let mut person = Person::new("Robert Smith");
        person
            .external_ids
            .insert(h.accounts[0].id.as_str(), "people/r1".to_string());
        h.db
            .with_conn(|conn| SqlitePersonRepository::new(conn).create(&person))
            .unwrap();
        h.source("a@example.com").insert_remote(
            "people/r1",
            ExternalContact {
                name: "Roberta Smith".to_string(),
                ..ExternalContact::default()
            },
        );

        let report = h.engine.run_full_sync().await.unwrap();

        assert_eq!(report.phases["a@example.com:import"].conflicts, 1);
        let reviews = h.pending_reviews();
        assert_eq!(reviews.len(), 1);
        assert_eq!(reviews[0].review_type, ReviewType::NameConflict);

        // The authoritative name is untouched and the conflicted person
        // was not exported over the remote value
        let person = h.person(&person.id).unwrap();
        assert_eq!(person.display_name, "Robert Smith");
        assert_eq!(person.sync_status, SyncStatus::Pending);
        let remote = h.source("a@example.com").get("people/r1").unwrap();
        assert_eq!(remote.name, "Roberta Smith");
    }

    #[tokio::test]
    async fn test_email_union_converges_both_sides() {
        let h = setup(&["a@example.com"]);
        let person = h.add_person("Ana Horvat", Some("a@x.com"));
        h.source("a@example.com").insert_remote(
            "people/r2",
            ExternalContact {
                name: "Ana Horvat".to_string(),
                emails: vec!["b@x.com".to_string()],
                ..ExternalContact::default()
            },
        );

        h.engine.run_full_sync().await.unwrap();

        assert!(h.pending_reviews().is_empty());
        let person = h.person(&person.id).unwrap();
        let mut local: Vec<&str> = person.emails.iter().map(|e| e.address.as_str()).collect();
        local.sort_unstable();
        assert_eq!(local, vec!["a@x.com", "b@x.com"]);

        let mut remote = h.source("a@example.com").get("people/r2").unwrap().emails;
        remote.sort();
        assert_eq!(remote, vec!["a@x.com", "b@x.com"]);
    }

    #[tokio::test]
    async fn test_permanent_failure_isolated_per_account_and_person() {
        let h = setup(&["a@example.com", "b@example.com"]);
        let good: Vec<Person> = ["Ana Horvat", "Ivan Babić", "Petra Novak"]
            .iter()
            .map(|name| h.add_person(name, None))
            .collect();
        let bad = h.add_person("Bad Person", None);
        h.source("a@example.com").fail_creates_for("Bad Person");

        let report = h.engine.run_full_sync().await.unwrap();

        let account_a = &report.phases["a@example.com:export"];
        assert_eq!(account_a.created, 3);
        assert_eq!(account_a.errors.len(), 1);
        assert!(account_a.errors[0].contains("Bad Person"));

        // The other account is unaffected
        let account_b = &report.phases["b@example.com:export"];
        assert_eq!(account_b.created, 4);
        assert!(account_b.errors.is_empty());

        assert_eq!(h.person(&bad.id).unwrap().sync_status, SyncStatus::Error);
        for person in &good {
            assert_eq!(h.person(&person.id).unwrap().sync_status, SyncStatus::Synced);
        }

        // The failed create still produced exactly one failed log entry
        let failed = h
            .db
            .with_conn(|conn| {
                SqliteSyncLogRepository::new(conn).list(
                    &SyncLogFilter {
                        status: Some(SyncLogStatus::Failed),
                        person_id: Some(bad.id),
                    },
                    10,
                    0,
                )
            })
            .unwrap();
        assert_eq!(failed.len(), 1);
        assert!(failed[0].error.as_deref().unwrap().contains("invalid contact data"));
    }

    #[tokio::test]
    async fn test_remote_deletion_archives_then_deletes() {
        let h = setup(&["a@example.com"]);
        let mut person = Person::new("Gone Person");
        person
            .external_ids
            .insert(h.accounts[0].id.as_str(), "people/gone".to_string());
        h.db
            .with_conn(|conn| SqlitePersonRepository::new(conn).create(&person))
            .unwrap();

        // The remote list no longer contains the mapped record
        let report = h.engine.run_full_sync().await.unwrap();

        let import = &report.phases["a@example.com:import"];
        assert_eq!(import.archived, 1);
        assert_eq!(import.deleted, 1);
        assert!(h.person(&person.id).is_none());

        let archives = h
            .db
            .with_conn(|conn| SqliteArchiveRepository::new(conn).list_unrestored())
            .unwrap();
        assert_eq!(archives.len(), 1);
        assert_eq!(archives[0].person_id, person.id);
        assert_eq!(archives[0].deleted_from, DeletionSource::External);
        assert_eq!(
            archives[0].external_ids.get(&h.accounts[0].id.as_str()).map(String::as_str),
            Some("people/gone")
        );
    }

    #[tokio::test]
    async fn test_sync_single_person() {
        let h = setup(&["a@example.com"]);
        let person = h.add_person("Ana Horvat", None);

        let report = h.engine.sync_single_person(&person.id).await.unwrap();
        assert_eq!(report.phases.len(), 1);
        assert_eq!(report.phases["a@example.com:export"].created, 1);

        let person = h.person(&person.id).unwrap();
        assert_eq!(person.sync_status, SyncStatus::Synced);
        assert!(person.resource_id_for(&h.accounts[0].id.as_str()).is_some());
    }

    #[tokio::test]
    async fn test_sync_single_person_not_found() {
        let h = setup(&["a@example.com"]);
        let missing = PersonId::new();
        assert!(matches!(
            h.engine.sync_single_person(&missing).await,
            Err(Error::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_delete_person_pushes_remote_deletes() {
        let h = setup(&["a@example.com"]);
        let person = h.add_person("Ana Horvat", None);

        h.engine.run_full_sync().await.unwrap();
        assert_eq!(h.source("a@example.com").len(), 1);

        let person = h.person(&person.id).unwrap();
        h.engine.delete_person(&person.id).await.unwrap();

        assert_eq!(h.source("a@example.com").len(), 0);
        assert!(h.person(&person.id).is_none());

        let archives = h
            .db
            .with_conn(|conn| SqliteArchiveRepository::new(conn).list_unrestored())
            .unwrap();
        assert_eq!(archives.len(), 1);
        assert_eq!(archives[0].deleted_from, DeletionSource::Local);
    }

    #[tokio::test]
    async fn test_second_pass_rejected_while_running() {
        let h = setup(&["a@example.com"]);
        h.add_person("Ana Horvat", None);
        h.source("a@example.com")
            .list_delay_ms
            .store(300, Ordering::SeqCst);

        let engine = h.engine.clone();
        let first = tokio::spawn(async move { engine.run_full_sync().await });
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert!(matches!(
            h.engine.run_full_sync().await,
            Err(Error::SyncInProgress)
        ));
        assert!(matches!(
            h.engine.sync_single_person(&PersonId::new()).await,
            Err(Error::SyncInProgress)
        ));

        let report = first.await.unwrap().unwrap();
        assert!(!report.partial);
    }

    #[tokio::test]
    async fn test_cancel_marks_pass_partial() {
        let h = setup(&["a@example.com", "b@example.com"]);
        h.add_person("Ana Horvat", None);
        for email in ["a@example.com", "b@example.com"] {
            h.source(email).list_delay_ms.store(200, Ordering::SeqCst);
        }

        let engine = h.engine.clone();
        let task = tokio::spawn(async move { engine.run_full_sync().await });
        tokio::time::sleep(Duration::from_millis(50)).await;
        h.engine.cancel();

        let report = task.await.unwrap().unwrap();
        assert!(report.partial);
        // The export phase never ran
        assert!(report.phases.keys().all(|key| key.ends_with(":import")));

        let run = h
            .db
            .with_conn(|conn| SqliteRunRepository::new(conn).latest())
            .unwrap()
            .unwrap();
        assert_eq!(run.status, SyncRunStatus::Partial);
    }

    #[tokio::test]
    async fn test_resolve_review_applies_external_value() {
        let h = setup(&["a@example.com"]);
        let mut person = Person::new("Ana Horvat");
        person.title = Some("Partner".to_string());
        h.db
            .with_conn(|conn| SqlitePersonRepository::new(conn).create(&person))
            .unwrap();

        let item = ReviewItem::from_draft(
            ReviewDraft {
                review_type: ReviewType::DataConflict,
                field: "title".to_string(),
                local_value: json!("Partner"),
                external_value: json!("Managing Director"),
            },
            person.id,
            Some(h.accounts[0].id),
        );
        h.db
            .with_conn(|conn| SqliteReviewRepository::new(conn).create(&item))
            .unwrap();

        let resolved = h
            .engine
            .resolve_review(&item.id, &ReviewResolution::UseExternal)
            .unwrap();
        assert_eq!(resolved.status, ReviewStatus::Resolved);

        let person = h.person(&person.id).unwrap();
        assert_eq!(person.title.as_deref(), Some("Managing Director"));
        assert_eq!(person.sync_status, SyncStatus::Pending);

        // Settled items cannot be resolved twice
        assert!(h
            .engine
            .resolve_review(&item.id, &ReviewResolution::KeepLocal)
            .is_err());
    }

    #[tokio::test]
    async fn test_run_status_recorded() {
        let h = setup(&["a@example.com"]);
        h.add_person("Ana Horvat", None);

        h.engine.run_full_sync().await.unwrap();

        let run = h
            .db
            .with_conn(|conn| SqliteRunRepository::new(conn).latest())
            .unwrap()
            .unwrap();
        assert_eq!(run.status, SyncRunStatus::Completed);
        assert!(run.finished_at.is_some());
        let summary = run.summary.unwrap();
        assert!(summary.get("a@example.com:export").is_some());
    }
}
