//! Conflict detection
//!
//! Compares a local person with the corresponding external record and
//! decides per field: merge automatically, or flag for human review.
//! Conflicting fields keep their local value until the review settles.

use serde_json::{json, Map, Value};

use crate::models::{
    normalize_email, normalize_phone, EmailAddress, ExternalAccount, Person, ReviewDraft,
    ReviewType,
};

use super::nicknames::names_equivalent;
use super::notes::merge_external_note;
use super::source::ExternalContact;

/// The detector's verdict for one person/record pair
#[derive(Debug, Clone)]
pub struct MergePlan {
    /// The person with all auto-merges applied
    pub person: Person,
    /// Field name to merged value, for the sync log payload
    pub changed_fields: Map<String, Value>,
    /// Conflicts routed to the review queue
    pub reviews: Vec<ReviewDraft>,
}

impl MergePlan {
    /// True when the auto-merge changed nothing and raised no reviews
    #[must_use]
    pub fn is_noop(&self) -> bool {
        self.changed_fields.is_empty() && self.reviews.is_empty()
    }
}

/// Compare `person` against `remote` and build the merge plan.
///
/// The returned person is untouched for every conflicting field.
#[must_use]
pub fn plan_merge(person: &Person, remote: &ExternalContact, account: &ExternalAccount) -> MergePlan {
    let mut merged = person.clone();
    let mut changed_fields = Map::new();
    let mut reviews = Vec::new();

    merge_name(&mut merged, remote, &mut reviews);
    merge_emails(&mut merged, remote, &mut changed_fields);
    merge_phones(&mut merged, remote, &mut changed_fields);
    merge_notes(&mut merged, remote, account, &mut changed_fields);
    merge_scalar(
        "title",
        &mut merged.title,
        remote.title.as_deref(),
        &mut changed_fields,
        &mut reviews,
    );
    merge_scalar(
        "location",
        &mut merged.location,
        remote.location.as_deref(),
        &mut changed_fields,
        &mut reviews,
    );
    merge_scalar(
        "birthday",
        &mut merged.birthday,
        remote.birthday.as_deref(),
        &mut changed_fields,
        &mut reviews,
    );

    MergePlan {
        person: merged,
        changed_fields,
        reviews,
    }
}

/// Names auto-accept only when exact (case-insensitive, trimmed) or
/// nickname-equivalent; anything else keeps the local name and raises a
/// review.
fn merge_name(person: &mut Person, remote: &ExternalContact, reviews: &mut Vec<ReviewDraft>) {
    let remote_name = remote.name.trim();
    if remote_name.is_empty() || names_equivalent(&person.display_name, remote_name) {
        return;
    }

    reviews.push(ReviewDraft {
        review_type: ReviewType::NameConflict,
        field: "display_name".to_string(),
        local_value: json!(person.display_name),
        external_value: json!(remote_name),
    });
}

/// Union both sides' emails, deduplicating on the normalized address.
/// Values from either side are never dropped.
fn merge_emails(person: &mut Person, remote: &ExternalContact, changed: &mut Map<String, Value>) {
    let mut added = false;
    for address in &remote.emails {
        let normalized = normalize_email(address);
        if normalized.is_empty() || person.has_email(&normalized) {
            continue;
        }
        person.emails.push(EmailAddress::new("other", address.trim()));
        added = true;
    }
    if added {
        changed.insert("emails".to_string(), json!(person.emails));
    }
}

/// Union both sides' phone numbers, deduplicating on the normalized value
fn merge_phones(person: &mut Person, remote: &ExternalContact, changed: &mut Map<String, Value>) {
    let existing: Vec<String> = person.phones.iter().map(|p| normalize_phone(p)).collect();
    let mut added = false;
    for phone in &remote.phones {
        let normalized = normalize_phone(phone);
        if normalized.is_empty() || existing.contains(&normalized) {
            continue;
        }
        person.phones.push(phone.trim().to_string());
        added = true;
    }
    if added {
        changed.insert("phones".to_string(), json!(person.phones));
    }
}

/// Notes always auto-merge via the append policy; never a review item
fn merge_notes(
    person: &mut Person,
    remote: &ExternalContact,
    account: &ExternalAccount,
    changed: &mut Map<String, Value>,
) {
    let Some(remote_notes) = remote.notes.as_deref() else {
        return;
    };
    if let Some(merged) = merge_external_note(&person.notes, remote_notes, &account.email) {
        person.notes = merged;
        changed.insert("notes".to_string(), json!(person.notes));
    }
}

/// Scalar policy: fill an empty local value, leave equal values alone,
/// and route genuinely differing values to review with local kept.
fn merge_scalar(
    field: &str,
    local: &mut Option<String>,
    remote: Option<&str>,
    changed: &mut Map<String, Value>,
    reviews: &mut Vec<ReviewDraft>,
) {
    let remote = remote.map(str::trim).filter(|v| !v.is_empty());
    let Some(remote_value) = remote else {
        return;
    };

    match local.as_deref().map(str::trim).filter(|v| !v.is_empty()) {
        None => {
            *local = Some(remote_value.to_string());
            changed.insert(field.to_string(), json!(remote_value));
        }
        Some(local_value) if local_value == remote_value => {}
        Some(local_value) => {
            reviews.push(ReviewDraft {
                review_type: ReviewType::DataConflict,
                field: field.to_string(),
                local_value: json!(local_value),
                external_value: json!(remote_value),
            });
        }
    }
}
