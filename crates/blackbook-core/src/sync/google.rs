//! Google People contact source
//!
//! Drives one connected Google account through the People API v1 with a
//! caller-supplied bearer token per account (the OAuth flow lives
//! outside this crate). The adapter classifies failures as transient or
//! permanent; retries belong to the engine.

use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::models::ExternalAccount;

use super::source::{ContactPayload, ContactSource, ExternalContact, SourceError, SourceFactory};

/// Hard cap Google applies to contact biographies
const GOOGLE_NOTE_LIMIT: usize = 2_000;

const DEFAULT_BASE_URL: &str = "https://people.googleapis.com";

const PERSON_FIELDS: &str =
    "names,emailAddresses,phoneNumbers,organizations,biographies,addresses,birthdays";

const PAGE_SIZE: u32 = 200;

/// One Google account's contact list
pub struct GooglePeopleSource {
    client: reqwest::Client,
    base_url: String,
    token: String,
}

impl GooglePeopleSource {
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self::with_base_url(token, DEFAULT_BASE_URL)
    }

    /// Point the source at a different API host (tests)
    #[must_use]
    pub fn with_base_url(token: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
        }
    }

    /// Send a request, classify the response, and return the body text
    async fn send(
        &self,
        request: reqwest::RequestBuilder,
    ) -> std::result::Result<String, SourceError> {
        let response = request
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(classify_transport)?;
        let status = response.status();
        let body = response.text().await.map_err(classify_transport)?;
        if status.is_success() {
            Ok(body)
        } else {
            Err(classify_status(status, &body))
        }
    }

    async fn get_person(
        &self,
        resource_id: &str,
    ) -> std::result::Result<GooglePerson, SourceError> {
        let body = self
            .send(
                self.client
                    .get(format!("{}/v1/{resource_id}", self.base_url))
                    .query(&[("personFields", "names")]),
            )
            .await?;
        parse_payload(&body)
    }
}

#[async_trait]
impl ContactSource for GooglePeopleSource {
    async fn list(&self) -> std::result::Result<Vec<ExternalContact>, SourceError> {
        let mut contacts = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut request = self
                .client
                .get(format!("{}/v1/people/me/connections", self.base_url))
                .query(&[
                    ("personFields", PERSON_FIELDS),
                    ("pageSize", &PAGE_SIZE.to_string()),
                ]);
            if let Some(token) = &page_token {
                request = request.query(&[("pageToken", token.as_str())]);
            }

            let body = self.send(request).await?;
            let page: ConnectionsPage = parse_payload(&body)?;
            contacts.extend(
                page.connections
                    .into_iter()
                    .filter(|person| !person.resource_name.is_empty())
                    .map(ExternalContact::from),
            );

            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }

        Ok(contacts)
    }

    async fn create(&self, fields: &ContactPayload) -> std::result::Result<String, SourceError> {
        let body = self
            .send(
                self.client
                    .post(format!("{}/v1/people:createContact", self.base_url))
                    .json(&outbound_person(fields, None)),
            )
            .await?;
        let created: GooglePerson = parse_payload(&body)?;
        if created.resource_name.is_empty() {
            return Err(SourceError::permanent(
                "createContact response missing resourceName",
            ));
        }
        Ok(created.resource_name)
    }

    async fn update(
        &self,
        resource_id: &str,
        fields: &ContactPayload,
    ) -> std::result::Result<(), SourceError> {
        // updateContact requires the current etag
        let current = self.get_person(resource_id).await?;
        self.send(
            self.client
                .patch(format!("{}/v1/{resource_id}:updateContact", self.base_url))
                .query(&[("updatePersonFields", PERSON_FIELDS)])
                .json(&outbound_person(fields, current.etag)),
        )
        .await?;
        Ok(())
    }

    async fn delete(&self, resource_id: &str) -> std::result::Result<(), SourceError> {
        self.send(
            self.client
                .delete(format!("{}/v1/{resource_id}:deleteContact", self.base_url)),
        )
        .await?;
        Ok(())
    }

    fn note_limit(&self) -> usize {
        GOOGLE_NOTE_LIMIT
    }
}

/// Builds [`GooglePeopleSource`]s from a per-account token map
pub struct GoogleSourceFactory {
    tokens: HashMap<String, String>,
    base_url: String,
}

impl GoogleSourceFactory {
    /// Token map keyed by account email
    #[must_use]
    pub fn new(tokens: HashMap<String, String>) -> Self {
        Self {
            tokens: tokens
                .into_iter()
                .map(|(email, token)| (email.trim().to_lowercase(), token))
                .collect(),
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }

    /// Point all built sources at a different API host (tests)
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Load the token map from a JSON file: `{"account@gmail.com": "ya29..."}`
    pub fn from_token_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let tokens: HashMap<String, String> = serde_json::from_str(&content)?;
        Ok(Self::new(tokens))
    }
}

impl SourceFactory for GoogleSourceFactory {
    fn source_for(&self, account: &ExternalAccount) -> Result<Box<dyn ContactSource>> {
        let token = self
            .tokens
            .get(&account.email.trim().to_lowercase())
            .ok_or_else(|| {
                Error::InvalidInput(format!("No access token configured for {}", account.email))
            })?;
        Ok(Box::new(GooglePeopleSource::with_base_url(
            token.clone(),
            &self.base_url,
        )))
    }
}

// ============================================================================
// Error classification
// ============================================================================

fn classify_status(status: StatusCode, body: &str) -> SourceError {
    let message = parse_api_error(status, body);
    if status == StatusCode::TOO_MANY_REQUESTS
        || status == StatusCode::REQUEST_TIMEOUT
        || status.is_server_error()
    {
        SourceError::transient(message)
    } else {
        SourceError::permanent(message)
    }
}

fn classify_transport(err: reqwest::Error) -> SourceError {
    if err.is_timeout() || err.is_connect() {
        SourceError::transient(err.to_string())
    } else {
        SourceError::permanent(err.to_string())
    }
}

#[derive(Debug, Deserialize)]
struct GoogleErrorBody {
    error: Option<GoogleErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct GoogleErrorDetail {
    message: Option<String>,
}

fn parse_api_error(status: StatusCode, body: &str) -> String {
    if let Ok(payload) = serde_json::from_str::<GoogleErrorBody>(body) {
        if let Some(message) = payload.error.and_then(|detail| detail.message) {
            return format!("{} ({})", message.trim(), status.as_u16());
        }
    }

    let trimmed = body.trim();
    if trimmed.is_empty() {
        format!("HTTP {}", status.as_u16())
    } else {
        format!("{} ({})", trimmed, status.as_u16())
    }
}

fn parse_payload<T: serde::de::DeserializeOwned>(
    body: &str,
) -> std::result::Result<T, SourceError> {
    serde_json::from_str(body)
        .map_err(|e| SourceError::permanent(format!("invalid People API payload: {e}")))
}

// ============================================================================
// Wire types
// ============================================================================

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct ConnectionsPage {
    connections: Vec<GooglePerson>,
    next_page_token: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct GooglePerson {
    #[serde(skip_serializing_if = "String::is_empty")]
    resource_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    etag: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    names: Vec<GoogleName>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    email_addresses: Vec<GoogleTypedValue>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    phone_numbers: Vec<GoogleTypedValue>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    organizations: Vec<GoogleOrganization>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    biographies: Vec<GoogleBiography>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    addresses: Vec<GoogleAddress>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    birthdays: Vec<GoogleBirthday>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct GoogleName {
    #[serde(skip_serializing_if = "Option::is_none")]
    display_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    unstructured_name: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
struct GoogleTypedValue {
    #[serde(skip_serializing_if = "Option::is_none")]
    value: Option<String>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    kind: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
struct GoogleOrganization {
    #[serde(skip_serializing_if = "Option::is_none")]
    title: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct GoogleBiography {
    #[serde(skip_serializing_if = "Option::is_none")]
    value: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    content_type: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
struct GoogleAddress {
    #[serde(skip_serializing_if = "Option::is_none")]
    city: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
struct GoogleBirthday {
    #[serde(skip_serializing_if = "Option::is_none")]
    date: Option<GoogleDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
struct GoogleDate {
    #[serde(skip_serializing_if = "Option::is_none")]
    year: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    month: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    day: Option<u32>,
}

impl From<GooglePerson> for ExternalContact {
    fn from(person: GooglePerson) -> Self {
        let name = person
            .names
            .first()
            .and_then(|n| n.display_name.clone().or_else(|| n.unstructured_name.clone()))
            .unwrap_or_default();

        Self {
            resource_id: person.resource_name,
            name,
            emails: person
                .email_addresses
                .into_iter()
                .filter_map(|e| e.value)
                .collect(),
            phones: person
                .phone_numbers
                .into_iter()
                .filter_map(|p| p.value)
                .collect(),
            title: person.organizations.into_iter().find_map(|o| o.title),
            notes: person.biographies.into_iter().find_map(|b| b.value),
            location: person.addresses.into_iter().find_map(|a| a.city),
            birthday: person.birthdays.first().and_then(birthday_string),
        }
    }
}

fn birthday_string(birthday: &GoogleBirthday) -> Option<String> {
    if let Some(date) = &birthday.date {
        if let (Some(year), Some(month), Some(day)) = (date.year, date.month, date.day) {
            return Some(format!("{year:04}-{month:02}-{day:02}"));
        }
    }
    birthday.text.clone()
}

/// Build the outbound body for create/update
fn outbound_person(fields: &ContactPayload, etag: Option<String>) -> GooglePerson {
    GooglePerson {
        resource_name: String::new(),
        etag,
        names: vec![GoogleName {
            display_name: None,
            unstructured_name: Some(fields.name.clone()),
        }],
        email_addresses: fields
            .emails
            .iter()
            .map(|address| GoogleTypedValue {
                value: Some(address.clone()),
                kind: None,
            })
            .collect(),
        phone_numbers: fields
            .phones
            .iter()
            .map(|phone| GoogleTypedValue {
                value: Some(phone.clone()),
                kind: None,
            })
            .collect(),
        organizations: fields
            .title
            .iter()
            .map(|title| GoogleOrganization {
                title: Some(title.clone()),
            })
            .collect(),
        biographies: fields
            .notes
            .iter()
            .map(|notes| GoogleBiography {
                value: Some(notes.clone()),
                content_type: Some("TEXT_PLAIN".to_string()),
            })
            .collect(),
        addresses: fields
            .location
            .iter()
            .map(|city| GoogleAddress {
                city: Some(city.clone()),
            })
            .collect(),
        birthdays: fields
            .birthday
            .as_deref()
            .and_then(parse_birthday)
            .into_iter()
            .collect(),
    }
}

fn parse_birthday(value: &str) -> Option<GoogleBirthday> {
    let mut parts = value.splitn(3, '-');
    let year = parts.next()?.parse().ok()?;
    let month = parts.next()?.parse().ok()?;
    let day = parts.next()?.parse().ok()?;
    Some(GoogleBirthday {
        date: Some(GoogleDate {
            year: Some(year),
            month: Some(month),
            day: Some(day),
        }),
        text: None,
    })
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_connections_page_parsing() {
        let json = r#"{
            "connections": [
                {
                    "resourceName": "people/c100",
                    "etag": "tag-1",
                    "names": [{"displayName": "Mira Kovač"}],
                    "emailAddresses": [
                        {"value": "mira@x.com", "type": "work"},
                        {"value": "m@y.com"}
                    ],
                    "phoneNumbers": [{"value": "+385 91 111 222"}],
                    "organizations": [{"title": "Partner"}],
                    "biographies": [{"value": "Met at RustConf.", "contentType": "TEXT_PLAIN"}],
                    "addresses": [{"city": "Zagreb"}],
                    "birthdays": [{"date": {"year": 1988, "month": 4, "day": 9}}]
                }
            ],
            "nextPageToken": "tok"
        }"#;

        let page: ConnectionsPage = serde_json::from_str(json).unwrap();
        assert_eq!(page.next_page_token.as_deref(), Some("tok"));

        let contact = ExternalContact::from(page.connections[0].clone());
        assert_eq!(contact.resource_id, "people/c100");
        assert_eq!(contact.name, "Mira Kovač");
        assert_eq!(contact.emails, vec!["mira@x.com", "m@y.com"]);
        assert_eq!(contact.phones, vec!["+385 91 111 222"]);
        assert_eq!(contact.title.as_deref(), Some("Partner"));
        assert_eq!(contact.notes.as_deref(), Some("Met at RustConf."));
        assert_eq!(contact.location.as_deref(), Some("Zagreb"));
        assert_eq!(contact.birthday.as_deref(), Some("1988-04-09"));
    }

    #[test]
    fn test_sparse_person_parses_with_defaults() {
        let json = r#"{"connections": [{"resourceName": "people/c1"}]}"#;
        let page: ConnectionsPage = serde_json::from_str(json).unwrap();
        let contact = ExternalContact::from(page.connections[0].clone());
        assert_eq!(contact.resource_id, "people/c1");
        assert_eq!(contact.name, "");
        assert!(contact.emails.is_empty());
        assert!(page.next_page_token.is_none());
    }

    #[test]
    fn test_outbound_body_skips_empty_fields() {
        let payload = ContactPayload {
            name: "Mira Kovač".to_string(),
            emails: vec!["mira@x.com".to_string()],
            phones: Vec::new(),
            title: None,
            notes: None,
            location: None,
            birthday: None,
        };

        let value = serde_json::to_value(outbound_person(&payload, None)).unwrap();
        let object = value.as_object().unwrap();
        assert!(object.contains_key("names"));
        assert!(object.contains_key("emailAddresses"));
        assert!(!object.contains_key("resourceName"));
        assert!(!object.contains_key("etag"));
        assert!(!object.contains_key("phoneNumbers"));
        assert!(!object.contains_key("biographies"));
    }

    #[test]
    fn test_outbound_body_includes_etag_for_update() {
        let payload = ContactPayload {
            name: "Mira Kovač".to_string(),
            emails: Vec::new(),
            phones: Vec::new(),
            title: None,
            notes: Some("note".to_string()),
            location: None,
            birthday: Some("1988-04-09".to_string()),
        };

        let value =
            serde_json::to_value(outbound_person(&payload, Some("tag-7".to_string()))).unwrap();
        assert_eq!(value["etag"], "tag-7");
        assert_eq!(value["birthdays"][0]["date"]["year"], 1988);
        assert_eq!(value["biographies"][0]["contentType"], "TEXT_PLAIN");
    }

    #[test]
    fn test_parse_birthday_rejects_garbage() {
        assert!(parse_birthday("1988-04-09").is_some());
        assert!(parse_birthday("April 9").is_none());
        assert!(parse_birthday("").is_none());
    }

    #[test]
    fn test_classify_status() {
        assert!(classify_status(StatusCode::TOO_MANY_REQUESTS, "").is_transient());
        assert!(classify_status(StatusCode::INTERNAL_SERVER_ERROR, "").is_transient());
        assert!(classify_status(StatusCode::BAD_GATEWAY, "").is_transient());
        assert!(!classify_status(StatusCode::NOT_FOUND, "").is_transient());
        assert!(!classify_status(StatusCode::UNAUTHORIZED, "").is_transient());
    }

    #[test]
    fn test_parse_api_error_extracts_google_message() {
        let body = r#"{"error": {"code": 404, "message": "Contact not found", "status": "NOT_FOUND"}}"#;
        assert_eq!(
            parse_api_error(StatusCode::NOT_FOUND, body),
            "Contact not found (404)"
        );
        assert_eq!(parse_api_error(StatusCode::BAD_GATEWAY, ""), "HTTP 502");
    }

    #[test]
    fn test_factory_requires_token() {
        let factory = GoogleSourceFactory::new(HashMap::from([(
            "Mira@Example.com".to_string(),
            "ya29.token".to_string(),
        )]));

        // Lookup is case-insensitive
        assert!(factory
            .source_for(&ExternalAccount::new("mira@example.com"))
            .is_ok());
        assert!(factory
            .source_for(&ExternalAccount::new("other@example.com"))
            .is_err());
    }

    #[test]
    fn test_factory_from_token_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tokens.json");
        std::fs::write(&path, r#"{"mira@example.com": "ya29.secret"}"#).unwrap();

        let factory = GoogleSourceFactory::from_token_file(&path).unwrap();
        assert!(factory
            .source_for(&ExternalAccount::new("mira@example.com"))
            .is_ok());
    }
}
