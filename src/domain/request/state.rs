//! Core types for grant requests.
//!
//! A grant request is a bag of operator-supplied business fields plus the lifecycle columns the
//! console tracks (status, generated file, timestamps). The business fields are opaque to the
//! console: they are stored, shown, and handed to the report generator as-is.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::error::{ConsoleError, Result};

/// Form field that carries the default delivery address rather than business data.
pub const RECIPIENT_FIELD: &str = "recipient";

/// Fields tried, in order, when picking a display title for a request.
const TITLE_FIELDS: [&str; 4] = ["name", "applicant", "organization", "title"];

/// Opaque business fields of a request.
pub type RequestFields = Map<String, Value>;

/// Unique identifier for a grant request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(pub Uuid);

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Display only first 8 characters for readability in logs
        write!(f, "{}", &self.0.to_string()[..8])
    }
}

impl From<Uuid> for RequestId {
    fn from(uuid: Uuid) -> Self {
        RequestId(uuid)
    }
}

impl std::ops::Deref for RequestId {
    type Target = Uuid;
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

/// Lifecycle status of a grant request.
///
/// Deleted requests are removed from storage, so there is no `Deleted` status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestStatus {
    /// Created by the operator, nothing generated yet
    Created,
    /// Generation is in flight; acts as a claim against concurrent runs
    Running,
    /// The report PDF exists at `file_path`
    Generated,
    /// The report was delivered to a recipient
    Delivered,
    /// Hidden from the active workflow; can be reached from any status
    Archived,
}

impl RequestStatus {
    pub const ALL: [RequestStatus; 5] = [
        RequestStatus::Created,
        RequestStatus::Running,
        RequestStatus::Generated,
        RequestStatus::Delivered,
        RequestStatus::Archived,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RequestStatus::Created => "created",
            RequestStatus::Running => "running",
            RequestStatus::Generated => "generated",
            RequestStatus::Delivered => "delivered",
            RequestStatus::Archived => "archived",
        }
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RequestStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "created" => Ok(RequestStatus::Created),
            "running" => Ok(RequestStatus::Running),
            "generated" => Ok(RequestStatus::Generated),
            "delivered" => Ok(RequestStatus::Delivered),
            "archived" => Ok(RequestStatus::Archived),
            _ => Err(format!("Invalid request status: {}", s)),
        }
    }
}

/// A grant request as stored by the console.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GrantRequest {
    pub id: RequestId,
    pub status: RequestStatus,
    pub fields: RequestFields,
    /// Default delivery address captured at creation
    pub recipient: Option<String>,
    /// Generated PDF; set once generation succeeds
    pub file_path: Option<PathBuf>,
    pub created_at: DateTime<Utc>,
    pub run_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
    /// Address the report was actually sent to
    pub delivered_to: Option<String>,
}

/// Truncate to microseconds, the resolution Postgres `TIMESTAMPTZ` keeps.
///
/// Every timestamp written to a request goes through this, so a row read back from storage
/// equals the value the write returned.
pub fn stored_timestamp(at: DateTime<Utc>) -> DateTime<Utc> {
    at.trunc_subsecs(6)
}

impl GrantRequest {
    /// Build a freshly created request.
    pub fn new(input: NewGrantRequest, created_at: DateTime<Utc>) -> Self {
        let created_at = stored_timestamp(created_at);
        Self {
            id: RequestId::from(Uuid::new_v4()),
            status: RequestStatus::Created,
            fields: input.fields,
            recipient: input.recipient,
            file_path: None,
            created_at,
            run_at: None,
            delivered_at: None,
            delivered_to: None,
        }
    }

    /// Human readable label: the first non-empty title-like field, else the short id.
    pub fn title(&self) -> String {
        TITLE_FIELDS
            .iter()
            .filter_map(|key| self.fields.get(*key))
            .find_map(|value| match value {
                Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
                Value::Number(n) => Some(n.to_string()),
                _ => None,
            })
            .unwrap_or_else(|| format!("Request {}", self.id))
    }

    /// Free text describing the project, if the operator supplied any.
    pub fn narrative(&self) -> Option<&str> {
        ["narrative", "description", "input"]
            .iter()
            .filter_map(|key| self.fields.get(*key))
            .find_map(|value| value.as_str())
            .filter(|text| !text.trim().is_empty())
    }
}

/// Input for creating a new grant request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewGrantRequest {
    pub fields: RequestFields,
    pub recipient: Option<String>,
}

impl NewGrantRequest {
    /// Build from raw form pairs.
    ///
    /// Blank values are dropped, the `recipient` pair becomes the default delivery address, and
    /// values that parse as numbers are stored as JSON numbers.
    pub fn from_form<I, K, V>(pairs: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: AsRef<str>,
    {
        let mut fields = RequestFields::new();
        let mut recipient = None;

        for (key, value) in pairs {
            let key = key.into();
            let key = key.trim();
            let value = value.as_ref().trim();
            if key.is_empty() || value.is_empty() {
                continue;
            }
            if key == RECIPIENT_FIELD {
                recipient = Some(value.to_string());
                continue;
            }
            fields.insert(key.to_string(), form_value(value));
        }

        let input = Self { fields, recipient };
        input.validate()?;
        Ok(input)
    }

    /// Reject requests with no business fields or an unparseable recipient.
    pub fn validate(&self) -> Result<()> {
        if self.fields.is_empty() {
            return Err(ConsoleError::Validation(
                "A grant request needs at least one field".to_string(),
            ));
        }
        if let Some(recipient) = &self.recipient {
            validate_address(recipient)?;
        }
        Ok(())
    }
}

/// Check that `address` is a well-formed mailbox address.
pub fn validate_address(address: &str) -> Result<()> {
    address
        .parse::<lettre::Address>()
        .map(|_| ())
        .map_err(|e| ConsoleError::Validation(format!("Invalid recipient '{address}': {e}")))
}

fn form_value(raw: &str) -> Value {
    if let Ok(n) = raw.parse::<i64>() {
        return Value::from(n);
    }
    match raw.parse::<f64>() {
        Ok(f) if f.is_finite() => Value::from(f),
        _ => Value::String(raw.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_created_at_has_storage_precision() {
        let at = DateTime::parse_from_rfc3339("2026-03-01T12:00:00.123456789Z")
            .unwrap()
            .with_timezone(&Utc);
        let request = GrantRequest::new(NewGrantRequest::default(), at);
        assert_eq!(request.created_at.timestamp_subsec_nanos(), 123_456_000);
    }

    #[test]
    fn test_status_round_trips_through_str() {
        for status in RequestStatus::ALL {
            assert_eq!(status.as_str().parse::<RequestStatus>(), Ok(status));
        }
        assert!("deleted".parse::<RequestStatus>().is_err());
    }

    #[test]
    fn test_new_request_starts_created_without_file() {
        let request = GrantRequest::new(NewGrantRequest::default(), Utc::now());
        assert_eq!(request.status, RequestStatus::Created);
        assert!(request.file_path.is_none());
        assert!(request.run_at.is_none());
        assert!(request.delivered_at.is_none());
    }

    #[test]
    fn test_from_form_types_values_and_extracts_recipient() {
        let input = NewGrantRequest::from_form([
            ("name", "Acme"),
            ("amount", "5000"),
            ("ratio", "0.5"),
            ("recipient", "grants@acme.example"),
            ("notes", "   "),
        ])
        .unwrap();

        assert_eq!(input.fields.get("name"), Some(&json!("Acme")));
        assert_eq!(input.fields.get("amount"), Some(&json!(5000)));
        assert_eq!(input.fields.get("ratio"), Some(&json!(0.5)));
        assert!(!input.fields.contains_key("notes"));
        assert!(!input.fields.contains_key("recipient"));
        assert_eq!(input.recipient.as_deref(), Some("grants@acme.example"));
    }

    #[test]
    fn test_from_form_rejects_empty_and_bad_recipient() {
        let empty: [(&str, &str); 0] = [];
        assert!(matches!(
            NewGrantRequest::from_form(empty),
            Err(ConsoleError::Validation(_))
        ));
        assert!(matches!(
            NewGrantRequest::from_form([("name", "Acme"), ("recipient", "not an address")]),
            Err(ConsoleError::Validation(_))
        ));
    }

    #[test]
    fn test_title_prefers_name_then_falls_back_to_id() {
        let mut input = NewGrantRequest::default();
        input.fields.insert("organization".into(), json!("City Office"));
        input.fields.insert("name".into(), json!("Acme"));
        let request = GrantRequest::new(input, Utc::now());
        assert_eq!(request.title(), "Acme");

        let untitled = GrantRequest::new(NewGrantRequest::default(), Utc::now());
        assert!(untitled.title().starts_with("Request "));
    }
}
