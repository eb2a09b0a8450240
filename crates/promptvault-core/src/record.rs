//! Record and draft types for the prompt and context libraries.
//!
//! Records serialize in camelCase so payloads written by earlier clients
//! round-trip unchanged. The two entity kinds are structurally identical
//! except for the payload field (`template` vs `text`); the [`Record`] and
//! [`Draft`] traits are the seam the generic store machinery works against.

use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::ids::RecordId;

fn unix_epoch() -> DateTime<Utc> {
    DateTime::<Utc>::UNIX_EPOCH
}

/// Common surface the store machinery needs from both record kinds.
pub trait Record:
    Clone + PartialEq + Serialize + DeserializeOwned + Send + Sync + 'static
{
    /// Entity noun used in log and error messages.
    const ENTITY: &'static str;

    /// Stable identifier of this record.
    fn id(&self) -> &RecordId;

    /// Creation timestamp, set once and carried forward across updates.
    fn created_at(&self) -> DateTime<Utc>;
}

/// Save input paired with the record type it produces.
///
/// Fields left as `None` keep the prior record's value; `Some` replaces it.
/// Identity and timestamps are facade-managed and forced during the merge.
pub trait Draft: Clone + Send + Sync + 'static {
    /// Record type this draft saves into.
    type Output: Record;

    /// Caller-supplied identifier, if any.
    fn id(&self) -> Option<&RecordId>;

    /// Caller-supplied creation timestamp, if any. Only honored when no
    /// prior record exists for the id.
    fn created_at(&self) -> Option<DateTime<Utc>>;

    /// Merge this draft over the prior record (if any) into a full record.
    fn into_record(
        self,
        prior: Option<&Self::Output>,
        id: RecordId,
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
    ) -> Self::Output;
}

/// A prompt template held in the library.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptRecord {
    /// Unique, stable identifier.
    pub id: RecordId,
    /// Display name.
    pub name: String,
    /// Template payload inserted into the caller's input field.
    pub template: String,
    /// Optional free-form description.
    #[serde(default)]
    pub description: String,
    /// Set on first successful save; immutable afterwards.
    #[serde(default = "unix_epoch")]
    pub created_at: DateTime<Utc>,
    /// Refreshed on every write.
    #[serde(default = "unix_epoch")]
    pub updated_at: DateTime<Utc>,
}

impl Record for PromptRecord {
    const ENTITY: &'static str = "prompt";

    fn id(&self) -> &RecordId {
        &self.id
    }

    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

/// A context snippet held in the library.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextRecord {
    /// Unique, stable identifier.
    pub id: RecordId,
    /// Display name.
    pub name: String,
    /// Context text payload.
    pub text: String,
    /// Set on first successful save; immutable afterwards.
    #[serde(default = "unix_epoch")]
    pub created_at: DateTime<Utc>,
    /// Refreshed on every write.
    #[serde(default = "unix_epoch")]
    pub updated_at: DateTime<Utc>,
}

impl Record for ContextRecord {
    const ENTITY: &'static str = "context";

    fn id(&self) -> &RecordId {
        &self.id
    }

    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

/// Save input for a prompt.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptDraft {
    /// Target identifier; synthesized when absent.
    #[serde(default)]
    pub id: Option<RecordId>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub template: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    /// Honored only when creating a record; existing records keep theirs.
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl PromptDraft {
    /// Draft for a new prompt with the given name and template.
    #[must_use]
    pub fn new(name: impl Into<String>, template: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            template: Some(template.into()),
            ..Self::default()
        }
    }

    /// Targets an existing (or chosen) identifier.
    #[must_use]
    pub fn with_id(mut self, id: impl Into<RecordId>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Sets the description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

impl Draft for PromptDraft {
    type Output = PromptRecord;

    fn id(&self) -> Option<&RecordId> {
        self.id.as_ref()
    }

    fn created_at(&self) -> Option<DateTime<Utc>> {
        self.created_at
    }

    fn into_record(
        self,
        prior: Option<&PromptRecord>,
        id: RecordId,
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
    ) -> PromptRecord {
        PromptRecord {
            id,
            name: self
                .name
                .or_else(|| prior.map(|p| p.name.clone()))
                .unwrap_or_default(),
            template: self
                .template
                .or_else(|| prior.map(|p| p.template.clone()))
                .unwrap_or_default(),
            description: self
                .description
                .or_else(|| prior.map(|p| p.description.clone()))
                .unwrap_or_default(),
            created_at,
            updated_at,
        }
    }
}

/// Save input for a context snippet.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextDraft {
    /// Target identifier; synthesized when absent.
    #[serde(default)]
    pub id: Option<RecordId>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
    /// Honored only when creating a record; existing records keep theirs.
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl ContextDraft {
    /// Draft for a new context snippet with the given name and text.
    #[must_use]
    pub fn new(name: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            text: Some(text.into()),
            ..Self::default()
        }
    }

    /// Targets an existing (or chosen) identifier.
    #[must_use]
    pub fn with_id(mut self, id: impl Into<RecordId>) -> Self {
        self.id = Some(id.into());
        self
    }
}

impl Draft for ContextDraft {
    type Output = ContextRecord;

    fn id(&self) -> Option<&RecordId> {
        self.id.as_ref()
    }

    fn created_at(&self) -> Option<DateTime<Utc>> {
        self.created_at
    }

    fn into_record(
        self,
        prior: Option<&ContextRecord>,
        id: RecordId,
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
    ) -> ContextRecord {
        ContextRecord {
            id,
            name: self
                .name
                .or_else(|| prior.map(|c| c.name.clone()))
                .unwrap_or_default(),
            text: self
                .text
                .or_else(|| prior.map(|c| c.text.clone()))
                .unwrap_or_default(),
            created_at,
            updated_at,
        }
    }
}
