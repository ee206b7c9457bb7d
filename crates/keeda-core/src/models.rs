//! Shared data types for the vault tree and the import pipeline.

use crate::attributes::Attributes;
use crate::database::KdbxSource;
use crate::error::{Result, VaultError};
use chrono::{NaiveDateTime, Timelike, Utc};
use keepass::db::TOTP;
use std::collections::BTreeMap;
use std::fmt;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use url::Url;
use uuid::Uuid;
use zeroize::Zeroizing;

/// Standard KeePass folder icon.
pub const DEFAULT_GROUP_ICON: usize = 48;
/// Standard KeePass trash icon.
pub const RECYCLE_BIN_ICON: usize = 43;
pub const RECYCLE_BIN_NAME: &str = "Recycle Bin";
/// Code length when an `otpauth://` URL has no `digits` parameter.
pub const DEFAULT_OTP_DIGITS: u32 = 6;

/// Current time, truncated to the second precision KDBX stores.
pub(crate) fn now() -> NaiveDateTime {
    let now = Utc::now().naive_utc();
    now.with_nanosecond(0).unwrap_or(now)
}

/// A secret string (password, OTP URL) that is zeroed on drop and never
/// printed by `Debug`.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct ProtectedValue(Zeroizing<String>);

impl ProtectedValue {
    pub fn new(value: impl Into<String>) -> Self {
        Self(Zeroizing::new(value.into()))
    }

    /// Access the plain text. Callers must not log the result.
    pub fn expose(&self) -> &str {
        self.0.as_str()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for ProtectedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ProtectedValue(***)")
    }
}

impl From<String> for ProtectedValue {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

impl From<&str> for ProtectedValue {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Represents a group (folder) in the vault tree.
#[derive(Debug, Clone, PartialEq)]
pub struct Group {
    pub uuid: Uuid,
    pub name: String,
    pub icon: usize,
    /// Custom "allow adding entries" flag; `None` when never set.
    pub allow_add: Option<bool>,
    pub entries: Vec<Entry>,
    pub groups: Vec<Group>,
    pub created: NaiveDateTime,
    pub last_modified: NaiveDateTime,
}

impl Group {
    /// Create an empty group with a fresh UUID.
    pub fn new(name: impl Into<String>) -> Self {
        let now = now();
        Self {
            uuid: Uuid::new_v4(),
            name: name.into(),
            icon: DEFAULT_GROUP_ICON,
            allow_add: None,
            entries: Vec::new(),
            groups: Vec::new(),
            created: now,
            last_modified: now,
        }
    }

    pub(crate) fn touch(&mut self) {
        self.last_modified = now();
    }
}

impl Drop for Group {
    fn drop(&mut self) {
        let mut pending = std::mem::take(&mut self.groups);
        while let Some(mut group) = pending.pop() {
            pending.append(&mut group.groups);
        }
    }
}

/// Represents a password entry.
#[derive(Debug, Clone, PartialEq)]
pub struct Entry {
    pub uuid: Uuid,
    pub icon: usize,
    pub fields: Attributes,
    pub tags: Vec<String>,
    pub created: NaiveDateTime,
    pub last_modified: NaiveDateTime,
    pub expiry: Option<NaiveDateTime>,
}

impl Entry {
    /// Create an empty entry with a fresh UUID.
    pub fn new() -> Self {
        let now = now();
        Self {
            uuid: Uuid::new_v4(),
            icon: 0,
            fields: Attributes::default(),
            tags: Vec::new(),
            created: now,
            last_modified: now,
            expiry: None,
        }
    }

    /// Build a new entry from a canonical record, using create semantics.
    pub fn from_form(data: &EntryFormData) -> Self {
        let mut entry = Self::new();
        entry.fields = Attributes::from_form(data);
        entry.icon = data.icon.unwrap_or(0);
        entry.tags = data.tags.clone();
        entry.expiry = data.expiry_time;
        entry
    }

    /// Apply a canonical record onto this entry, using update semantics.
    pub fn apply_form(&mut self, data: &EntryFormData) {
        self.fields.apply_form(data);
        if let Some(icon) = data.icon {
            self.icon = icon;
        }
        self.tags = data.tags.clone();
        self.expiry = data.expiry_time;
        self.touch();
    }

    /// Convert back to a canonical record owned by `group`, e.g. for editing.
    pub fn to_form_data(&self, group: Uuid) -> EntryFormData {
        let mut data = self.fields.to_form();
        data.uuid = Some(self.uuid);
        data.group_uuid = Some(group);
        data.icon = Some(self.icon);
        data.tags = self.tags.clone();
        data.expiry_time = self.expiry;
        data
    }

    pub fn title(&self) -> &str {
        &self.fields.title
    }

    /// The current TOTP code, or `None` when the entry has no OTP.
    pub fn totp_code(&self) -> Result<Option<OtpCode>> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|e| VaultError::InvalidOperation(format!("system clock error: {e}")))?;
        self.totp_code_at(now.as_secs())
    }

    /// The TOTP code for a Unix timestamp.
    pub fn totp_code_at(&self, unix_time: u64) -> Result<Option<OtpCode>> {
        let Some(url) = &self.fields.otp else {
            return Ok(None);
        };
        let invalid = |e: &dyn fmt::Display| {
            VaultError::ParseFailed(format!("OTP URL of entry {}: {e}", self.uuid))
        };
        let mut totp: TOTP = url.expose().parse().map_err(|e| invalid(&e))?;
        let has_digits = Url::parse(url.expose())
            .map_err(|e| invalid(&e))?
            .query_pairs()
            .any(|(key, _)| key == "digits");
        if !has_digits {
            totp.digits = DEFAULT_OTP_DIGITS;
        }

        let code = totp.value_at(unix_time);
        Ok(Some(OtpCode {
            code: code.code,
            valid_for: code.valid_for,
            period: code.period,
        }))
    }

    pub(crate) fn touch(&mut self) {
        self.last_modified = now();
    }
}

impl Default for Entry {
    fn default() -> Self {
        Self::new()
    }
}

/// A generated one-time password.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OtpCode {
    pub code: String,
    /// Time left before the code rolls over.
    pub valid_for: Duration,
    pub period: Duration,
}

/// Canonical import record: the flat shape every importer produces and
/// `Vault::add_entry` / `Vault::update_entry` consume.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EntryFormData {
    /// Present when editing an existing entry.
    pub uuid: Option<Uuid>,
    /// Target group; importers leave it unset for the caller to fill in.
    pub group_uuid: Option<Uuid>,
    pub title: String,
    pub username: String,
    pub email: String,
    pub password: ProtectedValue,
    pub url: String,
    pub notes: String,
    /// Raw Base32 secret, not yet an `otpauth://` URL.
    pub totp_secret: String,
    pub icon: Option<usize>,
    pub tags: Vec<String>,
    pub custom_fields: BTreeMap<String, String>,
    pub expiry_time: Option<NaiveDateTime>,
}

/// An open vault: the group tree plus the container metadata the engine needs.
#[derive(Debug, Clone, PartialEq)]
pub struct Vault {
    pub name: String,
    pub root: Group,
    /// Designated recycle-bin group, from container metadata.
    pub recycle_bin: Option<Uuid>,
    /// The container this vault was opened from, if any. Saving merges the
    /// tree back into it.
    pub source: Option<KdbxSource>,
}

impl Vault {
    /// Create a vault with an empty root group named after it.
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            root: Group::new(name.clone()),
            name,
            recycle_bin: None,
            source: None,
        }
    }

    pub fn is_recycle_bin(&self, group: Uuid) -> bool {
        self.recycle_bin == Some(group)
    }
}

/// Display-ready group, produced by `Vault::list_groups_ordered`.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupNode {
    pub uuid: Uuid,
    pub name: String,
    pub icon: usize,
    pub allow_add: Option<bool>,
    pub is_recycle_bin: bool,
    pub entries: Vec<Entry>,
    pub subgroups: Vec<GroupNode>,
}

impl Drop for GroupNode {
    fn drop(&mut self) {
        let mut pending = std::mem::take(&mut self.subgroups);
        while let Some(mut node) = pending.pop() {
            pending.append(&mut node.subgroups);
        }
    }
}

/// Where `Vault::recycle_entry` put an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecycleOutcome {
    /// Moved into the recycle bin.
    Recycled,
    /// Already in the recycle bin, removed for good.
    Deleted,
}

/// Lightweight reference to a group, returned by restore queries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupRef {
    pub uuid: Uuid,
    pub name: String,
    pub icon: usize,
}

impl From<&Group> for GroupRef {
    fn from(group: &Group) -> Self {
        Self {
            uuid: group.uuid,
            name: group.name.clone(),
            icon: group.icon,
        }
    }
}
