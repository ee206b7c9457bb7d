//! Vault tree engine and credential importers for keeda.
//!
//! A [`Vault`] is an in-memory group tree read from (and written back to)
//! an encrypted KeePass container through a [`ContainerFormat`]. Entries are
//! edited through flat [`EntryFormData`] records, which are also what every
//! importer in [`import`] produces.

pub mod attributes;
pub mod audit;
pub mod database;
pub mod error;
pub mod import;
pub mod models;
pub mod search;
pub mod tree;
pub mod vault;

pub use attributes::{Attributes, FieldValue};
pub use audit::{audit_password, audit_vault, PasswordAudit, Strength, WeakPassword};
pub use database::{ContainerFormat, KdbxFormat, KdbxSource, SaveOptions};
pub use error::{Result, VaultError};
pub use import::{import_into, ImportSource, Importer};
pub use models::{
    Entry, EntryFormData, Group, GroupNode, GroupRef, OtpCode, ProtectedValue, RecycleOutcome, Vault,
};
pub use search::{search, SearchResult};
pub use vault::GroupUpdate;
