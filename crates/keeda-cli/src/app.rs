//! Session state for one command: which file, which password.

use anyhow::{bail, Context, Result};
use keeda_core::database;
use keeda_core::tree::walk;
use keeda_core::{ContainerFormat, Entry, KdbxFormat, ProtectedValue, SaveOptions, Vault};
use std::path::PathBuf;
use uuid::Uuid;

/// Environment variable holding the master password.
pub const PASSWORD_VAR: &str = "KEEDA_PASSWORD";
/// Environment variable holding the password of a KDBX file being imported.
pub const IMPORT_PASSWORD_VAR: &str = "KEEDA_IMPORT_PASSWORD";

/// Main application model.
pub struct App {
    /// Path to the database file.
    pub database_path: PathBuf,
    password: ProtectedValue,
    save_options: SaveOptions,
}

impl App {
    pub fn new(database_path: PathBuf, password: ProtectedValue) -> Self {
        Self {
            database_path,
            password,
            save_options: SaveOptions::default(),
        }
    }

    /// Keep at most `max_backups` backups when saving; zero disables them.
    pub fn with_max_backups(mut self, max_backups: usize) -> Self {
        self.save_options.backup = max_backups > 0;
        self.save_options.max_backups = max_backups;
        self
    }

    /// Build from the environment (after `.env` has been loaded).
    pub fn from_env(database_path: PathBuf) -> Result<Self> {
        let password = read_secret(PASSWORD_VAR)?;
        Ok(Self::new(database_path, password))
    }

    pub async fn unlock(&self) -> Result<Vault> {
        database::unlock(&self.database_path, self.password.clone(), KdbxFormat::default())
            .await
            .with_context(|| format!("Failed to unlock {}", self.database_path.display()))
    }

    pub async fn save(&self, vault: &Vault) -> Result<()> {
        database::save_with(
            vault,
            &self.database_path,
            self.password.clone(),
            KdbxFormat::default(),
            &self.save_options,
        )
        .await
        .with_context(|| format!("Failed to save {}", self.database_path.display()))
    }

    /// Create a new database file with the default groups.
    pub async fn create(&self, name: &str) -> Result<Vault> {
        if self.database_path.exists() {
            bail!("{} already exists", self.database_path.display());
        }
        let vault = KdbxFormat::default().create(name);
        self.save(&vault).await?;
        tracing::info!("Created database {}", self.database_path.display());
        Ok(vault)
    }
}

/// Read a secret from the environment.
pub fn read_secret(var: &str) -> Result<ProtectedValue> {
    match std::env::var(var) {
        Ok(value) if !value.is_empty() => Ok(ProtectedValue::new(value)),
        _ => bail!("{var} is not set"),
    }
}

/// Resolve a group by UUID, or by name (case-insensitive, first in tree order).
pub fn resolve_group(vault: &Vault, spec: Option<&str>) -> Result<Uuid> {
    let Some(spec) = spec.map(str::trim).filter(|s| !s.is_empty()) else {
        return Ok(vault.root.uuid);
    };
    if let Ok(id) = Uuid::parse_str(spec) {
        if vault.find_group(id).is_some() {
            return Ok(id);
        }
    }
    walk(&vault.root)
        .find(|group| group.name.eq_ignore_ascii_case(spec))
        .map(|group| group.uuid)
        .with_context(|| format!("No group named '{spec}'"))
}

/// Resolve an entry by UUID, or by title (case-insensitive, first in tree
/// order, recycle bin excluded).
pub fn resolve_entry<'a>(vault: &'a Vault, spec: &str) -> Result<&'a Entry> {
    let spec = spec.trim();
    if let Ok(id) = Uuid::parse_str(spec) {
        if let Some(entry) = vault.find_entry(id) {
            return Ok(entry);
        }
    }
    walk(&vault.root)
        .filter(|group| !vault.is_recycle_bin(group.uuid))
        .flat_map(|group| group.entries.iter())
        .find(|entry| entry.title().eq_ignore_ascii_case(spec))
        .with_context(|| format!("No entry named '{spec}'"))
}
