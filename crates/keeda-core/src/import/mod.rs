//! Credential importers.
//!
//! Each source turns a raw payload into canonical [`EntryFormData`] records
//! via [`Importer::parse`]. Importers never see the vault; the caller picks
//! a target group and hands the records to [`import_into`].

pub mod bitwarden;
pub mod csv;
pub mod kdbx;

use crate::database::KdbxFormat;
use crate::error::{Result, VaultError};
use crate::models::{EntryFormData, ProtectedValue, Vault};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

pub use self::bitwarden::BitwardenJson;
pub use self::csv::{AppleCsv, ChromeCsv, FirefoxCsv, GenericCsv, LastPassCsv};
pub use self::kdbx::KdbxImporter;

/// Parses one import format.
pub trait Importer {
    fn parse(&self, payload: &[u8]) -> Result<Vec<EntryFormData>>;
}

/// The supported import sources.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportSource {
    GenericCsv,
    LastPass,
    Apple,
    Chrome,
    Firefox,
    Bitwarden,
    Kdbx,
}

impl ImportSource {
    pub const ALL: [ImportSource; 7] = [
        ImportSource::GenericCsv,
        ImportSource::LastPass,
        ImportSource::Apple,
        ImportSource::Chrome,
        ImportSource::Firefox,
        ImportSource::Bitwarden,
        ImportSource::Kdbx,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ImportSource::GenericCsv => "generic-csv",
            ImportSource::LastPass => "lastpass",
            ImportSource::Apple => "apple",
            ImportSource::Chrome => "chrome",
            ImportSource::Firefox => "firefox",
            ImportSource::Bitwarden => "bitwarden",
            ImportSource::Kdbx => "kdbx",
        }
    }

    pub fn requires_password(self) -> bool {
        self == ImportSource::Kdbx
    }

    /// Build the importer for this source. Only `Kdbx` uses `password`.
    pub fn importer(self, password: Option<ProtectedValue>) -> Result<Box<dyn Importer>> {
        Ok(match self {
            ImportSource::GenericCsv => Box::new(GenericCsv),
            ImportSource::LastPass => Box::new(LastPassCsv),
            ImportSource::Apple => Box::new(AppleCsv),
            ImportSource::Chrome => Box::new(ChromeCsv),
            ImportSource::Firefox => Box::new(FirefoxCsv),
            ImportSource::Bitwarden => Box::new(BitwardenJson),
            ImportSource::Kdbx => {
                let password = password.ok_or_else(|| {
                    VaultError::InvalidOperation("KDBX import requires a password".to_string())
                })?;
                Box::new(KdbxImporter::new(KdbxFormat::default(), password))
            }
        })
    }
}

impl fmt::Display for ImportSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ImportSource {
    type Err = VaultError;

    fn from_str(s: &str) -> Result<Self> {
        let wanted = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|source| source.as_str() == wanted)
            .ok_or_else(|| {
                let known: Vec<_> = Self::ALL.iter().map(|s| s.as_str()).collect();
                VaultError::ParseFailed(format!(
                    "unknown import source '{s}' (expected one of: {})",
                    known.join(", ")
                ))
            })
    }
}

/// Insert imported records into `group`, returning the new entry UUIDs.
///
/// The group is checked before anything is inserted. No deduplication
/// against existing entries is attempted.
pub fn import_into(vault: &mut Vault, group: Uuid, records: Vec<EntryFormData>) -> Result<Vec<Uuid>> {
    if vault.find_group(group).is_none() {
        return Err(VaultError::NotFound(format!("group {group}")));
    }
    let mut ids = Vec::with_capacity(records.len());
    for mut record in records {
        record.group_uuid = Some(group);
        ids.push(vault.add_entry(group, &record)?.uuid);
    }
    tracing::info!("Imported {} entries into group {}", ids.len(), group);
    Ok(ids)
}

pub(crate) fn utf8_payload(payload: &[u8]) -> Result<&str> {
    let text = std::str::from_utf8(payload)
        .map_err(|e| VaultError::ParseFailed(format!("payload is not UTF-8 (byte {})", e.valid_up_to())))?;
    Ok(text.strip_prefix('\u{feff}').unwrap_or(text))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_names_round_trip() {
        for source in ImportSource::ALL {
            assert_eq!(source.to_string().parse::<ImportSource>().unwrap(), source);
        }
        assert_eq!(" LastPass ".parse::<ImportSource>().unwrap(), ImportSource::LastPass);
        assert!("keepassxc".parse::<ImportSource>().is_err());
    }

    #[test]
    fn kdbx_importer_needs_password() {
        assert!(ImportSource::Kdbx.requires_password());
        assert!(matches!(
            ImportSource::Kdbx.importer(None),
            Err(VaultError::InvalidOperation(_))
        ));
        assert!(ImportSource::Chrome.importer(None).is_ok());
    }

    #[test]
    fn import_into_assigns_group() {
        let mut vault = Vault::new("Test");
        let root = vault.root.uuid;
        let records = vec![
            EntryFormData {
                title: "a".into(),
                ..EntryFormData::default()
            },
            EntryFormData {
                title: "b".into(),
                ..EntryFormData::default()
            },
        ];
        let ids = import_into(&mut vault, root, records.clone()).unwrap();
        assert_eq!(ids.len(), 2);
        assert_eq!(vault.root.entries.len(), 2);

        let err = import_into(&mut vault, Uuid::new_v4(), records).unwrap_err();
        assert!(matches!(err, VaultError::NotFound(_)));
        assert_eq!(vault.entry_count(), 2);
    }

    #[test]
    fn rejects_non_utf8() {
        assert!(matches!(
            utf8_payload(&[0xff, 0xfe, 0x00]),
            Err(VaultError::ParseFailed(_))
        ));
        assert_eq!(utf8_payload("\u{feff}a,b".as_bytes()).unwrap(), "a,b");
    }
}
