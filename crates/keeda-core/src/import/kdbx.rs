//! Import from another KeePass container.

use super::Importer;
use crate::database::ContainerFormat;
use crate::error::Result;
use crate::models::{EntryFormData, ProtectedValue};
use crate::tree;

/// Flattens every entry of an encrypted container, in preorder.
///
/// The container format (and with it the key-derivation setup) is passed
/// in by the caller. Recycled entries are included; custom attributes are
/// not carried over.
pub struct KdbxImporter<F> {
    format: F,
    password: ProtectedValue,
}

impl<F: ContainerFormat> KdbxImporter<F> {
    pub fn new(format: F, password: ProtectedValue) -> Self {
        Self { format, password }
    }
}

impl<F: ContainerFormat> Importer for KdbxImporter<F> {
    fn parse(&self, payload: &[u8]) -> Result<Vec<EntryFormData>> {
        let source = self.format.open(payload, &self.password)?;

        let records: Vec<EntryFormData> = tree::walk(&source.root)
            .flat_map(|group| group.entries.iter())
            .map(|entry| {
                let form = entry.fields.to_form();
                EntryFormData {
                    title: if form.title.is_empty() {
                        "Untitled".to_string()
                    } else {
                        form.title
                    },
                    custom_fields: Default::default(),
                    ..form
                }
            })
            .collect();

        tracing::debug!("Read {} entries from container {:?}", records.len(), source.name);
        Ok(records)
    }
}
