//! Bitwarden unencrypted JSON export.

use super::{utf8_payload, Importer};
use crate::attributes::otp_secret_from_url;
use crate::error::Result;
use crate::models::EntryFormData;
use serde::Deserialize;
use serde_json::Value;

const TYPE_LOGIN: u8 = 1;
const TYPE_SECURE_NOTE: u8 = 2;

#[derive(Debug, Deserialize)]
struct Export {
    #[serde(default)]
    items: Option<Vec<Value>>,
}

#[derive(Debug, Deserialize)]
struct Item {
    #[serde(rename = "type")]
    kind: u8,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    notes: Option<String>,
    #[serde(default)]
    login: Option<Login>,
}

#[derive(Debug, Deserialize)]
struct Login {
    #[serde(default)]
    username: Option<String>,
    #[serde(default)]
    password: Option<String>,
    #[serde(default)]
    totp: Option<String>,
    #[serde(default)]
    uris: Option<Vec<LoginUri>>,
}

#[derive(Debug, Deserialize)]
struct LoginUri {
    #[serde(default)]
    uri: Option<String>,
}

/// Logins (`type: 1`) and secure notes (`type: 2`); other item types are ignored.
#[derive(Debug, Clone, Copy, Default)]
pub struct BitwardenJson;

impl Importer for BitwardenJson {
    fn parse(&self, payload: &[u8]) -> Result<Vec<EntryFormData>> {
        let export: Export = serde_json::from_str(utf8_payload(payload)?)?;
        let Some(items) = export.items else {
            return Ok(Vec::new());
        };

        let mut records = Vec::new();
        for (index, raw) in items.into_iter().enumerate() {
            let item: Item = match serde_json::from_value(raw) {
                Ok(item) => item,
                Err(e) => {
                    tracing::warn!("Skipping Bitwarden item {}: {}", index, e);
                    continue;
                }
            };
            if let Some(record) = record_from_item(item) {
                records.push(record);
            }
        }
        Ok(records)
    }
}

fn record_from_item(item: Item) -> Option<EntryFormData> {
    let name = item.name.filter(|n| !n.is_empty());
    let notes = item.notes.unwrap_or_default();
    match (item.kind, item.login) {
        (TYPE_LOGIN, Some(login)) => {
            let url = login
                .uris
                .unwrap_or_default()
                .into_iter()
                .next()
                .and_then(|u| u.uri)
                .unwrap_or_default();
            let totp = login.totp.unwrap_or_default();
            Some(EntryFormData {
                title: name.unwrap_or_else(|| "Untitled".to_string()),
                username: login.username.unwrap_or_default(),
                password: login.password.unwrap_or_default().into(),
                url,
                notes,
                // Bitwarden stores either a bare secret or a full otpauth URL.
                totp_secret: otp_secret_from_url(&totp).unwrap_or(totp),
                ..EntryFormData::default()
            })
        }
        (TYPE_SECURE_NOTE, _) => Some(EntryFormData {
            title: name.unwrap_or_else(|| "Untitled Note".to_string()),
            notes,
            ..EntryFormData::default()
        }),
        _ => None,
    }
}
