//! CSV importers: generic, LastPass, Apple/iCloud, Chrome and Firefox.
//!
//! All of them share one RFC 4180 reader (quoted fields with embedded
//! commas, newlines and doubled quotes; `\n` or `\r\n` line endings) and
//! differ only in how header names map onto canonical fields. Columns that
//! map to nothing are dropped.

use super::{utf8_payload, Importer};
use crate::attributes::otp_secret_from_url;
use crate::error::Result;
use crate::models::EntryFormData;
use url::Url;

const UNTITLED: &str = "Untitled";

/// Column indices resolved from a header row. Later matching headers win.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub(crate) struct ColumnMap {
    title: Option<usize>,
    username: Option<usize>,
    password: Option<usize>,
    url: Option<usize>,
    notes: Option<usize>,
    totp: Option<usize>,
    /// LastPass folder path; resolved but not carried into records.
    group: Option<usize>,
}

#[derive(Clone, Copy)]
enum Column {
    Title,
    Username,
    Password,
    Url,
    Notes,
    Totp,
    Group,
}

impl ColumnMap {
    /// Resolve headers (trimmed, lowercased) through `classify`.
    fn resolve(header: &[String], classify: impl Fn(&str) -> Option<Column>) -> Self {
        let mut map = Self::default();
        for (index, name) in header.iter().enumerate() {
            let name = name.trim().to_lowercase();
            let slot = match classify(&name) {
                Some(Column::Title) => &mut map.title,
                Some(Column::Username) => &mut map.username,
                Some(Column::Password) => &mut map.password,
                Some(Column::Url) => &mut map.url,
                Some(Column::Notes) => &mut map.notes,
                Some(Column::Totp) => &mut map.totp,
                Some(Column::Group) => &mut map.group,
                None => continue,
            };
            *slot = Some(index);
        }
        map
    }
}

/// Read every record of a CSV payload; the first row is the header.
///
/// Blank lines produce no row. Records the reader cannot decode are
/// skipped with a warning.
pub(crate) fn read_rows(payload: &[u8]) -> Result<Vec<Vec<String>>> {
    let text = utf8_payload(payload)?;
    let mut reader = ::csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(text.as_bytes());

    let mut rows = Vec::new();
    for (index, record) in reader.records().enumerate() {
        match record {
            Ok(record) => rows.push(record.iter().map(str::to_string).collect()),
            Err(e) => {
                let err = crate::error::VaultError::from(e);
                tracing::warn!("Skipping CSV record {}: {}", index, err);
            }
        }
    }
    Ok(rows)
}

/// Split header from data rows, dropping rows that are a single empty field.
fn split_rows(payload: &[u8]) -> Result<Option<(Vec<String>, Vec<Vec<String>>)>> {
    let mut rows = read_rows(payload)?.into_iter();
    let Some(header) = rows.next() else {
        return Ok(None);
    };
    let data = rows
        .filter(|row| !(row.is_empty() || (row.len() == 1 && row[0].is_empty())))
        .collect();
    Ok(Some((header, data)))
}

fn cell(row: &[String], index: Option<usize>) -> String {
    index
        .and_then(|i| row.get(i))
        .cloned()
        .unwrap_or_default()
}

fn or_untitled(title: String) -> String {
    if title.is_empty() {
        UNTITLED.to_string()
    } else {
        title
    }
}

/// Map a row through `columns`; the TOTP column is taken as a raw secret.
fn record(row: &[String], columns: &ColumnMap) -> EntryFormData {
    EntryFormData {
        title: or_untitled(cell(row, columns.title)),
        username: cell(row, columns.username),
        password: cell(row, columns.password).into(),
        url: cell(row, columns.url),
        notes: cell(row, columns.notes),
        totp_secret: cell(row, columns.totp),
        ..EntryFormData::default()
    }
}

fn parse_with(
    payload: &[u8],
    classify: impl Fn(&str) -> Option<Column>,
    build: impl Fn(&[String], &ColumnMap) -> EntryFormData,
) -> Result<Vec<EntryFormData>> {
    let Some((header, rows)) = split_rows(payload)? else {
        return Ok(Vec::new());
    };
    let columns = ColumnMap::resolve(&header, classify);
    Ok(rows.iter().map(|row| build(row, &columns)).collect())
}

/// Any CSV with a header row; columns are matched by substring.
#[derive(Debug, Clone, Copy, Default)]
pub struct GenericCsv;

impl Importer for GenericCsv {
    fn parse(&self, payload: &[u8]) -> Result<Vec<EntryFormData>> {
        parse_with(
            payload,
            |h| {
                if h.contains("title") {
                    Some(Column::Title)
                } else if h.contains("user") {
                    Some(Column::Username)
                } else if h.contains("pass") {
                    Some(Column::Password)
                } else if h.contains("url") || h.contains("website") {
                    Some(Column::Url)
                } else if h.contains("note") {
                    Some(Column::Notes)
                } else if h.contains("otp") {
                    Some(Column::Totp)
                } else {
                    None
                }
            },
            record,
        )
    }
}

/// LastPass export: `url,username,password,totp,extra,name,grouping,fav`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LastPassCsv;

impl Importer for LastPassCsv {
    fn parse(&self, payload: &[u8]) -> Result<Vec<EntryFormData>> {
        parse_with(
            payload,
            |h| match h {
                "url" => Some(Column::Url),
                "username" => Some(Column::Username),
                "password" => Some(Column::Password),
                "totp" => Some(Column::Totp),
                "extra" => Some(Column::Notes),
                "name" => Some(Column::Title),
                "grouping" => Some(Column::Group),
                _ => None,
            },
            record,
        )
    }
}

/// Apple Passwords / iCloud Keychain export:
/// `Title,URL,Username,Password,Notes,OTPAuth`.
#[derive(Debug, Clone, Copy, Default)]
pub struct AppleCsv;

impl Importer for AppleCsv {
    fn parse(&self, payload: &[u8]) -> Result<Vec<EntryFormData>> {
        parse_with(
            payload,
            |h| match h {
                "title" => Some(Column::Title),
                "url" => Some(Column::Url),
                "username" => Some(Column::Username),
                "password" => Some(Column::Password),
                "notes" => Some(Column::Notes),
                "otpauth" => Some(Column::Totp),
                _ => None,
            },
            |row, columns| {
                // The OTPAuth column holds a full URL; keep only its secret.
                let otp_url = cell(row, columns.totp);
                EntryFormData {
                    totp_secret: otp_secret_from_url(&otp_url).unwrap_or_default(),
                    ..record(row, columns)
                }
            },
        )
    }
}

/// Chrome export: `name,url,username,password,note`. No OTP.
#[derive(Debug, Clone, Copy, Default)]
pub struct ChromeCsv;

impl Importer for ChromeCsv {
    fn parse(&self, payload: &[u8]) -> Result<Vec<EntryFormData>> {
        parse_with(
            payload,
            |h| match h {
                "name" => Some(Column::Title),
                "url" => Some(Column::Url),
                "username" => Some(Column::Username),
                "password" => Some(Column::Password),
                "note" => Some(Column::Notes),
                _ => None,
            },
            record,
        )
    }
}

/// Firefox export: `url,username,password,...`. Titles come from the URL host.
#[derive(Debug, Clone, Copy, Default)]
pub struct FirefoxCsv;

impl Importer for FirefoxCsv {
    fn parse(&self, payload: &[u8]) -> Result<Vec<EntryFormData>> {
        parse_with(
            payload,
            |h| match h {
                "url" => Some(Column::Url),
                "username" => Some(Column::Username),
                "password" => Some(Column::Password),
                _ => None,
            },
            |row, columns| {
                let url = cell(row, columns.url);
                EntryFormData {
                    title: title_from_url(&url),
                    username: cell(row, columns.username),
                    password: cell(row, columns.password).into(),
                    url,
                    ..EntryFormData::default()
                }
            },
        )
    }
}

/// Host of `url` when it parses and has one, else the raw string, else "Untitled".
fn title_from_url(url: &str) -> String {
    if url.is_empty() {
        return UNTITLED.to_string();
    }
    Url::parse(url)
        .ok()
        .and_then(|parsed| parsed.host_str().map(str::to_string))
        .filter(|host| !host.is_empty())
        .unwrap_or_else(|| url.to_string())
}
