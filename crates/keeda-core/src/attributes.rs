//! Mapping between canonical entries and the container's attribute bag.
//!
//! KDBX stores every entry field as a string-keyed attribute. Inside the
//! engine those attributes live in [`Attributes`], a typed record with the
//! fixed schema spelled out and a residual map for custom keys, so format
//! conversions only match on key names here.

use crate::models::{EntryFormData, ProtectedValue};
use std::collections::{BTreeMap, HashMap};
use url::Url;

/// Issuer written into synthesized OTP URLs.
pub const OTP_ISSUER: &str = "KeedaVault";
/// Label used when reconstructing an OTP URL without a title.
pub const OTP_FALLBACK_LABEL: &str = "Account";

pub const KEY_TITLE: &str = "Title";
pub const KEY_USERNAME: &str = "UserName";
pub const KEY_PASSWORD: &str = "Password";
pub const KEY_URL: &str = "URL";
pub const KEY_NOTES: &str = "Notes";
pub const KEY_EMAIL: &str = "Email";
pub const KEY_OTP: &str = "otp";

/// Keys an OTP value may be stored under, in preference order.
pub const OTP_KEYS: [&str; 5] = [KEY_OTP, "TOTP", "totp", "TOTP Settings", "otpauth"];

const FIXED_KEYS: [&str; 7] = [
    KEY_TITLE,
    KEY_USERNAME,
    KEY_PASSWORD,
    KEY_URL,
    KEY_NOTES,
    KEY_EMAIL,
    KEY_OTP,
];

/// A single value in the container's attribute bag.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Plain(String),
    Protected(ProtectedValue),
}

impl FieldValue {
    pub fn new(value: String, protected: bool) -> Self {
        if protected {
            FieldValue::Protected(ProtectedValue::new(value))
        } else {
            FieldValue::Plain(value)
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            FieldValue::Plain(s) => s,
            FieldValue::Protected(p) => p.expose(),
        }
    }

    pub fn is_protected(&self) -> bool {
        matches!(self, FieldValue::Protected(_))
    }
}

/// The attribute bag exchanged with the container.
pub type AttributeBag = HashMap<String, FieldValue>;

/// Typed view of an entry's attributes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Attributes {
    pub title: String,
    pub username: String,
    pub password: ProtectedValue,
    pub url: String,
    pub notes: String,
    /// `None` means the key is absent; `Some("")` is an explicitly cleared value.
    pub email: Option<String>,
    /// Full `otpauth://` URL.
    pub otp: Option<ProtectedValue>,
    /// Keys outside the fixed schema, with their protection flag.
    pub custom: BTreeMap<String, FieldValue>,
}

impl Attributes {
    /// Create semantics: an empty email is omitted entirely.
    pub fn from_form(data: &EntryFormData) -> Self {
        let mut attrs = Self {
            title: data.title.clone(),
            username: data.username.clone(),
            password: data.password.clone(),
            url: data.url.clone(),
            notes: data.notes.clone(),
            email: (!data.email.is_empty()).then(|| data.email.clone()),
            otp: None,
            custom: BTreeMap::new(),
        };
        if !data.totp_secret.is_empty() {
            attrs.otp = otp_url_from_secret(&data.totp_secret, &data.title).map(ProtectedValue::from);
        }
        for (key, value) in &data.custom_fields {
            if is_custom_key(key) && !value.is_empty() {
                attrs.custom.insert(key.clone(), FieldValue::Plain(value.clone()));
            }
        }
        attrs
    }

    /// Update semantics: an empty email clears the stored value instead of
    /// dropping the key, and custom keys missing from `data` are removed.
    /// Custom keys that already exist keep their protection flag.
    pub fn apply_form(&mut self, data: &EntryFormData) {
        self.title = data.title.clone();
        self.username = data.username.clone();
        self.password = data.password.clone();
        self.url = data.url.clone();
        self.notes = data.notes.clone();
        self.email = Some(data.email.clone());

        if data.totp_secret.is_empty() {
            self.otp = None;
        } else if let Some(url) = otp_url_from_secret(&data.totp_secret, &data.title) {
            self.otp = Some(url.into());
        }

        self.custom.retain(|key, _| data.custom_fields.contains_key(key));
        for (key, value) in &data.custom_fields {
            if is_custom_key(key) && !value.is_empty() {
                let protected = self.custom.get(key).is_some_and(FieldValue::is_protected);
                self.custom
                    .insert(key.clone(), FieldValue::new(value.clone(), protected));
            }
        }
    }

    /// Back to a canonical record; the OTP URL is reduced to its raw secret.
    pub fn to_form(&self) -> EntryFormData {
        EntryFormData {
            title: self.title.clone(),
            username: self.username.clone(),
            email: self.email.clone().unwrap_or_default(),
            password: self.password.clone(),
            url: self.url.clone(),
            notes: self.notes.clone(),
            totp_secret: self
                .otp
                .as_ref()
                .and_then(|otp| otp_secret_from_url(otp.expose()))
                .unwrap_or_default(),
            custom_fields: self
                .custom
                .iter()
                .map(|(key, value)| (key.clone(), value.as_str().to_string()))
                .collect(),
            ..EntryFormData::default()
        }
    }

    /// Read a container attribute bag.
    ///
    /// The OTP value is taken from the first non-empty key of [`OTP_KEYS`];
    /// a bare secret is turned into a URL labelled with the entry title.
    /// The consumed key is not repeated in `custom`; when nothing usable is
    /// found every OTP-like key stays in `custom` untouched.
    pub fn from_bag(bag: &AttributeBag) -> Self {
        let text = |key: &str| bag.get(key).map(|v| v.as_str().to_string()).unwrap_or_default();

        let title = text(KEY_TITLE);
        let mut consumed_otp_key = None;
        let mut otp = None;
        if let Some((key, value)) = OTP_KEYS
            .iter()
            .find_map(|key| bag.get(*key).filter(|v| !v.as_str().is_empty()).map(|v| (*key, v)))
        {
            let raw = value.as_str();
            let label = if title.is_empty() { OTP_FALLBACK_LABEL } else { title.as_str() };
            let url = if raw.starts_with("otpauth://") {
                Some(raw.to_string())
            } else {
                otp_url_from_secret(raw, label)
            };
            if let Some(url) = url {
                consumed_otp_key = Some(key);
                otp = Some(ProtectedValue::new(url));
            }
        }

        let custom = bag
            .iter()
            .filter(|(key, _)| !FIXED_KEYS.contains(&key.as_str()) || key.as_str() == KEY_OTP)
            .filter(|(key, _)| Some(key.as_str()) != consumed_otp_key)
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();

        Self {
            title,
            username: text(KEY_USERNAME),
            password: ProtectedValue::new(text(KEY_PASSWORD)),
            url: text(KEY_URL),
            notes: text(KEY_NOTES),
            email: bag.get(KEY_EMAIL).map(|v| v.as_str().to_string()),
            otp,
            custom,
        }
    }

    /// Write the container attribute bag. `Title`, `UserName`, `Password`,
    /// `URL` and `Notes` are always present.
    pub fn to_bag(&self) -> AttributeBag {
        let mut bag = AttributeBag::new();
        for (key, value) in &self.custom {
            bag.insert(key.clone(), value.clone());
        }
        bag.insert(KEY_TITLE.to_string(), FieldValue::Plain(self.title.clone()));
        bag.insert(KEY_USERNAME.to_string(), FieldValue::Plain(self.username.clone()));
        bag.insert(KEY_PASSWORD.to_string(), FieldValue::Protected(self.password.clone()));
        bag.insert(KEY_URL.to_string(), FieldValue::Plain(self.url.clone()));
        bag.insert(KEY_NOTES.to_string(), FieldValue::Plain(self.notes.clone()));
        if let Some(email) = &self.email {
            bag.insert(KEY_EMAIL.to_string(), FieldValue::Plain(email.clone()));
        }
        if let Some(otp) = &self.otp {
            bag.insert(KEY_OTP.to_string(), FieldValue::Protected(otp.clone()));
        }
        bag
    }
}

fn is_custom_key(key: &str) -> bool {
    !key.is_empty() && !FIXED_KEYS.contains(&key)
}

/// Normalize a raw secret: whitespace removed, uppercased.
pub fn normalize_secret(secret: &str) -> String {
    secret
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_uppercase()
}

/// Build `otpauth://totp/<issuer>:<label>?secret=<secret>&issuer=<issuer>`.
///
/// Returns `None` when the normalized secret is empty or not Base32
/// (`[A-Z2-7=]+`); an invalid secret is skipped, not an error.
pub fn otp_url_from_secret(secret: &str, label: &str) -> Option<String> {
    let clean = normalize_secret(secret);
    if clean.is_empty() || !clean.chars().all(|c| matches!(c, 'A'..='Z' | '2'..='7' | '=')) {
        return None;
    }
    let issuer = encode_component(OTP_ISSUER);
    Some(format!(
        "otpauth://totp/{issuer}:{}?secret={clean}&issuer={issuer}",
        encode_component(label)
    ))
}

/// Extract the `secret` query parameter of an `otpauth://` URL.
pub fn otp_secret_from_url(otp_url: &str) -> Option<String> {
    if !otp_url.starts_with("otpauth://") {
        return None;
    }
    let parsed = Url::parse(otp_url).ok()?;
    parsed
        .query_pairs()
        .find(|(key, _)| key == "secret")
        .map(|(_, value)| value.into_owned())
        .filter(|secret| !secret.is_empty())
}

/// Percent-encode everything except `A-Z a-z 0-9 - _ . ! ~ * ' ( )`.
fn encode_component(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for byte in input.bytes() {
        match byte {
            b'A'..=b'Z'
            | b'a'..=b'z'
            | b'0'..=b'9'
            | b'-'
            | b'_'
            | b'.'
            | b'!'
            | b'~'
            | b'*'
            | b'\''
            | b'('
            | b')' => out.push(char::from(byte)),
            _ => out.push_str(&format!("%{byte:02X}")),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn form(title: &str, secret: &str) -> EntryFormData {
        EntryFormData {
            title: title.to_string(),
            username: "alice".to_string(),
            password: "hunter2".into(),
            totp_secret: secret.to_string(),
            ..EntryFormData::default()
        }
    }

    #[test]
    fn synthesizes_otp_url_with_encoded_label() {
        let url = otp_url_from_secret("jbsw y3dp ehpk 3pxp", "My Bank").unwrap();
        assert_eq!(
            url,
            "otpauth://totp/KeedaVault:My%20Bank?secret=JBSWY3DPEHPK3PXP&issuer=KeedaVault"
        );
    }

    #[test]
    fn invalid_secret_is_skipped() {
        assert_eq!(otp_url_from_secret("not-base32!", "x"), None);
        assert_eq!(otp_url_from_secret("   ", "x"), None);
        let attrs = Attributes::from_form(&form("Site", "0189"));
        assert!(attrs.otp.is_none());
    }

    #[test]
    fn secret_survives_url_round_trip() {
        let url = otp_url_from_secret("abc234==", "a&b?c").unwrap();
        assert_eq!(otp_secret_from_url(&url).as_deref(), Some("ABC234=="));
    }

    #[test]
    fn create_omits_empty_email_but_update_clears_it() {
        let mut attrs = Attributes::from_form(&form("Site", ""));
        assert_eq!(attrs.email, None);
        assert!(!attrs.to_bag().contains_key(KEY_EMAIL));

        let mut data = form("Site", "");
        data.email = "a@b.c".to_string();
        attrs.apply_form(&data);
        assert_eq!(attrs.email.as_deref(), Some("a@b.c"));

        data.email.clear();
        attrs.apply_form(&data);
        assert_eq!(attrs.email.as_deref(), Some(""));
        assert_eq!(attrs.to_bag()[KEY_EMAIL].as_str(), "");
    }

    #[test]
    fn bag_always_has_fixed_keys() {
        let bag = Attributes::default().to_bag();
        for key in [KEY_TITLE, KEY_USERNAME, KEY_PASSWORD, KEY_URL, KEY_NOTES] {
            assert!(bag.contains_key(key), "missing {key}");
        }
        assert!(bag[KEY_PASSWORD].is_protected());
        assert!(!bag.contains_key(KEY_OTP));
    }

    #[test]
    fn otp_recovered_in_preference_order() {
        let mut bag = AttributeBag::new();
        bag.insert(KEY_TITLE.into(), FieldValue::Plain("GitHub".into()));
        bag.insert("totp".into(), FieldValue::Plain("JBSWY3DP".into()));
        bag.insert(
            "TOTP".into(),
            FieldValue::Plain("otpauth://totp/x?secret=AAAA".into()),
        );

        let attrs = Attributes::from_bag(&bag);
        assert_eq!(
            attrs.otp.as_ref().map(|o| o.expose()),
            Some("otpauth://totp/x?secret=AAAA")
        );
        assert!(!attrs.custom.contains_key("TOTP"));
        assert_eq!(attrs.custom.get("totp").map(FieldValue::as_str), Some("JBSWY3DP"));
    }

    #[test]
    fn bare_secret_is_labelled_with_title_or_fallback() {
        let mut bag = AttributeBag::new();
        bag.insert("otp".into(), FieldValue::Protected("jbswy3dp".into()));
        let attrs = Attributes::from_bag(&bag);
        assert_eq!(
            attrs.otp.unwrap().expose(),
            "otpauth://totp/KeedaVault:Account?secret=JBSWY3DP&issuer=KeedaVault"
        );

        bag.insert(KEY_TITLE.into(), FieldValue::Plain("Mail".into()));
        let attrs = Attributes::from_bag(&bag);
        assert!(attrs.otp.unwrap().expose().contains(":Mail?"));
    }

    #[test]
    fn unusable_otp_value_stays_custom() {
        let mut bag = AttributeBag::new();
        bag.insert("TOTP Settings".into(), FieldValue::Plain("30;6".into()));
        let attrs = Attributes::from_bag(&bag);
        assert!(attrs.otp.is_none());
        assert_eq!(
            attrs.custom.get("TOTP Settings").map(FieldValue::as_str),
            Some("30;6")
        );
    }

    #[test]
    fn update_replaces_custom_fields() {
        let mut data = form("Site", "");
        data.custom_fields.insert("PIN".into(), "1234".into());
        data.custom_fields.insert("Title".into(), "ignored".into());
        let mut attrs = Attributes::from_form(&data);
        assert_eq!(attrs.custom.len(), 1);
        assert_eq!(attrs.title, "Site");

        data.custom_fields.clear();
        data.custom_fields.insert("Recovery".into(), "words".into());
        attrs.apply_form(&data);
        assert!(!attrs.custom.contains_key("PIN"));
        assert_eq!(attrs.custom.get("Recovery").map(FieldValue::as_str), Some("words"));
    }

    #[test]
    fn protected_custom_fields_stay_protected() {
        let mut bag = Attributes::default().to_bag();
        bag.insert("PIN".into(), FieldValue::Protected("1234".into()));
        bag.insert("Hint".into(), FieldValue::Plain("first pet".into()));

        let mut attrs = Attributes::from_bag(&bag);
        assert!(attrs.custom["PIN"].is_protected());
        assert!(!attrs.custom["Hint"].is_protected());

        let mut data = attrs.to_form();
        assert_eq!(data.custom_fields["PIN"], "1234");
        data.custom_fields.insert("PIN".into(), "9876".into());
        data.custom_fields.insert("Backup".into(), "codes".into());
        attrs.apply_form(&data);

        let bag = attrs.to_bag();
        assert!(bag["PIN"].is_protected());
        assert_eq!(bag["PIN"].as_str(), "9876");
        assert!(!bag["Hint"].is_protected());
        assert!(!bag["Backup"].is_protected());
    }

    #[test]
    fn update_with_empty_secret_drops_otp() {
        let mut attrs = Attributes::from_form(&form("Site", "JBSWY3DP"));
        assert!(attrs.otp.is_some());
        attrs.apply_form(&form("Site", "!!invalid"));
        assert!(attrs.otp.is_some());
        attrs.apply_form(&form("Site", ""));
        assert!(attrs.otp.is_none());
    }

    #[test]
    fn form_round_trip_recovers_secret() {
        let attrs = Attributes::from_form(&form("Site", "jbsw y3dp"));
        let back = attrs.to_form();
        assert_eq!(back.totp_secret, "JBSWY3DP");
        assert_eq!(back.password.expose(), "hunter2");
    }
}
