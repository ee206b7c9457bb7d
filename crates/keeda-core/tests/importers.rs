#![allow(clippy::unwrap_used)]

//! Import payloads end to end: parse, then insert into a vault.

use keeda_core::{import_into, ImportSource, KdbxFormat, ContainerFormat};

fn parse(source: ImportSource, payload: &str) -> Vec<keeda_core::EntryFormData> {
    source.importer(None).unwrap().parse(payload.as_bytes()).unwrap()
}

#[test]
fn generic_csv_example() {
    let records = parse(
        ImportSource::GenericCsv,
        "Title,Username,Password,URL,Notes,OTP\nGmail,me@x.com,Secr3t!,https://gmail.com,,",
    );
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].title, "Gmail");
    assert_eq!(records[0].username, "me@x.com");
    assert_eq!(records[0].password.expose(), "Secr3t!");
    assert_eq!(records[0].url, "https://gmail.com");
    assert!(records[0].notes.is_empty());
    assert!(records[0].totp_secret.is_empty());
}

#[test]
fn firefox_csv_example() {
    let records = parse(
        ImportSource::Firefox,
        "url,username,password\nhttps://example.com,bob,pw1",
    );
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].title, "example.com");
    assert!(records[0].totp_secret.is_empty());
}

#[test]
fn bitwarden_example() {
    let records = parse(
        ImportSource::Bitwarden,
        r#"{"items":[
            {"type":1,"name":"Bank","login":{"username":"u","password":"p","uris":[{"uri":"https://bank.com"}]}},
            {"type":2,"name":"Note","notes":"text"}
        ]}"#,
    );
    assert_eq!(records[0].title, "Bank");
    assert_eq!(records[0].url, "https://bank.com");
    assert_eq!(records[1].notes, "text");
    assert!(records[1].username.is_empty());
    assert!(records[1].password.is_empty());
    assert!(records[1].url.is_empty());
}

#[test]
fn imported_otp_becomes_url_on_insert() {
    let records = parse(
        ImportSource::LastPass,
        "url,username,password,totp,extra,name,grouping,fav\r\n\
         https://x.com,joe,pw,jbsw y3dp,\"multi\nline\",X,Social,0\r\n\
         https://y.com,ann,pw2,,,,,\r\n",
    );
    assert_eq!(records.len(), 2);

    let mut vault = KdbxFormat::default().create("Imports");
    let target = vault.root.groups[3].uuid;
    let ids = import_into(&mut vault, target, records).unwrap();

    let first = vault.find_entry(ids[0]).unwrap();
    assert_eq!(first.fields.notes, "multi\nline");
    assert_eq!(
        first.fields.otp.as_ref().map(|otp| otp.expose()),
        Some("otpauth://totp/KeedaVault:X?secret=JBSWY3DP&issuer=KeedaVault")
    );

    let second = vault.find_entry(ids[1]).unwrap();
    assert_eq!(second.fields.title, "Untitled");
    assert!(second.fields.otp.is_none());
    assert_eq!(vault.find_group(target).unwrap().entries.len(), 2);
}

#[test]
fn apple_rows_keep_otp_secret() {
    let records = parse(
        ImportSource::Apple,
        "Title,URL,Username,Password,Notes,OTPAuth\n\
         GitHub,https://github.com,me,pw,,otpauth://totp/GitHub:me?secret=GEZDGNBV&issuer=GitHub\n",
    );
    assert_eq!(records[0].totp_secret, "GEZDGNBV");
}
