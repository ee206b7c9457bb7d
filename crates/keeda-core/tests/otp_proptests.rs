#![allow(clippy::unwrap_used)]

//! Property-based tests for OTP URL synthesis and recovery.

use keeda_core::attributes::{normalize_secret, otp_secret_from_url, otp_url_from_secret};
use keeda_core::{Attributes, EntryFormData};
use proptest::prelude::*;

proptest! {
    /// secret -> otpauth URL -> secret yields the normalized input.
    #[test]
    fn secret_round_trips(
        secret in "[A-Z2-7a-z ]{0,12}[A-Z2-7][A-Z2-7a-z ]{0,20}={0,6}",
        label in "\\PC{0,24}",
    ) {
        let url = otp_url_from_secret(&secret, &label).unwrap();
        prop_assert!(url.starts_with("otpauth://totp/KeedaVault:"));
        prop_assert_eq!(otp_secret_from_url(&url), Some(normalize_secret(&secret)));
    }

    /// Anything outside the Base32 alphabet is skipped rather than stored.
    #[test]
    fn non_base32_is_skipped(secret in "[A-Z2-7]{0,8}[0189!@#$%^&*_-][A-Z2-7]{0,8}") {
        prop_assert_eq!(otp_url_from_secret(&secret, "x"), None);
    }

    /// Creating an entry and reading it back as a form keeps the secret.
    #[test]
    fn entry_keeps_secret(secret in "[A-Z2-7]{1,32}", title in "\\PC{0,16}") {
        let attrs = Attributes::from_form(&EntryFormData {
            title,
            totp_secret: secret.clone(),
            ..EntryFormData::default()
        });
        let bag = attrs.to_bag();
        let back = Attributes::from_bag(&bag).to_form();
        prop_assert_eq!(back.totp_secret, secret);
    }
}
