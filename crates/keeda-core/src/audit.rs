//! Password strength audit.
//!
//! Scoring is delegated to `zxcvbn`; its 0-4 score maps onto five labels
//! from "Very Weak" to "Excellent".

use crate::models::{Entry, Vault};
use crate::tree;
use std::fmt;
use uuid::Uuid;
use zxcvbn::{zxcvbn, Score};

/// Score a vault password needs to pass [`audit_vault`] by default.
pub const DEFAULT_MIN_SCORE: u8 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Strength {
    VeryWeak,
    Weak,
    Good,
    Strong,
    Excellent,
}

impl Strength {
    pub fn label(self) -> &'static str {
        match self {
            Strength::VeryWeak => "Very Weak",
            Strength::Weak => "Weak",
            Strength::Good => "Good",
            Strength::Strong => "Strong",
            Strength::Excellent => "Excellent",
        }
    }
}

impl fmt::Display for Strength {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Strength estimate for one password.
#[derive(Debug, Clone, PartialEq)]
pub struct PasswordAudit {
    /// 0 (trivially guessable) to 4.
    pub score: u8,
    pub strength: Strength,
    /// Order of magnitude of the guesses needed to crack it.
    pub guesses_log10: f64,
}

/// Estimate a password's strength. `user_inputs` (title, username, ...) are
/// treated as known to an attacker.
pub fn audit_password(password: &str, user_inputs: &[&str]) -> PasswordAudit {
    if password.is_empty() {
        return PasswordAudit {
            score: 0,
            strength: Strength::VeryWeak,
            guesses_log10: 0.0,
        };
    }

    let entropy = zxcvbn(password, user_inputs);
    let (score, strength) = match entropy.score() {
        Score::Zero => (0, Strength::VeryWeak),
        Score::One => (1, Strength::Weak),
        Score::Two => (2, Strength::Good),
        Score::Three => (3, Strength::Strong),
        Score::Four => (4, Strength::Excellent),
        _ => (2, Strength::Good),
    };
    PasswordAudit {
        score,
        strength,
        guesses_log10: entropy.guesses_log10(),
    }
}

impl Entry {
    /// Audit this entry's password, with its title, username and URL as
    /// attacker knowledge.
    pub fn audit_password(&self) -> PasswordAudit {
        let fields = &self.fields;
        audit_password(
            fields.password.expose(),
            &[
                fields.title.as_str(),
                fields.username.as_str(),
                fields.url.as_str(),
            ],
        )
    }
}

/// An entry whose password fell below the audit threshold.
#[derive(Debug, Clone, PartialEq)]
pub struct WeakPassword {
    pub uuid: Uuid,
    pub title: String,
    /// Name of the owning group.
    pub group: String,
    pub audit: PasswordAudit,
}

/// Entries whose password scores below `min_score`, weakest first.
///
/// Entries without a password and entries in the recycle bin are skipped.
pub fn audit_vault(vault: &Vault, min_score: u8) -> Vec<WeakPassword> {
    let mut weak: Vec<WeakPassword> = tree::walk(&vault.root)
        .filter(|group| !vault.is_recycle_bin(group.uuid))
        .flat_map(|group| group.entries.iter().map(move |entry| (group, entry)))
        .filter(|(_, entry)| !entry.fields.password.is_empty())
        .filter_map(|(group, entry)| {
            let audit = entry.audit_password();
            (audit.score < min_score).then(|| WeakPassword {
                uuid: entry.uuid,
                title: entry.title().to_string(),
                group: group.name.clone(),
                audit,
            })
        })
        .collect();

    weak.sort_by(|a, b| {
        a.audit
            .score
            .cmp(&b.audit.score)
            .then_with(|| a.title.cmp(&b.title))
    });
    tracing::debug!("Audit found {} weak passwords", weak.len());
    weak
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::EntryFormData;

    const STRONG: &str = "x7#Kq!p2Lm9@wRz4&Vt8";

    #[test]
    fn empty_password_is_very_weak() {
        let audit = audit_password("", &[]);
        assert_eq!((audit.score, audit.strength), (0, Strength::VeryWeak));
        assert_eq!(audit.strength.to_string(), "Very Weak");
    }

    #[test]
    fn common_password_scores_low_and_random_one_high() {
        let weak = audit_password("password", &[]);
        assert_eq!(weak.strength, Strength::VeryWeak);

        let strong = audit_password(STRONG, &[]);
        assert_eq!(strong.score, 4);
        assert_eq!(strong.strength.label(), "Excellent");
        assert!(strong.guesses_log10 > weak.guesses_log10);
    }

    #[test]
    fn vault_audit_skips_recycled_and_empty_passwords() {
        let mut vault = Vault::new("Root");
        let root = vault.root.uuid;
        let work = vault.add_group(root, "Work", None, None).unwrap().uuid;
        let mut add = |group, title: &str, password: &str| {
            vault
                .add_entry(
                    group,
                    &EntryFormData {
                        title: title.into(),
                        password: password.into(),
                        ..EntryFormData::default()
                    },
                )
                .unwrap()
                .uuid
        };
        let weak = add(work, "Router", "password");
        add(root, "Bank", STRONG);
        add(root, "Note", "");
        let recycled = add(root, "Old", "123456");
        vault.recycle_entry(recycled).unwrap();

        let report = audit_vault(&vault, DEFAULT_MIN_SCORE);
        assert_eq!(report.len(), 1);
        assert_eq!(report[0].uuid, weak);
        assert_eq!(report[0].group, "Work");
        assert_eq!(report[0].audit.strength, Strength::VeryWeak);
    }
}
