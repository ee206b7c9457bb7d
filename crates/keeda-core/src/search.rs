//! Fuzzy search over groups and entries.

use crate::models::Group;
use fuzzy_matcher::skim::SkimMatcherV2;
use fuzzy_matcher::FuzzyMatcher;
use uuid::Uuid;

/// A single search hit.
#[derive(Debug, Clone, PartialEq)]
pub enum SearchResult {
    Group {
        uuid: Uuid,
        name: String,
        /// Path of the parent groups, joined with " / ".
        path: String,
        score: i64,
    },
    Entry {
        uuid: Uuid,
        title: String,
        username: String,
        path: String,
        group_uuid: Uuid,
        score: i64,
    },
}

impl SearchResult {
    pub fn score(&self) -> i64 {
        match self {
            SearchResult::Group { score, .. } | SearchResult::Entry { score, .. } => *score,
        }
    }

    pub fn uuid(&self) -> Uuid {
        match self {
            SearchResult::Group { uuid, .. } | SearchResult::Entry { uuid, .. } => *uuid,
        }
    }

    fn search_text(&self) -> String {
        match self {
            SearchResult::Group { name, path, .. } => format!("{} {}", name, path),
            SearchResult::Entry {
                title,
                username,
                path,
                ..
            } => format!("{} {} {}", title, username, path),
        }
    }

    fn with_score(mut self, new_score: i64) -> Self {
        match &mut self {
            SearchResult::Group { score, .. } | SearchResult::Entry { score, .. } => {
                *score = new_score
            }
        }
        self
    }
}

/// Fuzzy-search group names and entry titles/usernames under `root`.
///
/// Results are sorted by descending score and truncated to `limit`. An
/// empty query returns the first `limit` items in tree order.
pub fn search(root: &Group, query: &str, limit: usize) -> Vec<SearchResult> {
    let items = collect_items(root);

    if query.is_empty() {
        return items.into_iter().take(limit).collect();
    }

    let matcher = SkimMatcherV2::default();
    let mut scored: Vec<SearchResult> = items
        .into_iter()
        .filter_map(|item| {
            matcher
                .fuzzy_match(&item.search_text(), query)
                .map(|score| item.with_score(score))
        })
        .collect();

    // Stable: equal scores keep tree order.
    scored.sort_by(|a, b| b.score().cmp(&a.score()));
    scored.truncate(limit);
    scored
}

/// Collect all groups and entries, parents first.
fn collect_items(root: &Group) -> Vec<SearchResult> {
    let mut items = Vec::new();
    let mut stack: Vec<(&Group, String)> = vec![(root, String::new())];

    while let Some((group, path)) = stack.pop() {
        let current_path = if path.is_empty() {
            group.name.clone()
        } else {
            format!("{} / {}", path, group.name)
        };

        items.push(SearchResult::Group {
            uuid: group.uuid,
            name: group.name.clone(),
            path,
            score: 0,
        });

        for entry in &group.entries {
            items.push(SearchResult::Entry {
                uuid: entry.uuid,
                title: entry.fields.title.clone(),
                username: entry.fields.username.clone(),
                path: current_path.clone(),
                group_uuid: group.uuid,
                score: 0,
            });
        }

        for child in group.groups.iter().rev() {
            stack.push((child, current_path.clone()));
        }
    }
    items
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Entry, EntryFormData};

    fn tree() -> Group {
        let mut root = Group::new("Vault");
        let mut email = Group::new("eMail");
        email.entries.push(Entry::from_form(&EntryFormData {
            title: "Gmail".into(),
            username: "me@example.com".into(),
            ..EntryFormData::default()
        }));
        let mut bank = Group::new("Homebanking");
        bank.entries.push(Entry::from_form(&EntryFormData {
            title: "Savings".into(),
            ..EntryFormData::default()
        }));
        root.groups.push(email);
        root.groups.push(bank);
        root
    }

    #[test]
    fn finds_entries_by_title() {
        let results = search(&tree(), "gmail", 15);
        match results.first() {
            Some(SearchResult::Entry { title, path, .. }) => {
                assert_eq!(title, "Gmail");
                assert_eq!(path, "Vault / eMail");
            }
            other => panic!("unexpected first result: {other:?}"),
        }
    }

    #[test]
    fn empty_query_lists_in_tree_order() {
        let results = search(&tree(), "", 3);
        assert_eq!(results.len(), 3);
        assert!(matches!(&results[0], SearchResult::Group { name, .. } if name == "Vault"));
        assert!(matches!(&results[1], SearchResult::Group { name, .. } if name == "eMail"));
        assert!(matches!(&results[2], SearchResult::Entry { title, .. } if title == "Gmail"));
    }

    #[test]
    fn no_match_yields_nothing() {
        assert!(search(&tree(), "zzzzqx", 15).is_empty());
    }
}
