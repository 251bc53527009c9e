use crate::config::{AppointmentRecord, NormalizationRules};

/// The normalized (name, position, organization) triple used to group the
/// appointments of the same person in the same role.
#[derive(Eq, PartialEq, Debug, Clone, Hash, Ord, PartialOrd)]
pub struct IdentityKey {
    pub name: String,
    pub position: String,
    pub organization: String,
}

impl IdentityKey {
    pub fn new(record: &AppointmentRecord, rules: &NormalizationRules) -> IdentityKey {
        IdentityKey {
            name: normalize_name(&record.name, rules),
            position: normalize_text(&record.position),
            organization: normalize_text(&record.organization),
        }
    }

    /// A key with a missing component cannot establish an identity.
    pub fn is_complete(&self) -> bool {
        !self.name.is_empty() && !self.position.is_empty() && !self.organization.is_empty()
    }
}

/// Case-folds, drops punctuation and collapses whitespace.
pub fn normalize_text(s: &str) -> String {
    tokens(s).join(" ")
}

/// Like [`normalize_text`], and also drops the honorifics and suffixes listed in the rules.
///
/// The last remaining token is always kept, so that a name made only of
/// honorifics does not vanish.
pub fn normalize_name(s: &str, rules: &NormalizationRules) -> String {
    let toks = tokens(s);
    let mut start = 0;
    let mut end = toks.len();
    while end - start > 1 && rules.prefixes.iter().any(|p| *p == toks[start]) {
        start += 1;
    }
    while end - start > 1 && rules.suffixes.iter().any(|p| *p == toks[end - 1]) {
        end -= 1;
    }
    toks[start..end].join(" ")
}

fn tokens(s: &str) -> Vec<String> {
    let cleaned: String = s
        .to_lowercase()
        .chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace())
        .collect();
    cleaned.split_whitespace().map(|t| t.to_string()).collect()
}
