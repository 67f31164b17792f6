//! Placeholder syntax and the read-only scan over a package.

use std::collections::{BTreeMap, BTreeSet};

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde::Serialize;

use crate::docx::{Package, PartKind};

/// `{{name}}` or `{{name.field}}`; names are ASCII word characters.
pub static TOKEN_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\{\{([A-Za-z0-9_]+)(?:\.([A-Za-z0-9_]+))?\}\}").expect("token regex")
});

pub fn token(name: &str) -> String {
    format!("{{{{{name}}}}}")
}

pub fn field_token(name: &str, field: &str) -> String {
    format!("{{{{{name}.{field}}}}}")
}

/// A parsed token occurrence.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TokenRef<'a> {
    pub name: &'a str,
    pub field: Option<&'a str>,
}

impl<'a> TokenRef<'a> {
    pub fn from_captures(caps: &Captures<'a>) -> Option<Self> {
        Some(Self {
            name: caps.get(1)?.as_str(),
            field: caps.get(2).map(|m| m.as_str()),
        })
    }
}

/// Rewrite every token in `text` that `resolve` has a value for. Tokens
/// `resolve` declines are left as written. Returns the new text and the
/// number of tokens replaced, or `None` when nothing matched.
pub fn replace_tokens(
    text: &str,
    resolve: &mut dyn FnMut(TokenRef<'_>) -> Option<String>,
) -> Option<(String, usize)> {
    if !text.contains("{{") {
        return None;
    }
    let mut count = 0;
    let out = TOKEN_RE.replace_all(text, |caps: &Captures<'_>| {
        let original = caps[0].to_string();
        match TokenRef::from_captures(caps).and_then(|t| resolve(t)) {
            Some(v) => {
                count += 1;
                v
            }
            None => original,
        }
    });
    if count == 0 {
        return None;
    }
    Some((out.into_owned(), count))
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Location {
    Body,
    Table,
    Header,
    Footer,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct LocationCounts {
    pub body: usize,
    pub table: usize,
    pub header: usize,
    pub footer: usize,
}

impl LocationCounts {
    fn bump(&mut self, loc: Location) {
        match loc {
            Location::Body => self.body += 1,
            Location::Table => self.table += 1,
            Location::Header => self.header += 1,
            Location::Footer => self.footer += 1,
        }
    }
}

#[derive(Clone, Debug, Default, Serialize)]
pub struct PlaceholderReport {
    pub total_unique: usize,
    pub names: BTreeSet<String>,
    /// Occurrences per name; `{{a}}` and `{{a.b}}` both count toward `a`.
    pub occurrences: BTreeMap<String, usize>,
    pub locations: LocationCounts,
}

impl PlaceholderReport {
    fn record(&mut self, text: &str, loc: Location) {
        for caps in TOKEN_RE.captures_iter(text) {
            let Some(t) = TokenRef::from_captures(&caps) else {
                continue;
            };
            self.names.insert(t.name.to_string());
            *self.occurrences.entry(t.name.to_string()).or_insert(0) += 1;
            self.locations.bump(loc);
        }
    }
}

/// Scan every paragraph of the body (tables included) and of each header and
/// footer. Paragraph text is matched as a whole, so tokens split across runs
/// are found too.
pub fn scan(pkg: &Package) -> PlaceholderReport {
    let mut report = PlaceholderReport::default();
    for part in pkg.story_parts() {
        let kind = part.kind();
        part.body().for_each_paragraph(&mut |p, in_table| {
            let loc = match kind {
                PartKind::Header => Location::Header,
                PartKind::Footer => Location::Footer,
                PartKind::Main if in_table => Location::Table,
                PartKind::Main => Location::Body,
            };
            report.record(&p.text(), loc);
        });
    }
    report.total_unique = report.names.len();
    report
}

pub fn find_names(pkg: &Package) -> BTreeSet<String> {
    scan(pkg).names
}
