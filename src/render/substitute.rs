//! Scalar `{{name}}` substitution.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use crate::docx::model::Container;
use crate::docx::xml::structure_fingerprint;
use crate::docx::Package;
use crate::error::{Result, TemplateError};
use crate::progress::{emit, EventSink, Level};
use crate::render::placeholder::{find_names, replace_tokens, token, TokenRef};

#[derive(Clone, Copy, Debug)]
pub struct SubstituteOptions {
    /// Fail before touching anything when a placeholder has no value.
    pub strict: bool,
    /// Edit run text in place; when false, a paragraph with a replacement is
    /// rewritten as a single run.
    pub preserve_format: bool,
}

impl Default for SubstituteOptions {
    fn default() -> Self {
        Self {
            strict: false,
            preserve_format: true,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Validation {
    /// Placeholders in the document without a value.
    pub missing: Vec<String>,
    /// Values no placeholder asks for.
    pub unused: Vec<String>,
}

impl Validation {
    pub fn is_complete(&self) -> bool {
        self.missing.is_empty()
    }
}

pub fn validate<'a>(pkg: &Package, keys: impl IntoIterator<Item = &'a str>) -> Validation {
    let names = find_names(pkg);
    let keys: BTreeSet<&str> = keys.into_iter().collect();
    Validation {
        missing: names
            .iter()
            .filter(|n| !keys.contains(n.as_str()))
            .cloned()
            .collect(),
        unused: keys
            .iter()
            .filter(|k| !names.contains(**k))
            .map(|k| k.to_string())
            .collect(),
    }
}

/// Replace `{{key}}` tokens with their values across the body, tables,
/// headers and footers. Returns the number of tokens replaced.
pub fn substitute(
    pkg: &mut Package,
    values: &BTreeMap<String, String>,
    opts: &SubstituteOptions,
    sink: &dyn EventSink,
) -> Result<usize> {
    let v = validate(pkg, values.keys().map(String::as_str));
    if !v.is_complete() {
        let names = v.missing.join(", ");
        if opts.strict {
            emit(sink, Level::Error, format!("missing values for: {names}"));
            return Err(TemplateError::MissingData(v.missing));
        }
        emit(sink, Level::Warn, format!("left unfilled: {names}"));
    }
    let mut resolve = |t: TokenRef<'_>| match t.field {
        None => values.get(t.name).cloned(),
        Some(_) => None,
    };
    substitute_tokens(pkg, &mut resolve, opts.preserve_format, sink)
}

/// Like [`substitute`], but values come from `transform`, called with each
/// placeholder name found in the document.
pub fn substitute_with(
    pkg: &mut Package,
    mut transform: impl FnMut(&str) -> Option<String>,
    preserve_format: bool,
    sink: &dyn EventSink,
) -> Result<usize> {
    let mut resolve = |t: TokenRef<'_>| match t.field {
        None => transform(t.name),
        Some(_) => None,
    };
    substitute_tokens(pkg, &mut resolve, preserve_format, sink)
}

pub(crate) fn substitute_tokens(
    pkg: &mut Package,
    resolve: &mut dyn FnMut(TokenRef<'_>) -> Option<String>,
    preserve_format: bool,
    sink: &dyn EventSink,
) -> Result<usize> {
    let mut total = 0;
    let mut split: Vec<(String, String)> = Vec::new();
    pkg.update_parts(|part| {
        let before = part.fingerprint();
        let mut next = part.tree.clone();
        let n = substitute_in(&mut next.body, resolve, preserve_format);
        if preserve_format {
            for text in unresolved_paragraphs(&next.body, resolve) {
                split.push((part.path().to_string(), text));
            }
        }
        if n == 0 {
            return Ok(false);
        }
        if preserve_format && structure_fingerprint(&next.to_events()) != before {
            return Err(TemplateError::StructureChanged(part.path().to_string()));
        }
        emit(
            sink,
            Level::Debug,
            format!("{}: {n} placeholder(s) replaced", part.path()),
        );
        part.tree = next;
        total += n;
        Ok(true)
    })?;
    for (path, text) in split {
        emit(
            sink,
            Level::Warn,
            format!("{path}: placeholder split across runs left unchanged in \"{text}\""),
        );
    }
    emit(sink, Level::Info, format!("replaced {total} placeholder(s)"));
    Ok(total)
}

fn substitute_in(
    body: &mut Container,
    resolve: &mut dyn FnMut(TokenRef<'_>) -> Option<String>,
    preserve_format: bool,
) -> usize {
    let mut n = 0;
    body.for_each_paragraph_mut(&mut |p| {
        if preserve_format {
            p.map_run_texts(&mut |text| {
                let (out, c) = replace_tokens(text, resolve)?;
                n += c;
                Some(out)
            });
        } else if let Some((out, c)) = replace_tokens(&p.text(), resolve) {
            p.rewrite_text(&out);
            n += c;
        }
    });
    n
}

/// Paragraphs that still hold a token `resolve` could fill; after an
/// in-place pass those are tokens no single run contains.
fn unresolved_paragraphs(
    body: &Container,
    resolve: &mut dyn FnMut(TokenRef<'_>) -> Option<String>,
) -> Vec<String> {
    let mut out = Vec::new();
    body.for_each_paragraph(&mut |p, _| {
        let text = p.text();
        if replace_tokens(&text, resolve).is_some() {
            out.push(text);
        }
    });
    out
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PreviewExample {
    pub original: String,
    pub replaced: String,
}

/// Show how up to `max` paragraphs would read after substitution without
/// changing the package.
pub fn preview(
    pkg: &Package,
    values: &BTreeMap<String, String>,
    max: usize,
) -> Vec<PreviewExample> {
    let mut out = Vec::new();
    let mut resolve = |t: TokenRef<'_>| match t.field {
        None => values.get(t.name).cloned(),
        Some(_) => None,
    };
    for part in pkg.story_parts() {
        part.body().for_each_paragraph(&mut |p, _| {
            if out.len() >= max {
                return;
            }
            let original = p.text();
            if let Some((replaced, _)) = replace_tokens(&original, &mut resolve) {
                out.push(PreviewExample { original, replaced });
            }
        });
    }
    out
}

/// Names in `values` that will not be found because the document spells
/// them across several runs.
pub fn split_placeholders(pkg: &Package, values: &BTreeMap<String, String>) -> Vec<String> {
    let mut found = BTreeSet::new();
    for part in pkg.story_parts() {
        part.body().for_each_paragraph(&mut |p, _| {
            let in_runs: String = p
                .runs()
                .iter()
                .map(|r| r.text())
                .collect::<Vec<_>>()
                .join("\u{0}");
            for name in values.keys() {
                let tok = token(name);
                if p.text().contains(&tok) && !in_runs.contains(&tok) {
                    found.insert(name.clone());
                }
            }
        });
    }
    found.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::{NullSink, RecordingSink};
    use crate::testutil::{para, table, DocxBuilder};

    fn values(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn bold_para(text: &str) -> String {
        format!(r#"<w:p><w:r><w:rPr><w:b/><w:color w:val="FF0000"/></w:rPr><w:t>{text}</w:t></w:r></w:p>"#)
    }

    #[test]
    fn replaces_everywhere_and_keeps_format() {
        let bytes = DocxBuilder::new()
            .body(&bold_para("Hello {{name}}!"))
            .body(&table(&[&["{{name}}", "{{date}}"]]))
            .header(0, &para(&["{{company}}"]))
            .footer(0, &para(&["{{name}} / {{company}}"]))
            .build();
        let mut pkg = Package::from_bytes(&bytes).expect("open");
        let sink = RecordingSink::new();
        let n = substitute(
            &mut pkg,
            &values(&[("name", "Ada"), ("date", "2024-01-01"), ("company", "ACME")]),
            &SubstituteOptions::default(),
            &sink,
        )
        .expect("substitute");
        assert_eq!(n, 6);
        assert!(sink.contains(Level::Info, "replaced 6"));
        let saved = Package::from_bytes(&pkg.to_bytes().expect("save")).expect("reopen");
        assert!(find_names(&saved).is_empty());
        let first = saved.main().body().paragraphs().next().expect("p");
        assert_eq!(first.text(), "Hello Ada!");
        let fmt = first.runs()[0].format();
        assert!(fmt.bold);
        assert_eq!(fmt.color.as_deref(), Some("FF0000"));
        assert_eq!(saved.extract_text(true).lines().last(), Some("Ada / ACME"));
    }

    #[test]
    fn strict_mode_fails_before_mutation() {
        let bytes = DocxBuilder::new()
            .body(&para(&["{{a}} {{b}}"]))
            .build();
        let mut pkg = Package::from_bytes(&bytes).expect("open");
        let opts = SubstituteOptions {
            strict: true,
            ..Default::default()
        };
        let err = substitute(&mut pkg, &values(&[("a", "1")]), &opts, &NullSink)
            .err()
            .expect("error");
        assert!(matches!(err, TemplateError::MissingData(ref m) if m == &vec!["b".to_string()]));
        assert!(!pkg.is_modified());
        assert_eq!(pkg.extract_text(false), "{{a}} {{b}}");
    }

    #[test]
    fn lenient_mode_leaves_unknown_tokens() {
        let bytes = DocxBuilder::new().body(&para(&["{{a}} {{b}}"])).build();
        let mut pkg = Package::from_bytes(&bytes).expect("open");
        let n = substitute(
            &mut pkg,
            &values(&[("a", "1")]),
            &SubstituteOptions::default(),
            &NullSink,
        )
        .expect("substitute");
        assert_eq!(n, 1);
        assert_eq!(pkg.extract_text(false), "1 {{b}}");
    }

    #[test]
    fn split_token_is_reported_not_merged() {
        let bytes = DocxBuilder::new()
            .body(&para(&["Dear {{na", "me}}"]))
            .build();
        let mut pkg = Package::from_bytes(&bytes).expect("open");
        let vals = values(&[("name", "Ada")]);
        assert_eq!(split_placeholders(&pkg, &vals), vec!["name".to_string()]);
        let sink = RecordingSink::new();
        let n = substitute(&mut pkg, &vals, &SubstituteOptions::default(), &sink).expect("sub");
        assert_eq!(n, 0);
        assert!(sink.contains(Level::Warn, "split across runs"));
        assert!(!pkg.is_modified());
    }

    #[test]
    fn non_preserving_mode_collapses_runs() {
        let bytes = DocxBuilder::new()
            .body(&para(&["Dear {{na", "me}}, welcome"]))
            .build();
        let mut pkg = Package::from_bytes(&bytes).expect("open");
        let opts = SubstituteOptions {
            preserve_format: false,
            ..Default::default()
        };
        let n = substitute(&mut pkg, &values(&[("name", "Ada")]), &opts, &NullSink).expect("sub");
        assert_eq!(n, 1);
        let p = pkg.main().body().paragraphs().next().expect("p");
        assert_eq!(p.text(), "Dear Ada, welcome");
        assert_eq!(p.runs().len(), 1);
    }

    #[test]
    fn validate_reports_both_directions() {
        let bytes = DocxBuilder::new().body(&para(&["{{a}} {{b}}"])).build();
        let pkg = Package::from_bytes(&bytes).expect("open");
        let v = validate(&pkg, ["a", "c"]);
        assert_eq!(v.missing, vec!["b".to_string()]);
        assert_eq!(v.unused, vec!["c".to_string()]);
        assert!(!v.is_complete());
    }

    #[test]
    fn transformer_and_preview() {
        let bytes = DocxBuilder::new()
            .body(&para(&["{{first}} and {{second}}"]))
            .body(&para(&["no tokens"]))
            .build();
        let mut pkg = Package::from_bytes(&bytes).expect("open");
        let shown = preview(&pkg, &values(&[("first", "1")]), 5);
        assert_eq!(
            shown,
            vec![PreviewExample {
                original: "{{first}} and {{second}}".into(),
                replaced: "1 and {{second}}".into()
            }]
        );
        assert!(!pkg.is_modified());
        let n = substitute_with(&mut pkg, |name| Some(name.to_uppercase()), true, &NullSink)
            .expect("sub");
        assert_eq!(n, 2);
        assert_eq!(pkg.extract_text(false), "FIRST and SECOND\nno tokens");
    }
}
