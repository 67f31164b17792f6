//! Array expansion: `{{list}}` paragraphs become one paragraph per item and
//! a table row referencing `{{rows.field}}` becomes one row per record.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::docx::model::{Paragraph, Row, Table};
use crate::docx::Package;
use crate::error::{Result, TemplateError};
use crate::progress::{emit, EventSink, Level};
use crate::render::data::{Record, TemplateData};
use crate::render::placeholder::{replace_tokens, token, TokenRef, TOKEN_RE};

pub const DEFAULT_BULLET: &str = "• ";

#[derive(Clone, Debug)]
pub struct ExpandOptions {
    /// Prefix put in front of every list item.
    pub bullet: String,
}

impl Default for ExpandOptions {
    fn default() -> Self {
        Self {
            bullet: DEFAULT_BULLET.to_string(),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ExpansionReport {
    pub lists_expanded: usize,
    pub tables_expanded: usize,
}

/// Expand every array in `data`: record sets into table rows first, then
/// scalar lists into paragraphs.
pub fn expand(
    pkg: &mut Package,
    data: &TemplateData,
    opts: &ExpandOptions,
    sink: &dyn EventSink,
) -> Result<ExpansionReport> {
    let tables_expanded = expand_tables(pkg, &data.rows(), sink)?;
    let lists_expanded = expand_lists(pkg, &data.lists(), &opts.bullet, sink)?;
    Ok(ExpansionReport {
        lists_expanded,
        tables_expanded,
    })
}

/// Every list named in a paragraph is expanded, in key order, over the
/// paragraphs the previous lists produced. Returns the number of
/// (paragraph, list) sites expanded.
pub fn expand_lists(
    pkg: &mut Package,
    lists: &BTreeMap<String, Vec<String>>,
    bullet: &str,
    sink: &dyn EventSink,
) -> Result<usize> {
    if lists.is_empty() {
        return Ok(0);
    }
    let mut sites = 0;
    pkg.update_parts(|part| {
        let mut n = 0;
        part.body_mut().flat_map_paragraphs(&mut |p| {
            let mut out = vec![p];
            for (name, items) in lists {
                let tok = token(name);
                if !out.iter().any(|q| q.text().contains(&tok)) {
                    continue;
                }
                n += 1;
                out = out
                    .into_iter()
                    .flat_map(|q| {
                        if q.text().contains(&tok) {
                            expand_list_paragraph(q, name, items, bullet)
                        } else {
                            vec![q]
                        }
                    })
                    .collect();
            }
            out
        });
        if n > 0 {
            emit(
                sink,
                Level::Debug,
                format!("{}: expanded {n} list placeholder(s)", part.path()),
            );
        }
        sites += n;
        Ok(n > 0)
    })?;
    Ok(sites)
}

fn expand_list_paragraph(
    mut p: Paragraph,
    name: &str,
    items: &[String],
    bullet: &str,
) -> Vec<Paragraph> {
    let tok = token(name);
    let template = p.clone();
    let first = items
        .first()
        .map(|item| format!("{bullet}{item}"))
        .unwrap_or_default();
    replace_literal(&mut p, &tok, &first);
    let mut out = Vec::with_capacity(items.len().max(1));
    out.push(p);
    for item in items.iter().skip(1) {
        out.push(Paragraph::styled_like(&template, &format!("{bullet}{item}")));
    }
    out
}

fn replace_literal(p: &mut Paragraph, needle: &str, value: &str) {
    p.map_run_texts(&mut |t| t.contains(needle).then(|| t.replace(needle, value)));
    let text = p.text();
    if text.contains(needle) {
        p.rewrite_text(&text.replace(needle, value));
    }
}

/// Each record set fills the first table, in document order, that has a row
/// referencing it. Returns the number of tables expanded.
pub fn expand_tables(
    pkg: &mut Package,
    rows: &BTreeMap<String, Vec<Record>>,
    sink: &dyn EventSink,
) -> Result<usize> {
    let mut expanded = 0;
    for (name, records) in rows {
        let mut done = false;
        pkg.update_parts(|part| {
            if done {
                return Ok(false);
            }
            let mut outcome = Ok(());
            let mut filled = 0;
            let hit = part.body_mut().find_table_mut(&mut |table| {
                let Some(idx) = template_row_index(table, name) else {
                    return false;
                };
                filled = records.len();
                outcome = fill_table(table, idx, name, records);
                true
            });
            if !hit {
                return Ok(false);
            }
            done = true;
            outcome.map_err(|e| TemplateError::xml(part.path(), e))?;
            emit(
                sink,
                Level::Debug,
                format!("{}: table for `{name}` filled with {filled} row(s)", part.path()),
            );
            Ok(true)
        })?;
        if done {
            expanded += 1;
        } else {
            emit(
                sink,
                Level::Warn,
                format!("no table row references `{name}`; data left unused"),
            );
        }
    }
    Ok(expanded)
}

/// First row with a cell mentioning `{{name}}` or `{{name.field}}`.
fn template_row_index(table: &Table, name: &str) -> Option<usize> {
    table.rows().position(|row| {
        row.cells().any(|cell| {
            TOKEN_RE
                .captures_iter(&cell.text())
                .any(|caps| TokenRef::from_captures(&caps).map(|t| t.name == name).unwrap_or(false))
        })
    })
}

fn fill_table(table: &mut Table, idx: usize, name: &str, records: &[Record]) -> anyhow::Result<()> {
    let template = table
        .row(idx)
        .cloned()
        .ok_or_else(|| anyhow::anyhow!("template row {idx} vanished"))?;
    let Some((first, rest)) = records.split_first() else {
        // No records: keep the row, drop its tokens.
        if let Some(row) = table.row_mut(idx) {
            fill_row(row, name, None);
        }
        return Ok(());
    };
    if let Some(row) = table.row_mut(idx) {
        fill_row(row, name, Some(first));
    }
    let clones = rest
        .iter()
        .map(|rec| {
            let mut row = template.clone();
            row.strip_unique_ids();
            fill_row(&mut row, name, Some(rec));
            row
        })
        .collect();
    table.insert_rows_after(idx, clones)
}

/// Fill `{{name.field}}` and bare `{{field}}` tokens from `record`. Bare
/// `{{name}}` is removed. Without a record every `name` token and every bare
/// token in the row is cleared.
fn fill_row(row: &mut Row, name: &str, record: Option<&Record>) {
    let mut resolve = |t: TokenRef<'_>| match (t.name == name, t.field, record) {
        (true, None, _) => Some(String::new()),
        (true, Some(_), None) | (false, None, None) => Some(String::new()),
        (true, Some(field), Some(rec)) => rec.get(field).cloned(),
        (false, None, Some(rec)) => rec.get(t.name).cloned(),
        _ => None,
    };
    row.for_each_paragraph_mut(&mut |p| {
        p.map_run_texts(&mut |text| replace_tokens(text, &mut resolve).map(|(out, _)| out));
        if let Some((out, _)) = replace_tokens(&p.text(), &mut resolve) {
            p.rewrite_text(&out);
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::{NullSink, RecordingSink};
    use crate::render::placeholder::find_names;
    use crate::testutil::{para, table, DocxBuilder};

    fn record(pairs: &[(&str, &str)]) -> Record {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn styled_list_para(text: &str) -> String {
        format!(
            r#"<w:p><w:pPr><w:pStyle w:val="ListParagraph"/></w:pPr><w:r><w:rPr><w:i/></w:rPr><w:t>{text}</w:t></w:r></w:p>"#
        )
    }

    fn body_texts(pkg: &Package) -> Vec<String> {
        pkg.main().body().paragraphs().map(|p| p.text()).collect()
    }

    #[test]
    fn list_becomes_one_paragraph_per_item() {
        let bytes = DocxBuilder::new()
            .body(&para(&["Before"]))
            .body(&styled_list_para("{{skills}}"))
            .body(&para(&["After"]))
            .build();
        let mut pkg = Package::from_bytes(&bytes).expect("open");
        let data = TemplateData::new().with_list("skills", ["Rust", "XML", "Zip"]);
        let report = expand(&mut pkg, &data, &ExpandOptions::default(), &NullSink).expect("expand");
        assert_eq!(report.lists_expanded, 1);
        assert_eq!(
            body_texts(&pkg),
            vec!["Before", "• Rust", "• XML", "• Zip", "After"]
        );
        let paras: Vec<&Paragraph> = pkg.main().body().paragraphs().collect();
        assert!(paras[1..4].iter().all(|p| p.style_id() == Some("ListParagraph")));
        assert!(paras[1].runs()[0].format().italic);
        assert!(!paras[2].runs()[0].format().italic);
    }

    #[test]
    fn empty_list_strips_token() {
        let bytes = DocxBuilder::new()
            .body(&para(&["Skills: {{skills}}"]))
            .build();
        let mut pkg = Package::from_bytes(&bytes).expect("open");
        let lists = BTreeMap::from([("skills".to_string(), Vec::new())]);
        let n = expand_lists(&mut pkg, &lists, DEFAULT_BULLET, &NullSink).expect("expand");
        assert_eq!(n, 1);
        assert_eq!(body_texts(&pkg), vec!["Skills: "]);
    }

    #[test]
    fn list_token_split_across_runs_still_expands() {
        let bytes = DocxBuilder::new()
            .body(&para(&["{{ste", "ps}}"]))
            .build();
        let mut pkg = Package::from_bytes(&bytes).expect("open");
        let data = TemplateData::new().with_list("steps", ["a", "b"]);
        let opts = ExpandOptions {
            bullet: "- ".into(),
        };
        expand(&mut pkg, &data, &opts, &NullSink).expect("expand");
        assert_eq!(body_texts(&pkg), vec!["- a", "- b"]);
    }

    #[test]
    fn table_rows_follow_records() {
        let bytes = DocxBuilder::new()
            .body(&table(&[
                &["Name", "Qty"],
                &["{{items.name}}", "{{qty}}"],
                &["Total", "{{total}}"],
            ]))
            .build();
        let mut pkg = Package::from_bytes(&bytes).expect("open");
        let data = TemplateData::new().with_rows(
            "items",
            vec![
                record(&[("name", "Widget"), ("qty", "2")]),
                record(&[("name", "Gadget"), ("qty", "5")]),
                record(&[("name", "Gizmo"), ("qty", "1")]),
            ],
        );
        let sink = RecordingSink::new();
        let report = expand(&mut pkg, &data, &ExpandOptions::default(), &sink).expect("expand");
        assert_eq!(report.tables_expanded, 1);
        let table = pkg.main().body().tables().next().expect("table");
        assert_eq!(table.row_count(), 5);
        let rows: Vec<String> = table
            .rows()
            .map(|r| r.cells().map(|c| c.text()).collect::<Vec<_>>().join("|"))
            .collect();
        assert_eq!(
            rows,
            vec!["Name|Qty", "Widget|2", "Gadget|5", "Gizmo|1", "Total|{{total}}"]
        );
        assert!(table.rows().all(|r| r.cell_count() == table.column_count()));
        assert_eq!(find_names(&pkg).into_iter().collect::<Vec<_>>(), vec!["total"]);
    }

    #[test]
    fn empty_records_clear_template_row() {
        let bytes = DocxBuilder::new()
            .body(&table(&[&["Name", "Qty"], &["{{items.name}}", "{{qty}}"]]))
            .build();
        let mut pkg = Package::from_bytes(&bytes).expect("open");
        let rows = BTreeMap::from([("items".to_string(), Vec::new())]);
        let n = expand_tables(&mut pkg, &rows, &NullSink).expect("expand");
        assert_eq!(n, 1);
        let table = pkg.main().body().tables().next().expect("table");
        assert_eq!(table.row_count(), 2);
        assert_eq!(table.row(1).map(|r| r.cells().map(|c| c.text()).collect::<String>()), Some(String::new()));
        assert!(find_names(&pkg).is_empty());
    }

    #[test]
    fn every_list_in_a_paragraph_is_expanded() {
        let bytes = DocxBuilder::new()
            .body(&para(&["{{a}} {{b}}"]))
            .build();
        let mut pkg = Package::from_bytes(&bytes).expect("open");
        let data = TemplateData::new()
            .with_list("a", ["x"])
            .with_list("b", ["y"]);
        let report = expand(&mut pkg, &data, &ExpandOptions::default(), &NullSink).expect("expand");
        assert_eq!(report.lists_expanded, 2);
        assert_eq!(body_texts(&pkg), vec!["• x • y"]);
        assert!(find_names(&pkg).is_empty());
    }

    #[test]
    fn only_first_matching_table_is_expanded() {
        let bytes = DocxBuilder::new()
            .body(&table(&[&["{{items.name}}"]]))
            .body(&table(&[&["{{items.name}}"]]))
            .build();
        let mut pkg = Package::from_bytes(&bytes).expect("open");
        let data = TemplateData::new().with_rows(
            "items",
            vec![record(&[("name", "A")]), record(&[("name", "B")])],
        );
        expand(&mut pkg, &data, &ExpandOptions::default(), &NullSink).expect("expand");
        let counts: Vec<usize> = pkg.main().body().tables().map(|t| t.row_count()).collect();
        assert_eq!(counts, vec![2, 1]);
    }

    #[test]
    fn unmatched_records_are_reported() {
        let bytes = DocxBuilder::new().body(&para(&["plain"])).build();
        let mut pkg = Package::from_bytes(&bytes).expect("open");
        let rows = BTreeMap::from([("items".to_string(), vec![record(&[("a", "1")])])]);
        let sink = RecordingSink::new();
        assert_eq!(expand_tables(&mut pkg, &rows, &sink).expect("expand"), 0);
        assert!(sink.contains(Level::Warn, "items"));
        assert!(!pkg.is_modified());
    }
}
