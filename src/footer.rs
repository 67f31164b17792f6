//! Footer editing per section.

use crate::docx::model::{Paragraph, Run, RunFormat};
use crate::docx::xml::XmlEvent;
use crate::docx::Package;
use crate::error::{Result, TemplateError};
use crate::progress::{emit, EventSink, Level};

pub const DEFAULT_PAGE_FORMAT: &str = "Page {PAGE} of {NUMPAGES}";

/// One run of footer text with its character formatting.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FooterRun {
    pub paragraph: usize,
    pub text: String,
    pub format: RunFormat,
}

fn footer_path(pkg: &Package, section: usize) -> Result<String> {
    pkg.section(section)?
        .footer
        .clone()
        .ok_or(TemplateError::NoFooter(section))
}

pub fn footer_text(pkg: &Package, section: usize) -> Result<String> {
    let path = footer_path(pkg, section)?;
    Ok(pkg
        .part(&path)
        .map(|p| p.body().text())
        .unwrap_or_default())
}

pub fn footer_runs(pkg: &Package, section: usize) -> Result<Vec<FooterRun>> {
    let path = footer_path(pkg, section)?;
    let Some(part) = pkg.part(&path) else {
        return Ok(Vec::new());
    };
    let mut out = Vec::new();
    for (i, p) in part.body().paragraphs().enumerate() {
        for run in p.runs() {
            if run.has_text() {
                out.push(FooterRun {
                    paragraph: i,
                    text: run.text(),
                    format: run.format(),
                });
            }
        }
    }
    Ok(out)
}

/// Replace the footer's text with `text` in its first paragraph. With
/// `preserve_format` the new run takes the formatting of the first run that
/// had text.
pub fn set_footer_text(
    pkg: &mut Package,
    section: usize,
    text: &str,
    preserve_format: bool,
    sink: &dyn EventSink,
) -> Result<()> {
    let path = footer_path(pkg, section)?;
    let part = pkg
        .part_mut(&path)
        .ok_or_else(|| TemplateError::MissingPart(path.clone()))?;
    let body = part.body_mut();

    let format = if preserve_format {
        body.paragraphs()
            .flat_map(|p| p.runs())
            .find(|r| r.has_text())
            .and_then(|r| r.props.clone())
    } else {
        None
    };
    for p in body.paragraphs_mut() {
        p.clear();
    }
    let run = Run::plain(text, format);
    if body.paragraphs().next().is_none() {
        body.push_paragraph(Paragraph::default());
    }
    if let Some(first) = body.paragraphs_mut().next() {
        first.push_run(run);
    }
    emit(sink, Level::Info, format!("section {section}: footer updated"));
    Ok(())
}

/// Set the same footer text in every section that has a footer. Returns the
/// number of sections updated.
pub fn set_footer_text_all(
    pkg: &mut Package,
    text: &str,
    preserve_format: bool,
    sink: &dyn EventSink,
) -> Result<usize> {
    let mut updated = 0;
    let mut seen = Vec::new();
    for section in 0..pkg.sections().len() {
        match footer_path(pkg, section) {
            Ok(path) if seen.contains(&path) => updated += 1,
            Ok(path) => {
                set_footer_text(pkg, section, text, preserve_format, sink)?;
                seen.push(path);
                updated += 1;
            }
            Err(TemplateError::NoFooter(_)) => {
                emit(sink, Level::Warn, format!("section {section}: no footer"));
            }
            Err(e) => return Err(e),
        }
    }
    Ok(updated)
}

/// Empty every paragraph of the footer, keeping paragraph properties.
pub fn clear_footer(pkg: &mut Package, section: usize, sink: &dyn EventSink) -> Result<()> {
    let path = footer_path(pkg, section)?;
    let part = pkg
        .part_mut(&path)
        .ok_or_else(|| TemplateError::MissingPart(path.clone()))?;
    for p in part.body_mut().paragraphs_mut() {
        p.clear();
    }
    emit(sink, Level::Info, format!("section {section}: footer cleared"));
    Ok(())
}

/// Append a paragraph with page numbering. `{PAGE}` and `{NUMPAGES}` in
/// `format` become live fields; the rest is literal text.
pub fn add_page_number(
    pkg: &mut Package,
    section: usize,
    format: &str,
    alignment: &str,
    sink: &dyn EventSink,
) -> Result<()> {
    let path = footer_path(pkg, section)?;
    let part = pkg
        .part_mut(&path)
        .ok_or_else(|| TemplateError::MissingPart(path.clone()))?;

    let mut p = Paragraph::aligned(alignment);
    for piece in split_page_format(format) {
        match piece {
            PagePiece::Field(instr) => p.push_run(field_run(instr)),
            PagePiece::Text(t) => p.push_run(Run::plain(t, None)),
        }
    }
    part.body_mut().push_paragraph(p);
    emit(sink, Level::Info, format!("section {section}: page number added"));
    Ok(())
}

#[derive(Debug, PartialEq, Eq)]
enum PagePiece<'a> {
    Text(&'a str),
    Field(&'static str),
}

fn split_page_format(format: &str) -> Vec<PagePiece<'_>> {
    const FIELDS: [(&str, &str); 2] = [("{PAGE}", "PAGE"), ("{NUMPAGES}", "NUMPAGES")];
    let mut out = Vec::new();
    let mut rest = format;
    while !rest.is_empty() {
        let next = FIELDS
            .iter()
            .filter_map(|(tok, instr)| rest.find(tok).map(|at| (at, *tok, *instr)))
            .min_by_key(|(at, _, _)| *at);
        match next {
            Some((at, tok, instr)) => {
                if at > 0 {
                    out.push(PagePiece::Text(&rest[..at]));
                }
                out.push(PagePiece::Field(instr));
                rest = &rest[at + tok.len()..];
            }
            None => {
                out.push(PagePiece::Text(rest));
                rest = "";
            }
        }
    }
    out
}

fn field_run(instr: &str) -> Run {
    let fld_char = |kind: &str| {
        XmlEvent::empty("w:fldChar", vec![("w:fldCharType".to_string(), kind.to_string())])
    };
    Run::with_children(vec![
        fld_char("begin"),
        XmlEvent::start(
            "w:instrText",
            vec![("xml:space".to_string(), "preserve".to_string())],
        ),
        XmlEvent::text(&format!(" {instr} ")),
        XmlEvent::end("w:instrText"),
        fld_char("end"),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::NullSink;
    use crate::testutil::{para, DocxBuilder};

    const BOLD_FOOTER: &str = r#"<w:p><w:r><w:rPr><w:b/><w:sz w:val="18"/></w:rPr><w:t>Old footer</w:t></w:r></w:p><w:p><w:r><w:t>second line</w:t></w:r></w:p>"#;

    fn doc() -> Package {
        let bytes = DocxBuilder::new()
            .sections(2)
            .body(&para(&["Body"]))
            .footer(0, BOLD_FOOTER)
            .build();
        Package::from_bytes(&bytes).expect("open")
    }

    #[test]
    fn reads_footer_text_and_runs() {
        let pkg = doc();
        assert_eq!(footer_text(&pkg, 0).expect("text"), "Old footer\nsecond line");
        let runs = footer_runs(&pkg, 0).expect("runs");
        assert_eq!(runs.len(), 2);
        assert!(runs[0].format.bold);
        assert_eq!(runs[0].format.size, Some(18));
        assert_eq!(runs[1].paragraph, 1);
    }

    #[test]
    fn missing_footer_and_section_errors() {
        let mut pkg = doc();
        assert!(matches!(footer_text(&pkg, 1), Err(TemplateError::NoFooter(1))));
        assert!(matches!(
            clear_footer(&mut pkg, 7, &NullSink),
            Err(TemplateError::SectionOutOfRange { index: 7, count: 2 })
        ));
    }

    #[test]
    fn set_text_keeps_first_run_format() {
        let mut pkg = doc();
        set_footer_text(&mut pkg, 0, "Confidential", true, &NullSink).expect("set");
        let saved = Package::from_bytes(&pkg.to_bytes().expect("save")).expect("reopen");
        assert_eq!(footer_text(&saved, 0).expect("text"), "Confidential\n");
        let runs = footer_runs(&saved, 0).expect("runs");
        assert_eq!(runs.len(), 1);
        assert!(runs[0].format.bold);

        set_footer_text(&mut pkg, 0, "Plain", false, &NullSink).expect("set");
        assert!(!footer_runs(&pkg, 0).expect("runs")[0].format.bold);
    }

    #[test]
    fn set_text_on_empty_footer_adds_a_paragraph() {
        let bytes = DocxBuilder::new()
            .body(&para(&["Body"]))
            .footer(0, "")
            .build();
        let mut pkg = Package::from_bytes(&bytes).expect("open");
        set_footer_text(&mut pkg, 0, "Page footer", true, &NullSink).expect("set");
        let saved = Package::from_bytes(&pkg.to_bytes().expect("save")).expect("reopen");
        assert_eq!(footer_text(&saved, 0).expect("text"), "Page footer");
    }

    #[test]
    fn apply_to_every_section_with_a_footer() {
        let mut pkg = doc();
        assert_eq!(set_footer_text_all(&mut pkg, "x", true, &NullSink).expect("all"), 1);
    }

    #[test]
    fn page_number_fields() {
        assert_eq!(
            split_page_format("Page {PAGE} of {NUMPAGES}"),
            vec![
                PagePiece::Text("Page "),
                PagePiece::Field("PAGE"),
                PagePiece::Text(" of "),
                PagePiece::Field("NUMPAGES"),
            ]
        );
        let mut pkg = doc();
        clear_footer(&mut pkg, 0, &NullSink).expect("clear");
        add_page_number(&mut pkg, 0, DEFAULT_PAGE_FORMAT, "center", &NullSink).expect("add");
        let saved = Package::from_bytes(&pkg.to_bytes().expect("save")).expect("reopen");
        let path = saved.sections()[0].footer.clone().expect("footer");
        let xml = String::from_utf8(saved.part(&path).expect("part").to_xml().expect("xml"))
            .expect("utf8");
        assert!(xml.contains(r#"<w:jc w:val="center"/>"#));
        assert_eq!(xml.matches(r#"w:fldCharType="begin""#).count(), 2);
        assert!(xml.contains(" NUMPAGES "));
        assert_eq!(footer_text(&saved, 0).expect("text"), "\n\nPage  of ");
    }
}
