use crate::docx::xml::{find_attr, XmlEvent};

/// Default header/footer relationship ids declared by one `w:sectPr`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SectionRefs {
    pub header_rid: Option<String>,
    pub footer_rid: Option<String>,
}

/// Walk the main part and collect one entry per section, in document order.
/// Section properties live either directly in `w:body` (the last section) or
/// in the `w:pPr` of a body paragraph (every earlier one). Only `default`
/// references count; a section without its own reference gets `None`.
pub fn extract_sections(events: &[XmlEvent]) -> Vec<SectionRefs> {
    let mut sections: Vec<SectionRefs> = Vec::new();
    let mut stack: Vec<&str> = Vec::new();
    let mut current: Option<SectionRefs> = None;

    for ev in events {
        match ev {
            XmlEvent::Start { name, attrs } | XmlEvent::Empty { name, attrs } => {
                let is_empty = matches!(ev, XmlEvent::Empty { .. });
                if name == "w:sectPr" && section_allowed(&stack) {
                    if is_empty {
                        sections.push(SectionRefs::default());
                    } else {
                        current = Some(SectionRefs::default());
                        stack.push(name);
                    }
                    continue;
                }
                if let Some(sect) = current.as_mut() {
                    record_reference(sect, name, attrs);
                }
                if !is_empty {
                    stack.push(name);
                }
            }
            XmlEvent::End { name } => {
                if name == "w:sectPr" {
                    if let Some(sect) = current.take() {
                        sections.push(sect);
                    }
                }
                let _ = stack.pop();
            }
            _ => {}
        }
    }
    sections
}

fn section_allowed(stack: &[&str]) -> bool {
    match stack {
        [.., "w:body"] => true,
        [.., "w:body", "w:p", "w:pPr"] => true,
        _ => false,
    }
}

fn record_reference(sect: &mut SectionRefs, name: &str, attrs: &[(String, String)]) {
    let slot = match name {
        "w:headerReference" => &mut sect.header_rid,
        "w:footerReference" => &mut sect.footer_rid,
        _ => return,
    };
    if find_attr(attrs, "w:type").unwrap_or("default") != "default" {
        return;
    }
    if let Some(rid) = find_attr(attrs, "r:id").map(str::trim) {
        if !rid.is_empty() {
            *slot = Some(rid.to_string());
        }
    }
}
