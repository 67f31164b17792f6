//! Package-level plumbing: relationship tables, part names and content types.

use std::collections::BTreeMap;

use anyhow::{anyhow, Context};

use crate::docx::xml::{escape_attr, find_attr, parse_xml_events, set_event_attr, write_xml_events, XmlEvent};

pub const CONTENT_TYPES_PART: &str = "[Content_Types].xml";
pub const ROOT_RELS_PART: &str = "_rels/.rels";
pub const DEFAULT_MAIN_PART: &str = "word/document.xml";

pub mod reltype {
    pub const OFFICE_DOCUMENT: &str =
        "http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument";
    pub const HEADER: &str =
        "http://schemas.openxmlformats.org/officeDocument/2006/relationships/header";
    pub const FOOTER: &str =
        "http://schemas.openxmlformats.org/officeDocument/2006/relationships/footer";
    pub const IMAGE: &str =
        "http://schemas.openxmlformats.org/officeDocument/2006/relationships/image";
}

/// A local id bound to a target, scoped to the part that owns the table.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Relationship {
    pub id: String,
    pub rel_type: String,
    /// Target as written in the table.
    pub target_ref: String,
    /// Target resolved to a zip entry name (empty for external targets).
    pub target_part: String,
    pub external: bool,
}

impl Relationship {
    pub fn is_image(&self) -> bool {
        self.rel_type.ends_with("/image")
    }
}

/// Relationship table of one part, in table order.
#[derive(Clone, Debug, Default)]
pub struct Relationships {
    rels: Vec<Relationship>,
}

impl Relationships {
    pub fn parse(source_part: &str, xml_bytes: &[u8]) -> anyhow::Result<Self> {
        let events = parse_xml_events(xml_bytes).context("parse relationships")?;
        let base = part_dir(source_part);
        let mut rels = Vec::new();
        for ev in &events {
            if let XmlEvent::Empty { name, attrs } | XmlEvent::Start { name, attrs } = ev {
                if name != "Relationship" {
                    continue;
                }
                let id = find_attr(attrs, "Id").unwrap_or("").trim().to_string();
                let target_ref = find_attr(attrs, "Target").unwrap_or("").trim().to_string();
                if id.is_empty() || target_ref.is_empty() {
                    continue;
                }
                let external = find_attr(attrs, "TargetMode") == Some("External");
                let target_part = if external {
                    String::new()
                } else {
                    resolve_part_name(base, &unescape_attr(&target_ref))
                };
                rels.push(Relationship {
                    id,
                    rel_type: find_attr(attrs, "Type").unwrap_or("").to_string(),
                    target_ref,
                    target_part,
                    external,
                });
            }
        }
        Ok(Self { rels })
    }

    pub fn get(&self, id: &str) -> Option<&Relationship> {
        self.rels.iter().find(|r| r.id == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Relationship> {
        self.rels.iter()
    }

    pub fn images(&self) -> impl Iterator<Item = &Relationship> {
        self.rels.iter().filter(|r| r.is_image() && !r.external)
    }

    pub fn first_of_type(&self, rel_type: &str) -> Option<&Relationship> {
        self.rels.iter().find(|r| r.rel_type == rel_type)
    }

    pub fn len(&self) -> usize {
        self.rels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rels.is_empty()
    }
}

/// `word/document.xml` -> `word/_rels/document.xml.rels`
pub fn rels_part_for(part: &str) -> String {
    match part.rfind('/') {
        Some(pos) => format!("{}/_rels/{}.rels", &part[..pos], &part[pos + 1..]),
        None => format!("_rels/{part}.rels"),
    }
}

fn part_dir(part: &str) -> &str {
    match part.rfind('/') {
        Some(pos) => &part[..pos + 1],
        None => "",
    }
}

/// Resolve a relationship target against the directory of its source part,
/// collapsing `.` and `..` segments.
pub fn resolve_part_name(base_dir: &str, target: &str) -> String {
    let target = target.replace('\\', "/");
    let joined = if let Some(abs) = target.strip_prefix('/') {
        abs.to_string()
    } else {
        format!("{base_dir}{target}")
    };
    let mut segs: Vec<&str> = Vec::new();
    for seg in joined.split('/') {
        match seg {
            "" | "." => {}
            ".." => {
                segs.pop();
            }
            s => segs.push(s),
        }
    }
    segs.join("/")
}

fn unescape_attr(raw: &str) -> String {
    raw.replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&")
}

/// `[Content_Types].xml`, kept as events so it can be rewritten losslessly.
#[derive(Clone, Debug)]
pub struct ContentTypes {
    events: Vec<XmlEvent>,
    defaults: BTreeMap<String, String>,
    overrides: BTreeMap<String, String>,
}

impl ContentTypes {
    pub fn parse(xml_bytes: &[u8]) -> anyhow::Result<Self> {
        let events = parse_xml_events(xml_bytes).context("parse content types")?;
        let mut defaults = BTreeMap::new();
        let mut overrides = BTreeMap::new();
        for ev in &events {
            let (name, attrs) = match ev {
                XmlEvent::Empty { name, attrs } | XmlEvent::Start { name, attrs } => (name, attrs),
                _ => continue,
            };
            let ct = find_attr(attrs, "ContentType").unwrap_or("").to_string();
            if name == "Default" {
                if let Some(ext) = find_attr(attrs, "Extension") {
                    defaults.insert(ext.to_ascii_lowercase(), ct);
                }
            } else if name == "Override" {
                if let Some(p) = find_attr(attrs, "PartName") {
                    overrides.insert(p.trim_start_matches('/').to_string(), ct);
                }
            }
        }
        Ok(Self {
            events,
            defaults,
            overrides,
        })
    }

    pub fn content_type(&self, part: &str) -> Option<&str> {
        if let Some(ct) = self.overrides.get(part) {
            return Some(ct.as_str());
        }
        let ext = part.rsplit_once('.').map(|(_, e)| e.to_ascii_lowercase())?;
        self.defaults.get(&ext).map(|s| s.as_str())
    }

    /// Make `part` resolve to `content_type`. Returns whether anything changed.
    pub fn set_content_type(&mut self, part: &str, content_type: &str) -> anyhow::Result<bool> {
        if self.content_type(part) == Some(content_type) {
            return Ok(false);
        }
        let part_name = format!("/{part}");
        let existing = self.events.iter().position(|ev| {
            ev.is_open("Override") && ev.attr("PartName") == Some(part_name.as_str())
        });
        if let Some(idx) = existing {
            set_event_attr(&mut self.events[idx], "ContentType", &escape_attr(content_type));
        } else {
            let close = self
                .events
                .iter()
                .rposition(|ev| matches!(ev, XmlEvent::End { name } if name == "Types"))
                .ok_or_else(|| anyhow!("content types part has no closing Types element"))?;
            self.events.insert(
                close,
                XmlEvent::empty(
                    "Override",
                    vec![
                        ("PartName".to_string(), escape_attr(&part_name)),
                        ("ContentType".to_string(), escape_attr(content_type)),
                    ],
                ),
            );
        }
        self.overrides
            .insert(part.to_string(), content_type.to_string());
        Ok(true)
    }

    pub fn to_xml(&self) -> anyhow::Result<Vec<u8>> {
        write_xml_events(&self.events)
    }
}
