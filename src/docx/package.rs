//! An opened template package: the zip archive plus typed, editable views of
//! the parts the template passes touch.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fs;
use std::io;
use std::path::Path;

use serde::Serialize;

use crate::docx::archive::DocxArchive;
use crate::docx::model::{Container, PartTree};
use crate::docx::opc::{
    rels_part_for, reltype, ContentTypes, Relationships, CONTENT_TYPES_PART, DEFAULT_MAIN_PART,
    ROOT_RELS_PART,
};
use crate::docx::sections::{extract_sections, SectionRefs};
use crate::docx::xml::{parse_xml_events, structure_fingerprint, write_xml_events};
use crate::error::{Result, TemplateError};

pub const DEFAULT_MAX_FILE_SIZE: u64 = 20 * 1024 * 1024;

#[derive(Clone, Debug)]
pub struct LoadOptions {
    /// Reject inputs larger than this many bytes; `None` disables the check.
    pub max_file_size: Option<u64>,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            max_file_size: Some(DEFAULT_MAX_FILE_SIZE),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PartKind {
    Main,
    Header,
    Footer,
}

impl PartKind {
    fn story_tag(self) -> &'static str {
        match self {
            PartKind::Main => "w:body",
            PartKind::Header => "w:hdr",
            PartKind::Footer => "w:ftr",
        }
    }
}

/// A story part (main document, header or footer) with its relationships.
#[derive(Clone, Debug)]
pub struct Part {
    path: String,
    kind: PartKind,
    pub tree: PartTree,
    rels: Relationships,
}

impl Part {
    fn load(archive: &DocxArchive, path: &str, kind: PartKind) -> Result<(Self, Vec<SectionRefs>)> {
        let bytes = archive
            .data(path)
            .ok_or_else(|| TemplateError::MissingPart(path.to_string()))?;
        let events = parse_xml_events(bytes).map_err(|e| TemplateError::xml(path, e))?;
        let sections = if kind == PartKind::Main {
            extract_sections(&events)
        } else {
            Vec::new()
        };
        let tree =
            PartTree::parse(events, kind.story_tag()).map_err(|e| TemplateError::xml(path, e))?;
        let rels_path = rels_part_for(path);
        let rels = match archive.data(&rels_path) {
            Some(b) => Relationships::parse(path, b).map_err(|e| TemplateError::xml(&rels_path, e))?,
            None => Relationships::default(),
        };
        Ok((
            Self {
                path: path.to_string(),
                kind,
                tree,
                rels,
            },
            sections,
        ))
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn kind(&self) -> PartKind {
        self.kind
    }

    pub fn rels(&self) -> &Relationships {
        &self.rels
    }

    pub fn body(&self) -> &Container {
        &self.tree.body
    }

    pub fn body_mut(&mut self) -> &mut Container {
        &mut self.tree.body
    }

    pub fn to_xml(&self) -> Result<Vec<u8>> {
        write_xml_events(&self.tree.to_events()).map_err(|e| TemplateError::xml(&self.path, e))
    }

    /// Digest of everything in the part except run text.
    pub fn fingerprint(&self) -> String {
        structure_fingerprint(&self.tree.to_events())
    }
}

/// One document section and the default header/footer parts it references.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Section {
    pub index: usize,
    pub header: Option<String>,
    pub footer: Option<String>,
}

#[derive(Clone, Debug)]
pub struct MediaBlob {
    pub data: Vec<u8>,
    pub content_type: String,
}

#[derive(Clone, Debug, Default, Serialize)]
pub struct Statistics {
    pub paragraphs: usize,
    pub tables: usize,
    pub sections: usize,
    pub headers: usize,
    pub footers: usize,
    pub images: usize,
    pub file_size_bytes: u64,
}

#[derive(Clone, Debug, Default, Serialize)]
pub struct IntegrityReport {
    pub has_root_rels: bool,
    /// `part#rId` for drawings embedding an id the part's table lacks.
    pub dangling_embeds: Vec<String>,
    /// Image relationship targets missing from the archive.
    pub missing_media: Vec<String>,
}

impl IntegrityReport {
    pub fn is_consistent(&self) -> bool {
        self.dangling_embeds.is_empty() && self.missing_media.is_empty()
    }
}

#[derive(Clone)]
pub struct Package {
    source_size: u64,
    archive: DocxArchive,
    content_types: ContentTypes,
    main_path: String,
    parts: BTreeMap<String, Part>,
    sections: Vec<Section>,
    media: BTreeMap<String, MediaBlob>,
    dirty: BTreeSet<String>,
}

impl Package {
    pub fn open(path: &Path) -> Result<Self> {
        Self::open_with(path, &LoadOptions::default())
    }

    pub fn open_with(path: &Path, opts: &LoadOptions) -> Result<Self> {
        let size = fs::metadata(path)?.len();
        check_size(size, opts)?;
        let bytes = fs::read(path)?;
        Self::load(&bytes, size)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Self::from_bytes_with(bytes, &LoadOptions::default())
    }

    pub fn from_bytes_with(bytes: &[u8], opts: &LoadOptions) -> Result<Self> {
        let size = bytes.len() as u64;
        check_size(size, opts)?;
        Self::load(bytes, size)
    }

    fn load(bytes: &[u8], source_size: u64) -> Result<Self> {
        let archive = DocxArchive::from_bytes(bytes).map_err(|_| TemplateError::NotAPackage)?;

        let ct_bytes = archive
            .data(CONTENT_TYPES_PART)
            .ok_or_else(|| TemplateError::MissingPart(CONTENT_TYPES_PART.to_string()))?;
        let content_types =
            ContentTypes::parse(ct_bytes).map_err(|e| TemplateError::xml(CONTENT_TYPES_PART, e))?;

        let main_path = match archive.data(ROOT_RELS_PART) {
            Some(b) => Relationships::parse("", b)
                .map_err(|e| TemplateError::xml(ROOT_RELS_PART, e))?
                .first_of_type(reltype::OFFICE_DOCUMENT)
                .map(|r| r.target_part.clone())
                .unwrap_or_else(|| DEFAULT_MAIN_PART.to_string()),
            None => DEFAULT_MAIN_PART.to_string(),
        };

        let (main, refs) = Part::load(&archive, &main_path, PartKind::Main)?;
        let mut parts = BTreeMap::new();
        let mut sections = Vec::with_capacity(refs.len());
        for (index, r) in refs.iter().enumerate() {
            let mut resolve = |rid: &Option<String>, kind: PartKind| -> Result<Option<String>> {
                let Some(rel) = rid.as_deref().and_then(|id| main.rels.get(id)) else {
                    return Ok(None);
                };
                let target = rel.target_part.clone();
                if rel.external || !archive.contains(&target) {
                    return Ok(None);
                }
                if !parts.contains_key(&target) {
                    let (part, _) = Part::load(&archive, &target, kind)?;
                    parts.insert(target.clone(), part);
                }
                Ok(Some(target))
            };
            let header = resolve(&r.header_rid, PartKind::Header)?;
            let footer = resolve(&r.footer_rid, PartKind::Footer)?;
            sections.push(Section {
                index,
                header,
                footer,
            });
        }
        parts.insert(main_path.clone(), main);

        let mut media = BTreeMap::new();
        for part in parts.values() {
            for rel in part.rels.images() {
                if media.contains_key(&rel.target_part) {
                    continue;
                }
                if let Some(data) = archive.data(&rel.target_part) {
                    let content_type = content_types
                        .content_type(&rel.target_part)
                        .unwrap_or("application/octet-stream")
                        .to_string();
                    media.insert(
                        rel.target_part.clone(),
                        MediaBlob {
                            data: data.to_vec(),
                            content_type,
                        },
                    );
                }
            }
        }

        Ok(Self {
            source_size,
            archive,
            content_types,
            main_path,
            parts,
            sections,
            media,
            dirty: BTreeSet::new(),
        })
    }

    /// Serialize to `path`. Entries nobody touched are written back unchanged.
    pub fn save(&self, path: &Path) -> Result<()> {
        let replacements = self.replacements()?;
        self.archive
            .write_file(path, &replacements)
            .map_err(archive_error)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let replacements = self.replacements()?;
        self.archive.to_bytes(&replacements).map_err(archive_error)
    }

    fn replacements(&self) -> Result<HashMap<String, Vec<u8>>> {
        let mut out = HashMap::new();
        for name in &self.dirty {
            let data = if let Some(part) = self.parts.get(name) {
                part.to_xml()?
            } else if let Some(blob) = self.media.get(name) {
                blob.data.clone()
            } else if name == CONTENT_TYPES_PART {
                self.content_types
                    .to_xml()
                    .map_err(|e| TemplateError::xml(CONTENT_TYPES_PART, e))?
            } else {
                continue;
            };
            out.insert(name.clone(), data);
        }
        Ok(out)
    }

    pub fn is_modified(&self) -> bool {
        !self.dirty.is_empty()
    }

    pub fn main_path(&self) -> &str {
        &self.main_path
    }

    pub fn main(&self) -> &Part {
        &self.parts[&self.main_path]
    }

    pub fn part(&self, path: &str) -> Option<&Part> {
        self.parts.get(path)
    }

    /// Mutable access to a story part; the part is written back on save.
    pub fn part_mut(&mut self, path: &str) -> Option<&mut Part> {
        let part = self.parts.get_mut(path)?;
        self.dirty.insert(path.to_string());
        Some(part)
    }

    pub fn sections(&self) -> &[Section] {
        &self.sections
    }

    pub fn section(&self, index: usize) -> Result<&Section> {
        self.sections
            .get(index)
            .ok_or(TemplateError::SectionOutOfRange {
                index,
                count: self.sections.len(),
            })
    }

    /// Main part first, then each section's header and footer, each part once.
    pub fn story_paths(&self) -> Vec<String> {
        let mut out = vec![self.main_path.clone()];
        for s in &self.sections {
            for p in [&s.header, &s.footer].into_iter().flatten() {
                if !out.contains(p) {
                    out.push(p.clone());
                }
            }
        }
        out
    }

    pub fn story_parts(&self) -> Vec<&Part> {
        self.story_paths()
            .iter()
            .filter_map(|p| self.parts.get(p))
            .collect()
    }

    /// Run `f` over every story part in order. Parts for which `f` returns
    /// `true` are marked for writing.
    pub fn update_parts(&mut self, mut f: impl FnMut(&mut Part) -> Result<bool>) -> Result<()> {
        for path in self.story_paths() {
            let Some(part) = self.parts.get_mut(&path) else {
                continue;
            };
            if f(part)? {
                self.dirty.insert(path);
            }
        }
        Ok(())
    }

    pub fn media(&self, path: &str) -> Option<&MediaBlob> {
        self.media.get(path)
    }

    /// Swap the bytes behind an existing media part and keep its content
    /// type registration in step.
    pub fn replace_media(&mut self, path: &str, data: Vec<u8>, content_type: &str) -> Result<()> {
        let blob = self
            .media
            .get_mut(path)
            .ok_or_else(|| TemplateError::MediaNotFound(path.to_string()))?;
        blob.data = data;
        blob.content_type = content_type.to_string();
        self.dirty.insert(path.to_string());
        let changed = self
            .content_types
            .set_content_type(path, content_type)
            .map_err(|e| TemplateError::xml(CONTENT_TYPES_PART, e))?;
        if changed {
            self.dirty.insert(CONTENT_TYPES_PART.to_string());
        }
        Ok(())
    }

    pub fn statistics(&self) -> Statistics {
        let body = self.main().body();
        let mut images = BTreeSet::new();
        for part in self.story_parts() {
            for rel in part.rels.images() {
                images.insert(rel.target_part.as_str());
            }
        }
        let count_kind = |kind: PartKind| self.parts.values().filter(|p| p.kind == kind).count();
        Statistics {
            paragraphs: body.paragraphs().count(),
            tables: body.tables().count(),
            sections: self.sections.len(),
            headers: count_kind(PartKind::Header),
            footers: count_kind(PartKind::Footer),
            images: images.len(),
            file_size_bytes: self.source_size,
        }
    }

    /// Plain text of the body's top-level paragraphs, optionally followed by
    /// the text of every header and footer.
    pub fn extract_text(&self, include_headers_footers: bool) -> String {
        let mut lines: Vec<String> = self.main().body().paragraphs().map(|p| p.text()).collect();
        if include_headers_footers {
            for part in self.story_parts().into_iter().skip(1) {
                lines.extend(part.body().paragraphs().map(|p| p.text()));
            }
        }
        lines.join("\n")
    }

    pub fn integrity(&self) -> IntegrityReport {
        let mut report = IntegrityReport {
            has_root_rels: self.archive.contains(ROOT_RELS_PART),
            ..Default::default()
        };
        for part in self.story_parts() {
            part.body().for_each_drawing(&mut |d| {
                for id in d.embed_ids() {
                    let ok = part.rels.get(id).map(|r| r.is_image()).unwrap_or(false);
                    if !ok {
                        report.dangling_embeds.push(format!("{}#{id}", part.path));
                    }
                }
            });
            for rel in part.rels.images() {
                if !self.media.contains_key(&rel.target_part)
                    && !report.missing_media.contains(&rel.target_part)
                {
                    report.missing_media.push(rel.target_part.clone());
                }
            }
        }
        report
    }
}

fn check_size(size: u64, opts: &LoadOptions) -> Result<()> {
    match opts.max_file_size {
        Some(limit) if size > limit => Err(TemplateError::FileTooLarge { size, limit }),
        _ => Ok(()),
    }
}

fn archive_error(err: anyhow::Error) -> TemplateError {
    let err = match err.downcast::<io::Error>() {
        Ok(e) => return TemplateError::Io(e),
        Err(err) => err,
    };
    match err.downcast::<zip::result::ZipError>() {
        Ok(e) => TemplateError::Zip(e),
        Err(err) => TemplateError::Io(io::Error::other(format!("{err:#}"))),
    }
}
