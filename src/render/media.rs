//! Image replacement through relationship targets.
//!
//! Images are addressed by location (`header`/`footer` of a section, or the
//! body) and their position in that part's relationship table. Replacing an
//! image swaps the media bytes only; the drawing that shows it keeps its
//! extent and anchoring until [`MediaReplacer::resize`] is called.

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::Serialize;

use crate::docx::drawing::{Anchoring, Geometry, EMU_PER_INCH};
use crate::docx::{Package, Part};
use crate::error::{Result, TemplateError};
use crate::progress::{emit, EventSink, Level};

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaLocation {
    Header,
    Footer,
    Body,
}

impl MediaLocation {
    fn as_str(self) -> &'static str {
        match self {
            MediaLocation::Header => "header",
            MediaLocation::Footer => "footer",
            MediaLocation::Body => "body",
        }
    }
}

/// Address of one image: `header_<section>_<n>`, `footer_<section>_<n>` or
/// `body_<n>`. The section is ignored for the body.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct MediaSlot {
    pub location: MediaLocation,
    pub section: usize,
    pub index: usize,
}

impl MediaSlot {
    pub fn body(index: usize) -> Self {
        Self {
            location: MediaLocation::Body,
            section: 0,
            index,
        }
    }

    pub fn header(section: usize, index: usize) -> Self {
        Self {
            location: MediaLocation::Header,
            section,
            index,
        }
    }

    pub fn footer(section: usize, index: usize) -> Self {
        Self {
            location: MediaLocation::Footer,
            section,
            index,
        }
    }
}

impl fmt::Display for MediaSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.location {
            MediaLocation::Body => write!(f, "body_{}", self.index),
            loc => write!(f, "{}_{}_{}", loc.as_str(), self.section, self.index),
        }
    }
}

impl FromStr for MediaSlot {
    type Err = TemplateError;

    fn from_str(key: &str) -> Result<Self> {
        let bad = || TemplateError::InvalidData(format!("bad image key `{key}`"));
        let parts: Vec<&str> = key.split('_').collect();
        let num = |s: &str| s.parse::<usize>().map_err(|_| bad());
        match parts.as_slice() {
            ["body", n] => Ok(Self::body(num(n)?)),
            ["header", s] => Ok(Self::header(num(s)?, 0)),
            ["header", s, n] => Ok(Self::header(num(s)?, num(n)?)),
            ["footer", s] => Ok(Self::footer(num(s)?, 0)),
            ["footer", s, n] => Ok(Self::footer(num(s)?, num(n)?)),
            _ => Err(bad()),
        }
    }
}

/// One image relationship and where its first drawing sits.
#[derive(Clone, Debug, Serialize)]
pub struct MediaReference {
    pub location: MediaLocation,
    pub section: Option<usize>,
    pub index: usize,
    pub part: String,
    pub rel_id: String,
    pub target: String,
    pub width_emu: Option<i64>,
    pub height_emu: Option<i64>,
    pub anchoring: Option<Anchoring>,
}

impl MediaReference {
    pub fn width_inches(&self) -> Option<f64> {
        self.width_emu.map(|v| v as f64 / EMU_PER_INCH as f64)
    }

    pub fn height_inches(&self) -> Option<f64> {
        self.height_emu.map(|v| v as f64 / EMU_PER_INCH as f64)
    }

    fn matches(&self, slot: &MediaSlot) -> bool {
        self.location == slot.location
            && self.index == slot.index
            && (slot.location == MediaLocation::Body || self.section == Some(slot.section))
    }
}

#[derive(Clone, Debug)]
pub enum ImageSource {
    Path(PathBuf),
    Bytes { data: Vec<u8>, content_type: String },
}

impl ImageSource {
    pub fn path(p: impl Into<PathBuf>) -> Self {
        ImageSource::Path(p.into())
    }

    /// Read the image and settle its content type: from the file extension,
    /// falling back to the leading bytes. In-memory data keeps its declared
    /// type when that type is a known image type, and is sniffed when none
    /// is declared.
    pub fn load(&self) -> Result<(Vec<u8>, String)> {
        match self {
            ImageSource::Bytes { data, content_type } => {
                let declared = content_type.trim().to_ascii_lowercase();
                let known = if declared.is_empty() {
                    sniff_content_type(data)
                } else {
                    declared
                        .strip_prefix("image/")
                        .and_then(content_type_for_extension)
                };
                match known {
                    Some(ct) => Ok((data.clone(), ct.to_string())),
                    None => Err(TemplateError::UnsupportedImage(format!(
                        "in-memory image ({content_type})"
                    ))),
                }
            }
            ImageSource::Path(path) => {
                let data = fs::read(path).map_err(|source| TemplateError::ImageUnreadable {
                    path: path.clone(),
                    source,
                })?;
                let content_type = path
                    .extension()
                    .and_then(|e| e.to_str())
                    .and_then(content_type_for_extension)
                    .or_else(|| sniff_content_type(&data))
                    .ok_or_else(|| TemplateError::UnsupportedImage(path.display().to_string()))?;
                Ok((data, content_type.to_string()))
            }
        }
    }

    /// Every file in `dir` whose stem is an image key, e.g. `header_0_0.png`.
    pub fn from_dir(dir: &Path) -> Result<BTreeMap<String, ImageSource>> {
        let mut out = BTreeMap::new();
        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            let known = path
                .extension()
                .and_then(|e| e.to_str())
                .and_then(content_type_for_extension)
                .is_some();
            if !path.is_file() || !known {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            if stem.parse::<MediaSlot>().is_ok() {
                out.insert(stem.to_string(), ImageSource::Path(path.clone()));
            }
        }
        Ok(out)
    }
}

pub fn content_type_for_extension(ext: &str) -> Option<&'static str> {
    match ext.to_ascii_lowercase().as_str() {
        "png" => Some("image/png"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        "gif" => Some("image/gif"),
        "bmp" => Some("image/bmp"),
        "tif" | "tiff" => Some("image/tiff"),
        _ => None,
    }
}

pub fn sniff_content_type(data: &[u8]) -> Option<&'static str> {
    const SIGNATURES: &[(&[u8], &str)] = &[
        (b"\x89PNG\r\n\x1a\n", "image/png"),
        (b"\xFF\xD8\xFF", "image/jpeg"),
        (b"GIF87a", "image/gif"),
        (b"GIF89a", "image/gif"),
        (b"BM", "image/bmp"),
        (b"II*\x00", "image/tiff"),
        (b"MM\x00*", "image/tiff"),
    ];
    SIGNATURES
        .iter()
        .find(|(magic, _)| data.starts_with(magic))
        .map(|(_, ct)| *ct)
}

#[derive(Clone, Debug, Serialize)]
pub struct MediaSummary {
    pub total_headers: usize,
    pub total_footers: usize,
    pub total_body: usize,
    pub total: usize,
    pub details: Vec<MediaReference>,
}

pub struct MediaReplacer<'a> {
    pkg: &'a mut Package,
    refs: Vec<MediaReference>,
}

impl<'a> MediaReplacer<'a> {
    pub fn new(pkg: &'a mut Package) -> Self {
        let refs = collect_references(pkg);
        Self { pkg, refs }
    }

    pub fn references(&self) -> &[MediaReference] {
        &self.refs
    }

    pub fn find(&self, slot: &MediaSlot) -> Option<&MediaReference> {
        self.refs.iter().find(|r| r.matches(slot))
    }

    /// Swap the image at `slot`. Failures are reported to `sink` and yield
    /// `false`.
    pub fn replace(&mut self, slot: &MediaSlot, source: &ImageSource, sink: &dyn EventSink) -> bool {
        match self.try_replace(slot, source) {
            Ok(target) => {
                emit(sink, Level::Info, format!("{slot}: replaced {target}"));
                true
            }
            Err(e) => {
                emit(sink, Level::Error, format!("{slot}: {e}"));
                false
            }
        }
    }

    pub fn try_replace(&mut self, slot: &MediaSlot, source: &ImageSource) -> Result<String> {
        let target = self
            .find(slot)
            .map(|r| r.target.clone())
            .ok_or_else(|| TemplateError::MediaNotFound(slot.to_string()))?;
        let (data, content_type) = source.load()?;
        self.pkg.replace_media(&target, data, &content_type)?;
        Ok(target)
    }

    /// Swap the image a main-part relationship id points at.
    pub fn replace_by_rel_id(
        &mut self,
        rel_id: &str,
        source: &ImageSource,
        sink: &dyn EventSink,
    ) -> bool {
        let target = self
            .refs
            .iter()
            .find(|r| r.location == MediaLocation::Body && r.rel_id == rel_id)
            .map(|r| r.target.clone());
        let result = match target {
            Some(target) => source
                .load()
                .and_then(|(data, ct)| self.pkg.replace_media(&target, data, &ct)),
            None => Err(TemplateError::MediaNotFound(rel_id.to_string())),
        };
        match result {
            Ok(()) => {
                emit(sink, Level::Info, format!("{rel_id}: replaced"));
                true
            }
            Err(e) => {
                emit(sink, Level::Error, format!("{rel_id}: {e}"));
                false
            }
        }
    }

    /// Replace every keyed image; each key succeeds or fails on its own.
    pub fn replace_batch(
        &mut self,
        replacements: &BTreeMap<String, ImageSource>,
        sink: &dyn EventSink,
    ) -> BTreeMap<String, bool> {
        let mut results = BTreeMap::new();
        for (key, source) in replacements {
            let ok = match key.parse::<MediaSlot>() {
                Ok(slot) => self.replace(&slot, source, sink),
                Err(e) => {
                    emit(sink, Level::Warn, e.to_string());
                    false
                }
            };
            results.insert(key.clone(), ok);
        }
        results
    }

    /// Set the displayed size of the image at `slot`, in EMUs.
    pub fn resize(
        &mut self,
        slot: &MediaSlot,
        width_emu: i64,
        height_emu: i64,
        sink: &dyn EventSink,
    ) -> bool {
        let Some(pos) = self.refs.iter().position(|r| r.matches(slot)) else {
            emit(sink, Level::Error, format!("{slot}: no such image"));
            return false;
        };
        let (part_path, rel_id) = (self.refs[pos].part.clone(), self.refs[pos].rel_id.clone());
        // Look before borrowing mutably: part_mut marks the part dirty.
        let mut sized = false;
        if let Some(part) = self.pkg.part(&part_path) {
            part.body().for_each_drawing(&mut |d| {
                sized |= d.references(&rel_id) && d.has_extent();
            });
        }
        if !sized {
            emit(sink, Level::Error, format!("{slot}: image has no sized drawing"));
            return false;
        }
        if let Some(part) = self.pkg.part_mut(&part_path) {
            let mut done = false;
            part.body_mut().for_each_drawing_mut(&mut |d| {
                if !done && d.references(&rel_id) && d.has_extent() {
                    done = d.set_extent(width_emu, height_emu);
                }
            });
        }
        // Keep every reference to the same drawing in step.
        for r in self.refs.iter_mut() {
            if r.part == part_path && r.rel_id == rel_id {
                r.width_emu = Some(width_emu);
                r.height_emu = Some(height_emu);
            }
        }
        emit(
            sink,
            Level::Info,
            format!("{slot}: resized to {width_emu}x{height_emu} EMU"),
        );
        true
    }

    pub fn dimensions(&self, slot: &MediaSlot) -> Option<(i64, i64)> {
        let r = self.find(slot)?;
        Some((r.width_emu?, r.height_emu?))
    }

    pub fn summary(&self) -> MediaSummary {
        media_summary(&self.refs)
    }
}

/// Read-only listing of every image reference in `pkg`.
pub fn summarize(pkg: &Package) -> MediaSummary {
    media_summary(&collect_references(pkg))
}

fn media_summary(refs: &[MediaReference]) -> MediaSummary {
    let count = |loc| refs.iter().filter(|r| r.location == loc).count();
    MediaSummary {
        total_headers: count(MediaLocation::Header),
        total_footers: count(MediaLocation::Footer),
        total_body: count(MediaLocation::Body),
        total: refs.len(),
        details: refs.to_vec(),
    }
}

fn collect_references(pkg: &Package) -> Vec<MediaReference> {
    let mut out = Vec::new();
    for section in pkg.sections() {
        let slots = [
            (MediaLocation::Header, &section.header),
            (MediaLocation::Footer, &section.footer),
        ];
        for (loc, path) in slots {
            if let Some(part) = path.as_deref().and_then(|p| pkg.part(p)) {
                out.extend(part_references(part, loc, Some(section.index)));
            }
        }
    }
    out.extend(part_references(pkg.main(), MediaLocation::Body, None));
    out
}

fn part_references(part: &Part, location: MediaLocation, section: Option<usize>) -> Vec<MediaReference> {
    let mut geometry: BTreeMap<String, Option<Geometry>> = BTreeMap::new();
    part.body().for_each_drawing(&mut |d| {
        for id in d.embed_ids() {
            geometry.entry(id.to_string()).or_insert_with(|| d.geometry());
        }
    });
    part.rels()
        .images()
        .enumerate()
        .map(|(index, rel)| {
            let geo = geometry.get(&rel.id).copied().flatten();
            MediaReference {
                location,
                section,
                index,
                part: part.path().to_string(),
                rel_id: rel.id.clone(),
                target: rel.target_part.clone(),
                width_emu: geo.map(|g| g.width_emu),
                height_emu: geo.map(|g| g.height_emu),
                anchoring: geo.map(|g| g.anchoring),
            }
        })
        .collect()
}
