//! Template passes over a loaded [`Package`].
//!
//! [`render`] runs them in the order that keeps array tokens out of the
//! scalar pass: expand arrays, substitute scalars, then swap images.

pub mod batch;
pub mod data;
pub mod expand;
pub mod media;
pub mod placeholder;
pub mod substitute;

use std::collections::BTreeMap;
use std::path::Path;

use serde::Serialize;

use crate::docx::{LoadOptions, Package};
use crate::error::{Result, TemplateError};
use crate::progress::{emit, EventSink, Level};

pub use data::{FieldValue, Record, TemplateData};
pub use expand::{ExpandOptions, ExpansionReport, DEFAULT_BULLET};
pub use media::{ImageSource, MediaLocation, MediaReplacer, MediaSlot, MediaSummary};
pub use placeholder::{scan, PlaceholderReport};
pub use substitute::{validate, SubstituteOptions, Validation};

/// Image key (`body_0`, `header_0_1`, ...) to replacement source.
pub type ImageMap = BTreeMap<String, ImageSource>;

#[derive(Clone, Debug)]
pub struct RenderOptions {
    pub strict: bool,
    pub preserve_format: bool,
    pub bullet: String,
    pub load: LoadOptions,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            strict: false,
            preserve_format: true,
            bullet: DEFAULT_BULLET.to_string(),
            load: LoadOptions::default(),
        }
    }
}

#[derive(Clone, Debug, Default, Serialize)]
pub struct RenderReport {
    pub expansion: ExpansionReport,
    pub validation: Validation,
    pub replacements: usize,
    pub images: BTreeMap<String, bool>,
}

impl RenderReport {
    pub fn images_failed(&self) -> usize {
        self.images.values().filter(|ok| !**ok).count()
    }
}

pub fn render(
    pkg: &mut Package,
    data: &TemplateData,
    images: &ImageMap,
    opts: &RenderOptions,
    sink: &dyn EventSink,
) -> Result<RenderReport> {
    let unused = validate(pkg, data.keys()).unused;
    if !unused.is_empty() {
        emit(
            sink,
            Level::Debug,
            format!("unused values: {}", unused.join(", ")),
        );
    }

    let expand_opts = ExpandOptions {
        bullet: opts.bullet.clone(),
    };
    let scalars = data.scalars();
    // Row-template fields only resolve during expansion, so completeness is
    // judged on the expanded tree. Strict mode expands a copy and commits it
    // only when nothing is left unfilled.
    let (expansion, missing) = if opts.strict {
        let mut trial = pkg.clone();
        let expansion = expand::expand(&mut trial, data, &expand_opts, sink)?;
        let missing = validate(&trial, scalars.keys().map(String::as_str)).missing;
        if !missing.is_empty() {
            emit(
                sink,
                Level::Error,
                format!("missing values for: {}", missing.join(", ")),
            );
            return Err(TemplateError::MissingData(missing));
        }
        *pkg = trial;
        (expansion, missing)
    } else {
        let expansion = expand::expand(pkg, data, &expand_opts, sink)?;
        let missing = validate(pkg, scalars.keys().map(String::as_str)).missing;
        (expansion, missing)
    };
    let validation = Validation { missing, unused };

    let sub_opts = SubstituteOptions {
        strict: false,
        preserve_format: opts.preserve_format,
    };
    let replacements = substitute::substitute(pkg, &scalars, &sub_opts, sink)?;

    let images = if images.is_empty() {
        BTreeMap::new()
    } else {
        MediaReplacer::new(pkg).replace_batch(images, sink)
    };

    Ok(RenderReport {
        expansion,
        validation,
        replacements,
        images,
    })
}

/// Load `template`, render it and write the result to `output`.
pub fn render_file(
    template: &Path,
    output: &Path,
    data: &TemplateData,
    images: &ImageMap,
    opts: &RenderOptions,
    sink: &dyn EventSink,
) -> Result<RenderReport> {
    let mut pkg = Package::open_with(template, &opts.load)?;
    let report = render(&mut pkg, data, images, opts, sink)?;
    pkg.save(output)?;
    emit(sink, Level::Info, format!("wrote {}", output.display()));
    Ok(report)
}
