//! In-memory `.docx` fixtures for unit tests.

use std::io::{Cursor, Write};

use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

pub const W_NS: &str = r#"xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships" xmlns:wp="http://schemas.openxmlformats.org/drawingml/2006/wordprocessingDrawing" xmlns:w14="http://schemas.microsoft.com/office/word/2010/wordml""#;

const IMAGE_REL: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships/image";

/// 1x1 PNG.
pub const PNG_PIXEL: &[u8] = &[
    0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0x00, 0x00, 0x00, 0x0D, 0x49, 0x48, 0x44, 0x52,
    0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x01, 0x08, 0x06, 0x00, 0x00, 0x00, 0x1F, 0x15, 0xC4,
    0x89, 0x00, 0x00, 0x00, 0x0A, 0x49, 0x44, 0x41, 0x54, 0x78, 0x9C, 0x63, 0x00, 0x01, 0x00, 0x00,
    0x05, 0x00, 0x01, 0x0D, 0x0A, 0x2D, 0xB4, 0x00, 0x00, 0x00, 0x00, 0x49, 0x45, 0x4E, 0x44, 0xAE,
    0x42, 0x60, 0x82,
];

/// Minimal JPEG header bytes; enough for type sniffing.
pub const JPEG_STUB: &[u8] = &[0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10, b'J', b'F', b'I', b'F', 0x00];

#[derive(Clone, Copy, PartialEq, Eq)]
enum Owner {
    Body,
    Header(usize),
    Footer(usize),
}

struct ImageSpec {
    owner: Owner,
    rel_id: String,
    media_name: String,
    data: Vec<u8>,
}

/// Builds a small but well-formed package. Every section gets a default
/// header/footer reference only when content was given for it.
pub struct DocxBuilder {
    body: String,
    sections: usize,
    headers: Vec<(usize, String)>,
    footers: Vec<(usize, String)>,
    images: Vec<ImageSpec>,
    with_document: bool,
}

impl Default for DocxBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl DocxBuilder {
    pub fn new() -> Self {
        Self {
            body: String::new(),
            sections: 1,
            headers: Vec::new(),
            footers: Vec::new(),
            images: Vec::new(),
            with_document: true,
        }
    }

    pub fn body(mut self, xml: &str) -> Self {
        self.body.push_str(xml);
        self
    }

    pub fn sections(mut self, n: usize) -> Self {
        self.sections = n.max(1);
        self
    }

    pub fn header(mut self, section: usize, xml: &str) -> Self {
        self.sections = self.sections.max(section + 1);
        self.headers.push((section, xml.to_string()));
        self
    }

    pub fn footer(mut self, section: usize, xml: &str) -> Self {
        self.sections = self.sections.max(section + 1);
        self.footers.push((section, xml.to_string()));
        self
    }

    pub fn body_image(self, rel_id: &str, media_name: &str, data: &[u8]) -> Self {
        self.image(Owner::Body, rel_id, media_name, data)
    }

    pub fn header_image(self, section: usize, rel_id: &str, media_name: &str, data: &[u8]) -> Self {
        self.image(Owner::Header(section), rel_id, media_name, data)
    }

    fn image(mut self, owner: Owner, rel_id: &str, media_name: &str, data: &[u8]) -> Self {
        self.images.push(ImageSpec {
            owner,
            rel_id: rel_id.to_string(),
            media_name: media_name.to_string(),
            data: data.to_vec(),
        });
        self
    }

    pub fn without_document(mut self) -> Self {
        self.with_document = false;
        self
    }

    fn header_part(section: usize) -> String {
        format!("header{}.xml", section + 1)
    }

    fn footer_part(section: usize) -> String {
        format!("footer{}.xml", section + 1)
    }

    fn rels_xml(&self, owner: Owner, extra: &[(String, String, String)]) -> String {
        let mut s = String::from(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">"#,
        );
        for (id, ty, target) in extra {
            s.push_str(&format!(r#"<Relationship Id="{id}" Type="{ty}" Target="{target}"/>"#));
        }
        for img in self.images.iter().filter(|i| i.owner == owner) {
            s.push_str(&format!(
                r#"<Relationship Id="{}" Type="{IMAGE_REL}" Target="media/{}"/>"#,
                img.rel_id, img.media_name
            ));
        }
        s.push_str("</Relationships>");
        s
    }

    fn sect_pr(&self, section: usize) -> String {
        let mut refs = String::new();
        if self.headers.iter().any(|(s, _)| *s == section) {
            refs.push_str(&format!(
                r#"<w:headerReference w:type="default" r:id="rIdH{section}"/>"#
            ));
        }
        if self.footers.iter().any(|(s, _)| *s == section) {
            refs.push_str(&format!(
                r#"<w:footerReference w:type="default" r:id="rIdF{section}"/>"#
            ));
        }
        format!(r#"<w:sectPr>{refs}<w:pgSz w:w="11906" w:h="16838"/></w:sectPr>"#)
    }

    pub fn build(self) -> Vec<u8> {
        let mut zw = ZipWriter::new(Cursor::new(Vec::new()));
        let opts = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
        let put = |zw: &mut ZipWriter<Cursor<Vec<u8>>>, name: &str, data: &[u8]| {
            zw.start_file(name, opts).expect("start entry");
            zw.write_all(data).expect("write entry");
        };

        let mut overrides = String::new();
        for (s, _) in &self.headers {
            overrides.push_str(&format!(
                r#"<Override PartName="/word/{}" ContentType="application/vnd.openxmlformats-officedocument.wordprocessingml.header+xml"/>"#,
                Self::header_part(*s)
            ));
        }
        for (s, _) in &self.footers {
            overrides.push_str(&format!(
                r#"<Override PartName="/word/{}" ContentType="application/vnd.openxmlformats-officedocument.wordprocessingml.footer+xml"/>"#,
                Self::footer_part(*s)
            ));
        }
        let content_types = format!(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/><Default Extension="xml" ContentType="application/xml"/><Default Extension="png" ContentType="image/png"/><Default Extension="jpeg" ContentType="image/jpeg"/><Override PartName="/word/document.xml" ContentType="application/vnd.openxmlformats-officedocument.wordprocessingml.document.main+xml"/>{overrides}</Types>"#
        );
        put(&mut zw, "[Content_Types].xml", content_types.as_bytes());
        put(
            &mut zw,
            "_rels/.rels",
            &br#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="word/document.xml"/></Relationships>"#[..],
        );

        if self.with_document {
            let mut body = self.body.clone();
            for s in 0..self.sections - 1 {
                body.push_str(&format!("<w:p><w:pPr>{}</w:pPr></w:p>", self.sect_pr(s)));
            }
            body.push_str(&self.sect_pr(self.sections - 1));
            let doc = format!(
                r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><w:document {W_NS}><w:body>{body}</w:body></w:document>"#
            );
            put(&mut zw, "word/document.xml", doc.as_bytes());
        }

        let mut doc_rels = Vec::new();
        for (s, xml) in &self.headers {
            doc_rels.push((
                format!("rIdH{s}"),
                "http://schemas.openxmlformats.org/officeDocument/2006/relationships/header"
                    .to_string(),
                Self::header_part(*s),
            ));
            let part = format!(
                r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><w:hdr {W_NS}>{xml}</w:hdr>"#
            );
            put(&mut zw, &format!("word/{}", Self::header_part(*s)), part.as_bytes());
            if self.images.iter().any(|i| i.owner == Owner::Header(*s)) {
                let rels = self.rels_xml(Owner::Header(*s), &[]);
                put(
                    &mut zw,
                    &format!("word/_rels/{}.rels", Self::header_part(*s)),
                    rels.as_bytes(),
                );
            }
        }
        for (s, xml) in &self.footers {
            doc_rels.push((
                format!("rIdF{s}"),
                "http://schemas.openxmlformats.org/officeDocument/2006/relationships/footer"
                    .to_string(),
                Self::footer_part(*s),
            ));
            let part = format!(
                r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><w:ftr {W_NS}>{xml}</w:ftr>"#
            );
            put(&mut zw, &format!("word/{}", Self::footer_part(*s)), part.as_bytes());
            if self.images.iter().any(|i| i.owner == Owner::Footer(*s)) {
                let rels = self.rels_xml(Owner::Footer(*s), &[]);
                put(
                    &mut zw,
                    &format!("word/_rels/{}.rels", Self::footer_part(*s)),
                    rels.as_bytes(),
                );
            }
        }
        let rels = self.rels_xml(Owner::Body, &doc_rels);
        put(&mut zw, "word/_rels/document.xml.rels", rels.as_bytes());

        let mut written: Vec<&str> = Vec::new();
        for img in &self.images {
            if written.contains(&img.media_name.as_str()) {
                continue;
            }
            written.push(&img.media_name);
            put(&mut zw, &format!("word/media/{}", img.media_name), &img.data);
        }

        zw.finish().expect("finish zip").into_inner()
    }
}

/// `<w:p>` with one run per text fragment.
pub fn para(runs: &[&str]) -> String {
    let mut s = String::from("<w:p>");
    for r in runs {
        s.push_str(&format!(r#"<w:r><w:t xml:space="preserve">{r}</w:t></w:r>"#));
    }
    s.push_str("</w:p>");
    s
}

/// A paragraph holding one inline picture.
pub fn picture(rel_id: &str, cx: i64, cy: i64) -> String {
    format!(
        "<w:p><w:r>{}</w:r></w:p>",
        crate::docx::drawing::tests::inline_drawing_xml(rel_id, cx, cy)
    )
}

/// A table whose rows each hold the given cell texts.
pub fn table(rows: &[&[&str]]) -> String {
    let cols = rows.first().map(|r| r.len()).unwrap_or(0);
    let mut s = String::from(r#"<w:tbl><w:tblPr><w:tblStyle w:val="TableGrid"/></w:tblPr><w:tblGrid>"#);
    for _ in 0..cols {
        s.push_str(r#"<w:gridCol w:w="2000"/>"#);
    }
    s.push_str("</w:tblGrid>");
    for row in rows {
        s.push_str("<w:tr>");
        for cell in row.iter() {
            s.push_str(&format!(
                r#"<w:tc><w:tcPr><w:tcW w:w="2000" w:type="dxa"/></w:tcPr>{}</w:tc>"#,
                para(&[*cell])
            ));
        }
        s.push_str("</w:tr>");
    }
    s.push_str("</w:tbl>");
    s
}
