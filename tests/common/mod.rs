//! On-disk `.docx` fixtures for the integration tests.

#![allow(dead_code)]

use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};

use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

const NS: &str = r#"xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships" xmlns:wp="http://schemas.openxmlformats.org/drawingml/2006/wordprocessingDrawing" xmlns:a="http://schemas.openxmlformats.org/drawingml/2006/main" xmlns:pic="http://schemas.openxmlformats.org/drawingml/2006/picture""#;
const IMAGE_REL: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships/image";
const RELS_HEAD: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">"#;

pub const PNG_SIG: &[u8] = b"\x89PNG\r\n\x1a\n\x00\x00\x00\x0dIHDR";
pub const JPEG_SIG: &[u8] = b"\xFF\xD8\xFF\xE0\x00\x10JFIF\x00";

pub fn p(text: &str) -> String {
    format!(r#"<w:p><w:r><w:t xml:space="preserve">{text}</w:t></w:r></w:p>"#)
}

pub fn styled_p(style: &str, runs: &[&str]) -> String {
    let mut s = format!(r#"<w:p><w:pPr><w:pStyle w:val="{style}"/></w:pPr>"#);
    for r in runs {
        s.push_str(&format!(
            r#"<w:r><w:rPr><w:b/></w:rPr><w:t xml:space="preserve">{r}</w:t></w:r>"#
        ));
    }
    s.push_str("</w:p>");
    s
}

pub fn table(rows: &[&[&str]]) -> String {
    let cols = rows.first().map(|r| r.len()).unwrap_or(0);
    let mut s = String::from("<w:tbl><w:tblPr/><w:tblGrid>");
    s.push_str(&r#"<w:gridCol w:w="2000"/>"#.repeat(cols));
    s.push_str("</w:tblGrid>");
    for row in rows {
        s.push_str("<w:tr>");
        for cell in row.iter() {
            s.push_str(&format!("<w:tc>{}</w:tc>", p(cell)));
        }
        s.push_str("</w:tr>");
    }
    s.push_str("</w:tbl>");
    s
}

pub fn picture(rel_id: &str, cx: i64, cy: i64) -> String {
    format!(
        r#"<w:p><w:r><w:drawing><wp:inline><wp:extent cx="{cx}" cy="{cy}"/><wp:docPr id="1" name="Picture 1"/><a:graphic><a:graphicData uri="http://schemas.openxmlformats.org/drawingml/2006/picture"><pic:pic><pic:blipFill><a:blip r:embed="{rel_id}"/></pic:blipFill><pic:spPr><a:xfrm><a:off x="0" y="0"/><a:ext cx="{cx}" cy="{cy}"/></a:xfrm></pic:spPr></pic:pic></a:graphicData></a:graphic></wp:inline></w:drawing></w:r></w:p>"#
    )
}

/// One section; optional default header and footer; images as
/// `(rel_id, media file name, bytes)` per owner.
#[derive(Default)]
pub struct Fixture {
    pub body: String,
    pub header: Option<String>,
    pub footer: Option<String>,
    pub body_images: Vec<(String, String, Vec<u8>)>,
    pub header_images: Vec<(String, String, Vec<u8>)>,
}

impl Fixture {
    pub fn new(body: impl Into<String>) -> Self {
        Self {
            body: body.into(),
            ..Default::default()
        }
    }

    pub fn header(mut self, xml: impl Into<String>) -> Self {
        self.header = Some(xml.into());
        self
    }

    pub fn footer(mut self, xml: impl Into<String>) -> Self {
        self.footer = Some(xml.into());
        self
    }

    pub fn body_image(mut self, rel_id: &str, name: &str, data: &[u8]) -> Self {
        self.body_images.push((rel_id.into(), name.into(), data.to_vec()));
        self
    }

    pub fn header_image(mut self, rel_id: &str, name: &str, data: &[u8]) -> Self {
        self.header_images.push((rel_id.into(), name.into(), data.to_vec()));
        self
    }

    pub fn bytes(&self) -> Vec<u8> {
        let mut zw = ZipWriter::new(Cursor::new(Vec::new()));
        let opts = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
        let mut put = |name: &str, data: &[u8]| {
            zw.start_file(name, opts).expect("start entry");
            zw.write_all(data).expect("write entry");
        };

        put(
            "[Content_Types].xml",
            br#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/><Default Extension="xml" ContentType="application/xml"/><Default Extension="png" ContentType="image/png"/><Override PartName="/word/document.xml" ContentType="application/vnd.openxmlformats-officedocument.wordprocessingml.document.main+xml"/><Override PartName="/word/header1.xml" ContentType="application/vnd.openxmlformats-officedocument.wordprocessingml.header+xml"/><Override PartName="/word/footer1.xml" ContentType="application/vnd.openxmlformats-officedocument.wordprocessingml.footer+xml"/></Types>"#,
        );
        put(
            "_rels/.rels",
            format!(r#"{RELS_HEAD}<Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="word/document.xml"/></Relationships>"#).as_bytes(),
        );

        let mut refs = String::new();
        let mut doc_rels = String::from(RELS_HEAD);
        if let Some(h) = &self.header {
            refs.push_str(r#"<w:headerReference w:type="default" r:id="rIdHdr"/>"#);
            doc_rels.push_str(r#"<Relationship Id="rIdHdr" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/header" Target="header1.xml"/>"#);
            put(
                "word/header1.xml",
                format!(r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><w:hdr {NS}>{h}</w:hdr>"#).as_bytes(),
            );
            put(
                "word/_rels/header1.xml.rels",
                image_rels(&self.header_images).as_bytes(),
            );
        }
        if let Some(f) = &self.footer {
            refs.push_str(r#"<w:footerReference w:type="default" r:id="rIdFtr"/>"#);
            doc_rels.push_str(r#"<Relationship Id="rIdFtr" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/footer" Target="footer1.xml"/>"#);
            put(
                "word/footer1.xml",
                format!(r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><w:ftr {NS}>{f}</w:ftr>"#).as_bytes(),
            );
        }
        for (id, name, _) in &self.body_images {
            doc_rels.push_str(&format!(
                r#"<Relationship Id="{id}" Type="{IMAGE_REL}" Target="media/{name}"/>"#
            ));
        }
        doc_rels.push_str("</Relationships>");
        put("word/_rels/document.xml.rels", doc_rels.as_bytes());

        put(
            "word/document.xml",
            format!(
                r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><w:document {NS}><w:body>{}<w:sectPr>{refs}<w:pgSz w:w="11906" w:h="16838"/></w:sectPr></w:body></w:document>"#,
                self.body
            )
            .as_bytes(),
        );
        for (_, name, data) in self.body_images.iter().chain(&self.header_images) {
            put(&format!("word/media/{name}"), data);
        }
        drop(put);
        zw.finish().expect("finish zip").into_inner()
    }

    pub fn write(&self, dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, self.bytes()).expect("write fixture");
        path
    }
}

fn image_rels(images: &[(String, String, Vec<u8>)]) -> String {
    let mut s = String::from(RELS_HEAD);
    for (id, name, _) in images {
        s.push_str(&format!(
            r#"<Relationship Id="{id}" Type="{IMAGE_REL}" Target="media/{name}"/>"#
        ));
    }
    s.push_str("</Relationships>");
    s
}

/// Raw bytes of every zip entry, by name.
pub fn entries(bytes: &[u8]) -> Vec<(String, Vec<u8>)> {
    use std::io::Read;
    let mut zip = zip::ZipArchive::new(Cursor::new(bytes)).expect("open zip");
    let mut out = Vec::new();
    for i in 0..zip.len() {
        let mut f = zip.by_index(i).expect("entry");
        let mut data = Vec::new();
        f.read_to_end(&mut data).expect("read entry");
        out.push((f.name().to_string(), data));
    }
    out
}

pub fn entry(bytes: &[u8], name: &str) -> Option<Vec<u8>> {
    entries(bytes).into_iter().find(|(n, _)| n == name).map(|(_, d)| d)
}
