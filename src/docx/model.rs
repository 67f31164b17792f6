//! Typed view of a WordprocessingML story.
//!
//! Paragraphs, runs, tables, rows and cells get their own node types; every
//! other element is carried as a verbatim event slice so writing the tree
//! back reproduces the input.

use std::mem;

use anyhow::{anyhow, bail};

use crate::docx::drawing::Drawing;
use crate::docx::xml::{collect_subtree, set_attr, XmlEvent};

pub type Raw = Vec<XmlEvent>;

/// Inline wrappers whose children are runs.
const RUN_GROUPS: &[&str] = &[
    "w:hyperlink",
    "w:ins",
    "w:smartTag",
    "w:fldSimple",
    "w:customXml",
];

/// Attributes Word expects to be unique per paragraph or row.
const UNIQUE_IDS: &[&str] = &["w14:paraId", "w14:textId"];

/// Split a flat event slice into top-level nodes.
pub fn split_nodes(events: &[XmlEvent]) -> Vec<Raw> {
    let mut out = Vec::new();
    let mut i = 0;
    while i < events.len() {
        if matches!(events[i], XmlEvent::Start { .. }) {
            let (sub, next) = collect_subtree(events, i);
            out.push(sub);
            i = next;
        } else {
            out.push(vec![events[i].clone()]);
            i += 1;
        }
    }
    out
}

fn child_nodes(element: &[XmlEvent]) -> Vec<Raw> {
    match element.first() {
        Some(XmlEvent::Start { .. }) if element.len() >= 2 => {
            split_nodes(&element[1..element.len() - 1])
        }
        _ => Vec::new(),
    }
}

fn open_attrs(node: &[XmlEvent]) -> Vec<(String, String)> {
    node.first().map(|ev| ev.attrs().to_vec()).unwrap_or_default()
}

fn opens(node: &[XmlEvent], tag: &str) -> bool {
    node.first().map(|ev| ev.is_open(tag)).unwrap_or(false)
}

fn wrap(out: &mut Raw, name: &str, attrs: &[(String, String)], body: Raw) {
    if body.is_empty() {
        out.push(XmlEvent::empty(name, attrs.to_vec()));
    } else {
        out.push(XmlEvent::start(name, attrs.to_vec()));
        out.extend(body);
        out.push(XmlEvent::end(name));
    }
}

fn strip_unique_ids(attrs: &mut Vec<(String, String)>) {
    attrs.retain(|(k, _)| !UNIQUE_IDS.contains(&k.as_str()));
}

fn element_text(node: &[XmlEvent]) -> String {
    let mut s = String::new();
    for ev in node {
        match ev {
            XmlEvent::Text { text } | XmlEvent::CData { text } => s.push_str(text),
            _ => {}
        }
    }
    s
}

fn prop_val<'a>(props: &'a [XmlEvent], tag: &str) -> Option<&'a str> {
    props
        .iter()
        .find(|ev| ev.is_open(tag))
        .and_then(|ev| ev.attr("w:val"))
}

fn toggle_on(props: &[XmlEvent], tag: &str) -> bool {
    match props.iter().find(|ev| ev.is_open(tag)) {
        None => false,
        Some(ev) => !matches!(ev.attr("w:val"), Some("0") | Some("false") | Some("off")),
    }
}

// ----------------------------------------------------------------------------
// Container
// ----------------------------------------------------------------------------

/// Ordered block content: a document body, a header/footer or a table cell.
#[derive(Clone, Debug, Default)]
pub struct Container {
    pub blocks: Vec<Block>,
}

#[derive(Clone, Debug)]
pub enum Block {
    Paragraph(Paragraph),
    Table(Table),
    Raw(Raw),
}

impl Block {
    fn from_node(node: Raw) -> Self {
        if opens(&node, "w:p") {
            Block::Paragraph(Paragraph::from_events(&node))
        } else if opens(&node, "w:tbl") {
            Block::Table(Table::from_events(&node))
        } else {
            Block::Raw(node)
        }
    }

    fn write_into(&self, out: &mut Raw) {
        match self {
            Block::Paragraph(p) => p.write_into(out),
            Block::Table(t) => t.write_into(out),
            Block::Raw(raw) => out.extend(raw.iter().cloned()),
        }
    }
}

impl Container {
    pub fn from_events(events: &[XmlEvent]) -> Self {
        Self {
            blocks: split_nodes(events).into_iter().map(Block::from_node).collect(),
        }
    }

    pub fn write_into(&self, out: &mut Raw) {
        for b in &self.blocks {
            b.write_into(out);
        }
    }

    pub fn paragraphs(&self) -> impl Iterator<Item = &Paragraph> {
        self.blocks.iter().filter_map(|b| match b {
            Block::Paragraph(p) => Some(p),
            _ => None,
        })
    }

    pub fn paragraphs_mut(&mut self) -> impl Iterator<Item = &mut Paragraph> {
        self.blocks.iter_mut().filter_map(|b| match b {
            Block::Paragraph(p) => Some(p),
            _ => None,
        })
    }

    pub fn tables(&self) -> impl Iterator<Item = &Table> {
        self.blocks.iter().filter_map(|b| match b {
            Block::Table(t) => Some(t),
            _ => None,
        })
    }

    pub fn push_paragraph(&mut self, p: Paragraph) {
        self.blocks.push(Block::Paragraph(p));
    }

    /// Direct paragraphs joined by newlines.
    pub fn text(&self) -> String {
        self.paragraphs()
            .map(|p| p.text())
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Visit every paragraph in document order, descending into table cells.
    /// The flag tells whether the paragraph sits inside a table.
    pub fn for_each_paragraph(&self, f: &mut dyn FnMut(&Paragraph, bool)) {
        self.walk_paragraphs(false, f);
    }

    fn walk_paragraphs(&self, in_table: bool, f: &mut dyn FnMut(&Paragraph, bool)) {
        for b in &self.blocks {
            match b {
                Block::Paragraph(p) => f(p, in_table),
                Block::Table(t) => {
                    for row in t.rows() {
                        for cell in row.cells() {
                            cell.content.walk_paragraphs(true, f);
                        }
                    }
                }
                Block::Raw(_) => {}
            }
        }
    }

    pub fn for_each_paragraph_mut(&mut self, f: &mut dyn FnMut(&mut Paragraph)) {
        for b in self.blocks.iter_mut() {
            match b {
                Block::Paragraph(p) => f(p),
                Block::Table(t) => {
                    for row in t.rows_mut() {
                        for cell in row.cells_mut() {
                            cell.content.for_each_paragraph_mut(f);
                        }
                    }
                }
                Block::Raw(_) => {}
            }
        }
    }

    /// Replace every paragraph (cells included) with the paragraphs `f`
    /// returns for it, preserving order.
    pub fn flat_map_paragraphs(&mut self, f: &mut dyn FnMut(Paragraph) -> Vec<Paragraph>) {
        let blocks = mem::take(&mut self.blocks);
        let mut out = Vec::with_capacity(blocks.len());
        for b in blocks {
            match b {
                Block::Paragraph(p) => out.extend(f(p).into_iter().map(Block::Paragraph)),
                Block::Table(mut t) => {
                    for row in t.rows_mut() {
                        for cell in row.cells_mut() {
                            cell.content.flat_map_paragraphs(f);
                        }
                    }
                    out.push(Block::Table(t));
                }
                raw => out.push(raw),
            }
        }
        self.blocks = out;
    }

    /// Visit tables depth-first in document order until `f` returns true.
    /// Returns whether a visit stopped the walk.
    pub fn find_table_mut(&mut self, f: &mut dyn FnMut(&mut Table) -> bool) -> bool {
        for b in self.blocks.iter_mut() {
            if let Block::Table(t) = b {
                if f(t) {
                    return true;
                }
                for row in t.rows_mut() {
                    for cell in row.cells_mut() {
                        if cell.content.find_table_mut(f) {
                            return true;
                        }
                    }
                }
            }
        }
        false
    }

    pub fn for_each_drawing(&self, f: &mut dyn FnMut(&Drawing)) {
        self.for_each_paragraph(&mut |p, _| {
            for run in p.runs() {
                for c in &run.content {
                    if let RunContent::Drawing(d) = c {
                        f(d);
                    }
                }
            }
        });
    }

    pub fn for_each_drawing_mut(&mut self, f: &mut dyn FnMut(&mut Drawing)) {
        self.for_each_paragraph_mut(&mut |p| {
            p.for_each_run_mut(&mut |run| {
                for c in run.content.iter_mut() {
                    if let RunContent::Drawing(d) = c {
                        f(d);
                    }
                }
            });
        });
    }
}

// ----------------------------------------------------------------------------
// Paragraph / Run
// ----------------------------------------------------------------------------

#[derive(Clone, Debug, Default)]
pub struct Paragraph {
    pub attrs: Vec<(String, String)>,
    /// `w:pPr` subtree, if any.
    pub props: Option<Raw>,
    pub items: Vec<ParaItem>,
}

#[derive(Clone, Debug)]
pub enum ParaItem {
    Run(Run),
    /// Hyperlinks, tracked insertions and similar wrappers around runs.
    Group {
        name: String,
        attrs: Vec<(String, String)>,
        items: Vec<ParaItem>,
    },
    Raw(Raw),
}

impl ParaItem {
    fn from_node(node: Raw) -> Self {
        if opens(&node, "w:r") {
            return ParaItem::Run(Run::from_events(&node));
        }
        let group = node
            .first()
            .and_then(|ev| ev.name())
            .filter(|name| RUN_GROUPS.contains(name))
            .map(str::to_string);
        match group {
            Some(name) => ParaItem::Group {
                name,
                attrs: open_attrs(&node),
                items: child_nodes(&node).into_iter().map(ParaItem::from_node).collect(),
            },
            None => ParaItem::Raw(node),
        }
    }

    fn write_into(&self, out: &mut Raw) {
        match self {
            ParaItem::Run(r) => r.write_into(out),
            ParaItem::Group { name, attrs, items } => {
                let mut body = Vec::new();
                for it in items {
                    it.write_into(&mut body);
                }
                wrap(out, name, attrs, body);
            }
            ParaItem::Raw(raw) => out.extend(raw.iter().cloned()),
        }
    }

    fn collect_runs<'a>(&'a self, out: &mut Vec<&'a Run>) {
        match self {
            ParaItem::Run(r) => out.push(r),
            ParaItem::Group { items, .. } => {
                for it in items {
                    it.collect_runs(out);
                }
            }
            ParaItem::Raw(_) => {}
        }
    }

    fn visit_runs_mut(&mut self, f: &mut dyn FnMut(&mut Run)) {
        match self {
            ParaItem::Run(r) => f(r),
            ParaItem::Group { items, .. } => {
                for it in items.iter_mut() {
                    it.visit_runs_mut(f);
                }
            }
            ParaItem::Raw(_) => {}
        }
    }
}

impl Paragraph {
    pub fn from_events(node: &[XmlEvent]) -> Self {
        let mut p = Paragraph {
            attrs: open_attrs(node),
            ..Default::default()
        };
        for child in child_nodes(node) {
            if p.props.is_none() && opens(&child, "w:pPr") {
                p.props = Some(child);
            } else {
                p.items.push(ParaItem::from_node(child));
            }
        }
        p
    }

    /// A paragraph with the same paragraph properties as `template` holding
    /// one unformatted run.
    pub fn styled_like(template: &Paragraph, text: &str) -> Self {
        let mut attrs = template.attrs.clone();
        strip_unique_ids(&mut attrs);
        Paragraph {
            attrs,
            props: template.props.clone(),
            items: vec![ParaItem::Run(Run::plain(text, None))],
        }
    }

    /// A paragraph aligned with `w:jc`.
    pub fn aligned(alignment: &str) -> Self {
        let jc = XmlEvent::empty("w:jc", vec![("w:val".to_string(), alignment.to_string())]);
        Paragraph {
            props: Some(vec![
                XmlEvent::start("w:pPr", Vec::new()),
                jc,
                XmlEvent::end("w:pPr"),
            ]),
            ..Default::default()
        }
    }

    pub fn write_into(&self, out: &mut Raw) {
        let mut body = Vec::new();
        if let Some(props) = &self.props {
            body.extend(props.iter().cloned());
        }
        for it in &self.items {
            it.write_into(&mut body);
        }
        wrap(out, "w:p", &self.attrs, body);
    }

    pub fn runs(&self) -> Vec<&Run> {
        let mut out = Vec::new();
        for it in &self.items {
            it.collect_runs(&mut out);
        }
        out
    }

    pub fn for_each_run_mut(&mut self, f: &mut dyn FnMut(&mut Run)) {
        for it in self.items.iter_mut() {
            it.visit_runs_mut(f);
        }
    }

    pub fn text(&self) -> String {
        self.runs().iter().map(|r| r.text()).collect()
    }

    pub fn style_id(&self) -> Option<&str> {
        self.props.as_deref().and_then(|p| prop_val(p, "w:pStyle"))
    }

    pub fn alignment(&self) -> Option<&str> {
        self.props.as_deref().and_then(|p| prop_val(p, "w:jc"))
    }

    /// Offer each text-bearing run's text to `f`; runs for which `f` returns
    /// a new string are rewritten in place. Returns how many runs changed.
    pub fn map_run_texts(&mut self, f: &mut dyn FnMut(&str) -> Option<String>) -> usize {
        let mut changed = 0;
        self.for_each_run_mut(&mut |run| {
            if !run.has_text() {
                return;
            }
            let current = run.text();
            if let Some(next) = f(&current) {
                if next != current {
                    run.set_text(&next);
                    changed += 1;
                }
            }
        });
        changed
    }

    /// Replace the paragraph's text with `text` in a single run that carries
    /// the formatting of the first text-bearing run. Runs holding anything
    /// besides text (drawings, breaks, fields) keep that content.
    pub fn rewrite_text(&mut self, text: &str) {
        let format = self
            .runs()
            .into_iter()
            .find(|r| r.has_text())
            .and_then(|r| r.props.clone());
        let replacement = Run::plain(text, format);

        let mut anchor: Option<usize> = None;
        let items = mem::take(&mut self.items);
        let mut out = Vec::with_capacity(items.len() + 1);
        for mut it in items {
            let mut had_text = false;
            it.visit_runs_mut(&mut |run| {
                if run.has_text() {
                    had_text = true;
                    run.clear_text();
                }
            });
            if had_text && anchor.is_none() {
                anchor = Some(out.len());
            }
            let keep = match &it {
                ParaItem::Run(r) => !(had_text && r.is_text_only()),
                _ => true,
            };
            if keep {
                out.push(it);
            }
        }
        let at = anchor.unwrap_or(out.len()).min(out.len());
        out.insert(at, ParaItem::Run(replacement));
        self.items = out;
    }

    /// Drop all content except the paragraph properties.
    pub fn clear(&mut self) {
        self.items.clear();
    }

    pub fn push_run(&mut self, run: Run) {
        self.items.push(ParaItem::Run(run));
    }

    pub fn strip_unique_ids(&mut self) {
        strip_unique_ids(&mut self.attrs);
    }
}

#[derive(Clone, Debug, Default)]
pub struct Run {
    pub attrs: Vec<(String, String)>,
    /// `w:rPr` subtree, if any.
    pub props: Option<Raw>,
    pub content: Vec<RunContent>,
}

#[derive(Clone, Debug)]
pub enum RunContent {
    Text {
        attrs: Vec<(String, String)>,
        text: String,
    },
    Drawing(Drawing),
    Raw(Raw),
}

/// Character formatting read from `w:rPr`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RunFormat {
    pub bold: bool,
    pub italic: bool,
    pub underline: bool,
    pub font: Option<String>,
    /// Half-points.
    pub size: Option<u32>,
    pub color: Option<String>,
}

impl Run {
    pub fn from_events(node: &[XmlEvent]) -> Self {
        let mut run = Run {
            attrs: open_attrs(node),
            ..Default::default()
        };
        for child in child_nodes(node) {
            if run.props.is_none() && run.content.is_empty() && opens(&child, "w:rPr") {
                run.props = Some(child);
            } else if opens(&child, "w:t") {
                run.content.push(RunContent::Text {
                    attrs: open_attrs(&child),
                    text: element_text(&child),
                });
            } else if opens(&child, "w:drawing") {
                run.content.push(RunContent::Drawing(Drawing::new(child)));
            } else {
                run.content.push(RunContent::Raw(child));
            }
        }
        run
    }

    pub fn plain(text: &str, props: Option<Raw>) -> Self {
        let mut run = Run {
            props,
            ..Default::default()
        };
        run.set_text(text);
        run
    }

    /// A run whose content is built from raw children such as `w:fldChar`.
    pub fn with_children(children: Raw) -> Self {
        Run {
            content: split_nodes(&children).into_iter().map(RunContent::Raw).collect(),
            ..Default::default()
        }
    }

    pub fn write_into(&self, out: &mut Raw) {
        let mut body = Vec::new();
        if let Some(props) = &self.props {
            body.extend(props.iter().cloned());
        }
        for c in &self.content {
            match c {
                RunContent::Text { attrs, text } => {
                    if text.is_empty() {
                        body.push(XmlEvent::empty("w:t", attrs.clone()));
                    } else {
                        body.push(XmlEvent::start("w:t", attrs.clone()));
                        body.push(XmlEvent::text(text));
                        body.push(XmlEvent::end("w:t"));
                    }
                }
                RunContent::Drawing(d) => body.extend(d.events().iter().cloned()),
                RunContent::Raw(raw) => body.extend(raw.iter().cloned()),
            }
        }
        wrap(out, "w:r", &self.attrs, body);
    }

    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(|c| match c {
                RunContent::Text { text, .. } => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }

    pub fn has_text(&self) -> bool {
        self.content
            .iter()
            .any(|c| matches!(c, RunContent::Text { .. }))
    }

    pub fn is_text_only(&self) -> bool {
        self.content
            .iter()
            .all(|c| matches!(c, RunContent::Text { .. }))
    }

    /// Put `text` into the first `w:t` and empty the others; the element
    /// structure of the run is left as it was.
    pub fn set_text(&mut self, text: &str) {
        let mut first = true;
        for c in self.content.iter_mut() {
            if let RunContent::Text { attrs, text: t } = c {
                if first {
                    *t = text.to_string();
                    sync_space_attr(attrs, text);
                    first = false;
                } else {
                    t.clear();
                }
            }
        }
        if first {
            let mut attrs = Vec::new();
            sync_space_attr(&mut attrs, text);
            self.content.push(RunContent::Text {
                attrs,
                text: text.to_string(),
            });
        }
    }

    pub fn clear_text(&mut self) {
        for c in self.content.iter_mut() {
            if let RunContent::Text { text, .. } = c {
                text.clear();
            }
        }
    }

    pub fn drawings(&self) -> impl Iterator<Item = &Drawing> {
        self.content.iter().filter_map(|c| match c {
            RunContent::Drawing(d) => Some(d),
            _ => None,
        })
    }

    pub fn format(&self) -> RunFormat {
        let Some(props) = self.props.as_deref() else {
            return RunFormat::default();
        };
        let font = props
            .iter()
            .find(|ev| ev.is_open("w:rFonts"))
            .and_then(|ev| ev.attr("w:ascii").or_else(|| ev.attr("w:hAnsi")))
            .map(str::to_string);
        RunFormat {
            bold: toggle_on(props, "w:b"),
            italic: toggle_on(props, "w:i"),
            underline: prop_val(props, "w:u").map(|v| v != "none").unwrap_or(false),
            font,
            size: prop_val(props, "w:sz").and_then(|v| v.parse().ok()),
            color: prop_val(props, "w:color").map(str::to_string),
        }
    }
}

fn sync_space_attr(attrs: &mut Vec<(String, String)>, text: &str) {
    let edge_ws = text.starts_with(char::is_whitespace) || text.ends_with(char::is_whitespace);
    if edge_ws {
        set_attr(attrs, "xml:space", "preserve");
    }
}

// ----------------------------------------------------------------------------
// Tables
// ----------------------------------------------------------------------------

#[derive(Clone, Debug, Default)]
pub struct Table {
    pub attrs: Vec<(String, String)>,
    pub items: Vec<TableItem>,
}

#[derive(Clone, Debug)]
pub enum TableItem {
    Row(Row),
    /// `w:tblPr`, `w:tblGrid`, whitespace and anything else between rows.
    Raw(Raw),
}

#[derive(Clone, Debug, Default)]
pub struct Row {
    pub attrs: Vec<(String, String)>,
    pub items: Vec<RowItem>,
}

#[derive(Clone, Debug)]
pub enum RowItem {
    Cell(Cell),
    Raw(Raw),
}

#[derive(Clone, Debug, Default)]
pub struct Cell {
    pub attrs: Vec<(String, String)>,
    /// Cell content; `w:tcPr` stays in here as a raw block.
    pub content: Container,
}

impl Table {
    pub fn from_events(node: &[XmlEvent]) -> Self {
        Table {
            attrs: open_attrs(node),
            items: child_nodes(node)
                .into_iter()
                .map(|child| {
                    if opens(&child, "w:tr") {
                        TableItem::Row(Row::from_events(&child))
                    } else {
                        TableItem::Raw(child)
                    }
                })
                .collect(),
        }
    }

    pub fn write_into(&self, out: &mut Raw) {
        let mut body = Vec::new();
        for it in &self.items {
            match it {
                TableItem::Row(r) => r.write_into(&mut body),
                TableItem::Raw(raw) => body.extend(raw.iter().cloned()),
            }
        }
        wrap(out, "w:tbl", &self.attrs, body);
    }

    pub fn rows(&self) -> impl Iterator<Item = &Row> {
        self.items.iter().filter_map(|it| match it {
            TableItem::Row(r) => Some(r),
            _ => None,
        })
    }

    pub fn rows_mut(&mut self) -> impl Iterator<Item = &mut Row> {
        self.items.iter_mut().filter_map(|it| match it {
            TableItem::Row(r) => Some(r),
            _ => None,
        })
    }

    pub fn row(&self, index: usize) -> Option<&Row> {
        self.rows().nth(index)
    }

    pub fn row_mut(&mut self, index: usize) -> Option<&mut Row> {
        self.rows_mut().nth(index)
    }

    pub fn row_count(&self) -> usize {
        self.rows().count()
    }

    /// Grid columns, falling back to the widest row.
    pub fn column_count(&self) -> usize {
        let grid = self
            .items
            .iter()
            .filter_map(|it| match it {
                TableItem::Raw(raw) if opens(raw, "w:tblGrid") => {
                    Some(raw.iter().filter(|ev| ev.is_open("w:gridCol")).count())
                }
                _ => None,
            })
            .next()
            .unwrap_or(0);
        if grid > 0 {
            return grid;
        }
        self.rows().map(|r| r.cell_count()).max().unwrap_or(0)
    }

    /// Insert `rows` directly below the row at `index`, in order.
    pub fn insert_rows_after(&mut self, index: usize, rows: Vec<Row>) -> anyhow::Result<()> {
        let pos = self
            .items
            .iter()
            .enumerate()
            .filter(|(_, it)| matches!(it, TableItem::Row(_)))
            .nth(index)
            .map(|(pos, _)| pos)
            .ok_or_else(|| anyhow!("table has no row {index}"))?;
        let at = pos + 1;
        self.items
            .splice(at..at, rows.into_iter().map(TableItem::Row));
        Ok(())
    }
}

impl Row {
    pub fn from_events(node: &[XmlEvent]) -> Self {
        Row {
            attrs: open_attrs(node),
            items: child_nodes(node)
                .into_iter()
                .map(|child| {
                    if opens(&child, "w:tc") {
                        RowItem::Cell(Cell::from_events(&child))
                    } else {
                        RowItem::Raw(child)
                    }
                })
                .collect(),
        }
    }

    pub fn write_into(&self, out: &mut Raw) {
        let mut body = Vec::new();
        for it in &self.items {
            match it {
                RowItem::Cell(c) => c.write_into(&mut body),
                RowItem::Raw(raw) => body.extend(raw.iter().cloned()),
            }
        }
        wrap(out, "w:tr", &self.attrs, body);
    }

    pub fn cells(&self) -> impl Iterator<Item = &Cell> {
        self.items.iter().filter_map(|it| match it {
            RowItem::Cell(c) => Some(c),
            _ => None,
        })
    }

    pub fn cells_mut(&mut self) -> impl Iterator<Item = &mut Cell> {
        self.items.iter_mut().filter_map(|it| match it {
            RowItem::Cell(c) => Some(c),
            _ => None,
        })
    }

    pub fn cell_count(&self) -> usize {
        self.cells().count()
    }

    pub fn for_each_paragraph_mut(&mut self, f: &mut dyn FnMut(&mut Paragraph)) {
        for cell in self.cells_mut() {
            cell.content.for_each_paragraph_mut(f);
        }
    }

    /// Clear ids that must stay unique when a row is duplicated.
    pub fn strip_unique_ids(&mut self) {
        strip_unique_ids(&mut self.attrs);
        self.for_each_paragraph_mut(&mut |p| p.strip_unique_ids());
    }
}

impl Cell {
    pub fn from_events(node: &[XmlEvent]) -> Self {
        let inner = match node.first() {
            Some(XmlEvent::Start { .. }) if node.len() >= 2 => &node[1..node.len() - 1],
            _ => &[][..],
        };
        Cell {
            attrs: open_attrs(node),
            content: Container::from_events(inner),
        }
    }

    pub fn write_into(&self, out: &mut Raw) {
        let mut body = Vec::new();
        self.content.write_into(&mut body);
        wrap(out, "w:tc", &self.attrs, body);
    }

    pub fn text(&self) -> String {
        self.content.text()
    }
}

// ----------------------------------------------------------------------------
// Part tree
// ----------------------------------------------------------------------------

/// A whole part: everything up to and including the opening tag of the
/// story element, the story's blocks, then everything from its closing tag.
#[derive(Clone, Debug)]
pub struct PartTree {
    prolog: Raw,
    pub body: Container,
    epilog: Raw,
}

impl PartTree {
    pub fn parse(mut events: Vec<XmlEvent>, story_tag: &str) -> anyhow::Result<Self> {
        let Some(pos) = events.iter().position(|ev| ev.is_open(story_tag)) else {
            bail!("no <{story_tag}> element");
        };
        if let XmlEvent::Empty { name, attrs } = &events[pos] {
            let (name, attrs) = (name.clone(), attrs.clone());
            events[pos] = XmlEvent::Start {
                name: name.clone(),
                attrs,
            };
            events.insert(pos + 1, XmlEvent::End { name });
        }
        let (sub, next) = collect_subtree(&events, pos);
        let closed = matches!(sub.last(), Some(XmlEvent::End { name }) if name == story_tag);
        if !closed || sub.len() < 2 {
            bail!("unbalanced <{story_tag}> element");
        }
        let body = Container::from_events(&sub[1..sub.len() - 1]);
        let epilog = events.split_off(next - 1);
        events.truncate(pos + 1);
        Ok(Self {
            prolog: events,
            body,
            epilog,
        })
    }

    pub fn to_events(&self) -> Raw {
        let mut out = self.prolog.clone();
        self.body.write_into(&mut out);
        out.extend(self.epilog.iter().cloned());
        out
    }
}
