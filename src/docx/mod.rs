pub mod archive;
pub mod drawing;
pub mod model;
pub mod opc;
pub mod package;
pub mod sections;
pub mod xml;

pub use drawing::{Anchoring, Geometry, EMU_PER_INCH};
pub use model::{Block, Cell, Container, Paragraph, Run, RunFormat, Row, Table};
pub use package::{LoadOptions, Package, Part, PartKind, Section, Statistics};
