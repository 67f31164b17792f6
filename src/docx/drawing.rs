use serde::Serialize;

use crate::docx::xml::{set_event_attr, XmlEvent};

/// EMUs per inch.
pub const EMU_PER_INCH: i64 = 914_400;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Anchoring {
    Inline,
    Floating,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct Geometry {
    pub width_emu: i64,
    pub height_emu: i64,
    pub anchoring: Anchoring,
}

/// A `w:drawing` element, kept verbatim.
#[derive(Clone, Debug, PartialEq)]
pub struct Drawing {
    events: Vec<XmlEvent>,
}

impl Drawing {
    pub fn new(events: Vec<XmlEvent>) -> Self {
        Self { events }
    }

    pub fn events(&self) -> &[XmlEvent] {
        &self.events
    }

    /// Relationship ids referenced through `a:blip r:embed`.
    pub fn embed_ids(&self) -> Vec<&str> {
        self.events
            .iter()
            .filter(|ev| ev.is_open("a:blip"))
            .filter_map(|ev| ev.attr("r:embed"))
            .collect()
    }

    pub fn references(&self, rel_id: &str) -> bool {
        self.embed_ids().contains(&rel_id)
    }

    pub fn anchoring(&self) -> Anchoring {
        if self.events.iter().any(|ev| ev.is_open("wp:inline")) {
            Anchoring::Inline
        } else {
            Anchoring::Floating
        }
    }

    pub fn has_extent(&self) -> bool {
        self.events.iter().any(|ev| ev.is_open("wp:extent"))
    }

    pub fn geometry(&self) -> Option<Geometry> {
        let extent = self.events.iter().find(|ev| ev.is_open("wp:extent"))?;
        let width_emu = extent.attr("cx")?.trim().parse::<i64>().ok()?;
        let height_emu = extent.attr("cy")?.trim().parse::<i64>().ok()?;
        Some(Geometry {
            width_emu,
            height_emu,
            anchoring: self.anchoring(),
        })
    }

    /// Rewrite the extent everywhere the drawing stores it: the `wp:extent`
    /// of the inline/anchor and every `a:ext` carrying `cx`/`cy`.
    pub fn set_extent(&mut self, width_emu: i64, height_emu: i64) -> bool {
        let cx = width_emu.to_string();
        let cy = height_emu.to_string();
        let mut touched = false;
        for ev in self.events.iter_mut() {
            let is_extent = ev.is_open("wp:extent");
            let is_xfrm_ext = ev.is_open("a:ext") && ev.attr("cx").is_some();
            if is_extent || is_xfrm_ext {
                set_event_attr(ev, "cx", &cx);
                set_event_attr(ev, "cy", &cy);
                touched |= is_extent;
            }
        }
        touched
    }
}
