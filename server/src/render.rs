use std::sync::Arc;

use followsweeper_common::models::Phase;
use followsweeper_engine::{Cell, Snapshot};
use thiserror::Error;
use xmlwriter::{Options, XmlWriter};

use crate::cache::TtlCache;

pub type ImageStore = Arc<TtlCache<String, StoredImage>>;

#[derive(Clone, Debug, PartialEq)]
pub struct StoredImage {
    pub content_type: String,
    pub data: Vec<u8>,
    pub game_id: String,
}

#[derive(Clone, Debug, PartialEq)]
pub struct RenderedImage {
    pub content_type: &'static str,
    pub data: Vec<u8>,
}

#[derive(Debug, Error, PartialEq)]
pub enum RenderError {
    #[error("only finished games can be rendered")]
    GameInProgress,
}

/// Turns a finished board into an image the share and mint flows can use.
pub trait BoardRenderer: Send + Sync {
    fn render(&self, snapshot: &Snapshot) -> Result<RenderedImage, RenderError>;
}

pub type Renderer = Box<dyn BoardRenderer>;

#[derive(Clone, Debug)]
pub struct SvgBoardRenderer {
    pub cell_size: usize,
    pub padding: usize,
    pub header: usize,
}

impl Default for SvgBoardRenderer {
    fn default() -> Self {
        Self {
            cell_size: 40,
            padding: 20,
            header: 40,
        }
    }
}

const STYLE: &str = concat!(
    ".cell { fill: #4a5568; stroke: #2d3748; stroke-width: 1; }",
    ".revealed { fill: #e2e8f0; }",
    ".bomb { fill: #e53e3e; }",
    ".flag { fill: #f56565; }",
    ".text { font-family: Arial, sans-serif; font-size: 12px; fill: #2d3748; text-anchor: middle; }",
    ".title { font-family: Arial, sans-serif; font-size: 16px; font-weight: bold; fill: #ffffff; text-anchor: middle; }",
);

fn class_and_label(cell: &Cell) -> (&'static str, String) {
    if cell.is_mine {
        let label = cell
            .avatar
            .as_ref()
            .map(|avatar| avatar.mention())
            .unwrap_or_else(|| "💣".to_string());
        ("cell bomb", label)
    } else if cell.is_revealed {
        let label = match cell.adjacent_mines {
            0 => String::new(),
            n => n.to_string(),
        };
        ("cell revealed", label)
    } else if cell.is_flagged {
        ("cell flag", "🚩".to_string())
    } else {
        ("cell", String::new())
    }
}

impl SvgBoardRenderer {
    fn cell(&self, xml: &mut XmlWriter, x: usize, y: usize, cell: &Cell) {
        let (class, label) = class_and_label(cell);
        let size = self.cell_size;

        xml.start_element("rect");
        xml.write_attribute("x", &x);
        xml.write_attribute("y", &y);
        xml.write_attribute("width", &(size - 2));
        xml.write_attribute("height", &(size - 2));
        xml.write_attribute("class", class);
        xml.end_element();

        xml.start_element("text");
        xml.write_attribute("x", &(x + size / 2));
        xml.write_attribute("y", &(y + size / 2 + 4));
        xml.write_attribute("class", "text");
        xml.write_text(&label);
        xml.end_element();
    }

    fn svg(&self, snapshot: &Snapshot) -> String {
        let width = snapshot.width * self.cell_size + 2 * self.padding;
        let height = snapshot.height * self.cell_size + self.header + 2 * self.padding;
        let title = if snapshot.phase == Phase::Won {
            "🎉 You Won!"
        } else {
            "💥 Game Over!"
        };

        let mut xml = XmlWriter::new(Options::default());
        xml.start_element("svg");
        xml.write_attribute("width", &width);
        xml.write_attribute("height", &height);
        xml.write_attribute("xmlns", "http://www.w3.org/2000/svg");

        xml.start_element("defs");
        xml.start_element("style");
        xml.write_text(STYLE);
        xml.end_element();
        xml.end_element();

        xml.start_element("rect");
        xml.write_attribute("width", &width);
        xml.write_attribute("height", &height);
        xml.write_attribute("fill", "#1a202c");
        xml.end_element();

        xml.start_element("text");
        xml.write_attribute("x", &(width / 2));
        xml.write_attribute("y", &(self.padding + 5));
        xml.write_attribute("class", "title");
        xml.write_text(title);
        xml.end_element();

        for (row, cells) in snapshot.cells.iter().enumerate() {
            for (col, cell) in cells.iter().enumerate() {
                let x = col * self.cell_size + self.padding;
                let y = row * self.cell_size + self.padding + self.header;
                self.cell(&mut xml, x, y, cell);
            }
        }

        xml.end_document()
    }
}

impl BoardRenderer for SvgBoardRenderer {
    fn render(&self, snapshot: &Snapshot) -> Result<RenderedImage, RenderError> {
        if !snapshot.phase.is_finished() {
            return Err(RenderError::GameInProgress);
        }

        Ok(RenderedImage {
            content_type: "image/svg+xml",
            data: self.svg(snapshot).into_bytes(),
        })
    }
}
