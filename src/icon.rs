//! Aircraft icon bitmap, rasterized from SVG.

use base64::{Engine as _, engine::general_purpose};
use tiny_skia::Pixmap;
use usvg::Tree;

use crate::errors::IconError;

pub const ICON_SIZE: u32 = 32;

/// Nose points north so that rotating by the true track gives the heading on the map.
const AIRCRAFT_SVG: &str = r##"<svg width='32' height='32' viewBox='0 0 32 32' xmlns='http://www.w3.org/2000/svg'>
  <path d='M16 1.5 C17.2 1.5 17.8 3 17.8 5 L17.8 11.5 L29.5 18.5 L29.5 21 L17.8 17.3 L17.3 25 L21 27.8 L21 30 L16 28.6 L11 30 L11 27.8 L14.7 25 L14.2 17.3 L2.5 21 L2.5 18.5 L14.2 11.5 L14.2 5 C14.2 3 14.8 1.5 16 1.5 Z'
        fill='#ff0000' stroke='#ffffff' stroke-width='0.8' />
</svg>"##;

/// RGBA bitmap registered with the rendering surface.
#[derive(Debug, Clone)]
pub struct IconImage {
    pixmap: Pixmap,
}

impl IconImage {
    pub fn width(&self) -> u32 {
        self.pixmap.width()
    }

    pub fn height(&self) -> u32 {
        self.pixmap.height()
    }

    /// Straight (non premultiplied) RGBA bytes, row major.
    pub fn rgba(&self) -> Vec<u8> {
        self.pixmap
            .pixels()
            .iter()
            .flat_map(|p| {
                let c = p.demultiply();
                [c.red(), c.green(), c.blue(), c.alpha()]
            })
            .collect()
    }

    pub fn encode_png(&self) -> Result<Vec<u8>, IconError> {
        self.pixmap.encode_png().map_err(|e| IconError::Encode(e.to_string()))
    }

    pub fn data_url(&self) -> Result<String, IconError> {
        let png = self.encode_png()?;
        Ok(format!("data:image/png;base64,{}", general_purpose::STANDARD.encode(png)))
    }
}

pub fn aircraft_icon() -> Result<IconImage, IconError> {
    render_svg(AIRCRAFT_SVG)
}

fn render_svg(svg: &str) -> Result<IconImage, IconError> {
    let tree = Tree::from_str(svg, &usvg::Options::default())?;

    let size = tree.size();
    let (width, height) = (size.width() as u32, size.height() as u32);
    let mut pixmap = Pixmap::new(width, height).ok_or(IconError::Size(width, height))?;
    resvg::render(&tree, tiny_skia::Transform::default(), &mut pixmap.as_mut());

    Ok(IconImage { pixmap })
}
