//! Packing images into an R x C grid and cutting a grid back into panels.
//!
//! Composition cover-fits every source into an equal square cell. Splitting
//! works on any canvas size: panels are `floor(W/cols) x floor(H/rows)` and the
//! last column and row absorb whatever pixels are left over, so the panels
//! always tile the canvas exactly.

use crate::errors::{MatteError, Result};
use crate::raster::RasterImage;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PanelRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GridLayout {
    rows: u32,
    cols: u32,
    canvas_width: u32,
    canvas_height: u32,
}

impl GridLayout {
    pub fn new(rows: u32, cols: u32, canvas_width: u32, canvas_height: u32) -> Result<Self> {
        if rows == 0 || cols == 0 {
            return Err(MatteError::grid(format!(
                "grid needs at least one row and column, got {rows}x{cols}"
            )));
        }
        if canvas_width < cols || canvas_height < rows {
            return Err(MatteError::grid(format!(
                "{canvas_width}x{canvas_height} canvas is too small for {rows} rows and {cols} columns"
            )));
        }
        Ok(Self {
            rows,
            cols,
            canvas_width,
            canvas_height,
        })
    }

    pub const fn rows(&self) -> u32 {
        self.rows
    }

    pub const fn cols(&self) -> u32 {
        self.cols
    }

    /// Width and height of every panel outside the last column/row.
    pub const fn base_panel_size(&self) -> (u32, u32) {
        (self.canvas_width / self.cols, self.canvas_height / self.rows)
    }

    pub fn panel(&self, row: u32, col: u32) -> Result<PanelRect> {
        if row >= self.rows || col >= self.cols {
            return Err(MatteError::grid(format!(
                "panel ({row}, {col}) outside {}x{} grid",
                self.rows, self.cols
            )));
        }
        let (panel_width, panel_height) = self.base_panel_size();
        let width = if col == self.cols - 1 {
            self.canvas_width - panel_width * (self.cols - 1)
        } else {
            panel_width
        };
        let height = if row == self.rows - 1 {
            self.canvas_height - panel_height * (self.rows - 1)
        } else {
            panel_height
        };
        let rect = PanelRect {
            x: col * panel_width,
            y: row * panel_height,
            width,
            height,
        };
        self.check(&rect)?;
        Ok(rect)
    }

    /// All panels in row-major order.
    pub fn panels(&self) -> Result<Vec<PanelRect>> {
        (0..self.rows)
            .flat_map(|row| (0..self.cols).map(move |col| (row, col)))
            .map(|(row, col)| self.panel(row, col))
            .collect()
    }

    fn check(&self, rect: &PanelRect) -> Result<()> {
        let fits = rect.width > 0
            && rect.height > 0
            && u64::from(rect.x) + u64::from(rect.width) <= u64::from(self.canvas_width)
            && u64::from(rect.y) + u64::from(rect.height) <= u64::from(self.canvas_height);
        if fits {
            Ok(())
        } else {
            Err(MatteError::grid(format!(
                "panel ({}, {}, {}, {}) does not fit {}x{} canvas",
                rect.x, rect.y, rect.width, rect.height, self.canvas_width, self.canvas_height
            )))
        }
    }
}

/// Cuts `canvas` into `rows x cols` panels, row-major, keeping its channels.
pub fn split(canvas: &RasterImage, rows: u32, cols: u32) -> Result<Vec<RasterImage>> {
    let layout = GridLayout::new(rows, cols, canvas.width(), canvas.height())?;
    layout
        .panels()?
        .into_iter()
        .map(|rect| {
            tracing::debug!(
                x = rect.x,
                y = rect.y,
                width = rect.width,
                height = rect.height,
                "extracting panel"
            );
            canvas.extract_region(rect.x, rect.y, rect.width, rect.height)
        })
        .collect()
}

/// Cover-fits each image into a `cell_size` square and places it, row-major,
/// on a transparent RGBA canvas `cols * cell_size` wide and `rows * cell_size`
/// tall. Unused cells stay transparent.
pub fn compose(images: &[RasterImage], rows: u32, cols: u32, cell_size: u32) -> Result<RasterImage> {
    if rows == 0 || cols == 0 || cell_size == 0 {
        return Err(MatteError::grid(format!(
            "rows, cols and cell size must be non-zero, got {rows}x{cols} @ {cell_size}"
        )));
    }
    let cells = rows as usize * cols as usize;
    if images.len() > cells {
        return Err(MatteError::grid(format!(
            "{} images do not fit a {rows}x{cols} grid",
            images.len()
        )));
    }
    let canvas_width = cols
        .checked_mul(cell_size)
        .ok_or_else(|| MatteError::grid("canvas width overflows"))?;
    let canvas_height = rows
        .checked_mul(cell_size)
        .ok_or_else(|| MatteError::grid("canvas height overflows"))?;

    let cell = cell_size as usize;
    let stride = canvas_width as usize * 4;
    let mut canvas = vec![0u8; stride * canvas_height as usize];

    for (index, image) in images.iter().enumerate() {
        let row = index / cols as usize;
        let col = index % cols as usize;
        let tile = image.resize_cover(cell_size, cell_size)?.to_rgba8();

        for (ty, tile_row) in tile.as_raw().chunks_exact(cell * 4).enumerate() {
            let start = (row * cell + ty) * stride + col * cell * 4;
            canvas[start..start + cell * 4].copy_from_slice(tile_row);
        }
    }

    RasterImage::from_raw(canvas_width, canvas_height, 4, canvas)
}
