//! Pixel-exact object picking.
//!
//! A dedicated framebuffer with `segtex0` and `segtex1` attached, allocated
//! by [`Renderer::enable_picking`]. Window coordinates have their origin at
//! the top left; the lookup reads device row `height − y`. Anything outside
//! the window returns 0, which also means "no object".

use super::Renderer;
use crate::errors::LumenError;

impl Renderer {
    /// Allocates the picking framebuffer. Before `init` this only records
    /// the request.
    pub fn enable_picking(&mut self) {
        self.settings.picking = true;
        if self.textures.is_some() && self.picking_fbo.is_none() {
            self.create_picking_fbo();
        }
    }

    pub(super) fn create_picking_fbo(&mut self) {
        let fbo = self.device.create_framebuffer("Picking FBO");
        if let Some(set) = &self.textures {
            self.device.set_color_attachments(fbo, &[set.segtex[0], set.segtex[1]]);
        }
        self.picking_fbo = Some(fbo);
    }

    #[inline]
    #[must_use]
    pub fn is_picking_enabled(&self) -> bool {
        self.picking_fbo.is_some()
    }

    /// Segment id under window pixel `(x, y)`, 0 for none.
    ///
    /// Row `y` reads device row `pixel_height − y·scaling`, with no half
    /// pixel offset. Window row 0 therefore maps one past the top device
    /// row and always returns 0, and window row 1 reads the top row. On a
    /// frame filled by segment 9, `pick_segmentation_id(5, 0) == 0` and
    /// `pick_segmentation_id(5, 1) == 9`.
    #[must_use]
    pub fn pick_segmentation_id(&self, x: i32, y: i32) -> i32 {
        self.pick(0, x, y)
    }

    /// Object id under window pixel `(x, y)`, 0 for none. Rows map as
    /// in [`pick_segmentation_id`](Self::pick_segmentation_id), so `y == 0`
    /// always returns 0.
    #[must_use]
    pub fn pick_object_id(&self, x: i32, y: i32) -> i32 {
        self.pick(1, x, y)
    }

    fn pick(&self, attachment: usize, x: i32, y: i32) -> i32 {
        let (w, h) = (self.width as i32, self.height as i32);
        if x < 0 || y < 0 || x >= w || y >= h {
            return 0;
        }
        let Some(fbo) = self.picking_fbo else {
            log::error!("{}", LumenError::PickingDisabled);
            return 0;
        };

        let scaling = self.settings.scaling;
        let column = (x as f32 * scaling) as i64;
        let row = i64::from(self.pixel_height) - (y as f32 * scaling) as i64;
        if column >= i64::from(self.pixel_width) || row < 0 || row >= i64::from(self.pixel_height) {
            return 0;
        }
        self.device
            .read_pixel_i32(fbo, attachment, column as u32, row as u32)
            .unwrap_or(0)
    }
}
