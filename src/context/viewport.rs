const ZOOM_MIN_PERCENT: u16 = 1;
const ZOOM_MAX_PERCENT: u16 = 1600;
const ZOOM_STEPS_PERCENT: &[u16] = &[
    1, 2, 5, 10, 25, 33, 50, 67, 75, 100, 125, 150, 200, 300, 400, 600, 800, 1200, 1600,
];

fn clamp_zoom(zoom_percent: u16) -> u16 {
    zoom_percent.clamp(ZOOM_MIN_PERCENT, ZOOM_MAX_PERCENT)
}

/// Zoom and pan of one open image. Survives reloads of the same path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Viewport {
    zoom_percent: u16,
    offset_x: i32,
    offset_y: i32,
}

impl Default for Viewport {
    fn default() -> Self {
        Self::new()
    }
}

impl Viewport {
    pub const fn new() -> Self {
        Self {
            zoom_percent: 100,
            offset_x: 0,
            offset_y: 0,
        }
    }

    pub const fn zoom_percent(&self) -> u16 {
        self.zoom_percent
    }

    pub const fn offset(&self) -> (i32, i32) {
        (self.offset_x, self.offset_y)
    }

    pub fn zoom_in(&mut self) {
        let current = clamp_zoom(self.zoom_percent);
        self.zoom_percent = ZOOM_STEPS_PERCENT
            .iter()
            .copied()
            .find(|&step| step > current)
            .unwrap_or(ZOOM_MAX_PERCENT);
    }

    pub fn zoom_out(&mut self) {
        let current = clamp_zoom(self.zoom_percent);
        self.zoom_percent = ZOOM_STEPS_PERCENT
            .iter()
            .rev()
            .copied()
            .find(|&step| step < current)
            .unwrap_or(ZOOM_MIN_PERCENT);
    }

    pub fn set_zoom_percent(&mut self, zoom_percent: u16) {
        self.zoom_percent = clamp_zoom(zoom_percent);
    }

    /// Largest zoom step that fits `image` inside `frame`, capped at 100%.
    pub fn fit(&mut self, image: (u32, u32), frame: (u32, u32)) {
        let (image_width, image_height) = image;
        if image_width == 0 || image_height == 0 {
            return;
        }
        let ratio = (u64::from(frame.0) * 100 / u64::from(image_width))
            .min(u64::from(frame.1) * 100 / u64::from(image_height))
            .min(100);
        self.zoom_percent = ZOOM_STEPS_PERCENT
            .iter()
            .rev()
            .copied()
            .find(|&step| u64::from(step) <= ratio)
            .unwrap_or(ZOOM_MIN_PERCENT);
        self.offset_x = 0;
        self.offset_y = 0;
    }

    pub fn actual_size(&mut self) {
        *self = Self::new();
    }

    pub fn pan_by(&mut self, delta_x: i32, delta_y: i32) {
        self.offset_x = self.offset_x.saturating_add(delta_x);
        self.offset_y = self.offset_y.saturating_add(delta_y);
    }
}
