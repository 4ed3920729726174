//! Offscreen drawing surface.

use mirage_shared::RenderSurface;

/// Surface with no backing window: tracks its size only.
///
/// Used by the headless demo and by tests; a windowed backend implements
/// [`RenderSurface`] the same way.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HeadlessSurface {
    label: String,
    width: u32,
    height: u32,
    resizes: u32,
}

impl HeadlessSurface {
    /// Creates a surface of the given size.
    #[must_use]
    pub fn new(label: impl Into<String>, width: u32, height: u32) -> Self {
        Self {
            label: label.into(),
            width,
            height,
            resizes: 0,
        }
    }

    /// Number of resizes applied.
    #[must_use]
    pub fn resizes(&self) -> u32 {
        self.resizes
    }
}

impl RenderSurface for HeadlessSurface {
    fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn resize(&mut self, width: u32, height: u32) {
        self.width = width;
        self.height = height;
        self.resizes += 1;
    }

    fn label(&self) -> &str {
        &self.label
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resize() {
        let mut surface = HeadlessSurface::new("offscreen", 4, 4);
        surface.resize(8, 2);
        assert_eq!(surface.size(), (8, 2));
        assert_eq!(surface.resizes(), 1);
        assert_eq!(surface.label(), "offscreen");
    }
}
