//! Read-only visibility collaborator used to cull quads at draw time.

use geometry::Rect;

pub trait Occlusion {
    /// The part of `content_rect` that is neither occluded nor outside the
    /// visible region. Empty means the quad can be dropped entirely.
    fn unoccluded_content_rect(&self, content_rect: Rect) -> Rect;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoOcclusion;

impl Occlusion for NoOcclusion {
    fn unoccluded_content_rect(&self, content_rect: Rect) -> Rect {
        content_rect
    }
}

/// A visible region with one occluding rectangle. Occlusion is subtracted
/// conservatively: only when the occluder trims a full-width or
/// full-height band does the result shrink, since an axis-aligned
/// rectangle cannot represent an L-shaped remainder.
#[derive(Debug, Clone, Copy)]
pub struct RegionOcclusion {
    pub visible_rect: Rect,
    pub occluded_rect: Rect,
}

impl RegionOcclusion {
    pub fn visible_only(visible_rect: Rect) -> Self {
        Self {
            visible_rect,
            occluded_rect: Rect::zero(),
        }
    }
}

impl Occlusion for RegionOcclusion {
    fn unoccluded_content_rect(&self, content_rect: Rect) -> Rect {
        let visible = content_rect.intersection(self.visible_rect);
        subtract_band(visible, self.occluded_rect)
    }
}

fn subtract_band(rect: Rect, occluded: Rect) -> Rect {
    if rect.is_empty() {
        return Rect::zero();
    }
    let overlap = rect.intersection(occluded);
    if overlap.is_empty() {
        return rect;
    }
    if occluded.contains_rect(rect) {
        return Rect::zero();
    }
    let spans_width = overlap.x == rect.x && overlap.width == rect.width;
    let spans_height = overlap.y == rect.y && overlap.height == rect.height;
    if spans_width && overlap.y == rect.y {
        return Rect::new(
            rect.x,
            overlap.bottom(),
            rect.width,
            rect.bottom() - overlap.bottom(),
        );
    }
    if spans_width && overlap.bottom() == rect.bottom() {
        return Rect::new(rect.x, rect.y, rect.width, overlap.y - rect.y);
    }
    if spans_height && overlap.x == rect.x {
        return Rect::new(
            overlap.right(),
            rect.y,
            rect.right() - overlap.right(),
            rect.height,
        );
    }
    if spans_height && overlap.right() == rect.right() {
        return Rect::new(rect.x, rect.y, overlap.x - rect.x, rect.height);
    }
    rect
}
