//! Display geometry derived from intrinsic page size, rotation, and zoom.
//!
//! Everything here is a pure function so placeholder layout can be computed
//! before a single page has been rasterized.

pub const ZOOM_MIN: f32 = 0.1;
pub const ZOOM_MAX: f32 = 5.0;

/// Fallback page box for pages that report a degenerate intrinsic size.
pub const DEFAULT_PAGE_SIZE_PT: (f32, f32) = (612.0, 792.0);

/// Whole-document rotation, in quarter turns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Rotation {
    #[default]
    Deg0,
    Deg90,
    Deg180,
    Deg270,
}

impl Rotation {
    pub fn from_degrees(degrees: u16) -> Option<Self> {
        match degrees % 360 {
            0 => Some(Self::Deg0),
            90 => Some(Self::Deg90),
            180 => Some(Self::Deg180),
            270 => Some(Self::Deg270),
            _ => None,
        }
    }

    pub fn degrees(self) -> u16 {
        match self {
            Self::Deg0 => 0,
            Self::Deg90 => 90,
            Self::Deg180 => 180,
            Self::Deg270 => 270,
        }
    }

    pub fn quarter_turns(self) -> u8 {
        (self.degrees() / 90) as u8
    }

    /// Rotation after `quarter_turns` additional turns; negative turns go
    /// counter-clockwise.
    pub fn rotated_by(self, quarter_turns: i32) -> Self {
        let turns = (self.quarter_turns() as i32 + quarter_turns).rem_euclid(4);
        match turns {
            0 => Self::Deg0,
            1 => Self::Deg90,
            2 => Self::Deg180,
            _ => Self::Deg270,
        }
    }

    /// 90 and 270 exchange page width and height.
    pub fn swaps_axes(self) -> bool {
        matches!(self, Self::Deg90 | Self::Deg270)
    }
}

pub fn clamp_zoom(zoom: f32) -> f32 {
    if !zoom.is_finite() {
        return ZOOM_MIN;
    }
    zoom.clamp(ZOOM_MIN, ZOOM_MAX)
}

/// Estimated display size for a page that has not been rendered yet.
///
/// Swaps the intrinsic axes for 90/270, then scales to `base_width`
/// preserving aspect ratio. The estimate only scaffolds layout; the rendered
/// bitmap's own aspect ratio takes over on delivery.
pub fn placeholder_size(
    intrinsic_width: f32,
    intrinsic_height: f32,
    rotation: Rotation,
    base_width: f32,
) -> (f32, f32) {
    let (mut width, mut height) = (intrinsic_width, intrinsic_height);
    if !width.is_finite() || !height.is_finite() || width <= 0.0 || height <= 0.0 {
        (width, height) = DEFAULT_PAGE_SIZE_PT;
    }
    if rotation.swaps_axes() {
        std::mem::swap(&mut width, &mut height);
    }

    let base_width = if base_width.is_finite() && base_width > 0.0 {
        base_width
    } else {
        DEFAULT_PAGE_SIZE_PT.0
    };
    (base_width, base_width * (height / width))
}

pub fn display_width(base_width: f32, zoom: f32) -> f32 {
    base_width * clamp_zoom(zoom)
}

/// Zoom factor that makes a page exactly fill `viewport_width` minus margins.
pub fn fit_to_width_zoom(viewport_width: f32, margins: f32, base_width: f32) -> f32 {
    if !viewport_width.is_finite() || !margins.is_finite() || base_width <= 0.0 {
        return ZOOM_MIN;
    }
    clamp_zoom((viewport_width - margins) / base_width)
}
