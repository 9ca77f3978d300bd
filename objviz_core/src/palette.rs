//! Classification → color/style lookup.
//!
//! The engine only asks "which color for this label" and "which color for
//! this object's paths". Hosts with their own color scheme implement
//! [`ClassificationPalette`]; [`DefaultPalette`] is a fixed table.

use crate::object::ObjectLabel;
use crate::primitive::Rgba;
use uuid::Uuid;

pub trait ClassificationPalette {
    /// Color for shapes and text of an object classified as `label`.
    fn color_for(&self, label: ObjectLabel) -> Rgba;

    /// Text shown by the label primitive.
    fn label_text(&self, label: ObjectLabel) -> String {
        label.name().to_string()
    }

    /// Color shared by all predicted paths of one object.
    ///
    /// Default: hue derived from the UUID bytes, so neighbouring objects'
    /// hypotheses are told apart while one object keeps its hue across
    /// frames.
    fn path_color(&self, object_id: &Uuid) -> Rgba {
        let bytes = object_id.as_bytes();
        let hue = u16::from_le_bytes([bytes[0], bytes[15]]) as f32 / u16::MAX as f32;
        hsv_to_rgba(hue * 360.0, 0.8, 1.0)
    }
}

/// Fixed label → color table.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultPalette;

impl ClassificationPalette for DefaultPalette {
    fn color_for(&self, label: ObjectLabel) -> Rgba {
        match label {
            ObjectLabel::Unknown => Rgba::from_rgb8(255, 255, 255),
            ObjectLabel::Car => Rgba::from_rgb8(30, 144, 255),
            ObjectLabel::Truck => Rgba::from_rgb8(140, 70, 255),
            ObjectLabel::Bus => Rgba::from_rgb8(0, 206, 209),
            ObjectLabel::Trailer => Rgba::from_rgb8(255, 165, 0),
            ObjectLabel::Motorcycle => Rgba::from_rgb8(153, 50, 204),
            ObjectLabel::Bicycle => Rgba::from_rgb8(50, 205, 50),
            ObjectLabel::Pedestrian => Rgba::from_rgb8(255, 215, 0),
        }
    }
}

/// `hue` in degrees, `saturation` and `value` in [0, 1].
pub fn hsv_to_rgba(hue: f32, saturation: f32, value: f32) -> Rgba {
    let h = hue.rem_euclid(360.0) / 60.0;
    let c = value * saturation;
    let x = c * (1.0 - (h % 2.0 - 1.0).abs());
    let (r, g, b) = match h as u32 {
        0 => (c, x, 0.0),
        1 => (x, c, 0.0),
        2 => (0.0, c, x),
        3 => (0.0, x, c),
        4 => (x, 0.0, c),
        _ => (c, 0.0, x),
    };
    let m = value - c;
    Rgba::new(r + m, g + m, b + m, 1.0)
}
