// SPDX-License-Identifier: GPL-3.0-only

//! Orientation and coordinate-space math
//!
//! Four coordinate spaces meet here:
//! - the container (view) in pixels, as laid out on screen
//! - the raw preview frame in pixels, as delivered by the sensor
//! - the rotated preview, i.e. the raw frame turned upright for the display
//! - the hardware's normalized focus space, `[-1000, 1000]` on both axes
//!
//! All angles are clockwise degrees in `{0, 90, 180, 270}`.

use super::types::{Facing, Rect, Size};
use crate::constants::{DEVICE_ROTATION_BUCKETS, focus_area};

/// Rotation to apply to a captured picture so it appears upright
pub fn capture_rotation(
    facing: Facing,
    orientation: u32,
    display_rotation: u32,
    device_rotation: u32,
) -> u32 {
    let o = orientation as i32;
    let d = display_rotation as i32;
    let correction = d - device_rotation as i32;
    let rotation = match facing {
        Facing::Front => (o + d).rem_euclid(360) - correction,
        Facing::Back => (o - d).rem_euclid(360) + correction,
    };
    rotation.rem_euclid(360) as u32
}

/// Rotation the hardware must apply to the preview for the current display
pub fn camera_display_orientation(facing: Facing, orientation: u32, display_rotation: u32) -> u32 {
    let o = orientation as i32;
    let d = display_rotation as i32;
    let rotation = match facing {
        // Front previews are mirrored, compensate
        Facing::Front => 360 - (o + d).rem_euclid(360),
        Facing::Back => o - d,
    };
    rotation.rem_euclid(360) as u32
}

/// Whether a preview rotated by `degrees` swaps width and height
pub fn is_perpendicular(degrees: u32) -> bool {
    degrees % 180 != 0
}

/// Map a raw sensor angle to a device rotation bucket
///
/// Negative angles mean the orientation is unknown and yield `None`.
pub fn device_rotation_for_angle(angle: i32) -> Option<u32> {
    if angle < 0 {
        return None;
    }
    let angle = angle.rem_euclid(360);
    let rotation = DEVICE_ROTATION_BUCKETS
        .iter()
        .find(|(range, _)| range.contains(&angle))
        .map(|(_, rotation)| *rotation)
        .unwrap_or(0);
    Some(rotation)
}

/// Scale-then-translate applied to the preview surface
///
/// Maps a point `p` of the surface to `p * scale + offset`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PreviewTransform {
    pub scale_x: f32,
    pub scale_y: f32,
    pub dx: f32,
    pub dy: f32,
}

impl PreviewTransform {
    pub const IDENTITY: Self = Self {
        scale_x: 1.0,
        scale_y: 1.0,
        dx: 0.0,
        dy: 0.0,
    };

    pub fn map(&self, x: f32, y: f32) -> (f32, f32) {
        (x * self.scale_x + self.dx, y * self.scale_y + self.dy)
    }
}

impl Default for PreviewTransform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

/// Centered crop transform making the preview fill the container
///
/// The surface is stretched to the container by the compositor; this
/// transform undoes the stretch along one axis so the preview keeps its
/// aspect ratio and overflows the container evenly on both sides.
pub fn preview_center_crop_transform(
    container: Size,
    preview: Size,
    rotated: bool,
) -> PreviewTransform {
    if container.is_empty() || preview.is_empty() {
        return PreviewTransform::IDENTITY;
    }
    let preview = if rotated { preview.rotated() } else { preview };
    let ratio_container = container.aspect_ratio() as f32;
    let ratio_preview = preview.aspect_ratio() as f32;

    let (scale_x, scale_y) = if ratio_container < ratio_preview {
        (ratio_preview / ratio_container, 1.0)
    } else {
        (1.0, ratio_container / ratio_preview)
    };

    let width = container.width as f32;
    let height = container.height as f32;
    PreviewTransform {
        scale_x,
        scale_y,
        dx: (width - width * scale_x) / 2.0,
        dy: (height - height * scale_y) / 2.0,
    }
}

/// Where the (upright) preview lands in container pixels under center crop
pub fn scale_preview(preview: Size, container: Size) -> Rect {
    let scaled = preview.scale_crop(container);
    let dx = (scaled.width as i32 - container.width as i32) / 2;
    let dy = (scaled.height as i32 - container.height as i32) / 2;
    Rect::new(-dx, -dy, scaled.width as i32 - dx, scaled.height as i32 - dy)
}

/// Remap a crop region from container pixels into preview pixels
///
/// `scaled_preview` is the preview rectangle in container space (see
/// [`scale_preview`]) and `preview` the upright preview size. A square input
/// stays square. Returns `None` for an empty region or a degenerate preview.
pub fn crop_rect_to_preview_space(crop: Rect, scaled_preview: Rect, preview: Size) -> Option<Rect> {
    if crop.is_empty() || scaled_preview.is_empty() {
        return None;
    }
    let crop = crop.offset_by(-scaled_preview.left, -scaled_preview.top);

    let sw = scaled_preview.width() as i64;
    let sh = scaled_preview.height() as i64;
    let pw = preview.width as i64;
    let ph = preview.height as i64;
    let map_x = |v: i32| (v as i64 * pw / sw) as i32;
    let map_y = |v: i32| (v as i64 * ph / sh) as i32;

    let mut result = Rect::new(
        map_x(crop.left),
        map_y(crop.top),
        map_x(crop.right),
        map_y(crop.bottom),
    );

    // Integer rounding may break squareness
    if crop.width() == crop.height() && result.width() != result.height() {
        let side = (result.width() + result.height()) / 2;
        result.right = result.left + side;
        result.bottom = result.top + side;
    }
    Some(result)
}

fn clamp_normalized(v: i32) -> i32 {
    v.clamp(focus_area::MIN, focus_area::MAX)
}

/// One counter-clockwise quarter turn within the `[0, 2000]` square
fn rotate_ccw_90(rect: Rect) -> Rect {
    let span = focus_area::MAX - focus_area::MIN;
    let clamp = |v: i32| v.clamp(0, span);
    let new_center_x = rect.center_y();
    let new_center_y = span - rect.center_x();
    let left = clamp(new_center_x - rect.height() / 2);
    let top = clamp(new_center_y - rect.width() / 2);
    let right = clamp(left + rect.height());
    let bottom = clamp(top + rect.width());
    Rect::new(left, top, right, bottom)
}

/// Map a tap on the preview surface to a hardware focus area
///
/// Returns `None` when the surface has no size.
pub fn tap_to_focus_region(x: f32, y: f32, surface: Size, orientation: u32) -> Option<Rect> {
    if surface.is_empty() {
        return None;
    }
    let area = focus_area::SIZE.max(focus_area::MIN_SIZE);
    let span = (focus_area::MAX - focus_area::MIN) as f32;

    let center_x = (x / surface.width as f32 * span + focus_area::MIN as f32) as i32;
    let center_y = (y / surface.height as f32 * span + focus_area::MIN as f32) as i32;
    let left = clamp_normalized(center_x - area / 2);
    let top = clamp_normalized(center_y - area / 2);
    let rect = Rect::new(
        left,
        top,
        clamp_normalized(left + area),
        clamp_normalized(top + area),
    );

    let turns = (orientation % 360) / 90;
    if turns == 0 {
        return Some(rect);
    }

    let mut rect = rect.offset_by(focus_area::MAX, focus_area::MAX);
    for _ in 0..turns {
        rect = rotate_ccw_90(rect);
    }
    Some(rect.offset_by(-focus_area::MAX, -focus_area::MAX))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capture_rotation_back_portrait() {
        assert_eq!(capture_rotation(Facing::Back, 90, 0, 0), 90);
    }

    #[test]
    fn test_capture_rotation_device_tilted() {
        // Display locked to portrait while the device is held landscape
        assert_eq!(capture_rotation(Facing::Back, 90, 0, 90), 0);
        assert_eq!(capture_rotation(Facing::Front, 270, 0, 90), 0);
    }

    #[test]
    fn test_rotation_results_are_normalized() {
        for facing in [Facing::Front, Facing::Back] {
            for o in [0, 90, 180, 270] {
                for d in [0, 90, 180, 270] {
                    for dev in [0, 90, 180, 270] {
                        let r = capture_rotation(facing, o, d, dev);
                        assert!(r < 360 && r % 90 == 0);
                        // A full turn of the display is a no-op
                        assert_eq!(r, capture_rotation(facing, o, d + 360, dev + 360));
                    }
                    let r = camera_display_orientation(facing, o, d);
                    assert!(r < 360 && r % 90 == 0);
                    assert_eq!(r, camera_display_orientation(facing, o + 360, d));
                }
            }
        }
    }

    #[test]
    fn test_camera_display_orientation() {
        assert_eq!(camera_display_orientation(Facing::Back, 90, 0), 90);
        assert_eq!(camera_display_orientation(Facing::Back, 90, 90), 0);
        assert_eq!(camera_display_orientation(Facing::Back, 90, 270), 180);
        assert_eq!(camera_display_orientation(Facing::Front, 270, 0), 90);
        assert_eq!(camera_display_orientation(Facing::Front, 270, 90), 0);
    }

    #[test]
    fn test_device_rotation_buckets() {
        assert_eq!(device_rotation_for_angle(-1), None);
        assert_eq!(device_rotation_for_angle(0), Some(0));
        assert_eq!(device_rotation_for_angle(59), Some(0));
        assert_eq!(device_rotation_for_angle(60), Some(270));
        assert_eq!(device_rotation_for_angle(180), Some(180));
        assert_eq!(device_rotation_for_angle(220), Some(90));
        assert_eq!(device_rotation_for_angle(300), Some(0));
        assert_eq!(device_rotation_for_angle(359), Some(0));
    }

    #[test]
    fn test_center_crop_transform_portrait_container() {
        // 1280x720 preview rotated to 720x1280 inside a 1080x1920 container
        let t = preview_center_crop_transform(Size::new(1080, 1920), Size::new(1280, 720), true);
        assert!((t.scale_x - 1.0).abs() < 1e-4);
        assert!((t.scale_y - 1.0).abs() < 1e-4);

        // 4:3 preview in a 9:16 container overflows horizontally
        let t = preview_center_crop_transform(Size::new(1080, 1920), Size::new(640, 480), true);
        assert!((t.scale_y - 1.0).abs() < 1e-6);
        assert!(t.scale_x > 1.0);
        let (left, _) = t.map(0.0, 0.0);
        let (right, _) = t.map(1080.0, 0.0);
        assert!((left + right - 1080.0).abs() < 1e-2, "preview must stay centered");
    }

    #[test]
    fn test_scale_preview_centers_overflow() {
        let rect = scale_preview(Size::new(480, 640), Size::new(1080, 1920));
        // 480x640 covers 1080x1920 at 1440x1920
        assert_eq!(rect, Rect::new(-180, 0, 1260, 1920));
    }

    #[test]
    fn test_crop_rect_identity_mapping() {
        let scaled = Rect::new(0, 0, 720, 1280);
        let crop = Rect::new(100, 200, 300, 400);
        let mapped = crop_rect_to_preview_space(crop, scaled, Size::new(720, 1280));
        assert_eq!(mapped, Some(crop));
    }

    #[test]
    fn test_crop_rect_keeps_square() {
        let scaled = scale_preview(Size::new(480, 640), Size::new(1080, 1920));
        let crop = Rect::from_origin(340, 760, 401, 401);
        let mapped = crop_rect_to_preview_space(crop, scaled, Size::new(480, 640)).unwrap();
        assert_eq!(mapped.width(), mapped.height());
        assert!(mapped.left >= 0 && mapped.right <= 480);
    }

    #[test]
    fn test_crop_rect_rejects_empty() {
        let scaled = Rect::new(0, 0, 720, 1280);
        assert_eq!(
            crop_rect_to_preview_space(Rect::new(10, 10, 10, 50), scaled, Size::new(720, 1280)),
            None
        );
    }

    #[test]
    fn test_tap_center_is_centered() {
        let rect = tap_to_focus_region(500.0, 1000.0, Size::new(1000, 2000), 0).unwrap();
        assert_eq!(rect.center_x(), 0);
        assert_eq!(rect.center_y(), 0);
        assert_eq!(rect.width(), focus_area::SIZE);
    }

    #[test]
    fn test_tap_center_stays_centered_under_rotation() {
        for orientation in [90, 180, 270] {
            let rect = tap_to_focus_region(500.0, 1000.0, Size::new(1000, 2000), orientation)
                .unwrap();
            assert_eq!((rect.center_x(), rect.center_y()), (0, 0), "{orientation}");
        }
    }

    #[test]
    fn test_tap_rotation_moves_corner() {
        // Top-left tap on a sensor mounted at 90 lands at the bottom-left
        let rect = tap_to_focus_region(0.0, 0.0, Size::new(1000, 1000), 90).unwrap();
        assert_eq!(rect.left, -1000);
        assert_eq!(rect.bottom, 1000);
        assert!(rect.top >= 900 - focus_area::SIZE);
    }

    #[test]
    fn test_tap_on_empty_surface() {
        assert_eq!(tap_to_focus_region(1.0, 1.0, Size::new(0, 10), 0), None);
    }
}
