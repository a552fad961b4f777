//! Viewport placement for aspect-preserving blits

/// Destination rectangle in output pixels, origin bottom-left
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Viewport {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl Viewport {
    /// Viewport covering the whole output
    pub fn full(width: u32, height: u32) -> Self {
        Self {
            x: 0,
            y: 0,
            width: width as i32,
            height: height as i32,
        }
    }
}

/// Fit a source of `src_w`x`src_h` inside the output, preserving aspect ratio
///
/// Whichever axis constrains wins, the other is letterboxed and the result is
/// centred. Each side is at least one pixel and never exceeds the output.
/// Zero-sized inputs fall back to the full output.
pub fn aspect_fit(src_w: u32, src_h: u32, out_w: u32, out_h: u32) -> Viewport {
    if src_w == 0 || src_h == 0 || out_w == 0 || out_h == 0 {
        return Viewport::full(out_w, out_h);
    }

    let (src_w, src_h, out_w, out_h) = (src_w as u64, src_h as u64, out_w as u64, out_h as u64);

    let (width, height) = if src_w * out_h <= out_w * src_h {
        // Height-limited
        ((src_w * out_h / src_h).clamp(1, out_w), out_h)
    } else {
        // Width-limited
        (out_w, (src_h * out_w / src_w).clamp(1, out_h))
    };

    Viewport {
        x: ((out_w - width) / 2) as i32,
        y: ((out_h - height) / 2) as i32,
        width: width as i32,
        height: height as i32,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_landscape_into_4_3() {
        let vp = aspect_fit(1920, 1080, 640, 480);
        assert_eq!(
            vp,
            Viewport {
                x: 0,
                y: 60,
                width: 640,
                height: 360
            }
        );
    }

    #[test]
    fn test_same_aspect_fills_output() {
        assert_eq!(aspect_fit(3840, 2160, 1920, 1080), Viewport::full(1920, 1080));
        assert_eq!(aspect_fit(320, 240, 640, 480), Viewport::full(640, 480));
    }

    #[test]
    fn test_square_is_pillarboxed() {
        let vp = aspect_fit(512, 512, 640, 480);
        assert_eq!((vp.width, vp.height), (480, 480));
        assert_eq!((vp.x, vp.y), (80, 0));
    }

    #[test]
    fn test_portrait_output() {
        let vp = aspect_fit(1920, 1080, 480, 640);
        assert_eq!((vp.width, vp.height), (480, 270));
        assert_eq!((vp.x, vp.y), (0, 185));
    }

    #[test]
    fn test_extreme_inputs_stay_in_bounds() {
        for (w, h) in [(1, 1000), (1000, 1), (1, 1), (7, 65535)] {
            let vp = aspect_fit(w, h, 640, 480);
            assert!(vp.width >= 1 && vp.height >= 1);
            assert!(vp.x >= 0 && vp.y >= 0);
            assert!(vp.x + vp.width <= 640);
            assert!(vp.y + vp.height <= 480);
            // centred within one pixel of rounding
            assert!((640 - vp.width - 2 * vp.x).abs() <= 1);
            assert!((480 - vp.height - 2 * vp.y).abs() <= 1);
        }
    }

    #[test]
    fn test_zero_source_uses_full_output() {
        assert_eq!(aspect_fit(0, 100, 640, 480), Viewport::full(640, 480));
    }
}
