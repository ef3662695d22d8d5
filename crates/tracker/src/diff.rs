//! Visual comparison of two captured artifacts.
//!
//! Images are decoded to RGBA and compared pixel by pixel. Captures of
//! different sizes count as different: a page that grew or shrank changed.

use image::RgbaImage;

use crate::{Error, Result};

/// Axis-aligned box enclosing every differing pixel (inclusive bounds).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bounds {
    pub left: u32,
    pub top: u32,
    pub right: u32,
    pub bottom: u32,
}

impl Bounds {
    pub fn width(&self) -> u32 {
        self.right - self.left + 1
    }

    pub fn height(&self) -> u32 {
        self.bottom - self.top + 1
    }
}

/// Decode an encoded image (PNG, JPEG or WebP).
///
/// `label` names the side being decoded in the error.
pub fn decode(bytes: &[u8], label: &str) -> Result<RgbaImage> {
    image::load_from_memory(bytes)
        .map(|img| img.to_rgba8())
        .map_err(|e| Error::artifact_unreadable(label, e))
}

/// Result of comparing two captures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Change {
    None,
    /// The page was rendered at a different size.
    Resized { from: (u32, u32), to: (u32, u32) },
    /// Same size, pixels differ inside `Bounds`.
    Region(Bounds),
}

impl Change {
    pub fn is_change(&self) -> bool {
        !matches!(self, Self::None)
    }
}

/// Compare two encoded images.
pub fn compare(previous: &[u8], current: &[u8]) -> Result<Change> {
    let previous = decode(previous, "previous")?;
    let current = decode(current, "current")?;
    if previous.dimensions() != current.dimensions() {
        return Ok(Change::Resized {
            from: previous.dimensions(),
            to: current.dimensions(),
        });
    }
    if previous.as_raw() == current.as_raw() {
        return Ok(Change::None);
    }
    Ok(difference_bounds(&previous, &current).map_or(Change::None, Change::Region))
}

/// Whether two encoded images differ visually.
///
/// Symmetric, and `differs(a, a)` is always `false` for decodable input.
pub fn differs(previous: &[u8], current: &[u8]) -> Result<bool> {
    compare(previous, current).map(|c| c.is_change())
}

/// Bounding box of the changed region between two same-sized images.
///
/// `None` when the images are identical or their dimensions differ.
pub fn difference_bounds(a: &RgbaImage, b: &RgbaImage) -> Option<Bounds> {
    if a.dimensions() != b.dimensions() {
        return None;
    }
    let mut bounds: Option<Bounds> = None;
    for (x, y, pa) in a.enumerate_pixels() {
        if pa == b.get_pixel(x, y) {
            continue;
        }
        bounds = Some(match bounds {
            None => Bounds {
                left: x,
                top: y,
                right: x,
                bottom: y,
            },
            Some(bb) => Bounds {
                left: bb.left.min(x),
                top: bb.top.min(y),
                right: bb.right.max(x),
                bottom: bb.bottom.max(y),
            },
        });
    }
    bounds
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {
        super::*,
        image::{ImageFormat, Rgba},
        rstest::rstest,
        std::io::Cursor,
    };

    fn png(width: u32, height: u32, paint: impl Fn(u32, u32) -> [u8; 4]) -> Vec<u8> {
        let img = RgbaImage::from_fn(width, height, |x, y| Rgba(paint(x, y)));
        let mut out = Cursor::new(Vec::new());
        img.write_to(&mut out, ImageFormat::Png).unwrap();
        out.into_inner()
    }

    fn white(_: u32, _: u32) -> [u8; 4] {
        [255, 255, 255, 255]
    }

    /// White `width`x`height` page, optionally with one black pixel.
    fn page(width: u32, height: u32, dot: Option<(u32, u32)>) -> Vec<u8> {
        png(width, height, |x, y| {
            if Some((x, y)) == dot {
                [0, 0, 0, 255]
            } else {
                [255, 255, 255, 255]
            }
        })
    }

    #[rstest]
    #[case::identical((16, 16, None), (16, 16, None), false)]
    #[case::one_pixel((16, 16, None), (16, 16, Some((3, 9))), true)]
    #[case::one_pixel_reversed((16, 16, Some((3, 9))), (16, 16, None), true)]
    #[case::pixel_moved((16, 16, Some((0, 0))), (16, 16, Some((15, 15))), true)]
    #[case::taller((16, 16, None), (16, 20, None), true)]
    #[case::narrower((16, 20, None), (12, 20, None), true)]
    fn differs_matches_pixels(
        #[case] previous: (u32, u32, Option<(u32, u32)>),
        #[case] current: (u32, u32, Option<(u32, u32)>),
        #[case] expected: bool,
    ) {
        let a = page(previous.0, previous.1, previous.2);
        let b = page(current.0, current.1, current.2);
        assert_eq!(differs(&a, &b).unwrap(), expected);
        assert_eq!(differs(&b, &a).unwrap(), expected);
    }

    #[rstest]
    #[case::garbage_previous(b"not an image".to_vec(), page(4, 4, None), "previous")]
    #[case::truncated_current(page(4, 4, None), vec![0x89, b'P', b'N', b'G'], "current")]
    #[case::empty_current(page(4, 4, None), Vec::new(), "current")]
    fn corrupt_input_is_unreadable(
        #[case] previous: Vec<u8>,
        #[case] current: Vec<u8>,
        #[case] label: &str,
    ) {
        let err = differs(&previous, &current).unwrap_err();
        assert!(
            matches!(&err, Error::ArtifactUnreadable { artifact, .. } if artifact == label),
            "{err}"
        );
    }

    #[test]
    fn bounds_cover_every_changed_pixel() {
        let a = RgbaImage::from_pixel(10, 10, Rgba([0, 0, 0, 255]));
        let mut b = a.clone();
        b.put_pixel(2, 7, Rgba([1, 0, 0, 255]));
        b.put_pixel(6, 3, Rgba([1, 0, 0, 255]));

        let bounds = difference_bounds(&a, &b).unwrap();
        assert_eq!(
            bounds,
            Bounds {
                left: 2,
                top: 3,
                right: 6,
                bottom: 7
            }
        );
        assert_eq!((bounds.width(), bounds.height()), (5, 5));
        assert!(difference_bounds(&a, &a).is_none());
    }

    #[test]
    fn compare_reports_kind_of_change() {
        let a = png(8, 8, white);
        let b = png(8, 8, |x, _| if x == 0 { [0, 0, 0, 255] } else { [255; 4] });
        let c = png(8, 4, white);

        assert_eq!(compare(&a, &a).unwrap(), Change::None);
        assert!(matches!(compare(&a, &b).unwrap(), Change::Region(bb) if bb.width() == 1 && bb.height() == 8));
        assert_eq!(
            compare(&a, &c).unwrap(),
            Change::Resized {
                from: (8, 8),
                to: (8, 4)
            }
        );
    }
}
