// Lookup tables for 8-bit premultiplied "over".
//
// mult[(alpha << 8) | c] = (255 - alpha) * c / 255
// sat[v]                 = min(v, 255)   for v in 0..512

use std::fmt;
use std::sync::OnceLock;

pub struct BlendLut {
    mult: Vec<u8>,
    sat: Vec<u8>,
}

impl BlendLut {
    /// Process-wide tables, built on first use.
    pub fn shared() -> &'static BlendLut {
        static TABLES: OnceLock<BlendLut> = OnceLock::new();
        TABLES.get_or_init(BlendLut::build)
    }

    fn build() -> Self {
        let mult = (0..=255u32)
            .flat_map(|alpha| (0..=255u32).map(move |c| ((255 - alpha) * c / 255) as u8))
            .collect();
        let sat = (0..512u32).map(|v| v.min(255) as u8).collect();
        Self { mult, sat }
    }

    /// `front + back * (1 - front_alpha)` with saturation.
    #[inline]
    pub fn blend(&self, front: u8, back: u8, front_alpha: u8) -> u8 {
        let scaled = self.mult[(front_alpha as usize) << 8 | back as usize];
        self.sat[front as usize + scaled as usize]
    }
}

impl fmt::Debug for BlendLut {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BlendLut")
            .field("mult", &self.mult.len())
            .field("sat", &self.sat.len())
            .finish()
    }
}

/// Same result as [`BlendLut::blend`] without the tables.
#[inline]
pub fn blend_direct(front: u8, back: u8, front_alpha: u8) -> u8 {
    let scaled = (255 - front_alpha as u32) * back as u32 / 255;
    (front as u32 + scaled).min(255) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lut_matches_direct_arithmetic() {
        let lut = BlendLut::shared();
        for alpha in 0..=255u8 {
            for back in 0..=255u8 {
                for front in [0u8, 1, 64, 127, 128, 200, 254, 255, alpha] {
                    assert_eq!(
                        lut.blend(front, back, alpha),
                        blend_direct(front, back, alpha),
                        "front={front} back={back} alpha={alpha}"
                    );
                }
            }
        }
    }

    #[test]
    fn lut_matches_direct_arithmetic_over_every_front_back_pair() {
        let lut = BlendLut::shared();
        for alpha in [0u8, 1, 127, 128, 254, 255] {
            for front in 0..=255u8 {
                for back in 0..=255u8 {
                    assert_eq!(
                        lut.blend(front, back, alpha),
                        blend_direct(front, back, alpha),
                        "front={front} back={back} alpha={alpha}"
                    );
                }
            }
        }
    }

    #[test]
    fn opaque_front_hides_back() {
        assert_eq!(blend_direct(10, 250, 255), 10);
        assert_eq!(BlendLut::shared().blend(10, 250, 255), 10);
    }

    #[test]
    fn sums_saturate() {
        // 200 + 255 * 255 / 255 overflows a byte.
        assert_eq!(blend_direct(200, 255, 0), 255);
        assert_eq!(BlendLut::shared().blend(200, 255, 0), 255);
    }
}
