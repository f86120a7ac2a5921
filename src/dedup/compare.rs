//! # 像素比较模块
//!
//! ## 设计思路
//!
//! 单通道容差吸收有损重编码带来的噪声，整体匹配比例阈值吸收水印、轻微裁切等局部改动。
//! 这是启发式判断，不是密码学意义上的判等，边界附近的误判是预期内的。
//!
//! 尺寸不同的两张缩略图一律视为不同图片。

use super::DuplicateCheckConfig;
use super::source::PixelBuffer;

/// 比较策略：单通道容差 + 相似度阈值。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MatchPolicy {
    pub channel_tolerance: u8,
    pub similarity_threshold: f64,
}

impl Default for MatchPolicy {
    fn default() -> Self {
        Self::from(&DuplicateCheckConfig::default())
    }
}

impl From<&DuplicateCheckConfig> for MatchPolicy {
    fn from(config: &DuplicateCheckConfig) -> Self {
        Self {
            channel_tolerance: config.channel_tolerance,
            similarity_threshold: config.similarity_threshold,
        }
    }
}

/// 计算匹配像素占比；尺寸不同返回 `None`。
pub fn similarity(a: &PixelBuffer, b: &PixelBuffer, channel_tolerance: u8) -> Option<f64> {
    if a.dimensions() != b.dimensions() {
        return None;
    }

    let matching = a
        .pixels()
        .chunks_exact(4)
        .zip(b.pixels().chunks_exact(4))
        .filter(|(pa, pb)| {
            pa[..3]
                .iter()
                .zip(&pb[..3])
                .all(|(ca, cb)| ca.abs_diff(*cb) <= channel_tolerance)
        })
        .count();

    Some(matching as f64 / a.pixel_count() as f64)
}

/// 判断两张缩略图是否为同一张图。
pub fn compare(a: &PixelBuffer, b: &PixelBuffer, policy: &MatchPolicy) -> bool {
    similarity(a, b, policy.channel_tolerance)
        .is_some_and(|ratio| ratio >= policy.similarity_threshold)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn solid(width: u32, height: u32, rgba: [u8; 4]) -> PixelBuffer {
        let pixels = rgba.repeat((width * height) as usize);
        PixelBuffer::new(width, height, pixels).expect("valid buffer")
    }

    #[test]
    fn identical_buffers_match() {
        let a = solid(10, 10, [10, 20, 30, 255]);
        assert!(compare(&a, &a, &MatchPolicy::default()));
    }

    #[test]
    fn different_shapes_never_match() {
        let a = solid(10, 5, [0, 0, 0, 255]);
        let b = solid(5, 10, [0, 0, 0, 255]);
        assert!(!compare(&a, &b, &MatchPolicy::default()));
        assert_eq!(similarity(&a, &b, 255), None);
    }

    #[test]
    fn alpha_channel_is_ignored() {
        let a = solid(4, 4, [100, 100, 100, 0]);
        let b = solid(4, 4, [100, 100, 100, 255]);
        assert!(compare(&a, &b, &MatchPolicy::default()));
    }

    #[test]
    fn difference_just_above_tolerance_breaks_match() {
        let policy = MatchPolicy::default();
        let a = solid(4, 4, [100, 100, 100, 255]);
        let within = solid(4, 4, [100 + policy.channel_tolerance, 100, 100, 255]);
        let beyond = solid(4, 4, [101 + policy.channel_tolerance, 100, 100, 255]);

        assert!(compare(&a, &within, &policy));
        assert!(!compare(&a, &beyond, &policy));
    }

    #[test]
    fn threshold_boundary_is_inclusive() {
        // 100 个像素中 99 个一致，恰好等于 0.99 阈值。
        let a = solid(10, 10, [50, 50, 50, 255]);
        let mut pixels = a.pixels().to_vec();
        pixels[0] = 200;
        let b = PixelBuffer::new(10, 10, pixels).expect("valid buffer");

        let policy = MatchPolicy {
            channel_tolerance: 5,
            similarity_threshold: 0.99,
        };
        assert!(compare(&a, &b, &policy));
        assert_eq!(similarity(&a, &b, 5), Some(0.99));
    }

    fn buffer_strategy() -> impl Strategy<Value = PixelBuffer> {
        (1u32..12, 1u32..12).prop_flat_map(|(w, h)| {
            prop::collection::vec(any::<u8>(), (w * h * 4) as usize)
                .prop_map(move |pixels| PixelBuffer::new(w, h, pixels).expect("sized buffer"))
        })
    }

    proptest! {
        #[test]
        fn compare_is_reflexive(a in buffer_strategy(), tolerance in 0u8..=20) {
            let policy = MatchPolicy { channel_tolerance: tolerance, similarity_threshold: 0.99 };
            prop_assert!(compare(&a, &a, &policy));
        }

        #[test]
        fn shape_mismatch_is_never_a_match(
            a in buffer_strategy(),
            b in buffer_strategy(),
        ) {
            prop_assume!(a.dimensions() != b.dimensions());
            let policy = MatchPolicy { channel_tolerance: 255, similarity_threshold: 0.0 };
            prop_assert!(!compare(&a, &b, &policy));
        }

        #[test]
        fn perturbation_within_tolerance_matches(
            a in buffer_strategy(),
            tolerance in 1u8..=10,
            seed in any::<u64>(),
        ) {
            let mut state = seed;
            let perturbed: Vec<u8> = a
                .pixels()
                .iter()
                .map(|&value| {
                    state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
                    let delta = ((state >> 33) % (tolerance as u64 + 1)) as u8;
                    if state & 1 == 0 { value.saturating_add(delta) } else { value.saturating_sub(delta) }
                })
                .collect();
            let b = PixelBuffer::new(a.width(), a.height(), perturbed).expect("sized buffer");

            let policy = MatchPolicy { channel_tolerance: tolerance, similarity_threshold: 0.99 };
            prop_assert!(compare(&a, &b, &policy));
        }

        #[test]
        fn too_many_differing_pixels_do_not_match(
            a in buffer_strategy(),
            threshold in 0.9f64..0.99,
        ) {
            let policy = MatchPolicy { channel_tolerance: 5, similarity_threshold: threshold };
            let total = a.pixel_count();
            // 改动像素数严格大于 (1 - threshold) * total。
            let changed = (((1.0 - threshold) * total as f64).floor() as usize + 1).min(total);

            let mut pixels = a.pixels().to_vec();
            for pixel in pixels.chunks_exact_mut(4).take(changed) {
                pixel[0] = if pixel[0] < 128 { 255 } else { 0 };
            }
            let b = PixelBuffer::new(a.width(), a.height(), pixels).expect("sized buffer");

            prop_assert!(!compare(&a, &b, &policy));
        }
    }
}
