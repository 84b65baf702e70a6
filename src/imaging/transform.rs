/// Rotates a square `side × side` image by `angle_deg` about its center.
///
/// Each destination pixel is mapped back into the source and sampled
/// bilinearly; samples landing outside the source are zero.
pub fn rotate_bilinear(src: &[f32], dst: &mut [f32], side: usize, angle_deg: f32) {
    debug_assert_eq!(src.len(), side * side);
    debug_assert_eq!(dst.len(), side * side);
    let c = (side as f32 - 1.0) / 2.0;
    let (sin_a, cos_a) = angle_deg.to_radians().sin_cos();

    for y in 0..side {
        for x in 0..side {
            let u = x as f32 - c;
            let v = y as f32 - c;
            // inverse rotation
            let sx = u * cos_a + v * sin_a + c;
            let sy = -u * sin_a + v * cos_a + c;
            dst[y * side + x] = sample_bilinear(src, side, sx, sy);
        }
    }
}

fn sample_bilinear(src: &[f32], side: usize, x: f32, y: f32) -> f32 {
    const EDGE_TOL: f32 = 1e-3;
    let max = side as f32 - 1.0;
    if x < -EDGE_TOL || y < -EDGE_TOL || x > max + EDGE_TOL || y > max + EDGE_TOL {
        return 0.0;
    }
    let x = x.clamp(0.0, max);
    let y = y.clamp(0.0, max);
    let x0 = x.floor() as usize;
    let y0 = y.floor() as usize;
    let x1 = (x0 + 1).min(side - 1);
    let y1 = (y0 + 1).min(side - 1);
    let fx = x - x0 as f32;
    let fy = y - y0 as f32;

    let top = src[y0 * side + x0] * (1.0 - fx) + src[y0 * side + x1] * fx;
    let bottom = src[y1 * side + x0] * (1.0 - fx) + src[y1 * side + x1] * fx;
    top * (1.0 - fy) + bottom * fy
}

/// Bilinear resize of a square float image into `dst` (`out_side²` values).
///
/// Destination pixel centers are mapped onto the source grid and sampled
/// from their four neighbours, clamped at the border.
pub fn resize_bilinear(src: &[f32], side: usize, dst: &mut [f32], out_side: usize) {
    debug_assert_eq!(src.len(), side * side);
    debug_assert_eq!(dst.len(), out_side * out_side);
    if side == 0 || out_side == 0 {
        dst.fill(0.0);
        return;
    }
    let scale = side as f32 / out_side as f32;
    let max = side as f32 - 1.0;
    for y in 0..out_side {
        let sy = ((y as f32 + 0.5) * scale - 0.5).clamp(0.0, max);
        for x in 0..out_side {
            let sx = ((x as f32 + 0.5) * scale - 0.5).clamp(0.0, max);
            dst[y * out_side + x] = sample_bilinear(src, side, sx, sy);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_rotate_zero_is_identity() {
        let src: Vec<f32> = (0..25).map(|v| v as f32).collect();
        let mut dst = vec![0.0; 25];
        rotate_bilinear(&src, &mut dst, 5, 0.0);
        for (a, b) in src.iter().zip(&dst) {
            assert_relative_eq!(a, b, epsilon = 1e-4);
        }
    }

    #[test]
    fn test_rotate_quarter_turn_moves_corner() {
        let mut src = vec![0.0; 9];
        src[0] = 1.0; // top-left
        let mut dst = vec![0.0; 9];
        rotate_bilinear(&src, &mut dst, 3, 90.0);
        let total: f32 = dst.iter().sum();
        assert_relative_eq!(total, 1.0, epsilon = 1e-4);
        assert_relative_eq!(dst[0], 0.0, epsilon = 1e-4);
        // the single bright pixel lands on another corner
        let corners = [dst[2], dst[6], dst[8]];
        assert!(corners.iter().any(|&v| (v - 1.0).abs() < 1e-4));
    }

    #[test]
    fn test_rotate_keeps_centered_disk_populated() {
        let side = 21;
        let c = 10.0;
        let src: Vec<f32> = (0..side * side)
            .map(|i| {
                let (x, y) = ((i % side) as f32, (i / side) as f32);
                if (x - c).powi(2) + (y - c).powi(2) <= 16.0 { 1.0 } else { 0.0 }
            })
            .collect();
        let mut dst = vec![0.0; side * side];
        rotate_bilinear(&src, &mut dst, side, 37.0);
        assert_relative_eq!(dst[10 * side + 10], 1.0, epsilon = 1e-4);
        assert_relative_eq!(dst[0], 0.0, epsilon = 1e-4);
    }

    #[test]
    fn test_resize_constant_image_stays_constant() {
        let src = vec![0.25f32; 49];
        let mut dst = vec![0.0; 19 * 19];
        resize_bilinear(&src, 7, &mut dst, 19);
        for v in dst {
            assert_relative_eq!(v, 0.25, epsilon = 1e-4);
        }
    }

    #[test]
    fn test_resize_keeps_values_above_unit_range() {
        // left half 0, right half 200
        let side = 8;
        let src: Vec<f32> = (0..side * side)
            .map(|i| if i % side >= side / 2 { 200.0 } else { 0.0 })
            .collect();
        let mut dst = vec![0.0; 16];
        resize_bilinear(&src, side, &mut dst, 4);
        assert_relative_eq!(dst[3], 200.0, epsilon = 1e-3);
        assert_relative_eq!(dst[0], 0.0, epsilon = 1e-3);
        assert!(dst.iter().all(|&v| (0.0..=200.0).contains(&v)));
    }

    #[test]
    fn test_resize_samples_four_neighbours() {
        // 2x2 -> 3x3: the middle pixel maps to the center of the source
        let src = [0.0, 10.0, 20.0, 30.0];
        let mut dst = [0.0; 9];
        resize_bilinear(&src, 2, &mut dst, 3);
        assert_relative_eq!(dst[4], 15.0, epsilon = 1e-4);
        // corners clamp onto source corners
        assert_relative_eq!(dst[0], 0.0, epsilon = 1e-4);
        assert_relative_eq!(dst[8], 30.0, epsilon = 1e-4);
    }

    #[test]
    fn test_resize_downscale_interpolates_between_two_pixels() {
        // 27 -> 19 over a horizontal ramp: each output is a plain
        // interpolation of its two nearest source columns
        let side = 27;
        let src: Vec<f32> = (0..side * side).map(|i| (i % side) as f32).collect();
        let mut dst = vec![0.0; 19 * 19];
        resize_bilinear(&src, side, &mut dst, 19);
        for x in 0..19 {
            let expected = ((x as f32 + 0.5) * 27.0 / 19.0 - 0.5).clamp(0.0, 26.0);
            assert_relative_eq!(dst[5 * 19 + x], expected, epsilon = 1e-3);
        }
    }
}
