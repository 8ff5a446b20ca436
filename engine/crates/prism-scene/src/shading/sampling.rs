use std::f32::consts::PI;

use glam::{Vec2, Vec3};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// 每个像素独立的随机数生成器，由 (frame, pixel) 决定
pub fn pixel_rng(frame_id: u64, pixel_index: u64) -> StdRng {
    StdRng::seed_from_u64(splitmix64(frame_id.wrapping_mul(0x9e37_79b9_7f4a_7c15) ^ pixel_index))
}

#[inline]
fn splitmix64(mut x: u64) -> u64 {
    x = x.wrapping_add(0x9e37_79b9_7f4a_7c15);
    x = (x ^ (x >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    x = (x ^ (x >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    x ^ (x >> 31)
}

#[inline]
pub fn random2d(rng: &mut StdRng) -> Vec2 {
    Vec2::new(rng.r#gen::<f32>(), rng.r#gen::<f32>())
}

/// 以 `n` 为 z 轴的正交基
pub fn orthonormal_basis(n: Vec3) -> (Vec3, Vec3) {
    // Duff et al. 2017
    let sign = 1.0f32.copysign(n.z);
    let a = -1.0 / (sign + n.z);
    let b = n.x * n.y * a;
    (
        Vec3::new(1.0 + sign * n.x * n.x * a, sign * b, -sign * n.x),
        Vec3::new(b, sign + n.y * n.y * a, -n.y),
    )
}

/// 局部坐标（z 为法线）转到世界坐标
#[inline]
pub fn to_world(local: Vec3, n: Vec3) -> Vec3 {
    let (t, b) = orthonormal_basis(n);
    t * local.x + b * local.y + n * local.z
}

/// 余弦加权的半球采样，pdf = cos / PI
pub fn cosine_sample_hemisphere(n: Vec3, u: Vec2) -> (Vec3, f32) {
    let r = u.x.sqrt();
    let phi = 2.0 * PI * u.y;
    let z = (1.0 - u.x).max(0.0).sqrt();
    let local = Vec3::new(r * phi.cos(), r * phi.sin(), z);
    (to_world(local, n).normalize(), z / PI)
}

#[inline]
pub fn cosine_hemisphere_pdf(n: Vec3, w: Vec3) -> f32 {
    n.dot(w).max(0.0) / PI
}

/// 单位球面上的均匀采样
pub fn uniform_sample_sphere(u: Vec2) -> Vec3 {
    let z = 1.0 - 2.0 * u.x;
    let r = (1.0 - z * z).max(0.0).sqrt();
    let phi = 2.0 * PI * u.y;
    Vec3::new(r * phi.cos(), r * phi.sin(), z)
}

/// MIS 的 balance heuristic
#[inline]
pub fn balance_heuristic(pdf_a: f32, pdf_b: f32) -> f32 {
    let sum = pdf_a + pdf_b;
    if sum <= 0.0 { 0.0 } else { pdf_a / sum }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basis_is_orthonormal() {
        for n in [Vec3::Z, Vec3::NEG_Z, Vec3::X, Vec3::new(0.3, -0.4, 0.5).normalize()] {
            let (t, b) = orthonormal_basis(n);
            assert!((t.length() - 1.0).abs() < 1e-5);
            assert!((b.length() - 1.0).abs() < 1e-5);
            assert!(t.dot(b).abs() < 1e-5 && t.dot(n).abs() < 1e-5 && b.dot(n).abs() < 1e-5);
        }
    }

    #[test]
    fn test_cosine_sample_pdf() {
        let mut rng = pixel_rng(3, 17);
        let n = Vec3::new(0.0, 1.0, 1.0).normalize();
        for _ in 0..64 {
            let (w, pdf) = cosine_sample_hemisphere(n, random2d(&mut rng));
            assert!(w.dot(n) >= 0.0);
            assert!((pdf - cosine_hemisphere_pdf(n, w)).abs() < 1e-4);
        }
    }

    #[test]
    fn test_pixel_rng_is_deterministic() {
        let a = random2d(&mut pixel_rng(5, 100));
        let b = random2d(&mut pixel_rng(5, 100));
        let c = random2d(&mut pixel_rng(6, 100));
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_balance_heuristic() {
        assert_eq!(balance_heuristic(1.0, 3.0), 0.25);
        assert_eq!(balance_heuristic(0.0, 0.0), 0.0);
        assert_eq!(balance_heuristic(2.0, 0.0), 1.0);
    }
}
