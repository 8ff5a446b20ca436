use glam::{IVec2, UVec2, Vec3};
use prism_renderer::render_pipeline::denoise_pass::{ExternalDenoiseImages, ExternalDenoiser};

/// 一个简单的联合双边盒式滤波，作为外部降噪器的示例
///
/// 只混合 albedo 与法线都接近的邻居，避免模糊几何边缘。
pub struct BoxDenoiser {
    pub radius: i32,
    pub normal_threshold: f32,
    pub albedo_threshold: f32,
}
impl Default for BoxDenoiser {
    fn default() -> Self {
        Self {
            radius: 2,
            normal_threshold: 0.9,
            albedo_threshold: 0.1,
        }
    }
}
impl ExternalDenoiser for BoxDenoiser {
    fn name(&self) -> &str {
        "box-denoiser"
    }

    fn denoise(&mut self, images: &mut ExternalDenoiseImages) -> anyhow::Result<()> {
        let _span = tracy_client::span!("BoxDenoiser::denoise");
        if self.radius < 0 {
            anyhow::bail!("invalid filter radius: {}", self.radius);
        }

        let extent = images.extent();
        for y in 0..extent.y {
            for x in 0..extent.x {
                let pixel = UVec2::new(x, y);
                let value = self.filter_pixel(images, pixel);
                images.output.store(pixel, value);
            }
        }
        Ok(())
    }
}
impl BoxDenoiser {
    fn filter_pixel(&self, images: &ExternalDenoiseImages, pixel: UVec2) -> Vec3 {
        let center_normal = images.normal.load(pixel);
        let center_albedo = images.albedo.load(pixel);

        let mut sum = Vec3::ZERO;
        let mut count = 0.0;
        for dy in -self.radius..=self.radius {
            for dx in -self.radius..=self.radius {
                let tap = pixel.as_ivec2() + IVec2::new(dx, dy);
                let (Some(color), Some(normal), Some(albedo)) = (
                    images.color.try_load(tap.x, tap.y),
                    images.normal.try_load(tap.x, tap.y),
                    images.albedo.try_load(tap.x, tap.y),
                ) else {
                    continue;
                };
                if normal.dot(center_normal) < self.normal_threshold
                    || (albedo - center_albedo).abs().max_element() > self.albedo_threshold
                {
                    continue;
                }
                sum += color;
                count += 1.0;
            }
        }

        // 中心像素总是满足条件
        if count > 0.0 { sum / count } else { images.color.load(pixel) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_respects_normal_edges() {
        let mut images = ExternalDenoiseImages::new(UVec2::new(4, 1));
        images.albedo.clear(Vec3::ONE);
        for (x, normal, color) in [(0, Vec3::Z, 1.0), (1, Vec3::Z, 3.0), (2, Vec3::X, 10.0), (3, Vec3::X, 20.0)] {
            images.normal.store(UVec2::new(x, 0), normal);
            images.color.store(UVec2::new(x, 0), Vec3::splat(color));
        }

        let mut denoiser = BoxDenoiser {
            radius: 1,
            ..Default::default()
        };
        denoiser.denoise(&mut images).unwrap();
        assert_eq!(images.output.load(UVec2::new(0, 0)), Vec3::splat(2.0));
        assert_eq!(images.output.load(UVec2::new(1, 0)), Vec3::splat(2.0));
        assert_eq!(images.output.load(UVec2::new(2, 0)), Vec3::splat(15.0));

        denoiser.radius = -1;
        assert!(denoiser.denoise(&mut images).is_err());
    }
}
