//! Point cloud generation

use bytemuck::{Pod, Zeroable};
use rand::Rng;

/// Radius of the sphere the points are sampled from
pub const CLOUD_RADIUS: f32 = 4.0;

/// GPU point data (16 bytes, matches `Particle` in particles.wgsl)
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct Particle {
    /// Rest position in the cloud's local frame
    pub position: [f32; 3],
    /// Random phase in [0, 1) for flow and color jitter
    pub seed: f32,
}

/// Fixed set of points, regenerated only when the count changes
#[derive(Debug, Clone)]
pub struct ParticleCloud {
    particles: Vec<Particle>,
}

impl ParticleCloud {
    pub fn generate(count: u32) -> Self {
        Self::generate_with(&mut rand::rng(), count)
    }

    /// Sample `count` points uniformly from the sphere volume
    pub fn generate_with<R: Rng>(rng: &mut R, count: u32) -> Self {
        let particles = (0..count)
            .map(|_| {
                // cbrt keeps the density uniform in volume rather than radius
                let r = CLOUD_RADIUS * rng.random::<f32>().cbrt();
                let cos_theta = rng.random_range(-1.0f32..=1.0);
                let sin_theta = (1.0 - cos_theta * cos_theta).max(0.0).sqrt();
                let phi = rng.random_range(0.0..std::f32::consts::TAU);

                Particle {
                    position: [
                        r * sin_theta * phi.cos(),
                        r * sin_theta * phi.sin(),
                        r * cos_theta,
                    ],
                    seed: rng.random::<f32>(),
                }
            })
            .collect();

        Self { particles }
    }

    pub fn particles(&self) -> &[Particle] {
        &self.particles
    }

    pub fn len(&self) -> usize {
        self.particles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.particles.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_particle_layout() {
        assert_eq!(std::mem::size_of::<Particle>(), 16);
    }

    #[test]
    fn test_points_inside_sphere() {
        let mut rng = StdRng::seed_from_u64(7);
        let cloud = ParticleCloud::generate_with(&mut rng, 6000);
        assert_eq!(cloud.len(), 6000);

        for p in cloud.particles() {
            let [x, y, z] = p.position;
            assert!((x * x + y * y + z * z).sqrt() <= CLOUD_RADIUS + 1e-4);
            assert!((0.0..1.0).contains(&p.seed));
        }
    }

    #[test]
    fn test_volume_is_filled_uniformly() {
        let mut rng = StdRng::seed_from_u64(11);
        let cloud = ParticleCloud::generate_with(&mut rng, 20_000);

        // Half the volume lies inside radius R / cbrt(2)
        let inner = CLOUD_RADIUS / 2f32.cbrt();
        let inside = cloud
            .particles()
            .iter()
            .filter(|p| {
                let [x, y, z] = p.position;
                (x * x + y * y + z * z).sqrt() < inner
            })
            .count();
        let fraction = inside as f32 / cloud.len() as f32;
        assert!((fraction - 0.5).abs() < 0.03, "fraction {}", fraction);
    }

    #[test]
    fn test_empty_cloud() {
        let cloud = ParticleCloud::generate(0);
        assert!(cloud.is_empty());
    }
}
