/*
 * Geometry Module
 *
 * Periodic (toroidal) field geometry. The field is a rectangle whose edges
 * wrap to the opposite edge, so the shortest vector between two agents may
 * cross a boundary. The minimum-image search compares the direct vector with
 * the eight neighbouring tiles of the home tile.
 */

use nannou::prelude::{pt2, vec2, Point2, Vec2};
use rand::Rng;
use rand_distr::{Distribution, Normal};

use crate::error::{ConfigError, ValidationError};

/// Speeds below this snap to exactly zero after integration.
pub const SPEED_SNAP_EPSILON: f32 = 1e-3;

// Tile offsets (in field widths/heights) of the eight images of the origin
// point. The order is part of the contract: ties keep the earliest candidate.
const IMAGE_OFFSETS: [(f32, f32); 8] = [
    (1.0, 1.0),
    (1.0, 0.0),
    (1.0, -1.0),
    (0.0, 1.0),
    (0.0, -1.0),
    (-1.0, 1.0),
    (-1.0, 0.0),
    (-1.0, -1.0),
];

/// Rectangular periodic domain.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FieldBounds {
    pub x_min: f32,
    pub x_max: f32,
    pub y_min: f32,
    pub y_max: f32,
}

impl FieldBounds {
    pub fn new(x_min: f32, x_max: f32, y_min: f32, y_max: f32) -> Result<Self, ConfigError> {
        let finite = x_min.is_finite() && x_max.is_finite() && y_min.is_finite() && y_max.is_finite();
        // A zero-width field cannot wrap anything, so it is rejected with the inverted ones
        if !finite || x_max <= x_min || y_max <= y_min {
            return Err(ConfigError::InvalidBounds { x_min, x_max, y_min, y_max });
        }
        Ok(Self { x_min, x_max, y_min, y_max })
    }

    /// Square field `[-half_extent, half_extent]` on both axes.
    pub fn symmetric(half_extent: f32) -> Result<Self, ConfigError> {
        Self::new(-half_extent, half_extent, -half_extent, half_extent)
    }

    #[inline]
    pub fn width(&self) -> f32 {
        self.x_max - self.x_min
    }

    #[inline]
    pub fn height(&self) -> f32 {
        self.y_max - self.y_min
    }

    pub fn diagonal(&self) -> f32 {
        self.width().hypot(self.height())
    }

    pub fn center(&self) -> Point2 {
        pt2(
            0.5 * (self.x_min + self.x_max),
            0.5 * (self.y_min + self.y_max),
        )
    }

    pub fn contains(&self, p: Point2) -> bool {
        p.x >= self.x_min && p.x <= self.x_max && p.y >= self.y_min && p.y <= self.y_max
    }

    /// Single-wrap correction: a coordinate past one edge re-enters from the
    /// other. Assumes the point is less than one field size outside.
    pub fn wrap(&self, mut p: Point2) -> Point2 {
        if p.x > self.x_max {
            p.x -= self.width();
        } else if p.x < self.x_min {
            p.x += self.width();
        }

        if p.y > self.y_max {
            p.y -= self.height();
        } else if p.y < self.y_min {
            p.y += self.height();
        }

        p
    }

    /// Periodic reduction for points any number of field sizes away.
    pub fn wrap_fully(&self, p: Point2) -> Point2 {
        if self.contains(p) {
            return p;
        }
        let fold = |v: f32, min: f32, max: f32, size: f32| (min + (v - min).rem_euclid(size)).clamp(min, max);
        pt2(
            fold(p.x, self.x_min, self.x_max, self.width()),
            fold(p.y, self.y_min, self.y_max, self.height()),
        )
    }
}

/// Split a vector into unit direction and magnitude. The zero vector (and
/// anything non-finite) gives `(Vec2::ZERO, 0.0)`.
///
/// The vector is scaled by its largest component first, so the direction
/// survives components whose squares overflow `f32`. The magnitude of such a
/// vector is `f32::INFINITY`.
pub fn normalize(v: Vec2) -> (Vec2, f32) {
    if !v.is_finite() {
        return (Vec2::ZERO, 0.0);
    }
    let scale = v.abs().max_element();
    if scale == 0.0 {
        return (Vec2::ZERO, 0.0);
    }
    let unit = v / scale;
    let length = unit.length();
    (unit / length, scale * length)
}

/// Build a 2-D vector from an externally supplied slice (input devices,
/// config files). Wrong length or non-finite components are rejected.
pub fn vector_from_slice(values: &[f32]) -> Result<Vec2, ValidationError> {
    if values.len() != 2 {
        return Err(ValidationError::DimensionMismatch {
            expected: 2,
            got: values.len(),
        });
    }
    let v = vec2(values[0], values[1]);
    ensure_finite("vector", v)?;
    Ok(v)
}

pub fn ensure_finite(what: &'static str, v: Vec2) -> Result<(), ValidationError> {
    for (index, value) in [v.x, v.y].into_iter().enumerate() {
        if !value.is_finite() {
            return Err(ValidationError::NonFiniteInput { what, index, value });
        }
    }
    Ok(())
}

/// Minimum-distance vector from `from` to `to` on the torus.
pub fn displacement(from: Point2, to: Point2, bounds: &FieldBounds) -> Result<Vec2, ValidationError> {
    ensure_finite("displacement origin", from)?;
    ensure_finite("displacement target", to)?;
    Ok(nearest_image(from, to, bounds))
}

/// Like [`displacement`], but the target is first blurred per axis by
/// zero-mean Gaussian noise of standard deviation `noise_sigma`.
pub fn perceived_displacement<R: Rng + ?Sized>(
    from: Point2,
    to: Point2,
    bounds: &FieldBounds,
    noise_sigma: f32,
    rng: &mut R,
) -> Result<Vec2, ValidationError> {
    ensure_finite("displacement origin", from)?;
    ensure_finite("displacement target", to)?;
    let target = perturb(to, noise_sigma, rng)?;
    Ok(nearest_image(from, target, bounds))
}

/// Surface-to-surface separation; negative when the discs overlap.
pub fn distance(
    from: Point2,
    to: Point2,
    bounds: &FieldBounds,
    radius_a: f32,
    radius_b: f32,
) -> Result<f32, ValidationError> {
    Ok(displacement(from, to, bounds)?.length() - radius_a - radius_b)
}

pub fn perceived_distance<R: Rng + ?Sized>(
    from: Point2,
    to: Point2,
    bounds: &FieldBounds,
    noise_sigma: f32,
    radius_a: f32,
    radius_b: f32,
    rng: &mut R,
) -> Result<f32, ValidationError> {
    Ok(perceived_displacement(from, to, bounds, noise_sigma, rng)?.length() - radius_a - radius_b)
}

/// Signed angle in degrees from `heading` to `direction`, in (-180, 180].
/// `None` when either vector is degenerate.
pub fn relative_bearing_deg(heading: Vec2, direction: Vec2) -> Option<f32> {
    let (h, _) = normalize(heading);
    let (d, _) = normalize(direction);
    if h == Vec2::ZERO || d == Vec2::ZERO {
        return None;
    }
    let cross = h.x * d.y - h.y * d.x;
    let dot = h.dot(d);
    Some(cross.atan2(dot).to_degrees())
}

fn perturb<R: Rng + ?Sized>(p: Point2, sigma: f32, rng: &mut R) -> Result<Point2, ValidationError> {
    if !sigma.is_finite() || sigma < 0.0 {
        return Err(ValidationError::InvalidArgument {
            what: "perception noise sigma",
            value: sigma,
        });
    }
    if sigma == 0.0 {
        return Ok(p);
    }
    let noise = Normal::new(0.0f32, sigma).map_err(|_| ValidationError::InvalidArgument {
        what: "perception noise sigma",
        value: sigma,
    })?;
    Ok(pt2(p.x + noise.sample(rng), p.y + noise.sample(rng)))
}

fn nearest_image(from: Point2, to: Point2, bounds: &FieldBounds) -> Vec2 {
    let direct = to - from;
    let mut best = direct;
    let mut best_norm = direct.length();

    // Shorter than half of the narrower side means no component can wrap
    if best_norm < 0.5 * bounds.width().min(bounds.height()) {
        return best;
    }

    let (w, h) = (bounds.width(), bounds.height());
    for (sx, sy) in IMAGE_OFFSETS {
        let image = pt2(from.x + sx * w, from.y + sy * h);
        let candidate = to - image;
        let norm = candidate.length();
        if norm < best_norm {
            best = candidate;
            best_norm = norm;
        }
    }

    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn field() -> FieldBounds {
        FieldBounds::symmetric(100.0).unwrap()
    }

    #[test]
    fn direct_vector_when_close() {
        let d = displacement(pt2(1.0, 2.0), pt2(4.0, -2.0), &field()).unwrap();
        assert_eq!(d, vec2(3.0, -4.0));
    }

    #[test]
    fn wraps_across_the_x_edge() {
        let d = displacement(pt2(-95.0, 0.0), pt2(95.0, 0.0), &field()).unwrap();
        assert_abs_diff_eq!(d.x, -10.0, epsilon = 1e-4);
        assert_abs_diff_eq!(d.y, 0.0, epsilon = 1e-4);
    }

    #[test]
    fn wraps_across_a_corner() {
        let d = displacement(pt2(-98.0, -98.0), pt2(98.0, 98.0), &field()).unwrap();
        assert_abs_diff_eq!(d.x, -4.0, epsilon = 1e-4);
        assert_abs_diff_eq!(d.y, -4.0, epsilon = 1e-4);
    }

    #[test]
    fn wraps_even_inside_half_diagonal() {
        // 130 apart is under half the diagonal (~141) but the wrapped path is 70
        let d = displacement(pt2(-65.0, 0.0), pt2(65.0, 0.0), &field()).unwrap();
        assert_abs_diff_eq!(d.length(), 70.0, epsilon = 1e-4);
    }

    #[test]
    fn displacement_is_antisymmetric() {
        let bounds = field();
        let points = [
            pt2(-99.0, 12.0),
            pt2(80.0, -75.0),
            pt2(0.0, 0.0),
            pt2(55.5, 99.0),
            pt2(-10.0, -99.5),
        ];
        for &p in &points {
            for &q in &points {
                let pq = displacement(p, q, &bounds).unwrap();
                let qp = displacement(q, p, &bounds).unwrap();
                assert_abs_diff_eq!(pq.length(), qp.length(), epsilon = 1e-3);
                assert!(pq.length() <= (q - p).length() + 1e-4);
            }
        }
    }

    #[test]
    fn exact_tie_keeps_home_tile() {
        // Exactly half a field apart: home and the -x image are equally short
        let d = displacement(pt2(-50.0, 0.0), pt2(50.0, 0.0), &field()).unwrap();
        assert_eq!(d, vec2(100.0, 0.0));
    }

    #[test]
    fn self_distance_is_negative_radii() {
        let p = pt2(12.0, -7.0);
        let d = distance(p, p, &field(), 2.0, 3.0).unwrap();
        assert_abs_diff_eq!(d, -5.0);
    }

    #[test]
    fn rejects_non_finite_points() {
        let err = displacement(pt2(f32::NAN, 0.0), pt2(0.0, 0.0), &field()).unwrap_err();
        assert!(matches!(err, ValidationError::NonFiniteInput { index: 0, .. }));
    }

    #[test]
    fn slices_must_be_two_dimensional() {
        assert_eq!(vector_from_slice(&[1.0, 2.0]).unwrap(), vec2(1.0, 2.0));
        assert_eq!(
            vector_from_slice(&[1.0, 2.0, 3.0]).unwrap_err(),
            ValidationError::DimensionMismatch { expected: 2, got: 3 }
        );
        assert!(vector_from_slice(&[1.0, f32::INFINITY]).is_err());
    }

    #[test]
    fn normalize_zero_is_zero() {
        let (dir, mag) = normalize(Vec2::ZERO);
        assert_eq!(dir, Vec2::ZERO);
        assert_eq!(mag, 0.0);

        let (dir, mag) = normalize(vec2(3.0, 4.0));
        assert_abs_diff_eq!(mag, 5.0);
        assert_abs_diff_eq!(dir.length(), 1.0, epsilon = 1e-6);
    }

    #[test]
    fn wrap_fully_folds_distant_points() {
        let b = field();
        let p = b.wrap_fully(pt2(530.0, -470.0));
        assert_abs_diff_eq!(p.x, -70.0, epsilon = 1e-3);
        assert_abs_diff_eq!(p.y, -70.0, epsilon = 1e-3);
        assert_eq!(b.wrap_fully(pt2(12.0, -3.0)), pt2(12.0, -3.0));
        assert!(b.contains(b.wrap_fully(pt2(-1.0e9, 7.0e8))));
    }

    #[test]
    fn normalize_handles_extreme_magnitudes() {
        let (dir, mag) = normalize(vec2(-3.0e30, 4.0e30));
        assert_abs_diff_eq!(dir.x, -0.6, epsilon = 1e-6);
        assert_abs_diff_eq!(dir.y, 0.8, epsilon = 1e-6);
        assert!(mag > 4.0e30);

        let (dir, mag) = normalize(vec2(1.0e20, 1.0e20));
        assert_abs_diff_eq!(dir.length(), 1.0, epsilon = 1e-6);
        assert!(mag.is_finite());

        let (dir, mag) = normalize(vec2(3.0e-6, -4.0e-6));
        assert_abs_diff_eq!(dir.x, 0.6, epsilon = 1e-6);
        assert_abs_diff_eq!(dir.y, -0.8, epsilon = 1e-6);
        assert_abs_diff_eq!(mag, 5.0e-6, epsilon = 1e-9);

        assert_eq!(normalize(vec2(f32::NAN, 1.0)), (Vec2::ZERO, 0.0));
    }

    #[test]
    fn perceived_displacement_without_noise_is_exact() {
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let exact = displacement(pt2(90.0, 0.0), pt2(-90.0, 5.0), &field()).unwrap();
        let seen = perceived_displacement(pt2(90.0, 0.0), pt2(-90.0, 5.0), &field(), 0.0, &mut rng).unwrap();
        assert_eq!(exact, seen);
    }

    #[test]
    fn perceived_displacement_is_noisy_but_reproducible() {
        let bounds = field();
        let mut a = ChaCha8Rng::seed_from_u64(42);
        let mut b = ChaCha8Rng::seed_from_u64(42);
        let first = perceived_displacement(pt2(0.0, 0.0), pt2(10.0, 0.0), &bounds, 1.0, &mut a).unwrap();
        let second = perceived_displacement(pt2(0.0, 0.0), pt2(10.0, 0.0), &bounds, 1.0, &mut b).unwrap();
        assert_eq!(first, second);
        assert_ne!(first, vec2(10.0, 0.0));
        assert!(perceived_displacement(pt2(0.0, 0.0), pt2(1.0, 0.0), &bounds, -1.0, &mut a).is_err());
    }

    #[test]
    fn wrap_moves_points_back_inside() {
        let bounds = field();
        assert_eq!(bounds.wrap(pt2(101.0, -101.0)), pt2(-99.0, 99.0));
        assert_eq!(bounds.wrap(pt2(5.0, 5.0)), pt2(5.0, 5.0));
    }

    #[test]
    fn bounds_must_not_be_inverted() {
        assert!(FieldBounds::new(10.0, -10.0, -1.0, 1.0).is_err());
        assert!(FieldBounds::new(0.0, 0.0, -1.0, 1.0).is_err());
        assert!(FieldBounds::symmetric(-5.0).is_err());
    }

    #[test]
    fn bearing_is_signed() {
        let left = relative_bearing_deg(vec2(1.0, 0.0), vec2(0.0, 1.0)).unwrap();
        let right = relative_bearing_deg(vec2(1.0, 0.0), vec2(0.0, -1.0)).unwrap();
        assert_abs_diff_eq!(left, 90.0, epsilon = 1e-4);
        assert_abs_diff_eq!(right, -90.0, epsilon = 1e-4);
        assert!(relative_bearing_deg(Vec2::ZERO, vec2(1.0, 0.0)).is_none());
    }
}
