//! Point operations against a (possibly triclinic) box.
//!
//! Everything here goes through the basis rows of `v` and the face normals `bn`,
//! never through axis-aligned bounds.

use nalgebra::Vector3;

use super::{BoxOutput, SimBox};

/// Extra room given to points pushed to a face by [`SimBox::extend`].
const EXTEND_MARGIN: f64 = 1e-7;

/// Signed distances of points to the six box faces, positive inside.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundsCheck {
    /// Per point: lower a, b, c faces, then upper a, b, c faces.
    pub distances: Vec<[f64; 6]>,
    pub inbound: Vec<bool>,
}

impl BoundsCheck {
    pub fn outbound(&self) -> impl Iterator<Item = usize> + '_ {
        self.inbound
            .iter()
            .enumerate()
            .filter(|(_, inside)| !**inside)
            .map(|(i, _)| i)
    }

    pub fn all_inbound(&self) -> bool {
        self.inbound.iter().all(|x| *x)
    }
}

fn fractional_one(o: &BoxOutput, point: &Vector3<f64>) -> Vector3<f64> {
    let d = point - o.origin();
    Vector3::from_fn(|j, _| {
        let normal = o.bn.row(j).transpose();
        d.dot(&normal) / o.basis(j).dot(&normal)
    })
}

impl SimBox {
    /// Coordinates in units of the basis vectors, relative to the origin.
    pub fn fractional(&self, points: &[Vector3<f64>]) -> Vec<Vector3<f64>> {
        let o = self.output();
        points.iter().map(|p| fractional_one(&o, p)).collect()
    }

    /// Inverse of [`SimBox::fractional`].
    pub fn cartesian(&self, fractional: &[Vector3<f64>]) -> Vec<Vector3<f64>> {
        let o = self.output();
        let vt = o.v.transpose();
        fractional.iter().map(|f| o.origin() + vt * f).collect()
    }

    pub fn bounds_check(&self, points: &[Vector3<f64>]) -> BoundsCheck {
        let o = self.output();
        let lo = o.origin();
        let hi = lo + o.v.row_sum().transpose();

        let distances: Vec<[f64; 6]> = points
            .iter()
            .map(|p| {
                let mut d = [0.0; 6];
                for j in 0..3 {
                    let normal = o.bn.row(j).transpose();
                    // Normals point from the lower face into the box.
                    let sign = o.basis(j).dot(&normal).signum();
                    d[j] = sign * (p - lo).dot(&normal);
                    d[j + 3] = sign * (hi - p).dot(&normal);
                }
                d
            })
            .collect();
        let inbound: Vec<bool> = distances
            .iter()
            .map(|d| d.iter().all(|x| *x >= 0.0))
            .collect();

        let outside = inbound.iter().filter(|x| !**x).count();
        if outside > 0 {
            tracing::debug!(outside, total = points.len(), "points outside of the box");
        }
        BoundsCheck { distances, inbound }
    }

    /// Moves points back into the box along periodic axes. Non-periodic axes are left alone.
    pub fn wrap(&self, points: &[Vector3<f64>]) -> Vec<Vector3<f64>> {
        let o = self.output();
        let periodic = self.periodic();
        points
            .iter()
            .map(|p| {
                let f = fractional_one(&o, p);
                let mut out = *p;
                for j in 0..3 {
                    if periodic[j] && !(0.0..1.0).contains(&f[j]) {
                        out -= f[j].floor() * o.basis(j);
                    }
                }
                out
            })
            .collect()
    }

    /// Grows the box along non-periodic axes until every point fits. Angles are kept.
    pub fn extend(&mut self, points: &[Vector3<f64>]) {
        let o = self.output();
        let periodic = self.periodic();
        let fracs: Vec<Vector3<f64>> = points.iter().map(|p| fractional_one(&o, p)).collect();

        let mut shift = Vector3::zeros();
        let mut scale = [1.0; 3];
        for j in 0..3 {
            if periodic[j] {
                continue;
            }
            let min = fracs.iter().map(|f| f[j]).fold(f64::INFINITY, f64::min);
            let max = fracs.iter().map(|f| f[j]).fold(f64::NEG_INFINITY, f64::max);
            let length = o.basis(j).norm();
            let lo = if min < 0.0 { min - EXTEND_MARGIN / length } else { 0.0 };
            let hi = if max > 1.0 { max + EXTEND_MARGIN / length } else { 1.0 };
            shift += lo * o.basis(j);
            scale[j] = hi - lo;
        }

        if shift == Vector3::zeros() && scale == [1.0; 3] {
            return;
        }
        let input = &mut self.input;
        input.x0 += shift.x;
        input.y0 += shift.y;
        input.z0 += shift.z;
        input.lx *= scale[0];
        input.ly *= scale[1];
        input.lz *= scale[2];
        tracing::debug!(?scale, "extended box");
    }

    /// Periodic images of `points` for every non-empty combination of periodic axes.
    ///
    /// Each returned batch lines up with `points`. Along each axis a point is imaged towards
    /// the far side of the box: forward when it sits in the lower half, backward otherwise.
    /// Points are expected to be wrapped first.
    pub fn ghost(&self, points: &[Vector3<f64>]) -> Vec<Vec<Vector3<f64>>> {
        let o = self.output();
        let periodic = self.periodic();
        let sides: Vec<Vector3<f64>> = points
            .iter()
            .map(|p| fractional_one(&o, p).map(|f| if f < 0.5 { 1.0 } else { -1.0 }))
            .collect();

        (1u8..8)
            .filter(|mask| (0..3).all(|j| *mask & (1u8 << j) == 0 || periodic[j]))
            .map(|mask| {
                points
                    .iter()
                    .zip(&sides)
                    .map(|(p, side)| {
                        let mut image = *p;
                        for j in 0..3 {
                            if mask & (1u8 << j) != 0 {
                                image += side[j] * o.basis(j);
                            }
                        }
                        image
                    })
                    .collect()
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simbox::BoxType;

    const TOL: f64 = 1e-9;

    fn triclinic() -> SimBox {
        let mut b = SimBox::new();
        b.set_input(&[1.0, 11.0, 2.0, 0.0, 10.0, 1.0, -1.0, 9.0, 0.5], Some(BoxType::LmpDump))
            .unwrap();
        b
    }

    fn close(a: &Vector3<f64>, b: &Vector3<f64>) -> bool {
        (a - b).norm() < TOL
    }

    #[test]
    fn fractional_and_cartesian_are_inverse() {
        let b = triclinic();
        let points = vec![Vector3::new(1.0, 0.0, -1.0), Vector3::new(5.0, 4.0, 3.0), Vector3::new(20.0, -3.0, 0.0)];
        let frac = b.fractional(&points);
        assert!(close(&frac[0], &Vector3::zeros()));
        let back = b.cartesian(&frac);
        for (p, q) in points.iter().zip(&back) {
            assert!(close(p, q));
        }

        let o = b.output();
        let corner = b.cartesian(&[Vector3::new(1.0, 1.0, 1.0)]);
        assert!(close(&corner[0], &(o.origin() + o.v.row_sum().transpose())));
    }

    #[test]
    fn bounds_check_reports_face_distances() {
        let mut b = SimBox::new();
        b.set_input(&[0.0, 10.0, 0.0, 10.0, 0.0, 10.0, 0.0, 0.0, 0.0], Some(BoxType::LmpData))
            .unwrap();
        let check = b.bounds_check(&[Vector3::new(1.0, 2.0, 3.0), Vector3::new(11.0, 5.0, 5.0)]);
        assert_eq!(check.inbound, vec![true, false]);
        assert_eq!(check.outbound().collect::<Vec<_>>(), vec![1]);
        let d = check.distances[0];
        assert!((d[0] - 1.0).abs() < TOL && (d[3] - 9.0).abs() < TOL);
        assert!((check.distances[1][3] + 1.0).abs() < TOL);
    }

    #[test]
    fn wrap_only_moves_along_periodic_axes() {
        let mut b = triclinic();
        b.set("bz", "ff").unwrap();
        let o = b.output();
        let inside = b.cartesian(&[Vector3::new(0.25, 0.5, 0.75)])[0];
        let outside = inside + 2.0 * o.basis(0) - o.basis(1) + o.basis(2);
        let wrapped = b.wrap(&[outside])[0];
        assert!(close(&wrapped, &(inside + o.basis(2))));
        assert!(b.bounds_check(&[b.wrap(&[inside])[0]]).all_inbound());
    }

    #[test]
    fn extend_grows_non_periodic_axes() {
        let mut b = SimBox::new();
        b.set_input(&[0.0, 10.0, 0.0, 10.0, 0.0, 10.0, 0.0, 0.0, 0.0], Some(BoxType::LmpData))
            .unwrap();
        b.set("bx", "ff").unwrap();
        let points = [Vector3::new(-2.0, 5.0, 5.0), Vector3::new(12.0, 5.0, 5.0), Vector3::new(5.0, 15.0, 5.0)];
        b.extend(&points);

        let input = b.input();
        assert!(input.x0 < -2.0 && input.x0 > -2.0 - 1e-6);
        assert!(input.lx > 14.0 && input.lx < 14.0 + 1e-6);
        assert_eq!(input.ly, 10.0);
        let check = b.bounds_check(&points);
        assert_eq!(check.inbound, vec![true, true, false]);
    }

    #[test]
    fn ghost_images_cover_every_periodic_combination() {
        let mut b = SimBox::new();
        b.set_input(&[0.0, 10.0, 0.0, 10.0, 0.0, 10.0, 0.0, 0.0, 0.0], Some(BoxType::LmpData))
            .unwrap();
        let points = [Vector3::new(1.0, 9.0, 5.0)];
        let images = b.ghost(&points);
        assert_eq!(images.len(), 7);
        assert!(close(&images[0][0], &Vector3::new(11.0, 9.0, 5.0)));
        assert!(close(&images[1][0], &Vector3::new(1.0, -1.0, 5.0)));
        assert!(close(&images[6][0], &Vector3::new(11.0, -1.0, -5.0)));

        b.set("by", "f").unwrap();
        b.set("bz", "m").unwrap();
        assert_eq!(b.ghost(&points).len(), 1);
    }
}
