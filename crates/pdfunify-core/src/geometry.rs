//! Page boxes and affine transforms in PDF user space.

use lopdf::Object;

/// A page box as stored in `/MediaBox`, `/CropBox` and friends.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    pub llx: f64,
    pub lly: f64,
    pub urx: f64,
    pub ury: f64,
}

impl Rect {
    pub fn new(llx: f64, lly: f64, urx: f64, ury: f64) -> Self {
        Self { llx, lly, urx, ury }
    }

    /// Read a four-number array. Corners given in any order are normalized
    /// so that `llx <= urx` and `lly <= ury`.
    pub fn from_object(obj: &Object) -> Option<Self> {
        let arr = obj.as_array().ok()?;
        if arr.len() != 4 {
            return None;
        }
        let mut n = [0.0; 4];
        for (slot, value) in n.iter_mut().zip(arr) {
            *slot = as_f64(value)?;
        }
        Some(Self::new(
            n[0].min(n[2]),
            n[1].min(n[3]),
            n[0].max(n[2]),
            n[1].max(n[3]),
        ))
    }

    pub fn to_object(self) -> Object {
        Object::Array(vec![
            Object::Real(self.llx as f32),
            Object::Real(self.lly as f32),
            Object::Real(self.urx as f32),
            Object::Real(self.ury as f32),
        ])
    }

    pub fn width(&self) -> f64 {
        self.urx - self.llx
    }

    pub fn height(&self) -> f64 {
        self.ury - self.lly
    }

    /// Map both corners through `m`. Only meaningful for transforms without
    /// rotation or shear, which is all the normalizer produces.
    pub fn transform(&self, m: &Matrix) -> Self {
        let (x0, y0) = m.transform_point(self.llx, self.lly);
        let (x1, y1) = m.transform_point(self.urx, self.ury);
        Self::new(x0.min(x1), y0.min(y1), x0.max(x1), y0.max(y1))
    }
}

/// Row-vector affine matrix `[a b c d e f]`, the operand order of `cm`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Matrix {
    pub a: f64,
    pub b: f64,
    pub c: f64,
    pub d: f64,
    pub e: f64,
    pub f: f64,
}

impl Matrix {
    pub fn identity() -> Self {
        Self {
            a: 1.0,
            b: 0.0,
            c: 0.0,
            d: 1.0,
            e: 0.0,
            f: 0.0,
        }
    }

    pub fn scale(sx: f64, sy: f64) -> Self {
        Self {
            a: sx,
            d: sy,
            ..Self::identity()
        }
    }

    pub fn transform_point(&self, x: f64, y: f64) -> (f64, f64) {
        (
            self.a * x + self.c * y + self.e,
            self.b * x + self.d * y + self.f,
        )
    }

    pub fn is_identity(&self, tolerance: f64) -> bool {
        let id = Self::identity();
        [
            self.a - id.a,
            self.b - id.b,
            self.c - id.c,
            self.d - id.d,
            self.e - id.e,
            self.f - id.f,
        ]
        .iter()
        .all(|delta| delta.abs() <= tolerance)
    }

    pub fn to_operands(self) -> Vec<Object> {
        [self.a, self.b, self.c, self.d, self.e, self.f]
            .into_iter()
            .map(|v| Object::Real(v as f32))
            .collect()
    }
}

impl Default for Matrix {
    fn default() -> Self {
        Self::identity()
    }
}

pub(crate) fn as_f64(obj: &Object) -> Option<f64> {
    match obj {
        Object::Integer(i) => Some(*i as f64),
        Object::Real(r) => Some(*r as f64),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rect_from_object_normalizes_corners() {
        let obj = Object::Array(vec![
            Object::Integer(612),
            Object::Integer(792),
            Object::Integer(0),
            Object::Real(0.0),
        ]);
        let rect = Rect::from_object(&obj).unwrap();
        assert_eq!(rect, Rect::new(0.0, 0.0, 612.0, 792.0));
    }

    #[test]
    fn test_rect_from_object_rejects_short_array() {
        let obj = Object::Array(vec![Object::Integer(0), Object::Integer(0)]);
        assert!(Rect::from_object(&obj).is_none());
    }

    #[test]
    fn test_scale_is_identity_only_at_one() {
        assert!(Matrix::scale(1.0, 1.0).is_identity(1e-12));
        assert!(!Matrix::scale(1.0 + 1e-3, 1.0 + 1e-3).is_identity(1e-6));
        assert_eq!(Matrix::scale(2.0, 3.0).transform_point(1.0, 1.0), (2.0, 3.0));
    }

    #[test]
    fn test_rect_transform_scales_about_origin() {
        let rect = Rect::new(10.0, 20.0, 110.0, 220.0);
        let scaled = rect.transform(&Matrix::scale(2.0, 2.0));
        assert_eq!(scaled, Rect::new(20.0, 40.0, 220.0, 440.0));
        assert_eq!(scaled.width(), 200.0);
    }
}
