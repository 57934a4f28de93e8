use ndarray::Array1;
use serde_derive::{Deserialize, Serialize};

use crate::bbox::{BBox, Ltrb, Ltwh, Xyah};

/// One object instance reported by a detector for a single frame.
///
/// `feature` is the re-identification embedding; it may be empty when the
/// backend has no appearance head, in which case association is motion-only.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Detection {
    pub bbox: BBox<Ltwh>,
    #[serde(rename = "p")]
    pub confidence: f32,
    #[serde(rename = "label", default)]
    pub class_label: String,
    #[serde(rename = "c")]
    pub class_id: i32,
    #[serde(default, with = "feature_serde")]
    pub feature: Array1<f32>,
}

impl Detection {
    pub fn new<S: Into<String>>(
        bbox: BBox<Ltwh>,
        confidence: f32,
        class_id: i32,
        class_label: S,
        feature: Array1<f32>,
    ) -> Self {
        Self {
            bbox,
            confidence,
            class_label: class_label.into(),
            class_id,
            feature,
        }
    }

    #[inline(always)]
    pub fn to_ltrb(&self) -> BBox<Ltrb> {
        self.bbox.as_ltrb()
    }

    #[inline(always)]
    pub fn to_xyah(&self) -> BBox<Xyah> {
        self.bbox.as_xyah()
    }

    #[inline]
    pub fn iou(&self, other: &Detection) -> f32 {
        self.bbox.iou(&other.bbox)
    }

    /// A box the Kalman filter can be seeded from: finite, positive extent.
    #[inline]
    pub fn has_valid_geometry(&self) -> bool {
        self.bbox.is_finite() && self.bbox.width() > 0.0 && self.bbox.height() > 0.0
    }
}

mod feature_serde {
    use ndarray::Array1;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(feature: &Array1<f32>, s: S) -> Result<S::Ok, S::Error> {
        s.collect_seq(feature.iter())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Array1<f32>, D::Error> {
        Vec::<f32>::deserialize(d).map(Array1::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::arr1;

    #[test]
    fn parses_compact_json() {
        let det: Detection = serde_json::from_str(
            r#"{"bbox":[10,20,30,60],"p":0.9,"label":"car","c":2,"feature":[0.6,0.8]}"#,
        )
        .unwrap();

        assert_eq!(det.class_id, 2);
        assert_eq!(det.class_label, "car");
        assert_eq!(det.feature, arr1(&[0.6, 0.8]));
        assert_eq!(det.to_xyah().as_slice(), &[25.0, 50.0, 0.5, 60.0]);
    }

    #[test]
    fn feature_is_optional() {
        let det: Detection = serde_json::from_str(r#"{"bbox":[0,0,1,1],"p":0.5,"c":0}"#).unwrap();

        assert!(det.feature.is_empty());
        assert!(det.class_label.is_empty());
    }

    #[test]
    fn rejects_degenerate_geometry() {
        let mut det = Detection::new(BBox::ltwh(0.0, 0.0, 5.0, 5.0), 0.9, 0, "person", arr1(&[]));
        assert!(det.has_valid_geometry());

        det.bbox = BBox::ltwh(0.0, 0.0, 5.0, 0.0);
        assert!(!det.has_valid_geometry());

        det.bbox = BBox::ltwh(f32::NAN, 0.0, 5.0, 5.0);
        assert!(!det.has_valid_geometry());
    }
}
