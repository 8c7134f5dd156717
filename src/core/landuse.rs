//! Land-use attribution: spatial join of points and pixels to the
//! non-overlapping land-use partition.

use crate::types::{
    ClassImage, GeoTransform, LandUse, LandUseLayer, MrvError, MrvResult, SamplePoint,
};

/// Assigns each point/pixel the enclosing land-use polygon's designation
pub struct LandUseAttributor;

impl LandUseAttributor {
    /// Designation of one location. Containment in two polygons violates the
    /// non-overlap construction and is an error, never a silent pick.
    pub fn designate(layer: &LandUseLayer, lon: f64, lat: f64) -> MrvResult<LandUse> {
        let mut found: Option<LandUse> = None;
        for feature in &layer.features {
            if feature.polygon.contains(lon, lat) {
                if let Some(existing) = found {
                    return Err(MrvError::OverlappingLandUse(format!(
                        "({}, {}) falls in both {} and {}",
                        lon, lat, existing, feature.land_use
                    )));
                }
                found = Some(feature.land_use);
            }
        }
        Ok(found.unwrap_or(LandUse::Other))
    }

    /// Fill `land_use` on every point from the layer
    pub fn attribute(points: &mut [SamplePoint], layer: &LandUseLayer) -> MrvResult<()> {
        log::info!(
            "Attributing land use to {} points across {} polygons",
            points.len(),
            layer.features.len()
        );
        for point in points.iter_mut() {
            point.land_use = Some(Self::designate(layer, point.lon, point.lat)?);
        }
        Ok(())
    }

    /// Rasterize the layer to per-pixel land-use codes over the store grid
    pub fn rasterize(
        layer: &LandUseLayer,
        transform: &GeoTransform,
        rows: usize,
        cols: usize,
    ) -> MrvResult<ClassImage> {
        let mut out = ClassImage::from_elem((rows, cols), LandUse::Other.code());
        for row in 0..rows {
            for col in 0..cols {
                let (lon, lat) = transform.pixel_center(row, col);
                out[[row, col]] = Self::designate(layer, lon, lat)?.code();
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{LandUsePolygon, Polygon};

    fn layer() -> LandUseLayer {
        LandUseLayer::new(vec![
            LandUsePolygon {
                land_use: LandUse::Intervention,
                polygon: Polygon::rectangle(-60.0, -10.0, -59.5, -9.5),
            },
            LandUsePolygon {
                land_use: LandUse::Reference,
                polygon: Polygon::rectangle(-59.5, -10.0, -59.0, -9.5),
            },
        ])
    }

    #[test]
    fn test_designation() {
        let layer = layer();
        assert_eq!(
            LandUseAttributor::designate(&layer, -59.75, -9.75).unwrap(),
            LandUse::Intervention
        );
        assert_eq!(
            LandUseAttributor::designate(&layer, -59.25, -9.75).unwrap(),
            LandUse::Reference
        );
        assert_eq!(
            LandUseAttributor::designate(&layer, -58.0, -9.75).unwrap(),
            LandUse::Other
        );
    }

    #[test]
    fn test_overlap_is_an_error() {
        let overlapping = LandUseLayer::new(vec![
            LandUsePolygon {
                land_use: LandUse::Intervention,
                polygon: Polygon::rectangle(-60.0, -10.0, -59.0, -9.0),
            },
            LandUsePolygon {
                land_use: LandUse::Reference,
                polygon: Polygon::rectangle(-59.5, -10.0, -58.5, -9.0),
            },
        ]);
        let result = LandUseAttributor::designate(&overlapping, -59.25, -9.5);
        assert!(matches!(result, Err(MrvError::OverlappingLandUse(_))));
    }

    #[test]
    fn test_rasterize() {
        let layer = layer();
        // 2x2 grid of 0.5-degree pixels spanning both polygons
        let transform = GeoTransform::north_up(-60.0, -9.5, 0.5, -0.5);
        let raster = LandUseAttributor::rasterize(&layer, &transform, 1, 2).unwrap();
        assert_eq!(raster[[0, 0]], LandUse::Intervention.code());
        assert_eq!(raster[[0, 1]], LandUse::Reference.code());
    }
}
