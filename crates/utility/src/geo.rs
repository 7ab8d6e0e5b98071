pub const EARTH_RADIUS_KM: f64 = 6371.0;

fn to_radians(degrees: f64) -> f64 {
    degrees * std::f64::consts::PI / 180.0
}

fn to_degrees(radians: f64) -> f64 {
    radians * 180.0 / std::f64::consts::PI
}

/// An axis aligned latitude/longitude rectangle in degrees. Bounds are
/// inclusive.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub min_latitude: f64,
    pub max_latitude: f64,
    pub min_longitude: f64,
    pub max_longitude: f64,
}

impl BoundingBox {
    pub fn contains(&self, latitude: f64, longitude: f64) -> bool {
        (self.min_latitude..=self.max_latitude).contains(&latitude)
            && (self.min_longitude..=self.max_longitude).contains(&longitude)
    }

    /// Whether the box covers all longitudes, e.g. near the poles.
    pub fn spans_all_longitudes(&self) -> bool {
        self.min_longitude <= -180.0 && self.max_longitude >= 180.0
    }
}

/// Rectangle enclosing the circle of `radius_km` around the given center.
///
/// Latitude bounds are clamped to the valid range. When the circle reaches
/// over a pole, or the rectangle would cross the antimeridian, the longitude
/// range is widened to the full `[-180, 180]`. The result is always a
/// superset of the circle.
pub fn calculate_bounding_box(lat: f64, lon: f64, radius_km: f64) -> BoundingBox {
    let angular_radius = radius_km / EARTH_RADIUS_KM;
    let lat_delta = to_degrees(angular_radius);

    let reaches_pole = lat + lat_delta >= 90.0 || lat - lat_delta <= -90.0;
    let min_latitude = (lat - lat_delta).max(-90.0);
    let max_latitude = (lat + lat_delta).min(90.0);

    let sin_radius = angular_radius.sin();
    let cos_lat = to_radians(lat).cos();
    let (min_longitude, max_longitude) = if reaches_pole || sin_radius >= cos_lat {
        (-180.0, 180.0)
    } else {
        // widest longitude reached by the circle, at the meridians tangent to it
        let lon_delta = to_degrees((sin_radius / cos_lat).asin());
        let (min, max) = (lon - lon_delta, lon + lon_delta);
        if min < -180.0 || max > 180.0 {
            (-180.0, 180.0)
        } else {
            (min, max)
        }
    };

    BoundingBox {
        min_latitude,
        max_latitude,
        min_longitude,
        max_longitude,
    }
}

/// Great-circle distance in kilometers.
pub fn haversine_distance(
    latitude_1: f64,
    longitude_1: f64,
    latitude_2: f64,
    longitude_2: f64,
) -> f64 {
    let lat1_rad = to_radians(latitude_1);
    let lat2_rad = to_radians(latitude_2);

    let dlat = to_radians(latitude_2 - latitude_1);
    let dlon = to_radians(longitude_2 - longitude_1);

    let a = (dlat / 2.0).sin().powi(2)
        + lat1_rad.cos() * lat2_rad.cos() * (dlon / 2.0).sin().powi(2);
    // rounding can push `a` slightly past 1 for antipodal points
    let a = a.clamp(0.0, 1.0);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

    EARTH_RADIUS_KM * c
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(13.75, 100.50)]
    #[case(0.0, 0.0)]
    #[case(-90.0, 180.0)]
    #[case(51.5, -0.12)]
    fn distance_to_self_is_zero(#[case] lat: f64, #[case] lon: f64) {
        assert_eq!(haversine_distance(lat, lon, lat, lon), 0.0);
    }

    #[rstest]
    #[case((13.75, 100.50), (18.79, 98.98))]
    #[case((-33.86, 151.21), (51.5, -0.12))]
    #[case((0.0, 179.9), (0.0, -179.9))]
    fn distance_is_symmetric(#[case] a: (f64, f64), #[case] b: (f64, f64)) {
        let ab = haversine_distance(a.0, a.1, b.0, b.1);
        let ba = haversine_distance(b.0, b.1, a.0, a.1);
        assert!((ab - ba).abs() < 1e-9);
    }

    #[test]
    fn antipodal_points_are_half_the_circumference_apart() {
        let distance = haversine_distance(0.0, 0.0, 0.0, 180.0);
        assert!(distance.is_finite());
        assert!((distance - std::f64::consts::PI * EARTH_RADIUS_KM).abs() < 1e-6);
    }

    #[test]
    fn one_degree_of_latitude_is_about_111_km() {
        let distance = haversine_distance(10.0, 20.0, 11.0, 20.0);
        assert!((distance - 111.19).abs() < 0.01);
    }

    #[test]
    fn bounding_box_encloses_radius() {
        let bbox = calculate_bounding_box(13.75, 100.50, 50.0);
        assert!(bbox.min_latitude < 13.75 && bbox.max_latitude > 13.75);
        // longitude span is wider than the latitude span away from the equator
        assert!(
            bbox.max_longitude - bbox.min_longitude
                > bbox.max_latitude - bbox.min_latitude
        );
        for (lat, lon) in [(bbox.max_latitude, 100.50), (13.75, bbox.max_longitude)] {
            let distance = haversine_distance(13.75, 100.50, lat, lon);
            assert!(distance >= 49.9, "edge at {distance} km");
        }
    }

    #[rstest]
    #[case(90.0)]
    #[case(-90.0)]
    #[case(89.9999999)]
    fn bounding_box_at_the_poles_spans_all_longitudes(#[case] lat: f64) {
        let bbox = calculate_bounding_box(lat, 10.0, 50.0);
        assert!(bbox.spans_all_longitudes());
        assert!(bbox.min_latitude >= -90.0 && bbox.max_latitude <= 90.0);
    }

    #[rstest]
    #[case((89.5, 0.0), (89.78, 60.0))]
    #[case((89.7, 0.0), (89.9, 180.0))]
    #[case((-89.5, 0.0), (-89.78, -60.0))]
    #[case((70.0, 20.0), (70.1, 21.2))]
    fn bounding_box_contains_points_within_radius_near_the_poles(
        #[case] center: (f64, f64),
        #[case] point: (f64, f64),
    ) {
        let distance = haversine_distance(center.0, center.1, point.0, point.1);
        assert!(distance < 50.0, "fixture point is {distance} km away");
        let bbox = calculate_bounding_box(center.0, center.1, 50.0);
        assert!(bbox.contains(point.0, point.1), "{bbox:?} misses {point:?}");
    }

    #[test]
    fn circle_over_the_pole_spans_all_longitudes() {
        assert!(calculate_bounding_box(89.7, 0.0, 50.0).spans_all_longitudes());
        assert!(!calculate_bounding_box(89.5, 0.0, 50.0).spans_all_longitudes());
    }

    #[test]
    fn bounding_box_crossing_the_antimeridian_is_widened() {
        let bbox = calculate_bounding_box(0.0, 179.9, 50.0);
        assert!(bbox.spans_all_longitudes());
        assert!(bbox.contains(0.0, -179.9));
    }
}
