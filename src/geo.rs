/*!
 * Geographic calculations.
 *
 * Simple (spherical Earth) calculations on latitude / longitude coordinates and a spatial index
 * for quickly finding everything near a point.
 */
use std::fmt::{self, Display};

mod hilbert_rtree;
pub use hilbert_rtree::Hilbert2DRTreeView;

/// Mean radius of the Earth in kilometers.
pub const EARTH_RADIUS_KM: f64 = 6371.0088;

/// A geographic coordinate in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Coord {
    pub lat: f64,
    pub lon: f64,
}

impl Coord {
    /// Both values are finite and inside the valid latitude / longitude ranges.
    pub fn is_valid(&self) -> bool {
        self.lat.is_finite()
            && self.lon.is_finite()
            && (-90.0..=90.0).contains(&self.lat)
            && (-180.0..=180.0).contains(&self.lon)
    }
}

impl Display for Coord {
    fn fmt(&self, f: &mut fmt::Formatter) -> Result<(), fmt::Error> {
        write!(f, "({:.6}, {:.6})", self.lat, self.lon)
    }
}

/// A latitude / longitude aligned box, `ll` is the lower left corner and `ur` the upper right.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub ll: Coord,
    pub ur: Coord,
}

impl BoundingBox {
    /// A box that contains nothing, expanding it with any coordinate gives a point box.
    pub const fn empty() -> Self {
        BoundingBox {
            ll: Coord {
                lat: f64::INFINITY,
                lon: f64::INFINITY,
            },
            ur: Coord {
                lat: -f64::INFINITY,
                lon: -f64::INFINITY,
            },
        }
    }

    /// A degenerate box around a single point.
    pub fn from_coord(coord: Coord) -> Self {
        BoundingBox {
            ll: coord,
            ur: coord,
        }
    }

    /// Grow this box to include the other.
    pub fn expand(&mut self, other: &BoundingBox) {
        self.ll.lat = self.ll.lat.min(other.ll.lat);
        self.ll.lon = self.ll.lon.min(other.ll.lon);
        self.ur.lat = self.ur.lat.max(other.ur.lat);
        self.ur.lon = self.ur.lon.max(other.ur.lon);
    }

    /// Check whether the boxes overlap, edges within `eps` of each other count as overlapping.
    pub fn overlap(&self, other: &BoundingBox, eps: f64) -> bool {
        !(self.ur.lat < other.ll.lat - eps
            || self.ll.lat > other.ur.lat + eps
            || self.ur.lon < other.ll.lon - eps
            || self.ll.lon > other.ur.lon + eps)
    }

    #[cfg(test)]
    pub fn contains_coord(&self, coord: Coord, eps: f64) -> bool {
        coord.lat >= self.ll.lat - eps
            && coord.lat <= self.ur.lat + eps
            && coord.lon >= self.ll.lon - eps
            && coord.lon <= self.ur.lon + eps
    }

    /// The smallest box guaranteed to hold every point within `radius` (radians of arc) of
    /// `center`.
    ///
    /// Near the poles, and when the window would cross the antimeridian, the box spans every
    /// longitude.
    pub fn around(center: Coord, radius: f64) -> Self {
        let dlat = radius.to_degrees();
        let min_lat = (center.lat - dlat).max(-90.0);
        let max_lat = (center.lat + dlat).min(90.0);

        let (min_lon, max_lon) = if min_lat <= -90.0 || max_lat >= 90.0 {
            (-180.0, 180.0)
        } else {
            // Widest point of the cap is at the latitude farthest from the equator.
            let extreme_lat = min_lat.abs().max(max_lat.abs()).to_radians();
            let dlon = (radius.sin() / extreme_lat.cos()).min(1.0).asin().to_degrees();

            if center.lon - dlon < -180.0 || center.lon + dlon > 180.0 {
                (-180.0, 180.0)
            } else {
                (center.lon - dlon, center.lon + dlon)
            }
        };

        BoundingBox {
            ll: Coord {
                lat: min_lat,
                lon: min_lon,
            },
            ur: Coord {
                lat: max_lat,
                lon: max_lon,
            },
        }
    }
}

impl Display for BoundingBox {
    fn fmt(&self, f: &mut fmt::Formatter) -> Result<(), fmt::Error> {
        write!(f, "{} <---> {}", self.ll, self.ur)
    }
}

/// Anything that has a location and an extent.
pub trait Geo {
    fn centroid(&self) -> Coord;
    fn bounding_box(&self) -> BoundingBox;
}

/**
 * The central angle between two points, the haversine formula.
 *
 * #Arguments
 * * lat1 - the latitude of the first point in radians.
 * * lon1 - the longitude of the first point in radians.
 * * lat2 - the latitude of the second point in radians.
 * * lon2 - the longitude of the second point in radians.
 *
 * #Returns
 * The angle between the points in radians, the same units as the DBSCAN epsilon.
 */
pub fn haversine_angle(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let dlat2 = (lat2 - lat1) / 2.0;
    let dlon2 = (lon2 - lon1) / 2.0;

    let sin2_dlat = f64::powi(f64::sin(dlat2), 2);
    let sin2_dlon = f64::powi(f64::sin(dlon2), 2);

    // Clamp against rounding just above 1.0 for antipodal points.
    let a = (sin2_dlat + sin2_dlon * f64::cos(lat1) * f64::cos(lat2)).min(1.0);

    2.0 * f64::asin(f64::sqrt(a))
}

/**
 * The simple great circle distance calculation.
 *
 * #Arguments
 * * lat1 - the latitude of the first point in degrees.
 * * lon1 - the longitude of the first point in degrees.
 * * lat2 - the latitude of the second point in degrees.
 * * lon2 - the longitude of the second point in degrees.
 *
 * #Returns
 * The distance between the points in kilometers.
 */
pub fn great_circle_distance(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let arc = haversine_angle(
        lat1.to_radians(),
        lon1.to_radians(),
        lat2.to_radians(),
        lon2.to_radians(),
    );

    arc * EARTH_RADIUS_KM
}

/// Convert a distance along the surface of the Earth to an angle in radians.
pub fn km_to_radians(km: f64) -> f64 {
    km / EARTH_RADIUS_KM
}
