//! The outline of a cluster.
//!
//! Hulls are computed in the plane with longitude as x and latitude as y. That is plenty accurate
//! for something the size of a harbor.
use crate::stop::StopEvent;
use geo::{
    kernels::{Kernel, Orientation, RobustKernel},
    ConvexHull, Coord, LineString, MultiPoint, Point, Polygon,
};
use std::fmt::{self, Display};

/// The shape enclosing the stops of a cluster, degenerate when there are too few distinct points
/// for an area.
#[derive(Debug, Clone, PartialEq)]
pub enum Boundary {
    Point(Point<f64>),
    Line(LineString<f64>),
    Polygon(Polygon<f64>),
}

impl Display for Boundary {
    /// Well known text.
    fn fmt(&self, f: &mut fmt::Formatter) -> Result<(), fmt::Error> {
        match self {
            Self::Point(pnt) => write!(f, "POINT ({} {})", pnt.x(), pnt.y()),
            Self::Line(line) => {
                write!(f, "LINESTRING ")?;
                write_coords(f, line.coords())
            }
            Self::Polygon(poly) => {
                write!(f, "POLYGON (")?;
                write_coords(f, poly.exterior().coords())?;
                for ring in poly.interiors() {
                    write!(f, ", ")?;
                    write_coords(f, ring.coords())?;
                }
                write!(f, ")")
            }
        }
    }
}

fn write_coords<'a, I>(f: &mut fmt::Formatter, coords: I) -> Result<(), fmt::Error>
where
    I: Iterator<Item = &'a Coord<f64>>,
{
    write!(f, "(")?;
    for (i, c) in coords.enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{} {}", c.x, c.y)?;
    }
    write!(f, ")")
}

/// The boundary of one cluster, `None` when no member had a usable position.
#[derive(Debug, Clone, PartialEq)]
pub struct ClusterPolygon {
    pub cluster_id: u32,
    pub boundary: Option<Boundary>,
}

/// Build the convex hull of the member stop centroids.
///
/// Non-finite positions are skipped. One distinct point gives a point, two distinct points or any
/// number of collinear points give a line between the extremes, anything else a polygon.
pub fn build_polygon(cluster_id: u32, members: &[&StopEvent]) -> ClusterPolygon {
    let mut coords: Vec<Coord<f64>> = members
        .iter()
        .map(|s| Coord {
            x: s.centroid.lon,
            y: s.centroid.lat,
        })
        .filter(|c| c.x.is_finite() && c.y.is_finite())
        .collect();

    coords.sort_by(|a, b| a.x.total_cmp(&b.x).then(a.y.total_cmp(&b.y)));
    coords.dedup();

    ClusterPolygon {
        cluster_id,
        boundary: hull(coords),
    }
}

/// `coords` are distinct and sorted by x, then y.
fn hull(coords: Vec<Coord<f64>>) -> Option<Boundary> {
    let (first, last) = match (coords.first(), coords.last()) {
        (Some(first), Some(last)) => (*first, *last),
        _ => return None,
    };

    if coords.len() == 1 {
        return Some(Boundary::Point(Point::from(first)));
    }

    let collinear = coords
        .iter()
        .all(|&c| RobustKernel::orient2d(first, last, c) == Orientation::Collinear);

    if collinear {
        // Sorted order puts the extremes of a line at the ends.
        return Some(Boundary::Line(LineString::new(vec![first, last])));
    }

    Some(Boundary::Polygon(MultiPoint::from(coords).convex_hull()))
}
