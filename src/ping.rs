/*!
 * A single position report from a vessel.
 */
use crate::{error::PortsError, geo::Coord};
use chrono::{DateTime, Utc};
use strum::{EnumIter, IntoEnumIterator, IntoStaticStr};

/// One timestamped AIS position report.
#[derive(Debug, Clone, PartialEq)]
pub struct Ping {
    /// The Maritime Mobile Service Identity of the vessel.
    pub vessel_id: u64,
    pub timestamp: DateTime<Utc>,
    pub lat: f64,
    pub lon: f64,
    /// Speed over ground in knots.
    pub speed_over_ground: f64,
    pub ship_type: Option<String>,
    pub nav_status: Option<String>,
}

impl Ping {
    pub fn coord(&self) -> Coord {
        Coord {
            lat: self.lat,
            lon: self.lon,
        }
    }
}

/// The fields every input table must provide, named the way they appear in the Danish Maritime
/// Authority AIS files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, IntoStaticStr)]
pub enum PingField {
    #[strum(serialize = "MMSI")]
    VesselId,
    #[strum(serialize = "# Timestamp")]
    Timestamp,
    #[strum(serialize = "Latitude")]
    Latitude,
    #[strum(serialize = "Longitude")]
    Longitude,
    #[strum(serialize = "Navigational status")]
    NavStatus,
    #[strum(serialize = "SOG")]
    SpeedOverGround,
    #[strum(serialize = "Ship type")]
    ShipType,
}

impl PingField {
    /// The column name in the input table.
    pub fn name(self) -> &'static str {
        self.into()
    }
}

/// Column positions of every [PingField] in an input table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnIndex {
    pub vessel_id: usize,
    pub timestamp: usize,
    pub lat: usize,
    pub lon: usize,
    pub nav_status: usize,
    pub speed_over_ground: usize,
    pub ship_type: usize,
}

impl ColumnIndex {
    /// One past the largest column index, the minimum number of cells a row must have.
    pub fn min_row_len(&self) -> usize {
        [
            self.vessel_id,
            self.timestamp,
            self.lat,
            self.lon,
            self.nav_status,
            self.speed_over_ground,
            self.ship_type,
        ]
        .into_iter()
        .max()
        .unwrap_or(0)
            + 1
    }
}

/// Check the header of an input table for all the required fields.
///
/// Returns the position of each field, or an error listing every missing field. Header names are
/// compared after trimming whitespace.
pub fn check_required_fields<S: AsRef<str>>(header: &[S]) -> Result<ColumnIndex, PortsError> {
    let position = |field: PingField| {
        header
            .iter()
            .position(|name| name.as_ref().trim() == field.name())
    };

    let missing: Vec<&'static str> = PingField::iter()
        .filter(|field| position(*field).is_none())
        .map(PingField::name)
        .collect();

    match (
        position(PingField::VesselId),
        position(PingField::Timestamp),
        position(PingField::Latitude),
        position(PingField::Longitude),
        position(PingField::NavStatus),
        position(PingField::SpeedOverGround),
        position(PingField::ShipType),
    ) {
        (
            Some(vessel_id),
            Some(timestamp),
            Some(lat),
            Some(lon),
            Some(nav_status),
            Some(speed_over_ground),
            Some(ship_type),
        ) => Ok(ColumnIndex {
            vessel_id,
            timestamp,
            lat,
            lon,
            nav_status,
            speed_over_ground,
            ship_type,
        }),
        _ => Err(PortsError::MissingFields(missing)),
    }
}

#[cfg(test)]
mod test {
    use super::*;

    const DMA_HEADER: [&str; 10] = [
        "# Timestamp",
        "Type of mobile",
        "MMSI",
        "Latitude",
        "Longitude",
        "Navigational status",
        "ROT",
        "SOG",
        "COG",
        "Ship type",
    ];

    #[test]
    fn test_all_fields_present() {
        let idx = check_required_fields(&DMA_HEADER).unwrap();

        assert_eq!(idx.timestamp, 0);
        assert_eq!(idx.vessel_id, 2);
        assert_eq!(idx.lat, 3);
        assert_eq!(idx.lon, 4);
        assert_eq!(idx.nav_status, 5);
        assert_eq!(idx.speed_over_ground, 7);
        assert_eq!(idx.ship_type, 9);
        assert_eq!(idx.min_row_len(), 10);
    }

    #[test]
    fn test_missing_fields_are_all_listed() {
        let header = ["# Timestamp", "MMSI", "Longitude", "SOG"];

        match check_required_fields(&header) {
            Err(PortsError::MissingFields(missing)) => {
                assert_eq!(missing, vec!["Latitude", "Navigational status", "Ship type"])
            }
            other => panic!("expected missing fields, got {:?}", other),
        }
    }

    #[test]
    fn test_header_whitespace_is_ignored() {
        let header: Vec<String> = DMA_HEADER.iter().map(|name| format!(" {} ", name)).collect();
        assert!(check_required_fields(&header).is_ok());
    }
}
