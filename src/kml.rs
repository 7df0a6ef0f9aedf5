//! Very simple functions for producing KML files of the ports found by this crate.
//!
//! This is not a general solution at all, it only covers the handful of elements needed to draw a
//! port and its outline. The API is streaming, so the user is responsible for closing all tags.

use crate::{cluster::Boundary, pipeline::Port, PortsResult};
use geo::LineString;
use std::{
    fs::File,
    io::{BufWriter, Write},
    path::Path,
};

const PORT_STYLE: &str = "port";

pub struct KmlFile(BufWriter<File>);

impl KmlFile {
    pub fn new<P: AsRef<Path>>(pth: P) -> PortsResult<Self> {
        let p = pth.as_ref();

        let f = std::fs::File::create(p)?;
        let mut new = KmlFile(BufWriter::new(f));
        new.start_document()?;
        Ok(new)
    }
}

impl KmlWriter for KmlFile {
    fn output(&mut self) -> &mut dyn Write {
        &mut self.0
    }
}

impl Drop for KmlFile {
    fn drop(&mut self) {
        self.finish_document();
    }
}

/// Write every port into a new KML file, one folder per port.
pub fn save_ports_kml<P: AsRef<Path>>(path: P, ports: &[Port]) -> PortsResult<()> {
    let mut kfile = KmlFile::new(path)?;
    write_ports(&mut kfile, ports)?;
    kfile.output().flush()?;
    Ok(())
}

/// Write the shared style and a folder for each port, the document must already be started.
pub fn write_ports<K: KmlWriter>(kml: &mut K, ports: &[Port]) -> PortsResult<()> {
    kml.start_style(Some(PORT_STYLE))?;
    kml.create_line_style(Some("ff0000ff"), 2.0)?;
    kml.create_poly_style(Some("660000ff"), true, true)?;
    kml.finish_style()?;

    for port in ports {
        let summary = &port.summary;
        let name = format!("Port {}", summary.cluster_id);
        let description = format!(
            concat!(
                "<b>Cluster:</b> {}<br/>",
                "<b>Vessels:</b> {}<br/>",
                "<b>Stops:</b> {}<br/>",
                "<b>Mean stop (hours):</b> {:.1}<br/>",
                "<b>Ship type:</b> {}<br/>",
                "<b>Navigational status:</b> {}<br/>",
                "<b>Ship types:</b> {}"
            ),
            summary.cluster_id,
            summary.unique_vessel_count,
            summary.stop_count,
            summary.mean_duration.num_seconds() as f64 / 3600.0,
            summary.dominant_ship_type,
            summary.dominant_nav_status,
            summary.ship_type_histogram,
        );

        kml.start_folder(Some(&name), None, false)?;

        kml.start_placemark(Some(&name), Some(&description), None)?;
        kml.create_point(summary.centroid.lat, summary.centroid.lon, 0.0)?;
        kml.finish_placemark()?;

        if let Some(boundary) = &port.boundary {
            let outline = format!("{} outline", name);
            kml.start_placemark(Some(&outline), None, Some(&format!("#{}", PORT_STYLE)))?;
            kml.write_boundary(boundary)?;
            kml.finish_placemark()?;
        }

        kml.finish_folder()?;
    }

    Ok(())
}

pub trait KmlWriter {
    fn output(&mut self) -> &mut dyn Write;

    /// Start by putting the header out.
    fn start_document(&mut self) -> PortsResult<()> {
        const HEADER: &str = concat!(
            r#"<?xml version="1.0" encoding="UTF-8"?>"#,
            "\n",
            r#"<kml xmlns="http://www.opengis.net/kml/2.2">"#,
            "\n",
            "<Document>\n"
        );

        self.output().write_all(HEADER.as_bytes())?;

        Ok(())
    }

    /// Close a document.
    fn finish_document(&mut self) {
        const FOOTER: &str = concat!(r#"</Document>"#, "\n", r#"</kml>"#, "\n");
        let _ = self.output().write_all(FOOTER.as_bytes());
    }

    /// Write a description element to the file.
    fn write_description(&mut self, description: &str) -> PortsResult<()> {
        writeln!(
            self.output(),
            "<description><![CDATA[{}]]></description>",
            description
        )?;
        Ok(())
    }

    /// Start a KML folder.
    fn start_folder(
        &mut self,
        name: Option<&str>,
        description: Option<&str>,
        is_open: bool,
    ) -> PortsResult<()> {
        self.output().write_all("<Folder>\n".as_bytes())?;

        if let Some(name) = name {
            writeln!(self.output(), "<name>{}</name>", name)?;
        }

        if let Some(description) = description {
            self.write_description(description)?;
        }

        if is_open {
            self.output().write_all("<open>1</open>\n".as_bytes())?;
        }

        Ok(())
    }

    /// Close out a folder element
    fn finish_folder(&mut self) -> PortsResult<()> {
        writeln!(self.output(), "</Folder>")?;
        Ok(())
    }

    /// Start a placemark element.
    fn start_placemark(
        &mut self,
        name: Option<&str>,
        description: Option<&str>,
        style_url: Option<&str>,
    ) -> PortsResult<()> {
        writeln!(self.output(), "<Placemark>")?;

        if let Some(name) = name {
            writeln!(self.output(), "<name>{}</name>", name)?;
        }

        if let Some(description) = description {
            self.write_description(description)?;
        }

        if let Some(style_url) = style_url {
            writeln!(self.output(), "<styleUrl>{}</styleUrl>", style_url)?;
        }

        Ok(())
    }

    /// Close out a placemark element.
    fn finish_placemark(&mut self) -> PortsResult<()> {
        writeln!(self.output(), "</Placemark>")?;
        Ok(())
    }

    /// Start a style definition.
    fn start_style(&mut self, style_id: Option<&str>) -> PortsResult<()> {
        if let Some(style_id) = style_id {
            writeln!(self.output(), "<Style id=\"{}\">", style_id)?;
        } else {
            writeln!(self.output(), "<Style>")?;
        }
        Ok(())
    }

    /// Close out a style definition.
    fn finish_style(&mut self) -> PortsResult<()> {
        writeln!(self.output(), "</Style>")?;
        Ok(())
    }

    /// Create a PolyStyle element.
    ///
    /// These should ONLY go inside a style element.
    fn create_poly_style(
        &mut self,
        color: Option<&str>,
        filled: bool,
        outlined: bool,
    ) -> PortsResult<()> {
        writeln!(self.output(), "<PolyStyle>")?;

        if let Some(color) = color {
            writeln!(self.output(), "<color>{}</color>", color)?;
            writeln!(self.output(), "<colorMode>normal</colorMode>")?;
        } else {
            writeln!(self.output(), "<colorMode>random</colorMode>")?;
        }

        writeln!(self.output(), "<fill>{}</fill>", u8::from(filled))?;
        writeln!(self.output(), "<outline>{}</outline>", u8::from(outlined))?;

        writeln!(self.output(), "</PolyStyle>")?;
        Ok(())
    }

    /// Create a LineStyle element, also used for polygon outlines.
    ///
    /// These should ONLY go inside a style element.
    fn create_line_style(&mut self, color: Option<&str>, width: f64) -> PortsResult<()> {
        writeln!(self.output(), "<LineStyle>")?;

        if let Some(color) = color {
            writeln!(self.output(), "<color>{}</color>", color)?;
        }

        if width > 0.0 {
            writeln!(self.output(), "<width>{}</width>", width)?;
        }

        writeln!(self.output(), "</LineStyle>")?;
        Ok(())
    }

    /// Write the geometry of a port boundary.
    fn write_boundary(&mut self, boundary: &Boundary) -> PortsResult<()> {
        match boundary {
            Boundary::Point(pnt) => self.create_point(pnt.y(), pnt.x(), 0.0),
            Boundary::Line(line) => self.create_line_string(line),
            Boundary::Polygon(poly) => {
                self.start_polygon(false, true, Some("clampToGround"))?;
                self.polygon_start_outer_ring()?;
                self.start_linear_ring()?;
                for c in poly.exterior().coords() {
                    self.linear_ring_add_vertex(c.y, c.x, 0.0)?;
                }
                self.finish_linear_ring()?;
                self.polygon_finish_outer_ring()?;
                self.finish_polygon()
            }
        }
    }

    /// Start a Polygon element.
    fn start_polygon(
        &mut self,
        extrude: bool,
        tessellate: bool,
        altitude_mode: Option<&str>,
    ) -> PortsResult<()> {
        self.output().write_all("<Polygon>\n".as_bytes())?;

        if let Some(altitude_mode) = altitude_mode {
            debug_assert!(
                altitude_mode == "clampToGround"
                    || altitude_mode == "relativeToGround"
                    || altitude_mode == "absolute"
            );

            writeln!(
                self.output(),
                "<altitudeMode>{}</altitudeMode>",
                altitude_mode
            )?;
        }

        if extrude {
            self.output()
                .write_all("<extrude>1</extrude>\n".as_bytes())?;
        }

        if tessellate {
            self.output()
                .write_all("<tessellate>1</tessellate>\n".as_bytes())?;
        }

        Ok(())
    }

    /// Close out a Polygon element.
    fn finish_polygon(&mut self) -> PortsResult<()> {
        self.output().write_all("</Polygon>\n".as_bytes())?;
        Ok(())
    }

    /// Start the polygon outer ring.
    ///
    /// This should only be used inside a Polygon element.
    fn polygon_start_outer_ring(&mut self) -> PortsResult<()> {
        self.output().write_all("<outerBoundaryIs>\n".as_bytes())?;
        Ok(())
    }

    /// End the polygon outer ring.
    ///
    /// This should only be used inside a Polygon element.
    fn polygon_finish_outer_ring(&mut self) -> PortsResult<()> {
        self.output().write_all("</outerBoundaryIs>\n".as_bytes())?;
        Ok(())
    }

    /// Start a LinearRing.
    fn start_linear_ring(&mut self) -> PortsResult<()> {
        self.output()
            .write_all("<LinearRing>\n<coordinates>\n".as_bytes())?;
        Ok(())
    }

    /// End a LinearRing.
    fn finish_linear_ring(&mut self) -> PortsResult<()> {
        self.output()
            .write_all("</coordinates>\n</LinearRing>\n".as_bytes())?;
        Ok(())
    }

    /// Add a vertex to the LinearRing
    ///
    /// Must be used inside a linear ring element.
    fn linear_ring_add_vertex(&mut self, lat: f64, lon: f64, z: f64) -> PortsResult<()> {
        writeln!(self.output(), "{},{},{}", lon, lat, z)?;
        Ok(())
    }

    /// Write out a KML LineString element, x is longitude and y is latitude.
    fn create_line_string(&mut self, line: &LineString<f64>) -> PortsResult<()> {
        self.output()
            .write_all("<LineString>\n<tessellate>1</tessellate>\n<coordinates>\n".as_bytes())?;
        for c in line.coords() {
            writeln!(self.output(), "{},{},0", c.x, c.y)?;
        }
        self.output()
            .write_all("</coordinates>\n</LineString>\n".as_bytes())?;
        Ok(())
    }

    /// Write out a KML Point element
    fn create_point(&mut self, lat: f64, lon: f64, z: f64) -> PortsResult<()> {
        writeln!(
            self.output(),
            "<Point>\n<coordinates>{},{},{}</coordinates>\n</Point>",
            lon,
            lat,
            z
        )?;
        Ok(())
    }
}
