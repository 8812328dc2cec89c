//! Synthetic LAS tiles.
//!
//! Tiles are written with the `las` crate so engine tests exercise real
//! headers, VLRs and point records.

use std::path::{Path, PathBuf};

use las::point::{Classification, Format};
use las::{Builder, Point, Transform, Vector, Vlr, Writer};

/// Horizontal CRS used by the fixtures: NAD83(2011) / UTM zone 18N.
pub const UTM18_WKT: &str = r#"PROJCS["NAD83(2011) / UTM zone 18N",GEOGCS["NAD83(2011)",DATUM["NAD83_National_Spatial_Reference_System_2011",SPHEROID["GRS 1980",6378137,298.257222101,AUTHORITY["EPSG","7019"]],AUTHORITY["EPSG","1116"]],PRIMEM["Greenwich",0],UNIT["degree",0.0174532925199433],AUTHORITY["EPSG","6318"]],PROJECTION["Transverse_Mercator"],PARAMETER["latitude_of_origin",0],PARAMETER["central_meridian",-75],PARAMETER["scale_factor",0.9996],PARAMETER["false_easting",500000],PARAMETER["false_northing",0],UNIT["metre",1],AUTHORITY["EPSG","6347"]]"#;

/// Header versions the fixtures can produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LasVersion {
    /// LAS 1.2, point format 0 (classes up to 31).
    V1_2,
    /// LAS 1.4, point format 6 (classes up to 255).
    V1_4,
}

impl LasVersion {
    fn version(&self) -> (u8, u8) {
        match self {
            LasVersion::V1_2 => (1, 2),
            LasVersion::V1_4 => (1, 4),
        }
    }

    fn point_format(&self) -> u8 {
        match self {
            LasVersion::V1_2 => 0,
            LasVersion::V1_4 => 6,
        }
    }
}

/// One synthetic point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TilePoint {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub classification: u8,
    pub intensity: u16,
    pub return_number: u8,
    pub number_of_returns: u8,
    /// Flightline the point was collected on.
    pub point_source_id: u16,
    /// Value of the extra-bytes attribute, for tiles written with one.
    pub extra: f32,
}

impl TilePoint {
    /// Single-return point.
    pub fn new(x: f64, y: f64, z: f64, classification: u8) -> Self {
        Self {
            x,
            y,
            z,
            classification,
            intensity: 0,
            return_number: 1,
            number_of_returns: 1,
            point_source_id: 0,
            extra: 0.0,
        }
    }

    pub fn with_source(mut self, point_source_id: u16) -> Self {
        self.point_source_id = point_source_id;
        self
    }

    pub fn with_extra(mut self, extra: f32) -> Self {
        self.extra = extra;
        self
    }

    pub fn with_intensity(mut self, intensity: u16) -> Self {
        self.intensity = intensity;
        self
    }

    pub fn with_returns(mut self, return_number: u8, number_of_returns: u8) -> Self {
        self.return_number = return_number;
        self.number_of_returns = number_of_returns;
        self
    }
}

/// Extra-bytes descriptor of one little-endian `f32` attribute.
fn float_descriptor(name: &str) -> Vec<u8> {
    let mut d = vec![0u8; 192];
    d[2] = 9;
    let name = name.as_bytes();
    let len = name.len().min(32);
    d[4..4 + len].copy_from_slice(&name[..len]);
    d
}

/// Write a LAS tile at `path`.
///
/// `wkt` is stored as an OGC WKT projection record. LAS 1.4 tiles are
/// written without one; pass `None` for them.
pub fn write_las_tile(
    path: &Path,
    version: LasVersion,
    points: &[TilePoint],
    wkt: Option<&str>,
) -> las::Result<()> {
    write_tile(path, version, points, wkt, None)
}

/// Write a LAS tile whose points carry one `f32` extra-bytes attribute
/// named `attribute`, holding each point's [`TilePoint::extra`].
pub fn write_las_tile_with_extra(
    path: &Path,
    version: LasVersion,
    points: &[TilePoint],
    attribute: &str,
) -> las::Result<()> {
    write_tile(path, version, points, None, Some(attribute))
}

fn write_tile(
    path: &Path,
    version: LasVersion,
    points: &[TilePoint],
    wkt: Option<&str>,
    attribute: Option<&str>,
) -> las::Result<()> {
    let mut builder = Builder::from(version.version());
    builder.point_format = Format::new(version.point_format())?;
    if let Some(name) = attribute {
        builder.point_format.extra_bytes = 4;
        builder.vlrs.push(Vlr {
            user_id: "LASF_Spec".to_string(),
            record_id: 4,
            description: "Extra Bytes Record".to_string(),
            data: float_descriptor(name),
        });
    }
    let transform = Transform {
        scale: 0.01,
        offset: 0.0,
    };
    builder.transforms = Vector {
        x: transform,
        y: transform,
        z: transform,
    };
    if let Some(wkt) = wkt {
        builder.vlrs.push(Vlr {
            user_id: "LASF_Projection".to_string(),
            record_id: 2112,
            description: "OGC WKT".to_string(),
            data: wkt.as_bytes().to_vec(),
        });
    }
    let header = builder.into_header()?;

    let mut writer = Writer::from_path(path, header)?;
    for p in points {
        let point = Point {
            x: p.x,
            y: p.y,
            z: p.z,
            intensity: p.intensity,
            return_number: p.return_number,
            number_of_returns: p.number_of_returns,
            classification: Classification::new(p.classification)?,
            point_source_id: p.point_source_id,
            extra_bytes: match attribute {
                Some(_) => p.extra.to_le_bytes().to_vec(),
                None => Vec::new(),
            },
            gps_time: match version {
                LasVersion::V1_4 => Some(0.0),
                LasVersion::V1_2 => None,
            },
            ..Default::default()
        };
        writer.write_point(point)?;
    }
    writer.close()?;
    Ok(())
}

/// Temporary directory of tiles, removed on drop.
pub struct TileDir {
    dir: tempfile::TempDir,
}

impl TileDir {
    pub fn new() -> std::io::Result<Self> {
        Ok(Self {
            dir: tempfile::tempdir()?,
        })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Write a tile named `name` into the directory and return its path.
    pub fn tile(
        &self,
        name: &str,
        version: LasVersion,
        points: &[TilePoint],
        wkt: Option<&str>,
    ) -> las::Result<PathBuf> {
        let path = self.dir.path().join(name);
        write_las_tile(&path, version, points, wkt)?;
        Ok(path)
    }

    /// Write a tile with one `f32` extra-bytes attribute named `attribute`.
    pub fn tile_with_extra(
        &self,
        name: &str,
        version: LasVersion,
        points: &[TilePoint],
        attribute: &str,
    ) -> las::Result<PathBuf> {
        let path = self.dir.path().join(name);
        write_las_tile_with_extra(&path, version, points, attribute)?;
        Ok(path)
    }

    /// Write arbitrary bytes under `name` (for corrupt or non-tile files).
    pub fn file(&self, name: &str, contents: &[u8]) -> std::io::Result<PathBuf> {
        let path = self.dir.path().join(name);
        std::fs::write(&path, contents)?;
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_and_read_back() {
        let dir = TileDir::new().unwrap();
        let points = [
            TilePoint::new(10.5, 20.5, -3.0, 26),
            TilePoint::new(11.5, 20.5, -4.0, 2),
        ];
        let path = dir
            .tile("a.las", LasVersion::V1_2, &points, Some(UTM18_WKT))
            .unwrap();

        let mut reader = las::Reader::from_path(&path).unwrap();
        assert_eq!(reader.header().number_of_points(), 2);
        assert_eq!(reader.header().version().minor, 2);
        let classes: Vec<u8> = reader
            .points()
            .map(|p| u8::from(p.unwrap().classification))
            .collect();
        assert_eq!(classes, vec![26, 2]);
    }

    #[test]
    fn test_v14_high_class() {
        let dir = TileDir::new().unwrap();
        let path = dir
            .tile(
                "b.las",
                LasVersion::V1_4,
                &[TilePoint::new(0.5, 0.5, -1.0, 40)],
                None,
            )
            .unwrap();
        let mut reader = las::Reader::from_path(&path).unwrap();
        assert_eq!(reader.header().version().minor, 4);
        let point = reader.points().next().unwrap().unwrap();
        assert_eq!(u8::from(point.classification), 40);
    }

    #[test]
    fn test_extra_bytes_and_source_ids() {
        let dir = TileDir::new().unwrap();
        let points = [TilePoint::new(0.5, 0.5, -1.0, 26)
            .with_source(7)
            .with_extra(0.25)];
        let path = dir
            .tile_with_extra("c.las", LasVersion::V1_4, &points, "total_thu")
            .unwrap();

        let mut reader = las::Reader::from_path(&path).unwrap();
        assert_eq!(reader.header().point_format().extra_bytes, 4);
        assert!(reader
            .header()
            .vlrs()
            .iter()
            .any(|v| v.user_id.trim_end_matches('\0') == "LASF_Spec" && v.record_id == 4));
        let point = reader.points().next().unwrap().unwrap();
        assert_eq!(point.point_source_id, 7);
        assert_eq!(point.extra_bytes, 0.25f32.to_le_bytes().to_vec());
    }
}
