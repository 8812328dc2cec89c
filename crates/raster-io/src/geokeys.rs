//! GeoTIFF tag numbers and the GeoKey directory.

use raster_common::SpatialRef;
use tiff::tags::Tag;

pub(crate) const MODEL_PIXEL_SCALE: u16 = 33550;
pub(crate) const MODEL_TIEPOINT: u16 = 33922;
pub(crate) const GEO_KEY_DIRECTORY: u16 = 34735;
pub(crate) const GEO_ASCII_PARAMS: u16 = 34737;
pub(crate) const GDAL_NODATA: u16 = 42113;

const GT_MODEL_TYPE: u16 = 1024;
const GT_RASTER_TYPE: u16 = 1025;
const GT_CITATION: u16 = 1026;
const GEOGRAPHIC_TYPE: u16 = 2048;
const GEOG_CITATION: u16 = 2049;
const PROJECTED_CS_TYPE: u16 = 3072;
const PCS_CITATION: u16 = 3073;

const MODEL_TYPE_PROJECTED: u16 = 1;
const MODEL_TYPE_GEOGRAPHIC: u16 = 2;
pub(crate) const RASTER_PIXEL_IS_AREA: u16 = 1;
pub(crate) const RASTER_PIXEL_IS_POINT: u16 = 2;
const USER_DEFINED: u16 = 32767;

/// Tag for a numeric id, resolving to the named variant when the codec knows it.
pub(crate) fn tag(id: u16) -> Tag {
    Tag::from_u16_exhaustive(id)
}

/// Encoded GeoKey directory plus the ASCII parameters it points into.
pub(crate) struct GeoKeyDirectory {
    pub keys: Vec<u16>,
    pub ascii: Option<String>,
}

impl GeoKeyDirectory {
    /// Directory describing `crs` (pixel-is-area). Unknown CRS yields the
    /// raster-type key only.
    pub fn for_crs(crs: Option<&SpatialRef>) -> Self {
        let mut entries: Vec<[u16; 4]> = Vec::new();
        let mut ascii = None;

        if let Some(crs) = crs {
            let geographic = crs.is_geographic();
            let model = if geographic {
                MODEL_TYPE_GEOGRAPHIC
            } else {
                MODEL_TYPE_PROJECTED
            };
            entries.push([GT_MODEL_TYPE, 0, 1, model]);
            entries.push([GT_RASTER_TYPE, 0, 1, RASTER_PIXEL_IS_AREA]);

            let code = crs
                .epsg
                .and_then(|c| u16::try_from(c).ok())
                .unwrap_or(USER_DEFINED);
            if code == USER_DEFINED {
                let citation = format!("{}|", crs.definition);
                let count = u16::try_from(citation.len()).unwrap_or(u16::MAX);
                entries.push([GT_CITATION, GEO_ASCII_PARAMS, count, 0]);
                ascii = Some(citation);
            }

            let type_key = if geographic {
                GEOGRAPHIC_TYPE
            } else {
                PROJECTED_CS_TYPE
            };
            entries.push([type_key, 0, 1, code]);
        } else {
            entries.push([GT_RASTER_TYPE, 0, 1, RASTER_PIXEL_IS_AREA]);
        }

        let mut keys = vec![1, 1, 0, entries.len() as u16];
        for entry in entries {
            keys.extend_from_slice(&entry);
        }
        Self { keys, ascii }
    }
}

/// What a decoded GeoKey directory says about the raster.
#[derive(Debug, Default)]
pub(crate) struct DecodedGeoKeys {
    pub crs: Option<SpatialRef>,
    pub pixel_is_point: bool,
}

/// Interpret a GeoKey directory and its ASCII parameters.
///
/// An EPSG type key wins over citations; a citation that parses as a CRS
/// definition is used otherwise.
pub(crate) fn decode(keys: &[u16], ascii: Option<&str>) -> DecodedGeoKeys {
    let mut decoded = DecodedGeoKeys::default();
    if keys.len() < 4 {
        return decoded;
    }

    let count = keys[3] as usize;
    let mut code = None;
    let mut citation = None;

    for entry in keys[4..].chunks_exact(4).take(count) {
        let (id, location, len, value) = (entry[0], entry[1], entry[2], entry[3]);
        match id {
            GT_RASTER_TYPE if location == 0 => {
                decoded.pixel_is_point = value == RASTER_PIXEL_IS_POINT;
            }
            GEOGRAPHIC_TYPE | PROJECTED_CS_TYPE if location == 0 && value != USER_DEFINED => {
                if code.is_none() || id == PROJECTED_CS_TYPE {
                    code = Some(value as u32);
                }
            }
            GT_CITATION | PCS_CITATION | GEOG_CITATION if location == GEO_ASCII_PARAMS => {
                if citation.is_none() {
                    citation = ascii.and_then(|a| ascii_slice(a, value as usize, len as usize));
                }
            }
            _ => {}
        }
    }

    decoded.crs = match code {
        Some(code) => Some(SpatialRef::from_epsg(code)),
        None => citation.and_then(|c| SpatialRef::parse(c).ok()),
    };
    decoded
}

fn ascii_slice(ascii: &str, offset: usize, len: usize) -> Option<&str> {
    let end = offset.checked_add(len)?.min(ascii.len());
    let s = ascii.get(offset..end)?;
    Some(s.trim_end_matches(['|', '\0']))
}
