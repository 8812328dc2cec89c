//! Output compression selection.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Compression applied to GeoTIFF strips.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RasterCompression {
    None,
    Lzw,
    #[default]
    Deflate,
}

impl RasterCompression {
    pub(crate) fn to_tiff(self) -> tiff::encoder::Compression {
        use tiff::encoder::{Compression, DeflateLevel};
        match self {
            RasterCompression::None => Compression::Uncompressed,
            RasterCompression::Lzw => Compression::Lzw,
            RasterCompression::Deflate => Compression::Deflate(DeflateLevel::Fast),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RasterCompression::None => "none",
            RasterCompression::Lzw => "lzw",
            RasterCompression::Deflate => "deflate",
        }
    }
}

impl fmt::Display for RasterCompression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RasterCompression {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "none" | "uncompressed" => Ok(RasterCompression::None),
            "lzw" => Ok(RasterCompression::Lzw),
            "deflate" | "zip" => Ok(RasterCompression::Deflate),
            other => Err(format!(
                "unknown compression '{}', expected none, lzw or deflate",
                other
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse() {
        assert_eq!("DEFLATE".parse::<RasterCompression>(), Ok(RasterCompression::Deflate));
        assert_eq!("zip".parse::<RasterCompression>(), Ok(RasterCompression::Deflate));
        assert_eq!("none".parse::<RasterCompression>(), Ok(RasterCompression::None));
        assert!("jpeg".parse::<RasterCompression>().is_err());
        assert_eq!(RasterCompression::default(), RasterCompression::Deflate);
    }
}
