//! GeoTIFF write/read behaviour.

use std::io::Cursor;

use raster_common::{
    GeoTransform, PixelType, RasterBuffer, RasterProfile, SpatialRef, ELEVATION_NODATA,
};
use raster_io::{read_geotiff, read_geotiff_path, GeoTiffWriter, RasterCompression, RasterIoError};

fn elevation_raster() -> RasterBuffer {
    let profile = RasterProfile::new(
        3,
        2,
        GeoTransform::from_origin(500_000.0, 4_200_002.0, 1.0, 1.0),
        PixelType::Float32,
        Some(ELEVATION_NODATA),
    )
    .with_crs(Some(SpatialRef::from_epsg(6347)));
    RasterBuffer::new(
        profile,
        vec![-12.5, -12.25, ELEVATION_NODATA, -11.0, -10.5, -10.0],
    )
    .unwrap()
}

#[test]
fn test_file_preserves_georeference_and_nodata() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("QUICK_LOOK_mean.tif");

    let raster = elevation_raster();
    GeoTiffWriter::new().write_to_path(&raster, &path).unwrap();
    let back = read_geotiff_path(&path).unwrap();

    assert_eq!(back.width(), 3);
    assert_eq!(back.height(), 2);
    assert_eq!(back.profile.pixel_type, PixelType::Float32);
    assert_eq!(back.profile.transform, raster.profile.transform);
    assert_eq!(back.nodata(), Some(ELEVATION_NODATA));
    assert_eq!(back.profile.crs.as_ref().and_then(|c| c.epsg), Some(6347));
    assert_eq!(back.data(), raster.data());
    assert_eq!(back.valid_count(), 5);
}

#[test]
fn test_count_raster_as_uint32() {
    let profile = RasterProfile::new(
        2,
        2,
        GeoTransform::from_origin(0.0, 2.0, 1.0, 1.0),
        PixelType::UInt32,
        Some(0.0),
    );
    let raster = RasterBuffer::new(profile, vec![0.0, 3.0, f64::NAN, 12.0]).unwrap();

    let bytes = GeoTiffWriter::new()
        .with_compression(RasterCompression::Lzw)
        .to_bytes(&raster)
        .unwrap();
    let back = read_geotiff(Cursor::new(bytes)).unwrap();

    assert_eq!(back.profile.pixel_type, PixelType::UInt32);
    assert_eq!(back.data(), &[0.0, 3.0, 0.0, 12.0]);
    assert_eq!(back.nodata(), Some(0.0));
    assert!(back.profile.crs.is_none());
}

#[test]
fn test_deflate_shrinks_constant_raster() {
    let profile = RasterProfile::new(
        256,
        256,
        GeoTransform::from_origin(0.0, 256.0, 1.0, 1.0),
        PixelType::Float32,
        Some(ELEVATION_NODATA),
    );
    let raster = RasterBuffer::filled(profile, ELEVATION_NODATA).unwrap();

    let plain = GeoTiffWriter::new()
        .with_compression(RasterCompression::None)
        .to_bytes(&raster)
        .unwrap();
    let deflated = GeoTiffWriter::new()
        .with_compression(RasterCompression::Deflate)
        .to_bytes(&raster)
        .unwrap();

    assert!(deflated.len() < plain.len() / 10);
    let back = read_geotiff(Cursor::new(deflated)).unwrap();
    assert!(back.is_empty());
}

#[test]
fn test_plain_tiff_lacks_georeference() {
    use tiff::encoder::{colortype::Gray32Float, TiffEncoder};

    let mut cursor = Cursor::new(Vec::new());
    {
        let mut encoder = TiffEncoder::new(&mut cursor).unwrap();
        encoder
            .write_image::<Gray32Float>(2, 2, &[1.0, 2.0, 3.0, 4.0])
            .unwrap();
    }
    cursor.set_position(0);

    assert!(matches!(
        read_geotiff(cursor),
        Err(RasterIoError::MissingGeoreference(_))
    ));
}
