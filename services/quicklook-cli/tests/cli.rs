//! Runs the `quicklook` binary end to end.

use std::path::Path;
use std::process::{Command, Output};

use test_utils::{flat_points, LasVersion, TileDir, UTM18_WKT};

fn quicklook(input: &Path, output: &Path, extra: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_quicklook"))
        .arg(input)
        .arg(output)
        .args(["--no-progress", "--log-level", "warn"])
        .args(extra)
        .env_remove("QUICKLOOK_CONFIG")
        .output()
        .unwrap()
}

fn bottom_tile(dir: &TileDir, name: &str, x0: f64) {
    let points = flat_points(x0, 0.0, 2, 2, 26, -5.0);
    dir.tile(name, LasVersion::V1_2, &points, Some(UTM18_WKT))
        .unwrap();
}

#[test]
fn test_writes_mosaic_and_report() {
    let dir = TileDir::new().unwrap();
    bottom_tile(&dir, "a.las", 0.0);
    bottom_tile(&dir, "b.las", 2.0);
    let out = tempfile::tempdir().unwrap();

    let result = quicklook(dir.path(), out.path(), &["-s", "count", "-w", "2"]);
    assert_eq!(result.status.code(), Some(0));
    assert!(out.path().join("QUICK_LOOK_count.tif").exists());
    assert!(out.path().join("QUICK_LOOK_count.json").exists());
}

#[test]
fn test_explicit_tif_path() {
    let dir = TileDir::new().unwrap();
    bottom_tile(&dir, "a.las", 0.0);
    let out = tempfile::tempdir().unwrap();
    let target = out.path().join("nested").join("survey.tif");

    let target_arg = target.display().to_string();
    let result = Command::new(env!("CARGO_BIN_EXE_quicklook"))
        .arg(dir.path())
        .arg(&target_arg)
        .args(["--no-progress", "--no-report"])
        .env_remove("QUICKLOOK_CONFIG")
        .output()
        .unwrap();
    assert_eq!(result.status.code(), Some(0));
    assert!(target.exists());
}

#[test]
fn test_no_input_tiles() {
    let dir = TileDir::new().unwrap();
    dir.file("readme.txt", b"nothing here").unwrap();
    let out = tempfile::tempdir().unwrap();

    let result = quicklook(dir.path(), out.path(), &[]);
    assert_eq!(result.status.code(), Some(3));
    assert_eq!(std::fs::read_dir(out.path()).unwrap().count(), 0);
}

#[test]
fn test_no_tiles_generated() {
    let dir = TileDir::new().unwrap();
    let land = flat_points(0.0, 0.0, 2, 2, 2, 1.0);
    dir.tile("land.las", LasVersion::V1_2, &land, Some(UTM18_WKT))
        .unwrap();
    let out = tempfile::tempdir().unwrap();

    let result = quicklook(dir.path(), out.path(), &["--no-report"]);
    assert_eq!(result.status.code(), Some(4));
    assert!(!out.path().join("QUICK_LOOK_mean.tif").exists());
}

#[test]
fn test_strict_policy_exit_code() {
    let dir = TileDir::new().unwrap();
    bottom_tile(&dir, "a.las", 0.0);
    dir.file("broken.las", b"not a las file").unwrap();
    let out = tempfile::tempdir().unwrap();

    let tolerant = quicklook(dir.path(), out.path(), &[]);
    assert_eq!(tolerant.status.code(), Some(0));

    let strict = quicklook(dir.path(), out.path(), &["--failure-policy", "strict"]);
    assert_eq!(strict.status.code(), Some(5));
    assert!(out.path().join("QUICK_LOOK_mean.tif").exists());
}

#[test]
fn test_usage_errors() {
    let out = tempfile::tempdir().unwrap();

    let bad_stat = quicklook(out.path(), out.path(), &["-s", "median"]);
    assert_eq!(bad_stat.status.code(), Some(2));

    let bad_resolution = quicklook(out.path(), out.path(), &["-r", "0"]);
    assert_eq!(bad_resolution.status.code(), Some(1));
}

#[test]
fn test_class_list_and_dz() {
    let dir = TileDir::new().unwrap();
    let mut points = flat_points(0.0, 0.0, 2, 1, 26, -5.0);
    points.extend(test_utils::reclassify(&flat_points(2.0, 0.0, 2, 1, 0, 1.0), 2));
    dir.tile("a.las", LasVersion::V1_2, &points, Some(UTM18_WKT))
        .unwrap();
    let out = tempfile::tempdir().unwrap();

    let both = quicklook(dir.path(), out.path(), &["-s", "count", "-c", "2,26"]);
    assert_eq!(both.status.code(), Some(0));
    let mosaic = raster_io::read_geotiff_path(out.path().join("QUICK_LOOK_count.tif")).unwrap();
    assert_eq!(mosaic.data().iter().sum::<f64>(), 4.0);

    // One flightline only: nothing to compare
    let dz = quicklook(dir.path(), out.path(), &["-s", "dz"]);
    assert_eq!(dz.status.code(), Some(4));
}
