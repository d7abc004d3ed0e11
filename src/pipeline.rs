//! Per-(file, season) job orchestration and the batch runner.
//!
//! Stages hand rasters and point clouds to each other in memory; the only
//! files written are the final clipped artifact (via a temporary path,
//! renamed on success) and, when intermediate retention is on, per-stage
//! diagnostics artifacts.
//!
//! Jobs are file-scoped and independent: the batch runner fans out over
//! input files with rayon, sharing only the read-only lookup table, snap
//! grid and boundary. One job's failure is reported with its (alias,
//! season, stage) context and never aborts the rest of the batch.

use std::path::{Path, PathBuf};
use std::time::Instant;

use rayon::prelude::*;
use tracing::{info, warn};
use walkdir::WalkDir;

use crate::clip::{clip, Boundary};
use crate::composite::{composite, Season};
use crate::config::PipelineConfig;
use crate::error::{Error, Result};
use crate::geotiff::SnapGrid;
use crate::interpolate::IdwInterpolator;
use crate::landcover::LandCoverDataset;
use crate::lookup::CFactorTable;
use crate::points::{raster_to_points, write_xyz_csv};
use crate::raster::Raster;

/// Pipeline stage names used in failure reports.
pub mod stage {
    pub const COMPOSITE: &str = "composite";
    pub const REPROJECT: &str = "reproject";
    pub const SAMPLE: &str = "sample";
    pub const INTERPOLATE: &str = "interpolate";
    pub const CLIP: &str = "clip";
    pub const WRITE: &str = "write";
}

/// One failed (file, season) job with enough context to act on.
#[derive(Debug)]
pub struct JobFailure {
    pub alias: String,
    pub season: Season,
    pub stage: &'static str,
    pub error: Error,
}

impl std::fmt::Display for JobFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} [{}] failed at {}: {}",
            self.alias, self.season, self.stage, self.error
        )
    }
}

/// Outcome of a batch run.
#[derive(Debug, Default)]
pub struct RunSummary {
    /// Total (file, season) jobs attempted.
    pub jobs: usize,
    /// Jobs that produced a final artifact.
    pub succeeded: usize,
    pub failures: Vec<JobFailure>,
}

/// A validated, ready-to-run pipeline.
///
/// Construction performs all configuration-level checks; anything failing
/// here is fatal and aborts before per-file work starts.
pub struct Pipeline {
    config: PipelineConfig,
    table: CFactorTable,
    snap: SnapGrid,
    boundary: Boundary,
}

impl Pipeline {
    /// Validate the configuration and load the shared inputs.
    ///
    /// # Errors
    /// Any unreadable shared input (lookup table, snap raster, boundary) or
    /// a missing input directory.
    pub fn new(config: PipelineConfig) -> Result<Self> {
        if !config.landcover_dir.is_dir() {
            return Err(Error::format(
                &config.landcover_dir,
                "land-cover input directory does not exist",
            ));
        }

        let table = CFactorTable::from_csv(&config.lookup_table)?;
        let snap = SnapGrid::from_geotiff(&config.snap_raster)?;
        let boundary = Boundary::from_geojson(&config.boundary)?;

        if snap.epsg != config.target_epsg {
            warn!(
                snap_epsg = snap.epsg,
                target_epsg = config.target_epsg,
                "snap raster CRS differs from target CRS; output follows the target"
            );
        }

        std::fs::create_dir_all(&config.output_dir)?;
        std::fs::create_dir_all(&config.work_dir)?;

        Ok(Self {
            config,
            table,
            snap,
            boundary,
        })
    }

    /// Land-cover files in the input directory, sorted for determinism.
    #[must_use]
    pub fn discover_inputs(&self) -> Vec<PathBuf> {
        let mut files: Vec<PathBuf> = WalkDir::new(&self.config.landcover_dir)
            .max_depth(1)
            .into_iter()
            .filter_map(std::result::Result::ok)
            .filter(|e| {
                e.path()
                    .extension()
                    .and_then(|s| s.to_str())
                    .is_some_and(|ext| ext.eq_ignore_ascii_case("nc"))
            })
            .map(|e| e.path().to_path_buf())
            .collect();
        files.sort();
        files
    }

    /// Process every discovered (file, season) pair.
    pub fn run(&self) -> RunSummary {
        let started = Instant::now();
        let files = self.discover_inputs();
        if files.is_empty() {
            warn!(dir = %self.config.landcover_dir.display(), "no .nc input files found");
        }

        let mut summary = RunSummary {
            jobs: files.len() * Season::ALL.len(),
            ..RunSummary::default()
        };

        let outcomes: Vec<Vec<JobFailure>> = files
            .par_iter()
            .map(|path| self.process_file(path))
            .collect();
        for failures in outcomes {
            for failure in failures {
                warn!(%failure, "job failed");
                summary.failures.push(failure);
            }
        }
        summary.succeeded = summary.jobs - summary.failures.len();

        info!(
            jobs = summary.jobs,
            succeeded = summary.succeeded,
            failed = summary.failures.len(),
            elapsed_s = started.elapsed().as_secs_f64(),
            "batch finished"
        );
        summary
    }

    /// Run both seasons of one input file; failures are collected, not
    /// propagated.
    fn process_file(&self, path: &Path) -> Vec<JobFailure> {
        let alias = file_alias(path);
        info!(file = %path.display(), alias, "processing input");

        // Both seasonal fields come out of one compositing pass; a failure
        // here fails both jobs of the pair.
        let fields = match LandCoverDataset::open(path)
            .and_then(|ds| composite(&ds, &self.table))
        {
            Ok(fields) => fields,
            Err(error) => {
                let echo = clone_context(&error);
                return vec![
                    JobFailure {
                        alias: alias.clone(),
                        season: Season::Summer,
                        stage: stage::COMPOSITE,
                        error,
                    },
                    JobFailure {
                        alias,
                        season: Season::Winter,
                        stage: stage::COMPOSITE,
                        error: echo,
                    },
                ];
            }
        };

        let mut failures = Vec::new();
        for season in Season::ALL {
            if let Err((stage, error)) = self.process_season(&alias, season, fields.get(season)) {
                failures.push(JobFailure {
                    alias: alias.clone(),
                    season,
                    stage,
                    error,
                });
            }
        }
        failures
    }

    /// The per-season transform chain: reproject, sample, interpolate onto
    /// the snap grid, clip, write.
    fn process_season(
        &self,
        alias: &str,
        season: Season,
        field: &Raster,
    ) -> std::result::Result<(), (&'static str, Error)> {
        let cfg = &self.config;

        if cfg.keep_intermediates {
            let path = self.work_path(alias, season, "epsg4326.tif");
            field
                .write_geotiff(&path)
                .map_err(|e| (stage::COMPOSITE, e))?;
        }

        let reprojected = crate::reproject::reproject(field, cfg.target_epsg)
            .map_err(|e| (stage::REPROJECT, e))?;
        if cfg.keep_intermediates {
            let tag = format!("epsg{}.tif", cfg.target_epsg);
            reprojected
                .write_geotiff(self.work_path(alias, season, &tag))
                .map_err(|e| (stage::REPROJECT, e))?;
        }

        let points = raster_to_points(&reprojected);
        if cfg.keep_intermediates {
            write_xyz_csv(&points, self.work_path(alias, season, "points.csv"))
                .map_err(|e| (stage::SAMPLE, e))?;
        }

        let idw = IdwInterpolator::new(&points, cfg.interpolation)
            .map_err(|e| (stage::INTERPOLATE, e))?;
        let interpolated = idw
            .interpolate(
                self.snap.geometry.extent(),
                self.snap.geometry.pixel_size,
                cfg.target_epsg,
            )
            .map_err(|e| (stage::INTERPOLATE, e))?;
        if cfg.keep_intermediates {
            interpolated
                .write_geotiff(self.work_path(alias, season, "interpolation.tif"))
                .map_err(|e| (stage::INTERPOLATE, e))?;
        }

        let clipped = clip(&interpolated, &self.boundary).map_err(|e| (stage::CLIP, e))?;

        // Write to a temporary sibling and rename, so a cancelled or failed
        // job never leaves a partial final artifact.
        let final_path = cfg.output_dir.join(format!("{alias}_{season}_clip.tif"));
        let tmp_path = cfg.output_dir.join(format!("{alias}_{season}_clip.tif.partial"));
        if let Err(e) = clipped
            .write_geotiff(&tmp_path)
            .and_then(|()| std::fs::rename(&tmp_path, &final_path).map_err(Error::from))
        {
            let _ = std::fs::remove_file(&tmp_path);
            return Err((stage::WRITE, e));
        }

        if let Some(stats) = clipped.stats() {
            info!(
                alias,
                season = %season,
                path = %final_path.display(),
                min = stats.min,
                max = stats.max,
                mean = stats.mean,
                valid_cells = stats.valid_cells,
                "wrote clipped raster"
            );
        } else {
            warn!(alias, season = %season, "clipped raster has no valid cells");
        }
        Ok(())
    }

    fn work_path(&self, alias: &str, season: Season, tag: &str) -> PathBuf {
        self.config
            .work_dir
            .join(format!("{alias}_{season}_{tag}"))
    }
}

/// File alias: the stem of the input path.
#[must_use]
pub fn file_alias(path: &Path) -> String {
    path.file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("input")
        .to_string()
}

/// Duplicate an error's message for the second job of a shared-stage
/// failure (the source error itself is moved into the first report).
fn clone_context(error: &Error) -> Error {
    Error::Format {
        path: PathBuf::new(),
        reason: error.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::InterpolationParams;
    use crate::geotiff::read_geotiff;
    use crate::raster::{GridGeometry, Raster};
    use approx::assert_relative_eq;
    use std::path::Path;

    /// 10x10 grid of 0.05-degree cells over 20..20.5E, 49.5..50N, with two
    /// constant bands: PFT0 = 60 %, PFT1 = 40 %.
    fn write_landcover(path: &Path) {
        let mut file = netcdf::create(path).unwrap();
        file.add_dimension("longitude", 10).unwrap();
        file.add_dimension("latitude", 10).unwrap();

        let lons: Vec<f64> = (0..10).map(|i| 20.025 + 0.05 * i as f64).collect();
        let lats: Vec<f64> = (0..10).map(|i| 49.975 - 0.05 * i as f64).collect();
        let mut lon = file.add_variable::<f64>("longitude", &["longitude"]).unwrap();
        lon.put_values(&lons, ..).unwrap();
        let mut lat = file.add_variable::<f64>("latitude", &["latitude"]).unwrap();
        lat.put_values(&lats, ..).unwrap();

        for (k, pct) in [(0, 60.0), (1, 40.0)] {
            let mut band = file
                .add_variable::<f64>(&format!("PFT{k}"), &["longitude", "latitude"])
                .unwrap();
            band.put_values(&[pct; 100], ..).unwrap();
        }
    }

    /// Snap raster covering the reprojected extent in UTM 34N at 5 km cells.
    fn write_snap(path: &Path) {
        let geometry = GridGeometry {
            origin_x: 425_000.0,
            origin_y: 5_545_000.0,
            pixel_size: 5_000.0,
            width: 9,
            height: 13,
        };
        let raster = Raster::filled_nodata(geometry, 32634);
        // Geometry is all the template provides; pixel values are unused.
        raster.write_geotiff(path).unwrap();
    }

    fn write_boundary(path: &Path) {
        let text = r#"{
            "type": "Polygon",
            "coordinates": [[
                [432000.0, 5490000.0],
                [460000.0, 5490000.0],
                [460000.0, 5530000.0],
                [432000.0, 5530000.0],
                [432000.0, 5490000.0]
            ]]
        }"#;
        std::fs::write(path, text).unwrap();
    }

    fn config(root: &Path) -> PipelineConfig {
        PipelineConfig {
            landcover_dir: root.join("landuse"),
            lookup_table: root.join("cfactor.csv"),
            boundary: root.join("boundary.geojson"),
            snap_raster: root.join("snap.tif"),
            output_dir: root.join("export"),
            work_dir: root.join("tmp"),
            target_epsg: 32634,
            keep_intermediates: false,
            interpolation: InterpolationParams::default(),
        }
    }

    fn setup(root: &Path) {
        std::fs::create_dir_all(root.join("landuse")).unwrap();
        write_landcover(&root.join("landuse/ssp1.nc"));
        std::fs::write(
            root.join("cfactor.csv"),
            "index,summer,winter\n0,0.5,0.2\n1,1.0,0.5\n",
        )
        .unwrap();
        write_snap(&root.join("snap.tif"));
        write_boundary(&root.join("boundary.geojson"));
    }

    #[test]
    fn end_to_end_constant_field() {
        let dir = tempfile::tempdir().unwrap();
        setup(dir.path());

        let pipeline = Pipeline::new(config(dir.path())).unwrap();
        let summary = pipeline.run();
        assert_eq!(summary.jobs, 2);
        assert!(summary.failures.is_empty(), "failures: {:?}", summary.failures);

        // Constant input fractions: summer = 0.6*0.5 + 0.4*1.0 = 0.7,
        // winter = 0.6*0.2 + 0.4*0.5 = 0.32. IDW over a constant field is
        // that constant wherever any point is in range.
        for (season, expected) in [("summer", 0.7_f32), ("winter", 0.32_f32)] {
            let out = dir.path().join(format!("export/ssp1_{season}_clip.tif"));
            assert!(out.exists(), "missing {}", out.display());

            let raster = read_geotiff(&out).unwrap();
            assert_eq!(raster.epsg, 32634);
            assert!(raster.valid_cells() > 0);
            for &v in &raster.pixels {
                if !raster.is_nodata(v) {
                    assert_relative_eq!(v, expected, max_relative = 1e-5);
                }
            }

            // Clipped output stays inside the snap template's bounds.
            let extent = raster.geometry.extent();
            assert!(extent.min_x >= 425_000.0 && extent.max_x <= 470_000.0);
            assert!(extent.min_y >= 5_480_000.0 && extent.max_y <= 5_545_000.0);
        }

        // No partial artifacts and, without retention, no intermediates.
        let leftovers: Vec<_> = std::fs::read_dir(dir.path().join("export"))
            .unwrap()
            .filter_map(std::result::Result::ok)
            .filter(|e| e.path().to_string_lossy().ends_with(".partial"))
            .collect();
        assert!(leftovers.is_empty());
        assert_eq!(std::fs::read_dir(dir.path().join("tmp")).unwrap().count(), 0);
    }

    #[test]
    fn keep_intermediates_writes_stage_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        setup(dir.path());

        let pipeline =
            Pipeline::new(config(dir.path()).with_keep_intermediates(true)).unwrap();
        let summary = pipeline.run();
        assert!(summary.failures.is_empty(), "failures: {:?}", summary.failures);

        for name in [
            "ssp1_summer_epsg4326.tif",
            "ssp1_summer_epsg32634.tif",
            "ssp1_summer_points.csv",
            "ssp1_summer_interpolation.tif",
            "ssp1_winter_interpolation.tif",
        ] {
            assert!(dir.path().join("tmp").join(name).exists(), "missing {name}");
        }
    }

    #[test]
    fn bad_file_does_not_abort_batch() {
        let dir = tempfile::tempdir().unwrap();
        setup(dir.path());
        // A second, unreadable input: missing dimensions entirely.
        std::fs::write(dir.path().join("landuse/broken.nc"), b"not netcdf").unwrap();

        let pipeline = Pipeline::new(config(dir.path())).unwrap();
        let summary = pipeline.run();

        assert_eq!(summary.jobs, 4);
        assert_eq!(summary.succeeded, 2);
        assert_eq!(summary.failures.len(), 2);
        for failure in &summary.failures {
            assert_eq!(failure.alias, "broken");
            assert_eq!(failure.stage, stage::COMPOSITE);
        }
        assert!(dir.path().join("export/ssp1_summer_clip.tif").exists());
    }

    #[test]
    fn missing_input_dir_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        setup(dir.path());
        let mut cfg = config(dir.path());
        cfg.landcover_dir = dir.path().join("nope");
        assert!(Pipeline::new(cfg).is_err());
    }

    #[test]
    fn unreadable_lookup_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        setup(dir.path());
        let mut cfg = config(dir.path());
        cfg.lookup_table = dir.path().join("missing.csv");
        assert!(Pipeline::new(cfg).is_err());
    }

    #[test]
    fn alias_is_file_stem() {
        assert_eq!(file_alias(Path::new("/data/SSP1_RCP2_6.nc")), "SSP1_RCP2_6");
    }
}
