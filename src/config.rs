use serde::{Deserialize, Serialize};
use anyhow::Result;
use std::path::{Path, PathBuf};

use crate::vecmath::Boundary;

// Snapshot input: where the time_<idx>.dat files live and which index range
// to include (inclusive on both ends).
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct InputConfig {
    pub data_dir: PathBuf,
    pub start_index: u32,
    pub end_index: u32,
}

// Analysis parameters shared by all three correlation functions.
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct AnalysisConfig {
    /// Bonding cutoff for connectivity clustering.
    pub lbond: f64,
    /// Radial bin width for all accumulators.
    pub dr: f64,
    /// Lattice spacing for gT(r). When absent, the spacing is estimated from
    /// the first peak of g(r) and gT is accumulated in a second pass.
    #[serde(default)]
    pub lattice_constant: Option<f64>,
}

// Domain periodicity. Box lengths are ignored when `periodic` is false.
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct BoundaryConfig {
    pub periodic: bool,
    #[serde(default)]
    pub box_x: f64,
    #[serde(default)]
    pub box_y: f64,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct OutputConfig {
    pub out_dir: PathBuf,
}

// Main run configuration, loaded from a TOML file.
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct RunConfig {
    pub input: InputConfig,
    pub analysis: AnalysisConfig,
    pub boundary: BoundaryConfig,
    pub output: OutputConfig,
}

impl RunConfig {
    /// Loads and validates the run configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path_ref = path.as_ref();

        let config_str = std::fs::read_to_string(path_ref)
            .map_err(|e| anyhow::anyhow!("Failed to read config file '{}': {}", path_ref.display(), e))?;
        let config: RunConfig = toml::from_str(&config_str)
            .map_err(|e| anyhow::anyhow!("Failed to parse TOML from '{}': {}", path_ref.display(), e))?;

        // --- Validation ---
        // Configuration errors abort before any snapshot is touched.
        if config.analysis.lbond <= 0.0 {
            anyhow::bail!("analysis.lbond must be positive (got {}).", config.analysis.lbond);
        }
        if config.analysis.dr <= 0.0 {
            anyhow::bail!("analysis.dr must be positive (got {}).", config.analysis.dr);
        }
        if let Some(a) = config.analysis.lattice_constant {
            if a <= 0.0 {
                anyhow::bail!("analysis.lattice_constant must be positive when set (got {}).", a);
            }
        }
        if config.input.start_index > config.input.end_index {
            anyhow::bail!(
                "input.start_index ({}) must not exceed input.end_index ({}).",
                config.input.start_index, config.input.end_index
            );
        }
        if config.boundary.periodic && (config.boundary.box_x <= 0.0 || config.boundary.box_y <= 0.0) {
            anyhow::bail!(
                "boundary.box_x and boundary.box_y must be positive when periodic (got {} x {}).",
                config.boundary.box_x, config.boundary.box_y
            );
        }

        Ok(config)
    }

    /// Converts the boundary section into the runtime periodicity descriptor.
    pub fn boundary(&self) -> Boundary {
        if self.boundary.periodic {
            Boundary::Periodic { box_x: self.boundary.box_x, box_y: self.boundary.box_y }
        } else {
            Boundary::Open
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(body: &str) -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().expect("temp file");
        f.write_all(body.as_bytes()).expect("write config");
        f
    }

    const VALID: &str = r#"
        [input]
        data_dir = "/data/run1"
        start_index = 1000
        end_index = 2000

        [analysis]
        lbond = 1.5
        dr = 0.5

        [boundary]
        periodic = true
        box_x = 180.0
        box_y = 180.0

        [output]
        out_dir = "/data/run1/out"
    "#;

    #[test]
    fn loads_a_valid_config() {
        let f = write_config(VALID);
        let config = RunConfig::load(f.path()).expect("valid config");
        assert_eq!(config.input.start_index, 1000);
        assert_eq!(config.analysis.lattice_constant, None);
        assert_eq!(
            config.boundary(),
            Boundary::Periodic { box_x: 180.0, box_y: 180.0 }
        );
    }

    #[test]
    fn rejects_non_positive_dr() {
        let f = write_config(&VALID.replace("dr = 0.5", "dr = 0.0"));
        assert!(RunConfig::load(f.path()).is_err());
    }

    #[test]
    fn rejects_non_positive_lbond() {
        let f = write_config(&VALID.replace("lbond = 1.5", "lbond = -1.0"));
        assert!(RunConfig::load(f.path()).is_err());
    }

    #[test]
    fn rejects_periodic_with_bad_box() {
        let f = write_config(&VALID.replace("box_x = 180.0", "box_x = 0.0"));
        assert!(RunConfig::load(f.path()).is_err());
    }

    #[test]
    fn ignores_box_when_not_periodic() {
        let f = write_config(&VALID.replace("periodic = true", "periodic = false"));
        let config = RunConfig::load(f.path()).expect("open-boundary config");
        assert_eq!(config.boundary(), Boundary::Open);
    }

    #[test]
    fn rejects_inverted_index_range() {
        let f = write_config(&VALID.replace("start_index = 1000", "start_index = 3000"));
        assert!(RunConfig::load(f.path()).is_err());
    }
}
