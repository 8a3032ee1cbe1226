use anyhow::{Context, Result};
use log::{info, warn, debug};
use num_complex::Complex64;
use std::path::Path;
use std::time::Instant;

// Define modules used by main
mod accum;
mod clusters;
mod com;
mod config;
mod delaunay;
mod psi6;
mod snapshot;
mod vecmath;

use accum::{G6Accum, GrAccum, GtAccum, Provenance};
use config::RunConfig;
use delaunay::{DelaunayBackend, Triangulator};
use vecmath::{Boundary, Vec2};

/// Everything one snapshot feeds into the accumulators. Produced only when
/// the full pipeline succeeded, so a failed stage can never leave partial
/// state behind in an accumulator.
struct SnapshotProducts {
    coms: Vec<Vec2>,
    psi6: Vec<Complex64>,
    theta_g: f64,
}

/// Runs the five-stage pipeline on one snapshot file:
/// read -> cluster -> centers -> neighbor graph -> psi6/orientation.
fn process_snapshot(
    path: &Path,
    lbond: f64,
    boundary: Boundary,
    tri: &dyn Triangulator,
) -> Result<SnapshotProducts> {
    let positions = snapshot::read_positions(path)?;
    if positions.is_empty() {
        anyhow::bail!("empty snapshot");
    }
    debug!("  read {} particles", positions.len());

    let assignment = clusters::find_clusters(&positions, lbond, boundary)
        .context("clustering failed")?;
    debug!("  clustering done, {} clusters", assignment.nclusters);
    if assignment.nclusters < 2 {
        anyhow::bail!("fewer than 2 clusters ({}), no pair statistics", assignment.nclusters);
    }

    let members = assignment.members();
    let coms = com::cluster_centers(&positions, &members, boundary);
    debug!("  {} cluster centers computed", coms.len());

    let neighbors = delaunay::build_neighbor_graph(&coms, boundary, tri)
        .context("neighbor graph failed")?;

    let psi6 = psi6::compute_psi6(&coms, &neighbors, boundary);
    let theta_g = psi6::global_orientation_angle(&psi6);
    debug!("  psi6 computed, global orientation {:.4} rad", theta_g);

    Ok(SnapshotProducts { coms, psi6, theta_g })
}

fn main() -> Result<()> {
    // Initialize the logger
    env_logger::init();

    let config_path = std::env::args().nth(1).unwrap_or_else(|| "analysis.toml".to_string());
    info!("Loading run configuration from '{}'...", config_path);
    let config = RunConfig::load(&config_path)?;
    debug!("Run configuration: {:#?}", config);

    let boundary = config.boundary();
    let lbond = config.analysis.lbond;
    let dr = config.analysis.dr;
    let start = config.input.start_index;
    let end = config.input.end_index;

    std::fs::create_dir_all(&config.output.out_dir).with_context(|| {
        format!("cannot create output directory '{}'", config.output.out_dir.display())
    })?;

    // --- Discover snapshots ---
    let files = snapshot::discover_snapshots(&config.input.data_dir, start, end)?;
    if files.is_empty() {
        anyhow::bail!(
            "no snapshot files matching time_<idx>.dat in '{}' within [{}, {}]",
            config.input.data_dir.display(), start, end
        );
    }
    info!("Found {} snapshot files in range [{}, {}].", files.len(), start, end);

    let tri = DelaunayBackend;
    let mut g6 = G6Accum::new(dr)?;
    let mut gr = GrAccum::new(dr)?;
    // gT joins the first pass only when the lattice spacing is known up
    // front; otherwise it waits for the g(r) estimate and a second pass.
    let mut gt = config
        .analysis
        .lattice_constant
        .map(|a| GtAccum::new(dr, a))
        .transpose()?;

    // --- Pass 1: g6 and g(r) (and gT with a fixed lattice spacing) ---
    let start_time = Instant::now();
    let mut processed = 0usize;
    let mut skipped = 0usize;
    for (k, (tindex, path)) in files.iter().enumerate() {
        info!("[{}/{}] Processing {} (t={})", k + 1, files.len(), path.display(), tindex);
        match process_snapshot(path, lbond, boundary, &tri) {
            Ok(products) => {
                g6.accumulate(&products.coms, &products.psi6, boundary);
                gr.accumulate(&products.coms, boundary);
                if let Some(gt) = gt.as_mut() {
                    gt.accumulate(&products.coms, products.theta_g, boundary);
                }
                processed += 1;
            }
            Err(e) => {
                warn!("Skipping snapshot t={} ('{}'): {:#}", tindex, path.display(), e);
                skipped += 1;
            }
        }
    }
    if processed == 0 {
        warn!("No snapshot survived the pipeline; output tables will be empty.");
    }

    // --- Pass 2 (auto mode): gT with the spacing estimated from g(r) ---
    let gt = match gt {
        Some(acc) => acc,
        None => {
            let a = gr.estimate_lattice_spacing();
            if a <= 0.0 {
                anyhow::bail!("cannot estimate lattice spacing from g(r): too few bins accumulated");
            }
            info!("Estimated lattice spacing a = {:.4} from the first g(r) peak.", a);

            let mut acc = GtAccum::new(dr, a)?;
            for (tindex, path) in &files {
                match process_snapshot(path, lbond, boundary, &tri) {
                    Ok(products) => acc.accumulate(&products.coms, products.theta_g, boundary),
                    // Already reported in pass 1.
                    Err(e) => debug!("pass 2: snapshot t={} skipped again: {:#}", tindex, e),
                }
            }
            acc
        }
    };

    // --- Write averaged tables ---
    let prov = Provenance { start_index: start, end_index: end, lbond, boundary };
    let out_dir = &config.output.out_dir;
    let g6_path = out_dir.join(format!("g6_avg_time_{}_{}.dat", start, end));
    let gr_path = out_dir.join(format!("gr_avg_time_{}_{}.dat", start, end));
    let gt_path = out_dir.join(format!("gt_avg_time_{}_{}.dat", start, end));

    g6.write_file(&g6_path, &prov)?;
    gr.write_file(&gr_path, &prov)?;
    gt.write_file(&gt_path, &prov)?;

    info!(
        "Done in {:.2} s: {} snapshots processed, {} skipped (a_lattice = {:.4}).",
        start_time.elapsed().as_secs_f64(), processed, skipped, gt.lattice_spacing()
    );
    info!("Wrote {}", g6_path.display());
    info!("Wrote {}", gr_path.display());
    info!("Wrote {}", gt_path.display());

    Ok(())
}
