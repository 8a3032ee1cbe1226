use anyhow::{Context, Result};
use num_complex::Complex64;
use rayon::prelude::*;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use crate::vecmath::{Boundary, Vec2};

/// Run parameters stamped into every output table header for provenance.
#[derive(Debug, Clone)]
pub struct Provenance {
    pub start_index: u32,
    pub end_index: u32,
    pub lbond: f64,
    pub boundary: Boundary,
}

fn write_boundary_line<W: Write>(w: &mut W, boundary: Boundary) -> io::Result<()> {
    if let Boundary::Periodic { box_x, box_y } = boundary {
        writeln!(w, "# Box dims: {:.8} x {:.8}", box_x, box_y)?;
    }
    Ok(())
}

#[inline]
fn bin_center(b: usize, dr: f64) -> f64 {
    (b as f64 + 0.5) * dr
}

/// Largest admissible pair distance in the point set, parallel over i.
/// `rcut` (squared compare) excludes pairs beyond the reliable periodic range.
fn max_pair_distance(coms: &[Vec2], boundary: Boundary, rcut: Option<f64>) -> f64 {
    let m = coms.len();
    let rcut2 = rcut.map(|r| r * r);
    (0..m)
        .into_par_iter()
        .map(|i| {
            let pi = coms[i];
            let mut local: f64 = 0.0;
            for j in i + 1..m {
                let r2 = boundary.pair_delta(pi, coms[j]).length_squared();
                if let Some(c2) = rcut2 {
                    if r2 > c2 {
                        continue;
                    }
                }
                local = local.max(r2);
            }
            local
        })
        .reduce(|| 0.0, f64::max)
        .sqrt()
}

fn merge_scratch<T: std::ops::AddAssign>(mut a: Vec<T>, b: Vec<T>) -> Vec<T> {
    for (x, y) in a.iter_mut().zip(b) {
        *x += y;
    }
    a
}

// ---------------------------------------------------------------------------
// g6(r): hexatic correlation
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
struct G6Bin {
    /// Sum over contributing snapshots of the per-snapshot bin mean of
    /// Re[psi6(i) * conj(psi6(j))].
    re_sum: f64,
    im_sum: f64,
    /// Snapshots that contributed at least one pair to this bin.
    frames: u64,
    /// Total pairs ever binned here (provenance column only).
    pairs: u64,
}

/// Per-snapshot scratch: raw pair sums for one bin before frame averaging.
#[derive(Debug, Clone, Copy, Default)]
struct G6Frame {
    re: f64,
    im: f64,
    count: u64,
}

impl std::ops::AddAssign for G6Frame {
    fn add_assign(&mut self, rhs: Self) {
        self.re += rhs.re;
        self.im += rhs.im;
        self.count += rhs.count;
    }
}

/// Streaming accumulator for the hexatic correlation g6(r).
///
/// Frame-equal weighting: each snapshot's pair contributions are averaged per
/// bin first, and only that mean enters the running sum, so a snapshot with
/// many pairs counts no more than one with few. Under periodic boundaries,
/// pairs beyond half the smaller box edge are excluded from both binning and
/// bin growth; periodic radial statistics are unreliable out there.
#[derive(Debug)]
pub struct G6Accum {
    bins: Vec<G6Bin>,
    dr: f64,
}

impl G6Accum {
    pub fn new(dr: f64) -> Result<Self> {
        if dr <= 0.0 {
            anyhow::bail!("g6 accumulator: dr must be positive (got {})", dr);
        }
        Ok(Self { bins: Vec::new(), dr })
    }

    /// Grows the bin array to hold index `bmax`. Bins never shrink.
    fn ensure_bins(&mut self, bmax: usize) {
        if bmax >= self.bins.len() {
            self.bins.resize_with(bmax + 1, G6Bin::default);
        }
    }

    /// Folds one snapshot's COMs and order-parameter field into the bins.
    /// `psi6` must be index-aligned with `coms`.
    pub fn accumulate(&mut self, coms: &[Vec2], psi6: &[Complex64], boundary: Boundary) {
        let m = coms.len();
        if m < 2 {
            return;
        }
        debug_assert_eq!(psi6.len(), m);

        let rcut = boundary.half_min_extent();
        let rmax = max_pair_distance(coms, boundary, rcut);
        self.ensure_bins((rmax / self.dr).floor() as usize);

        let dr = self.dr;
        let nbins = self.bins.len();
        let frame: Vec<G6Frame> = (0..m)
            .into_par_iter()
            .fold(
                || vec![G6Frame::default(); nbins],
                |mut acc, i| {
                    let pi = coms[i];
                    for j in i + 1..m {
                        let r = boundary.pair_delta(pi, coms[j]).length();
                        if let Some(cut) = rcut {
                            if r > cut {
                                continue;
                            }
                        }
                        let b = (r / dr).floor() as usize;
                        if b >= nbins {
                            continue;
                        }
                        let prod = psi6[i] * psi6[j].conj();
                        acc[b].re += prod.re;
                        acc[b].im += prod.im;
                        acc[b].count += 1;
                    }
                    acc
                },
            )
            .reduce(|| vec![G6Frame::default(); nbins], merge_scratch);

        for (bin, f) in self.bins.iter_mut().zip(frame) {
            if f.count > 0 {
                let inv = 1.0 / f.count as f64;
                bin.re_sum += f.re * inv;
                bin.im_sum += f.im * inv;
                bin.frames += 1;
                bin.pairs += f.count;
            }
        }
    }

    /// Writes the averaged table; one row per bin that received any frames.
    pub fn write_table<W: Write>(&self, w: &mut W, prov: &Provenance) -> io::Result<()> {
        writeln!(
            w,
            "# Averaged g6(r) over snapshots time_{} .. time_{}",
            prov.start_index, prov.end_index
        )?;
        writeln!(w, "# Columns: r_center  Re[g6(r)]  Im[g6(r)]  |g6(r)|  frames  pair_count")?;
        writeln!(
            w,
            "# Params: dr = {:.8}  lbond = {:.8}  periodic = {}",
            self.dr,
            prov.lbond,
            prov.boundary.is_periodic()
        )?;
        write_boundary_line(w, prov.boundary)?;

        for (b, bin) in self.bins.iter().enumerate() {
            if bin.frames == 0 {
                continue;
            }
            let inv = 1.0 / bin.frames as f64;
            let re = bin.re_sum * inv;
            let im = bin.im_sum * inv;
            let mag = (re * re + im * im).sqrt();
            writeln!(
                w,
                "{:.8} {:.10e} {:.10e} {:.10e} {} {}",
                bin_center(b, self.dr), re, im, mag, bin.frames, bin.pairs
            )?;
        }
        Ok(())
    }

    pub fn write_file(&self, path: &Path, prov: &Provenance) -> Result<()> {
        let file = File::create(path)
            .with_context(|| format!("cannot create g6 output '{}'", path.display()))?;
        let mut w = BufWriter::new(file);
        self.write_table(&mut w, prov)
            .with_context(|| format!("cannot write g6 output '{}'", path.display()))?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// g(r): pair correlation
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
struct GrBin {
    pairs: u64,
    shell_area_sum: f64,
    ideal_pairs_sum: f64,
}

#[inline]
fn shell_area(rin: f64, rout: f64) -> f64 {
    std::f64::consts::PI * (rout * rout - rin * rin)
}

/// Streaming accumulator for the pair correlation g(r).
///
/// Bins raw pair counts and, alongside, the ideal-gas expected pair count per
/// bin (0.5 * M * rho * shell_area with rho = M / box area); the finalized
/// value is total observed over total ideal, an estimator rather than a
/// per-snapshot average. The ideal reference needs a number density, so it
/// only fills under periodic boundaries; open-boundary runs get zero ideal
/// sums and a zero g(r) column.
#[derive(Debug)]
pub struct GrAccum {
    bins: Vec<GrBin>,
    dr: f64,
    frames: u64,
}

impl GrAccum {
    pub fn new(dr: f64) -> Result<Self> {
        if dr <= 0.0 {
            anyhow::bail!("g(r) accumulator: dr must be positive (got {})", dr);
        }
        Ok(Self { bins: Vec::new(), dr, frames: 0 })
    }

    fn ensure_bins(&mut self, bmax: usize) {
        if bmax >= self.bins.len() {
            self.bins.resize_with(bmax + 1, GrBin::default);
        }
    }

    pub fn accumulate(&mut self, coms: &[Vec2], boundary: Boundary) {
        let m = coms.len();
        if m < 2 {
            return;
        }

        let rmax = max_pair_distance(coms, boundary, None);
        self.ensure_bins((rmax / self.dr).floor() as usize);

        let dr = self.dr;
        let nbins = self.bins.len();
        let counts: Vec<u64> = (0..m)
            .into_par_iter()
            .fold(
                || vec![0u64; nbins],
                |mut acc, i| {
                    let pi = coms[i];
                    for j in i + 1..m {
                        let r = boundary.pair_delta(pi, coms[j]).length();
                        let b = (r / dr).floor() as usize;
                        if b < nbins {
                            acc[b] += 1;
                        }
                    }
                    acc
                },
            )
            .reduce(|| vec![0u64; nbins], merge_scratch);

        let rho = match boundary {
            Boundary::Periodic { box_x, box_y } => m as f64 / (box_x * box_y),
            Boundary::Open => 0.0,
        };

        for (b, bin) in self.bins.iter_mut().enumerate() {
            bin.pairs += counts[b];
            let da = shell_area(b as f64 * dr, (b + 1) as f64 * dr);
            bin.shell_area_sum += da;
            if rho > 0.0 {
                bin.ideal_pairs_sum += 0.5 * m as f64 * rho * da;
            }
        }
        self.frames += 1;
    }

    /// Finalized g(r) for one bin: observed over ideal pair totals.
    fn value(&self, b: usize) -> f64 {
        let bin = &self.bins[b];
        if bin.ideal_pairs_sum <= 0.0 {
            0.0
        } else {
            bin.pairs as f64 / bin.ideal_pairs_sum
        }
    }

    /// Estimates the lattice spacing as the center of the first local maximum
    /// of g(r) that exceeds 1.0 (short-range order signature), falling back
    /// to the global maximum bin. Returns -1.0 when fewer than 3 bins exist.
    pub fn estimate_lattice_spacing(&self) -> f64 {
        if self.bins.len() < 3 {
            return -1.0;
        }

        let mut first_local_peak = None;
        let mut global_peak = 0;
        let mut global_peak_val = f64::NEG_INFINITY;

        for b in 1..self.bins.len() - 1 {
            let gm = self.value(b - 1);
            let g0 = self.value(b);
            let gp = self.value(b + 1);

            if g0 > global_peak_val {
                global_peak_val = g0;
                global_peak = b;
            }
            // >= on the right shoulder keeps plateau tops eligible.
            if first_local_peak.is_none() && g0 > gm && g0 >= gp && g0 > 1.0 {
                first_local_peak = Some(b);
            }
        }

        bin_center(first_local_peak.unwrap_or(global_peak), self.dr)
    }

    pub fn write_table<W: Write>(&self, w: &mut W, prov: &Provenance) -> io::Result<()> {
        writeln!(
            w,
            "# g(r) average over snapshots time_{} .. time_{}",
            prov.start_index, prov.end_index
        )?;
        writeln!(w, "# Columns: r_center  pair_count  shell_area  pair_density  ideal_pairs  g_r")?;
        writeln!(
            w,
            "# Params: dr = {:.8}  lbond = {:.8}  periodic = {}  frames = {}",
            self.dr,
            prov.lbond,
            prov.boundary.is_periodic(),
            self.frames
        )?;
        write_boundary_line(w, prov.boundary)?;

        for (b, bin) in self.bins.iter().enumerate() {
            if bin.pairs == 0 {
                continue;
            }
            let pair_density = if bin.shell_area_sum > 0.0 {
                bin.pairs as f64 / bin.shell_area_sum
            } else {
                0.0
            };
            writeln!(
                w,
                "{:.8} {} {:.10e} {:.10e} {:.10e} {:.10e}",
                bin_center(b, self.dr),
                bin.pairs,
                bin.shell_area_sum,
                pair_density,
                bin.ideal_pairs_sum,
                self.value(b)
            )?;
        }
        Ok(())
    }

    pub fn write_file(&self, path: &Path, prov: &Provenance) -> Result<()> {
        let file = File::create(path)
            .with_context(|| format!("cannot create g(r) output '{}'", path.display()))?;
        let mut w = BufWriter::new(file);
        self.write_table(&mut w, prov)
            .with_context(|| format!("cannot write g(r) output '{}'", path.display()))?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// gT(r): translational correlation
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
struct GtBin {
    ct_sum: f64,
    pairs: u64,
}

#[derive(Debug, Clone, Copy, Default)]
struct GtFrame {
    ct: f64,
    count: u64,
}

impl std::ops::AddAssign for GtFrame {
    fn add_assign(&mut self, rhs: Self) {
        self.ct += rhs.ct;
        self.count += rhs.count;
    }
}

/// Streaming accumulator for the translational correlation gT(r).
///
/// Fixes the reciprocal-lattice magnitude G = 4*pi / (a * sqrt(3)) from the
/// lattice spacing `a` at construction; each snapshot supplies its own
/// reference orientation theta_G, from which six reciprocal vectors at
/// 60-degree spacing are built. Each pair contributes the mean of
/// cos(G_n . delta_r) over the six directions to its distance bin.
#[derive(Debug)]
pub struct GtAccum {
    bins: Vec<GtBin>,
    dr: f64,
    a_lattice: f64,
    g_mag: f64,
}

impl GtAccum {
    pub fn new(dr: f64, a_lattice: f64) -> Result<Self> {
        if dr <= 0.0 {
            anyhow::bail!("gT accumulator: dr must be positive (got {})", dr);
        }
        if a_lattice <= 0.0 {
            anyhow::bail!("gT accumulator: lattice spacing must be positive (got {})", a_lattice);
        }
        let g_mag = 4.0 * std::f64::consts::PI / (a_lattice * 3f64.sqrt());
        Ok(Self { bins: Vec::new(), dr, a_lattice, g_mag })
    }

    pub fn lattice_spacing(&self) -> f64 {
        self.a_lattice
    }

    fn ensure_bins(&mut self, bmax: usize) {
        if bmax >= self.bins.len() {
            self.bins.resize_with(bmax + 1, GtBin::default);
        }
    }

    /// Folds one snapshot's COMs into the bins, with the snapshot's global
    /// orientation `theta_g` as the reference axis for the reciprocal set.
    pub fn accumulate(&mut self, coms: &[Vec2], theta_g: f64, boundary: Boundary) {
        let m = coms.len();
        if m < 2 {
            return;
        }

        let mut gvecs = [Vec2::zero(); 6];
        for (n, g) in gvecs.iter_mut().enumerate() {
            let ang = theta_g + n as f64 * std::f64::consts::PI / 3.0;
            *g = Vec2::new(self.g_mag * ang.cos(), self.g_mag * ang.sin());
        }

        let rmax = max_pair_distance(coms, boundary, None);
        self.ensure_bins((rmax / self.dr).floor() as usize);

        let dr = self.dr;
        let nbins = self.bins.len();
        let frame: Vec<GtFrame> = (0..m)
            .into_par_iter()
            .fold(
                || vec![GtFrame::default(); nbins],
                |mut acc, i| {
                    let pi = coms[i];
                    for j in i + 1..m {
                        let d = boundary.pair_delta(pi, coms[j]);
                        let b = (d.length() / dr).floor() as usize;
                        if b >= nbins {
                            continue;
                        }
                        let mut ct = 0.0;
                        for g in &gvecs {
                            ct += (g.x * d.x + g.y * d.y).cos();
                        }
                        acc[b].ct += ct / 6.0;
                        acc[b].count += 1;
                    }
                    acc
                },
            )
            .reduce(|| vec![GtFrame::default(); nbins], merge_scratch);

        for (bin, f) in self.bins.iter_mut().zip(frame) {
            bin.ct_sum += f.ct;
            bin.pairs += f.count;
        }
    }

    pub fn write_table<W: Write>(&self, w: &mut W, prov: &Provenance) -> io::Result<()> {
        writeln!(
            w,
            "# gT(r) average over snapshots time_{} .. time_{}",
            prov.start_index, prov.end_index
        )?;
        writeln!(w, "# Columns: r_center  gT  pair_count")?;
        writeln!(
            w,
            "# Params: dr = {:.8}  lbond = {:.8}  a_lattice = {:.8}  periodic = {}",
            self.dr,
            prov.lbond,
            self.a_lattice,
            prov.boundary.is_periodic()
        )?;
        write_boundary_line(w, prov.boundary)?;

        for (b, bin) in self.bins.iter().enumerate() {
            if bin.pairs == 0 {
                continue;
            }
            writeln!(
                w,
                "{:.8} {:.10e} {}",
                bin_center(b, self.dr),
                bin.ct_sum / bin.pairs as f64,
                bin.pairs
            )?;
        }
        Ok(())
    }

    pub fn write_file(&self, path: &Path, prov: &Provenance) -> Result<()> {
        let file = File::create(path)
            .with_context(|| format!("cannot create gT output '{}'", path.display()))?;
        let mut w = BufWriter::new(file);
        self.write_table(&mut w, prov)
            .with_context(|| format!("cannot write gT output '{}'", path.display()))?;
        Ok(())
    }
}
