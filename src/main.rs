// std
use std::path::PathBuf;
use std::process;
use std::time::Instant;
// others
use structopt::StructOpt;
// pertmc
use pertmc::core::output;
use pertmc::core::reflection::AbsWeighting;
use pertmc::core::simulation::Simulation;

/// Monte Carlo photon transport in layered tissue with perturbation
/// banana tallies.
#[derive(Debug, StructOpt)]
#[structopt(name = "pertmc")]
struct Opt {
    /// Line-oriented input file (one value per line, trailing commentary
    /// ignored).
    #[structopt(parse(from_os_str))]
    input: PathBuf,
    /// Seed flag: 0 picks the fixed reproducible seed, anything else
    /// derives one from wall-clock time.
    #[structopt(long, default_value = "0")]
    seed: i32,
    /// Worker threads; results are bit-reproducible for a fixed value.
    #[structopt(long, default_value = "1")]
    threads: usize,
    /// Analog absorption weighting instead of continuous weight drop.
    #[structopt(long)]
    analog: bool,
    /// Enable Russian roulette below the weight limit.
    #[structopt(long)]
    roulette: bool,
    /// Write the per-detector binary photon history database.
    #[structopt(long)]
    photon_db: bool,
    /// Output directory; defaults to the input file's directory.
    #[structopt(long, parse(from_os_str))]
    out_dir: Option<PathBuf>,
    /// Half-extent (cm) of the rectangular beam along y.
    #[structopt(long, default_value = "4.0")]
    rect_half_y: f64,
}

fn display_intro() {
    println!();
    println!("     Monte Carlo simulation of light propagation");
    println!("            in a multi-layered tissue");
    println!("      with pMC and photon banana generation");
    println!();
}

fn main() {
    let opt = Opt::from_args();
    display_intro();

    let mut sim = match Simulation::from_input_file(&opt.input) {
        Ok(sim) => sim,
        Err(e) => {
            eprintln!("ERROR - {}", e);
            process::exit(1);
        }
    };
    sim.flags.seed = opt.seed;
    sim.flags.threads = opt.threads;
    sim.flags.roulette = opt.roulette;
    sim.flags.photon_db = opt.photon_db;
    if opt.analog {
        sim.flags.abs_weighting = AbsWeighting::Analog;
    }
    sim.source.rect_half_y = opt.rect_half_y;

    println!("beam radius= {}", sim.source.beam_radius);
    println!("beam type = {}", sim.source.beam_type);
    println!(
        "banana grid: nx,ny,nz = {},{},{}",
        2 * sim.detector.nr + 1,
        1,
        sim.detector.nz
    );

    let started = Instant::now();
    let mut result = sim.run();
    output::normalize_results(&mut result, &sim);

    let out_dir = opt.out_dir.clone().unwrap_or_else(|| {
        opt.input
            .parent()
            .map(|p| p.to_path_buf())
            .unwrap_or_else(|| PathBuf::from("."))
    });
    if let Err(e) = output::save_all(&result, &sim, &out_dir) {
        eprintln!("ERROR - cannot write results: {}", e);
        process::exit(1);
    }

    if sim.flags.photon_db {
        for (i, written) in result.photons_written().iter().enumerate() {
            println!(
                "det at {} -> {} photons written",
                sim.detector.det_ctr[i], written
            );
        }
    }
    let n = result.num_photons as f64;
    println!(
        "tot phot out top={}({:4.2}) bot={}({:4.2})",
        result.tallies.tot_out_top,
        result.tallies.tot_out_top as f64 / n,
        result.tallies.tot_out_bot,
        result.tallies.tot_out_bot as f64 / n
    );
    println!("Elapsed: {} ms", started.elapsed().as_millis());
}
