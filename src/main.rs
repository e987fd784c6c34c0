use clap::Parser;
use color_eyre::eyre::{self, WrapErr};
use itertools::Itertools;
use simtcore::{config, core, warp};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(author, version, about = "cycle level simulation of a SIMT core", long_about = None)]
struct Options {
    /// Program in memh format
    #[arg(short, long, value_name = "HEX")]
    program: PathBuf,
    /// Core configuration (yaml)
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// Data memory image in memh format, loaded at address 0
    #[arg(long)]
    data: Option<PathBuf>,
    /// Number of warp slots, overrides the config
    #[arg(long)]
    num_warps: Option<usize>,
    /// Enabled warps as a bitmask
    #[arg(short, long, default_value = "0x1", value_parser = parse_u32)]
    warps: u32,
    /// Start pc
    #[arg(long, default_value = "0x0", value_parser = parse_u32)]
    pc: u32,
    #[arg(long, default_value_t = 0)]
    block_dim: u32,
    #[arg(long, default_value_t = 1)]
    grid_dim: u32,
    #[arg(long, default_value_t = 0)]
    block_idx: u32,
    #[arg(long, default_value_t = 0)]
    thread_base: u32,
    #[arg(long, default_value_t = 1_000_000)]
    max_cycles: u64,
    /// Print the lanes of these registers for every launched warp
    #[arg(short, long)]
    dump: Vec<u32>,
    /// Increase log verbosity
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn parse_u32(value: &str) -> Result<u32, std::num::ParseIntError> {
    match value.strip_prefix("0x") {
        Some(hex) => u32::from_str_radix(hex, 16),
        None => value.parse(),
    }
}

fn main() -> eyre::Result<()> {
    color_eyre::install()?;
    let options = Options::parse();

    let level = match options.verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    env_logger::builder()
        .filter_level(level)
        .parse_default_env()
        .init();

    let mut config = match &options.config {
        Some(path) => config::Core::from_yaml(path)?,
        None => config::Core::default(),
    };
    if let Some(num_warps) = options.num_warps {
        config.num_warps = num_warps;
    }

    let program = simtcore::load_program(&options.program)?;
    log::info!(
        "loaded {} instructions from {}",
        program.len(),
        options.program.display()
    );

    let mut core = core::Simple::from_program(config, program)?;
    if let Some(path) = &options.data {
        let words = simtcore::load_program(path)?;
        core.dmem_mut()
            .load_words(0, &words)
            .ok_or_else(|| eyre::eyre!("data image of {} words does not fit", words.len()))?;
    }

    let launch = core::Launch {
        pc: options.pc,
        warp_enable: warp::warp_mask_from_bits(options.warps),
        thread_base: options.thread_base,
        block_idx: options.block_idx,
        block_dim: options.block_dim,
        grid_dim: options.grid_dim,
    };
    core.start(launch)?;

    let start = std::time::Instant::now();
    let cycles = core.run(options.max_cycles).wrap_err("simulation failed")?;
    log::info!("finished in {} cycles ({:?})", cycles, start.elapsed());

    let stats = core.stats();
    println!("{}", serde_json::to_string_pretty(&stats)?);

    for reg in &options.dump {
        if *reg as usize >= simtcore::register_file::NUM_REGISTERS {
            eyre::bail!("no register r{reg}");
        }
        for warp_id in launch.warp_enable.iter_ones() {
            let values = core.registers().read(warp_id, *reg);
            println!(
                "warp {warp_id:>2} r{reg:<2} {}",
                values.iter().map(|value| format!("{value:#x}")).join(" ")
            );
        }
    }
    Ok(())
}
