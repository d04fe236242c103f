use clap::Args;
use indicatif::{
    ProgressBar,
    ProgressStyle,
};
use log::LevelFilter;
use txquant::utils::NUM_THREADS_ENV;

#[derive(Args, Debug, Clone)]
pub(crate) struct UtilsArgs {
    #[arg(
        short,
        long,
        global = true,
        default_value_t = 1,
        help = "Number of threads to use."
    )]
    pub threads:  usize,
    #[arg(
        short,
        long,
        global = true,
        default_value_t = false,
        help = "Verbose output."
    )]
    pub verbose:  bool,
    #[arg(
        long,
        global = true,
        default_value_t = false,
        help = "Display progress bar."
    )]
    pub progress: bool,
}

impl UtilsArgs {
    pub fn setup(&self) -> anyhow::Result<()> {
        init_logger(self.verbose)?;
        init_rayon_threads(self.threads)?;
        Ok(())
    }
}

pub(crate) fn init_logger(verbose: bool) -> anyhow::Result<()> {
    let level = if verbose {
        LevelFilter::Debug
    }
    else {
        LevelFilter::Info
    };
    pretty_env_logger::formatted_builder()
        .filter_level(level)
        .parse_env("RUST_LOG")
        .try_init()?;
    Ok(())
}

/// Sizes the global rayon pool and the pool the library uses for
/// effective length updates.
pub(crate) fn init_rayon_threads(threads: usize) -> anyhow::Result<()> {
    let threads = threads.max(1);
    std::env::set_var(NUM_THREADS_ENV, threads.to_string());
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build_global()?;
    Ok(())
}

pub(crate) fn init_pbar(total: usize) -> anyhow::Result<ProgressBar> {
    let progress_bar = ProgressBar::new(total as u64);
    progress_bar.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos:>3.green}/{len:3} {msg}")?
            .progress_chars("#>-"),
    );
    progress_bar.set_message("Aggregating...");
    Ok(progress_bar)
}
