use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;

use clap::Args;
use console::style;
use indicatif::ProgressBar;
use log::info;
use txquant::prelude::*;

use crate::utils::{
    init_pbar,
    UtilsArgs,
};

#[derive(Args, Debug, Clone)]
pub(crate) struct QuantArgs {
    #[arg(
        short = 'a',
        long,
        value_parser,
        num_args = 1..,
        required = true,
        help = "SAM/BAM alignment files. All must share the same @SQ records."
    )]
    alignments:  Vec<PathBuf>,
    #[arg(short = 'T', long, required = true, help = "Transcript sequences (FASTA).")]
    transcripts: PathBuf,
    #[arg(
        short = 'l',
        long,
        default_value = "IU",
        help = "Library format code, e.g. IU, ISF, U, SR."
    )]
    libtype:     String,
    #[arg(long, default_value_t = 1, help = "Passes over the alignments.")]
    passes:      usize,
    #[arg(long, help = "JSON file overriding the default options.")]
    config:      Option<PathBuf>,
    #[arg(short, long, required = true, help = "Path of the JSON model summary.")]
    output:      PathBuf,
}

impl QuantArgs {
    pub fn run(
        &self,
        utils: &UtilsArgs,
    ) -> anyhow::Result<()> {
        let lib_format: LibraryFormat = self.libtype.parse()?;
        let config = match &self.config {
            Some(path) => QuantConfig::from_json(path)?,
            None => QuantConfig::default().with_num_quant_threads(utils.threads),
        };
        let num_threads = config.num_quant_threads;
        let mut library = AlignmentLibrary::try_new(
            self.alignments.clone(),
            &self.transcripts,
            lib_format,
            config,
        )?;
        info!(
            "Bound {} alignment file(s) over {} transcripts ({})",
            library.alignment_files().len(),
            library.transcripts().len(),
            lib_format
        );

        let passes = self.passes.max(1);
        let progress_bar = if utils.progress {
            init_pbar(passes)?
        }
        else {
            ProgressBar::hidden()
        };

        for pass in 0..passes {
            if pass > 0 && !library.reset(true, None, false) {
                anyhow::bail!("Could not rewind the alignment files for pass {}", pass + 1);
            }
            let summary = run_pass(&library, num_threads);
            progress_bar.set_message(format!("{} fragments", summary.num_groups));
            progress_bar.inc(1);
        }
        progress_bar.finish_and_clear();

        let writer = BufWriter::new(File::create(&self.output)?);
        ModelSummary::from_library(&library).write_json(writer)?;
        println!(
            "[{}] Mapping rate {:.2}%, summary written to {}",
            style("V").green(),
            100.0 * library.effective_mapping_rate(),
            style(self.output.display()).green()
        );
        Ok(())
    }
}
