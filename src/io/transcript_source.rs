use std::fs::File;
use std::io::BufReader;
use std::path::{
    Path,
    PathBuf,
};

use anyhow::Context;
use hashbrown::HashMap;
use log::{
    info,
    warn,
};
use noodles::fasta;

use crate::data_structs::Transcript;

/// Supplies transcript sequences for the bias models.
pub trait TranscriptSource {
    /// Attaches sequences to `transcripts`, matched by name.
    fn populate_targets(
        &mut self,
        transcripts: &mut [Transcript],
    ) -> anyhow::Result<()>;
}

/// Transcript sequences read from a (plain) FASTA file.
pub struct FastaTranscriptSource {
    path: PathBuf,
}

impl FastaTranscriptSource {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl TranscriptSource for FastaTranscriptSource {
    fn populate_targets(
        &mut self,
        transcripts: &mut [Transcript],
    ) -> anyhow::Result<()> {
        let index: HashMap<String, usize> = transcripts
            .iter()
            .enumerate()
            .map(|(i, t)| (t.name().to_string(), i))
            .collect();
        let file = File::open(&self.path)
            .with_context(|| format!("Failed to open transcripts {}", self.path.display()))?;
        let mut reader = fasta::io::Reader::new(BufReader::new(file));

        let mut filled = 0usize;
        for result in reader.records() {
            let record = result.with_context(|| "Failed to read FASTA record")?;
            let name = std::str::from_utf8(record.name())
                .with_context(|| "Invalid transcript name")?;
            let Some(&idx) = index.get(name) else {
                continue;
            };
            let sequence: &[u8] = record.sequence().as_ref();
            let txp = &mut transcripts[idx];
            if sequence.len() != txp.ref_length() as usize {
                warn!(
                    "Transcript {} has length {} in the alignment header but {} in {}",
                    name,
                    txp.ref_length(),
                    sequence.len(),
                    self.path.display()
                );
            }
            txp.set_sequence(sequence.to_vec());
            filled += 1;
        }

        let missing = transcripts
            .iter()
            .filter(|t| !t.has_sequence())
            .count();
        if missing > 0 {
            warn!(
                "{} of {} transcripts have no sequence in {}; sequence-dependent bias models will skip them",
                missing,
                transcripts.len(),
                self.path.display()
            );
        }
        info!("Loaded {} transcript sequences", filled);
        Ok(())
    }
}
