#![allow(dead_code)]

use std::io::Write;
use std::path::{
    Path,
    PathBuf,
};

use anyhow::Result;
use crossbeam::queue::ArrayQueue;
use txquant::prelude::*;
use txquant::data_structs::{
    CigarKind,
    CigarOp,
    RawFragment,
};

/// One SAM alignment line.
pub struct SamLine<'a> {
    pub name:  &'a str,
    pub flag:  u16,
    pub rname: &'a str,
    /// 1-based, 0 for unmapped.
    pub pos:   u32,
    pub cigar: String,
    pub rnext: &'a str,
    pub pnext: u32,
    pub tlen:  i32,
    pub seq:   &'a str,
}

impl<'a> SamLine<'a> {
    pub fn single(
        name: &'a str,
        rname: &'a str,
        pos: u32,
        seq: &'a str,
    ) -> Self {
        Self {
            name,
            flag: 0,
            rname,
            pos,
            cigar: format!("{}M", seq.len()),
            rnext: "*",
            pnext: 0,
            tlen: 0,
            seq,
        }
    }

    pub fn unmapped(name: &'a str) -> Self {
        Self {
            name,
            flag: 4,
            rname: "*",
            pos: 0,
            cigar: "*".to_string(),
            rnext: "*",
            pnext: 0,
            tlen: 0,
            seq: "ACGTACGTAC",
        }
    }

    /// Both mates of a forward/reverse pair with outer distance `frag_len`.
    /// `seqs` are the mates' bases on the reference strand.
    pub fn pair(
        name: &'a str,
        rname: &'a str,
        pos: u32,
        frag_len: u32,
        seqs: [&'a str; 2],
    ) -> [Self; 2] {
        let mate_pos = pos + frag_len - seqs[1].len() as u32;
        [
            Self {
                name,
                flag: 99,
                rname,
                pos,
                cigar: format!("{}M", seqs[0].len()),
                rnext: "=",
                pnext: mate_pos,
                tlen: frag_len as i32,
                seq: seqs[0],
            },
            Self {
                name,
                flag: 147,
                rname,
                pos: mate_pos,
                cigar: format!("{}M", seqs[1].len()),
                rnext: "=",
                pnext: pos,
                tlen: -(frag_len as i32),
                seq: seqs[1],
            },
        ]
    }

    fn write_to<W: Write>(
        &self,
        writer: &mut W,
    ) -> Result<()> {
        writeln!(
            writer,
            "{}\t{}\t{}\t{}\t255\t{}\t{}\t{}\t{}\t{}\t*",
            self.name,
            self.flag,
            self.rname,
            self.pos,
            self.cigar,
            self.rnext,
            self.pnext,
            self.tlen,
            self.seq
        )?;
        Ok(())
    }
}

pub fn write_sam(
    path: &Path,
    references: &[(&str, usize)],
    lines: &[SamLine],
) -> Result<()> {
    let mut file = std::fs::File::create(path)?;
    writeln!(file, "@HD\tVN:1.6\tSO:unsorted")?;
    for (name, len) in references {
        writeln!(file, "@SQ\tSN:{}\tLN:{}", name, len)?;
    }
    for line in lines {
        line.write_to(&mut file)?;
    }
    Ok(())
}

pub fn write_fasta(
    path: &Path,
    records: &[(&str, &[u8])],
) -> Result<()> {
    let mut file = std::fs::File::create(path)?;
    for (name, seq) in records {
        writeln!(file, ">{}", name)?;
        for chunk in seq.chunks(60) {
            file.write_all(chunk)?;
            writeln!(file)?;
        }
    }
    Ok(())
}

/// Deterministic pseudo-random transcript sequence.
pub fn synthetic_sequence(
    len: usize,
    seed: u64,
) -> Vec<u8> {
    let mut state = seed.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
    (0..len)
        .map(|_| {
            state = state
                .wrapping_mul(6364136223846793005)
                .wrapping_add(1442695040888963407);
            b"ACGT"[(state >> 33) as usize % 4]
        })
        .collect()
}

pub fn path_in(
    dir: &tempfile::TempDir,
    name: &str,
) -> PathBuf {
    dir.path().join(name)
}

/// Transcript source backed by in-memory sequences.
#[derive(Default)]
pub struct InMemoryTranscripts(pub Vec<(String, Vec<u8>)>);

impl TranscriptSource for InMemoryTranscripts {
    fn populate_targets(
        &mut self,
        transcripts: &mut [Transcript],
    ) -> Result<()> {
        for txp in transcripts.iter_mut() {
            if let Some((_, seq)) = self.0.iter().find(|(name, _)| name == txp.name()) {
                txp.set_sequence(seq.clone());
            }
        }
        Ok(())
    }
}

/// Alignment source replaying a fixed list of groups.
pub struct VecSource {
    headers:   Vec<ReferenceHeader>,
    groups:    Vec<AlignmentGroup>,
    fragments: ArrayQueue<RawFragment>,
    queue:     ArrayQueue<AlignmentGroup>,
    counters:  FragmentCounters,
}

impl VecSource {
    pub fn new(
        header: ReferenceHeader,
        groups: Vec<AlignmentGroup>,
    ) -> Self {
        let capacity = groups.len().max(1);
        Self {
            headers: vec![header],
            groups,
            fragments: ArrayQueue::new(1),
            queue: ArrayQueue::new(capacity),
            counters: FragmentCounters::new(),
        }
    }

    pub fn with_headers(
        headers: Vec<ReferenceHeader>,
        groups: Vec<AlignmentGroup>,
    ) -> Self {
        let mut source = Self::new(headers[0].clone(), groups);
        source.headers = headers;
        source
    }
}

impl AlignmentSource for VecSource {
    fn files(&self) -> &[PathBuf] {
        &[]
    }

    fn headers(&self) -> &[ReferenceHeader] {
        &self.headers
    }

    fn header(&self) -> &ReferenceHeader {
        &self.headers[0]
    }

    fn start(
        &mut self,
        filter: Option<FragmentFilter>,
        only_ambiguous: bool,
    ) -> Result<()> {
        for group in self.groups.iter() {
            self.counters.record(group);
            if only_ambiguous && !group.is_ambiguous() {
                continue;
            }
            if filter.as_ref().is_some_and(|keep| !keep(group)) {
                continue;
            }
            self.queue
                .push(group.clone())
                .map_err(|_| anyhow::anyhow!("queue full"))?;
        }
        Ok(())
    }

    fn reset(&mut self) -> Result<()> {
        while self.queue.pop().is_some() {}
        self.counters.reset();
        Ok(())
    }

    fn get_alignment_group(&self) -> Option<AlignmentGroup> {
        self.queue.pop()
    }

    fn is_exhausted(&self) -> bool {
        self.queue.is_empty()
    }

    fn fragment_queue(&self) -> &ArrayQueue<RawFragment> {
        &self.fragments
    }

    fn alignment_group_queue(&self) -> &ArrayQueue<AlignmentGroup> {
        &self.queue
    }

    fn counters(&self) -> &FragmentCounters {
        &self.counters
    }
}

pub fn read(
    pos: u32,
    fwd: bool,
    len: u32,
) -> AlignedRead {
    AlignedRead::new(
        pos,
        fwd,
        vec![CigarOp::new(CigarKind::Match, len)],
        vec![b'A'; len as usize],
    )
}

/// A properly paired forward/reverse fragment on `tid`.
pub fn paired_alignment(
    tid: TranscriptId,
    pos: u32,
    frag_len: u32,
) -> Alignment {
    let read_len = 50.min(frag_len);
    Alignment::paired(
        tid,
        read(pos, true, read_len),
        read(pos + frag_len - read_len, false, read_len),
    )
}

pub fn group(
    name: &str,
    alignments: Vec<Alignment>,
) -> AlignmentGroup {
    AlignmentGroup::new(name.as_bytes().to_vec(), alignments)
}

/// Session over `groups` with the default (`IU`) library format.
pub fn library_over(
    references: &[(&str, usize)],
    groups: Vec<AlignmentGroup>,
    config: QuantConfig,
) -> Result<AlignmentLibrary<VecSource>> {
    library_with_format(references, groups, LibraryFormat::default(), config)
}

pub fn library_with_format(
    references: &[(&str, usize)],
    groups: Vec<AlignmentGroup>,
    lib_format: LibraryFormat,
    config: QuantConfig,
) -> Result<AlignmentLibrary<VecSource>> {
    let header = ReferenceHeader::new(references.iter().map(|(n, l)| (*n, *l)));
    AlignmentLibrary::try_from_source(
        VecSource::new(header, groups),
        &mut InMemoryTranscripts::default(),
        lib_format,
        config,
    )
}
