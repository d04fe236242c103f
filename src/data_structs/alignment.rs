use serde::Serialize;

use super::library_format::LibraryFormat;
use super::transcript::TranscriptId;

#[derive(Eq, PartialEq, Copy, Clone, Debug, Serialize)]
pub enum CigarKind {
    /// `M`, `=` or `X`: consumes read and reference.
    Match,
    Insertion,
    Deletion,
    Skip,
    SoftClip,
    HardClip,
}

#[derive(Eq, PartialEq, Copy, Clone, Debug, Serialize)]
pub struct CigarOp {
    pub kind: CigarKind,
    pub len:  u32,
}

impl CigarOp {
    pub fn new(
        kind: CigarKind,
        len: u32,
    ) -> Self {
        Self { kind, len }
    }
}

/// One reference/read base pair on an aligned column.
#[derive(Eq, PartialEq, Copy, Clone, Debug)]
pub struct BaseCall {
    /// Position in the read, 0-based, in sequencing order.
    pub read_pos: usize,
    pub ref_base: u8,
    pub read_base: u8,
}

impl BaseCall {
    pub fn is_match(&self) -> bool {
        self.ref_base == self.read_base
    }
}

/// A single read placed on a transcript.
#[derive(Clone, Debug, PartialEq)]
pub struct AlignedRead {
    /// 0-based leftmost reference position.
    pub pos:   u32,
    pub fwd:   bool,
    pub cigar: Vec<CigarOp>,
    /// Read bases as stored in the alignment file (reference strand).
    pub seq:   Vec<u8>,
}

impl AlignedRead {
    pub fn new(
        pos: u32,
        fwd: bool,
        cigar: Vec<CigarOp>,
        seq: Vec<u8>,
    ) -> Self {
        Self {
            pos,
            fwd,
            cigar,
            seq,
        }
    }

    /// Number of reference bases covered by the alignment.
    pub fn reference_span(&self) -> u32 {
        let span = self
            .cigar
            .iter()
            .filter(|op| matches!(op.kind, CigarKind::Match | CigarKind::Deletion | CigarKind::Skip))
            .map(|op| op.len)
            .sum();
        if span == 0 {
            self.seq.len() as u32
        }
        else {
            span
        }
    }

    /// Exclusive end on the reference.
    pub fn end(&self) -> u32 {
        self.pos + self.reference_span()
    }

    /// Pairs every aligned read base with the reference base under it.
    /// Columns running past the end of `reference` are skipped. Read
    /// positions are reported in sequencing order, so they are mirrored for
    /// reverse-strand reads.
    pub fn base_calls(
        &self,
        reference: &[u8],
    ) -> Vec<BaseCall> {
        let read_len = self.seq.len();
        let mut calls = Vec::with_capacity(read_len);
        let mut ref_pos = self.pos as usize;
        let mut read_pos = 0usize;
        for op in self.cigar.iter() {
            let len = op.len as usize;
            match op.kind {
                CigarKind::Match => {
                    for i in 0..len {
                        let (Some(&ref_base), Some(&read_base)) =
                            (reference.get(ref_pos + i), self.seq.get(read_pos + i))
                        else {
                            break;
                        };
                        let pos = if self.fwd {
                            read_pos + i
                        }
                        else {
                            read_len - 1 - (read_pos + i)
                        };
                        calls.push(BaseCall {
                            read_pos: pos,
                            ref_base: ref_base.to_ascii_uppercase(),
                            read_base: read_base.to_ascii_uppercase(),
                        });
                    }
                    ref_pos += len;
                    read_pos += len;
                },
                CigarKind::Insertion | CigarKind::SoftClip => read_pos += len,
                CigarKind::Deletion | CigarKind::Skip => ref_pos += len,
                CigarKind::HardClip => {},
            }
        }
        calls
    }
}

/// A candidate placement of a whole fragment on one transcript.
#[derive(Clone, Debug, PartialEq)]
pub struct Alignment {
    pub transcript_id: TranscriptId,
    /// Orientation of the first read of the fragment.
    pub fwd:           bool,
    /// 0-based leftmost position of the fragment.
    pub pos:           u32,
    /// Fragment length for properly paired mates.
    pub fragment_len:  Option<u32>,
    /// One read, or both mates in read1/read2 order.
    pub reads:         Vec<AlignedRead>,
    /// False only for a lone second mate.
    pub is_read1:      bool,
}

impl Alignment {
    /// A fragment built from a single (first or unpaired) read.
    pub fn single(
        transcript_id: TranscriptId,
        read: AlignedRead,
    ) -> Self {
        Self::orphan(transcript_id, read, true)
    }

    /// A fragment of which only one mate aligned. `is_read1` tells which.
    pub fn orphan(
        transcript_id: TranscriptId,
        read: AlignedRead,
        is_read1: bool,
    ) -> Self {
        Self {
            transcript_id,
            fwd: read.fwd,
            pos: read.pos,
            fragment_len: None,
            reads: vec![read],
            is_read1,
        }
    }

    /// A fragment built from two mates on the same transcript.
    pub fn paired(
        transcript_id: TranscriptId,
        read1: AlignedRead,
        read2: AlignedRead,
    ) -> Self {
        let pos = read1.pos.min(read2.pos);
        let end = read1.end().max(read2.end());
        Self {
            transcript_id,
            fwd: read1.fwd,
            pos,
            fragment_len: Some(end - pos),
            reads: vec![read1, read2],
            is_read1: true,
        }
    }

    pub fn is_paired(&self) -> bool {
        self.reads.len() == 2
    }

    /// Orientation of the second mate, if any.
    pub fn mate_fwd(&self) -> Option<bool> {
        self.reads.get(1).map(|r| r.fwd)
    }

    /// Whether this placement agrees with `lib_format`. A lone mate is
    /// judged by the orientation its read1 would have had.
    pub fn is_compatible_with(
        &self,
        lib_format: &LibraryFormat,
    ) -> bool {
        if self.is_paired() {
            lib_format.is_compatible(self.fwd, self.mate_fwd())
        }
        else {
            lib_format.is_compatible_orphan(self.fwd, self.is_read1)
        }
    }

    /// Position of the fragment's 5' end on the transcript: the start for a
    /// forward fragment, the last covered base otherwise.
    pub fn five_prime(&self) -> u32 {
        if self.fwd {
            self.pos
        }
        else {
            let end = self.reads.iter().map(AlignedRead::end).max().unwrap_or(self.pos + 1);
            end.saturating_sub(1)
        }
    }

    /// Reference interval `[start, end)` spanned by the fragment.
    pub fn span(&self) -> (u32, u32) {
        let end = match self.fragment_len {
            Some(len) => self.pos + len,
            None => self.reads.iter().map(AlignedRead::end).max().unwrap_or(self.pos),
        };
        (self.pos, end)
    }
}

/// One sequenced fragment plus all of its candidate alignments.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct AlignmentGroup {
    pub name:       Vec<u8>,
    pub alignments: Vec<Alignment>,
}

impl AlignmentGroup {
    pub fn new(
        name: Vec<u8>,
        alignments: Vec<Alignment>,
    ) -> Self {
        Self { name, alignments }
    }

    pub fn is_empty(&self) -> bool {
        self.alignments.is_empty()
    }

    pub fn len(&self) -> usize {
        self.alignments.len()
    }

    /// More than one candidate alignment.
    pub fn is_ambiguous(&self) -> bool {
        self.alignments.len() > 1
    }

    pub fn is_unique(&self) -> bool {
        self.alignments.len() == 1
    }

    /// Sorted distinct transcript ids this fragment is compatible with.
    pub fn transcript_ids(&self) -> Vec<TranscriptId> {
        let mut ids: Vec<TranscriptId> = self
            .alignments
            .iter()
            .map(|a| a.transcript_id)
            .collect();
        ids.sort_unstable();
        ids.dedup();
        ids
    }
}

/// A record as read from the alignment file, before mate pairing.
#[derive(Clone, Debug, PartialEq)]
pub struct ParsedRecord {
    /// `None` for unmapped records.
    pub transcript_id: Option<TranscriptId>,
    pub read:          AlignedRead,
    pub is_paired:     bool,
    pub is_first:      bool,
    pub mate_transcript_id: Option<TranscriptId>,
    pub mate_pos:      Option<u32>,
}

/// All records of one fragment, in file order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RawFragment {
    pub name:    Vec<u8>,
    pub records: Vec<ParsedRecord>,
}

impl RawFragment {
    pub fn new(name: Vec<u8>) -> Self {
        Self {
            name,
            records: Vec::new(),
        }
    }

    /// Pairs mates and drops unmapped records. When `paired` is false every
    /// mapped record becomes its own single-read alignment.
    pub fn into_group(
        self,
        paired: bool,
    ) -> AlignmentGroup {
        let mut alignments = Vec::new();
        let mut pending: Vec<ParsedRecord> = Vec::new();
        for record in self.records.into_iter() {
            let Some(tid) = record.transcript_id else {
                continue;
            };
            if !(paired && record.is_paired) || record.mate_transcript_id != Some(tid) {
                alignments.push(Alignment::orphan(tid, record.read, record.is_first));
                continue;
            }
            // Look for the mate among earlier records of this fragment.
            let mate_idx = pending.iter().position(|m| {
                m.transcript_id == Some(tid)
                    && m.is_first != record.is_first
                    && m.mate_pos == Some(record.read.pos)
                    && record.mate_pos == Some(m.read.pos)
            });
            match mate_idx {
                Some(idx) => {
                    let mate = pending.swap_remove(idx);
                    let (r1, r2) = if record.is_first {
                        (record.read, mate.read)
                    }
                    else {
                        (mate.read, record.read)
                    };
                    alignments.push(Alignment::paired(tid, r1, r2));
                },
                None => pending.push(record),
            }
        }
        // Orphans whose mate never showed up.
        for record in pending.into_iter() {
            if let Some(tid) = record.transcript_id {
                alignments.push(Alignment::orphan(tid, record.read, record.is_first));
            }
        }
        AlignmentGroup::new(self.name, alignments)
    }
}
