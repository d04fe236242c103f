use std::fs::File;
use std::io::BufReader;
use std::path::{
    Path,
    PathBuf,
};
use std::sync::atomic::{
    AtomicBool,
    AtomicUsize,
    Ordering,
};
use std::sync::Arc;
use std::thread::JoinHandle;

use anyhow::{
    anyhow,
    bail,
    Context,
};
use crossbeam::queue::ArrayQueue;
use crossbeam::utils::Backoff;
use log::{
    debug,
    error,
    info,
};
use noodles::sam::alignment::record::cigar::op::Kind;
use noodles::sam::alignment::record_buf::RecordBuf;
use noodles::{
    bam,
    sam,
};

use super::alignment_source::{
    AlignmentSource,
    FragmentCounters,
    FragmentFilter,
};
use crate::config::QuantConfig;
use crate::data_structs::{
    AlignedRead,
    AlignmentGroup,
    CigarKind,
    CigarOp,
    LibraryFormat,
    ParsedRecord,
    RawFragment,
    ReferenceHeader,
    TranscriptId,
};

/// State shared between the queue handle and its workers.
struct Shared {
    files:            Vec<PathBuf>,
    paired:           bool,
    next_file:        AtomicUsize,
    fragments:        ArrayQueue<RawFragment>,
    groups:           ArrayQueue<AlignmentGroup>,
    stop:             AtomicBool,
    parsers_running:  AtomicUsize,
    groupers_running: AtomicUsize,
    counters:         FragmentCounters,
}

/// [`AlignmentSource`] over name-grouped SAM or BAM files.
///
/// Files ending in `.sam` are read as SAM, everything else as BAM. Parse
/// workers claim whole files and cut them into [`RawFragment`]s of
/// consecutive records sharing a name; grouping workers pair mates, apply
/// the filter and publish [`AlignmentGroup`]s.
pub struct AlignmentQueue {
    shared:            Arc<Shared>,
    headers:           Vec<ReferenceHeader>,
    num_parse_threads: usize,
    num_group_threads: usize,
    workers:           Vec<JoinHandle<()>>,
}

impl AlignmentQueue {
    /// Reads the header of every file. Workers are not started.
    pub fn new(
        files: Vec<PathBuf>,
        lib_format: LibraryFormat,
        config: &QuantConfig,
    ) -> anyhow::Result<Self> {
        if files.is_empty() {
            bail!("No alignment files supplied");
        }
        let headers = files
            .iter()
            .map(|path| read_reference_header(path))
            .collect::<anyhow::Result<Vec<_>>>()?;
        let capacity = config.mapping_cache_memory_limit.max(1);
        let num_parse_threads = config
            .num_parse_threads
            .clamp(1, files.len());
        let num_group_threads = config.num_group_threads.max(1);
        debug!(
            "Alignment queue over {} files, {} parse and {} grouping threads, capacity {}",
            files.len(),
            num_parse_threads,
            num_group_threads,
            capacity
        );

        Ok(Self {
            shared: Arc::new(Shared {
                files,
                paired: lib_format.is_paired(),
                next_file: AtomicUsize::new(0),
                fragments: ArrayQueue::new(capacity),
                groups: ArrayQueue::new(capacity),
                stop: AtomicBool::new(false),
                parsers_running: AtomicUsize::new(0),
                groupers_running: AtomicUsize::new(0),
                counters: FragmentCounters::new(),
            }),
            headers,
            num_parse_threads,
            num_group_threads,
            workers: Vec::new(),
        })
    }

    fn shutdown(&mut self) {
        self.shared
            .stop
            .store(true, Ordering::Release);
        for handle in self.workers.drain(..) {
            if handle.join().is_err() {
                error!("Alignment worker panicked");
            }
        }
    }
}

impl AlignmentSource for AlignmentQueue {
    fn files(&self) -> &[PathBuf] {
        &self.shared.files
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
    ) -> anyhow::Result<()> {
        if !self.workers.is_empty() {
            bail!("Alignment queue is already running");
        }
        let shared = &self.shared;
        shared.stop.store(false, Ordering::Release);
        shared.next_file.store(0, Ordering::Release);
        shared
            .parsers_running
            .store(self.num_parse_threads, Ordering::Release);
        shared
            .groupers_running
            .store(self.num_group_threads, Ordering::Release);

        for i in 0..self.num_parse_threads {
            let shared = Arc::clone(&self.shared);
            let handle = std::thread::Builder::new()
                .name(format!("txq-parse-{}", i))
                .spawn(move || parse_worker(shared))
                .context("Failed to spawn parse worker")?;
            self.workers.push(handle);
        }
        for i in 0..self.num_group_threads {
            let shared = Arc::clone(&self.shared);
            let filter = filter.clone();
            let handle = std::thread::Builder::new()
                .name(format!("txq-group-{}", i))
                .spawn(move || group_worker(shared, filter, only_ambiguous))
                .context("Failed to spawn grouping worker")?;
            self.workers.push(handle);
        }
        info!(
            "Started reading {} alignment file(s){}",
            self.shared.files.len(),
            if only_ambiguous { ", ambiguous fragments only" } else { "" }
        );
        Ok(())
    }

    fn reset(&mut self) -> anyhow::Result<()> {
        self.shutdown();
        while self.shared.fragments.pop().is_some() {}
        while self.shared.groups.pop().is_some() {}
        self.shared.counters.reset();
        self.shared
            .parsers_running
            .store(0, Ordering::Release);
        self.shared
            .groupers_running
            .store(0, Ordering::Release);
        debug!("Alignment queue reset");
        Ok(())
    }

    fn get_alignment_group(&self) -> Option<AlignmentGroup> {
        self.shared.groups.pop()
    }

    fn is_exhausted(&self) -> bool {
        self.shared
            .groupers_running
            .load(Ordering::Acquire)
            == 0
            && self.shared.groups.is_empty()
    }

    fn fragment_queue(&self) -> &ArrayQueue<RawFragment> {
        &self.shared.fragments
    }

    fn alignment_group_queue(&self) -> &ArrayQueue<AlignmentGroup> {
        &self.shared.groups
    }

    fn counters(&self) -> &FragmentCounters {
        &self.shared.counters
    }
}

impl Drop for AlignmentQueue {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn is_sam(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("sam"))
}

fn to_reference_header(header: &sam::Header) -> ReferenceHeader {
    ReferenceHeader::new(
        header
            .reference_sequences()
            .iter()
            .map(|(name, map)| (name.to_string(), usize::from(map.length()))),
    )
}

fn read_reference_header(path: &Path) -> anyhow::Result<ReferenceHeader> {
    let file = File::open(path)
        .with_context(|| format!("Failed to open alignment file {}", path.display()))?;
    let header = if is_sam(path) {
        sam::io::Reader::new(BufReader::new(file)).read_header()
    }
    else {
        bam::io::Reader::new(file).read_header()
    }
    .with_context(|| format!("Failed to read header of {}", path.display()))?;
    Ok(to_reference_header(&header))
}

/// Pushes `item`, backing off while the queue is full. Returns false if
/// the stop flag was raised first.
fn push_with_backoff<T>(
    queue: &ArrayQueue<T>,
    mut item: T,
    stop: &AtomicBool,
) -> bool {
    let backoff = Backoff::new();
    loop {
        match queue.push(item) {
            Ok(()) => return true,
            Err(rejected) => {
                if stop.load(Ordering::Acquire) {
                    return false;
                }
                item = rejected;
                backoff.snooze();
            },
        }
    }
}

fn parse_worker(shared: Arc<Shared>) {
    loop {
        let idx = shared
            .next_file
            .fetch_add(1, Ordering::AcqRel);
        let Some(path) = shared.files.get(idx) else {
            break;
        };
        if let Err(e) = parse_file(&shared, path) {
            error!("{:#}", e);
        }
        if shared.stop.load(Ordering::Acquire) {
            break;
        }
    }
    shared
        .parsers_running
        .fetch_sub(1, Ordering::AcqRel);
}

fn parse_file(
    shared: &Shared,
    path: &Path,
) -> anyhow::Result<()> {
    let file = File::open(path)
        .with_context(|| format!("Failed to open alignment file {}", path.display()))?;
    let num_fragments = if is_sam(path) {
        let mut reader = sam::io::Reader::new(BufReader::new(file));
        let header = reader.read_header()?;
        push_fragments(shared, reader.record_bufs(&header))
    }
    else {
        let mut reader = bam::io::Reader::new(file);
        let header = reader.read_header()?;
        push_fragments(shared, reader.record_bufs(&header))
    }
    .with_context(|| format!("Failed to read records of {}", path.display()))?;
    debug!("Parsed {} fragments from {}", num_fragments, path.display());
    Ok(())
}

/// Cuts a record stream into fragments of consecutive same-name records.
fn push_fragments<I>(
    shared: &Shared,
    records: I,
) -> anyhow::Result<usize>
where
    I: Iterator<Item = std::io::Result<RecordBuf>>, {
    let mut current: Option<RawFragment> = None;
    let mut pushed = 0;
    for result in records {
        if shared.stop.load(Ordering::Acquire) {
            return Ok(pushed);
        }
        let record = result?;
        if record.flags().is_supplementary() {
            continue;
        }
        let name = record
            .name()
            .map_or_else(Vec::new, |n| Vec::from(<_ as AsRef<[u8]>>::as_ref(n)));
        let same_fragment = current
            .as_ref()
            .is_some_and(|frag| frag.name == name);
        if !same_fragment {
            if let Some(done) = current.replace(RawFragment::new(name)) {
                if !push_with_backoff(&shared.fragments, done, &shared.stop) {
                    return Ok(pushed);
                }
                pushed += 1;
            }
        }
        if let Some(frag) = current.as_mut() {
            frag.records.push(parse_record(&record)?);
        }
    }
    if let Some(done) = current.take() {
        if push_with_backoff(&shared.fragments, done, &shared.stop) {
            pushed += 1;
        }
    }
    Ok(pushed)
}

fn cigar_kind(kind: Kind) -> Option<CigarKind> {
    match kind {
        Kind::Match | Kind::SequenceMatch | Kind::SequenceMismatch => Some(CigarKind::Match),
        Kind::Insertion => Some(CigarKind::Insertion),
        Kind::Deletion => Some(CigarKind::Deletion),
        Kind::Skip => Some(CigarKind::Skip),
        Kind::SoftClip => Some(CigarKind::SoftClip),
        Kind::HardClip => Some(CigarKind::HardClip),
        Kind::Pad => None,
    }
}

/// 1-based alignment position to a 0-based `u32`.
fn zero_based(pos: Option<noodles::core::Position>) -> anyhow::Result<Option<u32>> {
    pos.map(|p| {
        u32::try_from(usize::from(p) - 1).map_err(|_| anyhow!("Alignment position {} out of range", p))
    })
    .transpose()
}

fn parse_record(record: &RecordBuf) -> anyhow::Result<ParsedRecord> {
    let flags = record.flags();
    let transcript_id = if flags.is_unmapped() {
        None
    }
    else {
        record
            .reference_sequence_id()
            .map(|id| id as TranscriptId)
    };
    let mate_transcript_id = if flags.is_mate_unmapped() {
        None
    }
    else {
        record
            .mate_reference_sequence_id()
            .map(|id| id as TranscriptId)
    };
    let cigar = record
        .cigar()
        .as_ref()
        .iter()
        .filter_map(|op| {
            cigar_kind(op.kind()).map(|kind| CigarOp::new(kind, op.len() as u32))
        })
        .collect();
    let read = AlignedRead::new(
        zero_based(record.alignment_start())?.unwrap_or(0),
        !flags.is_reverse_complemented(),
        cigar,
        record.sequence().as_ref().to_vec(),
    );
    let is_paired = flags.is_segmented();

    Ok(ParsedRecord {
        transcript_id,
        read,
        is_paired,
        is_first: !is_paired || flags.is_first_segment(),
        mate_transcript_id,
        mate_pos: zero_based(record.mate_alignment_start())?,
    })
}

fn group_worker(
    shared: Arc<Shared>,
    filter: Option<FragmentFilter>,
    only_ambiguous: bool,
) {
    let backoff = Backoff::new();
    while !shared.stop.load(Ordering::Acquire) {
        let Some(raw) = shared.fragments.pop()
        else {
            // Producers are done once none is running and nothing is left.
            if shared
                .parsers_running
                .load(Ordering::Acquire)
                == 0
                && shared.fragments.is_empty()
            {
                break;
            }
            backoff.snooze();
            continue;
        };
        backoff.reset();

        let group = raw.into_group(shared.paired);
        shared.counters.record(&group);
        if only_ambiguous && !group.is_ambiguous() {
            continue;
        }
        if filter
            .as_ref()
            .is_some_and(|keep| !keep(&group))
        {
            continue;
        }
        if !push_with_backoff(&shared.groups, group, &shared.stop) {
            break;
        }
    }
    shared
        .groupers_running
        .fetch_sub(1, Ordering::AcqRel);
}
