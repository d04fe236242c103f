pub use crate::cluster_forest::{
    Cluster,
    ClusterForest,
};
pub use crate::config::QuantConfig;
pub use crate::data_structs::{
    AlignedRead,
    Alignment,
    AlignmentGroup,
    LibraryFormat,
    ReferenceHeader,
    Transcript,
    TranscriptId,
    TranscriptRegistry,
};
pub use crate::eqclass::{
    EquivalenceClass,
    EquivalenceClassBuilder,
};
pub use crate::error::{
    InputKind,
    QuantError,
};
pub use crate::io::{
    AlignmentQueue,
    AlignmentSource,
    FastaTranscriptSource,
    FragmentCounters,
    FragmentFilter,
    TranscriptSource,
};
pub use crate::library::{
    AlignmentLibrary,
    LengthUpdateState,
};
pub use crate::models::StatModel;
pub use crate::quant::{
    fold_group,
    run_pass,
    ModelSummary,
    PassSummary,
};
