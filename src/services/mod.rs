pub mod duration_model;
pub mod extractor;
pub mod mode_selector;
pub mod sampler;
pub mod snapshot_writer;

pub use duration_model::DurationModel;
pub use extractor::DomLinkExtractor;
pub use mode_selector::{DiscoveryMode, DiscoveryPolicy, ModeSelector};
pub use sampler::{SampledItem, WeightTier, WeightedSampler};
pub use snapshot_writer::SnapshotWriter;
