pub mod registry;
pub mod steps;

pub use registry::TransformRegistry;
pub use steps::dwds_audio::DwdsAudioStep;
pub use steps::{TransformError, TransformStep};
