//! Concrete stages. Each implements [`Stage`](crate::task::Stage) for one step of a pipeline.

pub mod context;
pub mod describe;
pub mod discover;
pub mod enhance;
pub mod geolocate;
pub mod metadata;
pub mod skip_check;
pub mod write;

pub use context::ContextStage;
pub use describe::DescribeStage;
pub use discover::DiscoverStage;
pub use enhance::EnhanceStage;
pub use geolocate::GeolocateStage;
pub use metadata::MetadataStage;
pub use skip_check::SkipCheckStage;
pub use write::WriteStage;
