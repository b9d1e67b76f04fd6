pub mod admin;
pub mod pipeline;

pub use admin::{router, AdminState};
pub use pipeline::{
    CycleReport, CycleStatus, Pipeline, PipelineComponents, PipelineSettings, RunMode,
};
