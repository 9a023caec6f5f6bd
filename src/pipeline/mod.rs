pub mod cascade;
pub mod config;
pub mod result;

pub use cascade::Pipeline;
pub use config::{PipelineConfig, SubtypeConfig};
pub use result::{
    aggregate_negative, aggregate_positive, Classification, Diagnosis, Explanation, Finding, InferenceResult,
    InferenceSummary, Screening, NO_TUMOR_LABEL,
};
