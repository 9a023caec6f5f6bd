use std::path::Path;
use std::sync::Arc;

use once_cell::sync::OnceCell;

use ferrite_mri::{LazyModel, Pipeline, PipelineConfig, PipelineError};

/// Process-wide server state. Models and the pipeline are built on the
/// first request that needs them and shared by every later one.
pub struct ServerState {
    config: PipelineConfig,
    stage1: LazyModel,
    stage2: LazyModel,
    pipeline: OnceCell<Pipeline>,
}

pub type SharedState = Arc<ServerState>;

impl ServerState {
    pub fn new(config: PipelineConfig, stage1: &Path, stage2: &Path) -> ServerState {
        ServerState {
            config,
            stage1: LazyModel::from_file("stage1", stage1),
            stage2: LazyModel::from_file("stage2", stage2),
            pipeline: OnceCell::new(),
        }
    }

    pub fn pipeline(&self) -> Result<&Pipeline, PipelineError> {
        self.pipeline
            .get_or_try_init(|| Pipeline::from_lazy(self.config.clone(), &self.stage1, &self.stage2))
    }

    pub fn models_loaded(&self) -> bool {
        self.stage1.is_loaded() && self.stage2.is_loaded()
    }
}
