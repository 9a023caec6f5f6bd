use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use once_cell::sync::OnceCell;
use tracing::{info, warn};

use crate::error::ModelError;
use crate::model::ModelArtifact;
use crate::network::Network;

type Loader = Box<dyn Fn() -> Result<Arc<dyn ModelArtifact>, ModelError> + Send + Sync>;

/// A model handle that loads its artifact on first use.
///
/// Concurrent first callers block until the single load finishes and all
/// receive the same `Arc`. A failed load is not remembered; the next call
/// tries again.
pub struct LazyModel {
    name: String,
    loader: Loader,
    cell: OnceCell<Arc<dyn ModelArtifact>>,
    attempts: AtomicUsize,
}

impl LazyModel {
    pub fn with_loader<F>(name: &str, loader: F) -> LazyModel
    where
        F: Fn() -> Result<Arc<dyn ModelArtifact>, ModelError> + Send + Sync + 'static,
    {
        LazyModel {
            name: name.to_owned(),
            loader: Box::new(loader),
            cell: OnceCell::new(),
            attempts: AtomicUsize::new(0),
        }
    }

    /// Loads a `Network` JSON artifact from `path` on first use.
    pub fn from_file(name: &str, path: impl AsRef<Path>) -> LazyModel {
        let path: PathBuf = path.as_ref().to_path_buf();
        LazyModel::with_loader(name, move || {
            let network = Network::load_json(&path)?;
            Ok(Arc::new(network) as Arc<dyn ModelArtifact>)
        })
    }

    /// Wraps an already loaded artifact.
    pub fn ready(artifact: Arc<dyn ModelArtifact>) -> LazyModel {
        let model = LazyModel::with_loader(artifact.name(), || {
            Err(ModelError::Unavailable { name: "ready".into(), reason: "never reloaded".into() })
        });
        // A fresh cell cannot already be set.
        let _ = model.cell.set(artifact);
        model
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn get(&self) -> Result<Arc<dyn ModelArtifact>, ModelError> {
        self.cell
            .get_or_try_init(|| {
                self.attempts.fetch_add(1, Ordering::SeqCst);
                let started = Instant::now();
                match (self.loader)() {
                    Ok(artifact) => {
                        info!(
                            model = %self.name,
                            layers = artifact.layer_names().len(),
                            elapsed_ms = started.elapsed().as_millis() as u64,
                            "model loaded"
                        );
                        Ok(artifact)
                    }
                    Err(e) => {
                        warn!(model = %self.name, error = %e, "model load failed");
                        Err(e)
                    }
                }
            })
            .cloned()
    }

    pub fn is_loaded(&self) -> bool {
        self.cell.get().is_some()
    }

    /// Number of times the loader has run.
    pub fn load_attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

impl std::fmt::Debug for LazyModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LazyModel")
            .field("name", &self.name)
            .field("loaded", &self.is_loaded())
            .finish()
    }
}
