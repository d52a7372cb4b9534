use std::path::{Path, PathBuf};

/// Everything one extraction run needs, resolved before the run starts
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExtractConfig {
    pub data_path: PathBuf,
    pub save_path: PathBuf,
    /// Only these top-level sets (e.g. `set00`); `None` means all
    pub sets: Option<Vec<String>>,
    /// Worker threads; 1 runs sequentially, 0 uses every logical CPU
    pub jobs: usize,
}

impl ExtractConfig {
    pub const DEFAULT_SAVE_DIR: &'static str = "extracted_data";
    pub const ANNOTATIONS_DIR: &'static str = "annotations";

    pub fn new(data_path: impl Into<PathBuf>) -> Self {
        Self {
            data_path: data_path.into(),
            save_path: PathBuf::from(Self::DEFAULT_SAVE_DIR),
            sets: None,
            jobs: 1,
        }
    }

    pub fn with_save_path(mut self, save_path: impl Into<PathBuf>) -> Self {
        self.save_path = save_path.into();
        self
    }

    pub fn with_sets(mut self, sets: Vec<String>) -> Self {
        self.sets = if sets.is_empty() { None } else { Some(sets) };
        self
    }

    pub fn with_jobs(mut self, jobs: usize) -> Self {
        self.jobs = jobs;
        self
    }

    pub fn worker_count(&self) -> usize {
        match self.jobs {
            0 => num_cpus::get(),
            n => n,
        }
    }

    pub fn annotations_root(&self) -> PathBuf {
        self.data_path.join(Self::ANNOTATIONS_DIR)
    }

    /// Whether a pair keyed by `relative` (e.g. `set00/V000`) is selected
    pub fn includes(&self, relative: &Path) -> bool {
        let Some(sets) = &self.sets else {
            return true;
        };
        relative
            .components()
            .next()
            .and_then(|c| c.as_os_str().to_str())
            .is_some_and(|set| sets.iter().any(|s| s == set))
    }
}
