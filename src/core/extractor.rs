use std::collections::BTreeSet;
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::Utc;
use rayon::prelude::*;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::core::config::ExtractConfig;
use crate::core::report::{ExtractReport, PairOutcome};
use crate::decoder::frame_data::file_stem;
use crate::decoder::{decode_annotations, decode_sequence, ObjectInfo, SeqHeader};
use crate::error::{ExtractError, PairError};
use crate::utils::file_utils;

pub const IMAGES_DIR: &str = "images";
pub const RECORDS_DIR: &str = "annotations";
pub const SEQUENCE_FILE: &str = "sequence.json";
pub const MANIFEST_FILE: &str = "extraction.json";

/// A sequence and its annotation file, keyed by the path they share
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SequencePair {
    /// e.g. `set00/V000`
    pub relative: PathBuf,
    pub sequence: PathBuf,
    pub annotation: PathBuf,
}

impl SequencePair {
    fn new(config: &ExtractConfig, relative: PathBuf) -> Self {
        Self {
            sequence: with_suffix(config.data_path.join(&relative), ".seq"),
            annotation: with_suffix(config.annotations_root().join(&relative), ".vbb"),
            relative,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PairStats {
    pub frames: usize,
    pub objects: usize,
}

/// Per-sequence metadata written next to the frames
#[derive(Serialize)]
struct SequenceSummary<'a> {
    header: &'a SeqHeader,
    frame_count: usize,
    max_objects: usize,
    altered: bool,
    log_len: usize,
    objects: &'a [ObjectInfo],
}

fn with_suffix(path: PathBuf, suffix: &str) -> PathBuf {
    let mut name: OsString = path.into_os_string();
    name.push(suffix);
    PathBuf::from(name)
}

fn strip_key(path: &Path, root: &Path) -> Option<PathBuf> {
    path.strip_prefix(root).ok().map(|p| p.with_extension(""))
}

/// Pairs every `.seq` under the dataset root with `annotations/<same path>.vbb`.
/// Annotation files without a sequence are returned as pairs too, so the
/// driver can report them.
pub fn discover(config: &ExtractConfig) -> Result<Vec<SequencePair>, ExtractError> {
    let root = &config.data_path;
    let annotations_root = config.annotations_root();
    let scan_err = |path: &Path| {
        let path = path.to_path_buf();
        move |source| ExtractError::Scan { path, source }
    };

    let mut keys = BTreeSet::new();
    let sequences = file_utils::collect_files(root, "seq", &[annotations_root.clone()])
        .map_err(scan_err(root.as_path()))?;
    for path in sequences {
        if let Some(key) = strip_key(&path, root) {
            keys.insert(key);
        }
    }

    if annotations_root.is_dir() {
        let annotations = file_utils::collect_files(&annotations_root, "vbb", &[])
            .map_err(scan_err(annotations_root.as_path()))?;
        for path in annotations {
            if let Some(key) = strip_key(&path, &annotations_root) {
                keys.insert(key);
            }
        }
    }

    Ok(keys
        .into_iter()
        .filter(|key| config.includes(key))
        .map(|key| SequencePair::new(config, key))
        .collect())
}

/// Decodes one pair completely, then writes its frames and records.
/// Nothing is written unless both files decode and agree on the frame count.
pub fn extract_pair(pair: &SequencePair, save_path: &Path) -> Result<PairStats, PairError> {
    // 1. Both halves must exist
    if !pair.annotation.is_file() {
        return Err(PairError::MissingAnnotation {
            expected: pair.annotation.clone(),
        });
    }
    if !pair.sequence.is_file() {
        return Err(PairError::MissingSequence {
            expected: pair.sequence.clone(),
        });
    }

    // 2. Decode
    let seq_bytes =
        file_utils::read_file(&pair.sequence).map_err(|e| PairError::io(&pair.sequence, e))?;
    let vbb_bytes =
        file_utils::read_file(&pair.annotation).map_err(|e| PairError::io(&pair.annotation, e))?;

    let sequence = decode_sequence(&seq_bytes)?;
    let annotations = decode_annotations(&vbb_bytes)?;
    debug!(
        sequence = %pair.relative.display(),
        frames = sequence.frames.len(),
        objects = annotations.max_objects,
        "decoded"
    );

    if sequence.frames.len() != annotations.frames.len() {
        return Err(PairError::FrameCountMismatch {
            sequence: sequence.frames.len(),
            annotation: annotations.frames.len(),
        });
    }

    // 3. Write
    let out_dir = save_path.join(&pair.relative);
    let image_dir = out_dir.join(IMAGES_DIR);
    let record_dir = out_dir.join(RECORDS_DIR);
    for dir in [&image_dir, &record_dir] {
        file_utils::ensure_dir(dir).map_err(|e| PairError::io(dir, e))?;
    }

    let ext = sequence.header.encoding.extension();
    for frame in &sequence.frames {
        let path = image_dir.join(format!("{}.{}", frame.file_stem(), ext));
        fs::write(&path, frame.buffer).map_err(|e| PairError::io(&path, e))?;
    }

    let mut objects = 0;
    for record in &annotations.frames {
        let path = record_dir.join(format!("{}.json", file_stem(record.frame)));
        file_utils::write_json(&path, record).map_err(|e| PairError::io(&path, e))?;
        objects += record.objects.len();
    }

    let summary = SequenceSummary {
        header: &sequence.header,
        frame_count: annotations.frame_count,
        max_objects: annotations.max_objects,
        altered: annotations.altered,
        log_len: annotations.log_len,
        objects: &annotations.objects,
    };
    let path = out_dir.join(SEQUENCE_FILE);
    file_utils::write_json(&path, &summary).map_err(|e| PairError::io(&path, e))?;

    Ok(PairStats {
        frames: sequence.frames.len(),
        objects,
    })
}

fn process_pair(pair: &SequencePair, save_path: &Path) -> PairOutcome {
    info!(sequence = %pair.relative.display(), "processing");
    match extract_pair(pair, save_path) {
        Ok(stats) => {
            info!(
                sequence = %pair.relative.display(),
                frames = stats.frames,
                objects = stats.objects,
                "extracted"
            );
            PairOutcome::extracted(pair.relative.clone(), stats.frames, stats.objects)
        }
        Err(e) => {
            warn!(sequence = %pair.relative.display(), kind = ?e.kind(), "skipped: {}", e);
            PairOutcome::skipped(pair.relative.clone(), &e)
        }
    }
}

/// Extracts every pair under the dataset root. Per-pair faults end up in the
/// report; only an unusable dataset root is an error.
pub fn run(config: &ExtractConfig) -> Result<ExtractReport, ExtractError> {
    let started_at = Utc::now();

    // 1. Validate the dataset root before the output tree is touched
    if !config.data_path.exists() {
        return Err(ExtractError::DataPathNotFound(config.data_path.clone()));
    }
    if !config.data_path.is_dir() {
        return Err(ExtractError::NotADirectory(config.data_path.clone()));
    }

    // 2. Pair up sequences and annotations
    let pairs = discover(config)?;
    info!(
        root = %config.data_path.display(),
        output = %config.save_path.display(),
        pairs = pairs.len(),
        "extracting images + annotations"
    );
    if pairs.is_empty() {
        warn!(root = %config.data_path.display(), "no .seq or .vbb files found");
    }

    // 3. Extract, one pair per task
    let workers = config.worker_count();
    let save_path = config.save_path.as_path();
    let outcomes: Vec<PairOutcome> = if workers > 1 {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .build()?;
        pool.install(|| {
            pairs
                .par_iter()
                .map(|pair| process_pair(pair, save_path))
                .collect()
        })
    } else {
        pairs
            .iter()
            .map(|pair| process_pair(pair, save_path))
            .collect()
    };

    let report = ExtractReport::new(started_at, outcomes);

    // 4. Manifest, only once something was actually attempted
    if report.attempted() > 0 {
        let path = save_path.join(MANIFEST_FILE);
        let written = file_utils::ensure_dir(save_path)
            .and_then(|_| file_utils::write_json(&path, &report));
        if let Err(e) = written {
            warn!(path = %path.display(), "failed to write run manifest: {}", e);
        }
    }

    Ok(report)
}
