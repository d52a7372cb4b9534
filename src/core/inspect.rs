use std::path::Path;

use anyhow::{bail, Context, Result};
use serde_json::{json, Value};

use crate::decoder::mat::MatFile;
use crate::decoder::{decode_annotations, SeqFile};
use crate::utils::file_utils;

/// Decodes a single `.seq` or `.vbb` file and describes it as JSON
pub fn inspect(path: &Path) -> Result<Value> {
    let data = file_utils::read_file(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    let value = match path.extension().and_then(|e| e.to_str()) {
        Some("seq") => inspect_sequence(&data),
        Some("vbb") => inspect_annotations(&data),
        _ => bail!("Expected a .seq or .vbb file: {}", path.display()),
    };
    value.with_context(|| format!("Failed to decode {}", path.display()))
}

fn inspect_sequence(data: &[u8]) -> Result<Value> {
    let seq = SeqFile::parse(data)?;
    let mut sizes = Vec::new();
    for frame in seq.frames() {
        sizes.push(frame?.buffer.len());
    }

    Ok(json!({
        "header": seq.header,
        "frames": sizes.len(),
        "min_frame_bytes": sizes.iter().min(),
        "max_frame_bytes": sizes.iter().max(),
        "total_frame_bytes": sizes.iter().sum::<usize>(),
    }))
}

fn inspect_annotations(data: &[u8]) -> Result<Value> {
    let mat = MatFile::parse(data)?;
    let set = decode_annotations(data)?;
    let observations: usize = set.frames.iter().map(|f| f.objects.len()).sum();
    let annotated = set.frames.iter().filter(|f| !f.objects.is_empty()).count();

    Ok(json!({
        "container": {
            "description": mat.description,
            "endian": mat.endian,
        },
        "frame_count": set.frame_count,
        "max_objects": set.max_objects,
        "altered": set.altered,
        "log_len": set.log_len,
        "observations": observations,
        "annotated_frames": annotated,
        "objects": set.objects,
    }))
}
