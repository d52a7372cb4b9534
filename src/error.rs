use std::path::PathBuf;

/// Structural faults in a Norpix `.seq` container.
#[derive(Debug, thiserror::Error)]
pub enum SequenceError {
    #[error("file is {0} bytes, shorter than the 1024-byte header")]
    TooShort(usize),

    #[error("bad magic {0:#010x}, expected 0x0000feed")]
    BadMagic(u32),

    #[error("unexpected container name {0:?}")]
    BadName(String),

    #[error("header declares size {0}, expected 1024")]
    BadHeaderSize(i32),

    #[error("unsupported image format code {0}")]
    UnsupportedFormat(i32),

    #[error("header declares a negative frame count ({0})")]
    NegativeFrameCount(i32),

    #[error("frame {frame}: record at offset {offset} runs past the end of the file")]
    Truncated { frame: usize, offset: usize },

    #[error("frame {frame}: invalid record size {size}")]
    BadRecordSize { frame: usize, size: u32 },

    #[error("frame {frame}: payload is not a {expected} image")]
    UnexpectedPayload { frame: usize, expected: &'static str },
}

/// Faults in the MAT-file v5 container that carries the annotations.
#[derive(Debug, thiserror::Error)]
pub enum MatError {
    #[error("file is {0} bytes, too short for a MAT-file header")]
    TooShort(usize),

    #[error("header text does not identify a MAT-file v5")]
    BadHeaderText,

    #[error("unknown endian indicator {0:?}")]
    BadEndian([u8; 2]),

    #[error("unsupported MAT-file version {0:#06x}")]
    BadVersion(u16),

    #[error("data element at offset {0} runs past the end of its buffer")]
    Truncated(usize),

    #[error("zlib decompression failed: {0}")]
    Decompress(#[source] std::io::Error),

    #[error("unexpected data type {found}, expected {expected}")]
    UnexpectedType { found: u32, expected: &'static str },

    #[error("unsupported array class {0}")]
    UnsupportedClass(u8),

    #[error("complex arrays are not supported")]
    Complex,

    #[error("array holds {found} elements but its dimensions require {expected}")]
    ElementCount { found: usize, expected: usize },

    #[error("malformed array: {0}")]
    Malformed(&'static str),
}

/// Faults in the `.vbb` annotation layout on top of a valid MAT-file.
#[derive(Debug, thiserror::Error)]
pub enum AnnotationError {
    #[error(transparent)]
    Container(#[from] MatError),

    #[error("variable `{0}` not found")]
    MissingVariable(&'static str),

    #[error("field `{0}` not found")]
    MissingField(&'static str),

    #[error("field `{field}`: expected {expected}")]
    BadField { field: &'static str, expected: &'static str },

    #[error("field `{field}` holds {found} elements, expected {expected}")]
    CountMismatch {
        field: &'static str,
        found: usize,
        expected: usize,
    },

    #[error("frame {frame}: object id {id} is outside 1..={max}")]
    UnknownObject { frame: usize, id: f64, max: usize },

    #[error("frame {frame}: object {id} is listed more than once")]
    DuplicateObject { frame: usize, id: usize },

    #[error("frame {frame}: object {id} has a {len}-element position")]
    BadPosition { frame: usize, id: usize, len: usize },

    #[error("frame {frame}: object {id} has a {len}-element visible box")]
    BadVisibleBox { frame: usize, id: usize, len: usize },

    #[error("object {id}: existence range {start}..={end} is invalid for {frames} frames")]
    BadRange {
        id: usize,
        start: f64,
        end: f64,
        frames: usize,
    },
}

/// Per-pair outcome categories reported by the extraction driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
pub enum ErrorKind {
    MissingPair,
    MalformedSequence,
    MalformedAnnotation,
    FrameCountMismatch,
    Io,
}

impl ErrorKind {
    pub const ALL: [ErrorKind; 5] = [
        ErrorKind::MissingPair,
        ErrorKind::MalformedSequence,
        ErrorKind::MalformedAnnotation,
        ErrorKind::FrameCountMismatch,
        ErrorKind::Io,
    ];
}

/// Why one sequence/annotation pair was skipped.
#[derive(Debug, thiserror::Error)]
pub enum PairError {
    #[error("no annotation file at {}", .expected.display())]
    MissingAnnotation { expected: PathBuf },

    #[error("no sequence file at {}", .expected.display())]
    MissingSequence { expected: PathBuf },

    #[error("sequence has {sequence} frames but annotations declare {annotation}")]
    FrameCountMismatch { sequence: usize, annotation: usize },

    #[error("malformed sequence: {0}")]
    MalformedSequence(#[from] SequenceError),

    #[error("malformed annotation: {0}")]
    MalformedAnnotation(#[from] AnnotationError),

    #[error("failed to access {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl PairError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PairError::MissingAnnotation { .. } | PairError::MissingSequence { .. } => {
                ErrorKind::MissingPair
            }
            PairError::FrameCountMismatch { .. } => ErrorKind::FrameCountMismatch,
            PairError::MalformedSequence(_) => ErrorKind::MalformedSequence,
            PairError::MalformedAnnotation(_) => ErrorKind::MalformedAnnotation,
            PairError::Io { .. } => ErrorKind::Io,
        }
    }

    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        PairError::Io {
            path: path.into(),
            source,
        }
    }
}

/// Run-level failures that abort the whole extraction.
#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    #[error("dataset path not found: {}", .0.display())]
    DataPathNotFound(PathBuf),

    #[error("dataset path is not a directory: {}", .0.display())]
    NotADirectory(PathBuf),

    #[error("failed to scan {}: {source}", .path.display())]
    Scan {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to build worker pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}
