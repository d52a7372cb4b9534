pub mod frame_data;
pub mod mat;
pub mod seq;
pub mod vbb;

#[cfg(test)]
pub mod test_support;

pub use seq::{decode_sequence, SeqFile, SeqHeader};
pub use vbb::{decode_annotations, ObjectInfo};
