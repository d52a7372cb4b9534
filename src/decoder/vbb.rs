//! `.vbb` annotation decoder.
//!
//! A `.vbb` file is a MAT-file holding one struct `A`. Its fields are read by
//! name into typed records; MATLAB's 1-origin ids, frame numbers and box
//! corners are shifted to 0-origin on the way in.

use std::ops::RangeInclusive;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::mat::{MatFile, MatValue, StructElement};
use crate::error::AnnotationError;

/// Axis-aligned box, serialized as `[left, top, width, height]`
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f64; 4]", into = "[f64; 4]")]
pub struct BoundingBox {
    pub left: f64,
    pub top: f64,
    pub width: f64,
    pub height: f64,
}

impl From<[f64; 4]> for BoundingBox {
    fn from([left, top, width, height]: [f64; 4]) -> Self {
        Self {
            left,
            top,
            width,
            height,
        }
    }
}

impl From<BoundingBox> for [f64; 4] {
    fn from(b: BoundingBox) -> Self {
        [b.left, b.top, b.width, b.height]
    }
}

impl BoundingBox {
    /// Converts a MATLAB `[x y w h]` with 1-origin corner
    fn from_matlab(v: &[f64]) -> Option<Self> {
        match v {
            [x, y, w, h] => Some(Self {
                left: x - 1.0,
                top: y - 1.0,
                width: *w,
                height: *h,
            }),
            _ => None,
        }
    }
}

/// Static attributes of one annotated object
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ObjectInfo {
    pub id: usize,
    #[serde(rename = "lbl")]
    pub label: String,
    /// first frame of existence, 0-origin; `None` for uninitialized objects
    #[serde(rename = "str")]
    pub start: Option<usize>,
    pub end: Option<usize>,
    #[serde(rename = "hide")]
    pub hidden: bool,
    #[serde(rename = "init")]
    pub initialized: bool,
}

impl ObjectInfo {
    pub fn frames(&self) -> Option<RangeInclusive<usize>> {
        Some(self.start?..=self.end?)
    }
}

/// One object's state in one frame
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ObjectObservation {
    pub id: usize,
    #[serde(rename = "lbl")]
    pub label: String,
    pub pos: BoundingBox,
    pub posv: Option<BoundingBox>,
    #[serde(rename = "occl")]
    pub occluded: bool,
    #[serde(rename = "lock")]
    pub locked: bool,
    #[serde(rename = "str")]
    pub start: usize,
    pub end: usize,
    #[serde(rename = "hide")]
    pub hidden: bool,
    #[serde(rename = "init")]
    pub initialized: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct FrameAnnotation {
    pub frame: usize,
    pub objects: Vec<ObjectObservation>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct AnnotationSet {
    pub frame_count: usize,
    pub max_objects: usize,
    pub altered: bool,
    pub log_len: usize,
    /// indexed by object id
    pub objects: Vec<ObjectInfo>,
    pub frames: Vec<FrameAnnotation>,
}

/// Decoded content of one `objLists` slot
enum Slot {
    Observed(ObjectObservation),
    Absent { id: usize },
}

pub fn decode_annotations(data: &[u8]) -> Result<AnnotationSet, AnnotationError> {
    let mat = MatFile::parse(data)?;
    let a = mat
        .get("A")
        .ok_or(AnnotationError::MissingVariable("A"))?;
    if a.struct_elements().is_none() || a.len() != 1 {
        return Err(AnnotationError::BadField {
            field: "A",
            expected: "1x1 struct",
        });
    }

    let frame_count = count_field(a, "nFrame")?;
    let max_objects = count_field(a, "maxObj")?;

    let obj_lists = field(a, "objLists")?;
    let lists = obj_lists.as_cells().ok_or(AnnotationError::BadField {
        field: "objLists",
        expected: "cell array",
    })?;
    check_count("objLists", lists.len(), frame_count)?;

    let objects = object_table(a, frame_count, max_objects)?;

    let mut frames = Vec::with_capacity(frame_count);
    for (frame, list) in lists.iter().enumerate() {
        let mut annotation = FrameAnnotation {
            frame,
            objects: Vec::new(),
        };
        let Some(elements) = list.struct_elements() else {
            if !list.is_empty() {
                return Err(AnnotationError::BadField {
                    field: "objLists",
                    expected: "struct array or empty cell",
                });
            }
            frames.push(annotation);
            continue;
        };

        let mut seen = vec![false; max_objects];
        for element in elements {
            let id = match decode_slot(&element, frame, &objects)? {
                Slot::Observed(obs) => {
                    let id = obs.id;
                    if objects[id].frames().is_some_and(|r| r.contains(&frame)) {
                        annotation.objects.push(obs);
                    } else {
                        debug!(frame, id, "observation outside object lifetime, dropped");
                    }
                    id
                }
                Slot::Absent { id } => id,
            };
            if std::mem::replace(&mut seen[id], true) {
                return Err(AnnotationError::DuplicateObject { frame, id });
            }
        }
        frames.push(annotation);
    }

    Ok(AnnotationSet {
        frame_count,
        max_objects,
        altered: optional_scalar(a, "altered") != 0.0,
        log_len: optional_scalar(a, "logLen") as usize,
        objects,
        frames,
    })
}

fn object_table(
    a: &MatValue,
    frame_count: usize,
    max_objects: usize,
) -> Result<Vec<ObjectInfo>, AnnotationError> {
    let labels = labels(field(a, "objLbl")?)?;
    let starts = numeric_field(a, "objStr")?;
    let ends = numeric_field(a, "objEnd")?;
    let hides = numeric_field(a, "objHide")?;
    let inits = numeric_field(a, "objInit")?;

    check_count("objLbl", labels.len(), max_objects)?;
    check_count("objStr", starts.len(), max_objects)?;
    check_count("objEnd", ends.len(), max_objects)?;
    check_count("objHide", hides.len(), max_objects)?;
    check_count("objInit", inits.len(), max_objects)?;

    let mut table = Vec::with_capacity(max_objects);
    for (id, label) in labels.into_iter().enumerate() {
        let initialized = inits[id] != 0.0;
        let (start, end) = (starts[id], ends[id]);
        let range = if initialized {
            let valid = start.fract() == 0.0
                && end.fract() == 0.0
                && start >= 1.0
                && start <= end
                && end <= frame_count as f64;
            if !valid {
                return Err(AnnotationError::BadRange {
                    id,
                    start,
                    end,
                    frames: frame_count,
                });
            }
            Some((start as usize - 1, end as usize - 1))
        } else {
            None
        };

        table.push(ObjectInfo {
            id,
            label,
            start: range.map(|r| r.0),
            end: range.map(|r| r.1),
            hidden: hides[id] != 0.0,
            initialized,
        });
    }
    Ok(table)
}

fn decode_slot(
    element: &StructElement<'_>,
    frame: usize,
    objects: &[ObjectInfo],
) -> Result<Slot, AnnotationError> {
    let raw_id = element
        .get("id")
        .and_then(MatValue::as_scalar)
        .ok_or(AnnotationError::BadField {
            field: "id",
            expected: "numeric scalar",
        })?;
    if raw_id.fract() != 0.0 || raw_id < 1.0 || raw_id > objects.len() as f64 {
        return Err(AnnotationError::UnknownObject {
            frame,
            id: raw_id,
            max: objects.len(),
        });
    }
    let id = raw_id as usize - 1;

    let pos = element
        .get("pos")
        .and_then(MatValue::as_numeric)
        .ok_or(AnnotationError::BadField {
            field: "pos",
            expected: "numeric array",
        })?;
    // an empty or NaN position is how the format marks "not seen in this frame"
    if pos.is_empty() || pos.iter().any(|v| v.is_nan()) {
        return Ok(Slot::Absent { id });
    }
    let pos = BoundingBox::from_matlab(pos).ok_or(AnnotationError::BadPosition {
        frame,
        id,
        len: pos.len(),
    })?;

    // empty, all-zero or NaN means no visible part was annotated
    let posv = match element.get("posv").and_then(MatValue::as_numeric) {
        None | Some([]) => None,
        Some(v) if v.len() != 4 => {
            return Err(AnnotationError::BadVisibleBox {
                frame,
                id,
                len: v.len(),
            })
        }
        Some(v) if v.iter().any(|x| x.is_nan()) || v.iter().all(|&x| x == 0.0) => None,
        Some(v) => BoundingBox::from_matlab(v),
    };

    let info = &objects[id];
    Ok(Slot::Observed(ObjectObservation {
        id,
        label: info.label.clone(),
        pos,
        posv,
        occluded: flag(element, "occl"),
        locked: flag(element, "lock"),
        start: info.start.unwrap_or_default(),
        end: info.end.unwrap_or_default(),
        hidden: info.hidden,
        initialized: info.initialized,
    }))
}

fn flag(element: &StructElement<'_>, name: &str) -> bool {
    element
        .get(name)
        .and_then(MatValue::as_scalar)
        .is_some_and(|v| v != 0.0)
}

fn field<'a>(a: &'a MatValue, name: &'static str) -> Result<&'a MatValue, AnnotationError> {
    a.field(name).ok_or(AnnotationError::MissingField(name))
}

fn numeric_field<'a>(a: &'a MatValue, name: &'static str) -> Result<&'a [f64], AnnotationError> {
    field(a, name)?
        .as_numeric()
        .ok_or(AnnotationError::BadField {
            field: name,
            expected: "numeric array",
        })
}

fn count_field(a: &MatValue, name: &'static str) -> Result<usize, AnnotationError> {
    let bad = AnnotationError::BadField {
        field: name,
        expected: "non-negative integer scalar",
    };
    match field(a, name)?.as_scalar() {
        Some(v) if v >= 0.0 && v.fract() == 0.0 => Ok(v as usize),
        _ => Err(bad),
    }
}

fn optional_scalar(a: &MatValue, name: &str) -> f64 {
    a.field(name)
        .and_then(MatValue::as_scalar)
        .unwrap_or_default()
}

fn labels(value: &MatValue) -> Result<Vec<String>, AnnotationError> {
    if let Some(cells) = value.as_cells() {
        return cells
            .iter()
            .map(|c| {
                c.as_str().map(str::to_string).ok_or(AnnotationError::BadField {
                    field: "objLbl",
                    expected: "cell array of strings",
                })
            })
            .collect();
    }
    // MATLAB stores an empty label list as a plain empty array
    if value.is_empty() {
        return Ok(Vec::new());
    }
    Err(AnnotationError::BadField {
        field: "objLbl",
        expected: "cell array of strings",
    })
}

fn check_count(field: &'static str, found: usize, expected: usize) -> Result<(), AnnotationError> {
    if found == expected {
        Ok(())
    } else {
        Err(AnnotationError::CountMismatch {
            field,
            found,
            expected,
        })
    }
}
