//! Builders for synthetic `.seq` and `.vbb` files used across the test suites.

use std::io::Write;

use flate2::write::ZlibEncoder;
use flate2::Compression;

use super::mat::{
    MI_COMPRESSED, MI_DOUBLE, MI_INT32, MI_INT8, MI_MATRIX, MI_UINT16, MI_UINT32, MX_CELL,
    MX_CHAR, MX_DOUBLE, MX_STRUCT,
};

pub fn fake_jpeg(seed: u8, body_len: usize) -> Vec<u8> {
    let mut data = vec![0xFF, 0xD8, 0xFF, 0xE0];
    data.extend((0..body_len).map(|i| seed.wrapping_add(i as u8) | 1));
    data.extend([0xFF, 0xD9]);
    data
}

pub fn fake_png(seed: u8) -> Vec<u8> {
    let mut data = b"\x89PNG\r\n\x1a\n".to_vec();
    data.extend([seed; 16]);
    data
}

pub struct SeqBuilder {
    frames: Vec<Vec<u8>>,
    format_code: i32,
    declared: Option<usize>,
    padded: bool,
}

impl SeqBuilder {
    pub fn new(frames: Vec<Vec<u8>>, format_code: i32) -> Self {
        Self {
            frames,
            format_code,
            declared: None,
            padded: false,
        }
    }

    pub fn jpeg(frames: Vec<Vec<u8>>) -> Self {
        Self::new(frames, 102)
    }

    pub fn padded(mut self, padded: bool) -> Self {
        self.padded = padded;
        self
    }

    pub fn declared_frames(mut self, n: usize) -> Self {
        self.declared = Some(n);
        self
    }

    pub fn build(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend(0xFEEDu32.to_le_bytes());
        out.extend(utf16_field("Norpix seq\n", 24));
        out.extend(3i32.to_le_bytes());
        out.extend(1024i32.to_le_bytes());
        out.extend(utf16_field("test sequence", 512));

        let image_size = self.frames.first().map_or(0, |f| f.len()) as i32;
        let declared = self.declared.unwrap_or(self.frames.len()) as i32;
        let params = [640, 480, 8, 8, image_size, self.format_code, declared, 0, image_size];
        for p in params {
            out.extend(p.to_le_bytes());
        }
        out.extend(30.0f64.to_le_bytes());
        out.resize(1024, 0);

        for (i, frame) in self.frames.iter().enumerate() {
            out.extend((frame.len() as u32 + 4).to_le_bytes());
            out.extend(frame);
            // seconds, milliseconds, microseconds
            let trailer = [0x5A, 0x4B, 0x3C, 0x2D, 0x10, 0x00, 0x20, 0x00];
            match (self.padded, i) {
                (true, _) => {
                    out.extend(trailer);
                    out.extend([0u8; 8]);
                }
                (false, 0) => out.extend(&trailer[..4]),
                (false, _) => out.extend(trailer),
            }
        }
        out
    }
}

fn utf16_field(text: &str, len: usize) -> Vec<u8> {
    let mut out: Vec<u8> = text.encode_utf16().flat_map(|u| u.to_le_bytes()).collect();
    out.resize(len, 0);
    out
}

/// In-memory MATLAB value for the writer
#[derive(Clone, Debug)]
pub enum TestValue {
    Num(Vec<usize>, Vec<f64>),
    Str(String),
    Cell(Vec<usize>, Vec<TestValue>),
    Struct(Vec<usize>, Vec<&'static str>, Vec<Vec<TestValue>>),
}

impl TestValue {
    pub fn scalar(v: f64) -> Self {
        TestValue::Num(vec![1, 1], vec![v])
    }

    pub fn row(values: &[f64]) -> Self {
        TestValue::Num(vec![1, values.len()], values.to_vec())
    }

    pub fn empty() -> Self {
        TestValue::Num(vec![0, 0], Vec::new())
    }

    pub fn str(s: &str) -> Self {
        TestValue::Str(s.to_string())
    }

    pub fn cell_row(items: Vec<TestValue>) -> Self {
        TestValue::Cell(vec![1, items.len()], items)
    }

    /// 1x1 struct
    pub fn record(fields: Vec<(&'static str, TestValue)>) -> Self {
        let (names, values) = fields.into_iter().unzip();
        TestValue::Struct(vec![1, 1], names, vec![values])
    }
}

fn element(ty: u32, data: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    if !data.is_empty() && data.len() <= 4 {
        out.extend(((data.len() as u32) << 16 | ty).to_le_bytes());
        out.extend(data);
        out.resize(8, 0);
        return out;
    }
    out.extend(ty.to_le_bytes());
    out.extend((data.len() as u32).to_le_bytes());
    out.extend(data);
    while out.len() % 8 != 0 {
        out.push(0);
    }
    out
}

fn i32_bytes(values: impl IntoIterator<Item = usize>) -> Vec<u8> {
    values
        .into_iter()
        .flat_map(|v| (v as i32).to_le_bytes())
        .collect()
}

pub fn matrix(name: &str, value: &TestValue) -> Vec<u8> {
    let (class, dims) = match value {
        TestValue::Num(dims, _) => (MX_DOUBLE, dims.clone()),
        TestValue::Str(s) => (MX_CHAR, vec![1, s.encode_utf16().count()]),
        TestValue::Cell(dims, _) => (MX_CELL, dims.clone()),
        TestValue::Struct(dims, _, _) => (MX_STRUCT, dims.clone()),
    };

    let mut body = Vec::new();
    let mut flags = (class as u32).to_le_bytes().to_vec();
    flags.extend(0u32.to_le_bytes());
    body.extend(element(MI_UINT32, &flags));
    body.extend(element(MI_INT32, &i32_bytes(dims)));
    body.extend(element(MI_INT8, name.as_bytes()));

    match value {
        TestValue::Num(_, data) => {
            let bytes: Vec<u8> = data.iter().flat_map(|v| v.to_le_bytes()).collect();
            body.extend(element(MI_DOUBLE, &bytes));
        }
        TestValue::Str(s) => {
            let bytes: Vec<u8> = s.encode_utf16().flat_map(|u| u.to_le_bytes()).collect();
            body.extend(element(MI_UINT16, &bytes));
        }
        TestValue::Cell(_, items) => {
            for item in items {
                body.extend(matrix("", item));
            }
        }
        TestValue::Struct(_, names, elements) => {
            const NAME_LEN: usize = 32;
            body.extend(element(MI_INT32, &i32_bytes([NAME_LEN])));
            let mut packed = Vec::new();
            for n in names {
                let mut field = n.as_bytes().to_vec();
                field.resize(NAME_LEN, 0);
                packed.extend(field);
            }
            body.extend(element(MI_INT8, &packed));
            for values in elements {
                for v in values {
                    body.extend(matrix("", v));
                }
            }
        }
    }

    element(MI_MATRIX, &body)
}

pub fn mat_file(vars: &[(&str, TestValue)], compress: bool) -> Vec<u8> {
    let mut out = b"MATLAB 5.0 MAT-file, Platform: test".to_vec();
    out.resize(116, b' ');
    out.extend([0u8; 8]);
    out.extend(0x0100u16.to_le_bytes());
    out.extend(b"IM");

    for (name, value) in vars {
        let m = matrix(name, value);
        if compress {
            let mut enc = ZlibEncoder::new(Vec::new(), Compression::default());
            enc.write_all(&m).unwrap();
            let z = enc.finish().unwrap();
            out.extend(MI_COMPRESSED.to_le_bytes());
            out.extend((z.len() as u32).to_le_bytes());
            out.extend(z);
        } else {
            out.extend(m);
        }
    }
    out
}

/// One object in a synthetic annotation file (1-origin like MATLAB)
#[derive(Clone, Debug)]
pub struct TestObject {
    pub label: &'static str,
    pub start: usize,
    pub end: usize,
    pub hide: bool,
    pub init: bool,
}

impl TestObject {
    pub fn person(start: usize, end: usize) -> Self {
        Self {
            label: "person",
            start,
            end,
            hide: false,
            init: true,
        }
    }
}

/// One observation slot (1-origin id and position)
#[derive(Clone, Debug)]
pub struct TestObservation {
    pub id: usize,
    pub pos: Vec<f64>,
    pub occl: bool,
    pub posv: Vec<f64>,
}

impl TestObservation {
    pub fn new(id: usize, pos: [f64; 4]) -> Self {
        Self {
            id,
            pos: pos.to_vec(),
            occl: false,
            posv: Vec::new(),
        }
    }
}

pub struct VbbBuilder {
    pub objects: Vec<TestObject>,
    pub frames: Vec<Vec<TestObservation>>,
    pub compress: bool,
}

impl VbbBuilder {
    pub fn new(frame_count: usize) -> Self {
        Self {
            objects: Vec::new(),
            frames: vec![Vec::new(); frame_count],
            compress: true,
        }
    }

    pub fn object(mut self, object: TestObject) -> Self {
        self.objects.push(object);
        self
    }

    pub fn observe(mut self, frame: usize, obs: TestObservation) -> Self {
        self.frames[frame].push(obs);
        self
    }

    pub fn uncompressed(mut self) -> Self {
        self.compress = false;
        self
    }

    pub fn annotation_struct(&self) -> Vec<(&'static str, TestValue)> {
        let lists = self
            .frames
            .iter()
            .map(|obs| {
                if obs.is_empty() {
                    return TestValue::empty();
                }
                let elements = obs
                    .iter()
                    .map(|o| {
                        let posv = if o.posv.is_empty() {
                            TestValue::empty()
                        } else {
                            TestValue::row(&o.posv)
                        };
                        vec![
                            TestValue::scalar(o.id as f64),
                            TestValue::row(&o.pos),
                            TestValue::scalar(o.occl as u8 as f64),
                            TestValue::scalar(0.0),
                            posv,
                        ]
                    })
                    .collect();
                TestValue::Struct(
                    vec![1, obs.len()],
                    vec!["id", "pos", "occl", "lock", "posv"],
                    elements,
                )
            })
            .collect();

        let per_object = |f: &dyn Fn(&TestObject) -> f64| {
            TestValue::row(&self.objects.iter().map(f).collect::<Vec<_>>())
        };

        vec![
            ("nFrame", TestValue::scalar(self.frames.len() as f64)),
            ("objLists", TestValue::cell_row(lists)),
            ("maxObj", TestValue::scalar(self.objects.len() as f64)),
            ("objInit", per_object(&|o: &TestObject| o.init as u8 as f64)),
            (
                "objLbl",
                TestValue::cell_row(self.objects.iter().map(|o| TestValue::str(o.label)).collect()),
            ),
            ("objStr", per_object(&|o: &TestObject| o.start as f64)),
            ("objEnd", per_object(&|o: &TestObject| o.end as f64)),
            ("objHide", per_object(&|o: &TestObject| o.hide as u8 as f64)),
            ("altered", TestValue::scalar(0.0)),
            ("log", TestValue::empty()),
            ("logLen", TestValue::scalar(0.0)),
        ]
    }

    pub fn build_with(&self, fields: Vec<(&'static str, TestValue)>) -> Vec<u8> {
        mat_file(&[("A", TestValue::record(fields))], self.compress)
    }

    pub fn build(&self) -> Vec<u8> {
        self.build_with(self.annotation_struct())
    }
}
