/// One embedded image, borrowed from the sequence buffer it was decoded from
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Frame<'a> {
    pub index: usize,
    pub buffer: &'a [u8],
}

impl<'a> Frame<'a> {
    pub fn new(index: usize, buffer: &'a [u8]) -> Self {
        Self { index, buffer }
    }

    /// Output file name, shared by the image and its annotation record
    pub fn file_stem(&self) -> String {
        file_stem(self.index)
    }
}

pub fn file_stem(index: usize) -> String {
    format!("I{:05}", index)
}
