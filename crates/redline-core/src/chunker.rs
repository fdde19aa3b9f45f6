use crate::{error::ChunkingError, types::TextWindow};

/// Splits document text into overlapping fixed-size windows.
///
/// Sizes and offsets count characters, not bytes, so a window never ends
/// inside a multi-byte character. Boundaries depend only on the text length
/// and the two sizes.
#[derive(Debug, Clone, Copy)]
pub struct Chunker {
    window_size: usize,
    overlap: usize,
}

impl Chunker {
    pub fn new(window_size: usize, overlap: usize) -> Result<Self, ChunkingError> {
        if window_size == 0 {
            return Err(ChunkingError::ZeroWindow);
        }
        if overlap >= window_size {
            return Err(ChunkingError::OverlapTooLarge {
                window_size,
                overlap,
            });
        }
        Ok(Self {
            window_size,
            overlap,
        })
    }

    pub fn window_size(&self) -> usize {
        self.window_size
    }

    pub fn overlap(&self) -> usize {
        self.overlap
    }

    /// `(start, end)` character ranges for a text of `len` characters.
    /// Always at least one range; the last one ends exactly at `len`.
    pub fn boundaries(&self, len: usize) -> Vec<(usize, usize)> {
        let step = self.window_size - self.overlap;
        let mut ranges = Vec::with_capacity(self.window_count(len));
        let mut start = 0;
        loop {
            let end = (start + self.window_size).min(len);
            ranges.push((start, end));
            if end >= len {
                break;
            }
            start += step;
        }
        ranges
    }

    /// `ceil((len - overlap) / (window - overlap))`, never less than one.
    pub fn window_count(&self, len: usize) -> usize {
        let step = self.window_size - self.overlap;
        if len <= self.window_size {
            return 1;
        }
        (len - self.overlap).div_ceil(step)
    }

    pub fn chunk(&self, text: &str) -> Vec<TextWindow> {
        // Byte offset of every char boundary, including the end of the text.
        let offsets: Vec<usize> = text
            .char_indices()
            .map(|(i, _)| i)
            .chain(std::iter::once(text.len()))
            .collect();
        let len = offsets.len() - 1;

        self.boundaries(len)
            .into_iter()
            .enumerate()
            .map(|(index, (start, end))| TextWindow {
                index,
                start_offset: start,
                text: text[offsets[start]..offsets[end]].to_string(),
            })
            .collect()
    }
}
