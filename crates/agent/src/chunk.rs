//! Fixed-size sliding-window chunker.
//!
//! Windows are measured in chars, so a window never splits a code point.
//! Consecutive windows share `overlap` chars; the last window may be shorter.

/// Split `text` into overlapping windows of `size` chars.
///
/// Returns no windows for empty input. `overlap` is clamped below `size`.
pub fn split_windows(text: &str, size: usize, overlap: usize) -> Vec<String> {
    let size = size.max(1);
    let step = size - overlap.min(size - 1);

    // Byte offset of every char boundary, including the end of the string.
    let bounds: Vec<usize> = text
        .char_indices()
        .map(|(i, _)| i)
        .chain(std::iter::once(text.len()))
        .collect();
    let len = bounds.len() - 1;

    let mut windows = Vec::new();
    let mut start = 0;
    while start < len {
        let end = (start + size).min(len);
        windows.push(text[bounds[start]..bounds[end]].to_string());
        if end == len {
            break;
        }
        start += step;
    }
    windows
}
