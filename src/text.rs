//! Character-offset helpers
//!
//! Public spans address text by character (Unicode scalar) offsets, while
//! `str` slicing and the `regex` crate work in bytes. These helpers convert
//! between the two.

/// Number of characters in `text`
pub fn char_len(text: &str) -> usize {
    text.chars().count()
}

/// Byte offset of the character at `char_idx`
///
/// Returns `text.len()` when `char_idx` equals the character length, and
/// `None` when it is past the end.
pub fn byte_offset(text: &str, char_idx: usize) -> Option<usize> {
    if char_idx == 0 {
        return Some(0);
    }
    let mut indices = text.char_indices().map(|(b, _)| b).chain(Some(text.len()));
    indices.nth(char_idx)
}

/// Slice `text` by a half-open character range
pub fn slice_chars(text: &str, start: usize, end: usize) -> Option<&str> {
    if start > end {
        return None;
    }
    let from = byte_offset(text, start)?;
    let to = byte_offset(text, end)?;
    text.get(from..to)
}

/// Maps byte offsets of a single text to character offsets
///
/// Built once per text so repeated lookups (one per regex match) stay linear.
pub struct CharMap {
    /// Byte offset of every character boundary, including the end
    boundaries: Vec<usize>,
}

impl CharMap {
    pub fn new(text: &str) -> Self {
        let mut boundaries: Vec<usize> = text.char_indices().map(|(b, _)| b).collect();
        boundaries.push(text.len());
        Self { boundaries }
    }

    /// Character offset for a byte offset on a char boundary
    pub fn to_char(&self, byte: usize) -> Option<usize> {
        self.boundaries.binary_search(&byte).ok()
    }

    /// Character length of the mapped text
    pub fn len(&self) -> usize {
        self.boundaries.len() - 1
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ascii_offsets_match_bytes() {
        let text = "hello";
        assert_eq!(char_len(text), 5);
        assert_eq!(byte_offset(text, 0), Some(0));
        assert_eq!(byte_offset(text, 5), Some(5));
        assert_eq!(byte_offset(text, 6), None);
        assert_eq!(slice_chars(text, 1, 4), Some("ell"));
    }

    #[test]
    fn test_multibyte_offsets() {
        let text = "héllo wörld";
        assert_eq!(char_len(text), 11);
        assert_eq!(slice_chars(text, 0, 5), Some("héllo"));
        assert_eq!(slice_chars(text, 6, 11), Some("wörld"));
        assert_eq!(slice_chars(text, 5, 4), None);
    }

    #[test]
    fn test_char_map() {
        let text = "ab€cd";
        let map = CharMap::new(text);
        assert_eq!(map.len(), 5);
        assert_eq!(map.to_char(0), Some(0));
        assert_eq!(map.to_char(2), Some(2));
        // inside the euro sign
        assert_eq!(map.to_char(3), None);
        assert_eq!(map.to_char(5), Some(3));
        assert_eq!(map.to_char(text.len()), Some(5));
    }
}
