//! String utility functions

/// Trims trailing null characters from a byte buffer
pub fn trim_trailing_nulls(buffer: &mut Vec<u8>) {
    while buffer.last() == Some(&0) {
        buffer.pop();
    }
}

/// Trims trailing spaces and nulls from a fixed-width text field
pub fn trim_fixed_width(bytes: &[u8]) -> &[u8] {
    let end = bytes.iter()
        .rposition(|&b| b != b' ' && b != 0)
        .map(|i| i + 1)
        .unwrap_or(0);
    let start = bytes[..end].iter()
        .position(|&b| b != b' ')
        .unwrap_or(end);
    &bytes[start..end]
}

/// Pads or truncates a string to exactly `width` bytes
///
/// Truncation never splits a UTF-8 character; the remainder is padded.
pub fn to_fixed_width(text: &str, width: usize, pad: u8) -> Vec<u8> {
    let mut end = text.len().min(width);
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    let mut bytes = text.as_bytes()[..end].to_vec();
    bytes.resize(width, pad);
    bytes
}
