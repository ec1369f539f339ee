use super::Blob;

/// Split a decoded file into line-bounded blobs.
///
/// Files at or under `max_lines` lines become a single blob with no fragment
/// suffix. Larger files are cut into consecutive fragments of exactly
/// `max_lines` lines (the last may be shorter), labelled `<path>#<n>` from
/// n=0. Fragments keep their `\n` terminators, so concatenating them in
/// order reproduces the decoded text byte for byte. A trailing newline does
/// not open an empty fragment.
pub fn split_blobs(relative_path: &str, text: &str, max_lines: usize) -> Vec<Blob> {
    let lines: Vec<&str> = text.split_inclusive('\n').collect();

    if lines.len() <= max_lines {
        return vec![Blob::new(relative_path.to_string(), None, text.to_string())];
    }

    lines
        .chunks(max_lines)
        .enumerate()
        .map(|(n, chunk)| Blob::new(relative_path.to_string(), Some(n), chunk.concat()))
        .collect()
}
