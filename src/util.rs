use std::io;

pub fn unexpected_eof<E>(e: E) -> io::Error
where
  E: Into<Box<dyn std::error::Error + Send + Sync>>,
{
  io::Error::new(io::ErrorKind::UnexpectedEof, e)
}

/// Splits `s` on `\n`, trims whitespace off each piece and drops empty
/// pieces. Used for dirlist responses and any other newline-delimited
/// payload the wire sends back.
pub fn split_non_empty_lines(s: &str) -> Vec<String> {
  s.split('\n')
    .map(str::trim)
    .filter(|s| !s.is_empty())
    .map(str::to_owned)
    .collect()
}

/// Joins `items[start..=end]` (end clamped to `items.len() - 1`) with `\n`.
/// An out-of-range or inverted window yields an empty string.
pub fn join_window(items: &[String], start: usize, end: usize) -> String {
  if items.is_empty() || start >= items.len() || end < start {
    return String::new();
  }

  let last = end.min(items.len() - 1);
  items[start..=last].join("\n")
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn splits_and_drops_empty_lines() {
    let out = split_non_empty_lines("fileA\nfileB\n\nfileC");
    assert_eq!(out, vec!["fileA", "fileB", "fileC"]);
  }

  #[test]
  fn join_window_clamps_to_bounds() {
    let items: Vec<String> = vec!["a", "b", "c"].into_iter().map(String::from).collect();
    assert_eq!(join_window(&items, 0, 49), "a\nb\nc");
    assert_eq!(join_window(&items, 1, 1), "b");
    assert_eq!(join_window(&items, 5, 10), "");
    assert_eq!(join_window(&items, 2, 0), "");
  }
}
