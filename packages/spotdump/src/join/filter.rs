use crate::error::{DumpError, Result};

/// Nucleotide-substring filter for `--bases`.
///
/// The pattern is compiled to 2-bit codes; a spot passes when its assembled
/// bases contain the pattern as a contiguous substring. `N` (and anything
/// else outside ACGT) never matches a pattern position.
#[derive(Debug, Clone)]
pub struct BaseFilter {
  pattern: Vec<u8>,
}

fn code_of(base: u8) -> Option<u8> {
  match base {
    b'A' => Some(0),
    b'C' => Some(1),
    b'G' => Some(2),
    b'T' => Some(3),
    _ => None,
  }
}

impl BaseFilter {
  pub fn new(pattern: &str) -> Result<Self> {
    if pattern.is_empty() {
      return Err(DumpError::Usage("empty base filter pattern".into()));
    }
    let pattern = pattern
      .bytes()
      .map(|base| {
        code_of(base.to_ascii_uppercase()).ok_or_else(|| {
          DumpError::Usage(format!(
            "base filter may only contain A, C, G and T, found '{}'",
            base as char
          ))
        })
      })
      .collect::<Result<Vec<u8>>>()?;
    Ok(Self { pattern })
  }

  pub fn matches(&self, bases: &[u8]) -> bool {
    if bases.len() < self.pattern.len() {
      return false;
    }
    'window: for start in 0..=(bases.len() - self.pattern.len()) {
      for (offset, &want) in self.pattern.iter().enumerate() {
        match code_of(bases[start + offset]) {
          Some(code) if code == want => {}
          _ => continue 'window,
        }
      }
      return true;
    }
    false
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn finds_pattern_anywhere_in_the_spot() {
    let filter = BaseFilter::new("GATT").unwrap();
    assert!(filter.matches(b"AAGATTACA"));
    assert!(filter.matches(b"GATTACA"));
    assert!(filter.matches(b"ACAGATT"));
    assert!(!filter.matches(b"ACGT"));
    assert!(!filter.matches(b"GAT"));
  }

  #[test]
  fn n_bases_never_match() {
    let filter = BaseFilter::new("ACG").unwrap();
    assert!(!filter.matches(b"ANG"));
    assert!(filter.matches(b"NACGN"));
  }

  #[test]
  fn lowercase_patterns_are_accepted() {
    let filter = BaseFilter::new("acgt").unwrap();
    assert!(filter.matches(b"TTACGTTT"));
  }

  #[test]
  fn invalid_pattern_characters_are_usage_errors() {
    assert!(matches!(
      BaseFilter::new("ACGN"),
      Err(DumpError::Usage(_))
    ));
    assert!(matches!(BaseFilter::new(""), Err(DumpError::Usage(_))));
  }
}
