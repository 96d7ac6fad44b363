use std::collections::HashSet;

/// Common English stop words dropped before hashing
const STOP_WORDS: &[&str] = &[
  // Articles and determiners
  "the", "a", "an", "this", "that", // Conjunctions
  "and", "or", "but", // Prepositions
  "in", "on", "at", "to", "for", "of", "with", "by", "from", "as", // Common verbs
  "is", "are", "was", "were", "be", "been", "have", "has", "had", "do", "does", "did", "will",
  "would", "could", "should", "may", "can", // Pronouns
  "you", "your", "we", "our", "us", "they", "them", "their", "it", "its",
];

pub fn stop_words() -> HashSet<&'static str> {
  STOP_WORDS.iter().copied().collect()
}

/// Lowercased words of `text` with punctuation trimmed and stop words removed,
/// in order of appearance.
pub fn tokenize(text: &str) -> Vec<String> {
  let stop_words = stop_words();

  text
    .split_whitespace()
    .map(|word| word.trim_matches(|c: char| !c.is_alphanumeric()).to_lowercase())
    .filter(|word| !word.is_empty() && !stop_words.contains(word.as_str()))
    .collect()
}

/// 64-bit FNV-1a, stable across platforms and releases.
pub fn fnv1a(bytes: &[u8]) -> u64 {
  const OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
  const PRIME: u64 = 0x0100_0000_01b3;

  bytes.iter().fold(OFFSET, |hash, &b| (hash ^ b as u64).wrapping_mul(PRIME))
}
