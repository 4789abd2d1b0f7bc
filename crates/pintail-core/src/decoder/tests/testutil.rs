use std::sync::Arc;

use crate::dict::Dictionary;

/// Build an in-memory dictionary from `(code, text)` pairs.
pub fn dict(entries: &[(&str, &str)]) -> Arc<Dictionary> {
    Arc::new(Dictionary::from_pairs(entries.iter().copied()))
}

/// Shared dictionary for decoder tests: the word for "nihao" exists both
/// as a whole and as two single-syllable words.
pub fn hanzi_dict() -> Arc<Dictionary> {
    dict(&[("ni", "你"), ("hao", "好"), ("nihao", "你好")])
}
