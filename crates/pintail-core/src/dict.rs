//! Input method dictionary: a multimap from code fragments to words.

use std::collections::HashMap;
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::Path;

use tracing::{info, warn};

use crate::corpus;

/// A dictionary entry pairing a code fragment with the text it produces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Word {
    pub code: String,
    pub text: String,
}

/// Index of a word in the dictionary arena.
///
/// Ids are stable for the lifetime of the dictionary and double as the
/// word identity used when comparing search paths.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WordId(u32);

impl WordId {
    /// Sentinel id for the virtual BOS/EOS word (empty code, empty text).
    pub const BOS_EOS: WordId = WordId(u32::MAX);

    pub fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DictError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// A multimap from code fragment to every word spelled with that code.
///
/// Homophones are kept in insertion order, so iteration over duplicates is
/// stable within one process lifetime.
#[derive(Debug, Default)]
pub struct Dictionary {
    words: Vec<Word>,
    by_code: HashMap<String, Vec<WordId>>,
    code_len_limit: Option<usize>,
    text_len_limit: Option<usize>,
    max_code_len: usize,
    max_text_len: usize,
}

impl Dictionary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Dictionary that drops entries whose code or text exceeds a length
    /// limit (in bytes) at load time.
    pub fn with_limits(code_len_limit: Option<usize>, text_len_limit: Option<usize>) -> Self {
        Dictionary {
            code_len_limit,
            text_len_limit,
            ..Self::default()
        }
    }

    pub fn open(path: impl AsRef<Path>) -> Result<Self, DictError> {
        Self::open_limited(path, None, None)
    }

    pub fn open_limited(
        path: impl AsRef<Path>,
        code_len_limit: Option<usize>,
        text_len_limit: Option<usize>,
    ) -> Result<Self, DictError> {
        let mut dict = Self::with_limits(code_len_limit, text_len_limit);
        dict.load(BufReader::new(File::open(path)?))?;
        Ok(dict)
    }

    /// Build an in-memory dictionary, ignoring length limits.
    pub fn from_pairs<I, C, T>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (C, T)>,
        C: Into<String>,
        T: Into<String>,
    {
        let mut dict = Self::new();
        for (code, text) in pairs {
            dict.insert(code.into(), text.into());
        }
        dict
    }

    /// Replace the contents with entries read from `reader`.
    ///
    /// Rows are whitespace-separated `code text` records; blank and
    /// malformed rows are skipped.
    pub fn load<R: BufRead>(&mut self, reader: R) -> io::Result<()> {
        self.words.clear();
        self.by_code.clear();
        self.max_code_len = 0;
        self.max_text_len = 0;

        let mut skipped = 0usize;
        for pair in corpus::pairs(reader) {
            let (code, text) = pair?;
            if self.code_len_limit.is_some_and(|limit| code.len() > limit)
                || self.text_len_limit.is_some_and(|limit| text.len() > limit)
            {
                skipped += 1;
                continue;
            }
            self.insert(code, text);
        }

        if skipped > 0 {
            warn!(skipped, "dropped over-limit dictionary entries");
        }
        info!(words = self.words.len(), "dictionary loaded");
        Ok(())
    }

    fn insert(&mut self, code: String, text: String) {
        let id = WordId(self.words.len() as u32);
        self.max_code_len = self.max_code_len.max(code.len());
        self.max_text_len = self.max_text_len.max(text.len());
        self.by_code.entry(code.clone()).or_default().push(id);
        self.words.push(Word { code, text });
    }

    /// All words whose code equals `code` exactly.
    pub fn find(&self, code: &str) -> impl Iterator<Item = (WordId, &Word)> {
        self.by_code
            .get(code)
            .into_iter()
            .flatten()
            .map(|&id| (id, &self.words[id.index()]))
    }

    pub fn word(&self, id: WordId) -> &Word {
        &self.words[id.index()]
    }

    /// Longest code among the loaded entries, in bytes.
    pub fn max_code_len(&self) -> usize {
        self.max_code_len
    }

    /// Longest text among the loaded entries, in bytes.
    pub fn max_text_len(&self) -> usize {
        self.max_text_len
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn find_returns_homophones_in_insertion_order() {
        let dict = Dictionary::from_pairs([("ma", "妈"), ("ma", "马"), ("mao", "猫")]);
        let texts: Vec<&str> = dict.find("ma").map(|(_, w)| w.text.as_str()).collect();
        assert_eq!(texts, vec!["妈", "马"]);
        assert_eq!(dict.find("mo").count(), 0);
    }

    #[test]
    fn load_skips_malformed_rows() {
        let input = "ni 你\nnothing-here\nhao 好\n\n";
        let mut dict = Dictionary::new();
        dict.load(input.as_bytes()).unwrap();
        assert_eq!(dict.len(), 2);
        assert_eq!(dict.max_code_len(), 3);
    }

    #[test]
    fn load_honors_length_limits() {
        let input = "ni 你\nnihao 你好\n";
        let mut dict = Dictionary::with_limits(Some(3), None);
        dict.load(input.as_bytes()).unwrap();
        assert_eq!(dict.len(), 1);
        assert_eq!(dict.max_code_len(), 2);
        assert_eq!(dict.max_text_len(), "你".len());
    }

    #[test]
    fn word_ids_round_trip() {
        let dict = Dictionary::from_pairs([("ni", "你"), ("hao", "好")]);
        for (id, word) in dict.find("hao") {
            assert_eq!(dict.word(id), word);
        }
    }
}
