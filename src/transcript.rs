use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// One transcribed word with its position in the source audio.
///
/// Entries are never deleted during a run, only flagged or blanked, so
/// downstream stages can keep addressing words by index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Word {
    pub word: String,
    pub start: f64,
    pub end: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speaker: Option<String>,
    #[serde(default)]
    pub is_filler: bool,
    #[serde(default)]
    pub is_command_token: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sfx_file: Option<String>,
    #[serde(default)]
    pub consumed: bool,
}

impl Word {
    pub fn new(word: &str, start: f64, end: f64) -> Self {
        Word {
            word: word.to_string(),
            start,
            end,
            speaker: None,
            is_filler: false,
            is_command_token: false,
            sfx_file: None,
            consumed: false,
        }
    }

    /// Blank the transcript text while keeping the timestamps (the audio
    /// span is still addressable by index).
    pub fn blank(&mut self) {
        self.word.clear();
    }

    pub fn duration(&self) -> f64 {
        self.end - self.start
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Transcript {
    pub words: Vec<Word>,
}

impl Transcript {
    pub fn new(words: Vec<Word>) -> Self {
        Transcript { words }
    }

    /// Parse a word-timestamp transcript from JSON. Accepts either a bare
    /// word array or an object with a `words` field, tolerates missing
    /// optional fields, drops empty tokens, and sorts timestamps to be
    /// monotonic (some transcription backends return slightly out-of-order
    /// words).
    pub fn from_json(data: &str) -> Result<Self> {
        let words: Vec<Word> = match serde_json::from_str::<Transcript>(data) {
            Ok(t) => t.words,
            Err(_) => serde_json::from_str(data).context("Failed to parse transcript JSON")?,
        };

        let mut words: Vec<Word> = words
            .into_iter()
            .map(|mut w| {
                w.word = w.word.trim().to_string();
                w
            })
            .filter(|w| !w.word.is_empty())
            .collect();

        words.sort_by(|a, b| a.start.partial_cmp(&b.start).unwrap_or(std::cmp::Ordering::Equal));

        Ok(Transcript { words })
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).context("Failed to serialize transcript")
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    /// End time of the last word, or 0.0 for an empty transcript.
    pub fn last_word_end(&self) -> f64 {
        self.words.last().map(|w| w.end).unwrap_or(0.0)
    }

    /// Extract the words inside `[start, end)` with timestamps rebased to the
    /// slice start. Used when splitting a long recording into chunks that are
    /// processed independently.
    pub fn slice(&self, start: f64, end: f64) -> Transcript {
        let words = self
            .words
            .iter()
            .filter(|w| w.start >= start && w.start < end)
            .map(|w| {
                let mut w = w.clone();
                w.start = (w.start - start).max(0.0);
                w.end = (w.end - start).max(0.0);
                w
            })
            .collect();
        Transcript { words }
    }

    /// Plain-text rendering of the current (possibly blanked) transcript.
    pub fn text(&self) -> String {
        self.words
            .iter()
            .map(|w| w.word.as_str())
            .filter(|t| !t.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_bare_word_array() {
        let json = r#"[{"word":"hello","start":0.0,"end":0.5},{"word":" world ","start":0.5,"end":1.0}]"#;
        let t = Transcript::from_json(json).unwrap();
        assert_eq!(t.words.len(), 2);
        assert_eq!(t.words[1].word, "world");
        assert!(!t.words[0].is_filler);
    }

    #[test]
    fn sorts_out_of_order_timestamps() {
        let json = r#"[{"word":"b","start":1.0,"end":1.5},{"word":"a","start":0.0,"end":0.5}]"#;
        let t = Transcript::from_json(json).unwrap();
        assert_eq!(t.words[0].word, "a");
        assert_eq!(t.words[1].word, "b");
    }

    #[test]
    fn slice_rebases_timestamps() {
        let t = Transcript::new(vec![
            Word::new("a", 0.0, 0.5),
            Word::new("b", 10.2, 10.8),
            Word::new("c", 25.0, 25.4),
        ]);
        let s = t.slice(10.0, 20.0);
        assert_eq!(s.words.len(), 1);
        assert_eq!(s.words[0].word, "b");
        assert!((s.words[0].start - 0.2).abs() < 1e-9);
    }
}
