//! Abort/rollback trigger detection.
//!
//! "flubber" spoken once means "blank the passage I just flubbed"; spoken
//! twice in quick succession it means "throw the whole take away".

use tracing::info;

use crate::config::PipelineConfig;
use crate::normalize::normalize;
use crate::transcript::Word;

const TRIGGER: &str = "flubber";

#[derive(Debug, Clone, PartialEq)]
pub enum FlubberOutcome {
    /// Terminate the whole assembly job with no partial output.
    Abort { reason: String },
    /// Blank the transcript text from `blank_from_index` through
    /// `blank_to_index_inclusive`. The corresponding audio is left in place.
    Rollback {
        blank_from_index: usize,
        blank_to_index_inclusive: usize,
    },
}

fn is_trigger(token: &str, fuzzy: bool, similarity: f64) -> bool {
    let norm = normalize(token);
    if norm.is_empty() {
        return false;
    }
    if norm == TRIGGER {
        return true;
    }
    fuzzy && strsim::normalized_levenshtein(&norm, TRIGGER) >= similarity
}

/// Scan the word list for flubber triggers and decide the outcome.
///
/// Two or more occurrences with the earliest pair inside the abort window
/// mean the speaker gave up on the take. Otherwise the latest occurrence
/// rolls back up to `flubber_lookback_words` preceding words.
pub fn detect_flubber(words: &[Word], config: &PipelineConfig) -> Option<FlubberOutcome> {
    let similarity = config.flubber_similarity_clamped();
    let occurrences: Vec<usize> = words
        .iter()
        .enumerate()
        .filter(|(_, w)| !w.consumed && is_trigger(&w.word, config.flubber_fuzzy, similarity))
        .map(|(i, _)| i)
        .collect();

    if occurrences.is_empty() {
        return None;
    }

    if occurrences.len() >= 2 {
        let first = &words[occurrences[0]];
        let second = &words[occurrences[1]];
        let gap = second.start - first.start;
        if gap <= config.flubber_abort_window_s {
            info!(
                "flubber abort: occurrences at {:.1}s and {:.1}s ({:.1}s apart)",
                first.start, second.start, gap
            );
            return Some(FlubberOutcome::Abort {
                reason: format!(
                    "flubber spoken twice within {:.1}s (at {:.1}s and {:.1}s)",
                    config.flubber_abort_window_s, first.start, second.start
                ),
            });
        }
    }

    let trigger_idx = *occurrences.last().unwrap();
    let from = trigger_idx.saturating_sub(config.flubber_lookback_words);
    info!(
        "flubber rollback: blanking words {}..={} (trigger at {:.1}s)",
        from, trigger_idx, words[trigger_idx].start
    );
    Some(FlubberOutcome::Rollback {
        blank_from_index: from,
        blank_to_index_inclusive: trigger_idx,
    })
}

/// Blank the transcript text in a rollback span. Audio is not cut.
pub fn apply_rollback(words: &mut [Word], from: usize, to_inclusive: usize) {
    for w in words.iter_mut().take(to_inclusive + 1).skip(from) {
        w.blank();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transcript::Word;

    fn make_words(tokens: &[(&str, f64, f64)]) -> Vec<Word> {
        tokens.iter().map(|(t, s, e)| Word::new(t, *s, *e)).collect()
    }

    fn cfg() -> PipelineConfig {
        PipelineConfig::default()
    }

    #[test]
    fn two_close_occurrences_abort() {
        let words = make_words(&[
            ("flubber", 0.0, 0.5),
            ("hello", 1.0, 1.5),
            ("flubber", 10.0, 10.5),
        ]);
        match detect_flubber(&words, &cfg()) {
            Some(FlubberOutcome::Abort { .. }) => {}
            other => panic!("expected abort, got {:?}", other),
        }
    }

    #[test]
    fn two_far_occurrences_roll_back_on_the_later_one() {
        let words = make_words(&[
            ("flubber", 0.0, 0.5),
            ("hello", 1.0, 1.5),
            ("flubber", 20.0, 20.5),
        ]);
        match detect_flubber(&words, &cfg()) {
            Some(FlubberOutcome::Rollback {
                blank_from_index,
                blank_to_index_inclusive,
            }) => {
                assert_eq!(blank_from_index, 0);
                assert_eq!(blank_to_index_inclusive, 2);
            }
            other => panic!("expected rollback, got {:?}", other),
        }
    }

    #[test]
    fn rollback_span_respects_lookback() {
        let mut config = cfg();
        config.flubber_lookback_words = 1;
        let words = make_words(&[
            ("a", 0.0, 0.3),
            ("b", 0.4, 0.7),
            ("flubber", 1.0, 1.5),
        ]);
        match detect_flubber(&words, &config) {
            Some(FlubberOutcome::Rollback {
                blank_from_index,
                blank_to_index_inclusive,
            }) => {
                assert_eq!(blank_from_index, 1);
                assert_eq!(blank_to_index_inclusive, 2);
            }
            other => panic!("expected rollback, got {:?}", other),
        }
    }

    #[test]
    fn fuzzy_match_accepts_close_transcriptions() {
        let words = make_words(&[("blubber", 3.0, 3.5)]);
        let outcome = detect_flubber(&words, &cfg());
        assert!(matches!(outcome, Some(FlubberOutcome::Rollback { .. })));

        let mut strict = cfg();
        strict.flubber_fuzzy = false;
        assert!(detect_flubber(&words, &strict).is_none());
    }

    #[test]
    fn apply_rollback_blanks_text_only() {
        let mut words = make_words(&[
            ("keep", 0.0, 0.3),
            ("oops", 0.4, 0.7),
            ("flubber", 1.0, 1.5),
        ]);
        apply_rollback(&mut words, 1, 2);
        assert_eq!(words[0].word, "keep");
        assert!(words[1].word.is_empty());
        assert!(words[2].word.is_empty());
        // Timestamps survive so the audio span is still addressable.
        assert!((words[2].end - 1.5).abs() < 1e-9);
    }
}
