//! Filler word/phrase detection over the annotated word list.

use std::collections::BTreeSet;

use crate::normalize::{compile_phrase_list, match_at, PhraseVariant};
use crate::transcript::Word;

/// Greedy left-to-right scan marking the indices covered by configured
/// filler phrases. Longest phrase wins at every position (the compiled list
/// is pre-sorted), spans never overlap, and the result is independent of the
/// order the fillers were configured in.
///
/// Words already consumed by an earlier stage are skipped, and blanked words
/// normalize to nothing, so re-running the scan on its own output yields an
/// empty set.
pub fn compute_filler_spans(words: &[Word], filler_phrases: &[String]) -> BTreeSet<usize> {
    let compiled = compile_phrase_list(filler_phrases);
    compute_filler_spans_compiled(words, &compiled)
}

pub fn compute_filler_spans_compiled(
    words: &[Word],
    compiled: &[PhraseVariant],
) -> BTreeSet<usize> {
    let mut spans = BTreeSet::new();
    let mut i = 0;

    while i < words.len() {
        if words[i].consumed || spans.contains(&i) {
            i += 1;
            continue;
        }

        let mut matched = 0;
        for variant in compiled {
            if let Some(consumed) = match_at(words, i, variant) {
                matched = consumed;
                break;
            }
        }

        if matched > 0 {
            for k in i..i + matched {
                spans.insert(k);
            }
            i += matched;
        } else {
            i += 1;
        }
    }

    spans
}

/// Blank the transcript text of every detected filler word.
pub fn blank_fillers(words: &mut [Word], spans: &BTreeSet<usize>) {
    for &i in spans {
        if let Some(w) = words.get_mut(i) {
            w.is_filler = true;
            w.blank();
        }
    }
}
