//! Rebuilds the cleaned audio track from the annotated word list.
//!
//! Walks the words in time order, copying inter-word gaps and retained words
//! verbatim from the source while skipping filler spans and consumed SFX
//! cues. Removing a filler also trims a short lead off the audio already
//! written, which drops the in-breath that usually precedes a hesitation.

use std::collections::{BTreeSet, HashMap};

use tracing::debug;

use crate::audio::AudioClip;
use crate::normalize::normalize;
use crate::transcript::Word;

#[derive(Debug)]
pub struct RebuildResult {
    pub audio: AudioClip,
    /// Normalized filler text -> number of occurrences removed.
    pub filler_counts: HashMap<String, u32>,
    pub fillers_removed: u32,
    /// Total lead-trim actually applied, for duration accounting.
    pub lead_trim_applied_ms: u64,
}

/// Stitch the retained portions of `source` into a new track.
///
/// Invariant: rebuilt duration = original duration − skipped word spans −
/// lead-trims applied, and each lead-trim is bounded by the configured
/// maximum, the previously appended word segment, and the output length.
pub fn rebuild_audio(
    source: &AudioClip,
    words: &[Word],
    filler_spans: &BTreeSet<usize>,
    lead_trim_ms: u64,
) -> RebuildResult {
    let mut out = AudioClip::empty(source.sample_rate);
    let mut cursor = 0.0f64;
    let mut prev_segment_ms: u64 = 0;
    let mut filler_counts: HashMap<String, u32> = HashMap::new();
    let mut fillers_removed = 0u32;
    let mut lead_trim_applied_ms = 0u64;

    for (i, word) in words.iter().enumerate() {
        if word.start > cursor {
            out.append(&source.slice_s(cursor, word.start));
        }

        let is_filler = filler_spans.contains(&i);
        let is_sfx_cue = word.consumed || word.sfx_file.is_some();

        if is_filler {
            // Skip the filler's audio and shave the attack artifact off the
            // tail of what is already written. At most one trim per filler.
            let trim = lead_trim_ms.min(prev_segment_ms).min(out.len_ms());
            if trim > 0 {
                out.truncate_tail_ms(trim);
                lead_trim_applied_ms += trim;
                prev_segment_ms -= trim;
            }
            let key = normalize(&word.word);
            if !key.is_empty() {
                *filler_counts.entry(key).or_insert(0) += 1;
            }
            fillers_removed += 1;
        } else if is_sfx_cue {
            // The spoken cue is edited out; the effect is overlaid later.
        } else {
            let before = out.len_ms();
            out.append(&source.slice_s(word.start, word.end));
            prev_segment_ms = out.len_ms() - before;
        }

        cursor = cursor.max(word.end);
    }

    if cursor < source.duration_s() {
        out.append(&source.slice_s(cursor, source.duration_s()));
    }

    debug!(
        "rebuilt {:.1}s -> {:.1}s ({} fillers removed, {}ms lead trim)",
        source.duration_s(),
        out.duration_s(),
        fillers_removed,
        lead_trim_applied_ms
    );

    RebuildResult { audio: out, filler_counts, fillers_removed, lead_trim_applied_ms }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transcript::Word;

    const SR: u32 = 1000;

    fn source(duration_s: f64) -> AudioClip {
        let n = (duration_s * SR as f64) as usize;
        AudioClip::new((0..n).map(|i| (i % 97) as f32 / 97.0).collect(), SR)
    }

    fn make_words(tokens: &[(&str, f64, f64)]) -> Vec<Word> {
        tokens.iter().map(|(t, s, e)| Word::new(t, *s, *e)).collect()
    }

    #[test]
    fn keeps_everything_without_fillers() {
        let src = source(3.0);
        let words = make_words(&[("a", 0.5, 1.0), ("b", 1.5, 2.0)]);
        let result = rebuild_audio(&src, &words, &BTreeSet::new(), 60);
        assert_eq!(result.audio.samples.len(), src.samples.len());
        assert_eq!(result.fillers_removed, 0);
    }

    #[test]
    fn duration_invariant_holds() {
        let src = source(4.0);
        let words = make_words(&[
            ("hello", 0.5, 1.0),
            ("um", 1.2, 1.7),
            ("world", 2.0, 2.5),
        ]);
        let spans: BTreeSet<usize> = [1].into_iter().collect();
        let result = rebuild_audio(&src, &words, &spans, 60);

        let filler_ms = 500u64;
        let expected_ms = 4000 - filler_ms - result.lead_trim_applied_ms;
        assert_eq!(result.audio.len_ms(), expected_ms);
        assert_eq!(result.lead_trim_applied_ms, 60);
        assert_eq!(result.fillers_removed, 1);
        assert_eq!(result.filler_counts.get("um"), Some(&1));
    }

    #[test]
    fn lead_trim_bounded_by_previous_segment() {
        let src = source(3.0);
        // Previous word is only 30 ms long; trim cannot exceed it.
        let words = make_words(&[("hi", 0.5, 0.53), ("um", 0.6, 1.0)]);
        let spans: BTreeSet<usize> = [1].into_iter().collect();
        let result = rebuild_audio(&src, &words, &spans, 60);
        assert_eq!(result.lead_trim_applied_ms, 30);
    }

    #[test]
    fn no_lead_trim_when_nothing_was_appended_for_a_word() {
        let src = source(2.0);
        // Filler is the first word; no previous segment to trim.
        let words = make_words(&[("um", 0.0, 0.4), ("ok", 0.5, 1.0)]);
        let spans: BTreeSet<usize> = [0].into_iter().collect();
        let result = rebuild_audio(&src, &words, &spans, 60);
        assert_eq!(result.lead_trim_applied_ms, 0);
        assert_eq!(result.audio.len_ms(), 2000 - 400);
    }

    #[test]
    fn consecutive_fillers_cannot_trim_more_than_the_segment() {
        let src = source(4.0);
        let words = make_words(&[
            ("word", 0.0, 0.1), // 100 ms segment
            ("um", 0.2, 0.5),
            ("uh", 0.6, 0.9),
            ("uh", 1.0, 1.3),
        ]);
        let spans: BTreeSet<usize> = [1, 2, 3].into_iter().collect();
        let result = rebuild_audio(&src, &words, &spans, 60);
        // 60 then 40, then nothing left of the segment budget.
        assert_eq!(result.lead_trim_applied_ms, 100);
        assert_eq!(result.fillers_removed, 3);
    }

    #[test]
    fn sfx_cue_audio_is_removed_without_trim_or_count() {
        let src = source(3.0);
        let mut words = make_words(&[("ok", 0.2, 0.7), ("airhorn", 1.0, 1.5)]);
        words[1].sfx_file = Some("airhorn.wav".into());
        words[1].consumed = true;
        let result = rebuild_audio(&src, &words, &BTreeSet::new(), 60);
        assert_eq!(result.audio.len_ms(), 3000 - 500);
        assert_eq!(result.fillers_removed, 0);
        assert_eq!(result.lead_trim_applied_ms, 0);
    }

    #[test]
    fn end_to_end_scenario_omits_filler_span() {
        // Words: uh / hello / flubber / world, filler = {"uh"}.
        let src = source(2.0);
        let words = make_words(&[
            ("uh", 0.0, 0.5),
            ("hello", 0.5, 1.0),
            ("flubber", 1.0, 1.5),
            ("world", 1.5, 2.0),
        ]);
        let spans: BTreeSet<usize> = [0].into_iter().collect();
        let result = rebuild_audio(&src, &words, &spans, 60);
        // Filler had no preceding segment, so exactly its span is gone.
        assert_eq!(result.audio.len_ms(), 1500);
        // The rest of the track is copied verbatim.
        assert_eq!(result.audio.samples[..], src.samples[500..]);
    }
}
