//! In-band spoken command extraction.
//!
//! A pre-pass resolves SFX trigger phrases (their spoken cue is edited out
//! of the audio before the effect is overlaid in its place), then a single
//! forward scan recognizes intern-command triggers and captures their
//! forward context up to an end marker, another command, a long gap, or the
//! absolute window cap.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::{InternMode, PipelineConfig};
use crate::normalize::{compile_phrases, match_at, normalize, tokens_equal, PhraseVariant};
use crate::transcript::Word;

/// An AI "intern" request captured from speech. One-shot: consumed by the
/// command executor within the same run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandEvent {
    pub time_s: f64,
    pub token: String,
    pub mode: InternMode,
    pub context_text: String,
    pub context_end_s: f64,
    pub end_marker_start_s: Option<f64>,
    pub end_marker_end_s: Option<f64>,
    pub remove_spoken_prompt: bool,
}

/// A spoken SFX trigger resolved to a sound-effect file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SfxEvent {
    pub time_s: f64,
    pub file: String,
    pub phrase: String,
}

#[derive(Debug, Default)]
pub struct Extraction {
    pub commands: Vec<CommandEvent>,
    pub sfx: Vec<SfxEvent>,
}

/// End markers are short spoken phrases; longer config entries are ignored.
const MAX_MARKER_TOKENS: usize = 4;

/// Pre-pass: match SFX phrases that span more than one word (multi-word
/// aliases, or single-token aliases the transcription split in two). The
/// first word of the span keeps the file reference, every covered word is
/// consumed and blanked so later scans skip them.
fn detect_sfx_phrases(words: &mut [Word], config: &PipelineConfig) -> Vec<SfxEvent> {
    let entries: Vec<(String, String)> = config
        .sfx_aliases
        .iter()
        .map(|(phrase, file)| (phrase.clone(), file.clone()))
        .collect();
    let compiled = compile_phrases(&entries);

    let mut events = Vec::new();
    let mut i = 0;
    while i < words.len() {
        if words[i].consumed {
            i += 1;
            continue;
        }

        let mut advanced = false;
        for variant in &compiled {
            if let Some(consumed) = match_at(words, i, variant) {
                if variant.tokens.len() == 1 && consumed == 1 {
                    // Plain single-token hits belong to the main scan, which
                    // leaves a readable placeholder behind.
                    continue;
                }
                let phrase = variant.tokens.join(" ");
                debug!("sfx phrase \"{}\" at {:.2}s -> {}", phrase, words[i].start, variant.target);
                events.push(SfxEvent {
                    time_s: words[i].start,
                    file: variant.target.clone(),
                    phrase: phrase.clone(),
                });
                words[i].sfx_file = Some(variant.target.clone());
                for w in words.iter_mut().take(i + consumed).skip(i) {
                    w.consumed = true;
                    w.blank();
                }
                i += consumed;
                advanced = true;
                break;
            }
        }
        if !advanced {
            i += 1;
        }
    }

    events
}

fn compile_markers(config: &PipelineConfig) -> Vec<PhraseVariant> {
    let entries: Vec<(String, String)> = config
        .end_marker_phrases
        .iter()
        .map(|p| (p.clone(), p.clone()))
        .collect();
    compile_phrases(&entries)
        .into_iter()
        .filter(|v| v.tokens.len() <= MAX_MARKER_TOKENS)
        .collect()
}

/// Find an end marker whose span covers index `j`, probing a small backward
/// window so markers that contain the trigger token itself ("stop intern")
/// are recognized even when the scan lands on the trigger word.
fn find_covering_marker(
    words: &[Word],
    j: usize,
    markers: &[PhraseVariant],
) -> Option<(usize, usize)> {
    let lo = j.saturating_sub(MAX_MARKER_TOKENS - 1);
    for k in lo..=j {
        for marker in markers {
            if let Some(len) = match_at(words, k, marker) {
                if k + len > j {
                    return Some((k, len));
                }
            }
        }
    }
    None
}

fn lookup_intern(config: &PipelineConfig, norm: &str) -> Option<InternMode> {
    config.intern_aliases.get(norm).copied()
}

fn lookup_single_sfx(config: &PipelineConfig, norm: &str) -> Option<String> {
    config.sfx_aliases.iter().find_map(|(phrase, file)| {
        let tokens: Vec<String> = phrase.split_whitespace().map(normalize).collect();
        match tokens.as_slice() {
            [only] if tokens_equal(only, norm) => Some(file.clone()),
            _ => None,
        }
    })
}

/// Run the full extraction over the word list: SFX pre-pass, then the
/// forward command scan. Matched spans are consumed/blanked in place;
/// indices stay stable.
pub fn extract_commands(words: &mut [Word], config: &PipelineConfig) -> Extraction {
    let mut result = Extraction {
        sfx: detect_sfx_phrases(words, config),
        ..Default::default()
    };

    let markers = compile_markers(config);

    let mut i = 0;
    while i < words.len() {
        if words[i].consumed {
            i += 1;
            continue;
        }

        let norm = normalize(&words[i].word);
        if norm.is_empty() {
            i += 1;
            continue;
        }

        if let Some(mode) = lookup_intern(config, &norm) {
            let (event, resume) = capture_command(words, i, norm, mode, &markers, config);
            debug!(
                "command \"{}\" at {:.2}s, context ends {:.2}s",
                event.token, event.time_s, event.context_end_s
            );
            result.commands.push(event);
            words[i].is_command_token = true;
            if !config.keep_command_token {
                words[i].blank();
            }
            i = resume;
            continue;
        }

        if let Some(file) = lookup_single_sfx(config, &norm) {
            debug!("sfx token \"{}\" at {:.2}s -> {}", norm, words[i].start, file);
            result.sfx.push(SfxEvent {
                time_s: words[i].start,
                file: file.clone(),
                phrase: norm.clone(),
            });
            words[i].sfx_file = Some(file);
            words[i].word = format!("{{{}}}", norm);
            words[i].consumed = true;
            i += 1;
            continue;
        }

        i += 1;
    }

    result.sfx.sort_by(|a, b| a.time_s.partial_cmp(&b.time_s).unwrap());
    result
}

/// Capture the forward context of an intern command starting at trigger
/// index `i`. Returns the event and the index scanning should resume at.
fn capture_command(
    words: &mut [Word],
    i: usize,
    token: String,
    mode: InternMode,
    markers: &[PhraseVariant],
    config: &PipelineConfig,
) -> (CommandEvent, usize) {
    let trigger_start = words[i].start;
    let mut context: Vec<String> = Vec::new();
    let mut context_end_s = words[i].end;
    let mut marker_span: Option<(f64, f64)> = None;
    let mut resume = i + 1;

    let mut j = i + 1;
    let scan_limit = (i + 1 + config.max_context_words).min(words.len());

    while j < scan_limit {
        if words[j].consumed {
            j += 1;
            continue;
        }

        // End marker closes the window; its words are scaffolding and are
        // consumed so the trigger inside "stop intern" is not re-scanned.
        if let Some((k, len)) = find_covering_marker(words, j, markers) {
            if k >= i + 1 {
                let start = words[k].start;
                let end = words[k + len - 1].end;
                marker_span = Some((start, end));
                for w in words.iter_mut().take(k + len).skip(k) {
                    w.consumed = true;
                    w.blank();
                }
                resume = k + len;
                break;
            }
        }

        let norm = normalize(&words[j].word);

        // Another command token wins the position; first-found command ends
        // this one's context, no retroactive re-scan.
        if lookup_intern(config, &norm).is_some() || lookup_single_sfx(config, &norm).is_some() {
            resume = j;
            break;
        }

        // A long silence means the speaker stopped dictating.
        let prev_end = if context.is_empty() { words[i].end } else { context_end_s };
        if words[j].start - prev_end > config.context_gap_s {
            resume = j;
            break;
        }

        // Absolute window cap.
        if words[j].end - trigger_start > config.context_window_s {
            resume = j;
            break;
        }

        if !norm.is_empty() {
            context.push(words[j].word.clone());
        }
        context_end_s = words[j].end;
        j += 1;
        resume = j;
    }

    let context_end_s = match marker_span {
        Some((_, marker_end)) => marker_end,
        None => context_end_s,
    };

    let event = CommandEvent {
        time_s: trigger_start,
        token,
        mode,
        context_text: context.join(" "),
        context_end_s,
        end_marker_start_s: marker_span.map(|(s, _)| s),
        end_marker_end_s: marker_span.map(|(_, e)| e),
        remove_spoken_prompt: config.remove_spoken_prompt,
    };

    (event, resume)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transcript::Word;

    fn make_words(tokens: &[(&str, f64, f64)]) -> Vec<Word> {
        tokens.iter().map(|(t, s, e)| Word::new(t, *s, *e)).collect()
    }

    fn cfg() -> PipelineConfig {
        let mut config = PipelineConfig::default();
        config.sfx_aliases.insert("airhorn".into(), "airhorn.wav".into());
        config.sfx_aliases.insert("sad trombone".into(), "trombone.wav".into());
        config
    }

    #[test]
    fn single_token_sfx_gets_placeholder_and_event() {
        let mut words = make_words(&[
            ("hit", 0.0, 0.3),
            ("the", 0.4, 0.6),
            ("Airhorn!", 0.7, 1.2),
        ]);
        let extraction = extract_commands(&mut words, &cfg());
        assert_eq!(extraction.sfx.len(), 1);
        assert_eq!(extraction.sfx[0].file, "airhorn.wav");
        assert!((extraction.sfx[0].time_s - 0.7).abs() < 1e-9);
        assert_eq!(words[2].word, "{airhorn}");
        assert_eq!(words[2].sfx_file.as_deref(), Some("airhorn.wav"));
        assert!(words[2].consumed);
    }

    #[test]
    fn multi_word_sfx_consumes_span_in_pre_pass() {
        let mut words = make_words(&[
            ("sad", 0.0, 0.3),
            ("trombone", 0.4, 0.9),
            ("please", 1.0, 1.4),
        ]);
        let extraction = extract_commands(&mut words, &cfg());
        assert_eq!(extraction.sfx.len(), 1);
        assert_eq!(extraction.sfx[0].file, "trombone.wav");
        assert_eq!(words[0].sfx_file.as_deref(), Some("trombone.wav"));
        assert!(words[0].word.is_empty());
        assert!(words[1].consumed);
        assert_eq!(words[2].word, "please");
    }

    #[test]
    fn split_single_token_sfx_is_caught_by_pre_pass() {
        let mut words = make_words(&[("air", 0.0, 0.3), ("horn", 0.35, 0.7)]);
        let extraction = extract_commands(&mut words, &cfg());
        assert_eq!(extraction.sfx.len(), 1);
        assert!(words[0].consumed && words[1].consumed);
    }

    #[test]
    fn command_context_closes_on_end_marker() {
        let mut words = make_words(&[
            ("intern", 0.0, 0.5),
            ("what", 0.6, 0.9),
            ("is", 1.0, 1.2),
            ("rust", 1.3, 1.7),
            ("stop", 1.8, 2.1),
            ("intern", 2.2, 2.6),
        ]);
        let extraction = extract_commands(&mut words, &cfg());
        assert_eq!(extraction.commands.len(), 1);
        let cmd = &extraction.commands[0];
        assert_eq!(cmd.context_text, "what is rust");
        assert_eq!(cmd.end_marker_start_s, Some(1.8));
        assert_eq!(cmd.end_marker_end_s, Some(2.6));
        assert!((cmd.context_end_s - 2.6).abs() < 1e-9);
        // Marker words are consumed; the trailing "intern" is not a new command.
        assert!(words[4].consumed && words[5].consumed);
        // Trigger token kept in transcript by default.
        assert_eq!(words[0].word, "intern");
        assert!(words[0].is_command_token);
    }

    #[test]
    fn command_context_closes_on_gap() {
        let mut words = make_words(&[
            ("intern", 0.0, 0.5),
            ("define", 0.6, 1.0),
            ("ownership", 1.1, 1.8),
            ("later", 9.0, 9.4),
        ]);
        let extraction = extract_commands(&mut words, &cfg());
        let cmd = &extraction.commands[0];
        assert_eq!(cmd.context_text, "define ownership");
        assert!((cmd.context_end_s - 1.8).abs() < 1e-9);
        assert!(cmd.end_marker_start_s.is_none());
    }

    #[test]
    fn second_command_token_ends_first_context() {
        let mut words = make_words(&[
            ("intern", 0.0, 0.5),
            ("first", 0.6, 1.0),
            ("intern", 1.2, 1.7),
            ("second", 1.8, 2.2),
        ]);
        let extraction = extract_commands(&mut words, &cfg());
        assert_eq!(extraction.commands.len(), 2);
        assert_eq!(extraction.commands[0].context_text, "first");
        assert_eq!(extraction.commands[1].context_text, "second");
    }

    #[test]
    fn window_cap_bounds_context() {
        let mut config = cfg();
        config.context_gap_s = 100.0;
        let mut words = vec![Word::new("intern", 0.0, 0.5)];
        for i in 0..20 {
            let s = 1.0 + i as f64;
            words.push(Word::new("word", s, s + 0.4));
        }
        let extraction = extract_commands(&mut words, &config);
        let cmd = &extraction.commands[0];
        // Nothing past the 15 s cap makes it into the context.
        assert!(cmd.context_end_s <= 15.0 + 0.5);
    }

    #[test]
    fn blanks_trigger_when_configured() {
        let mut config = cfg();
        config.keep_command_token = false;
        let mut words = make_words(&[("intern", 0.0, 0.5), ("hi", 0.6, 0.9)]);
        extract_commands(&mut words, &config);
        assert!(words[0].word.is_empty());
        assert!(words[0].is_command_token);
    }

    #[test]
    fn shownote_alias_sets_mode() {
        let mut words = make_words(&[("shownote", 0.0, 0.5), ("link", 0.6, 0.9)]);
        let extraction = extract_commands(&mut words, &cfg());
        assert_eq!(extraction.commands[0].mode, InternMode::Shownote);
    }
}
