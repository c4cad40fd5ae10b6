//! Executes extracted command events against the rebuilt track: overlays
//! sound effects, asks the text model for answers, synthesizes speech, and
//! splices it in at a timeline position rescaled from the original track to
//! the cleaned one. Every step degrades to a deterministic fallback rather
//! than failing the job.

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, warn};

use crate::audio::AudioClip;
use crate::commands::{CommandEvent, SfxEvent};
use crate::config::{InternMode, PipelineConfig};
use crate::normalize::normalize;
use crate::providers::{AnswerProvider, IntentAction, SfxStore, TtsProvider};

/// Overlay every SFX event onto the track. A missing or undecodable asset
/// skips that one event with a warning; the rest of the pipeline continues.
pub fn apply_sfx_events(
    track: &mut AudioClip,
    events: &[SfxEvent],
    sfx_store: &SfxStore,
    config: &PipelineConfig,
) -> u32 {
    let mut applied = 0u32;
    for event in events {
        let mut clip = match sfx_store.load(&event.file) {
            Ok(clip) => clip,
            Err(e) => {
                warn!("skipping sfx \"{}\": {:#}", event.file, e);
                continue;
            }
        };
        if clip.sample_rate != track.sample_rate {
            warn!(
                "skipping sfx \"{}\": sample rate {} does not match track {}",
                event.file, clip.sample_rate, track.sample_rate
            );
            continue;
        }
        clip.loudness_match(
            config.insert_target_dbfs as f32,
            config.insert_gain_clamp_db as f32,
            config.insert_min_rms,
        );
        let at = event.time_s.clamp(0.0, track.duration_s());
        track.overlay_at_s(&clip, at);
        applied += 1;
        debug!("overlaid sfx \"{}\" at {:.2}s", event.file, at);
    }
    applied
}

static SENTENCE_SPLIT: Lazy<Regex> = Lazy::new(|| Regex::new(r"[.!?]+\s+").unwrap());

fn normalized_tokens(text: &str) -> Vec<String> {
    text.split_whitespace()
        .map(normalize)
        .filter(|t| !t.is_empty())
        .collect()
}

fn join_norm(tokens: &[String]) -> String {
    tokens.join(" ")
}

/// Strip an answer prefix or suffix that echoes the spoken prompt. Models
/// often open with the question; the window sizes tried hover around the
/// prompt's own token count.
pub fn strip_prompt_echo(answer: &str, prompt: &str, threshold: f64) -> String {
    let prompt_norm = join_norm(&normalized_tokens(prompt));
    if prompt_norm.is_empty() {
        return answer.to_string();
    }

    let answer_tokens: Vec<&str> = answer.split_whitespace().collect();
    let prompt_len = normalized_tokens(prompt).len();
    let candidates: Vec<usize> = (prompt_len.saturating_sub(2)..=prompt_len + 2)
        .filter(|&w| w >= 1 && w < answer_tokens.len())
        .rev()
        .collect();

    let mut start = 0usize;
    let mut end = answer_tokens.len();

    // Pick the best-scoring window, not the first one over the threshold; a
    // too-wide window would eat the answer's real opening words.
    let mut best: Option<(usize, f64)> = None;
    for &w in &candidates {
        let prefix: Vec<String> = answer_tokens[..w].iter().map(|t| normalize(t)).collect();
        let sim = strsim::normalized_levenshtein(&join_norm(&prefix), &prompt_norm);
        if sim >= threshold && best.map_or(true, |(_, s)| sim > s) {
            best = Some((w, sim));
        }
    }
    if let Some((w, _)) = best {
        start = w;
    }

    let mut best: Option<(usize, f64)> = None;
    for &w in &candidates {
        if end.saturating_sub(start) <= w {
            continue;
        }
        let suffix: Vec<String> = answer_tokens[end - w..end].iter().map(|t| normalize(t)).collect();
        let sim = strsim::normalized_levenshtein(&join_norm(&suffix), &prompt_norm);
        if sim >= threshold && best.map_or(true, |(_, s)| sim > s) {
            best = Some((w, sim));
        }
    }
    if let Some((w, _)) = best {
        end -= w;
    }

    answer_tokens[start..end].join(" ")
}

/// Drop an immediately-duplicated trailing sentence or n-gram tail. Text
/// models sometimes repeat their last sentence; speaking it twice sounds
/// broken.
pub fn strip_duplicated_tail(answer: &str) -> String {
    // Sentence-level pass first.
    let sentences: Vec<&str> = SENTENCE_SPLIT.split(answer.trim()).filter(|s| !s.is_empty()).collect();
    if sentences.len() >= 2 {
        let last = join_norm(&normalized_tokens(sentences[sentences.len() - 1]));
        let prev = join_norm(&normalized_tokens(sentences[sentences.len() - 2]));
        if !last.is_empty() && last == prev {
            let cut = answer.trim().rfind(sentences[sentences.len() - 1]).unwrap_or(0);
            let trimmed = answer.trim()[..cut].trim_end();
            if !trimmed.is_empty() {
                return trimmed.to_string();
            }
        }
    }

    // N-gram pass: an exact repeated tail of 8..=20 words.
    let tokens: Vec<&str> = answer.split_whitespace().collect();
    for n in (8..=20usize).rev() {
        if tokens.len() < 2 * n {
            continue;
        }
        let tail: Vec<String> = tokens[tokens.len() - n..].iter().map(|t| normalize(t)).collect();
        let before: Vec<String> = tokens[tokens.len() - 2 * n..tokens.len() - n]
            .iter()
            .map(|t| normalize(t))
            .collect();
        if tail == before {
            return tokens[..tokens.len() - n].join(" ");
        }
    }

    answer.to_string()
}

#[derive(Debug, Default)]
pub struct CommandOutcome {
    pub shownotes: Vec<String>,
    pub inserted: u32,
    pub fallbacks: u32,
}

/// Resolve and splice every command event into the cleaned track.
///
/// Insertion points live on the cleaned timeline: the original-timeline
/// context end is scaled by `cleaned_len / original_len`, then padded.
/// Events are processed in time order, with earlier insertions shifting
/// later positions by the net duration they added.
pub async fn apply_command_events(
    mut track: AudioClip,
    events: &[CommandEvent],
    original_duration_s: f64,
    answer_provider: &AnswerProvider,
    tts: &TtsProvider,
    config: &PipelineConfig,
) -> (AudioClip, CommandOutcome) {
    let mut outcome = CommandOutcome::default();
    if events.is_empty() {
        return (track, outcome);
    }

    let ratio = if original_duration_s > 0.0 {
        track.duration_s() / original_duration_s
    } else {
        1.0
    };

    let mut ordered: Vec<&CommandEvent> = events.iter().collect();
    ordered.sort_by(|a, b| a.time_s.partial_cmp(&b.time_s).unwrap());

    let mut shift_s = 0.0f64;

    for event in ordered {
        let intent = resolve_intent(event, answer_provider).await;

        let answer = match answer_provider.answer(&event.context_text).await {
            Ok(text) if !text.trim().is_empty() => text,
            Ok(_) | Err(_) => {
                warn!("answer generation failed for \"{}\", using fallback", event.context_text);
                outcome.fallbacks += 1;
                config.fallback_answer.clone()
            }
        };

        if intent == IntentAction::AddToShownotes {
            debug!("shownote command at {:.2}s", event.time_s);
            outcome.shownotes.push(answer);
            continue;
        }

        let cleaned = strip_duplicated_tail(&strip_prompt_echo(
            &answer,
            &event.context_text,
            config.echo_similarity,
        ));
        let spoken = if cleaned.trim().is_empty() { config.fallback_answer.clone() } else { cleaned };

        let mut clip = match tts.synthesize(&spoken).await {
            Ok(clip) if clip.sample_rate == track.sample_rate => clip,
            Ok(clip) => {
                warn!(
                    "synthesized answer sample rate {} does not match track {}, using placeholder",
                    clip.sample_rate, track.sample_rate
                );
                outcome.fallbacks += 1;
                AudioClip::silence(1.0, track.sample_rate)
            }
            Err(e) => {
                warn!("tts failed: {:#}, trying fallback phrase", e);
                outcome.fallbacks += 1;
                match tts.synthesize(&config.fallback_answer).await {
                    Ok(clip) if clip.sample_rate == track.sample_rate => clip,
                    _ => AudioClip::silence(1.0, track.sample_rate),
                }
            }
        };

        clip.loudness_match(
            config.insert_target_dbfs as f32,
            config.insert_gain_clamp_db as f32,
            config.insert_min_rms,
        );
        clip.fade_out_ms(config.answer_fade_out_ms);

        let pad_s = config.insert_pad_ms as f64 / 1000.0;
        let clip_len = clip.duration_s();

        match (event.end_marker_start_s, event.end_marker_end_s) {
            (Some(marker_start), Some(marker_end)) => {
                // Cut the spoken end-marker span out of the cleaned track and
                // insert at the cut point.
                let cut_start = (marker_start * ratio + shift_s).clamp(0.0, track.duration_s());
                let cut_end = (marker_end * ratio + shift_s).clamp(cut_start, track.duration_s());
                track.cut_s(cut_start, cut_end);
                if event.remove_spoken_prompt {
                    let prompt_start = (event.time_s * ratio + shift_s).clamp(0.0, cut_start);
                    track.replace_with_silence_s(prompt_start, cut_start);
                }
                track.insert_at_s(&clip, cut_start);
                shift_s += clip_len - (cut_end - cut_start);
            }
            _ => {
                let at = (event.context_end_s * ratio + pad_s + shift_s)
                    .clamp(0.0, track.duration_s());
                if event.remove_spoken_prompt {
                    let prompt_start = (event.time_s * ratio + shift_s).clamp(0.0, at);
                    track.replace_with_silence_s(prompt_start, at);
                }
                track.insert_at_s(&clip, at);
                shift_s += clip_len;
            }
        }

        outcome.inserted += 1;
        debug!("inserted {:.2}s answer for command at {:.2}s", clip_len, event.time_s);
    }

    (track, outcome)
}

async fn resolve_intent(event: &CommandEvent, provider: &AnswerProvider) -> IntentAction {
    if event.mode == InternMode::Shownote {
        return IntentAction::AddToShownotes;
    }
    match provider.classify(&event.context_text).await {
        Ok(action) => action,
        Err(e) => {
            // A misrouted show note drops audible content; default to audio.
            warn!("intent classification failed: {:#}, defaulting to audio", e);
            IntentAction::GenerateAudio
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::InternMode;

    const SR: u32 = 1000;

    fn event(time_s: f64, context: &str, context_end_s: f64) -> CommandEvent {
        CommandEvent {
            time_s,
            token: "intern".into(),
            mode: InternMode::Generic,
            context_text: context.into(),
            context_end_s,
            end_marker_start_s: None,
            end_marker_end_s: None,
            remove_spoken_prompt: false,
        }
    }

    #[test]
    fn strips_prompt_echo_prefix() {
        let prompt = "what is the capital of France";
        let answer = "What is the capital of France? The capital of France is Paris.";
        let out = strip_prompt_echo(answer, prompt, 0.86);
        assert!(out.starts_with("The capital"), "got: {}", out);
    }

    #[test]
    fn leaves_non_echo_answers_alone() {
        let prompt = "what is the capital of France";
        let answer = "Paris has been the capital since the tenth century.";
        assert_eq!(strip_prompt_echo(answer, prompt, 0.86), answer);
    }

    #[test]
    fn strips_duplicated_trailing_sentence() {
        let answer = "Paris is the capital. It has two million residents. It has two million residents.";
        let out = strip_duplicated_tail(answer);
        assert_eq!(out, "Paris is the capital. It has two million residents.");
    }

    #[test]
    fn strips_duplicated_ngram_tail() {
        let base = "the quick brown fox jumps over the lazy dog near town";
        let answer = format!("so anyway {} {}", base, base);
        let out = strip_duplicated_tail(&answer);
        assert_eq!(out, format!("so anyway {}", base));
    }

    #[tokio::test]
    async fn insert_position_uses_timeline_ratio() {
        // Original 1000 s, cleaned 900 s -> ratio 0.9; context end 100 s
        // inserts at 90 s + pad, not at 100 s.
        let track = AudioClip::new(vec![0.1; 900 * SR as usize], SR);
        let answer = AnswerProvider::Fixed { answer: "two words".into() };
        let tts = TtsProvider::Silence { sample_rate: SR };
        let config = PipelineConfig::default();

        let events = vec![event(95.0, "question", 100.0)];
        let (out, outcome) = apply_command_events(track, &events, 1000.0, &answer, &tts, &config).await;

        assert_eq!(outcome.inserted, 1);
        // Placeholder TTS emits 0.6 s for two words.
        assert_eq!(out.len_ms(), 900_000 + 600);
        let insert_at = ((90.0 + 0.2) * SR as f64) as usize;
        assert_eq!(out.samples[insert_at], 0.0);
        assert!((out.samples[insert_at - 1] - 0.1).abs() < 1e-6);
    }

    #[tokio::test]
    async fn end_marker_span_is_cut_and_replaced() {
        let track = AudioClip::new(vec![0.1; 100 * SR as usize], SR);
        let answer = AnswerProvider::Fixed { answer: "one".into() };
        let tts = TtsProvider::Silence { sample_rate: SR };
        let config = PipelineConfig::default();

        let mut e = event(10.0, "question", 22.0);
        e.end_marker_start_s = Some(20.0);
        e.end_marker_end_s = Some(22.0);
        let (out, _) = apply_command_events(track, &[e], 100.0, &answer, &tts, &config).await;

        // 2 s marker span cut, 0.3 s placeholder inserted.
        assert_eq!(out.len_ms(), 100_000 - 2000 + 300);
    }

    #[tokio::test]
    async fn shownote_mode_collects_text_without_insert() {
        let track = AudioClip::new(vec![0.1; 10 * SR as usize], SR);
        let answer = AnswerProvider::Fixed { answer: "note text".into() };
        let tts = TtsProvider::Silence { sample_rate: SR };
        let config = PipelineConfig::default();

        let mut e = event(1.0, "remember the link", 2.0);
        e.mode = InternMode::Shownote;
        let (out, outcome) = apply_command_events(track, &[e], 10.0, &answer, &tts, &config).await;

        assert_eq!(outcome.inserted, 0);
        assert_eq!(outcome.shownotes, vec!["note text".to_string()]);
        assert_eq!(out.len_ms(), 10_000);
    }

    #[tokio::test]
    async fn remove_spoken_prompt_silences_window() {
        let track = AudioClip::new(vec![0.1; 100 * SR as usize], SR);
        let answer = AnswerProvider::Fixed { answer: "one".into() };
        let tts = TtsProvider::Silence { sample_rate: SR };
        let mut config = PipelineConfig::default();
        config.insert_pad_ms = 0;

        let mut e = event(10.0, "question", 20.0);
        e.remove_spoken_prompt = true;
        let (out, _) = apply_command_events(track, &[e], 100.0, &answer, &tts, &config).await;

        // Prompt window [10 s, 20 s) silenced, answer inserted at 20 s.
        assert_eq!(out.samples[15 * SR as usize], 0.0);
        assert!((out.samples[5 * SR as usize] - 0.1).abs() < 1e-6);
        assert_eq!(out.len_ms(), 100_000 + 300);
    }
}
