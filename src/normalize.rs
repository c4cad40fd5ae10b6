//! Token normalization and phrase matching over the word stream.
//!
//! Matching has to survive transcription artifacts: punctuation glued to
//! tokens, case changes, a two-word trigger merged into one token
//! ("youknow"), or a one-word trigger split in two ("air horn").

use crate::transcript::Word;

/// Lowercase a token and drop every non-alphanumeric character. Blanked
/// words normalize to the empty string and never match anything.
pub fn normalize(token: &str) -> String {
    token
        .to_lowercase()
        .chars()
        .filter(|c| c.is_alphanumeric())
        .collect()
}

/// One matchable form of a configured phrase.
#[derive(Debug, Clone)]
pub struct PhraseVariant {
    /// Normalized tokens, in order.
    pub tokens: Vec<String>,
    /// What a match maps to (an SFX file, an action name, or the phrase
    /// itself for plain lists).
    pub target: String,
    /// When set, only the one-token-per-word form matches; no collapsed or
    /// split forms are tried.
    pub strict_spacing: bool,
}

impl PhraseVariant {
    /// The phrase collapsed into a single token ("you know" -> "youknow").
    fn collapsed(&self) -> String {
        self.tokens.concat()
    }
}

/// Compile (phrase, target) pairs into match variants: normalized,
/// deduplicated by token tuple, sorted longest-first so greedy scans always
/// prefer the longest phrase.
pub fn compile_phrases(entries: &[(String, String)]) -> Vec<PhraseVariant> {
    let mut variants: Vec<PhraseVariant> = Vec::new();

    for (phrase, target) in entries {
        let tokens: Vec<String> = phrase
            .split_whitespace()
            .map(normalize)
            .filter(|t| !t.is_empty())
            .collect();
        if tokens.is_empty() {
            continue;
        }
        if variants.iter().any(|v| v.tokens == tokens) {
            continue;
        }
        variants.push(PhraseVariant {
            tokens,
            target: target.clone(),
            strict_spacing: false,
        });
    }

    variants.sort_by(|a, b| {
        b.tokens
            .len()
            .cmp(&a.tokens.len())
            .then_with(|| b.collapsed().len().cmp(&a.collapsed().len()))
    });

    variants
}

/// Compile a plain phrase list (the target is the phrase itself).
pub fn compile_phrase_list(phrases: &[String]) -> Vec<PhraseVariant> {
    let entries: Vec<(String, String)> = phrases
        .iter()
        .map(|p| (p.clone(), p.clone()))
        .collect();
    compile_phrases(&entries)
}

/// Singular/plural tolerant token equality.
pub(crate) fn tokens_equal(a: &str, b: &str) -> bool {
    if a == b {
        return true;
    }
    (a.len() == b.len() + 1 && a.ends_with('s') && a.starts_with(b))
        || (b.len() == a.len() + 1 && b.ends_with('s') && b.starts_with(a))
}

/// Compare `tokens.len()` consecutive normalized words starting at `i`.
/// Plural tolerance applies to the final token only.
pub fn match_exact_at(words: &[Word], i: usize, tokens: &[String]) -> bool {
    if i + tokens.len() > words.len() {
        return false;
    }
    for (k, token) in tokens.iter().enumerate() {
        let w = normalize(&words[i + k].word);
        let ok = if k == tokens.len() - 1 {
            tokens_equal(&w, token)
        } else {
            w == *token
        };
        if !ok {
            return false;
        }
    }
    true
}

/// Try to match a variant at index `i`, returning how many words it covers.
///
/// Three forms are tried, longest coverage first:
/// - exact: one token per word;
/// - collapsed: the whole phrase merged into `words[i]` alone;
/// - split (one-token phrases only): the trigger split across
///   `words[i]` + `words[i+1]`.
pub fn match_at(words: &[Word], i: usize, variant: &PhraseVariant) -> Option<usize> {
    if i >= words.len() {
        return None;
    }

    if match_exact_at(words, i, &variant.tokens) {
        return Some(variant.tokens.len());
    }

    if variant.strict_spacing {
        return None;
    }

    let collapsed = variant.collapsed();

    if variant.tokens.len() == 1 && i + 1 < words.len() {
        let joined = format!("{}{}", normalize(&words[i].word), normalize(&words[i + 1].word));
        if !normalize(&words[i].word).is_empty() && tokens_equal(&joined, &collapsed) {
            return Some(2);
        }
    }

    if variant.tokens.len() > 1 {
        let w = normalize(&words[i].word);
        if tokens_equal(&w, &collapsed) {
            return Some(1);
        }
    }

    None
}
