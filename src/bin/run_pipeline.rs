//! Runs the cleanup pipeline on a local WAV + word-timestamp JSON pair.
//! Usage: cargo run --bin run_pipeline -- <audio.wav> <transcript.json> [output.wav]
//!
//! Uses the live providers when ANTHROPIC_API_KEY / OPENAI_API_KEY are set,
//! otherwise falls back to the offline fixed-answer and silent-TTS variants.

use std::path::PathBuf;

use anyhow::{Context, Result};
use tracing::info;

use podtrim::pipeline::{process_episode, render_report};
use podtrim::providers::store::read_wav_file;
use podtrim::providers::{AnswerProvider, SfxStore, TtsProvider};
use podtrim::{PipelineConfig, Transcript};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "podtrim=info,run_pipeline=info".into()),
        )
        .init();

    let mut args = std::env::args().skip(1);
    let audio_path = PathBuf::from(args.next().context("Usage: run_pipeline <audio.wav> <transcript.json> [output.wav]")?);
    let transcript_path = PathBuf::from(args.next().context("Missing transcript path")?);
    let output_path = args
        .next()
        .map(PathBuf::from)
        .unwrap_or_else(|| audio_path.with_extension("cleaned.wav"));

    let source = read_wav_file(&audio_path)?;
    info!("loaded {:.1}s of audio from {}", source.duration_s(), audio_path.display());

    let transcript_json = std::fs::read_to_string(&transcript_path)
        .with_context(|| format!("Failed to read {}", transcript_path.display()))?;
    let transcript = Transcript::from_json(&transcript_json)?;
    info!("loaded {} words", transcript.words.len());

    let config = PipelineConfig::default();
    let sample_rate = source.sample_rate;

    let answer = AnswerProvider::anthropic_from_env().unwrap_or_else(|| {
        info!("ANTHROPIC_API_KEY not set, using fixed answers");
        AnswerProvider::Fixed { answer: config.fallback_answer.clone() }
    });
    let tts = TtsProvider::openai_from_env().unwrap_or_else(|| {
        info!("OPENAI_API_KEY not set, using silent placeholders");
        TtsProvider::Silence { sample_rate }
    });
    let sfx = SfxStore::new(&config.media_root);

    let result = process_episode(source, transcript, &config, &answer, &tts, &sfx).await?;

    let report = render_report(&result);
    eprintln!("{}", report);

    let report_path = output_path.with_extension("report.txt");
    std::fs::write(&report_path, &report)
        .with_context(|| format!("Failed to write {}", report_path.display()))?;

    let bytes = result.audio.to_wav_bytes()?;
    std::fs::write(&output_path, &bytes)
        .with_context(|| format!("Failed to write {}", output_path.display()))?;
    info!(
        "wrote {:.1}s cleaned audio to {}",
        result.audio.duration_s(),
        output_path.display()
    );

    Ok(())
}
