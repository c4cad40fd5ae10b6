//! Chunked processing for long recordings.
//!
//! The recording and its transcript are split into contiguous, time-aligned
//! chunks; each chunk is uploaded, dispatched as an independent task, and
//! polled for its cleaned artifact. Reassembly is strictly by chunk index.
//! Dispatch is at-least-once: a stuck chunk is re-dispatched, never
//! cancelled, so the worker must be idempotent on its output path.

use std::time::{Duration, Instant};

use anyhow::Context;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::audio::AudioClip;
use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::pipeline;
use crate::providers::{AnswerProvider, AudioStore, ChunkQueue, SfxStore, TtsProvider};
use crate::transcript::Transcript;

/// Task payload submitted to the chunk queue, one per chunk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkPayload {
    pub episode_id: String,
    pub chunk_id: String,
    pub chunk_index: u32,
    pub total_chunks: u32,
    pub audio_uri: String,
    pub transcript_uri: Option<String>,
    pub cleanup_options: PipelineConfig,
    pub requester_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChunkStatus {
    Pending,
    Dispatched,
    Completed,
    Failed,
}

/// Orchestrator-side view of one chunk's lifecycle.
#[derive(Debug)]
pub struct Chunk {
    pub index: u32,
    pub audio_uri: String,
    pub transcript_uri: Option<String>,
    pub status: ChunkStatus,
    pub cleaned_uri: Option<String>,
    pub dispatch_time: Option<Instant>,
    pub retry_count: u32,
}

pub fn should_chunk(duration_s: f64, config: &PipelineConfig) -> bool {
    duration_s > config.chunk_threshold_s
}

/// Where a chunk worker publishes its cleaned output. Deterministic per
/// source URI, which is what makes re-dispatch safe.
pub fn cleaned_uri_for(audio_uri: &str) -> String {
    match audio_uri.rsplit_once('.') {
        Some((stem, _)) => format!("{}.cleaned.wav", stem),
        None => format!("{}.cleaned.wav", audio_uri),
    }
}

/// Split, upload, dispatch, poll, and reassemble. Any chunk without a valid
/// storage URI aborts before dispatch (all-or-nothing); the caller falls
/// back to direct processing.
pub async fn process_chunked(
    source: &AudioClip,
    transcript: &Transcript,
    config: &PipelineConfig,
    store: &AudioStore,
    queue: &ChunkQueue,
    episode_id: &str,
    requester_id: &str,
) -> Result<AudioClip, PipelineError> {
    let total_duration = source.duration_s();
    let total_chunks = (total_duration / config.chunk_duration_s).ceil().max(1.0) as u32;
    info!(
        "chunked mode: {:.0}s split into {} chunks of ~{:.0}s",
        total_duration, total_chunks, config.chunk_duration_s
    );

    // Upload every chunk before dispatching any: a single missing URI must
    // abort chunked processing entirely.
    let mut chunks: Vec<Chunk> = Vec::with_capacity(total_chunks as usize);
    for index in 0..total_chunks {
        let start = index as f64 * config.chunk_duration_s;
        let end = (start + config.chunk_duration_s).min(total_duration);

        let audio_bytes = source
            .slice_s(start, end)
            .to_wav_bytes()
            .map_err(|e| PipelineError::Chunking {
                reason: format!("chunk {} encode failed: {:#}", index, e),
            })?;
        let audio_uri = store
            .upload(
                &audio_bytes,
                &format!("episodes/{}/chunk_{}.wav", episode_id, index),
                "audio/wav",
            )
            .await
            .map_err(|e| PipelineError::Chunking {
                reason: format!("chunk {} audio upload failed: {:#}", index, e),
            })?;
        if audio_uri.is_empty() {
            return Err(PipelineError::Chunking {
                reason: format!("chunk {} upload returned no URI", index),
            });
        }

        let transcript_json = transcript
            .slice(start, end)
            .to_json()
            .map_err(PipelineError::Other)?;
        let transcript_uri = store
            .upload(
                transcript_json.as_bytes(),
                &format!("episodes/{}/chunk_{}_transcript.json", episode_id, index),
                "application/json",
            )
            .await
            .map_err(|e| PipelineError::Chunking {
                reason: format!("chunk {} transcript upload failed: {:#}", index, e),
            })?;

        chunks.push(Chunk {
            index,
            audio_uri,
            transcript_uri: Some(transcript_uri),
            status: ChunkStatus::Pending,
            cleaned_uri: None,
            dispatch_time: None,
            retry_count: 0,
        });
    }

    let payloads: Vec<ChunkPayload> = chunks
        .iter()
        .map(|chunk| ChunkPayload {
            episode_id: episode_id.to_string(),
            chunk_id: Uuid::new_v4().to_string(),
            chunk_index: chunk.index,
            total_chunks,
            audio_uri: chunk.audio_uri.clone(),
            transcript_uri: chunk.transcript_uri.clone(),
            cleanup_options: config.clone(),
            requester_id: requester_id.to_string(),
        })
        .collect();

    for (chunk, payload) in chunks.iter_mut().zip(&payloads) {
        queue
            .submit(payload.clone())
            .await
            .map_err(|e| PipelineError::Chunking {
                reason: format!("chunk {} dispatch failed: {:#}", chunk.index, e),
            })?;
        chunk.status = ChunkStatus::Dispatched;
        chunk.dispatch_time = Some(Instant::now());
    }

    poll_for_completion(&mut chunks, &payloads, config, store, queue).await?;

    // Reassemble strictly by index; the table is already index-ordered.
    let mut assembled = AudioClip::empty(source.sample_rate);
    for chunk in &chunks {
        let uri = chunk.cleaned_uri.as_ref().expect("completed chunk has a cleaned URI");
        let bytes = store.download(uri).await.map_err(|e| PipelineError::Chunking {
            reason: format!("chunk {} download failed: {:#}", chunk.index, e),
        })?;
        let clip = AudioClip::from_wav_bytes(&bytes)
            .map_err(|e| PipelineError::Audio(format!("chunk {}: {:#}", chunk.index, e)))?;
        assembled.append(&clip);
    }

    info!("chunked mode complete: {:.0}s reassembled", assembled.duration_s());
    Ok(assembled)
}

async fn poll_for_completion(
    chunks: &mut [Chunk],
    payloads: &[ChunkPayload],
    config: &PipelineConfig,
    store: &AudioStore,
    queue: &ChunkQueue,
) -> Result<(), PipelineError> {
    let started = Instant::now();

    loop {
        if chunks.iter().all(|c| c.status == ChunkStatus::Completed) {
            return Ok(());
        }

        if started.elapsed().as_secs() > config.chunk_global_timeout_s {
            let missing: Vec<u32> = chunks
                .iter()
                .filter(|c| c.status != ChunkStatus::Completed)
                .map(|c| c.index)
                .collect();
            return Err(PipelineError::Chunking {
                reason: format!(
                    "timed out after {}s waiting for chunks {:?}",
                    config.chunk_global_timeout_s, missing
                ),
            });
        }

        tokio::time::sleep(Duration::from_secs(config.chunk_poll_interval_s)).await;

        for (chunk, payload) in chunks.iter_mut().zip(payloads) {
            if chunk.status == ChunkStatus::Completed {
                continue;
            }

            let cleaned = cleaned_uri_for(&chunk.audio_uri);
            if store.exists(&cleaned).await {
                chunk.status = ChunkStatus::Completed;
                chunk.cleaned_uri = Some(cleaned);
                info!("chunk {} completed", chunk.index);
                continue;
            }

            let stuck = chunk
                .dispatch_time
                .map(|t| t.elapsed().as_secs() > config.chunk_retry_window_s)
                .unwrap_or(false);
            if stuck && chunk.retry_count < config.chunk_retry_cap {
                warn!(
                    "chunk {} stuck for >{}s, re-dispatching (retry {}/{})",
                    chunk.index,
                    config.chunk_retry_window_s,
                    chunk.retry_count + 1,
                    config.chunk_retry_cap
                );
                queue
                    .submit(payload.clone())
                    .await
                    .map_err(|e| PipelineError::Chunking {
                        reason: format!("chunk {} re-dispatch failed: {:#}", chunk.index, e),
                    })?;
                chunk.retry_count += 1;
                chunk.dispatch_time = Some(Instant::now());
            }
        }
    }
}

/// Process one dispatched chunk: download its audio and transcript, run the
/// cleanup pipeline, and publish the cleaned artifact.
///
/// Idempotent by contract: the output URI is derived from the input URI and
/// uploads overwrite, so running the same payload twice converges on the
/// same artifact. Required because dispatch is at-least-once.
pub async fn chunk_worker(
    payload: ChunkPayload,
    store: AudioStore,
    answer: AnswerProvider,
    tts: TtsProvider,
) -> Result<(), PipelineError> {
    let audio_bytes = store
        .download(&payload.audio_uri)
        .await
        .with_context(|| format!("chunk {} audio missing", payload.chunk_index))
        .map_err(PipelineError::Other)?;
    let source = AudioClip::from_wav_bytes(&audio_bytes)
        .map_err(|e| PipelineError::Audio(format!("chunk {}: {:#}", payload.chunk_index, e)))?;

    let transcript = match &payload.transcript_uri {
        Some(uri) => {
            let bytes = store
                .download(uri)
                .await
                .with_context(|| format!("chunk {} transcript missing", payload.chunk_index))
                .map_err(PipelineError::Other)?;
            Transcript::from_json(&String::from_utf8_lossy(&bytes)).map_err(PipelineError::Other)?
        }
        None => Transcript::default(),
    };

    let config = &payload.cleanup_options;
    let sfx_store = SfxStore::new(&config.media_root);
    let is_last = payload.chunk_index + 1 == payload.total_chunks;

    let result = pipeline::run_cleanup(
        source,
        transcript,
        config,
        &answer,
        &tts,
        &sfx_store,
        is_last,
    )
    .await?;

    let cleaned_bytes = result
        .audio
        .to_wav_bytes()
        .map_err(|e| PipelineError::Audio(format!("chunk {}: {:#}", payload.chunk_index, e)))?;
    store
        .upload(&cleaned_bytes, &cleaned_uri_for(&payload.audio_uri), "audio/wav")
        .await
        .map_err(PipelineError::Other)?;

    info!(
        "chunk {}/{} cleaned ({:.1}s -> {:.1}s)",
        payload.chunk_index + 1,
        payload.total_chunks,
        payload.cleanup_options.chunk_duration_s,
        result.audio.duration_s()
    );
    Ok(())
}
