//! Chunk task submission.
//!
//! The transport itself is an external collaborator; the contract is only
//! "submit a chunk payload, and eventually a cleaned artifact appears at the
//! derived URI, or it does not". The local queue runs the chunk worker as an
//! in-process task against the same store, which is enough for tests and the
//! offline binary.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use anyhow::Result;
use tracing::error;
use uuid::Uuid;

use crate::chunking::{chunk_worker, ChunkPayload};

use super::{AnswerProvider, AudioStore, TtsProvider};

#[derive(Debug, Clone)]
pub enum ChunkQueue {
    /// Spawns the chunk worker as a tokio task.
    Local {
        store: AudioStore,
        answer: AnswerProvider,
        tts: TtsProvider,
    },
    /// Accepts every submission and does nothing with it.
    Null,
    /// Like `Null`, but counts submissions; used to exercise retry behavior.
    Counting { submits: Arc<AtomicU32> },
}

impl ChunkQueue {
    pub fn local(store: AudioStore, answer: AnswerProvider, tts: TtsProvider) -> Self {
        ChunkQueue::Local { store, answer, tts }
    }

    pub fn counting_null() -> Self {
        ChunkQueue::Counting { submits: Arc::new(AtomicU32::new(0)) }
    }

    pub fn submit_count(&self) -> u32 {
        match self {
            ChunkQueue::Counting { submits } => submits.load(Ordering::SeqCst),
            _ => 0,
        }
    }

    /// Submit one chunk task. Returns an opaque task handle.
    pub async fn submit(&self, payload: ChunkPayload) -> Result<String> {
        let handle = Uuid::new_v4().to_string();
        match self {
            ChunkQueue::Local { store, answer, tts } => {
                let store = store.clone();
                let answer = answer.clone();
                let tts = tts.clone();
                let index = payload.chunk_index;
                tokio::spawn(async move {
                    if let Err(e) = chunk_worker(payload, store, answer, tts).await {
                        // A failed worker produces no artifact; the
                        // orchestrator's retry/timeout handles it.
                        error!("chunk worker {} failed: {}", index, e);
                    }
                });
            }
            ChunkQueue::Null => {}
            ChunkQueue::Counting { submits } => {
                submits.fetch_add(1, Ordering::SeqCst);
            }
        }
        Ok(handle)
    }
}
