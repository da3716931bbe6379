//! 流式投递模块:对完整响应进行可取消的分块模拟投递。
//!
//! # Streaming Delivery Module
//!
//! The upstream API returns a complete response in one shot, so progressive
//! delivery here is **simulated**: the finished text is split into
//! word-balanced chunks which are emitted with a small fixed delay and a
//! cumulative progress figure, followed by a terminal complete signal. This
//! is a deliberate design choice, not true incremental generation.
//!
//! Every session is bound to its own cancellation token. Cancelling a session
//! halts further chunks, resolves the delivery to
//! [`StreamOutcome::Cancelled`], and (because the same token is threaded into
//! the transport) aborts the upstream call if it is still in flight.
//! Sessions are independent; cancelling one never affects another.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// One emitted piece of a streaming delivery.
#[derive(Debug, Clone)]
pub struct StreamChunk {
    pub session_id: String,
    pub text: String,
    /// Cumulative progress, 0-100.
    pub progress: u8,
    /// Terminal complete signal; `text` is empty on this chunk.
    pub done: bool,
}

/// How a delivery ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamOutcome {
    Complete,
    Cancelled,
}

#[derive(Debug, Clone)]
pub struct StreamingConfig {
    /// Target number of chunks a response is split into.
    pub target_chunks: usize,
    /// Fixed delay before each chunk emission.
    pub chunk_delay: Duration,
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self {
            target_chunks: 18,
            chunk_delay: Duration::from_millis(45),
        }
    }
}

impl StreamingConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_target_chunks(mut self, target_chunks: usize) -> Self {
        self.target_chunks = target_chunks.max(1);
        self
    }

    pub fn with_chunk_delay(mut self, chunk_delay: Duration) -> Self {
        self.chunk_delay = chunk_delay;
        self
    }
}

/// A live streaming session: an id plus the token that cancels it.
pub struct StreamSession {
    id: String,
    token: CancellationToken,
}

impl StreamSession {
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Token to thread into the upstream call so cancellation aborts it too.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.token.clone()
    }
}

/// Splits finished responses into chunks and emits them progressively.
///
/// Holds the registry of live sessions; created once per service instance.
pub struct StreamingDeliverer {
    cfg: StreamingConfig,
    parent: CancellationToken,
    sessions: Mutex<HashMap<String, CancellationToken>>,
}

impl StreamingDeliverer {
    /// `parent` is the service shutdown token; all sessions descend from it.
    pub fn new(cfg: StreamingConfig, parent: CancellationToken) -> Self {
        Self {
            cfg,
            parent,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, CancellationToken>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn open_session(&self) -> StreamSession {
        let id = Uuid::new_v4().to_string();
        let token = self.parent.child_token();
        self.lock().insert(id.clone(), token.clone());
        tracing::debug!(session_id = %id, "stream session opened");
        StreamSession { id, token }
    }

    pub(crate) fn close_session(&self, id: &str) {
        self.lock().remove(id);
    }

    pub fn active_sessions(&self) -> usize {
        self.lock().len()
    }

    /// Cancel one session. Returns the number of sessions cancelled (0 or 1).
    pub fn cancel(&self, session_id: &str) -> usize {
        match self.lock().remove(session_id) {
            Some(token) => {
                token.cancel();
                tracing::info!(session_id, "stream session cancelled");
                1
            }
            None => 0,
        }
    }

    /// Cancel every live session. Returns the number cancelled.
    pub fn cancel_all(&self) -> usize {
        let sessions: Vec<_> = self.lock().drain().collect();
        let count = sessions.len();
        for (id, token) in sessions {
            token.cancel();
            tracing::info!(session_id = %id, "stream session cancelled");
        }
        count
    }

    /// Word-balanced split preserving the original whitespace, so the
    /// concatenation of all chunks reproduces `text` exactly.
    fn chunk_words<'t>(&self, text: &'t str) -> Vec<Vec<&'t str>> {
        let words: Vec<&str> = text.split_inclusive(|c: char| c.is_whitespace()).collect();
        if words.is_empty() {
            return Vec::new();
        }
        let per_chunk = words.len().div_ceil(self.cfg.target_chunks.max(1)).max(1);
        words.chunks(per_chunk).map(|c| c.to_vec()).collect()
    }

    /// Emit `text` progressively to `on_chunk`.
    ///
    /// Resolves to [`StreamOutcome::Cancelled`] as soon as the session token
    /// fires; no further chunks are emitted after that point.
    pub async fn deliver<F>(&self, session: &StreamSession, text: &str, mut on_chunk: F) -> StreamOutcome
    where
        F: FnMut(StreamChunk) + Send,
    {
        let chunks = self.chunk_words(text);
        let total_words: usize = chunks.iter().map(Vec::len).sum();
        let mut emitted_words = 0usize;

        for chunk in &chunks {
            tokio::select! {
                biased;
                _ = session.token.cancelled() => {
                    self.close_session(&session.id);
                    return StreamOutcome::Cancelled;
                }
                _ = tokio::time::sleep(self.cfg.chunk_delay) => {}
            }
            emitted_words += chunk.len();
            let progress = ((emitted_words * 100) / total_words.max(1)).min(100) as u8;
            on_chunk(StreamChunk {
                session_id: session.id.clone(),
                text: chunk.concat(),
                progress,
                done: false,
            });
        }

        on_chunk(StreamChunk {
            session_id: session.id.clone(),
            text: String::new(),
            progress: 100,
            done: true,
        });
        self.close_session(&session.id);
        StreamOutcome::Complete
    }
}
