//! Incremental decoding of streamed replies.
//!
//! The streaming endpoint delivers the same response objects as the whole
//! response endpoint, one per fragment. Bytes arrive in arbitrary chunks, so
//! this module deals with three problems:
//!
//! # Problem 1: Chunk boundaries
//!
//! A chunk may end in the middle of a JSON object, in the middle of a string
//! literal, or even in the middle of a multi-byte UTF-8 sequence:
//!
//! ```text
//! Chunk 1: [{"candidates":[{"content":{"parts":[{"text":"Caf\xC3
//! Chunk 2: \xA9 au lait"}]}}]}
//! Chunk 3: ,{"candidates": ...}]
//! ```
//!
//! [`Utf8Decoder`] carries incomplete trailing bytes over to the next chunk,
//! and [`JsonFragmentSplitter`] tracks brace depth (ignoring braces inside
//! string literals) to cut the text into whole objects. The array brackets
//! and separating commas between objects are skipped. With
//! [`StreamFraming::ServerSentEvents`] the `data:` payload of each event is a
//! fragment instead, and `eventsource-stream` does the framing.
//!
//! # Problem 2: Reduction to one outcome
//!
//! ```text
//! AsyncByteSource
//!     │  next_chunk()
//!     ▼
//! Utf8Decoder → JsonFragmentSplitter      (or SSE events)
//!     │  one JSON object per fragment
//!     ▼
//! fragment reducer ──► on_chunk(Text | FunctionCall)   zero or more times
//!     │
//!     ▼
//! on_complete(Outcome)  or  on_error(Error)           at most once
//! ```
//!
//! * Text parts are appended to a running buffer and forwarded as they arrive.
//! * A `functionCall` part is forwarded once, stops reading, and becomes the
//!   final outcome.
//! * A `promptFeedback.blockReason` stops reading and is reported through
//!   `on_error` as [`Error::Blocked`].
//! * At natural end the accumulated text becomes [`Outcome::PlainText`], or
//!   [`Outcome::StructuredData`] when JSON was requested, or
//!   [`Outcome::Empty`] when nothing arrived.
//!
//! # Problem 3: Bad fragments
//!
//! A fragment that does not parse is logged as a `StreamDecodeWarning` and
//! skipped. Only a failing byte source ends the stream with an error.

use crate::config::StreamFraming;
use crate::interpret::parse_structured;
use crate::logging::DiagnosticSink;
use crate::types::{FunctionCall, GenerateContentResponse, Outcome};
use crate::{Error, Result};
use async_trait::async_trait;
use eventsource_stream::{EventStreamError, Eventsource};
use futures::stream::{Stream, StreamExt};
use std::collections::VecDeque;
use std::pin::Pin;

const TARGET: &str = "nutriplanner_ai::stream";

/// Next-chunk-or-done source of raw bytes.
#[async_trait]
pub trait AsyncByteSource: Send {
    /// `None` once the source is exhausted.
    async fn next_chunk(&mut self) -> Option<Result<Vec<u8>>>;
}

/// Adapts any byte stream (for example an HTTP body) to [`AsyncByteSource`].
pub struct StreamByteSource {
    inner: Pin<Box<dyn Stream<Item = Result<Vec<u8>>> + Send>>,
}

impl StreamByteSource {
    pub fn new<S>(stream: S) -> Self
    where
        S: Stream<Item = Result<Vec<u8>>> + Send + 'static,
    {
        Self {
            inner: Box::pin(stream),
        }
    }
}

#[async_trait]
impl AsyncByteSource for StreamByteSource {
    async fn next_chunk(&mut self) -> Option<Result<Vec<u8>>> {
        self.inner.next().await
    }
}

/// In-memory source replaying a fixed list of chunks.
#[derive(Debug, Default)]
pub struct ChunkedSource {
    chunks: VecDeque<Result<Vec<u8>>>,
}

impl ChunkedSource {
    pub fn new<I, C>(chunks: I) -> Self
    where
        I: IntoIterator<Item = C>,
        C: Into<Vec<u8>>,
    {
        Self {
            chunks: chunks.into_iter().map(|chunk| Ok(chunk.into())).collect(),
        }
    }

    /// Cut `bytes` into `parts` pieces of near-equal length.
    pub fn split_evenly(bytes: &[u8], parts: usize) -> Self {
        let parts = parts.clamp(1, bytes.len().max(1));
        let size = bytes.len().div_ceil(parts).max(1);
        Self::new(bytes.chunks(size).map(<[u8]>::to_vec))
    }

    /// Fail with `error` after the chunks queued so far.
    pub fn then_fail(mut self, error: Error) -> Self {
        self.chunks.push_back(Err(error));
        self
    }
}

#[async_trait]
impl AsyncByteSource for ChunkedSource {
    async fn next_chunk(&mut self) -> Option<Result<Vec<u8>>> {
        self.chunks.pop_front()
    }
}

/// Item passed to `on_chunk`
#[derive(Debug, Clone, PartialEq)]
pub enum StreamChunk {
    Text(String),
    FunctionCall(FunctionCall),
}

type ChunkFn = Box<dyn FnMut(StreamChunk) + Send>;
type CompleteFn = Box<dyn FnOnce(Outcome) + Send>;
type ErrorFn = Box<dyn FnOnce(Error) + Send>;

/// Callbacks for one streamed call.
///
/// `on_complete` and `on_error` are consumed by the first terminal event, so
/// at most one of them runs, at most once.
pub struct StreamCallbacks {
    on_chunk: ChunkFn,
    on_complete: Option<CompleteFn>,
    on_error: Option<ErrorFn>,
}

impl Default for StreamCallbacks {
    fn default() -> Self {
        Self {
            on_chunk: Box::new(|_| {}),
            on_complete: None,
            on_error: None,
        }
    }
}

impl std::fmt::Debug for StreamCallbacks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamCallbacks")
            .field("on_complete", &self.on_complete.is_some())
            .field("on_error", &self.on_error.is_some())
            .finish()
    }
}

impl StreamCallbacks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_chunk<F>(mut self, callback: F) -> Self
    where
        F: FnMut(StreamChunk) + Send + 'static,
    {
        self.on_chunk = Box::new(callback);
        self
    }

    pub fn on_complete<F>(mut self, callback: F) -> Self
    where
        F: FnOnce(Outcome) + Send + 'static,
    {
        self.on_complete = Some(Box::new(callback));
        self
    }

    pub fn on_error<F>(mut self, callback: F) -> Self
    where
        F: FnOnce(Error) + Send + 'static,
    {
        self.on_error = Some(Box::new(callback));
        self
    }

    fn chunk(&mut self, chunk: StreamChunk) {
        (self.on_chunk)(chunk);
    }

    /// Deliver the terminal result. Later calls are no-ops.
    pub(crate) fn finish(&mut self, result: Result<Outcome>) {
        let on_complete = self.on_complete.take();
        let on_error = self.on_error.take();
        match result {
            Ok(outcome) => {
                if let Some(callback) = on_complete {
                    callback(outcome);
                }
            }
            Err(err) => {
                if let Some(callback) = on_error {
                    callback(err);
                }
            }
        }
    }
}

/// Incremental UTF-8 decoding across chunk boundaries.
///
/// Invalid sequences become U+FFFD; a sequence cut off at the end of a chunk
/// waits for the next one.
#[derive(Debug, Default)]
pub struct Utf8Decoder {
    pending: Vec<u8>,
}

impl Utf8Decoder {
    pub fn decode(&mut self, chunk: &[u8]) -> String {
        self.pending.extend_from_slice(chunk);
        let mut out = String::new();

        loop {
            let error = std::str::from_utf8(&self.pending).err();
            let valid = error.map_or(self.pending.len(), |err| err.valid_up_to());
            out.push_str(&String::from_utf8_lossy(&self.pending[..valid]));

            match error.and_then(|err| err.error_len()) {
                Some(invalid) => {
                    out.push(char::REPLACEMENT_CHARACTER);
                    self.pending.drain(..valid + invalid);
                }
                None => {
                    self.pending.drain(..valid);
                    return out;
                }
            }
        }
    }

    /// Flush whatever is left at end of stream.
    pub fn finish(&mut self) -> String {
        let rest = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending.clear();
        rest
    }
}

/// Output of [`JsonFragmentSplitter`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fragment {
    /// One complete top-level `{ ... }` object
    Object(String),
    /// Text outside any object that is not array punctuation or whitespace
    Stray(String),
}

/// Splits a stream of whole JSON objects into one string per object.
#[derive(Debug, Default)]
pub struct JsonFragmentSplitter {
    buffer: String,
    stray: String,
    depth: usize,
    in_string: bool,
    escaped: bool,
}

impl JsonFragmentSplitter {
    pub fn push(&mut self, text: &str) -> Vec<Fragment> {
        let mut fragments = Vec::new();

        for ch in text.chars() {
            if self.depth == 0 {
                match ch {
                    '{' => {
                        self.flush_stray(&mut fragments);
                        self.depth = 1;
                        self.buffer.push(ch);
                    }
                    '[' | ']' | ',' => self.flush_stray(&mut fragments),
                    c if c.is_whitespace() => self.flush_stray(&mut fragments),
                    c => self.stray.push(c),
                }
                continue;
            }

            self.buffer.push(ch);

            if self.in_string {
                if self.escaped {
                    self.escaped = false;
                } else if ch == '\\' {
                    self.escaped = true;
                } else if ch == '"' {
                    self.in_string = false;
                }
                continue;
            }

            match ch {
                '"' => self.in_string = true,
                '{' => self.depth += 1,
                '}' => {
                    self.depth -= 1;
                    if self.depth == 0 {
                        fragments.push(Fragment::Object(std::mem::take(&mut self.buffer)));
                    }
                }
                _ => {}
            }
        }

        fragments
    }

    /// Anything left over at end of stream: an unterminated object or stray text.
    pub fn finish(&mut self) -> Option<Fragment> {
        let mut rest = std::mem::take(&mut self.stray);
        rest.push_str(&std::mem::take(&mut self.buffer));
        self.depth = 0;
        self.in_string = false;
        self.escaped = false;

        if rest.trim().is_empty() {
            None
        } else {
            Some(Fragment::Stray(rest))
        }
    }

    fn flush_stray(&mut self, fragments: &mut Vec<Fragment>) {
        if !self.stray.is_empty() {
            fragments.push(Fragment::Stray(std::mem::take(&mut self.stray)));
        }
    }
}

enum Flow {
    Continue,
    Stop(Result<Outcome>),
}

/// Folds parsed fragments into the final outcome.
struct Reducer<'a> {
    accumulated: String,
    expects_json: bool,
    sink: &'a dyn DiagnosticSink,
    on_chunk: &'a mut (dyn FnMut(StreamChunk) + Send),
}

impl Reducer<'_> {
    fn fragment(&mut self, raw: &str) -> Flow {
        let response: GenerateContentResponse = match serde_json::from_str(raw) {
            Ok(response) => response,
            Err(err) => {
                self.warn_skipped(raw, &err.to_string());
                return Flow::Continue;
            }
        };

        if let Some(reason) = response.block_reason() {
            let detail = response
                .prompt_feedback
                .as_ref()
                .map(|feedback| feedback.ratings_detail())
                .unwrap_or_default();
            return Flow::Stop(Err(Error::blocked(reason, detail)));
        }

        if let Some(usage) = response.usage_metadata {
            self.sink.debug(
                TARGET,
                &format!(
                    "Usage: prompt={} candidates={} total={}",
                    usage.prompt_token_count, usage.candidates_token_count, usage.total_token_count
                ),
            );
        }

        for part in response.first_parts() {
            if let Some(text) = &part.text {
                self.accumulated.push_str(text);
                (self.on_chunk)(StreamChunk::Text(text.clone()));
            }
            if let Some(call) = &part.function_call {
                (self.on_chunk)(StreamChunk::FunctionCall(call.clone()));
                return Flow::Stop(Ok(Outcome::FunctionCallRequested {
                    name: call.name.clone(),
                    args: call.args.clone(),
                }));
            }
        }

        Flow::Continue
    }

    fn warn_skipped(&self, raw: &str, reason: &str) {
        let preview: String = raw.chars().take(80).collect();
        self.sink.warn(
            TARGET,
            &format!("StreamDecodeWarning: skipped fragment ({reason}): {preview}"),
        );
    }

    fn end(self) -> Result<Outcome> {
        if self.accumulated.is_empty() {
            Ok(Outcome::Empty)
        } else if self.expects_json {
            parse_structured(&self.accumulated)
        } else {
            Ok(Outcome::PlainText(self.accumulated))
        }
    }
}

/// Decode `source` and report through `callbacks`.
///
/// Returns once a terminal callback has run (or would have, if unset).
/// Dropping the future stops reading; no callback runs afterwards.
pub async fn decode_stream(
    source: &mut dyn AsyncByteSource,
    framing: StreamFraming,
    expects_json: bool,
    mut callbacks: StreamCallbacks,
    sink: &dyn DiagnosticSink,
) {
    let result = {
        let mut forward = |chunk: StreamChunk| callbacks.chunk(chunk);
        reduce_stream(source, framing, expects_json, &mut forward, sink).await
    };
    if let Err(err) = &result {
        sink.warn(TARGET, &format!("Stream ended with error: {err}"));
    }
    callbacks.finish(result);
}

/// Decode `source` to its final outcome, forwarding partial items to `on_chunk`.
pub async fn reduce_stream(
    source: &mut dyn AsyncByteSource,
    framing: StreamFraming,
    expects_json: bool,
    on_chunk: &mut (dyn FnMut(StreamChunk) + Send),
    sink: &dyn DiagnosticSink,
) -> Result<Outcome> {
    let mut reducer = Reducer {
        accumulated: String::new(),
        expects_json,
        sink,
        on_chunk,
    };

    let stopped = match framing {
        StreamFraming::JsonArray => reduce_json_array(source, &mut reducer).await?,
        StreamFraming::ServerSentEvents => reduce_sse(source, &mut reducer).await?,
    };

    match stopped {
        Some(result) => result,
        None => reducer.end(),
    }
}

/// `Ok(Some(result))` when a fragment ended the stream early, `Ok(None)` at natural end.
async fn reduce_json_array(
    source: &mut dyn AsyncByteSource,
    reducer: &mut Reducer<'_>,
) -> Result<Option<Result<Outcome>>> {
    let mut decoder = Utf8Decoder::default();
    let mut splitter = JsonFragmentSplitter::default();

    while let Some(chunk) = source.next_chunk().await {
        let text = decoder.decode(&chunk?);
        for fragment in splitter.push(&text) {
            if let Some(stopped) = apply(reducer, fragment) {
                return Ok(Some(stopped));
            }
        }
    }

    let tail = decoder.finish();
    let mut leftovers = splitter.push(&tail);
    leftovers.extend(splitter.finish());
    for fragment in leftovers {
        if let Some(stopped) = apply(reducer, fragment) {
            return Ok(Some(stopped));
        }
    }

    Ok(None)
}

fn apply(reducer: &mut Reducer<'_>, fragment: Fragment) -> Option<Result<Outcome>> {
    match fragment {
        Fragment::Object(raw) => match reducer.fragment(&raw) {
            Flow::Continue => None,
            Flow::Stop(result) => Some(result),
        },
        Fragment::Stray(text) => {
            reducer.warn_skipped(&text, "not a JSON object");
            None
        }
    }
}

async fn reduce_sse(
    source: &mut dyn AsyncByteSource,
    reducer: &mut Reducer<'_>,
) -> Result<Option<Result<Outcome>>> {
    let bytes = futures::stream::unfold(source, |source| async move {
        let chunk = source.next_chunk().await?;
        Some((chunk, source))
    });
    let mut events = Box::pin(bytes.eventsource());

    while let Some(event) = events.next().await {
        match event {
            Ok(event) => {
                let data = event.data.trim();
                if data.is_empty() || data == "[DONE]" {
                    continue;
                }
                if let Flow::Stop(result) = reducer.fragment(data) {
                    return Ok(Some(result));
                }
            }
            Err(EventStreamError::Transport(err)) => return Err(err),
            Err(err) => reducer.warn_skipped("", &err.to_string()),
        }
    }

    Ok(None)
}
