use std::pin::Pin;
use std::sync::{Arc, Mutex, PoisonError};
use std::task::{Context, Poll};

use futures::Stream;
use weft_llm::ChatStream;
use weft_memory::{BoxFuture, ConversationHistory, ConversationStore, ConversationTurn, StoreError};

/// One item of a streamed reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fragment {
    Text(String),
    /// Terminal: generation (or saving the exchange) failed. No items follow.
    Error(String),
}

/// Commits a finished exchange to the in-memory history and, if configured, the store.
#[derive(Clone)]
pub(crate) struct ExchangeRecorder {
    pub(crate) assistant: String,
    pub(crate) history: Arc<Mutex<ConversationHistory>>,
    pub(crate) store: Option<Arc<dyn ConversationStore>>,
    pub(crate) user: ConversationTurn,
}

impl ExchangeRecorder {
    /// Persist the exchange, if a store is configured. Nothing is committed in memory.
    pub(crate) fn save(&self, reply: &ConversationTurn) -> Option<BoxFuture<'static, Result<(), StoreError>>> {
        let store = self.store.clone()?;
        let assistant = self.assistant.clone();
        let turns = [self.user.clone(), reply.clone()];
        Some(Box::pin(async move { store.append_turns(&assistant, &turns).await }))
    }

    pub(crate) fn commit(self, reply: ConversationTurn) {
        self.history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .commit_exchange(self.user, reply);
    }
}

enum State {
    Streaming,
    Saving {
        save: BoxFuture<'static, Result<(), StoreError>>,
        reply: ConversationTurn,
        error: Option<String>,
    },
    Done,
}

/// Streamed assistant reply.
///
/// The exchange is recorded once the model stream ends or fails. Dropping the stream before
/// that records nothing and drops the model stream, closing its connection.
pub struct ReplyStream {
    inner: Option<ChatStream>,
    recorder: Option<ExchangeRecorder>,
    buffer: String,
    state: State,
    pending_error: Option<String>,
}

impl std::fmt::Debug for ReplyStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReplyStream")
            .field("received", &self.buffer.len())
            .field("finished", &self.is_finished())
            .finish_non_exhaustive()
    }
}

impl ReplyStream {
    pub(crate) fn new(inner: ChatStream, recorder: ExchangeRecorder) -> Self {
        Self {
            inner: Some(inner),
            recorder: Some(recorder),
            buffer: String::new(),
            state: State::Streaming,
            pending_error: None,
        }
    }

    /// Whether the exchange has been recorded and the stream is exhausted.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        matches!(self.state, State::Done) && self.pending_error.is_none()
    }

    /// Text received so far.
    #[must_use]
    pub fn text(&self) -> &str {
        &self.buffer
    }

    fn finish(&mut self, reply: ConversationTurn, error: Option<String>) {
        self.inner = None;
        let Some(recorder) = self.recorder.take() else {
            self.state = State::Done;
            self.pending_error = error;
            return;
        };
        match recorder.save(&reply) {
            Some(save) => {
                self.recorder = Some(recorder);
                self.state = State::Saving { save, reply, error };
            }
            None => {
                recorder.commit(reply);
                self.state = State::Done;
                self.pending_error = error;
            }
        }
    }
}

impl Stream for ReplyStream {
    type Item = Fragment;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Fragment>> {
        let this = self.get_mut();
        loop {
            match &mut this.state {
                State::Streaming => {
                    let Some(inner) = this.inner.as_mut() else {
                        this.state = State::Done;
                        continue;
                    };
                    match inner.as_mut().poll_next(cx) {
                        Poll::Ready(Some(Ok(text))) => {
                            this.buffer.push_str(&text);
                            return Poll::Ready(Some(Fragment::Text(text)));
                        }
                        Poll::Ready(Some(Err(e))) => {
                            let message = e.to_string();
                            tracing::error!("model stream failed: {message}");
                            let reply = ConversationTurn::assistant(format!(
                                "{}[error: {message}]",
                                this.buffer
                            ))
                            .failed();
                            this.finish(reply, Some(message));
                        }
                        Poll::Ready(None) => {
                            let reply = ConversationTurn::assistant(this.buffer.clone());
                            this.finish(reply, None);
                        }
                        Poll::Pending => return Poll::Pending,
                    }
                }
                State::Saving { save, .. } => {
                    let saved = match save.as_mut().poll(cx) {
                        Poll::Ready(saved) => saved,
                        Poll::Pending => return Poll::Pending,
                    };
                    let State::Saving { reply, error, .. } =
                        std::mem::replace(&mut this.state, State::Done)
                    else {
                        continue;
                    };
                    match saved {
                        Ok(()) => {
                            if let Some(recorder) = this.recorder.take() {
                                recorder.commit(reply);
                            }
                            this.pending_error = error;
                        }
                        Err(e) => {
                            tracing::error!("failed to save conversation: {e}");
                            this.recorder = None;
                            this.pending_error =
                                Some(error.unwrap_or_else(|| format!("conversation not saved: {e}")));
                        }
                    }
                }
                State::Done => {
                    return Poll::Ready(this.pending_error.take().map(Fragment::Error));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use futures::StreamExt;
    use weft_llm::LlmError;
    use weft_memory::{InMemoryStore, TurnStatus};

    use super::*;

    fn recorder(store: Option<Arc<dyn ConversationStore>>) -> ExchangeRecorder {
        ExchangeRecorder {
            assistant: "helper".into(),
            history: Arc::new(Mutex::new(ConversationHistory::new())),
            store,
            user: ConversationTurn::user("hi"),
        }
    }

    fn chat_stream(items: Vec<Result<String, LlmError>>) -> ChatStream {
        Box::pin(futures::stream::iter(items))
    }

    #[tokio::test]
    async fn fragments_are_recorded_as_one_turn() {
        let rec = recorder(None);
        let history = rec.history.clone();
        let stream = ReplyStream::new(
            chat_stream(vec![Ok("Hel".into()), Ok("lo".into())]),
            rec,
        );
        let fragments: Vec<Fragment> = stream.collect().await;
        assert_eq!(
            fragments,
            vec![Fragment::Text("Hel".into()), Fragment::Text("lo".into())]
        );
        let history = history.lock().unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history.turns()[1].content, "Hello");
        assert_eq!(history.turns()[1].status, TurnStatus::Complete);
    }

    #[tokio::test]
    async fn failure_ends_with_error_fragment_and_partial_turn() {
        let rec = recorder(None);
        let history = rec.history.clone();
        let mut stream = ReplyStream::new(
            chat_stream(vec![Ok("Par".into()), Err(LlmError::Other("boom".into()))]),
            rec,
        );
        assert_eq!(stream.next().await, Some(Fragment::Text("Par".into())));
        assert_eq!(stream.next().await, Some(Fragment::Error("boom".into())));
        assert_eq!(stream.next().await, None);
        assert!(stream.is_finished());

        let history = history.lock().unwrap();
        assert_eq!(history.turns()[1].content, "Par[error: boom]");
        assert_eq!(history.turns()[1].status, TurnStatus::Error);
    }

    #[tokio::test]
    async fn dropping_early_records_nothing() {
        let rec = recorder(None);
        let history = rec.history.clone();
        let mut stream = ReplyStream::new(
            chat_stream(vec![Ok("a".into()), Ok("b".into())]),
            rec,
        );
        assert_eq!(stream.next().await, Some(Fragment::Text("a".into())));
        drop(stream);
        assert!(history.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn finished_exchange_is_persisted_before_the_stream_ends() {
        let store = Arc::new(InMemoryStore::new());
        let rec = recorder(Some(store.clone()));
        let stream = ReplyStream::new(chat_stream(vec![Ok("ok".into())]), rec);
        let _: Vec<Fragment> = stream.collect().await;

        let turns = store.load_turns("helper").await.unwrap();
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[0].content, "hi");
        assert_eq!(turns[1].content, "ok");
    }
}
