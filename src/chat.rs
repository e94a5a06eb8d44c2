//! Conversation engine: multi-turn question answering over retrieval.
//!
//! A [`Conversation`] is a per-session transcript handle — there is no
//! process-global state; callers create one per chat session and pass
//! it into every [`ChatEngine::ask`]. The engine is a two-state machine
//! (`Idle` / `AwaitingAnswer`): a second `ask` while one is in flight is
//! rejected, and any failure or cancellation between the phase flip and
//! the final append restores `Idle` without a partial turn, via a drop
//! guard. Retrieval and generation run without holding the transcript
//! lock; only the phase flip and the append take it.

use std::collections::BTreeSet;
use std::sync::Mutex;

use tracing::{info, warn};
use uuid::Uuid;

use crate::error::QueryError;
use crate::generate::{AnswerGenerator, GenerationRequest};
use crate::models::{Answer, ConversationTurn, ScoredRecord};
use crate::retrieve::Retriever;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    AwaitingAnswer,
}

struct ConvInner {
    turns: Vec<ConversationTurn>,
    phase: Phase,
}

/// One chat session's transcript and in-flight state.
pub struct Conversation {
    id: Uuid,
    inner: Mutex<ConvInner>,
}

impl Conversation {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            inner: Mutex::new(ConvInner {
                turns: Vec::new(),
                phase: Phase::Idle,
            }),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Snapshot of the transcript, oldest turn first.
    pub fn turns(&self) -> Vec<ConversationTurn> {
        self.lock().turns.clone()
    }

    pub fn is_idle(&self) -> bool {
        self.lock().phase == Phase::Idle
    }

    /// Clear the transcript. The only way turns are ever removed.
    pub fn reset(&self) {
        let mut inner = self.lock();
        inner.turns.clear();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ConvInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Move `Idle → AwaitingAnswer`, returning a transcript snapshot and
    /// a guard that restores `Idle` unless the turn commits.
    fn begin_turn(&self) -> Result<(TurnGuard<'_>, Vec<ConversationTurn>), QueryError> {
        let mut inner = self.lock();
        if inner.phase == Phase::AwaitingAnswer {
            return Err(QueryError::Busy);
        }
        inner.phase = Phase::AwaitingAnswer;
        let snapshot = inner.turns.clone();
        Ok((TurnGuard { conversation: self }, snapshot))
    }
}

impl Default for Conversation {
    fn default() -> Self {
        Self::new()
    }
}

/// Restores `Idle` on drop; defused by [`TurnGuard::commit`].
///
/// This is what keeps a failed or cancelled `ask` from stranding the
/// conversation in `AwaitingAnswer` or appending a partial turn.
struct TurnGuard<'a> {
    conversation: &'a Conversation,
}

impl TurnGuard<'_> {
    fn commit(self, turn: ConversationTurn) {
        {
            let mut inner = self.conversation.lock();
            inner.turns.push(turn);
            inner.phase = Phase::Idle;
        }
        std::mem::forget(self);
    }
}

impl Drop for TurnGuard<'_> {
    fn drop(&mut self) {
        let mut inner = self.conversation.lock();
        inner.phase = Phase::Idle;
    }
}

/// Retrieval plus generation behind one entry point.
pub struct ChatEngine<'a> {
    pub retriever: Retriever<'a>,
    pub generator: &'a dyn AnswerGenerator,
    /// Character budget for chunk context plus transcript.
    pub max_context_chars: usize,
}

impl ChatEngine<'_> {
    /// Answer `question` against `scope`, appending the turn to
    /// `conversation` on success.
    ///
    /// Returns [`QueryError::Busy`] if a question is already in flight
    /// on this conversation. On any error the conversation is back in
    /// `Idle` with the transcript unchanged.
    pub async fn ask(
        &self,
        conversation: &Conversation,
        question: &str,
        scope: &BTreeSet<String>,
    ) -> Result<Answer, QueryError> {
        let (guard, prior_turns) = conversation.begin_turn()?;

        let retrieval = self.retriever.retrieve(question, scope).await?;
        if retrieval.unresolved_scope > 0 {
            warn!(
                unresolved = retrieval.unresolved_scope,
                "scope names did not resolve to ingested documents"
            );
        }

        let context = build_context(&retrieval.chunks);
        let cited_sources = cited_sources(&retrieval.chunks);
        let history = trim_history(
            prior_turns,
            context.chars().count() + question.chars().count(),
            self.max_context_chars,
        );

        let answer_text = self
            .generator
            .generate(GenerationRequest {
                question,
                context: &context,
                history: &history,
            })
            .await?;

        let turn = ConversationTurn {
            question: question.to_string(),
            answer: answer_text.clone(),
            source_documents: cited_sources.clone(),
        };
        guard.commit(turn);

        info!(
            conversation = %conversation.id(),
            cited = cited_sources.len(),
            "answered question"
        );

        Ok(Answer {
            answer: answer_text,
            cited_sources,
            unresolved_scope: retrieval.unresolved_scope,
        })
    }
}

/// Concatenate retrieved chunk content, each excerpt tagged with its
/// source filename and the pages it covers.
fn build_context(chunks: &[ScoredRecord]) -> String {
    let mut context = String::new();
    for scored in chunks {
        let meta = &scored.record.metadata;
        let pages: Vec<String> = meta.page_indices.iter().map(u32::to_string).collect();
        context.push_str(&format!(
            "[{} pages {}]\n{}\n\n",
            meta.source,
            pages.join(","),
            scored.record.content
        ));
    }
    context
}

/// Cited filenames, deduplicated preserving first-seen order.
fn cited_sources(chunks: &[ScoredRecord]) -> Vec<String> {
    let mut seen = BTreeSet::new();
    let mut sources = Vec::new();
    for scored in chunks {
        let source = &scored.record.metadata.source;
        if seen.insert(source.clone()) {
            sources.push(source.clone());
        }
    }
    sources
}

/// Evict oldest turns until the context fits the budget.
///
/// Chunks (already counted in `reserved_chars`) are never evicted; when
/// they alone exceed the budget the whole transcript is dropped but the
/// chunks still go to the generator.
fn trim_history(
    mut turns: Vec<ConversationTurn>,
    reserved_chars: usize,
    max_context_chars: usize,
) -> Vec<ConversationTurn> {
    let turn_chars =
        |t: &ConversationTurn| t.question.chars().count() + t.answer.chars().count();

    let mut total: usize = reserved_chars + turns.iter().map(turn_chars).sum::<usize>();
    let mut evict = 0usize;
    while evict < turns.len() && total > max_context_chars {
        total -= turn_chars(&turns[evict]);
        evict += 1;
    }
    turns.drain(..evict);
    turns
}
