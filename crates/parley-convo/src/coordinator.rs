//! The turn coordinator: drives a bounded multi-party exchange.
//!
//! A single coordinator owns the dispatcher and all participant
//! leases. Each iteration picks the next speaker round-robin, builds a
//! prompt from the turns that speaker has not yet heard, dispatches it,
//! blocks until the agent settles, captures and records the response,
//! and broadcasts it to the other participants' mailboxes. A speaker
//! whose dispatch was queued behind a human keeps the rotation until
//! the queue drains; a participant that keeps failing is dropped from
//! the rotation instead of aborting the conversation.

use std::collections::HashMap;
use std::path::PathBuf;

use chrono::Utc;
use tokio::sync::broadcast;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use parley_agents::split_response;
use parley_session::{wait_ready, Dispatcher};

use crate::context::ContextBuilder;
use crate::detect::assess;
use crate::error::{ConvoError, Result};
use crate::event::ConversationEvent;
use crate::mailbox::{MessageRouter, DEFAULT_MAILBOX_CAPACITY};
use crate::transcript::{ConversationOutcome, Transcript};
use crate::turn::{Turn, TurnLog, DEFAULT_HISTORY_LIMIT};

/// Settings for one conversation.
#[derive(Debug, Clone)]
pub struct ConversationConfig {
    /// The task the participants discuss.
    pub topic: String,
    /// Completed-turn budget.
    pub max_turns: u32,
    /// Turns retained in the log.
    pub history_limit: usize,
    /// Per-participant mailbox capacity.
    pub mailbox_capacity: usize,
    /// Consecutive hard failures before a participant is removed.
    pub failure_limit: u32,
    /// Consecutive queued attempts before a participant is removed.
    pub queued_retry_limit: u32,
    /// Where to write the transcript, if anywhere.
    pub transcript_path: Option<PathBuf>,
}

impl ConversationConfig {
    /// Create a config with default limits.
    pub fn new(topic: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            max_turns: 12,
            history_limit: DEFAULT_HISTORY_LIMIT,
            mailbox_capacity: DEFAULT_MAILBOX_CAPACITY,
            failure_limit: 3,
            queued_retry_limit: 60,
            transcript_path: None,
        }
    }

    /// Sets the completed-turn budget.
    pub fn with_max_turns(mut self, max_turns: u32) -> Self {
        self.max_turns = max_turns;
        self
    }

    /// Sets the turn-log retention limit.
    pub fn with_history_limit(mut self, limit: usize) -> Self {
        self.history_limit = limit;
        self
    }

    /// Sets the consecutive-failure removal threshold.
    pub fn with_failure_limit(mut self, limit: u32) -> Self {
        self.failure_limit = limit;
        self
    }

    /// Sets the transcript output path.
    pub fn with_transcript_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.transcript_path = Some(path.into());
        self
    }
}

/// A prompt built for a speaker but not yet turned into a completed
/// turn.
#[derive(Debug)]
struct PendingTurn {
    prompt: String,
    /// The log index the prompt's context window was built against.
    built_index: u64,
    /// Scrollback captured before the prompt was typed.
    baseline: String,
    /// The command now sits in a queue and needs draining, not
    /// re-dispatching.
    queued: bool,
}

/// Drives one conversation to a terminal outcome.
pub struct Coordinator {
    dispatcher: Dispatcher,
    config: ConversationConfig,
    rotation: Vec<String>,
    cursor: usize,
    log: TurnLog,
    router: MessageRouter,
    context: ContextBuilder,
    pending: HashMap<String, PendingTurn>,
    failures: HashMap<String, u32>,
    queued_attempts: HashMap<String, u32>,
    completed_turns: u32,
    events: broadcast::Sender<ConversationEvent>,
    transcript: Transcript,
}

impl Coordinator {
    /// Create a coordinator over participants already registered in the
    /// dispatcher.
    pub fn new(
        dispatcher: Dispatcher,
        participants: Vec<String>,
        config: ConversationConfig,
    ) -> Result<Self> {
        if participants.len() < 2 {
            return Err(ConvoError::NotEnoughParticipants(participants.len()));
        }
        for name in &participants {
            if !dispatcher.contains(name) {
                return Err(parley_session::SessionError::SessionNotFound(name.clone()).into());
            }
        }

        let mut router = MessageRouter::new(config.mailbox_capacity);
        for name in &participants {
            router.register(name.clone());
        }

        let (events, _) = broadcast::channel(32);
        let transcript = Transcript::new(&config.topic, participants.clone());
        let log = TurnLog::new(config.history_limit);

        info!(
            participants = participants.len(),
            max_turns = config.max_turns,
            topic = %config.topic,
            "conversation created"
        );

        Ok(Self {
            dispatcher,
            config,
            rotation: participants,
            cursor: 0,
            log,
            router,
            context: ContextBuilder::new(),
            pending: HashMap::new(),
            failures: HashMap::new(),
            queued_attempts: HashMap::new(),
            completed_turns: 0,
            events,
            transcript,
        })
    }

    /// Subscribe to conversation events.
    pub fn subscribe(&self) -> broadcast::Receiver<ConversationEvent> {
        self.events.subscribe()
    }

    /// The transcript accumulated so far.
    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    /// Participants still in the rotation.
    pub fn participants(&self) -> &[String] {
        &self.rotation
    }

    /// The dispatcher, for teardown after the conversation ends.
    pub fn dispatcher_mut(&mut self) -> &mut Dispatcher {
        &mut self.dispatcher
    }

    /// Run until a terminal outcome is reached.
    pub async fn run(&mut self) -> Result<ConversationOutcome> {
        loop {
            if let Some(outcome) = self.run_turn().await? {
                return Ok(outcome);
            }
        }
    }

    /// Execute one coordination step.
    ///
    /// Returns `Some` once the conversation has reached a terminal
    /// outcome. A step that leaves a speaker queued returns `None` and
    /// retries the same speaker on the next call.
    pub async fn run_turn(&mut self) -> Result<Option<ConversationOutcome>> {
        if self.rotation.len() < 2 {
            return Ok(Some(self.finish(ConversationOutcome::ParticipantRemoved)));
        }
        if self.completed_turns >= self.config.max_turns {
            return Ok(Some(self.finish(ConversationOutcome::MaxTurns)));
        }

        let speaker = self.rotation[self.cursor].clone();
        let interval = self.dispatcher.lease(&speaker)?.profile().check_interval();

        let (mut pending, retry) = match self.pending.remove(&speaker) {
            Some(p) => (p, true),
            None => (self.prepare_dispatch(&speaker)?, false),
        };
        debug!(participant = %speaker, retry, "running turn");

        let delivered = if pending.queued {
            match self.dispatcher.drain_pending(&speaker) {
                Ok(sent) => {
                    debug!(participant = %speaker, sent, "drained pending queue");
                    self.dispatcher.pending_count(&speaker) == 0
                }
                Err(e) => {
                    warn!(participant = %speaker, error = %e, "drain failed");
                    self.pending.insert(speaker.clone(), pending);
                    return self.hard_failure(&speaker, interval).await;
                }
            }
        } else {
            match self.dispatcher.dispatch(&speaker, &pending.prompt, true) {
                Ok(outcome) if outcome.dispatched => true,
                Ok(outcome) => {
                    info!(
                        participant = %speaker,
                        source = ?outcome.queue_source,
                        reason = ?outcome.reason,
                        "dispatch queued behind a human"
                    );
                    // First queueing of this prompt: the attempt itself
                    // goes into the transcript.
                    self.transcript.record(self.queued_turn(&speaker, &pending));
                    self.save_transcript();
                    pending.queued = true;
                    false
                }
                Err(e) => {
                    warn!(participant = %speaker, error = %e, "dispatch failed");
                    self.pending.insert(speaker.clone(), pending);
                    return self.hard_failure(&speaker, interval).await;
                }
            }
        };

        if !delivered {
            let _ = self.events.send(ConversationEvent::Queued {
                speaker: speaker.clone(),
            });
            self.pending.insert(speaker.clone(), pending);
            let attempts = bump(&mut self.queued_attempts, &speaker);
            if attempts >= self.config.queued_retry_limit {
                warn!(
                    participant = %speaker,
                    attempts,
                    "giving up on queued speaker, removing from rotation"
                );
                return Ok(self.remove_participant(&speaker));
            }
            sleep(interval).await;
            return Ok(None);
        }

        // Command reached the agent: block until it settles or the
        // response timeout elapses, then record whatever is visible.
        let ready = {
            let lease = self.dispatcher.lease(&speaker)?;
            wait_ready(lease).await?
        };
        if !ready.is_ready() {
            warn!(
                participant = %speaker,
                "response wait timed out, proceeding with partial output"
            );
        }

        let (prompt_echo, response) = match self.capture_response(&speaker, &pending) {
            Ok(parts) => parts,
            Err(e) => {
                warn!(participant = %speaker, error = %e, "response capture failed");
                (String::new(), String::new())
            }
        };

        let assessment = assess(&response);
        let index = self.log.next_index();
        let turn = Turn {
            index,
            speaker: speaker.clone(),
            topic: self.config.topic.clone(),
            prompt: pending.prompt.clone(),
            prompt_echo,
            response,
            queued: false,
            consensus: assessment.consensus,
            conflict: assessment.conflict,
            conflict_reason: assessment.reason,
            timestamp: Utc::now(),
        };

        // A turn that waited in a queue completed later than the window
        // its prompt was built from; the turns in between are still
        // unheard and must stay eligible for the next prompt.
        let heard = if index == pending.built_index {
            index
        } else {
            pending.built_index.saturating_sub(1)
        };
        self.context.mark_heard(&speaker, heard);
        self.router.deliver(&speaker, index, &turn.response);

        self.failures.remove(&speaker);
        self.queued_attempts.remove(&speaker);
        self.completed_turns += 1;
        self.log.append(turn.clone());
        self.transcript.record(turn.clone());
        self.save_transcript();
        self.advance();

        info!(
            participant = %speaker,
            index,
            consensus = turn.consensus,
            conflict = turn.conflict,
            "turn recorded"
        );

        if turn.consensus {
            let _ = self.events.send(ConversationEvent::Consensus { turn });
            return Ok(Some(self.finish(ConversationOutcome::Consensus)));
        }
        if turn.conflict {
            let reason = turn.conflict_reason.clone().unwrap_or_default();
            let _ = self.events.send(ConversationEvent::Conflict { turn, reason });
            return Ok(Some(self.finish(ConversationOutcome::Conflict)));
        }
        if self.completed_turns >= self.config.max_turns {
            return Ok(Some(self.finish(ConversationOutcome::MaxTurns)));
        }
        Ok(None)
    }

    /// Build the speaker's prompt and take a scrollback baseline.
    fn prepare_dispatch(&mut self, speaker: &str) -> Result<PendingTurn> {
        let built_index = self.log.next_index();
        let additions = self.router.prepare_additions(speaker);
        let prompt = self.context.build(
            speaker,
            &self.config.topic,
            &self.log,
            &additions,
            built_index,
        );

        let baseline = match self.dispatcher.lease(speaker)?.capture_scrollback() {
            Ok(baseline) => baseline,
            Err(e) => {
                warn!(participant = %speaker, error = %e, "baseline capture failed");
                String::new()
            }
        };

        Ok(PendingTurn {
            prompt,
            built_index,
            baseline,
            queued: false,
        })
    }

    /// Capture everything the session printed since the baseline and
    /// split it into echo and response body.
    fn capture_response(&self, speaker: &str, pending: &PendingTurn) -> Result<(String, String)> {
        let lease = self.dispatcher.lease(speaker)?;
        let current = lease.capture_scrollback()?;
        let fresh = new_output(&pending.baseline, &current);
        let split = split_response(&fresh, &pending.prompt, lease.profile());
        Ok((split.prompt_echo, split.body))
    }

    fn queued_turn(&self, speaker: &str, pending: &PendingTurn) -> Turn {
        Turn {
            index: self.log.next_index(),
            speaker: speaker.to_string(),
            topic: self.config.topic.clone(),
            prompt: pending.prompt.clone(),
            prompt_echo: String::new(),
            response: String::new(),
            queued: true,
            consensus: false,
            conflict: false,
            conflict_reason: None,
            timestamp: Utc::now(),
        }
    }

    async fn hard_failure(
        &mut self,
        speaker: &str,
        interval: std::time::Duration,
    ) -> Result<Option<ConversationOutcome>> {
        let count = bump(&mut self.failures, speaker);
        if count >= self.config.failure_limit {
            warn!(
                participant = %speaker,
                failures = count,
                "removing participant after repeated failures"
            );
            return Ok(self.remove_participant(speaker));
        }
        sleep(interval).await;
        Ok(None)
    }

    /// Drop a participant from the rotation, ending the conversation if
    /// fewer than two remain.
    fn remove_participant(&mut self, speaker: &str) -> Option<ConversationOutcome> {
        if let Some(pos) = self.rotation.iter().position(|p| p == speaker) {
            self.rotation.remove(pos);
            if pos < self.cursor {
                self.cursor -= 1;
            }
            if self.cursor >= self.rotation.len() && !self.rotation.is_empty() {
                self.cursor = 0;
            }
        }
        self.router.unregister(speaker);
        self.context.forget(speaker);
        self.pending.remove(speaker);
        self.failures.remove(speaker);
        self.queued_attempts.remove(speaker);
        let _ = self.events.send(ConversationEvent::ParticipantRemoved {
            speaker: speaker.to_string(),
        });

        if self.rotation.len() < 2 {
            Some(self.finish(ConversationOutcome::ParticipantRemoved))
        } else {
            None
        }
    }

    fn advance(&mut self) {
        if !self.rotation.is_empty() {
            self.cursor = (self.cursor + 1) % self.rotation.len();
        }
    }

    fn finish(&mut self, outcome: ConversationOutcome) -> ConversationOutcome {
        info!(?outcome, turns = self.completed_turns, "conversation finished");
        self.transcript.finish(outcome);
        self.save_transcript();
        outcome
    }

    fn save_transcript(&self) {
        if let Some(path) = &self.config.transcript_path {
            if let Err(e) = self.transcript.save(path) {
                warn!(path = %path.display(), error = %e, "transcript write failed");
            }
        }
    }
}

fn bump(counters: &mut HashMap<String, u32>, name: &str) -> u32 {
    let count = counters.entry(name.to_string()).or_insert(0);
    *count += 1;
    *count
}

/// Everything `current` contains beyond `baseline`.
///
/// Scrollback normally only grows, so a plain prefix strip suffices;
/// when the start of the buffer has scrolled away (or a human typed
/// into the session) the longest common line prefix decides instead.
fn new_output(baseline: &str, current: &str) -> String {
    if let Some(rest) = current.strip_prefix(baseline) {
        return rest.to_string();
    }
    let base: Vec<&str> = baseline.lines().collect();
    let cur: Vec<&str> = current.lines().collect();
    let common = base
        .iter()
        .zip(cur.iter())
        .take_while(|(a, b)| a == b)
        .count();
    cur[common..].join("\n")
}
