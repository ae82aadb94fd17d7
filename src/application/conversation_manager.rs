//! Conversation manager - the single turn-processing entry point.
//!
//! Wires intent classification, context extraction, mood accumulation,
//! clarity scoring, the dialogue FSM and the question bank into
//! [`ConversationManager::process_turn`], plus the session lifecycle
//! operations.
//!
//! # Turn pipeline
//!
//! 1. Validate the request (nothing is created on a validation failure)
//! 2. Claim the idempotency key, replaying a completed result if one exists
//! 3. Lock the session, resolving unknown, expired or used-up sessions to a
//!    fresh one
//! 4. Classify, extract, detect, accumulate and score
//! 5. Advance the FSM and compose the reply
//! 6. Persist the turn, the session and the replay record in one atomic
//!    write, then count question use

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::AppConfig;
use crate::domain::conversation::{
    ConversationSession, ConversationTurn, EmotionalSignals, EndReason, IdempotencyKey,
    IdempotencyRecord, InputType, RecommendationRequest, Reservation, ResponseType,
    SessionContext, Song,
};
use crate::domain::dialogue::{
    ContextSignalExtractor, ContextSignals, DialogueFsm, DialogueState, GuardContext, Intent,
    IntentClassification, IntentClassifier, Transition,
};
use crate::domain::emotion::{EmotionClarityModel, EmotionDepthTracker};
use crate::domain::foundation::{QuestionId, SessionId, Timestamp, UserId, ValidationError};
use crate::domain::probing::{
    ClarificationStrategy, ClarificationStrategyEngine, ProbeQuestionBank, QuestionStatDelta,
};
use crate::ports::{MoodDetection, MoodDetector, Recommender, SessionStore};

use super::errors::ConversationError;
use super::requests::{
    SessionStart, SessionStatus, TurnRequest, TurnResponse, LOCALE_KEY, REQUEST_ID_KEY,
};
use super::responses;
use super::session_locks::SessionLocks;

/// Delay between polls while a duplicate request waits for the original.
const DUPLICATE_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Intensity recorded for a concluded session with no mood observations.
const DEFAULT_FINAL_INTENSITY: f64 = 0.5;

/// Runtime knobs not owned by a domain engine.
#[derive(Debug, Clone, PartialEq)]
pub struct ManagerSettings {
    pub max_turns: u32,
    pub inactivity_timeout_secs: u64,
    pub idempotency_ttl_secs: u64,
    pub idempotency_lease_secs: u64,
    pub duplicate_wait: Duration,
    pub collaborator_timeout: Duration,
    pub max_context_probes: u32,
    pub default_locale: String,
    pub max_message_length: usize,
}

impl ManagerSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            max_turns: config.session.max_turns,
            inactivity_timeout_secs: config.session.inactivity_timeout_secs,
            idempotency_ttl_secs: config.session.idempotency_ttl_secs,
            idempotency_lease_secs: config.session.idempotency_lease_secs,
            duplicate_wait: config.session.duplicate_wait(),
            collaborator_timeout: config.collaborators.timeout(),
            max_context_probes: config.dialogue.max_context_probes,
            default_locale: config.dialogue.default_locale.clone(),
            max_message_length: config.dialogue.max_message_length,
        }
    }
}

impl Default for ManagerSettings {
    fn default() -> Self {
        Self::from_config(&AppConfig::default())
    }
}

/// A request that passed validation.
#[derive(Debug, Clone)]
struct ValidatedTurn {
    message: String,
    session_id: Option<SessionId>,
    user_id: Option<UserId>,
    input_type: InputType,
    client_info: BTreeMap<String, String>,
    idempotency_key: Option<IdempotencyKey>,
}

/// Reply text plus what it was.
struct Reply {
    text: String,
    response_type: ResponseType,
    question: Option<QuestionId>,
    recommendations: Vec<Song>,
    degraded: bool,
}

impl Reply {
    fn plain(text: String, response_type: ResponseType) -> Self {
        Self {
            text,
            response_type,
            question: None,
            recommendations: Vec::new(),
            degraded: false,
        }
    }
}

pub struct ConversationManager {
    store: Arc<dyn SessionStore>,
    detector: Arc<dyn MoodDetector>,
    recommender: Arc<dyn Recommender>,
    bank: Arc<ProbeQuestionBank>,
    locks: Arc<SessionLocks>,
    classifier: IntentClassifier,
    extractor: ContextSignalExtractor,
    tracker: EmotionDepthTracker,
    clarity: EmotionClarityModel,
    strategies: ClarificationStrategyEngine,
    fsm: DialogueFsm,
    settings: ManagerSettings,
}

impl ConversationManager {
    /// Creates a manager with default tuning.
    pub fn new(
        store: Arc<dyn SessionStore>,
        detector: Arc<dyn MoodDetector>,
        recommender: Arc<dyn Recommender>,
        bank: Arc<ProbeQuestionBank>,
    ) -> Self {
        Self::from_config(&AppConfig::default(), store, detector, recommender, bank)
    }

    /// Creates a manager tuned by `config`.
    pub fn from_config(
        config: &AppConfig,
        store: Arc<dyn SessionStore>,
        detector: Arc<dyn MoodDetector>,
        recommender: Arc<dyn Recommender>,
        bank: Arc<ProbeQuestionBank>,
    ) -> Self {
        let dialogue = &config.dialogue;
        Self {
            store,
            detector,
            recommender,
            bank,
            locks: Arc::new(SessionLocks::new()),
            classifier: IntentClassifier::new(),
            extractor: ContextSignalExtractor::new(),
            tracker: EmotionDepthTracker::new(dialogue.tracker_config()),
            clarity: EmotionClarityModel::new(dialogue.clarity_config()),
            strategies: ClarificationStrategyEngine::new(dialogue.strategy_config()),
            fsm: DialogueFsm::new(dialogue.fsm_config()),
            settings: ManagerSettings::from_config(config),
        }
    }

    /// Lock registry shared with the expiry sweeper.
    pub fn locks(&self) -> Arc<SessionLocks> {
        Arc::clone(&self.locks)
    }

    pub fn question_bank(&self) -> &ProbeQuestionBank {
        &self.bank
    }

    pub fn settings(&self) -> &ManagerSettings {
        &self.settings
    }

    /// Seeds the question bank's counters from the store.
    ///
    /// Returns how many catalog questions had stored counters.
    pub async fn load_question_stats(&self) -> Result<usize, ConversationError> {
        let stats = self.store.load_question_stats().await?;
        let restored = self.bank.restore(&stats);
        tracing::info!(restored, stored = stats.len(), "question counters loaded");
        Ok(restored)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Turn processing
    // ─────────────────────────────────────────────────────────────────────────

    /// Processes one user message.
    ///
    /// # Errors
    ///
    /// - `Validation` for a malformed request; nothing is created
    /// - `TurnConflict` if another turn for the session was stored first
    /// - `RequestInFlight` if the same key is still being processed elsewhere
    /// - `Store` if persistence fails
    ///
    /// Collaborator failures never surface here; they degrade the reply.
    pub async fn process_turn(
        &self,
        request: TurnRequest,
    ) -> Result<TurnResponse, ConversationError> {
        let input = self.validate(request)?;
        let Some(key) = input.idempotency_key.clone() else {
            return self.execute(&input, None).await;
        };

        let deadline = Instant::now() + self.settings.duplicate_wait;
        loop {
            let reservation = self
                .store
                .reserve_idempotency(&key, Timestamp::now(), self.settings.idempotency_lease_secs)
                .await?;
            match reservation {
                Reservation::Completed(record) => return self.replay(&record),
                Reservation::Reserved => return self.execute_reserved(&key, &input).await,
                Reservation::Pending => {
                    if Instant::now() >= deadline {
                        tracing::warn!(key = %key, "duplicate request still in flight");
                        return Err(ConversationError::RequestInFlight(key));
                    }
                    tracing::debug!(key = %key, "waiting for in-flight duplicate");
                    tokio::time::sleep(DUPLICATE_POLL_INTERVAL).await;
                }
            }
        }
    }

    async fn execute_reserved(
        &self,
        key: &IdempotencyKey,
        input: &ValidatedTurn,
    ) -> Result<TurnResponse, ConversationError> {
        let result = self.execute(input, Some(key)).await;
        if result.is_err() {
            if let Err(release_err) = self.store.release_idempotency(key).await {
                tracing::warn!(key = %key, error = %release_err, "failed to release idempotency key");
            }
        }
        result
    }

    fn replay(&self, record: &IdempotencyRecord) -> Result<TurnResponse, ConversationError> {
        tracing::debug!(
            key = %record.key,
            session_id = %record.session_id,
            turn_number = record.turn_number,
            "replaying cached turn"
        );
        Ok(serde_json::from_str(&record.response)?)
    }

    fn validate(&self, request: TurnRequest) -> Result<ValidatedTurn, ValidationError> {
        let message = request.message.trim().to_string();
        if message.is_empty() {
            return Err(ValidationError::empty_field("message"));
        }
        let length = message.chars().count();
        if length > self.settings.max_message_length {
            return Err(ValidationError::too_long(
                "message",
                self.settings.max_message_length,
                length,
            ));
        }

        let input_type = match request.input_type.as_deref() {
            Some(raw) => raw.parse::<InputType>()?,
            None => InputType::default(),
        };

        let user_id = request.user_id.map(UserId::new).transpose()?;

        let raw_session = request
            .session_id
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty());
        let session_id = raw_session.and_then(|raw| match raw.parse::<SessionId>() {
            Ok(id) => Some(id),
            Err(_) => {
                tracing::debug!(session_id = raw, "malformed session id, starting a new session");
                None
            }
        });

        let idempotency_key = match request.idempotency_key {
            Some(key) => Some(IdempotencyKey::new(key)?),
            None => request.client_info.get(REQUEST_ID_KEY).map(|request_id| {
                let anonymous = UserId::anonymous();
                let scope = raw_session.unwrap_or_else(|| {
                    user_id.as_ref().unwrap_or(&anonymous).as_str()
                });
                IdempotencyKey::derive(scope, &message, request_id)
            }),
        };

        Ok(ValidatedTurn {
            message,
            session_id,
            user_id,
            input_type,
            client_info: request.client_info,
            idempotency_key,
        })
    }

    /// Runs one turn under the session lock.
    ///
    /// If the session is closed between resolving it and saving the turn, the
    /// turn runs again once in a fresh session for the same user.
    async fn execute(
        &self,
        input: &ValidatedTurn,
        key: Option<&IdempotencyKey>,
    ) -> Result<TurnResponse, ConversationError> {
        let started = Instant::now();
        let _guard = match input.session_id {
            Some(id) => Some(self.locks.acquire(id).await),
            None => None,
        };
        let session = self.resolve_session(input).await?;
        let user = session.user_id().clone();

        match self.run_turn(input, key, session, started).await {
            Err(ConversationError::SessionClosed(id)) => {
                tracing::warn!(session_id = %id, "session closed mid-turn, continuing in a new session");
                let session = self
                    .open_session(user, input.client_info.clone(), Timestamp::now())
                    .await?;
                self.run_turn(input, key, session, started).await
            }
            result => result,
        }
    }

    async fn run_turn(
        &self,
        input: &ValidatedTurn,
        key: Option<&IdempotencyKey>,
        mut session: ConversationSession,
        started: Instant,
    ) -> Result<TurnResponse, ConversationError> {
        let turn_number = session.next_turn_number();
        let state_before = session.state();
        let locale = self.locale_for(&input.client_info, session.client_info());

        let mut context = session.context().clone();
        let clarity_before = context.emotional.clarity_score;

        let signals = self.extractor.extract(&input.message);
        context.signals = context.signals.merge(&signals);

        let classification = self.classifier.classify(&input.message, state_before);

        // Counter increments wait until the turn is stored.
        let mut stat_deltas = Vec::new();
        if let Some(pending) = context.pending_question.take() {
            let matched = self.bank.reply_matches(&pending, &input.message);
            tracing::debug!(question_id = pending.as_str(), matched, "checked reply to question");
            if matched {
                stat_deltas.push(QuestionStatDelta::succeeded(pending));
            }
        }

        let (detection, mood_failed) = if classification.intent.is_exit() {
            (MoodDetection::unclear(), false)
        } else {
            self.detect_mood(&input.message).await
        };
        let mood_detected = detection.is_detected();
        if mood_detected {
            let turn_confidence = (classification.confidence + detection.confidence) / 2.0;
            context.emotional = self.tracker.update(
                &context.emotional,
                detection.mood,
                detection.intensity,
                turn_confidence,
            );
        } else {
            context.emotional.record_turn_confidence(classification.confidence);
        }

        let has_context = context.has_context();
        let clarity = self.clarity.score(
            &context.emotional,
            turn_number,
            has_context,
            context.emotional.mean_confidence(),
        );
        context.emotional = std::mem::take(&mut context.emotional).with_clarity(clarity);
        let immediate_clarity = self.clarity.immediate_score(
            if mood_detected { detection.confidence } else { 0.0 },
            classification.confidence,
            signals.has_any(),
        );

        let guard = GuardContext {
            intent: classification.intent,
            intent_confidence: classification.confidence,
            clarity,
            immediate_clarity,
            has_context,
            mood_detected,
            turn_number,
            max_turns: session.max_turns(),
            depth_probes_exhausted: self.depth_probes_exhausted(&context, clarity, turn_number),
            context_probes_exhausted: self.context_probes_exhausted(&context),
        };

        let (transition, mismatched) = match self.fsm.advance(state_before, &guard) {
            Ok(transition) => (transition, false),
            Err(mismatch) => {
                tracing::warn!(
                    session_id = %session.id(),
                    turn_number,
                    state = %mismatch.state,
                    intent = %mismatch.intent,
                    "no transition matched, re-prompting"
                );
                (
                    Transition {
                        from: state_before,
                        to: state_before,
                        steps: Vec::new(),
                    },
                    true,
                )
            }
        };
        for step in &transition.steps {
            tracing::debug!(
                session_id = %session.id(),
                turn_number,
                from = %step.from,
                to = %step.to,
                reason = ?step.reason,
                "dialogue transition"
            );
        }

        let final_state = transition.to;
        let reply = if mismatched {
            Reply::plain(responses::reprompt(&locale), ResponseType::Reprompt)
        } else if classification.intent == Intent::Help && transition.is_stay() {
            Reply::plain(responses::help(&locale), ResponseType::Help)
        } else if mood_failed
            && !matches!(final_state, DialogueState::Delivery | DialogueState::Ended)
        {
            Reply::plain(responses::mood_unclear(&locale), ResponseType::Fallback)
        } else {
            self.compose(&transition, &mut context, clarity, turn_number, &locale)
                .await
        };

        let degraded = mood_failed || reply.degraded;
        if degraded {
            context.degraded_turns += 1;
        }

        if transition.visited(DialogueState::Recommendation) {
            let emotional = &context.emotional;
            let intensity = if emotional.has_observations() {
                emotional.avg_intensity
            } else {
                DEFAULT_FINAL_INTENSITY
            };
            session.conclude(emotional.dominant_mood, intensity, emotional.mean_confidence());
        }

        let emotional_signals = EmotionalSignals::from(&context.emotional);
        let finished_at = Timestamp::now();
        session.apply_turn(final_state, context, finished_at)?;
        if final_state == DialogueState::Ended {
            let reason = if classification.intent.is_exit() {
                EndReason::ExitIntent
            } else {
                EndReason::Completed
            };
            session.close(reason, finished_at)?;
        }

        let processing_time_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        let turn = self.build_turn(
            input,
            &session,
            &classification,
            &detection,
            &signals,
            emotional_signals,
            &reply,
            (state_before, final_state),
            (clarity_before, clarity),
            degraded,
            finished_at,
            processing_time_ms,
        );
        if let Some(question) = &reply.question {
            stat_deltas.push(QuestionStatDelta::used(question.clone()));
        }

        let response = TurnResponse {
            session_id: *session.id(),
            turn_number,
            bot_response: reply.text,
            response_type: reply.response_type,
            detected_mood: mood_detected.then_some(detection.mood),
            detected_intensity: mood_detected.then(|| round4(detection.intensity)),
            clarity_score: round4(clarity),
            current_state: final_state,
            should_recommend: final_state == DialogueState::Delivery,
            processing_time_ms,
            intent: classification.intent,
            intent_confidence: round4(classification.confidence),
            recommendations: reply.recommendations,
            question_id: reply.question,
            degraded,
            state_path: transition.path(),
            session_ended: !session.is_active(),
        };

        // The replay record is written with the turn, so a stored turn is
        // never left without its result.
        let completes = match key {
            Some(key) => Some(IdempotencyRecord::new(
                key.clone(),
                response.session_id,
                turn_number,
                serde_json::to_string(&response)?,
                finished_at,
                self.settings.idempotency_ttl_secs,
            )),
            None => None,
        };
        self.store
            .save_turn(&session, &turn, completes.as_ref())
            .await?;
        self.commit_question_stats(&stat_deltas).await;

        tracing::info!(
            session_id = %session.id(),
            turn_number,
            state = %final_state,
            intent = %classification.intent,
            clarity,
            response_type = %response.response_type,
            degraded,
            "processed turn"
        );
        if !session.is_active() {
            tracing::info!(
                session_id = %session.id(),
                reason = ?session.end_reason(),
                "session closed"
            );
        }

        Ok(response)
    }

    /// Applies a stored turn's counter increments to the bank and the store.
    async fn commit_question_stats(&self, deltas: &[QuestionStatDelta]) {
        if deltas.is_empty() {
            return;
        }
        self.bank.apply(deltas);
        if let Err(error) = self.store.record_question_stats(deltas).await {
            tracing::warn!(%error, "failed to persist question counters");
        }
    }

    /// Loads the requested session, or opens a new one when it is unknown,
    /// closed, expired or out of turns.
    async fn resolve_session(
        &self,
        input: &ValidatedTurn,
    ) -> Result<ConversationSession, ConversationError> {
        let now = Timestamp::now();
        let mut previous_user = None;

        if let Some(id) = input.session_id {
            match self.store.get_session(&id).await? {
                Some(mut session) if session.is_active() => {
                    if session.is_expired_at(&now) {
                        session.time_out(now)?;
                        self.store.update_session(&session).await?;
                        tracing::info!(session_id = %id, "session timed out on access");
                    } else if !session.has_turns_left() {
                        session.close(EndReason::MaxTurnsExceeded, now)?;
                        self.store.update_session(&session).await?;
                        tracing::info!(session_id = %id, "session closed after its last turn");
                    } else {
                        return Ok(session);
                    }
                    previous_user = Some(session.user_id().clone());
                }
                Some(session) => {
                    tracing::debug!(session_id = %id, "session is closed, starting a new one");
                    previous_user = Some(session.user_id().clone());
                }
                None => tracing::debug!(session_id = %id, "unknown session, starting a new one"),
            }
        }

        let user = input
            .user_id
            .clone()
            .or(previous_user)
            .unwrap_or_else(UserId::anonymous);
        self.open_session(user, input.client_info.clone(), now).await
    }

    async fn open_session(
        &self,
        user: UserId,
        client_info: BTreeMap<String, String>,
        now: Timestamp,
    ) -> Result<ConversationSession, ConversationError> {
        let session = ConversationSession::new_at(
            SessionId::new(),
            user,
            self.settings.max_turns,
            self.settings.inactivity_timeout_secs,
            client_info,
            now,
        )?;
        self.store.create_session(&session).await?;
        tracing::info!(
            session_id = %session.id(),
            user_id = session.user_id().as_str(),
            max_turns = session.max_turns(),
            "session created"
        );
        Ok(session)
    }

    async fn detect_mood(&self, text: &str) -> (MoodDetection, bool) {
        match tokio::time::timeout(
            self.settings.collaborator_timeout,
            self.detector.detect_mood(text),
        )
        .await
        {
            Ok(Ok(detection)) => (detection, false),
            Ok(Err(error)) => {
                tracing::warn!(%error, "mood detection failed, degrading turn");
                (MoodDetection::unclear(), true)
            }
            Err(_) => {
                tracing::warn!(
                    timeout_ms = self.settings.collaborator_timeout.as_millis() as u64,
                    "mood detection timed out, degrading turn"
                );
                (MoodDetection::unclear(), true)
            }
        }
    }

    fn depth_probes_exhausted(&self, context: &SessionContext, clarity: f64, turn: u32) -> bool {
        self.strategies
            .strategy_for_state(DialogueState::ProbingDepth, clarity, context.has_context(), turn)
            .map_or(true, |strategy| {
                !self.bank.has_available(strategy, &context.asked_questions)
            })
    }

    fn context_probes_exhausted(&self, context: &SessionContext) -> bool {
        context.context_probe_count >= self.settings.max_context_probes
            || !self
                .bank
                .has_available(ClarificationStrategy::ContextFirst, &context.asked_questions)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Reply composition
    // ─────────────────────────────────────────────────────────────────────────

    async fn compose(
        &self,
        transition: &Transition,
        context: &mut SessionContext,
        clarity: f64,
        turn_number: u32,
        locale: &str,
    ) -> Reply {
        match transition.to {
            DialogueState::Ended => Reply::plain(responses::farewell(locale), ResponseType::Farewell),
            DialogueState::Delivery => {
                let refining = transition.visited(DialogueState::Refining);
                self.deliver(context, turn_number, refining, locale).await
            }
            state @ (DialogueState::ProbingDepth
            | DialogueState::ExploringContext
            | DialogueState::ConfirmingMood) => {
                let acknowledge = transition.visited(DialogueState::Acknowledging);
                self.ask(state, context, clarity, turn_number, acknowledge, locale)
            }
            DialogueState::InitialQuery => {
                Reply::plain(responses::greeting(locale), ResponseType::Greeting)
            }
            _ => Reply::plain(responses::reprompt(locale), ResponseType::Reprompt),
        }
    }

    fn ask(
        &self,
        state: DialogueState,
        context: &mut SessionContext,
        clarity: f64,
        turn_number: u32,
        acknowledge: bool,
        locale: &str,
    ) -> Reply {
        let picked = self
            .strategies
            .strategy_for_state(state, clarity, context.has_context(), turn_number)
            .and_then(|strategy| self.bank.select_question(strategy, &context.asked_questions))
            .map(|question| {
                (
                    question.id.clone(),
                    question
                        .text(locale, &self.settings.default_locale)
                        .to_string(),
                )
            });

        if let Some((id, _)) = &picked {
            context.ask(id.clone());
            match state {
                DialogueState::ProbingDepth => context.depth_probe_count += 1,
                DialogueState::ExploringContext => context.context_probe_count += 1,
                _ => {}
            }
        }
        let (question, text) = match picked {
            Some((id, text)) => (Some(id), Some(text)),
            None => (None, None),
        };

        if state == DialogueState::ConfirmingMood {
            let readback =
                responses::readback(context.emotional.dominant_mood, &context.signals, locale);
            let prompt = text.unwrap_or_else(|| responses::confirm_fallback(locale));
            return Reply {
                text: format!("{} {}", readback, prompt),
                response_type: ResponseType::Confirmation,
                question,
                recommendations: Vec::new(),
                degraded: false,
            };
        }

        let prompt = text.unwrap_or_else(|| responses::mood_unclear(locale));
        let text = if acknowledge {
            format!(
                "{} {}",
                responses::acknowledgement(context.emotional.dominant_mood, locale),
                prompt
            )
        } else {
            prompt
        };
        Reply {
            text,
            response_type: ResponseType::Question,
            question,
            recommendations: Vec::new(),
            degraded: false,
        }
    }

    async fn deliver(
        &self,
        context: &mut SessionContext,
        turn_number: u32,
        refining: bool,
        locale: &str,
    ) -> Reply {
        let mood = context.emotional.dominant_mood;
        let mut request =
            RecommendationRequest::from_context(mood, &context.emotional, context.signals, turn_number);
        if refining {
            request = request.excluding(context.last_recommendations.iter().map(|s| s.id.clone()));
            context.refinement_count += 1;
        }

        let outcome = tokio::time::timeout(
            self.settings.collaborator_timeout,
            self.recommender.recommend(&request),
        )
        .await;
        let (songs, degraded) = match outcome {
            Ok(Ok(songs)) if !songs.is_empty() => (songs, false),
            Ok(Ok(_)) => {
                tracing::warn!(mood = %mood, "recommender returned no songs, using defaults");
                (responses::fallback_songs(), true)
            }
            Ok(Err(error)) => {
                tracing::warn!(mood = %mood, %error, "recommendation failed, using defaults");
                (responses::fallback_songs(), true)
            }
            Err(_) => {
                tracing::warn!(
                    mood = %mood,
                    timeout_ms = self.settings.collaborator_timeout.as_millis() as u64,
                    "recommendation timed out, using defaults"
                );
                (responses::fallback_songs(), true)
            }
        };

        context.last_recommendations = songs.clone();
        Reply {
            text: responses::recommendation(mood, &songs, locale),
            response_type: ResponseType::Recommendation,
            question: None,
            recommendations: songs,
            degraded,
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn build_turn(
        &self,
        input: &ValidatedTurn,
        session: &ConversationSession,
        classification: &IntentClassification,
        detection: &MoodDetection,
        signals: &ContextSignals,
        emotional_signals: EmotionalSignals,
        reply: &Reply,
        (state_before, state_after): (DialogueState, DialogueState),
        (clarity_before, clarity_after): (f64, f64),
        degraded: bool,
        created_at: Timestamp,
        processing_ms: u64,
    ) -> ConversationTurn {
        let detected = detection.is_detected();
        ConversationTurn {
            session_id: *session.id(),
            turn_number: session.turn_count(),
            user_input: input.message.clone(),
            input_type: input.input_type,
            detected_mood: detected.then_some(detection.mood),
            detected_intensity: detected.then_some(detection.intensity),
            mood_confidence: detection.confidence,
            matched_keywords: detection.keywords.clone(),
            intent: classification.intent,
            intent_confidence: classification.confidence,
            context_signals: *signals,
            emotional_signals,
            bot_response: reply.text.clone(),
            response_type: reply.response_type,
            question_asked: reply.question.clone(),
            state_before,
            state_after,
            clarity_before,
            clarity_after,
            clarity_delta: clarity_after - clarity_before,
            degraded,
            created_at,
            processing_ms,
        }
    }

    fn locale_for(
        &self,
        request_info: &BTreeMap<String, String>,
        session_info: &BTreeMap<String, String>,
    ) -> String {
        request_info
            .get(LOCALE_KEY)
            .or_else(|| session_info.get(LOCALE_KEY))
            .cloned()
            .unwrap_or_else(|| self.settings.default_locale.clone())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Session lifecycle
    // ─────────────────────────────────────────────────────────────────────────

    /// Opens a session without recording a turn.
    ///
    /// # Errors
    ///
    /// - `Validation` if `user_id` is blank or too long
    pub async fn start_session(
        &self,
        user_id: Option<&str>,
        client_info: BTreeMap<String, String>,
        with_greeting: bool,
    ) -> Result<SessionStart, ConversationError> {
        let user = user_id
            .map(UserId::new)
            .transpose()?
            .unwrap_or_else(UserId::anonymous);
        let session = self.open_session(user, client_info, Timestamp::now()).await?;
        let greeting = with_greeting.then(|| {
            let locale = self.locale_for(session.client_info(), &BTreeMap::new());
            responses::greeting(&locale)
        });
        Ok(SessionStart {
            session_id: *session.id(),
            state: session.state(),
            greeting,
            created_at: *session.created_at(),
            expires_at: *session.expires_at(),
        })
    }

    /// Current state and emotional snapshot of a session.
    ///
    /// An active session past its deadline is timed out first.
    ///
    /// # Errors
    ///
    /// - `SessionNotFound` if the id is unknown
    pub async fn session_status(&self, id: SessionId) -> Result<SessionStatus, ConversationError> {
        let _guard = self.locks.acquire(id).await;
        let session = self.load_with_expiry(id).await?;
        self.status_of(&session).await
    }

    /// Closes a session. Closing an already closed session is a no-op.
    ///
    /// # Errors
    ///
    /// - `SessionNotFound` if the id is unknown
    pub async fn end_session(
        &self,
        id: SessionId,
        reason: EndReason,
    ) -> Result<SessionStatus, ConversationError> {
        let _guard = self.locks.acquire(id).await;
        let mut session = self.load_with_expiry(id).await?;
        if session.is_active() {
            session.close(reason, Timestamp::now())?;
            self.store.update_session(&session).await?;
            tracing::info!(session_id = %id, reason = %reason, "session ended");
        }
        self.status_of(&session).await
    }

    /// Enriched payload for the recommender, built from a concluded session.
    ///
    /// # Errors
    ///
    /// - `SessionNotFound` if the id is unknown
    /// - `SessionNotConcluded` if no final mood has been set
    pub async fn recommendation_request(
        &self,
        id: SessionId,
    ) -> Result<RecommendationRequest, ConversationError> {
        let session = self
            .store
            .get_session(&id)
            .await?
            .ok_or(ConversationError::SessionNotFound(id))?;
        let mood = session
            .final_mood()
            .ok_or(ConversationError::SessionNotConcluded(id))?;
        let context = session.context();
        let mut request = RecommendationRequest::from_context(
            mood,
            &context.emotional,
            context.signals,
            session.turn_count(),
        );
        if let Some(intensity) = session.final_intensity() {
            request.intensity = intensity;
        }
        Ok(request)
    }

    async fn load_with_expiry(&self, id: SessionId) -> Result<ConversationSession, ConversationError> {
        let mut session = self
            .store
            .get_session(&id)
            .await?
            .ok_or(ConversationError::SessionNotFound(id))?;
        let now = Timestamp::now();
        if session.is_active() && session.is_expired_at(&now) {
            session.time_out(now)?;
            self.store.update_session(&session).await?;
            tracing::info!(session_id = %id, "session timed out on access");
        }
        Ok(session)
    }

    async fn status_of(&self, session: &ConversationSession) -> Result<SessionStatus, ConversationError> {
        let turns = self.store.list_turns(session.id()).await?;
        let context = session.context();
        Ok(SessionStatus {
            session_id: *session.id(),
            user_id: session.user_id().as_str().to_string(),
            state: session.state(),
            is_active: session.is_active(),
            turn_count: session.turn_count(),
            max_turns: session.max_turns(),
            turns_recorded: turns.len(),
            clarity_score: context.emotional.clarity_score,
            emotional: EmotionalSignals::from(&context.emotional),
            context_signals: context.signals,
            final_mood: session.final_mood(),
            final_intensity: session.final_intensity(),
            final_confidence: session.final_confidence(),
            end_reason: session.end_reason(),
            created_at: *session.created_at(),
            last_activity_at: *session.last_activity_at(),
            expires_at: *session.expires_at(),
            ended_at: session.ended_at().copied(),
        })
    }
}

/// Rounds to four decimals so cached responses replay exactly.
fn round4(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::{InMemorySessionStore, MockMoodDetector, MockRecommender};
    use crate::domain::emotion::Mood;
    use crate::ports::CollaboratorError;

    struct Harness {
        manager: ConversationManager,
        store: Arc<InMemorySessionStore>,
        detector: MockMoodDetector,
        recommender: MockRecommender,
    }

    fn build(
        config: AppConfig,
        detector: MockMoodDetector,
        recommender: MockRecommender,
    ) -> Harness {
        let store = Arc::new(InMemorySessionStore::new());
        let bank = Arc::new(ProbeQuestionBank::with_defaults().unwrap());
        let manager = ConversationManager::from_config(
            &config,
            store.clone(),
            Arc::new(detector.clone()),
            Arc::new(recommender.clone()),
            bank,
        );
        Harness {
            manager,
            store,
            detector,
            recommender,
        }
    }

    fn harness_with(config: AppConfig) -> Harness {
        build(config, MockMoodDetector::new(), MockRecommender::new())
    }

    fn harness() -> Harness {
        harness_with(AppConfig::default())
    }

    mod validation {
        use super::*;

        #[tokio::test]
        async fn blank_message_is_rejected_without_side_effects() {
            let h = harness();
            let err = h.manager.process_turn(TurnRequest::new("   ")).await.unwrap_err();
            assert!(matches!(err, ConversationError::Validation(_)));
            assert_eq!(h.store.session_count().await, 0);
        }

        #[tokio::test]
        async fn overlong_message_is_rejected() {
            let mut config = AppConfig::default();
            config.dialogue.max_message_length = 10;
            let h = harness_with(config);
            let err = h
                .manager
                .process_turn(TurnRequest::new("this is longer than ten"))
                .await
                .unwrap_err();
            assert!(matches!(err, ConversationError::Validation(_)));
        }

        #[tokio::test]
        async fn unknown_input_type_is_rejected() {
            let h = harness();
            let err = h
                .manager
                .process_turn(TurnRequest::new("hi").with_input_type("telepathy"))
                .await
                .unwrap_err();
            assert!(matches!(err, ConversationError::Validation(_)));
            assert_eq!(h.store.session_count().await, 0);
        }

        #[tokio::test]
        async fn malformed_session_id_starts_a_new_session() {
            let h = harness();
            let response = h
                .manager
                .process_turn(TurnRequest::new("hello").in_session("not-a-uuid"))
                .await
                .unwrap();
            assert_eq!(response.turn_number, 1);
            assert_eq!(h.store.session_count().await, 1);
        }
    }

    mod dialogue {
        use super::*;

        #[tokio::test]
        async fn first_sad_message_asks_a_depth_question() {
            let h = harness();
            let response = h
                .manager
                .process_turn(TurnRequest::new("I feel very sad"))
                .await
                .unwrap();
            assert_eq!(
                response.state_path,
                vec![
                    DialogueState::Greeting,
                    DialogueState::Acknowledging,
                    DialogueState::ProbingDepth
                ]
            );
            assert_eq!(response.response_type, ResponseType::Question);
            assert_eq!(response.detected_mood, Some(Mood::Sad));
            assert!(response.clarity_score < 0.5);
            assert!(response.question_id.is_some());
            assert!(!response.should_recommend);
        }

        #[tokio::test]
        async fn plain_greeting_is_answered_with_a_greeting() {
            let h = harness();
            let response = h.manager.process_turn(TurnRequest::new("hello")).await.unwrap();
            assert_eq!(response.current_state, DialogueState::InitialQuery);
            assert_eq!(response.response_type, ResponseType::Greeting);
        }

        #[tokio::test]
        async fn help_keeps_the_state() {
            let h = harness();
            let first = h.manager.process_turn(TurnRequest::new("I feel very sad")).await.unwrap();
            let response = h
                .manager
                .process_turn(TurnRequest::new("help").in_session(first.session_id))
                .await
                .unwrap();
            assert_eq!(response.current_state, DialogueState::ProbingDepth);
            assert_eq!(response.response_type, ResponseType::Help);
        }

        #[tokio::test]
        async fn spanish_locale_localizes_questions() {
            let h = harness();
            let response = h
                .manager
                .process_turn(
                    TurnRequest::new("I feel very sad").with_client_info(LOCALE_KEY, "es"),
                )
                .await
                .unwrap();
            assert!(response.bot_response.contains("Gracias"));
        }

        #[tokio::test]
        async fn question_reply_is_scored_against_expected_patterns() {
            let h = harness();
            let first = h.manager.process_turn(TurnRequest::new("I feel very sad")).await.unwrap();
            let question = first.question_id.clone().unwrap();
            h.manager
                .process_turn(
                    TurnRequest::new("I'm sad because I failed my exam")
                        .in_session(first.session_id),
                )
                .await
                .unwrap();
            assert_eq!(h.manager.question_bank().usage_count(&question), 1);
            assert_eq!(h.manager.question_bank().success_count(&question), 1);

            let stored = h.store.load_question_stats().await.unwrap();
            let stats = stored.iter().find(|s| s.question_id == question).unwrap();
            assert_eq!((stats.usage_count, stats.success_count), (1, 1));
        }
    }

    mod recovery {
        use super::*;

        #[tokio::test]
        async fn session_closed_mid_turn_continues_in_a_new_session() {
            let detector = MockMoodDetector::new().with_delay(Duration::from_millis(200));
            let h = build(AppConfig::default(), detector, MockRecommender::new());
            let start = h
                .manager
                .start_session(Some("listener"), BTreeMap::new(), false)
                .await
                .unwrap();

            let close = async {
                tokio::time::sleep(Duration::from_millis(50)).await;
                let mut session = h.store.get_session(&start.session_id).await.unwrap().unwrap();
                session.close(EndReason::EndedByClient, Timestamp::now()).unwrap();
                h.store.update_session(&session).await.unwrap();
            };
            let turn = h
                .manager
                .process_turn(TurnRequest::new("I feel very sad").in_session(start.session_id));
            let (response, ()) = tokio::join!(turn, close);

            let response = response.unwrap();
            assert_ne!(response.session_id, start.session_id);
            assert_eq!(response.turn_number, 1);
            let replacement = h.store.get_session(&response.session_id).await.unwrap().unwrap();
            assert_eq!(replacement.user_id().as_str(), "listener");
            assert!(h.store.list_turns(&start.session_id).await.unwrap().is_empty());
            assert_eq!(h.detector.call_count(), 2);

            // Only the stored attempt counts its question.
            let used: u64 = h
                .store
                .load_question_stats()
                .await
                .unwrap()
                .iter()
                .map(|s| s.usage_count)
                .sum();
            assert_eq!(used, 1);
        }
    }

    mod degradation {
        use super::*;

        #[tokio::test]
        async fn mood_detector_failure_yields_fallback_reply() {
            let detector = MockMoodDetector::new().with_error(CollaboratorError::Unavailable {
                collaborator: "mood_detector",
                message: "down".to_string(),
            });
            let h = build(AppConfig::default(), detector, MockRecommender::new());
            let response = h.manager.process_turn(TurnRequest::new("I feel very sad")).await.unwrap();
            assert!(response.degraded);
            assert_eq!(response.response_type, ResponseType::Fallback);
            assert_eq!(response.detected_mood, None);
            assert_eq!(h.detector.call_count(), 1);
        }

        #[tokio::test]
        async fn recommender_failure_uses_default_songs() {
            let recommender = MockRecommender::new().with_error(CollaboratorError::Unavailable {
                collaborator: "recommender",
                message: "down".to_string(),
            });
            let h = build(AppConfig::default(), MockMoodDetector::new(), recommender);
            let response = h
                .manager
                .process_turn(TurnRequest::new("play something happy"))
                .await
                .unwrap();
            assert_eq!(response.current_state, DialogueState::Delivery);
            assert!(response.degraded);
            assert_eq!(response.recommendations, responses::fallback_songs());
            assert_eq!(h.recommender.call_count(), 1);
        }
    }

    mod lifecycle {
        use super::*;

        #[tokio::test]
        async fn start_session_greets_in_the_requested_locale() {
            let h = harness();
            let mut info = BTreeMap::new();
            info.insert(LOCALE_KEY.to_string(), "es".to_string());
            let start = h.manager.start_session(Some("listener"), info, true).await.unwrap();
            assert_eq!(start.state, DialogueState::Greeting);
            assert_eq!(start.greeting, Some(responses::greeting("es")));

            let status = h.manager.session_status(start.session_id).await.unwrap();
            assert_eq!(status.turn_count, 0);
            assert_eq!(status.user_id, "listener");
            assert!(status.is_active);
        }

        #[tokio::test]
        async fn end_session_is_idempotent() {
            let h = harness();
            let start = h.manager.start_session(None, BTreeMap::new(), false).await.unwrap();
            let first = h
                .manager
                .end_session(start.session_id, EndReason::EndedByClient)
                .await
                .unwrap();
            assert!(!first.is_active);
            assert_eq!(first.state, DialogueState::Ended);
            assert_eq!(first.end_reason, Some(EndReason::EndedByClient));

            let again = h
                .manager
                .end_session(start.session_id, EndReason::Timeout)
                .await
                .unwrap();
            assert_eq!(again.end_reason, Some(EndReason::EndedByClient));
        }

        #[tokio::test]
        async fn unknown_session_status_is_not_found() {
            let h = harness();
            let err = h.manager.session_status(SessionId::new()).await.unwrap_err();
            assert!(matches!(err, ConversationError::SessionNotFound(_)));
        }

        #[tokio::test]
        async fn recommendation_request_requires_a_final_mood() {
            let h = harness();
            let first = h.manager.process_turn(TurnRequest::new("I feel very sad")).await.unwrap();
            let err = h
                .manager
                .recommendation_request(first.session_id)
                .await
                .unwrap_err();
            assert!(matches!(err, ConversationError::SessionNotConcluded(_)));
        }
    }

    #[test]
    fn round4_keeps_four_decimals() {
        assert_eq!(round4(0.352_083_3), 0.3521);
        assert_eq!(round4(1.0), 1.0);
    }
}
