//! Debounced OFFLINE/LIVE state machine for a single binding.
//!
//! [`StreamStateMachine::apply`] is pure: it takes the current
//! [`BindingState`] and one [`PollOutcome`] and returns the next state, the
//! sessions to persist and the events to emit. The caller persists everything
//! atomically and only then swaps the in-memory state.

use chrono::{DateTime, Utc};
use live_platforms::DetectionResult;

use super::events::{MonitorEvent, SessionCloseEvent, SessionOpenEvent};
use crate::domain::{BindingKey, BindingState, PollOutcome, StreamSession, UnknownReason, derive_session_id};

/// Effect of applying one poll outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// The outcome was older than the newest applied detection.
    Stale {
        fetched_at: DateTime<Utc>,
        last_fetched_at: DateTime<Utc>,
    },
    Applied(Transition),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub state: BindingState,
    /// Sessions to upsert, in write order (a closed session precedes its successor).
    pub sessions: Vec<StreamSession>,
    pub events: Vec<MonitorEvent>,
}

impl Transition {
    fn bookkeeping(state: BindingState) -> Self {
        Self {
            state,
            sessions: Vec::new(),
            events: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct StreamStateMachine {
    offline_threshold: u32,
}

impl StreamStateMachine {
    /// `offline_threshold` is clamped to at least 1.
    pub fn new(offline_threshold: u32) -> Self {
        Self {
            offline_threshold: offline_threshold.max(1),
        }
    }

    pub fn offline_threshold(&self) -> u32 {
        self.offline_threshold
    }

    pub fn apply(&self, key: &BindingKey, current: &BindingState, outcome: &PollOutcome) -> Step {
        match outcome {
            PollOutcome::Unknown {
                reason,
                observed_at,
            } => Step::Applied(Self::apply_unknown(current, *reason, *observed_at)),
            PollOutcome::Detected(result) => {
                if let Some(last) = current.record.last_fetched_at
                    && result.fetched_at < last
                {
                    return Step::Stale {
                        fetched_at: result.fetched_at,
                        last_fetched_at: last,
                    };
                }
                if result.is_live {
                    Step::Applied(self.apply_live(key, current, result))
                } else {
                    Step::Applied(self.apply_offline(key, current, result))
                }
            }
        }
    }

    /// Unknown outcomes never change live state or the miss count.
    fn apply_unknown(
        current: &BindingState,
        reason: UnknownReason,
        observed_at: DateTime<Utc>,
    ) -> Transition {
        let mut state = current.clone();
        let record = &mut state.record;
        record.last_checked_at = Some(record.last_checked_at.map_or(observed_at, |t| t.max(observed_at)));
        record.consecutive_unknown_count = record.consecutive_unknown_count.saturating_add(1);
        record.last_unknown_reason = Some(reason.as_str().to_string());
        Transition::bookkeeping(state)
    }

    fn detected_base(current: &BindingState, result: &DetectionResult) -> BindingState {
        let mut state = current.clone();
        let record = &mut state.record;
        record.last_fetched_at = Some(result.fetched_at);
        record.last_checked_at = Some(
            record
                .last_checked_at
                .map_or(result.fetched_at, |t| t.max(result.fetched_at)),
        );
        record.consecutive_unknown_count = 0;
        record.last_unknown_reason = None;
        state
    }

    fn apply_live(&self, key: &BindingKey, current: &BindingState, result: &DetectionResult) -> Transition {
        let mut state = Self::detected_base(current, result);
        let mut sessions = Vec::new();
        let mut events = Vec::new();
        let session_id = derive_session_id(&key.creator_id, result);

        if let Some(open) = current.open_session() {
            // A stable platform hint that changed means a new broadcast. Synthesized
            // ids only change at midnight, which is not a new broadcast.
            let restarted = result.session_hint.is_some() && open.session_id != session_id;
            if !restarted {
                let mut session = open.clone();
                session.update_from(result);
                state.record.consecutive_miss_count = 0;
                state.record.offline_since = None;
                sessions.push(session.clone());
                state.session = Some(session);
                return Transition {
                    state,
                    sessions,
                    events,
                };
            }

            let mut closed = open.clone();
            closed.closed_at = Some(result.fetched_at);
            events.push(close_event(&closed));
            sessions.push(closed);
        }

        let reopened = current
            .session
            .as_ref()
            .filter(|s| s.session_id == session_id && !s.is_open());

        let session = match reopened {
            // Same id as the last closed session: resume it without a second open event.
            Some(previous) => {
                let mut session = previous.clone();
                session.resume(result.fetched_at);
                session.update_from(result);
                session
            }
            None => {
                let session = StreamSession::open(session_id.clone(), &key.creator_id, result);
                events.push(MonitorEvent::SessionOpened(SessionOpenEvent {
                    creator_id: key.creator_id.clone(),
                    platform: key.platform,
                    session_id: session_id.clone(),
                    viewer_count: result.viewer_count,
                    title: result.title.clone(),
                    started_at: result.started_at,
                    opened_at: session.opened_at,
                }));
                session
            }
        };

        let record = &mut state.record;
        record.is_live = true;
        record.current_session_id = Some(session_id.clone());
        record.last_session_id = Some(session_id);
        record.consecutive_miss_count = 0;
        record.offline_since = None;

        sessions.push(session.clone());
        state.session = Some(session);
        Transition {
            state,
            sessions,
            events,
        }
    }

    fn apply_offline(&self, _key: &BindingKey, current: &BindingState, result: &DetectionResult) -> Transition {
        let mut state = Self::detected_base(current, result);

        let Some(open) = current.open_session() else {
            // Already offline. Repair a record that claims live without a session.
            let record = &mut state.record;
            if record.is_live {
                record.is_live = false;
                record.current_session_id = None;
            }
            record.consecutive_miss_count = 0;
            if record.offline_since.is_none() {
                record.offline_since = Some(result.fetched_at);
            }
            return Transition::bookkeeping(state);
        };

        let record = &mut state.record;
        record.consecutive_miss_count = record.consecutive_miss_count.saturating_add(1);
        let offline_since = *record.offline_since.get_or_insert(result.fetched_at);

        if record.consecutive_miss_count < self.offline_threshold {
            return Transition::bookkeeping(state);
        }

        let mut closed = open.clone();
        closed.closed_at = Some(offline_since.max(closed.resumed_at));

        record.is_live = false;
        record.current_session_id = None;
        record.consecutive_miss_count = 0;

        let events = vec![close_event(&closed)];
        state.session = Some(closed.clone());
        Transition {
            state,
            sessions: vec![closed],
            events,
        }
    }
}

fn close_event(session: &StreamSession) -> MonitorEvent {
    MonitorEvent::SessionClosed(SessionCloseEvent {
        creator_id: session.creator_id.clone(),
        platform: session.platform,
        session_id: session.session_id.clone(),
        opened_at: session.opened_at,
        resumed_at: session.resumed_at,
        closed_at: session.closed_at.unwrap_or(session.resumed_at),
        duration: session.segment_duration(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration as ChronoDuration, TimeZone};
    use live_platforms::{ErrorKind, Platform};

    fn key() -> BindingKey {
        BindingKey::new("c1", Platform::TikTok)
    }

    fn t(minutes: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap() + ChronoDuration::minutes(minutes)
    }

    fn live(minutes: i64) -> PollOutcome {
        PollOutcome::Detected(DetectionResult::live_at(Platform::TikTok, "someone", t(minutes)))
    }

    fn live_hint(minutes: i64, hint: &str) -> PollOutcome {
        PollOutcome::Detected(
            DetectionResult::live_at(Platform::TikTok, "someone", t(minutes)).with_session_hint(hint),
        )
    }

    fn offline(minutes: i64) -> PollOutcome {
        PollOutcome::Detected(DetectionResult::offline_at(Platform::TikTok, "someone", t(minutes)))
    }

    fn unknown(minutes: i64) -> PollOutcome {
        PollOutcome::Unknown {
            reason: UnknownReason::Detect(ErrorKind::TransientNetwork),
            observed_at: t(minutes),
        }
    }

    /// Feed outcomes in order, collecting every emitted event.
    fn run(machine: &StreamStateMachine, outcomes: &[PollOutcome]) -> (BindingState, Vec<MonitorEvent>) {
        let mut state = BindingState::default();
        let mut events = Vec::new();
        for outcome in outcomes {
            if let Step::Applied(transition) = machine.apply(&key(), &state, outcome) {
                events.extend(transition.events);
                state = transition.state;
            }
        }
        (state, events)
    }

    #[test]
    fn test_debounced_close() {
        let machine = StreamStateMachine::new(2);
        let (state, events) = run(&machine, &[live(0), live(1), offline(2), offline(3)]);

        assert_eq!(events.len(), 2);
        assert!(matches!(events[0], MonitorEvent::SessionOpened(_)));
        let MonitorEvent::SessionClosed(close) = &events[1] else {
            panic!("expected close, got {:?}", events[1]);
        };
        // Closed at the first offline poll.
        assert_eq!(close.closed_at, t(2));
        assert_eq!(close.duration, std::time::Duration::from_secs(120));
        assert!(!state.record.is_live);
        assert!(state.record.current_session_id.is_none());
    }

    #[test]
    fn test_single_miss_does_not_close() {
        let machine = StreamStateMachine::new(2);
        let (state, events) = run(&machine, &[live(0), offline(1), live(2)]);
        assert_eq!(events.len(), 1);
        assert!(state.record.is_live);
        assert_eq!(state.record.consecutive_miss_count, 0);
        assert!(state.record.offline_since.is_none());
    }

    #[test]
    fn test_unknowns_never_flap() {
        let machine = StreamStateMachine::new(2);
        let (state, events) = run(&machine, &[live(0), unknown(1), unknown(2), live(3)]);
        assert_eq!(events.len(), 1);
        assert!(state.record.is_live);
        assert_eq!(state.record.consecutive_unknown_count, 0);
    }

    #[test]
    fn test_unknown_does_not_count_as_miss() {
        let machine = StreamStateMachine::new(2);
        let (state, events) = run(&machine, &[live(0), offline(1), unknown(2), unknown(3)]);
        assert_eq!(events.len(), 1);
        assert!(state.record.is_live);
        assert_eq!(state.record.consecutive_miss_count, 1);
        assert_eq!(state.record.consecutive_unknown_count, 2);
        assert_eq!(state.record.last_unknown_reason.as_deref(), Some("transient_network"));
        assert_eq!(state.record.last_checked_at, Some(t(3)));
    }

    #[test]
    fn test_stale_result_is_dropped() {
        let machine = StreamStateMachine::new(1);
        let (state, _) = run(&machine, &[live(5)]);
        let step = machine.apply(&key(), &state, &offline(4));
        assert!(matches!(step, Step::Stale { .. }));

        // Equal timestamps are applied.
        assert!(matches!(
            machine.apply(&key(), &state, &offline(5)),
            Step::Applied(_)
        ));
    }

    #[test]
    fn test_same_day_reopen_is_silent() {
        let machine = StreamStateMachine::new(1);
        let (state, events) = run(&machine, &[live(0), offline(10), live(20)]);
        assert_eq!(events.len(), 2);
        assert!(state.record.is_live);
        let session = state.session.unwrap();
        assert!(session.is_open());
        assert_eq!(session.opened_at, t(0));
        assert_eq!(session.resumed_at, t(20));
    }

    #[test]
    fn test_reopened_session_closes_with_segment_duration() {
        let machine = StreamStateMachine::new(1);
        let (_, events) = run(&machine, &[live(0), offline(10), live(50), offline(60)]);

        let closes: Vec<&SessionCloseEvent> = events
            .iter()
            .filter_map(|e| match e {
                MonitorEvent::SessionClosed(close) => Some(close),
                MonitorEvent::SessionOpened(_) => None,
            })
            .collect();
        assert_eq!(closes.len(), 2);
        assert_eq!(closes[0].duration, std::time::Duration::from_secs(10 * 60));
        assert_eq!(closes[1].resumed_at, t(50));
        assert_eq!(closes[1].closed_at, t(60));
        assert_eq!(closes[1].duration, std::time::Duration::from_secs(10 * 60));
        assert_eq!(closes[1].opened_at, t(0));
    }

    #[test]
    fn test_hint_change_rotates_session() {
        let machine = StreamStateMachine::new(2);
        let (state, events) = run(&machine, &[live_hint(0, "a"), live_hint(1, "b")]);
        let kinds: Vec<_> = events.iter().map(MonitorEvent::event_type).collect();
        assert_eq!(kinds, vec!["SessionOpened", "SessionClosed", "SessionOpened"]);
        assert_eq!(events[1].session_id(), "tiktok:a");
        assert_eq!(state.record.current_session_id.as_deref(), Some("tiktok:b"));
    }

    #[test]
    fn test_missing_hint_keeps_hinted_session() {
        let machine = StreamStateMachine::new(2);
        let (state, events) = run(&machine, &[live_hint(0, "a"), live(1)]);
        assert_eq!(events.len(), 1);
        assert_eq!(state.record.current_session_id.as_deref(), Some("tiktok:a"));
    }

    #[test]
    fn test_midnight_does_not_rotate_synthesized_session() {
        let machine = StreamStateMachine::new(2);
        let late = PollOutcome::Detected(DetectionResult::live_at(
            Platform::TikTok,
            "someone",
            Utc.with_ymd_and_hms(2024, 5, 1, 23, 59, 0).unwrap(),
        ));
        let early = PollOutcome::Detected(DetectionResult::live_at(
            Platform::TikTok,
            "someone",
            Utc.with_ymd_and_hms(2024, 5, 2, 0, 1, 0).unwrap(),
        ));
        let (state, events) = run(&machine, &[late, early]);
        assert_eq!(events.len(), 1);
        assert_eq!(
            state.record.current_session_id.as_deref(),
            Some("c1:tiktok:2024-05-01")
        );
    }

    #[test]
    fn test_live_updates_metadata_without_event() {
        let machine = StreamStateMachine::new(2);
        let (state, _) = run(&machine, &[live(0)]);
        let update = PollOutcome::Detected(
            DetectionResult::live_at(Platform::TikTok, "someone", t(1))
                .with_viewer_count(0)
                .with_title("new title"),
        );
        let Step::Applied(transition) = machine.apply(&key(), &state, &update) else {
            panic!("expected applied");
        };
        assert!(transition.events.is_empty());
        let session = transition.state.session.unwrap();
        assert_eq!(session.viewer_count, Some(0));
        assert_eq!(session.title.as_deref(), Some("new title"));
    }

    #[test]
    fn test_threshold_is_clamped() {
        let machine = StreamStateMachine::new(0);
        assert_eq!(machine.offline_threshold(), 1);
        let (state, events) = run(&machine, &[live(0), offline(1)]);
        assert_eq!(events.len(), 2);
        assert!(!state.record.is_live);
    }
}
