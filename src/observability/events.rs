//! Structured event stream.
//!
//! Discrete, typed events emitted while encounters run. Events are
//! serialized as newline-delimited JSON (JSONL) and carry a monotonically
//! increasing sequence number for ordering.

use std::collections::BTreeMap;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::model::{CombatEncounter, CombatRoundOutcome};

// ---------------------------------------------------------------------------
// Event variants
// ---------------------------------------------------------------------------

/// A discrete event emitted while an encounter runs.
///
/// Each variant is tagged with `"type"` when serialized to JSON.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum Event {
    /// An encounter was registered.
    EncounterStarted {
        /// When the encounter started.
        timestamp: DateTime<Utc>,
        /// Encounter id.
        combat_id: String,
        /// Sector of the battle.
        sector_id: u32,
        /// Participant ids.
        participants: Vec<String>,
    },

    /// A round is accepting actions.
    RoundWaiting {
        /// When the notification was issued.
        timestamp: DateTime<Utc>,
        /// Encounter id.
        combat_id: String,
        /// Round accepting actions.
        round: u32,
        /// Round deadline.
        #[serde(skip_serializing_if = "Option::is_none")]
        deadline: Option<DateTime<Utc>>,
    },

    /// A round was resolved.
    RoundResolved {
        /// When the notification was issued.
        timestamp: DateTime<Utc>,
        /// Encounter id.
        combat_id: String,
        /// Resolved round.
        round: u32,
        /// Hits landed per participant.
        hits: BTreeMap<String, u32>,
        /// Fighters left per participant.
        fighters_remaining: BTreeMap<String, u32>,
        /// Shields left per participant.
        shields_remaining: BTreeMap<String, u32>,
        /// Flee attempts and their results.
        flee_results: BTreeMap<String, bool>,
    },

    /// The encounter reached a terminal state.
    CombatEnded {
        /// When the notification was issued.
        timestamp: DateTime<Utc>,
        /// Encounter id.
        combat_id: String,
        /// Final round.
        round: u32,
        /// Terminal tag.
        end_state: String,
    },

    /// A toll payment was accepted.
    TollPaid {
        /// When the payment was accepted.
        timestamp: DateTime<Utc>,
        /// Who paid.
        payer_id: String,
        /// Credits paid.
        amount: u64,
    },

    /// A simulation run finished.
    SimulationFinished {
        /// When the run finished.
        timestamp: DateTime<Utc>,
        /// Encounter id.
        combat_id: String,
        /// Rounds played.
        rounds: u32,
        /// Terminal tag, if one was reached.
        #[serde(skip_serializing_if = "Option::is_none")]
        end_state: Option<String>,
    },
}

impl Event {
    /// Builds an [`Event::EncounterStarted`] for `encounter`.
    #[must_use]
    pub fn encounter_started(encounter: &CombatEncounter) -> Self {
        Self::EncounterStarted {
            timestamp: Utc::now(),
            combat_id: encounter.combat_id.clone(),
            sector_id: encounter.sector_id,
            participants: encounter.participants.keys().cloned().collect(),
        }
    }

    /// Builds an [`Event::RoundWaiting`] for `encounter`.
    #[must_use]
    pub fn round_waiting(encounter: &CombatEncounter) -> Self {
        Self::RoundWaiting {
            timestamp: Utc::now(),
            combat_id: encounter.combat_id.clone(),
            round: encounter.round_number,
            deadline: encounter.deadline,
        }
    }

    /// Builds an [`Event::RoundResolved`] from a round outcome.
    #[must_use]
    pub fn round_resolved(encounter: &CombatEncounter, outcome: &CombatRoundOutcome) -> Self {
        Self::RoundResolved {
            timestamp: Utc::now(),
            combat_id: encounter.combat_id.clone(),
            round: outcome.round_number,
            hits: outcome.hits.clone(),
            fighters_remaining: outcome.fighters_remaining.clone(),
            shields_remaining: outcome.shields_remaining.clone(),
            flee_results: outcome.flee_results.clone(),
        }
    }

    /// Builds an [`Event::CombatEnded`] from the terminal outcome.
    #[must_use]
    pub fn combat_ended(encounter: &CombatEncounter, outcome: &CombatRoundOutcome) -> Self {
        Self::CombatEnded {
            timestamp: Utc::now(),
            combat_id: encounter.combat_id.clone(),
            round: outcome.round_number,
            end_state: outcome
                .end_state
                .as_ref()
                .map_or_else(String::new, ToString::to_string),
        }
    }
}

// ---------------------------------------------------------------------------
// Envelope (adds sequence number via serde flatten)
// ---------------------------------------------------------------------------

/// Wraps an [`Event`] with a monotonically increasing sequence number.
#[derive(Debug, Serialize)]
struct EventEnvelope {
    /// Zero-based, monotonically increasing sequence counter.
    sequence: u64,
    /// The wrapped event (flattened into the same JSON object).
    #[serde(flatten)]
    event: Event,
}

// ---------------------------------------------------------------------------
// Emitter
// ---------------------------------------------------------------------------

/// Thread-safe, buffered JSONL event writer.
///
/// Each call to [`emit`](Self::emit) atomically increments the sequence
/// counter, serializes the event as a single JSON line, and flushes the
/// underlying writer. Serialization or I/O failures are dropped.
pub struct EventEmitter {
    writer: Mutex<BufWriter<Box<dyn Write + Send>>>,
    sequence: AtomicU64,
}

impl std::fmt::Debug for EventEmitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventEmitter")
            .field("sequence", &self.sequence.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl EventEmitter {
    /// Creates an emitter that writes to the given writer.
    #[must_use]
    pub fn new(writer: Box<dyn Write + Send>) -> Self {
        Self {
            writer: Mutex::new(BufWriter::new(writer)),
            sequence: AtomicU64::new(0),
        }
    }

    /// Creates an emitter that writes to stderr.
    #[must_use]
    pub fn stderr() -> Self {
        Self::new(Box::new(std::io::stderr()))
    }

    /// Creates an emitter that discards all events.
    #[must_use]
    pub fn noop() -> Self {
        Self::new(Box::new(std::io::sink()))
    }

    /// Creates an emitter that writes to a file at `path`.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the file cannot be created.
    pub fn from_file(path: &Path) -> std::io::Result<Self> {
        let file = std::fs::File::create(path)?;
        Ok(Self::new(Box::new(file)))
    }

    /// Emits an event as a single JSONL line.
    pub fn emit(&self, event: Event) {
        let seq = self.sequence.fetch_add(1, Ordering::SeqCst);
        let envelope = EventEnvelope {
            sequence: seq,
            event,
        };

        if let Ok(mut w) = self.writer.lock() {
            if let Ok(line) = serde_json::to_string(&envelope) {
                let _ = writeln!(w, "{line}");
                let _ = w.flush();
            }
        }
    }

    /// Returns the number of events emitted so far.
    #[must_use]
    pub fn event_count(&self) -> u64 {
        self.sequence.load(Ordering::Relaxed)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex as StdMutex};

    use super::*;
    use crate::model::{CombatantState, EndState};

    /// In-memory writer for capturing emitter output in tests.
    #[derive(Clone)]
    struct TestWriter(Arc<StdMutex<Vec<u8>>>);

    impl TestWriter {
        fn new() -> Self {
            Self(Arc::new(StdMutex::new(Vec::new())))
        }

        fn contents(&self) -> String {
            let buf = self.0.lock().unwrap();
            String::from_utf8_lossy(&buf).into_owned()
        }
    }

    impl Write for TestWriter {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    fn encounter() -> CombatEncounter {
        CombatEncounter::new("combat-1", 12)
            .with_participant(CombatantState::character("p1", "One", 10, 10, 2))
            .with_participant(CombatantState::character("p2", "Two", 10, 10, 2))
    }

    #[test]
    fn event_serializes_with_type_tag() {
        let json = serde_json::to_string(&Event::encounter_started(&encounter())).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed["type"], "EncounterStarted");
        assert_eq!(parsed["sector_id"], 12);
        assert_eq!(parsed["participants"], serde_json::json!(["p1", "p2"]));
    }

    #[test]
    fn emitter_increments_sequence() {
        let tw = TestWriter::new();
        let emitter = EventEmitter::new(Box::new(tw.clone()));
        let enc = encounter();
        emitter.emit(Event::encounter_started(&enc));
        emitter.emit(Event::round_waiting(&enc));

        assert_eq!(emitter.event_count(), 2);

        let lines: Vec<serde_json::Value> = tw
            .contents()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines[0]["sequence"], 0);
        assert_eq!(lines[1]["sequence"], 1);
        assert_eq!(lines[1]["type"], "RoundWaiting");
        assert_eq!(lines[1]["round"], 1);
    }

    #[test]
    fn combat_ended_uses_flat_end_state() {
        let outcome = CombatRoundOutcome {
            round_number: 4,
            end_state: Some(EndState::Fled("p2".into())),
            ..CombatRoundOutcome::default()
        };
        let json = serde_json::to_value(Event::combat_ended(&encounter(), &outcome)).unwrap();
        assert_eq!(json["end_state"], "p2_fled");
        assert_eq!(json["round"], 4);
    }

    #[test]
    fn noop_emitter_still_counts() {
        let emitter = EventEmitter::noop();
        emitter.emit(Event::TollPaid {
            timestamp: Utc::now(),
            payer_id: "p1".into(),
            amount: 100,
        });
        assert_eq!(emitter.event_count(), 1);
    }
}
