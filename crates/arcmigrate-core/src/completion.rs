//! Reconciliation of raw test-session completion events.
//!
//! Completion exports contain duplicates and unfinished sessions. A
//! [`CompletedTestList`] is the canonical form: finished sessions only,
//! unique per `(week, day, session)`, sorted ascending by that triple.
//! The completion date is informational and not part of the identity key.

use serde::{Deserialize, Serialize};

/// One raw test-session completion event, as uploaded by the source app.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestSession {
    #[serde(default)]
    pub participant_id: String,
    /// 1 == finished, 0 == unfinished.
    #[serde(default)]
    pub finished_session: i32,
    #[serde(default)]
    pub day: i32,
    #[serde(default)]
    pub session: i32,
    #[serde(default)]
    pub week: i32,
    /// Epoch seconds, possibly fractional.
    #[serde(default)]
    pub session_date: f64,
}

/// One completed test in the canonical list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletedTest {
    pub week: i32,
    pub day: i32,
    pub session: i32,
    #[serde(rename = "completedOn")]
    pub completed_on: f64,
}

impl CompletedTest {
    fn key(&self) -> (i32, i32, i32) {
        (self.week, self.day, self.session)
    }
}

/// The canonical, deduplicated, ordered completion list for one
/// participant. Serialized as-is into the completed-tests report.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompletedTestList {
    pub completed: Vec<CompletedTest>,
}

impl CompletedTestList {
    /// Build the canonical list from raw session events.
    ///
    /// Unfinished sessions are dropped; duplicates by `(week, day,
    /// session)` keep the first-seen completion date without comparing
    /// dates.
    #[must_use]
    pub fn from_sessions(sessions: &[TestSession]) -> Self {
        let mut completed: Vec<CompletedTest> = Vec::new();

        for session in sessions {
            if session.finished_session != 1 {
                continue;
            }
            let already_seen = completed
                .iter()
                .any(|c| c.key() == (session.week, session.day, session.session));
            if already_seen {
                continue;
            }
            completed.push(CompletedTest {
                week: session.week,
                day: session.day,
                session: session.session,
                completed_on: session.session_date,
            });
        }

        completed.sort_by_key(CompletedTest::key);
        Self { completed }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.completed.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.completed.len()
    }
}
