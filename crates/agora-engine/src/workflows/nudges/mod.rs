//! One-shot advisory nudges for creators crossing performance thresholds.
//!
//! Evaluation runs after state-changing events (enrollments, settlements,
//! challenge completions) and never fails loudly: a read error is logged and
//! the whole pass is skipped for that invocation.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::workflows::enrollment::domain::{CreatorId, Program, ProgramId};
use crate::workflows::notify::{Notification, NotificationKind, NotificationSink};
use crate::workflows::store::StoreError;

/// Advisory classes the engine can raise, each at most once per guard key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NudgeKind {
    ReadyForPaidTier,
    ProgramAlmostFull,
}

impl NudgeKind {
    pub const fn label(self) -> &'static str {
        match self {
            NudgeKind::ReadyForPaidTier => "ready_for_paid_tier",
            NudgeKind::ProgramAlmostFull => "program_almost_full",
        }
    }
}

/// Guard key: one nudge per creator for [`NudgeKind::ReadyForPaidTier`], one
/// per program lifetime for [`NudgeKind::ProgramAlmostFull`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NudgeKey {
    pub creator: CreatorId,
    pub kind: NudgeKind,
    pub program: Option<ProgramId>,
}

/// Aggregate performance snapshot for a creator's catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreatorStats {
    pub published_programs: u32,
    pub total_participants: u32,
    pub average_rating: f64,
    pub has_paid_program: bool,
}

/// Read-side source for nudge evaluation.
///
/// `mark_nudged` is a conditional insert-if-absent on the guard key and
/// returns `true` only for the first caller, which makes each advisory
/// one-shot even under concurrent evaluations.
pub trait CreatorActivitySource: Send + Sync {
    fn creator_stats(&self, creator: &CreatorId) -> Result<CreatorStats, StoreError>;
    fn capacity_bounded_programs(&self, creator: &CreatorId) -> Result<Vec<Program>, StoreError>;
    fn mark_nudged(&self, key: &NudgeKey) -> Result<bool, StoreError>;
}

/// Thresholds gating the advisories.
#[derive(Debug, Clone, PartialEq)]
pub struct NudgeThresholds {
    pub min_programs: u32,
    pub min_participants: u32,
    pub min_average_rating: f64,
    pub fill_ratio: f64,
}

impl Default for NudgeThresholds {
    fn default() -> Self {
        Self {
            min_programs: 3,
            min_participants: 20,
            min_average_rating: 4.0,
            fill_ratio: 0.8,
        }
    }
}

/// Evaluation entry point other workflows fire after their own writes commit.
pub trait NudgeTrigger: Send + Sync {
    fn evaluate(&self, creator: &CreatorId);
}

/// Threshold engine raising at most one instance of each advisory.
pub struct NudgeEngine<S, N> {
    source: Arc<S>,
    notifications: Arc<N>,
    thresholds: NudgeThresholds,
}

impl<S, N> NudgeEngine<S, N>
where
    S: CreatorActivitySource + 'static,
    N: NotificationSink + 'static,
{
    pub fn new(source: Arc<S>, notifications: Arc<N>, thresholds: NudgeThresholds) -> Self {
        Self {
            source,
            notifications,
            thresholds,
        }
    }

    fn run(&self, creator: &CreatorId) -> Result<(), StoreError> {
        let stats = self.source.creator_stats(creator)?;

        if stats.published_programs >= self.thresholds.min_programs
            && stats.total_participants >= self.thresholds.min_participants
            && stats.average_rating >= self.thresholds.min_average_rating
            && !stats.has_paid_program
        {
            let key = NudgeKey {
                creator: creator.clone(),
                kind: NudgeKind::ReadyForPaidTier,
                program: None,
            };
            if self.source.mark_nudged(&key)? {
                self.send(creator, paid_tier_notification(creator, &stats));
            }
        }

        for program in self.source.capacity_bounded_programs(creator)? {
            let Some(capacity) = program.capacity else {
                continue;
            };
            if capacity == 0 {
                continue;
            }
            let fill = f64::from(program.current_participants) / f64::from(capacity);
            if fill < self.thresholds.fill_ratio {
                continue;
            }
            let key = NudgeKey {
                creator: creator.clone(),
                kind: NudgeKind::ProgramAlmostFull,
                program: Some(program.id.clone()),
            };
            if self.source.mark_nudged(&key)? {
                self.send(creator, almost_full_notification(creator, &program));
            }
        }

        Ok(())
    }

    fn send(&self, creator: &CreatorId, notification: Notification) {
        if let Err(err) = self.notifications.notify(notification) {
            warn!(creator = %creator.0, error = %err, "nudge delivery failed");
        }
    }
}

impl<S, N> NudgeTrigger for NudgeEngine<S, N>
where
    S: CreatorActivitySource + 'static,
    N: NotificationSink + 'static,
{
    fn evaluate(&self, creator: &CreatorId) {
        if let Err(err) = self.run(creator) {
            warn!(creator = %creator.0, error = %err, "nudge evaluation skipped");
        }
    }
}

fn paid_tier_notification(creator: &CreatorId, stats: &CreatorStats) -> Notification {
    let mut data = BTreeMap::new();
    data.insert(
        "published_programs".to_string(),
        stats.published_programs.to_string(),
    );
    data.insert(
        "total_participants".to_string(),
        stats.total_participants.to_string(),
    );
    Notification {
        recipient: creator.0.clone(),
        kind: NotificationKind::ReadyForPaidTier,
        title: "Ready for a paid program".to_string(),
        message: format!(
            "{} members joined your {} programs with an average rating of {:.1}. Consider publishing a paid program.",
            stats.total_participants, stats.published_programs, stats.average_rating
        ),
        data,
    }
}

fn almost_full_notification(creator: &CreatorId, program: &Program) -> Notification {
    let mut data = BTreeMap::new();
    data.insert("program_id".to_string(), program.id.0.clone());
    data.insert(
        "current_participants".to_string(),
        program.current_participants.to_string(),
    );
    if let Some(capacity) = program.capacity {
        data.insert("capacity".to_string(), capacity.to_string());
    }
    Notification {
        recipient: creator.0.clone(),
        kind: NotificationKind::ProgramAlmostFull,
        title: "Program almost full".to_string(),
        message: format!(
            "{} is at {} of {} seats. Consider raising capacity or opening a new date.",
            program.title,
            program.current_participants,
            program.capacity.unwrap_or(program.current_participants)
        ),
        data,
    }
}
