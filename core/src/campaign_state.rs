//! Campaign status transitions. One place that knows the full state graph
//! so the control-plane action handlers (`schedule`, `send`, `pause`,
//! `resume`, `cancel`, `duplicate`) and the scheduler's sweeps agree on
//! what's legal.
//!
//! ```text
//! draft  ──schedule──▶  scheduled  ──sweeper/sendNow──▶  queued
//!   │                        │                             │
//!   └──sendNow──────────────▶└──cancel──▶ cancelled        ▼
//!                                                      sending ◀──resume── paused
//!                                                         │          ▲        │
//!                                                         │          └─pause──┘
//!                                                         ▼
//!                                                       sent  (or failed on fatal dispatcher error)
//! ```
//! Cancel is reachable from `{scheduled, queued, sending, paused}`. Editing
//! campaign content/selectors/schedule is only permitted in `{draft,
//! scheduled}`.

use entity::enums::CampaignStatus;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransitionError {
    #[error("cannot {action} a campaign in status {from:?}")]
    Illegal { action: &'static str, from: CampaignStatus },
}

pub fn can_edit(status: CampaignStatus) -> bool {
    matches!(status, CampaignStatus::Draft | CampaignStatus::Scheduled)
}

/// `draft -> scheduled`.
pub fn schedule(status: CampaignStatus) -> Result<CampaignStatus, TransitionError> {
    match status {
        CampaignStatus::Draft => Ok(CampaignStatus::Scheduled),
        from => Err(TransitionError::Illegal { action: "schedule", from }),
    }
}

/// `{draft, scheduled} -> queued`, the send-now action.
pub fn send_now(status: CampaignStatus) -> Result<CampaignStatus, TransitionError> {
    match status {
        CampaignStatus::Draft | CampaignStatus::Scheduled => Ok(CampaignStatus::Queued),
        from => Err(TransitionError::Illegal { action: "send", from }),
    }
}

/// `sending -> paused`.
pub fn pause(status: CampaignStatus) -> Result<CampaignStatus, TransitionError> {
    match status {
        CampaignStatus::Sending => Ok(CampaignStatus::Paused),
        from => Err(TransitionError::Illegal { action: "pause", from }),
    }
}

/// `paused -> sending`.
pub fn resume(status: CampaignStatus) -> Result<CampaignStatus, TransitionError> {
    match status {
        CampaignStatus::Paused => Ok(CampaignStatus::Sending),
        from => Err(TransitionError::Illegal { action: "resume", from }),
    }
}

/// `{scheduled, queued, sending, paused} -> cancelled`.
pub fn cancel(status: CampaignStatus) -> Result<CampaignStatus, TransitionError> {
    match status {
        CampaignStatus::Scheduled
        | CampaignStatus::Queued
        | CampaignStatus::Sending
        | CampaignStatus::Paused => Ok(CampaignStatus::Cancelled),
        from => Err(TransitionError::Illegal { action: "cancel", from }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn draft_can_schedule_or_send_now() {
        assert_eq!(schedule(CampaignStatus::Draft).unwrap(), CampaignStatus::Scheduled);
        assert_eq!(send_now(CampaignStatus::Draft).unwrap(), CampaignStatus::Queued);
    }

    #[test]
    fn sent_campaign_rejects_every_transition() {
        assert!(schedule(CampaignStatus::Sent).is_err());
        assert!(send_now(CampaignStatus::Sent).is_err());
        assert!(pause(CampaignStatus::Sent).is_err());
        assert!(resume(CampaignStatus::Sent).is_err());
        assert!(cancel(CampaignStatus::Sent).is_err());
    }

    #[test]
    fn cancel_reachable_from_four_statuses() {
        for status in [
            CampaignStatus::Scheduled,
            CampaignStatus::Queued,
            CampaignStatus::Sending,
            CampaignStatus::Paused,
        ] {
            assert_eq!(cancel(status).unwrap(), CampaignStatus::Cancelled);
        }
        assert!(cancel(CampaignStatus::Draft).is_err());
    }

    #[test]
    fn only_draft_and_scheduled_are_editable() {
        assert!(can_edit(CampaignStatus::Draft));
        assert!(can_edit(CampaignStatus::Scheduled));
        assert!(!can_edit(CampaignStatus::Queued));
        assert!(!can_edit(CampaignStatus::Sending));
    }
}
