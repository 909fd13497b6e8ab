//! Per-run dispatch accounting.
//!
//! Every batch attempt is recorded instead of silently dropped, and the
//! aggregate picks the terminal campaign status at the end of the run.

use crate::store::types::CampaignStatus;

/// What happened to one batch.
#[derive(Debug)]
pub enum BatchResult {
    Published { batch_id: String, recipients: usize },
    Failed { reason: String },
}

/// Aggregated result of one dispatch run.
#[derive(Debug, Default)]
pub struct DispatchOutcome {
    pub campaign_id: i64,
    pub pages_fetched: u64,
    pub subscribers_seen: u64,
    pub subscribers_skipped: u64,
    pub batches: Vec<BatchResult>,
    /// Set when a page fetch failed and the run was cut short.
    pub fetch_aborted: bool,
}

impl DispatchOutcome {
    pub fn new(campaign_id: i64) -> Self {
        DispatchOutcome {
            campaign_id,
            ..Default::default()
        }
    }

    pub fn batches_published(&self) -> usize {
        self.batches
            .iter()
            .filter(|b| matches!(b, BatchResult::Published { .. }))
            .count()
    }

    pub fn batches_failed(&self) -> usize {
        self.batches
            .iter()
            .filter(|b| matches!(b, BatchResult::Failed { .. }))
            .count()
    }

    /// Terminal status for the campaign:
    /// - a clean run (zero recipients included) is `Sent`;
    /// - a run that published something but lost batches or was cut short
    ///   is `PartiallySent`;
    /// - a run that published nothing despite failures is `Failed`.
    pub fn terminal_status(&self) -> CampaignStatus {
        let clean = self.batches_failed() == 0 && !self.fetch_aborted;
        if clean {
            CampaignStatus::Sent
        } else if self.batches_published() > 0 {
            CampaignStatus::PartiallySent
        } else {
            CampaignStatus::Failed
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn published() -> BatchResult {
        BatchResult::Published {
            batch_id: "b".to_string(),
            recipients: 50,
        }
    }

    fn failed() -> BatchResult {
        BatchResult::Failed {
            reason: "publish error".to_string(),
        }
    }

    #[test]
    fn test_clean_run_is_sent() {
        let mut outcome = DispatchOutcome::new(1);
        outcome.batches.push(published());
        assert_eq!(outcome.terminal_status(), CampaignStatus::Sent);
    }

    #[test]
    fn test_empty_run_is_sent() {
        let outcome = DispatchOutcome::new(1);
        assert_eq!(outcome.terminal_status(), CampaignStatus::Sent);
    }

    #[test]
    fn test_mixed_run_is_partially_sent() {
        let mut outcome = DispatchOutcome::new(1);
        outcome.batches.push(published());
        outcome.batches.push(failed());
        assert_eq!(outcome.terminal_status(), CampaignStatus::PartiallySent);
    }

    #[test]
    fn test_aborted_after_publishing_is_partially_sent() {
        let mut outcome = DispatchOutcome::new(1);
        outcome.batches.push(published());
        outcome.fetch_aborted = true;
        assert_eq!(outcome.terminal_status(), CampaignStatus::PartiallySent);
    }

    #[test]
    fn test_total_failure_is_failed() {
        let mut outcome = DispatchOutcome::new(1);
        outcome.batches.push(failed());
        assert_eq!(outcome.terminal_status(), CampaignStatus::Failed);
    }

    #[test]
    fn test_aborted_before_publishing_is_failed() {
        let mut outcome = DispatchOutcome::new(1);
        outcome.fetch_aborted = true;
        assert_eq!(outcome.terminal_status(), CampaignStatus::Failed);
    }
}
