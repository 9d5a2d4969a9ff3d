//! Sync configuration: squash thresholds, payload caps, watchdog timeouts.
//!
//! Thresholds are configuration inputs rather than constants baked into the
//! commit type because they differ by document kind and deployment tier.

use std::time::Duration;

/// Deployment tier the controller is running in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeploymentTier {
    Dev,
    Staging,
    Prod,
}

/// Kind of document being synchronized.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    Text,
    Spreadsheet,
}

/// Bounded wait for the first transport connection after controller
/// initialization. On expiry the editor is shown anyway so the user is never
/// stuck on a blank screen.
pub const INITIAL_CONNECT_TIMEOUT: Duration = Duration::from_secs(15);

/// Bounded wait for the first realtime sync after the transport connects.
/// On expiry the realtime channel is treated as ready (degraded mode).
pub const INITIAL_SYNC_TIMEOUT: Duration = Duration::from_secs(1);

/// Configuration for a single document sync session.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub tier: DeploymentTier,
    /// Hard cap on a single outbound update's content length, in bytes.
    /// Updates above this are refused before they reach the transport.
    pub max_update_bytes: usize,
    pub initial_connect_timeout: Duration,
    pub initial_sync_timeout: Duration,
}

impl SyncConfig {
    /// Build the configuration for a deployment tier.
    pub fn for_tier(tier: DeploymentTier) -> Self {
        Self {
            tier,
            max_update_bytes: 2 * 1024 * 1024,
            initial_connect_timeout: INITIAL_CONNECT_TIMEOUT,
            initial_sync_timeout: INITIAL_SYNC_TIMEOUT,
        }
    }

    /// Number of updates a commit may hold before it needs squashing.
    pub fn squash_threshold(&self, kind: DocumentKind) -> usize {
        match (self.tier, kind) {
            (DeploymentTier::Dev, DocumentKind::Text) => 50,
            (DeploymentTier::Dev, DocumentKind::Spreadsheet) => 25,
            (_, DocumentKind::Text) => 500,
            (_, DocumentKind::Spreadsheet) => 250,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dev_thresholds_are_lower_than_prod() {
        let dev = SyncConfig::for_tier(DeploymentTier::Dev);
        let prod = SyncConfig::for_tier(DeploymentTier::Prod);
        assert!(
            dev.squash_threshold(DocumentKind::Text) < prod.squash_threshold(DocumentKind::Text)
        );
        assert!(
            dev.squash_threshold(DocumentKind::Spreadsheet)
                < prod.squash_threshold(DocumentKind::Spreadsheet)
        );
    }

    #[test]
    fn spreadsheet_threshold_differs_from_text() {
        let cfg = SyncConfig::for_tier(DeploymentTier::Prod);
        assert_ne!(
            cfg.squash_threshold(DocumentKind::Text),
            cfg.squash_threshold(DocumentKind::Spreadsheet)
        );
    }
}
