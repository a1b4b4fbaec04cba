use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use super::prober::Prober;
use crate::friends::{
    load_entities, update_status, EntityError, FriendStatus, FrontmatterError, TrackedEntity,
    HIDE_THRESHOLD,
};

/// Errors that abort a check cycle.
///
/// Probe failures never appear here (an unreachable site is just "offline");
/// only listing and persistence failures stop the cycle.
#[derive(Debug, Error)]
pub enum CheckError {
    #[error("Failed to load friends: {0}")]
    Load(#[from] EntityError),

    #[error("Failed to persist status for friend '{friend}': {source}")]
    Persist {
        friend: String,
        #[source]
        source: FrontmatterError,
    },

    #[error("Status write task failed: {0}")]
    WriteTask(#[from] tokio::task::JoinError),
}

/// New persisted state for one friend after a probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    pub status: FriendStatus,
    pub failed_count: u32,
}

impl Decision {
    /// Whether the codec will write `hidden: true` for this decision.
    pub fn hides(&self) -> bool {
        self.failed_count >= HIDE_THRESHOLD
    }
}

/// Derives the next state from the current one and the probe result.
///
/// A live site resets to `active` with zero failures; a dead one becomes
/// `inactive` with one more failure than before.
pub fn decide(entity: &TrackedEntity, live: bool) -> Decision {
    if live {
        Decision {
            status: FriendStatus::Active,
            failed_count: 0,
        }
    } else {
        Decision {
            status: FriendStatus::Inactive,
            failed_count: entity.failed_count.saturating_add(1),
        }
    }
}

/// Tally of one check cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// Friends that were probed and written back
    pub checked: usize,
    /// Friends without a website
    pub skipped: usize,
    pub online: usize,
    pub offline: usize,
    /// Offline friends whose failure count is at or past the hide threshold
    pub hidden: usize,
}

/// Runs check cycles over a friends directory, one friend at a time.
///
/// Each probed friend is followed by a fixed pause so that neither the probed
/// sites nor the lookup service see bursts. Cycles must not overlap on the
/// same directory: document rewrites are not locked.
#[derive(Debug, Clone)]
pub struct StatusChecker {
    prober: Prober,
    friends_dir: PathBuf,
    pace: Duration,
}

impl StatusChecker {
    pub fn new(prober: Prober, friends_dir: impl Into<PathBuf>, pace: Duration) -> Self {
        Self {
            prober,
            friends_dir: friends_dir.into(),
            pace,
        }
    }

    /// Lists the friends directory and checks every friend in it.
    ///
    /// # Errors
    ///
    /// Returns [`CheckError::Load`] if the directory cannot be read and
    /// [`CheckError::Persist`] as soon as one document cannot be rewritten;
    /// friends after that one are not checked.
    pub async fn run_check_cycle(&self) -> Result<CycleReport, CheckError> {
        let result = match load_entities(&self.friends_dir).await {
            Ok(entities) => self.check_entities(&entities).await,
            Err(e) => Err(e.into()),
        };

        if let Err(e) = &result {
            tracing::error!(
                dir = %self.friends_dir.display(),
                error = %e,
                "Friend status check cycle aborted"
            );
        }
        result
    }

    /// Checks an explicit list of friends in order.
    pub async fn check_entities(
        &self,
        entities: &[TrackedEntity],
    ) -> Result<CycleReport, CheckError> {
        let mut report = CycleReport::default();

        for entity in entities {
            let Some(website) = entity.website.as_deref() else {
                tracing::info!(friend = %entity.name, "Skipping friend without website");
                report.skipped += 1;
                continue;
            };

            tracing::info!(friend = %entity.name, url = %website, "Checking friend");
            let live = self.prober.probe(website).await;
            let decision = decide(entity, live);

            let path = entity.path.clone();
            tokio::task::spawn_blocking(move || {
                update_status(&path, decision.status, Some(decision.failed_count))
            })
            .await?
            .map_err(|source| CheckError::Persist {
                friend: entity.id.clone(),
                source,
            })?;
            report.checked += 1;

            if live {
                report.online += 1;
                if entity.status == FriendStatus::Inactive {
                    tracing::info!(friend = %entity.name, "Friend is back online");
                } else {
                    tracing::info!(friend = %entity.name, "Friend is online");
                }
            } else {
                report.offline += 1;
                if decision.hides() {
                    report.hidden += 1;
                    tracing::warn!(
                        friend = %entity.name,
                        failures = decision.failed_count,
                        "Friend is offline, hidden"
                    );
                } else {
                    tracing::warn!(
                        friend = %entity.name,
                        failures = decision.failed_count,
                        "Friend is offline"
                    );
                }
            }

            if !self.pace.is_zero() {
                tokio::time::sleep(self.pace).await;
            }
        }

        Ok(report)
    }
}
