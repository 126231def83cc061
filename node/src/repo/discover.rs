// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
use chrono::Utc;
use futures::future::join_all;
use ocstore_kernel::NodeIndex;

use super::ContentRepo;
use crate::errors::EngineError;

/// Outcome of one discover-and-harvest cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiscoverReport {
    /// True when another cycle was already running and this one did nothing.
    pub skipped: bool,
    pub trees: usize,
    pub inserted: usize,
    pub failed: Vec<NodeIndex>,
}

impl ContentRepo {
    /// Fetches the roots updated since the last complete cycle and harvests each tree.
    ///
    /// The retrieval time only moves forward when every tree was harvested, so a failed peer is
    /// asked for again on the next cycle.
    pub async fn discover_cycle(&self) -> Result<DiscoverReport, EngineError> {
        let Some(_guard) = self.discovering.try_enter() else {
            tracing::trace!("Discover already running; skipping");
            return Ok(DiscoverReport {
                skipped: true,
                ..Default::default()
            });
        };

        let reference = Utc::now();
        let updated_since = self
            .db
            .app_state()
            .last_roots_retrieval
            .map(|at| at - self.directory_time_delay);

        tracing::trace!("Discovering roots updated since {:?}", updated_since);
        let roots = self.directory.get_all_roots(updated_since).await?;

        let harvests = roots.iter().map(|(peer, record)| async move {
            let result = if *peer == self.node {
                self.local_section
                    .execute(|| self.harvest_tree(*peer, &record.address, reference))
                    .await
            } else {
                self.harvest_tree(*peer, &record.address, reference).await
            };
            (*peer, result)
        });

        let mut report = DiscoverReport {
            trees: roots.len(),
            ..Default::default()
        };
        for (peer, result) in join_all(harvests).await {
            match result {
                Ok(n) => report.inserted += n,
                Err(e) => {
                    tracing::error!("Harvest of node {} failed: {}", peer, e);
                    report.failed.push(peer);
                }
            }
        }

        if report.failed.is_empty() {
            self.db.set_last_roots_retrieval(reference)?;
        }
        Ok(report)
    }
}
