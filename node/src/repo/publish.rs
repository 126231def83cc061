// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
use super::ContentRepo;
use crate::errors::EngineError;
use crate::telemetry;

impl ContentRepo {
    /// Publishes the current root when it differs from the one published last.
    ///
    /// Returns whether a root was published. A call made while another publish runs returns
    /// `Ok(false)` without doing anything.
    pub async fn publish_cycle(&self) -> Result<bool, EngineError> {
        let Some(_guard) = self.publishing.try_enter() else {
            tracing::trace!("Publish already running; skipping");
            return Ok(false);
        };

        self.save_section.execute(|| self.publish_root()).await
    }

    async fn publish_root(&self) -> Result<bool, EngineError> {
        let (current, last) = {
            let roots = self.roots();
            (roots.current.clone(), roots.last_published.clone())
        };
        if last.as_ref() == Some(&current) {
            return Ok(false);
        }

        tracing::trace!("Publishing root {}", current);
        match &last {
            Some(old) => self.store.pin_update(old, &current).await?,
            None => self.store.pin_add(&current).await?,
        }
        self.directory.set_own_root(&current).await?;

        self.roots().last_published = Some(current.clone());
        metrics::counter!(telemetry::ROOT_PUBLISHED, 1);
        tracing::info!("Published root {}", current);
        Ok(true)
    }
}
