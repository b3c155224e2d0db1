//! One display cycle: every panel, in order, gets brightness and a photo.
//!
//! Panels are independent. Whatever goes wrong for one panel is logged and
//! recorded in the [`CycleReport`]; the next panel is still processed.

use crate::cache::ThumbnailCache;
use crate::error::Error;
use crate::immich::ImmichClient;
use crate::panel::PanelDriver;
use crate::render;
use crate::schedule::BrightnessSchedule;
use crate::{AssetSelection, PanelTarget};

/// What to do to every panel this cycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CyclePlan {
    /// Brightness to set before pushing, if any
    pub brightness: Option<u8>,
    /// False during scheduled quiet hours: only brightness is applied
    pub show_photo: bool,
}

impl CyclePlan {
    /// A schedule, when present, decides both values; otherwise the fixed
    /// brightness (if any) is applied and a photo is always pushed.
    pub fn new(brightness: Option<u8>, schedule: Option<&BrightnessSchedule>) -> Self {
        match schedule {
            Some(schedule) => {
                let slot = schedule.current_slot();
                Self {
                    brightness: Some(slot.brightness),
                    show_photo: slot.show_photo,
                }
            }
            None => Self {
                brightness,
                show_photo: true,
            },
        }
    }
}

impl Default for CyclePlan {
    fn default() -> Self {
        Self {
            brightness: None,
            show_photo: true,
        }
    }
}

/// Result of the photo step for one panel.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PanelOutcome {
    Pushed { asset_id: String },
    /// Quiet hours; nothing was sent
    Skipped,
    Failed { error: String },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PanelReport {
    pub serial: String,
    /// Brightness failures are reported but do not fail the panel
    pub brightness_error: Option<String>,
    pub outcome: PanelOutcome,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub panels: Vec<PanelReport>,
}

impl CycleReport {
    pub fn failures(&self) -> usize {
        self.panels
            .iter()
            .filter(|p| matches!(p.outcome, PanelOutcome::Failed { .. }))
            .count()
    }

    pub fn is_success(&self) -> bool {
        self.failures() == 0
    }
}

/// Everything a cycle needs: the Immich client, the panel driver, the
/// optional thumbnail cache and the output size.
pub struct Pipeline<D> {
    client: ImmichClient,
    driver: D,
    cache: Option<ThumbnailCache>,
    size: u32,
}

impl<D: PanelDriver> Pipeline<D> {
    pub fn new(client: ImmichClient, driver: D, size: u32) -> Self {
        Self {
            client,
            driver,
            cache: None,
            size,
        }
    }

    #[must_use]
    pub fn with_cache(mut self, cache: ThumbnailCache) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn driver(&self) -> &D {
        &self.driver
    }

    /// Turn a selection into a concrete asset id.
    pub async fn resolve_asset(&self, selection: &AssetSelection) -> Result<String, Error> {
        match selection {
            AssetSelection::Pinned(id) => Ok(id.clone()),
            AssetSelection::Person(person) => self.client.random_asset_id(Some(person.as_str())).await,
            AssetSelection::Random => self.client.random_asset_id(None).await,
        }
    }

    /// Square JPEG for `asset_id`, rendered from the cached thumbnail when
    /// there is one. A cached file that no longer decodes counts as a miss.
    pub async fn render_asset(&self, asset_id: &str) -> Result<Vec<u8>, Error> {
        if let Some(bytes) = self.cache.as_ref().and_then(|c| c.get(asset_id)) {
            match render::square_jpeg(&bytes, self.size) {
                Ok(jpeg) => {
                    tracing::debug!("Reusing cached thumbnail for {}", asset_id);
                    return Ok(jpeg);
                }
                Err(e) => {
                    tracing::warn!("Discarding unreadable cached thumbnail {}: {}", asset_id, e);
                }
            }
        }

        let bytes = self.client.download_thumbnail(asset_id).await?;
        let jpeg = render::square_jpeg(&bytes, self.size)?;

        if let Some(cache) = &self.cache {
            if let Err(e) = cache.put(asset_id, &bytes) {
                tracing::warn!(
                    "Could not cache thumbnail {} in {}: {}",
                    asset_id,
                    cache.dir().display(),
                    e
                );
            }
        }
        Ok(jpeg)
    }

    /// Pick, fetch, encode and send a photo to one panel.
    pub async fn push_photo(&self, target: &PanelTarget) -> Result<String, Error> {
        let asset_id = self.resolve_asset(&target.selection).await?;
        let jpeg = self.render_asset(&asset_id).await?;
        self.driver.send_jpeg(&target.serial, &jpeg).await?;
        Ok(asset_id)
    }

    /// Process every panel in the order given.
    pub async fn run_cycle(&self, targets: &[PanelTarget], plan: CyclePlan) -> CycleReport {
        let mut report = CycleReport::default();

        for target in targets {
            let brightness_error = match plan.brightness {
                Some(level) => match self.driver.set_brightness(&target.serial, level).await {
                    Ok(()) => {
                        tracing::info!("Set LCD {} brightness to {}", target.serial, level);
                        None
                    }
                    Err(e) => {
                        tracing::warn!("Failed to set brightness on LCD {}: {}", target.serial, e);
                        Some(e.to_string())
                    }
                },
                None => None,
            };

            let outcome = if !plan.show_photo {
                tracing::info!("Quiet hours; not pushing a photo to LCD {}", target.serial);
                PanelOutcome::Skipped
            } else {
                match self.push_photo(target).await {
                    Ok(asset_id) => {
                        tracing::info!(
                            "Pushed asset {} to LCD {} at {}x{}",
                            asset_id,
                            target.serial,
                            self.size,
                            self.size
                        );
                        PanelOutcome::Pushed { asset_id }
                    }
                    Err(e) => {
                        tracing::error!("Failed to update LCD {}: {}", target.serial, e);
                        PanelOutcome::Failed {
                            error: e.to_string(),
                        }
                    }
                }
            };

            report.panels.push(PanelReport {
                serial: target.serial.clone(),
                brightness_error,
                outcome,
            });
        }

        report
    }
}
