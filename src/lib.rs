//! Push Immich photos to USB-attached TL LCD panels.
//!
//! One cycle looks like this:
//! - Resolve the target panels (explicit serials or the single attached one)
//! - For each panel, pick an asset (pinned, random for a person, or random)
//! - Fetch (or reuse) its thumbnail, crop it square and encode a JPEG
//! - Hand the JPEG to the vendor CLI, logging and moving on if it fails
//!
//! The binary in `main.rs` wires these modules to the command line.

pub mod cache;
pub mod config;
pub mod error;
pub mod immich;
pub mod panel;
pub mod pipeline;
pub mod render;
pub mod schedule;

#[cfg(test)]
pub(crate) mod testing;

pub use error::Error;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Edge length of the TL LCD in pixels.
pub const DEFAULT_SIZE: u32 = 400;

/// Largest `--size` accepted; bigger squares only waste memory.
pub const MAX_SIZE: u32 = 4096;

/// Assets requested from Immich when picking one at random.
pub const DEFAULT_TAKE: u32 = 1000;

// ── Targets ────────────────────────────────────────────────────────

/// How a panel's photo is chosen.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AssetSelection {
    /// Always show this asset id
    Pinned(String),
    /// Random asset featuring this person id
    Person(String),
    /// Random asset from the whole library
    Random,
}

/// A panel and how to pick its photo.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PanelTarget {
    pub serial: String,
    pub selection: AssetSelection,
}

/// Pair serials with asset ids and person ids by position.
///
/// Panel `i` shows asset id `i` when there is one, otherwise a random photo
/// of person `i`, otherwise any random photo. Extra asset or person ids
/// beyond the number of panels are ignored.
pub fn plan_targets(
    serials: &[String],
    asset_ids: &[String],
    person_ids: &[String],
) -> Vec<PanelTarget> {
    serials
        .iter()
        .enumerate()
        .map(|(index, serial)| {
            let pinned = asset_ids.get(index).filter(|id| !id.trim().is_empty());
            let person = person_ids.get(index).filter(|id| !id.trim().is_empty());
            let selection = match (pinned, person) {
                (Some(id), _) => AssetSelection::Pinned(id.trim().to_string()),
                (None, Some(person)) => AssetSelection::Person(person.trim().to_string()),
                (None, None) => AssetSelection::Random,
            };
            PanelTarget {
                serial: serial.clone(),
                selection,
            }
        })
        .collect()
}

// ── Shutdown ───────────────────────────────────────────────────────

/// Set up a Ctrl+C handler that sets the returned flag to false.
///
/// Only watch mode needs it; a failure to install the handler just means
/// Ctrl+C kills the process the default way.
pub fn setup_signal_handler() -> Arc<AtomicBool> {
    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();

    if let Err(e) = ctrlc::set_handler(move || {
        r.store(false, Ordering::SeqCst);
    }) {
        tracing::warn!("Could not install Ctrl+C handler: {}", e);
    }

    running
}

/// Check if watch mode should keep going.
pub fn is_running(running: &AtomicBool) -> bool {
    running.load(Ordering::SeqCst)
}
