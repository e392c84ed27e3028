//! Cross-process change notification for the local vault.
//!
//! The browser's storage event fires in sibling tabs when one tab writes;
//! the file-backed vault gets the same property from a filesystem watcher
//! on the vault directory. The writer's own events are not filtered here
//! — the sync engine's echo-suppression window swallows them.

use std::path::Path;
use std::sync::mpsc as std_mpsc;

use anyhow::Result;
use notify::{Event, RecursiveMode, Watcher};
use tokio::sync::mpsc;

/// A vault key whose backing file changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VaultEvent {
    pub key: String,
}

/// Async watcher over a vault directory.
///
/// Uses `std::sync::mpsc` internally (the notify callback runs on an OS
/// thread) with an async bridge to a `tokio::sync::mpsc` channel for the
/// consumer.
pub struct VaultWatcher {
    _watcher: notify::RecommendedWatcher,
    pub rx: mpsc::Receiver<VaultEvent>,
    _bridge_handle: tokio::task::JoinHandle<()>,
}

impl VaultWatcher {
    /// Watch the given vault root for key changes.
    pub fn new(root: &Path) -> Result<Self> {
        let (std_tx, std_rx) = std_mpsc::channel::<VaultEvent>();
        let (tokio_tx, tokio_rx) = mpsc::channel::<VaultEvent>(256);

        let mut watcher = notify::recommended_watcher(
            move |res: std::result::Result<Event, notify::Error>| {
                let event = match res {
                    Ok(e) => e,
                    Err(_) => return,
                };

                for path in &event.paths {
                    if path.extension().map(|e| e == "json").unwrap_or(false) {
                        if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                            let _ = std_tx.send(VaultEvent {
                                key: stem.to_string(),
                            });
                        }
                    }
                }
            },
        )?;

        watcher.watch(root, RecursiveMode::NonRecursive)?;

        // Bridge: poll the std receiver and forward into the async channel.
        let bridge_handle = tokio::spawn(async move {
            loop {
                match std_rx.try_recv() {
                    Ok(evt) => {
                        if tokio_tx.send(evt).await.is_err() {
                            break; // Consumer dropped
                        }
                    }
                    Err(std_mpsc::TryRecvError::Empty) => {
                        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
                    }
                    Err(std_mpsc::TryRecvError::Disconnected) => {
                        break; // Watcher dropped
                    }
                }
            }
        });

        Ok(Self {
            _watcher: watcher,
            rx: tokio_rx,
            _bridge_handle: bridge_handle,
        })
    }
}
