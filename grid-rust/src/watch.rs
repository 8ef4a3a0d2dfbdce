//! Filesystem watch on the config file, bridged into the control loop.
//!
//! The touch UI rewrites the file in place or via rename, so the watch
//! covers the parent directory and filters for the target path. Events are
//! coalesced by the receiver; the loop only cares that "something changed".

use std::path::PathBuf;

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tracing::warn;

/// Start watching `path`. The returned watcher must be kept alive for the
/// events to keep flowing.
pub fn spawn(path: PathBuf) -> notify::Result<(RecommendedWatcher, mpsc::Receiver<()>)> {
    let (tx, rx) = mpsc::channel(8);
    let target = path.clone();

    let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| match res {
        Ok(event) => {
            let relevant = matches!(
                event.kind,
                EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
            );
            if relevant && event.paths.iter().any(|p| p == &target) {
                // Full channel just means an event is already pending.
                let _ = tx.try_send(());
            }
        }
        Err(e) => warn!("config watch error: {e}"),
    })?;

    let dir = path
        .parent()
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."));
    watcher.watch(&dir, RecursiveMode::NonRecursive)?;

    Ok((watcher, rx))
}
