use std::collections::HashSet;

use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::error::InputError;
use crate::range::Zone;
use crate::walker::WorkItem;

/// Reads one zone per line from `reader` and queues each distinct zone
/// once. Returns how many were queued.
///
/// Stops early, without error, if the walker has gone away.
pub async fn feed_seeds<R>(reader: R, seeds: &mpsc::Sender<WorkItem>) -> Result<usize, InputError>
where
    R: AsyncBufRead + Unpin,
{
    let mut seen = HashSet::new();
    let mut lines = reader.lines();
    let mut queued = 0;

    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let zone = match Zone::new(line) {
            Ok(zone) => zone,
            Err(e) => {
                warn!("skipping input: {e}");
                continue;
            }
        };
        if !seen.insert(zone.name().to_owned()) {
            debug!(zone = %zone, "duplicate input");
            continue;
        }
        if seeds.send(WorkItem::start(zone)).await.is_err() {
            break;
        }
        queued += 1;
    }

    Ok(queued)
}
