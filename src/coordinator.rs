//! Download coordinator (component F, §4.F).
//!
//! Seeds the shared work queue with one [`WorkItem`] per piece, spawns one
//! worker per peer, and collects [`PieceResult`]s until every piece has
//! been assembled into the owned output buffer. Workers never see or
//! touch the output buffer directly (§9 "Per-piece buffers as owned byte
//! runs") — only the coordinator copies a finished piece into place.
use crate::peer::{PeerSession, PieceResult, WorkItem};
use crate::torrent::TorrentFile;
use crate::tracker::Peer;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::peer::session::WorkQueue;

#[derive(Debug, Error)]
pub enum CoordinatorError {
    #[error("no peers were returned by the tracker")]
    NoPeers,

    #[error("result channel closed before every piece was collected")]
    ResultChannelClosed,
}

pub type CoordinatorResult<T> = std::result::Result<T, CoordinatorError>;

fn build_work_items(torrent: &TorrentFile) -> Vec<WorkItem> {
    (0..torrent.num_pieces())
        .map(|index| WorkItem {
            index,
            expected_length: torrent.piece_size(index) as usize,
            expected_hash: torrent.piece_hashes[index],
        })
        .collect()
}

/// Drives the whole-file download: seeds the queue, fans peers out over
/// it, and assembles the verified pieces into a single buffer (§4.F).
///
/// Returns once every piece has been collected. If every worker exits
/// (peer disconnects, protocol errors, bitfield mismatches exhausted)
/// before the piece set is complete, this call hangs forever — a
/// documented limitation carried over unchanged from the source (§9,
/// Open Question 1): the coordinator never re-queries the tracker or
/// retries with a fresh peer set.
pub async fn download(
    torrent: Arc<TorrentFile>,
    peers: Vec<Peer>,
    info_hash: [u8; 20],
    peer_id: [u8; 20],
) -> CoordinatorResult<Vec<u8>> {
    if peers.is_empty() {
        return Err(CoordinatorError::NoPeers);
    }

    let total_pieces = torrent.num_pieces();
    let queue = Arc::new(WorkQueue::new(build_work_items(&torrent)));
    let (tx, mut rx) = mpsc::unbounded_channel::<PieceResult>();

    let active_workers = Arc::new(AtomicUsize::new(peers.len()));
    for peer in peers {
        let queue = queue.clone();
        let tx = tx.clone();
        let active_workers = active_workers.clone();
        tokio::spawn(async move {
            let result = match PeerSession::connect(peer, info_hash, peer_id).await {
                Ok(session) => session.run(queue, tx).await,
                Err(err) => Err(err),
            };
            if let Err(err) = result {
                warn!(%peer, error = %err, "peer session ended");
            }
            active_workers.fetch_sub(1, Ordering::SeqCst);
        });
    }
    // Drop the coordinator's own sender so `rx.recv()` returns `None` once
    // every spawned worker's clone has also been dropped, rather than
    // hanging on a sender the coordinator itself still holds.
    drop(tx);

    let mut buf = vec![0u8; torrent.length as usize];
    let mut collected = 0usize;

    while collected < total_pieces {
        let result = match rx.recv().await {
            Some(result) => result,
            None => return Err(CoordinatorError::ResultChannelClosed),
        };

        let (begin, end) = torrent.bounds_for_piece(result.index);
        debug_assert_eq!(end - begin, result.data.len());
        buf[begin..end].copy_from_slice(&result.data);
        collected += 1;

        let percent = (collected * 100) / total_pieces;
        let workers = active_workers.load(Ordering::SeqCst);
        info!(
            percent,
            piece_index = result.index,
            active_workers = workers,
            "({percent}%) downloaded piece #{index} from {workers} active workers",
            index = result.index,
        );
    }

    queue.close();
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_torrent() -> TorrentFile {
        TorrentFile {
            announce: "http://tracker.test/announce".into(),
            info_hash: [1u8; 20],
            piece_hashes: vec![[0u8; 20], [1u8; 20], [2u8; 20]],
            piece_length: 16384,
            length: 40000,
            name: "file.bin".into(),
        }
    }

    #[test]
    fn build_work_items_sizes_last_piece_correctly() {
        let torrent = sample_torrent();
        let items = build_work_items(&torrent);
        assert_eq!(items.len(), 3);
        assert_eq!(items[0].expected_length, 16384);
        assert_eq!(items[1].expected_length, 16384);
        assert_eq!(items[2].expected_length, 40000 - 2 * 16384);
    }

    #[tokio::test]
    async fn download_rejects_empty_peer_list() {
        let torrent = Arc::new(sample_torrent());
        let err = download(torrent, vec![], [0u8; 20], [0u8; 20])
            .await
            .unwrap_err();
        assert!(matches!(err, CoordinatorError::NoPeers));
    }
}
