//! Per-peer protocol state machine (component E, §4.E).
//!
//! Connects to a peer, completes the handshake and bitfield exchange, then
//! repeatedly pulls a [`WorkItem`] from the coordinator's shared queue and
//! downloads the piece via a pipelined ("backlog") block-request window.
use super::{Bitfield, Handshake, Message, MessageId, PeerError, PeerResult};
use crate::peer::message::{parse_have, parse_piece};
use crate::tracker::Peer;
use sha1::{Digest, Sha1};
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio::sync::{Mutex, Notify};
use tokio::time::{timeout, Duration};
use tracing::{debug, info, instrument, warn};

const DIAL_TIMEOUT: Duration = Duration::from_secs(3);
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(3);
const BITFIELD_TIMEOUT: Duration = Duration::from_secs(5);
const PIECE_TIMEOUT: Duration = Duration::from_secs(30);

const MAX_BACKLOG: usize = 5;
const MAX_BLOCK_SIZE: usize = 16384;

/// One piece's worth of work to download: its index, expected size, and
/// expected SHA-1 hash (§3, "WorkItem").
#[derive(Debug, Clone)]
pub struct WorkItem {
    pub index: usize,
    pub expected_length: usize,
    pub expected_hash: [u8; 20],
}

/// A completed, integrity-checked piece ready for assembly.
#[derive(Debug)]
pub struct PieceResult {
    pub index: usize,
    pub data: Vec<u8>,
}

/// The coordinator's shared work queue: a deque guarded by a mutex, plus a
/// `Notify` to wake workers blocked on an empty queue after a re-enqueue
/// (§3.F / §9 "channel or deque with careful release"). Workers block
/// waiting for work rather than exiting on a transiently empty queue;
/// the coordinator closes the queue once every piece has been collected,
/// which is the sole shutdown signal for workers (§9 "Cancellation").
pub struct WorkQueue {
    items: Mutex<VecDeque<WorkItem>>,
    notify: Notify,
    closed: std::sync::atomic::AtomicBool,
}

impl WorkQueue {
    pub fn new(items: Vec<WorkItem>) -> Self {
        WorkQueue {
            items: Mutex::new(items.into()),
            notify: Notify::new(),
            closed: std::sync::atomic::AtomicBool::new(false),
        }
    }

    /// Pops the next item, or `None` once the queue has been closed and
    /// drained. Blocks (without busy-waiting) while the queue is merely
    /// empty but not yet closed.
    async fn pop(&self) -> Option<WorkItem> {
        loop {
            // Registered before the lock is dropped so a push/close that
            // happens between the check and the wait cannot be missed.
            let notified = self.notify.notified();
            {
                let mut items = self.items.lock().await;
                if let Some(item) = items.pop_front() {
                    return Some(item);
                }
                if self.closed.load(std::sync::atomic::Ordering::Acquire) {
                    return None;
                }
            }
            notified.await;
        }
    }

    pub async fn push(&self, item: WorkItem) {
        self.items.lock().await.push_back(item);
        self.notify.notify_one();
    }

    /// Signals that no further work will ever be pushed; every worker
    /// blocked in [`WorkQueue::pop`] wakes and observes `None`.
    pub fn close(&self) {
        self.closed.store(true, std::sync::atomic::Ordering::Release);
        self.notify.notify_waiters();
    }

    pub async fn is_empty(&self) -> bool {
        self.items.lock().await.is_empty()
    }
}

/// Re-enqueues its held [`WorkItem`] onto the queue when dropped unless
/// [`WorkGuard::defuse`] has already taken it, realizing the "scope-guarded
/// resource release" the design notes call for: every early return from the
/// piece loop (bitfield miss, I/O error, integrity failure) puts the item
/// back without needing a matching manual re-enqueue at each return site.
struct WorkGuard {
    queue: Arc<WorkQueue>,
    item: Option<WorkItem>,
}

impl WorkGuard {
    fn new(queue: Arc<WorkQueue>, item: WorkItem) -> Self {
        WorkGuard {
            queue,
            item: Some(item),
        }
    }

    /// Hands the item back by value, disarming the drop re-enqueue. Used
    /// once a piece completes successfully and is handed to the result
    /// channel instead of back to the queue.
    fn defuse(mut self) -> WorkItem {
        self.item.take().expect("WorkGuard defused twice")
    }

    fn item(&self) -> &WorkItem {
        self.item.as_ref().expect("WorkGuard item already taken")
    }
}

impl Drop for WorkGuard {
    fn drop(&mut self) {
        if let Some(item) = self.item.take() {
            // Dropping can happen outside an async context (e.g. during
            // unwinding), so the re-enqueue is spawned rather than awaited
            // in place. tokio::spawn needs 'static, hence the owned Arc.
            let queue = self.queue.clone();
            tokio::spawn(async move {
                queue.push(item).await;
            });
        }
    }
}

/// Per-piece download state: the credit window of in-flight block
/// requests plus the accumulated buffer (§9 "Pipelined requests").
struct PieceProgress {
    buf: Vec<u8>,
    requested: usize,
    downloaded: usize,
    backlog: usize,
}

impl PieceProgress {
    fn new(expected_length: usize) -> Self {
        PieceProgress {
            buf: vec![0u8; expected_length],
            requested: 0,
            downloaded: 0,
            backlog: 0,
        }
    }

    fn is_complete(&self) -> bool {
        self.downloaded == self.buf.len()
    }
}

/// An established, handshaken connection to a single peer, driving one
/// [`WorkItem`] at a time against the coordinator's shared queue.
pub struct PeerSession {
    stream: TcpStream,
    peer_addr: String,
    bitfield: Bitfield,
    choked: bool,
}

impl PeerSession {
    /// Dials, handshakes, and waits for the peer's first message, which
    /// must be a Bitfield (§4.E "Construction").
    #[instrument(level = "debug", skip(info_hash, peer_id), fields(peer = %peer))]
    pub async fn connect(peer: Peer, info_hash: [u8; 20], peer_id: [u8; 20]) -> PeerResult<Self> {
        let addr = peer.socket_addr().to_string();
        let mut stream = timeout(DIAL_TIMEOUT, TcpStream::connect(&addr))
            .await
            .map_err(|_| PeerError::HandshakeTimeout)??;

        timeout(
            HANDSHAKE_TIMEOUT,
            Handshake::perform(&mut stream, info_hash, peer_id),
        )
        .await
        .map_err(|_| PeerError::HandshakeTimeout)??;

        let first = timeout(BITFIELD_TIMEOUT, Message::read(&mut stream))
            .await
            .map_err(|_| PeerError::BitfieldTimeout)??;

        let bitfield = match first {
            Some(msg) if msg.id == MessageId::Bitfield => Bitfield::from_bytes(msg.payload.to_vec()),
            Some(msg) => return Err(PeerError::ExpectedBitfield(msg.id.to_string())),
            None => return Err(PeerError::ExpectedBitfield("KeepAlive".into())),
        };

        info!(peer = %peer, "connected and received bitfield");

        Ok(PeerSession {
            stream,
            peer_addr: addr,
            bitfield,
            choked: true,
        })
    }

    /// Sends Unchoke then Interested, the protocol-required opening moves
    /// even though this leecher never uploads (§4.E "Opening moves").
    async fn send_opening_moves(&mut self) -> PeerResult<()> {
        Message::write(&mut self.stream, Some(&Message::unchoke())).await?;
        Message::write(&mut self.stream, Some(&Message::interested())).await?;
        Ok(())
    }

    /// Drives the session against `queue`, publishing completed pieces to
    /// `results`, until the coordinator closes the queue (§9
    /// "Cancellation") or a terminal I/O/protocol error ends the
    /// connection (§7: integrity and missing-piece failures do not
    /// terminate the session, only I/O and protocol errors do).
    #[instrument(level = "debug", skip_all, fields(peer = %self.peer_addr))]
    pub async fn run(
        mut self,
        queue: Arc<WorkQueue>,
        results: tokio::sync::mpsc::UnboundedSender<PieceResult>,
    ) -> PeerResult<()> {
        self.send_opening_moves().await?;

        loop {
            let item = match queue.pop().await {
                Some(item) => item,
                None => {
                    debug!(peer = %self.peer_addr, "work queue empty, ending session");
                    return Ok(());
                }
            };

            let guard = WorkGuard::new(queue.clone(), item);
            match self.download_piece(guard.item()).await {
                Ok(Some(data)) => {
                    let index = guard.item().index;
                    let item = guard.defuse();
                    Message::write(&mut self.stream, Some(&Message::have(item.index as u32)))
                        .await?;
                    results
                        .send(PieceResult { index, data })
                        .map_err(|_| PeerError::Protocol("result channel closed".into()))?;
                }
                Ok(None) => {
                    // Bitfield miss or integrity failure: re-enqueue via
                    // the guard's Drop and keep this connection alive.
                    drop(guard);
                }
                Err(err) => {
                    // Guard re-enqueues on drop; the connection itself is
                    // done for, so propagate the error up to the caller.
                    drop(guard);
                    return Err(err);
                }
            }
        }
    }

    /// Attempts to download one piece. `Ok(None)` means "re-enqueue and
    /// keep going" (bitfield miss or failed integrity check, §4.E steps
    /// 1 and 3); `Err` means the connection itself failed.
    async fn download_piece(&mut self, item: &WorkItem) -> PeerResult<Option<Vec<u8>>> {
        if !self.bitfield.has_piece(item.index) {
            return Ok(None);
        }

        let mut progress = PieceProgress::new(item.expected_length);
        let deadline = timeout(PIECE_TIMEOUT, async {
            while !progress.is_complete() {
                self.fill_backlog(item, &mut progress).await?;
                self.read_and_dispatch(item, &mut progress).await?;
            }
            PeerResult::Ok(())
        });

        deadline.await.map_err(|_| PeerError::Io(std::io::Error::new(
            std::io::ErrorKind::TimedOut,
            "piece download deadline exceeded",
        )))??;

        if Sha1::digest(&progress.buf).as_slice() != item.expected_hash.as_slice() {
            let err = PeerError::IntegrityMismatch { index: item.index };
            warn!(index = item.index, %err, "piece failed integrity check, re-enqueueing");
            return Ok(None);
        }

        Ok(Some(progress.buf))
    }

    /// Issues Request messages until the backlog window or remaining
    /// length is exhausted (§4.E step 2, §9 "Pipelined requests").
    async fn fill_backlog(&mut self, item: &WorkItem, progress: &mut PieceProgress) -> PeerResult<()> {
        while !self.choked
            && progress.backlog < MAX_BACKLOG
            && progress.requested < item.expected_length
        {
            let block_size = MAX_BLOCK_SIZE.min(item.expected_length - progress.requested);
            let request = Message::request(
                item.index as u32,
                progress.requested as u32,
                block_size as u32,
            );
            Message::write(&mut self.stream, Some(&request)).await?;
            progress.backlog += 1;
            progress.requested += block_size;
        }
        Ok(())
    }

    /// Reads one message and updates session/piece state accordingly
    /// (§4.E step 2's dispatch table).
    async fn read_and_dispatch(
        &mut self,
        item: &WorkItem,
        progress: &mut PieceProgress,
    ) -> PeerResult<()> {
        let msg = Message::read(&mut self.stream).await?;
        let msg = match msg {
            Some(msg) => msg,
            None => return Ok(()), // keep-alive, ignored
        };

        match msg.id {
            MessageId::Unchoke => self.choked = false,
            MessageId::Choke => self.choked = true,
            MessageId::Have => {
                let index = parse_have(&msg)?;
                self.bitfield.set_piece(index as usize);
            }
            MessageId::Piece => {
                let parsed = parse_piece(&msg)?;
                if parsed.index as usize != item.index {
                    return Err(PeerError::Protocol(format!(
                        "piece index mismatch: expected {}, got {}",
                        item.index, parsed.index
                    )));
                }
                let begin = parsed.begin as usize;
                if begin >= item.expected_length || begin + parsed.data.len() > item.expected_length {
                    return Err(PeerError::Protocol(format!(
                        "piece block out of range: begin={begin}, len={}, expected_length={}",
                        parsed.data.len(),
                        item.expected_length
                    )));
                }
                progress.buf[begin..begin + parsed.data.len()].copy_from_slice(parsed.data);
                progress.downloaded += parsed.data.len();
                progress.backlog -= 1;
            }
            _ => {} // unknown ids and other messages are ignored (§4.E step 2)
        }
        Ok(())
    }
}
