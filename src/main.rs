//! Entry point: load metainfo (B), announce to the tracker (C), run the
//! download coordinator (F), and write the assembled buffer to disk (the
//! output sink, modeled in §1 as an external collaborator).
use anyhow::{Context, Result};
use rs_torrent_client::config::Args;
use rs_torrent_client::identity::generate_peer_id;
use rs_torrent_client::torrent::TorrentFile;
use rs_torrent_client::tracker::TrackerClient;
use rs_torrent_client::coordinator;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args = Args::parse_args();

    let torrent = TorrentFile::load(&args.torrent_path)
        .with_context(|| format!("loading torrent file {}", args.torrent_path.display()))?;
    tracing::info!(
        name = %torrent.name,
        info_hash = %hex::encode(torrent.info_hash),
        pieces = torrent.num_pieces(),
        length = torrent.length,
        "loaded torrent"
    );

    let peer_id = generate_peer_id();
    let tracker = TrackerClient::new().context("building tracker HTTP client")?;
    let announce = tracker
        .announce(&torrent, peer_id, args.port)
        .await
        .context("announcing to tracker")?;
    tracing::info!(peer_count = announce.peers.len(), "tracker returned peers");

    let torrent = Arc::new(torrent);
    let buf = coordinator::download(
        torrent.clone(),
        announce.peers,
        torrent.info_hash,
        peer_id,
    )
    .await
    .context("downloading torrent")?;

    let output_path = args.output.unwrap_or_else(|| torrent.name.clone().into());
    std::fs::write(&output_path, &buf)
        .with_context(|| format!("writing output file {}", output_path.display()))?;
    tracing::info!(path = %output_path.display(), bytes = buf.len(), "download complete");

    Ok(())
}
