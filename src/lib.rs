//! Library root for rs-torrent-client.
//!
//! Modules: the bencode codec, metainfo/tracker/peer-wire protocol layers,
//! the download coordinator, peer identity, and CLI configuration.
pub mod bencode;
pub mod config;
pub mod coordinator;
pub mod identity;
pub mod peer;
pub mod torrent;
pub mod tracker;
