//! Binary persistence for the chain fragment and the peer address book:
//! a varint count followed by wire-format entries, written through a
//! sibling temp file and an atomic rename.

use std::fs;
use std::io::Write;
use std::path::Path;

use santitham_network::NetAddr;
use santitham_primitives::block::Block;
use santitham_primitives::encoding::{Decoder, Encoder};

pub fn load_blocks(path: &Path) -> Result<Vec<Block>, String> {
    let data = match fs::read(path) {
        Ok(data) => data,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(err) => return Err(format!("failed to read {}: {err}", path.display())),
    };

    let mut decoder = Decoder::new(&data);
    let count = decoder
        .read_varint()
        .map_err(|err| format!("failed to decode block count in {}: {err}", path.display()))?;
    let count = usize::try_from(count)
        .map_err(|_| format!("block count out of range in {}", path.display()))?;

    let mut blocks = Vec::with_capacity(count.min(4096));
    for _ in 0..count {
        let block = Block::consensus_decode_from(&mut decoder)
            .map_err(|err| format!("corrupt block data in {}: {err}", path.display()))?;
        blocks.push(block);
    }
    Ok(blocks)
}

pub fn save_blocks(path: &Path, blocks: &[Block]) -> Result<(), String> {
    if blocks.is_empty() {
        return Ok(());
    }
    let mut encoder = Encoder::new();
    encoder.write_varint(blocks.len() as u64);
    for block in blocks {
        block.consensus_encode_to(&mut encoder);
    }
    write_file_atomic(path, &encoder.into_inner())
}

pub fn load_peers(path: &Path) -> Result<Vec<NetAddr>, String> {
    let data = match fs::read(path) {
        Ok(data) => data,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(err) => return Err(format!("failed to read {}: {err}", path.display())),
    };

    let mut decoder = Decoder::new(&data);
    let count = decoder
        .read_varint()
        .map_err(|err| format!("failed to decode peer count in {}: {err}", path.display()))?;

    let mut peers = Vec::with_capacity(count.min(4096) as usize);
    for _ in 0..count {
        let addr = NetAddr::decode_from(&mut decoder)
            .map_err(|err| format!("corrupt peer data in {}: {err}", path.display()))?;
        peers.push(addr);
    }
    Ok(peers)
}

pub fn save_peers(path: &Path, peers: &[NetAddr]) -> Result<(), String> {
    if peers.is_empty() {
        return Ok(());
    }
    let mut encoder = Encoder::new();
    encoder.write_varint(peers.len() as u64);
    for addr in peers {
        addr.encode_to(&mut encoder);
    }
    write_file_atomic(path, &encoder.into_inner())
}

/// After this returns, the file at `path` is either the previous snapshot
/// or the complete new one.
fn write_file_atomic(path: &Path, bytes: &[u8]) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(|err| err.to_string())?;
        }
    }
    let tmp = path.with_extension("tmp");
    let mut file = fs::File::create(&tmp).map_err(|err| err.to_string())?;
    file.write_all(bytes).map_err(|err| err.to_string())?;
    file.sync_all().map_err(|err| err.to_string())?;
    drop(file);

    if fs::rename(&tmp, path).is_err() {
        let _ = fs::remove_file(path);
        fs::rename(&tmp, path).map_err(|err| err.to_string())?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use santitham_network::Services;
    use santitham_primitives::block::BlockHeader;
    use santitham_primitives::transaction::{Transaction, TxIn, TxOut};
    use santitham_primitives::OutPoint;

    fn sample_block(timestamp: u32) -> Block {
        Block {
            header: BlockHeader {
                version: 1,
                prev_block: [0x55; 32],
                merkle_root: [0x66; 32],
                timestamp,
                bits: 0x1D00_FFFF,
                nonce: timestamp,
            },
            transactions: vec![Transaction {
                version: 1,
                vin: vec![TxIn {
                    previous_output: OutPoint {
                        hash: [0u8; 32],
                        index: u32::MAX,
                    },
                    script_sig: vec![0x03, 0x01, 0x02, 0x03],
                    sequence: u32::MAX,
                }],
                vout: vec![TxOut {
                    value: 625_000_000,
                    script_pubkey: vec![0x51],
                }],
                witnesses: Vec::new(),
                lock_time: 0,
            }],
        }
    }

    fn sample_peer(last_octet: u8) -> NetAddr {
        let mut ip = [0u8; 16];
        ip[10] = 0xFF;
        ip[11] = 0xFF;
        ip[12..].copy_from_slice(&[198, 51, 100, last_octet]);
        NetAddr {
            time: 1_700_000_000,
            services: Services::NODE_NETWORK,
            ip,
            port: 8333,
        }
    }

    #[test]
    fn absent_files_load_as_empty() {
        let dir = tempfile::tempdir().expect("tempdir");
        assert!(load_blocks(&dir.path().join("missing.bin"))
            .expect("load")
            .is_empty());
        assert!(load_peers(&dir.path().join("missing.dat"))
            .expect("load")
            .is_empty());
    }

    #[test]
    fn blocks_round_trip() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("state.bin");
        let blocks = vec![sample_block(1_600_000_000), sample_block(1_600_000_600)];

        save_blocks(&path, &blocks).expect("save");
        let loaded = load_blocks(&path).expect("load");
        assert_eq!(loaded, blocks);
    }

    #[test]
    fn empty_block_list_writes_nothing() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("state.bin");
        save_blocks(&path, &[]).expect("save");
        assert!(!path.exists());
    }

    #[test]
    fn peers_round_trip() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("peers.dat");
        let peers = vec![sample_peer(1), sample_peer(2), sample_peer(3)];

        save_peers(&path, &peers).expect("save");
        let loaded = load_peers(&path).expect("load");
        assert_eq!(loaded, peers);
    }

    #[test]
    fn save_replaces_previous_snapshot() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("state.bin");

        save_blocks(&path, &[sample_block(1)]).expect("first save");
        let updated = vec![sample_block(1), sample_block(2)];
        save_blocks(&path, &updated).expect("second save");

        assert_eq!(load_blocks(&path).expect("load"), updated);
        assert!(!path.with_extension("tmp").exists());
    }

    #[test]
    fn corrupt_state_is_an_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("state.bin");
        fs::write(&path, [0x02, 0xAA, 0xBB]).expect("write");
        assert!(load_blocks(&path).is_err());
    }
}
