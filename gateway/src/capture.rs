//! # capture
//!
//! Optional pcap dump of every PDU the engine sees, inbound and
//! outbound. Purely observational: write failures warn and the sink goes
//! quiet, protocol state is never affected.
//!
//! Records hold the raw UDP payload (linktype USER0) — no fabricated
//! Ethernet or IP headers, just the bytes the engine actually handled.

use std::time::{SystemTime, UNIX_EPOCH};

use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::{info, warn};

const PCAP_MAGIC: u32 = 0xA1B2_C3D4;
const PCAP_VERSION_MAJOR: u16 = 2;
const PCAP_VERSION_MINOR: u16 = 4;
const PCAP_SNAPLEN: u32 = 65535;
const LINKTYPE_USER0: u32 = 147;

pub struct CaptureSink {
    file: Option<File>,
}

impl CaptureSink {
    /// A sink that drops everything (no dump path configured).
    pub fn disabled() -> Self {
        CaptureSink { file: None }
    }

    /// Open (or create) the dump file and write the pcap global header
    /// if the file is new.
    pub async fn open(path: &str) -> Self {
        let file = match OpenOptions::new().create(true).append(true).open(path).await {
            Ok(file) => file,
            Err(e) => {
                warn!("capture: could not open {path}: {e} — packet dump disabled");
                return CaptureSink::disabled();
            }
        };

        let is_new = match file.metadata().await {
            Ok(meta) => meta.len() == 0,
            Err(e) => {
                warn!("capture: could not stat {path}: {e} — packet dump disabled");
                return CaptureSink::disabled();
            }
        };

        let mut sink = CaptureSink { file: Some(file) };
        if is_new {
            let mut header = Vec::with_capacity(24);
            header.extend_from_slice(&PCAP_MAGIC.to_le_bytes());
            header.extend_from_slice(&PCAP_VERSION_MAJOR.to_le_bytes());
            header.extend_from_slice(&PCAP_VERSION_MINOR.to_le_bytes());
            header.extend_from_slice(&0i32.to_le_bytes()); // thiszone
            header.extend_from_slice(&0u32.to_le_bytes()); // sigfigs
            header.extend_from_slice(&PCAP_SNAPLEN.to_le_bytes());
            header.extend_from_slice(&LINKTYPE_USER0.to_le_bytes());
            sink.write(&header).await;
        }
        if sink.file.is_some() {
            info!("capture: dumping packets to {path}");
        }
        sink
    }

    /// Append one packet record.
    pub async fn append(&mut self, pdu: &[u8]) {
        if self.file.is_none() {
            return;
        }
        let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default();
        let mut record = Vec::with_capacity(16 + pdu.len());
        record.extend_from_slice(&(now.as_secs() as u32).to_le_bytes());
        record.extend_from_slice(&now.subsec_micros().to_le_bytes());
        record.extend_from_slice(&(pdu.len() as u32).to_le_bytes());
        record.extend_from_slice(&(pdu.len() as u32).to_le_bytes());
        record.extend_from_slice(pdu);
        self.write(&record).await;
    }

    async fn write(&mut self, bytes: &[u8]) {
        let Some(file) = self.file.as_mut() else { return };
        let result = match file.write_all(bytes).await {
            Ok(()) => file.flush().await,
            Err(e) => Err(e),
        };
        if let Err(e) = result {
            warn!("capture: write failed: {e} — packet dump disabled");
            self.file = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn disabled_sink_is_a_no_op() {
        let mut sink = CaptureSink::disabled();
        sink.append(&[0xE1, 0x00]).await;
    }

    #[tokio::test]
    async fn writes_global_header_then_records() {
        let dir = std::env::temp_dir().join(format!("capture-test-{}", std::process::id()));
        tokio::fs::create_dir_all(&dir).await.unwrap();
        let path = dir.join("dump.pcap");
        let path_str = path.to_str().unwrap();

        let mut sink = CaptureSink::open(path_str).await;
        sink.append(&[0xE1, 0x00, 0x00, 0x02]).await;
        drop(sink);

        let bytes = tokio::fs::read(&path).await.unwrap();
        // 24-byte global header + 16-byte record header + 4 payload bytes.
        assert_eq!(bytes.len(), 24 + 16 + 4);
        assert_eq!(&bytes[..4], &PCAP_MAGIC.to_le_bytes());
        assert_eq!(&bytes[20..24], &LINKTYPE_USER0.to_le_bytes());
        assert_eq!(&bytes[40..], &[0xE1, 0x00, 0x00, 0x02]);

        // Reopening appends without a second header.
        let mut sink = CaptureSink::open(path_str).await;
        sink.append(&[0x0D]).await;
        drop(sink);
        let bytes = tokio::fs::read(&path).await.unwrap();
        assert_eq!(bytes.len(), 24 + 16 + 4 + 16 + 1);

        tokio::fs::remove_dir_all(&dir).await.ok();
    }
}
