//! A radio binding backed by a file.
//!
//! The file holds one binary NDEF message and plays the tag between two
//! phones: `share` writes it, `receive` reads it, and `listen` polls it and
//! reports every new message as a discovered tag.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use beatit_nfc::ndef::{decode_message, encode_message, NdefRecord};
use beatit_nfc::radio::{DiscoveredTag, DiscoveryHandler, NfcRadio, RadioError, RadioResult};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(250);

pub struct FileTagRadio {
    path: PathBuf,
    poll_interval: Duration,
    poller: Mutex<Option<JoinHandle<()>>>,
}

impl FileTagRadio {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            poller: Mutex::new(None),
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval.max(Duration::from_millis(1));
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Read and decode the tag file. A missing or empty file is no tag.
pub async fn read_tag(path: &Path) -> RadioResult<Vec<NdefRecord>> {
    let bytes = match tokio::fs::read(path).await {
        Ok(bytes) if bytes.is_empty() => return Err(RadioError::NoTag),
        Ok(bytes) => bytes,
        Err(err) if err.kind() == ErrorKind::NotFound => return Err(RadioError::NoTag),
        Err(err) => return Err(RadioError::Platform(err.to_string())),
    };
    decode_message(&bytes).map_err(|err| RadioError::Platform(format!("unreadable tag: {err}")))
}

async fn poll(path: PathBuf, interval: Duration, handler: DiscoveryHandler) {
    let mut ticker = tokio::time::interval(interval);
    let mut last_seen: Option<Vec<u8>> = None;
    loop {
        ticker.tick().await;
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) if !bytes.is_empty() => bytes,
            Ok(_) => {
                last_seen = None;
                continue;
            }
            Err(err) => {
                if err.kind() != ErrorKind::NotFound {
                    warn!(path = %path.display(), error = %err, "cannot read tag file");
                }
                last_seen = None;
                continue;
            }
        };
        if last_seen.as_ref() == Some(&bytes) {
            continue;
        }

        match decode_message(&bytes) {
            Ok(records) => {
                debug!(path = %path.display(), records = records.len(), "tag discovered");
                handler(DiscoveredTag { id: None, records });
            }
            Err(err) => warn!(path = %path.display(), error = %err, "ignoring unreadable tag"),
        }
        last_seen = Some(bytes);
    }
}

#[async_trait]
impl NfcRadio for FileTagRadio {
    async fn is_supported(&self) -> bool {
        true
    }

    async fn is_enabled(&self) -> bool {
        true
    }

    async fn start(&self) -> RadioResult<()> {
        Ok(())
    }

    async fn request_write(&self, records: &[NdefRecord]) -> RadioResult<()> {
        let bytes = encode_message(records).map_err(|err| RadioError::Platform(err.to_string()))?;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|err| RadioError::Platform(err.to_string()))?;
        }
        tokio::fs::write(&self.path, &bytes)
            .await
            .map_err(|err| RadioError::Platform(err.to_string()))?;
        debug!(path = %self.path.display(), bytes = bytes.len(), "tag written");
        Ok(())
    }

    async fn request_read(&self) -> RadioResult<Vec<NdefRecord>> {
        read_tag(&self.path).await
    }

    async fn register_discovery(&self, handler: DiscoveryHandler) -> RadioResult<()> {
        let task = tokio::spawn(poll(self.path.clone(), self.poll_interval, handler));
        if let Some(previous) = self.poller.lock().replace(task) {
            previous.abort();
        }
        Ok(())
    }

    async fn unregister_discovery(&self) -> RadioResult<()> {
        if let Some(task) = self.poller.lock().take() {
            task.abort();
        }
        Ok(())
    }

    async fn cancel(&self) -> RadioResult<()> {
        // Writes and reads finish on their own; there is never anything
        // outstanding to abort.
        Ok(())
    }
}

impl Drop for FileTagRadio {
    fn drop(&mut self) {
        if let Some(task) = self.poller.get_mut().take() {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tokio::sync::mpsc;

    #[tokio::test]
    async fn write_then_read() {
        let dir = tempfile::tempdir().unwrap();
        let radio = FileTagRadio::new(dir.path().join("tags/tag.ndef"));

        assert_eq!(radio.request_read().await, Err(RadioError::NoTag));

        let records = vec![NdefRecord::uri("beatit://nfc/pair?session=s1")];
        radio.request_write(&records).await.unwrap();
        assert_eq!(radio.request_read().await.unwrap(), records);
    }

    #[tokio::test]
    async fn garbage_is_a_platform_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tag.ndef");
        std::fs::write(&path, [0xD1, 0x01]).unwrap();

        let radio = FileTagRadio::new(&path);
        assert!(matches!(
            radio.request_read().await,
            Err(RadioError::Platform(_))
        ));
    }

    #[tokio::test]
    async fn discovery_reports_each_new_message_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tag.ndef");
        let radio = FileTagRadio::new(&path).with_poll_interval(Duration::from_millis(5));

        let (tx, mut rx) = mpsc::unbounded_channel();
        radio
            .register_discovery(Arc::new(move |tag: DiscoveredTag| {
                let _ = tx.send(tag.records);
            }))
            .await
            .unwrap();

        let first = vec![NdefRecord::text("one", "en")];
        radio.request_write(&first).await.unwrap();
        let seen = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(seen, first);

        let second = vec![NdefRecord::text("two", "en")];
        radio.request_write(&second).await.unwrap();
        let seen = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(seen, second);

        radio.unregister_discovery().await.unwrap();
        assert!(rx.try_recv().is_err());
    }
}
