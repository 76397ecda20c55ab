//! Document sinks.
//!
//! Persisting a run is not the orchestrator's job. It hands every document
//! to a [`RunRecorder`] and moves on; a failing recorder is logged and never
//! interrupts the hardware sequence.

use anyhow::Result;
use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::broadcast;

use super::document::Document;

/// Receives the documents of a run, in emission order.
#[async_trait]
pub trait RunRecorder: Send + Sync {
    /// Accept one document.
    async fn emit(&self, doc: Document) -> Result<()>;
}

/// Keeps every document in memory.
#[derive(Debug, Default)]
pub struct MemoryRecorder {
    documents: Mutex<Vec<Document>>,
}

impl MemoryRecorder {
    /// Empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all documents received so far.
    pub fn documents(&self) -> Vec<Document> {
        self.documents.lock().clone()
    }

    /// Document kinds in order ("start", "descriptor", ...).
    pub fn kinds(&self) -> Vec<&'static str> {
        self.documents.lock().iter().map(Document::kind).collect()
    }

    /// Drop everything recorded.
    pub fn clear(&self) {
        self.documents.lock().clear();
    }
}

#[async_trait]
impl RunRecorder for MemoryRecorder {
    async fn emit(&self, doc: Document) -> Result<()> {
        self.documents.lock().push(doc);
        Ok(())
    }
}

/// Fans documents out to any number of live subscribers.
#[derive(Debug, Clone)]
pub struct BroadcastRecorder {
    sender: broadcast::Sender<Document>,
}

impl BroadcastRecorder {
    /// Recorder buffering up to `capacity` documents per lagging subscriber.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// New subscriber receiving documents emitted from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<Document> {
        self.sender.subscribe()
    }
}

#[async_trait]
impl RunRecorder for BroadcastRecorder {
    async fn emit(&self, doc: Document) -> Result<()> {
        // No subscriber is not an error
        let _ = self.sender.send(doc);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::experiment::document::{ScanHeader, StartDoc, StopDoc, SERPENTINE};

    fn start() -> StartDoc {
        StartDoc::new(
            "raster",
            "Raster Fly Scan",
            ScanHeader {
                shape: (1, 5),
                motors: vec!["ss_x".into()],
                pattern: SERPENTINE.into(),
                detectors: vec![],
            },
        )
    }

    #[tokio::test]
    async fn test_memory_recorder_keeps_order() {
        let recorder = MemoryRecorder::new();
        let start = start();
        let run_uid = start.uid.clone();
        recorder.emit(Document::Start(start)).await.unwrap();
        recorder
            .emit(Document::Stop(StopDoc::success(&run_uid, 1)))
            .await
            .unwrap();

        assert_eq!(recorder.kinds(), vec!["start", "stop"]);
        assert!(recorder
            .documents()
            .iter()
            .all(|d| d.run_uid() == run_uid));

        recorder.clear();
        assert!(recorder.documents().is_empty());
    }

    #[tokio::test]
    async fn test_broadcast_recorder_reaches_subscribers() {
        let recorder = BroadcastRecorder::new(16);
        recorder.emit(Document::Start(start())).await.unwrap();

        let mut rx = recorder.subscribe();
        recorder.emit(Document::Start(start())).await.unwrap();
        let doc = rx.recv().await.unwrap();
        assert_eq!(doc.kind(), "start");
        assert!(rx.try_recv().is_err());
    }
}
