use crate::logging::layer::LogDocument;
use crate::sink::ElasticsearchSink;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Events sent in one `_bulk` request at most
const MAX_EVENTS_PER_REQUEST: usize = 100;

/// Writes queued log events into the log index
pub struct LogShipper {
    sink: Arc<ElasticsearchSink>,
    index: String,
    rx: mpsc::Receiver<LogDocument>,
}

impl LogShipper {
    pub fn new(
        sink: Arc<ElasticsearchSink>,
        index: impl Into<String>,
        rx: mpsc::Receiver<LogDocument>,
    ) -> Self {
        Self {
            sink,
            index: index.into(),
            rx,
        }
    }

    /// Ships events until `shutdown` is cancelled, then flushes what is still queued
    ///
    /// Events waiting in the queue are grouped into one request, so a burst of
    /// log lines costs a single round trip.
    pub async fn run(mut self, shutdown: CancellationToken) {
        loop {
            let first = tokio::select! {
                biased;
                received = self.rx.recv() => match received {
                    Some(event) => event,
                    None => break,
                },
                _ = shutdown.cancelled() => break,
            };

            let mut batch = vec![first];
            while batch.len() < MAX_EVENTS_PER_REQUEST {
                match self.rx.try_recv() {
                    Ok(event) => batch.push(event),
                    Err(_) => break,
                }
            }
            self.ship(&batch).await;
        }

        self.rx.close();
        let mut rest = Vec::new();
        while let Ok(event) = self.rx.try_recv() {
            rest.push(event);
            if rest.len() == MAX_EVENTS_PER_REQUEST {
                self.ship(&rest).await;
                rest.clear();
            }
        }
        self.ship(&rest).await;
    }

    async fn ship(&self, events: &[LogDocument]) {
        if events.is_empty() {
            return;
        }

        let sources: Vec<String> = events
            .iter()
            .filter_map(|event| serde_json::to_string(event).ok())
            .collect();

        // Never shipped itself, see the layer's skipped targets
        if let Err(e) = self.sink.append(&self.index, &sources).await {
            tracing::warn!(
                index = %self.index,
                events = events.len(),
                error = %e,
                "Failed to ship log events"
            );
        }
    }
}
