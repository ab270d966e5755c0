use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::debug;

use super::Report;
use super::ReportsCollector;

/// Keeps reports in memory until they are taken
#[derive(Debug, Default)]
pub struct ReportsBuffer {
    reports: Mutex<Vec<Report>>,
}

impl ReportsBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drains every buffered report
    pub fn take(&self) -> Vec<Report> {
        std::mem::take(&mut *self.reports.lock())
    }

    pub fn len(&self) -> usize {
        self.reports.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ReportsCollector for ReportsBuffer {
    fn add_report(
        &self,
        report: Report,
    ) {
        self.reports.lock().push(report);
    }
}

/// Forwards reports to a channel consumer
#[derive(Debug, Clone)]
pub struct ChannelReportsCollector {
    tx: mpsc::UnboundedSender<Report>,
}

impl ChannelReportsCollector {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Report>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl ReportsCollector for ChannelReportsCollector {
    fn add_report(
        &self,
        report: Report,
    ) {
        if self.tx.send(report).is_err() {
            debug!("reports receiver dropped, report discarded");
        }
    }
}
