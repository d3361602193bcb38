//! Marshals completed render results from worker threads to the control
//! thread.
//!
//! The channel is bounded: a slow consumer backpressures the pool instead of
//! piling up high-resolution bitmaps. Freshness is decided on arrival: a
//! result must match both the current document and the current epoch, and
//! anything else is dropped silently. Stale results are expected and benign,
//! so they produce no error and no log spam, only a counter.

use std::time::Duration;

use crate::render::worker::RenderResult;

pub fn channel(capacity: usize) -> (flume::Sender<RenderResult>, DeliveryChannel) {
    let (tx, rx) = flume::bounded(capacity.max(1));
    (
        tx,
        DeliveryChannel {
            rx,
            stale_dropped: 0,
        },
    )
}

pub struct DeliveryChannel {
    rx: flume::Receiver<RenderResult>,
    stale_dropped: u64,
}

impl DeliveryChannel {
    pub fn try_recv(&self) -> Option<RenderResult> {
        self.rx.try_recv().ok()
    }

    pub fn recv_timeout(&self, timeout: Duration) -> Option<RenderResult> {
        self.rx.recv_timeout(timeout).ok()
    }

    /// Passes a result through the freshness gate.
    pub fn admit(&mut self, result: RenderResult, doc_id: u64, epoch: u64) -> Option<RenderResult> {
        if result.doc_id == doc_id && result.epoch == epoch {
            return Some(result);
        }
        self.stale_dropped += 1;
        None
    }

    /// Drains everything currently queued, keeping only fresh results.
    pub fn drain_fresh(&mut self, doc_id: u64, epoch: u64) -> Vec<RenderResult> {
        let mut fresh = Vec::new();
        while let Some(result) = self.try_recv() {
            if let Some(result) = self.admit(result, doc_id, epoch) {
                fresh.push(result);
            }
        }
        fresh
    }

    pub fn stale_dropped(&self) -> u64 {
        self.stale_dropped
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::channel;
    use crate::backend::RgbaFrame;
    use crate::render::worker::RenderResult;

    fn result(doc_id: u64, page: usize, epoch: u64) -> RenderResult {
        RenderResult {
            doc_id,
            page,
            epoch,
            outcome: Ok(RgbaFrame {
                width: 1,
                height: 1,
                pixels: vec![0; 4].into(),
            }),
            elapsed: Duration::ZERO,
        }
    }

    #[test]
    fn drain_keeps_current_epoch_and_drops_stale_silently() {
        let (tx, mut delivery) = channel(8);
        tx.send(result(1, 0, 1)).expect("send should succeed");
        tx.send(result(1, 1, 2)).expect("send should succeed");
        tx.send(result(1, 2, 2)).expect("send should succeed");

        let fresh = delivery.drain_fresh(1, 2);
        let pages: Vec<usize> = fresh.iter().map(|result| result.page).collect();
        assert_eq!(pages, vec![1, 2]);
        assert_eq!(delivery.stale_dropped(), 1);
    }

    #[test]
    fn results_from_another_document_are_dropped() {
        let (tx, mut delivery) = channel(8);
        tx.send(result(9, 0, 0)).expect("send should succeed");

        assert!(delivery.drain_fresh(1, 0).is_empty());
        assert_eq!(delivery.stale_dropped(), 1);
    }

    #[test]
    fn recv_timeout_returns_nothing_on_empty_channel() {
        let (_tx, delivery) = channel(2);
        assert!(delivery
            .recv_timeout(Duration::from_millis(10))
            .is_none());
    }

    #[test]
    fn dropping_the_receiver_disconnects_senders() {
        let (tx, delivery) = channel(1);
        drop(delivery);
        assert!(tx.send(result(1, 0, 0)).is_err());
    }
}
