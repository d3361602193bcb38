use std::collections::VecDeque;

use crate::geometry::Rotation;

/// One page-render request, tagged with the epoch it belongs to.
///
/// Jobs are immutable once enqueued: every display parameter a worker needs
/// is snapshotted here, so a mid-flight parameter change can never tear a
/// job. `scale` is the fixed rasterization factor, independent of UI zoom.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderJob {
    pub doc_id: u64,
    pub page: usize,
    pub epoch: u64,
    pub scale: f32,
    pub dark_mode: bool,
    pub rotation: Rotation,
}

/// Display parameters shared by every job of one epoch.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EpochParams {
    pub doc_id: u64,
    pub epoch: u64,
    pub scale: f32,
    pub dark_mode: bool,
    pub rotation: Rotation,
}

/// Lifecycle of the current epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EpochPhase {
    Pending,
    Running,
    Completed,
    Cancelled,
}

/// Per-epoch job queue with progress accounting.
///
/// Dispatch order within an epoch is page-ascending (scroll-reading order);
/// no other ordering is guaranteed. Starting a new epoch cancels whatever is
/// still queued for the previous one; already-dispatched jobs finish and are
/// filtered out at delivery instead.
#[derive(Debug)]
pub struct RenderScheduler {
    queue: VecDeque<RenderJob>,
    epoch: u64,
    phase: EpochPhase,
    page_count: usize,
    completed_jobs: usize,
    failed_jobs: usize,
    canceled_jobs: usize,
}

impl Default for RenderScheduler {
    fn default() -> Self {
        Self {
            queue: VecDeque::new(),
            epoch: 0,
            phase: EpochPhase::Completed,
            page_count: 0,
            completed_jobs: 0,
            failed_jobs: 0,
            canceled_jobs: 0,
        }
    }
}

impl RenderScheduler {
    /// Supersedes the previous epoch and enqueues one job per page in
    /// ascending page order.
    pub fn begin_epoch(&mut self, params: EpochParams, page_count: usize) {
        self.canceled_jobs = self.canceled_jobs.saturating_add(self.queue.len());
        self.queue.clear();

        self.epoch = params.epoch;
        self.page_count = page_count;
        self.completed_jobs = 0;
        self.failed_jobs = 0;
        self.phase = if page_count == 0 {
            EpochPhase::Completed
        } else {
            EpochPhase::Pending
        };

        for page in 0..page_count {
            let accepted = self.enqueue(RenderJob {
                doc_id: params.doc_id,
                page,
                epoch: params.epoch,
                scale: params.scale,
                dark_mode: params.dark_mode,
                rotation: params.rotation,
            });
            debug_assert!(accepted);
        }
    }

    /// Accepts a job for dispatch only if it belongs to the current epoch.
    pub fn enqueue(&mut self, job: RenderJob) -> bool {
        if job.epoch != self.epoch || self.phase == EpochPhase::Cancelled {
            return false;
        }
        self.queue.push_back(job);
        true
    }

    /// Puts a job back at the head of the queue after a dispatch attempt
    /// raced a busy pool; same epoch gate as `enqueue`.
    pub fn requeue_front(&mut self, job: RenderJob) -> bool {
        if job.epoch != self.epoch || self.phase == EpochPhase::Cancelled {
            return false;
        }
        self.queue.push_front(job);
        true
    }

    pub fn next_job(&mut self) -> Option<RenderJob> {
        let job = self.queue.pop_front()?;
        if self.phase == EpochPhase::Pending {
            self.phase = EpochPhase::Running;
        }
        Some(job)
    }

    /// Counts a finished job toward the current epoch. Stale-epoch
    /// completions are ignored and do not move progress.
    pub fn record_completed(&mut self, epoch: u64) -> bool {
        if epoch != self.epoch {
            return false;
        }
        self.completed_jobs += 1;
        self.finish_if_done();
        true
    }

    /// A failed page still counts as done for progress purposes.
    pub fn record_failed(&mut self, epoch: u64) -> bool {
        if epoch != self.epoch {
            return false;
        }
        self.failed_jobs += 1;
        self.finish_if_done();
        true
    }

    /// Cancels the current epoch outright (document close/replacement).
    pub fn cancel_epoch(&mut self) {
        self.canceled_jobs = self.canceled_jobs.saturating_add(self.queue.len());
        self.queue.clear();
        if self.phase != EpochPhase::Completed {
            self.phase = EpochPhase::Cancelled;
        }
    }

    pub fn progress(&self) -> f64 {
        if self.page_count == 0 {
            return 1.0;
        }
        self.done_jobs() as f64 / self.page_count as f64
    }

    pub fn done_jobs(&self) -> usize {
        self.completed_jobs + self.failed_jobs
    }

    pub fn failed_jobs(&self) -> usize {
        self.failed_jobs
    }

    pub fn canceled_jobs(&self) -> usize {
        self.canceled_jobs
    }

    pub fn current_epoch(&self) -> u64 {
        self.epoch
    }

    pub fn phase(&self) -> EpochPhase {
        self.phase
    }

    pub fn is_complete(&self) -> bool {
        self.phase == EpochPhase::Completed
    }

    pub fn queued_len(&self) -> usize {
        self.queue.len()
    }

    fn finish_if_done(&mut self) {
        if self.done_jobs() >= self.page_count && self.phase == EpochPhase::Running {
            self.phase = EpochPhase::Completed;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{EpochParams, EpochPhase, RenderJob, RenderScheduler};
    use crate::geometry::Rotation;

    fn params(epoch: u64) -> EpochParams {
        EpochParams {
            doc_id: 7,
            epoch,
            scale: 2.0,
            dark_mode: false,
            rotation: Rotation::Deg0,
        }
    }

    #[test]
    fn begin_epoch_enqueues_pages_in_ascending_order() {
        let mut scheduler = RenderScheduler::default();
        scheduler.begin_epoch(params(1), 4);

        let pages: Vec<usize> = std::iter::from_fn(|| scheduler.next_job())
            .map(|job| job.page)
            .collect();
        assert_eq!(pages, vec![0, 1, 2, 3]);
    }

    #[test]
    fn jobs_snapshot_epoch_parameters() {
        let mut scheduler = RenderScheduler::default();
        scheduler.begin_epoch(
            EpochParams {
                doc_id: 3,
                epoch: 2,
                scale: 2.0,
                dark_mode: true,
                rotation: Rotation::Deg90,
            },
            1,
        );

        let job = scheduler.next_job().expect("job should be queued");
        assert_eq!(job.doc_id, 3);
        assert_eq!(job.epoch, 2);
        assert!(job.dark_mode);
        assert_eq!(job.rotation, Rotation::Deg90);
    }

    #[test]
    fn new_epoch_cancels_previous_queue() {
        let mut scheduler = RenderScheduler::default();
        scheduler.begin_epoch(params(1), 3);
        let _ = scheduler.next_job();

        scheduler.begin_epoch(params(2), 3);
        assert_eq!(scheduler.canceled_jobs(), 2);
        assert_eq!(scheduler.queued_len(), 3);
        assert_eq!(scheduler.current_epoch(), 2);
        assert_eq!(scheduler.done_jobs(), 0);
    }

    #[test]
    fn enqueue_rejects_jobs_from_other_epochs() {
        let mut scheduler = RenderScheduler::default();
        scheduler.begin_epoch(params(3), 1);

        let stale = RenderJob {
            doc_id: 7,
            page: 0,
            epoch: 2,
            scale: 2.0,
            dark_mode: false,
            rotation: Rotation::Deg0,
        };
        assert!(!scheduler.enqueue(stale));
        assert_eq!(scheduler.queued_len(), 1);
    }

    #[test]
    fn stale_completions_do_not_count_toward_progress() {
        let mut scheduler = RenderScheduler::default();
        scheduler.begin_epoch(params(5), 2);
        let _ = scheduler.next_job();

        assert!(!scheduler.record_completed(4));
        assert_eq!(scheduler.done_jobs(), 0);

        assert!(scheduler.record_completed(5));
        assert!(scheduler.record_failed(5));
        assert_eq!(scheduler.done_jobs(), 2);
        assert_eq!(scheduler.failed_jobs(), 1);
        assert_eq!(scheduler.progress(), 1.0);
    }

    #[test]
    fn phase_moves_from_pending_through_running_to_completed() {
        let mut scheduler = RenderScheduler::default();
        scheduler.begin_epoch(params(1), 1);
        assert_eq!(scheduler.phase(), EpochPhase::Pending);

        let _ = scheduler.next_job();
        assert_eq!(scheduler.phase(), EpochPhase::Running);

        assert!(scheduler.record_completed(1));
        assert_eq!(scheduler.phase(), EpochPhase::Completed);
        assert!(scheduler.is_complete());
    }

    #[test]
    fn empty_document_completes_immediately() {
        let mut scheduler = RenderScheduler::default();
        scheduler.begin_epoch(params(1), 0);
        assert!(scheduler.is_complete());
        assert_eq!(scheduler.progress(), 1.0);
    }

    #[test]
    fn cancel_epoch_drops_queue_and_marks_cancelled() {
        let mut scheduler = RenderScheduler::default();
        scheduler.begin_epoch(params(1), 3);
        scheduler.cancel_epoch();

        assert_eq!(scheduler.phase(), EpochPhase::Cancelled);
        assert_eq!(scheduler.queued_len(), 0);
        assert_eq!(scheduler.canceled_jobs(), 3);
        assert!(scheduler.next_job().is_none());
        assert!(!scheduler.enqueue(RenderJob {
            doc_id: 7,
            page: 0,
            epoch: 1,
            scale: 2.0,
            dark_mode: false,
            rotation: Rotation::Deg0,
        }));
    }
}
