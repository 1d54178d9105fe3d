// Copyright @yucwang 2026

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::mpsc::{channel, Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crate::core::error::{DispatchError, LostReason, WorkerLost};
use crate::core::sample_source::SampleSource;
use crate::dispatch::protocol::{Job, RequestId, WorkRequest, WorkerId, WorkerMessage};
use crate::dispatch::worker::Worker;
use crate::math::buffer::SampleBuffer;

/// How often blocking waits wake up to look for workers that died silently.
const REAP_INTERVAL: Duration = Duration::from_millis(50);

/// Settled requests whose final state is still reported by `state`. Older
/// ones are forgotten so a long session does not grow without bound.
const SETTLED_HISTORY: usize = 4096;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatcherConfig {
    /// Size of the worker pool. Zero is treated as one.
    pub workers: usize,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            workers: thread::available_parallelism().map(|n| n.get()).unwrap_or(1),
        }
    }
}

/// Lifecycle of a dispatched request. `Completed` and `Lost` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestState {
    Pending,
    Completed,
    Lost,
}

/// The single notification a request produces.
#[derive(Debug)]
pub enum Completion {
    Completed { request: RequestId, buffer: SampleBuffer },
    Lost(WorkerLost),
}

impl Completion {
    pub fn request(&self) -> RequestId {
        match self {
            Completion::Completed { request, .. } => *request,
            Completion::Lost(lost) => lost.request,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownMode {
    /// Wait for every pending request and hand back its completion.
    Drain,
    /// Report every pending request as lost and return without waiting.
    Cancel,
}

/// Hands work requests to a pool of sample workers and routes their results
/// back to the thread that owns it.
///
/// All bookkeeping happens on the owning thread. Workers share nothing with
/// it except the channels that carry jobs out and buffers back.
pub struct Dispatcher {
    source: Arc<dyn SampleSource>,
    pool_size: usize,
    workers: BTreeMap<WorkerId, Worker>,
    queue: VecDeque<Job>,
    states: HashMap<RequestId, RequestState>,
    settled: VecDeque<RequestId>,
    pending: usize,
    ready: VecDeque<Completion>,
    results_sender: Sender<WorkerMessage>,
    results: Receiver<WorkerMessage>,
    next_request: u64,
    next_worker: u64,
}

impl Dispatcher {
    pub fn new(source: Arc<dyn SampleSource>, config: DispatcherConfig) -> Result<Self, DispatchError> {
        let (results_sender, results) = channel();
        let mut dispatcher = Dispatcher {
            source,
            pool_size: config.workers.max(1),
            workers: BTreeMap::new(),
            queue: VecDeque::new(),
            states: HashMap::new(),
            settled: VecDeque::new(),
            pending: 0,
            ready: VecDeque::new(),
            results_sender,
            results,
            next_request: 0,
            next_worker: 0,
        };
        for _ in 0..dispatcher.pool_size {
            dispatcher.spawn_worker()?;
        }
        log::info!(
            "dispatcher started with {} workers for {}",
            dispatcher.pool_size,
            dispatcher.source.describe()
        );
        Ok(dispatcher)
    }

    /// Queues a request and returns its handle without waiting for it.
    pub fn dispatch(&mut self, work: WorkRequest) -> Result<RequestId, DispatchError> {
        self.replenish();
        if self.workers.is_empty() {
            self.spawn_worker()?;
        }

        let request = RequestId(self.next_request);
        self.next_request += 1;
        self.states.insert(request, RequestState::Pending);
        self.pending += 1;
        self.queue.push_back(Job { request, work });
        log::debug!("dispatched {} ({}x{})", request, work.width(), work.height());
        self.pump();
        Ok(request)
    }

    /// `None` for unknown requests and for settled ones that have aged out
    /// of the retained history.
    pub fn state(&self, request: RequestId) -> Option<RequestState> {
        self.states.get(&request).copied()
    }

    /// Requests that have not reached a terminal state.
    pub fn pending(&self) -> usize {
        self.pending
    }

    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    /// Returns the next completion if one is available right now.
    pub fn try_next(&mut self) -> Option<Completion> {
        loop {
            if let Some(completion) = self.ready.pop_front() {
                return Some(completion);
            }
            match self.results.try_recv() {
                Ok(message) => {
                    if let Some(completion) = self.handle_message(message) {
                        return Some(completion);
                    }
                }
                Err(_) => {
                    self.reap_dead_workers();
                    return self.ready.pop_front();
                }
            }
        }
    }

    /// Blocks until a completion arrives. Returns `None` once nothing is pending.
    pub fn next(&mut self) -> Option<Completion> {
        loop {
            if let Some(completion) = self.try_next() {
                return Some(completion);
            }
            if self.pending == 0 {
                return None;
            }
            if let Some(completion) = self.wait_for_message(REAP_INTERVAL) {
                return Some(completion);
            }
        }
    }

    /// Like `next`, but gives up after `timeout`.
    pub fn next_timeout(&mut self, timeout: Duration) -> Option<Completion> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(completion) = self.try_next() {
                return Some(completion);
            }
            let now = Instant::now();
            if self.pending == 0 || now >= deadline {
                return None;
            }
            if let Some(completion) = self.wait_for_message((deadline - now).min(REAP_INTERVAL)) {
                return Some(completion);
            }
        }
    }

    /// Abandons a pending request.
    ///
    /// A queued request is simply dropped. A running one takes its worker
    /// with it: the worker is retired, whatever it produces is discarded, and
    /// a fresh worker takes its place in the pool.
    pub fn cancel(&mut self, request: RequestId) -> Option<WorkerLost> {
        if self.state(request) != Some(RequestState::Pending) {
            return None;
        }

        if let Some(pos) = self.queue.iter().position(|job| job.request == request) {
            self.queue.remove(pos);
        } else if let Some(worker) = self
            .workers
            .values()
            .find(|w| w.in_flight() == Some(request))
            .map(|w| w.id())
        {
            // Dropping the handle closes the job channel; the thread exits
            // after its current sample and nobody waits for it.
            self.workers.remove(&worker);
            log::info!("retired {} to cancel {}", worker, request);
            self.replenish();
        }

        let lost = self.lose(request, LostReason::Cancelled);
        self.pump();
        lost
    }

    pub fn shutdown(mut self, mode: ShutdownMode) -> Vec<Completion> {
        let mut completions = Vec::new();
        match mode {
            ShutdownMode::Drain => {
                while let Some(completion) = self.next() {
                    completions.push(completion);
                }
            }
            ShutdownMode::Cancel => {
                let queued: Vec<Job> = self.queue.drain(..).collect();
                completions.extend(self.ready.drain(..));
                while let Ok(message) = self.results.try_recv() {
                    completions.extend(self.handle_message(message));
                }
                for job in queued {
                    completions.extend(self.lose(job.request, LostReason::ShutDown).map(Completion::Lost));
                }
                let running: Vec<RequestId> = self.workers.values().filter_map(|w| w.in_flight()).collect();
                for request in running {
                    completions.extend(self.lose(request, LostReason::ShutDown).map(Completion::Lost));
                }
            }
        }

        let workers = std::mem::take(&mut self.workers);
        for (_, worker) in workers {
            // Busy workers are left to finish on their own.
            if worker.is_idle() {
                worker.join();
            }
        }
        log::info!("dispatcher shut down ({:?}), {} completions returned", mode, completions.len());
        completions
    }

    fn wait_for_message(&mut self, timeout: Duration) -> Option<Completion> {
        match self.results.recv_timeout(timeout) {
            Ok(message) => self.handle_message(message),
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => None,
        }
    }

    fn spawn_worker(&mut self) -> Result<WorkerId, DispatchError> {
        let id = WorkerId(self.next_worker);
        self.next_worker += 1;
        let worker = Worker::spawn(id, Arc::clone(&self.source), self.results_sender.clone())?;
        self.workers.insert(id, worker);
        Ok(id)
    }

    /// Tops the pool back up to its configured size.
    fn replenish(&mut self) {
        while self.workers.len() < self.pool_size {
            if let Err(err) = self.spawn_worker() {
                log::error!("could not replace worker: {}", err);
                break;
            }
        }
    }

    /// Moves queued jobs onto idle workers.
    fn pump(&mut self) {
        while let Some(job) = self.queue.pop_front() {
            let idle = match self.workers.values_mut().find(|w| w.is_idle()) {
                Some(worker) => worker,
                None => {
                    self.queue.push_front(job);
                    break;
                }
            };
            let id = idle.id();
            if let Err(job) = idle.assign(job) {
                log::warn!("{} is gone, requeueing {}", id, job.request);
                self.queue.push_front(job);
                if let Some(worker) = self.workers.remove(&id) {
                    worker.join();
                }
                self.replenish();
            }
        }

        if self.workers.is_empty() && !self.queue.is_empty() {
            let stranded: Vec<Job> = self.queue.drain(..).collect();
            for job in stranded {
                if let Some(lost) = self.lose(job.request, LostReason::Terminated) {
                    self.ready.push_back(Completion::Lost(lost));
                }
            }
        }
    }

    fn handle_message(&mut self, message: WorkerMessage) -> Option<Completion> {
        match message {
            WorkerMessage::Completed { worker, request, buffer } => {
                if !self.release(worker, request) {
                    log::warn!("discarding result for {} from retired {}", request, worker);
                    return None;
                }
                let completion = if self.settle(request, RequestState::Completed) {
                    log::debug!("{} completed on {}", request, worker);
                    Some(Completion::Completed { request, buffer })
                } else {
                    None
                };
                self.pump();
                completion
            }
            WorkerMessage::Failed { worker, request, reason } => {
                if !self.release(worker, request) {
                    log::warn!("ignoring failure of {} from retired {}", request, worker);
                    return None;
                }
                if let LostReason::Panicked(_) = reason {
                    if let Some(dead) = self.workers.remove(&worker) {
                        dead.join();
                    }
                    self.replenish();
                }
                let completion = self.lose(request, reason).map(Completion::Lost);
                self.pump();
                completion
            }
        }
    }

    /// Frees the worker that ran `request`. False if the message is stale.
    fn release(&mut self, worker: WorkerId, request: RequestId) -> bool {
        match self.workers.get_mut(&worker) {
            Some(w) if w.in_flight() == Some(request) => {
                w.finish_job();
                true
            }
            _ => false,
        }
    }

    /// Moves a pending request to a terminal state. False if it was not pending.
    fn settle(&mut self, request: RequestId, state: RequestState) -> bool {
        match self.states.get_mut(&request) {
            Some(current) if *current == RequestState::Pending => {
                *current = state;
                self.pending -= 1;
            }
            _ => return false,
        }

        self.settled.push_back(request);
        while self.settled.len() > SETTLED_HISTORY {
            if let Some(oldest) = self.settled.pop_front() {
                self.states.remove(&oldest);
            }
        }
        true
    }

    fn lose(&mut self, request: RequestId, reason: LostReason) -> Option<WorkerLost> {
        if !self.settle(request, RequestState::Lost) {
            return None;
        }
        log::warn!("{} lost: {}", request, reason);
        Some(WorkerLost { request, reason })
    }

    /// Turns requests held by workers that exited without reporting into
    /// losses, then replaces those workers.
    fn reap_dead_workers(&mut self) {
        let dead: Vec<WorkerId> = self
            .workers
            .values()
            .filter(|w| w.has_exited())
            .map(|w| w.id())
            .collect();
        if dead.is_empty() {
            return;
        }

        // Anything those workers sent before exiting is already in the channel.
        while let Ok(message) = self.results.try_recv() {
            if let Some(completion) = self.handle_message(message) {
                self.ready.push_back(completion);
            }
        }

        for id in dead {
            if let Some(worker) = self.workers.remove(&id) {
                let in_flight = worker.in_flight();
                worker.join();
                if let Some(lost) = in_flight.and_then(|r| self.lose(r, LostReason::Terminated)) {
                    self.ready.push_back(Completion::Lost(lost));
                }
            }
        }
        self.replenish();
        self.pump();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::accumulator::Accumulator;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Condvar, Mutex};

    struct Flat(f32);

    impl SampleSource for Flat {
        fn produce(&self, width: u32, height: u32) -> SampleBuffer {
            vec![self.0; (width * height * 4) as usize]
        }
    }

    /// Blocks every produce call until the gate is opened.
    struct Gated {
        open: Mutex<bool>,
        changed: Condvar,
    }

    impl Gated {
        fn closed() -> Arc<Self> {
            Arc::new(Self { open: Mutex::new(false), changed: Condvar::new() })
        }

        fn open(&self) {
            *self.open.lock().unwrap() = true;
            self.changed.notify_all();
        }
    }

    impl SampleSource for Gated {
        fn produce(&self, width: u32, height: u32) -> SampleBuffer {
            let mut open = self.open.lock().unwrap();
            while !*open {
                open = self.changed.wait(open).unwrap();
            }
            vec![1.0; (width * height * 4) as usize]
        }
    }

    struct PanicsFirst {
        calls: AtomicUsize,
    }

    impl SampleSource for PanicsFirst {
        fn produce(&self, width: u32, height: u32) -> SampleBuffer {
            if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
                panic!("first sample exploded");
            }
            vec![0.5; (width * height * 4) as usize]
        }
    }

    /// Panics on the second call with a payload that panics again when
    /// dropped, which takes the worker thread down before it can report.
    struct DiesSilently {
        calls: AtomicUsize,
    }

    struct Bomb;

    impl Drop for Bomb {
        fn drop(&mut self) {
            panic!("payload dropped");
        }
    }

    impl SampleSource for DiesSilently {
        fn produce(&self, width: u32, height: u32) -> SampleBuffer {
            if self.calls.fetch_add(1, Ordering::SeqCst) == 1 {
                std::panic::panic_any(Bomb);
            }
            vec![1.0; (width * height * 4) as usize]
        }
    }

    struct Truncating;

    impl SampleSource for Truncating {
        fn produce(&self, width: u32, height: u32) -> SampleBuffer {
            vec![0.0; (width * height * 4) as usize - 1]
        }
    }

    fn config(workers: usize) -> DispatcherConfig {
        DispatcherConfig { workers }
    }

    fn work() -> WorkRequest {
        WorkRequest::new(2, 1).unwrap()
    }

    #[test]
    fn test_every_request_completes_once() {
        let mut dispatcher = Dispatcher::new(Arc::new(Flat(0.25)), config(2)).unwrap();
        let ids: Vec<RequestId> = (0..5).map(|_| dispatcher.dispatch(work()).unwrap()).collect();

        let mut seen = Vec::new();
        while let Some(completion) = dispatcher.next() {
            match completion {
                Completion::Completed { request, buffer } => {
                    assert_eq!(buffer, vec![0.25; 8]);
                    seen.push(request);
                }
                Completion::Lost(lost) => panic!("unexpected loss {}", lost),
            }
        }
        seen.sort();
        assert_eq!(seen, ids);
        assert_eq!(dispatcher.pending(), 0);
        for id in ids {
            assert_eq!(dispatcher.state(id), Some(RequestState::Completed));
        }
        assert!(dispatcher.next().is_none());
    }

    #[test]
    fn test_single_worker_serves_queue_in_order() {
        let mut dispatcher = Dispatcher::new(Arc::new(Flat(1.0)), config(1)).unwrap();
        let ids: Vec<RequestId> = (0..4).map(|_| dispatcher.dispatch(work()).unwrap()).collect();
        assert_eq!(dispatcher.pending(), 4);

        let order: Vec<RequestId> = std::iter::from_fn(|| dispatcher.next()).map(|c| c.request()).collect();
        assert_eq!(order, ids);
    }

    #[test]
    fn test_cancelled_worker_result_is_never_merged() {
        let gate = Gated::closed();
        let mut dispatcher = Dispatcher::new(gate.clone(), config(3)).unwrap();
        let first = dispatcher.dispatch(work()).unwrap();
        let second = dispatcher.dispatch(work()).unwrap();
        let third = dispatcher.dispatch(work()).unwrap();
        assert_eq!(dispatcher.queued(), 0);

        let lost = dispatcher.cancel(second).unwrap();
        assert_eq!(lost.request, second);
        assert_eq!(lost.reason, LostReason::Cancelled);
        assert_eq!(dispatcher.state(second), Some(RequestState::Lost));
        assert_eq!(dispatcher.worker_count(), 3);
        assert!(dispatcher.cancel(second).is_none());

        gate.open();
        let mut acc = Accumulator::new(2, 1).unwrap();
        let mut merged = Vec::new();
        while let Some(completion) = dispatcher.next() {
            match completion {
                Completion::Completed { request, buffer } => {
                    acc.merge(&buffer).unwrap();
                    merged.push(request);
                }
                Completion::Lost(lost) => panic!("unexpected loss {}", lost),
            }
        }
        merged.sort();
        assert_eq!(merged, vec![first, third]);
        assert_eq!(acc.sample_count(), 2);
        assert_eq!(dispatcher.state(second), Some(RequestState::Lost));

        // The retired worker may still deliver; it must be ignored.
        assert!(dispatcher.next_timeout(Duration::from_millis(100)).is_none());
        assert_eq!(acc.sample_count(), 2);
    }

    #[test]
    fn test_cancel_queued_request() {
        let gate = Gated::closed();
        let mut dispatcher = Dispatcher::new(gate.clone(), config(1)).unwrap();
        let running = dispatcher.dispatch(work()).unwrap();
        let waiting = dispatcher.dispatch(work()).unwrap();
        assert_eq!(dispatcher.queued(), 1);

        assert!(dispatcher.cancel(waiting).is_some());
        assert_eq!(dispatcher.queued(), 0);
        assert_eq!(dispatcher.pending(), 1);

        gate.open();
        let completion = dispatcher.next().unwrap();
        assert_eq!(completion.request(), running);
        assert!(dispatcher.next().is_none());
    }

    #[test]
    fn test_panicking_source_loses_request_and_replaces_worker() {
        let source = Arc::new(PanicsFirst { calls: AtomicUsize::new(0) });
        let mut dispatcher = Dispatcher::new(source, config(1)).unwrap();
        let doomed = dispatcher.dispatch(work()).unwrap();
        let fine = dispatcher.dispatch(work()).unwrap();

        match dispatcher.next().unwrap() {
            Completion::Lost(lost) => {
                assert_eq!(lost.request, doomed);
                assert!(matches!(lost.reason, LostReason::Panicked(ref msg) if msg.contains("exploded")));
            }
            other => panic!("expected loss, got {:?}", other),
        }
        match dispatcher.next().unwrap() {
            Completion::Completed { request, .. } => assert_eq!(request, fine),
            other => panic!("expected completion, got {:?}", other),
        }
        assert_eq!(dispatcher.worker_count(), 1);
        assert_eq!(dispatcher.state(doomed), Some(RequestState::Lost));
    }

    #[test]
    fn test_silently_dead_worker_is_reaped() {
        let source = Arc::new(DiesSilently { calls: AtomicUsize::new(0) });
        let mut dispatcher = Dispatcher::new(source, config(1)).unwrap();
        let ids: Vec<RequestId> = (0..3).map(|_| dispatcher.dispatch(work()).unwrap()).collect();

        let mut acc = Accumulator::new(2, 1).unwrap();
        let mut lost = Vec::new();
        while let Some(completion) = dispatcher.next() {
            match completion {
                Completion::Completed { buffer, .. } => acc.merge(&buffer).unwrap(),
                Completion::Lost(l) => lost.push(l),
            }
        }

        assert_eq!(lost, vec![WorkerLost { request: ids[1], reason: LostReason::Terminated }]);
        assert_eq!(acc.sample_count(), 2);
        assert_eq!(dispatcher.worker_count(), 1);
        assert_eq!(dispatcher.state(ids[0]), Some(RequestState::Completed));
        assert_eq!(dispatcher.state(ids[1]), Some(RequestState::Lost));
        assert_eq!(dispatcher.state(ids[2]), Some(RequestState::Completed));
    }

    #[test]
    fn test_settled_history_is_bounded() {
        let mut dispatcher = Dispatcher::new(Arc::new(Flat(0.0)), config(2)).unwrap();
        let total = SETTLED_HISTORY + 8;
        let mut ids = Vec::with_capacity(total);
        for _ in 0..total {
            ids.push(dispatcher.dispatch(work()).unwrap());
            while dispatcher.pending() >= 4 {
                dispatcher.next().unwrap();
            }
        }
        while dispatcher.next().is_some() {}

        assert_eq!(dispatcher.states.len(), SETTLED_HISTORY);
        assert_eq!(dispatcher.state(ids[0]), None);
        assert_eq!(dispatcher.state(ids[total - 1]), Some(RequestState::Completed));
    }

    #[test]
    fn test_malformed_result_is_lost() {
        let mut dispatcher = Dispatcher::new(Arc::new(Truncating), config(1)).unwrap();
        let request = dispatcher.dispatch(work()).unwrap();
        match dispatcher.next().unwrap() {
            Completion::Lost(lost) => {
                assert_eq!(lost.request, request);
                assert_eq!(lost.reason, LostReason::MalformedResult { expected: 8, actual: 7 });
            }
            other => panic!("expected loss, got {:?}", other),
        }
        assert_eq!(dispatcher.worker_count(), 1);
    }

    #[test]
    fn test_try_next_does_not_block() {
        let gate = Gated::closed();
        let mut dispatcher = Dispatcher::new(gate.clone(), config(1)).unwrap();
        let request = dispatcher.dispatch(work()).unwrap();
        assert!(dispatcher.try_next().is_none());
        assert!(dispatcher.next_timeout(Duration::from_millis(20)).is_none());
        assert_eq!(dispatcher.state(request), Some(RequestState::Pending));

        gate.open();
        assert_eq!(dispatcher.next().unwrap().request(), request);
    }

    #[test]
    fn test_shutdown_cancel_reports_pending_as_lost() {
        let gate = Gated::closed();
        let mut dispatcher = Dispatcher::new(gate.clone(), config(1)).unwrap();
        for _ in 0..3 {
            dispatcher.dispatch(work()).unwrap();
        }

        let completions = dispatcher.shutdown(ShutdownMode::Cancel);
        assert_eq!(completions.len(), 3);
        for completion in completions {
            match completion {
                Completion::Lost(lost) => assert_eq!(lost.reason, LostReason::ShutDown),
                other => panic!("expected loss, got {:?}", other),
            }
        }
        gate.open();
    }

    #[test]
    fn test_shutdown_drain_returns_remaining_results() {
        let mut dispatcher = Dispatcher::new(Arc::new(Flat(0.5)), config(2)).unwrap();
        for _ in 0..3 {
            dispatcher.dispatch(work()).unwrap();
        }
        let completions = dispatcher.shutdown(ShutdownMode::Drain);
        assert_eq!(completions.len(), 3);
        assert!(completions.iter().all(|c| matches!(c, Completion::Completed { .. })));
    }

    #[test]
    fn test_zero_workers_means_one() {
        let dispatcher = Dispatcher::new(Arc::new(Flat(0.0)), config(0)).unwrap();
        assert_eq!(dispatcher.worker_count(), 1);
        assert!(DispatcherConfig::default().workers >= 1);
    }
}
