use std::fmt;
use std::io;
use std::sync::mpsc::RecvTimeoutError;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use rustc_hash::FxHashMap;
use tracing::{debug, warn};

use tephra_core::events::{channel, EventReceiver, EventSender};
use tephra_shared::chunk::BlockGrid;
use tephra_shared::coords::ChunkPos;
use tephra_shared::worldgen::{ChunkGenerator, TerrainParams};

#[derive(Debug)]
pub enum PoolError {
    NoWorkers,
    Spawn(io::Error),
    /// A worker failed to build its generator during the init handshake.
    InitFailed { worker: usize, message: String },
    /// A worker did not acknowledge init within the deadline. The pool is
    /// unusable after this; callers are expected to treat it as fatal.
    InitTimeout,
    Uninitialized,
    WorkerGone(usize),
}

impl fmt::Display for PoolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoWorkers => write!(f, "generation pool needs at least one worker"),
            Self::Spawn(err) => write!(f, "failed to spawn worker thread: {err}"),
            Self::InitFailed { worker, message } => {
                write!(f, "worker {worker} rejected terrain params: {message}")
            }
            Self::InitTimeout => write!(f, "timed out waiting for workers to initialize"),
            Self::Uninitialized => write!(f, "pool has not completed its init handshake"),
            Self::WorkerGone(worker) => write!(f, "worker {worker} is no longer running"),
        }
    }
}

impl std::error::Error for PoolError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Spawn(err) => Some(err),
            _ => None,
        }
    }
}

enum WorkerCommand {
    Initialize {
        params: Box<TerrainParams>,
    },
    Generate {
        request_id: u64,
        pos: ChunkPos,
        chunk_size: usize,
    },
    Shutdown,
}

/// Completion events drained from the pool. Responses arrive in whatever
/// order the workers finish; `request_id` is the correlation key.
#[derive(Debug)]
pub enum GenResponse {
    Generated {
        request_id: u64,
        pos: ChunkPos,
        grid: Box<BlockGrid>,
        generation_ms: u64,
    },
    Failed {
        request_id: u64,
        pos: ChunkPos,
        message: String,
    },
}

impl GenResponse {
    pub fn request_id(&self) -> u64 {
        match self {
            Self::Generated { request_id, .. } | Self::Failed { request_id, .. } => *request_id,
        }
    }
}

enum WorkerEvent {
    Ready { worker: usize },
    InitFailed { worker: usize, message: String },
    Response(GenResponse),
}

struct WorkerHandle {
    commands: EventSender<WorkerCommand>,
    in_flight: usize,
    thread: Option<JoinHandle<()>>,
}

/// Dedicated terrain generation threads behind a message-passing facade.
/// Workers hold their own `ChunkGenerator` built during an explicit init
/// handshake; requests are routed to whichever worker has the fewest
/// outstanding chunks. There is no cancellation: a submitted chunk always
/// produces exactly one response.
pub struct GenerationPool {
    workers: Vec<WorkerHandle>,
    events: EventReceiver<WorkerEvent>,
    assignments: FxHashMap<u64, usize>,
    next_request_id: u64,
    initialized: bool,
}

impl GenerationPool {
    pub fn new(worker_count: usize) -> Result<Self, PoolError> {
        if worker_count == 0 {
            return Err(PoolError::NoWorkers);
        }

        let (event_tx, event_rx) = channel();
        let mut workers = Vec::with_capacity(worker_count);
        for index in 0..worker_count {
            let (command_tx, command_rx) = channel();
            let events = event_tx.clone();
            let thread = thread::Builder::new()
                .name(format!("terrain-worker-{index}"))
                .spawn(move || worker_loop(index, command_rx, events))
                .map_err(PoolError::Spawn)?;
            workers.push(WorkerHandle {
                commands: command_tx,
                in_flight: 0,
                thread: Some(thread),
            });
        }

        debug!(worker_count, "generation pool spawned");
        Ok(Self {
            workers,
            events: event_rx,
            assignments: FxHashMap::default(),
            next_request_id: 0,
            initialized: false,
        })
    }

    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    pub fn pending(&self) -> usize {
        self.assignments.len()
    }

    /// Sends the terrain params to every worker and blocks until each one
    /// acknowledges. May be called again to re-seed the pool; completions
    /// still in flight at that point are settled and discarded.
    pub fn initialize(
        &mut self,
        params: TerrainParams,
        timeout: Duration,
    ) -> Result<(), PoolError> {
        for (index, worker) in self.workers.iter().enumerate() {
            worker
                .commands
                .send(WorkerCommand::Initialize {
                    params: Box::new(params.clone()),
                })
                .map_err(|_| PoolError::WorkerGone(index))?;
        }

        let deadline = Instant::now() + timeout;
        let mut ready = 0;
        while ready < self.workers.len() {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.events.recv_timeout(remaining) {
                Ok(WorkerEvent::Ready { worker }) => {
                    debug!(worker, "terrain worker initialized");
                    ready += 1;
                }
                Ok(WorkerEvent::InitFailed { worker, message }) => {
                    return Err(PoolError::InitFailed { worker, message });
                }
                // Completions from before a re-init still have an assignment
                // to release; the response itself is no longer wanted.
                Ok(event @ WorkerEvent::Response(_)) => {
                    if let Some(response) = self.settle(event) {
                        warn!(
                            request_id = response.request_id(),
                            "discarding completion overtaken by re-init"
                        );
                    }
                }
                Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => {
                    return Err(PoolError::InitTimeout);
                }
            }
        }

        self.initialized = true;
        Ok(())
    }

    /// Queues one chunk for generation on the least-loaded worker and returns
    /// the id its response will carry. The size travels with the request; an
    /// invalid size comes back as `Failed` for that request alone.
    pub fn submit(&mut self, pos: ChunkPos, chunk_size: usize) -> Result<u64, PoolError> {
        if !self.initialized {
            return Err(PoolError::Uninitialized);
        }

        let (index, _) = self
            .workers
            .iter()
            .enumerate()
            .min_by_key(|(_, worker)| worker.in_flight)
            .ok_or(PoolError::NoWorkers)?;

        let request_id = self.next_request_id;
        self.workers[index]
            .commands
            .send(WorkerCommand::Generate {
                request_id,
                pos,
                chunk_size,
            })
            .map_err(|_| PoolError::WorkerGone(index))?;

        self.next_request_id += 1;
        self.workers[index].in_flight += 1;
        self.assignments.insert(request_id, index);
        Ok(request_id)
    }

    /// Collects every completion currently queued without blocking.
    pub fn poll(&mut self) -> Vec<GenResponse> {
        let mut responses = Vec::new();
        for event in self.events.drain() {
            if let Some(response) = self.settle(event) {
                responses.push(response);
            }
        }
        responses
    }

    /// Blocks for up to `timeout` waiting for a single completion.
    pub fn wait(&mut self, timeout: Duration) -> Result<Option<GenResponse>, PoolError> {
        let deadline = Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.events.recv_timeout(remaining) {
                Ok(event) => {
                    if let Some(response) = self.settle(event) {
                        return Ok(Some(response));
                    }
                }
                Err(RecvTimeoutError::Timeout) => return Ok(None),
                Err(RecvTimeoutError::Disconnected) => return Err(PoolError::NoWorkers),
            }
        }
    }

    fn settle(&mut self, event: WorkerEvent) -> Option<GenResponse> {
        match event {
            WorkerEvent::Response(response) => {
                if let Some(worker) = self.assignments.remove(&response.request_id()) {
                    self.workers[worker].in_flight =
                        self.workers[worker].in_flight.saturating_sub(1);
                }
                Some(response)
            }
            WorkerEvent::Ready { .. } | WorkerEvent::InitFailed { .. } => None,
        }
    }
}

impl Drop for GenerationPool {
    fn drop(&mut self) {
        for worker in &self.workers {
            let _ = worker.commands.send(WorkerCommand::Shutdown);
        }
        for worker in &mut self.workers {
            if let Some(thread) = worker.thread.take() {
                let _ = thread.join();
            }
        }
    }
}

fn worker_loop(
    worker: usize,
    commands: EventReceiver<WorkerCommand>,
    events: EventSender<WorkerEvent>,
) {
    let mut generator: Option<ChunkGenerator> = None;

    while let Ok(command) = commands.recv() {
        match command {
            WorkerCommand::Initialize { params } => {
                match ChunkGenerator::new(*params) {
                    Ok(built) => {
                        generator = Some(built);
                        if events.send(WorkerEvent::Ready { worker }).is_err() {
                            return;
                        }
                    }
                    Err(err) => {
                        let _ = events.send(WorkerEvent::InitFailed {
                            worker,
                            message: err.to_string(),
                        });
                    }
                }
            }
            WorkerCommand::Generate {
                request_id,
                pos,
                chunk_size,
            } => {
                let response = match &generator {
                    Some(generator) => {
                        let started = Instant::now();
                        match generator.generate(pos.x, pos.z, chunk_size) {
                            Ok(grid) => GenResponse::Generated {
                                request_id,
                                pos,
                                grid: Box::new(grid),
                                generation_ms: started.elapsed().as_millis() as u64,
                            },
                            Err(err) => {
                                warn!(worker, request_id, error = %err, "chunk generation failed");
                                GenResponse::Failed {
                                    request_id,
                                    pos,
                                    message: err.to_string(),
                                }
                            }
                        }
                    }
                    None => GenResponse::Failed {
                        request_id,
                        pos,
                        message: "worker received a request before init".to_string(),
                    },
                };
                if events.send(WorkerEvent::Response(response)).is_err() {
                    return;
                }
            }
            WorkerCommand::Shutdown => return,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, Instant};

    use super::{GenResponse, GenerationPool, PoolError};
    use tephra_shared::coords::ChunkPos;
    use tephra_shared::worldgen::{ChunkGenerator, TerrainParams};

    const INIT_TIMEOUT: Duration = Duration::from_secs(10);

    #[test]
    fn submitting_before_init_is_rejected() {
        let mut pool = GenerationPool::new(1).expect("pool");
        let result = pool.submit(ChunkPos { x: 0, z: 0 }, 16);
        assert!(matches!(result, Err(PoolError::Uninitialized)));
    }

    #[test]
    fn init_rejects_bad_params() {
        let mut pool = GenerationPool::new(1).expect("pool");
        let bad = TerrainParams {
            height_octaves: 0,
            ..TerrainParams::default()
        };
        assert!(matches!(
            pool.initialize(bad, INIT_TIMEOUT),
            Err(PoolError::InitFailed { .. })
        ));
    }

    #[test]
    fn every_submission_produces_exactly_one_response() {
        let mut pool = GenerationPool::new(2).expect("pool");
        pool.initialize(TerrainParams::default(), INIT_TIMEOUT)
            .expect("init");

        let positions = [
            ChunkPos { x: 0, z: 0 },
            ChunkPos { x: 1, z: 0 },
            ChunkPos { x: -1, z: 2 },
            ChunkPos { x: 3, z: -4 },
        ];
        let mut expected: Vec<u64> = positions
            .iter()
            .map(|&pos| pool.submit(pos, 8).expect("submit"))
            .collect();

        let mut seen = Vec::new();
        while seen.len() < expected.len() {
            match pool.wait(INIT_TIMEOUT).expect("wait") {
                Some(response) => {
                    assert!(matches!(response, GenResponse::Generated { .. }));
                    seen.push(response.request_id());
                }
                None => panic!("timed out waiting for chunk generation"),
            }
        }

        expected.sort_unstable();
        seen.sort_unstable();
        assert_eq!(seen, expected);
        assert_eq!(pool.pending(), 0);
    }

    #[test]
    fn pool_output_matches_direct_generation() {
        let params = TerrainParams::default();
        let direct = ChunkGenerator::new(params.clone())
            .expect("generator")
            .generate(2, -3, 8)
            .expect("generate");

        let mut pool = GenerationPool::new(1).expect("pool");
        pool.initialize(params, INIT_TIMEOUT).expect("init");
        pool.submit(ChunkPos { x: 2, z: -3 }, 8).expect("submit");

        match pool.wait(INIT_TIMEOUT).expect("wait") {
            Some(GenResponse::Generated { grid, pos, .. }) => {
                assert_eq!(pos, ChunkPos { x: 2, z: -3 });
                assert_eq!(*grid, direct);
            }
            other => panic!("unexpected pool response: {other:?}"),
        }
    }

    #[test]
    fn bad_request_size_fails_only_that_request() {
        let mut pool = GenerationPool::new(1).expect("pool");
        pool.initialize(TerrainParams::default(), INIT_TIMEOUT)
            .expect("init");

        let good = pool.submit(ChunkPos { x: 0, z: 0 }, 8).expect("submit");
        let bad = pool.submit(ChunkPos { x: 1, z: 0 }, 0).expect("submit");

        let mut generated = Vec::new();
        let mut failed = Vec::new();
        while generated.len() + failed.len() < 2 {
            match pool.wait(INIT_TIMEOUT).expect("wait") {
                Some(GenResponse::Generated { request_id, .. }) => generated.push(request_id),
                Some(GenResponse::Failed { request_id, message, .. }) => {
                    assert!(message.contains("chunk size"), "unexpected error: {message}");
                    failed.push(request_id);
                }
                None => panic!("timed out waiting for responses"),
            }
        }

        assert_eq!(generated, vec![good]);
        assert_eq!(failed, vec![bad]);
        assert_eq!(pool.pending(), 0);
    }

    #[test]
    fn reinit_releases_in_flight_bookkeeping() {
        let mut pool = GenerationPool::new(1).expect("pool");
        pool.initialize(TerrainParams::default(), INIT_TIMEOUT)
            .expect("init");
        pool.submit(ChunkPos { x: 0, z: 0 }, 16).expect("submit");

        // Re-seed while the first chunk may still be in flight. Its
        // completion is either settled during the handshake or drained below;
        // the pending count must reach zero either way.
        pool.initialize(
            TerrainParams {
                seed: 77.0,
                ..TerrainParams::default()
            },
            INIT_TIMEOUT,
        )
        .expect("re-init");

        let deadline = Instant::now() + INIT_TIMEOUT;
        while pool.pending() > 0 {
            assert!(
                Instant::now() < deadline,
                "pending never drained after re-init"
            );
            let _ = pool.wait(Duration::from_millis(50)).expect("wait");
        }

        // The pool stays fully usable after the re-seed.
        let id = pool.submit(ChunkPos { x: 2, z: 2 }, 8).expect("submit");
        match pool.wait(INIT_TIMEOUT).expect("wait") {
            Some(GenResponse::Generated { request_id, .. }) => assert_eq!(request_id, id),
            other => panic!("unexpected pool response: {other:?}"),
        }
        assert_eq!(pool.pending(), 0);
    }
}
