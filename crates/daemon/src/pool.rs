//! `WorkerPool`: a bounded set of resident workers, one per distinct
//! interpreter version, with least-recently-used eviction and idle
//! timeout (spec §4.6).

use crate::error::DaemonError;
use crate::worker::{WorkerBackend, WorkerSpawner, DEFAULT_SCRUBBED_ENV_VARS};
use sheaf_core::InterpreterId;
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::{Duration, Instant};

struct Resident {
    backend: Box<dyn WorkerBackend>,
    executable_path: PathBuf,
    last_used: Instant,
}

/// Owns every resident worker process, enforcing `max_workers` and
/// reaping anything idle past `idle_timeout`.
pub struct WorkerPool {
    spawner: Box<dyn WorkerSpawner>,
    residents: HashMap<InterpreterId, Resident>,
    max_workers: usize,
    idle_timeout: Duration,
    scrubbed_env_vars: Vec<&'static str>,
}

impl WorkerPool {
    /// Construct an empty pool bounded to `max_workers` residents, each
    /// idle-evicted after `idle_timeout`.
    pub fn new(spawner: Box<dyn WorkerSpawner>, max_workers: usize, idle_timeout: Duration) -> Self {
        Self {
            spawner,
            residents: HashMap::new(),
            max_workers: max_workers.max(1),
            idle_timeout,
            scrubbed_env_vars: DEFAULT_SCRUBBED_ENV_VARS.to_vec(),
        }
    }

    /// How many workers are currently resident.
    pub fn resident_count(&self) -> usize {
        self.residents.len()
    }

    /// Whether a worker is resident for `interpreter` right now
    /// (regardless of liveness), for test assertions.
    pub fn has_resident(&self, interpreter: &InterpreterId) -> bool {
        self.residents.contains_key(interpreter)
    }

    /// Evict every resident whose `last_used` is older than
    /// `idle_timeout`, shutting each one down cleanly. Called
    /// opportunistically on every `acquire` rather than from a
    /// background thread, since the daemon's suspension points are
    /// already all request-driven (spec §5).
    pub fn reap_idle(&mut self) {
        let idle_timeout = self.idle_timeout;
        let expired: Vec<InterpreterId> = self
            .residents
            .iter()
            .filter(|(_, r)| r.last_used.elapsed() >= idle_timeout)
            .map(|(id, _)| id.clone())
            .collect();
        for id in expired {
            if let Some(mut resident) = self.residents.remove(&id) {
                resident.backend.shutdown();
            }
        }
    }

    /// Borrow (spawning or respawning as needed) the resident worker for
    /// `interpreter`, whose executable lives at `executable_path`.
    ///
    /// If a worker is already resident and alive, it is reused and its
    /// `last_used` timestamp refreshed. If it is resident but dead
    /// (spec §4.6: "a worker restart is transparent to callers except
    /// via a latency spike"), it is respawned in place. If no worker is
    /// resident and the pool is at capacity, the least-recently-used
    /// resident is evicted to make room.
    pub fn acquire(
        &mut self,
        interpreter: &InterpreterId,
        executable_path: &std::path::Path,
    ) -> Result<&mut Box<dyn WorkerBackend>, DaemonError> {
        self.reap_idle();

        if let Some(resident) = self.residents.get(interpreter) {
            if !resident.backend.is_alive() {
                self.respawn(interpreter, executable_path)?;
            }
        } else {
            if self.residents.len() >= self.max_workers {
                self.evict_least_recently_used(interpreter)?;
            }
            self.spawn_into(interpreter.clone(), executable_path.to_path_buf())?;
        }

        let resident = self
            .residents
            .get_mut(interpreter)
            .ok_or_else(|| DaemonError::PoolExhausted(interpreter.to_string()))?;
        resident.last_used = Instant::now();
        Ok(&mut resident.backend)
    }

    fn respawn(
        &mut self,
        interpreter: &InterpreterId,
        executable_path: &std::path::Path,
    ) -> Result<(), DaemonError> {
        let backend = self.spawner.spawn(executable_path, &self.scrubbed_env_vars)?;
        if let Some(resident) = self.residents.get_mut(interpreter) {
            resident.backend.shutdown();
            resident.backend = backend;
            resident.last_used = Instant::now();
        }
        Ok(())
    }

    fn spawn_into(
        &mut self,
        interpreter: InterpreterId,
        executable_path: PathBuf,
    ) -> Result<(), DaemonError> {
        let backend = self.spawner.spawn(&executable_path, &self.scrubbed_env_vars)?;
        self.residents.insert(
            interpreter,
            Resident { backend, executable_path, last_used: Instant::now() },
        );
        Ok(())
    }

    fn evict_least_recently_used(&mut self, except: &InterpreterId) -> Result<(), DaemonError> {
        let victim = self
            .residents
            .iter()
            .filter(|(id, _)| *id != except)
            .min_by_key(|(_, r)| r.last_used)
            .map(|(id, _)| id.clone());
        match victim {
            Some(id) => {
                if let Some(mut resident) = self.residents.remove(&id) {
                    resident.backend.shutdown();
                }
                Ok(())
            }
            None => Err(DaemonError::PoolExhausted(except.to_string())),
        }
    }

    /// Shut every resident worker down, e.g. on `daemon-stop`.
    pub fn shutdown_all(&mut self) {
        for (_, mut resident) in self.residents.drain() {
            resident.backend.shutdown();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::ExecutionResult;
    use crate::worker::FakeWorkerBackend;

    struct ScriptedSpawner {
        result: ExecutionResult,
    }

    impl WorkerSpawner for ScriptedSpawner {
        fn spawn(
            &self,
            _executable: &std::path::Path,
            _scrubbed: &[&str],
        ) -> Result<Box<dyn WorkerBackend>, DaemonError> {
            Ok(Box::new(FakeWorkerBackend::with_result(self.result.clone())))
        }
    }

    fn ok_result() -> ExecutionResult {
        ExecutionResult { exit_code: Some(0), stdout: String::new(), stderr: String::new() }
    }

    #[test]
    fn acquire_spawns_on_first_use_and_reuses_afterward() {
        let mut pool =
            WorkerPool::new(Box::new(ScriptedSpawner { result: ok_result() }), 4, Duration::from_secs(300));
        let id = InterpreterId("py311".to_string());
        pool.acquire(&id, std::path::Path::new("/usr/bin/python3.11")).expect("spawn");
        assert_eq!(pool.resident_count(), 1);
        pool.acquire(&id, std::path::Path::new("/usr/bin/python3.11")).expect("reuse");
        assert_eq!(pool.resident_count(), 1);
    }

    #[test]
    fn pool_evicts_least_recently_used_when_at_capacity() {
        let mut pool =
            WorkerPool::new(Box::new(ScriptedSpawner { result: ok_result() }), 2, Duration::from_secs(300));
        let a = InterpreterId("py39".to_string());
        let b = InterpreterId("py310".to_string());
        let c = InterpreterId("py311".to_string());

        pool.acquire(&a, std::path::Path::new("/usr/bin/a")).expect("spawn a");
        pool.acquire(&b, std::path::Path::new("/usr/bin/b")).expect("spawn b");
        // `a` is now the least recently used.
        pool.acquire(&c, std::path::Path::new("/usr/bin/c")).expect("spawn c, evicting a");

        assert_eq!(pool.resident_count(), 2);
        assert!(!pool.has_resident(&a));
        assert!(pool.has_resident(&b));
        assert!(pool.has_resident(&c));
    }

    #[test]
    fn reap_idle_evicts_workers_past_the_idle_timeout() {
        let mut pool = WorkerPool::new(
            Box::new(ScriptedSpawner { result: ok_result() }),
            4,
            Duration::from_millis(1),
        );
        let id = InterpreterId("py311".to_string());
        pool.acquire(&id, std::path::Path::new("/usr/bin/python3.11")).expect("spawn");
        std::thread::sleep(Duration::from_millis(5));
        pool.reap_idle();
        assert_eq!(pool.resident_count(), 0);
    }

    #[test]
    fn a_crashed_worker_is_transparently_respawned() {
        let mut pool =
            WorkerPool::new(Box::new(ScriptedSpawner { result: ok_result() }), 4, Duration::from_secs(300));
        let id = InterpreterId("py311".to_string());
        {
            let worker = pool.acquire(&id, std::path::Path::new("/usr/bin/python3.11")).expect("spawn");
            worker.shutdown();
        }
        assert!(!pool.residents.get(&id).expect("resident").backend.is_alive());
        let worker = pool.acquire(&id, std::path::Path::new("/usr/bin/python3.11")).expect("respawn");
        assert!(worker.is_alive());
    }
}
