//! Background maintenance: the janitor tick and deferred shard work.
//!
//! One thread per cache drains a task channel (promotions from the
//! secondary store, deletions scheduled by expired reads) and, on every
//! clean-window tick, sweeps a random number of randomly chosen shards.
//! A shutdown message (or the cache dropping its shutdown sender) ends the
//! thread promptly.

use crate::sampler::{EntropySampler, Sampler};
use crate::shard::Shard;

use crossbeam_channel::{select, tick, Receiver};
use std::sync::Arc;
use std::time::Duration;

/// Work deferred off the caller's critical path.
#[derive(Debug)]
pub(crate) enum Task {
    /// Install a record fetched from the secondary store into its shard.
    Promote { fingerprint: u64, record: Vec<u8> },

    /// Delete a record observed to be expired by a read.
    Remove { fingerprint: u64 },
}

pub(crate) struct Worker {
    shards: Arc<[Shard]>,
    mask: u64,
    clean_window: Duration,
    tasks: Receiver<Task>,
    shutdown: Receiver<()>,
}

impl Worker {
    pub(crate) fn new(
        shards: Arc<[Shard]>,
        clean_window: Duration,
        tasks: Receiver<Task>,
        shutdown: Receiver<()>,
    ) -> Self {
        let mask = (shards.len() - 1) as u64;
        Self {
            shards,
            mask,
            clean_window,
            tasks,
            shutdown,
        }
    }

    pub(crate) fn run(self) {
        let Worker {
            shards,
            mask,
            clean_window,
            tasks,
            shutdown,
        } = self;
        let ticker = tick(clean_window);
        let mut sampler = EntropySampler::new();

        loop {
            select! {
                recv(tasks) -> task => match task {
                    Ok(Task::Promote { fingerprint, record }) => {
                        shard_for(&shards, mask, fingerprint).promote(fingerprint, record);
                    }
                    Ok(Task::Remove { fingerprint }) => {
                        let _ = shard_for(&shards, mask, fingerprint).del(fingerprint);
                    }
                    Err(_) => break,
                },
                recv(ticker) -> _ => sweep(&shards, &mut sampler),
                recv(shutdown) -> _ => break,
            }
        }
        tracing::debug!("maintenance thread stopped");
    }
}

fn shard_for<'a>(shards: &'a [Shard], mask: u64, fingerprint: u64) -> &'a Shard {
    &shards[(fingerprint & mask) as usize]
}

/// One janitor pass: sweep a random number of randomly chosen shards.
fn sweep(shards: &[Shard], sampler: &mut EntropySampler) {
    let passes = sampler.sample(shards.len());
    for _ in 0..passes {
        let pick = sampler.sample(shards.len());
        shards[pick].sweep_expired();
    }
    if passes > 0 {
        tracing::debug!(shards = passes, "janitor sweep pass");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SystemClock;
    use crate::config::Config;
    use crate::shard::Shard;
    use crossbeam_channel::{bounded, unbounded};
    use std::time::Duration;

    fn spawn_worker() -> (
        Arc<[Shard]>,
        crossbeam_channel::Sender<Task>,
        crossbeam_channel::Sender<()>,
        std::thread::JoinHandle<()>,
    ) {
        let config = Config {
            shard_count: 2,
            initial_shard_size: 1024,
            ..Config::default()
        };
        let (task_tx, task_rx) = unbounded();
        let (shutdown_tx, shutdown_rx) = bounded(1);

        let shards: Arc<[Shard]> = (0..config.shard_count)
            .map(|_| {
                Shard::new(
                    &config,
                    Arc::new(SystemClock),
                    None,
                    task_tx.clone(),
                )
            })
            .collect();

        let worker = Worker::new(
            shards.clone(),
            Duration::from_millis(10),
            task_rx,
            shutdown_rx,
        );
        let handle = std::thread::spawn(move || worker.run());
        (shards, task_tx, shutdown_tx, handle)
    }

    #[test]
    fn test_remove_task_deletes_from_shard() {
        let (shards, task_tx, shutdown_tx, handle) = spawn_worker();

        let fingerprint = 5u64;
        let shard = &shards[(fingerprint & 1) as usize];
        shard
            .set("victim", fingerprint, b"value", Duration::ZERO)
            .unwrap();

        task_tx.send(Task::Remove { fingerprint }).unwrap();

        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while shard.len() != 0 {
            assert!(std::time::Instant::now() < deadline, "removal never ran");
            std::thread::sleep(Duration::from_millis(5));
        }

        shutdown_tx.send(()).unwrap();
        handle.join().unwrap();
    }

    #[test]
    fn test_shutdown_stops_worker_promptly() {
        let (_shards, _task_tx, shutdown_tx, handle) = spawn_worker();
        shutdown_tx.send(()).unwrap();
        handle.join().unwrap();
    }

    #[test]
    fn test_dropping_shutdown_sender_stops_worker() {
        // A disconnected shutdown channel reads as a shutdown signal, so a
        // cache dropped without an explicit close still ends its worker.
        let (_shards, _task_tx, shutdown_tx, handle) = spawn_worker();
        drop(shutdown_tx);
        handle.join().unwrap();
    }
}
