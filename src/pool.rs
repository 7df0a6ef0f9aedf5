/*!
 * A fixed size pool of worker threads for data parallel stages.
 *
 * Tasks go out over a bounded channel from a feeder thread, the workers send results back, and
 * the calling thread collects them in whatever order they arrive.
 */
use crate::PortsResult;
use crossbeam_channel::bounded;
use log::{error, info};
use std::{
    fmt::Display,
    panic::{self, AssertUnwindSafe},
    thread,
};

const CHANNEL_SIZE: usize = 100;
const PROGRESS_INTERVAL: usize = 1000;

/// Runs independent tasks on a fixed number of threads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerPool {
    num_workers: usize,
}

impl Default for WorkerPool {
    /// One worker per logical CPU.
    fn default() -> Self {
        Self::new(num_cpus::get())
    }
}

impl WorkerPool {
    /// A pool with `num_workers` threads, at least one.
    pub fn new(num_workers: usize) -> Self {
        WorkerPool {
            num_workers: num_workers.max(1),
        }
    }

    pub fn num_workers(&self) -> usize {
        self.num_workers
    }

    /// Apply `work` to every task in parallel and collect the results in arrival order.
    ///
    /// A task that returns an error or panics is logged and contributes nothing to the output,
    /// the remaining tasks still run. The only error returned is a failure to start a thread.
    /// Threads are named after `name`, which is also used in the log messages.
    pub fn fan_out<I, O, E, F>(&self, name: &str, tasks: Vec<I>, work: F) -> PortsResult<Vec<O>>
    where
        I: Send,
        O: Send,
        E: Display,
        F: Fn(I) -> Result<O, E> + Sync,
    {
        let num_tasks = tasks.len();
        if num_tasks == 0 {
            return Ok(vec![]);
        }

        let num_workers = self.num_workers.min(num_tasks);
        let work = &work;

        thread::scope(|s| -> PortsResult<Vec<O>> {
            let (to_workers, from_feeder) = bounded::<I>(CHANNEL_SIZE);
            let (to_collector, from_workers) = bounded::<O>(CHANNEL_SIZE);

            thread::Builder::new()
                .name(format!("{}-feeder", name))
                .spawn_scoped(s, move || {
                    for task in tasks {
                        // Every worker is gone, nobody left to do the work.
                        if to_workers.send(task).is_err() {
                            break;
                        }
                    }
                })?;

            for i in 0..num_workers {
                let from_feeder = from_feeder.clone();
                let to_collector = to_collector.clone();

                thread::Builder::new()
                    .name(format!("{}-{}", name, i))
                    .spawn_scoped(s, move || {
                        for task in from_feeder {
                            match panic::catch_unwind(AssertUnwindSafe(|| work(task))) {
                                Ok(Ok(output)) => {
                                    if to_collector.send(output).is_err() {
                                        break;
                                    }
                                }
                                Ok(Err(err)) => error!("{} task failed: {}", name, err),
                                Err(_) => error!("{} task panicked, skipping it", name),
                            }
                        }
                    })?;
            }

            // Only the workers hold these now, so the collector loop ends when they finish.
            drop(from_feeder);
            drop(to_collector);

            let mut results = Vec::with_capacity(num_tasks);
            for output in from_workers {
                results.push(output);

                if results.len() % PROGRESS_INTERVAL == 0 {
                    info!(
                        "{}: {} of {} tasks complete",
                        name,
                        results.len(),
                        num_tasks
                    );
                }
            }

            if results.len() < num_tasks {
                error!(
                    "{}: {} of {} tasks produced no result",
                    name,
                    num_tasks - results.len(),
                    num_tasks
                );
            }

            Ok(results)
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::error::PortsError;

    #[test]
    fn test_every_task_runs() {
        let pool = WorkerPool::new(4);
        let tasks: Vec<u64> = (0..5000).collect();

        let mut results = pool
            .fan_out("squares", tasks, |x| Ok::<_, PortsError>(x * x))
            .unwrap();
        results.sort_unstable();

        let expected: Vec<u64> = (0..5000).map(|x| x * x).collect();
        assert_eq!(results, expected);
    }

    #[test]
    fn test_failed_tasks_are_skipped() {
        let pool = WorkerPool::new(3);
        let tasks: Vec<i32> = (0..20).collect();

        let mut results = pool
            .fan_out("evens", tasks, |x| {
                if x % 2 == 0 {
                    Ok(x)
                } else {
                    Err(PortsError::InvalidParameter(format!("{} is odd", x)))
                }
            })
            .unwrap();
        results.sort_unstable();

        assert_eq!(results, (0..20).filter(|x| x % 2 == 0).collect::<Vec<_>>());
    }

    #[test]
    fn test_panicking_task_does_not_stop_siblings() {
        let pool = WorkerPool::new(2);
        let tasks: Vec<i32> = (0..10).collect();

        let results = pool
            .fan_out("fragile", tasks, |x| {
                if x == 3 {
                    panic!("task {} blew up", x);
                }
                Ok::<_, PortsError>(x)
            })
            .unwrap();

        assert_eq!(results.len(), 9);
        assert!(!results.contains(&3));
    }

    #[test]
    fn test_tasks_can_borrow() {
        let data = vec![1.0, 2.0, 3.0, 4.0];
        let chunks: Vec<&[f64]> = data.chunks(2).collect();

        let mut sums = WorkerPool::default()
            .fan_out("sums", chunks, |chunk| {
                Ok::<_, PortsError>(chunk.iter().sum::<f64>())
            })
            .unwrap();
        sums.sort_by(f64::total_cmp);

        assert_eq!(sums, vec![3.0, 7.0]);
    }

    #[test]
    fn test_no_tasks() {
        let results = WorkerPool::new(0)
            .fan_out("nothing", Vec::<u8>::new(), |x| Ok::<_, PortsError>(x))
            .unwrap();
        assert!(results.is_empty());
        assert_eq!(WorkerPool::new(0).num_workers(), 1);
    }
}
