//! Command-line interface definitions

use std::time::Duration;

use clap::{Parser, Subcommand};
use semgate_sync::SemaphoreConfig;

use crate::error::{HarnessError, Result};

/// Stress harness for semaphores, guarded counters and per-key locks
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Scenario to run
    #[command(subcommand)]
    pub command: Command,

    /// Number of worker threads, each with its own runtime (0 = one per CPU)
    #[arg(long, global = true, default_value = "0")]
    pub threads: usize,

    /// Grace window before an unobserved `until` reservation is returned, in milliseconds
    #[arg(long, global = true, default_value = "50")]
    pub until_timeout_ms: u64,

    /// Show progress information
    #[arg(long, global = true)]
    pub progress: bool,

    /// Verbose output (-v, -vv, -vvv)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Quiet mode (suppress all output except errors)
    #[arg(short, long, global = true)]
    pub quiet: bool,
}

/// Scenario to run
#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Many tasks contending for a bounded semaphore
    Semaphore {
        /// Semaphore capacity
        #[arg(long, default_value = "8")]
        capacity: usize,

        /// Total number of tasks across all threads
        #[arg(long, default_value = "1000")]
        tasks: usize,

        /// How long each task holds its slot, in microseconds
        #[arg(long, default_value = "50")]
        hold_us: u64,
    },

    /// Concurrent increments of one guarded counter
    Counter {
        /// Total number of increments across all threads
        #[arg(long, default_value = "10000")]
        increments: usize,
    },

    /// Tasks locking a small set of integer keys
    Numlock {
        /// Number of distinct keys
        #[arg(long, default_value = "16")]
        keys: usize,

        /// Total number of tasks across all threads
        #[arg(long, default_value = "1000")]
        tasks: usize,

        /// How long each task holds its key, in microseconds
        #[arg(long, default_value = "50")]
        hold_us: u64,
    },

    /// Soft waits through `until`, then an idle check through `is_free`
    Until {
        /// Semaphore capacity
        #[arg(long, default_value = "4")]
        capacity: usize,

        /// Total number of `until` rounds across all threads
        #[arg(long, default_value = "100")]
        rounds: usize,
    },
}

impl Args {
    /// Worker thread count after auto-detection
    #[must_use]
    pub fn effective_threads(&self) -> usize {
        if self.threads == 0 {
            num_cpus::get()
        } else {
            self.threads
        }
    }

    /// Semaphore tunables taken from the global flags
    #[must_use]
    pub fn semaphore_config(&self) -> SemaphoreConfig {
        SemaphoreConfig::default()
            .with_until_free_timeout(Duration::from_millis(self.until_timeout_ms))
    }

    /// Reject values no scenario can run with
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::InvalidConfig`] naming the offending value.
    pub fn validate(&self) -> Result<()> {
        if self.effective_threads() == 0 {
            return Err(HarnessError::InvalidConfig(
                "no worker threads available".to_string(),
            ));
        }

        match &self.command {
            Command::Semaphore {
                capacity, tasks, ..
            } => {
                require_positive("capacity", *capacity)?;
                require_positive("tasks", *tasks)
            }
            Command::Counter { increments } => require_positive("increments", *increments),
            Command::Numlock { keys, tasks, .. } => {
                require_positive("keys", *keys)?;
                require_positive("tasks", *tasks)
            }
            Command::Until { capacity, rounds } => {
                require_positive("capacity", *capacity)?;
                require_positive("rounds", *rounds)?;
                if self.until_timeout_ms == 0 {
                    return Err(HarnessError::InvalidConfig(
                        "until timeout must be at least 1 ms".to_string(),
                    ));
                }
                Ok(())
            }
        }
    }
}

/// Reject a zero `value`, naming it in the error
pub(crate) fn require_positive(name: &str, value: usize) -> Result<()> {
    if value == 0 {
        return Err(HarnessError::InvalidConfig(format!("{name} must be at least 1")));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn parse(args: &[&str]) -> Args {
        Args::try_parse_from(std::iter::once("semgate").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_defaults() {
        let args = parse(&["semaphore"]);
        assert_eq!(args.threads, 0);
        assert!(args.effective_threads() >= 1);
        assert_eq!(
            args.semaphore_config().until_free_timeout,
            Duration::from_millis(50)
        );
        assert!(matches!(
            args.command,
            Command::Semaphore {
                capacity: 8,
                tasks: 1000,
                hold_us: 50
            }
        ));
        assert!(args.validate().is_ok());
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let args = parse(&["counter", "--increments", "5", "--threads", "3", "-vv"]);
        assert_eq!(args.effective_threads(), 3);
        assert_eq!(args.verbose, 2);
        assert!(matches!(args.command, Command::Counter { increments: 5 }));
    }

    #[rstest]
    #[case(&["semaphore", "--capacity", "0"], "capacity must be at least 1")]
    #[case(&["semaphore", "--tasks", "0"], "tasks must be at least 1")]
    #[case(&["counter", "--increments", "0"], "increments must be at least 1")]
    #[case(&["numlock", "--keys", "0"], "keys must be at least 1")]
    #[case(&["until", "--until-timeout-ms", "0"], "until timeout must be at least 1 ms")]
    fn test_validate_rejects(#[case] argv: &[&str], #[case] message: &str) {
        let err = parse(argv).validate().unwrap_err();
        assert!(err.to_string().contains(message), "{err}");
    }
}
