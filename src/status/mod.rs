//! Friend reachability checks.
//!
//! - [`prober`] - decides whether one URL is live, via an ordered chain of
//!   [`ProbeStrategy`] values (remote status lookup, then a direct HEAD)
//! - [`orchestrator`] - walks the friends directory, probes each friend,
//!   decides the next state and writes it back through the frontmatter codec
//!
//! # Example
//!
//! ```ignore
//! use friendlink::status::{Prober, StatusChecker};
//!
//! let prober = Prober::from_config(client, &config);
//! let checker = StatusChecker::new(prober, config.friends_path(), config.pace());
//! let report = checker.run_check_cycle().await?;
//! ```

pub mod orchestrator;
pub mod prober;

pub use orchestrator::{decide, CheckError, CycleReport, Decision, StatusChecker};
pub use prober::{ProbeStrategy, Prober, DEFAULT_STATUS_API};
