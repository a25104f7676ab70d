//! Cluster integration module
//!
//! Renders and submits the Slurm batch jobs that wrap a collection, and
//! reports the allocation when running inside one.

pub mod slurm;

pub use slurm::{format_slurm_time, parse_memory, parse_slurm_time, JobProfile, SlurmJob};
