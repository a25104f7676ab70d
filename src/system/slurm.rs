//! Slurm job integration
//!
//! Renders the sbatch scripts that run a collection on a cluster node,
//! submits them, and reads the allocation of the job we are running in.
//! A collection is a single sequential process, so every profile asks for
//! one node and one task; profiles differ only in memory and wall time.

use crate::error::{Result, StockPullError};
use serde::Serialize;
use std::env;
use std::io::Write;
use std::path::PathBuf;
use std::process::{Command, Stdio};

/// Resources and payload of one sbatch script
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobProfile {
    /// Job name
    pub name: String,
    /// Partition/queue
    pub partition: Option<String>,
    /// Number of nodes
    pub nodes: u32,
    /// Number of tasks
    pub ntasks: u32,
    /// Memory as passed to `--mem` (e.g. `64g`)
    pub memory: String,
    /// Time limit (seconds)
    pub time_limit: u64,
    /// Events that trigger a notification mail
    pub mail_type: String,
    /// Notification address; no mail directives without one
    pub mail_user: Option<String>,
    /// Working directory of the job
    pub work_dir: Option<PathBuf>,
    /// Conda environment activated before the command
    pub env_name: String,
    /// Command run inside the environment
    pub command: Vec<String>,
}

impl JobProfile {
    fn base(memory: &str, time_limit: u64) -> Self {
        Self {
            name: "stockpull".to_string(),
            partition: None,
            nodes: 1,
            ntasks: 1,
            memory: memory.to_string(),
            time_limit,
            mail_type: "BEGIN,END,FAIL".to_string(),
            mail_user: None,
            work_dir: None,
            env_name: "stockpull".to_string(),
            command: vec!["stockpull".to_string(), "pull".to_string()],
        }
    }

    /// 64g for 12 hours
    pub fn standard() -> Self {
        Self::base("64g", 12 * 3600)
    }

    /// 16g for 2 days
    pub fn long() -> Self {
        Self::base("16g", 2 * 86400)
    }

    /// Set the partition
    pub fn partition(mut self, partition: Option<String>) -> Self {
        self.partition = partition;
        self
    }

    /// Set the notification address
    pub fn mail_user(mut self, mail_user: Option<String>) -> Self {
        self.mail_user = mail_user;
        self
    }

    /// Set the conda environment
    pub fn env_name(mut self, env_name: impl Into<String>) -> Self {
        self.env_name = env_name.into();
        self
    }

    /// Set the job working directory
    pub fn work_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.work_dir = dir;
        self
    }

    /// Override memory; accepts Slurm sizes such as `32g` or `4096M`
    pub fn memory(mut self, memory: &str) -> Result<Self> {
        if parse_memory(memory).is_none() {
            return Err(StockPullError::config(format!("Invalid memory size '{}'", memory)));
        }
        self.memory = memory.trim().to_string();
        Ok(self)
    }

    /// Override wall time; accepts `D-HH:MM:SS`, `HH:MM:SS` or `MM:SS`
    pub fn time(mut self, time: &str) -> Result<Self> {
        self.time_limit = parse_slurm_time(time)
            .ok_or_else(|| StockPullError::config(format!("Invalid time limit '{}'", time)))?;
        Ok(self)
    }

    /// Render the sbatch script
    pub fn render(&self) -> String {
        let mut script = String::from("#!/bin/bash\n");

        script.push_str(&format!("#SBATCH --job-name={}\n", self.name));
        if let Some(ref partition) = self.partition {
            script.push_str(&format!("#SBATCH --partition={}\n", partition));
        }
        script.push_str(&format!("#SBATCH --nodes={}\n", self.nodes));
        script.push_str(&format!("#SBATCH --ntasks={}\n", self.ntasks));
        script.push_str(&format!("#SBATCH --mem={}\n", self.memory));
        script.push_str(&format!("#SBATCH --time={}\n", format_slurm_time(self.time_limit)));
        if let Some(ref mail_user) = self.mail_user {
            script.push_str(&format!("#SBATCH --mail-type={}\n", self.mail_type));
            script.push_str(&format!("#SBATCH --mail-user={}\n", mail_user));
        }
        if let Some(ref dir) = self.work_dir {
            script.push_str(&format!("#SBATCH --chdir={}\n", dir.display()));
        }

        script.push_str("\n# Environment\n");
        script.push_str(&format!("source activate {}\n", shell_quote(&self.env_name)));

        script.push_str("\n# Collect\n");
        let command: Vec<String> = self.command.iter().map(|arg| shell_quote(arg)).collect();
        script.push_str(&format!("{}\n", command.join(" ")));

        script
    }

    /// Submit the script through `sbatch` and return the job ID
    pub fn submit(&self) -> Result<String> {
        let script = self.render();

        let mut child = Command::new("sbatch")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| StockPullError::Scheduler(format!("Failed to run sbatch: {}", e)))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(script.as_bytes())
                .map_err(|e| StockPullError::Scheduler(format!("Failed to send script: {}", e)))?;
        }

        let output = child
            .wait_with_output()
            .map_err(|e| StockPullError::Scheduler(format!("sbatch did not finish: {}", e)))?;

        if output.status.success() {
            let stdout = String::from_utf8_lossy(&output.stdout);
            parse_submitted_job_id(&stdout).ok_or_else(|| {
                StockPullError::Scheduler(format!("Unexpected sbatch output: {}", stdout.trim()))
            })
        } else {
            Err(StockPullError::Scheduler(
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ))
        }
    }
}

/// Allocation of the Slurm job this process runs in
#[derive(Debug, Clone, Default, Serialize)]
pub struct SlurmJob {
    pub job_id: Option<String>,
    pub job_name: Option<String>,
    pub partition: Option<String>,
    pub num_nodes: Option<u32>,
    pub num_tasks: Option<u32>,
    pub cpus_per_task: Option<u32>,
    /// Memory per node (bytes)
    pub memory: Option<u64>,
    /// Time limit (seconds)
    pub time_limit: Option<u64>,
    pub submit_dir: Option<PathBuf>,
    pub node_list: Vec<String>,
}

impl SlurmJob {
    /// Read the job from `SLURM_*` environment variables
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Read the job through an arbitrary variable lookup
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let number = |key: &str| lookup(key).and_then(|s| s.trim().parse().ok());

        Self {
            job_id: lookup("SLURM_JOB_ID"),
            job_name: lookup("SLURM_JOB_NAME"),
            partition: lookup("SLURM_JOB_PARTITION"),
            num_nodes: number("SLURM_NNODES"),
            num_tasks: number("SLURM_NTASKS"),
            cpus_per_task: number("SLURM_CPUS_PER_TASK"),
            memory: lookup("SLURM_MEM_PER_NODE").and_then(|s| parse_memory(&s)),
            time_limit: lookup("SLURM_TIMELIMIT").and_then(|s| parse_slurm_time(&s)),
            submit_dir: lookup("SLURM_SUBMIT_DIR").map(PathBuf::from),
            node_list: lookup("SLURM_NODELIST")
                .map(|s| expand_node_list(&s))
                .unwrap_or_default(),
        }
    }

    /// Check if running inside a job
    pub fn is_job(&self) -> bool {
        self.job_id.is_some()
    }

    /// One-line description for the run banner
    pub fn banner(&self) -> String {
        let Some(ref id) = self.job_id else {
            return "not running under Slurm".to_string();
        };
        let mut parts = vec![format!("Slurm job {}", id)];
        if let Some(ref name) = self.job_name {
            parts.push(format!("name={}", name));
        }
        if let Some(ref partition) = self.partition {
            parts.push(format!("partition={}", partition));
        }
        if !self.node_list.is_empty() {
            parts.push(format!("nodes={}", self.node_list.join(",")));
        }
        if let Some(memory) = self.memory {
            parts.push(format!("mem={}", humansize::format_size(memory, humansize::BINARY)));
        }
        if let Some(limit) = self.time_limit {
            parts.push(format!("time={}", format_slurm_time(limit)));
        }
        parts.join(" ")
    }
}

// Helper functions

/// Job ID from `Submitted batch job 12345`
fn parse_submitted_job_id(stdout: &str) -> Option<String> {
    stdout
        .split_whitespace()
        .last()
        .filter(|id| id.chars().all(|c| c.is_ascii_digit()))
        .map(str::to_string)
}

/// Parse a Slurm memory size into bytes; a bare number means megabytes
pub fn parse_memory(s: &str) -> Option<u64> {
    let s = s.trim().to_uppercase();
    let (num_str, mult) = if let Some(n) = s.strip_suffix('T') {
        (n, 1024 * 1024 * 1024 * 1024u64)
    } else if let Some(n) = s.strip_suffix('G') {
        (n, 1024 * 1024 * 1024u64)
    } else if let Some(n) = s.strip_suffix('M') {
        (n, 1024 * 1024u64)
    } else if let Some(n) = s.strip_suffix('K') {
        (n, 1024u64)
    } else {
        (s.as_str(), 1024 * 1024u64)
    };

    num_str.parse::<u64>().ok().and_then(|n| n.checked_mul(mult))
}

/// Parse `D-HH:MM:SS`, `D-HH`, `HH:MM:SS` or `MM:SS` into seconds
pub fn parse_slurm_time(s: &str) -> Option<u64> {
    let s = s.trim();
    let (days, time_str) = match s.split_once('-') {
        Some((days, rest)) => (days.parse::<u64>().ok()?, rest),
        None => (0, s),
    };

    let fields = time_str
        .split(':')
        .map(|p| p.parse::<u64>().ok())
        .collect::<Option<Vec<u64>>>()?;
    let (hours, minutes, seconds) = match (days > 0 || s.contains('-'), fields.as_slice()) {
        (_, [h, m, sec]) => (*h, *m, *sec),
        (true, [h, m]) => (*h, *m, 0),
        (true, [h]) => (*h, 0, 0),
        (false, [m, sec]) => (0, *m, *sec),
        (false, [m]) => (0, *m, 0),
        _ => return None,
    };

    Some(days * 86400 + hours * 3600 + minutes * 60 + seconds)
}

/// Format seconds as `HH:MM:SS`, or `D-HH:MM:SS` beyond one day
pub fn format_slurm_time(seconds: u64) -> String {
    let days = seconds / 86400;
    let hours = (seconds % 86400) / 3600;
    let minutes = (seconds % 3600) / 60;
    let secs = seconds % 60;

    if days > 0 {
        format!("{}-{:02}:{:02}:{:02}", days, hours, minutes, secs)
    } else {
        format!("{:02}:{:02}:{:02}", hours, minutes, secs)
    }
}

/// Single-quote `arg` for bash unless it is made of plain characters
fn shell_quote(arg: &str) -> String {
    let plain = !arg.is_empty()
        && arg
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./=:,@+%".contains(c));
    if plain {
        arg.to_string()
    } else {
        format!("'{}'", arg.replace('\'', "'\\''"))
    }
}

/// Expand a Slurm hostlist such as `node[01-02],gpu05` into host names
fn expand_node_list(nodelist: &str) -> Vec<String> {
    split_top_level(nodelist)
        .into_iter()
        .map(str::trim)
        .filter(|group| !group.is_empty())
        .flat_map(expand_node_group)
        .collect()
}

/// Split on commas that sit outside brackets
fn split_top_level(nodelist: &str) -> Vec<&str> {
    let mut groups = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    for (i, c) in nodelist.char_indices() {
        match c {
            '[' => depth += 1,
            ']' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                groups.push(&nodelist[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    groups.push(&nodelist[start..]);
    groups
}

fn expand_node_group(group: &str) -> Vec<String> {
    let bracket = group
        .find('[')
        .and_then(|open| group[open..].find(']').map(|len| (open, open + len)));
    let Some((open, close)) = bracket else {
        return vec![group.to_string()];
    };

    let prefix = &group[..open];
    let suffix = &group[close + 1..];
    let mut nodes = Vec::new();
    for range in group[open + 1..close].split(',') {
        match range.split_once('-') {
            Some((start, end)) => {
                if let (Ok(s), Ok(e)) = (start.parse::<u32>(), end.parse::<u32>()) {
                    let width = start.len();
                    for i in s..=e {
                        nodes.push(format!("{}{:0width$}{}", prefix, i, suffix, width = width));
                    }
                }
            }
            None => nodes.push(format!("{}{}{}", prefix, range, suffix)),
        }
    }
    nodes
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn directives(script: &str) -> Vec<&str> {
        script.lines().filter(|l| l.starts_with("#SBATCH")).collect()
    }

    #[test]
    fn test_standard_profile_directives() {
        let script = JobProfile::standard().render();
        let lines = directives(&script);

        assert!(script.starts_with("#!/bin/bash\n"));
        assert!(lines.contains(&"#SBATCH --nodes=1"));
        assert!(lines.contains(&"#SBATCH --ntasks=1"));
        assert!(lines.contains(&"#SBATCH --mem=64g"));
        assert!(lines.contains(&"#SBATCH --time=12:00:00"));
        assert!(!script.contains("--mail-user"));
        assert!(script.ends_with("source activate stockpull\n\n# Collect\nstockpull pull\n"));
    }

    #[test]
    fn test_long_profile_directives() {
        let script = JobProfile::long()
            .partition(Some("compute".to_string()))
            .mail_user(Some("me@example.edu".to_string()))
            .render();
        let lines = directives(&script);

        assert!(lines.contains(&"#SBATCH --mem=16g"));
        assert!(lines.contains(&"#SBATCH --time=2-00:00:00"));
        assert!(lines.contains(&"#SBATCH --partition=compute"));
        assert!(lines.contains(&"#SBATCH --mail-type=BEGIN,END,FAIL"));
        assert!(lines.contains(&"#SBATCH --mail-user=me@example.edu"));
    }

    #[test]
    fn test_profile_overrides() {
        let profile = JobProfile::standard()
            .memory("32g")
            .unwrap()
            .time("1-06:00:00")
            .unwrap();
        assert_eq!(profile.memory, "32g");
        assert_eq!(profile.time_limit, 30 * 3600);

        assert!(JobProfile::standard().memory("lots").is_err());
        assert!(JobProfile::standard().time("12h").is_err());
    }

    #[test]
    fn test_command_arguments_are_quoted() {
        let mut profile = JobProfile::standard();
        profile.command.push("--data-dir=/scratch/my data".to_string());
        profile.command.push("--config=/home/o'neil/pull.json".to_string());

        let script = profile.render();

        assert!(script.contains(
            "stockpull pull '--data-dir=/scratch/my data' '--config=/home/o'\\''neil/pull.json'\n"
        ));
        assert_eq!(shell_quote("--proxies=/data/proxy_list.txt"), "--proxies=/data/proxy_list.txt");
        assert_eq!(shell_quote(""), "''");
    }

    #[test]
    fn test_format_slurm_time() {
        assert_eq!(format_slurm_time(3600), "01:00:00");
        assert_eq!(format_slurm_time(90061), "1-01:01:01");
        assert_eq!(format_slurm_time(172800), "2-00:00:00");
    }

    #[test]
    fn test_parse_slurm_time() {
        assert_eq!(parse_slurm_time("12:00:00"), Some(43200));
        assert_eq!(parse_slurm_time("2-00:00:00"), Some(172800));
        assert_eq!(parse_slurm_time("1-12"), Some(129600));
        assert_eq!(parse_slurm_time("30:00"), Some(1800));
        assert_eq!(parse_slurm_time("UNLIMITED"), None);
    }

    #[test]
    fn test_parse_memory() {
        assert_eq!(parse_memory("64g"), Some(64 * 1024 * 1024 * 1024));
        assert_eq!(parse_memory("512M"), Some(512 * 1024 * 1024));
        assert_eq!(parse_memory("1024K"), Some(1024 * 1024));
        assert_eq!(parse_memory("16384"), Some(16384 * 1024 * 1024));
        assert_eq!(parse_memory("g"), None);
    }

    #[test]
    fn test_parse_submitted_job_id() {
        assert_eq!(
            parse_submitted_job_id("Submitted batch job 4242\n").as_deref(),
            Some("4242")
        );
        assert_eq!(parse_submitted_job_id("error"), None);
    }

    #[test]
    fn test_expand_node_list() {
        assert_eq!(
            expand_node_list("node[01-04]"),
            vec!["node01", "node02", "node03", "node04"]
        );
        assert_eq!(expand_node_list("cn[1,3-4]"), vec!["cn1", "cn3", "cn4"]);
        assert_eq!(expand_node_list("node1,node2"), vec!["node1", "node2"]);
        assert_eq!(
            expand_node_list("node[01-02],gpu05"),
            vec!["node01", "node02", "gpu05"]
        );
        assert_eq!(expand_node_list("cpu1,gpu[1-2]"), vec!["cpu1", "gpu1", "gpu2"]);
        assert_eq!(
            expand_node_list("a[1-2],b[7,9]"),
            vec!["a1", "a2", "b7", "b9"]
        );
    }

    #[test]
    fn test_expand_malformed_node_list() {
        assert_eq!(expand_node_list("node]1-2["), vec!["node]1-2["]);
        assert!(expand_node_list("").is_empty());
    }

    #[test]
    fn test_job_from_lookup() {
        let vars: HashMap<&str, &str> = [
            ("SLURM_JOB_ID", "777"),
            ("SLURM_JOB_NAME", "stockpull"),
            ("SLURM_NNODES", "1"),
            ("SLURM_NTASKS", "1"),
            ("SLURM_MEM_PER_NODE", "65536"),
            ("SLURM_NODELIST", "gpu[07-08]"),
        ]
        .into_iter()
        .collect();

        let job = SlurmJob::from_lookup(|k| vars.get(k).map(|v| v.to_string()));

        assert!(job.is_job());
        assert_eq!(job.num_nodes, Some(1));
        assert_eq!(job.memory, Some(64 * 1024 * 1024 * 1024));
        assert_eq!(job.node_list, vec!["gpu07", "gpu08"]);
        assert!(job.banner().starts_with("Slurm job 777 name=stockpull"));

        let outside = SlurmJob::from_lookup(|_| None);
        assert!(!outside.is_job());
        assert_eq!(outside.banner(), "not running under Slurm");
    }
}
