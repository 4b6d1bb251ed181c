#![forbid(unsafe_code)]

use crate::error::{HarnessError, Result, RunError};
use crate::spec_loader::TestCase;
use crossbeam_channel::{Receiver, RecvTimeoutError};
use std::collections::HashMap;
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::OnceLock;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, error, info};

const POLL_INTERVAL: Duration = Duration::from_millis(25);

/// One-time existence check for the simulator executable.
///
/// Every worker may call [`SimulatorGate::ensure`]; only the first call looks
/// at the filesystem and every later call returns the cached answer.
#[derive(Debug)]
pub struct SimulatorGate {
    configured: PathBuf,
    resolved: OnceLock<Option<PathBuf>>,
}

impl SimulatorGate {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            configured: path.into(),
            resolved: OnceLock::new(),
        }
    }

    #[must_use]
    pub fn configured_path(&self) -> &Path {
        &self.configured
    }

    /// Whether the check has already run, successfully or not.
    #[must_use]
    pub fn is_checked(&self) -> bool {
        self.resolved.get().is_some()
    }

    /// Absolute path of the simulator, checked at most once per gate.
    pub fn ensure(&self) -> Result<&Path> {
        let resolved = self.resolved.get_or_init(|| {
            match fs::canonicalize(&self.configured) {
                Ok(path) if path.is_file() => {
                    info!(simulator = %path.display(), "simulator executable found, continuing");
                    Some(path)
                }
                _ => {
                    error!(
                        simulator = %self.configured.display(),
                        "simulator executable not found"
                    );
                    None
                }
            }
        });
        resolved
            .as_deref()
            .ok_or_else(|| HarnessError::SimulatorMissing {
                path: self.configured.clone(),
            })
    }
}

#[derive(Debug, Clone)]
pub struct RunnerSettings {
    pub inputs_root: PathBuf,
    /// `None` waits for the simulator indefinitely.
    pub timeout: Option<Duration>,
}

#[derive(Debug)]
pub struct ProcessOutcome {
    pub elapsed: Duration,
    /// Decoded stdout on a zero exit status.
    pub result: std::result::Result<String, RunError>,
}

/// Keeps every valid UTF-8 sequence and drops the bytes that are not.
#[must_use]
pub fn decode_stdout(bytes: &[u8]) -> String {
    let mut text = String::with_capacity(bytes.len());
    for chunk in bytes.utf8_chunks() {
        text.push_str(chunk.valid());
    }
    text
}

/// Runs `simulator <input_file>` from the case's working directory.
///
/// The elapsed time is taken when the simulator is reaped, whether or not the
/// run succeeds. With a timeout, the whole call returns within that bound even
/// if descendants of the simulator keep its output pipes open.
pub fn run_simulator(case: &TestCase, simulator: &Path, settings: &RunnerSettings) -> ProcessOutcome {
    let cwd = case.working_dir(&settings.inputs_root);
    debug!(test = %case.name, cwd = %cwd.display(), input = %case.input_file, "launching simulator");

    let started = Instant::now();
    let deadline = settings.timeout.map(|timeout| (started + timeout, timeout));
    let spawned = Command::new(simulator)
        .arg(&case.input_file)
        .current_dir(&cwd)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn();
    let mut child = match spawned {
        Ok(child) => child,
        Err(source) => {
            return ProcessOutcome {
                elapsed: started.elapsed(),
                result: Err(RunError::Launch {
                    program: simulator.to_path_buf(),
                    source,
                }),
            };
        }
    };

    // Drain both pipes off-thread so a chatty simulator cannot block on a full
    // pipe while we wait for it.
    let stdout = drain_in_background(child.stdout.take());
    let stderr = drain_in_background(child.stderr.take());

    let status = wait_for_child(&mut child, deadline);
    let elapsed = started.elapsed();
    let result = status.and_then(|status| finish(status, &stdout, &stderr, deadline));
    ProcessOutcome { elapsed, result }
}

fn finish(
    status: ExitStatus,
    stdout: &Receiver<Vec<u8>>,
    stderr: &Receiver<Vec<u8>>,
    deadline: Option<(Instant, Duration)>,
) -> std::result::Result<String, RunError> {
    let stdout_bytes = collect(stdout, deadline)?;
    let stderr_bytes = collect(stderr, deadline)?;
    if !status.success() {
        return Err(RunError::ExitStatus {
            status,
            stderr: String::from_utf8_lossy(&stderr_bytes).trim().to_string(),
        });
    }
    Ok(decode_stdout(&stdout_bytes))
}

fn drain_in_background(pipe: Option<impl Read + Send + 'static>) -> Receiver<Vec<u8>> {
    let (tx, rx) = crossbeam_channel::bounded(1);
    thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut pipe) = pipe {
            let _ = pipe.read_to_end(&mut buf);
        }
        let _ = tx.send(buf);
    });
    rx
}

/// Output of one pipe. A descendant that outlives the simulator can hold the
/// pipe open, so the read is abandoned at the deadline.
fn collect(
    rx: &Receiver<Vec<u8>>,
    deadline: Option<(Instant, Duration)>,
) -> std::result::Result<Vec<u8>, RunError> {
    let received = match deadline {
        Some((at, _)) => rx.recv_deadline(at),
        None => rx.recv().map_err(|_| RecvTimeoutError::Disconnected),
    };
    match received {
        Ok(bytes) => Ok(bytes),
        Err(RecvTimeoutError::Disconnected) => Ok(Vec::new()),
        Err(RecvTimeoutError::Timeout) => Err(RunError::TimedOut(
            deadline.map_or(Duration::ZERO, |(_, timeout)| timeout),
        )),
    }
}

fn wait_for_child(
    child: &mut Child,
    deadline: Option<(Instant, Duration)>,
) -> std::result::Result<ExitStatus, RunError> {
    let Some((at, timeout)) = deadline else {
        return child.wait().map_err(RunError::Wait);
    };

    loop {
        match child.try_wait() {
            Ok(Some(status)) => return Ok(status),
            Ok(None) => {
                if Instant::now() >= at {
                    kill_process_tree(child.id());
                    let _ = child.kill();
                    child.wait().map_err(RunError::Wait)?;
                    return Err(RunError::TimedOut(timeout));
                }
                thread::sleep(POLL_INTERVAL);
            }
            Err(err) => return Err(RunError::Wait(err)),
        }
    }
}

/// Kills `pid` and every process below it, leaves first.
fn kill_process_tree(pid: u32) {
    let root = sysinfo::Pid::from_u32(pid);
    let mut sys = sysinfo::System::new();
    sys.refresh_processes(sysinfo::ProcessesToUpdate::All, true);

    let mut children_map: HashMap<sysinfo::Pid, Vec<sysinfo::Pid>> = HashMap::new();
    for (pid, process) in sys.processes() {
        if let Some(parent) = process.parent() {
            children_map.entry(parent).or_default().push(*pid);
        }
    }

    let mut to_kill = Vec::new();
    collect_process_tree(root, &children_map, &mut to_kill);
    debug!(root = pid, processes = to_kill.len(), "killing simulator process tree");
    for pid in to_kill.into_iter().rev() {
        if let Some(process) = sys.process(pid) {
            let _ = process.kill();
        }
    }
}

fn collect_process_tree(
    pid: sysinfo::Pid,
    children_map: &HashMap<sysinfo::Pid, Vec<sysinfo::Pid>>,
    out: &mut Vec<sysinfo::Pid>,
) {
    out.push(pid);
    if let Some(children) = children_map.get(&pid) {
        for child in children {
            collect_process_tree(*child, children_map, out);
        }
    }
}
