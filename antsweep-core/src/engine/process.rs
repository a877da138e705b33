//! Engine running as a separate operating system process.
//!
//! The external process is expected to speak a simple line-oriented JSON
//! protocol over its standard input and output. Every request is a single
//! line with an `op` field:
//!
//! ```text
//! {"op":"open_model","path":"./AntsCompSave.nlogo"}
//! {"op":"command","text":"random-seed 42"}
//! {"op":"schedule_reporters","names":["num-ants"],"start":10,"stop":100,"interval":10}
//! ```
//!
//! Every request is answered with a single line:
//!
//! ```text
//! {"ok":true}
//! {"ok":true,"values":[[120,118,115]]}
//! {"ok":false,"error":"nothing named FOO has been defined"}
//! ```
//!
//! Anything written to the process's standard error is passed through.

use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::sync::{Arc, Mutex};

use super::{Engine, EngineFactory, ReportValue, Terminate, TerminateHandle};
use crate::error::Error;
use crate::{Result, Tick};

#[derive(Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
enum Request<'a> {
    OpenModel {
        path: &'a str,
    },
    Command {
        text: &'a str,
    },
    ScheduleReporters {
        names: &'a [&'a str],
        start: Tick,
        stop: Tick,
        interval: Tick,
    },
}

#[derive(Deserialize)]
struct Response {
    ok: bool,
    #[serde(default)]
    values: Option<Vec<Vec<ReportValue>>>,
    #[serde(default)]
    error: Option<String>,
}

/// Child process shared between the engine and its terminate handles.
struct EngineProcess {
    pid: u32,
    child: Mutex<Child>,
}

impl EngineProcess {
    /// Kills and reaps the process. Does nothing if it's already gone.
    fn kill(&self) {
        let mut child = match self.child.lock() {
            Ok(child) => child,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Ok(Some(_)) = child.try_wait() {
            return;
        }
        if let Err(e) = child.kill() {
            trace!("engine process {} already gone: {}", self.pid, e);
        }
        let _ = child.wait();
    }
}

impl Terminate for EngineProcess {
    fn terminate(&self) {
        warn!("terminating engine process {}", self.pid);
        self.kill();
    }
}

/// Handle to a running external engine process.
///
/// The process is killed when the handle is dropped, or earlier through
/// a [`TerminateHandle`] obtained from the engine.
///
/// [`TerminateHandle`]: ../type.TerminateHandle.html
pub struct ProcessEngine {
    process: Arc<EngineProcess>,
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
}

impl ProcessEngine {
    /// Spawns a new engine process.
    pub fn spawn(program: &str, args: &[String], work_dir: Option<&Path>) -> Result<Self> {
        let mut cmd = Command::new(program);
        cmd.args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit());
        if let Some(dir) = work_dir {
            cmd.current_dir(dir);
        }
        let mut child = cmd
            .spawn()
            .map_err(|e| Error::EngineSpawn(format!("{}: {}", program, e)))?;
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| Error::EngineSpawn("engine stdin not captured".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::EngineSpawn("engine stdout not captured".to_string()))?;
        let pid = child.id();
        debug!("spawned engine process {} (pid {})", program, pid);
        Ok(Self {
            process: Arc::new(EngineProcess {
                pid,
                child: Mutex::new(child),
            }),
            stdin,
            stdout: BufReader::new(stdout),
        })
    }

    /// Operating system identifier of the engine process.
    pub fn pid(&self) -> u32 {
        self.process.pid
    }

    fn request(&mut self, req: &Request) -> Result<Response> {
        let mut line = serde_json::to_string(req)?;
        line.push('\n');
        self.stdin
            .write_all(line.as_bytes())
            .and_then(|_| self.stdin.flush())
            .map_err(|e| Error::EngineTransport(format!("failed writing request: {}", e)))?;

        let mut buf = String::new();
        let read = self
            .stdout
            .read_line(&mut buf)
            .map_err(|e| Error::EngineTransport(format!("failed reading response: {}", e)))?;
        if read == 0 {
            return Err(Error::EngineTransport(
                "engine process closed its output".to_string(),
            ));
        }
        let buf = buf.trim_end();
        serde_json::from_str(buf)
            .map_err(|e| Error::EngineTransport(format!("unparseable response {:?}: {}", buf, e)))
    }

    fn request_ok(&mut self, req: &Request, described: &str) -> Result<Response> {
        let resp = self.request(req)?;
        if resp.ok {
            Ok(resp)
        } else {
            Err(Error::EngineCommand {
                command: described.to_string(),
                message: resp.error.unwrap_or_else(|| "unknown error".to_string()),
            })
        }
    }
}

impl Engine for ProcessEngine {
    fn open_model(&mut self, path: &Path) -> Result<()> {
        let path = path.to_string_lossy();
        self.request_ok(
            &Request::OpenModel { path: &path },
            &format!("open-model {}", path),
        )?;
        Ok(())
    }

    fn command(&mut self, text: &str) -> Result<()> {
        self.request_ok(&Request::Command { text }, text)?;
        Ok(())
    }

    fn schedule_reporters(
        &mut self,
        names: &[&str],
        start: Tick,
        stop: Tick,
        interval: Tick,
    ) -> Result<Vec<Vec<ReportValue>>> {
        let described = format!("schedule-reporters {:?} {} {} {}", names, start, stop, interval);
        let resp = self.request_ok(
            &Request::ScheduleReporters {
                names,
                start,
                stop,
                interval,
            },
            &described,
        )?;
        resp.values.ok_or_else(|| {
            Error::EngineTransport("reporter response is missing values".to_string())
        })
    }

    fn terminate_handle(&self) -> Option<TerminateHandle> {
        let handle: TerminateHandle = self.process.clone();
        Some(handle)
    }
}

impl Drop for ProcessEngine {
    fn drop(&mut self) {
        self.process.kill();
    }
}

/// Spawns [`ProcessEngine`]s from a stored command line.
///
/// [`ProcessEngine`]: struct.ProcessEngine.html
#[derive(Debug, Clone)]
pub struct ProcessEngineFactory {
    pub program: String,
    pub args: Vec<String>,
    pub work_dir: Option<PathBuf>,
}

impl ProcessEngineFactory {
    /// Creates a factory from a full command line, split using shell
    /// quoting rules, e.g. `java -jar "netlogo headless.jar" --stdio`.
    pub fn from_command_line(line: &str) -> Result<Self> {
        let mut parts = shlex::split(line)
            .ok_or_else(|| Error::config("engine", line, "unbalanced quotes"))?;
        if parts.is_empty() {
            return Err(Error::config("engine", line, "empty engine command"));
        }
        let program = parts.remove(0);
        Ok(Self {
            program,
            args: parts,
            work_dir: None,
        })
    }

    pub fn with_work_dir(mut self, dir: PathBuf) -> Self {
        self.work_dir = Some(dir);
        self
    }
}

impl EngineFactory for ProcessEngineFactory {
    type Engine = ProcessEngine;

    fn create(&self) -> Result<ProcessEngine> {
        ProcessEngine::spawn(&self.program, &self.args, self.work_dir.as_deref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn factory_splits_command_line() {
        let factory =
            ProcessEngineFactory::from_command_line("java -jar \"netlogo headless.jar\" --stdio")
                .unwrap();
        assert_eq!(factory.program, "java");
        assert_eq!(factory.args, vec!["-jar", "netlogo headless.jar", "--stdio"]);
    }

    #[test]
    fn factory_rejects_empty_command() {
        assert!(ProcessEngineFactory::from_command_line("   ").is_err());
        assert!(ProcessEngineFactory::from_command_line("java \"unterminated").is_err());
    }

    #[test]
    fn request_wire_format() {
        let names = ["num-ants", "num-food"];
        let line = serde_json::to_string(&Request::ScheduleReporters {
            names: &names,
            start: 10,
            stop: 100,
            interval: 10,
        })
        .unwrap();
        assert_eq!(
            line,
            r#"{"op":"schedule_reporters","names":["num-ants","num-food"],"start":10,"stop":100,"interval":10}"#
        );
        let line = serde_json::to_string(&Request::Command { text: "setup" }).unwrap();
        assert_eq!(line, r#"{"op":"command","text":"setup"}"#);
    }

    #[test]
    fn response_parsing() {
        let resp: Response = serde_json::from_str(r#"{"ok":true,"values":[[1,2.5,"x"]]}"#).unwrap();
        assert!(resp.ok);
        assert_eq!(
            resp.values.unwrap(),
            vec![vec![
                ReportValue::Number(1.0),
                ReportValue::Number(2.5),
                ReportValue::Text("x".to_string())
            ]]
        );
        let resp: Response = serde_json::from_str(r#"{"ok":false,"error":"boom"}"#).unwrap();
        assert!(!resp.ok);
        assert_eq!(resp.error.as_deref(), Some("boom"));
    }

    #[cfg(unix)]
    #[test]
    fn spawn_failure_is_reported() {
        let factory = ProcessEngineFactory::from_command_line("/nonexistent/engine-binary").unwrap();
        match factory.create() {
            Err(Error::EngineSpawn(_)) => (),
            other => panic!("unexpected: {:?}", other.map(|e| e.pid())),
        }
    }
}
