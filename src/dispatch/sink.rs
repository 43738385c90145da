use crate::config::{Settings, SubmissionConfig};
use crate::error::DispatchError;
use crate::events::MispEvent;
use log::{debug, warn};
use std::collections::BTreeMap;
use std::ffi::OsString;
use std::process::{Command, Stdio};

/// Destination that creates one event on the MISP server
///
/// Implementations hand the event off and return once the hand-off has
/// started; they do not report whether the server accepted it.
#[cfg_attr(test, mockall::automock)]
pub trait SubmissionSink {
    /// Hand one event to the sink
    ///
    /// # Errors
    ///
    /// Returns `DispatchError` if the hand-off could not be started.
    fn submit(
        &self,
        settings: &Settings,
        key: &str,
        event: &MispEvent,
    ) -> Result<(), DispatchError>;
}

/// A fully described child process invocation
///
/// The environment is explicit: the child sees exactly `env` and nothing
/// inherited from the current process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchSpec {
    pub program: String,
    pub args: Vec<String>,
    pub env: BTreeMap<String, String>,
}

impl LaunchSpec {
    /// Start the process with detached stdio and without waiting for it
    pub fn spawn(&self) -> Result<(), DispatchError> {
        Command::new(&self.program)
            .args(&self.args)
            .env_clear()
            .envs(&self.env)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| DispatchError::SpawnFailed(format!("{}: {}", self.program, e)))?;
        Ok(())
    }
}

/// Keep the variables of an environment snapshot that are valid UTF-8
///
/// Each dropped variable is logged by name.
pub fn utf8_environment<I>(vars: I) -> Vec<(String, String)>
where
    I: IntoIterator<Item = (OsString, OsString)>,
{
    vars.into_iter()
        .filter_map(|(name, value)| match (name.into_string(), value.into_string()) {
            (Ok(name), Ok(value)) => Some((name, value)),
            (Ok(name), Err(_)) => {
                warn!("Dropping environment variable {} with non-UTF-8 value", name);
                None
            }
            (Err(name), _) => {
                warn!(
                    "Dropping environment variable with non-UTF-8 name {}",
                    name.to_string_lossy()
                );
                None
            }
        })
        .collect()
}

/// Sink that runs the submission script once per event
///
/// The script receives the settings and the event as two JSON arguments.
pub struct ProcessSink {
    interpreter: String,
    script: String,
    env: BTreeMap<String, String>,
}

impl ProcessSink {
    /// Create a sink with an explicit child environment
    pub fn new(interpreter: String, script: String, env: BTreeMap<String, String>) -> Self {
        Self {
            interpreter,
            script,
            env,
        }
    }

    /// Create a sink from configuration and a snapshot of a parent environment
    ///
    /// Variables listed in `env_remove` are dropped from `parent_env`, then
    /// the configured `env` entries are applied on top.
    pub fn from_config<I>(config: &SubmissionConfig, parent_env: I) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut env: BTreeMap<String, String> = parent_env
            .into_iter()
            .filter(|(name, _)| !config.env_remove.contains(name))
            .collect();
        env.extend(config.env.clone());

        Self::new(config.interpreter.clone(), config.script.clone(), env)
    }

    /// Describe the process that would submit `event`
    pub fn launch_spec(
        &self,
        settings: &Settings,
        event: &MispEvent,
    ) -> Result<LaunchSpec, DispatchError> {
        Ok(LaunchSpec {
            program: self.interpreter.clone(),
            args: vec![
                self.script.clone(),
                serde_json::to_string(settings)?,
                serde_json::to_string(event)?,
            ],
            env: self.env.clone(),
        })
    }
}

impl SubmissionSink for ProcessSink {
    fn submit(
        &self,
        settings: &Settings,
        key: &str,
        event: &MispEvent,
    ) -> Result<(), DispatchError> {
        let spec = self.launch_spec(settings, event)?;
        debug!("Launching {} {} for event {}", spec.program, self.script, key);
        spec.spawn()
    }
}
