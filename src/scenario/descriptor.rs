//! Scenario descriptor: the JSON script a run is driven by.
//!
//! ```json
//! {
//!   "config": { "target": "ws://127.0.0.1:9090", "phases": [{ "duration": 1, "arrivalRate": 1 }] },
//!   "scenarios": [{ "engine": "ws", "flow": [{ "send": "hello" }, { "think": 0.1 }] }]
//! }
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use url::Url;

use crate::error::{Error, Result};

/// A loaded script.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scenario {
    pub config: ScriptConfig,
    pub scenarios: Vec<ScenarioEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScriptConfig {
    pub target: String,
    /// Arrival phases. Carried through untouched, the runner launches every
    /// scenario once.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phases: Option<Value>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub variables: BTreeMap<String, Value>,
    /// Any other keys, kept so a rewritten script serializes back intact.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub engine: Engine,
    #[serde(default)]
    pub flow: Vec<Step>,
}

impl ScenarioEntry {
    /// Name for logs and reports: the given name or `scenario-<index>`.
    #[must_use]
    pub fn label(&self, index: usize) -> String {
        self.name
            .clone()
            .unwrap_or_else(|| format!("scenario-{index}"))
    }
}

/// Transport a scenario speaks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Engine {
    /// Raw WebSocket text messages.
    #[default]
    Ws,
    /// Socket.IO events on the `/` namespace.
    SocketIo,
}

impl Engine {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Engine::Ws => "ws",
            Engine::SocketIo => "socketio",
        }
    }
}

impl FromStr for Engine {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "ws" => Ok(Engine::Ws),
            "socketio" => Ok(Engine::SocketIo),
            other => Err(Error::UnsupportedEngine(other.to_string())),
        }
    }
}

impl TryFrom<String> for Engine {
    type Error = Error;

    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}

impl From<Engine> for String {
    fn from(engine: Engine) -> Self {
        engine.as_str().to_string()
    }
}

impl fmt::Display for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One flow step. Each is an object keyed by the step name, except `loop`
/// which also carries `count`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Step {
    Loop {
        #[serde(rename = "loop")]
        steps: Vec<Step>,
        count: u64,
    },
    /// Strings go out as-is, other values as their JSON text. On the
    /// `socketio` engine this is an emit of `message`.
    Send { send: Value },
    /// Pause, in seconds.
    Think { think: f64 },
    Emit { emit: Emit },
}

/// A Socket.IO emit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Emit {
    /// Event name.
    pub channel: String,
    /// First argument.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    /// Arguments after `data`.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<Value>,
    /// Event to wait for after emitting.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<Response>,
    /// Request an ack and check its arguments.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub acknowledge: Option<Expected>,
}

impl Emit {
    /// `data` followed by `args`.
    #[must_use]
    pub fn arguments(&self) -> Vec<Value> {
        self.data.iter().chain(&self.args).cloned().collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub channel: String,
    #[serde(flatten)]
    pub expected: Expected,
}

/// Conditions on received arguments. Empty matches anything.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Expected {
    /// Must equal the first argument.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    /// Must equal the whole argument list.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub args: Option<Vec<Value>>,
}

impl Expected {
    #[must_use]
    pub fn matches(&self, args: &[Value]) -> bool {
        let data_ok = self.data.as_ref().is_none_or(|d| args.first() == Some(d));
        let args_ok = self.args.as_ref().is_none_or(|a| a.as_slice() == args);
        data_ok && args_ok
    }
}

fn validate_target(target: &str) -> Result<Url> {
    let url = Url::parse(target).map_err(|e| Error::InvalidTarget(format!("{target}: {e}")))?;
    if url.scheme() != "ws" {
        return Err(Error::InvalidTarget(format!(
            "{target}: expected a ws:// URL"
        )));
    }
    if url.host_str().is_none() {
        return Err(Error::InvalidTarget(format!("{target}: missing host")));
    }
    Ok(url)
}

/// Seconds of a `think` step as a [`Duration`].
///
/// # Errors
///
/// [`Error::InvalidScenario`] for negative, NaN, infinite or out-of-range values.
pub fn think_duration(seconds: f64) -> Result<Duration> {
    Duration::try_from_secs_f64(seconds).map_err(|e| {
        Error::InvalidScenario(format!(
            "think must be a non-negative number of seconds, got {seconds}: {e}"
        ))
    })
}

fn validate_step(step: &Step, engine: Engine, nested: bool) -> Result<()> {
    match step {
        Step::Loop { steps, .. } => {
            if nested {
                return Err(Error::InvalidScenario("loops cannot be nested".into()));
            }
            steps
                .iter()
                .try_for_each(|inner| validate_step(inner, engine, true))
        }
        Step::Think { think } => think_duration(*think).map(drop),
        Step::Emit { .. } if engine != Engine::SocketIo => Err(Error::InvalidScenario(
            format!("emit needs the socketio engine, not {engine}"),
        )),
        Step::Emit { emit } if emit.channel.is_empty() => {
            Err(Error::InvalidScenario("emit channel is empty".into()))
        }
        _ => Ok(()),
    }
}

impl Scenario {
    /// # Errors
    ///
    /// - [`Error::Io`] if the file cannot be read
    /// - [`Error::InvalidScenario`] if it is not a valid descriptor
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| Error::Io(format!("{}: {e}", path.display())))?;
        Self::from_json(&text)
    }

    /// # Errors
    ///
    /// [`Error::InvalidScenario`] for malformed JSON, unknown engines,
    /// nested loops, negative think times and emits outside the `socketio`
    /// engine.
    pub fn from_json(text: &str) -> Result<Self> {
        let scenario: Self =
            serde_json::from_str(text).map_err(|e| Error::InvalidScenario(e.to_string()))?;
        scenario.validate()?;
        Ok(scenario)
    }

    /// # Errors
    ///
    /// Same checks as [`Scenario::from_json`].
    pub fn validate(&self) -> Result<()> {
        if self.scenarios.is_empty() {
            return Err(Error::InvalidScenario("no scenarios".into()));
        }
        for entry in &self.scenarios {
            for step in &entry.flow {
                validate_step(step, entry.engine, false)?;
            }
        }
        Ok(())
    }

    /// Point the script at `target`.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidTarget`] unless `target` is a `ws://` URL with a host.
    pub fn set_target(&mut self, target: &str) -> Result<()> {
        validate_target(target)?;
        self.config.target = target.to_string();
        Ok(())
    }

    /// The configured target, checked.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidTarget`] as for [`Scenario::set_target`].
    pub fn target(&self) -> Result<Url> {
        validate_target(&self.config.target)
    }
}
