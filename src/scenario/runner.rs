//! Executes a [`Scenario`] and reports what happened.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::Serialize;
use serde_json::Value;
use tokio::net::TcpStream;
use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::connection::{self, Connection};
use crate::error::{Error, Result};
use crate::message::{CloseCode, Message};
use crate::scenario::descriptor::{
    Emit, Engine, Expected, Response, Scenario, ScenarioEntry, Step, think_duration,
};
use crate::scenario::template::{render, render_value};
use crate::socketio::SocketIoClient;

/// Outcome of [`Runner::run`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunReport {
    pub scenarios_launched: u64,
    pub scenarios_completed: u64,
    pub messages_sent: u64,
    pub responses_received: u64,
    /// Error text to number of scenarios that failed with it.
    pub errors: BTreeMap<String, u64>,
}

impl RunReport {
    /// Every launched scenario completed and nothing failed.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.scenarios_completed == self.scenarios_launched && self.errors.is_empty()
    }

    fn record_error(&mut self, error: &Error) {
        *self.errors.entry(error.to_string()).or_default() += 1;
    }
}

#[derive(Debug, Default)]
struct Counters {
    sent: u64,
    received: u64,
}

/// Connection a scenario runs on.
enum Driver {
    Ws(WsDriver),
    SocketIo(SocketIoDriver),
}

impl Driver {
    async fn send(&mut self, data: Value, counters: &mut Counters) -> Result<()> {
        match self {
            Driver::Ws(ws) => ws.send(data, counters).await,
            Driver::SocketIo(sio) => sio.send(data, counters).await,
        }
    }

    async fn emit(&mut self, emit: &Emit, counters: &mut Counters) -> Result<()> {
        match self {
            Driver::Ws(_) => Err(Error::InvalidScenario(format!(
                "emit {:?} needs the socketio engine",
                emit.channel
            ))),
            Driver::SocketIo(sio) => sio.emit(emit, counters).await,
        }
    }

    /// Close the connection, collecting whatever is still owed.
    async fn finish(self, counters: &mut Counters) -> Result<()> {
        match self {
            Driver::Ws(ws) => ws.finish(counters).await,
            Driver::SocketIo(sio) => sio.client.disconnect().await,
        }
    }
}

/// Runs scenarios one after another, each on its own connection.
#[derive(Debug, Clone, Default)]
pub struct Runner {
    config: EngineConfig,
}

impl Runner {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Engine.IO and WebSocket settings for every connection. The ack
    /// timeout also bounds how long an emit waits for its `response`.
    #[must_use]
    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Run every scenario of `scenario` once, in order. A failing scenario
    /// is counted and the run moves on.
    pub async fn run(&self, scenario: &Scenario) -> RunReport {
        let mut report = RunReport::default();
        let target = &scenario.config.target;
        let variables = &scenario.config.variables;

        for (index, entry) in scenario.scenarios.iter().enumerate() {
            let label = entry.label(index);
            report.scenarios_launched += 1;
            info!(scenario = %label, engine = %entry.engine, target = %target, "scenario launched");

            let mut counters = Counters::default();
            let result = self.run_entry(target, entry, variables, &mut counters).await;
            report.messages_sent += counters.sent;
            report.responses_received += counters.received;

            match result {
                Ok(()) => {
                    report.scenarios_completed += 1;
                    info!(
                        scenario = %label,
                        sent = counters.sent,
                        received = counters.received,
                        "scenario completed"
                    );
                }
                Err(e) => {
                    warn!(scenario = %label, error = %e, "scenario failed");
                    report.record_error(&e);
                }
            }
        }
        report
    }

    async fn run_entry(
        &self,
        target: &str,
        entry: &ScenarioEntry,
        variables: &BTreeMap<String, Value>,
        counters: &mut Counters,
    ) -> Result<()> {
        let driver = match entry.engine {
            Engine::Ws => Driver::Ws(WsDriver {
                conn: connection::connect(target, self.config.websocket.clone()).await?,
                drain_timeout: self.config.websocket.timeouts.read,
            }),
            Engine::SocketIo => Driver::SocketIo(SocketIoDriver {
                client: SocketIoClient::connect(target, self.config.clone()).await?,
                response_timeout: self.config.ack_timeout,
            }),
        };
        drive(driver, &entry.flow, variables, counters).await
    }
}

async fn drive(
    mut driver: Driver,
    flow: &[Step],
    variables: &BTreeMap<String, Value>,
    counters: &mut Counters,
) -> Result<()> {
    for step in flow {
        match step {
            Step::Loop { steps, count } => {
                for _ in 0..*count {
                    for inner in steps {
                        run_step(&mut driver, inner, variables, counters).await?;
                    }
                }
            }
            other => run_step(&mut driver, other, variables, counters).await?,
        }
    }
    driver.finish(counters).await
}

async fn run_step(
    driver: &mut Driver,
    step: &Step,
    variables: &BTreeMap<String, Value>,
    counters: &mut Counters,
) -> Result<()> {
    match step {
        Step::Send { send } => driver.send(render_value(send, variables), counters).await,
        Step::Think { think } => {
            tokio::time::sleep(think_duration(*think)?).await;
            Ok(())
        }
        Step::Emit { emit } => driver.emit(&render_emit(emit, variables), counters).await,
        Step::Loop { .. } => Err(Error::InvalidScenario("loops cannot be nested".into())),
    }
}

fn render_expected(expected: &Expected, variables: &BTreeMap<String, Value>) -> Expected {
    Expected {
        data: expected.data.as_ref().map(|d| render_value(d, variables)),
        args: expected
            .args
            .as_ref()
            .map(|args| args.iter().map(|a| render_value(a, variables)).collect()),
    }
}

fn render_emit(emit: &Emit, variables: &BTreeMap<String, Value>) -> Emit {
    Emit {
        channel: render(&emit.channel, variables),
        data: emit.data.as_ref().map(|d| render_value(d, variables)),
        args: emit.args.iter().map(|a| render_value(a, variables)).collect(),
        response: emit.response.as_ref().map(|r| Response {
            channel: render(&r.channel, variables),
            expected: render_expected(&r.expected, variables),
        }),
        acknowledge: emit
            .acknowledge
            .as_ref()
            .map(|e| render_expected(e, variables)),
    }
}

struct WsDriver {
    conn: Connection<TcpStream>,
    drain_timeout: Duration,
}

impl WsDriver {
    async fn send(&mut self, data: Value, counters: &mut Counters) -> Result<()> {
        let text = match data {
            Value::String(s) => s,
            other => other.to_string(),
        };
        self.conn.send(Message::text(text)).await?;
        counters.sent += 1;
        Ok(())
    }

    async fn finish(mut self, counters: &mut Counters) -> Result<()> {
        self.conn.close(CloseCode::Normal, "").await?;
        let drain = async {
            loop {
                match self.conn.recv().await? {
                    Some(Message::Text(_) | Message::Binary(_)) => counters.received += 1,
                    Some(Message::Close(_)) | None => return Ok::<_, Error>(()),
                    Some(_) => {}
                }
            }
        };
        tokio::time::timeout(self.drain_timeout, drain)
            .await
            .map_err(|_| Error::Timeout("waiting for the close reply".into()))?
    }
}

struct SocketIoDriver {
    client: SocketIoClient,
    response_timeout: Duration,
}

impl SocketIoDriver {
    async fn await_response(&mut self, emit: &Emit, counters: &mut Counters) -> Result<()> {
        let Some(response) = &emit.response else {
            return Ok(());
        };
        let wait = async {
            loop {
                let Some(event) = self.client.next_event().await else {
                    return Err(Error::ConnectionClosed(None));
                };
                if event.name != response.channel {
                    debug!(event = %event.name, waiting_for = %response.channel, "skipping event");
                    continue;
                }
                if !response.expected.matches(&event.args) {
                    return Err(Error::UnexpectedPacket(format!(
                        "{} carried {}",
                        event.name,
                        Value::Array(event.args)
                    )));
                }
                return Ok(());
            }
        };
        tokio::time::timeout(self.response_timeout, wait)
            .await
            .map_err(|_| Error::Timeout(format!("waiting for {}", response.channel)))??;
        counters.received += 1;
        Ok(())
    }

    async fn send(&mut self, data: Value, counters: &mut Counters) -> Result<()> {
        self.client.emit("message", vec![data])?;
        counters.sent += 1;
        Ok(())
    }

    async fn emit(&mut self, emit: &Emit, counters: &mut Counters) -> Result<()> {
        match &emit.acknowledge {
            Some(expected) => {
                let ack = self
                    .client
                    .emit_with_ack(&emit.channel, emit.arguments())
                    .await;
                counters.sent += 1;
                let ack = ack?;
                if !expected.matches(&ack) {
                    return Err(Error::UnexpectedPacket(format!(
                        "ack for {} carried {}",
                        emit.channel,
                        Value::Array(ack)
                    )));
                }
                counters.received += 1;
            }
            None => {
                self.client.emit(&emit.channel, emit.arguments())?;
                counters.sent += 1;
            }
        }
        self.await_response(emit, counters).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_success() {
        let mut report = RunReport {
            scenarios_launched: 2,
            scenarios_completed: 2,
            ..RunReport::default()
        };
        assert!(report.is_success());

        report.record_error(&Error::ConnectionClosed(None));
        report.record_error(&Error::ConnectionClosed(None));
        assert!(!report.is_success());
        assert_eq!(report.errors.values().sum::<u64>(), 2);
        assert_eq!(report.errors.len(), 1);
    }

    #[test]
    fn test_render_emit_covers_expectations() {
        let variables = BTreeMap::from([("room".to_string(), Value::from("lobby"))]);
        let emit: Emit = serde_json::from_value(serde_json::json!({
            "channel": "join",
            "data": "{{ room }}",
            "response": { "channel": "new_user_join", "data": "Welcome to {{ room }}" },
            "acknowledge": { "args": ["{{room}}"] }
        }))
        .unwrap();
        let rendered = render_emit(&emit, &variables);
        assert_eq!(rendered.data, Some(Value::from("lobby")));
        let response = rendered.response.unwrap();
        assert!(response.expected.matches(&[Value::from("Welcome to lobby")]));
        assert!(rendered.acknowledge.unwrap().matches(&[Value::from("lobby")]));
    }

    #[tokio::test]
    async fn test_unreachable_target_is_counted() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let scenario = Scenario::from_json(&format!(
            r#"{{"config":{{"target":"ws://127.0.0.1:{port}"}},
                "scenarios":[{{"flow":[{{"send":"x"}}]}},{{"flow":[]}}]}}"#
        ))
        .unwrap();
        let report = Runner::new().run(&scenario).await;
        assert_eq!(report.scenarios_launched, 2);
        assert_eq!(report.scenarios_completed, 0);
        assert_eq!(report.messages_sent, 0);
        assert_eq!(report.errors.values().sum::<u64>(), 2);
    }

    #[tokio::test]
    async fn test_think_set_after_validation_fails_the_scenario() {
        let server = crate::simple_ws::spawn().await.unwrap();
        let mut scenario = Scenario::from_json(&format!(
            r#"{{"config":{{"target":"ws://{}"}},
                "scenarios":[{{"flow":[{{"think":0}}]}},{{"flow":[{{"send":"x"}}]}}]}}"#,
            server.local_addr()
        ))
        .unwrap();
        scenario.scenarios[0].flow.push(Step::Think { think: 1e20 });
        scenario.scenarios[0].flow.push(Step::Think { think: f64::NAN });

        let report = Runner::new().run(&scenario).await;
        assert_eq!(report.scenarios_launched, 2);
        assert_eq!(report.scenarios_completed, 1);
        assert_eq!(report.messages_sent, 1);
        assert_eq!(report.errors.values().sum::<u64>(), 1);
        assert!(report.errors.keys().all(|e| e.contains("think")));
        server.close().await;
    }

    #[tokio::test]
    async fn test_bad_target_scheme_is_counted() {
        let mut scenario = Scenario::from_json(
            r#"{"config":{"target":"ws://127.0.0.1:1"},"scenarios":[{"flow":[]}]}"#,
        )
        .unwrap();
        scenario.config.target = "http://127.0.0.1:1".into();
        let report = Runner::new().run(&scenario).await;
        assert_eq!(report.scenarios_launched, 1);
        assert!(report.errors.keys().all(|e| e.starts_with("Invalid target")));
    }
}
