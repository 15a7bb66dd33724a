//! Scoped test server for scenario runs.
//!
//! ```no_run
//! # async fn demo() -> rsio::Result<()> {
//! use rsio::{Fixture, Runner, Scenario, simple_ws};
//!
//! let fixture = Fixture::setup(simple_ws::spawn).await?;
//! let report = fixture
//!     .run(|ctx| async move {
//!         let mut scenario = Scenario::load("tests/scripts/hello_ws.json")?;
//!         scenario.set_target(ctx.target_url())?;
//!         Ok(Runner::new().run(&scenario).await)
//!     })
//!     .await?;
//! assert!(report.is_success());
//! # Ok(())
//! # }
//! ```

use std::future::Future;

use tokio::task::JoinHandle;
use tracing::info;

use crate::error::{Error, Result};
use crate::server_handle::ServerHandle;

/// What a test body gets to see of the fixture.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FixtureCtx {
    port: u16,
    target_url: String,
}

impl FixtureCtx {
    #[must_use]
    pub fn port(&self) -> u16 {
        self.port
    }

    /// `ws://127.0.0.1:<port>`.
    #[must_use]
    pub fn target_url(&self) -> &str {
        &self.target_url
    }
}

/// Owns a server for the duration of one test.
///
/// The server is closed by [`Fixture::run`] on every exit path of the body,
/// by [`Fixture::teardown`], or aborted when the fixture is dropped.
#[derive(Debug)]
pub struct Fixture {
    server: Option<ServerHandle>,
    ctx: FixtureCtx,
}

impl Fixture {
    /// Start a server with `spawn` and wrap it.
    ///
    /// # Errors
    ///
    /// Whatever `spawn` fails with.
    pub async fn setup<F, Fut>(spawn: F) -> Result<Self>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<ServerHandle>>,
    {
        let server = spawn().await?;
        let port = server.port();
        let ctx = FixtureCtx {
            port,
            target_url: format!("ws://127.0.0.1:{port}"),
        };
        info!(port, "fixture server up");
        Ok(Self {
            server: Some(server),
            ctx,
        })
    }

    #[must_use]
    pub fn port(&self) -> u16 {
        self.ctx.port
    }

    #[must_use]
    pub fn target_url(&self) -> &str {
        &self.ctx.target_url
    }

    #[must_use]
    pub fn ctx(&self) -> &FixtureCtx {
        &self.ctx
    }

    /// Run `body` as its own task, then tear the server down. A panicking
    /// body is re-raised once the server is closed.
    ///
    /// # Errors
    ///
    /// The body's error, or [`Error::TaskFailed`] if it was cancelled.
    pub async fn run<F, Fut, T>(self, body: F) -> Result<T>
    where
        F: FnOnce(FixtureCtx) -> Fut,
        Fut: Future<Output = Result<T>> + Send + 'static,
        T: Send + 'static,
    {
        let mut task = AbortOnDrop(tokio::spawn(body(self.ctx.clone())));
        let outcome = (&mut task.0).await;
        self.teardown().await;
        match outcome {
            Ok(result) => result,
            Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
            Err(e) => Err(Error::TaskFailed(e.to_string())),
        }
    }

    /// Close the server and wait for its connections to finish.
    pub async fn teardown(mut self) {
        if let Some(server) = self.server.take() {
            server.close().await;
            info!(port = self.ctx.port, "fixture server down");
        }
    }
}

/// Aborts the body task if [`Fixture::run`] is dropped before it finishes.
struct AbortOnDrop<T>(JoinHandle<T>);

impl<T> Drop for AbortOnDrop<T> {
    fn drop(&mut self) {
        self.0.abort();
    }
}
