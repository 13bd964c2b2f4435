//! Scripted database driver for testing.
//!
//! A [`MockDriver`] replays a fixed script of poll states and wait results,
//! and records everything the executor does to its connections.

use super::{Connection, Cursor, Driver, DriverError, Interest, PollState, RawColumn, Value};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::io;
use std::sync::{Arc, Mutex, MutexGuard};

/// A failure the script can inject.
#[derive(Debug, Clone)]
pub enum MockFailure {
    Database(String),
    Io(io::ErrorKind),
    Protocol(String),
    Other(String),
}

impl MockFailure {
    fn to_error(&self) -> DriverError {
        match self {
            Self::Database(msg) => DriverError::database(msg.clone()),
            Self::Io(kind) => DriverError::Io(io::Error::from(*kind)),
            Self::Protocol(msg) => DriverError::protocol(msg.clone()),
            Self::Other(msg) => DriverError::other(msg.clone()),
        }
    }
}

/// One scripted event.
///
/// `Poll*` steps are consumed by [`Connection::poll`]; `Wait*` and `Hang`
/// steps by [`Connection::wait_ready`]. Once the script runs out, polls
/// report [`PollState::Ok`] and waits return at once.
#[derive(Debug, Clone)]
pub enum Step {
    Poll(PollState),
    PollFails(MockFailure),
    WaitFails(io::ErrorKind),
    /// The wait never completes.
    Hang,
}

#[derive(Debug, Default)]
struct ProbeState {
    connection_strings: Vec<String>,
    waits: Vec<Interest>,
    submitted: Vec<String>,
    cancels: usize,
    closes: usize,
    cursors_opened: usize,
}

/// Read side of the driver's recording.
#[derive(Debug, Clone, Default)]
pub struct MockProbe {
    state: Arc<Mutex<ProbeState>>,
}

impl MockProbe {
    fn lock(&self) -> MutexGuard<'_, ProbeState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Connection strings passed to `connect`, one per connection.
    pub fn connection_strings(&self) -> Vec<String> {
        self.lock().connection_strings.clone()
    }

    /// Every readiness wait, in order.
    pub fn waits(&self) -> Vec<Interest> {
        self.lock().waits.clone()
    }

    /// Every submitted statement, in order.
    pub fn submitted(&self) -> Vec<String> {
        self.lock().submitted.clone()
    }

    pub fn cancels(&self) -> usize {
        self.lock().cancels
    }

    /// Number of connections closed. A second close of the same connection
    /// is not counted.
    pub fn closes(&self) -> usize {
        self.lock().closes
    }

    pub fn cursors_opened(&self) -> usize {
        self.lock().cursors_opened
    }
}

/// In-memory driver replaying a script.
#[derive(Debug, Clone, Default)]
pub struct MockDriver {
    script: Arc<Mutex<VecDeque<Step>>>,
    result: Option<(Vec<RawColumn>, Vec<Vec<Value>>)>,
    submit_failure: Option<MockFailure>,
    cursor_failure: Option<MockFailure>,
    probe: MockProbe,
}

impl MockDriver {
    /// Creates a driver replaying `script` across all its connections.
    pub fn new(script: Vec<Step>) -> Self {
        Self {
            script: Arc::new(Mutex::new(script.into())),
            ..Self::default()
        }
    }

    /// Sets the result set every statement produces.
    pub fn with_result(mut self, description: Vec<RawColumn>, rows: Vec<Vec<Value>>) -> Self {
        self.result = Some((description, rows));
        self
    }

    /// Makes every statement submission fail.
    pub fn with_submit_failure(mut self, failure: MockFailure) -> Self {
        self.submit_failure = Some(failure);
        self
    }

    /// Makes opening a cursor fail.
    pub fn with_cursor_failure(mut self, failure: MockFailure) -> Self {
        self.cursor_failure = Some(failure);
        self
    }

    pub fn probe(&self) -> MockProbe {
        self.probe.clone()
    }
}

impl Driver for MockDriver {
    type Conn = MockConnection;

    fn connect(&self, connection_string: &str) -> Result<MockConnection, DriverError> {
        self.probe
            .lock()
            .connection_strings
            .push(connection_string.to_string());

        Ok(MockConnection {
            driver: self.clone(),
            last_sql: None,
            closed: false,
        })
    }
}

/// Connection handed out by [`MockDriver`].
#[derive(Debug)]
pub struct MockConnection {
    driver: MockDriver,
    last_sql: Option<String>,
    closed: bool,
}

impl MockConnection {
    fn next_step(&self, matches: impl Fn(&Step) -> bool) -> Option<Step> {
        let mut script = self
            .driver
            .script
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if script.front().is_some_and(matches) {
            script.pop_front()
        } else {
            None
        }
    }
}

#[async_trait]
impl Connection for MockConnection {
    fn poll(&mut self) -> Result<PollState, DriverError> {
        match self.next_step(|s| matches!(s, Step::Poll(_) | Step::PollFails(_))) {
            Some(Step::Poll(state)) => Ok(state),
            Some(Step::PollFails(failure)) => Err(failure.to_error()),
            _ => Ok(PollState::Ok),
        }
    }

    async fn wait_ready(&mut self, interest: Interest) -> io::Result<()> {
        self.driver.probe.lock().waits.push(interest);

        match self.next_step(|s| matches!(s, Step::WaitFails(_) | Step::Hang)) {
            Some(Step::WaitFails(kind)) => Err(io::Error::from(kind)),
            Some(Step::Hang) => std::future::pending().await,
            _ => Ok(()),
        }
    }

    fn submit(&mut self, sql: &str) -> Result<(), DriverError> {
        self.driver.probe.lock().submitted.push(sql.to_string());

        if let Some(failure) = &self.driver.submit_failure {
            return Err(failure.to_error());
        }
        self.last_sql = Some(sql.to_string());
        Ok(())
    }

    fn cursor(&mut self) -> Result<Cursor, DriverError> {
        if let Some(failure) = &self.driver.cursor_failure {
            return Err(failure.to_error());
        }
        self.driver.probe.lock().cursors_opened += 1;

        let (description, rows) = match &self.driver.result {
            Some((description, rows)) => (description.clone(), rows.clone()),
            None => {
                let sql = self.last_sql.as_deref().unwrap_or_default();
                (
                    vec![RawColumn::new("result", 25)],
                    vec![vec![Value::String(format!("Mock result for: {sql}"))]],
                )
            }
        };
        Ok(Cursor::new(description, rows))
    }

    async fn cancel(&mut self) -> Result<(), DriverError> {
        self.driver.probe.lock().cancels += 1;
        Ok(())
    }

    async fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.driver.probe.lock().closes += 1;
        }
    }
}
