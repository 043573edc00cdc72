//! Deterministic doubles for the hardware seams: clock, flash, network link,
//! HTTP transport, input characteristic and display.

use alloc::{
    collections::VecDeque,
    string::{String, ToString},
    vec::Vec,
};
use core::cell::{Cell, RefCell};

use embassy_time::{Duration, Instant};
use embedded_storage_async::nor_flash::{
    ErrorType, NorFlash, NorFlashError, NorFlashErrorKind, ReadNorFlash,
};

use crate::hid::core::{ChannelError, InputChannel, KeyboardReport};
use crate::sync::{HttpRequest, HttpResponse, HttpTransport, LinkError, NetworkLink, TransportError};
use crate::time::Clock;
use crate::ui::{StatusDisplay, StatusFrame};

/// Virtual clock: `sleep` advances time instantly and is recorded.
#[derive(Debug)]
pub struct ManualClock {
    start: Instant,
    now: Cell<Instant>,
    sleeps: RefCell<Vec<Duration>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::starting_at(Instant::from_ticks(0))
    }

    pub fn starting_at(start: Instant) -> Self {
        Self {
            start,
            now: Cell::new(start),
            sleeps: RefCell::new(Vec::new()),
        }
    }

    pub fn advance(&self, duration: Duration) {
        let next = self
            .now
            .get()
            .checked_add(duration)
            .unwrap_or(Instant::MAX);
        self.now.set(next);
    }

    pub fn elapsed(&self) -> Duration {
        self.now.get() - self.start
    }

    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.borrow().clone()
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.now.get()
    }

    async fn sleep(&self, duration: Duration) {
        self.sleeps.borrow_mut().push(duration);
        self.advance(duration);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlakyError<E> {
    Inner(E),
    /// Write or erase refused because the failure switch is on.
    Injected,
}

impl<E: NorFlashError> NorFlashError for FlakyError<E> {
    fn kind(&self) -> NorFlashErrorKind {
        match self {
            FlakyError::Inner(err) => err.kind(),
            FlakyError::Injected => NorFlashErrorKind::Other,
        }
    }
}

/// Flash wrapper whose writes and erases can be made to fail on demand.
#[derive(Debug)]
pub struct FlakyFlash<F> {
    inner: F,
    fail_writes: bool,
    writes: usize,
}

impl<F> FlakyFlash<F> {
    pub fn new(inner: F) -> Self {
        Self {
            inner,
            fail_writes: false,
            writes: 0,
        }
    }

    pub fn fail_writes(&mut self, fail: bool) {
        self.fail_writes = fail;
    }

    /// Successful write and erase calls so far.
    pub fn writes(&self) -> usize {
        self.writes
    }

    pub fn inner(&self) -> &F {
        &self.inner
    }
}

impl<F: ErrorType> ErrorType for FlakyFlash<F> {
    type Error = FlakyError<F::Error>;
}

impl<F: ReadNorFlash> ReadNorFlash for FlakyFlash<F> {
    const READ_SIZE: usize = F::READ_SIZE;

    async fn read(&mut self, offset: u32, bytes: &mut [u8]) -> Result<(), Self::Error> {
        self.inner
            .read(offset, bytes)
            .await
            .map_err(FlakyError::Inner)
    }

    fn capacity(&self) -> usize {
        self.inner.capacity()
    }
}

impl<F: NorFlash> NorFlash for FlakyFlash<F> {
    const WRITE_SIZE: usize = F::WRITE_SIZE;
    const ERASE_SIZE: usize = F::ERASE_SIZE;

    async fn erase(&mut self, from: u32, to: u32) -> Result<(), Self::Error> {
        if self.fail_writes {
            return Err(FlakyError::Injected);
        }
        self.inner
            .erase(from, to)
            .await
            .map_err(FlakyError::Inner)?;
        self.writes += 1;
        Ok(())
    }

    async fn write(&mut self, offset: u32, bytes: &[u8]) -> Result<(), Self::Error> {
        if self.fail_writes {
            return Err(FlakyError::Injected);
        }
        self.inner
            .write(offset, bytes)
            .await
            .map_err(FlakyError::Inner)?;
        self.writes += 1;
        Ok(())
    }
}

/// Network link that reports connected after a fixed number of polls.
#[derive(Debug, Default)]
pub struct ScriptedLink {
    connect_after_polls: Option<usize>,
    begin_error: Option<String>,
    polls: usize,
    begins: usize,
    disconnects: usize,
    joined: Vec<(String, String)>,
}

impl ScriptedLink {
    /// Link that comes up on the `polls`-th status check (1-based).
    pub fn connecting_after(polls: usize) -> Self {
        Self {
            connect_after_polls: Some(polls),
            ..Self::default()
        }
    }

    pub fn never_connecting() -> Self {
        Self::default()
    }

    pub fn failing_begin(reason: &str) -> Self {
        Self {
            begin_error: Some(reason.to_string()),
            ..Self::default()
        }
    }

    pub fn polls(&self) -> usize {
        self.polls
    }

    pub fn begins(&self) -> usize {
        self.begins
    }

    pub fn disconnects(&self) -> usize {
        self.disconnects
    }

    /// `(ssid, password)` pairs passed to `begin`.
    pub fn joined(&self) -> &[(String, String)] {
        &self.joined
    }
}

impl NetworkLink for ScriptedLink {
    async fn begin(&mut self, ssid: &str, password: &str) -> Result<(), LinkError> {
        self.begins += 1;
        self.joined.push((ssid.to_string(), password.to_string()));
        match &self.begin_error {
            Some(reason) => Err(LinkError(reason.clone())),
            None => Ok(()),
        }
    }

    fn is_connected(&mut self) -> bool {
        self.polls += 1;
        self.connect_after_polls
            .is_some_and(|threshold| self.polls >= threshold)
    }

    async fn disconnect(&mut self) {
        self.disconnects += 1;
    }
}

/// Copy of a request seen by [`ScriptedHttp`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedRequest {
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl RecordedRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

/// HTTP transport answering from a queue of canned results.
#[derive(Debug, Default)]
pub struct ScriptedHttp {
    responses: VecDeque<Result<HttpResponse, TransportError>>,
    requests: Vec<RecordedRequest>,
}

impl ScriptedHttp {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn responding(status: u16, body: &str) -> Self {
        let mut http = Self::new();
        http.push_response(status, body);
        http
    }

    pub fn push_response(&mut self, status: u16, body: &str) {
        self.responses
            .push_back(Ok(HttpResponse::new(status, body.as_bytes())));
    }

    pub fn push_failure(&mut self, reason: &str) {
        self.responses
            .push_back(Err(TransportError(reason.to_string())));
    }

    pub fn requests(&self) -> &[RecordedRequest] {
        &self.requests
    }
}

impl HttpTransport for ScriptedHttp {
    async fn post(&mut self, request: &HttpRequest<'_>) -> Result<HttpResponse, TransportError> {
        self.requests.push(RecordedRequest {
            url: request.url.to_string(),
            headers: request
                .headers
                .iter()
                .map(|(key, value)| (key.to_string(), value.to_string()))
                .collect(),
            body: request.body.to_vec(),
        });
        self.responses
            .pop_front()
            .unwrap_or_else(|| Err(TransportError("no scripted response".to_string())))
    }
}

/// Input channel that records every report it accepts.
#[derive(Debug, Default)]
pub struct RecordingChannel {
    ready: bool,
    disconnect_after: Option<usize>,
    reports: Vec<KeyboardReport>,
}

impl RecordingChannel {
    pub fn connected() -> Self {
        Self {
            ready: true,
            ..Self::default()
        }
    }

    pub fn disconnected() -> Self {
        Self::default()
    }

    /// Drop the connection once `reports` reports have been delivered.
    pub fn disconnect_after(mut self, reports: usize) -> Self {
        self.disconnect_after = Some(reports);
        self
    }

    pub fn set_ready(&mut self, ready: bool) {
        self.ready = ready;
    }

    pub fn reports(&self) -> &[KeyboardReport] {
        &self.reports
    }

    pub fn clear(&mut self) {
        self.reports.clear();
    }
}

impl InputChannel for RecordingChannel {
    fn is_ready(&self) -> bool {
        self.ready
    }

    async fn notify(&mut self, report: KeyboardReport) -> Result<(), ChannelError> {
        if !self.ready {
            return Err(ChannelError::NotReady);
        }
        self.reports.push(report);
        if self
            .disconnect_after
            .is_some_and(|limit| self.reports.len() >= limit)
        {
            self.ready = false;
        }
        Ok(())
    }
}

/// Display that keeps every frame it was asked to show.
#[derive(Debug, Default)]
pub struct RecordingDisplay {
    frames: Vec<StatusFrame>,
}

impl RecordingDisplay {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn frames(&self) -> &[StatusFrame] {
        &self.frames
    }

    pub fn last(&self) -> Option<&StatusFrame> {
        self.frames.last()
    }
}

impl StatusDisplay for RecordingDisplay {
    fn show(&mut self, frame: &StatusFrame) {
        self.frames.push(frame.clone());
    }
}
