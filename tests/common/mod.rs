//! Shared helpers for the integration tests

#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use courier::{Dispatcher, DispatcherConfig, Handler, LoopbackTransport, Transport};

/// Records every delivered message UUID so tests can assert exact
/// invocation counts without racing the worker pool.
#[derive(Clone, Default)]
pub struct Recorder {
    uuids: Arc<Mutex<Vec<String>>>,
}

impl Recorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn handler(&self) -> Handler {
        let uuids = Arc::clone(&self.uuids);
        Handler::unified(move |message| {
            uuids.lock().unwrap().push(message.uuid());
            Ok(())
        })
    }

    /// Split-style variant; the header carries the UUID.
    pub fn split_handler(&self) -> Handler {
        let uuids = Arc::clone(&self.uuids);
        Handler::split(move |header, _properties| {
            uuids.lock().unwrap().push(header.uuid.to_string());
            Ok(())
        })
    }

    pub fn count(&self) -> usize {
        self.uuids.lock().unwrap().len()
    }

    pub fn count_of(&self, uuid: &str) -> usize {
        self.uuids
            .lock()
            .unwrap()
            .iter()
            .filter(|u| u.as_str() == uuid)
            .count()
    }

    pub fn uuids(&self) -> Vec<String> {
        self.uuids.lock().unwrap().clone()
    }
}

/// A development dispatcher with a loopback transport over it.
pub fn loopback_pair() -> (Dispatcher, Arc<dyn Transport>) {
    let dispatcher = Dispatcher::new(DispatcherConfig::development());
    let transport: Arc<dyn Transport> = Arc::new(LoopbackTransport::new(dispatcher.clone()));
    (dispatcher, transport)
}

/// Waits until every scheduled handler invocation has finished.
pub async fn drain(dispatcher: &Dispatcher) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        let status = dispatcher.status();
        if status.scheduled == status.completed {
            return;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "dispatch did not drain: {status:?}"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
