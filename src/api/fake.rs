//! Scripted in-memory [`RemoteApi`] for tests.

use std::collections::{HashMap, VecDeque};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;

use super::{Method, RemoteApi};
use crate::error::RawError;

type Route = (Method, String);

/// Answers requests from per-route queues; once a queue runs dry the last
/// answer repeats.
#[derive(Default)]
pub(crate) struct FakeApi {
    routes: Mutex<HashMap<Route, VecDeque<Result<Value, RawError>>>>,
    last: Mutex<HashMap<Route, Result<Value, RawError>>>,
    log: Mutex<Vec<(Method, String, Option<Value>)>>,
}

impl FakeApi {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn respond(&self, method: Method, path: &str, response: Result<Value, RawError>) {
        self.routes
            .lock()
            .entry((method, path.to_string()))
            .or_default()
            .push_back(response);
    }

    /// Requests seen so far for a route.
    pub(crate) fn calls(&self, method: Method, path: &str) -> usize {
        self.log
            .lock()
            .iter()
            .filter(|(m, p, _)| *m == method && p == path)
            .count()
    }

    pub(crate) fn last_body(&self, method: Method, path: &str) -> Option<Value> {
        self.log
            .lock()
            .iter()
            .rev()
            .find(|(m, p, _)| *m == method && p == path)
            .and_then(|(_, _, body)| body.clone())
    }
}

#[async_trait]
impl RemoteApi for FakeApi {
    async fn send(&self, method: Method, path: &str, body: Option<Value>) -> Result<Value, RawError> {
        self.log.lock().push((method, path.to_string(), body));

        let route = (method, path.to_string());
        let next = self.routes.lock().get_mut(&route).and_then(VecDeque::pop_front);
        let mut last = self.last.lock();
        match next {
            Some(response) => {
                last.insert(route, response.clone());
                response
            }
            None => last
                .get(&route)
                .cloned()
                .unwrap_or_else(|| Err(RawError::status(404, format!("no route for {method:?} {path}")))),
        }
    }
}
