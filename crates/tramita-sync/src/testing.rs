//! In-memory transport for exercising the fetcher and extractors.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::{FetchError, Request, Response, Transport};

/// Answers requests from a script keyed by `url?k=v&k=v` (parameters in the
/// order the caller adds them). Each route replays its responses in order and
/// keeps repeating the last one. Unknown routes get a 404.
#[derive(Default)]
pub(crate) struct ScriptedTransport {
    routes: Mutex<HashMap<String, VecDeque<Result<Response, String>>>>,
    requests: Mutex<Vec<Request>>,
}

impl ScriptedTransport {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn route_of(request: &Request) -> String {
        if request.params.is_empty() {
            return request.url.clone();
        }
        let query: Vec<String> = request
            .params
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect();
        format!("{}?{}", request.url, query.join("&"))
    }

    pub(crate) fn respond(&self, route: &str, status: u16, body: impl Into<String>) -> &Self {
        self.push(
            route,
            Ok(Response {
                status,
                body: body.into(),
            }),
        )
    }

    pub(crate) fn respond_json(&self, route: &str, body: serde_json::Value) -> &Self {
        self.respond(route, 200, body.to_string())
    }

    pub(crate) fn fail(&self, route: &str, message: &str) -> &Self {
        self.push(route, Err(message.to_string()))
    }

    fn push(&self, route: &str, response: Result<Response, String>) -> &Self {
        self.routes
            .lock()
            .unwrap()
            .entry(route.to_string())
            .or_default()
            .push_back(response);
        self
    }

    pub(crate) fn requests(&self) -> Vec<Request> {
        self.requests.lock().unwrap().clone()
    }

    pub(crate) fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub(crate) fn count_for(&self, route: &str) -> usize {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|r| Self::route_of(r) == route)
            .count()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(&self, request: &Request) -> Result<Response, FetchError> {
        self.requests.lock().unwrap().push(request.clone());
        let route = Self::route_of(request);
        let mut routes = self.routes.lock().unwrap();
        let answer = match routes.get_mut(&route) {
            Some(queue) if queue.len() > 1 => queue.pop_front(),
            Some(queue) => queue.front().cloned(),
            None => None,
        };
        match answer {
            Some(Ok(response)) => Ok(response),
            Some(Err(message)) => Err(FetchError::Network(message)),
            None => Ok(Response {
                status: 404,
                body: format!("no route for {route}"),
            }),
        }
    }
}
