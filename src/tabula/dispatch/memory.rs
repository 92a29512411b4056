use super::{apply_request, snapshot_body, Action, ActionRequest, Dispatcher};
use crate::error::{Result, TabulaError};
use crate::model::Record;
use async_trait::async_trait;
use std::cell::RefCell;
use std::collections::{HashMap, HashSet, VecDeque};
use std::time::Duration;

/// In-memory dispatcher for testing.
///
/// Uses `RefCell` for interior mutability since the engine is single-threaded.
/// Besides holding collections it can:
///
/// - fail every request, or every request for one collection
/// - answer with a canned raw body (to exercise reply normalisation)
/// - hold back replies, in issue order, to interleave concurrent operations;
///   the request itself is applied immediately
/// - record every request it receives
#[derive(Default)]
pub struct MemDispatcher {
    collections: RefCell<HashMap<String, Vec<Record>>>,
    failing: RefCell<HashSet<String>>,
    fail_all: RefCell<bool>,
    canned: RefCell<HashMap<String, String>>,
    delays: RefCell<VecDeque<Duration>>,
    log: RefCell<Vec<ActionRequest>>,
}

impl MemDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a collection.
    pub fn with_collection(self, name: &str, records: Vec<Record>) -> Self {
        self.collections
            .borrow_mut()
            .insert(name.to_string(), records);
        self
    }

    /// Seed an option-source collection from a list of names.
    pub fn with_names(self, name: &str, names: &[&str]) -> Self {
        let records = names
            .iter()
            .map(|n| Record::new().set("name", *n))
            .collect();
        self.with_collection(name, records)
    }

    pub fn set_fail_all(&self, fail: bool) {
        *self.fail_all.borrow_mut() = fail;
    }

    pub fn fail_collection(&self, name: &str) {
        self.failing.borrow_mut().insert(name.to_string());
    }

    /// Answer every request for `name` with `body`, verbatim.
    pub fn respond_with(&self, name: &str, body: &str) {
        self.canned
            .borrow_mut()
            .insert(name.to_string(), body.to_string());
    }

    /// Hold back the reply to the next request by `delay`. Queued delays
    /// apply in issue order.
    pub fn push_delay(&self, delay: Duration) {
        self.delays.borrow_mut().push_back(delay);
    }

    pub fn requests(&self) -> Vec<ActionRequest> {
        self.log.borrow().clone()
    }

    pub fn count(&self, action: Action) -> usize {
        self.log
            .borrow()
            .iter()
            .filter(|r| r.action == action)
            .count()
    }

    pub fn collection(&self, name: &str) -> Vec<Record> {
        self.collections
            .borrow()
            .get(name)
            .cloned()
            .unwrap_or_default()
    }

    fn reply(&self, request: &ActionRequest) -> Result<String> {
        if *self.fail_all.borrow() || self.failing.borrow().contains(&request.sheet_name) {
            return Err(TabulaError::Dispatch(format!(
                "simulated failure for {}",
                request.sheet_name
            )));
        }
        if let Some(body) = self.canned.borrow().get(&request.sheet_name) {
            return Ok(body.clone());
        }

        let mut collections = self.collections.borrow_mut();
        let records = collections.entry(request.sheet_name.clone()).or_default();
        apply_request(records, request)?;
        snapshot_body(records, &request.headers)
    }
}

#[async_trait(?Send)]
impl Dispatcher for MemDispatcher {
    async fn send(&self, request: &ActionRequest) -> Result<String> {
        self.log.borrow_mut().push(request.clone());
        let delay = self.delays.borrow_mut().pop_front();
        let reply = self.reply(request);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        reply
    }
}
