//! # Record Store
//!
//! The record store is the view-model behind one table: it owns the enriched
//! record collection, the loading state, the active filters, the dropdown
//! option cache and the open form. It is the only entry point a presentation
//! layer needs.
//!
//! ## State Machine
//!
//! ```text
//! Idle ──load()──▶ Loading ──▶ Ready ──create/update/delete/load──▶ Loading ──▶ Ready
//! ```
//!
//! There is no error state. A failed round trip is logged, reported to the
//! caller as `Err`, and leaves the last good collection in place; the store
//! returns to `Ready` either way.
//!
//! ## Snapshot Refresh
//!
//! Every successful dispatch returns the whole collection. The store enriches
//! it (computed fields) and then replaces its collection in one step; the
//! previous collection is discarded. There is no incremental patching, and
//! no partially-applied state: enrichment finishes before the swap.
//!
//! ## Concurrency
//!
//! The store is single-threaded (`RefCell`, never borrowed across an
//! `.await`) and every operation takes `&self`, so a presentation layer can
//! start a second mutation while the first is in flight. Mutations are not
//! queued; each request takes a sequence number when issued. A snapshot is
//! applied only if no later-issued request has had its snapshot applied
//! already, so the last **issued** request wins even when replies arrive out
//! of order. The store stays `Loading` until every in-flight request has
//! settled.

use crate::compute::enrich;
use crate::dispatch::{Action, ActionClient, Dispatcher};
use crate::edit::{prepare_edit, FormValues};
use crate::error::{Result, TabulaError};
use crate::filter::{self, FilterState, FilterValue};
use crate::model::Record;
use crate::schema::{OptionSource, Schema};
use futures::future::join_all;
use std::cell::RefCell;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadState {
    Idle,
    Loading,
    Ready,
}

#[derive(Debug)]
struct Inner {
    state: LoadState,
    records: Vec<Record>,
    in_flight: usize,
    issued: u64,
    applied: u64,
    filters: FilterState,
    dropdown_options: HashMap<String, Vec<String>>,
    initial_values: Option<FormValues>,
}

pub struct RecordStore<D: Dispatcher> {
    schema: Arc<Schema>,
    client: ActionClient<D>,
    inner: RefCell<Inner>,
}

impl<D: Dispatcher> RecordStore<D> {
    pub fn new(schema: impl Into<Arc<Schema>>, dispatcher: D) -> Self {
        Self {
            schema: schema.into(),
            client: ActionClient::new(dispatcher),
            inner: RefCell::new(Inner {
                state: LoadState::Idle,
                records: Vec::new(),
                in_flight: 0,
                issued: 0,
                applied: 0,
                filters: FilterState::new(),
                dropdown_options: HashMap::new(),
                initial_values: None,
            }),
        }
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn dispatcher(&self) -> &D {
        self.client.dispatcher()
    }

    pub fn state(&self) -> LoadState {
        self.inner.borrow().state
    }

    pub fn is_loading(&self) -> bool {
        self.state() == LoadState::Loading
    }

    /// The full enriched collection.
    pub fn records(&self) -> Vec<Record> {
        self.inner.borrow().records.clone()
    }

    pub fn find(&self, id: &str) -> Option<Record> {
        self.inner
            .borrow()
            .records
            .iter()
            .find(|r| r.id.as_deref() == Some(id))
            .cloned()
    }

    // --- Round trips ---

    /// Fetch the collection. Called once when a view mounts.
    pub async fn load(&self) -> Result<()> {
        self.round_trip(Action::GetAll, None, None).await
    }

    /// Add a record.
    pub async fn create(&self, values: Record) -> Result<()> {
        self.round_trip(Action::Add, None, Some(values)).await
    }

    /// Update the record named by `values.id`.
    pub async fn update(&self, values: Record) -> Result<()> {
        let Some(id) = values.id.clone() else {
            let collection = self.schema.collection();
            error!(collection, action = %Action::Update, "update requires an id");
            return Err(TabulaError::Dispatch("update requires an id".to_string()));
        };
        self.round_trip(Action::Update, Some(id), Some(values)).await
    }

    /// Create or update depending on whether `values` carries an id.
    pub async fn save(&self, values: Record) -> Result<()> {
        if values.id.is_some() {
            self.update(values).await
        } else {
            self.create(values).await
        }
    }

    pub async fn delete(&self, id: &str) -> Result<()> {
        self.round_trip(Action::Delete, Some(id.to_string()), None)
            .await
    }

    async fn round_trip(
        &self,
        action: Action,
        id: Option<String>,
        data: Option<Record>,
    ) -> Result<()> {
        let request = self.begin();
        let collection = self.schema.collection();
        let result = self
            .client
            .execute(action, collection, id, data, self.schema.headers())
            .await;

        match result {
            Ok(raw) => {
                let enriched = enrich(&self.schema, raw);
                request.settle(Some(enriched));
                Ok(())
            }
            Err(err) => {
                error!(
                    collection,
                    %action,
                    error = %err,
                    "operation failed, keeping previous records"
                );
                request.settle(None);
                Err(err)
            }
        }
    }

    fn begin(&self) -> InFlight<'_> {
        let mut inner = self.inner.borrow_mut();
        inner.issued += 1;
        inner.in_flight += 1;
        inner.state = LoadState::Loading;
        InFlight {
            inner: &self.inner,
            seq: inner.issued,
            settled: false,
        }
    }

    // --- Dropdown options ---

    /// Fill the option cache for every filter backed by an external source.
    ///
    /// Sources are fetched concurrently, each one once even when several
    /// filters share it. A failing source leaves its filters with no options
    /// and does not affect the others.
    pub async fn load_dropdown_options(&self) {
        let sources: BTreeSet<&OptionSource> = self
            .schema
            .filters()
            .iter()
            .filter_map(|(_, spec)| spec.source.as_ref())
            .collect();
        if sources.is_empty() {
            return;
        }

        let fetched = join_all(sources.iter().map(|source| async move {
            let names = self.client.fetch_names(source.as_str()).await;
            (*source, names)
        }))
        .await;

        let mut by_source: HashMap<&OptionSource, Vec<String>> = HashMap::new();
        for (source, names) in fetched {
            let names = names.unwrap_or_else(|err| {
                warn!(source = source.as_str(), error = %err, "option source unavailable");
                Vec::new()
            });
            by_source.insert(source, names);
        }

        let mut inner = self.inner.borrow_mut();
        for (key, spec) in self.schema.filters() {
            if let Some(names) = spec.source.as_ref().and_then(|s| by_source.get(s)) {
                inner.dropdown_options.insert(key.clone(), names.clone());
            }
        }
        info!(
            collection = self.schema.collection(),
            sources = by_source.len(),
            "dropdown options loaded"
        );
    }

    /// Cached options for a source-backed filter.
    pub fn dropdown_options(&self, key: &str) -> Option<Vec<String>> {
        self.inner.borrow().dropdown_options.get(key).cloned()
    }

    /// Options to offer for a select filter: declared options when present,
    /// otherwise whatever the option cache holds.
    pub fn options_for_filter(&self, key: &str) -> Vec<String> {
        match self.schema.filter(key) {
            Some(spec) if !spec.options.is_empty() => spec.options.clone(),
            Some(_) => self.dropdown_options(key).unwrap_or_default(),
            None => Vec::new(),
        }
    }

    // --- Filters ---

    pub fn set_filter(&self, key: impl Into<String>, value: FilterValue) {
        self.inner.borrow_mut().filters.set(key, value);
    }

    pub fn clear_filter(&self, key: &str) {
        self.inner.borrow_mut().filters.remove(key);
    }

    pub fn clear_filters(&self) {
        self.inner.borrow_mut().filters.clear();
    }

    pub fn filters(&self) -> FilterState {
        self.inner.borrow().filters.clone()
    }

    /// The collection as narrowed by the current filters. Recomputed on every call.
    pub fn filtered_records(&self) -> Vec<Record> {
        let inner = self.inner.borrow();
        filter::apply(&self.schema, &inner.records, &inner.filters)
    }

    // --- Forms ---

    /// Open the edit form for `record`.
    pub fn begin_edit(&self, record: &Record) -> FormValues {
        let form = prepare_edit(&self.schema, record);
        self.inner.borrow_mut().initial_values = Some(form.clone());
        form
    }

    /// Open an empty create form.
    pub fn begin_create(&self) -> FormValues {
        let form = FormValues::new();
        self.inner.borrow_mut().initial_values = Some(form.clone());
        form
    }

    pub fn initial_values(&self) -> Option<FormValues> {
        self.inner.borrow().initial_values.clone()
    }

    /// Form submit handler: check rules, then create or update.
    ///
    /// Rule violations are returned without dispatching anything.
    pub async fn submit(&self, form: FormValues) -> Result<()> {
        let record = form.into_record();
        let violations = self.schema.check(&record);
        if !violations.is_empty() {
            return Err(TabulaError::Validation(violations));
        }
        self.save(record).await?;
        self.inner.borrow_mut().initial_values = None;
        Ok(())
    }
}

/// One issued request. Settling it, or dropping it unsettled, takes it out
/// of the in-flight count.
struct InFlight<'a> {
    inner: &'a RefCell<Inner>,
    seq: u64,
    settled: bool,
}

impl InFlight<'_> {
    fn settle(mut self, snapshot: Option<Vec<Record>>) {
        self.settled = true;
        finish(self.inner, self.seq, snapshot);
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if !self.settled {
            debug!(seq = self.seq, "request dropped before its reply");
            finish(self.inner, self.seq, None);
        }
    }
}

fn finish(inner: &RefCell<Inner>, seq: u64, snapshot: Option<Vec<Record>>) {
    let mut inner = inner.borrow_mut();
    inner.in_flight = inner.in_flight.saturating_sub(1);
    match snapshot {
        Some(records) if seq > inner.applied => {
            debug!(seq, count = records.len(), "collection replaced");
            inner.records = records;
            inner.applied = seq;
        }
        Some(_) => {
            debug!(seq, applied = inner.applied, "discarding stale snapshot");
        }
        None => {}
    }
    if inner.in_flight == 0 {
        inner.state = LoadState::Ready;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::memory::MemDispatcher;
    use crate::edit::FormValue;
    use crate::schema::{Field, FieldKind, FilterSpec, Rule};
    use serde_json::json;
    use std::time::Duration;

    fn schema() -> Schema {
        Schema::builder("Records")
            .field(Field::new("task", "Task", FieldKind::Text).rule(Rule::required("task?")))
            .field(Field::new("owner", "Owner", FieldKind::creatable_from("DD_Users")))
            .field(Field::new("reviewer", "Reviewer", FieldKind::creatable_from("DD_Users")))
            .field(Field::new("project", "Project", FieldKind::creatable_from("DD_Projects")))
            .field(Field::new("status", "Status", FieldKind::radio(&["Open", "Done"])))
            .field(Field::computed("shout", "Shout", &["task"], |r| {
                Ok(json!(r.text("task").unwrap_or_default().to_uppercase()))
            }))
            .filter("task", FilterSpec::text("Search"))
            .filter("owner", FilterSpec::select("Owner").source("DD_Users"))
            .filter("reviewer", FilterSpec::select("Reviewer").source("DD_Users"))
            .filter("project", FilterSpec::select("Project").source("DD_Projects"))
            .filter("status", FilterSpec::select("Status").options(&["Open", "Done"]))
            .build()
            .unwrap()
    }

    fn seeded() -> MemDispatcher {
        MemDispatcher::new()
            .with_collection(
                "Records",
                vec![
                    Record::with_id("1").set("task", "write").set("status", "Open"),
                    Record::with_id("2").set("task", "review").set("status", "Done"),
                ],
            )
            .with_names("DD_Users", &["Ann", "Bo", ""])
            .with_names("DD_Projects", &["Apollo"])
    }

    #[tokio::test]
    async fn starts_idle_and_loads() {
        let store = RecordStore::new(schema(), seeded());
        assert_eq!(store.state(), LoadState::Idle);
        store.load().await.unwrap();
        assert_eq!(store.state(), LoadState::Ready);
        let records = store.records();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].text("shout").as_deref(), Some("WRITE"));
    }

    #[tokio::test]
    async fn requests_carry_schema_headers() {
        let store = RecordStore::new(schema(), seeded());
        store.load().await.unwrap();
        let request = &store.dispatcher().requests()[0];
        assert_eq!(request.sheet_name, "Records");
        assert_eq!(request.headers, store.schema().headers());
    }

    #[tokio::test]
    async fn failed_load_returns_to_ready() {
        let store = RecordStore::new(schema(), seeded());
        store.dispatcher().set_fail_all(true);
        assert!(store.load().await.is_err());
        assert_eq!(store.state(), LoadState::Ready);
        assert!(store.records().is_empty());
    }

    #[tokio::test]
    async fn malformed_reply_keeps_previous_records() {
        let store = RecordStore::new(schema(), seeded());
        store.load().await.unwrap();
        store.dispatcher().respond_with("Records", "{not json");
        let err = store.delete("1").await.unwrap_err();
        assert!(matches!(err, TabulaError::MalformedResponse(_)));
        assert_eq!(store.records().len(), 2);
        assert_eq!(store.state(), LoadState::Ready);
    }

    #[tokio::test]
    async fn save_routes_on_id() {
        let store = RecordStore::new(schema(), seeded());
        store.load().await.unwrap();
        store.save(Record::new().set("task", "new")).await.unwrap();
        store
            .save(Record::with_id("1").set("task", "rewrite"))
            .await
            .unwrap();
        let dispatcher = store.dispatcher();
        assert_eq!(dispatcher.count(Action::Add), 1);
        assert_eq!(dispatcher.count(Action::Update), 1);
        assert_eq!(store.records().len(), 3);
        assert_eq!(
            store.find("1").unwrap().text("shout").as_deref(),
            Some("REWRITE")
        );
    }

    #[tokio::test]
    async fn update_without_id_is_rejected() {
        let store = RecordStore::new(schema(), seeded());
        let err = store.update(Record::new()).await.unwrap_err();
        assert!(matches!(err, TabulaError::Dispatch(_)));
        assert_eq!(store.dispatcher().requests().len(), 0);
        assert_eq!(store.state(), LoadState::Idle);
    }

    #[tokio::test]
    async fn submit_checks_rules_before_dispatching() {
        let store = RecordStore::new(schema(), seeded());
        store.load().await.unwrap();
        store.begin_create();
        let err = store.submit(FormValues::new()).await.unwrap_err();
        assert!(matches!(err, TabulaError::Validation(ref v) if v[0].field == "task"));
        assert_eq!(store.dispatcher().count(Action::Add), 0);
        assert!(store.initial_values().is_some());
    }

    #[tokio::test]
    async fn edit_then_submit_updates() {
        let store = RecordStore::new(schema(), seeded());
        store.load().await.unwrap();
        let record = store.find("2").unwrap();
        let mut form = store.begin_edit(&record);
        assert_eq!(store.initial_values(), Some(form.clone()));
        assert!(form.get("shout").is_none());
        form.set("task", FormValue::Value(json!("approve")));
        store.submit(form).await.unwrap();
        assert_eq!(
            store.find("2").unwrap().text("shout").as_deref(),
            Some("APPROVE")
        );
        assert!(store.initial_values().is_none());
    }

    #[tokio::test]
    async fn filtered_view_follows_filter_state() {
        let store = RecordStore::new(schema(), seeded());
        store.load().await.unwrap();
        store.set_filter("status", FilterValue::text("Done"));
        assert_eq!(store.filtered_records().len(), 1);
        store.set_filter("task", FilterValue::text("WRI"));
        assert!(store.filtered_records().is_empty());
        store.clear_filter("status");
        assert_eq!(store.filtered_records().len(), 1);
        store.clear_filters();
        assert_eq!(store.filtered_records().len(), 2);
        assert!(store.filters().is_empty());
    }

    #[tokio::test]
    async fn dropdown_sources_fetched_once_each() {
        let store = RecordStore::new(schema(), seeded());
        store.load_dropdown_options().await;
        assert_eq!(
            store.dropdown_options("owner"),
            Some(vec!["Ann".to_string(), "Bo".to_string()])
        );
        assert_eq!(store.dropdown_options("reviewer"), store.dropdown_options("owner"));
        assert_eq!(store.dropdown_options("project"), Some(vec!["Apollo".to_string()]));
        assert_eq!(store.dropdown_options("status"), None);
        let requests = store.dispatcher().requests();
        assert_eq!(requests.len(), 2);
        assert!(requests.iter().all(|r| r.headers == vec!["name".to_string()]));
        assert_eq!(store.state(), LoadState::Idle);
    }

    #[tokio::test]
    async fn failing_source_does_not_block_others() {
        let store = RecordStore::new(schema(), seeded());
        store.dispatcher().fail_collection("DD_Users");
        store.load_dropdown_options().await;
        assert_eq!(store.dropdown_options("owner"), Some(vec![]));
        assert_eq!(store.dropdown_options("project"), Some(vec!["Apollo".to_string()]));
    }

    #[tokio::test]
    async fn options_prefer_declared_options() {
        let store = RecordStore::new(schema(), seeded());
        store.load_dropdown_options().await;
        assert_eq!(store.options_for_filter("status"), vec!["Open", "Done"]);
        assert_eq!(store.options_for_filter("project"), vec!["Apollo"]);
        assert!(store.options_for_filter("nope").is_empty());
    }

    #[tokio::test]
    async fn stays_loading_until_all_requests_settle() {
        let store = RecordStore::new(schema(), seeded());
        store.load().await.unwrap();
        store.dispatcher().push_delay(Duration::from_millis(30));

        let slow = store.update(Record::with_id("1").set("task", "slow"));
        tokio::pin!(slow);
        assert!(futures::poll!(&mut slow).is_pending());
        assert!(store.is_loading());

        store
            .update(Record::with_id("2").set("task", "fast"))
            .await
            .unwrap();
        assert!(store.is_loading());

        slow.await.unwrap();
        assert_eq!(store.state(), LoadState::Ready);
    }

    #[tokio::test]
    async fn dropped_request_does_not_leave_store_loading() {
        let store = RecordStore::new(schema(), seeded());
        store.load().await.unwrap();
        store.dispatcher().push_delay(Duration::from_millis(30));

        {
            let abandoned = store.update(Record::with_id("1").set("task", "gone"));
            tokio::pin!(abandoned);
            assert!(futures::poll!(&mut abandoned).is_pending());
            assert!(store.is_loading());
        }
        assert_eq!(store.state(), LoadState::Ready);
        assert_eq!(store.find("1").unwrap().text("task").as_deref(), Some("write"));

        store.load().await.unwrap();
        assert_eq!(store.state(), LoadState::Ready);
        assert_eq!(store.find("1").unwrap().text("task").as_deref(), Some("gone"));
    }

    #[tokio::test]
    async fn late_reply_to_earlier_request_is_discarded() {
        let store = RecordStore::new(schema(), seeded());
        store.load().await.unwrap();
        store.dispatcher().push_delay(Duration::from_millis(30));

        // The first update is applied remotely at once but its reply arrives
        // after the second one's, carrying a snapshot without "fast".
        let slow = store.update(Record::with_id("1").set("task", "slow"));
        let fast = store.update(Record::with_id("2").set("task", "fast"));
        let (slow, fast) = tokio::join!(slow, fast);
        slow.unwrap();
        fast.unwrap();

        assert_eq!(store.find("1").unwrap().text("task").as_deref(), Some("slow"));
        assert_eq!(store.find("2").unwrap().text("task").as_deref(), Some("fast"));
        assert_eq!(store.state(), LoadState::Ready);
    }

    #[tokio::test]
    async fn failure_does_not_block_a_later_snapshot() {
        let store = RecordStore::new(schema(), seeded());
        store.load().await.unwrap();
        assert!(store.delete("ghost").await.is_err());
        store.delete("1").await.unwrap();
        assert_eq!(store.records().len(), 1);
    }
}
