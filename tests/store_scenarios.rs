use chrono::NaiveDate;
use serde_json::json;
use tabula::dispatch::memory::MemDispatcher;
use tabula::dispatch::Action;
use tabula::error::TabulaError;
use tabula::filter::FilterValue;
use tabula::model::Record;
use tabula::schema::builtin;
use tabula::store::{LoadState, RecordStore};

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn budget_rows() -> Vec<Record> {
    vec![
        Record::with_id("1")
            .set("project", "Apollo")
            .set("budgetAmount", 1000)
            .set("spentAmount", 400),
        Record::with_id("2")
            .set("project", "Gemini")
            .set("budgetAmount", 0)
            .set("spentAmount", 50),
        Record::with_id("3")
            .set("project", "Mercury")
            .set("budgetAmount", "250")
            .set("spentAmount", "100"),
    ]
}

fn task_rows() -> Vec<Record> {
    vec![
        Record::with_id("a")
            .set("task", "Quarterly report")
            .set("status", "Done")
            .set("dueDate", "2024-01-01"),
        Record::with_id("b")
            .set("task", "Plan offsite")
            .set("status", "To Do")
            .set("dueDate", "2024-01-15T00:00:00.000Z"),
        Record::with_id("c")
            .set("task", "REPORT archive")
            .set("status", "In Progress"),
    ]
}

#[tokio::test]
async fn budget_balance_and_percentage() {
    let dispatcher = MemDispatcher::new().with_collection("ProjectBudgeting", budget_rows());
    let store = RecordStore::new(builtin::budget().unwrap(), dispatcher);
    store.load().await.unwrap();

    let apollo = store.find("1").unwrap();
    assert_eq!(apollo.number("balance"), Some(600.0));
    assert_eq!(apollo.number("percentageUsed"), Some(40.0));

    let gemini = store.find("2").unwrap();
    assert_eq!(gemini.number("balance"), Some(-50.0));
    assert_eq!(gemini.number("percentageUsed"), Some(0.0));

    let mercury = store.find("3").unwrap();
    assert_eq!(mercury.number("balance"), Some(150.0));
    assert_eq!(mercury.number("percentageUsed"), Some(40.0));
}

#[tokio::test]
async fn delete_leaves_remaining_records_enriched() {
    let dispatcher = MemDispatcher::new().with_collection("ProjectBudgeting", budget_rows());
    let store = RecordStore::new(builtin::budget().unwrap(), dispatcher);
    store.load().await.unwrap();
    assert_eq!(store.records().len(), 3);

    store.delete("2").await.unwrap();

    assert_eq!(store.state(), LoadState::Ready);
    let records = store.records();
    let ids: Vec<_> = records.iter().filter_map(|r| r.id.as_deref()).collect();
    assert_eq!(ids, vec!["1", "3"]);
    assert!(records.iter().all(|r| r.get("balance").is_some()));
    assert_eq!(store.dispatcher().collection("ProjectBudgeting").len(), 2);
}

#[tokio::test]
async fn failed_create_keeps_loaded_records() {
    let dispatcher = MemDispatcher::new().with_collection("ProjectBudgeting", budget_rows());
    let store = RecordStore::new(builtin::budget().unwrap(), dispatcher);
    store.load().await.unwrap();
    let before = store.records();

    store.dispatcher().set_fail_all(true);
    let result = store
        .create(Record::new().set("project", "Vostok").set("budgetAmount", 10))
        .await;

    assert!(matches!(result, Err(TabulaError::Dispatch(_))));
    assert_eq!(store.state(), LoadState::Ready);
    assert_eq!(store.records(), before);
    assert_eq!(store.dispatcher().count(Action::Add), 1);
}

#[tokio::test]
async fn text_filter_is_case_insensitive() {
    let dispatcher = MemDispatcher::new().with_collection("Records", task_rows());
    let store = RecordStore::new(builtin::tasks().unwrap(), dispatcher);
    store.load().await.unwrap();

    store.set_filter("task", FilterValue::text("Report"));
    let ids: Vec<_> = store
        .filtered_records()
        .into_iter()
        .filter_map(|r| r.id)
        .collect();
    assert_eq!(ids, vec!["a", "c"]);
}

#[tokio::test]
async fn date_range_bounds_are_exclusive() {
    let dispatcher = MemDispatcher::new().with_collection("Records", task_rows());
    let store = RecordStore::new(builtin::tasks().unwrap(), dispatcher);
    store.load().await.unwrap();

    store.set_filter(
        "dueDate",
        FilterValue::range(date(2024, 1, 1), date(2024, 1, 31)),
    );
    let ids: Vec<_> = store
        .filtered_records()
        .into_iter()
        .filter_map(|r| r.id)
        .collect();
    assert_eq!(ids, vec!["b"]);
}

#[tokio::test]
async fn empty_filters_return_everything() {
    let dispatcher = MemDispatcher::new().with_collection("Records", task_rows());
    let store = RecordStore::new(builtin::tasks().unwrap(), dispatcher);
    store.load().await.unwrap();

    store.set_filter("task", FilterValue::text(""));
    store.set_filter("dueDate", FilterValue::Range(Some(date(2024, 1, 1)), None));
    assert_eq!(store.filtered_records(), store.records());
}

#[tokio::test]
async fn filters_combine() {
    let dispatcher = MemDispatcher::new().with_collection("Records", task_rows());
    let store = RecordStore::new(builtin::tasks().unwrap(), dispatcher);
    store.load().await.unwrap();

    store.set_filter("task", FilterValue::text("report"));
    store.set_filter("status", FilterValue::text("Done"));
    let filtered = store.filtered_records();
    assert_eq!(filtered.len(), 1);
    assert_eq!(filtered[0].id.as_deref(), Some("a"));
}

#[tokio::test]
async fn reload_is_deterministic() {
    let dispatcher = MemDispatcher::new().with_collection("Records", task_rows());
    let store = RecordStore::new(builtin::tasks().unwrap(), dispatcher);
    store.load().await.unwrap();
    let first = store.records();
    store.load().await.unwrap();
    assert_eq!(store.records(), first);
}

#[tokio::test]
async fn task_duration_from_form_submission() {
    let dispatcher = MemDispatcher::new().with_collection("Records", task_rows());
    let store = RecordStore::new(builtin::tasks().unwrap(), dispatcher);
    store.load().await.unwrap();

    let record = store.find("b").unwrap();
    let mut form = store.begin_edit(&record);
    form.merge(
        tabula::edit::FormValues::from_pairs(
            store.schema(),
            &[
                "startDate=2024-01-02",
                "endDate=2024-01-12",
                "status=Done",
            ],
        )
        .unwrap(),
    );
    store.submit(form).await.unwrap();

    let updated = store.find("b").unwrap();
    assert_eq!(updated.text("dueDate").as_deref(), Some("2024-01-15"));
    assert_eq!(
        updated.get("duration"),
        Some(&json!({"days": 10, "variance": 3}))
    );
}

#[tokio::test]
async fn dropdowns_load_from_option_sources() {
    let dispatcher = MemDispatcher::new()
        .with_collection("Records", task_rows())
        .with_names("DD_Projects", &["Apollo", "Gemini"])
        .with_names("DD_Users", &["Ann"]);
    let store = RecordStore::new(builtin::tasks().unwrap(), dispatcher);
    store.load_dropdown_options().await;

    assert_eq!(store.options_for_filter("project"), vec!["Apollo", "Gemini"]);
    assert_eq!(store.options_for_filter("assignedTo"), vec!["Ann"]);
    assert_eq!(
        store.options_for_filter("status"),
        builtin::TASK_STATUSES.to_vec()
    );
}
