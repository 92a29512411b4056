use super::{apply_request, snapshot_body, Action, ActionRequest, Dispatcher};
use crate::error::{Result, TabulaError};
use crate::model::Record;
use async_trait::async_trait;
use std::fs;
use std::path::{Path, PathBuf};

/// File-backed dispatcher: a local stand-in for the remote store.
///
/// Each collection lives in `<root>/<collection>.json` as a JSON array of
/// records. Writes go to a temporary file first and are renamed into place,
/// so a collection file is never left half-written.
pub struct FileDispatcher {
    root: PathBuf,
}

impl FileDispatcher {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn collection_path(&self, name: &str) -> Result<PathBuf> {
        let valid = !name.is_empty()
            && name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        if !valid {
            return Err(TabulaError::Dispatch(format!(
                "invalid collection name `{}`",
                name
            )));
        }
        Ok(self.root.join(format!("{}.json", name)))
    }

    pub fn load(&self, name: &str) -> Result<Vec<Record>> {
        let path = self.collection_path(name)?;
        if !path.exists() {
            return Ok(Vec::new());
        }
        let content = fs::read_to_string(path)?;
        if content.trim().is_empty() {
            return Ok(Vec::new());
        }
        Ok(serde_json::from_str(&content)?)
    }

    pub fn save(&self, name: &str, records: &[Record]) -> Result<()> {
        let path = self.collection_path(name)?;
        if !self.root.exists() {
            fs::create_dir_all(&self.root)?;
        }
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_string_pretty(records)?)?;
        fs::rename(tmp, path)?;
        Ok(())
    }
}

#[async_trait(?Send)]
impl Dispatcher for FileDispatcher {
    async fn send(&self, request: &ActionRequest) -> Result<String> {
        let mut records = self.load(&request.sheet_name)?;
        apply_request(&mut records, request)?;
        if request.action != Action::GetAll {
            self.save(&request.sheet_name, &records)?;
        }
        snapshot_body(&records, &request.headers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::normalize;

    fn request(action: Action, id: Option<&str>, data: Option<Record>) -> ActionRequest {
        ActionRequest {
            action,
            sheet_name: "Records".into(),
            id: id.map(String::from),
            data,
            headers: vec!["task".into()],
        }
    }

    #[tokio::test]
    async fn add_update_delete_persist() {
        let dir = tempfile::tempdir().unwrap();
        let dispatcher = FileDispatcher::new(dir.path());

        let body = dispatcher
            .send(&request(Action::Add, None, Some(Record::new().set("task", "A"))))
            .await
            .unwrap();
        let records = normalize(&body).unwrap();
        let id = records[0].id.clone().unwrap();
        assert!(dir.path().join("Records.json").exists());

        dispatcher
            .send(&request(
                Action::Update,
                Some(&id),
                Some(Record::with_id(id.clone()).set("task", "B")),
            ))
            .await
            .unwrap();
        assert_eq!(dispatcher.load("Records").unwrap()[0].text("task").as_deref(), Some("B"));

        let body = dispatcher
            .send(&request(Action::Delete, Some(&id), None))
            .await
            .unwrap();
        assert_eq!(body, "[]");
    }

    #[tokio::test]
    async fn missing_collection_reads_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let dispatcher = FileDispatcher::new(dir.path().join("not-yet"));
        let body = dispatcher
            .send(&request(Action::GetAll, None, None))
            .await
            .unwrap();
        assert_eq!(body, "[]");
    }

    #[tokio::test]
    async fn rejects_path_like_collection_names() {
        let dir = tempfile::tempdir().unwrap();
        let dispatcher = FileDispatcher::new(dir.path());
        let mut req = request(Action::GetAll, None, None);
        req.sheet_name = "../etc".into();
        assert!(dispatcher.send(&req).await.is_err());
    }

    #[tokio::test]
    async fn update_of_unknown_id_fails_without_writing() {
        let dir = tempfile::tempdir().unwrap();
        let dispatcher = FileDispatcher::new(dir.path());
        let result = dispatcher
            .send(&request(Action::Update, Some("ghost"), Some(Record::new())))
            .await;
        assert!(matches!(result, Err(TabulaError::RecordNotFound(_))));
        assert!(!dir.path().join("Records.json").exists());
    }
}
