use std::sync::Arc;

use futures::{TryStreamExt, future::BoxFuture};
use mongodb::{
    Client, Collection, Database, IndexModel,
    bson::{Document, doc},
    error::{Error as MongoError, ErrorKind, WriteFailure},
    options::IndexOptions,
};
use tokio::sync::RwLock;
use tracing::info;
use uuid::Uuid;

use super::{
    connection::TimerDbTarget,
    error::{MongoDaoError, MongoResult},
    models::{MongoTimerDocument, doc_id},
};
use crate::dao::{
    models::{TimerEntity, TimerFilter},
    storage::StorageResult,
    timer_store::TimerStore,
};

const TIMER_COLLECTION_NAME: &str = "timers";
const ACTIVE_SLOT_INDEX_NAME: &str = "timer_active_slot_idx";
const STATUS_INDEX_NAME: &str = "timer_status_idx";
const DUPLICATE_KEY_CODE: i32 = 11000;

#[derive(Clone)]
pub struct MongoTimerStore {
    inner: Arc<MongoInner>,
}

struct MongoInner {
    state: RwLock<MongoState>,
    target: TimerDbTarget,
}

struct MongoState {
    client: Client,
    database: Database,
}

impl MongoInner {
    async fn ping(&self) -> MongoResult<()> {
        let database = {
            let guard = self.state.read().await;
            guard.database.clone()
        };

        database
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(|source| MongoDaoError::HealthPing { source })?;
        Ok(())
    }

    async fn reconnect(&self) -> MongoResult<()> {
        let (client, database) = self.target.open().await?;
        let mut guard = self.state.write().await;
        guard.client = client;
        guard.database = database;
        Ok(())
    }
}

fn is_duplicate_key(err: &MongoError) -> bool {
    match err.kind.as_ref() {
        ErrorKind::Write(WriteFailure::WriteError(write_error)) => {
            write_error.code == DUPLICATE_KEY_CODE
        }
        ErrorKind::Command(command_error) => command_error.code == DUPLICATE_KEY_CODE,
        _ => false,
    }
}

fn filter_document(filter: &TimerFilter) -> Document {
    let mut query = Document::new();
    if let Some(committee_id) = &filter.committee_id {
        query.insert("committee_id", committee_id.as_str());
    }
    if let Some(session_id) = &filter.session_id {
        query.insert("session_id", session_id.as_str());
    }
    if !filter.statuses.is_empty() {
        let statuses: Vec<&str> = filter.statuses.iter().map(|status| status.as_str()).collect();
        query.insert("status", doc! { "$in": statuses });
    }
    query
}

impl MongoTimerStore {
    /// Open the timer database and ensure indexes are present.
    pub async fn connect(target: TimerDbTarget) -> MongoResult<Self> {
        let (client, database) = target.open().await?;
        info!(database = target.database_name(), "connected to the timer database");

        let inner = Arc::new(MongoInner {
            state: RwLock::new(MongoState { client, database }),
            target,
        });

        let store = Self { inner };
        store.ensure_indexes().await?;
        Ok(store)
    }

    async fn ensure_indexes(&self) -> MongoResult<()> {
        let collection = self.collection().await;

        // At most one non-terminal timer per (committee, type).
        let slot_index = IndexModel::builder()
            .keys(doc! {"committee_id": 1, "timer_type": 1})
            .options(
                IndexOptions::builder()
                    .name(Some(ACTIVE_SLOT_INDEX_NAME.to_owned()))
                    .unique(Some(true))
                    .partial_filter_expression(Some(doc! {"active": true}))
                    .build(),
            )
            .build();

        collection
            .create_index(slot_index)
            .await
            .map_err(|source| MongoDaoError::EnsureIndex {
                collection: TIMER_COLLECTION_NAME,
                index: "committee_id,timer_type",
                source,
            })?;

        let status_index = IndexModel::builder()
            .keys(doc! {"status": 1})
            .options(
                IndexOptions::builder()
                    .name(Some(STATUS_INDEX_NAME.to_owned()))
                    .build(),
            )
            .build();

        collection
            .create_index(status_index)
            .await
            .map_err(|source| MongoDaoError::EnsureIndex {
                collection: TIMER_COLLECTION_NAME,
                index: "status",
                source,
            })?;

        Ok(())
    }

    async fn collection(&self) -> Collection<MongoTimerDocument> {
        let guard = self.inner.state.read().await;
        guard
            .database
            .collection::<MongoTimerDocument>(TIMER_COLLECTION_NAME)
    }

    fn save_error(id: Uuid, document: &MongoTimerDocument, source: MongoError) -> MongoDaoError {
        if is_duplicate_key(&source) {
            MongoDaoError::SlotTaken {
                committee_id: document.committee_id().to_owned(),
                timer_type: document.timer_type().as_str().to_owned(),
                source,
            }
        } else {
            MongoDaoError::SaveTimer { id, source }
        }
    }

    async fn insert_timer(&self, timer: TimerEntity) -> MongoResult<()> {
        let id = timer.id;
        let document: MongoTimerDocument = timer.into();
        let collection = self.collection().await;
        collection
            .insert_one(&document)
            .await
            .map_err(|source| Self::save_error(id, &document, source))?;
        Ok(())
    }

    async fn replace_timer(&self, timer: TimerEntity) -> MongoResult<()> {
        let id = timer.id;
        let document: MongoTimerDocument = timer.into();
        let collection = self.collection().await;
        let result = collection
            .replace_one(doc_id(id), &document)
            .await
            .map_err(|source| Self::save_error(id, &document, source))?;

        if result.matched_count == 0 {
            return Err(MongoDaoError::MissingTimer { id });
        }
        Ok(())
    }

    async fn find_timer(&self, id: Uuid) -> MongoResult<Option<TimerEntity>> {
        let collection = self.collection().await;

        let document = collection
            .find_one(doc_id(id))
            .await
            .map_err(|source| MongoDaoError::LoadTimer { id, source })?;

        document.map(TimerEntity::try_from).transpose()
    }

    async fn list_timers(&self, filter: TimerFilter) -> MongoResult<Vec<TimerEntity>> {
        let collection = self.collection().await;

        let documents: Vec<MongoTimerDocument> = collection
            .find(filter_document(&filter))
            .sort(doc! {"created_at": 1, "_id": 1})
            .await
            .map_err(|source| MongoDaoError::ListTimers { source })?
            .try_collect()
            .await
            .map_err(|source| MongoDaoError::ListTimers { source })?;

        documents.into_iter().map(TimerEntity::try_from).collect()
    }
}

impl TimerStore for MongoTimerStore {
    fn insert_timer(&self, timer: TimerEntity) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.insert_timer(timer).await.map_err(Into::into) })
    }

    fn replace_timer(&self, timer: TimerEntity) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.replace_timer(timer).await.map_err(Into::into) })
    }

    fn find_timer(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<TimerEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.find_timer(id).await.map_err(Into::into) })
    }

    fn list_timers(
        &self,
        filter: TimerFilter,
    ) -> BoxFuture<'static, StorageResult<Vec<TimerEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.list_timers(filter).await.map_err(Into::into) })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.inner.ping().await.map_err(Into::into) })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.inner.reconnect().await.map_err(Into::into) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dao::models::TimerStatus;

    #[test]
    fn filter_document_only_sets_requested_fields() {
        let query = filter_document(&TimerFilter::default());
        assert!(query.is_empty());

        let query = filter_document(&TimerFilter {
            committee_id: Some("c1".into()),
            session_id: None,
            statuses: vec![TimerStatus::Running, TimerStatus::Paused],
        });
        assert_eq!(query.get_str("committee_id").unwrap(), "c1");
        assert!(query.get("session_id").is_none());
        let statuses = query.get_document("status").unwrap();
        assert_eq!(
            statuses.get_array("$in").unwrap().len(),
            2,
            "status filter should list both statuses"
        );
    }
}
