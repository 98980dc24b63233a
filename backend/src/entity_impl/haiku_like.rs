use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use sea_orm::{
    sea_query::{Expr, OnConflict},
    ActiveValue, ColumnTrait, DatabaseConnection, DbErr, EntityTrait, PaginatorTrait,
    QueryFilter, QuerySelect,
};
use uuid::Uuid;

use crate::{
    entity::haiku_like,
    error::{Context, Result},
};

/// Authoritative record of who liked which haiku.
#[async_trait]
pub trait LikeStore: Send + Sync + 'static {
    /// Records a like. Returns `false` without recording anything when the user
    /// already liked the haiku.
    async fn insert_like(&self, haiku_id: &str, user_id: &str) -> Result<bool>;

    async fn count(&self, haiku_id: &str) -> Result<u64>;

    /// Like counts of the given haikus. Haikus without likes are absent.
    async fn counts(&self, haiku_ids: &[String]) -> Result<HashMap<String, u64>>;

    async fn all_counts(&self) -> Result<HashMap<String, u64>>;
}

async fn query_counts(
    db: &DatabaseConnection,
    haiku_ids: Option<&[String]>,
) -> Result<HashMap<String, u64>> {
    let query = haiku_like::Entity::find()
        .select_only()
        .column(haiku_like::Column::HaikuId)
        .column_as(Expr::col(haiku_like::Column::Id).count(), "count");
    let query = if let Some(haiku_ids) = haiku_ids {
        query.filter(haiku_like::Column::HaikuId.is_in(haiku_ids.iter().cloned()))
    } else {
        query
    };
    let rows = query
        .group_by(haiku_like::Column::HaikuId)
        .into_tuple::<(String, i64)>()
        .all(db)
        .await
        .context_internal_server_error("failed to query database")?;
    Ok(rows
        .into_iter()
        .map(|(haiku_id, count)| (haiku_id, count.max(0) as u64))
        .collect())
}

#[async_trait]
impl LikeStore for DatabaseConnection {
    #[tracing::instrument(skip(self))]
    async fn insert_like(&self, haiku_id: &str, user_id: &str) -> Result<bool> {
        let like_activemodel = haiku_like::ActiveModel {
            id: ActiveValue::Set(Uuid::new_v4()),
            haiku_id: ActiveValue::Set(haiku_id.to_string()),
            user_id: ActiveValue::Set(user_id.to_string()),
            created_at: ActiveValue::Set(Utc::now().fixed_offset()),
        };
        // The unique index on (haiku_id, user_id) turns a duplicate into a no-op.
        let res = haiku_like::Entity::insert(like_activemodel)
            .on_conflict(
                OnConflict::columns([haiku_like::Column::HaikuId, haiku_like::Column::UserId])
                    .do_nothing()
                    .to_owned(),
            )
            .exec(self)
            .await;
        match res {
            Ok(_) => Ok(true),
            Err(DbErr::RecordNotInserted) => Ok(false),
            Err(e) => Err(e).context_internal_server_error("failed to insert to database"),
        }
    }

    #[tracing::instrument(skip(self))]
    async fn count(&self, haiku_id: &str) -> Result<u64> {
        haiku_like::Entity::find()
            .filter(haiku_like::Column::HaikuId.eq(haiku_id))
            .count(self)
            .await
            .context_internal_server_error("failed to query database")
    }

    #[tracing::instrument(skip_all, fields(len = haiku_ids.len()))]
    async fn counts(&self, haiku_ids: &[String]) -> Result<HashMap<String, u64>> {
        if haiku_ids.is_empty() {
            return Ok(HashMap::new());
        }
        query_counts(self, Some(haiku_ids)).await
    }

    #[tracing::instrument(skip(self))]
    async fn all_counts(&self) -> Result<HashMap<String, u64>> {
        query_counts(self, None).await
    }
}
