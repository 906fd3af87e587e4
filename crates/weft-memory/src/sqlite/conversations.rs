use weft_llm::Role;

use super::{SqliteStore, parse_timestamp};
use crate::error::{HistoryError, StoreError};
use crate::history::{ConversationTurn, TurnStatus};
use crate::store::ConversationStore;
use crate::vector_store::BoxFuture;

impl ConversationStore for SqliteStore {
    fn append_turns(
        &self,
        assistant: &str,
        turns: &[ConversationTurn],
    ) -> BoxFuture<'_, Result<(), StoreError>> {
        let assistant = assistant.to_owned();
        let turns = turns.to_vec();
        Box::pin(async move {
            let mut tx = self.pool.begin().await?;
            for turn in &turns {
                sqlx::query(
                    "INSERT INTO conversation_turns (assistant, role, content, status, created_at) \
                     VALUES (?, ?, ?, ?, ?)",
                )
                .bind(&assistant)
                .bind(turn.role.as_str())
                .bind(&turn.content)
                .bind(turn.status.as_str())
                .bind(turn.timestamp.to_rfc3339())
                .execute(&mut *tx)
                .await?;
            }
            tx.commit().await?;
            Ok(())
        })
    }

    fn load_turns(
        &self,
        assistant: &str,
    ) -> BoxFuture<'_, Result<Vec<ConversationTurn>, StoreError>> {
        let assistant = assistant.to_owned();
        Box::pin(async move {
            let rows: Vec<(String, String, String, String)> = sqlx::query_as(
                "SELECT role, content, status, created_at FROM conversation_turns \
                 WHERE assistant = ? ORDER BY id ASC",
            )
            .bind(&assistant)
            .fetch_all(&self.pool)
            .await?;

            rows.into_iter()
                .map(|(role, content, status, created_at)| -> Result<ConversationTurn, StoreError> {
                    let role = role
                        .parse::<Role>()
                        .map_err(|_| HistoryError::UnknownRole(role.clone()))?;
                    Ok(ConversationTurn {
                        role,
                        content,
                        timestamp: parse_timestamp(&created_at)?,
                        status: status.parse::<TurnStatus>()?,
                    })
                })
                .collect()
        })
    }

    fn clear_turns(&self, assistant: &str) -> BoxFuture<'_, Result<u64, StoreError>> {
        let assistant = assistant.to_owned();
        Box::pin(async move {
            let result = sqlx::query("DELETE FROM conversation_turns WHERE assistant = ?")
                .bind(&assistant)
                .execute(&self.pool)
                .await?;
            Ok(result.rows_affected())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn turns_round_trip_with_status() {
        let store = SqliteStore::new(":memory:").await.unwrap();
        store
            .append_turns(
                "helper",
                &[
                    ConversationTurn::user("tell me"),
                    ConversationTurn::assistant("partial [error: cut]").failed(),
                ],
            )
            .await
            .unwrap();

        let turns = store.load_turns("helper").await.unwrap();
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[0].role, Role::User);
        assert_eq!(turns[1].status, TurnStatus::Error);
        assert!(store.load_turns("nobody").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn clear_only_touches_one_assistant() {
        let store = SqliteStore::new(":memory:").await.unwrap();
        store
            .append_turns("a", &[ConversationTurn::user("1"), ConversationTurn::user("2")])
            .await
            .unwrap();
        store
            .append_turns("b", &[ConversationTurn::user("3")])
            .await
            .unwrap();
        assert_eq!(store.clear_turns("a").await.unwrap(), 2);
        assert_eq!(store.load_turns("b").await.unwrap().len(), 1);
    }
}
