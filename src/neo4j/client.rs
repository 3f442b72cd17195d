//! Neo4j client for the record store

use super::models::*;
use super::traits::TaskWrite;
use crate::tasks::models::UpdateTaskRequest;
use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use neo4rs::{query, Graph};
use std::sync::Arc;
use uuid::Uuid;

/// Client for Neo4j operations
pub struct Neo4jClient {
    graph: Arc<Graph>,
}

/// Fixed-width UTC timestamp so stored strings order chronologically
fn ts(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn opt_ts(dt: Option<DateTime<Utc>>) -> String {
    dt.map(ts).unwrap_or_default()
}

fn get_opt_string(node: &neo4rs::Node, key: &str) -> Option<String> {
    node.get::<String>(key).ok().filter(|s| !s.is_empty())
}

fn get_opt_ts(node: &neo4rs::Node, key: &str) -> Option<DateTime<Utc>> {
    get_opt_string(node, key).and_then(|s| s.parse().ok())
}

fn get_ts(node: &neo4rs::Node, key: &str) -> DateTime<Utc> {
    get_opt_ts(node, key).unwrap_or_else(Utc::now)
}

fn get_json(node: &neo4rs::Node, key: &str) -> serde_json::Value {
    get_opt_string(node, key)
        .and_then(|s| serde_json::from_str(&s).ok())
        .unwrap_or_else(|| serde_json::json!({}))
}

impl Neo4jClient {
    /// Create a new Neo4j client
    pub async fn new(uri: &str, user: &str, password: &str) -> Result<Self> {
        let graph = Graph::new(uri, user, password)
            .await
            .context("Failed to connect to Neo4j")?;

        let client = Self {
            graph: Arc::new(graph),
        };

        client.init_schema().await?;

        Ok(client)
    }

    /// Initialize the graph schema with constraints and indexes
    async fn init_schema(&self) -> Result<()> {
        let constraints = vec![
            "CREATE CONSTRAINT task_id IF NOT EXISTS FOR (t:Task) REQUIRE t.id IS UNIQUE",
            "CREATE CONSTRAINT user_id IF NOT EXISTS FOR (u:User) REQUIRE u.id IS UNIQUE",
            "CREATE CONSTRAINT connection_id IF NOT EXISTS FOR (c:Connection) REQUIRE c.id IS UNIQUE",
            "CREATE CONSTRAINT subscription_id IF NOT EXISTS FOR (s:PushSubscription) REQUIRE s.id IS UNIQUE",
            "CREATE CONSTRAINT calendar_event_id IF NOT EXISTS FOR (e:CalendarEvent) REQUIRE e.id IS UNIQUE",
            "CREATE CONSTRAINT email_id IF NOT EXISTS FOR (m:Email) REQUIRE m.id IS UNIQUE",
        ];

        let indexes = vec![
            "CREATE INDEX task_owner IF NOT EXISTS FOR (t:Task) ON (t.owner_id)",
            "CREATE INDEX task_parent IF NOT EXISTS FOR (t:Task) ON (t.parent_id)",
            "CREATE INDEX connection_user IF NOT EXISTS FOR (c:Connection) ON (c.user_id)",
            "CREATE INDEX connection_email IF NOT EXISTS FOR (c:Connection) ON (c.provider_email)",
            "CREATE INDEX subscription_channel IF NOT EXISTS FOR (s:PushSubscription) ON (s.channel_id)",
            "CREATE INDEX subscription_user IF NOT EXISTS FOR (s:PushSubscription) ON (s.user_id)",
            "CREATE INDEX calendar_event_external IF NOT EXISTS FOR (e:CalendarEvent) ON (e.user_id, e.external_id)",
            "CREATE INDEX email_external IF NOT EXISTS FOR (m:Email) ON (m.user_id, m.external_id)",
        ];

        for constraint in constraints {
            if let Err(e) = self.graph.run(query(constraint)).await {
                tracing::warn!("Constraint may already exist: {}", e);
            }
        }

        for index in indexes {
            if let Err(e) = self.graph.run(query(index)).await {
                tracing::warn!("Index may already exist: {}", e);
            }
        }

        Ok(())
    }

    // ========================================================================
    // Task operations
    // ========================================================================

    /// Insert a task, deriving its level from the parent in the same statement
    pub async fn create_task(&self, task: &TaskNode) -> Result<Option<TaskNode>> {
        let q = match task.parent_id {
            None => query(
                r#"
                CREATE (t:Task {
                    id: $id,
                    owner_id: $owner_id,
                    title: $title,
                    notes: $notes,
                    due_date: $due_date,
                    completed: $completed,
                    parent_id: '',
                    position: $position,
                    level: 0,
                    created_at: $created_at,
                    updated_at: $updated_at
                })
                RETURN t
                "#,
            ),
            Some(parent_id) => query(
                r#"
                MATCH (p:Task {id: $parent_id, owner_id: $owner_id})
                WHERE p.level < $max_level
                CREATE (t:Task {
                    id: $id,
                    owner_id: $owner_id,
                    title: $title,
                    notes: $notes,
                    due_date: $due_date,
                    completed: $completed,
                    parent_id: p.id,
                    position: $position,
                    level: p.level + 1,
                    created_at: $created_at,
                    updated_at: $updated_at
                })-[:CHILD_OF]->(p)
                RETURN t
                "#,
            )
            .param("parent_id", parent_id.to_string())
            .param("max_level", MAX_TASK_LEVEL as i64),
        }
        .param("id", task.id.to_string())
        .param("owner_id", task.owner_id.to_string())
        .param("title", task.title.clone())
        .param("notes", task.notes.clone().unwrap_or_default())
        .param("due_date", opt_ts(task.due_date))
        .param("completed", task.completed)
        .param("position", task.position)
        .param("created_at", ts(task.created_at))
        .param("updated_at", ts(task.updated_at));

        let mut result = self.graph.execute(q).await?;
        if let Some(row) = result.next().await? {
            let node: neo4rs::Node = row.get("t")?;
            Ok(Some(self.node_to_task(&node)?))
        } else {
            Ok(None)
        }
    }

    /// Get a task owned by `owner_id`
    pub async fn get_task(&self, owner_id: Uuid, task_id: Uuid) -> Result<Option<TaskNode>> {
        let q = query(
            r#"
            MATCH (t:Task {id: $id, owner_id: $owner_id})
            RETURN t
            "#,
        )
        .param("id", task_id.to_string())
        .param("owner_id", owner_id.to_string());

        let mut result = self.graph.execute(q).await?;
        if let Some(row) = result.next().await? {
            let node: neo4rs::Node = row.get("t")?;
            Ok(Some(self.node_to_task(&node)?))
        } else {
            Ok(None)
        }
    }

    /// Update a task. A parent change is validated (ownership, cycles, depth of
    /// the moved subtree) and applied, with every descendant re-levelled, in one statement.
    pub async fn update_task(
        &self,
        owner_id: Uuid,
        task_id: Uuid,
        updates: &UpdateTaskRequest,
    ) -> Result<TaskWrite> {
        let mut set_clauses = vec!["t.updated_at = $updated_at"];
        if updates.title.is_some() {
            set_clauses.push("t.title = $title");
        }
        if updates.notes.is_some() {
            set_clauses.push("t.notes = $notes");
        }
        if updates.due_date.is_some() {
            set_clauses.push("t.due_date = $due_date");
        }
        if updates.completed.is_some() {
            set_clauses.push("t.completed = $completed");
        }
        if updates.position.is_some() {
            set_clauses.push("t.position = $position");
        }
        let sets = set_clauses.join(", ");

        let cypher = match updates.parent_id {
            None => format!(
                r#"
                MATCH (t:Task {{id: $id, owner_id: $owner_id}})
                SET {sets}
                RETURN 'ok' AS outcome, t
                "#
            ),
            Some(_) => format!(
                r#"
                MATCH (t:Task {{id: $id, owner_id: $owner_id}})
                OPTIONAL MATCH (p:Task {{id: $parent_id, owner_id: $owner_id}})
                OPTIONAL MATCH sub = (:Task)-[:CHILD_OF*0..]->(t)
                WITH t, p, max(length(sub)) AS height
                WITH t, p, height,
                     CASE WHEN p IS NULL THEN false
                          ELSE EXISTS {{ MATCH (p)-[:CHILD_OF*0..]->(t) }}
                     END AS cycle,
                     CASE WHEN p IS NULL THEN 0 ELSE p.level + 1 END AS new_level
                WITH t, p, new_level,
                     CASE
                         WHEN NOT $to_root AND p IS NULL THEN 'invalid_parent'
                         WHEN cycle THEN 'invalid_parent'
                         WHEN new_level + height > $max_level THEN 'depth_exceeded'
                         ELSE 'ok'
                     END AS outcome
                CALL {{
                    WITH t, p, new_level, outcome
                    WITH t, p, new_level WHERE outcome = 'ok'
                    SET {sets}
                    WITH t, p, new_level
                    OPTIONAL MATCH (t)-[old:CHILD_OF]->()
                    DELETE old
                    WITH DISTINCT t, p, new_level
                    FOREACH (_ IN CASE WHEN p IS NULL THEN [] ELSE [1] END |
                        CREATE (t)-[:CHILD_OF]->(p))
                    SET t.parent_id = coalesce(p.id, '')
                    WITH t, new_level
                    MATCH sub = (d:Task)-[:CHILD_OF*0..]->(t)
                    SET d.level = new_level + length(sub)
                    RETURN count(d) AS relevelled
                }}
                RETURN outcome, t
                "#
            ),
        };

        let mut q = query(&cypher)
            .param("id", task_id.to_string())
            .param("owner_id", owner_id.to_string())
            .param("updated_at", ts(Utc::now()));

        if let Some(ref title) = updates.title {
            q = q.param("title", title.clone());
        }
        if let Some(ref notes) = updates.notes {
            q = q.param("notes", notes.clone().unwrap_or_default());
        }
        if let Some(due) = updates.due_date {
            q = q.param("due_date", opt_ts(due));
        }
        if let Some(completed) = updates.completed {
            q = q.param("completed", completed);
        }
        if let Some(position) = updates.position {
            q = q.param("position", position);
        }
        if let Some(parent) = updates.parent_id {
            q = q
                .param(
                    "parent_id",
                    parent.map(|p| p.to_string()).unwrap_or_default(),
                )
                .param("to_root", parent.is_none())
                .param("max_level", MAX_TASK_LEVEL as i64);
        }

        let mut result = self.graph.execute(q).await?;
        let Some(row) = result.next().await? else {
            return Ok(TaskWrite::NotFound);
        };
        let outcome: String = row.get("outcome")?;
        match outcome.as_str() {
            "invalid_parent" => Ok(TaskWrite::InvalidParent),
            "depth_exceeded" => Ok(TaskWrite::DepthExceeded),
            _ => {
                let node: neo4rs::Node = row.get("t")?;
                Ok(TaskWrite::Written(self.node_to_task(&node)?))
            }
        }
    }

    /// Delete a task with every transitive descendant
    pub async fn delete_task_tree(&self, owner_id: Uuid, task_id: Uuid) -> Result<u64> {
        let q = query(
            r#"
            MATCH (t:Task {id: $id, owner_id: $owner_id})
            OPTIONAL MATCH (d:Task)-[:CHILD_OF*1..]->(t)
            WITH t, collect(DISTINCT d) AS descendants
            UNWIND [t] + descendants AS doomed
            DETACH DELETE doomed
            RETURN count(doomed) AS deleted
            "#,
        )
        .param("id", task_id.to_string())
        .param("owner_id", owner_id.to_string());

        let mut result = self.graph.execute(q).await?;
        if let Some(row) = result.next().await? {
            let deleted: i64 = row.get("deleted")?;
            Ok(deleted.max(0) as u64)
        } else {
            Ok(0)
        }
    }

    /// List an owner's tasks, roots first
    pub async fn list_tasks(&self, owner_id: Uuid, filters: &TaskFilters) -> Result<Vec<TaskNode>> {
        let (any_parent, parent_id) = match filters.parent {
            None => (true, String::new()),
            Some(None) => (false, String::new()),
            Some(Some(id)) => (false, id.to_string()),
        };

        let q = query(
            r#"
            MATCH (t:Task {owner_id: $owner_id})
            WHERE ($include_completed OR t.completed = false)
              AND ($any_parent OR t.parent_id = $parent_id)
            RETURN t
            ORDER BY t.parent_id, t.position, t.created_at
            "#,
        )
        .param("owner_id", owner_id.to_string())
        .param("include_completed", filters.include_completed)
        .param("any_parent", any_parent)
        .param("parent_id", parent_id);

        let mut result = self.graph.execute(q).await?;
        let mut tasks = Vec::new();

        while let Some(row) = result.next().await? {
            let node: neo4rs::Node = row.get("t")?;
            tasks.push(self.node_to_task(&node)?);
        }

        Ok(tasks)
    }

    /// Bulk position update scoped to one owner
    pub async fn set_task_positions(
        &self,
        owner_id: Uuid,
        positions: &[(Uuid, i64)],
    ) -> Result<Vec<TaskNode>> {
        let ids: Vec<String> = positions.iter().map(|(id, _)| id.to_string()).collect();
        let values: Vec<i64> = positions.iter().map(|(_, p)| *p).collect();

        let q = query(
            r#"
            UNWIND range(0, size($ids) - 1) AS i
            MATCH (t:Task {id: $ids[i], owner_id: $owner_id})
            SET t.position = $positions[i], t.updated_at = $updated_at
            RETURN t
            "#,
        )
        .param("ids", ids)
        .param("positions", values)
        .param("owner_id", owner_id.to_string())
        .param("updated_at", ts(Utc::now()));

        let mut result = self.graph.execute(q).await?;
        let mut tasks = Vec::new();

        while let Some(row) = result.next().await? {
            let node: neo4rs::Node = row.get("t")?;
            tasks.push(self.node_to_task(&node)?);
        }

        Ok(tasks)
    }

    fn node_to_task(&self, node: &neo4rs::Node) -> Result<TaskNode> {
        Ok(TaskNode {
            id: node.get::<String>("id")?.parse()?,
            owner_id: node.get::<String>("owner_id")?.parse()?,
            title: node.get("title")?,
            notes: get_opt_string(node, "notes"),
            due_date: get_opt_ts(node, "due_date"),
            completed: node.get("completed").unwrap_or(false),
            parent_id: get_opt_string(node, "parent_id").and_then(|s| s.parse().ok()),
            position: node.get("position").unwrap_or(0),
            level: node.get::<i64>("level").unwrap_or(0) as u32,
            created_at: get_ts(node, "created_at"),
            updated_at: get_ts(node, "updated_at"),
        })
    }

    // ========================================================================
    // User operations
    // ========================================================================

    pub async fn get_user(&self, id: Uuid) -> Result<Option<UserNode>> {
        let q = query("MATCH (u:User {id: $id}) RETURN u").param("id", id.to_string());

        let mut result = self.graph.execute(q).await?;
        if let Some(row) = result.next().await? {
            let node: neo4rs::Node = row.get("u")?;
            Ok(Some(self.node_to_user(&node)?))
        } else {
            Ok(None)
        }
    }

    pub async fn create_user(&self, user: &UserNode) -> Result<bool> {
        let q = query(
            r#"
            OPTIONAL MATCH (existing:User {id: $id})
            WITH existing IS NULL AS created
            MERGE (u:User {id: $id})
            ON CREATE SET
                u.email = $email,
                u.name = $name,
                u.avatar_url = $avatar_url,
                u.created_at = $created_at,
                u.updated_at = $updated_at
            RETURN created
            "#,
        )
        .param("id", user.id.to_string())
        .param("email", user.email.clone())
        .param("name", user.name.clone().unwrap_or_default())
        .param("avatar_url", user.avatar_url.clone().unwrap_or_default())
        .param("created_at", ts(user.created_at))
        .param("updated_at", ts(user.updated_at));

        let mut result = self.graph.execute(q).await?;
        if let Some(row) = result.next().await? {
            Ok(row.get("created")?)
        } else {
            Ok(false)
        }
    }

    pub async fn update_user_profile(
        &self,
        id: Uuid,
        name: Option<String>,
        avatar_url: Option<String>,
    ) -> Result<()> {
        let mut set_clauses = vec!["u.updated_at = $updated_at"];
        if name.is_some() {
            set_clauses.push("u.name = $name");
        }
        if avatar_url.is_some() {
            set_clauses.push("u.avatar_url = $avatar_url");
        }

        let cypher = format!("MATCH (u:User {{id: $id}}) SET {}", set_clauses.join(", "));
        let mut q = query(&cypher)
            .param("id", id.to_string())
            .param("updated_at", ts(Utc::now()));
        if let Some(name) = name {
            q = q.param("name", name);
        }
        if let Some(avatar_url) = avatar_url {
            q = q.param("avatar_url", avatar_url);
        }

        self.graph.run(q).await?;
        Ok(())
    }

    fn node_to_user(&self, node: &neo4rs::Node) -> Result<UserNode> {
        Ok(UserNode {
            id: node.get::<String>("id")?.parse()?,
            email: node.get("email").unwrap_or_default(),
            name: get_opt_string(node, "name"),
            avatar_url: get_opt_string(node, "avatar_url"),
            created_at: get_ts(node, "created_at"),
            updated_at: get_ts(node, "updated_at"),
        })
    }

    // ========================================================================
    // OAuth connection operations
    // ========================================================================

    pub async fn upsert_connection(&self, conn: &ConnectionNode) -> Result<ConnectionNode> {
        let q = query(
            r#"
            MERGE (c:Connection {
                user_id: $user_id,
                provider: $provider,
                provider_user_id: $provider_user_id
            })
            ON CREATE SET c.id = $id, c.created_at = $now, c.last_synced = ''
            SET c.provider_email = $provider_email,
                c.access_token = $access_token,
                c.refresh_token = $refresh_token,
                c.token_expires_at = $token_expires_at,
                c.scopes = $scopes,
                c.metadata = $metadata,
                c.is_active = true,
                c.updated_at = $now
            WITH c
            OPTIONAL MATCH (u:User {id: $user_id})
            FOREACH (_ IN CASE WHEN u IS NULL THEN [] ELSE [1] END |
                MERGE (u)-[:HAS_CONNECTION]->(c))
            RETURN c
            "#,
        )
        .param("id", conn.id.to_string())
        .param("user_id", conn.user_id.to_string())
        .param("provider", conn.provider.clone())
        .param("provider_user_id", conn.provider_user_id.clone())
        .param(
            "provider_email",
            conn.provider_email.clone().unwrap_or_default(),
        )
        .param("access_token", conn.access_token.clone())
        .param(
            "refresh_token",
            conn.refresh_token.clone().unwrap_or_default(),
        )
        .param("token_expires_at", opt_ts(conn.token_expires_at))
        .param("scopes", conn.scopes.clone())
        .param("metadata", conn.metadata.to_string())
        .param("now", ts(Utc::now()));

        let mut result = self.graph.execute(q).await?;
        let row = result
            .next()
            .await?
            .context("Connection upsert returned no row")?;
        let node: neo4rs::Node = row.get("c")?;
        self.node_to_connection(&node)
    }

    pub async fn get_connection(&self, user_id: Uuid, id: Uuid) -> Result<Option<ConnectionNode>> {
        let q = query("MATCH (c:Connection {id: $id, user_id: $user_id}) RETURN c")
            .param("id", id.to_string())
            .param("user_id", user_id.to_string());

        let mut result = self.graph.execute(q).await?;
        if let Some(row) = result.next().await? {
            let node: neo4rs::Node = row.get("c")?;
            Ok(Some(self.node_to_connection(&node)?))
        } else {
            Ok(None)
        }
    }

    pub async fn list_connections(&self, user_id: Uuid) -> Result<Vec<ConnectionNode>> {
        let q = query(
            r#"
            MATCH (c:Connection {user_id: $user_id})
            RETURN c
            ORDER BY c.created_at
            "#,
        )
        .param("user_id", user_id.to_string());

        self.collect_connections(q).await
    }

    pub async fn deactivate_connection(&self, user_id: Uuid, id: Uuid) -> Result<bool> {
        let q = query(
            r#"
            MATCH (c:Connection {id: $id, user_id: $user_id})
            SET c.is_active = false, c.updated_at = $now
            RETURN count(c) AS updated
            "#,
        )
        .param("id", id.to_string())
        .param("user_id", user_id.to_string())
        .param("now", ts(Utc::now()));

        let mut result = self.graph.execute(q).await?;
        if let Some(row) = result.next().await? {
            Ok(row.get::<i64>("updated")? > 0)
        } else {
            Ok(false)
        }
    }

    pub async fn get_active_connection(
        &self,
        user_id: Uuid,
        provider: &str,
    ) -> Result<Option<ConnectionNode>> {
        let q = query(
            r#"
            MATCH (c:Connection {user_id: $user_id, provider: $provider, is_active: true})
            RETURN c
            ORDER BY c.updated_at DESC
            LIMIT 1
            "#,
        )
        .param("user_id", user_id.to_string())
        .param("provider", provider);

        Ok(self.collect_connections(q).await?.into_iter().next())
    }

    pub async fn list_active_connections(&self, provider: &str) -> Result<Vec<ConnectionNode>> {
        let q = query(
            r#"
            MATCH (c:Connection {provider: $provider, is_active: true})
            RETURN c
            ORDER BY c.created_at
            "#,
        )
        .param("provider", provider);

        self.collect_connections(q).await
    }

    pub async fn find_connection_by_email(
        &self,
        provider: &str,
        email: &str,
    ) -> Result<Option<ConnectionNode>> {
        let q = query(
            r#"
            MATCH (c:Connection {provider: $provider, is_active: true})
            WHERE toLower(c.provider_email) = toLower($email)
            RETURN c
            ORDER BY c.updated_at DESC
            LIMIT 1
            "#,
        )
        .param("provider", provider)
        .param("email", email);

        Ok(self.collect_connections(q).await?.into_iter().next())
    }

    pub async fn update_connection_tokens(
        &self,
        id: Uuid,
        access_token: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<()> {
        let q = query(
            r#"
            MATCH (c:Connection {id: $id})
            SET c.access_token = $access_token,
                c.token_expires_at = $expires_at,
                c.updated_at = $now
            "#,
        )
        .param("id", id.to_string())
        .param("access_token", access_token)
        .param("expires_at", ts(expires_at))
        .param("now", ts(Utc::now()));

        self.graph.run(q).await?;
        Ok(())
    }

    pub async fn mark_connection_synced(&self, id: Uuid, at: DateTime<Utc>) -> Result<()> {
        let q = query("MATCH (c:Connection {id: $id}) SET c.last_synced = $at")
            .param("id", id.to_string())
            .param("at", ts(at));

        self.graph.run(q).await?;
        Ok(())
    }

    async fn collect_connections(&self, q: neo4rs::Query) -> Result<Vec<ConnectionNode>> {
        let mut result = self.graph.execute(q).await?;
        let mut conns = Vec::new();
        while let Some(row) = result.next().await? {
            let node: neo4rs::Node = row.get("c")?;
            conns.push(self.node_to_connection(&node)?);
        }
        Ok(conns)
    }

    fn node_to_connection(&self, node: &neo4rs::Node) -> Result<ConnectionNode> {
        Ok(ConnectionNode {
            id: node.get::<String>("id")?.parse()?,
            user_id: node.get::<String>("user_id")?.parse()?,
            provider: node.get("provider")?,
            provider_user_id: node.get("provider_user_id").unwrap_or_default(),
            provider_email: get_opt_string(node, "provider_email"),
            access_token: node.get("access_token").unwrap_or_default(),
            refresh_token: get_opt_string(node, "refresh_token"),
            token_expires_at: get_opt_ts(node, "token_expires_at"),
            scopes: node.get("scopes").unwrap_or_default(),
            is_active: node.get("is_active").unwrap_or(false),
            metadata: get_json(node, "metadata"),
            last_synced: get_opt_ts(node, "last_synced"),
            created_at: get_ts(node, "created_at"),
            updated_at: get_ts(node, "updated_at"),
        })
    }

    // ========================================================================
    // Push subscription operations
    // ========================================================================

    pub async fn create_subscription(&self, sub: &PushSubscriptionNode) -> Result<()> {
        let q = query(
            r#"
            CREATE (s:PushSubscription {
                id: $id,
                user_id: $user_id,
                connection_id: $connection_id,
                provider: $provider,
                channel_id: $channel_id,
                resource_id: $resource_id,
                history_id: $history_id,
                sync_token: $sync_token,
                expiration: $expiration,
                is_active: $is_active,
                notification_count: $notification_count,
                last_notification_at: $last_notification_at,
                metadata: $metadata,
                created_at: $created_at,
                updated_at: $updated_at
            })
            WITH s
            OPTIONAL MATCH (c:Connection {id: $connection_id})
            FOREACH (_ IN CASE WHEN c IS NULL THEN [] ELSE [1] END |
                CREATE (c)-[:HAS_SUBSCRIPTION]->(s))
            "#,
        )
        .param("id", sub.id.to_string())
        .param("user_id", sub.user_id.to_string())
        .param("connection_id", sub.connection_id.to_string())
        .param("provider", sub.provider.as_str())
        .param("channel_id", sub.channel_id.clone())
        .param("resource_id", sub.resource_id.clone().unwrap_or_default())
        .param("history_id", sub.history_id.clone().unwrap_or_default())
        .param("sync_token", sub.sync_token.clone().unwrap_or_default())
        .param("expiration", ts(sub.expiration))
        .param("is_active", sub.is_active)
        .param("notification_count", sub.notification_count)
        .param("last_notification_at", opt_ts(sub.last_notification_at))
        .param("metadata", sub.metadata.to_string())
        .param("created_at", ts(sub.created_at))
        .param("updated_at", ts(sub.updated_at));

        self.graph.run(q).await?;
        Ok(())
    }

    pub async fn get_active_subscription(
        &self,
        user_id: Uuid,
        provider: WatchProvider,
    ) -> Result<Option<PushSubscriptionNode>> {
        let q = query(
            r#"
            MATCH (s:PushSubscription {user_id: $user_id, provider: $provider, is_active: true})
            RETURN s
            ORDER BY s.created_at DESC
            LIMIT 1
            "#,
        )
        .param("user_id", user_id.to_string())
        .param("provider", provider.as_str());

        Ok(self.collect_subscriptions(q).await?.into_iter().next())
    }

    pub async fn find_subscription_by_channel(
        &self,
        channel_id: &str,
    ) -> Result<Option<PushSubscriptionNode>> {
        let q = query(
            r#"
            MATCH (s:PushSubscription {channel_id: $channel_id, is_active: true})
            RETURN s
            LIMIT 1
            "#,
        )
        .param("channel_id", channel_id);

        Ok(self.collect_subscriptions(q).await?.into_iter().next())
    }

    pub async fn deactivate_subscription(&self, id: Uuid) -> Result<()> {
        let q = query(
            r#"
            MATCH (s:PushSubscription {id: $id})
            SET s.is_active = false, s.updated_at = $now
            "#,
        )
        .param("id", id.to_string())
        .param("now", ts(Utc::now()));

        self.graph.run(q).await?;
        Ok(())
    }

    pub async fn list_subscriptions(&self, user_id: Uuid) -> Result<Vec<PushSubscriptionNode>> {
        let q = query(
            r#"
            MATCH (s:PushSubscription {user_id: $user_id})
            RETURN s
            ORDER BY s.created_at DESC
            "#,
        )
        .param("user_id", user_id.to_string());

        self.collect_subscriptions(q).await
    }

    pub async fn list_expiring_subscriptions(
        &self,
        before: DateTime<Utc>,
    ) -> Result<Vec<PushSubscriptionNode>> {
        let q = query(
            r#"
            MATCH (s:PushSubscription {is_active: true})
            WHERE s.expiration < $before
            RETURN s
            ORDER BY s.expiration
            "#,
        )
        .param("before", ts(before));

        self.collect_subscriptions(q).await
    }

    pub async fn record_notification(
        &self,
        id: Uuid,
        history_id: Option<String>,
        sync_token: Option<String>,
        at: DateTime<Utc>,
    ) -> Result<()> {
        let q = query(
            r#"
            MATCH (s:PushSubscription {id: $id})
            SET s.notification_count = coalesce(s.notification_count, 0) + 1,
                s.last_notification_at = $at,
                s.history_id = CASE WHEN $history_id = '' THEN s.history_id ELSE $history_id END,
                s.sync_token = CASE WHEN $sync_token = '' THEN s.sync_token ELSE $sync_token END,
                s.updated_at = $at
            "#,
        )
        .param("id", id.to_string())
        .param("history_id", history_id.unwrap_or_default())
        .param("sync_token", sync_token.unwrap_or_default())
        .param("at", ts(at));

        self.graph.run(q).await?;
        Ok(())
    }

    async fn collect_subscriptions(&self, q: neo4rs::Query) -> Result<Vec<PushSubscriptionNode>> {
        let mut result = self.graph.execute(q).await?;
        let mut subs = Vec::new();
        while let Some(row) = result.next().await? {
            let node: neo4rs::Node = row.get("s")?;
            subs.push(self.node_to_subscription(&node)?);
        }
        Ok(subs)
    }

    fn node_to_subscription(&self, node: &neo4rs::Node) -> Result<PushSubscriptionNode> {
        let provider: String = node.get("provider")?;
        Ok(PushSubscriptionNode {
            id: node.get::<String>("id")?.parse()?,
            user_id: node.get::<String>("user_id")?.parse()?,
            connection_id: node.get::<String>("connection_id")?.parse()?,
            provider: provider.parse().map_err(anyhow::Error::msg)?,
            channel_id: node.get("channel_id")?,
            resource_id: get_opt_string(node, "resource_id"),
            history_id: get_opt_string(node, "history_id"),
            sync_token: get_opt_string(node, "sync_token"),
            expiration: get_ts(node, "expiration"),
            is_active: node.get("is_active").unwrap_or(false),
            notification_count: node.get("notification_count").unwrap_or(0),
            last_notification_at: get_opt_ts(node, "last_notification_at"),
            metadata: get_json(node, "metadata"),
            created_at: get_ts(node, "created_at"),
            updated_at: get_ts(node, "updated_at"),
        })
    }

    // ========================================================================
    // Calendar event operations
    // ========================================================================

    pub async fn upsert_calendar_event(&self, event: &CalendarEventNode) -> Result<bool> {
        let q = query(
            r#"
            OPTIONAL MATCH (existing:CalendarEvent {user_id: $user_id, external_id: $external_id})
            WITH count(existing) = 0 AS created
            MERGE (e:CalendarEvent {user_id: $user_id, external_id: $external_id})
            ON CREATE SET e.id = $id
            SET e.connection_id = $connection_id,
                e.title = $title,
                e.description = $description,
                e.location = $location,
                e.start_time = $start_time,
                e.end_time = $end_time,
                e.is_all_day = $is_all_day,
                e.status = $status,
                e.synced_at = $synced_at,
                e.raw_item = $raw_item
            RETURN created
            "#,
        )
        .param("id", event.id.to_string())
        .param("user_id", event.user_id.to_string())
        .param("connection_id", event.connection_id.to_string())
        .param("external_id", event.external_id.clone())
        .param("title", event.title.clone())
        .param("description", event.description.clone().unwrap_or_default())
        .param("location", event.location.clone().unwrap_or_default())
        .param("start_time", opt_ts(event.start_time))
        .param("end_time", opt_ts(event.end_time))
        .param("is_all_day", event.is_all_day)
        .param("status", event.status.clone())
        .param("synced_at", ts(event.synced_at))
        .param("raw_item", event.raw_item.to_string());

        let mut result = self.graph.execute(q).await?;
        if let Some(row) = result.next().await? {
            Ok(row.get("created")?)
        } else {
            Ok(false)
        }
    }

    pub async fn delete_calendar_event(&self, user_id: Uuid, external_id: &str) -> Result<bool> {
        let q = query(
            r#"
            MATCH (e:CalendarEvent {user_id: $user_id, external_id: $external_id})
            DETACH DELETE e
            RETURN count(e) AS deleted
            "#,
        )
        .param("user_id", user_id.to_string())
        .param("external_id", external_id);

        let mut result = self.graph.execute(q).await?;
        if let Some(row) = result.next().await? {
            Ok(row.get::<i64>("deleted")? > 0)
        } else {
            Ok(false)
        }
    }

    pub async fn list_calendar_events(
        &self,
        user_id: Uuid,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<CalendarEventNode>> {
        let q = query(
            r#"
            MATCH (e:CalendarEvent {user_id: $user_id})
            WHERE e.start_time <> '' AND e.start_time >= $from AND e.start_time <= $to
            RETURN e
            ORDER BY e.start_time
            "#,
        )
        .param("user_id", user_id.to_string())
        .param("from", ts(from))
        .param("to", ts(to));

        let mut result = self.graph.execute(q).await?;
        let mut events = Vec::new();
        while let Some(row) = result.next().await? {
            let node: neo4rs::Node = row.get("e")?;
            events.push(self.node_to_calendar_event(&node)?);
        }
        Ok(events)
    }

    fn node_to_calendar_event(&self, node: &neo4rs::Node) -> Result<CalendarEventNode> {
        Ok(CalendarEventNode {
            id: node.get::<String>("id")?.parse()?,
            user_id: node.get::<String>("user_id")?.parse()?,
            connection_id: node.get::<String>("connection_id")?.parse()?,
            external_id: node.get("external_id")?,
            title: node.get("title").unwrap_or_default(),
            description: get_opt_string(node, "description"),
            location: get_opt_string(node, "location"),
            start_time: get_opt_ts(node, "start_time"),
            end_time: get_opt_ts(node, "end_time"),
            is_all_day: node.get("is_all_day").unwrap_or(false),
            status: node.get("status").unwrap_or_default(),
            synced_at: get_ts(node, "synced_at"),
            raw_item: get_json(node, "raw_item"),
        })
    }

    // ========================================================================
    // Email operations
    // ========================================================================

    pub async fn upsert_email(&self, email: &EmailNode) -> Result<bool> {
        let q = query(
            r#"
            OPTIONAL MATCH (existing:Email {user_id: $user_id, external_id: $external_id})
            WITH count(existing) = 0 AS created
            MERGE (m:Email {user_id: $user_id, external_id: $external_id})
            ON CREATE SET m.id = $id
            SET m.connection_id = $connection_id,
                m.thread_id = $thread_id,
                m.subject = $subject,
                m.from = $from,
                m.to = $to,
                m.cc = $cc,
                m.body = $body,
                m.snippet = $snippet,
                m.labels = $labels,
                m.is_read = $is_read,
                m.is_starred = $is_starred,
                m.is_important = $is_important,
                m.is_draft = $is_draft,
                m.received_at = $received_at,
                m.attachments = $attachments,
                m.synced_at = $synced_at
            RETURN created
            "#,
        )
        .param("id", email.id.to_string())
        .param("user_id", email.user_id.to_string())
        .param("connection_id", email.connection_id.to_string())
        .param("external_id", email.external_id.clone())
        .param("thread_id", email.thread_id.clone().unwrap_or_default())
        .param("subject", email.subject.clone())
        .param("from", email.from.clone())
        .param("to", email.to.clone())
        .param("cc", email.cc.clone())
        .param("body", email.body.clone())
        .param("snippet", email.snippet.clone())
        .param("labels", email.labels.clone())
        .param("is_read", email.is_read)
        .param("is_starred", email.is_starred)
        .param("is_important", email.is_important)
        .param("is_draft", email.is_draft)
        .param("received_at", opt_ts(email.received_at))
        .param("attachments", serde_json::to_string(&email.attachments)?)
        .param("synced_at", ts(email.synced_at));

        let mut result = self.graph.execute(q).await?;
        if let Some(row) = result.next().await? {
            Ok(row.get("created")?)
        } else {
            Ok(false)
        }
    }

    pub async fn delete_email(&self, user_id: Uuid, external_id: &str) -> Result<bool> {
        let q = query(
            r#"
            MATCH (m:Email {user_id: $user_id, external_id: $external_id})
            DETACH DELETE m
            RETURN count(m) AS deleted
            "#,
        )
        .param("user_id", user_id.to_string())
        .param("external_id", external_id);

        let mut result = self.graph.execute(q).await?;
        if let Some(row) = result.next().await? {
            Ok(row.get::<i64>("deleted")? > 0)
        } else {
            Ok(false)
        }
    }

    pub async fn get_email(&self, user_id: Uuid, external_id: &str) -> Result<Option<EmailNode>> {
        let q = query(
            r#"
            MATCH (m:Email {user_id: $user_id, external_id: $external_id})
            RETURN m
            LIMIT 1
            "#,
        )
        .param("user_id", user_id.to_string())
        .param("external_id", external_id);

        let mut result = self.graph.execute(q).await?;
        match result.next().await? {
            Some(row) => {
                let node: neo4rs::Node = row.get("m")?;
                Ok(Some(self.node_to_email(&node)?))
            }
            None => Ok(None),
        }
    }

    pub async fn update_email_labels(
        &self,
        user_id: Uuid,
        external_id: &str,
        labels: Vec<String>,
    ) -> Result<bool> {
        let has = |label: &str| labels.iter().any(|l| l == label);
        let q = query(
            r#"
            MATCH (m:Email {user_id: $user_id, external_id: $external_id})
            SET m.labels = $labels,
                m.is_read = $is_read,
                m.is_starred = $is_starred,
                m.is_important = $is_important,
                m.is_draft = $is_draft
            RETURN count(m) AS updated
            "#,
        )
        .param("user_id", user_id.to_string())
        .param("external_id", external_id)
        .param("is_read", !has("UNREAD"))
        .param("is_starred", has("STARRED"))
        .param("is_important", has("IMPORTANT"))
        .param("is_draft", has("DRAFT"))
        .param("labels", labels.clone());

        let mut result = self.graph.execute(q).await?;
        if let Some(row) = result.next().await? {
            Ok(row.get::<i64>("updated")? > 0)
        } else {
            Ok(false)
        }
    }

    pub async fn list_emails(
        &self,
        user_id: Uuid,
        unread_only: bool,
        limit: usize,
        offset: usize,
    ) -> Result<(Vec<EmailNode>, usize)> {
        let count_q = query(
            r#"
            MATCH (m:Email {user_id: $user_id})
            WHERE (NOT $unread_only OR m.is_read = false)
            RETURN count(m) AS total
            "#,
        )
        .param("user_id", user_id.to_string())
        .param("unread_only", unread_only);

        let mut result = self.graph.execute(count_q).await?;
        let total = match result.next().await? {
            Some(row) => row.get::<i64>("total")?.max(0) as usize,
            None => 0,
        };

        let q = query(
            r#"
            MATCH (m:Email {user_id: $user_id})
            WHERE (NOT $unread_only OR m.is_read = false)
            RETURN m
            ORDER BY m.received_at DESC
            SKIP $offset
            LIMIT $limit
            "#,
        )
        .param("user_id", user_id.to_string())
        .param("unread_only", unread_only)
        .param("offset", offset as i64)
        .param("limit", limit as i64);

        let mut result = self.graph.execute(q).await?;
        let mut emails = Vec::new();
        while let Some(row) = result.next().await? {
            let node: neo4rs::Node = row.get("m")?;
            emails.push(self.node_to_email(&node)?);
        }
        Ok((emails, total))
    }

    fn node_to_email(&self, node: &neo4rs::Node) -> Result<EmailNode> {
        Ok(EmailNode {
            id: node.get::<String>("id")?.parse()?,
            user_id: node.get::<String>("user_id")?.parse()?,
            connection_id: node.get::<String>("connection_id")?.parse()?,
            external_id: node.get("external_id")?,
            thread_id: get_opt_string(node, "thread_id"),
            subject: node.get("subject").unwrap_or_default(),
            from: node.get("from").unwrap_or_default(),
            to: node.get("to").unwrap_or_default(),
            cc: node.get("cc").unwrap_or_default(),
            body: node.get("body").unwrap_or_default(),
            snippet: node.get("snippet").unwrap_or_default(),
            labels: node.get("labels").unwrap_or_default(),
            is_read: node.get("is_read").unwrap_or(true),
            is_starred: node.get("is_starred").unwrap_or(false),
            is_important: node.get("is_important").unwrap_or(false),
            is_draft: node.get("is_draft").unwrap_or(false),
            received_at: get_opt_ts(node, "received_at"),
            attachments: get_opt_string(node, "attachments")
                .and_then(|s| serde_json::from_str(&s).ok())
                .unwrap_or_default(),
            synced_at: get_ts(node, "synced_at"),
        })
    }

    // ========================================================================
    // Health
    // ========================================================================

    /// Round-trip a trivial query
    pub async fn health_check(&self) -> Result<bool> {
        let mut result = self.graph.execute(query("RETURN 1 AS ok")).await?;
        Ok(result.next().await?.is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timestamps_sort_lexicographically() {
        let early = "2024-01-01T00:00:00Z".parse::<DateTime<Utc>>().unwrap();
        let late = early + chrono::Duration::milliseconds(1500);
        assert!(ts(early) < ts(late));
        assert_eq!(ts(early).len(), ts(late).len());
    }

    #[test]
    fn test_opt_ts_empty_when_absent() {
        assert_eq!(opt_ts(None), "");
    }
}
