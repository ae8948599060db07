//! SQLite storage backend
//!
//! A [`QueryDescription`] is compiled into a single statement. Every
//! segment gets the alias `t<i>`; links joined to reach segment `i` get
//! `l<i>`. Filters and type prefixes become bound parameters.

use super::traits::{
    edge_key, CreationStatistics, GraphStore, OpenStore, Projected, QueryRow, StorageError,
    StorageResult,
};
use crate::graph::{CommentView, Link, LinkView, Node, NodeId, User};
use crate::query::{escape_like, Category, Filter, Projection, QueryDescription, Relation, SortOrder};
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::Value as SqlValue;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::path::Path;
use std::sync::Mutex;
use tracing::debug;

/// Columns a node segment contributes to a row, in select order
const NODE_COLUMNS: [&str; 12] = [
    "id",
    "uuid",
    "node_type",
    "process_type",
    "label",
    "description",
    "ctime",
    "mtime",
    "user_id",
    "attributes",
    "extras",
    "repository",
];

const USER_COLUMNS: [&str; 5] = ["id", "email", "first_name", "last_name", "institution"];

/// Node columns usable in filters, orders and field projections
const NODE_FIELDS: [&str; 9] = [
    "id",
    "uuid",
    "node_type",
    "process_type",
    "label",
    "description",
    "ctime",
    "mtime",
    "user_id",
];

type NodeColumns = (
    i64,
    String,
    String,
    Option<String>,
    String,
    String,
    String,
    String,
    Option<i64>,
    String,
    String,
    String,
);

type UserColumns = (i64, String, String, String, String);

/// What the columns at one position of a result row mean
#[derive(Debug)]
enum Slot {
    Node { tag: String, projection: Projection },
    User { tag: String, projection: Projection },
    Edge { key: String },
}

impl Slot {
    fn width(&self) -> usize {
        match self {
            Self::Node { .. } => NODE_COLUMNS.len(),
            Self::User { .. } => USER_COLUMNS.len(),
            Self::Edge { .. } => 2,
        }
    }
}

struct Compiled {
    sql: String,
    params: Vec<SqlValue>,
    slots: Vec<Slot>,
}

/// SQLite-backed graph store
///
/// Thread-safe via internal mutex on the connection.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Initialize the database schema
    fn init_schema(conn: &Connection) -> StorageResult<()> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS db_user (
                id INTEGER PRIMARY KEY,
                email TEXT NOT NULL UNIQUE,
                first_name TEXT NOT NULL DEFAULT '',
                last_name TEXT NOT NULL DEFAULT '',
                institution TEXT NOT NULL DEFAULT ''
            );

            CREATE TABLE IF NOT EXISTS db_node (
                id INTEGER PRIMARY KEY,
                uuid TEXT NOT NULL UNIQUE,
                node_type TEXT NOT NULL,
                process_type TEXT,
                label TEXT NOT NULL DEFAULT '',
                description TEXT NOT NULL DEFAULT '',
                ctime TEXT NOT NULL,
                mtime TEXT NOT NULL,
                user_id INTEGER,
                attributes TEXT NOT NULL DEFAULT '{}',
                extras TEXT NOT NULL DEFAULT '{}',
                repository TEXT NOT NULL DEFAULT '{}'
            );

            CREATE INDEX IF NOT EXISTS idx_node_types
                ON db_node(node_type, process_type);
            CREATE INDEX IF NOT EXISTS idx_node_user
                ON db_node(user_id);

            CREATE TABLE IF NOT EXISTS db_link (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                input_id INTEGER NOT NULL,
                output_id INTEGER NOT NULL,
                label TEXT NOT NULL,
                type TEXT NOT NULL,
                UNIQUE (input_id, output_id, label),
                FOREIGN KEY (input_id) REFERENCES db_node(id) ON DELETE CASCADE,
                FOREIGN KEY (output_id) REFERENCES db_node(id) ON DELETE CASCADE
            );

            CREATE INDEX IF NOT EXISTS idx_link_input ON db_link(input_id);
            CREATE INDEX IF NOT EXISTS idx_link_output ON db_link(output_id);

            CREATE TABLE IF NOT EXISTS db_comment (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                node_id INTEGER NOT NULL,
                user_id INTEGER NOT NULL,
                ctime TEXT NOT NULL,
                mtime TEXT NOT NULL,
                content TEXT NOT NULL,
                FOREIGN KEY (node_id) REFERENCES db_node(id) ON DELETE CASCADE
            );

            CREATE INDEX IF NOT EXISTS idx_comment_node ON db_comment(node_id);

            PRAGMA foreign_keys = ON;
            PRAGMA case_sensitive_like = ON;
            PRAGMA journal_mode = WAL;
            "#,
        )?;
        Ok(())
    }

    /// Serialize a node to database columns
    fn node_to_row(node: &Node) -> StorageResult<NodeColumns> {
        Ok((
            node.id.get(),
            node.uuid.to_string(),
            node.node_type.clone(),
            node.process_type.clone(),
            node.label.clone(),
            node.description.clone(),
            format_time(&node.ctime),
            format_time(&node.mtime),
            node.user_id,
            serde_json::to_string(&node.attributes)?,
            serde_json::to_string(&node.extras)?,
            serde_json::to_string(&node.repository)?,
        ))
    }

    /// Deserialize a node from database columns
    fn row_to_node(columns: NodeColumns) -> StorageResult<Node> {
        let (id, uuid, node_type, process_type, label, description, ctime, mtime, user_id, attributes, extras, repository) =
            columns;
        Ok(Node {
            id: NodeId::new(id),
            uuid: uuid
                .parse()
                .map_err(|e: uuid::Error| StorageError::InvalidQuery(format!("stored uuid `{}`: {}", uuid, e)))?,
            node_type,
            process_type,
            label,
            description,
            ctime: parse_time(&ctime)?,
            mtime: parse_time(&mtime)?,
            user_id,
            attributes: serde_json::from_str(&attributes)?,
            extras: serde_json::from_str(&extras)?,
            repository: serde_json::from_str(&repository)?,
        })
    }

    fn read_node_columns(row: &Row, at: usize) -> rusqlite::Result<Option<NodeColumns>> {
        let Some(id) = row.get::<_, Option<i64>>(at)? else {
            return Ok(None);
        };
        Ok(Some((
            id,
            row.get(at + 1)?,
            row.get(at + 2)?,
            row.get(at + 3)?,
            row.get(at + 4)?,
            row.get(at + 5)?,
            row.get(at + 6)?,
            row.get(at + 7)?,
            row.get(at + 8)?,
            row.get(at + 9)?,
            row.get(at + 10)?,
            row.get(at + 11)?,
        )))
    }

    fn read_user_columns(row: &Row, at: usize) -> rusqlite::Result<Option<UserColumns>> {
        let Some(id) = row.get::<_, Option<i64>>(at)? else {
            return Ok(None);
        };
        Ok(Some((
            id,
            row.get(at + 1)?,
            row.get(at + 2)?,
            row.get(at + 3)?,
            row.get(at + 4)?,
        )))
    }

    fn row_to_user(columns: UserColumns) -> User {
        let (id, email, first_name, last_name, institution) = columns;
        User {
            id,
            email,
            first_name,
            last_name,
            institution,
        }
    }

    /// Translate a description into SQL
    ///
    /// With `count_only`, the statement yields a single `COUNT(*)` column
    /// and ignores projections, order and bounds.
    fn compile(query: &QueryDescription, count_only: bool) -> StorageResult<Compiled> {
        let segments = query.segments();
        if segments.is_empty() {
            return Err(StorageError::InvalidQuery("query has no segments".into()));
        }
        let index_of = |tag: &str| -> StorageResult<usize> {
            segments
                .iter()
                .position(|s| s.tag == tag)
                .ok_or_else(|| StorageError::InvalidQuery(format!("unknown tag `{}`", tag)))
        };

        let mut select = Vec::new();
        let mut slots = Vec::new();
        let mut joins = Vec::new();
        let mut clauses = Vec::new();
        let mut params = Vec::new();

        for (i, segment) in segments.iter().enumerate() {
            let alias = format!("t{}", i);
            let table = match segment.category {
                Category::Node => "db_node",
                Category::User => "db_user",
            };

            match &segment.relation {
                None => joins.push(format!("FROM {} {}", table, alias)),
                Some(relation) => {
                    let j = index_of(relation.tag())?;
                    let link = format!("l{}", i);
                    match relation {
                        Relation::WithIncoming(_) => joins.push(format!(
                            "JOIN db_link {link} ON {link}.input_id = t{j}.id \
                             JOIN db_node {alias} ON {alias}.id = {link}.output_id"
                        )),
                        Relation::WithOutgoing(_) => joins.push(format!(
                            "JOIN db_link {link} ON {link}.output_id = t{j}.id \
                             JOIN db_node {alias} ON {alias}.id = {link}.input_id"
                        )),
                        Relation::WithNode(_) => joins.push(format!(
                            "LEFT JOIN db_user {alias} ON {alias}.id = t{j}.user_id"
                        )),
                    }
                }
            }

            if segment.category == Category::Node && !segment.type_prefixes.is_empty() {
                let alternatives: Vec<String> = segment
                    .type_prefixes
                    .iter()
                    .map(|prefix| {
                        params.push(SqlValue::Text(format!("{}%", escape_like(prefix))));
                        format!("{}.node_type LIKE ? ESCAPE '\\'", alias)
                    })
                    .collect();
                clauses.push(format!("({})", alternatives.join(" OR ")));
            }

            for (field, filter) in segment.filters.iter() {
                let expr = field_expr(&alias, segment.category, field, &mut params)?;
                clauses.push(filter_sql(&expr, filter, &mut params));
            }

            if !segment.edge_filters.is_empty() {
                if !matches!(
                    segment.relation,
                    Some(Relation::WithIncoming(_)) | Some(Relation::WithOutgoing(_))
                ) {
                    return Err(StorageError::InvalidQuery(format!(
                        "segment `{}` has no link to filter",
                        segment.tag
                    )));
                }
                for (field, filter) in segment.edge_filters.iter() {
                    let expr = match field {
                        "label" | "type" => format!("l{}.{}", i, field),
                        other => return Err(StorageError::UnknownField(other.to_string())),
                    };
                    clauses.push(filter_sql(&expr, filter, &mut params));
                }
            }

            if let Projection::Fields(fields) = &segment.projection {
                for field in fields {
                    check_projected_field(segment.category, field)?;
                }
            }

            if segment.projection != Projection::None {
                let columns: &[&str] = match segment.category {
                    Category::Node => &NODE_COLUMNS,
                    Category::User => &USER_COLUMNS,
                };
                select.extend(columns.iter().map(|c| format!("{}.{}", alias, c)));
                slots.push(match segment.category {
                    Category::Node => Slot::Node {
                        tag: segment.tag.clone(),
                        projection: segment.projection.clone(),
                    },
                    Category::User => Slot::User {
                        tag: segment.tag.clone(),
                        projection: segment.projection.clone(),
                    },
                });
            }

            if segment.edge_projection {
                match &segment.relation {
                    Some(Relation::WithIncoming(from)) | Some(Relation::WithOutgoing(from)) => {
                        select.push(format!("l{}.label", i));
                        select.push(format!("l{}.type", i));
                        slots.push(Slot::Edge {
                            key: edge_key(from, &segment.tag),
                        });
                    }
                    _ => {
                        return Err(StorageError::InvalidQuery(format!(
                            "segment `{}` has no link to project",
                            segment.tag
                        )))
                    }
                }
            }
        }

        let mut sql = if count_only {
            "SELECT COUNT(*)".to_string()
        } else if select.is_empty() {
            "SELECT 1".to_string()
        } else {
            format!("SELECT {}", select.join(", "))
        };
        sql.push(' ');
        sql.push_str(&joins.join(" "));
        if !clauses.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&clauses.join(" AND "));
        }

        if !count_only {
            let primary = query
                .primary()
                .ok_or_else(|| StorageError::InvalidQuery("query has no primary tag".into()))?;
            let p = index_of(primary)?;

            let mut orders = Vec::new();
            for spec in &query.order {
                let i = index_of(&spec.tag)?;
                let expr = field_expr(&format!("t{}", i), segments[i].category, &spec.field, &mut params)?;
                let direction = match spec.order {
                    SortOrder::Asc => "ASC",
                    SortOrder::Desc => "DESC",
                };
                orders.push(format!("{} {}", expr, direction));
            }
            // Primary key tie-break keeps pagination stable
            orders.push(format!("t{}.id ASC", p));
            sql.push_str(" ORDER BY ");
            sql.push_str(&orders.join(", "));

            if !query.distinct {
                match (query.limit, query.offset) {
                    (Some(limit), Some(offset)) => sql.push_str(&format!(" LIMIT {} OFFSET {}", limit, offset)),
                    (Some(limit), None) => sql.push_str(&format!(" LIMIT {}", limit)),
                    (None, Some(offset)) => sql.push_str(&format!(" LIMIT -1 OFFSET {}", offset)),
                    (None, None) => {}
                }
            }
        }

        Ok(Compiled { sql, params, slots })
    }

    fn run(&self, compiled: &Compiled) -> StorageResult<Vec<QueryRow>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&compiled.sql)?;
        let mut rows = stmt.query(params_from_iter(compiled.params.iter()))?;

        let mut result = Vec::new();
        while let Some(row) = rows.next()? {
            let mut out = QueryRow::default();
            let mut at = 0;
            for slot in &compiled.slots {
                match slot {
                    Slot::Node { tag, projection } => {
                        if let Some(columns) = Self::read_node_columns(row, at)? {
                            let node = Self::row_to_node(columns)?;
                            out.values.insert(tag.clone(), project_node(node, projection));
                        }
                    }
                    Slot::User { tag, projection } => {
                        if let Some(columns) = Self::read_user_columns(row, at)? {
                            let user = Self::row_to_user(columns);
                            out.values.insert(tag.clone(), project_user(user, projection));
                        }
                    }
                    Slot::Edge { key } => {
                        let label: String = row.get(at)?;
                        let link_type: String = row.get(at + 1)?;
                        out.edges.insert(key.clone(), LinkView { label, link_type });
                    }
                }
                at += slot.width();
            }
            result.push(out);
        }
        Ok(result)
    }

    /// All rows of a distinct description, deduplicated in order
    fn fetch_distinct(&self, query: &QueryDescription) -> StorageResult<Vec<QueryRow>> {
        let compiled = Self::compile(query, false)?;
        let mut seen = HashSet::new();
        let mut rows = Vec::new();
        for row in self.run(&compiled)? {
            if seen.insert(serde_json::to_string(&row)?) {
                rows.push(row);
            }
        }
        Ok(rows)
    }
}

impl OpenStore for SqliteStore {
    fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        Self::init_schema(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn open_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init_schema(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

impl GraphStore for SqliteStore {
    // === Query Operations ===

    fn count(&self, query: &QueryDescription) -> StorageResult<usize> {
        if query.distinct {
            return Ok(self.fetch_distinct(&query.unbounded())?.len());
        }
        let compiled = Self::compile(query, true)?;
        debug!(sql = %compiled.sql, "counting");
        let conn = self.conn.lock().unwrap();
        let count: i64 = conn.query_row(
            &compiled.sql,
            params_from_iter(compiled.params.iter()),
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    fn fetch(&self, query: &QueryDescription) -> StorageResult<Vec<QueryRow>> {
        if query.distinct {
            let rows = self.fetch_distinct(query)?;
            let offset = query.offset.unwrap_or(0);
            let limit = query.limit.unwrap_or(usize::MAX);
            return Ok(rows.into_iter().skip(offset).take(limit).collect());
        }
        let compiled = Self::compile(query, false)?;
        debug!(sql = %compiled.sql, params = compiled.params.len(), "fetching");
        self.run(&compiled)
    }

    fn comments(&self, node_id: NodeId) -> StorageResult<Vec<CommentView>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT c.ctime, c.mtime, COALESCE(u.first_name, ''), COALESCE(u.last_name, ''), c.content
             FROM db_comment c LEFT JOIN db_user u ON u.id = c.user_id
             WHERE c.node_id = ?1
             ORDER BY c.ctime ASC, c.id ASC",
        )?;
        let rows = stmt.query_map(params![node_id.get()], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
            ))
        })?;

        let mut comments = Vec::new();
        for row in rows {
            let (ctime, mtime, first_name, last_name, content) = row?;
            comments.push(CommentView {
                created_time: parse_time(&ctime)?,
                modified_time: parse_time(&mtime)?,
                user_display_name: format!("{} {}", first_name, last_name),
                message: content,
            });
        }
        Ok(comments)
    }

    fn creation_statistics(&self, user_id: Option<i64>) -> StorageResult<CreationStatistics> {
        let conn = self.conn.lock().unwrap();
        let (filter, params): (&str, Vec<SqlValue>) = match user_id {
            Some(id) => ("WHERE user_id = ?1", vec![SqlValue::Integer(id)]),
            None => ("", Vec::new()),
        };

        let mut stats = CreationStatistics::default();

        let total: i64 = conn.query_row(
            &format!("SELECT COUNT(*) FROM db_node {}", filter),
            params_from_iter(params.iter()),
            |row| row.get(0),
        )?;
        stats.total = total as u64;

        let mut stmt = conn.prepare(&format!(
            "SELECT node_type, COUNT(*) FROM db_node {} GROUP BY node_type",
            filter
        ))?;
        let rows = stmt.query_map(params_from_iter(params.iter()), |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })?;
        for row in rows {
            let (node_type, n) = row?;
            stats.types.insert(node_type, n as u64);
        }

        let mut stmt = conn.prepare(&format!(
            "SELECT substr(ctime, 1, 10), COUNT(*) FROM db_node {} GROUP BY 1",
            filter
        ))?;
        let rows = stmt.query_map(params_from_iter(params.iter()), |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })?;
        for row in rows {
            let (day, n) = row?;
            stats.ctime_by_day.insert(day, n as u64);
        }

        Ok(stats)
    }

    // === Write Operations ===

    fn save_user(&self, user: &User) -> StorageResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            r#"
            INSERT INTO db_user (id, email, first_name, last_name, institution)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT(id) DO UPDATE SET
                email = excluded.email,
                first_name = excluded.first_name,
                last_name = excluded.last_name,
                institution = excluded.institution
            "#,
            params![user.id, user.email, user.first_name, user.last_name, user.institution],
        )?;
        Ok(())
    }

    fn save_node(&self, node: &Node) -> StorageResult<()> {
        let (id, uuid, node_type, process_type, label, description, ctime, mtime, user_id, attributes, extras, repository) =
            Self::node_to_row(node)?;
        let conn = self.conn.lock().unwrap();
        conn.execute(
            r#"
            INSERT INTO db_node (id, uuid, node_type, process_type, label, description, ctime, mtime,
                                 user_id, attributes, extras, repository)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
            ON CONFLICT(id) DO UPDATE SET
                label = excluded.label,
                description = excluded.description,
                mtime = excluded.mtime,
                user_id = excluded.user_id,
                attributes = excluded.attributes,
                extras = excluded.extras,
                repository = excluded.repository
            "#,
            params![
                id,
                uuid,
                node_type,
                process_type,
                label,
                description,
                ctime,
                mtime,
                user_id,
                attributes,
                extras,
                repository
            ],
        )?;
        Ok(())
    }

    fn save_link(&self, link: &Link) -> StorageResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            r#"
            INSERT INTO db_link (input_id, output_id, label, type)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(input_id, output_id, label) DO UPDATE SET
                type = excluded.type
            "#,
            params![
                link.source.get(),
                link.target.get(),
                link.label,
                link.link_type.as_str()
            ],
        )?;
        Ok(())
    }

    fn save_comment(&self, node_id: NodeId, user_id: i64, content: &str) -> StorageResult<i64> {
        let now = format_time(&Utc::now());
        let conn = self.conn.lock().unwrap();
        let exists = conn
            .query_row(
                "SELECT 1 FROM db_node WHERE id = ?1",
                params![node_id.get()],
                |row| row.get::<_, i64>(0),
            )
            .optional()?;
        if exists.is_none() {
            return Err(StorageError::InvalidQuery(format!("no node with id {}", node_id)));
        }
        conn.execute(
            "INSERT INTO db_comment (node_id, user_id, ctime, mtime, content) VALUES (?1, ?2, ?3, ?3, ?4)",
            params![node_id.get(), user_id, now, content],
        )?;
        Ok(conn.last_insert_rowid())
    }
}

/// Timestamps are stored as fixed-width RFC 3339 so text order is time order
fn format_time(time: &DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_time(text: &str) -> StorageResult<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(text)
        .map_err(|e| StorageError::DateParse(e.to_string()))?
        .with_timezone(&Utc))
}

/// `$."key"` path addressing one top-level key of a JSON column
fn json_path(key: &str) -> String {
    format!("$.\"{}\"", key.replace('"', "\\\""))
}

/// Split `attributes.<key>` / `extras.<key>` into column and key
fn payload_field(field: &str) -> Option<(&'static str, &str)> {
    ["attributes", "extras"].into_iter().find_map(|column| {
        field
            .strip_prefix(column)
            .and_then(|rest| rest.strip_prefix('.'))
            .filter(|key| !key.is_empty())
            .map(|key| (column, key))
    })
}

/// SQL expression selecting `field` on the segment aliased `alias`
fn field_expr(alias: &str, category: Category, field: &str, params: &mut Vec<SqlValue>) -> StorageResult<String> {
    match category {
        Category::Node => {
            if NODE_FIELDS.contains(&field) {
                return Ok(format!("{}.{}", alias, field));
            }
            if let Some((column, key)) = payload_field(field) {
                params.push(SqlValue::Text(json_path(key)));
                return Ok(format!("json_extract({}.{}, ?)", alias, column));
            }
        }
        Category::User => {
            if USER_COLUMNS.contains(&field) {
                return Ok(format!("{}.{}", alias, field));
            }
        }
    }
    Err(StorageError::UnknownField(field.to_string()))
}

fn check_projected_field(category: Category, field: &str) -> StorageResult<()> {
    let known = match category {
        Category::Node => {
            NODE_FIELDS.contains(&field)
                || field == "attributes"
                || field == "extras"
                || payload_field(field).is_some()
        }
        Category::User => USER_COLUMNS.contains(&field),
    };
    if known {
        Ok(())
    } else {
        Err(StorageError::UnknownField(field.to_string()))
    }
}

fn filter_sql(expr: &str, filter: &Filter, params: &mut Vec<SqlValue>) -> String {
    let mut bind = |value: &Value| {
        params.push(to_sql_value(value));
        "?"
    };
    match filter {
        Filter::Eq(value) => format!("{} IS {}", expr, bind(value)),
        Filter::Ne(value) => format!("{} IS NOT {}", expr, bind(value)),
        Filter::In(values) if values.is_empty() => "0".to_string(),
        Filter::NotIn(values) if values.is_empty() => "1".to_string(),
        Filter::In(values) => {
            let marks: Vec<&str> = values.iter().map(&mut bind).collect();
            format!("{} IN ({})", expr, marks.join(", "))
        }
        Filter::NotIn(values) => {
            let marks: Vec<&str> = values.iter().map(&mut bind).collect();
            format!("{} NOT IN ({})", expr, marks.join(", "))
        }
        Filter::Like(pattern) => {
            format!("{} LIKE {} ESCAPE '\\'", expr, bind(&Value::String(pattern.clone())))
        }
        Filter::Lt(value) => format!("{} < {}", expr, bind(value)),
        Filter::Le(value) => format!("{} <= {}", expr, bind(value)),
        Filter::Gt(value) => format!("{} > {}", expr, bind(value)),
        Filter::Ge(value) => format!("{} >= {}", expr, bind(value)),
    }
}

fn to_sql_value(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Bool(b) => SqlValue::Integer(i64::from(*b)),
        Value::Number(n) => match n.as_i64() {
            Some(i) => SqlValue::Integer(i),
            None => SqlValue::Real(n.as_f64().unwrap_or_default()),
        },
        Value::String(s) => SqlValue::Text(s.clone()),
        other => SqlValue::Text(other.to_string()),
    }
}

/// Value of one projectable node field
pub(crate) fn node_field(node: &Node, field: &str) -> Value {
    match field {
        "id" => Value::from(node.id.get()),
        "uuid" => Value::String(node.uuid.to_string()),
        "node_type" => Value::String(node.node_type.clone()),
        "process_type" => node.process_type.clone().map(Value::String).unwrap_or(Value::Null),
        "label" => Value::String(node.label.clone()),
        "description" => Value::String(node.description.clone()),
        "ctime" => Value::String(format_time(&node.ctime)),
        "mtime" => Value::String(format_time(&node.mtime)),
        "user_id" => node.user_id.map(Value::from).unwrap_or(Value::Null),
        "attributes" => Value::Object(node.attributes.clone()),
        "extras" => Value::Object(node.extras.clone()),
        other => match payload_field(other) {
            Some(("attributes", key)) => node.attributes.get(key).cloned().unwrap_or(Value::Null),
            Some((_, key)) => node.extras.get(key).cloned().unwrap_or(Value::Null),
            None => Value::Null,
        },
    }
}

fn project_node(node: Node, projection: &Projection) -> Projected {
    match projection {
        Projection::Fields(fields) => Projected::Fields(
            fields
                .iter()
                .map(|f| (f.clone(), node_field(&node, f)))
                .collect::<Map<String, Value>>(),
        ),
        _ => Projected::Node(Box::new(node)),
    }
}

fn project_user(user: User, projection: &Projection) -> Projected {
    match projection {
        Projection::Fields(fields) => Projected::Fields(
            fields
                .iter()
                .map(|f| {
                    let value = match f.as_str() {
                        "id" => Value::from(user.id),
                        "email" => Value::String(user.email.clone()),
                        "first_name" => Value::String(user.first_name.clone()),
                        "last_name" => Value::String(user.last_name.clone()),
                        "institution" => Value::String(user.institution.clone()),
                        _ => Value::Null,
                    };
                    (f.clone(), value)
                })
                .collect::<Map<String, Value>>(),
        ),
        _ => Projected::User(user),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{LinkType, Repository};
    use crate::query::{FilterSet, OrderSpec, Segment};
    use serde_json::json;

    fn create_test_store() -> SqliteStore {
        SqliteStore::open_in_memory().unwrap()
    }

    fn create_test_node(id: i64, node_type: &str) -> Node {
        Node::new(id, node_type).with_user(1)
    }

    /// 1: Int, 2: CalcJob (consumes 1), 3: Dict and 4: Int created by 2
    fn populated_store() -> SqliteStore {
        let store = create_test_store();
        store
            .save_user(&User::new(1, "ada@example.com").with_name("Ada", "Lovelace"))
            .unwrap();
        store
            .save_node(&create_test_node(1, "data.int.Int.").with_attribute("value", json!(5)))
            .unwrap();
        store
            .save_node(
                &create_test_node(2, "process.calculation.calcjob.CalcJobNode.")
                    .with_process_type("aiida.calculations:arithmetic.add")
                    .with_label("add"),
            )
            .unwrap();
        store
            .save_node(&create_test_node(3, "data.dict.Dict.").with_attribute("ecut", json!(30)))
            .unwrap();
        store
            .save_node(&create_test_node(4, "data.int.Int.").with_attribute("value", json!(9)))
            .unwrap();
        store.save_link(&Link::new(1, 2, "x", LinkType::InputCalc)).unwrap();
        store.save_link(&Link::new(2, 3, "output_parameters", LinkType::Create)).unwrap();
        store.save_link(&Link::new(2, 4, "sum", LinkType::Create)).unwrap();
        store
    }

    fn all_nodes() -> QueryDescription {
        QueryDescription::new()
            .with_segment(Segment::nodes("node").with_projection(Projection::All))
            .unwrap()
    }

    fn ids(rows: &[QueryRow], tag: &str) -> Vec<i64> {
        rows.iter().map(|r| r.node(tag).unwrap().id.get()).collect()
    }

    #[test]
    fn test_save_and_fetch_node() {
        let store = create_test_store();
        let repo = Repository::new().with_object("aiida.in", "input").unwrap();
        let node = create_test_node(10, "data.dict.Dict.")
            .with_label("params")
            .with_attribute("ecut", json!(30))
            .with_repository(repo);
        store.save_node(&node).unwrap();

        let rows = store.fetch(&all_nodes()).unwrap();
        assert_eq!(rows.len(), 1);
        let loaded = rows[0].node("node").unwrap();
        assert_eq!(loaded, &node);
    }

    #[test]
    fn test_type_prefix_filter() {
        let store = populated_store();
        let query = QueryDescription::new()
            .with_segment(
                Segment::nodes("node")
                    .with_type_prefixes(["data."])
                    .with_projection(Projection::All),
            )
            .unwrap();
        assert_eq!(store.count(&query).unwrap(), 3);
        assert_eq!(ids(&store.fetch(&query).unwrap(), "node"), vec![1, 3, 4]);
    }

    #[test]
    fn test_attribute_filter_and_order() {
        let store = populated_store();
        let query = QueryDescription::new()
            .with_segment(
                Segment::nodes("node")
                    .with_filters(FilterSet::new().with("attributes.value", Filter::Ge(json!(5))))
                    .with_projection(Projection::All),
            )
            .unwrap()
            .order_by(OrderSpec::desc("node", "attributes.value"));
        assert_eq!(ids(&store.fetch(&query).unwrap(), "node"), vec![4, 1]);
    }

    #[test]
    fn test_unknown_field_rejected() {
        let store = populated_store();
        let query = QueryDescription::new()
            .with_segment(
                Segment::nodes("node").with_filters(FilterSet::new().with("colour", Filter::Eq(json!("red")))),
            )
            .unwrap();
        assert!(matches!(store.count(&query), Err(StorageError::UnknownField(f)) if f == "colour"));
    }

    #[test]
    fn test_outgoing_traversal_with_edge_projection() {
        let store = populated_store();
        let query = QueryDescription::new()
            .with_segment(
                Segment::nodes("main").with_filters(FilterSet::new().with("id", Filter::Eq(json!(2)))),
            )
            .unwrap()
            .with_segment(
                Segment::nodes("out")
                    .with_projection(Projection::All)
                    .with_edge_projection()
                    .with_relation(Relation::WithIncoming("main".into())),
            )
            .unwrap();

        let rows = store.fetch(&query).unwrap();
        assert_eq!(ids(&rows, "out"), vec![3, 4]);
        let link = rows[1].edge("main", "out").unwrap();
        assert_eq!(link.label, "sum");
        assert_eq!(link.link_type, "create");
    }

    #[test]
    fn test_edge_filter_on_link_label() {
        let store = populated_store();
        let query = QueryDescription::new()
            .with_segment(
                Segment::nodes("main").with_filters(FilterSet::new().with("id", Filter::Eq(json!(2)))),
            )
            .unwrap()
            .with_segment(
                Segment::nodes("out")
                    .with_projection(Projection::All)
                    .with_edge_filters(FilterSet::new().with("label", Filter::Eq(json!("sum"))))
                    .with_relation(Relation::WithIncoming("main".into())),
            )
            .unwrap();
        assert_eq!(ids(&store.fetch(&query).unwrap(), "out"), vec![4]);
    }

    #[test]
    fn test_incoming_traversal() {
        let store = populated_store();
        let query = QueryDescription::new()
            .with_segment(
                Segment::nodes("main").with_filters(FilterSet::new().with("id", Filter::Eq(json!(2)))),
            )
            .unwrap()
            .with_segment(
                Segment::nodes("in")
                    .with_projection(Projection::fields(["id", "label"]))
                    .with_relation(Relation::WithOutgoing("main".into())),
            )
            .unwrap();

        let rows = store.fetch(&query).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].fields("in").unwrap()["id"], json!(1));
    }

    #[test]
    fn test_owner_join_projects_user_fields() {
        let store = populated_store();
        store.save_node(&Node::new(5, "data.int.Int.")).unwrap();
        let mut query = QueryDescription::new()
            .with_segment(Segment::nodes("node").with_projection(Projection::fields(["id"])))
            .unwrap()
            .with_segment(
                Segment::users("user")
                    .with_projection(Projection::fields(["email"]))
                    .with_relation(Relation::WithNode("node".into())),
            )
            .unwrap();
        query.set_primary("node").unwrap();

        let rows = store.fetch(&query).unwrap();
        assert_eq!(rows.len(), 5);
        assert_eq!(rows[0].fields("user").unwrap()["email"], json!("ada@example.com"));
        // Node 5 has no owner; the left join keeps it
        assert!(rows[4].get("user").is_none());
    }

    #[test]
    fn test_limit_offset_and_count() {
        let store = populated_store();
        let query = all_nodes().limit(2).offset(1);
        assert_eq!(ids(&store.fetch(&query).unwrap(), "node"), vec![2, 3]);
        assert_eq!(store.count(&query).unwrap(), 4);
        let tail = all_nodes().offset(3);
        assert_eq!(ids(&store.fetch(&tail).unwrap(), "node"), vec![4]);
    }

    #[test]
    fn test_distinct_projection() {
        let store = populated_store();
        let query = QueryDescription::new()
            .with_segment(Segment::nodes("node").with_projection(Projection::fields(["node_type", "process_type"])))
            .unwrap()
            .distinct();
        assert_eq!(store.count(&query).unwrap(), 3);
        let rows = store.fetch(&query.clone().limit(1).offset(1)).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(
            rows[0].fields("node").unwrap()["node_type"],
            json!("process.calculation.calcjob.CalcJobNode.")
        );
    }

    #[test]
    fn test_like_is_case_sensitive_and_escaped() {
        let store = populated_store();
        let like = |pattern: &str| {
            let query = QueryDescription::new()
                .with_segment(
                    Segment::nodes("node").with_filters(FilterSet::new().with("node_type", Filter::Like(pattern.into()))),
                )
                .unwrap();
            store.count(&query).unwrap()
        };
        assert_eq!(like("data.%"), 3);
        assert_eq!(like("DATA.%"), 0);
        assert_eq!(like("data\\_%"), 0);
    }

    #[test]
    fn test_in_and_ne_filters() {
        let store = populated_store();
        let count = |filter: Filter| {
            let query = QueryDescription::new()
                .with_segment(Segment::nodes("node").with_filters(FilterSet::new().with("id", filter)))
                .unwrap();
            store.count(&query).unwrap()
        };
        assert_eq!(count(Filter::In(vec![json!(1), json!(3)])), 2);
        assert_eq!(count(Filter::In(vec![])), 0);
        assert_eq!(count(Filter::NotIn(vec![json!(1)])), 3);
        assert_eq!(count(Filter::Ne(json!(2))), 3);

        let no_process = QueryDescription::new()
            .with_segment(
                Segment::nodes("node").with_filters(FilterSet::new().with("process_type", Filter::Eq(Value::Null))),
            )
            .unwrap();
        assert_eq!(store.count(&no_process).unwrap(), 3);
    }

    #[test]
    fn test_comments_oldest_first() {
        let store = populated_store();
        store.save_comment(NodeId::new(2), 1, "first").unwrap();
        store.save_comment(NodeId::new(2), 1, "second").unwrap();

        let comments = store.comments(NodeId::new(2)).unwrap();
        let messages: Vec<&str> = comments.iter().map(|c| c.message.as_str()).collect();
        assert_eq!(messages, vec!["first", "second"]);
        assert_eq!(comments[0].user_display_name, "Ada Lovelace");
        assert!(store.comments(NodeId::new(1)).unwrap().is_empty());
        assert!(store.save_comment(NodeId::new(99), 1, "orphan").is_err());
    }

    #[test]
    fn test_creation_statistics() {
        let store = populated_store();
        store.save_node(&Node::new(5, "data.int.Int.").with_user(2)).unwrap();

        let all = store.creation_statistics(None).unwrap();
        assert_eq!(all.total, 5);
        assert_eq!(all.types["data.int.Int."], 3);
        assert_eq!(all.ctime_by_day.values().sum::<u64>(), 5);

        let ada = store.creation_statistics(Some(1)).unwrap();
        assert_eq!(ada.total, 4);
    }

    #[test]
    fn test_wal_mode_enabled_at_connection() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("test-wal.db");
        let store = SqliteStore::open(&db_path).unwrap();

        let journal_mode: String = store
            .conn
            .lock()
            .unwrap()
            .query_row("PRAGMA journal_mode", [], |row| row.get(0))
            .unwrap();

        assert_eq!(journal_mode, "wal");
    }

    #[test]
    fn test_reopen_preserves_data() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("nested").join("graph.db");
        {
            let store = SqliteStore::open(&db_path).unwrap();
            store.save_node(&Node::new(1, "data.int.Int.")).unwrap();
        }
        let store = SqliteStore::open(&db_path).unwrap();
        assert_eq!(store.count(&all_nodes()).unwrap(), 1);
    }
}
