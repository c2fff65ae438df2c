use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use sea_orm::sea_query::{
    Alias, Expr, ExprTrait, Func, Order, Query, QueryStatementWriter, SelectStatement,
};
use sea_orm::{
    ConnectOptions, ConnectionTrait, Database, DatabaseConnection, QueryResult, Statement,
    TransactionTrait,
};
use sea_orm_migration::MigratorTrait;
use sea_orm_migration::prelude::Iden;

use crate::db::{ArchivedRecordLabels, ArchivedRecords};
use crate::dialect::Dialect;
use crate::labels::SelectorCompiler;
use crate::migration::Migrator;
use crate::{SieveConfig, TablesConfig};
use sieve_core::{
    ArchiveReadApi, ArchiveWriteApi, ArchivedRecord, LabelDiscoveryApi, LabelKeys, LabelValues,
    ListRecordsInput, SieveError, SieveResult, validate_label_key, validate_label_value,
};

const COUNT_ALIAS: &str = "record_count";
// Stays well under the bind-parameter limit of every supported backend.
const LABEL_FETCH_BATCH: usize = 500;

#[derive(Clone)]
pub struct ArchiveStore {
    conn: DatabaseConnection,
    dialect: Dialect,
    owner: Alias,
    label: Alias,
    cluster_name: String,
    compiler: SelectorCompiler,
}

impl ArchiveStore {
    pub async fn connect(config: &SieveConfig, base_dir: &Path) -> SieveResult<Self> {
        let tables = config.tables();
        tables.validate()?;
        let url = build_connection_url(config, base_dir)?;
        let mut options = ConnectOptions::new(url);
        if let Some(pool) = &config.pool {
            if let Some(max) = pool.max_connections {
                options.max_connections(max);
            }
            if let Some(min) = pool.min_connections {
                options.min_connections(min);
            }
            if let Some(timeout_ms) = pool.connect_timeout_ms {
                options.connect_timeout(Duration::from_millis(timeout_ms));
            }
            if let Some(timeout_ms) = pool.acquire_timeout_ms {
                options.acquire_timeout(Duration::from_millis(timeout_ms));
            }
            if let Some(timeout_ms) = pool.idle_timeout_ms {
                options.idle_timeout(Duration::from_millis(timeout_ms));
            }
        }
        options.sqlx_logging(false);
        let conn = Database::connect(options).await.map_err(SieveError::from)?;
        let dialect = Dialect::try_from(conn.get_database_backend())?;
        if tables == TablesConfig::default() {
            Migrator::up(&conn, None).await.map_err(SieveError::from)?;
            log::info!("archive store ready on {} (migrated)", config.backend_name());
        } else {
            log::info!(
                "archive store ready on {} using external tables {}/{}",
                config.backend_name(),
                tables.owner_table,
                tables.label_table
            );
        }
        let cluster_scoping = config.cluster_scoping();
        Ok(Self {
            conn,
            dialect,
            owner: Alias::new(tables.owner_table.as_str()),
            label: Alias::new(tables.label_table.as_str()),
            cluster_name: config.cluster_name(),
            compiler: SelectorCompiler::new(dialect, &tables, cluster_scoping),
        })
    }

    /// Opens the store described by `sieve.json` in `base_dir`, creating a
    /// SQLite-backed default config there on first use.
    pub async fn open(base_dir: &Path) -> SieveResult<Self> {
        let config = SieveConfig::load_or_init(base_dir)?;
        Self::connect(&config, base_dir).await
    }

    pub fn connection(&self) -> &DatabaseConnection {
        &self.conn
    }

    pub fn compiler(&self) -> &SelectorCompiler {
        &self.compiler
    }

    pub fn cluster_name(&self) -> &str {
        &self.cluster_name
    }

    fn scoped_cluster(&self) -> Option<&str> {
        self.compiler
            .cluster_scoped()
            .then_some(self.cluster_name.as_str())
    }

    fn owner_col(&self, column: ArchivedRecords) -> (Alias, ArchivedRecords) {
        (self.owner.clone(), column)
    }

    fn label_col(&self, column: ArchivedRecordLabels) -> (Alias, ArchivedRecordLabels) {
        (self.label.clone(), column)
    }

    /// Base select over the owner table before any label requirement applies.
    fn base_select(&self, namespace: Option<&str>) -> SelectStatement {
        let mut select = Query::select().from(self.owner.clone()).to_owned();
        if let Some(cluster) = self.scoped_cluster() {
            select.and_where(Expr::col(self.owner_col(ArchivedRecords::ClusterName)).eq(cluster));
        }
        if let Some(namespace) = namespace {
            select.and_where(Expr::col(self.owner_col(ArchivedRecords::Namespace)).eq(namespace));
        }
        select
    }

    /// Loads labels for `uids`, at most `LABEL_FETCH_BATCH` uids per statement.
    ///
    /// Externally managed label tables may hold several rows for one
    /// `(uid, name)`. Rows are read in `(name, value)` order and the greatest
    /// value is kept.
    async fn load_labels<C: ConnectionTrait>(
        &self,
        conn: &C,
        uids: &[String],
    ) -> SieveResult<HashMap<String, BTreeMap<String, String>>> {
        let mut labels: HashMap<String, BTreeMap<String, String>> = HashMap::new();
        for chunk in uids.chunks(LABEL_FETCH_BATCH) {
            let mut select = Query::select()
                .columns([
                    self.label_col(ArchivedRecordLabels::Uid),
                    self.label_col(ArchivedRecordLabels::Name),
                    self.label_col(ArchivedRecordLabels::Value),
                ])
                .from(self.label.clone())
                .and_where(
                    Expr::col(self.label_col(ArchivedRecordLabels::Uid)).is_in(chunk.to_vec()),
                )
                .order_by(self.label_col(ArchivedRecordLabels::Name), Order::Asc)
                .order_by(self.label_col(ArchivedRecordLabels::Value), Order::Asc)
                .to_owned();
            if let Some(cluster) = self.scoped_cluster() {
                select.and_where(
                    Expr::col(self.label_col(ArchivedRecordLabels::ClusterName)).eq(cluster),
                );
            }
            for row in query_all(conn, self.dialect, &select).await? {
                let uid: String = row.try_get("", &col_name(ArchivedRecordLabels::Uid))?;
                let name: String = row.try_get("", &col_name(ArchivedRecordLabels::Name))?;
                let value: String = row.try_get("", &col_name(ArchivedRecordLabels::Value))?;
                let entry = labels.entry(uid).or_default();
                if let Some(previous) = entry.insert(name.clone(), value) {
                    log::debug!("duplicate label {name}: dropping value {previous:?}");
                }
            }
        }
        Ok(labels)
    }

    async fn fetch_records<C: ConnectionTrait>(
        &self,
        conn: &C,
        select: &SelectStatement,
    ) -> SieveResult<Vec<ArchivedRecord>> {
        let rows = query_all(conn, self.dialect, select).await?;
        let mut records = rows
            .iter()
            .map(read_record)
            .collect::<SieveResult<Vec<_>>>()?;
        let uids = records
            .iter()
            .map(|record| record.uid.clone())
            .collect::<Vec<_>>();
        let mut labels = self.load_labels(conn, &uids).await?;
        for record in &mut records {
            record.labels = labels.remove(&record.uid).unwrap_or_default();
        }
        Ok(records)
    }

    fn record_columns(&self, select: &mut SelectStatement) {
        select.columns([
            self.owner_col(ArchivedRecords::Uid),
            self.owner_col(ArchivedRecords::Name),
            self.owner_col(ArchivedRecords::Namespace),
            self.owner_col(ArchivedRecords::Phase),
            self.owner_col(ArchivedRecords::StartedAt),
            self.owner_col(ArchivedRecords::FinishedAt),
        ]);
    }

    async fn distinct_strings(
        &self,
        select: &SelectStatement,
        column: ArchivedRecordLabels,
    ) -> SieveResult<Vec<String>> {
        let rows = query_all(&self.conn, self.dialect, select).await?;
        rows.iter()
            .map(|row| {
                row.try_get::<String>("", &col_name(column))
                    .map_err(SieveError::from)
            })
            .collect()
    }
}

fn validate_record(record: &ArchivedRecord) -> SieveResult<()> {
    if record.uid.is_empty() {
        return Err(SieveError::invalid("record uid must not be empty"));
    }
    for (key, value) in &record.labels {
        validate_label_key(key)?;
        validate_label_value(value)?;
    }
    Ok(())
}

fn read_record(row: &QueryResult) -> SieveResult<ArchivedRecord> {
    Ok(ArchivedRecord {
        uid: row.try_get("", &col_name(ArchivedRecords::Uid))?,
        name: row.try_get("", &col_name(ArchivedRecords::Name))?,
        namespace: row.try_get("", &col_name(ArchivedRecords::Namespace))?,
        phase: row.try_get("", &col_name(ArchivedRecords::Phase))?,
        started_at: row.try_get("", &col_name(ArchivedRecords::StartedAt))?,
        finished_at: row.try_get("", &col_name(ArchivedRecords::FinishedAt))?,
        labels: BTreeMap::new(),
    })
}

#[async_trait]
impl ArchiveWriteApi for ArchiveStore {
    async fn archive_record(&self, record: ArchivedRecord) -> SieveResult<()> {
        validate_record(&record)?;
        let tx = self.conn.begin().await?;
        let delete_labels = Query::delete()
            .from_table(self.label.clone())
            .and_where(Expr::col(ArchivedRecordLabels::ClusterName).eq(self.cluster_name.as_str()))
            .and_where(Expr::col(ArchivedRecordLabels::Uid).eq(record.uid.as_str()))
            .to_owned();
        exec(&tx, self.dialect, &delete_labels).await?;
        let delete_owner = Query::delete()
            .from_table(self.owner.clone())
            .and_where(Expr::col(ArchivedRecords::ClusterName).eq(self.cluster_name.as_str()))
            .and_where(Expr::col(ArchivedRecords::Uid).eq(record.uid.as_str()))
            .to_owned();
        exec(&tx, self.dialect, &delete_owner).await?;

        let insert_owner = Query::insert()
            .into_table(self.owner.clone())
            .columns([
                ArchivedRecords::ClusterName,
                ArchivedRecords::Uid,
                ArchivedRecords::Name,
                ArchivedRecords::Namespace,
                ArchivedRecords::Phase,
                ArchivedRecords::StartedAt,
                ArchivedRecords::FinishedAt,
            ])
            .values_panic([
                self.cluster_name.clone().into(),
                record.uid.clone().into(),
                record.name.clone().into(),
                record.namespace.clone().into(),
                record.phase.clone().into(),
                record.started_at.into(),
                record.finished_at.into(),
            ])
            .to_owned();
        exec(&tx, self.dialect, &insert_owner).await?;

        if !record.labels.is_empty() {
            let mut insert_labels = Query::insert()
                .into_table(self.label.clone())
                .columns([
                    ArchivedRecordLabels::ClusterName,
                    ArchivedRecordLabels::Uid,
                    ArchivedRecordLabels::Name,
                    ArchivedRecordLabels::Value,
                ])
                .to_owned();
            for (name, value) in &record.labels {
                insert_labels.values_panic([
                    self.cluster_name.clone().into(),
                    record.uid.clone().into(),
                    name.clone().into(),
                    value.clone().into(),
                ]);
            }
            exec(&tx, self.dialect, &insert_labels).await?;
        }
        tx.commit().await?;
        log::debug!(
            "archived record {} with {} label(s)",
            record.uid,
            record.labels.len()
        );
        Ok(())
    }

    async fn delete_record(&self, uid: &str) -> SieveResult<()> {
        let tx = self.conn.begin().await?;
        let delete_labels = Query::delete()
            .from_table(self.label.clone())
            .and_where(Expr::col(ArchivedRecordLabels::ClusterName).eq(self.cluster_name.as_str()))
            .and_where(Expr::col(ArchivedRecordLabels::Uid).eq(uid))
            .to_owned();
        exec(&tx, self.dialect, &delete_labels).await?;
        let delete_owner = Query::delete()
            .from_table(self.owner.clone())
            .and_where(Expr::col(ArchivedRecords::ClusterName).eq(self.cluster_name.as_str()))
            .and_where(Expr::col(ArchivedRecords::Uid).eq(uid))
            .to_owned();
        let deleted = exec(&tx, self.dialect, &delete_owner).await?;
        if deleted == 0 {
            return Err(SieveError::not_found(format!("archived record {uid}")));
        }
        tx.commit().await?;
        log::debug!("deleted archived record {uid}");
        Ok(())
    }
}

#[async_trait]
impl ArchiveReadApi for ArchiveStore {
    async fn get_record(&self, uid: &str) -> SieveResult<Option<ArchivedRecord>> {
        let mut select = self.base_select(None);
        self.record_columns(&mut select);
        select
            .and_where(Expr::col(self.owner_col(ArchivedRecords::Uid)).eq(uid))
            .limit(1);
        Ok(self.fetch_records(&self.conn, &select).await?.into_iter().next())
    }

    async fn list_records(&self, input: ListRecordsInput) -> SieveResult<Vec<ArchivedRecord>> {
        let mut select = self.base_select(input.namespace.as_deref());
        self.record_columns(&mut select);
        let mut select = self.compiler.labels_clause(select, &input.requirements)?;
        select
            .order_by(self.owner_col(ArchivedRecords::StartedAt), Order::Desc)
            .order_by(self.owner_col(ArchivedRecords::Uid), Order::Asc);
        if let Some(limit) = input.limit {
            select.limit(limit);
        }
        if input.offset > 0 {
            select.offset(input.offset);
        }
        self.fetch_records(&self.conn, &select).await
    }

    async fn count_records(&self, input: ListRecordsInput) -> SieveResult<u64> {
        let mut select = self.base_select(input.namespace.as_deref());
        select.expr_as(
            Func::count(Expr::col(self.owner_col(ArchivedRecords::Uid))),
            Alias::new(COUNT_ALIAS),
        );
        let select = self.compiler.labels_clause(select, &input.requirements)?;
        let row = query_one(&self.conn, self.dialect, &select)
            .await?
            .ok_or_else(|| SieveError::storage("count returned no rows"))?;
        let count: i64 = row.try_get("", COUNT_ALIAS)?;
        u64::try_from(count).map_err(|err| SieveError::storage(err.to_string()))
    }
}

#[async_trait]
impl LabelDiscoveryApi for ArchiveStore {
    async fn list_label_keys(&self) -> SieveResult<LabelKeys> {
        let select = self.compiler.label_keys_query(self.scoped_cluster());
        let items = self
            .distinct_strings(&select, ArchivedRecordLabels::Name)
            .await?;
        Ok(LabelKeys { items })
    }

    async fn list_label_values(&self, key: &str) -> SieveResult<LabelValues> {
        let select = self.compiler.label_values_query(key, self.scoped_cluster());
        let items = self
            .distinct_strings(&select, ArchivedRecordLabels::Value)
            .await?;
        Ok(LabelValues { items })
    }
}

fn col_name(column: impl Iden) -> String {
    column.to_string()
}

fn build_connection_url(config: &SieveConfig, base_dir: &Path) -> SieveResult<String> {
    match &config.database {
        crate::DatabaseConfig::Sqlite { .. } => {
            let path = config.sqlite_path(base_dir)?;
            Ok(format!("sqlite://{}?mode=rwc", path.display()))
        }
        crate::DatabaseConfig::Postgres { url } => Ok(url.clone()),
        crate::DatabaseConfig::Mysql { url } => Ok(url.clone()),
    }
}

async fn exec<C, S>(conn: &C, dialect: Dialect, stmt: &S) -> SieveResult<u64>
where
    C: ConnectionTrait,
    S: QueryStatementWriter,
{
    let (sql, values) = dialect.build(stmt);
    let result = conn
        .execute_raw(Statement::from_sql_and_values(dialect.backend(), sql, values))
        .await?;
    Ok(result.rows_affected())
}

async fn query_all<C, S>(conn: &C, dialect: Dialect, stmt: &S) -> SieveResult<Vec<QueryResult>>
where
    C: ConnectionTrait,
    S: QueryStatementWriter,
{
    let (sql, values) = dialect.build(stmt);
    let rows = conn
        .query_all_raw(Statement::from_sql_and_values(dialect.backend(), sql, values))
        .await?;
    Ok(rows)
}

async fn query_one<C, S>(conn: &C, dialect: Dialect, stmt: &S) -> SieveResult<Option<QueryResult>>
where
    C: ConnectionTrait,
    S: QueryStatementWriter,
{
    let (sql, values) = dialect.build(stmt);
    let row = conn
        .query_one_raw(Statement::from_sql_and_values(dialect.backend(), sql, values))
        .await?;
    Ok(row)
}
