use sea_orm::DatabaseBackend;
use sea_orm::sea_query::{
    MysqlQueryBuilder, PostgresQueryBuilder, QueryStatementWriter, SqliteQueryBuilder, Values,
};
use serde::{Deserialize, Serialize};
use sieve_core::SieveError;

/// SQL dialect a compiled selector is rendered for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    Sqlite,
    Postgres,
    Mysql,
}

impl Dialect {
    /// Type name used in `CAST(value AS ..)` for numeric label comparisons.
    pub fn int_type(self) -> &'static str {
        match self {
            Dialect::Sqlite => "integer",
            Dialect::Postgres => "bigint",
            Dialect::Mysql => "signed",
        }
    }

    pub fn backend(self) -> DatabaseBackend {
        match self {
            Dialect::Sqlite => DatabaseBackend::Sqlite,
            Dialect::Postgres => DatabaseBackend::Postgres,
            Dialect::Mysql => DatabaseBackend::MySql,
        }
    }

    pub fn build<S: QueryStatementWriter>(self, stmt: &S) -> (String, Values) {
        match self {
            Dialect::Sqlite => stmt.build(SqliteQueryBuilder),
            Dialect::Postgres => stmt.build(PostgresQueryBuilder),
            Dialect::Mysql => stmt.build(MysqlQueryBuilder),
        }
    }

    /// Renders the statement with values inlined. For logs and tests only.
    pub fn to_sql<S: QueryStatementWriter>(self, stmt: &S) -> String {
        match self {
            Dialect::Sqlite => stmt.to_string(SqliteQueryBuilder),
            Dialect::Postgres => stmt.to_string(PostgresQueryBuilder),
            Dialect::Mysql => stmt.to_string(MysqlQueryBuilder),
        }
    }
}

impl TryFrom<DatabaseBackend> for Dialect {
    type Error = SieveError;

    fn try_from(value: DatabaseBackend) -> Result<Self, Self::Error> {
        match value {
            DatabaseBackend::Sqlite => Ok(Dialect::Sqlite),
            DatabaseBackend::Postgres => Ok(Dialect::Postgres),
            DatabaseBackend::MySql => Ok(Dialect::Mysql),
            other => Err(SieveError::invalid(format!(
                "unsupported database backend {other:?}"
            ))),
        }
    }
}
