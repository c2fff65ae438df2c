//! Compiles label selector requirements into SQL predicates.
//!
//! Each requirement becomes a correlated `EXISTS` / `NOT EXISTS` subquery over
//! the label table keyed on the owner row's `uid`, so owners with many labels
//! are never multiplied by a join and every requirement is evaluated on its
//! own. Label keys and operands are bound as statement parameters; only table
//! and column identifiers appear in the SQL text.

use sea_orm::sea_query::{Alias, Condition, Expr, ExprTrait, Func, Query, SelectStatement};
use sieve_core::{Operator, Requirement, SieveError, SieveResult};

use crate::config::TablesConfig;
use crate::db::{ArchivedRecordLabels, ArchivedRecords};
use crate::dialect::Dialect;

#[derive(Clone, Debug)]
pub struct SelectorCompiler {
    dialect: Dialect,
    owner_table: String,
    owner: Alias,
    label: Alias,
    cluster_scoped: bool,
}

impl SelectorCompiler {
    pub fn new(dialect: Dialect, tables: &TablesConfig, cluster_scoped: bool) -> Self {
        Self {
            dialect,
            owner_table: tables.owner_table.clone(),
            owner: Alias::new(tables.owner_table.as_str()),
            label: Alias::new(tables.label_table.as_str()),
            cluster_scoped,
        }
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    pub fn cluster_scoped(&self) -> bool {
        self.cluster_scoped
    }

    /// Translates one requirement into a boolean expression usable in a
    /// `WHERE` clause of a query over the owner table.
    pub fn requirement_to_condition(&self, requirement: &Requirement) -> SieveResult<Expr> {
        let mut subquery = self.label_subquery(requirement.key());
        let value = Expr::col((self.label.clone(), ArchivedRecordLabels::Value));
        match requirement.operator() {
            Operator::Exists | Operator::DoesNotExist => {}
            Operator::Equals | Operator::DoubleEquals | Operator::NotEquals => {
                subquery.and_where(value.eq(single_operand(requirement)?));
            }
            Operator::In | Operator::NotIn => {
                subquery.and_where(value.is_in(requirement.values().iter().cloned()));
            }
            Operator::GreaterThan => {
                let bound = integer_operand(requirement)?;
                subquery.and_where(self.cast_to_int(value).gt(bound));
            }
            Operator::LessThan => {
                let bound = integer_operand(requirement)?;
                subquery.and_where(self.cast_to_int(value).lt(bound));
            }
        }
        let exists = Expr::exists(subquery);
        if requirement.operator().is_negated() {
            Ok(exists.not())
        } else {
            Ok(exists)
        }
    }

    /// ANDs every requirement onto `select`. Nothing is applied unless all
    /// requirements translate.
    pub fn labels_clause(
        &self,
        mut select: SelectStatement,
        requirements: &[Requirement],
    ) -> SieveResult<SelectStatement> {
        let conditions = requirements
            .iter()
            .map(|requirement| self.requirement_to_condition(requirement))
            .collect::<SieveResult<Vec<_>>>()?;
        for condition in conditions {
            select.and_where(condition);
        }
        log::debug!(
            "compiled {} label requirement(s) against {}",
            requirements.len(),
            self.owner_table
        );
        Ok(select)
    }

    /// Same predicate as [`Self::labels_clause`], as a standalone condition.
    pub fn labels_condition(&self, requirements: &[Requirement]) -> SieveResult<Condition> {
        requirements
            .iter()
            .try_fold(Condition::all(), |condition, requirement| {
                Ok(condition.add(self.requirement_to_condition(requirement)?))
            })
    }

    /// `SELECT DISTINCT name FROM <label>`, optionally limited to one cluster.
    pub fn label_keys_query(&self, cluster: Option<&str>) -> SelectStatement {
        let mut select = Query::select()
            .distinct()
            .column(ArchivedRecordLabels::Name)
            .from(self.label.clone())
            .to_owned();
        if let Some(cluster) = cluster {
            select.and_where(Expr::col(ArchivedRecordLabels::ClusterName).eq(cluster));
        }
        select
    }

    /// `SELECT DISTINCT value FROM <label> WHERE name = <key>`.
    pub fn label_values_query(&self, key: &str, cluster: Option<&str>) -> SelectStatement {
        let mut select = Query::select()
            .distinct()
            .column(ArchivedRecordLabels::Value)
            .from(self.label.clone())
            .and_where(Expr::col(ArchivedRecordLabels::Name).eq(key))
            .to_owned();
        if let Some(cluster) = cluster {
            select.and_where(Expr::col(ArchivedRecordLabels::ClusterName).eq(cluster));
        }
        select
    }

    fn label_subquery(&self, key: &str) -> SelectStatement {
        let mut subquery = Query::select()
            .expr(Expr::cust("1"))
            .from(self.label.clone())
            .to_owned();
        if self.cluster_scoped {
            subquery.and_where(
                Expr::col((self.label.clone(), ArchivedRecordLabels::ClusterName))
                    .equals((self.owner.clone(), ArchivedRecords::ClusterName)),
            );
        }
        subquery
            .and_where(
                Expr::col((self.label.clone(), ArchivedRecordLabels::Uid))
                    .equals((self.owner.clone(), ArchivedRecords::Uid)),
            )
            .and_where(Expr::col((self.label.clone(), ArchivedRecordLabels::Name)).eq(key));
        subquery
    }

    fn cast_to_int(&self, value: Expr) -> Expr {
        Func::cast_as(value, Alias::new(self.dialect.int_type())).into()
    }
}

fn single_operand(requirement: &Requirement) -> SieveResult<String> {
    requirement
        .first_value()
        .map(str::to_string)
        .ok_or_else(|| {
            SieveError::invalid_requirement(format!(
                "operator {} on '{}' needs a value",
                requirement.operator(),
                requirement.key()
            ))
        })
}

fn integer_operand(requirement: &Requirement) -> SieveResult<i64> {
    let raw = single_operand(requirement)?;
    raw.parse::<i64>()
        .map_err(|err| SieveError::invalid_operand(raw, err))
}
