use sea_orm::sea_query;
use sea_orm_migration::prelude::Iden;

#[derive(Iden, Clone, Copy)]
pub enum ArchivedRecords {
    Table,
    #[iden = "clustername"]
    ClusterName,
    Uid,
    Name,
    Namespace,
    Phase,
    StartedAt,
    FinishedAt,
}

#[derive(Iden, Clone, Copy)]
pub enum ArchivedRecordLabels {
    Table,
    #[iden = "clustername"]
    ClusterName,
    Uid,
    Name,
    Value,
}
