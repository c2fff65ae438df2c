use sea_orm_migration::prelude::*;

use crate::db::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(ArchivedRecords::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(ArchivedRecords::ClusterName)
                            .string_len(64)
                            .not_null(),
                    )
                    .col(ColumnDef::new(ArchivedRecords::Uid).string_len(128).not_null())
                    .col(ColumnDef::new(ArchivedRecords::Name).string_len(256).not_null())
                    .col(
                        ColumnDef::new(ArchivedRecords::Namespace)
                            .string_len(256)
                            .not_null(),
                    )
                    .col(ColumnDef::new(ArchivedRecords::Phase).string_len(32).not_null())
                    .col(
                        ColumnDef::new(ArchivedRecords::StartedAt)
                            .big_integer()
                            .not_null(),
                    )
                    .col(ColumnDef::new(ArchivedRecords::FinishedAt).big_integer().null())
                    .primary_key(
                        Index::create()
                            .name("pk_archived_records")
                            .col(ArchivedRecords::ClusterName)
                            .col(ArchivedRecords::Uid),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_archived_records_namespace_started")
                    .table(ArchivedRecords::Table)
                    .col(ArchivedRecords::ClusterName)
                    .col(ArchivedRecords::Namespace)
                    .col(ArchivedRecords::StartedAt)
                    .if_not_exists()
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(ArchivedRecordLabels::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(ArchivedRecordLabels::ClusterName)
                            .string_len(64)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ArchivedRecordLabels::Uid)
                            .string_len(128)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ArchivedRecordLabels::Name)
                            .string_len(317)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ArchivedRecordLabels::Value)
                            .string_len(63)
                            .not_null(),
                    )
                    .primary_key(
                        Index::create()
                            .name("pk_archived_record_labels")
                            .col(ArchivedRecordLabels::ClusterName)
                            .col(ArchivedRecordLabels::Uid)
                            .col(ArchivedRecordLabels::Name),
                    )
                    .to_owned(),
            )
            .await?;

        // Serves the correlated EXISTS lookups and the discovery queries.
        manager
            .create_index(
                Index::create()
                    .name("idx_archived_record_labels_name_value")
                    .table(ArchivedRecordLabels::Table)
                    .col(ArchivedRecordLabels::ClusterName)
                    .col(ArchivedRecordLabels::Name)
                    .col(ArchivedRecordLabels::Value)
                    .if_not_exists()
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(
                Table::drop()
                    .table(ArchivedRecordLabels::Table)
                    .if_exists()
                    .to_owned(),
            )
            .await?;
        manager
            .drop_table(
                Table::drop()
                    .table(ArchivedRecords::Table)
                    .if_exists()
                    .to_owned(),
            )
            .await?;
        Ok(())
    }
}
