use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(ScrapeTasks::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(ScrapeTasks::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(ScrapeTasks::Asin).string().not_null())
                    .col(ColumnDef::new(ScrapeTasks::Marketplace).string().not_null())
                    .col(
                        ColumnDef::new(ScrapeTasks::Status)
                            .string()
                            .not_null()
                            .default("queued"),
                    )
                    .col(ColumnDef::new(ScrapeTasks::Error).text())
                    .col(ColumnDef::new(ScrapeTasks::RequestedBy).string())
                    .col(
                        ColumnDef::new(ScrapeTasks::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(ScrapeTasks::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_scrape_tasks_status")
                    .table(ScrapeTasks::Table)
                    .col(ScrapeTasks::Status)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(ScrapeTasks::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum ScrapeTasks {
    Table,
    Id,
    Asin,
    Marketplace,
    Status,
    Error,
    RequestedBy,
    CreatedAt,
    UpdatedAt,
}
