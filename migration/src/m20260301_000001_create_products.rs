use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Products::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Products::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(Products::Asin).string().not_null())
                    .col(ColumnDef::new(Products::Marketplace).string().not_null())
                    .col(ColumnDef::new(Products::Title).text())
                    .col(ColumnDef::new(Products::Rating).double())
                    .col(ColumnDef::new(Products::RatingsCount).integer())
                    .col(ColumnDef::new(Products::PriceAmount).double())
                    .col(ColumnDef::new(Products::PriceCurrency).string())
                    .col(ColumnDef::new(Products::Availability).text())
                    .col(ColumnDef::new(Products::BestSellersRank).json())
                    .col(ColumnDef::new(Products::StructuralDigest).string().not_null())
                    .col(
                        ColumnDef::new(Products::Status)
                            .string()
                            .not_null()
                            .default("pending"),
                    )
                    .col(
                        ColumnDef::new(Products::LastScrapedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Products::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(Products::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        // (asin, marketplace) identifies exactly one product row
        manager
            .create_index(
                Index::create()
                    .name("uq_products_asin_marketplace")
                    .table(Products::Table)
                    .col(Products::Asin)
                    .col(Products::Marketplace)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(ProductBullets::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(ProductBullets::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(ProductBullets::ProductId).uuid().not_null())
                    .col(ColumnDef::new(ProductBullets::Position).integer().not_null())
                    .col(ColumnDef::new(ProductBullets::Text).text().not_null())
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_bullets_product")
                            .from(ProductBullets::Table, ProductBullets::ProductId)
                            .to(Products::Table, Products::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(ProductAttributes::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(ProductAttributes::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(ProductAttributes::ProductId)
                            .uuid()
                            .not_null(),
                    )
                    .col(ColumnDef::new(ProductAttributes::Name).string().not_null())
                    .col(ColumnDef::new(ProductAttributes::Value).text())
                    .col(ColumnDef::new(ProductAttributes::Source).string().not_null())
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_attributes_product")
                            .from(ProductAttributes::Table, ProductAttributes::ProductId)
                            .to(Products::Table, Products::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(ProductAssets::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(ProductAssets::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(ProductAssets::ProductId).uuid().not_null())
                    .col(ColumnDef::new(ProductAssets::Role).string().not_null())
                    .col(ColumnDef::new(ProductAssets::Position).integer().not_null())
                    .col(ColumnDef::new(ProductAssets::SourceUrl).text().not_null())
                    .col(ColumnDef::new(ProductAssets::Width).integer())
                    .col(ColumnDef::new(ProductAssets::Height).integer())
                    .col(ColumnDef::new(ProductAssets::AltText).text())
                    .col(ColumnDef::new(ProductAssets::StoragePath).text())
                    .col(
                        ColumnDef::new(ProductAssets::Status)
                            .string()
                            .not_null()
                            .default("pending"),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_assets_product")
                            .from(ProductAssets::Table, ProductAssets::ProductId)
                            .to(Products::Table, Products::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // pointer updates are addressed by role + position
        manager
            .create_index(
                Index::create()
                    .name("uq_assets_product_role_position")
                    .table(ProductAssets::Table)
                    .col(ProductAssets::ProductId)
                    .col(ProductAssets::Role)
                    .col(ProductAssets::Position)
                    .unique()
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(ProductAssets::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(ProductAttributes::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(ProductBullets::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Products::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Products {
    Table,
    Id,
    Asin,
    Marketplace,
    Title,
    Rating,
    RatingsCount,
    PriceAmount,
    PriceCurrency,
    Availability,
    BestSellersRank,
    StructuralDigest,
    Status,
    LastScrapedAt,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum ProductBullets {
    Table,
    Id,
    ProductId,
    Position,
    Text,
}

#[derive(DeriveIden)]
enum ProductAttributes {
    Table,
    Id,
    ProductId,
    Name,
    Value,
    Source,
}

#[derive(DeriveIden)]
enum ProductAssets {
    Table,
    Id,
    ProductId,
    Role,
    Position,
    SourceUrl,
    Width,
    Height,
    AltText,
    StoragePath,
    Status,
}
