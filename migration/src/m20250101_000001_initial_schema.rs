use sea_orm_migration::{prelude::*, schema::*};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // Enable foreign keys for SQLite
        if manager.get_database_backend() == sea_orm::DatabaseBackend::Sqlite {
            manager
                .get_connection()
                .execute_unprepared("PRAGMA foreign_keys = ON")
                .await?;
        }

        manager
            .create_table(
                Table::create()
                    .table(Users::Table)
                    .if_not_exists()
                    .col(pk_auto(Users::Id))
                    .col(string_uniq(Users::Username))
                    .col(
                        ColumnDef::new(Users::Email)
                            .string()
                            .null()
                            .unique_key(),
                    )
                    .col(string(Users::PasswordHash))
                    .col(string(Users::Role))
                    .col(big_integer(Users::CreatedAt))
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(BankAccounts::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(BankAccounts::Id)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(integer_null(BankAccounts::UserId))
                    .col(string(BankAccounts::Vcc))
                    .col(
                        ColumnDef::new(BankAccounts::Balance)
                            .double()
                            .not_null()
                            .default(0.0),
                    )
                    .col(big_integer(BankAccounts::CreatedAt))
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_bank_accounts_user")
                            .from(BankAccounts::Table, BankAccounts::UserId)
                            .to(Users::Table, Users::Id)
                            .on_delete(ForeignKeyAction::SetNull),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_bank_accounts_user")
                    .table(BankAccounts::Table)
                    .col(BankAccounts::UserId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Products::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Products::Code)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(string_null(Products::Name))
                    .col(double(Products::Price))
                    .col(string_null(Products::Image))
                    .col(string_null(Products::Ingredients))
                    .col(string_null(Products::Brand))
                    .col(string_null(Products::NutriScore))
                    .col(text_null(Products::Raw))
                    .col(big_integer(Products::CreatedAt))
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Products::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(BankAccounts::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Users::Table).to_owned())
            .await?;
        Ok(())
    }
}

#[derive(DeriveIden)]
enum Users {
    Table,
    Id,
    Username,
    Email,
    PasswordHash,
    Role,
    CreatedAt,
}

#[derive(DeriveIden)]
enum BankAccounts {
    Table,
    Id,
    UserId,
    Vcc,
    Balance,
    CreatedAt,
}

#[derive(DeriveIden)]
enum Products {
    Table,
    Code,
    Name,
    Price,
    Image,
    Ingredients,
    Brand,
    NutriScore,
    Raw,
    CreatedAt,
}
