use sea_orm_migration::prelude::*;

pub struct Migration;

impl MigrationName for Migration {
    fn name(&self) -> &str {
        "m202510010003_create_device_change_requests"
    }
}

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Alias::new("device_change_requests"))
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Alias::new("id"))
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(Alias::new("principal_id"))
                            .big_integer()
                            .not_null(),
                    )
                    .col(ColumnDef::new(Alias::new("current_device_id")).string().null())
                    .col(
                        ColumnDef::new(Alias::new("requested_device_id"))
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Alias::new("challenge_code"))
                            .string_len(6)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Alias::new("challenge_expiry"))
                            .timestamp()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Alias::new("status"))
                            .string()
                            .not_null()
                            .default("pending"),
                    )
                    .col(ColumnDef::new(Alias::new("disposed_by")).big_integer().null())
                    .col(ColumnDef::new(Alias::new("disposition_reason")).string().null())
                    .col(
                        ColumnDef::new(Alias::new("created_at"))
                            .timestamp()
                            .not_null()
                            .default(Expr::cust("CURRENT_TIMESTAMP")),
                    )
                    .col(
                        ColumnDef::new(Alias::new("updated_at"))
                            .timestamp()
                            .not_null()
                            .default(Expr::cust("CURRENT_TIMESTAMP")),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_dcr_principal")
                            .from(Alias::new("device_change_requests"), Alias::new("principal_id"))
                            .to(Alias::new("principals"), Alias::new("id"))
                            .on_delete(ForeignKeyAction::Cascade)
                            .on_update(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_dcr_disposed_by")
                            .from(Alias::new("device_change_requests"), Alias::new("disposed_by"))
                            .to(Alias::new("principals"), Alias::new("id"))
                            .on_delete(ForeignKeyAction::SetNull)
                            .on_update(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_dcr_status")
                    .table(Alias::new("device_change_requests"))
                    .col(Alias::new("status"))
                    .to_owned(),
            )
            .await?;

        // One outstanding (pending or otp_verified) request per principal.
        manager
            .get_connection()
            .execute_unprepared(
                "CREATE UNIQUE INDEX IF NOT EXISTS idx_dcr_one_outstanding \
                 ON device_change_requests (principal_id) \
                 WHERE status IN ('pending', 'otp_verified')",
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(
                Table::drop()
                    .table(Alias::new("device_change_requests"))
                    .to_owned(),
            )
            .await
    }
}
