use sea_orm_migration::prelude::*;

pub struct Migration;

impl MigrationName for Migration {
    fn name(&self) -> &str {
        "m202510010004_create_device_change_logs"
    }
}

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Alias::new("device_change_logs"))
                    .if_not_exists()
                    .col(ColumnDef::new(Alias::new("id")).big_integer().not_null().auto_increment().primary_key())
                    .col(ColumnDef::new(Alias::new("principal_id")).big_integer().not_null())
                    .col(ColumnDef::new(Alias::new("request_id")).big_integer().null())
                    .col(ColumnDef::new(Alias::new("old_device_id")).string().null())
                    .col(ColumnDef::new(Alias::new("new_device_id")).string().null())
                    .col(ColumnDef::new(Alias::new("actor_id")).big_integer().null())
                    .col(ColumnDef::new(Alias::new("action")).string().not_null())
                    .col(ColumnDef::new(Alias::new("message")).text().not_null())
                    .col(ColumnDef::new(Alias::new("created_at")).timestamp().not_null().default(Expr::cust("CURRENT_TIMESTAMP")))
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_dcl_principal")
                            .from(Alias::new("device_change_logs"), Alias::new("principal_id"))
                            .to(Alias::new("principals"), Alias::new("id"))
                            .on_delete(ForeignKeyAction::Cascade)
                            .on_update(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_dcl_request")
                            .from(Alias::new("device_change_logs"), Alias::new("request_id"))
                            .to(Alias::new("device_change_requests"), Alias::new("id"))
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
                    .name("idx_dcl_principal")
                    .table(Alias::new("device_change_logs"))
                    .col(Alias::new("principal_id"))
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Alias::new("device_change_logs")).to_owned())
            .await
    }
}
