use sea_orm_migration::prelude::*;

pub struct Migration;

impl MigrationName for Migration {
    fn name(&self) -> &str {
        "m202510010007_create_attendance_audits"
    }
}

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Alias::new("attendance_audits"))
                    .if_not_exists()
                    .col(ColumnDef::new(Alias::new("id")).big_integer().not_null().auto_increment().primary_key())
                    .col(ColumnDef::new(Alias::new("principal_id")).big_integer().not_null())
                    .col(ColumnDef::new(Alias::new("session_id")).big_integer().not_null())
                    .col(ColumnDef::new(Alias::new("device_id")).string().not_null())
                    .col(ColumnDef::new(Alias::new("action")).string().not_null())
                    .col(ColumnDef::new(Alias::new("reason")).string().not_null())
                    .col(ColumnDef::new(Alias::new("distance_m")).double().null())
                    .col(ColumnDef::new(Alias::new("latitude")).double().not_null())
                    .col(ColumnDef::new(Alias::new("longitude")).double().not_null())
                    .col(ColumnDef::new(Alias::new("created_at")).timestamp().not_null().default(Expr::cust("CURRENT_TIMESTAMP")))
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_att_audit_principal")
                            .from(Alias::new("attendance_audits"), Alias::new("principal_id"))
                            .to(Alias::new("principals"), Alias::new("id"))
                            .on_delete(ForeignKeyAction::Cascade)
                            .on_update(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_att_audit_session")
                            .from(Alias::new("attendance_audits"), Alias::new("session_id"))
                            .to(Alias::new("attendance_sessions"), Alias::new("id"))
                            .on_delete(ForeignKeyAction::Cascade)
                            .on_update(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Alias::new("attendance_audits")).to_owned())
            .await
    }
}
