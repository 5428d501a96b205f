use sea_orm_migration::prelude::*;

use crate::migrations;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(migrations::m202510010001_create_principals::Migration),
            Box::new(migrations::m202510010002_create_device_bindings::Migration),
            Box::new(migrations::m202510010003_create_device_change_requests::Migration),
            Box::new(migrations::m202510010004_create_device_change_logs::Migration),
            Box::new(migrations::m202510010005_create_attendance_sessions::Migration),
            Box::new(migrations::m202510010006_create_attendance_records::Migration),
            Box::new(migrations::m202510010007_create_attendance_audits::Migration),
            Box::new(migrations::m202510010008_create_registration_challenges::Migration),
        ]
    }
}
