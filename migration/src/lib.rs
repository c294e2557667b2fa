pub use sea_orm_migration::prelude::*;

mod m20250103_090000_init;
mod m20250103_090500_job_queue;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20250103_090000_init::Migration),
            Box::new(m20250103_090500_job_queue::Migration),
        ]
    }
}
