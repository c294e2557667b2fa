use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let db = manager.get_connection();

        let statement = r#"
        create type "job_status" as enum ('pending', 'active', 'completed', 'failed', 'stalled');
        create type "job_backoff_kind" as enum ('fixed', 'exponential');

        create table "job" (
            "id" uuid primary key,
            "queue" varchar(32) not null,
            "status" job_status not null default 'pending',
            "payload" jsonb not null default '{}',
            "priority" smallint not null default 0,
            "attempts" int not null default 0,
            "max_attempts" int not null default 3,
            "stalled_count" int not null default 0,
            "backoff_kind" job_backoff_kind not null default 'fixed',
            "backoff_base_millis" int not null default 30000,
            "not_before" timestamptz(0) not null default now(),
            "created_at" timestamptz(0) not null default now(),
            "locked_by" varchar(64) null,
            "lease_expires_at" timestamptz(0) null,
            "completed_at" timestamptz(0) null,
            "last_error" text null,
            "remove_on_complete" boolean not null default true,
            "remove_on_fail" boolean not null default false
        );

        create index "job_claim_idx" on "job" ("queue", "status", "priority" desc, "not_before");
        create index "job_lease_expires_at_idx" on "job" ("lease_expires_at");
        "#;

        db.execute_unprepared(statement).await?;

        Ok(())
    }

    async fn down(&self, _manager: &SchemaManager) -> Result<(), DbErr> {
        Err(DbErr::Custom(String::from("cannot be reverted")))
    }
}
