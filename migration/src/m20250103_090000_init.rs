use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let db = manager.get_connection();

        let statement = r#"
        create type "contact_status" as enum ('subscribed', 'unsubscribed', 'cleaned', 'pending', 'bounced', 'complained');
        create type "engagement_level" as enum ('new', 'cold', 'cooling', 'warm', 'hot');
        create type "bounce_type" as enum ('soft', 'hard');
        create type "list_membership_status" as enum ('active', 'unsubscribed', 'removed');
        create type "campaign_schedule_kind" as enum ('immediate', 'scheduled', 'optimal');
        create type "campaign_status" as enum ('draft', 'scheduled', 'queued', 'sending', 'paused', 'sent', 'cancelled', 'failed');
        create type "email_log_status" as enum ('queued', 'sent', 'delivered', 'bounced', 'dropped', 'failed', 'complained');
        create type "automation_enrollment_status" as enum ('active', 'waiting', 'completed', 'exited', 'error');

        create table "user" (
            "id" serial primary key,
            "created_at" timestamptz(0) not null default now(),
            "email" varchar(255) not null,
            "name" varchar(255) not null
        );

        alter table "user" add constraint "user_email_unique" unique ("email");

        create table "organization" (
            "id" serial primary key,
            "created_at" timestamptz(0) not null default now(),
            "name" varchar(255) not null,
            "owner_id" int not null,
            "default_from_name" varchar(255) not null,
            "default_from_email" varchar(255) not null,
            "verified_domains" jsonb not null default '[]',
            "plan_emails_per_month" int not null default 10000,
            "plan_contact_cap" int not null default 5000,
            "plan_sending_rate_per_sec" int not null default 50,
            "suspended" boolean not null default false
        );

        alter table "organization" add constraint "organization_owner_id_unique" unique ("owner_id");
        alter table "organization" add constraint "organization_owner_id_foreign" foreign key ("owner_id") references "user" ("id") on update cascade;

        create table "contact" (
            "id" serial primary key,
            "created_at" timestamptz(0) not null default now(),
            "org_id" int not null,
            "email" varchar(255) not null,
            "first_name" varchar(255) null,
            "last_name" varchar(255) null,
            "profile" jsonb not null default '{}',
            "status" contact_status not null default 'pending',
            "tags" jsonb not null default '[]',
            "engagement_received" int not null default 0,
            "engagement_opened" int not null default 0,
            "engagement_clicked" int not null default 0,
            "engagement_score" smallint not null default 0,
            "engagement_level" engagement_level not null default 'new',
            "last_opened_at" timestamptz(0) null,
            "last_clicked_at" timestamptz(0) null,
            "bounce_count" int not null default 0,
            "complaint_count" int not null default 0,
            "last_bounce_type" bounce_type null,
            "last_bounce_at" timestamptz(0) null,
            "unsubscribe_reason" text null,
            "unsubscribed_from_campaign_id" int null
        );

        alter table "contact" add constraint "contact_org_id_foreign" foreign key ("org_id") references "organization" ("id") on update cascade on delete cascade;
        alter table "contact" add constraint "contact_org_id_email_unique" unique ("org_id", "email");
        create index "contact_org_id_status_idx" on "contact" ("org_id", "status");

        create table "list" (
            "id" serial primary key,
            "created_at" timestamptz(0) not null default now(),
            "org_id" int not null,
            "name" varchar(255) not null,
            "stats_active_count" int not null default 0,
            "stats_unsubscribed_count" int not null default 0,
            "stats_removed_count" int not null default 0,
            "stats_refreshed_at" timestamptz(0) null
        );

        alter table "list" add constraint "list_org_id_foreign" foreign key ("org_id") references "organization" ("id") on update cascade on delete cascade;
        alter table "list" add constraint "list_org_id_name_unique" unique ("org_id", "name");

        create table "contact_list_membership" (
            "id" serial primary key,
            "contact_id" int not null,
            "list_id" int not null,
            "status" list_membership_status not null default 'active',
            "added_at" timestamptz(0) not null default now()
        );

        alter table "contact_list_membership" add constraint "clm_contact_id_foreign" foreign key ("contact_id") references "contact" ("id") on update cascade on delete cascade;
        alter table "contact_list_membership" add constraint "clm_list_id_foreign" foreign key ("list_id") references "list" ("id") on update cascade on delete cascade;
        alter table "contact_list_membership" add constraint "clm_contact_id_list_id_unique" unique ("contact_id", "list_id");
        create index "clm_list_id_status_idx" on "contact_list_membership" ("list_id", "status");

        create table "segment" (
            "id" serial primary key,
            "created_at" timestamptz(0) not null default now(),
            "org_id" int not null,
            "name" varchar(255) not null,
            "predicate" jsonb not null default '{}'
        );

        alter table "segment" add constraint "segment_org_id_foreign" foreign key ("org_id") references "organization" ("id") on update cascade on delete cascade;
        alter table "segment" add constraint "segment_org_id_name_unique" unique ("org_id", "name");

        create table "template" (
            "id" serial primary key,
            "created_at" timestamptz(0) not null default now(),
            "org_id" int not null,
            "name" varchar(255) not null,
            "subject" varchar(998) not null,
            "html" text not null,
            "text" text null,
            "variables" jsonb not null default '[]',
            "current_version" int not null default 1
        );

        alter table "template" add constraint "template_org_id_foreign" foreign key ("org_id") references "organization" ("id") on update cascade on delete cascade;
        alter table "template" add constraint "template_org_id_name_unique" unique ("org_id", "name");

        create table "template_version" (
            "id" serial primary key,
            "template_id" int not null,
            "version" int not null,
            "created_at" timestamptz(0) not null default now(),
            "subject" varchar(998) not null,
            "html" text not null,
            "text" text null
        );

        alter table "template_version" add constraint "template_version_template_id_foreign" foreign key ("template_id") references "template" ("id") on update cascade on delete cascade;
        alter table "template_version" add constraint "template_version_template_id_version_unique" unique ("template_id", "version");

        create table "campaign" (
            "id" serial primary key,
            "created_at" timestamptz(0) not null default now(),
            "org_id" int not null,
            "name" varchar(255) not null,
            "selectors" jsonb not null default '{}',
            "template_id" int null,
            "inline_html" text null,
            "subject" varchar(998) not null,
            "from_name" varchar(255) not null,
            "from_email" varchar(255) not null,
            "reply_to" varchar(255) null,
            "schedule_kind" campaign_schedule_kind not null default 'immediate',
            "scheduled_at" timestamptz(0) null,
            "timezone" varchar(64) null,
            "track_opens" boolean not null default true,
            "track_clicks" boolean not null default true,
            "ab_test" jsonb null,
            "status" campaign_status not null default 'draft',
            "started_at" timestamptz(0) null,
            "completed_at" timestamptz(0) null,
            "progress_total" int not null default 0,
            "progress_processed" int not null default 0,
            "progress_failed" int not null default 0,
            "progress_percentage" smallint not null default 0,
            "analytics_sent" int not null default 0,
            "analytics_delivered" int not null default 0,
            "analytics_opens" int not null default 0,
            "analytics_unique_opens" int not null default 0,
            "analytics_clicks" int not null default 0,
            "analytics_unique_clicks" int not null default 0,
            "analytics_bounced" int not null default 0,
            "analytics_soft_bounced" int not null default 0,
            "analytics_hard_bounced" int not null default 0,
            "analytics_complained" int not null default 0,
            "analytics_unsubscribed" int not null default 0,
            "link_clicks" jsonb not null default '{}',
            "errors" jsonb not null default '[]'
        );

        alter table "campaign" add constraint "campaign_org_id_foreign" foreign key ("org_id") references "organization" ("id") on update cascade on delete cascade;
        alter table "campaign" add constraint "campaign_template_id_foreign" foreign key ("template_id") references "template" ("id") on update cascade on delete set null;
        alter table "campaign" add constraint "campaign_org_id_name_unique" unique ("org_id", "name");
        create index "campaign_status_scheduled_at_idx" on "campaign" ("status", "scheduled_at");
        create index "campaign_status_started_at_idx" on "campaign" ("status", "started_at");

        create table "email_log" (
            "id" serial primary key,
            "created_at" timestamptz(0) not null default now(),
            "org_id" int not null,
            "contact_id" int not null,
            "campaign_id" int null,
            "automation_id" int null,
            "tracking_id" varchar(32) not null,
            "message_id" varchar(255) null,
            "status" email_log_status not null default 'queued',
            "opened" boolean not null default false,
            "clicked" boolean not null default false,
            "unsubscribed" boolean not null default false,
            "complained" boolean not null default false,
            "first_opened_at" timestamptz(0) null,
            "first_clicked_at" timestamptz(0) null,
            "open_count" int not null default 0,
            "click_count" int not null default 0,
            "delivery_attempts" int not null default 0,
            "tracked_links" jsonb not null default '{}',
            "expires_at" timestamptz(0) not null
        );

        alter table "email_log" add constraint "email_log_org_id_foreign" foreign key ("org_id") references "organization" ("id") on update cascade on delete cascade;
        alter table "email_log" add constraint "email_log_contact_id_foreign" foreign key ("contact_id") references "contact" ("id") on update cascade on delete cascade;
        alter table "email_log" add constraint "email_log_campaign_id_foreign" foreign key ("campaign_id") references "campaign" ("id") on update cascade on delete cascade;
        alter table "email_log" add constraint "email_log_tracking_id_unique" unique ("tracking_id");
        alter table "email_log" add constraint "email_log_message_id_unique" unique ("message_id");
        alter table "email_log" add constraint "email_log_campaign_id_contact_id_unique" unique ("campaign_id", "contact_id");
        create index "email_log_expires_at_idx" on "email_log" ("expires_at");

        create table "email_log_event" (
            "id" serial primary key,
            "email_log_id" int not null,
            "kind" varchar(32) not null,
            "occurred_at" timestamptz(0) not null default now(),
            "details" jsonb not null default '{}'
        );

        alter table "email_log_event" add constraint "email_log_event_email_log_id_foreign" foreign key ("email_log_id") references "email_log" ("id") on update cascade on delete cascade;
        create index "email_log_event_email_log_id_idx" on "email_log_event" ("email_log_id");

        create table "feedback_log" (
            "id" serial primary key,
            "org_id" int not null,
            "feedback_id" varchar(255) not null,
            "email_log_id" int null,
            "kind" varchar(32) not null,
            "email" varchar(255) not null,
            "timestamp" timestamptz(0) not null,
            "details" jsonb not null default '{}',
            "processed_at" timestamptz(0) null
        );

        alter table "feedback_log" add constraint "feedback_log_org_id_foreign" foreign key ("org_id") references "organization" ("id") on update cascade on delete cascade;
        alter table "feedback_log" add constraint "feedback_log_feedback_id_unique" unique ("feedback_id");
        create index "feedback_log_timestamp_idx" on "feedback_log" ("timestamp");

        create table "suppression" (
            "id" serial primary key,
            "org_id" int not null,
            "email" varchar(255) not null,
            "reason" varchar(64) not null,
            "bounce_type" bounce_type null,
            "created_at" timestamptz(0) not null default now()
        );

        alter table "suppression" add constraint "suppression_org_id_foreign" foreign key ("org_id") references "organization" ("id") on update cascade on delete cascade;
        alter table "suppression" add constraint "suppression_org_id_email_unique" unique ("org_id", "email");

        create table "automation" (
            "id" serial primary key,
            "created_at" timestamptz(0) not null default now(),
            "org_id" int not null,
            "name" varchar(255) not null,
            "active" boolean not null default false,
            "trigger" jsonb not null default '{}',
            "steps" jsonb not null default '[]',
            "settings" jsonb not null default '{}',
            "stats_active" int not null default 0,
            "stats_completed" int not null default 0,
            "stats_exited" int not null default 0
        );

        alter table "automation" add constraint "automation_org_id_foreign" foreign key ("org_id") references "organization" ("id") on update cascade on delete cascade;
        alter table "automation" add constraint "automation_org_id_name_unique" unique ("org_id", "name");

        create table "automation_enrollment" (
            "id" serial primary key,
            "automation_id" int not null,
            "contact_id" int not null,
            "current_step_index" int not null default 0,
            "status" automation_enrollment_status not null default 'active',
            "next_action_at" timestamptz(0) null,
            "enrolled_at" timestamptz(0) not null default now(),
            "terminated_at" timestamptz(0) null
        );

        alter table "automation_enrollment" add constraint "ae_automation_id_foreign" foreign key ("automation_id") references "automation" ("id") on update cascade on delete cascade;
        alter table "automation_enrollment" add constraint "ae_contact_id_foreign" foreign key ("contact_id") references "contact" ("id") on update cascade on delete cascade;
        create index "ae_status_next_action_at_idx" on "automation_enrollment" ("automation_id", "status", "next_action_at");
        "#;

        db.execute_unprepared(statement).await?;

        Ok(())
    }

    async fn down(&self, _manager: &SchemaManager) -> Result<(), DbErr> {
        Err(DbErr::Custom(String::from("cannot be reverted")))
    }
}
