//! User account migration.
//!
//! Accounts land in one fixed table, `appwrite_users`, paged the same way as
//! collection documents.

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use tracing::info;

use crate::error::Result;
use crate::migrator::{
    create_progress_bar, drain_pages, finish_report, CollectionReport, CollectionState,
};
use crate::schema::{map_attribute, AttributeDescriptor, PrimitiveType, TargetFieldSpec};
use crate::source::{DocumentSource, SourceRecord, CREATED_AT_KEY, UPDATED_AT_KEY};
use crate::target::{Dialect, DialectFamily, TargetStore};
use crate::transform::{identity, timestamp, TargetRecord};

/// Target table / collection for user accounts.
pub const USERS_TABLE: &str = "appwrite_users";

/// Attributes of the users table.
#[must_use]
pub fn user_attributes() -> Vec<AttributeDescriptor> {
    vec![
        AttributeDescriptor::new("name", PrimitiveType::String).with_size(255),
        AttributeDescriptor::new("email", PrimitiveType::Email),
        AttributeDescriptor::new("phone", PrimitiveType::String).with_size(50),
        AttributeDescriptor::new("email_verification", PrimitiveType::Boolean),
        AttributeDescriptor::new("phone_verification", PrimitiveType::Boolean),
        AttributeDescriptor::new("status", PrimitiveType::Boolean),
        AttributeDescriptor::new("registration", PrimitiveType::Datetime),
        AttributeDescriptor::new("password_update", PrimitiveType::Datetime),
        AttributeDescriptor::new("prefs", PrimitiveType::Unknown("json".to_string())),
    ]
}

/// Target fields of the users table for `dialect`.
#[must_use]
pub fn user_fields(dialect: Dialect) -> Vec<TargetFieldSpec> {
    let mut fields = TargetFieldSpec::implicit_fields(dialect.family() == DialectFamily::Document);
    fields.extend(user_attributes().iter().map(|a| map_attribute(a, dialect)));
    fields
}

/// Turns a source user account into a users-table record.
///
/// Empty strings become NULL. Missing verification flags are `false` and a
/// missing status is `true`.
///
/// # Errors
///
/// Returns an error if the account has no identity.
pub fn transform_user(
    user: &SourceRecord,
    family: DialectFamily,
    now: DateTime<Utc>,
) -> Result<TargetRecord> {
    let mut fields = Map::new();
    fields.insert("name".to_string(), non_empty(user, "name"));
    fields.insert("email".to_string(), non_empty(user, "email"));
    fields.insert("phone".to_string(), non_empty(user, "phone"));
    fields.insert(
        "email_verification".to_string(),
        Value::Bool(flag(user, "emailVerification", false)),
    );
    fields.insert(
        "phone_verification".to_string(),
        Value::Bool(flag(user, "phoneVerification", false)),
    );
    fields.insert("status".to_string(), Value::Bool(flag(user, "status", true)));
    fields.insert("registration".to_string(), non_empty(user, "registration"));
    fields.insert("password_update".to_string(), non_empty(user, "passwordUpdate"));

    let prefs = match user.get("prefs") {
        None | Some(Value::Null) => Value::Null,
        Some(prefs) if family == DialectFamily::Sql => {
            Value::String(serde_json::to_string(prefs)?)
        }
        Some(prefs) => prefs.clone(),
    };
    fields.insert("prefs".to_string(), prefs);

    Ok(TargetRecord {
        id: identity(user)?,
        created_at: timestamp(user, CREATED_AT_KEY).unwrap_or(now),
        updated_at: timestamp(user, UPDATED_AT_KEY).unwrap_or(now),
        fields,
    })
}

fn non_empty(user: &SourceRecord, key: &str) -> Value {
    match user.get(key) {
        Some(Value::String(s)) if !s.is_empty() => Value::String(s.clone()),
        _ => Value::Null,
    }
}

fn flag(user: &SourceRecord, key: &str, default: bool) -> bool {
    user.get(key).and_then(Value::as_bool).unwrap_or(default)
}

/// Copies all user accounts into [`USERS_TABLE`].
#[derive(Debug, Clone)]
pub struct UserMigrator {
    page_size: usize,
    show_progress: bool,
}

impl UserMigrator {
    /// Creates a migrator requesting `page_size` accounts per page.
    #[must_use]
    pub fn new(page_size: usize, show_progress: bool) -> Self {
        Self {
            page_size: page_size.max(1),
            show_progress,
        }
    }

    /// Creates the users table and copies every account.
    ///
    /// # Errors
    ///
    /// Returns the first source, transform or target error.
    pub async fn migrate(
        &self,
        source: &dyn DocumentSource,
        target: &mut dyn TargetStore,
    ) -> Result<CollectionReport> {
        let dialect = target.dialect();
        target.create_schema(USERS_TABLE, &user_fields(dialect)).await?;

        let mut report = CollectionReport::new("users", "Users", USERS_TABLE);
        report.state = CollectionState::SchemaTranslated;
        report.expected = source.count_users().await?;
        report.state = CollectionState::Migrating;
        info!("Migrating {} user account(s)", report.expected);

        let family = dialect.family();
        let progress =
            create_progress_bar(report.expected, self.show_progress && report.expected > 0);
        progress.set_message("Users");

        let page_size = self.page_size;
        drain_pages(
            &*target,
            &mut report,
            page_size,
            &progress,
            |offset| source.fetch_users(page_size, offset),
            |user| transform_user(user, family, Utc::now()),
        )
        .await?;

        progress.finish_and_clear();
        finish_report(&mut report);
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::TargetType;
    use chrono::TimeZone;
    use serde_json::json;

    fn user(value: Value) -> SourceRecord {
        match value {
            Value::Object(map) => map,
            _ => unreachable!("test users are objects"),
        }
    }

    fn fixed_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
    }

    #[test]
    fn test_user_fields_sql() {
        let fields = user_fields(Dialect::Postgres);
        let names: Vec<_> = fields.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "id",
                "created_at",
                "updated_at",
                "name",
                "email",
                "phone",
                "email_verification",
                "phone_verification",
                "status",
                "registration",
                "password_update",
                "prefs"
            ]
        );
        assert_eq!(fields[5].target_type, TargetType::Varchar(50));
        assert_eq!(fields[9].target_type, TargetType::Timestamp);
        assert_eq!(fields[11].target_type, TargetType::Text);
    }

    #[test]
    fn test_transform_user_defaults() {
        let record = transform_user(
            &user(json!({"$id": "u1", "name": "", "email": "a@example.com"})),
            DialectFamily::Sql,
            fixed_now(),
        )
        .unwrap();

        assert_eq!(record.id, "u1");
        assert_eq!(record.created_at, fixed_now());
        assert_eq!(record.fields["name"], Value::Null);
        assert_eq!(record.fields["email"], "a@example.com");
        assert_eq!(record.fields["email_verification"], false);
        assert_eq!(record.fields["status"], true);
        assert_eq!(record.fields["prefs"], Value::Null);
    }

    #[test]
    fn test_transform_user_keeps_false_status() {
        let record = transform_user(
            &user(json!({"$id": "u1", "status": false, "emailVerification": true})),
            DialectFamily::Sql,
            fixed_now(),
        )
        .unwrap();
        assert_eq!(record.fields["status"], false);
        assert_eq!(record.fields["email_verification"], true);
    }

    #[test]
    fn test_transform_user_prefs_per_family() {
        let source = user(json!({"$id": "u1", "prefs": {"theme": "dark"}}));

        let sql = transform_user(&source, DialectFamily::Sql, fixed_now()).unwrap();
        assert_eq!(sql.fields["prefs"], "{\"theme\":\"dark\"}");

        let doc = transform_user(&source, DialectFamily::Document, fixed_now()).unwrap();
        assert_eq!(doc.fields["prefs"], json!({"theme": "dark"}));
    }
}
