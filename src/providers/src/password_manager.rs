//! Password manager provider (1Password `op get user`)

use crate::error::lookup_error_from_vault;
use accessaudit::provider::{LookupResult, ACTIVE_SUSPENDED_DELETED};
use accessaudit::{AccountStatusProvider, LookupError, StatusBucket, Subject, SubjectStatus};
use accessaudit_vault::{OnePasswordCli, UserRecord};
use async_trait::async_trait;
use std::sync::Arc;

/// Account records of the password manager's members
#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn get_user(&self, user: &str) -> accessaudit_vault::Result<UserRecord>;
}

#[async_trait]
impl UserDirectory for OnePasswordCli {
    async fn get_user(&self, user: &str) -> accessaudit_vault::Result<UserRecord> {
        OnePasswordCli::get_user(self, user).await
    }
}

fn classify(record: &UserRecord) -> LookupResult {
    if record.is_active() {
        Ok(SubjectStatus::active())
    } else if record.is_suspended() {
        Ok(SubjectStatus::Suspended)
    } else {
        Err(LookupError::Data(format!(
            "unknown account state '{}'",
            record.state
        )))
    }
}

pub struct PasswordManagerProvider {
    directory: Arc<dyn UserDirectory>,
}

impl PasswordManagerProvider {
    pub fn new(directory: Arc<dyn UserDirectory>) -> Self {
        Self { directory }
    }
}

#[async_trait]
impl AccountStatusProvider for PasswordManagerProvider {
    fn name(&self) -> &str {
        "password_manager"
    }

    fn vocabulary(&self) -> &'static [StatusBucket] {
        ACTIVE_SUSPENDED_DELETED
    }

    async fn lookup(&self, subject: &Subject) -> LookupResult {
        let record = self
            .directory
            .get_user(subject.identity())
            .await
            .map_err(lookup_error_from_vault)?;

        classify(&record)
    }
}
