//! Per-kind task services.
//!
//! Each service resolves business identifiers to targets through the
//! store's directory and hands them to the shared [`DedupGuard`].

use super::guard::DedupGuard;
use super::types::{JobId, JobKind, JobParams, JobSource, SendAction, TargetRef};
use crate::error::{JobsError, Result};
use crate::store::{ContractEntry, Store, StoreError, is_safe_key};
use chrono::NaiveDate;

/// Email delivery of generated billing statements.
pub struct EmailTasks<S: Store> {
    guard: DedupGuard<S>,
}

impl<S: Store> EmailTasks<S> {
    pub fn new(guard: DedupGuard<S>) -> Self {
        Self { guard }
    }

    /// Queue one email job for a billing statement.
    pub fn add_task(&self, statement_id: &str, send_action: Option<SendAction>) -> Result<JobId> {
        let target = self.resolve(&[statement_id.to_string()])?.remove(0);
        let params = JobParams {
            send_action,
            ..JobParams::default()
        };
        self.guard.enqueue_one(JobKind::Email, target, params)
    }

    /// Queue one email job per statement. Defaults to `SendAll`.
    pub fn add_tasks(
        &self,
        statement_ids: &[String],
        send_action: Option<SendAction>,
    ) -> Result<Vec<JobId>> {
        let targets = self.resolve(statement_ids)?;
        let params = JobParams {
            send_action: Some(send_action.unwrap_or_default()),
            ..JobParams::default()
        };
        self.guard.enqueue_many(JobKind::Email, targets, params)
    }

    fn resolve(&self, statement_ids: &[String]) -> Result<Vec<TargetRef>> {
        if statement_ids.is_empty() {
            return Err(JobsError::ValidationError(
                "at least one billing statement id is required".to_string(),
            ));
        }

        let mut targets = Vec::with_capacity(statement_ids.len());
        let mut unknown = Vec::new();
        for id in statement_ids {
            check_id("billing statement", id)?;
            match self.guard.store().billing_statement(id) {
                Ok(target) => targets.push(target),
                Err(StoreError::NotFound) => unknown.push(id.as_str()),
                Err(e) => return Err(e.into()),
            }
        }

        if !unknown.is_empty() {
            return Err(JobsError::ValidationError(format!(
                "unknown billing statement(s): {}",
                unknown.join(", ")
            )));
        }
        Ok(targets)
    }
}

/// Statement generation for customer-site contracts.
pub struct StatementTasks<S: Store> {
    guard: DedupGuard<S>,
}

impl<S: Store> StatementTasks<S> {
    pub fn new(guard: DedupGuard<S>) -> Self {
        Self { guard }
    }

    /// Queue a manual statement job for the site's first contract.
    pub fn add_task(
        &self,
        customer_site_id: &str,
        service_period_start: Option<NaiveDate>,
    ) -> Result<JobId> {
        let contract = self
            .contracts(customer_site_id)?
            .into_iter()
            .next()
            .ok_or_else(|| no_contracts(customer_site_id))?;

        let params = JobParams {
            source: Some(JobSource::Manual),
            service_period_start,
            ..JobParams::default()
        };
        self.guard
            .enqueue_one(JobKind::Statement, contract.target(), params)
    }

    /// Queue a manual statement job for every contract of every site.
    ///
    /// A site without contracts fails the whole call with `ValidationError`
    /// rather than being skipped, so a mistyped site id is never silently
    /// dropped from the batch.
    pub fn add_tasks(
        &self,
        customer_site_ids: &[String],
        service_period_start: Option<NaiveDate>,
    ) -> Result<Vec<JobId>> {
        if customer_site_ids.is_empty() {
            return Err(JobsError::ValidationError(
                "at least one customer site id is required".to_string(),
            ));
        }

        let mut targets = Vec::new();
        for site in customer_site_ids {
            let contracts = self.contracts(site)?;
            if contracts.is_empty() {
                return Err(no_contracts(site));
            }
            targets.extend(contracts.iter().map(ContractEntry::target));
        }

        let params = JobParams {
            source: Some(JobSource::Manual),
            service_period_start,
            ..JobParams::default()
        };
        self.guard.enqueue_many(JobKind::Statement, targets, params)
    }

    fn contracts(&self, customer_site_id: &str) -> Result<Vec<ContractEntry>> {
        check_id("customer site", customer_site_id)?;
        Ok(self
            .guard
            .store()
            .contracts_for_customer_site(customer_site_id)?)
    }
}

fn no_contracts(customer_site_id: &str) -> JobsError {
    JobsError::ValidationError(format!(
        "customer site '{}' has no contracts",
        customer_site_id
    ))
}

/// Unit-account batches, one per service period.
pub struct UnitAccountTasks<S: Store> {
    guard: DedupGuard<S>,
}

impl<S: Store> UnitAccountTasks<S> {
    pub fn new(guard: DedupGuard<S>) -> Self {
        Self { guard }
    }

    /// Queue the batch for `service_period` (`YYYY-MM`).
    pub fn add_task(&self, service_period: &str) -> Result<JobId> {
        let period = parse_service_period(service_period)?;
        self.guard
            .enqueue_one(JobKind::UnitAccount, TargetRef::keyed(period), JobParams::default())
    }
}

/// Normalize a `YYYY-MM` service period.
pub fn parse_service_period(input: &str) -> Result<String> {
    let trimmed = input.trim();
    let well_formed = trimmed.len() == 7
        && trimmed.as_bytes()[4] == b'-'
        && NaiveDate::parse_from_str(&format!("{}-01", trimmed), "%Y-%m-%d").is_ok();

    if !well_formed {
        return Err(JobsError::ValidationError(format!(
            "invalid service period '{}': expected YYYY-MM",
            input
        )));
    }
    Ok(trimmed.to_string())
}

fn check_id(what: &str, id: &str) -> Result<()> {
    if is_safe_key(id) {
        Ok(())
    } else {
        Err(JobsError::ValidationError(format!(
            "invalid {} id '{}'",
            what, id
        )))
    }
}
