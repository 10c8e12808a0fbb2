//! `billing-jobs register`: seed the targets jobs may refer to.

use crate::cli::{RegisterContractArgs, RegisterStatementArgs};
use crate::context::AppContext;
use crate::error::{JobsError, Result};
use crate::events::{Event, EventAction, append_event};
use crate::jobs::TargetRef;
use crate::store::{ContractEntry, TargetDirectory, is_safe_key};
use serde_json::json;

pub fn cmd_register_statement(ctx: &AppContext, args: RegisterStatementArgs) -> Result<()> {
    check_key("billing statement", &args.id)?;
    check_name(&args.name)?;

    let store = ctx.open_store();
    let statement = TargetRef::new(args.id, args.name);
    store.register_billing_statement(&statement)?;

    let event = Event::new(EventAction::Register)
        .with_target(statement.key.clone())
        .with_details(json!({
            "entity": "billing_statement",
            "name": statement.name,
        }));
    append_event(ctx, &event)?;

    println!("Registered billing statement {} ({})", statement.key, statement.name);
    Ok(())
}

pub fn cmd_register_contract(ctx: &AppContext, args: RegisterContractArgs) -> Result<()> {
    check_key("contract", &args.id)?;
    check_key("customer site", &args.customer_site)?;
    check_name(&args.name)?;

    let store = ctx.open_store();
    let contract = ContractEntry {
        id: args.id,
        name: args.name,
        customer_site_id: args.customer_site,
    };
    store.register_contract(&contract)?;

    let event = Event::new(EventAction::Register)
        .with_target(contract.id.clone())
        .with_details(json!({
            "entity": "contract",
            "name": contract.name,
            "customer_site_id": contract.customer_site_id,
        }));
    append_event(ctx, &event)?;

    println!(
        "Registered contract {} ({}) for customer site {}",
        contract.id, contract.name, contract.customer_site_id
    );
    Ok(())
}

fn check_key(what: &str, key: &str) -> Result<()> {
    if is_safe_key(key) {
        return Ok(());
    }
    Err(JobsError::ValidationError(format!(
        "invalid {} id '{}': use letters, digits, '.', '_' or '-'",
        what, key
    )))
}

fn check_name(name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(JobsError::ValidationError("name must not be empty".to_string()));
    }
    Ok(())
}
