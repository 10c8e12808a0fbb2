//! Implementation of the `billing-jobs init` command.
//!
//! Creates `store/` and `events/` under the data directory and writes a
//! default `config.yaml` if none exists. Running it again is harmless: an
//! existing config is validated and left untouched.

use crate::config::Config;
use crate::context::AppContext;
use crate::error::{JobsError, Result};
use crate::events::{Event, EventAction, append_event};
use crate::fs::atomic_write_file;
use serde_json::json;
use std::fs;
use std::path::Path;

const CONFIG_HEADER: &str = "\
# billing-jobs configuration.
#
# lock_lease_minutes:   how long a lock holder may keep a resource lock before
#                       others may take it over
# reaper_interval_secs: how often `billing-jobs reaper` scans for expired locks
# resource_classes:     lock resource serializing enqueues of each job kind
# max_batch_size:       most targets one enqueue call may create jobs for
";

/// Execute the `billing-jobs init` command.
pub fn cmd_init(ctx: &AppContext) -> Result<()> {
    create_dir(&ctx.data_dir)?;
    create_dir(&ctx.store_dir)?;
    create_dir(&ctx.events_dir)?;

    let config_path = ctx.config_path();
    let config_created = if config_path.exists() {
        Config::load(&config_path)?;
        false
    } else {
        let yaml = Config::default().to_yaml()?;
        atomic_write_file(&config_path, &format!("{}\n{}", CONFIG_HEADER, yaml))?;
        true
    };

    let event = Event::new(EventAction::Init).with_details(json!({
        "data_dir": ctx.data_dir.display().to_string(),
        "config_created": config_created,
    }));
    append_event(ctx, &event)?;

    println!("Initialized billing-jobs data directory.");
    println!();
    println!("Data directory: {}", ctx.data_dir.display());
    if config_created {
        println!("Created config: {}", config_path.display());
    } else {
        println!("Kept config:    {}", config_path.display());
    }

    Ok(())
}

fn create_dir(path: &Path) -> Result<()> {
    fs::create_dir_all(path).map_err(|e| {
        JobsError::UserError(format!(
            "failed to create directory '{}': {}",
            path.display(),
            e
        ))
    })
}
