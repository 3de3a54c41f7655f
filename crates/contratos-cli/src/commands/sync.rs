use contratos_core::remote::RemoteStore;
use contratos_core::sync::{ConflictResolution, Freshness, Refresh};

use crate::commands::common::{format_mark, sync_message, Runtime};
use crate::error::CliError;

pub fn run_status<S: RemoteStore>(runtime: &Runtime<S>) -> Result<(), CliError> {
    let ctx = &runtime.context;
    println!("Context:      {}", ctx.key());
    println!("Cache file:   {}", ctx.cache_path().display());
    println!(
        "Local copy:   {}",
        if ctx.cache_path().exists() {
            "present"
        } else {
            "absent"
        }
    );
    println!(
        "Pending push: {}",
        if ctx.is_dirty() { "yes" } else { "no" }
    );
    println!("Last seen:    {}", format_mark(ctx.remote_mark()));

    match runtime.registry.gate().remote_state()? {
        Some(remote) => {
            println!(
                "Remote copy:  {} ({})",
                remote.object_id,
                format_mark(Some(remote.modified_at))
            );
            let seen = ctx.remote_mark();
            if ctx.is_dirty() && seen.is_some_and(|mark| remote.modified_at > mark) {
                println!("Remote changed while local changes are pending; run `contratos resync`.");
            } else if ctx.cache_path().exists()
                && !ctx.is_dirty()
                && seen >= Some(remote.modified_at)
            {
                println!("Up to date.");
            }
        }
        None => println!("Remote copy:  none yet"),
    }
    Ok(())
}

pub fn run_pull<S: RemoteStore>(runtime: &mut Runtime<S>) -> Result<(), CliError> {
    let freshness = runtime
        .registry
        .gate()
        .refresh(&mut runtime.context, Refresh::IfStale)?;
    match freshness {
        Freshness::Downloaded { modified_at } => {
            println!("Downloaded remote copy ({})", format_mark(Some(modified_at)));
        }
        Freshness::Current => println!("Already up to date."),
        Freshness::LocalOnly => println!("No remote copy yet; keeping the local one."),
        Freshness::Created => println!("No remote copy yet; created an empty local database."),
    }
    Ok(())
}

pub fn run_push<S: RemoteStore>(runtime: &mut Runtime<S>) -> Result<(), CliError> {
    let outcome = runtime.registry.push(&mut runtime.context)?;
    println!(
        "{}",
        sync_message(&outcome).unwrap_or_else(|| "Nothing to push.".to_string())
    );
    Ok(())
}

pub fn run_resync<S: RemoteStore>(
    runtime: &mut Runtime<S>,
    resolution: ConflictResolution,
) -> Result<(), CliError> {
    let outcome = runtime.registry.resync(&mut runtime.context, resolution)?;
    match resolution {
        ConflictResolution::TakeRemote => println!("Local copy replaced by the remote one."),
        ConflictResolution::KeepLocal => println!(
            "{}",
            sync_message(&outcome).unwrap_or_else(|| "Nothing to push.".to_string())
        ),
    }
    Ok(())
}
