//! `homestead config`: persisted configuration entries.

use anyhow::{Result, bail};

use crate::cli::ConfigCommand;
use crate::store::SetupStore;
use crate::ui;
use crate::Context as AppContext;

pub fn run(_ctx: &AppContext, cmd: ConfigCommand) -> Result<()> {
    let mut store = SetupStore::open_default()?;

    match cmd {
        ConfigCommand::Get { key } => match store.get(&key) {
            Some(value) => {
                println!("{value}");
                Ok(())
            }
            None => bail!("{key} is not set"),
        },
        ConfigCommand::Set { key, value } => {
            store.set(&key, &value)?;
            ui::success(&format!("{key}={value}"));
            Ok(())
        }
        ConfigCommand::List => {
            for (key, value) in store.entries() {
                println!("{key}={value}");
            }
            Ok(())
        }
        ConfigCommand::Path => {
            println!("{}", store.config_path().display());
            Ok(())
        }
    }
}
