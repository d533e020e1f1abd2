// src/cli/set_key.rs
use super::CliError;
use crate::settings::secrets::{self, Secret};

pub fn run(name: String, value: String) -> Result<(), CliError> {
    let secret = Secret::from_name(&name)
        .ok_or_else(|| CliError::Usage(format!("Unknown key '{}'.", name)))?;
    secrets::store(secret, value.trim())?;
    println!("Stored {} in the keyring.", secret.keyring_user());
    Ok(())
}
